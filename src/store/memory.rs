use std::collections::{BTreeMap, HashSet};
use std::sync::{Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;

use super::{AccountStore, CategoryStore, ProductFilter, ProductStore, Removal, StoreError};
use crate::models::{
    Category, CategoryId, NewCategory, PasswordReset, Product, ProductDraft, ProductId, User,
};
use crate::response::PageRequest;

#[derive(Debug, Default)]
struct State {
    categories: BTreeMap<CategoryId, Category>,
    products: BTreeMap<ProductId, Product>,
    users: BTreeMap<String, User>,
    resets: Vec<PasswordReset>,
    category_seq: CategoryId,
    product_seq: ProductId,
}

/// Process-local store. Every operation runs under one lock, which makes the
/// multi-row writes atomic.
#[derive(Debug, Default)]
pub struct MemoryStore {
    state: Mutex<State>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl State {
    fn check_parent(&self, parent_id: Option<CategoryId>) -> Result<(), StoreError> {
        match parent_id {
            Some(id) if !self.categories.contains_key(&id) => Err(StoreError::MissingParent(id)),
            _ => Ok(()),
        }
    }
}

fn contains_ignore_case(haystack: &str, needle: &str) -> bool {
    haystack.to_lowercase().contains(&needle.to_lowercase())
}

fn paginate<T: Clone>(rows: Vec<T>, page: PageRequest) -> (Vec<T>, u64) {
    let total = rows.len() as u64;
    let data = rows
        .into_iter()
        .skip(usize::try_from(page.offset()).unwrap_or(usize::MAX))
        .take(page.per_page as usize)
        .collect();
    (data, total)
}

#[async_trait]
impl CategoryStore for MemoryStore {
    async fn find_category(&self, id: CategoryId) -> Result<Option<Category>, StoreError> {
        Ok(self.lock().categories.get(&id).cloned())
    }

    async fn all_categories(&self) -> Result<Vec<Category>, StoreError> {
        Ok(self.lock().categories.values().cloned().collect())
    }

    async fn search_categories(
        &self,
        search: Option<&str>,
        page: PageRequest,
    ) -> Result<(Vec<Category>, u64), StoreError> {
        let rows = self
            .lock()
            .categories
            .values()
            .filter(|c| search.map_or(true, |s| contains_ignore_case(&c.name, s)))
            .cloned()
            .collect();
        Ok(paginate(rows, page))
    }

    async fn children_of(&self, parent_ids: &[CategoryId]) -> Result<Vec<Category>, StoreError> {
        Ok(self
            .lock()
            .categories
            .values()
            .filter(|c| c.parent_id.map_or(false, |p| parent_ids.contains(&p)))
            .cloned()
            .collect())
    }

    async fn insert_category(&self, category: NewCategory) -> Result<Category, StoreError> {
        let mut state = self.lock();
        state.check_parent(category.parent_id)?;
        state.category_seq += 1;
        let category = Category {
            id: state.category_seq,
            name: category.name,
            parent_id: category.parent_id,
        };
        state.categories.insert(category.id, category.clone());
        Ok(category)
    }

    async fn update_category(&self, category: &Category) -> Result<(), StoreError> {
        let mut state = self.lock();
        state.check_parent(category.parent_id)?;
        state.categories.insert(category.id, category.clone());
        Ok(())
    }

    async fn delete_subtree(&self, root: CategoryId) -> Result<Option<Removal>, StoreError> {
        let mut state = self.lock();
        if !state.categories.contains_key(&root) {
            return Ok(None);
        }

        let mut ids = vec![root];
        let mut seen: HashSet<CategoryId> = HashSet::from([root]);
        let mut frontier = vec![root];
        while !frontier.is_empty() {
            frontier = state
                .categories
                .values()
                .filter(|c| c.parent_id.map_or(false, |p| frontier.contains(&p)))
                .map(|c| c.id)
                .filter(|id| seen.insert(*id))
                .collect();
            ids.extend_from_slice(&frontier);
        }

        state.categories.retain(|id, _| !seen.contains(id));
        let (removed, kept): (BTreeMap<_, _>, BTreeMap<_, _>) = std::mem::take(&mut state.products)
            .into_iter()
            .partition(|(_, p)| seen.contains(&p.category_id));
        state.products = kept;
        Ok(Some(Removal { categories: ids, products: removed.into_values().collect() }))
    }
}

#[async_trait]
impl ProductStore for MemoryStore {
    async fn find_product(&self, id: ProductId) -> Result<Option<Product>, StoreError> {
        Ok(self.lock().products.get(&id).cloned())
    }

    async fn search_products(
        &self,
        filter: &ProductFilter,
        page: PageRequest,
    ) -> Result<(Vec<Product>, u64), StoreError> {
        let rows = self
            .lock()
            .products
            .values()
            .filter(|p| {
                filter.search.as_deref().map_or(true, |s| {
                    contains_ignore_case(&p.name, s) || contains_ignore_case(&p.description, s)
                })
            })
            .filter(|p| filter.category_id.map_or(true, |c| p.category_id == c))
            .filter(|p| filter.status.map_or(true, |s| p.status == s))
            .cloned()
            .collect();
        Ok(paginate(rows, page))
    }

    async fn products_in(&self, category_ids: &[CategoryId]) -> Result<Vec<Product>, StoreError> {
        Ok(self
            .lock()
            .products
            .values()
            .filter(|p| category_ids.contains(&p.category_id))
            .cloned()
            .collect())
    }

    async fn insert_product(
        &self,
        draft: ProductDraft,
        image: Option<String>,
    ) -> Result<Product, StoreError> {
        let mut state = self.lock();
        state.product_seq += 1;
        let product = draft.into_product(state.product_seq, image);
        state.products.insert(product.id, product.clone());
        Ok(product)
    }

    async fn update_product(&self, product: &Product) -> Result<(), StoreError> {
        self.lock().products.insert(product.id, product.clone());
        Ok(())
    }

    async fn delete_product(&self, id: ProductId) -> Result<bool, StoreError> {
        Ok(self.lock().products.remove(&id).is_some())
    }
}

#[async_trait]
impl AccountStore for MemoryStore {
    async fn find_user(&self, id: &str) -> Result<Option<User>, StoreError> {
        Ok(self.lock().users.get(id).cloned())
    }

    async fn find_user_by_email(&self, email: &str) -> Result<Option<User>, StoreError> {
        Ok(self.lock().users.values().find(|u| u.email == email).cloned())
    }

    async fn insert_user(&self, user: &User) -> Result<(), StoreError> {
        let mut state = self.lock();
        if state.users.values().any(|u| u.email == user.email) {
            return Err(StoreError::Duplicate("email"));
        }
        state.users.insert(user.id.clone(), user.clone());
        Ok(())
    }

    async fn update_user(&self, user: &User) -> Result<(), StoreError> {
        let mut state = self.lock();
        if state.users.values().any(|u| u.email == user.email && u.id != user.id) {
            return Err(StoreError::Duplicate("email"));
        }
        state.users.insert(user.id.clone(), user.clone());
        Ok(())
    }

    async fn latest_reset(&self, email: &str) -> Result<Option<PasswordReset>, StoreError> {
        Ok(self
            .lock()
            .resets
            .iter()
            .filter(|r| r.email == email)
            .max_by_key(|r| r.created_at)
            .cloned())
    }

    async fn insert_reset(&self, reset: &PasswordReset) -> Result<(), StoreError> {
        self.lock().resets.push(reset.clone());
        Ok(())
    }

    async fn redeem_reset(&self, user: &User, reset: &PasswordReset) -> Result<(), StoreError> {
        let mut state = self.lock();
        state.users.insert(user.id.clone(), user.clone());
        state.resets.retain(|r| r != reset);
        Ok(())
    }
}
