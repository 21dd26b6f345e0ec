//! Storage adapters for categories, products, users and password resets.
//!
//! The catalog and credential operations only talk to these traits. Writes
//! that must be all-or-nothing (`delete_subtree`, `redeem_reset`) are a
//! single trait call so each adapter can wrap them in its own transaction.
//! Category writes that name a parent confirm it inside the same unit, so a
//! concurrent subtree delete cannot leave the new row orphaned.

use async_trait::async_trait;
use thiserror::Error;

use crate::models::{
    Category, CategoryId, NewCategory, PasswordReset, Product, ProductDraft, ProductId,
    ProductStatus, User,
};
use crate::response::PageRequest;

pub mod memory;
pub mod mongo;

pub use memory::MemoryStore;
pub use mongo::MongoStore;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error(transparent)]
    Mongo(#[from] mongodb::error::Error),

    #[error("duplicate value for unique key `{0}`")]
    Duplicate(&'static str),

    #[error("sequence `{0}` could not be advanced")]
    Sequence(String),

    #[error("parent category {0} does not exist")]
    MissingParent(CategoryId),

    #[error("corrupt {collection} document: {detail}")]
    Corrupt { collection: &'static str, detail: String },
}

/// What a subtree delete removed.
#[derive(Debug, Clone, PartialEq)]
pub struct Removal {
    /// The deleted category first, then its descendants level by level.
    pub categories: Vec<CategoryId>,
    /// Products that were filed under the deleted categories.
    pub products: Vec<Product>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ProductFilter {
    /// Matched against name and description, case-insensitively.
    pub search: Option<String>,
    pub category_id: Option<CategoryId>,
    pub status: Option<ProductStatus>,
}

#[async_trait]
pub trait CategoryStore: Send + Sync {
    async fn find_category(&self, id: CategoryId) -> Result<Option<Category>, StoreError>;

    /// Every category, ordered by id.
    async fn all_categories(&self) -> Result<Vec<Category>, StoreError>;

    async fn search_categories(
        &self,
        search: Option<&str>,
        page: PageRequest,
    ) -> Result<(Vec<Category>, u64), StoreError>;

    /// Direct children of any of `parent_ids`, ordered by id.
    async fn children_of(&self, parent_ids: &[CategoryId]) -> Result<Vec<Category>, StoreError>;

    /// Fails with [`StoreError::MissingParent`] when the parent is gone by
    /// the time the row is written.
    async fn insert_category(&self, category: NewCategory) -> Result<Category, StoreError>;

    /// Same parent check as [`CategoryStore::insert_category`].
    async fn update_category(&self, category: &Category) -> Result<(), StoreError>;

    /// Removes `root`, every category below it and every product filed under
    /// them. The descendants are collected inside the same transaction as the
    /// delete. `None` when `root` does not exist.
    async fn delete_subtree(&self, root: CategoryId) -> Result<Option<Removal>, StoreError>;
}

#[async_trait]
pub trait ProductStore: Send + Sync {
    async fn find_product(&self, id: ProductId) -> Result<Option<Product>, StoreError>;

    async fn search_products(
        &self,
        filter: &ProductFilter,
        page: PageRequest,
    ) -> Result<(Vec<Product>, u64), StoreError>;

    /// Products whose category is any of `category_ids`, ordered by id.
    async fn products_in(&self, category_ids: &[CategoryId]) -> Result<Vec<Product>, StoreError>;

    async fn insert_product(
        &self,
        draft: ProductDraft,
        image: Option<String>,
    ) -> Result<Product, StoreError>;

    async fn update_product(&self, product: &Product) -> Result<(), StoreError>;

    async fn delete_product(&self, id: ProductId) -> Result<bool, StoreError>;
}

#[async_trait]
pub trait AccountStore: Send + Sync {
    async fn find_user(&self, id: &str) -> Result<Option<User>, StoreError>;

    async fn find_user_by_email(&self, email: &str) -> Result<Option<User>, StoreError>;

    /// Fails with [`StoreError::Duplicate`] when the email is taken.
    async fn insert_user(&self, user: &User) -> Result<(), StoreError>;

    async fn update_user(&self, user: &User) -> Result<(), StoreError>;

    /// The most recently created reset request for `email`.
    async fn latest_reset(&self, email: &str) -> Result<Option<PasswordReset>, StoreError>;

    async fn insert_reset(&self, reset: &PasswordReset) -> Result<(), StoreError>;

    /// Saves `user` and removes `reset` in one transaction.
    async fn redeem_reset(&self, user: &User, reset: &PasswordReset) -> Result<(), StoreError>;
}

/// A store that backs every adapter trait.
pub trait Store: CategoryStore + ProductStore + AccountStore {}

impl<T: CategoryStore + ProductStore + AccountStore> Store for T {}
