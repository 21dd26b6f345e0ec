use std::collections::HashSet;

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use futures::stream::TryStreamExt;
use mongodb::bson::{self, doc, Document};
use mongodb::error::{ErrorKind, WriteFailure};
use mongodb::options::{
    FindOneAndUpdateOptions, FindOneOptions, FindOptions, IndexOptions, ReturnDocument,
};
use mongodb::{Client, ClientSession, Collection, Database, IndexModel};
use serde::{Deserialize, Serialize};

use super::{AccountStore, CategoryStore, ProductFilter, ProductStore, Removal, StoreError};
use crate::models::{
    Category, CategoryId, NewCategory, PasswordReset, Product, ProductDraft, ProductId,
    ProductStatus, User,
};
use crate::response::PageRequest;

const DUPLICATE_KEY: i32 = 11000;

#[derive(Serialize, Deserialize, Debug)]
struct Counter {
    _id: String,
    seq: i64,
}

#[derive(Serialize, Deserialize, Debug)]
struct CategoryDocument {
    _id: CategoryId,
    name: String,
    parent_id: Option<CategoryId>,
}

impl From<CategoryDocument> for Category {
    fn from(doc: CategoryDocument) -> Self {
        Category { id: doc._id, name: doc.name, parent_id: doc.parent_id }
    }
}

impl From<&Category> for CategoryDocument {
    fn from(category: &Category) -> Self {
        CategoryDocument {
            _id: category.id,
            name: category.name.clone(),
            parent_id: category.parent_id,
        }
    }
}

#[derive(Serialize, Deserialize, Debug)]
struct ProductDocument {
    _id: ProductId,
    category_id: CategoryId,
    name: String,
    description: String,
    quantity: i64,
    price: f64,
    status: ProductStatus,
    image: Option<String>,
}

impl TryFrom<ProductDocument> for Product {
    type Error = StoreError;

    fn try_from(doc: ProductDocument) -> Result<Self, StoreError> {
        let quantity = u32::try_from(doc.quantity).map_err(|_| StoreError::Corrupt {
            collection: "products",
            detail: format!("product {} has quantity {}", doc._id, doc.quantity),
        })?;
        Ok(Product {
            id: doc._id,
            category_id: doc.category_id,
            name: doc.name,
            description: doc.description,
            quantity,
            price: doc.price,
            status: doc.status,
            image: doc.image,
        })
    }
}

impl From<&Product> for ProductDocument {
    fn from(product: &Product) -> Self {
        ProductDocument {
            _id: product.id,
            category_id: product.category_id,
            name: product.name.clone(),
            description: product.description.clone(),
            quantity: i64::from(product.quantity),
            price: product.price,
            status: product.status,
            image: product.image.clone(),
        }
    }
}

#[derive(Serialize, Deserialize, Debug)]
struct UserDocument {
    _id: String,
    name: String,
    email: String,
    password_hash: String,
    email_verified_at: Option<bson::DateTime>,
    verify_token: Option<String>,
}

impl TryFrom<UserDocument> for User {
    type Error = StoreError;

    fn try_from(doc: UserDocument) -> Result<Self, StoreError> {
        let email_verified_at = doc
            .email_verified_at
            .map(|time| from_bson_time("users", time))
            .transpose()?;
        Ok(User {
            id: doc._id,
            name: doc.name,
            email: doc.email,
            password_hash: doc.password_hash,
            email_verified_at,
            verify_token: doc.verify_token,
        })
    }
}

impl From<&User> for UserDocument {
    fn from(user: &User) -> Self {
        UserDocument {
            _id: user.id.clone(),
            name: user.name.clone(),
            email: user.email.clone(),
            password_hash: user.password_hash.clone(),
            email_verified_at: user.email_verified_at.map(to_bson_time),
            verify_token: user.verify_token.clone(),
        }
    }
}

#[derive(Serialize, Deserialize, Debug)]
struct ResetDocument {
    email: String,
    token: String,
    created_at: bson::DateTime,
}

impl TryFrom<ResetDocument> for PasswordReset {
    type Error = StoreError;

    fn try_from(doc: ResetDocument) -> Result<Self, StoreError> {
        Ok(PasswordReset {
            created_at: from_bson_time("password_resets", doc.created_at)?,
            email: doc.email,
            token: doc.token,
        })
    }
}

impl From<&PasswordReset> for ResetDocument {
    fn from(reset: &PasswordReset) -> Self {
        ResetDocument {
            email: reset.email.clone(),
            token: reset.token.clone(),
            created_at: to_bson_time(reset.created_at),
        }
    }
}

fn to_bson_time(time: DateTime<Utc>) -> bson::DateTime {
    bson::DateTime::from_millis(time.timestamp_millis())
}

fn from_bson_time(
    collection: &'static str,
    time: bson::DateTime,
) -> Result<DateTime<Utc>, StoreError> {
    Utc.timestamp_millis_opt(time.timestamp_millis())
        .single()
        .ok_or_else(|| StoreError::Corrupt {
            collection,
            detail: format!("timestamp {} is out of range", time.timestamp_millis()),
        })
}

fn convert_all<D, T>(rows: Vec<D>) -> Result<Vec<T>, StoreError>
where
    T: TryFrom<D, Error = StoreError>,
{
    rows.into_iter().map(T::try_from).collect()
}

/// Escapes regex metacharacters so a search term matches literally.
fn literal_pattern(search: &str) -> String {
    let mut pattern = String::with_capacity(search.len());
    for c in search.chars() {
        if "\\^$.|?*+()[]{}".contains(c) {
            pattern.push('\\');
        }
        pattern.push(c);
    }
    pattern
}

fn contains(search: &str) -> Document {
    doc! { "$regex": literal_pattern(search), "$options": "i" }
}

fn is_duplicate_key(err: &mongodb::error::Error) -> bool {
    match &*err.kind {
        ErrorKind::Write(WriteFailure::WriteError(e)) => e.code == DUPLICATE_KEY,
        _ => false,
    }
}

fn page_options(page: PageRequest) -> FindOptions {
    FindOptions::builder()
        .sort(doc! { "_id": 1 })
        .skip(page.offset())
        .limit(page.per_page as i64)
        .build()
}

fn sorted_by_id() -> FindOptions {
    FindOptions::builder().sort(doc! { "_id": 1 }).build()
}

/// MongoDB-backed store. Multi-document writes run in client-session
/// transactions, which need a replica set or sharded deployment.
#[derive(Clone, Debug)]
pub struct MongoStore {
    client: Client,
    counters: Collection<Counter>,
    categories: Collection<CategoryDocument>,
    products: Collection<ProductDocument>,
    users: Collection<UserDocument>,
    resets: Collection<ResetDocument>,
}

impl MongoStore {
    pub fn new(client: Client, db: &Database) -> Self {
        MongoStore {
            client,
            counters: db.collection("counters"),
            categories: db.collection("categories"),
            products: db.collection("products"),
            users: db.collection("users"),
            resets: db.collection("password_resets"),
        }
    }

    pub async fn ensure_indexes(&self) -> Result<(), StoreError> {
        let unique_email = IndexModel::builder()
            .keys(doc! { "email": 1 })
            .options(IndexOptions::builder().unique(true).build())
            .build();
        self.users.create_index(unique_email, None).await?;
        self.categories
            .create_index(IndexModel::builder().keys(doc! { "parent_id": 1 }).build(), None)
            .await?;
        self.products
            .create_index(IndexModel::builder().keys(doc! { "category_id": 1 }).build(), None)
            .await?;
        self.resets
            .create_index(
                IndexModel::builder().keys(doc! { "email": 1, "created_at": -1 }).build(),
                None,
            )
            .await?;
        Ok(())
    }

    async fn next_id(&self, sequence: &str) -> Result<i64, StoreError> {
        let filter = doc! { "_id": sequence };
        let update = doc! { "$inc": { "seq": 1_i64 } };
        let options = FindOneAndUpdateOptions::builder()
            .upsert(true)
            .return_document(ReturnDocument::After)
            .build();

        match self.counters.find_one_and_update(filter, update, options).await? {
            Some(counter) => Ok(counter.seq),
            None => Err(StoreError::Sequence(sequence.to_string())),
        }
    }

    async fn begin(&self) -> Result<ClientSession, StoreError> {
        let mut session = self.client.start_session(None).await?;
        session.start_transaction(None).await?;
        Ok(session)
    }

    async fn finish<T>(
        mut session: ClientSession,
        outcome: Result<T, StoreError>,
    ) -> Result<T, StoreError> {
        match outcome {
            Ok(value) => {
                session.commit_transaction().await?;
                Ok(value)
            }
            Err(err) => {
                if let Err(abort) = session.abort_transaction().await {
                    log::warn!("aborting transaction failed: {}", abort);
                }
                Err(err)
            }
        }
    }

    /// Bumps the parent's `revision` inside the session. A concurrent
    /// transaction deleting the parent then conflicts with this one instead
    /// of committing alongside it.
    async fn touch_parent(
        &self,
        session: &mut ClientSession,
        parent_id: CategoryId,
    ) -> Result<(), StoreError> {
        let touched = self
            .categories
            .update_one_with_session(
                doc! { "_id": parent_id },
                doc! { "$inc": { "revision": 1_i64 } },
                None,
                session,
            )
            .await?;
        if touched.matched_count == 0 {
            return Err(StoreError::MissingParent(parent_id));
        }
        Ok(())
    }

    async fn insert_category_in(
        &self,
        session: &mut ClientSession,
        category: &Category,
        parent_id: CategoryId,
    ) -> Result<(), StoreError> {
        self.touch_parent(session, parent_id).await?;
        self.categories
            .insert_one_with_session(CategoryDocument::from(category), None, session)
            .await?;
        Ok(())
    }

    async fn update_category_in(
        &self,
        session: &mut ClientSession,
        category: &Category,
        parent_id: CategoryId,
    ) -> Result<(), StoreError> {
        self.touch_parent(session, parent_id).await?;
        self.categories
            .replace_one_with_session(
                doc! { "_id": category.id },
                CategoryDocument::from(category),
                None,
                session,
            )
            .await?;
        Ok(())
    }

    async fn children_in(
        &self,
        session: &mut ClientSession,
        parent_ids: &[CategoryId],
    ) -> Result<Vec<CategoryId>, StoreError> {
        let mut cursor = self
            .categories
            .find_with_session(
                doc! { "parent_id": { "$in": parent_ids.to_vec() } },
                sorted_by_id(),
                session,
            )
            .await?;
        let mut ids = Vec::new();
        while let Some(document) = cursor.next(session).await {
            ids.push(document?._id);
        }
        Ok(ids)
    }

    async fn delete_subtree_in(
        &self,
        session: &mut ClientSession,
        root: CategoryId,
    ) -> Result<Option<Removal>, StoreError> {
        let exists = self
            .categories
            .find_one_with_session(doc! { "_id": root }, None, session)
            .await?;
        if exists.is_none() {
            return Ok(None);
        }

        let mut ids = vec![root];
        let mut seen: HashSet<CategoryId> = HashSet::from([root]);
        let mut frontier = vec![root];
        while !frontier.is_empty() {
            let children = self.children_in(session, &frontier).await?;
            frontier = children.into_iter().filter(|id| seen.insert(*id)).collect();
            ids.extend_from_slice(&frontier);
        }

        let product_filter = doc! { "category_id": { "$in": ids.clone() } };
        let mut cursor = self
            .products
            .find_with_session(product_filter.clone(), sorted_by_id(), session)
            .await?;
        let mut removed = Vec::new();
        while let Some(document) = cursor.next(session).await {
            removed.push(Product::try_from(document?)?);
        }

        self.products
            .delete_many_with_session(product_filter, None, session)
            .await?;
        self.categories
            .delete_many_with_session(doc! { "_id": { "$in": ids.clone() } }, None, session)
            .await?;
        Ok(Some(Removal { categories: ids, products: removed }))
    }

    async fn redeem_reset_in(
        &self,
        session: &mut ClientSession,
        user: &User,
        reset: &PasswordReset,
    ) -> Result<(), StoreError> {
        self.users
            .replace_one_with_session(
                doc! { "_id": user.id.as_str() },
                UserDocument::from(user),
                None,
                session,
            )
            .await?;
        self.resets
            .delete_many_with_session(
                doc! { "email": reset.email.as_str(), "token": reset.token.as_str() },
                None,
                session,
            )
            .await?;
        Ok(())
    }
}

#[async_trait]
impl CategoryStore for MongoStore {
    async fn find_category(&self, id: CategoryId) -> Result<Option<Category>, StoreError> {
        let found = self.categories.find_one(doc! { "_id": id }, None).await?;
        Ok(found.map(Category::from))
    }

    async fn all_categories(&self) -> Result<Vec<Category>, StoreError> {
        let rows: Vec<CategoryDocument> =
            self.categories.find(None, sorted_by_id()).await?.try_collect().await?;
        Ok(rows.into_iter().map(Category::from).collect())
    }

    async fn search_categories(
        &self,
        search: Option<&str>,
        page: PageRequest,
    ) -> Result<(Vec<Category>, u64), StoreError> {
        let filter = match search {
            Some(search) => doc! { "name": contains(search) },
            None => Document::new(),
        };
        let total = self.categories.count_documents(filter.clone(), None).await?;
        let rows: Vec<CategoryDocument> =
            self.categories.find(filter, page_options(page)).await?.try_collect().await?;
        Ok((rows.into_iter().map(Category::from).collect(), total))
    }

    async fn children_of(&self, parent_ids: &[CategoryId]) -> Result<Vec<Category>, StoreError> {
        if parent_ids.is_empty() {
            return Ok(Vec::new());
        }
        let filter = doc! { "parent_id": { "$in": parent_ids.to_vec() } };
        let rows: Vec<CategoryDocument> =
            self.categories.find(filter, sorted_by_id()).await?.try_collect().await?;
        Ok(rows.into_iter().map(Category::from).collect())
    }

    async fn insert_category(&self, category: NewCategory) -> Result<Category, StoreError> {
        let id = self.next_id("categories").await?;
        let category = Category { id, name: category.name, parent_id: category.parent_id };
        match category.parent_id {
            Some(parent_id) => {
                let mut session = self.begin().await?;
                let outcome = self.insert_category_in(&mut session, &category, parent_id).await;
                Self::finish(session, outcome).await?;
            }
            None => {
                self.categories
                    .insert_one(CategoryDocument::from(&category), None)
                    .await?;
            }
        }
        Ok(category)
    }

    async fn update_category(&self, category: &Category) -> Result<(), StoreError> {
        match category.parent_id {
            Some(parent_id) => {
                let mut session = self.begin().await?;
                let outcome = self.update_category_in(&mut session, category, parent_id).await;
                Self::finish(session, outcome).await
            }
            None => {
                self.categories
                    .replace_one(doc! { "_id": category.id }, CategoryDocument::from(category), None)
                    .await?;
                Ok(())
            }
        }
    }

    async fn delete_subtree(&self, root: CategoryId) -> Result<Option<Removal>, StoreError> {
        let mut session = self.begin().await?;
        let outcome = self.delete_subtree_in(&mut session, root).await;
        Self::finish(session, outcome).await
    }
}

#[async_trait]
impl ProductStore for MongoStore {
    async fn find_product(&self, id: ProductId) -> Result<Option<Product>, StoreError> {
        let found = self.products.find_one(doc! { "_id": id }, None).await?;
        found.map(Product::try_from).transpose()
    }

    async fn search_products(
        &self,
        filter: &ProductFilter,
        page: PageRequest,
    ) -> Result<(Vec<Product>, u64), StoreError> {
        let mut query = Document::new();
        if let Some(search) = filter.search.as_deref() {
            query.insert(
                "$or",
                vec![doc! { "name": contains(search) }, doc! { "description": contains(search) }],
            );
        }
        if let Some(category_id) = filter.category_id {
            query.insert("category_id", category_id);
        }
        if let Some(status) = filter.status {
            query.insert("status", status.as_str());
        }

        let total = self.products.count_documents(query.clone(), None).await?;
        let rows: Vec<ProductDocument> =
            self.products.find(query, page_options(page)).await?.try_collect().await?;
        Ok((convert_all(rows)?, total))
    }

    async fn products_in(&self, category_ids: &[CategoryId]) -> Result<Vec<Product>, StoreError> {
        let filter = doc! { "category_id": { "$in": category_ids.to_vec() } };
        let rows: Vec<ProductDocument> =
            self.products.find(filter, sorted_by_id()).await?.try_collect().await?;
        convert_all(rows)
    }

    async fn insert_product(
        &self,
        draft: ProductDraft,
        image: Option<String>,
    ) -> Result<Product, StoreError> {
        let id = self.next_id("products").await?;
        let product = draft.into_product(id, image);
        self.products.insert_one(ProductDocument::from(&product), None).await?;
        Ok(product)
    }

    async fn update_product(&self, product: &Product) -> Result<(), StoreError> {
        self.products
            .replace_one(doc! { "_id": product.id }, ProductDocument::from(product), None)
            .await?;
        Ok(())
    }

    async fn delete_product(&self, id: ProductId) -> Result<bool, StoreError> {
        let result = self.products.delete_one(doc! { "_id": id }, None).await?;
        Ok(result.deleted_count == 1)
    }
}

#[async_trait]
impl AccountStore for MongoStore {
    async fn find_user(&self, id: &str) -> Result<Option<User>, StoreError> {
        let found = self.users.find_one(doc! { "_id": id }, None).await?;
        found.map(User::try_from).transpose()
    }

    async fn find_user_by_email(&self, email: &str) -> Result<Option<User>, StoreError> {
        let found = self.users.find_one(doc! { "email": email }, None).await?;
        found.map(User::try_from).transpose()
    }

    async fn insert_user(&self, user: &User) -> Result<(), StoreError> {
        match self.users.insert_one(UserDocument::from(user), None).await {
            Ok(_) => Ok(()),
            Err(e) if is_duplicate_key(&e) => Err(StoreError::Duplicate("email")),
            Err(e) => Err(e.into()),
        }
    }

    async fn update_user(&self, user: &User) -> Result<(), StoreError> {
        match self
            .users
            .replace_one(doc! { "_id": user.id.as_str() }, UserDocument::from(user), None)
            .await
        {
            Ok(_) => Ok(()),
            Err(e) if is_duplicate_key(&e) => Err(StoreError::Duplicate("email")),
            Err(e) => Err(e.into()),
        }
    }

    async fn latest_reset(&self, email: &str) -> Result<Option<PasswordReset>, StoreError> {
        let options = FindOneOptions::builder().sort(doc! { "created_at": -1 }).build();
        let found = self.resets.find_one(doc! { "email": email }, options).await?;
        found.map(PasswordReset::try_from).transpose()
    }

    async fn insert_reset(&self, reset: &PasswordReset) -> Result<(), StoreError> {
        self.resets.insert_one(ResetDocument::from(reset), None).await?;
        Ok(())
    }

    async fn redeem_reset(&self, user: &User, reset: &PasswordReset) -> Result<(), StoreError> {
        let mut session = self.begin().await?;
        let outcome = self.redeem_reset_in(&mut session, user, reset).await;
        Self::finish(session, outcome).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn search_terms_are_matched_literally() {
        assert_eq!(literal_pattern("a.b*(c)"), "a\\.b\\*\\(c\\)");
        assert_eq!(literal_pattern("plain"), "plain");
    }

    #[test]
    fn timestamps_survive_the_bson_conversion() {
        let time = Utc.timestamp_millis_opt(1_700_000_000_123).single().unwrap();
        assert_eq!(from_bson_time("users", to_bson_time(time)).unwrap(), time);
    }

    #[test]
    fn corrupt_documents_surface_as_errors() {
        let product = ProductDocument {
            _id: 7,
            category_id: 1,
            name: "Lamp".into(),
            description: "Desk lamp".into(),
            quantity: -3,
            price: 1.0,
            status: ProductStatus::Active,
            image: None,
        };
        let err = Product::try_from(product).unwrap_err();
        assert!(matches!(err, StoreError::Corrupt { collection: "products", .. }));

        let reset = ResetDocument {
            email: "ana@example.com".into(),
            token: "t".into(),
            created_at: bson::DateTime::MAX,
        };
        assert!(matches!(
            PasswordReset::try_from(reset),
            Err(StoreError::Corrupt { collection: "password_resets", .. })
        ));
    }
}
