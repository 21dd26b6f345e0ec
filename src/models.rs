use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use validator::Validate;

pub type CategoryId = i64;
pub type ProductId = i64;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Category {
    pub id: CategoryId,
    pub name: String,
    pub parent_id: Option<CategoryId>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct NewCategory {
    pub name: String,
    pub parent_id: Option<CategoryId>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProductStatus {
    #[default]
    Inactive,
    Active,
}

impl ProductStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            ProductStatus::Inactive => "inactive",
            ProductStatus::Active => "active",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Product {
    pub id: ProductId,
    pub category_id: CategoryId,
    pub name: String,
    pub description: String,
    pub quantity: u32,
    pub price: f64,
    pub status: ProductStatus,
    /// Stored-file reference, relative to the file store root.
    pub image: Option<String>,
}

/// The writable fields of a product, shared by create and update.
#[derive(Debug, Clone, PartialEq)]
pub struct ProductDraft {
    pub category_id: CategoryId,
    pub name: String,
    pub description: String,
    pub quantity: u32,
    pub price: f64,
    pub status: ProductStatus,
}

impl ProductDraft {
    pub fn into_product(self, id: ProductId, image: Option<String>) -> Product {
        Product {
            id,
            category_id: self.category_id,
            name: self.name,
            description: self.description,
            quantity: self.quantity,
            price: self.price,
            status: self.status,
            image,
        }
    }
}

/// Public shape of a product: the raw file reference is replaced by a URL.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProductView {
    pub id: ProductId,
    pub category_id: CategoryId,
    pub name: String,
    pub description: String,
    pub quantity: u32,
    pub price: f64,
    pub status: ProductStatus,
    pub image_url: Option<String>,
}

impl ProductView {
    pub fn new(product: Product, public_base: &str) -> Self {
        let image_url = product
            .image
            .as_ref()
            .map(|path| format!("{}/{}", public_base.trim_end_matches('/'), path));
        ProductView {
            id: product.id,
            category_id: product.category_id,
            name: product.name,
            description: product.description,
            quantity: product.quantity,
            price: product.price,
            status: product.status,
            image_url,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct User {
    pub id: String,
    pub name: String,
    pub email: String,
    pub password_hash: String,
    pub email_verified_at: Option<DateTime<Utc>>,
    pub verify_token: Option<String>,
}

impl User {
    pub fn is_verified(&self) -> bool {
        self.email_verified_at.is_some()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UserView {
    pub id: String,
    pub name: String,
    pub email: String,
    pub email_verified_at: Option<DateTime<Utc>>,
}

impl From<&User> for UserView {
    fn from(user: &User) -> Self {
        UserView {
            id: user.id.clone(),
            name: user.name.clone(),
            email: user.email.clone(),
            email_verified_at: user.email_verified_at,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PasswordReset {
    pub email: String,
    pub token: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String, // user id
    pub exp: usize,  // expiry as UTC timestamp
}

#[derive(Debug, Serialize)]
pub struct AuthResponse {
    pub token: String,
    pub user: UserView,
}

// Request bodies

#[derive(Debug, Deserialize, Validate)]
pub struct SignUpInput {
    #[validate(length(min = 1, message = "The name field is required."))]
    pub name: String,
    #[validate(email(message = "The email must be a valid email address."))]
    pub email: String,
    #[validate(length(min = 1, message = "The password field is required."))]
    pub password: String,
    pub password_confirmation: String,
}

#[derive(Debug, Deserialize, Validate)]
pub struct SignInInput {
    #[validate(email(message = "The email must be a valid email address."))]
    pub email: String,
    #[validate(length(min = 1, message = "The password field is required."))]
    pub password: String,
}

#[derive(Debug, Deserialize, Validate)]
pub struct VerifyEmailInput {
    #[validate(email(message = "The email must be a valid email address."))]
    pub email: String,
    #[validate(length(min = 1, message = "The code field is required."))]
    pub code: String,
}

#[derive(Debug, Deserialize, Validate)]
pub struct EmailInput {
    #[validate(email(message = "The email must be a valid email address."))]
    pub email: String,
}

#[derive(Debug, Deserialize, Validate)]
pub struct ChangePasswordInput {
    #[validate(email(message = "The email must be a valid email address."))]
    pub email: String,
    #[validate(length(min = 1, message = "The code field is required."))]
    pub code: String,
    #[validate(length(min = 1, message = "The password field is required."))]
    pub password: String,
}

#[derive(Debug, Default, Deserialize, Validate)]
pub struct UpdateProfileInput {
    #[validate(length(min = 1, message = "The name may not be empty."))]
    pub name: Option<String>,
    #[validate(email(message = "The email must be a valid email address."))]
    pub email: Option<String>,
    #[validate(length(min = 1, message = "The password may not be empty."))]
    pub password: Option<String>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct CategoryInput {
    #[validate(length(min = 1, max = 50, message = "The name must be between 1 and 50 characters."))]
    pub name: String,
    pub parent_id: Option<CategoryId>,
}

/// An image sent inline as base64 together with its file extension.
#[derive(Debug, Clone, Deserialize)]
pub struct ImageUpload {
    pub content: String,
    pub extension: String,
}

#[derive(Debug, Deserialize, Validate)]
pub struct ProductInput {
    #[validate(length(min = 1, max = 100, message = "The name must be between 1 and 100 characters."))]
    pub name: String,
    pub category_id: CategoryId,
    #[validate(length(min = 1, message = "The description field is required."))]
    pub description: String,
    pub quantity: u32,
    #[validate(range(min = 0.0, message = "The price must be at least 0."))]
    pub price: f64,
    pub status: Option<ProductStatus>,
    pub image: Option<ImageUpload>,
}

impl ProductInput {
    pub fn draft(&self) -> ProductDraft {
        ProductDraft {
            category_id: self.category_id,
            name: self.name.clone(),
            description: self.description.clone(),
            quantity: self.quantity,
            price: self.price,
            status: self.status.unwrap_or_default(),
        }
    }
}

/// Body of a product update. The image has its own endpoint, so a body that
/// still carries one is rejected rather than silently dropped.
#[derive(Debug, Deserialize, Validate)]
#[serde(deny_unknown_fields)]
pub struct ProductUpdateInput {
    #[validate(length(min = 1, max = 100, message = "The name must be between 1 and 100 characters."))]
    pub name: String,
    pub category_id: CategoryId,
    #[validate(length(min = 1, message = "The description field is required."))]
    pub description: String,
    pub quantity: u32,
    #[validate(range(min = 0.0, message = "The price must be at least 0."))]
    pub price: f64,
    pub status: Option<ProductStatus>,
}

impl ProductUpdateInput {
    pub fn draft(&self) -> ProductDraft {
        ProductDraft {
            category_id: self.category_id,
            name: self.name.clone(),
            description: self.description.clone(),
            quantity: self.quantity,
            price: self.price,
            status: self.status.unwrap_or_default(),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct ImageInput {
    pub image: ImageUpload,
}
