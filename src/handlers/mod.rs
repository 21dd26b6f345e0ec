use std::sync::Arc;

use actix_web::web;

use crate::credentials::TokenConfig;
use crate::errors::ApiError;
use crate::files::FileStore;
use crate::middleware::AuthMiddleware;
use crate::notifier::Notifier;
use crate::store::Store;

pub mod categories;
pub mod products;
pub mod users;

/// Collaborators shared by every request.
pub struct AppState {
    pub store: Arc<dyn Store>,
    pub files: Arc<dyn FileStore>,
    pub notifier: Arc<dyn Notifier>,
    pub tokens: TokenConfig,
    pub public_storage_url: String,
}

fn json_config() -> web::JsonConfig {
    web::JsonConfig::default()
        .error_handler(|err, _req| ApiError::invalid("body", err.to_string()).into())
}

fn query_config() -> web::QueryConfig {
    web::QueryConfig::default()
        .error_handler(|err, _req| ApiError::invalid("query", err.to_string()).into())
}

fn path_config() -> web::PathConfig {
    web::PathConfig::default()
        .error_handler(|err, _req| ApiError::invalid("path", err.to_string()).into())
}

/// Registers every route. Everything except the account bootstrap endpoints
/// requires a bearer token.
pub fn configure(jwt_secret: String) -> impl FnOnce(&mut web::ServiceConfig) {
    move |cfg| {
        cfg.app_data(json_config())
            .app_data(query_config())
            .app_data(path_config())
            .route("/login", web::post().to(users::login))
            .route("/register", web::post().to(users::register))
            .route("/verify-email", web::post().to(users::verify_email))
            .route("/resend-verify-email", web::post().to(users::resend_verify_email))
            .route("/forgot-password", web::post().to(users::forgot_password))
            .route("/change-password", web::post().to(users::change_password))
            .service(
                web::scope("")
                    .wrap(AuthMiddleware::new(jwt_secret))
                    .route("/user", web::get().to(users::get_user))
                    .route("/user", web::post().to(users::update_user))
                    .route("/categories", web::get().to(categories::list))
                    .route("/categories-tree", web::get().to(categories::tree))
                    .route("/category", web::post().to(categories::add))
                    .route("/category/{id}", web::get().to(categories::get))
                    .route("/category/{id}", web::put().to(categories::update))
                    .route("/category/{id}", web::delete().to(categories::delete))
                    .route("/products", web::get().to(products::list))
                    .route("/products/{category_id}", web::get().to(products::under))
                    .route("/product", web::post().to(products::add))
                    .route("/product/{id}", web::get().to(products::get))
                    .route("/product/{id}", web::put().to(products::update))
                    .route("/product/{id}/image", web::post().to(products::update_image))
                    .route("/product/{id}", web::delete().to(products::delete)),
            );
    }
}
