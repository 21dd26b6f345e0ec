//! Catalog and account backend: users with verified emails and reset codes,
//! a category hierarchy capped at three levels, and products filed under
//! those categories, served as a JSON API.

pub mod config;
pub mod credentials;
pub mod db;
pub mod errors;
pub mod files;
pub mod handlers;
pub mod hierarchy;
pub mod middleware;
pub mod models;
pub mod notifier;
pub mod products;
pub mod response;
pub mod store;
pub mod tree;
