use std::sync::Arc;

use actix_web::{web, App, HttpServer};
use chrono::Duration;

use catalog_api::config::{Settings, StoreBackend};
use catalog_api::credentials::TokenConfig;
use catalog_api::db;
use catalog_api::files::LocalFileStore;
use catalog_api::handlers::{self, AppState};
use catalog_api::notifier::LogNotifier;
use catalog_api::store::{MemoryStore, Store};

fn invalid_input(err: impl std::fmt::Display) -> std::io::Error {
    std::io::Error::new(std::io::ErrorKind::InvalidInput, err.to_string())
}

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    dotenv::dotenv().ok();
    env_logger::init();

    let settings = Settings::from_env().map_err(invalid_input)?;

    let store: Arc<dyn Store> = match &settings.backend {
        StoreBackend::Mongo(url) => Arc::new(db::connect(&settings, url).await.map_err(|err| {
            std::io::Error::new(std::io::ErrorKind::Other, err.to_string())
        })?),
        StoreBackend::Memory => {
            log::warn!("using the in-memory store; data is lost on shutdown");
            Arc::new(MemoryStore::new())
        }
    };

    let state = web::Data::new(AppState {
        store,
        files: Arc::new(LocalFileStore::new(settings.storage_dir.clone())),
        notifier: Arc::new(LogNotifier),
        tokens: TokenConfig {
            secret: settings.jwt_secret.clone(),
            ttl: Duration::minutes(settings.token_ttl_minutes),
        },
        public_storage_url: settings.public_storage_url.clone(),
    });

    log::info!("listening on {}", settings.bind_address);
    let jwt_secret = settings.jwt_secret.clone();
    HttpServer::new(move || {
        App::new()
            .app_data(state.clone())
            .configure(handlers::configure(jwt_secret.clone()))
    })
    .bind(&settings.bind_address)?
    .run()
    .await
}
