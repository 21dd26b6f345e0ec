use mongodb::{options::ClientOptions, Client};

use crate::config::Settings;
use crate::store::{MongoStore, StoreError};

pub async fn connect(settings: &Settings, database_url: &str) -> Result<MongoStore, StoreError> {
    let client_options = ClientOptions::parse(database_url).await?;
    let client = Client::with_options(client_options)?;

    let db = client.database(&settings.database_name);
    let store = MongoStore::new(client, &db);
    store.ensure_indexes().await?;

    log::info!("connected to MongoDB database `{}`", settings.database_name);
    Ok(store)
}
