use std::error::Error;
use std::sync::Arc;

use commerce::api::{AppState, Storages};
use commerce::executable_utils::{initialize_executable, install_metrics, run_backend};
use shop::schema::ensure_schema;
use shop::store::SeaOrmStore;

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error + Send + Sync>> {
    println!("Starting backend...");
    let config = initialize_executable()?;
    let metrics = install_metrics()?;

    let store = SeaOrmStore::connect(&config.common.database_url).await?;
    ensure_schema(store.connection()).await?;

    let state = AppState::new(Storages::from_store(Arc::new(store)), &config)?;
    run_backend(config.backend, state, metrics).await
}
