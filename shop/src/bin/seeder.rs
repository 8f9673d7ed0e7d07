use std::error::Error;
use std::sync::Arc;

use anyhow::Context;
use chrono::Utc;
use common::config::Config;
use commerce::executable_utils::initialize_executable;
use shop::schema::ensure_schema;
use shop::seed::{seed_demo_data, SeedReport};
use shop::store::SeaOrmStore;

async fn seed(config: &Config) -> anyhow::Result<SeedReport> {
    let store = SeaOrmStore::connect(&config.common.database_url)
        .await
        .context("Failed to connect to the database")?;
    ensure_schema(store.connection())
        .await
        .context("Failed to create the schema")?;
    let report = seed_demo_data(Arc::new(store), &config.auth, Utc::now())
        .await
        .context("Failed to insert demo data")?;
    Ok(report)
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error + Send + Sync>> {
    println!("Starting seeder...");
    let config = initialize_executable()?;
    let report = seed(&config).await?;
    println!(
        "Seeded {} users, {} categories, {} products, {} coupons, {} badges, {} challenges",
        report.users, report.categories, report.products, report.coupons, report.badges, report.challenges
    );
    Ok(())
}
