//! Table bootstrap straight from the entity definitions.

use sea_orm::sea_query::{Index, IndexCreateStatement};
use sea_orm::{ConnectionTrait, DbErr, EntityTrait, Schema};
use tracing::info;

use crate::entities::*;

/// Tables in dependency order, so a fresh database can be created top-down
/// and truncated bottom-up.
pub const TABLES: &[&str] = &[
    "users",
    "categories",
    "products",
    "product_variants",
    "coupons",
    "orders",
    "order_items",
    "order_tracking",
    "coupon_usages",
    "deliveries",
    "loyalty_accounts",
    "loyalty_transactions",
    "badges",
    "user_badges",
    "challenges",
    "user_challenges",
    "cart_items",
];

async fn create_table<C, E>(db: &C, schema: &Schema, entity: E) -> Result<(), DbErr>
where
    C: ConnectionTrait,
    E: EntityTrait,
{
    let backend = db.get_database_backend();
    let mut statement = schema.create_table_from_entity(entity);
    statement.if_not_exists();
    db.execute(backend.build(&statement)).await?;
    Ok(())
}

async fn create_index<C: ConnectionTrait>(db: &C, statement: IndexCreateStatement) -> Result<(), DbErr> {
    let backend = db.get_database_backend();
    db.execute(backend.build(&statement)).await?;
    Ok(())
}

/// Creates every missing table and lookup index. Safe to run on each start.
pub async fn ensure_schema<C: ConnectionTrait>(db: &C) -> Result<(), DbErr> {
    let schema = Schema::new(db.get_database_backend());

    create_table(db, &schema, user::Entity).await?;
    create_table(db, &schema, category::Entity).await?;
    create_table(db, &schema, product::Entity).await?;
    create_table(db, &schema, product_variant::Entity).await?;
    create_table(db, &schema, coupon::Entity).await?;
    create_table(db, &schema, order::Entity).await?;
    create_table(db, &schema, order_item::Entity).await?;
    create_table(db, &schema, order_tracking::Entity).await?;
    create_table(db, &schema, coupon_usage::Entity).await?;
    create_table(db, &schema, delivery::Entity).await?;
    create_table(db, &schema, loyalty_account::Entity).await?;
    create_table(db, &schema, loyalty_transaction::Entity).await?;
    create_table(db, &schema, badge::Entity).await?;
    create_table(db, &schema, user_badge::Entity).await?;
    create_table(db, &schema, challenge::Entity).await?;
    create_table(db, &schema, user_challenge::Entity).await?;
    create_table(db, &schema, cart_item::Entity).await?;

    create_index(
        db,
        Index::create()
            .if_not_exists()
            .name("idx_orders_user_created")
            .table(order::Entity)
            .col(order::Column::UserId)
            .col(order::Column::CreatedAt)
            .to_owned(),
    )
    .await?;
    create_index(
        db,
        Index::create()
            .if_not_exists()
            .name("idx_coupon_usages_coupon_user")
            .table(coupon_usage::Entity)
            .col(coupon_usage::Column::CouponId)
            .col(coupon_usage::Column::UserId)
            .to_owned(),
    )
    .await?;
    create_index(
        db,
        Index::create()
            .if_not_exists()
            .name("idx_deliveries_driver")
            .table(delivery::Entity)
            .col(delivery::Column::DriverId)
            .to_owned(),
    )
    .await?;
    create_index(
        db,
        Index::create()
            .if_not_exists()
            .name("idx_loyalty_transactions_user")
            .table(loyalty_transaction::Entity)
            .col(loyalty_transaction::Column::UserId)
            .col(loyalty_transaction::Column::CreatedAt)
            .to_owned(),
    )
    .await?;
    create_index(
        db,
        Index::create()
            .if_not_exists()
            .unique()
            .name("idx_user_badges_user_badge")
            .table(user_badge::Entity)
            .col(user_badge::Column::UserId)
            .col(user_badge::Column::BadgeId)
            .to_owned(),
    )
    .await?;
    create_index(
        db,
        Index::create()
            .if_not_exists()
            .name("idx_user_challenges_user_challenge")
            .table(user_challenge::Entity)
            .col(user_challenge::Column::UserId)
            .col(user_challenge::Column::ChallengeId)
            .to_owned(),
    )
    .await?;
    create_index(
        db,
        Index::create()
            .if_not_exists()
            .name("idx_cart_items_user")
            .table(cart_item::Entity)
            .col(cart_item::Column::UserId)
            .to_owned(),
    )
    .await?;

    info!(tables = TABLES.len(), "Schema ready");
    Ok(())
}
