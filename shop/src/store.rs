//! PostgreSQL store on SeaORM.
//!
//! Multi-row operations run in one database transaction. Rows that guard an
//! invariant are taken `FOR UPDATE` first: the order for status changes and
//! coupon application, the coupon for redemption, the loyalty account for
//! balance changes, the user for cart writes and challenge progress. Stock is
//! decremented with a conditional `UPDATE ... WHERE
//! stock >= qty`, so two checkouts can never oversell the last unit.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sea_orm::sea_query::{Expr, Func};
use sea_orm::ActiveValue::Set;
use sea_orm::{
    ActiveEnum, ActiveModelTrait, ColumnTrait, Condition, ConnectionTrait, Database, DatabaseConnection, DbErr, EntityTrait,
    PaginatorTrait, QueryFilter, QueryOrder, QuerySelect, Select, SqlErr, TransactionTrait,
};
use tracing::{debug, info, warn};
use uuid::Uuid;

use commerce::checkout::{apply_coupon_quote, check_quantity, merge_lines, CartLine};
use commerce::coupons::{self, normalize_code, CouponContext, CouponQuote};
use commerce::error::{CommerceError, CommerceResult, CouponRejection};
use commerce::loyalty;
use commerce::model::*;
use commerce::products::ProductEdit;
use commerce::status::{advance_delivery, check_order_transition, check_payment_transition, order_status_for_delivery};
use commerce::storage::{
    check_coupon_target, CartStorage, CatalogStorage, CouponStorage, DeliveryStorage, GamificationStorage, LoyaltyStorage,
    OrderStorage, UserStorage,
};

use crate::entities::*;
use crate::entities::{coupon, delivery, order, user};

#[derive(Clone)]
pub struct SeaOrmStore {
    db: DatabaseConnection,
}

impl SeaOrmStore {
    pub fn new(db: DatabaseConnection) -> Self {
        Self { db }
    }

    pub async fn connect(database_url: &str) -> Result<Self, DbErr> {
        let db = Database::connect(database_url).await?;
        info!("Connected to database");
        Ok(Self::new(db))
    }

    pub fn connection(&self) -> &DatabaseConnection {
        &self.db
    }
}

/// Unique-index violations become conflicts; anything else is a storage error.
fn unique_conflict(error: DbErr, message: impl Into<String>) -> CommerceError {
    match error.sql_err() {
        Some(SqlErr::UniqueConstraintViolation(_)) => CommerceError::conflict(message),
        _ => error.into(),
    }
}

fn contains_pattern(term: &str) -> String {
    format!("%{}%", term.to_lowercase())
}

fn search_term(search: Option<&str>) -> Option<&str> {
    search.map(str::trim).filter(|s| !s.is_empty())
}

fn lower_like<C: ColumnTrait>(column: C, pattern: &str) -> sea_orm::sea_query::SimpleExpr {
    Expr::expr(Func::lower(Expr::col(column))).like(pattern)
}

async fn paged<C, E>(db: &C, select: Select<E>, page: PageRequest) -> CommerceResult<(Vec<E::Model>, u64, PageRequest)>
where
    C: ConnectionTrait,
    E: EntityTrait,
    E::Model: Sync,
{
    let page = page.normalized();
    let total = select.clone().count(db).await?;
    let rows = select.offset(page.offset()).limit(page.limit).all(db).await?;
    Ok((rows, total, page))
}

// ---------------------------------------------------------------------------
// Row loading helpers
// ---------------------------------------------------------------------------

async fn with_variants<C: ConnectionTrait>(db: &C, rows: Vec<product::Model>) -> CommerceResult<Vec<Product>> {
    if rows.is_empty() {
        return Ok(Vec::new());
    }
    let ids: Vec<Uuid> = rows.iter().map(|p| p.id).collect();
    let mut by_product: HashMap<Uuid, Vec<ProductVariant>> = HashMap::new();
    for variant in product_variant::Entity::find()
        .filter(product_variant::Column::ProductId.is_in(ids))
        .order_by_asc(product_variant::Column::Price)
        .all(db)
        .await?
    {
        by_product.entry(variant.product_id).or_default().push(variant.into());
    }
    rows.into_iter()
        .map(|row| {
            let variants = by_product.remove(&row.id).unwrap_or_default();
            row.into_product(variants)
        })
        .collect()
}

async fn with_items<C: ConnectionTrait>(db: &C, rows: Vec<order::Model>) -> CommerceResult<Vec<Order>> {
    if rows.is_empty() {
        return Ok(Vec::new());
    }
    let ids: Vec<Uuid> = rows.iter().map(|o| o.id).collect();
    let mut by_order: HashMap<Uuid, Vec<OrderItem>> = HashMap::new();
    for item in order_item::Entity::find()
        .filter(order_item::Column::OrderId.is_in(ids))
        .order_by_asc(order_item::Column::Name)
        .all(db)
        .await?
    {
        by_order.entry(item.order_id).or_default().push(item.into());
    }
    Ok(rows
        .into_iter()
        .map(|row| {
            let items = by_order.remove(&row.id).unwrap_or_default();
            row.into_order(items)
        })
        .collect())
}

async fn single_order<C: ConnectionTrait>(db: &C, row: order::Model) -> CommerceResult<Order> {
    let id = row.id;
    with_items(db, vec![row])
        .await?
        .pop()
        .ok_or_else(|| CommerceError::not_found(format!("Order {}", id)))
}

async fn lock_order<C: ConnectionTrait>(db: &C, id: Uuid) -> CommerceResult<order::Model> {
    order::Entity::find_by_id(id)
        .lock_exclusive()
        .one(db)
        .await?
        .ok_or_else(|| CommerceError::not_found(format!("Order {}", id)))
}

async fn insert_event<C: ConnectionTrait>(db: &C, event: &OrderTrackingEvent) -> CommerceResult<()> {
    order_tracking::Entity::insert(order_tracking::ActiveModel::from(event))
        .exec_without_returning(db)
        .await?;
    Ok(())
}

/// Takes `direction * quantity` units off (negative) or back onto (positive)
/// each line. Decrements only succeed while enough stock is left.
async fn move_stock<C: ConnectionTrait>(db: &C, items: &[OrderItem], direction: i32, now: DateTime<Utc>) -> CommerceResult<()> {
    for item in items {
        let delta = item.quantity * direction;
        let affected = match item.variant_id {
            Some(variant_id) => {
                let mut update = product_variant::Entity::update_many()
                    .col_expr(
                        product_variant::Column::Stock,
                        Expr::col(product_variant::Column::Stock).add(delta),
                    )
                    .filter(product_variant::Column::Id.eq(variant_id))
                    .filter(product_variant::Column::ProductId.eq(item.product_id));
                if direction < 0 {
                    update = update
                        .filter(product_variant::Column::IsActive.eq(true))
                        .filter(product_variant::Column::Stock.gte(item.quantity));
                }
                update.exec(db).await?.rows_affected
            }
            None => {
                let mut update = product::Entity::update_many()
                    .col_expr(product::Column::Stock, Expr::col(product::Column::Stock).add(delta))
                    .col_expr(product::Column::UpdatedAt, Expr::value(now))
                    .filter(product::Column::Id.eq(item.product_id));
                if direction < 0 {
                    update = update
                        .filter(product::Column::IsActive.eq(true))
                        .filter(product::Column::Stock.gte(item.quantity));
                }
                update.exec(db).await?.rows_affected
            }
        };
        if affected == 0 && direction < 0 {
            return Err(shortfall(db, item).await);
        }
    }
    Ok(())
}

/// Explains why a stock decrement matched no row.
async fn shortfall<C: ConnectionTrait>(db: &C, item: &OrderItem) -> CommerceError {
    let product = match product::Entity::find_by_id(item.product_id).one(db).await {
        Ok(product) => product,
        Err(e) => return e.into(),
    };
    match product {
        Some(p) if p.is_active => match item.variant_id {
            Some(variant_id) => match product_variant::Entity::find_by_id(variant_id).one(db).await {
                Ok(Some(v)) if v.is_active && v.product_id == p.id => CommerceError::InsufficientStock(item.name.clone()),
                Ok(_) => CommerceError::not_found(format!("Variant {}", variant_id)),
                Err(e) => e.into(),
            },
            None => CommerceError::InsufficientStock(item.name.clone()),
        },
        _ => CommerceError::not_found(format!("Product {}", item.product_id)),
    }
}

/// Re-validates the claimed coupon under a row lock and records the
/// redemption. Callers must be inside a transaction.
async fn redeem_claim<C: ConnectionTrait>(
    db: &C,
    claim: &CouponClaim,
    order_id: Uuid,
    subtotal: Decimal,
    product_ids: &[Uuid],
    now: DateTime<Utc>,
) -> CommerceResult<(CouponQuote, CouponUsage)> {
    let row = coupon::Entity::find()
        .filter(coupon::Column::Code.eq(normalize_code(&claim.code)))
        .lock_exclusive()
        .one(db)
        .await?
        .ok_or(CouponRejection::NotFound)?;
    let used = coupon_usage::Entity::find()
        .filter(coupon_usage::Column::CouponId.eq(row.id))
        .filter(coupon_usage::Column::UserId.eq(claim.user_id))
        .count(db)
        .await? as i64;

    let stored = Coupon::try_from(row.clone())?;
    let ctx = CouponContext { subtotal, product_ids, user_usage_count: Some(used) };
    let quote = coupons::validate(&stored, &ctx, now)?;

    let usage = CouponUsage {
        id: Uuid::new_v4(),
        coupon_id: stored.id,
        user_id: claim.user_id,
        order_id,
        discount_amount: quote.discount,
        used_at: now,
    };
    coupon_usage::Entity::insert(coupon_usage::ActiveModel::from(&usage))
        .exec_without_returning(db)
        .await?;

    let mut counters: coupon::ActiveModel = row.into();
    counters.times_used = Set(stored.times_used + 1);
    counters.total_discount = Set(stored.total_discount + usage.discount_amount);
    counters.updated_at = Set(now);
    counters.update(db).await?;

    Ok((quote, usage))
}

async fn cancel_locked<C: ConnectionTrait>(
    db: &C,
    row: order::Model,
    reason: String,
    actor: Option<Uuid>,
    now: DateTime<Utc>,
) -> CommerceResult<Order> {
    check_order_transition(row.status, OrderStatus::Cancelled)?;
    let id = row.id;
    let mut update: order::ActiveModel = row.into();
    update.status = Set(OrderStatus::Cancelled);
    update.cancelled_at = Set(Some(now));
    update.cancel_reason = Set(Some(reason.clone()));
    update.updated_at = Set(now);
    let row = update.update(db).await?;

    let order = single_order(db, row).await?;
    move_stock(db, &order.items, 1, now).await?;
    delivery::Entity::update_many()
        .col_expr(delivery::Column::Status, Expr::value(DeliveryStatus::Failed.to_value()))
        .col_expr(delivery::Column::UpdatedAt, Expr::value(now))
        .filter(delivery::Column::OrderId.eq(id))
        .filter(delivery::Column::Status.is_not_in([DeliveryStatus::Delivered, DeliveryStatus::Failed]))
        .exec(db)
        .await?;
    insert_event(
        db,
        &OrderTrackingEvent::new(id, OrderStatus::Cancelled, format!("Order cancelled: {}", reason), actor, now),
    )
    .await?;
    Ok(order)
}

/// Any order move except cancellation, on a row the caller has locked.
async fn advance_locked<C: ConnectionTrait>(
    db: &C,
    row: order::Model,
    to: OrderStatus,
    note: Option<String>,
    actor: Option<Uuid>,
    now: DateTime<Utc>,
) -> CommerceResult<Order> {
    check_order_transition(row.status, to)?;
    let id = row.id;
    let mut update: order::ActiveModel = row.into();
    update.status = Set(to);
    update.updated_at = Set(now);
    if to == OrderStatus::Delivered {
        update.delivered_at = Set(Some(now));
    }
    let row = update.update(db).await?;
    insert_event(
        db,
        &OrderTrackingEvent::new(id, to, note.unwrap_or_else(|| to.description().to_string()), actor, now),
    )
    .await?;
    single_order(db, row).await
}

// ---------------------------------------------------------------------------
// Query builders
// ---------------------------------------------------------------------------

fn product_query(filter: &ProductFilter) -> Select<product::Entity> {
    let mut query = product::Entity::find();
    if let Some(category_id) = filter.category_id {
        query = query.filter(product::Column::CategoryId.eq(category_id));
    }
    if let Some(active) = filter.is_active {
        query = query.filter(product::Column::IsActive.eq(active));
    }
    if let Some(featured) = filter.featured {
        query = query.filter(product::Column::IsFeatured.eq(featured));
    }
    if let Some(min) = filter.min_price {
        query = query.filter(product::Column::Price.gte(min));
    }
    if let Some(max) = filter.max_price {
        query = query.filter(product::Column::Price.lte(max));
    }
    if let Some(term) = search_term(filter.search.as_deref()) {
        let pattern = contains_pattern(term);
        query = query.filter(
            Condition::any()
                .add(lower_like(product::Column::Name, &pattern))
                .add(lower_like(product::Column::Sku, &pattern))
                .add(lower_like(product::Column::Description, &pattern)),
        );
    }
    match filter.sort {
        ProductSort::Newest => query.order_by_desc(product::Column::CreatedAt),
        ProductSort::PriceAsc => query.order_by_asc(product::Column::Price),
        ProductSort::PriceDesc => query.order_by_desc(product::Column::Price),
        ProductSort::Name => query.order_by_asc(product::Column::Name),
    }
}

fn order_query(filter: &OrderFilter) -> Select<order::Entity> {
    let mut query = order::Entity::find();
    if let Some(user_id) = filter.user_id {
        query = query.filter(order::Column::UserId.eq(user_id));
    }
    if let Some(status) = filter.status {
        query = query.filter(order::Column::Status.eq(status));
    }
    if let Some(payment_status) = filter.payment_status {
        query = query.filter(order::Column::PaymentStatus.eq(payment_status));
    }
    if let Some(from) = filter.from {
        query = query.filter(order::Column::CreatedAt.gte(from));
    }
    if let Some(to) = filter.to {
        query = query.filter(order::Column::CreatedAt.lte(to));
    }
    if let Some(term) = search_term(filter.search.as_deref()) {
        query = query.filter(
            Expr::expr(Func::upper(Expr::col(order::Column::OrderNumber))).like(format!("%{}%", term.to_uppercase())),
        );
    }
    query.order_by_desc(order::Column::CreatedAt)
}

fn coupon_query(filter: &CouponFilter) -> Select<coupon::Entity> {
    let mut query = coupon::Entity::find();
    if let Some(coupon_type) = filter.coupon_type {
        query = query.filter(coupon::Column::CouponType.eq(coupon_type));
    }
    if let Some(active) = filter.is_active {
        query = query.filter(coupon::Column::IsActive.eq(active));
    }
    if let Some(term) = search_term(filter.search.as_deref()) {
        let pattern = contains_pattern(term);
        query = query.filter(
            Condition::any()
                .add(lower_like(coupon::Column::Code, &pattern))
                .add(lower_like(coupon::Column::Name, &pattern)),
        );
    }
    query.order_by_desc(coupon::Column::CreatedAt)
}

fn user_query(filter: &UserFilter) -> Select<user::Entity> {
    let mut query = user::Entity::find();
    if let Some(role) = filter.role {
        query = query.filter(user::Column::Role.eq(role));
    }
    if let Some(active) = filter.is_active {
        query = query.filter(user::Column::IsActive.eq(active));
    }
    if let Some(term) = search_term(filter.search.as_deref()) {
        let pattern = contains_pattern(term);
        query = query.filter(
            Condition::any()
                .add(lower_like(user::Column::Email, &pattern))
                .add(lower_like(user::Column::FirstName, &pattern))
                .add(lower_like(user::Column::LastName, &pattern)),
        );
    }
    query.order_by_desc(user::Column::CreatedAt)
}

// ---------------------------------------------------------------------------
// Catalog
// ---------------------------------------------------------------------------

impl SeaOrmStore {
    async fn check_product_uniqueness<C: ConnectionTrait>(db: &C, p: &Product) -> CommerceResult<()> {
        if category::Entity::find_by_id(p.category_id).one(db).await?.is_none() {
            return Err(CommerceError::validation(format!("Category {} does not exist", p.category_id)));
        }
        let clash = product::Entity::find()
            .filter(product::Column::Id.ne(p.id))
            .filter(
                Condition::any()
                    .add(product::Column::Slug.eq(p.slug.as_str()))
                    .add(product::Column::Sku.eq(p.sku.as_str())),
            )
            .one(db)
            .await?;
        match clash {
            Some(other) if other.slug == p.slug => {
                Err(CommerceError::conflict(format!("Product slug '{}' already exists", p.slug)))
            }
            Some(_) => Err(CommerceError::conflict(format!("Product SKU '{}' already exists", p.sku))),
            None => Ok(()),
        }
    }

    async fn insert_variants<C: ConnectionTrait>(db: &C, variants: &[ProductVariant]) -> CommerceResult<()> {
        if !variants.is_empty() {
            product_variant::Entity::insert_many(variants.iter().map(product_variant::ActiveModel::from))
                .exec_without_returning(db)
                .await?;
        }
        Ok(())
    }

    /// Writes only the variants an edit touched.
    async fn sync_variants<C: ConnectionTrait>(db: &C, before: &[ProductVariant], after: &[ProductVariant]) -> CommerceResult<()> {
        let removed: Vec<Uuid> = before
            .iter()
            .filter(|old| !after.iter().any(|v| v.id == old.id))
            .map(|old| old.id)
            .collect();
        if !removed.is_empty() {
            product_variant::Entity::delete_many()
                .filter(product_variant::Column::Id.is_in(removed))
                .exec(db)
                .await?;
        }
        let mut added = Vec::new();
        for variant in after {
            match before.iter().find(|old| old.id == variant.id) {
                Some(old) if old == variant => {}
                Some(_) => {
                    product_variant::ActiveModel::from(variant).update(db).await?;
                }
                None => added.push(variant.clone()),
            }
        }
        Self::insert_variants(db, &added).await
    }
}

#[async_trait]
impl CatalogStorage for SeaOrmStore {
    async fn list_categories(&self, include_inactive: bool) -> CommerceResult<Vec<Category>> {
        let mut query = category::Entity::find();
        if !include_inactive {
            query = query.filter(category::Column::IsActive.eq(true));
        }
        let rows = query
            .order_by_asc(category::Column::SortOrder)
            .order_by_asc(category::Column::Name)
            .all(&self.db)
            .await?;
        Ok(rows.into_iter().map(Category::from).collect())
    }

    async fn find_category(&self, id_or_slug: &str) -> CommerceResult<Option<Category>> {
        let query = match Uuid::parse_str(id_or_slug) {
            Ok(id) => category::Entity::find_by_id(id),
            Err(_) => category::Entity::find().filter(category::Column::Slug.eq(id_or_slug)),
        };
        Ok(query.one(&self.db).await?.map(Category::from))
    }

    async fn create_category(&self, c: &Category) -> CommerceResult<()> {
        let message = format!("Category slug '{}' already exists", c.slug);
        let taken = category::Entity::find()
            .filter(category::Column::Slug.eq(c.slug.as_str()))
            .count(&self.db)
            .await?;
        if taken > 0 {
            return Err(CommerceError::conflict(message));
        }
        category::Entity::insert(category::ActiveModel::from(c))
            .exec_without_returning(&self.db)
            .await
            .map_err(|e| unique_conflict(e, message))?;
        Ok(())
    }

    async fn update_category(&self, c: &Category) -> CommerceResult<()> {
        let message = format!("Category slug '{}' already exists", c.slug);
        let taken = category::Entity::find()
            .filter(category::Column::Slug.eq(c.slug.as_str()))
            .filter(category::Column::Id.ne(c.id))
            .count(&self.db)
            .await?;
        if taken > 0 {
            return Err(CommerceError::conflict(message));
        }
        category::ActiveModel::from(c)
            .update(&self.db)
            .await
            .map_err(|e| match e {
                DbErr::RecordNotUpdated => CommerceError::not_found(format!("Category {}", c.id)),
                other => unique_conflict(other, message),
            })?;
        Ok(())
    }

    async fn delete_category(&self, id: Uuid) -> CommerceResult<()> {
        let txn = self.db.begin().await?;
        if category::Entity::find_by_id(id).lock_exclusive().one(&txn).await?.is_none() {
            return Err(CommerceError::not_found(format!("Category {}", id)));
        }
        let in_use = product::Entity::find()
            .filter(product::Column::CategoryId.eq(id))
            .count(&txn)
            .await?;
        if in_use > 0 {
            return Err(CommerceError::conflict(format!("Category has {} products", in_use)));
        }
        category::Entity::delete_by_id(id).exec(&txn).await?;
        txn.commit().await?;
        Ok(())
    }

    async fn list_products(&self, filter: &ProductFilter, page: PageRequest) -> CommerceResult<Page<Product>> {
        let (rows, total, page) = paged(&self.db, product_query(filter), page).await?;
        let items = with_variants(&self.db, rows).await?;
        Ok(Page::new(items, total, page))
    }

    async fn all_products(&self) -> CommerceResult<Vec<Product>> {
        let rows = product::Entity::find()
            .order_by_asc(product::Column::Name)
            .all(&self.db)
            .await?;
        with_variants(&self.db, rows).await
    }

    async fn find_product(&self, id_or_slug: &str) -> CommerceResult<Option<Product>> {
        let query = match Uuid::parse_str(id_or_slug) {
            Ok(id) => product::Entity::find_by_id(id),
            Err(_) => product::Entity::find().filter(product::Column::Slug.eq(id_or_slug)),
        };
        let rows: Vec<product::Model> = query.one(&self.db).await?.into_iter().collect();
        Ok(with_variants(&self.db, rows).await?.pop())
    }

    async fn products_by_ids(&self, ids: &[Uuid]) -> CommerceResult<Vec<Product>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let rows = product::Entity::find()
            .filter(product::Column::Id.is_in(ids.iter().copied()))
            .all(&self.db)
            .await?;
        with_variants(&self.db, rows).await
    }

    async fn create_product(&self, p: &Product) -> CommerceResult<()> {
        let txn = self.db.begin().await?;
        Self::check_product_uniqueness(&txn, p).await?;
        product::Entity::insert(product::ActiveModel::from(p))
            .exec_without_returning(&txn)
            .await
            .map_err(|e| unique_conflict(e, format!("Product '{}' already exists", p.slug)))?;
        Self::insert_variants(&txn, &p.variants).await?;
        txn.commit().await?;
        Ok(())
    }

    async fn edit_product(&self, id: Uuid, edit: ProductEdit, now: DateTime<Utc>) -> CommerceResult<Product> {
        let txn = self.db.begin().await?;
        let row = product::Entity::find_by_id(id)
            .lock_exclusive()
            .one(&txn)
            .await?
            .ok_or_else(|| CommerceError::not_found(format!("Product {}", id)))?;
        // Variant stock moves without touching the product row, so hold those too.
        product_variant::Entity::find()
            .filter(product_variant::Column::ProductId.eq(id))
            .lock_exclusive()
            .all(&txn)
            .await?;
        let before = with_variants(&txn, vec![row])
            .await?
            .pop()
            .ok_or_else(|| CommerceError::not_found(format!("Product {}", id)))?;

        let mut product = before.clone();
        edit.apply(&mut product, now)?;
        Self::check_product_uniqueness(&txn, &product).await?;
        product::ActiveModel::from(&product)
            .update(&txn)
            .await
            .map_err(|e| unique_conflict(e, format!("Product '{}' already exists", product.slug)))?;
        Self::sync_variants(&txn, &before.variants, &product.variants).await?;
        txn.commit().await?;
        Ok(product)
    }
}

// ---------------------------------------------------------------------------
// Orders
// ---------------------------------------------------------------------------

#[async_trait]
impl OrderStorage for SeaOrmStore {
    async fn place_order(&self, new_order: NewOrder) -> CommerceResult<Order> {
        let now = new_order.created_at;
        let txn = self.db.begin().await?;

        move_stock(&txn, &new_order.items, -1, now).await?;

        let redemption = match &new_order.coupon {
            Some(claim) => {
                let product_ids: Vec<Uuid> = new_order.items.iter().map(|i| i.product_id).collect();
                Some(redeem_claim(&txn, claim, new_order.id, new_order.totals.subtotal, &product_ids, now).await?)
            }
            None => None,
        };
        let (totals, coupon_id) = match &redemption {
            Some((quote, _)) => (apply_coupon_quote(new_order.totals, quote), Some(quote.coupon_id)),
            None => (new_order.totals, None),
        };

        let order = new_order.into_order(totals, coupon_id);
        order::Entity::insert(order::ActiveModel::from(&order))
            .exec_without_returning(&txn)
            .await
            .map_err(|e| unique_conflict(e, format!("Order number {} already exists", order.order_number)))?;
        order_item::Entity::insert_many(order.items.iter().map(order_item::ActiveModel::from))
            .exec_without_returning(&txn)
            .await?;
        insert_event(
            &txn,
            &OrderTrackingEvent::new(
                order.id,
                OrderStatus::Pending,
                OrderStatus::Pending.description(),
                Some(order.user_id),
                now,
            ),
        )
        .await?;

        txn.commit().await?;
        debug!(order_id = %order.id, lines = order.items.len(), "Order persisted");
        Ok(order)
    }

    async fn get_order(&self, id: Uuid) -> CommerceResult<Option<Order>> {
        match order::Entity::find_by_id(id).one(&self.db).await? {
            Some(row) => Ok(Some(single_order(&self.db, row).await?)),
            None => Ok(None),
        }
    }

    async fn list_orders(&self, filter: &OrderFilter, page: PageRequest) -> CommerceResult<Page<Order>> {
        let (rows, total, page) = paged(&self.db, order_query(filter), page).await?;
        let items = with_items(&self.db, rows).await?;
        Ok(Page::new(items, total, page))
    }

    async fn find_orders(&self, filter: &OrderFilter) -> CommerceResult<Vec<Order>> {
        let rows = order_query(filter).all(&self.db).await?;
        with_items(&self.db, rows).await
    }

    async fn transition_order(
        &self,
        id: Uuid,
        to: OrderStatus,
        note: Option<String>,
        actor: Option<Uuid>,
        now: DateTime<Utc>,
    ) -> CommerceResult<Order> {
        let txn = self.db.begin().await?;
        let row = lock_order(&txn, id).await?;

        let order = if to == OrderStatus::Cancelled {
            let reason = note.unwrap_or_else(|| "Cancelled by staff".to_string());
            cancel_locked(&txn, row, reason, actor, now).await?
        } else {
            advance_locked(&txn, row, to, note, actor, now).await?
        };

        txn.commit().await?;
        Ok(order)
    }

    async fn cancel_order(&self, id: Uuid, reason: String, actor: Option<Uuid>, now: DateTime<Utc>) -> CommerceResult<Order> {
        let txn = self.db.begin().await?;
        let row = lock_order(&txn, id).await?;
        let order = cancel_locked(&txn, row, reason, actor, now).await?;
        txn.commit().await?;
        Ok(order)
    }

    async fn update_payment_status(&self, id: Uuid, to: PaymentStatus, now: DateTime<Utc>) -> CommerceResult<Order> {
        let txn = self.db.begin().await?;
        let row = lock_order(&txn, id).await?;
        check_payment_transition(row.payment_status, to)?;

        let mut update: order::ActiveModel = row.into();
        update.payment_status = Set(to);
        update.updated_at = Set(now);
        if to == PaymentStatus::Paid {
            update.paid_at = Set(Some(now));
        }
        let row = update.update(&txn).await?;
        let order = single_order(&txn, row).await?;
        txn.commit().await?;
        Ok(order)
    }

    async fn apply_coupon(&self, order_id: Uuid, claim: &CouponClaim, now: DateTime<Utc>) -> CommerceResult<(Order, CouponUsage)> {
        let txn = self.db.begin().await?;
        let row = lock_order(&txn, order_id).await?;
        if row.user_id != claim.user_id {
            return Err(CommerceError::not_found(format!("Order {}", order_id)));
        }
        let order = single_order(&txn, row.clone()).await?;
        check_coupon_target(&order)?;

        let (quote, usage) =
            redeem_claim(&txn, claim, order_id, order.totals.subtotal, &order.product_ids(), now).await?;
        let totals = apply_coupon_quote(order.totals, &quote);

        let mut update: order::ActiveModel = row.into();
        update.discount = Set(totals.discount);
        update.shipping = Set(totals.shipping);
        update.total = Set(totals.total);
        update.coupon_id = Set(Some(quote.coupon_id));
        update.updated_at = Set(now);
        let row = update.update(&txn).await?;

        let order = row.into_order(order.items);
        txn.commit().await?;
        Ok((order, usage))
    }

    async fn tracking_events(&self, order_id: Uuid) -> CommerceResult<Vec<OrderTrackingEvent>> {
        let rows = order_tracking::Entity::find()
            .filter(order_tracking::Column::OrderId.eq(order_id))
            .order_by_asc(order_tracking::Column::CreatedAt)
            .all(&self.db)
            .await?;
        Ok(rows.into_iter().map(OrderTrackingEvent::from).collect())
    }
}

// ---------------------------------------------------------------------------
// Coupons
// ---------------------------------------------------------------------------

fn coupons_from(rows: Vec<coupon::Model>) -> CommerceResult<Vec<Coupon>> {
    rows.into_iter().map(Coupon::try_from).collect()
}

#[async_trait]
impl CouponStorage for SeaOrmStore {
    async fn create_coupon(&self, c: &Coupon) -> CommerceResult<()> {
        let message = format!("Coupon code '{}' already exists", c.code);
        let taken = coupon::Entity::find()
            .filter(coupon::Column::Code.eq(c.code.as_str()))
            .count(&self.db)
            .await?;
        if taken > 0 {
            return Err(CommerceError::conflict(message));
        }
        coupon::Entity::insert(coupon::ActiveModel::from(c))
            .exec_without_returning(&self.db)
            .await
            .map_err(|e| unique_conflict(e, message))?;
        Ok(())
    }

    async fn update_coupon(&self, c: &Coupon) -> CommerceResult<()> {
        let txn = self.db.begin().await?;
        let stored = coupon::Entity::find_by_id(c.id)
            .lock_exclusive()
            .one(&txn)
            .await?
            .ok_or_else(|| CommerceError::not_found(format!("Coupon {}", c.id)))?;

        // Counters belong to redemptions, never to admin edits.
        let mut update = coupon::ActiveModel::from(c);
        update.times_used = Set(stored.times_used);
        update.total_discount = Set(stored.total_discount);
        update
            .update(&txn)
            .await
            .map_err(|e| unique_conflict(e, format!("Coupon code '{}' already exists", c.code)))?;
        txn.commit().await?;
        Ok(())
    }

    async fn delete_coupon(&self, id: Uuid) -> CommerceResult<()> {
        let txn = self.db.begin().await?;
        if coupon::Entity::find_by_id(id).lock_exclusive().one(&txn).await?.is_none() {
            return Err(CommerceError::not_found(format!("Coupon {}", id)));
        }
        let redeemed = coupon_usage::Entity::find()
            .filter(coupon_usage::Column::CouponId.eq(id))
            .count(&txn)
            .await?;
        if redeemed > 0 {
            return Err(CommerceError::conflict("Coupon has been redeemed; deactivate it instead"));
        }
        coupon::Entity::delete_by_id(id).exec(&txn).await?;
        txn.commit().await?;
        Ok(())
    }

    async fn get_coupon(&self, id: Uuid) -> CommerceResult<Option<Coupon>> {
        coupon::Entity::find_by_id(id)
            .one(&self.db)
            .await?
            .map(Coupon::try_from)
            .transpose()
    }

    async fn find_coupon_by_code(&self, code: &str) -> CommerceResult<Option<Coupon>> {
        coupon::Entity::find()
            .filter(coupon::Column::Code.eq(normalize_code(code)))
            .one(&self.db)
            .await?
            .map(Coupon::try_from)
            .transpose()
    }

    async fn list_coupons(&self, filter: &CouponFilter, page: PageRequest) -> CommerceResult<Page<Coupon>> {
        let (rows, total, page) = paged(&self.db, coupon_query(filter), page).await?;
        Ok(Page::new(coupons_from(rows)?, total, page))
    }

    async fn all_coupons(&self) -> CommerceResult<Vec<Coupon>> {
        let rows = coupon::Entity::find()
            .order_by_asc(coupon::Column::Code)
            .all(&self.db)
            .await?;
        coupons_from(rows)
    }

    async fn count_user_usages(&self, coupon_id: Uuid, user_id: Uuid) -> CommerceResult<i64> {
        let count = coupon_usage::Entity::find()
            .filter(coupon_usage::Column::CouponId.eq(coupon_id))
            .filter(coupon_usage::Column::UserId.eq(user_id))
            .count(&self.db)
            .await?;
        Ok(count as i64)
    }

    async fn user_usages(&self, user_id: Uuid) -> CommerceResult<Vec<CouponUsage>> {
        let rows = coupon_usage::Entity::find()
            .filter(coupon_usage::Column::UserId.eq(user_id))
            .order_by_desc(coupon_usage::Column::UsedAt)
            .all(&self.db)
            .await?;
        Ok(rows.into_iter().map(CouponUsage::from).collect())
    }
}

// ---------------------------------------------------------------------------
// Deliveries
// ---------------------------------------------------------------------------

#[async_trait]
impl DeliveryStorage for SeaOrmStore {
    async fn create_delivery(&self, d: &Delivery) -> CommerceResult<()> {
        let txn = self.db.begin().await?;
        // Serializes concurrent assignments of the same order.
        lock_order(&txn, d.order_id).await?;
        let open = delivery::Entity::find()
            .filter(delivery::Column::OrderId.eq(d.order_id))
            .filter(delivery::Column::Status.is_not_in([DeliveryStatus::Delivered, DeliveryStatus::Failed]))
            .count(&txn)
            .await?;
        if open > 0 {
            return Err(CommerceError::conflict("Order already has an open delivery"));
        }
        delivery::Entity::insert(delivery::ActiveModel::from(d))
            .exec_without_returning(&txn)
            .await?;
        txn.commit().await?;
        Ok(())
    }

    async fn get_delivery(&self, id: Uuid) -> CommerceResult<Option<Delivery>> {
        Ok(delivery::Entity::find_by_id(id).one(&self.db).await?.map(Delivery::from))
    }

    async fn latest_delivery_for_order(&self, order_id: Uuid) -> CommerceResult<Option<Delivery>> {
        Ok(delivery::Entity::find()
            .filter(delivery::Column::OrderId.eq(order_id))
            .order_by_desc(delivery::Column::CreatedAt)
            .one(&self.db)
            .await?
            .map(Delivery::from))
    }

    async fn list_deliveries(&self, driver_id: Uuid, status: Option<DeliveryStatus>) -> CommerceResult<Vec<Delivery>> {
        let mut query = delivery::Entity::find().filter(delivery::Column::DriverId.eq(driver_id));
        if let Some(status) = status {
            query = query.filter(delivery::Column::Status.eq(status));
        }
        let rows = query.order_by_desc(delivery::Column::CreatedAt).all(&self.db).await?;
        Ok(rows.into_iter().map(Delivery::from).collect())
    }

    async fn transition_delivery(
        &self,
        id: Uuid,
        driver_id: Uuid,
        to: DeliveryStatus,
        notes: Option<String>,
        now: DateTime<Utc>,
    ) -> CommerceResult<DeliveryProgress> {
        let missing = || CommerceError::not_found(format!("Delivery {}", id));
        let txn = self.db.begin().await?;
        let order_id = delivery::Entity::find_by_id(id)
            .one(&txn)
            .await?
            .filter(|d| d.driver_id == driver_id)
            .map(|d| d.order_id)
            .ok_or_else(missing)?;
        // Order before delivery, the same order cancellation takes them in.
        let order_row = lock_order(&txn, order_id).await?;
        let row = delivery::Entity::find_by_id(id)
            .lock_exclusive()
            .one(&txn)
            .await?
            .ok_or_else(missing)?;

        let mut delivery = Delivery::from(row);
        advance_delivery(&mut delivery, to, notes, now)?;
        delivery::ActiveModel::from(&delivery).update(&txn).await?;

        let (order, order_changed) = match order_status_for_delivery(to, order_row.status) {
            Some(target) => (advance_locked(&txn, order_row, target, None, Some(driver_id), now).await?, true),
            None => (single_order(&txn, order_row).await?, false),
        };
        txn.commit().await?;
        Ok(DeliveryProgress { delivery, order, order_changed })
    }

    async fn record_location(&self, id: Uuid, driver_id: Uuid, point: GeoPoint, now: DateTime<Utc>) -> CommerceResult<Delivery> {
        let written = delivery::Entity::update_many()
            .col_expr(delivery::Column::Latitude, Expr::value(point.latitude))
            .col_expr(delivery::Column::Longitude, Expr::value(point.longitude))
            .col_expr(delivery::Column::LocationUpdatedAt, Expr::value(now))
            .col_expr(delivery::Column::UpdatedAt, Expr::value(now))
            .filter(delivery::Column::Id.eq(id))
            .filter(delivery::Column::DriverId.eq(driver_id))
            .filter(delivery::Column::Status.is_not_in([DeliveryStatus::Delivered, DeliveryStatus::Failed]))
            .exec(&self.db)
            .await?
            .rows_affected;
        let row = delivery::Entity::find_by_id(id)
            .one(&self.db)
            .await?
            .filter(|d| d.driver_id == driver_id)
            .ok_or_else(|| CommerceError::not_found(format!("Delivery {}", id)))?;
        if written == 0 {
            return Err(CommerceError::validation(format!("Delivery is already {}", row.status)));
        }
        Ok(Delivery::from(row))
    }

    async fn rate_delivery(&self, id: Uuid, rating: i16, now: DateTime<Utc>) -> CommerceResult<Delivery> {
        let written = delivery::Entity::update_many()
            .col_expr(delivery::Column::Rating, Expr::value(rating))
            .col_expr(delivery::Column::UpdatedAt, Expr::value(now))
            .filter(delivery::Column::Id.eq(id))
            .filter(delivery::Column::Status.eq(DeliveryStatus::Delivered))
            .filter(delivery::Column::Rating.is_null())
            .exec(&self.db)
            .await?
            .rows_affected;
        let row = delivery::Entity::find_by_id(id)
            .one(&self.db)
            .await?
            .ok_or_else(|| CommerceError::not_found(format!("Delivery {}", id)))?;
        match (written, row.status) {
            (0, DeliveryStatus::Delivered) => Err(CommerceError::conflict("Delivery already rated")),
            (0, _) => Err(CommerceError::validation("Only delivered orders can be rated")),
            _ => Ok(Delivery::from(row)),
        }
    }
}

// ---------------------------------------------------------------------------
// Users
// ---------------------------------------------------------------------------

#[async_trait]
impl UserStorage for SeaOrmStore {
    async fn create_user(&self, u: &User) -> CommerceResult<()> {
        if self.find_user_by_email(&u.email).await?.is_some() {
            return Err(CommerceError::conflict("Email is already registered"));
        }
        user::Entity::insert(user::ActiveModel::from(u))
            .exec_without_returning(&self.db)
            .await
            .map_err(|e| unique_conflict(e, "Email is already registered"))?;
        Ok(())
    }

    async fn get_user(&self, id: Uuid) -> CommerceResult<Option<User>> {
        Ok(user::Entity::find_by_id(id).one(&self.db).await?.map(User::from))
    }

    async fn find_user_by_email(&self, email: &str) -> CommerceResult<Option<User>> {
        Ok(user::Entity::find()
            .filter(user::Column::Email.eq(email.trim().to_lowercase()))
            .one(&self.db)
            .await?
            .map(User::from))
    }

    async fn list_users(&self, filter: &UserFilter, page: PageRequest) -> CommerceResult<Page<User>> {
        let (rows, total, page) = paged(&self.db, user_query(filter), page).await?;
        Ok(Page::new(rows.into_iter().map(User::from).collect(), total, page))
    }

    async fn users_by_ids(&self, ids: &[Uuid]) -> CommerceResult<Vec<User>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let rows = user::Entity::find()
            .filter(user::Column::Id.is_in(ids.iter().copied()))
            .all(&self.db)
            .await?;
        Ok(rows.into_iter().map(User::from).collect())
    }

    async fn update_user(&self, u: &User) -> CommerceResult<()> {
        user::ActiveModel::from(u)
            .update(&self.db)
            .await
            .map_err(|e| match e {
                DbErr::RecordNotUpdated => CommerceError::not_found(format!("User {}", u.id)),
                other => unique_conflict(other, "Email is already registered"),
            })?;
        Ok(())
    }

    async fn count_users(&self, role: Option<UserRole>) -> CommerceResult<u64> {
        let mut query = user::Entity::find();
        if let Some(role) = role {
            query = query.filter(user::Column::Role.eq(role));
        }
        Ok(query.count(&self.db).await?)
    }
}

// ---------------------------------------------------------------------------
// Loyalty
// ---------------------------------------------------------------------------

#[async_trait]
impl LoyaltyStorage for SeaOrmStore {
    async fn get_account(&self, user_id: Uuid) -> CommerceResult<Option<LoyaltyAccount>> {
        Ok(loyalty_account::Entity::find_by_id(user_id)
            .one(&self.db)
            .await?
            .map(LoyaltyAccount::from))
    }

    async fn record_points(
        &self,
        user_id: Uuid,
        change: &PointsChange,
        now: DateTime<Utc>,
    ) -> CommerceResult<(LoyaltyAccount, LoyaltyTransaction)> {
        let txn = self.db.begin().await?;
        let stored = loyalty_account::Entity::find_by_id(user_id)
            .lock_exclusive()
            .one(&txn)
            .await?;

        if let PointsChange::Earn { order_id: Some(order_id), .. } = change {
            let already = loyalty_transaction::Entity::find()
                .filter(loyalty_transaction::Column::UserId.eq(user_id))
                .filter(loyalty_transaction::Column::OrderId.eq(*order_id))
                .filter(loyalty_transaction::Column::Kind.eq(LoyaltyTransactionKind::Earned))
                .count(&txn)
                .await?;
            if already > 0 {
                warn!(user_id = %user_id, order_id = %order_id, "Duplicate points award refused");
                return Err(CommerceError::conflict(format!("Points for order {} already awarded", order_id)));
            }
        }

        let exists = stored.is_some();
        let mut account = stored
            .map(LoyaltyAccount::from)
            .unwrap_or_else(|| LoyaltyAccount::new(user_id, now));
        let transaction = loyalty::apply_change(&mut account, change, now)?;

        let row = loyalty_account::ActiveModel::from(&account);
        if exists {
            row.update(&txn).await?;
        } else {
            loyalty_account::Entity::insert(row).exec_without_returning(&txn).await?;
        }
        loyalty_transaction::Entity::insert(loyalty_transaction::ActiveModel::from(&transaction))
            .exec_without_returning(&txn)
            .await?;
        txn.commit().await?;
        Ok((account, transaction))
    }

    async fn list_transactions(&self, user_id: Uuid, page: PageRequest) -> CommerceResult<Page<LoyaltyTransaction>> {
        let query = loyalty_transaction::Entity::find()
            .filter(loyalty_transaction::Column::UserId.eq(user_id))
            .order_by_desc(loyalty_transaction::Column::CreatedAt);
        let (rows, total, page) = paged(&self.db, query, page).await?;
        Ok(Page::new(rows.into_iter().map(LoyaltyTransaction::from).collect(), total, page))
    }
}

// ---------------------------------------------------------------------------
// Badges and challenges
// ---------------------------------------------------------------------------

/// Serializes writes that belong to one user. Missing users lock nothing.
async fn lock_user<C: ConnectionTrait>(db: &C, user_id: Uuid) -> CommerceResult<()> {
    user::Entity::find_by_id(user_id).lock_exclusive().one(db).await?;
    Ok(())
}

#[async_trait]
impl GamificationStorage for SeaOrmStore {
    async fn create_badge(&self, b: &Badge) -> CommerceResult<()> {
        let message = format!("Badge '{}' already exists", b.code);
        badge::Entity::insert(badge::ActiveModel::from(b))
            .exec_without_returning(&self.db)
            .await
            .map_err(|e| unique_conflict(e, message))?;
        Ok(())
    }

    async fn list_badges(&self, include_secret: bool) -> CommerceResult<Vec<Badge>> {
        let mut query = badge::Entity::find().filter(badge::Column::IsActive.eq(true));
        if !include_secret {
            query = query.filter(badge::Column::IsSecret.eq(false));
        }
        let mut badges: Vec<Badge> = query.all(&self.db).await?.into_iter().map(Badge::from).collect();
        // Rarity is stored by name, so its order is applied here.
        badges.sort_by(|a, b| {
            a.sort_order
                .cmp(&b.sort_order)
                .then_with(|| a.rarity.cmp(&b.rarity))
                .then_with(|| a.code.cmp(&b.code))
        });
        Ok(badges)
    }

    async fn user_badges(&self, user_id: Uuid) -> CommerceResult<Vec<UserBadge>> {
        Ok(user_badge::Entity::find()
            .filter(user_badge::Column::UserId.eq(user_id))
            .order_by_desc(user_badge::Column::EarnedAt)
            .all(&self.db)
            .await?
            .into_iter()
            .map(UserBadge::from)
            .collect())
    }

    async fn award_badge(&self, user_id: Uuid, badge_id: Uuid, now: DateTime<Utc>) -> CommerceResult<Option<UserBadge>> {
        if badge::Entity::find_by_id(badge_id).one(&self.db).await?.is_none() {
            return Err(CommerceError::not_found(format!("Badge {}", badge_id)));
        }
        let earned = UserBadge::new(user_id, badge_id, now);
        match user_badge::Entity::insert(user_badge::ActiveModel::from(&earned))
            .exec_without_returning(&self.db)
            .await
        {
            Ok(_) => Ok(Some(earned)),
            Err(e) if matches!(e.sql_err(), Some(SqlErr::UniqueConstraintViolation(_))) => {
                debug!(user_id = %user_id, badge_id = %badge_id, "Badge already held");
                Ok(None)
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn mark_badges_viewed(&self, user_id: Uuid, now: DateTime<Utc>) -> CommerceResult<u64> {
        Ok(user_badge::Entity::update_many()
            .col_expr(user_badge::Column::IsNew, Expr::value(false))
            .col_expr(user_badge::Column::ViewedAt, Expr::value(now))
            .filter(user_badge::Column::UserId.eq(user_id))
            .filter(user_badge::Column::IsNew.eq(true))
            .exec(&self.db)
            .await?
            .rows_affected)
    }

    async fn create_challenge(&self, c: &Challenge) -> CommerceResult<()> {
        let message = format!("Challenge '{}' already exists", c.code);
        challenge::Entity::insert(challenge::ActiveModel::from(c))
            .exec_without_returning(&self.db)
            .await
            .map_err(|e| unique_conflict(e, message))?;
        Ok(())
    }

    async fn list_challenges(&self, open_at: Option<DateTime<Utc>>) -> CommerceResult<Vec<Challenge>> {
        let mut query = challenge::Entity::find();
        if let Some(now) = open_at {
            query = query
                .filter(challenge::Column::IsActive.eq(true))
                .filter(challenge::Column::StartsAt.lte(now))
                .filter(
                    Condition::any()
                        .add(challenge::Column::EndsAt.is_null())
                        .add(challenge::Column::EndsAt.gte(now)),
                );
        }
        let mut challenges: Vec<Challenge> = query.all(&self.db).await?.into_iter().map(Challenge::from).collect();
        challenges.sort_by(|a, b| {
            a.difficulty
                .cmp(&b.difficulty)
                .then_with(|| b.points_reward.cmp(&a.points_reward))
                .then_with(|| a.code.cmp(&b.code))
        });
        Ok(challenges)
    }

    async fn user_challenges(&self, user_id: Uuid) -> CommerceResult<Vec<UserChallenge>> {
        Ok(user_challenge::Entity::find()
            .filter(user_challenge::Column::UserId.eq(user_id))
            .order_by_desc(user_challenge::Column::LastProgressAt)
            .all(&self.db)
            .await?
            .into_iter()
            .map(UserChallenge::from)
            .collect())
    }

    async fn advance_challenge(
        &self,
        user_id: Uuid,
        c: &Challenge,
        amount: i64,
        now: DateTime<Utc>,
    ) -> CommerceResult<Option<UserChallenge>> {
        let txn = self.db.begin().await?;
        lock_user(&txn, user_id).await?;
        let mine = || {
            user_challenge::Entity::find()
                .filter(user_challenge::Column::UserId.eq(user_id))
                .filter(user_challenge::Column::ChallengeId.eq(c.id))
        };

        let open = mine()
            .filter(user_challenge::Column::IsCompleted.eq(false))
            .one(&txn)
            .await?
            .map(UserChallenge::from);
        let attempt = match open {
            Some(mut attempt) => {
                attempt.advance(amount, now);
                user_challenge::ActiveModel::from(&attempt).update(&txn).await?;
                attempt
            }
            None => {
                if !c.is_repeatable
                    && mine().filter(user_challenge::Column::IsCompleted.eq(true)).count(&txn).await? > 0
                {
                    return Ok(None);
                }
                let mut attempt = UserChallenge::start(user_id, c, now);
                attempt.advance(amount, now);
                user_challenge::Entity::insert(user_challenge::ActiveModel::from(&attempt))
                    .exec_without_returning(&txn)
                    .await?;
                attempt
            }
        };
        txn.commit().await?;
        Ok(Some(attempt))
    }

    async fn claim_challenge_reward(&self, attempt_id: Uuid, points: i64, now: DateTime<Utc>) -> CommerceResult<UserChallenge> {
        let written = user_challenge::Entity::update_many()
            .col_expr(user_challenge::Column::RewardClaimed, Expr::value(true))
            .col_expr(user_challenge::Column::ClaimedAt, Expr::value(now))
            .col_expr(user_challenge::Column::PointsEarned, Expr::value(points))
            .filter(user_challenge::Column::Id.eq(attempt_id))
            .filter(user_challenge::Column::IsCompleted.eq(true))
            .filter(user_challenge::Column::RewardClaimed.eq(false))
            .exec(&self.db)
            .await?
            .rows_affected;

        let row = user_challenge::Entity::find_by_id(attempt_id)
            .one(&self.db)
            .await?
            .ok_or_else(|| CommerceError::not_found(format!("Challenge attempt {}", attempt_id)))?;
        if written == 0 {
            return Err(if row.is_completed {
                CommerceError::conflict("Challenge reward already claimed")
            } else {
                CommerceError::validation("Challenge is not completed yet")
            });
        }
        Ok(UserChallenge::from(row))
    }
}

// ---------------------------------------------------------------------------
// Cart
// ---------------------------------------------------------------------------

#[async_trait]
impl CartStorage for SeaOrmStore {
    async fn cart_items(&self, user_id: Uuid) -> CommerceResult<Vec<CartItem>> {
        Ok(cart_item::Entity::find()
            .filter(cart_item::Column::UserId.eq(user_id))
            .order_by_asc(cart_item::Column::CreatedAt)
            .order_by_asc(cart_item::Column::Id)
            .all(&self.db)
            .await?
            .into_iter()
            .map(CartItem::from)
            .collect())
    }

    async fn add_cart_item(&self, user_id: Uuid, line: CartLine, now: DateTime<Utc>) -> CommerceResult<CartItem> {
        let txn = self.db.begin().await?;
        // A NULL variant slips past unique indexes, so the user row serializes writers.
        lock_user(&txn, user_id).await?;
        let mut query = cart_item::Entity::find()
            .filter(cart_item::Column::UserId.eq(user_id))
            .filter(cart_item::Column::ProductId.eq(line.product_id));
        query = match line.variant_id {
            Some(variant_id) => query.filter(cart_item::Column::VariantId.eq(variant_id)),
            None => query.filter(cart_item::Column::VariantId.is_null()),
        };

        let item = match query.one(&txn).await?.map(CartItem::from) {
            Some(mut item) => {
                let merged = merge_lines(&[item.line(), line])?;
                item.quantity = merged.first().map_or(item.quantity, |m| m.quantity);
                item.updated_at = now;
                cart_item::ActiveModel::from(&item).update(&txn).await?;
                item
            }
            None => {
                check_quantity(line.quantity)?;
                let item = CartItem::new(user_id, line, now);
                cart_item::Entity::insert(cart_item::ActiveModel::from(&item))
                    .exec_without_returning(&txn)
                    .await?;
                item
            }
        };
        txn.commit().await?;
        Ok(item)
    }

    async fn set_cart_quantity(&self, user_id: Uuid, item_id: Uuid, quantity: i32, now: DateTime<Utc>) -> CommerceResult<CartItem> {
        check_quantity(quantity)?;
        let written = cart_item::Entity::update_many()
            .col_expr(cart_item::Column::Quantity, Expr::value(quantity))
            .col_expr(cart_item::Column::UpdatedAt, Expr::value(now))
            .filter(cart_item::Column::Id.eq(item_id))
            .filter(cart_item::Column::UserId.eq(user_id))
            .exec(&self.db)
            .await?
            .rows_affected;
        let not_found = || CommerceError::not_found(format!("Cart item {}", item_id));
        if written == 0 {
            return Err(not_found());
        }
        cart_item::Entity::find_by_id(item_id)
            .one(&self.db)
            .await?
            .map(CartItem::from)
            .ok_or_else(not_found)
    }

    async fn remove_cart_item(&self, user_id: Uuid, item_id: Uuid) -> CommerceResult<()> {
        let removed = cart_item::Entity::delete_many()
            .filter(cart_item::Column::Id.eq(item_id))
            .filter(cart_item::Column::UserId.eq(user_id))
            .exec(&self.db)
            .await?
            .rows_affected;
        if removed == 0 {
            return Err(CommerceError::not_found(format!("Cart item {}", item_id)));
        }
        Ok(())
    }

    async fn clear_cart(&self, user_id: Uuid) -> CommerceResult<u64> {
        Ok(cart_item::Entity::delete_many()
            .filter(cart_item::Column::UserId.eq(user_id))
            .exec(&self.db)
            .await?
            .rows_affected)
    }
}
