use axum::extract::State;
use axum::routing::{get, post, put};
use axum::Router;
use chrono::{DateTime, Utc};
use serde::Deserialize;
use tracing::info;
use uuid::Uuid;

use crate::error::CommerceError;
use crate::model::*;
use crate::products::{CategoryDraft, CategoryPatch, ProductDraft, ProductEdit, ProductPatch, VariantDraft, VariantPatch};
use crate::reports::DateRange;

use super::extract::{AdminUser, ApiJson, ApiPath, ApiQuery};
use super::{created, ok, ok_with_message, paginated, ApiError, ApiResult, AppState};

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/products", get(list_products).post(create_product))
        .route("/products/{id}", get(get_product).put(update_product).delete(deactivate_product))
        .route("/products/{id}/variants", post(add_variant))
        .route("/products/{id}/variants/{variant_id}", put(update_variant).delete(remove_variant))
        .route("/categories", get(list_categories).post(create_category))
        .route("/categories/{id}", put(update_category).delete(delete_category))
        .route("/orders", get(list_orders))
        .route("/orders/{id}", get(get_order).delete(cancel_order))
        .route("/orders/{id}/status", put(update_order_status))
        .route("/orders/{id}/payment", put(update_payment_status))
        .route("/orders/{id}/delivery", post(assign_delivery))
        .route("/users", get(list_users))
        .route("/users/{id}", get(get_user).put(update_user))
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AdminProductQuery {
    pub search: Option<String>,
    pub category_id: Option<Uuid>,
    pub is_active: Option<bool>,
    pub page: Option<u64>,
    pub limit: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AdminOrderQuery {
    pub status: Option<OrderStatus>,
    pub payment_status: Option<PaymentStatus>,
    pub start_date: Option<String>,
    pub end_date: Option<String>,
    pub search: Option<String>,
    pub page: Option<u64>,
    pub limit: Option<u64>,
}

#[derive(Debug, Deserialize)]
pub struct StatusChange {
    pub status: OrderStatus,
    pub note: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentChange {
    pub payment_status: PaymentStatus,
}

#[derive(Debug, Deserialize)]
pub struct Cancellation {
    pub reason: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeliveryAssignment {
    pub driver_id: Uuid,
    pub estimated_time: Option<DateTime<Utc>>,
    pub notes: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AdminUserQuery {
    pub role: Option<UserRole>,
    pub is_active: Option<bool>,
    pub search: Option<String>,
    pub page: Option<u64>,
    pub limit: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserChange {
    pub role: Option<UserRole>,
    pub is_active: Option<bool>,
}

fn page_of(page: Option<u64>, limit: Option<u64>) -> PageRequest {
    PageRequest::new(page.unwrap_or(1), limit.unwrap_or(DEFAULT_PAGE_SIZE))
}

async fn load_product(state: &AppState, id: Uuid) -> Result<Product, ApiError> {
    Ok(state
        .catalog
        .find_product(&id.to_string())
        .await?
        .ok_or_else(|| CommerceError::not_found("Product"))?)
}

async fn list_products(
    State(state): State<AppState>,
    _admin: AdminUser,
    ApiQuery(query): ApiQuery<AdminProductQuery>,
) -> ApiResult {
    let filter = ProductFilter {
        category_id: query.category_id,
        search: query.search,
        is_active: query.is_active,
        ..Default::default()
    };
    let page = page_of(query.page, query.limit);
    Ok(paginated(state.catalog.list_products(&filter, page).await?))
}

async fn get_product(State(state): State<AppState>, _admin: AdminUser, ApiPath(id): ApiPath<Uuid>) -> ApiResult {
    Ok(ok(load_product(&state, id).await?))
}

async fn create_product(
    State(state): State<AppState>,
    _admin: AdminUser,
    ApiJson(draft): ApiJson<ProductDraft>,
) -> ApiResult {
    let product = draft.into_product(Utc::now())?;
    state.catalog.create_product(&product).await?;
    info!(product_id = %product.id, sku = %product.sku, "Product created");
    Ok(created(product, "Product created"))
}

async fn update_product(
    State(state): State<AppState>,
    _admin: AdminUser,
    ApiPath(id): ApiPath<Uuid>,
    ApiJson(patch): ApiJson<ProductPatch>,
) -> ApiResult {
    let product = state.catalog.edit_product(id, ProductEdit::Patch(patch), Utc::now()).await?;
    Ok(ok_with_message(product, "Product updated"))
}

/// Products referenced by orders are never removed, only hidden.
async fn deactivate_product(State(state): State<AppState>, _admin: AdminUser, ApiPath(id): ApiPath<Uuid>) -> ApiResult {
    let product = state.catalog.edit_product(id, ProductEdit::Deactivate, Utc::now()).await?;
    info!(product_id = %id, "Product deactivated");
    Ok(ok_with_message(product, "Product deactivated"))
}

fn edited_variant(product: &Product, variant_id: Uuid) -> Result<ProductVariant, ApiError> {
    Ok(product
        .variant(variant_id)
        .cloned()
        .ok_or_else(|| CommerceError::not_found(format!("Variant {}", variant_id)))?)
}

async fn add_variant(
    State(state): State<AppState>,
    _admin: AdminUser,
    ApiPath(id): ApiPath<Uuid>,
    ApiJson(draft): ApiJson<VariantDraft>,
) -> ApiResult {
    let variant = draft.into_variant(id)?;
    let variant_id = variant.id;
    let product = state.catalog.edit_product(id, ProductEdit::AddVariant(variant), Utc::now()).await?;
    Ok(created(edited_variant(&product, variant_id)?, "Variant created"))
}

async fn update_variant(
    State(state): State<AppState>,
    _admin: AdminUser,
    ApiPath((id, variant_id)): ApiPath<(Uuid, Uuid)>,
    ApiJson(patch): ApiJson<VariantPatch>,
) -> ApiResult {
    let product = state
        .catalog
        .edit_product(id, ProductEdit::UpdateVariant(variant_id, patch), Utc::now())
        .await?;
    Ok(ok_with_message(edited_variant(&product, variant_id)?, "Variant updated"))
}

async fn remove_variant(
    State(state): State<AppState>,
    _admin: AdminUser,
    ApiPath((id, variant_id)): ApiPath<(Uuid, Uuid)>,
) -> ApiResult {
    let product = state
        .catalog
        .edit_product(id, ProductEdit::RemoveVariant(variant_id), Utc::now())
        .await?;
    Ok(ok_with_message(product, "Variant deleted"))
}

async fn list_categories(State(state): State<AppState>, _admin: AdminUser) -> ApiResult {
    Ok(ok(state.catalog.list_categories(true).await?))
}

async fn create_category(
    State(state): State<AppState>,
    _admin: AdminUser,
    ApiJson(draft): ApiJson<CategoryDraft>,
) -> ApiResult {
    let category = draft.into_category(Utc::now())?;
    state.catalog.create_category(&category).await?;
    Ok(created(category, "Category created"))
}

async fn update_category(
    State(state): State<AppState>,
    _admin: AdminUser,
    ApiPath(id): ApiPath<Uuid>,
    ApiJson(patch): ApiJson<CategoryPatch>,
) -> ApiResult {
    let mut category = state
        .catalog
        .find_category(&id.to_string())
        .await?
        .ok_or_else(|| CommerceError::not_found("Category"))?;
    patch.apply(&mut category, Utc::now())?;
    state.catalog.update_category(&category).await?;
    Ok(ok_with_message(category, "Category updated"))
}

async fn delete_category(State(state): State<AppState>, _admin: AdminUser, ApiPath(id): ApiPath<Uuid>) -> ApiResult {
    state.catalog.delete_category(id).await?;
    Ok(ok_with_message(serde_json::Value::Null, "Category deleted"))
}

async fn list_orders(
    State(state): State<AppState>,
    _admin: AdminUser,
    ApiQuery(query): ApiQuery<AdminOrderQuery>,
) -> ApiResult {
    let (from, to) = if query.start_date.is_some() || query.end_date.is_some() {
        let range = DateRange::parse(
            query.start_date.as_deref(),
            query.end_date.as_deref(),
            Utc::now(),
            state.reports.default_range_days,
        )?;
        (Some(range.start), Some(range.end))
    } else {
        (None, None)
    };
    let filter = OrderFilter {
        user_id: None,
        status: query.status,
        payment_status: query.payment_status,
        from,
        to,
        search: query.search,
    };
    let page = page_of(query.page, query.limit);
    Ok(paginated(state.orders.list_orders(&filter, page).await?))
}

async fn get_order(State(state): State<AppState>, _admin: AdminUser, ApiPath(id): ApiPath<Uuid>) -> ApiResult {
    let order = state.order_service.get_order(id).await?;
    let timeline = state.order_service.timeline(&order).await?;
    Ok(ok(serde_json::json!({ "order": order, "timeline": timeline })))
}

async fn update_order_status(
    State(state): State<AppState>,
    AdminUser(admin): AdminUser,
    ApiPath(id): ApiPath<Uuid>,
    ApiJson(change): ApiJson<StatusChange>,
) -> ApiResult {
    let order = state
        .order_service
        .change_status(id, change.status, change.note, Some(admin.id), Utc::now())
        .await?;
    Ok(ok_with_message(order, "Order status updated"))
}

async fn update_payment_status(
    State(state): State<AppState>,
    _admin: AdminUser,
    ApiPath(id): ApiPath<Uuid>,
    ApiJson(change): ApiJson<PaymentChange>,
) -> ApiResult {
    let order = state.order_service.update_payment(id, change.payment_status, Utc::now()).await?;
    Ok(ok_with_message(order, "Payment status updated"))
}

async fn cancel_order(
    State(state): State<AppState>,
    AdminUser(admin): AdminUser,
    ApiPath(id): ApiPath<Uuid>,
    ApiJson(cancellation): ApiJson<Cancellation>,
) -> ApiResult {
    if cancellation.reason.trim().is_empty() {
        return Err(CommerceError::validation("A cancellation reason is required").into());
    }
    let order = state
        .order_service
        .cancel(id, cancellation.reason.trim().to_string(), Some(admin.id), Utc::now())
        .await?;
    Ok(ok_with_message(order, "Order cancelled"))
}

async fn assign_delivery(
    State(state): State<AppState>,
    _admin: AdminUser,
    ApiPath(id): ApiPath<Uuid>,
    ApiJson(assignment): ApiJson<DeliveryAssignment>,
) -> ApiResult {
    let delivery = state
        .delivery_service
        .assign(id, assignment.driver_id, assignment.estimated_time, assignment.notes, Utc::now())
        .await?;
    Ok(created(delivery, "Driver assigned"))
}

async fn list_users(
    State(state): State<AppState>,
    _admin: AdminUser,
    ApiQuery(query): ApiQuery<AdminUserQuery>,
) -> ApiResult {
    let filter = UserFilter { role: query.role, is_active: query.is_active, search: query.search };
    let page = page_of(query.page, query.limit);
    Ok(paginated(state.users.list_users(&filter, page).await?))
}

async fn get_user(State(state): State<AppState>, _admin: AdminUser, ApiPath(id): ApiPath<Uuid>) -> ApiResult {
    let user = state
        .users
        .get_user(id)
        .await?
        .ok_or_else(|| CommerceError::not_found("User"))?;
    Ok(ok(user))
}

/// Only SUPER_ADMIN hands out or takes away staff roles, and nobody can
/// lock themselves out.
async fn update_user(
    State(state): State<AppState>,
    AdminUser(admin): AdminUser,
    ApiPath(id): ApiPath<Uuid>,
    ApiJson(change): ApiJson<UserChange>,
) -> ApiResult {
    let mut user = state
        .users
        .get_user(id)
        .await?
        .ok_or_else(|| CommerceError::not_found("User"))?;

    if let Some(role) = change.role {
        let touches_staff = role.is_admin() || user.role.is_admin();
        if touches_staff && role != user.role && admin.role != UserRole::SuperAdmin {
            return Err(ApiError::forbidden("Only a super admin can change staff roles"));
        }
        user.role = role;
    }
    if let Some(active) = change.is_active {
        if !active && user.id == admin.id {
            return Err(CommerceError::validation("You cannot deactivate your own account").into());
        }
        user.is_active = active;
    }
    user.updated_at = Utc::now();
    state.users.update_user(&user).await?;
    info!(user_id = %id, role = %user.role, is_active = user.is_active, admin_id = %admin.id, "User updated");
    Ok(ok_with_message(user, "User updated"))
}
