use std::time::Instant;

use axum::body::Bytes;
use axum::extract::State;
use axum::routing::{get, post, put};
use axum::Router;
use chrono::{DateTime, Utc};
use metrics::histogram;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::checkout::CartLine;
use crate::model::{Order, OrderFilter, OrderStatus, PageRequest, PaymentStatus, DEFAULT_PAGE_SIZE};
use crate::services::CheckoutRequest;

use super::extract::{ApiJson, ApiPath, ApiQuery, AuthUser, MaybeUser};
use super::{created, ok, ok_with_message, paginated, ApiResult, AppState};

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/api/cart/quote", post(quote_cart))
        .route("/api/orders", post(checkout).get(my_orders))
        .route("/api/orders/{id}", get(get_order))
        .route("/api/orders/{id}/tracking", get(order_tracking))
        .route("/api/orders/{id}/cancel", post(cancel_order))
        .route("/api/orders/{id}/rate-delivery", put(rate_delivery))
        .route("/api/payments/history", get(payment_history))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QuoteRequest {
    pub items: Vec<CartLine>,
    pub coupon_code: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct MyOrdersQuery {
    pub status: Option<OrderStatus>,
    pub page: Option<u64>,
    pub limit: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
pub struct CancelRequest {
    pub reason: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct RatingRequest {
    pub rating: i16,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct PaymentRecord {
    order_id: Uuid,
    order_number: String,
    amount: Decimal,
    payment_status: PaymentStatus,
    paid_at: Option<DateTime<Utc>>,
    created_at: DateTime<Utc>,
}

impl From<Order> for PaymentRecord {
    fn from(order: Order) -> Self {
        Self {
            order_id: order.id,
            order_number: order.order_number,
            amount: order.totals.total,
            payment_status: order.payment_status,
            paid_at: order.paid_at,
            created_at: order.created_at,
        }
    }
}

async fn quote_cart(
    State(state): State<AppState>,
    MaybeUser(user): MaybeUser,
    ApiJson(request): ApiJson<QuoteRequest>,
) -> ApiResult {
    let quote = state
        .order_service
        .quote(&request.items, request.coupon_code.as_deref(), user.map(|u| u.id), Utc::now())
        .await?;
    Ok(ok(quote))
}

async fn checkout(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    ApiJson(request): ApiJson<CheckoutRequest>,
) -> ApiResult {
    let started = Instant::now();
    let result = state.order_service.checkout(user.id, request, Utc::now()).await;
    let outcome = if result.is_ok() { "ok" } else { "rejected" };
    histogram!("http_checkout_duration_seconds", "outcome" => outcome).record(started.elapsed().as_secs_f64());
    Ok(created(result?, "Order created"))
}

async fn my_orders(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    ApiQuery(query): ApiQuery<MyOrdersQuery>,
) -> ApiResult {
    let filter = OrderFilter { user_id: Some(user.id), status: query.status, ..Default::default() };
    let page = PageRequest::new(query.page.unwrap_or(1), query.limit.unwrap_or(DEFAULT_PAGE_SIZE));
    Ok(paginated(state.orders.list_orders(&filter, page).await?))
}

async fn get_order(State(state): State<AppState>, AuthUser(user): AuthUser, ApiPath(id): ApiPath<Uuid>) -> ApiResult {
    Ok(ok(state.order_service.visible_order(id, &user).await?))
}

async fn order_tracking(State(state): State<AppState>, AuthUser(user): AuthUser, ApiPath(id): ApiPath<Uuid>) -> ApiResult {
    let order = state.order_service.visible_order(id, &user).await?;
    Ok(ok(state.order_service.timeline(&order).await?))
}

async fn cancel_order(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    ApiPath(id): ApiPath<Uuid>,
    body: Bytes,
) -> ApiResult {
    // The body is optional here.
    let reason = serde_json::from_slice::<CancelRequest>(&body).ok().and_then(|r| r.reason);
    let order = state.order_service.cancel_own(user.id, id, reason, Utc::now()).await?;
    Ok(ok_with_message(order, "Order cancelled"))
}

async fn rate_delivery(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    ApiPath(id): ApiPath<Uuid>,
    ApiJson(request): ApiJson<RatingRequest>,
) -> ApiResult {
    let delivery = state.order_service.rate_delivery(user.id, id, request.rating, Utc::now()).await?;
    Ok(ok_with_message(delivery, "Thanks for rating your delivery"))
}

async fn payment_history(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    ApiQuery(query): ApiQuery<MyOrdersQuery>,
) -> ApiResult {
    let filter = OrderFilter { user_id: Some(user.id), ..Default::default() };
    let page = PageRequest::new(query.page.unwrap_or(1), query.limit.unwrap_or(DEFAULT_PAGE_SIZE));
    let orders = state.orders.list_orders(&filter, page).await?;
    Ok(paginated(orders.map(PaymentRecord::from)))
}
