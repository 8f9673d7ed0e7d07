use axum::extract::State;
use axum::routing::{delete, get, post, put};
use axum::Router;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::json;
use uuid::Uuid;

use crate::cart::CartView;
use crate::checkout::CartLine;
use crate::model::CartItem;

use super::extract::{ApiJson, ApiPath, AuthUser};
use super::{ok, ok_with_message, ApiResult, AppState};

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/api/cart", get(view_cart).post(add_item))
        .route("/api/cart/add", post(add_item))
        .route("/api/cart/items/{id}", put(update_item).delete(remove_item))
        .route("/api/cart/clear", delete(clear_cart))
        .route("/api/cart/summary", get(cart_summary))
}

#[derive(Debug, Deserialize)]
pub struct QuantityRequest {
    pub quantity: i32,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct CartChange {
    cart_item: CartItem,
    cart: CartView,
}

async fn view_cart(State(state): State<AppState>, AuthUser(user): AuthUser) -> ApiResult {
    Ok(ok(state.cart_service.view(user.id).await?))
}

async fn add_item(State(state): State<AppState>, AuthUser(user): AuthUser, ApiJson(line): ApiJson<CartLine>) -> ApiResult {
    let (cart_item, cart) = state.cart_service.add(user.id, line, Utc::now()).await?;
    Ok(ok_with_message(CartChange { cart_item, cart }, "Product added to cart"))
}

async fn update_item(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    ApiPath(id): ApiPath<Uuid>,
    ApiJson(request): ApiJson<QuantityRequest>,
) -> ApiResult {
    let (cart_item, cart) = state
        .cart_service
        .update_quantity(user.id, id, request.quantity, Utc::now())
        .await?;
    Ok(ok_with_message(CartChange { cart_item, cart }, "Cart updated"))
}

async fn remove_item(State(state): State<AppState>, AuthUser(user): AuthUser, ApiPath(id): ApiPath<Uuid>) -> ApiResult {
    let cart = state.cart_service.remove(user.id, id).await?;
    Ok(ok_with_message(cart, "Product removed from cart"))
}

async fn clear_cart(State(state): State<AppState>, AuthUser(user): AuthUser) -> ApiResult {
    let removed = state.cart_service.clear(user.id).await?;
    Ok(ok_with_message(json!({ "itemsRemoved": removed }), "Cart cleared"))
}

async fn cart_summary(State(state): State<AppState>, AuthUser(user): AuthUser) -> ApiResult {
    Ok(ok(state.cart_service.summary(user.id).await?))
}
