//! HTTP surface: JSON endpoints under `/api` plus the `/ws` tracking socket.

pub mod admin;
pub mod auth;
pub mod cart;
pub mod catalog;
pub mod coupons;
pub mod delivery;
pub mod error;
pub mod extract;
pub mod gamification;
pub mod orders;
pub mod reports;
pub mod ws;

use std::sync::Arc;

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use common::config::{Config, ReportsConfig};
use serde::Serialize;
use serde_json::json;

use crate::checkout::PricingRules;
use crate::error::CommerceResult;
use crate::model::Page;
use crate::services::{AuthService, CartService, DeliveryService, GamificationService, OrderService};
use crate::storage::{
    CartStorage, CatalogStorage, CouponStorage, DeliveryStorage, GamificationStorage, LoyaltyStorage, OrderStorage, Store,
    UserStorage,
};
use crate::tracking::TrackingHub;

pub use error::{ApiError, ApiResult};

/// One handle per storage concern. Usually all point at the same store.
#[derive(Clone)]
pub struct Storages {
    pub catalog: Arc<dyn CatalogStorage>,
    pub orders: Arc<dyn OrderStorage>,
    pub coupons: Arc<dyn CouponStorage>,
    pub deliveries: Arc<dyn DeliveryStorage>,
    pub users: Arc<dyn UserStorage>,
    pub loyalty: Arc<dyn LoyaltyStorage>,
    pub gamification: Arc<dyn GamificationStorage>,
    pub carts: Arc<dyn CartStorage>,
}

impl Storages {
    pub fn from_store<S: Store + 'static>(store: Arc<S>) -> Self {
        Self {
            catalog: store.clone(),
            orders: store.clone(),
            coupons: store.clone(),
            deliveries: store.clone(),
            users: store.clone(),
            loyalty: store.clone(),
            gamification: store.clone(),
            carts: store,
        }
    }
}

#[derive(Clone)]
pub struct AppState {
    pub catalog: Arc<dyn CatalogStorage>,
    pub orders: Arc<dyn OrderStorage>,
    pub coupons: Arc<dyn CouponStorage>,
    pub deliveries: Arc<dyn DeliveryStorage>,
    pub users: Arc<dyn UserStorage>,
    pub loyalty: Arc<dyn LoyaltyStorage>,
    pub tracking: TrackingHub,
    pub auth: AuthService,
    pub gamification: GamificationService,
    pub cart_service: CartService,
    pub order_service: OrderService,
    pub delivery_service: DeliveryService,
    pub reports: ReportsConfig,
}

impl AppState {
    pub fn new(storages: Storages, config: &Config) -> CommerceResult<Self> {
        let tracking = TrackingHub::new(config.tracking.channel_capacity);
        let pricing = PricingRules::from_config(&config.checkout)?;
        let gamification = GamificationService::new(
            storages.gamification.clone(),
            storages.orders.clone(),
            storages.loyalty.clone(),
        );
        let order_service = OrderService::new(
            storages.catalog.clone(),
            storages.orders.clone(),
            storages.coupons.clone(),
            storages.deliveries.clone(),
            storages.loyalty.clone(),
            gamification.clone(),
            tracking.clone(),
            pricing,
        );
        let delivery_service = DeliveryService::new(
            storages.deliveries.clone(),
            storages.users.clone(),
            order_service.clone(),
            tracking.clone(),
        );
        Ok(Self {
            auth: AuthService::new(storages.users.clone(), &config.auth),
            cart_service: CartService::new(storages.carts, storages.catalog.clone(), pricing),
            gamification,
            catalog: storages.catalog,
            orders: storages.orders,
            coupons: storages.coupons,
            deliveries: storages.deliveries,
            users: storages.users,
            loyalty: storages.loyalty,
            tracking,
            order_service,
            delivery_service,
            reports: config.reports.clone(),
        })
    }
}

pub fn ok<T: Serialize>(data: T) -> Response {
    (StatusCode::OK, Json(json!({ "success": true, "data": data }))).into_response()
}

pub fn ok_with_message<T: Serialize>(data: T, message: &str) -> Response {
    (StatusCode::OK, Json(json!({ "success": true, "message": message, "data": data }))).into_response()
}

pub fn created<T: Serialize>(data: T, message: &str) -> Response {
    (StatusCode::CREATED, Json(json!({ "success": true, "message": message, "data": data }))).into_response()
}

pub fn paginated<T: Serialize>(page: Page<T>) -> Response {
    (
        StatusCode::OK,
        Json(json!({ "success": true, "data": page.items, "pagination": page.pagination })),
    )
        .into_response()
}

pub async fn health_check() -> impl IntoResponse {
    (StatusCode::OK, "OK").into_response()
}

/// All routes, without transport layers.
pub fn router(state: AppState) -> Router {
    Router::new()
        .nest("/api/auth", auth::routes())
        .merge(catalog::routes())
        .merge(orders::routes())
        .merge(cart::routes())
        .nest("/api/coupon", coupons::routes())
        .nest("/api/admin", admin::routes())
        .nest("/api/delivery", delivery::routes())
        .nest("/api/reports", reports::routes())
        .nest("/api/gamification", gamification::routes())
        .route("/ws", get(ws::tracking_socket))
        .route("/health", get(health_check))
        .with_state(state)
}
