use axum::body::Bytes;
use axum::extract::State;
use axum::routing::{get, post, put};
use axum::Router;
use chrono::Utc;
use serde::Deserialize;
use uuid::Uuid;

use crate::model::DeliveryStatus;
use crate::services::LocationReport;

use super::extract::{ApiJson, ApiPath, ApiQuery, DriverUser};
use super::{ok, ok_with_message, ApiResult, AppState};

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/my-deliveries", get(my_deliveries))
        .route("/stats/overview", get(stats_overview))
        .route("/{id}", get(get_delivery))
        .route("/{id}/status", put(update_status))
        .route("/{id}/location", put(update_location))
        .route("/{id}/complete", post(complete))
}

#[derive(Debug, Default, Deserialize)]
pub struct DeliveryQuery {
    pub status: Option<DeliveryStatus>,
}

#[derive(Debug, Deserialize)]
pub struct DeliveryStatusChange {
    pub status: DeliveryStatus,
    pub notes: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct Completion {
    pub notes: Option<String>,
}

async fn my_deliveries(
    State(state): State<AppState>,
    DriverUser(driver): DriverUser,
    ApiQuery(query): ApiQuery<DeliveryQuery>,
) -> ApiResult {
    Ok(ok(state.delivery_service.my_deliveries(driver.id, query.status).await?))
}

async fn get_delivery(State(state): State<AppState>, DriverUser(driver): DriverUser, ApiPath(id): ApiPath<Uuid>) -> ApiResult {
    let delivery = state.delivery_service.driver_delivery(driver.id, id).await?;
    let order = state.order_service.get_order(delivery.order_id).await?;
    Ok(ok(serde_json::json!({ "delivery": delivery, "order": order })))
}

async fn update_status(
    State(state): State<AppState>,
    DriverUser(driver): DriverUser,
    ApiPath(id): ApiPath<Uuid>,
    ApiJson(change): ApiJson<DeliveryStatusChange>,
) -> ApiResult {
    let (delivery, order) = state
        .delivery_service
        .update_status(driver.id, id, change.status, change.notes, Utc::now())
        .await?;
    Ok(ok_with_message(
        serde_json::json!({ "delivery": delivery, "order": order }),
        "Delivery status updated",
    ))
}

async fn update_location(
    State(state): State<AppState>,
    DriverUser(driver): DriverUser,
    ApiPath(id): ApiPath<Uuid>,
    ApiJson(report): ApiJson<LocationReport>,
) -> ApiResult {
    let location = state.delivery_service.update_location(driver.id, id, report, Utc::now()).await?;
    Ok(ok(location))
}

async fn complete(
    State(state): State<AppState>,
    DriverUser(driver): DriverUser,
    ApiPath(id): ApiPath<Uuid>,
    body: Bytes,
) -> ApiResult {
    let notes = serde_json::from_slice::<Completion>(&body).ok().and_then(|c| c.notes);
    let (delivery, order) = state
        .delivery_service
        .complete(driver.id, id, notes, Utc::now())
        .await?;
    Ok(ok_with_message(
        serde_json::json!({ "delivery": delivery, "order": order }),
        "Delivery completed",
    ))
}

async fn stats_overview(State(state): State<AppState>, DriverUser(driver): DriverUser) -> ApiResult {
    Ok(ok(state.delivery_service.stats(driver.id, Utc::now()).await?))
}
