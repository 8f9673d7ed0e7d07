use std::collections::HashMap;

use axum::extract::State;
use axum::routing::{get, post};
use axum::Router;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::info;
use uuid::Uuid;

use crate::coupons::{coupon_stats, is_publicly_listed, CouponDraft, CouponPatch, CouponQuote};
use crate::error::CommerceError;
use crate::model::{Coupon, CouponFilter, CouponType, PageRequest, DEFAULT_PAGE_SIZE};

use super::extract::{AdminUser, ApiJson, ApiPath, ApiQuery, AuthUser, MaybeUser};
use super::{created, ok, ok_with_message, paginated, ApiResult, AppState};

const TOP_COUPONS: usize = 5;

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/public", get(public_coupons))
        .route("/validate", post(validate_coupon))
        .route("/apply", post(apply_coupon))
        .route("/my-usage", get(my_usage))
        .route("/admin/all", get(admin_list))
        .route("/admin/stats", get(admin_stats))
        .route("/admin/create", post(admin_create))
        .route("/admin/{id}", get(admin_get).put(admin_update).delete(admin_delete))
}

/// What shoppers get to see of a coupon.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PublicCoupon {
    pub code: String,
    pub name: String,
    pub description: Option<String>,
    #[serde(rename = "type")]
    pub coupon_type: CouponType,
    pub value: Decimal,
    pub min_purchase: Option<Decimal>,
    pub max_discount: Option<Decimal>,
    pub valid_until: Option<DateTime<Utc>>,
}

impl From<Coupon> for PublicCoupon {
    fn from(c: Coupon) -> Self {
        Self {
            code: c.code,
            name: c.name,
            description: c.description,
            coupon_type: c.coupon_type,
            value: c.value,
            min_purchase: c.min_purchase,
            max_discount: c.max_discount,
            valid_until: c.valid_until,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidateRequest {
    pub code: String,
    pub subtotal: Decimal,
    #[serde(default)]
    pub product_ids: Vec<Uuid>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct CouponValidation {
    valid: bool,
    coupon: PublicCoupon,
    #[serde(flatten)]
    quote: CouponQuote,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApplyRequest {
    pub code: String,
    pub order_id: Uuid,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct UsageRecord {
    code: Option<String>,
    order_id: Uuid,
    discount_amount: Decimal,
    used_at: DateTime<Utc>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AdminCouponQuery {
    pub search: Option<String>,
    #[serde(rename = "type")]
    pub coupon_type: Option<CouponType>,
    pub is_active: Option<bool>,
    pub page: Option<u64>,
    pub limit: Option<u64>,
}

async fn public_coupons(State(state): State<AppState>) -> ApiResult {
    let now = Utc::now();
    let coupons: Vec<PublicCoupon> = state
        .coupons
        .all_coupons()
        .await?
        .into_iter()
        .filter(|c| is_publicly_listed(c, now))
        .map(PublicCoupon::from)
        .collect();
    Ok(ok(coupons))
}

async fn validate_coupon(
    State(state): State<AppState>,
    MaybeUser(user): MaybeUser,
    ApiJson(request): ApiJson<ValidateRequest>,
) -> ApiResult {
    let (coupon, quote) = state
        .order_service
        .check_coupon(&request.code, request.subtotal, &request.product_ids, user.map(|u| u.id), Utc::now())
        .await?;
    Ok(ok_with_message(
        CouponValidation { valid: true, coupon: coupon.into(), quote },
        "Coupon is valid",
    ))
}

async fn apply_coupon(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    ApiJson(request): ApiJson<ApplyRequest>,
) -> ApiResult {
    let (order, usage) = state
        .order_service
        .apply_coupon(user.id, request.order_id, &request.code, Utc::now())
        .await?;
    Ok(ok_with_message(
        serde_json::json!({ "order": order, "usage": usage }),
        "Coupon applied",
    ))
}

async fn my_usage(State(state): State<AppState>, AuthUser(user): AuthUser) -> ApiResult {
    let usages = state.coupons.user_usages(user.id).await?;
    let codes: HashMap<Uuid, String> = state
        .coupons
        .all_coupons()
        .await?
        .into_iter()
        .map(|c| (c.id, c.code))
        .collect();
    let records: Vec<UsageRecord> = usages
        .into_iter()
        .map(|u| UsageRecord {
            code: codes.get(&u.coupon_id).cloned(),
            order_id: u.order_id,
            discount_amount: u.discount_amount,
            used_at: u.used_at,
        })
        .collect();
    Ok(ok(records))
}

async fn admin_list(
    State(state): State<AppState>,
    _admin: AdminUser,
    ApiQuery(query): ApiQuery<AdminCouponQuery>,
) -> ApiResult {
    let page = PageRequest::new(query.page.unwrap_or(1), query.limit.unwrap_or(DEFAULT_PAGE_SIZE));
    let filter = CouponFilter { search: query.search, coupon_type: query.coupon_type, is_active: query.is_active };
    Ok(paginated(state.coupons.list_coupons(&filter, page).await?))
}

async fn admin_stats(State(state): State<AppState>, _admin: AdminUser) -> ApiResult {
    let coupons = state.coupons.all_coupons().await?;
    Ok(ok(coupon_stats(&coupons, TOP_COUPONS)))
}

async fn admin_get(State(state): State<AppState>, _admin: AdminUser, ApiPath(id): ApiPath<Uuid>) -> ApiResult {
    let coupon = state
        .coupons
        .get_coupon(id)
        .await?
        .ok_or_else(|| CommerceError::not_found("Coupon"))?;
    Ok(ok(coupon))
}

async fn admin_create(
    State(state): State<AppState>,
    AdminUser(admin): AdminUser,
    ApiJson(draft): ApiJson<CouponDraft>,
) -> ApiResult {
    let coupon = draft.into_coupon(Utc::now())?;
    state.coupons.create_coupon(&coupon).await?;
    info!(coupon_id = %coupon.id, code = %coupon.code, admin_id = %admin.id, "Coupon created");
    Ok(created(coupon, "Coupon created"))
}

async fn admin_update(
    State(state): State<AppState>,
    _admin: AdminUser,
    ApiPath(id): ApiPath<Uuid>,
    ApiJson(patch): ApiJson<CouponPatch>,
) -> ApiResult {
    let mut coupon = state
        .coupons
        .get_coupon(id)
        .await?
        .ok_or_else(|| CommerceError::not_found("Coupon"))?;
    patch.apply(&mut coupon, Utc::now())?;
    state.coupons.update_coupon(&coupon).await?;
    Ok(ok_with_message(coupon, "Coupon updated"))
}

async fn admin_delete(State(state): State<AppState>, _admin: AdminUser, ApiPath(id): ApiPath<Uuid>) -> ApiResult {
    state.coupons.delete_coupon(id).await?;
    info!(coupon_id = %id, "Coupon deleted");
    Ok(ok_with_message(serde_json::Value::Null, "Coupon deleted"))
}
