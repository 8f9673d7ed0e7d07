use std::collections::HashMap;

use axum::extract::State;
use axum::routing::get;
use axum::Router;
use chrono::Utc;
use serde::Deserialize;
use uuid::Uuid;

use crate::coupons::coupon_stats;
use crate::error::CommerceResult;
use crate::model::{Order, OrderFilter, OrderStatus, UserRole};
use crate::reports::{self, DashboardInputs, DateRange, Period, SalesFilter};

use super::extract::{AdminUser, ApiQuery};
use super::{ok, ApiResult, AppState};

const DEFAULT_TOP: usize = 10;
const MAX_TOP: usize = 100;
const TOP_COUPONS: usize = 5;

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/dashboard", get(dashboard))
        .route("/sales", get(sales))
        .route("/products/top", get(top_products))
        .route("/customers/top", get(top_customers))
        .route("/revenue", get(revenue))
        .route("/inventory", get(inventory))
        .route("/coupons", get(coupons))
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReportQuery {
    pub start_date: Option<String>,
    pub end_date: Option<String>,
    pub status: Option<OrderStatus>,
    pub category_id: Option<Uuid>,
    #[serde(default)]
    pub period: Period,
    pub limit: Option<usize>,
    pub low_stock_threshold: Option<i32>,
}

impl ReportQuery {
    fn range(&self, state: &AppState) -> CommerceResult<DateRange> {
        DateRange::parse(
            self.start_date.as_deref(),
            self.end_date.as_deref(),
            Utc::now(),
            state.reports.default_range_days,
        )
    }

    fn limit(&self, default: usize) -> usize {
        self.limit.unwrap_or(default).clamp(1, MAX_TOP)
    }
}

async fn orders_in(state: &AppState, range: DateRange) -> CommerceResult<Vec<Order>> {
    let filter = OrderFilter { from: Some(range.start), to: Some(range.end), ..Default::default() };
    state.orders.find_orders(&filter).await
}

async fn dashboard(State(state): State<AppState>, _admin: AdminUser, ApiQuery(query): ApiQuery<ReportQuery>) -> ApiResult {
    let range = query.range(&state)?;
    let orders = orders_in(&state, range).await?;
    let products = state.catalog.all_products().await?;
    let categories = state.catalog.list_categories(true).await?;
    let total_customers = state.users.count_users(Some(UserRole::Customer)).await?;
    Ok(ok(reports::dashboard(DashboardInputs {
        range,
        orders,
        products: &products,
        categories: &categories,
        total_customers,
        low_stock_threshold: query.low_stock_threshold.unwrap_or(state.reports.low_stock_threshold),
    })))
}

async fn sales(State(state): State<AppState>, _admin: AdminUser, ApiQuery(query): ApiQuery<ReportQuery>) -> ApiResult {
    let range = query.range(&state)?;
    let orders = orders_in(&state, range).await?;
    let product_categories: HashMap<Uuid, Uuid> = match query.category_id {
        Some(_) => state
            .catalog
            .all_products()
            .await?
            .into_iter()
            .map(|p| (p.id, p.category_id))
            .collect(),
        None => HashMap::new(),
    };
    let filter = SalesFilter { status: query.status, category_id: query.category_id };
    Ok(ok(reports::sales_report(orders, range, &filter, &product_categories)))
}

async fn top_products(State(state): State<AppState>, _admin: AdminUser, ApiQuery(query): ApiQuery<ReportQuery>) -> ApiResult {
    let orders = orders_in(&state, query.range(&state)?).await?;
    Ok(ok(reports::top_products(&orders, query.limit(DEFAULT_TOP))))
}

async fn top_customers(State(state): State<AppState>, _admin: AdminUser, ApiQuery(query): ApiQuery<ReportQuery>) -> ApiResult {
    let orders = orders_in(&state, query.range(&state)?).await?;
    let mut ids: Vec<Uuid> = orders.iter().map(|o| o.user_id).collect();
    ids.sort_unstable();
    ids.dedup();
    let users = state
        .users
        .users_by_ids(&ids)
        .await?
        .into_iter()
        .map(|u| (u.id, u))
        .collect();
    Ok(ok(reports::top_customers(&orders, &users, query.limit(DEFAULT_TOP))))
}

async fn revenue(State(state): State<AppState>, _admin: AdminUser, ApiQuery(query): ApiQuery<ReportQuery>) -> ApiResult {
    let orders = orders_in(&state, query.range(&state)?).await?;
    let limit = query.limit(reports::DEFAULT_RANGE_DAYS as usize);
    Ok(ok(reports::revenue_by_period(&orders, query.period, limit)))
}

async fn inventory(State(state): State<AppState>, _admin: AdminUser, ApiQuery(query): ApiQuery<ReportQuery>) -> ApiResult {
    let products = state.catalog.all_products().await?;
    let categories = state.catalog.list_categories(true).await?;
    let threshold = query.low_stock_threshold.unwrap_or(state.reports.low_stock_threshold);
    Ok(ok(reports::inventory_report(&products, &categories, threshold)))
}

async fn coupons(State(state): State<AppState>, _admin: AdminUser) -> ApiResult {
    let coupons = state.coupons.all_coupons().await?;
    Ok(ok(coupon_stats(&coupons, TOP_COUPONS)))
}
