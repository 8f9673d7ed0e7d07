use axum::extract::State;
use axum::routing::get;
use axum::Router;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::error::CommerceError;
use crate::model::{Category, Page, PageRequest, Product, ProductFilter, ProductSort, DEFAULT_PAGE_SIZE};

use super::extract::{ApiPath, ApiQuery};
use super::{ok, paginated, ApiResult, AppState};

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/api/products", get(list_products))
        .route("/api/products/{id_or_slug}", get(get_product))
        .route("/api/categories", get(list_categories))
        .route("/api/categories/{id_or_slug}", get(get_category))
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProductQuery {
    /// Category id or slug.
    pub category: Option<String>,
    pub search: Option<String>,
    pub min_price: Option<Decimal>,
    pub max_price: Option<Decimal>,
    pub featured: Option<bool>,
    #[serde(default)]
    pub sort: ProductSort,
    pub page: Option<u64>,
    pub limit: Option<u64>,
}

impl ProductQuery {
    pub fn page_request(&self) -> PageRequest {
        PageRequest::new(self.page.unwrap_or(1), self.limit.unwrap_or(DEFAULT_PAGE_SIZE))
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct CategoryDetail {
    #[serde(flatten)]
    category: Category,
    products: Vec<Product>,
}

async fn list_products(State(state): State<AppState>, ApiQuery(query): ApiQuery<ProductQuery>) -> ApiResult {
    let page = query.page_request();
    let category_id = match query.category.as_deref() {
        Some(id_or_slug) => match state.catalog.find_category(id_or_slug).await? {
            Some(category) if category.is_active => Some(category.id),
            _ => return Ok(paginated(Page::<Product>::new(Vec::new(), 0, page))),
        },
        None => None,
    };
    let filter = ProductFilter {
        category_id,
        search: query.search,
        min_price: query.min_price,
        max_price: query.max_price,
        is_active: Some(true),
        featured: query.featured,
        sort: query.sort,
    };
    Ok(paginated(state.catalog.list_products(&filter, page).await?))
}

async fn get_product(State(state): State<AppState>, ApiPath(id_or_slug): ApiPath<String>) -> ApiResult {
    let product = state
        .catalog
        .find_product(&id_or_slug)
        .await?
        .filter(|p| p.is_active)
        .ok_or_else(|| CommerceError::not_found("Product"))?;
    Ok(ok(product))
}

async fn list_categories(State(state): State<AppState>) -> ApiResult {
    Ok(ok(state.catalog.list_categories(false).await?))
}

async fn get_category(State(state): State<AppState>, ApiPath(id_or_slug): ApiPath<String>) -> ApiResult {
    let category = state
        .catalog
        .find_category(&id_or_slug)
        .await?
        .filter(|c| c.is_active)
        .ok_or_else(|| CommerceError::not_found("Category"))?;
    let mut products: Vec<Product> = state
        .catalog
        .all_products()
        .await?
        .into_iter()
        .filter(|p| p.is_active && p.category_id == category.id)
        .collect();
    products.sort_by(|a, b| a.name.cmp(&b.name));
    Ok(ok(CategoryDetail { category, products }))
}
