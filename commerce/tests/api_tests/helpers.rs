use std::sync::Arc;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::Router;
use chrono::{TimeZone, Utc};
use common::config::Config;
use common::test_helpers::{generate_unique_email, test_utils, TestError, TestResult};
use http_body_util::BodyExt;
use rust_decimal::Decimal;
use serde_json::Value;
use tower::ServiceExt;
use uuid::Uuid;

use commerce::api::{router, AppState, Storages};
use commerce::error::CommerceError;
use commerce::model::{slugify, Category, Coupon, CouponType, Product, User, UserRole, DEFAULT_MAX_USAGE_PER_USER};
use commerce::storage::{CatalogStorage, CouponStorage, InMemoryStore, UserStorage};

pub const TEST_SECRET: &str = "integration-test-secret";

pub fn test_config() -> Config {
    let mut config = Config::default();
    config.common.project_name = "shop".to_string();
    config.auth.jwt_secret = TEST_SECRET.to_string();
    config.auth.bcrypt_cost = 4;
    config
}

pub fn storage_failure(e: CommerceError) -> TestError {
    TestError::generic(format!("Store call failed: {}", e))
}

/// Router over an in-memory store plus direct handles for seeding.
pub struct TestApp {
    pub store: Arc<InMemoryStore>,
    pub state: AppState,
    router: Router,
}

impl TestApp {
    pub fn new() -> TestResult<Self> {
        let store = Arc::new(InMemoryStore::new());
        Self::with_storages(store.clone(), Storages::from_store(store))
    }

    pub fn with_storages(store: Arc<InMemoryStore>, storages: Storages) -> TestResult<Self> {
        let state = AppState::new(storages, &test_config()).map_err(storage_failure)?;
        Ok(Self { router: router(state.clone()), store, state })
    }

    /// Sends a request and returns the status with the decoded JSON body.
    pub async fn send(&self, method: &str, uri: &str, token: Option<&str>, body: Option<Value>) -> TestResult<(StatusCode, Value)> {
        let body = body.map(|b| test_utils::serialize_json(&b)).transpose()?;
        let request = test_utils::build_authorized_request(method, uri, token, body)?;
        let (parts, body) = request.into_parts();
        let request = Request::from_parts(parts, Body::from(body));

        let response = self
            .router
            .clone()
            .oneshot(request)
            .await
            .map_err(|e| TestError::generic(format!("Request failed: {}", e)))?;
        let status = response.status();
        let bytes = response
            .into_body()
            .collect()
            .await
            .map_err(|e| TestError::generic(format!("Body read failed: {}", e)))?
            .to_bytes();
        let json = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap_or_else(|_| Value::String(String::from_utf8_lossy(&bytes).into_owned()))
        };
        Ok((status, json))
    }

    pub async fn get(&self, uri: &str, token: Option<&str>) -> TestResult<(StatusCode, Value)> {
        self.send("GET", uri, token, None).await
    }

    /// Creates an active user with the given role and returns it with a token.
    pub async fn user(&self, role: UserRole) -> TestResult<(User, String)> {
        let now = Utc::now();
        let user = User {
            id: Uuid::new_v4(),
            email: generate_unique_email(role.as_ref()),
            password_hash: self.state.auth.hash_password("secret-password").map_err(storage_failure)?,
            first_name: "Test".to_string(),
            last_name: role.to_string(),
            phone: None,
            role,
            is_active: true,
            last_login_at: None,
            created_at: now,
            updated_at: now,
        };
        self.store.create_user(&user).await.map_err(storage_failure)?;
        let token = self.state.auth.issue_token(&user, now).map_err(storage_failure)?;
        Ok((user, token))
    }

    pub async fn category(&self, name: &str) -> TestResult<Category> {
        let now = Utc::now();
        let category = Category {
            id: Uuid::new_v4(),
            name: name.to_string(),
            slug: slugify(name),
            description: None,
            image_url: None,
            sort_order: 0,
            is_active: true,
            created_at: now,
            updated_at: now,
        };
        self.store.create_category(&category).await.map_err(storage_failure)?;
        Ok(category)
    }

    pub async fn product(&self, category_id: Uuid, name: &str, price: Decimal, stock: i32) -> TestResult<Product> {
        let now = Utc::now();
        let slug = slugify(name);
        let product = Product {
            id: Uuid::new_v4(),
            name: name.to_string(),
            sku: format!("SKU-{}", slug.to_uppercase()),
            slug,
            description: None,
            price,
            compare_price: None,
            stock,
            unit: "kg".to_string(),
            category_id,
            is_active: true,
            is_featured: false,
            images: Vec::new(),
            variants: Vec::new(),
            created_at: now,
            updated_at: now,
        };
        self.store.create_product(&product).await.map_err(storage_failure)?;
        Ok(product)
    }

    pub async fn stock_of(&self, product_id: Uuid) -> TestResult<i32> {
        self.store
            .products_by_ids(&[product_id])
            .await
            .map_err(storage_failure)?
            .first()
            .map(|p| p.stock)
            .ok_or_else(|| TestError::not_found(format!("Product {}", product_id)))
    }

    /// Active public coupon valid since 2024, adjusted by `tweak`.
    pub async fn coupon(&self, code: &str, coupon_type: CouponType, value: Decimal, tweak: impl FnOnce(&mut Coupon)) -> TestResult<Coupon> {
        let now = Utc::now();
        let mut coupon = Coupon {
            id: Uuid::new_v4(),
            code: code.to_string(),
            name: code.to_string(),
            description: None,
            coupon_type,
            value,
            min_purchase: None,
            max_discount: None,
            max_usage: None,
            max_usage_per_user: DEFAULT_MAX_USAGE_PER_USER,
            times_used: 0,
            total_discount: Decimal::ZERO,
            valid_from: Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).single().unwrap_or(now),
            valid_until: None,
            is_active: true,
            is_public: true,
            applicable_products: Vec::new(),
            excluded_products: Vec::new(),
            created_at: now,
            updated_at: now,
        };
        tweak(&mut coupon);
        self.store.create_coupon(&coupon).await.map_err(storage_failure)?;
        Ok(coupon)
    }

    pub async fn coupon_by_code(&self, code: &str) -> TestResult<Coupon> {
        self.store
            .find_coupon_by_code(code)
            .await
            .map_err(storage_failure)?
            .ok_or_else(|| TestError::not_found(format!("Coupon {}", code)))
    }

    /// Places an order for `quantity` units through the API.
    pub async fn checkout(&self, token: &str, product_id: Uuid, quantity: i32, coupon_code: Option<&str>) -> TestResult<(StatusCode, Value)> {
        let body = serde_json::json!({
            "items": [{ "productId": product_id, "quantity": quantity }],
            "couponCode": coupon_code,
            "shippingAddress": { "street": "Av. Reforma 222", "city": "CDMX", "zip": "06600" },
        });
        self.send("POST", "/api/orders", Some(token), Some(body)).await
    }

    /// Same as [`TestApp::checkout`] but fails unless the order was created.
    pub async fn place_order(&self, token: &str, product_id: Uuid, quantity: i32) -> TestResult<Value> {
        let (status, body) = self.checkout(token, product_id, quantity, None).await?;
        test_utils::check_status_code(status, StatusCode::CREATED)?;
        Ok(body["data"].clone())
    }
}

pub fn json_id(value: &Value) -> TestResult<Uuid> {
    value["id"]
        .as_str()
        .and_then(|s| Uuid::parse_str(s).ok())
        .ok_or_else(|| TestError::assertion_failure(format!("No id in {}", value)))
}

pub fn json_f64(value: &Value) -> TestResult<f64> {
    value
        .as_f64()
        .ok_or_else(|| TestError::assertion_failure(format!("Expected a number, got {}", value)))
}
