use std::sync::Arc;

use axum::http::StatusCode;
use common::test_helpers::{test_utils, TestResult};
use rust_decimal_macros::dec;
use serde_json::json;

use commerce::api::Storages;
use commerce::error::CommerceError;
use commerce::model::UserRole;
use commerce::storage::InMemoryStore;

use super::helpers::TestApp;
use crate::mocks::MockCouponStore;

fn app_with_coupons(coupons: MockCouponStore) -> TestResult<TestApp> {
    let store = Arc::new(InMemoryStore::new());
    let mut storages = Storages::from_store(store.clone());
    storages.coupons = Arc::new(coupons);
    TestApp::with_storages(store, storages)
}

#[tokio::test]
async fn test_storage_failure_is_masked() -> TestResult {
    let mut coupons = MockCouponStore::new();
    coupons
        .expect_all_coupons()
        .times(1)
        .returning(|| Err(CommerceError::storage("connection refused")));
    let app = app_with_coupons(coupons)?;

    let (status, body) = app.get("/api/coupon/public", None).await?;
    test_utils::check_status_code(status, StatusCode::INTERNAL_SERVER_ERROR)?;
    test_utils::check_error_code(&body, "INTERNAL_ERROR")?;
    assert_eq!(body["error"], "Internal server error");
    assert!(!body.to_string().contains("connection refused"));
    Ok(())
}

#[tokio::test]
async fn test_unknown_code_skips_usage_lookup() -> TestResult {
    let mut coupons = MockCouponStore::new();
    coupons.expect_find_coupon_by_code().times(1).returning(|_| Ok(None));
    coupons.expect_count_user_usages().never();
    let app = app_with_coupons(coupons)?;
    let (_, token) = app.user(UserRole::Customer).await?;

    let (status, body) = app
        .send("POST", "/api/coupon/validate", Some(&token), Some(json!({ "code": "NADA", "subtotal": 100 })))
        .await?;
    test_utils::check_status_code(status, StatusCode::BAD_REQUEST)?;
    test_utils::check_error_code(&body, "COUPON_NOT_FOUND")?;
    Ok(())
}

#[tokio::test]
async fn test_quote_fails_when_coupon_lookup_fails() -> TestResult {
    let mut coupons = MockCouponStore::new();
    coupons
        .expect_find_coupon_by_code()
        .withf(|code| code == "VERANO")
        .returning(|_| Err(CommerceError::storage("timeout")));
    let app = app_with_coupons(coupons)?;
    let category = app.category("Cerdo").await?;
    let product = app.product(category.id, "Costilla", dec!(150), 4).await?;

    let body = json!({
        "items": [{ "productId": product.id, "quantity": 2 }],
        "couponCode": "VERANO",
    });
    let (status, body) = app.send("POST", "/api/cart/quote", None, Some(body)).await?;
    test_utils::check_status_code(status, StatusCode::INTERNAL_SERVER_ERROR)?;
    test_utils::check_error_code(&body, "INTERNAL_ERROR")?;
    assert_eq!(app.stock_of(product.id).await?, 4);
    Ok(())
}
