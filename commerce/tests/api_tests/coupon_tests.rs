use std::sync::Arc;

use axum::http::StatusCode;
use common::test_helpers::{generate_unique_code, test_utils, TestResult};
use rust_decimal_macros::dec;
use serde_json::json;

use commerce::model::{CouponType, UserRole};

use super::helpers::{json_f64, json_id, TestApp};

#[tokio::test]
async fn test_validate_quotes_discount_without_redeeming() -> TestResult {
    let app = TestApp::new()?;
    let code = generate_unique_code("asado");
    app.coupon(&code, CouponType::Percentage, dec!(10), |_| {}).await?;

    let body = json!({ "code": code.to_lowercase(), "subtotal": 200 });
    let (status, body) = app.send("POST", "/api/coupon/validate", None, Some(body)).await?;
    test_utils::check_status_code(status, StatusCode::OK)?;
    assert_eq!(body["data"]["valid"], true);
    assert_eq!(json_f64(&body["data"]["discount"])?, 20.0);
    assert_eq!(body["data"]["type"], "PERCENTAGE");
    assert_eq!(app.coupon_by_code(&code).await?.times_used, 0);
    Ok(())
}

#[tokio::test]
async fn test_validate_rejections_carry_reason_codes() -> TestResult {
    let app = TestApp::new()?;
    let min_code = generate_unique_code("min");
    app.coupon(&min_code, CouponType::FixedAmount, dec!(50), |c| c.min_purchase = Some(dec!(300))).await?;
    let off_code = generate_unique_code("off");
    app.coupon(&off_code, CouponType::FixedAmount, dec!(50), |c| c.is_active = false).await?;

    let cases = [
        ("NOPE-NOT-REAL".to_string(), "COUPON_NOT_FOUND"),
        (min_code, "COUPON_MIN_PURCHASE"),
        (off_code, "COUPON_INACTIVE"),
    ];
    for (code, expected) in cases {
        let (status, body) = app
            .send("POST", "/api/coupon/validate", None, Some(json!({ "code": code, "subtotal": 200 })))
            .await?;
        test_utils::check_status_code(status, StatusCode::BAD_REQUEST)?;
        test_utils::check_error_code(&body, expected)?;
    }
    Ok(())
}

#[tokio::test]
async fn test_checkout_redeems_coupon_and_enforces_per_user_limit() -> TestResult {
    let app = TestApp::new()?;
    let (_, token) = app.user(UserRole::Customer).await?;
    let beef = app.category("Res").await?;
    let ribeye = app.product(beef.id, "Rib Eye", dec!(200), 10).await?;
    let code = generate_unique_code("parrilla");
    app.coupon(&code, CouponType::Percentage, dec!(10), |_| {}).await?;

    let (status, body) = app.checkout(&token, ribeye.id, 1, Some(&code)).await?;
    test_utils::check_status_code(status, StatusCode::CREATED)?;
    assert_eq!(json_f64(&body["data"]["discount"])?, 20.0);
    assert_eq!(json_f64(&body["data"]["total"])?, 262.0);

    let coupon = app.coupon_by_code(&code).await?;
    assert_eq!(coupon.times_used, 1);
    assert_eq!(coupon.total_discount, dec!(20));

    let (status, body) = app.checkout(&token, ribeye.id, 1, Some(&code)).await?;
    test_utils::check_status_code(status, StatusCode::BAD_REQUEST)?;
    test_utils::check_error_code(&body, "COUPON_USER_LIMIT")?;
    assert_eq!(app.stock_of(ribeye.id).await?, 9);

    let (status, body) = app.get("/api/coupon/my-usage", Some(&token)).await?;
    test_utils::check_status_code(status, StatusCode::OK)?;
    assert_eq!(body["data"][0]["code"], code.as_str());
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_global_usage_limit_holds_under_concurrent_checkouts() -> TestResult {
    let app = Arc::new(TestApp::new()?);
    let beef = app.category("Res").await?;
    let ribeye = app.product(beef.id, "Rib Eye", dec!(200), 100).await?;
    let code = generate_unique_code("flash");
    app.coupon(&code, CouponType::FixedAmount, dec!(30), |c| c.max_usage = Some(3)).await?;

    let mut tokens = Vec::new();
    for _ in 0..10 {
        tokens.push(app.user(UserRole::Customer).await?.1);
    }
    let handles: Vec<_> = tokens
        .into_iter()
        .map(|token| {
            let app = app.clone();
            let code = code.clone();
            tokio::spawn(async move { app.checkout(&token, ribeye.id, 1, Some(&code)).await })
        })
        .collect();

    let mut created = 0;
    let mut limited = 0;
    for handle in handles {
        let (status, body) = handle
            .await
            .map_err(|e| common::test_helpers::TestError::generic(e.to_string()))??;
        match status {
            StatusCode::CREATED => created += 1,
            _ => {
                test_utils::check_error_code(&body, "COUPON_USAGE_LIMIT")?;
                limited += 1;
            }
        }
    }
    assert_eq!(created, 3);
    assert_eq!(limited, 7);
    assert_eq!(app.coupon_by_code(&code).await?.times_used, 3);
    assert_eq!(app.stock_of(ribeye.id).await?, 97);
    Ok(())
}

#[tokio::test]
async fn test_apply_coupon_to_pending_order() -> TestResult {
    let app = TestApp::new()?;
    let (_, token) = app.user(UserRole::Customer).await?;
    let (_, stranger) = app.user(UserRole::Customer).await?;
    let beef = app.category("Res").await?;
    let ribeye = app.product(beef.id, "Rib Eye", dec!(200), 10).await?;
    let code = generate_unique_code("envio");
    app.coupon(&code, CouponType::FreeShipping, dec!(0), |_| {}).await?;
    let order_id = json_id(&app.place_order(&token, ribeye.id, 1).await?)?;

    let request = json!({ "code": code, "orderId": order_id });
    let (status, body) = app.send("POST", "/api/coupon/apply", Some(&stranger), Some(request.clone())).await?;
    test_utils::check_status_code(status, StatusCode::NOT_FOUND)?;
    test_utils::check_error_code(&body, "NOT_FOUND")?;

    let (status, body) = app.send("POST", "/api/coupon/apply", Some(&token), Some(request.clone())).await?;
    test_utils::check_status_code(status, StatusCode::OK)?;
    assert_eq!(json_f64(&body["data"]["order"]["shipping"])?, 0.0);
    assert_eq!(json_f64(&body["data"]["order"]["total"])?, 232.0);

    let (status, body) = app.send("POST", "/api/coupon/apply", Some(&token), Some(request)).await?;
    test_utils::check_status_code(status, StatusCode::CONFLICT)?;
    test_utils::check_error_code(&body, "CONFLICT")?;
    Ok(())
}

#[tokio::test]
async fn test_admin_coupon_management() -> TestResult {
    let app = TestApp::new()?;
    let (_, admin) = app.user(UserRole::Admin).await?;
    let (_, customer) = app.user(UserRole::Customer).await?;
    let code = generate_unique_code("bienvenida");

    let draft = json!({ "code": code.to_lowercase(), "type": "PERCENTAGE", "value": 15, "isPublic": true });
    let (status, _) = app.send("POST", "/api/coupon/admin/create", Some(&customer), Some(draft.clone())).await?;
    test_utils::check_status_code(status, StatusCode::FORBIDDEN)?;

    let (status, body) = app.send("POST", "/api/coupon/admin/create", Some(&admin), Some(draft.clone())).await?;
    test_utils::check_status_code(status, StatusCode::CREATED)?;
    assert_eq!(body["data"]["code"], code.as_str());
    let coupon_id = json_id(&body["data"])?;

    let (status, _) = app.send("POST", "/api/coupon/admin/create", Some(&admin), Some(draft)).await?;
    test_utils::check_status_code(status, StatusCode::CONFLICT)?;

    let bad = json!({ "code": generate_unique_code("bad"), "type": "PERCENTAGE", "value": 150 });
    let (status, body) = app.send("POST", "/api/coupon/admin/create", Some(&admin), Some(bad)).await?;
    test_utils::check_status_code(status, StatusCode::BAD_REQUEST)?;
    test_utils::check_error_code(&body, "VALIDATION_ERROR")?;

    let (status, body) = app
        .send("PUT", &format!("/api/coupon/admin/{}", coupon_id), Some(&admin), Some(json!({ "value": 20 })))
        .await?;
    test_utils::check_status_code(status, StatusCode::OK)?;
    assert_eq!(json_f64(&body["data"]["value"])?, 20.0);

    let (status, body) = app.get("/api/coupon/public", None).await?;
    test_utils::check_status_code(status, StatusCode::OK)?;
    assert!(body["data"].as_array().is_some_and(|c| c.iter().any(|c| c["code"] == code.as_str())));

    let (status, _) = app.send("DELETE", &format!("/api/coupon/admin/{}", coupon_id), Some(&admin), None).await?;
    test_utils::check_status_code(status, StatusCode::OK)?;
    let (status, _) = app.get(&format!("/api/coupon/admin/{}", coupon_id), Some(&admin)).await?;
    test_utils::check_status_code(status, StatusCode::NOT_FOUND)?;
    Ok(())
}

#[tokio::test]
async fn test_redeemed_coupon_cannot_be_deleted() -> TestResult {
    let app = TestApp::new()?;
    let (_, admin) = app.user(UserRole::Admin).await?;
    let (_, token) = app.user(UserRole::Customer).await?;
    let beef = app.category("Res").await?;
    let ribeye = app.product(beef.id, "Rib Eye", dec!(200), 10).await?;
    let code = generate_unique_code("used");
    let coupon = app.coupon(&code, CouponType::FixedAmount, dec!(25), |_| {}).await?;
    let (status, _) = app.checkout(&token, ribeye.id, 1, Some(&code)).await?;
    test_utils::check_status_code(status, StatusCode::CREATED)?;

    let (status, body) = app.send("DELETE", &format!("/api/coupon/admin/{}", coupon.id), Some(&admin), None).await?;
    test_utils::check_status_code(status, StatusCode::CONFLICT)?;
    test_utils::check_error_code(&body, "CONFLICT")?;

    let (status, body) = app.get("/api/coupon/admin/stats", Some(&admin)).await?;
    test_utils::check_status_code(status, StatusCode::OK)?;
    assert_eq!(body["data"]["totalUsages"], 1);
    Ok(())
}
