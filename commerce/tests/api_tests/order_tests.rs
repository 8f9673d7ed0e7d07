use axum::http::StatusCode;
use common::test_helpers::{test_utils, TestResult};
use rust_decimal_macros::dec;
use serde_json::json;

use commerce::model::UserRole;

use super::helpers::{json_f64, json_id, TestApp};

#[tokio::test]
async fn test_checkout_prices_order_and_reserves_stock() -> TestResult {
    let app = TestApp::new()?;
    let (_, token) = app.user(UserRole::Customer).await?;
    let beef = app.category("Res").await?;
    let ribeye = app.product(beef.id, "Rib Eye", dec!(200), 10).await?;

    let (status, body) = app.checkout(&token, ribeye.id, 1, None).await?;
    test_utils::check_status_code(status, StatusCode::CREATED)?;
    let order = &body["data"];
    assert_eq!(order["status"], "PENDING");
    assert_eq!(order["paymentStatus"], "PENDING");
    assert_eq!(json_f64(&order["subtotal"])?, 200.0);
    assert_eq!(json_f64(&order["tax"])?, 32.0);
    assert_eq!(json_f64(&order["shipping"])?, 50.0);
    assert_eq!(json_f64(&order["total"])?, 282.0);
    assert!(order["orderNumber"].as_str().is_some_and(|n| n.starts_with("ORD-")));
    assert_eq!(app.stock_of(ribeye.id).await?, 9);

    let (status, body) = app.get("/api/orders", Some(&token)).await?;
    test_utils::check_status_code(status, StatusCode::OK)?;
    assert_eq!(body["pagination"]["total"], 1);
    Ok(())
}

#[tokio::test]
async fn test_free_shipping_above_threshold() -> TestResult {
    let app = TestApp::new()?;
    let (_, token) = app.user(UserRole::Customer).await?;
    let beef = app.category("Res").await?;
    let wagyu = app.product(beef.id, "Wagyu", dec!(600), 3).await?;

    let order = app.place_order(&token, wagyu.id, 1).await?;
    assert_eq!(json_f64(&order["shipping"])?, 0.0);
    assert_eq!(json_f64(&order["total"])?, 696.0);
    Ok(())
}

#[tokio::test]
async fn test_cart_quote_does_not_touch_stock() -> TestResult {
    let app = TestApp::new()?;
    let beef = app.category("Res").await?;
    let ribeye = app.product(beef.id, "Rib Eye", dec!(150), 4).await?;

    let body = json!({ "items": [
        { "productId": ribeye.id, "quantity": 1 },
        { "productId": ribeye.id, "quantity": 2 }
    ]});
    let (status, body) = app.send("POST", "/api/cart/quote", None, Some(body)).await?;
    test_utils::check_status_code(status, StatusCode::OK)?;
    assert_eq!(body["data"]["itemCount"], 3);
    assert_eq!(body["data"]["lines"].as_array().map(Vec::len), Some(1));
    assert_eq!(json_f64(&body["data"]["subtotal"])?, 450.0);
    assert_eq!(app.stock_of(ribeye.id).await?, 4);
    Ok(())
}

#[tokio::test]
async fn test_checkout_rejections() -> TestResult {
    let app = TestApp::new()?;
    let (_, token) = app.user(UserRole::Customer).await?;
    let beef = app.category("Res").await?;
    let ribeye = app.product(beef.id, "Rib Eye", dec!(200), 2).await?;

    let (status, body) = app.checkout(&token, ribeye.id, 3, None).await?;
    test_utils::check_status_code(status, StatusCode::CONFLICT)?;
    test_utils::check_error_code(&body, "INSUFFICIENT_STOCK")?;
    assert_eq!(app.stock_of(ribeye.id).await?, 2);

    let empty = json!({ "items": [], "shippingAddress": { "street": "x" } });
    let (status, body) = app.send("POST", "/api/orders", Some(&token), Some(empty)).await?;
    test_utils::check_status_code(status, StatusCode::BAD_REQUEST)?;
    test_utils::check_error_code(&body, "VALIDATION_ERROR")?;

    let no_address = json!({ "items": [{ "productId": ribeye.id, "quantity": 1 }], "shippingAddress": null });
    let (status, _) = app.send("POST", "/api/orders", Some(&token), Some(no_address)).await?;
    test_utils::check_status_code(status, StatusCode::BAD_REQUEST)?;

    let (status, body) = app.send("POST", "/api/orders", Some(&token), None).await?;
    test_utils::check_status_code(status, StatusCode::BAD_REQUEST)?;
    test_utils::check_error_code(&body, "BAD_REQUEST")?;

    let (status, _) = app.checkout("", ribeye.id, 1, None).await?;
    test_utils::check_status_code(status, StatusCode::UNAUTHORIZED)?;
    Ok(())
}

#[tokio::test]
async fn test_orders_are_private_to_their_owner() -> TestResult {
    let app = TestApp::new()?;
    let (_, owner) = app.user(UserRole::Customer).await?;
    let (_, stranger) = app.user(UserRole::Customer).await?;
    let (_, admin) = app.user(UserRole::Admin).await?;
    let beef = app.category("Res").await?;
    let ribeye = app.product(beef.id, "Rib Eye", dec!(200), 10).await?;
    let order_id = json_id(&app.place_order(&owner, ribeye.id, 1).await?)?;

    let (status, _) = app.get(&format!("/api/orders/{}", order_id), Some(&owner)).await?;
    test_utils::check_status_code(status, StatusCode::OK)?;
    let (status, _) = app.get(&format!("/api/orders/{}", order_id), Some(&admin)).await?;
    test_utils::check_status_code(status, StatusCode::OK)?;
    let (status, body) = app.get(&format!("/api/orders/{}", order_id), Some(&stranger)).await?;
    test_utils::check_status_code(status, StatusCode::NOT_FOUND)?;
    test_utils::check_error_code(&body, "NOT_FOUND")?;

    let (status, _) = app.get("/api/orders/not-a-uuid", Some(&owner)).await?;
    test_utils::check_status_code(status, StatusCode::BAD_REQUEST)?;
    Ok(())
}

#[tokio::test]
async fn test_customer_cancel_restocks_once() -> TestResult {
    let app = TestApp::new()?;
    let (_, token) = app.user(UserRole::Customer).await?;
    let beef = app.category("Res").await?;
    let ribeye = app.product(beef.id, "Rib Eye", dec!(200), 10).await?;
    let order_id = json_id(&app.place_order(&token, ribeye.id, 3).await?)?;
    assert_eq!(app.stock_of(ribeye.id).await?, 7);

    let uri = format!("/api/orders/{}/cancel", order_id);
    let (status, body) = app.send("POST", &uri, Some(&token), None).await?;
    test_utils::check_status_code(status, StatusCode::OK)?;
    assert_eq!(body["data"]["status"], "CANCELLED");
    assert_eq!(body["data"]["cancelReason"], "Cancelled by customer");
    assert_eq!(app.stock_of(ribeye.id).await?, 10);

    let (status, _) = app.send("POST", &uri, Some(&token), Some(json!({ "reason": "again" }))).await?;
    test_utils::check_status_code(status, StatusCode::BAD_REQUEST)?;
    assert_eq!(app.stock_of(ribeye.id).await?, 10);
    Ok(())
}

#[tokio::test]
async fn test_customer_cannot_cancel_once_preparation_started() -> TestResult {
    let app = TestApp::new()?;
    let (_, token) = app.user(UserRole::Customer).await?;
    let (_, admin) = app.user(UserRole::Admin).await?;
    let beef = app.category("Res").await?;
    let ribeye = app.product(beef.id, "Rib Eye", dec!(200), 10).await?;
    let order_id = json_id(&app.place_order(&token, ribeye.id, 1).await?)?;

    let (status, _) = app
        .send("PUT", &format!("/api/admin/orders/{}/status", order_id), Some(&admin), Some(json!({ "status": "PROCESSING" })))
        .await?;
    test_utils::check_status_code(status, StatusCode::OK)?;

    let (status, body) = app.send("POST", &format!("/api/orders/{}/cancel", order_id), Some(&token), None).await?;
    test_utils::check_status_code(status, StatusCode::BAD_REQUEST)?;
    test_utils::check_error_code(&body, "VALIDATION_ERROR")?;

    let (status, body) = app
        .send("DELETE", &format!("/api/admin/orders/{}", order_id), Some(&admin), Some(json!({ "reason": "Out of stock at the store" })))
        .await?;
    test_utils::check_status_code(status, StatusCode::OK)?;
    assert_eq!(body["data"]["status"], "CANCELLED");
    Ok(())
}

#[tokio::test]
async fn test_admin_status_changes_follow_the_state_machine() -> TestResult {
    let app = TestApp::new()?;
    let (_, token) = app.user(UserRole::Customer).await?;
    let (_, admin) = app.user(UserRole::Admin).await?;
    let beef = app.category("Res").await?;
    let ribeye = app.product(beef.id, "Rib Eye", dec!(200), 10).await?;
    let order_id = json_id(&app.place_order(&token, ribeye.id, 1).await?)?;
    let status_uri = format!("/api/admin/orders/{}/status", order_id);

    let (status, body) = app
        .send("PUT", &status_uri, Some(&admin), Some(json!({ "status": "CONFIRMED", "note": "Payment verified" })))
        .await?;
    test_utils::check_status_code(status, StatusCode::OK)?;
    assert_eq!(body["data"]["status"], "CONFIRMED");

    let (status, body) = app.send("PUT", &status_uri, Some(&admin), Some(json!({ "status": "PENDING" }))).await?;
    test_utils::check_status_code(status, StatusCode::UNPROCESSABLE_ENTITY)?;
    test_utils::check_error_code(&body, "INVALID_TRANSITION")?;

    let (status, body) = app.get(&format!("/api/orders/{}/tracking", order_id), Some(&token)).await?;
    test_utils::check_status_code(status, StatusCode::OK)?;
    let events = body["data"]["events"].as_array().cloned().unwrap_or_default();
    assert_eq!(events.len(), 2);
    assert_eq!(events[1]["status"], "CONFIRMED");
    assert_eq!(events[1]["description"], "Payment verified");

    let payment_uri = format!("/api/admin/orders/{}/payment", order_id);
    let (status, body) = app.send("PUT", &payment_uri, Some(&admin), Some(json!({ "paymentStatus": "PAID" }))).await?;
    test_utils::check_status_code(status, StatusCode::OK)?;
    assert_eq!(body["data"]["paymentStatus"], "PAID");
    assert!(body["data"]["paidAt"].is_string());

    let (status, body) = app.send("PUT", &payment_uri, Some(&admin), Some(json!({ "paymentStatus": "PENDING" }))).await?;
    test_utils::check_status_code(status, StatusCode::UNPROCESSABLE_ENTITY)?;
    test_utils::check_error_code(&body, "INVALID_TRANSITION")?;

    let (status, body) = app.get("/api/payments/history", Some(&token)).await?;
    test_utils::check_status_code(status, StatusCode::OK)?;
    assert_eq!(body["data"][0]["paymentStatus"], "PAID");
    assert_eq!(json_f64(&body["data"][0]["amount"])?, 282.0);
    Ok(())
}

#[tokio::test]
async fn test_delivered_order_awards_loyalty_points_once() -> TestResult {
    let app = TestApp::new()?;
    let (_, token) = app.user(UserRole::Customer).await?;
    let (_, admin) = app.user(UserRole::Admin).await?;
    let beef = app.category("Res").await?;
    let ribeye = app.product(beef.id, "Rib Eye", dec!(200), 10).await?;
    let order_id = json_id(&app.place_order(&token, ribeye.id, 1).await?)?;

    let (status, _) = app
        .send("PUT", &format!("/api/admin/orders/{}/status", order_id), Some(&admin), Some(json!({ "status": "DELIVERED" })))
        .await?;
    test_utils::check_status_code(status, StatusCode::OK)?;

    let (status, body) = app.get("/api/gamification/loyalty", Some(&token)).await?;
    test_utils::check_status_code(status, StatusCode::OK)?;
    assert_eq!(body["data"]["currentPoints"], 282);
    assert_eq!(body["data"]["tier"], "BRONZE");
    assert_eq!(body["data"]["nextTier"], "SILVER");

    let (_, body) = app.get("/api/gamification/loyalty/transactions", Some(&token)).await?;
    assert_eq!(body["pagination"]["total"], 1);
    assert_eq!(body["data"][0]["kind"], "EARNED");

    let (status, body) = app
        .send("POST", "/api/gamification/loyalty/redeem", Some(&token), Some(json!({ "points": 100 })))
        .await?;
    test_utils::check_status_code(status, StatusCode::OK)?;
    assert_eq!(body["data"]["currentPoints"], 182);

    let (status, body) = app
        .send("POST", "/api/gamification/loyalty/redeem", Some(&token), Some(json!({ "points": 1000 })))
        .await?;
    test_utils::check_status_code(status, StatusCode::BAD_REQUEST)?;
    test_utils::check_error_code(&body, "VALIDATION_ERROR")?;
    Ok(())
}

#[tokio::test]
async fn test_loyalty_defaults_for_new_customers() -> TestResult {
    let app = TestApp::new()?;
    let (_, token) = app.user(UserRole::Customer).await?;

    let (status, body) = app.get("/api/gamification/loyalty", Some(&token)).await?;
    test_utils::check_status_code(status, StatusCode::OK)?;
    assert_eq!(body["data"]["currentPoints"], 0);
    assert_eq!(body["data"]["tier"], "BRONZE");

    let (status, body) = app.get("/api/gamification/tiers", None).await?;
    test_utils::check_status_code(status, StatusCode::OK)?;
    assert_eq!(body["data"].as_array().map(Vec::len), Some(5));
    assert_eq!(body["data"][4]["tier"], "DIAMOND");
    Ok(())
}
