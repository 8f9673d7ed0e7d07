use axum::http::StatusCode;
use common::test_helpers::{test_utils, TestResult};
use rust_decimal_macros::dec;
use serde_json::json;

use commerce::model::UserRole;

use super::helpers::{json_f64, json_id, TestApp};

#[tokio::test]
async fn test_saved_cart_merges_items_and_prices_like_checkout() -> TestResult {
    let app = TestApp::new()?;
    let (_, token) = app.user(UserRole::Customer).await?;
    let beef = app.category("Res").await?;
    let ribeye = app.product(beef.id, "Rib Eye", dec!(120), 5).await?;

    let (status, body) = app
        .send("POST", "/api/cart/add", Some(&token), Some(json!({ "productId": ribeye.id, "quantity": 2 })))
        .await?;
    test_utils::check_status_code(status, StatusCode::OK)?;
    assert_eq!(body["data"]["cartItem"]["quantity"], 2);
    let item_id = json_id(&body["data"]["cartItem"])?;

    let (status, body) = app
        .send("POST", "/api/cart", Some(&token), Some(json!({ "productId": ribeye.id, "quantity": 1 })))
        .await?;
    test_utils::check_status_code(status, StatusCode::OK)?;
    assert_eq!(json_id(&body["data"]["cartItem"])?, item_id);

    let (status, body) = app.get("/api/cart", Some(&token)).await?;
    test_utils::check_status_code(status, StatusCode::OK)?;
    assert_eq!(body["data"]["items"].as_array().map(Vec::len), Some(1));
    assert_eq!(body["data"]["items"][0]["quantity"], 3);
    assert_eq!(body["data"]["items"][0]["name"], "Rib Eye");
    assert_eq!(json_f64(&body["data"]["summary"]["subtotal"])?, 360.0);
    assert_eq!(json_f64(&body["data"]["summary"]["tax"])?, 57.6);
    assert_eq!(json_f64(&body["data"]["summary"]["shipping"])?, 50.0);

    let (status, body) = app.get("/api/cart/summary", Some(&token)).await?;
    test_utils::check_status_code(status, StatusCode::OK)?;
    assert_eq!(body["data"]["itemCount"], 3);
    assert_eq!(json_f64(&body["data"]["total"])?, 467.6);
    Ok(())
}

#[tokio::test]
async fn test_cart_rejects_quantities_beyond_stock() -> TestResult {
    let app = TestApp::new()?;
    let (_, token) = app.user(UserRole::Customer).await?;
    let beef = app.category("Res").await?;
    let ribeye = app.product(beef.id, "Rib Eye", dec!(120), 3).await?;

    let (status, body) = app
        .send("POST", "/api/cart/add", Some(&token), Some(json!({ "productId": ribeye.id, "quantity": 4 })))
        .await?;
    test_utils::check_status_code(status, StatusCode::CONFLICT)?;
    test_utils::check_error_code(&body, "INSUFFICIENT_STOCK")?;

    let (status, body) = app
        .send("POST", "/api/cart/add", Some(&token), Some(json!({ "productId": ribeye.id, "quantity": 0 })))
        .await?;
    test_utils::check_status_code(status, StatusCode::BAD_REQUEST)?;
    test_utils::check_error_code(&body, "VALIDATION_ERROR")?;

    let (_, body) = app
        .send("POST", "/api/cart/add", Some(&token), Some(json!({ "productId": ribeye.id, "quantity": 1 })))
        .await?;
    let item_id = json_id(&body["data"]["cartItem"])?;
    let (status, _) = app
        .send("PUT", &format!("/api/cart/items/{}", item_id), Some(&token), Some(json!({ "quantity": 5 })))
        .await?;
    test_utils::check_status_code(status, StatusCode::CONFLICT)?;

    let (status, body) = app
        .send("PUT", &format!("/api/cart/items/{}", item_id), Some(&token), Some(json!({ "quantity": 3 })))
        .await?;
    test_utils::check_status_code(status, StatusCode::OK)?;
    assert_eq!(body["data"]["cart"]["summary"]["itemCount"], 3);
    Ok(())
}

#[tokio::test]
async fn test_cart_items_are_private_and_clearable() -> TestResult {
    let app = TestApp::new()?;
    let (_, owner) = app.user(UserRole::Customer).await?;
    let (_, other) = app.user(UserRole::Customer).await?;
    let pork = app.category("Cerdo").await?;
    let ribs = app.product(pork.id, "Costilla", dec!(90), 10).await?;
    let chop = app.product(pork.id, "Chuleta", dec!(70), 10).await?;

    let (_, body) = app
        .send("POST", "/api/cart/add", Some(&owner), Some(json!({ "productId": ribs.id, "quantity": 1 })))
        .await?;
    let item_id = json_id(&body["data"]["cartItem"])?;
    app.send("POST", "/api/cart/add", Some(&owner), Some(json!({ "productId": chop.id, "quantity": 2 })))
        .await?;

    let item_uri = format!("/api/cart/items/{}", item_id);
    let (status, body) = app.send("DELETE", &item_uri, Some(&other), None).await?;
    test_utils::check_status_code(status, StatusCode::NOT_FOUND)?;
    test_utils::check_error_code(&body, "NOT_FOUND")?;
    let (_, body) = app.get("/api/cart", Some(&other)).await?;
    assert_eq!(body["data"]["items"].as_array().map(Vec::len), Some(0));
    assert_eq!(json_f64(&body["data"]["summary"]["total"])?, 0.0);

    let (status, body) = app.send("DELETE", &item_uri, Some(&owner), None).await?;
    test_utils::check_status_code(status, StatusCode::OK)?;
    assert_eq!(body["data"]["items"].as_array().map(Vec::len), Some(1));

    let (status, body) = app.send("DELETE", "/api/cart/clear", Some(&owner), None).await?;
    test_utils::check_status_code(status, StatusCode::OK)?;
    assert_eq!(body["data"]["itemsRemoved"], 1);

    let (status, _) = app.get("/api/cart", None).await?;
    test_utils::check_status_code(status, StatusCode::UNAUTHORIZED)?;
    Ok(())
}
