use axum::http::StatusCode;
use common::test_helpers::{test_utils, TestResult};
use rust_decimal_macros::dec;
use serde_json::json;

use commerce::model::UserRole;

use super::helpers::{json_id, TestApp};

#[tokio::test]
async fn test_public_catalog_lists_active_products_by_category() -> TestResult {
    let app = TestApp::new()?;
    let beef = app.category("Res").await?;
    let pork = app.category("Cerdo").await?;
    app.product(beef.id, "Rib Eye", dec!(450), 10).await?;
    app.product(beef.id, "Arrachera", dec!(320), 5).await?;
    app.product(pork.id, "Costilla BBQ", dec!(210), 8).await?;

    let (status, body) = app.get("/api/products?category=res&sort=price_asc", None).await?;
    test_utils::check_status_code(status, StatusCode::OK)?;
    assert_eq!(body["pagination"]["total"], 2);
    assert_eq!(body["data"][0]["name"], "Arrachera");
    assert_eq!(body["data"][1]["name"], "Rib Eye");

    let (status, body) = app.get("/api/products?category=no-such-category", None).await?;
    test_utils::check_status_code(status, StatusCode::OK)?;
    assert_eq!(body["pagination"]["total"], 0);

    let (_, body) = app.get("/api/products?search=costilla", None).await?;
    assert_eq!(body["pagination"]["total"], 1);

    let (status, body) = app.get("/api/categories/cerdo", None).await?;
    test_utils::check_status_code(status, StatusCode::OK)?;
    assert_eq!(body["data"]["name"], "Cerdo");
    assert_eq!(body["data"]["products"].as_array().map(Vec::len), Some(1));
    Ok(())
}

#[tokio::test]
async fn test_product_lookup_by_slug_and_pagination() -> TestResult {
    let app = TestApp::new()?;
    let beef = app.category("Res").await?;
    for i in 0..5 {
        app.product(beef.id, &format!("Corte {}", i), dec!(100), 3).await?;
    }

    let (status, body) = app.get("/api/products/corte-3", None).await?;
    test_utils::check_status_code(status, StatusCode::OK)?;
    assert_eq!(body["data"]["sku"], "SKU-CORTE-3");

    let (status, body) = app.get("/api/products?page=2&limit=2", None).await?;
    test_utils::check_status_code(status, StatusCode::OK)?;
    assert_eq!(body["data"].as_array().map(Vec::len), Some(2));
    assert_eq!(body["pagination"], json!({ "page": 2, "limit": 2, "total": 5, "pages": 3 }));

    let (status, body) = app.get("/api/products/no-such-cut", None).await?;
    test_utils::check_status_code(status, StatusCode::NOT_FOUND)?;
    test_utils::check_error_code(&body, "NOT_FOUND")?;
    Ok(())
}

#[tokio::test]
async fn test_admin_product_lifecycle() -> TestResult {
    let app = TestApp::new()?;
    let (_, admin) = app.user(UserRole::Admin).await?;
    let beef = app.category("Res").await?;

    let draft = json!({
        "name": "T-Bone Prime",
        "sku": "tbn-001",
        "price": 520.0,
        "stock": 12,
        "categoryId": beef.id,
        "variants": [{ "name": "1 kg", "sku": "tbn-001-1", "price": 520.0, "stock": 4 }]
    });
    let (status, body) = app.send("POST", "/api/admin/products", Some(&admin), Some(draft.clone())).await?;
    test_utils::check_status_code(status, StatusCode::CREATED)?;
    assert_eq!(body["data"]["slug"], "t-bone-prime");
    assert_eq!(body["data"]["sku"], "TBN-001");
    let product_id = json_id(&body["data"])?;

    let (status, body) = app.send("POST", "/api/admin/products", Some(&admin), Some(draft)).await?;
    test_utils::check_status_code(status, StatusCode::CONFLICT)?;
    test_utils::check_error_code(&body, "CONFLICT")?;

    let (status, _) = app
        .send("DELETE", &format!("/api/admin/products/{}", product_id), Some(&admin), None)
        .await?;
    test_utils::check_status_code(status, StatusCode::OK)?;

    let (status, _) = app.get("/api/products/t-bone-prime", None).await?;
    test_utils::check_status_code(status, StatusCode::NOT_FOUND)?;

    let (status, body) = app.get("/api/admin/products?isActive=false", Some(&admin)).await?;
    test_utils::check_status_code(status, StatusCode::OK)?;
    assert_eq!(body["pagination"]["total"], 1);
    Ok(())
}

#[tokio::test]
async fn test_category_with_products_cannot_be_deleted() -> TestResult {
    let app = TestApp::new()?;
    let (_, admin) = app.user(UserRole::Admin).await?;
    let beef = app.category("Res").await?;
    app.product(beef.id, "Picaña", dec!(380), 6).await?;

    let (status, body) = app
        .send("DELETE", &format!("/api/admin/categories/{}", beef.id), Some(&admin), None)
        .await?;
    test_utils::check_status_code(status, StatusCode::CONFLICT)?;
    test_utils::check_error_code(&body, "CONFLICT")?;
    Ok(())
}

#[tokio::test]
async fn test_admin_edits_keep_stock_sold_after_the_admin_loaded_the_product() -> TestResult {
    let app = TestApp::new()?;
    let (_, admin) = app.user(UserRole::Admin).await?;
    let (_, customer) = app.user(UserRole::Customer).await?;
    let beef = app.category("Res").await?;

    let draft = json!({
        "name": "Sirloin",
        "sku": "sir-001",
        "price": 300.0,
        "stock": 10,
        "categoryId": beef.id,
        "variants": [{ "name": "2 kg", "sku": "sir-001-2", "price": 580.0, "stock": 6 }]
    });
    let (status, body) = app.send("POST", "/api/admin/products", Some(&admin), Some(draft)).await?;
    test_utils::check_status_code(status, StatusCode::CREATED)?;
    let product_id = json_id(&body["data"])?;
    let variant_id = json_id(&body["data"]["variants"][0])?;
    let product_uri = format!("/api/admin/products/{}", product_id);

    // The admin form is loaded before the sale goes through.
    let (status, form) = app.get(&product_uri, Some(&admin)).await?;
    test_utils::check_status_code(status, StatusCode::OK)?;
    assert_eq!(form["data"]["stock"], 10);

    let order = json!({
        "items": [
            { "productId": product_id, "quantity": 3 },
            { "productId": product_id, "variantId": variant_id, "quantity": 2 }
        ],
        "shippingAddress": { "street": "Av. Juárez 10" },
    });
    let (status, _) = app.send("POST", "/api/orders", Some(&customer), Some(order)).await?;
    test_utils::check_status_code(status, StatusCode::CREATED)?;

    let (status, body) = app
        .send("PUT", &product_uri, Some(&admin), Some(json!({ "price": 320.0, "isFeatured": true })))
        .await?;
    test_utils::check_status_code(status, StatusCode::OK)?;
    assert_eq!(body["data"]["stock"], 7);
    assert_eq!(body["data"]["variants"][0]["stock"], 4);

    let (status, body) = app
        .send(
            "POST",
            &format!("{}/variants", product_uri),
            Some(&admin),
            Some(json!({ "name": "1 kg", "sku": "sir-001-1", "price": 310.0, "stock": 8 })),
        )
        .await?;
    test_utils::check_status_code(status, StatusCode::CREATED)?;
    assert_eq!(body["data"]["sku"], "SIR-001-1");

    let (status, body) = app
        .send("PUT", &format!("{}/variants/{}", product_uri, variant_id), Some(&admin), Some(json!({ "price": 600.0 })))
        .await?;
    test_utils::check_status_code(status, StatusCode::OK)?;
    assert_eq!(body["data"]["stock"], 4);

    assert_eq!(app.stock_of(product_id).await?, 7);
    let (_, body) = app.get(&product_uri, Some(&admin)).await?;
    assert_eq!(body["data"]["variants"].as_array().map(Vec::len), Some(2));
    Ok(())
}
