use axum::http::StatusCode;
use common::test_helpers::{test_utils, TestResult};
use rust_decimal_macros::dec;
use serde_json::json;

use commerce::model::UserRole;

use super::helpers::{json_f64, json_id, TestApp};

/// Two orders for one customer, the second one cancelled.
async fn shop_with_sales() -> TestResult<(TestApp, String)> {
    let app = TestApp::new()?;
    let (_, customer) = app.user(UserRole::Customer).await?;
    let (_, admin) = app.user(UserRole::Admin).await?;
    let beef = app.category("Res").await?;
    let ribeye = app.product(beef.id, "Rib Eye", dec!(200), 10).await?;
    let chorizo = app.product(beef.id, "Chorizo", dec!(80), 3).await?;

    app.place_order(&customer, ribeye.id, 1).await?;
    let cancelled = json_id(&app.place_order(&customer, chorizo.id, 1).await?)?;
    let (status, _) = app
        .send("POST", &format!("/api/orders/{}/cancel", cancelled), Some(&customer), None)
        .await?;
    test_utils::check_status_code(status, StatusCode::OK)?;
    Ok((app, admin))
}

#[tokio::test]
async fn test_dashboard_excludes_cancelled_revenue() -> TestResult {
    let (app, admin) = shop_with_sales().await?;

    let (status, body) = app.get("/api/reports/dashboard?lowStockThreshold=5", Some(&admin)).await?;
    test_utils::check_status_code(status, StatusCode::OK)?;
    let data = &body["data"];
    assert_eq!(data["overview"]["totalOrders"], 2);
    assert_eq!(json_f64(&data["overview"]["totalSales"])?, 282.0);
    assert_eq!(data["overview"]["totalCustomers"], 1);
    assert_eq!(data["overview"]["totalProducts"], 2);
    assert_eq!(data["orderStats"]["PENDING"], 1);
    assert_eq!(data["orderStats"]["CANCELLED"], 1);
    assert_eq!(data["lowStock"].as_array().map(Vec::len), Some(1));
    assert_eq!(data["lowStock"][0]["name"], "Chorizo");
    assert_eq!(data["recentOrders"].as_array().map(Vec::len), Some(2));
    Ok(())
}

#[tokio::test]
async fn test_sales_report_filters_by_status() -> TestResult {
    let (app, admin) = shop_with_sales().await?;

    let (status, body) = app.get("/api/reports/sales?status=CANCELLED", Some(&admin)).await?;
    test_utils::check_status_code(status, StatusCode::OK)?;
    assert_eq!(body["data"]["stats"]["totalOrders"], 1);
    assert_eq!(json_f64(&body["data"]["stats"]["totalRevenue"])?, 0.0);

    let (status, body) = app.get("/api/reports/sales?startDate=2031-01-01&endDate=2030-01-01", Some(&admin)).await?;
    test_utils::check_status_code(status, StatusCode::BAD_REQUEST)?;
    test_utils::check_error_code(&body, "VALIDATION_ERROR")?;
    Ok(())
}

#[tokio::test]
async fn test_top_products_and_customers() -> TestResult {
    let (app, admin) = shop_with_sales().await?;

    let (status, body) = app.get("/api/reports/products/top?limit=1", Some(&admin)).await?;
    test_utils::check_status_code(status, StatusCode::OK)?;
    assert_eq!(body["data"].as_array().map(Vec::len), Some(1));
    assert_eq!(body["data"][0]["name"], "Rib Eye");

    let (status, body) = app.get("/api/reports/customers/top", Some(&admin)).await?;
    test_utils::check_status_code(status, StatusCode::OK)?;
    assert_eq!(body["data"].as_array().map(Vec::len), Some(1));
    assert_eq!(json_f64(&body["data"][0]["totalSpent"])?, 282.0);
    Ok(())
}

#[tokio::test]
async fn test_revenue_and_inventory_reports() -> TestResult {
    let (app, admin) = shop_with_sales().await?;

    let (status, body) = app.get("/api/reports/revenue?period=month", Some(&admin)).await?;
    test_utils::check_status_code(status, StatusCode::OK)?;
    assert_eq!(body["data"].as_array().map(Vec::len), Some(1));
    assert_eq!(json_f64(&body["data"][0]["revenue"])?, 282.0);
    assert_eq!(body["data"][0]["orders"], 1);

    let (status, body) = app.get("/api/reports/inventory", Some(&admin)).await?;
    test_utils::check_status_code(status, StatusCode::OK)?;
    assert_eq!(body["data"]["summary"]["totalProducts"], 2);
    assert_eq!(body["data"]["summary"]["totalStock"], 12);
    assert_eq!(body["data"]["categories"][0]["name"], "Res");
    Ok(())
}

#[tokio::test]
async fn test_reports_require_admin() -> TestResult {
    let app = TestApp::new()?;
    let (_, customer) = app.user(UserRole::Customer).await?;

    for uri in ["/api/reports/dashboard", "/api/reports/inventory", "/api/reports/coupons"] {
        let (status, _) = app.get(uri, Some(&customer)).await?;
        test_utils::check_status_code(status, StatusCode::FORBIDDEN)?;
    }
    let (status, _) = app.get("/api/reports/sales", None).await?;
    test_utils::check_status_code(status, StatusCode::UNAUTHORIZED)?;

    let (status, body) = app.get("/health", None).await?;
    test_utils::check_status_code(status, StatusCode::OK)?;
    assert_eq!(body, json!("OK"));
    Ok(())
}
