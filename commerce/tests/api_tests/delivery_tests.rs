use axum::http::StatusCode;
use common::test_helpers::{test_utils, TestResult};
use rust_decimal_macros::dec;
use serde_json::json;
use uuid::Uuid;

use chrono::Utc;
use commerce::error::CommerceError;
use commerce::model::{User, UserRole};
use commerce::services::LocationReport;
use commerce::tracking::OrderSnapshot;

use super::helpers::{json_id, storage_failure, TestApp};

struct Scenario {
    app: TestApp,
    customer_user: User,
    customer: String,
    admin_user: User,
    admin: String,
    driver_id: Uuid,
    driver_user: User,
    driver: String,
    order_id: Uuid,
}

/// A READY order with a driver assigned to it.
async fn assigned_order() -> TestResult<(Scenario, Uuid)> {
    let app = TestApp::new()?;
    let (customer_user, customer) = app.user(UserRole::Customer).await?;
    let (admin_user, admin) = app.user(UserRole::Admin).await?;
    let (driver_user, driver) = app.user(UserRole::Driver).await?;
    let beef = app.category("Res").await?;
    let ribeye = app.product(beef.id, "Rib Eye", dec!(200), 10).await?;
    let order_id = json_id(&app.place_order(&customer, ribeye.id, 1).await?)?;

    let (status, _) = app
        .send("PUT", &format!("/api/admin/orders/{}/status", order_id), Some(&admin), Some(json!({ "status": "READY" })))
        .await?;
    test_utils::check_status_code(status, StatusCode::OK)?;

    let (status, body) = app
        .send(
            "POST",
            &format!("/api/admin/orders/{}/delivery", order_id),
            Some(&admin),
            Some(json!({ "driverId": driver_user.id, "notes": "Ring twice" })),
        )
        .await?;
    test_utils::check_status_code(status, StatusCode::CREATED)?;
    assert_eq!(body["data"]["status"], "ASSIGNED");
    let delivery_id = json_id(&body["data"])?;

    let scenario = Scenario {
        app,
        customer_user,
        customer,
        admin_user,
        admin,
        driver_id: driver_user.id,
        driver_user,
        driver,
        order_id,
    };
    Ok((scenario, delivery_id))
}

#[tokio::test]
async fn test_delivery_progress_drives_order_status() -> TestResult {
    let (s, delivery_id) = assigned_order().await?;
    let status_uri = format!("/api/delivery/{}/status", delivery_id);

    let (status, body) = s.app.get("/api/delivery/my-deliveries", Some(&s.driver)).await?;
    test_utils::check_status_code(status, StatusCode::OK)?;
    assert_eq!(body["data"].as_array().map(Vec::len), Some(1));

    let (status, body) = s
        .app
        .send("PUT", &status_uri, Some(&s.driver), Some(json!({ "status": "PICKED_UP" })))
        .await?;
    test_utils::check_status_code(status, StatusCode::OK)?;
    assert_eq!(body["data"]["delivery"]["status"], "PICKED_UP");
    assert_eq!(body["data"]["order"]["status"], "OUT_FOR_DELIVERY");

    let (status, body) = s
        .app
        .send("PUT", &status_uri, Some(&s.driver), Some(json!({ "status": "ASSIGNED" })))
        .await?;
    test_utils::check_status_code(status, StatusCode::UNPROCESSABLE_ENTITY)?;
    test_utils::check_error_code(&body, "INVALID_TRANSITION")?;

    let (status, body) = s
        .app
        .send("POST", &format!("/api/delivery/{}/complete", delivery_id), Some(&s.driver), Some(json!({ "notes": "Left with doorman" })))
        .await?;
    test_utils::check_status_code(status, StatusCode::OK)?;
    assert_eq!(body["data"]["delivery"]["status"], "DELIVERED");
    assert!(body["data"]["delivery"]["actualTime"].is_string());
    assert_eq!(body["data"]["order"]["status"], "DELIVERED");

    let (status, body) = s
        .app
        .send("POST", &format!("/api/delivery/{}/complete", delivery_id), Some(&s.driver), None)
        .await?;
    test_utils::check_status_code(status, StatusCode::CONFLICT)?;
    test_utils::check_error_code(&body, "CONFLICT")?;

    let (status, body) = s.app.get("/api/delivery/stats/overview", Some(&s.driver)).await?;
    test_utils::check_status_code(status, StatusCode::OK)?;
    assert_eq!(body["data"]["completed"], 1);
    assert_eq!(body["data"]["pending"], 0);
    Ok(())
}

#[tokio::test]
async fn test_customer_rates_delivered_order_once() -> TestResult {
    let (s, delivery_id) = assigned_order().await?;
    let rate_uri = format!("/api/orders/{}/rate-delivery", s.order_id);

    let (status, body) = s.app.send("PUT", &rate_uri, Some(&s.customer), Some(json!({ "rating": 5 }))).await?;
    test_utils::check_status_code(status, StatusCode::BAD_REQUEST)?;
    test_utils::check_error_code(&body, "VALIDATION_ERROR")?;

    let (status, _) = s
        .app
        .send("POST", &format!("/api/delivery/{}/complete", delivery_id), Some(&s.driver), None)
        .await?;
    test_utils::check_status_code(status, StatusCode::OK)?;

    let (status, _) = s.app.send("PUT", &rate_uri, Some(&s.customer), Some(json!({ "rating": 6 }))).await?;
    test_utils::check_status_code(status, StatusCode::BAD_REQUEST)?;

    let (status, body) = s.app.send("PUT", &rate_uri, Some(&s.customer), Some(json!({ "rating": 5 }))).await?;
    test_utils::check_status_code(status, StatusCode::OK)?;
    assert_eq!(body["data"]["rating"], 5);

    let (status, body) = s.app.send("PUT", &rate_uri, Some(&s.customer), Some(json!({ "rating": 4 }))).await?;
    test_utils::check_status_code(status, StatusCode::CONFLICT)?;
    test_utils::check_error_code(&body, "CONFLICT")?;

    let (status, body) = s.app.get(&format!("/api/admin/orders/{}", s.order_id), Some(&s.admin)).await?;
    test_utils::check_status_code(status, StatusCode::OK)?;
    assert_eq!(body["data"]["timeline"]["delivery"]["rating"], 5);
    Ok(())
}

#[tokio::test]
async fn test_location_updates_are_validated_and_scoped_to_the_driver() -> TestResult {
    let (s, delivery_id) = assigned_order().await?;
    let location_uri = format!("/api/delivery/{}/location", delivery_id);

    let (status, body) = s
        .app
        .send("PUT", &location_uri, Some(&s.driver), Some(json!({ "latitude": 19.4326, "longitude": -99.1332, "speed": 32.5 })))
        .await?;
    test_utils::check_status_code(status, StatusCode::OK)?;
    assert_eq!(body["data"]["orderId"], s.order_id.to_string());
    assert_eq!(body["data"]["driverId"], s.driver_id.to_string());

    let (status, body) = s
        .app
        .send("PUT", &location_uri, Some(&s.driver), Some(json!({ "latitude": 123.0, "longitude": 0.0 })))
        .await?;
    test_utils::check_status_code(status, StatusCode::BAD_REQUEST)?;
    test_utils::check_error_code(&body, "VALIDATION_ERROR")?;

    let (_, other_driver) = s.app.user(UserRole::Driver).await?;
    let (status, _) = s.app.get(&format!("/api/delivery/{}", delivery_id), Some(&other_driver)).await?;
    test_utils::check_status_code(status, StatusCode::NOT_FOUND)?;
    let (status, _) = s
        .app
        .send("PUT", &location_uri, Some(&other_driver), Some(json!({ "latitude": 19.0, "longitude": -99.0 })))
        .await?;
    test_utils::check_status_code(status, StatusCode::NOT_FOUND)?;

    let (status, body) = s.app.get(&format!("/api/delivery/{}", delivery_id), Some(&s.driver)).await?;
    test_utils::check_status_code(status, StatusCode::OK)?;
    assert_eq!(body["data"]["order"]["id"], s.order_id.to_string());
    assert_eq!(body["data"]["delivery"]["currentLocation"]["latitude"], 19.4326);
    Ok(())
}

#[tokio::test]
async fn test_only_active_drivers_can_be_assigned() -> TestResult {
    let (s, _) = assigned_order().await?;
    let (customer, _) = s.app.user(UserRole::Customer).await?;

    let (status, body) = s
        .app
        .send(
            "POST",
            &format!("/api/admin/orders/{}/delivery", s.order_id),
            Some(&s.admin),
            Some(json!({ "driverId": customer.id })),
        )
        .await?;
    test_utils::check_status_code(status, StatusCode::BAD_REQUEST)?;
    test_utils::check_error_code(&body, "VALIDATION_ERROR")?;
    Ok(())
}

fn report(latitude: f64, longitude: f64) -> LocationReport {
    LocationReport { latitude, longitude, accuracy: None, heading: None, speed: None }
}

#[tokio::test]
async fn test_location_after_completion_cannot_reopen_the_delivery() -> TestResult {
    let (s, delivery_id) = assigned_order().await?;
    let location_uri = format!("/api/delivery/{}/location", delivery_id);

    let (status, _) = s
        .app
        .send("POST", &format!("/api/delivery/{}/complete", delivery_id), Some(&s.driver), None)
        .await?;
    test_utils::check_status_code(status, StatusCode::OK)?;

    let (status, body) = s
        .app
        .send("PUT", &location_uri, Some(&s.driver), Some(json!({ "latitude": 19.43, "longitude": -99.13 })))
        .await?;
    test_utils::check_status_code(status, StatusCode::BAD_REQUEST)?;
    test_utils::check_error_code(&body, "VALIDATION_ERROR")?;

    let (status, body) = s.app.get(&format!("/api/delivery/{}", delivery_id), Some(&s.driver)).await?;
    test_utils::check_status_code(status, StatusCode::OK)?;
    assert_eq!(body["data"]["delivery"]["status"], "DELIVERED");
    assert!(body["data"]["delivery"]["currentLocation"].is_null());
    assert_eq!(body["data"]["order"]["status"], "DELIVERED");
    Ok(())
}

#[tokio::test]
async fn test_cancelling_the_order_fails_its_open_delivery() -> TestResult {
    let (s, delivery_id) = assigned_order().await?;

    let (status, body) = s
        .app
        .send(
            "PUT",
            &format!("/api/admin/orders/{}/status", s.order_id),
            Some(&s.admin),
            Some(json!({ "status": "CANCELLED", "note": "Customer unreachable" })),
        )
        .await?;
    test_utils::check_status_code(status, StatusCode::OK)?;
    assert_eq!(body["data"]["status"], "CANCELLED");

    let (status, body) = s.app.get(&format!("/api/delivery/{}", delivery_id), Some(&s.driver)).await?;
    test_utils::check_status_code(status, StatusCode::OK)?;
    assert_eq!(body["data"]["delivery"]["status"], "FAILED");

    let (status, body) = s
        .app
        .send("PUT", &format!("/api/delivery/{}/status", delivery_id), Some(&s.driver), Some(json!({ "status": "PICKED_UP" })))
        .await?;
    test_utils::check_status_code(status, StatusCode::UNPROCESSABLE_ENTITY)?;
    test_utils::check_error_code(&body, "INVALID_TRANSITION")?;

    let (status, body) = s.app.get("/api/delivery/stats/overview", Some(&s.driver)).await?;
    test_utils::check_status_code(status, StatusCode::OK)?;
    assert_eq!(body["data"]["pending"], 0);
    assert_eq!(body["data"]["failed"], 1);
    Ok(())
}

#[tokio::test]
async fn test_tracking_access_rules() -> TestResult {
    let (s, _) = assigned_order().await?;
    let service = &s.app.state.delivery_service;
    let (stranger, _) = s.app.user(UserRole::Customer).await?;
    let (other_driver, _) = s.app.user(UserRole::Driver).await?;

    let cases = [
        (&s.customer_user, true),
        (&s.admin_user, true),
        (&s.driver_user, true),
        (&stranger, false),
        (&other_driver, false),
    ];
    for (user, expected) in cases {
        let allowed = service.may_track(user, s.order_id).await.map_err(storage_failure)?;
        assert_eq!(allowed, expected, "{} tracking as {}", user.email, user.role);
    }

    let missing = service.may_track(&s.admin_user, Uuid::new_v4()).await;
    assert!(matches!(missing, Err(CommerceError::NotFound(_))));
    Ok(())
}

#[tokio::test]
async fn test_only_the_assigned_driver_reports_locations() -> TestResult {
    let (s, delivery_id) = assigned_order().await?;
    let service = &s.app.state.delivery_service;
    let (other_driver, _) = s.app.user(UserRole::Driver).await?;

    for user in [&s.customer_user, &s.admin_user] {
        let denied = service.report_location(user, delivery_id, report(19.4, -99.1), Utc::now()).await;
        assert!(matches!(denied, Err(CommerceError::Forbidden(_))), "{} reported a location", user.role);
    }
    let hidden = service.report_location(&other_driver, delivery_id, report(19.4, -99.1), Utc::now()).await;
    assert!(matches!(hidden, Err(CommerceError::NotFound(_))));

    let location = service
        .report_location(&s.driver_user, delivery_id, report(19.4, -99.1), Utc::now())
        .await
        .map_err(storage_failure)?;
    assert_eq!(location.order_id, s.order_id);

    // Nobody was subscribed, so a new tracker is primed from storage.
    assert_eq!(s.app.state.tracking.channel_count().await, 0);
    let snapshot = service
        .tracking_snapshot(OrderSnapshot { order_id: s.order_id, status: None, driver_location: None })
        .await
        .map_err(storage_failure)?;
    assert_eq!(snapshot.status.map(|st| st.to_string()), Some("READY".to_string()));
    assert_eq!(snapshot.driver_location.map(|l| l.point.latitude), Some(19.4));
    Ok(())
}
