use axum::http::StatusCode;
use common::test_helpers::{generate_unique_email, test_utils, TestResult};
use serde_json::json;

use commerce::model::UserRole;

use super::helpers::TestApp;

#[tokio::test]
async fn test_register_login_and_profile() -> TestResult {
    let app = TestApp::new()?;
    let email = generate_unique_email("shopper");

    let (status, body) = app
        .send(
            "POST",
            "/api/auth/register",
            None,
            Some(json!({
                "email": email.to_uppercase(),
                "password": "bistec-1234",
                "firstName": "Ana",
                "lastName": "López"
            })),
        )
        .await?;
    test_utils::check_status_code(status, StatusCode::CREATED)?;
    assert_eq!(body["data"]["user"]["email"], email.as_str());
    assert_eq!(body["data"]["user"]["role"], "CUSTOMER");
    assert!(body["data"]["user"].get("passwordHash").is_none());

    let (status, body) = app
        .send("POST", "/api/auth/login", None, Some(json!({ "email": email, "password": "bistec-1234" })))
        .await?;
    test_utils::check_status_code(status, StatusCode::OK)?;
    let token = body["data"]["token"].as_str().unwrap_or_default().to_string();
    assert!(!token.is_empty());

    let (status, body) = app.get("/api/auth/profile", Some(&token)).await?;
    test_utils::check_status_code(status, StatusCode::OK)?;
    assert_eq!(body["data"]["firstName"], "Ana");

    let (status, body) = app
        .send("PUT", "/api/auth/profile", Some(&token), Some(json!({ "phone": "+52 55 1234 5678" })))
        .await?;
    test_utils::check_status_code(status, StatusCode::OK)?;
    assert_eq!(body["data"]["phone"], "+52 55 1234 5678");
    Ok(())
}

#[tokio::test]
async fn test_registration_rejects_bad_input_and_duplicates() -> TestResult {
    let app = TestApp::new()?;
    let email = generate_unique_email("dup");
    let request = |password: &str| {
        json!({ "email": email, "password": password, "firstName": "Luis", "lastName": "Mora" })
    };

    let (status, body) = app.send("POST", "/api/auth/register", None, Some(request("short"))).await?;
    test_utils::check_status_code(status, StatusCode::BAD_REQUEST)?;
    test_utils::check_error_code(&body, "VALIDATION_ERROR")?;

    let (status, _) = app.send("POST", "/api/auth/register", None, Some(request("long-enough"))).await?;
    test_utils::check_status_code(status, StatusCode::CREATED)?;

    let (status, body) = app.send("POST", "/api/auth/register", None, Some(request("long-enough"))).await?;
    test_utils::check_status_code(status, StatusCode::CONFLICT)?;
    test_utils::check_error_code(&body, "CONFLICT")?;
    Ok(())
}

#[tokio::test]
async fn test_wrong_password_is_unauthorized() -> TestResult {
    let app = TestApp::new()?;
    let (user, _) = app.user(UserRole::Customer).await?;

    let (status, body) = app
        .send("POST", "/api/auth/login", None, Some(json!({ "email": user.email, "password": "nope-nope" })))
        .await?;
    test_utils::check_status_code(status, StatusCode::UNAUTHORIZED)?;
    test_utils::check_error_code(&body, "UNAUTHORIZED")?;
    Ok(())
}

#[tokio::test]
async fn test_token_failures() -> TestResult {
    let app = TestApp::new()?;

    let (status, body) = app.get("/api/auth/profile", None).await?;
    test_utils::check_status_code(status, StatusCode::UNAUTHORIZED)?;
    test_utils::check_error_code(&body, "MISSING_TOKEN")?;

    let (status, body) = app.get("/api/auth/profile", Some("not-a-jwt")).await?;
    test_utils::check_status_code(status, StatusCode::UNAUTHORIZED)?;
    test_utils::check_error_code(&body, "INVALID_TOKEN")?;
    Ok(())
}

#[tokio::test]
async fn test_role_guards() -> TestResult {
    let app = TestApp::new()?;
    let (_, customer) = app.user(UserRole::Customer).await?;
    let (_, admin) = app.user(UserRole::Admin).await?;

    let (status, body) = app.get("/api/admin/users", Some(&customer)).await?;
    test_utils::check_status_code(status, StatusCode::FORBIDDEN)?;
    test_utils::check_error_code(&body, "FORBIDDEN")?;

    let (status, body) = app.get("/api/delivery/my-deliveries", Some(&admin)).await?;
    test_utils::check_status_code(status, StatusCode::FORBIDDEN)?;
    test_utils::check_error_code(&body, "FORBIDDEN")?;

    let (status, body) = app.get("/api/admin/users?role=CUSTOMER", Some(&admin)).await?;
    test_utils::check_status_code(status, StatusCode::OK)?;
    assert_eq!(body["pagination"]["total"], 1);
    Ok(())
}

#[tokio::test]
async fn test_deactivated_user_is_locked_out() -> TestResult {
    let app = TestApp::new()?;
    let (customer, token) = app.user(UserRole::Customer).await?;
    let (_, admin) = app.user(UserRole::Admin).await?;

    let (status, body) = app
        .send("PUT", &format!("/api/admin/users/{}", customer.id), Some(&admin), Some(json!({ "isActive": false })))
        .await?;
    test_utils::check_status_code(status, StatusCode::OK)?;
    assert_eq!(body["data"]["isActive"], false);

    let (status, body) = app.get("/api/auth/profile", Some(&token)).await?;
    test_utils::check_status_code(status, StatusCode::FORBIDDEN)?;
    test_utils::check_error_code(&body, "USER_DEACTIVATED")?;
    Ok(())
}
