use axum::http::StatusCode;
use chrono::Utc;
use common::test_helpers::{test_utils, TestResult};
use rust_decimal_macros::dec;
use serde_json::json;

use commerce::gamification::{default_badges, default_challenges};
use commerce::model::UserRole;
use commerce::storage::GamificationStorage;

use super::helpers::{json_f64, json_id, storage_failure, TestApp};

async fn with_rewards() -> TestResult<TestApp> {
    let app = TestApp::new()?;
    let now = Utc::now();
    for badge in default_badges(now) {
        app.store.create_badge(&badge).await.map_err(storage_failure)?;
    }
    for challenge in default_challenges(now) {
        app.store.create_challenge(&challenge).await.map_err(storage_failure)?;
    }
    Ok(app)
}

#[tokio::test]
async fn test_catalog_lists_badges_and_open_challenges() -> TestResult {
    let app = with_rewards().await?;

    let (status, body) = app.get("/api/gamification/badges", None).await?;
    test_utils::check_status_code(status, StatusCode::OK)?;
    assert_eq!(body["data"].as_array().map(Vec::len), Some(14));
    assert_eq!(body["data"][0]["code"], "TIER_BRONZE");

    let (status, body) = app.get("/api/gamification/challenges", None).await?;
    test_utils::check_status_code(status, StatusCode::OK)?;
    assert_eq!(body["data"].as_array().map(Vec::len), Some(6));
    assert_eq!(body["data"][0]["difficulty"], "EASY");

    let (status, _) = app.get("/api/gamification/badges/my", None).await?;
    test_utils::check_status_code(status, StatusCode::UNAUTHORIZED)?;
    Ok(())
}

#[tokio::test]
async fn test_delivery_awards_badges_and_completes_challenges() -> TestResult {
    let app = with_rewards().await?;
    let (_, token) = app.user(UserRole::Customer).await?;
    let (_, admin) = app.user(UserRole::Admin).await?;
    let beef = app.category("Res").await?;
    let ribeye = app.product(beef.id, "Rib Eye", dec!(200), 10).await?;
    let order_id = json_id(&app.place_order(&token, ribeye.id, 1).await?)?;

    let (status, _) = app
        .send("PUT", &format!("/api/admin/orders/{}/status", order_id), Some(&admin), Some(json!({ "status": "DELIVERED" })))
        .await?;
    test_utils::check_status_code(status, StatusCode::OK)?;

    let (status, body) = app.get("/api/gamification/badges/my", Some(&token)).await?;
    test_utils::check_status_code(status, StatusCode::OK)?;
    let codes: Vec<&str> = body["data"]["badges"]
        .as_array()
        .map(|badges| badges.iter().filter_map(|b| b["code"].as_str()).collect())
        .unwrap_or_default();
    assert_eq!(codes.len(), 3);
    for code in ["TIER_BRONZE", "TIER_SILVER", "FIRST_PURCHASE"] {
        assert!(codes.contains(&code), "missing {} in {:?}", code, codes);
    }
    assert_eq!(body["data"]["stats"]["newBadgesCount"], 3);
    assert_eq!(body["data"]["stats"]["totalPointsFromBadges"], 200);

    let (status, body) = app.get("/api/gamification/my-challenges", Some(&token)).await?;
    test_utils::check_status_code(status, StatusCode::OK)?;
    assert_eq!(body["data"]["stats"]["totalCompleted"], 3);
    assert_eq!(body["data"]["stats"]["pointsEarned"], 450);

    // 282 for the purchase, 450 from challenges, 200 from badges.
    let (status, body) = app.get("/api/gamification/stats", Some(&token)).await?;
    test_utils::check_status_code(status, StatusCode::OK)?;
    assert_eq!(body["data"]["currentPoints"], 932);
    assert_eq!(body["data"]["tier"], "SILVER");
    assert_eq!(body["data"]["purchases"]["deliveredOrders"], 1);
    assert_eq!(json_f64(&body["data"]["purchases"]["totalSpent"])?, 282.0);

    let (_, body) = app.get("/api/gamification/loyalty/transactions", Some(&token)).await?;
    assert_eq!(body["pagination"]["total"], 6);

    let (status, body) = app.get("/api/gamification/badges/next", Some(&token)).await?;
    test_utils::check_status_code(status, StatusCode::OK)?;
    assert_eq!(body["data"][0]["code"], "TIER_GOLD");
    assert_eq!(body["data"][0]["progress"], 46);
    Ok(())
}

#[tokio::test]
async fn test_mark_viewed_clears_new_badges() -> TestResult {
    let app = with_rewards().await?;
    let (_, token) = app.user(UserRole::Customer).await?;
    let (_, admin) = app.user(UserRole::Admin).await?;
    let beef = app.category("Res").await?;
    let flank = app.product(beef.id, "Arrachera", dec!(50), 10).await?;
    let order_id = json_id(&app.place_order(&token, flank.id, 1).await?)?;
    app.send("PUT", &format!("/api/admin/orders/{}/status", order_id), Some(&admin), Some(json!({ "status": "DELIVERED" })))
        .await?;

    let (status, body) = app.send("POST", "/api/gamification/badges/mark-viewed", Some(&token), None).await?;
    test_utils::check_status_code(status, StatusCode::OK)?;
    assert_eq!(body["data"]["updated"], 3);

    let (_, body) = app.get("/api/gamification/badges/my", Some(&token)).await?;
    assert_eq!(body["data"]["stats"]["newBadgesCount"], 0);
    assert_eq!(body["data"]["badges"][0]["isNew"], false);
    Ok(())
}
