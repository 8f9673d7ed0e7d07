use axum::extract::State;
use axum::routing::{get, post};
use axum::Router;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::loyalty::{summarize, TIERS};
use crate::model::{LoyaltyAccount, PageRequest, PointsChange};

use super::extract::{ApiJson, ApiQuery, AuthUser};
use super::{ok, ok_with_message, paginated, ApiResult, AppState};

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/loyalty", get(loyalty))
        .route("/loyalty/transactions", get(transactions))
        .route("/loyalty/redeem", post(redeem))
        .route("/tiers", get(tiers))
        .route("/badges", get(badges))
        .route("/badges/my", get(my_badges))
        .route("/badges/next", get(next_badges))
        .route("/badges/mark-viewed", post(mark_badges_viewed))
        .route("/challenges", get(challenges))
        .route("/my-challenges", get(my_challenges))
        .route("/stats", get(stats))
}

async fn loyalty(State(state): State<AppState>, AuthUser(user): AuthUser) -> ApiResult {
    let account = state
        .loyalty
        .get_account(user.id)
        .await?
        .unwrap_or_else(|| LoyaltyAccount::new(user.id, Utc::now()));
    Ok(ok(summarize(account)))
}

async fn transactions(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    ApiQuery(page): ApiQuery<PageRequest>,
) -> ApiResult {
    let page = state.loyalty.list_transactions(user.id, page.normalized()).await?;
    Ok(paginated(page))
}

#[derive(Debug, Deserialize)]
pub struct RedeemRequest {
    pub points: i64,
    pub description: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct Redemption {
    points_redeemed: i64,
    current_points: i64,
    tier: crate::model::LoyaltyTier,
}

async fn redeem(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    ApiJson(request): ApiJson<RedeemRequest>,
) -> ApiResult {
    let change = PointsChange::Redeem {
        points: request.points,
        description: request
            .description
            .unwrap_or_else(|| format!("Redeemed {} points", request.points)),
    };
    let (account, _) = state.loyalty.record_points(user.id, &change, Utc::now()).await?;
    tracing::info!(user_id = %user.id, points = request.points, "Loyalty points redeemed");
    Ok(ok_with_message(
        Redemption {
            points_redeemed: request.points,
            current_points: account.current_points,
            tier: account.tier,
        },
        "Points redeemed",
    ))
}

async fn tiers() -> ApiResult {
    Ok(ok(TIERS))
}

async fn badges(State(state): State<AppState>) -> ApiResult {
    Ok(ok(state.gamification.badges().await?))
}

async fn my_badges(State(state): State<AppState>, AuthUser(user): AuthUser) -> ApiResult {
    Ok(ok(state.gamification.my_badges(user.id).await?))
}

async fn next_badges(State(state): State<AppState>, AuthUser(user): AuthUser) -> ApiResult {
    Ok(ok(state.gamification.next_badges(user.id).await?))
}

async fn mark_badges_viewed(State(state): State<AppState>, AuthUser(user): AuthUser) -> ApiResult {
    let updated = state.gamification.mark_badges_viewed(user.id, Utc::now()).await?;
    Ok(ok_with_message(json!({ "updated": updated }), "Badges marked as viewed"))
}

async fn challenges(State(state): State<AppState>) -> ApiResult {
    Ok(ok(state.gamification.open_challenges(Utc::now()).await?))
}

async fn my_challenges(State(state): State<AppState>, AuthUser(user): AuthUser) -> ApiResult {
    Ok(ok(state.gamification.my_challenges(user.id, Utc::now()).await?))
}

async fn stats(State(state): State<AppState>, AuthUser(user): AuthUser) -> ApiResult {
    Ok(ok(state.gamification.stats(user.id, Utc::now()).await?))
}
