use std::sync::Arc;

use chrono::{DateTime, Utc};
use metrics::counter;
use serde::Serialize;
use tracing::{debug, info};
use uuid::Uuid;

use crate::error::CommerceResult;
use crate::gamification::{self, BadgeProgress, BadgeStats, ChallengeBoard, ChallengeStats, EarnedBadge, PurchaseStats};
use crate::model::*;
use crate::storage::{GamificationStorage, LoyaltyStorage, OrderStorage};

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MyBadges {
    pub badges: Vec<EarnedBadge>,
    pub stats: BadgeStats,
}

/// Everything the gamification dashboard shows at a glance.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GamificationStats {
    pub tier: LoyaltyTier,
    pub current_points: i64,
    pub lifetime_points: i64,
    pub purchases: PurchaseStats,
    pub badges: BadgeStats,
    pub challenges: ChallengeStats,
}

/// Badges and challenges, and the rewards they pay out as loyalty points.
#[derive(Clone)]
pub struct GamificationService {
    gamification: Arc<dyn GamificationStorage>,
    orders: Arc<dyn OrderStorage>,
    loyalty: Arc<dyn LoyaltyStorage>,
}

impl GamificationService {
    pub fn new(
        gamification: Arc<dyn GamificationStorage>,
        orders: Arc<dyn OrderStorage>,
        loyalty: Arc<dyn LoyaltyStorage>,
    ) -> Self {
        Self { gamification, orders, loyalty }
    }

    pub async fn badges(&self) -> CommerceResult<Vec<Badge>> {
        self.gamification.list_badges(false).await
    }

    /// Public badges plus the secret ones the user already holds.
    async fn visible_badges(&self, held: &[UserBadge]) -> CommerceResult<Vec<Badge>> {
        let mut badges = self.gamification.list_badges(true).await?;
        badges.retain(|b| !b.is_secret || held.iter().any(|h| h.badge_id == b.id));
        Ok(badges)
    }

    pub async fn my_badges(&self, user_id: Uuid) -> CommerceResult<MyBadges> {
        let held = self.gamification.user_badges(user_id).await?;
        let available = self.visible_badges(&held).await?;
        let badges = gamification::earned_badges(&held, &available);
        let stats = gamification::badge_stats(&badges, &available);
        Ok(MyBadges { badges, stats })
    }

    pub async fn next_badges(&self, user_id: Uuid) -> CommerceResult<Vec<BadgeProgress>> {
        let held = self.gamification.user_badges(user_id).await?;
        let available = self.gamification.list_badges(false).await?;
        let stats = self.purchase_stats(user_id).await?;
        Ok(gamification::next_badges(&available, &held, &stats))
    }

    pub async fn mark_badges_viewed(&self, user_id: Uuid, now: DateTime<Utc>) -> CommerceResult<u64> {
        self.gamification.mark_badges_viewed(user_id, now).await
    }

    pub async fn open_challenges(&self, now: DateTime<Utc>) -> CommerceResult<Vec<Challenge>> {
        self.gamification.list_challenges(Some(now)).await
    }

    pub async fn my_challenges(&self, user_id: Uuid, now: DateTime<Utc>) -> CommerceResult<ChallengeBoard> {
        let open = self.gamification.list_challenges(Some(now)).await?;
        let all = self.gamification.list_challenges(None).await?;
        let attempts = self.gamification.user_challenges(user_id).await?;
        Ok(gamification::challenge_board(open, &all, &attempts))
    }

    pub async fn stats(&self, user_id: Uuid, now: DateTime<Utc>) -> CommerceResult<GamificationStats> {
        let account = self
            .loyalty
            .get_account(user_id)
            .await?
            .unwrap_or_else(|| LoyaltyAccount::new(user_id, now));
        let purchases = self.purchase_stats(user_id).await?;
        let MyBadges { stats: badges, .. } = self.my_badges(user_id).await?;
        let challenges = self.my_challenges(user_id, now).await?.stats;
        Ok(GamificationStats {
            tier: account.tier,
            current_points: account.current_points,
            lifetime_points: account.lifetime_points,
            purchases,
            badges,
            challenges,
        })
    }

    async fn purchase_stats(&self, user_id: Uuid) -> CommerceResult<PurchaseStats> {
        let filter = OrderFilter {
            user_id: Some(user_id),
            status: Some(OrderStatus::Delivered),
            ..Default::default()
        };
        let orders = self.orders.find_orders(&filter).await?;
        let account = self.loyalty.get_account(user_id).await?;
        Ok(PurchaseStats::new(&orders, account.as_ref()))
    }

    /// Counts a delivered order towards the open challenges, then awards every
    /// badge the user now qualifies for. Must run once per order.
    pub async fn record_delivered_order(&self, order: &Order, now: DateTime<Utc>) -> CommerceResult<()> {
        for challenge in self.gamification.list_challenges(Some(now)).await? {
            let steps = gamification::challenge_steps(challenge.target, order);
            let Some(attempt) = self.gamification.advance_challenge(order.user_id, &challenge, steps, now).await? else {
                continue;
            };
            if attempt.reward_pending() {
                self.gamification
                    .claim_challenge_reward(attempt.id, challenge.points_reward, now)
                    .await?;
                self.reward(order.user_id, challenge.points_reward, format!("Challenge {}", challenge.name), now)
                    .await?;
                counter!("challenges_completed_total").increment(1);
                info!(user_id = %order.user_id, challenge = %challenge.code, "Challenge completed");
            }
        }
        self.award_badges(order.user_id, now).await
    }

    /// Badge bonuses raise the balance, which can unlock tier badges in turn,
    /// so evaluation repeats until nothing new is earned.
    async fn award_badges(&self, user_id: Uuid, now: DateTime<Utc>) -> CommerceResult<()> {
        let badges = self.gamification.list_badges(true).await?;
        for _ in 0..=badges.len() {
            let held = self.gamification.user_badges(user_id).await?;
            let stats = self.purchase_stats(user_id).await?;
            let mut awarded = false;
            for badge in &badges {
                if held.iter().any(|h| h.badge_id == badge.id) || !badge.is_earned_by(&stats) {
                    continue;
                }
                if self.gamification.award_badge(user_id, badge.id, now).await?.is_none() {
                    debug!(user_id = %user_id, badge = %badge.code, "Badge already held");
                    continue;
                }
                awarded = true;
                counter!("badges_awarded_total", "rarity" => badge.rarity.to_string()).increment(1);
                info!(user_id = %user_id, badge = %badge.code, "Badge earned");
                self.reward(user_id, badge.points_reward, format!("Badge {}", badge.name), now).await?;
            }
            if !awarded {
                break;
            }
        }
        Ok(())
    }

    async fn reward(&self, user_id: Uuid, points: i64, description: String, now: DateTime<Utc>) -> CommerceResult<()> {
        if points <= 0 {
            return Ok(());
        }
        let change = PointsChange::Bonus { points, description };
        self.loyalty.record_points(user_id, &change, now).await?;
        Ok(())
    }
}
