use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::{LoyaltyTier, LoyaltyTransactionKind};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoyaltyAccount {
    pub user_id: Uuid,
    pub current_points: i64,
    pub lifetime_points: i64,
    pub total_redeemed: i64,
    pub tier: LoyaltyTier,
    pub last_tier_upgrade: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl LoyaltyAccount {
    pub fn new(user_id: Uuid, now: DateTime<Utc>) -> Self {
        Self {
            user_id,
            current_points: 0,
            lifetime_points: 0,
            total_redeemed: 0,
            tier: LoyaltyTier::Bronze,
            last_tier_upgrade: None,
            created_at: now,
            updated_at: now,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoyaltyTransaction {
    pub id: Uuid,
    pub user_id: Uuid,
    pub kind: LoyaltyTransactionKind,
    /// Signed: negative for redemptions.
    pub points: i64,
    pub balance_before: i64,
    pub balance_after: i64,
    pub multiplier: Decimal,
    pub order_id: Option<Uuid>,
    pub description: String,
    pub created_at: DateTime<Utc>,
}

/// A requested balance change, settled against the stored account.
#[derive(Debug, Clone, PartialEq)]
pub enum PointsChange {
    /// Base points before the tier multiplier.
    Earn { base_points: i64, order_id: Option<Uuid>, description: String },
    Redeem { points: i64, description: String },
    /// Reward for a badge or challenge, credited as is.
    Bonus { points: i64, description: String },
}
