//! Loyalty tiers and point arithmetic.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use rust_decimal::prelude::ToPrimitive;
use serde::Serialize;
use uuid::Uuid;

use crate::error::{CommerceError, CommerceResult};
use crate::model::{LoyaltyAccount, LoyaltyTier, LoyaltyTransaction, LoyaltyTransactionKind, PointsChange};

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TierInfo {
    pub tier: LoyaltyTier,
    pub min_points: i64,
    /// Percent off granted to members of the tier.
    pub discount_percent: u8,
    pub points_multiplier: Decimal,
}

pub const TIERS: [TierInfo; 5] = [
    TierInfo { tier: LoyaltyTier::Bronze, min_points: 0, discount_percent: 2, points_multiplier: Decimal::from_parts(10, 0, 0, false, 1) },
    TierInfo { tier: LoyaltyTier::Silver, min_points: 500, discount_percent: 5, points_multiplier: Decimal::from_parts(11, 0, 0, false, 1) },
    TierInfo { tier: LoyaltyTier::Gold, min_points: 2000, discount_percent: 10, points_multiplier: Decimal::from_parts(125, 0, 0, false, 2) },
    TierInfo { tier: LoyaltyTier::Platinum, min_points: 5000, discount_percent: 15, points_multiplier: Decimal::from_parts(15, 0, 0, false, 1) },
    TierInfo { tier: LoyaltyTier::Diamond, min_points: 10000, discount_percent: 20, points_multiplier: Decimal::from_parts(20, 0, 0, false, 1) },
];

impl LoyaltyTier {
    pub fn info(self) -> &'static TierInfo {
        match self {
            LoyaltyTier::Bronze => &TIERS[0],
            LoyaltyTier::Silver => &TIERS[1],
            LoyaltyTier::Gold => &TIERS[2],
            LoyaltyTier::Platinum => &TIERS[3],
            LoyaltyTier::Diamond => &TIERS[4],
        }
    }

    pub fn next(self) -> Option<LoyaltyTier> {
        TIERS.iter().map(|t| t.tier).find(|t| *t > self)
    }

    pub fn for_points(points: i64) -> LoyaltyTier {
        TIERS
            .iter()
            .rev()
            .find(|t| points >= t.min_points)
            .map(|t| t.tier)
            .unwrap_or(LoyaltyTier::Bronze)
    }
}

/// Percent of the way from the current tier floor to the next tier, 0 to 100.
pub fn tier_progress(points: i64, tier: LoyaltyTier) -> u8 {
    let Some(next) = tier.next() else {
        return 100;
    };
    let floor = tier.info().min_points;
    let span = next.info().min_points - floor;
    let progress = (points - floor).max(0) * 100 / span;
    progress.clamp(0, 100) as u8
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LoyaltySummary {
    #[serde(flatten)]
    pub account: LoyaltyAccount,
    pub tier_info: TierInfo,
    pub tier_progress: u8,
    pub next_tier: Option<LoyaltyTier>,
    pub points_to_next_tier: Option<i64>,
}

pub fn summarize(account: LoyaltyAccount) -> LoyaltySummary {
    let next = account.tier.next();
    LoyaltySummary {
        tier_info: *account.tier.info(),
        tier_progress: tier_progress(account.current_points, account.tier),
        next_tier: next,
        points_to_next_tier: next.map(|t| (t.info().min_points - account.current_points).max(0)),
        account,
    }
}

/// Base points for a purchase: one point per whole currency unit.
pub fn purchase_points(order_total: Decimal) -> i64 {
    order_total.floor().to_i64().unwrap_or(0).max(0)
}

/// Settles a change against the account, returning the ledger row.
///
/// Earned points use the multiplier of the tier held before the change; the
/// tier is then recomputed from the new balance.
pub fn apply_change(account: &mut LoyaltyAccount, change: &PointsChange, now: DateTime<Utc>) -> CommerceResult<LoyaltyTransaction> {
    let before = account.current_points;
    let (kind, delta, multiplier, order_id, description) = match change {
        PointsChange::Earn { base_points, order_id, description } => {
            if *base_points < 0 {
                return Err(CommerceError::validation("Points must be positive"));
            }
            let multiplier = account.tier.info().points_multiplier;
            let earned = (Decimal::from(*base_points) * multiplier).floor().to_i64().unwrap_or(0);
            account.lifetime_points += earned;
            (LoyaltyTransactionKind::Earned, earned, multiplier, *order_id, description.clone())
        }
        PointsChange::Redeem { points, description } => {
            if *points <= 0 {
                return Err(CommerceError::validation("Points must be positive"));
            }
            if *points > before {
                return Err(CommerceError::validation(format!(
                    "Insufficient points: you have {}, need {}",
                    before, points
                )));
            }
            account.total_redeemed += points;
            (LoyaltyTransactionKind::Redeemed, -points, Decimal::ONE, None, description.clone())
        }
        PointsChange::Bonus { points, description } => {
            if *points <= 0 {
                return Err(CommerceError::validation("Points must be positive"));
            }
            account.lifetime_points += points;
            (LoyaltyTransactionKind::Bonus, *points, Decimal::ONE, None, description.clone())
        }
    };

    account.current_points = before + delta;
    let tier = LoyaltyTier::for_points(account.current_points);
    if tier > account.tier {
        account.last_tier_upgrade = Some(now);
    }
    account.tier = tier;
    account.updated_at = now;

    Ok(LoyaltyTransaction {
        id: Uuid::new_v4(),
        user_id: account.user_id,
        kind,
        points: delta,
        balance_before: before,
        balance_after: account.current_points,
        multiplier,
        order_id,
        description,
        created_at: now,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn earn(points: i64) -> PointsChange {
        PointsChange::Earn { base_points: points, order_id: None, description: "Compra".into() }
    }

    #[test]
    fn test_tier_table() {
        assert_eq!(LoyaltyTier::Silver.info().points_multiplier, dec!(1.1));
        assert_eq!(LoyaltyTier::Gold.info().points_multiplier, dec!(1.25));
        assert_eq!(LoyaltyTier::Diamond.info().points_multiplier, dec!(2.0));
        assert_eq!(LoyaltyTier::for_points(0), LoyaltyTier::Bronze);
        assert_eq!(LoyaltyTier::for_points(499), LoyaltyTier::Bronze);
        assert_eq!(LoyaltyTier::for_points(500), LoyaltyTier::Silver);
        assert_eq!(LoyaltyTier::for_points(9999), LoyaltyTier::Platinum);
        assert_eq!(LoyaltyTier::for_points(10_000), LoyaltyTier::Diamond);
        assert_eq!(LoyaltyTier::Diamond.next(), None);
    }

    #[test]
    fn test_progress() {
        assert_eq!(tier_progress(0, LoyaltyTier::Bronze), 0);
        assert_eq!(tier_progress(250, LoyaltyTier::Bronze), 50);
        assert_eq!(tier_progress(1250, LoyaltyTier::Silver), 50);
        assert_eq!(tier_progress(50_000, LoyaltyTier::Diamond), 100);
    }

    #[test]
    fn test_earn_uses_current_tier_multiplier_and_upgrades() {
        let now = Utc::now();
        let mut account = LoyaltyAccount::new(Uuid::new_v4(), now);
        account.current_points = 490;
        let tx = apply_change(&mut account, &earn(15), now).unwrap();
        assert_eq!(tx.points, 15);
        assert_eq!(tx.balance_before, 490);
        assert_eq!(tx.balance_after, 505);
        assert_eq!(account.tier, LoyaltyTier::Silver);
        assert_eq!(account.last_tier_upgrade, Some(now));

        let tx = apply_change(&mut account, &earn(15), now).unwrap();
        assert_eq!(tx.points, 16);
        assert_eq!(tx.multiplier, dec!(1.1));
    }

    #[test]
    fn test_redeem_requires_balance_and_can_drop_tier() {
        let now = Utc::now();
        let mut account = LoyaltyAccount::new(Uuid::new_v4(), now);
        apply_change(&mut account, &earn(600), now).unwrap();
        assert_eq!(account.tier, LoyaltyTier::Silver);

        let redeem = |points| PointsChange::Redeem { points, description: "Canje".into() };
        assert!(apply_change(&mut account, &redeem(601), now).is_err());
        assert_eq!(account.current_points, 600);

        let tx = apply_change(&mut account, &redeem(200), now).unwrap();
        assert_eq!(tx.points, -200);
        assert_eq!(account.current_points, 400);
        assert_eq!(account.total_redeemed, 200);
        assert_eq!(account.lifetime_points, 600);
        assert_eq!(account.tier, LoyaltyTier::Bronze);
    }

    #[test]
    fn test_bonus_ignores_multiplier() {
        let now = Utc::now();
        let mut account = LoyaltyAccount::new(Uuid::new_v4(), now);
        account.current_points = 2400;
        account.tier = LoyaltyTier::Gold;
        let bonus = |points| PointsChange::Bonus { points, description: "Insignia".into() };
        let tx = apply_change(&mut account, &bonus(250), now).unwrap();
        assert_eq!(tx.kind, LoyaltyTransactionKind::Bonus);
        assert_eq!(tx.points, 250);
        assert_eq!(account.lifetime_points, 250);
        assert_eq!(account.current_points, 2650);
        assert!(apply_change(&mut account, &bonus(0), now).is_err());
    }

    #[test]
    fn test_purchase_points_floor() {
        assert_eq!(purchase_points(dec!(1299.99)), 1299);
        assert_eq!(purchase_points(dec!(-3)), 0);
    }

    #[test]
    fn test_summary() {
        let now = Utc::now();
        let mut account = LoyaltyAccount::new(Uuid::new_v4(), now);
        account.current_points = 1250;
        account.tier = LoyaltyTier::Silver;
        let summary = summarize(account);
        assert_eq!(summary.next_tier, Some(LoyaltyTier::Gold));
        assert_eq!(summary.points_to_next_tier, Some(750));
        assert_eq!(summary.tier_progress, 50);
    }
}
