//! Badges and challenges.
//!
//! Both are driven by delivered orders. Badges are earned once, when the
//! user's purchase history or loyalty balance meets the badge requirement.
//! Challenges count steps towards a target; a completed attempt pays its
//! reward once and, when repeatable, a new attempt starts with the next step.

use std::collections::{HashMap, HashSet};

use chrono::{DateTime, TimeZone, Utc};
use rust_decimal::Decimal;
use rust_decimal::prelude::ToPrimitive;
use serde::Serialize;
use uuid::Uuid;

use crate::model::*;

/// How many badges and recent badges the dashboards show.
pub const NEXT_BADGES_SHOWN: usize = 10;
pub const RECENT_BADGES_SHOWN: usize = 5;
pub const COMPLETED_CHALLENGES_SHOWN: usize = 10;

/// What badge requirements are measured against.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PurchaseStats {
    pub delivered_orders: i64,
    pub total_spent: Decimal,
    pub current_points: i64,
}

impl PurchaseStats {
    pub fn new(orders: &[Order], account: Option<&LoyaltyAccount>) -> Self {
        let delivered = orders.iter().filter(|o| o.status == OrderStatus::Delivered);
        Self {
            delivered_orders: delivered.clone().count() as i64,
            total_spent: delivered.map(|o| o.totals.total).sum(),
            current_points: account.map_or(0, |a| a.current_points),
        }
    }

    pub fn measure(&self, requirement: BadgeRequirement) -> i64 {
        match requirement {
            BadgeRequirement::Tier => self.current_points,
            BadgeRequirement::PurchaseCount => self.delivered_orders,
            BadgeRequirement::TotalSpent => self.total_spent.floor().to_i64().unwrap_or(i64::MAX),
        }
    }
}

impl Badge {
    pub fn is_earned_by(&self, stats: &PurchaseStats) -> bool {
        stats.measure(self.requirement) >= self.requirement_value
    }
}

fn percent(current: i64, target: i64) -> u8 {
    if target <= 0 {
        return 100;
    }
    (current.max(0).saturating_mul(100) / target).clamp(0, 100) as u8
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EarnedBadge {
    #[serde(flatten)]
    pub badge: Badge,
    pub earned_at: DateTime<Utc>,
    pub is_new: bool,
}

/// Pairs held badges with their definitions, newest first. Badges no longer
/// defined are dropped.
pub fn earned_badges(held: &[UserBadge], badges: &[Badge]) -> Vec<EarnedBadge> {
    let by_id: HashMap<Uuid, &Badge> = badges.iter().map(|b| (b.id, b)).collect();
    let mut earned: Vec<EarnedBadge> = held
        .iter()
        .filter_map(|h| {
            by_id.get(&h.badge_id).map(|badge| EarnedBadge {
                badge: (*badge).clone(),
                earned_at: h.earned_at,
                is_new: h.is_new,
            })
        })
        .collect();
    earned.sort_by(|a, b| b.earned_at.cmp(&a.earned_at));
    earned
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RarityCounts {
    pub common: u32,
    pub rare: u32,
    pub epic: u32,
    pub legendary: u32,
}

impl RarityCounts {
    fn add(&mut self, rarity: BadgeRarity) {
        match rarity {
            BadgeRarity::Common => self.common += 1,
            BadgeRarity::Rare => self.rare += 1,
            BadgeRarity::Epic => self.epic += 1,
            BadgeRarity::Legendary => self.legendary += 1,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CategoryProgress {
    pub category: BadgeRequirement,
    pub earned: u32,
    pub total: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BadgeStats {
    pub total: u32,
    pub total_available: u32,
    pub completion_percent: u8,
    pub earned_by_rarity: RarityCounts,
    pub total_points_from_badges: i64,
    pub new_badges_count: u32,
    pub recent_badges: Vec<EarnedBadge>,
    pub categories: Vec<CategoryProgress>,
}

/// `earned` newest first, `available` the public badge list.
pub fn badge_stats(earned: &[EarnedBadge], available: &[Badge]) -> BadgeStats {
    let mut earned_by_rarity = RarityCounts::default();
    for held in earned {
        earned_by_rarity.add(held.badge.rarity);
    }

    let held: HashSet<Uuid> = earned.iter().map(|e| e.badge.id).collect();
    let mut categories: Vec<CategoryProgress> = Vec::new();
    for badge in available {
        let index = match categories.iter().position(|c| c.category == badge.requirement) {
            Some(index) => index,
            None => {
                categories.push(CategoryProgress { category: badge.requirement, earned: 0, total: 0 });
                categories.len() - 1
            }
        };
        categories[index].total += 1;
        if held.contains(&badge.id) {
            categories[index].earned += 1;
        }
    }
    categories.sort_by_key(|c| c.category);

    BadgeStats {
        total: earned.len() as u32,
        total_available: available.len() as u32,
        completion_percent: percent(earned.len() as i64, available.len() as i64),
        earned_by_rarity,
        total_points_from_badges: earned.iter().map(|e| e.badge.points_reward).sum(),
        new_badges_count: earned.iter().filter(|e| e.is_new).count() as u32,
        recent_badges: earned.iter().take(RECENT_BADGES_SHOWN).cloned().collect(),
        categories,
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BadgeProgress {
    #[serde(flatten)]
    pub badge: Badge,
    pub current: i64,
    pub target: i64,
    pub remaining: i64,
    pub progress: u8,
}

/// Unearned badges the user has started on, closest first.
pub fn next_badges(available: &[Badge], held: &[UserBadge], stats: &PurchaseStats) -> Vec<BadgeProgress> {
    let held: HashSet<Uuid> = held.iter().map(|h| h.badge_id).collect();
    let mut next: Vec<BadgeProgress> = available
        .iter()
        .filter(|b| !held.contains(&b.id))
        .filter_map(|badge| {
            let current = stats.measure(badge.requirement);
            let target = badge.requirement_value;
            let progress = percent(current, target);
            (current > 0 && current < target).then(|| BadgeProgress {
                badge: badge.clone(),
                current,
                target,
                remaining: target - current,
                progress,
            })
        })
        .collect();
    next.sort_by(|a, b| b.progress.cmp(&a.progress).then_with(|| a.remaining.cmp(&b.remaining)));
    next.truncate(NEXT_BADGES_SHOWN);
    next
}

/// Steps a delivered order adds to a challenge of the given target.
pub fn challenge_steps(target: ChallengeTarget, order: &Order) -> i64 {
    match target {
        ChallengeTarget::PlaceOrders => 1,
        ChallengeTarget::BuyProducts => {
            order.items.iter().map(|i| i.product_id).collect::<HashSet<_>>().len() as i64
        }
        ChallengeTarget::SpendAmount => order.totals.total.floor().to_i64().unwrap_or(0).max(0),
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChallengeProgress {
    pub current: i64,
    pub target: i64,
    pub percent: u8,
    pub is_completed: bool,
    pub completed_at: Option<DateTime<Utc>>,
    pub reward_claimed: bool,
}

impl ChallengeProgress {
    fn of(attempt: &UserChallenge) -> Self {
        Self {
            current: attempt.current_progress,
            target: attempt.target_progress,
            percent: percent(attempt.current_progress, attempt.target_progress),
            is_completed: attempt.is_completed,
            completed_at: attempt.completed_at,
            reward_claimed: attempt.reward_claimed,
        }
    }

    fn not_started(challenge: &Challenge) -> Self {
        Self {
            current: 0,
            target: challenge.target_value,
            percent: 0,
            is_completed: false,
            completed_at: None,
            reward_claimed: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChallengeCard {
    #[serde(flatten)]
    pub challenge: Challenge,
    pub progress: ChallengeProgress,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CompletedChallenge {
    pub challenge: Challenge,
    #[serde(flatten)]
    pub attempt: UserChallenge,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChallengeStats {
    pub total_completed: u32,
    pub points_earned: i64,
    /// Running challenges with at least one step done.
    pub in_progress: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChallengeBoard {
    pub active: Vec<ChallengeCard>,
    pub completed: Vec<CompletedChallenge>,
    pub stats: ChallengeStats,
}

/// `open` are the challenges running now, `all` every known challenge,
/// `attempts` the user's attempts, most recent progress first.
pub fn challenge_board(open: Vec<Challenge>, all: &[Challenge], attempts: &[UserChallenge]) -> ChallengeBoard {
    let active: Vec<ChallengeCard> = open
        .into_iter()
        .map(|challenge| {
            let progress = attempts
                .iter()
                .find(|a| a.challenge_id == challenge.id && !a.is_completed)
                .map(ChallengeProgress::of)
                .unwrap_or_else(|| ChallengeProgress::not_started(&challenge));
            ChallengeCard { challenge, progress }
        })
        .collect();

    let by_id: HashMap<Uuid, &Challenge> = all.iter().map(|c| (c.id, c)).collect();
    let mut finished: Vec<&UserChallenge> = attempts.iter().filter(|a| a.is_completed).collect();
    finished.sort_by(|a, b| b.completed_at.cmp(&a.completed_at));

    let stats = ChallengeStats {
        total_completed: finished.len() as u32,
        points_earned: finished.iter().map(|a| a.points_earned).sum(),
        in_progress: active.iter().filter(|c| c.progress.current > 0).count() as u32,
    };
    let completed = finished
        .into_iter()
        .filter_map(|attempt| {
            by_id.get(&attempt.challenge_id).map(|challenge| CompletedChallenge {
                challenge: (*challenge).clone(),
                attempt: attempt.clone(),
            })
        })
        .take(COMPLETED_CHALLENGES_SHOWN)
        .collect();

    ChallengeBoard { active, completed, stats }
}

struct BadgeSpec {
    code: &'static str,
    name: &'static str,
    description: &'static str,
    icon: &'static str,
    color: &'static str,
    rarity: BadgeRarity,
    requirement: BadgeRequirement,
    value: i64,
    reward: i64,
}

const BADGES: &[BadgeSpec] = &[
    BadgeSpec { code: "TIER_BRONZE", name: "Miembro Bronce", description: "Has alcanzado el tier Bronce", icon: "🥉", color: "#CD7F32", rarity: BadgeRarity::Common, requirement: BadgeRequirement::Tier, value: 0, reward: 0 },
    BadgeSpec { code: "TIER_SILVER", name: "Miembro Plata", description: "Has alcanzado el tier Plata", icon: "🥈", color: "#C0C0C0", rarity: BadgeRarity::Common, requirement: BadgeRequirement::Tier, value: 500, reward: 100 },
    BadgeSpec { code: "TIER_GOLD", name: "Miembro Oro", description: "Has alcanzado el tier Oro", icon: "🥇", color: "#FFD700", rarity: BadgeRarity::Rare, requirement: BadgeRequirement::Tier, value: 2000, reward: 250 },
    BadgeSpec { code: "TIER_PLATINUM", name: "Miembro Platino", description: "Has alcanzado el tier Platino", icon: "💎", color: "#E5E4E2", rarity: BadgeRarity::Epic, requirement: BadgeRequirement::Tier, value: 5000, reward: 500 },
    BadgeSpec { code: "TIER_DIAMOND", name: "Miembro Diamante", description: "Has alcanzado el tier Diamante", icon: "👑", color: "#B9F2FF", rarity: BadgeRarity::Legendary, requirement: BadgeRequirement::Tier, value: 10000, reward: 1000 },
    BadgeSpec { code: "FIRST_PURCHASE", name: "Primera Compra", description: "Has realizado tu primera compra", icon: "🎉", color: "#4CAF50", rarity: BadgeRarity::Common, requirement: BadgeRequirement::PurchaseCount, value: 1, reward: 100 },
    BadgeSpec { code: "PURCHASES_5", name: "Cliente Habitual", description: "Has realizado 5 compras", icon: "🛍️", color: "#2196F3", rarity: BadgeRarity::Common, requirement: BadgeRequirement::PurchaseCount, value: 5, reward: 150 },
    BadgeSpec { code: "PURCHASES_10", name: "Cliente Fiel", description: "Has realizado 10 compras", icon: "🎯", color: "#FF9800", rarity: BadgeRarity::Rare, requirement: BadgeRequirement::PurchaseCount, value: 10, reward: 300 },
    BadgeSpec { code: "PURCHASES_20", name: "Gourmet Master", description: "Has realizado 20 compras", icon: "🏆", color: "#9C27B0", rarity: BadgeRarity::Epic, requirement: BadgeRequirement::PurchaseCount, value: 20, reward: 500 },
    BadgeSpec { code: "PURCHASES_50", name: "Maestro de la Carne", description: "Has realizado 50 compras", icon: "🔥", color: "#F44336", rarity: BadgeRarity::Epic, requirement: BadgeRequirement::PurchaseCount, value: 50, reward: 1000 },
    BadgeSpec { code: "PURCHASES_100", name: "Leyenda Carnívora", description: "Has realizado 100 compras", icon: "⚡", color: "#FFD700", rarity: BadgeRarity::Legendary, requirement: BadgeRequirement::PurchaseCount, value: 100, reward: 2500 },
    BadgeSpec { code: "SPENT_1K", name: "Gran Comprador", description: "Has gastado $1,000 en total", icon: "💰", color: "#4CAF50", rarity: BadgeRarity::Rare, requirement: BadgeRequirement::TotalSpent, value: 1000, reward: 250 },
    BadgeSpec { code: "SPENT_5K", name: "Cliente VIP", description: "Has gastado $5,000 en total", icon: "💎", color: "#9C27B0", rarity: BadgeRarity::Epic, requirement: BadgeRequirement::TotalSpent, value: 5000, reward: 1000 },
    BadgeSpec { code: "SPENT_10K", name: "Leyenda Premium", description: "Has gastado $10,000 en total", icon: "👑", color: "#FFD700", rarity: BadgeRarity::Legendary, requirement: BadgeRequirement::TotalSpent, value: 10000, reward: 2500 },
];

/// The standard badge set, in display order.
pub fn default_badges(now: DateTime<Utc>) -> Vec<Badge> {
    BADGES
        .iter()
        .enumerate()
        .map(|(i, entry)| Badge {
            id: Uuid::new_v4(),
            code: entry.code.to_string(),
            name: entry.name.to_string(),
            description: entry.description.to_string(),
            icon: entry.icon.to_string(),
            color: entry.color.to_string(),
            rarity: entry.rarity,
            requirement: entry.requirement,
            requirement_value: entry.value,
            points_reward: entry.reward,
            is_secret: false,
            is_active: true,
            sort_order: i as i32,
            created_at: now,
        })
        .collect()
}

struct ChallengeSpec {
    code: &'static str,
    name: &'static str,
    description: &'static str,
    icon: &'static str,
    challenge_type: ChallengeType,
    target: ChallengeTarget,
    value: i64,
    reward: i64,
    difficulty: ChallengeDifficulty,
    repeatable: bool,
}

const CHALLENGES: &[ChallengeSpec] = &[
    ChallengeSpec { code: "WEEKLY_PURCHASE", name: "Compra Semanal", description: "Realiza al menos 1 compra", icon: "🛍️", challenge_type: ChallengeType::Weekly, target: ChallengeTarget::PlaceOrders, value: 1, reward: 100, difficulty: ChallengeDifficulty::Medium, repeatable: true },
    ChallengeSpec { code: "WEEKLY_BIG_CART", name: "Carrito Grande", description: "Compra 5 productos diferentes", icon: "🛒", challenge_type: ChallengeType::Weekly, target: ChallengeTarget::BuyProducts, value: 5, reward: 200, difficulty: ChallengeDifficulty::Medium, repeatable: true },
    ChallengeSpec { code: "WEEKLY_SPEND_100", name: "Gran Comprador Semanal", description: "Gasta $100 o más", icon: "💰", challenge_type: ChallengeType::Weekly, target: ChallengeTarget::SpendAmount, value: 100, reward: 300, difficulty: ChallengeDifficulty::Hard, repeatable: true },
    ChallengeSpec { code: "MONTHLY_LOYALTY", name: "Fidelidad Mensual", description: "Realiza al menos 4 compras", icon: "🏆", challenge_type: ChallengeType::Monthly, target: ChallengeTarget::PlaceOrders, value: 4, reward: 500, difficulty: ChallengeDifficulty::Hard, repeatable: true },
    ChallengeSpec { code: "MONTHLY_SPEND_500", name: "Comprador Premium Mensual", description: "Gasta $500 o más", icon: "💎", challenge_type: ChallengeType::Monthly, target: ChallengeTarget::SpendAmount, value: 500, reward: 1000, difficulty: ChallengeDifficulty::Hard, repeatable: true },
    ChallengeSpec { code: "FIRST_ORDER", name: "Primer Pedido", description: "Recibe tu primer pedido", icon: "🎉", challenge_type: ChallengeType::OneTime, target: ChallengeTarget::PlaceOrders, value: 1, reward: 50, difficulty: ChallengeDifficulty::Easy, repeatable: false },
];

/// The standard challenge set, open from the start of 2025 with no end.
pub fn default_challenges(now: DateTime<Utc>) -> Vec<Challenge> {
    let starts_at = Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).single().unwrap_or(now).min(now);
    CHALLENGES
        .iter()
        .map(|entry| Challenge {
            id: Uuid::new_v4(),
            code: entry.code.to_string(),
            name: entry.name.to_string(),
            description: entry.description.to_string(),
            icon: entry.icon.to_string(),
            challenge_type: entry.challenge_type,
            target: entry.target,
            target_value: entry.value,
            points_reward: entry.reward,
            difficulty: entry.difficulty,
            is_repeatable: entry.repeatable,
            is_active: true,
            starts_at,
            ends_at: None,
            created_at: now,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_fixtures::{self, at};
    use rust_decimal_macros::dec;

    fn badge(code: &str) -> Badge {
        default_badges(at(2025, 1, 1)).into_iter().find(|b| b.code == code).unwrap()
    }

    fn delivered(total: Decimal) -> Order {
        test_fixtures::delivered_order(Uuid::new_v4(), total)
    }

    #[test]
    fn test_requirements_measure_delivered_orders_only() {
        let mut pending = delivered(dec!(900));
        pending.status = OrderStatus::Pending;
        let orders = [delivered(dec!(650.75)), delivered(dec!(400)), pending];
        let stats = PurchaseStats::new(&orders, None);
        assert_eq!(stats.delivered_orders, 2);
        assert_eq!(stats.total_spent, dec!(1050.75));

        assert!(badge("FIRST_PURCHASE").is_earned_by(&stats));
        assert!(!badge("PURCHASES_5").is_earned_by(&stats));
        assert!(badge("SPENT_1K").is_earned_by(&stats));
        assert!(badge("TIER_BRONZE").is_earned_by(&stats));
        assert!(!badge("TIER_SILVER").is_earned_by(&stats));
    }

    #[test]
    fn test_badge_stats_and_next_badges() {
        let now = at(2025, 3, 1);
        let available = default_badges(now);
        let code = |c: &str| available.iter().find(|b| b.code == c).map(|b| b.id).unwrap();
        let user = Uuid::new_v4();
        let mut first = UserBadge::new(user, code("FIRST_PURCHASE"), at(2025, 2, 1));
        first.is_new = false;
        let held = vec![first, UserBadge::new(user, code("SPENT_1K"), at(2025, 2, 20))];

        let earned = earned_badges(&held, &available);
        assert_eq!(earned[0].badge.code, "SPENT_1K");
        let stats = badge_stats(&earned, &available);
        assert_eq!(stats.total, 2);
        assert_eq!(stats.total_available, 14);
        assert_eq!(stats.completion_percent, 14);
        assert_eq!(stats.earned_by_rarity, RarityCounts { common: 1, rare: 1, epic: 0, legendary: 0 });
        assert_eq!(stats.total_points_from_badges, 350);
        assert_eq!(stats.new_badges_count, 1);
        let purchases = stats.categories.iter().find(|c| c.category == BadgeRequirement::PurchaseCount).unwrap();
        assert_eq!((purchases.earned, purchases.total), (1, 6));

        let progress = PurchaseStats { delivered_orders: 4, total_spent: dec!(1200), current_points: 1500 };
        let next = next_badges(&available, &held, &progress);
        assert_eq!(next[0].badge.code, "PURCHASES_5");
        assert_eq!(next[0].progress, 80);
        assert_eq!(next[0].remaining, 1);
        assert!(next.iter().all(|b| b.badge.code != "SPENT_1K" && b.badge.code != "TIER_BRONZE"));
        assert!(next.iter().any(|b| b.badge.code == "TIER_GOLD" && b.progress == 75));
    }

    #[test]
    fn test_attempt_completes_once() {
        let now = at(2025, 3, 1);
        let challenge = default_challenges(now).into_iter().find(|c| c.code == "WEEKLY_SPEND_100").unwrap();
        let mut attempt = UserChallenge::start(Uuid::new_v4(), &challenge, now);
        attempt.advance(60, now);
        assert!(!attempt.is_completed);
        attempt.advance(-500, now);
        assert_eq!(attempt.current_progress, 60);
        attempt.advance(45, at(2025, 3, 2));
        assert!(attempt.reward_pending());
        assert_eq!(attempt.completed_at, Some(at(2025, 3, 2)));
        attempt.advance(10, at(2025, 3, 3));
        assert_eq!(attempt.current_progress, 105);
    }

    #[test]
    fn test_order_steps_per_target() {
        let mut order = delivered(dec!(349.99));
        let first = order.items[0].clone();
        let product = first.product_id;
        order.items.push(OrderItem { id: Uuid::new_v4(), ..first.clone() });
        order.items.push(OrderItem { id: Uuid::new_v4(), product_id: Uuid::new_v4(), ..first });
        assert_eq!(order.items.iter().filter(|i| i.product_id == product).count(), 2);

        assert_eq!(challenge_steps(ChallengeTarget::PlaceOrders, &order), 1);
        assert_eq!(challenge_steps(ChallengeTarget::BuyProducts, &order), 2);
        assert_eq!(challenge_steps(ChallengeTarget::SpendAmount, &order), 349);
    }

    #[test]
    fn test_board_shows_open_attempts_and_completed_history() {
        let now = at(2025, 3, 10);
        let all = default_challenges(now);
        let weekly = all.iter().find(|c| c.code == "WEEKLY_PURCHASE").unwrap();
        let spend = all.iter().find(|c| c.code == "MONTHLY_SPEND_500").unwrap();
        let user = Uuid::new_v4();

        let mut done = UserChallenge::start(user, weekly, at(2025, 3, 1));
        done.advance(1, at(2025, 3, 2));
        done.reward_claimed = true;
        done.points_earned = 100;
        let mut running = UserChallenge::start(user, spend, at(2025, 3, 3));
        running.advance(125, at(2025, 3, 3));

        let board = challenge_board(all.clone(), &all, &[running, done]);
        assert_eq!(board.active.len(), all.len());
        let weekly_card = board.active.iter().find(|c| c.challenge.id == weekly.id).unwrap();
        assert_eq!(weekly_card.progress.current, 0);
        let spend_card = board.active.iter().find(|c| c.challenge.id == spend.id).unwrap();
        assert_eq!(spend_card.progress.percent, 25);
        assert_eq!(board.completed.len(), 1);
        assert_eq!(board.completed[0].challenge.code, "WEEKLY_PURCHASE");
        assert_eq!(board.stats, ChallengeStats { total_completed: 1, points_earned: 100, in_progress: 1 });
    }

    #[test]
    fn test_default_catalog_codes_are_unique() {
        let now = Utc::now();
        let badges: HashSet<String> = default_badges(now).into_iter().map(|b| b.code).collect();
        assert_eq!(badges.len(), BADGES.len());
        let challenges = default_challenges(now);
        assert!(challenges.iter().all(|c| c.is_open_at(now)));
        let codes: HashSet<&str> = challenges.iter().map(|c| c.code.as_str()).collect();
        assert_eq!(codes.len(), CHALLENGES.len());
    }
}
