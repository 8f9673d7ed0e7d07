use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::{BadgeRarity, BadgeRequirement, ChallengeDifficulty, ChallengeTarget, ChallengeType};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Badge {
    pub id: Uuid,
    /// Stable key, e.g. `FIRST_PURCHASE`.
    pub code: String,
    pub name: String,
    pub description: String,
    pub icon: String,
    pub color: String,
    pub rarity: BadgeRarity,
    pub requirement: BadgeRequirement,
    pub requirement_value: i64,
    /// Bonus points granted once, when the badge is earned.
    pub points_reward: i64,
    /// Secret badges stay out of the public list until earned.
    pub is_secret: bool,
    pub is_active: bool,
    pub sort_order: i32,
    pub created_at: DateTime<Utc>,
}

/// A badge held by a user. Each user holds a badge at most once.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserBadge {
    pub id: Uuid,
    pub user_id: Uuid,
    pub badge_id: Uuid,
    /// Cleared once the user has seen the badge.
    pub is_new: bool,
    pub earned_at: DateTime<Utc>,
    pub viewed_at: Option<DateTime<Utc>>,
}

impl UserBadge {
    pub fn new(user_id: Uuid, badge_id: Uuid, now: DateTime<Utc>) -> Self {
        Self { id: Uuid::new_v4(), user_id, badge_id, is_new: true, earned_at: now, viewed_at: None }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Challenge {
    pub id: Uuid,
    pub code: String,
    pub name: String,
    pub description: String,
    pub icon: String,
    pub challenge_type: ChallengeType,
    pub target: ChallengeTarget,
    pub target_value: i64,
    pub points_reward: i64,
    pub difficulty: ChallengeDifficulty,
    /// A repeatable challenge starts a new attempt after each completion.
    pub is_repeatable: bool,
    pub is_active: bool,
    pub starts_at: DateTime<Utc>,
    pub ends_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl Challenge {
    pub fn is_open_at(&self, now: DateTime<Utc>) -> bool {
        self.is_active && self.starts_at <= now && self.ends_at.is_none_or(|end| now <= end)
    }
}

/// One attempt of a user at a challenge.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserChallenge {
    pub id: Uuid,
    pub user_id: Uuid,
    pub challenge_id: Uuid,
    pub current_progress: i64,
    pub target_progress: i64,
    pub is_completed: bool,
    pub completed_at: Option<DateTime<Utc>>,
    pub reward_claimed: bool,
    pub claimed_at: Option<DateTime<Utc>>,
    pub points_earned: i64,
    pub last_progress_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

impl UserChallenge {
    pub fn start(user_id: Uuid, challenge: &Challenge, now: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4(),
            user_id,
            challenge_id: challenge.id,
            current_progress: 0,
            target_progress: challenge.target_value,
            is_completed: false,
            completed_at: None,
            reward_claimed: false,
            claimed_at: None,
            points_earned: 0,
            last_progress_at: now,
            created_at: now,
        }
    }

    /// Adds `amount` steps and completes the attempt once the target is met.
    pub fn advance(&mut self, amount: i64, now: DateTime<Utc>) {
        if self.is_completed {
            return;
        }
        self.current_progress = self.current_progress.saturating_add(amount.max(0));
        self.last_progress_at = now;
        if self.current_progress >= self.target_progress {
            self.is_completed = true;
            self.completed_at = Some(now);
        }
    }

    pub fn reward_pending(&self) -> bool {
        self.is_completed && !self.reward_claimed
    }
}
