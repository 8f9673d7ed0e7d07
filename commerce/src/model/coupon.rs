use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::CouponType;

pub const DEFAULT_MAX_USAGE_PER_USER: i32 = 1;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Coupon {
    pub id: Uuid,
    /// Always stored upper-case.
    pub code: String,
    pub name: String,
    pub description: Option<String>,
    #[serde(rename = "type")]
    pub coupon_type: CouponType,
    pub value: Decimal,
    pub min_purchase: Option<Decimal>,
    pub max_discount: Option<Decimal>,
    pub max_usage: Option<i32>,
    pub max_usage_per_user: i32,
    pub times_used: i32,
    pub total_discount: Decimal,
    pub valid_from: DateTime<Utc>,
    pub valid_until: Option<DateTime<Utc>>,
    pub is_active: bool,
    pub is_public: bool,
    pub applicable_products: Vec<Uuid>,
    pub excluded_products: Vec<Uuid>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Coupon {
    pub fn is_exhausted(&self) -> bool {
        self.max_usage.is_some_and(|max| self.times_used >= max)
    }

    pub fn is_within_window(&self, now: DateTime<Utc>) -> bool {
        self.valid_from <= now && self.valid_until.is_none_or(|until| until >= now)
    }
}

/// One successful redemption. Rows are only ever appended.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CouponUsage {
    pub id: Uuid,
    pub coupon_id: Uuid,
    pub user_id: Uuid,
    pub order_id: Uuid,
    pub discount_amount: Decimal,
    pub used_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CouponFilter {
    pub search: Option<String>,
    #[serde(rename = "type")]
    pub coupon_type: Option<CouponType>,
    pub is_active: Option<bool>,
}

impl CouponFilter {
    pub fn matches(&self, coupon: &Coupon) -> bool {
        let search_ok = match self.search.as_deref().map(str::trim) {
            Some(term) if !term.is_empty() => {
                let term = term.to_lowercase();
                coupon.code.to_lowercase().contains(&term) || coupon.name.to_lowercase().contains(&term)
            }
            _ => true,
        };
        search_ok
            && self.coupon_type.is_none_or(|t| coupon.coupon_type == t)
            && self.is_active.is_none_or(|a| coupon.is_active == a)
    }
}
