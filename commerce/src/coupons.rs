//! Coupon rules: eligibility checks, discount computation and admin input
//! validation. Everything here is pure; storage decides when it runs.

use chrono::{DateTime, Utc};
use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{CommerceError, CommerceResult, CouponRejection};
use crate::model::{Coupon, CouponType, DEFAULT_MAX_USAGE_PER_USER};

/// What a coupon is checked against.
#[derive(Debug, Clone, Copy)]
pub struct CouponContext<'a> {
    pub subtotal: Decimal,
    pub product_ids: &'a [Uuid],
    /// Prior redemptions by the caller. `None` for anonymous validation,
    /// which skips the per-user limit.
    pub user_usage_count: Option<i64>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CouponQuote {
    pub coupon_id: Uuid,
    pub code: String,
    #[serde(rename = "type")]
    pub coupon_type: CouponType,
    pub discount: Decimal,
    pub free_shipping: bool,
}

pub fn normalize_code(code: &str) -> String {
    code.trim().to_uppercase()
}

pub fn round_money(amount: Decimal) -> Decimal {
    amount.round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero)
}

/// Runs every eligibility rule in order and prices the discount.
pub fn validate(coupon: &Coupon, ctx: &CouponContext<'_>, now: DateTime<Utc>) -> Result<CouponQuote, CouponRejection> {
    if !coupon.is_active {
        return Err(CouponRejection::Inactive);
    }
    if coupon.valid_from > now {
        return Err(CouponRejection::NotYetValid);
    }
    if coupon.valid_until.is_some_and(|until| until < now) {
        return Err(CouponRejection::Expired);
    }
    if coupon.is_exhausted() {
        return Err(CouponRejection::UsageLimitReached);
    }
    if let Some(used) = ctx.user_usage_count {
        if used >= i64::from(coupon.max_usage_per_user) {
            return Err(CouponRejection::UserLimitReached);
        }
    }
    if let Some(min) = coupon.min_purchase {
        if ctx.subtotal < min {
            return Err(CouponRejection::MinimumNotMet { min: round_money(min).to_string() });
        }
    }
    if !coupon.applicable_products.is_empty()
        && !ctx.product_ids.iter().any(|id| coupon.applicable_products.contains(id))
    {
        return Err(CouponRejection::NotApplicable);
    }
    if ctx.product_ids.iter().any(|id| coupon.excluded_products.contains(id)) {
        return Err(CouponRejection::ExcludedProduct);
    }

    let (discount, free_shipping) = discount_for(coupon, ctx.subtotal);
    Ok(CouponQuote {
        coupon_id: coupon.id,
        code: coupon.code.clone(),
        coupon_type: coupon.coupon_type,
        discount,
        free_shipping,
    })
}

/// Discount amount and free-shipping flag for a subtotal.
///
/// Percentage discounts are capped at `max_discount`; fixed amounts never
/// exceed the subtotal.
pub fn discount_for(coupon: &Coupon, subtotal: Decimal) -> (Decimal, bool) {
    let subtotal = subtotal.max(Decimal::ZERO);
    match coupon.coupon_type {
        CouponType::Percentage => {
            let raw = subtotal * coupon.value / Decimal::ONE_HUNDRED;
            let capped = match coupon.max_discount {
                Some(cap) => raw.min(cap),
                None => raw,
            };
            (round_money(capped.min(subtotal)), false)
        }
        CouponType::FixedAmount => (round_money(coupon.value.min(subtotal)), false),
        CouponType::FreeShipping => (Decimal::ZERO, true),
    }
}

/// Public listing: active, public, inside the validity window and not used up.
pub fn is_publicly_listed(coupon: &Coupon, now: DateTime<Utc>) -> bool {
    coupon.is_active && coupon.is_public && coupon.is_within_window(now) && !coupon.is_exhausted()
}

/// Admin create payload.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CouponDraft {
    pub code: String,
    pub name: Option<String>,
    pub description: Option<String>,
    #[serde(rename = "type")]
    pub coupon_type: CouponType,
    pub value: Decimal,
    pub min_purchase: Option<Decimal>,
    pub max_discount: Option<Decimal>,
    pub max_usage: Option<i32>,
    pub max_usage_per_user: Option<i32>,
    pub valid_from: Option<DateTime<Utc>>,
    pub valid_until: Option<DateTime<Utc>>,
    pub is_active: Option<bool>,
    pub is_public: Option<bool>,
    #[serde(default)]
    pub applicable_products: Vec<Uuid>,
    #[serde(default)]
    pub excluded_products: Vec<Uuid>,
}

impl CouponDraft {
    pub fn into_coupon(self, now: DateTime<Utc>) -> CommerceResult<Coupon> {
        let code = normalize_code(&self.code);
        if code.is_empty() {
            return Err(CommerceError::validation("Coupon code is required"));
        }
        if !code.chars().all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_') {
            return Err(CommerceError::validation("Coupon code may only contain letters, digits, '-' and '_'"));
        }
        let coupon = Coupon {
            id: Uuid::new_v4(),
            name: self.name.filter(|n| !n.trim().is_empty()).unwrap_or_else(|| code.clone()),
            code,
            description: self.description,
            coupon_type: self.coupon_type,
            value: self.value,
            min_purchase: self.min_purchase,
            max_discount: self.max_discount,
            max_usage: self.max_usage,
            max_usage_per_user: self.max_usage_per_user.unwrap_or(DEFAULT_MAX_USAGE_PER_USER),
            times_used: 0,
            total_discount: Decimal::ZERO,
            valid_from: self.valid_from.unwrap_or(now),
            valid_until: self.valid_until,
            is_active: self.is_active.unwrap_or(true),
            is_public: self.is_public.unwrap_or(false),
            applicable_products: self.applicable_products,
            excluded_products: self.excluded_products,
            created_at: now,
            updated_at: now,
        };
        check_coupon_fields(&coupon)?;
        Ok(coupon)
    }
}

/// Admin update payload. Absent fields are left unchanged.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CouponPatch {
    pub name: Option<String>,
    pub description: Option<String>,
    #[serde(rename = "type")]
    pub coupon_type: Option<CouponType>,
    pub value: Option<Decimal>,
    pub min_purchase: Option<Decimal>,
    pub max_discount: Option<Decimal>,
    pub max_usage: Option<i32>,
    pub max_usage_per_user: Option<i32>,
    pub valid_from: Option<DateTime<Utc>>,
    pub valid_until: Option<DateTime<Utc>>,
    pub is_active: Option<bool>,
    pub is_public: Option<bool>,
    pub applicable_products: Option<Vec<Uuid>>,
    pub excluded_products: Option<Vec<Uuid>>,
}

impl CouponPatch {
    pub fn apply(self, coupon: &mut Coupon, now: DateTime<Utc>) -> CommerceResult<()> {
        let mut updated = coupon.clone();
        if let Some(name) = self.name {
            updated.name = name;
        }
        if self.description.is_some() {
            updated.description = self.description;
        }
        if let Some(t) = self.coupon_type {
            updated.coupon_type = t;
        }
        if let Some(v) = self.value {
            updated.value = v;
        }
        if self.min_purchase.is_some() {
            updated.min_purchase = self.min_purchase;
        }
        if self.max_discount.is_some() {
            updated.max_discount = self.max_discount;
        }
        if self.max_usage.is_some() {
            updated.max_usage = self.max_usage;
        }
        if let Some(per_user) = self.max_usage_per_user {
            updated.max_usage_per_user = per_user;
        }
        if let Some(from) = self.valid_from {
            updated.valid_from = from;
        }
        if self.valid_until.is_some() {
            updated.valid_until = self.valid_until;
        }
        if let Some(active) = self.is_active {
            updated.is_active = active;
        }
        if let Some(public) = self.is_public {
            updated.is_public = public;
        }
        if let Some(products) = self.applicable_products {
            updated.applicable_products = products;
        }
        if let Some(products) = self.excluded_products {
            updated.excluded_products = products;
        }
        check_coupon_fields(&updated)?;
        updated.updated_at = now;
        *coupon = updated;
        Ok(())
    }
}

fn check_coupon_fields(coupon: &Coupon) -> CommerceResult<()> {
    match coupon.coupon_type {
        CouponType::Percentage if coupon.value < Decimal::ZERO || coupon.value > Decimal::ONE_HUNDRED => {
            return Err(CommerceError::validation("Percentage must be between 0 and 100"));
        }
        CouponType::FixedAmount if coupon.value < Decimal::ZERO => {
            return Err(CommerceError::validation("Fixed amount cannot be negative"));
        }
        _ => {}
    }
    if coupon.min_purchase.is_some_and(|m| m < Decimal::ZERO) || coupon.max_discount.is_some_and(|m| m < Decimal::ZERO) {
        return Err(CommerceError::validation("Amounts cannot be negative"));
    }
    if coupon.max_usage.is_some_and(|m| m < 0) || coupon.max_usage_per_user < 1 {
        return Err(CommerceError::validation("Usage limits must be positive"));
    }
    if coupon.valid_until.is_some_and(|until| until <= coupon.valid_from) {
        return Err(CommerceError::validation("validUntil must be after validFrom"));
    }
    Ok(())
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CouponStats {
    pub total_coupons: usize,
    pub active_coupons: usize,
    pub public_coupons: usize,
    pub total_usages: i64,
    pub total_discount: Decimal,
    pub top_coupons: Vec<TopCoupon>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TopCoupon {
    pub id: Uuid,
    pub code: String,
    pub times_used: i32,
    pub total_discount: Decimal,
}

pub fn coupon_stats(coupons: &[Coupon], top: usize) -> CouponStats {
    let mut ranked: Vec<&Coupon> = coupons.iter().collect();
    ranked.sort_by(|a, b| b.times_used.cmp(&a.times_used).then_with(|| a.code.cmp(&b.code)));
    CouponStats {
        total_coupons: coupons.len(),
        active_coupons: coupons.iter().filter(|c| c.is_active).count(),
        public_coupons: coupons.iter().filter(|c| c.is_public).count(),
        total_usages: coupons.iter().map(|c| i64::from(c.times_used)).sum(),
        total_discount: coupons.iter().map(|c| c.total_discount).sum(),
        top_coupons: ranked
            .into_iter()
            .take(top)
            .map(|c| TopCoupon {
                id: c.id,
                code: c.code.clone(),
                times_used: c.times_used,
                total_discount: c.total_discount,
            })
            .collect(),
    }
}
