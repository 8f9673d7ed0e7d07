//! Cart pricing.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use common::config::CheckoutConfig;
use rust_decimal::Decimal;
use rust_decimal::prelude::FromPrimitive;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::coupons::{round_money, CouponQuote};
use crate::error::{CommerceError, CommerceResult};
use crate::model::{OrderItem, OrderTotals, Product};

pub const MAX_LINE_QUANTITY: i32 = 100;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PricingRules {
    pub tax_rate: Decimal,
    pub free_shipping_threshold: Decimal,
    pub shipping_cost: Decimal,
}

impl PricingRules {
    pub fn from_config(config: &CheckoutConfig) -> CommerceResult<Self> {
        let convert = |value: f64, name: &str| {
            Decimal::from_f64(value)
                .map(|d| d.round_dp(4))
                .ok_or_else(|| CommerceError::validation(format!("checkout.{} is not a valid amount", name)))
        };
        Ok(Self {
            tax_rate: convert(config.tax_rate, "tax_rate")?,
            free_shipping_threshold: convert(config.free_shipping_threshold, "free_shipping_threshold")?,
            shipping_cost: convert(config.shipping_cost, "shipping_cost")?,
        })
    }

    /// Totals before any coupon.
    pub fn totals_for(&self, subtotal: Decimal) -> OrderTotals {
        let subtotal = round_money(subtotal);
        let tax = round_money(subtotal * self.tax_rate);
        let shipping = if subtotal > self.free_shipping_threshold {
            Decimal::ZERO
        } else {
            self.shipping_cost
        };
        OrderTotals {
            subtotal,
            discount: Decimal::ZERO,
            tax,
            shipping,
            total: subtotal + tax + shipping,
        }
    }
}

impl Default for PricingRules {
    fn default() -> Self {
        Self {
            tax_rate: Decimal::new(16, 2),
            free_shipping_threshold: Decimal::from(500),
            shipping_cost: Decimal::from(50),
        }
    }
}

/// Applies a redeemed coupon on top of base totals.
pub fn apply_coupon_quote(base: OrderTotals, quote: &CouponQuote) -> OrderTotals {
    let discount = quote.discount.min(base.subtotal);
    let shipping = if quote.free_shipping { Decimal::ZERO } else { base.shipping };
    OrderTotals {
        discount,
        shipping,
        total: (base.subtotal - discount + base.tax + shipping).max(Decimal::ZERO),
        ..base
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CartLine {
    pub product_id: Uuid,
    pub variant_id: Option<Uuid>,
    pub quantity: i32,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PricedLine {
    pub product_id: Uuid,
    pub variant_id: Option<Uuid>,
    pub name: String,
    pub unit_price: Decimal,
    pub quantity: i32,
    pub line_total: Decimal,
}

impl PricedLine {
    pub fn into_order_item(self, order_id: Uuid) -> OrderItem {
        OrderItem {
            id: Uuid::new_v4(),
            order_id,
            product_id: self.product_id,
            variant_id: self.variant_id,
            name: self.name,
            quantity: self.quantity,
            price: self.unit_price,
            total: self.line_total,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CartQuote {
    pub lines: Vec<PricedLine>,
    pub item_count: i32,
    #[serde(flatten)]
    pub totals: OrderTotals,
    pub coupon: Option<CouponQuote>,
}

pub fn check_quantity(quantity: i32) -> CommerceResult<()> {
    if (1..=MAX_LINE_QUANTITY).contains(&quantity) {
        Ok(())
    } else {
        Err(CommerceError::validation(format!("Quantity must be between 1 and {}", MAX_LINE_QUANTITY)))
    }
}

/// Merges repeated lines for the same product and variant. Every line, and
/// every merged total, must stay within `1..=MAX_LINE_QUANTITY`.
pub fn merge_lines(lines: &[CartLine]) -> CommerceResult<Vec<CartLine>> {
    let mut merged: Vec<CartLine> = Vec::with_capacity(lines.len());
    for line in lines {
        check_quantity(line.quantity)?;
        match merged
            .iter_mut()
            .find(|m| m.product_id == line.product_id && m.variant_id == line.variant_id)
        {
            Some(existing) => {
                existing.quantity = existing
                    .quantity
                    .checked_add(line.quantity)
                    .ok_or_else(|| CommerceError::validation("Quantity is too large"))?;
                check_quantity(existing.quantity)?;
            }
            None => merged.push(*line),
        }
    }
    Ok(merged)
}

/// Prices cart lines against current catalog data.
///
/// Variant price wins over product price. Inactive items and quantities
/// above stock are rejected.
pub fn price_lines(lines: &[CartLine], products: &[Product]) -> CommerceResult<Vec<PricedLine>> {
    if lines.is_empty() {
        return Err(CommerceError::validation("Cart is empty"));
    }
    let by_id: HashMap<Uuid, &Product> = products.iter().map(|p| (p.id, p)).collect();

    merge_lines(lines)?
        .into_iter()
        .map(|line| {
            let product = by_id
                .get(&line.product_id)
                .filter(|p| p.is_active)
                .ok_or_else(|| CommerceError::not_found(format!("Product {}", line.product_id)))?;

            let (name, unit_price, stock) = match line.variant_id {
                Some(variant_id) => {
                    let variant = product
                        .variant(variant_id)
                        .filter(|v| v.is_active)
                        .ok_or_else(|| CommerceError::not_found(format!("Variant {}", variant_id)))?;
                    (format!("{} - {}", product.name, variant.name), variant.price, variant.stock)
                }
                None => (product.name.clone(), product.price, product.stock),
            };
            if line.quantity > stock {
                return Err(CommerceError::InsufficientStock(name));
            }

            Ok(PricedLine {
                product_id: line.product_id,
                variant_id: line.variant_id,
                line_total: round_money(unit_price * Decimal::from(line.quantity)),
                name,
                unit_price,
                quantity: line.quantity,
            })
        })
        .collect()
}

pub fn quote_cart(lines: Vec<PricedLine>, rules: &PricingRules, coupon: Option<CouponQuote>) -> CartQuote {
    let subtotal: Decimal = lines.iter().map(|l| l.line_total).sum();
    let base = rules.totals_for(subtotal);
    let totals = match &coupon {
        Some(quote) => apply_coupon_quote(base, quote),
        None => base,
    };
    CartQuote {
        item_count: lines.iter().map(|l| l.quantity).sum(),
        lines,
        totals,
        coupon,
    }
}

/// `ORD-YYYYMMDD-XXXXXX`, the suffix drawn from a fresh uuid.
pub fn generate_order_number(now: DateTime<Utc>) -> String {
    let suffix: String = Uuid::new_v4().simple().to_string()[..6].to_uppercase();
    format!("ORD-{}-{}", now.format("%Y%m%d"), suffix)
}
