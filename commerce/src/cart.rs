//! Saved carts, priced on every read.
//!
//! Prices and stock are never stored with the cart. Each read prices the
//! items against the current catalog with the checkout rules, so the summary
//! always matches what checkout would charge. Items that can no longer be
//! bought are listed apart with the reason instead of failing the whole cart.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Serialize;
use uuid::Uuid;

use crate::checkout::{price_lines, quote_cart, PricedLine, PricingRules};
use crate::model::{CartItem, Product};

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CartEntry {
    pub id: Uuid,
    #[serde(flatten)]
    pub line: PricedLine,
    pub added_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UnavailableItem {
    #[serde(flatten)]
    pub item: CartItem,
    pub reason: String,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CartSummary {
    pub item_count: i32,
    pub subtotal: Decimal,
    pub tax: Decimal,
    pub shipping: Decimal,
    pub total: Decimal,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CartView {
    pub items: Vec<CartEntry>,
    pub unavailable: Vec<UnavailableItem>,
    pub summary: CartSummary,
}

/// Prices saved items one by one. Only purchasable items count towards the
/// summary; an empty cart has all-zero totals.
pub fn cart_view(items: Vec<CartItem>, products: &[Product], rules: &PricingRules) -> CartView {
    let mut entries = Vec::with_capacity(items.len());
    let mut unavailable = Vec::new();
    for item in items {
        match price_lines(&[item.line()], products).map(|mut lines| lines.pop()) {
            Ok(Some(line)) => entries.push(CartEntry { id: item.id, line, added_at: item.created_at }),
            Ok(None) => {}
            Err(e) => unavailable.push(UnavailableItem { reason: e.to_string(), item }),
        }
    }

    let summary = if entries.is_empty() {
        CartSummary::default()
    } else {
        let quote = quote_cart(entries.iter().map(|e| e.line.clone()).collect(), rules, None);
        CartSummary {
            item_count: quote.item_count,
            subtotal: quote.totals.subtotal,
            tax: quote.totals.tax,
            shipping: quote.totals.shipping,
            total: quote.totals.total,
        }
    };
    CartView { items: entries, unavailable, summary }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::checkout::CartLine;
    use crate::test_fixtures;
    use rust_decimal_macros::dec;

    fn saved(user_id: Uuid, product: &Product, quantity: i32) -> CartItem {
        let line = CartLine { product_id: product.id, variant_id: None, quantity };
        CartItem::new(user_id, line, test_fixtures::at(2024, 5, 1))
    }

    #[test]
    fn test_summary_uses_checkout_rules() {
        let user = Uuid::new_v4();
        let category = Uuid::new_v4();
        let steak = test_fixtures::product(category, "Rib Eye", dec!(120), 10);
        let chicken = test_fixtures::product(category, "Pechuga", dec!(80.5), 10);
        let items = vec![saved(user, &steak, 2), saved(user, &chicken, 1)];

        let view = cart_view(items, &[steak, chicken], &PricingRules::default());
        assert_eq!(view.items.len(), 2);
        assert!(view.unavailable.is_empty());
        assert_eq!(view.summary.item_count, 3);
        assert_eq!(view.summary.subtotal, dec!(320.50));
        assert_eq!(view.summary.tax, dec!(51.28));
        assert_eq!(view.summary.shipping, dec!(50));
        assert_eq!(view.summary.total, dec!(421.78));
    }

    #[test]
    fn test_unbuyable_items_are_set_apart() {
        let user = Uuid::new_v4();
        let category = Uuid::new_v4();
        let steak = test_fixtures::product(category, "Rib Eye", dec!(600), 10);
        let mut retired = test_fixtures::product(category, "Arrachera", dec!(90), 10);
        retired.is_active = false;
        let scarce = test_fixtures::product(category, "Costilla", dec!(50), 1);
        let items = vec![saved(user, &steak, 1), saved(user, &retired, 1), saved(user, &scarce, 3)];

        let view = cart_view(items, &[steak, retired, scarce], &PricingRules::default());
        assert_eq!(view.items.len(), 1);
        assert_eq!(view.unavailable.len(), 2);
        assert_eq!(view.unavailable[1].reason, "Insufficient stock for Costilla");
        assert_eq!(view.summary.subtotal, dec!(600));
        assert_eq!(view.summary.shipping, Decimal::ZERO);
    }

    #[test]
    fn test_empty_cart_has_zero_totals() {
        let view = cart_view(Vec::new(), &[], &PricingRules::default());
        assert_eq!(view.summary, CartSummary::default());
    }
}
