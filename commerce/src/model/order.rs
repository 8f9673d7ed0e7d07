use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::{OrderStatus, PaymentStatus};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderTotals {
    pub subtotal: Decimal,
    pub discount: Decimal,
    pub tax: Decimal,
    pub shipping: Decimal,
    pub total: Decimal,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderItem {
    pub id: Uuid,
    pub order_id: Uuid,
    pub product_id: Uuid,
    pub variant_id: Option<Uuid>,
    /// Product name at the time of purchase.
    pub name: String,
    pub quantity: i32,
    pub price: Decimal,
    pub total: Decimal,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Order {
    pub id: Uuid,
    pub order_number: String,
    pub user_id: Uuid,
    pub status: OrderStatus,
    pub payment_status: PaymentStatus,
    #[serde(flatten)]
    pub totals: OrderTotals,
    pub coupon_id: Option<Uuid>,
    /// JSON-encoded address exactly as submitted at checkout.
    pub shipping_address: String,
    pub notes: Option<String>,
    pub items: Vec<OrderItem>,
    pub paid_at: Option<DateTime<Utc>>,
    pub delivered_at: Option<DateTime<Utc>>,
    pub cancelled_at: Option<DateTime<Utc>>,
    pub cancel_reason: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Order {
    /// Orders that count towards sales figures.
    pub fn is_revenue(&self) -> bool {
        self.status != OrderStatus::Cancelled && self.payment_status != PaymentStatus::Refunded
    }

    pub fn product_ids(&self) -> Vec<Uuid> {
        self.items.iter().map(|i| i.product_id).collect()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderTrackingEvent {
    pub id: Uuid,
    pub order_id: Uuid,
    pub status: OrderStatus,
    pub description: String,
    pub created_by: Option<Uuid>,
    pub created_at: DateTime<Utc>,
}

impl OrderTrackingEvent {
    pub fn new(order_id: Uuid, status: OrderStatus, description: impl Into<String>, created_by: Option<Uuid>, at: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4(),
            order_id,
            status,
            description: description.into(),
            created_by,
            created_at: at,
        }
    }
}

/// Coupon to redeem while an order is written.
#[derive(Debug, Clone, PartialEq)]
pub struct CouponClaim {
    pub code: String,
    pub user_id: Uuid,
}

/// A priced cart ready to be persisted. Discount and total are settled by the
/// store once the coupon (if any) has been redeemed inside the same transaction.
#[derive(Debug, Clone, PartialEq)]
pub struct NewOrder {
    pub id: Uuid,
    pub order_number: String,
    pub user_id: Uuid,
    pub items: Vec<OrderItem>,
    pub totals: OrderTotals,
    pub coupon: Option<CouponClaim>,
    pub shipping_address: String,
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl NewOrder {
    pub fn into_order(self, totals: OrderTotals, coupon_id: Option<Uuid>) -> Order {
        Order {
            id: self.id,
            order_number: self.order_number,
            user_id: self.user_id,
            status: OrderStatus::Pending,
            payment_status: PaymentStatus::Pending,
            totals,
            coupon_id,
            shipping_address: self.shipping_address,
            notes: self.notes,
            items: self.items,
            paid_at: None,
            delivered_at: None,
            cancelled_at: None,
            cancel_reason: None,
            created_at: self.created_at,
            updated_at: self.created_at,
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderFilter {
    pub user_id: Option<Uuid>,
    pub status: Option<OrderStatus>,
    pub payment_status: Option<PaymentStatus>,
    pub from: Option<DateTime<Utc>>,
    pub to: Option<DateTime<Utc>>,
    /// Matches the order number.
    pub search: Option<String>,
}

impl OrderFilter {
    pub fn matches(&self, order: &Order) -> bool {
        self.user_id.is_none_or(|u| order.user_id == u)
            && self.status.is_none_or(|s| order.status == s)
            && self.payment_status.is_none_or(|s| order.payment_status == s)
            && self.from.is_none_or(|from| order.created_at >= from)
            && self.to.is_none_or(|to| order.created_at <= to)
            && self
                .search
                .as_deref()
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .is_none_or(|s| order.order_number.to_uppercase().contains(&s.to_uppercase()))
    }
}
