use std::sync::Arc;

use chrono::{DateTime, Utc};
use metrics::counter;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::checkout::{self, CartLine, CartQuote, PricingRules};
use crate::coupons::{self, CouponContext, CouponQuote};
use crate::error::{CommerceError, CommerceResult, CouponRejection};
use crate::loyalty::purchase_points;
use crate::model::*;
use crate::services::GamificationService;
use crate::storage::{CatalogStorage, CouponStorage, DeliveryStorage, LoyaltyStorage, OrderStorage};
use crate::tracking::{OrderStatusUpdate, TrackingHub};

/// Statuses from which customers may still cancel on their own.
const CUSTOMER_CANCELLABLE: [OrderStatus; 2] = [OrderStatus::Pending, OrderStatus::Confirmed];

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckoutRequest {
    pub items: Vec<CartLine>,
    pub coupon_code: Option<String>,
    pub shipping_address: serde_json::Value,
    pub notes: Option<String>,
}

/// Order timeline as shown to the customer.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderTimeline {
    pub order_id: Uuid,
    pub order_number: String,
    pub status: OrderStatus,
    pub events: Vec<OrderTrackingEvent>,
    pub delivery: Option<Delivery>,
}

fn count_rejection(error: &CommerceError) {
    if let CommerceError::CouponRejected(rejection) = error {
        counter!("coupon_rejections_total", "reason" => rejection.code()).increment(1);
    }
}

/// Checkout, order lifecycle and the side effects that hang off it:
/// realtime status pushes, loyalty awards and badge or challenge progress.
#[derive(Clone)]
pub struct OrderService {
    catalog: Arc<dyn CatalogStorage>,
    orders: Arc<dyn OrderStorage>,
    coupons: Arc<dyn CouponStorage>,
    deliveries: Arc<dyn DeliveryStorage>,
    loyalty: Arc<dyn LoyaltyStorage>,
    gamification: GamificationService,
    tracking: TrackingHub,
    pricing: PricingRules,
}

impl OrderService {
    pub fn new(
        catalog: Arc<dyn CatalogStorage>,
        orders: Arc<dyn OrderStorage>,
        coupons: Arc<dyn CouponStorage>,
        deliveries: Arc<dyn DeliveryStorage>,
        loyalty: Arc<dyn LoyaltyStorage>,
        gamification: GamificationService,
        tracking: TrackingHub,
        pricing: PricingRules,
    ) -> Self {
        Self { catalog, orders, coupons, deliveries, loyalty, gamification, tracking, pricing }
    }

    pub fn pricing(&self) -> &PricingRules {
        &self.pricing
    }

    /// Checks a code against a cart without redeeming it.
    pub async fn check_coupon(
        &self,
        code: &str,
        subtotal: Decimal,
        product_ids: &[Uuid],
        user_id: Option<Uuid>,
        now: DateTime<Utc>,
    ) -> CommerceResult<(Coupon, CouponQuote)> {
        let result = async {
            let coupon = self
                .coupons
                .find_coupon_by_code(code)
                .await?
                .ok_or(CouponRejection::NotFound)?;
            let user_usage_count = match user_id {
                Some(user_id) => Some(self.coupons.count_user_usages(coupon.id, user_id).await?),
                None => None,
            };
            let ctx = CouponContext { subtotal, product_ids, user_usage_count };
            let quote = coupons::validate(&coupon, &ctx, now)?;
            Ok::<_, CommerceError>((coupon, quote))
        }
        .await;
        if let Err(e) = &result {
            count_rejection(e);
            debug!(code = %code, error = %e, "Coupon check failed");
        }
        result
    }

    pub async fn quote(
        &self,
        lines: &[CartLine],
        coupon_code: Option<&str>,
        user_id: Option<Uuid>,
        now: DateTime<Utc>,
    ) -> CommerceResult<CartQuote> {
        let ids: Vec<Uuid> = lines.iter().map(|l| l.product_id).collect();
        let products = self.catalog.products_by_ids(&ids).await?;
        let priced = checkout::price_lines(lines, &products)?;

        let coupon = match coupon_code.map(str::trim).filter(|c| !c.is_empty()) {
            Some(code) => {
                let subtotal: Decimal = priced.iter().map(|l| l.line_total).sum();
                let product_ids: Vec<Uuid> = priced.iter().map(|l| l.product_id).collect();
                let (_, quote) = self.check_coupon(code, subtotal, &product_ids, user_id, now).await?;
                Some(quote)
            }
            None => None,
        };
        Ok(checkout::quote_cart(priced, &self.pricing, coupon))
    }

    /// Prices the cart and persists the order. Stock and the coupon are
    /// settled by the store in one step.
    pub async fn checkout(&self, user_id: Uuid, request: CheckoutRequest, now: DateTime<Utc>) -> CommerceResult<Order> {
        if !request.shipping_address.is_object() {
            return Err(CommerceError::validation("Shipping address is required"));
        }
        let ids: Vec<Uuid> = request.items.iter().map(|l| l.product_id).collect();
        let products = self.catalog.products_by_ids(&ids).await?;
        let priced = checkout::price_lines(&request.items, &products)?;
        let quote = checkout::quote_cart(priced, &self.pricing, None);

        let order_id = Uuid::new_v4();
        let coupon = request
            .coupon_code
            .as_deref()
            .map(str::trim)
            .filter(|c| !c.is_empty())
            .map(|code| CouponClaim { code: code.to_string(), user_id });
        let new_order = NewOrder {
            id: order_id,
            order_number: checkout::generate_order_number(now),
            user_id,
            items: quote.lines.into_iter().map(|l| l.into_order_item(order_id)).collect(),
            totals: quote.totals,
            coupon,
            shipping_address: request.shipping_address.to_string(),
            notes: request.notes.filter(|n| !n.trim().is_empty()),
            created_at: now,
        };

        let order = self.orders.place_order(new_order).await.inspect_err(|e| {
            count_rejection(e);
            warn!(user_id = %user_id, error = %e, "Checkout rejected");
        })?;
        if order.coupon_id.is_some() {
            counter!("coupon_redemptions_total").increment(1);
        }
        info!(
            order_id = %order.id,
            order_number = %order.order_number,
            total = %order.totals.total,
            "Order placed"
        );
        Ok(order)
    }

    /// Redeems a coupon against the caller's own pending order.
    pub async fn apply_coupon(&self, user_id: Uuid, order_id: Uuid, code: &str, now: DateTime<Utc>) -> CommerceResult<(Order, CouponUsage)> {
        let claim = CouponClaim { code: code.to_string(), user_id };
        let (order, usage) = self.orders.apply_coupon(order_id, &claim, now).await.inspect_err(|e| {
            count_rejection(e);
            warn!(order_id = %order_id, error = %e, "Coupon not applied");
        })?;
        counter!("coupon_redemptions_total").increment(1);
        info!(order_id = %order_id, coupon_id = %usage.coupon_id, discount = %usage.discount_amount, "Coupon applied");
        Ok((order, usage))
    }

    pub async fn get_order(&self, order_id: Uuid) -> CommerceResult<Order> {
        self.orders
            .get_order(order_id)
            .await?
            .ok_or_else(|| CommerceError::not_found(format!("Order {}", order_id)))
    }

    /// Loads an order the caller may see: their own, or any for staff.
    pub async fn visible_order(&self, order_id: Uuid, viewer: &User) -> CommerceResult<Order> {
        match self.orders.get_order(order_id).await? {
            Some(order) if order.user_id == viewer.id || viewer.role.is_admin() => Ok(order),
            _ => Err(CommerceError::not_found(format!("Order {}", order_id))),
        }
    }

    pub async fn timeline(&self, order: &Order) -> CommerceResult<OrderTimeline> {
        let events = self.orders.tracking_events(order.id).await?;
        let delivery = self.deliveries.latest_delivery_for_order(order.id).await?;
        Ok(OrderTimeline {
            order_id: order.id,
            order_number: order.order_number.clone(),
            status: order.status,
            events,
            delivery,
        })
    }

    pub async fn change_status(
        &self,
        order_id: Uuid,
        to: OrderStatus,
        note: Option<String>,
        actor: Option<Uuid>,
        now: DateTime<Utc>,
    ) -> CommerceResult<Order> {
        let message = note.clone().unwrap_or_else(|| to.description().to_string());
        let order = self
            .orders
            .transition_order(order_id, to, note, actor, now)
            .await
            .inspect_err(|e| warn!(order_id = %order_id, to = %to, error = %e, "Status change rejected"))?;
        self.after_status_change(&order, message, now).await;
        Ok(order)
    }

    pub async fn cancel(&self, order_id: Uuid, reason: String, actor: Option<Uuid>, now: DateTime<Utc>) -> CommerceResult<Order> {
        let message = format!("Order cancelled: {}", reason);
        let order = self
            .orders
            .cancel_order(order_id, reason, actor, now)
            .await
            .inspect_err(|e| warn!(order_id = %order_id, error = %e, "Cancellation rejected"))?;
        self.after_status_change(&order, message, now).await;
        Ok(order)
    }

    /// Customers may cancel their own orders until preparation starts.
    pub async fn cancel_own(&self, user_id: Uuid, order_id: Uuid, reason: Option<String>, now: DateTime<Utc>) -> CommerceResult<Order> {
        let order = match self.orders.get_order(order_id).await? {
            Some(order) if order.user_id == user_id => order,
            _ => return Err(CommerceError::not_found(format!("Order {}", order_id))),
        };
        if !CUSTOMER_CANCELLABLE.contains(&order.status) {
            return Err(CommerceError::validation("Order can no longer be cancelled"));
        }
        let reason = reason
            .filter(|r| !r.trim().is_empty())
            .unwrap_or_else(|| "Cancelled by customer".to_string());
        self.cancel(order_id, reason, Some(user_id), now).await
    }

    pub async fn update_payment(&self, order_id: Uuid, to: PaymentStatus, now: DateTime<Utc>) -> CommerceResult<Order> {
        let order = self
            .orders
            .update_payment_status(order_id, to, now)
            .await
            .inspect_err(|e| warn!(order_id = %order_id, to = %to, error = %e, "Payment status change rejected"))?;
        info!(order_id = %order_id, payment_status = %to, "Payment status updated");
        Ok(order)
    }

    /// Rates the delivery of a delivered order. Each delivery is rated once.
    pub async fn rate_delivery(&self, user_id: Uuid, order_id: Uuid, rating: i16, now: DateTime<Utc>) -> CommerceResult<Delivery> {
        if !(1..=5).contains(&rating) {
            return Err(CommerceError::validation("Rating must be between 1 and 5"));
        }
        let order = match self.orders.get_order(order_id).await? {
            Some(order) if order.user_id == user_id => order,
            _ => return Err(CommerceError::not_found(format!("Order {}", order_id))),
        };
        if order.status != OrderStatus::Delivered {
            return Err(CommerceError::validation("Only delivered orders can be rated"));
        }
        let delivery = self
            .deliveries
            .latest_delivery_for_order(order_id)
            .await?
            .filter(|d| d.status == DeliveryStatus::Delivered)
            .ok_or_else(|| CommerceError::not_found(format!("Delivery for order {}", order_id)))?;
        self.deliveries.rate_delivery(delivery.id, rating, now).await
    }

    /// Pushes the new status to trackers and settles loyalty on delivery.
    /// The order change is already committed, so failures here are logged only.
    pub(crate) async fn after_status_change(&self, order: &Order, message: String, now: DateTime<Utc>) {
        counter!("order_status_transitions_total", "to" => order.status.to_string()).increment(1);
        info!(order_id = %order.id, status = %order.status, "Order status changed");

        self.tracking
            .publish_status(OrderStatusUpdate {
                order_id: order.id,
                order_number: order.order_number.clone(),
                status: order.status,
                message,
                timestamp: now,
            })
            .await;

        if order.status == OrderStatus::Delivered && self.award_points(order, now).await {
            if let Err(e) = self.gamification.record_delivered_order(order, now).await {
                error!(order_id = %order.id, error = %e, "Failed to update badges and challenges");
            }
        }
    }

    /// Returns false when the order was already settled.
    async fn award_points(&self, order: &Order, now: DateTime<Utc>) -> bool {
        let base_points = purchase_points(order.totals.total);
        if base_points == 0 {
            return true;
        }
        let change = PointsChange::Earn {
            base_points,
            order_id: Some(order.id),
            description: format!("Purchase {}", order.order_number),
        };
        match self.loyalty.record_points(order.user_id, &change, now).await {
            Ok((account, tx)) => {
                info!(user_id = %order.user_id, points = tx.points, tier = %account.tier, "Loyalty points awarded");
                true
            }
            Err(CommerceError::Conflict(_)) => {
                debug!(order_id = %order.id, "Loyalty points already awarded");
                false
            }
            Err(e) => {
                error!(order_id = %order.id, error = %e, "Failed to award loyalty points");
                false
            }
        }
    }
}
