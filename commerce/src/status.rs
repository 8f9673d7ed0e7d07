//! Order, payment and delivery state machines.
//!
//! Order and payment status move independently. Delivery progress feeds the
//! order status through [`order_status_for_delivery`].

use chrono::{DateTime, Utc};

use crate::error::{CommerceError, CommerceResult};
use crate::model::{Delivery, DeliveryStatus, OrderStatus, PaymentStatus};

impl OrderStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, OrderStatus::Delivered | OrderStatus::Cancelled)
    }

    /// Forward moves along the fulfilment chain (steps may be skipped) and
    /// cancellation from any open state.
    pub fn can_transition_to(self, next: OrderStatus) -> bool {
        if self.is_terminal() || self == next {
            return false;
        }
        next == OrderStatus::Cancelled || next > self
    }

    pub fn description(self) -> &'static str {
        match self {
            OrderStatus::Pending => "Order received",
            OrderStatus::Confirmed => "Order confirmed",
            OrderStatus::Processing => "Order is being prepared",
            OrderStatus::Ready => "Order is ready for pickup by the driver",
            OrderStatus::OutForDelivery => "Order is on its way",
            OrderStatus::Delivered => "Order delivered",
            OrderStatus::Cancelled => "Order cancelled",
        }
    }
}

impl PaymentStatus {
    pub fn can_transition_to(self, next: PaymentStatus) -> bool {
        use PaymentStatus::*;
        matches!(
            (self, next),
            (Pending, Paid) | (Pending, Failed) | (Failed, Pending) | (Failed, Paid) | (Paid, Refunded)
        )
    }
}

impl DeliveryStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, DeliveryStatus::Delivered | DeliveryStatus::Failed)
    }

    pub fn can_transition_to(self, next: DeliveryStatus) -> bool {
        if self.is_terminal() || self == next {
            return false;
        }
        next == DeliveryStatus::Failed || next > self
    }
}

pub fn check_order_transition(from: OrderStatus, to: OrderStatus) -> CommerceResult<()> {
    if from.can_transition_to(to) {
        Ok(())
    } else {
        Err(CommerceError::transition("order", from, to))
    }
}

pub fn check_payment_transition(from: PaymentStatus, to: PaymentStatus) -> CommerceResult<()> {
    if from.can_transition_to(to) {
        Ok(())
    } else {
        Err(CommerceError::transition("payment", from, to))
    }
}

pub fn check_delivery_transition(from: DeliveryStatus, to: DeliveryStatus) -> CommerceResult<()> {
    if from.can_transition_to(to) {
        Ok(())
    } else {
        Err(CommerceError::transition("delivery", from, to))
    }
}

/// Applies a checked delivery status change in place.
pub fn advance_delivery(delivery: &mut Delivery, to: DeliveryStatus, notes: Option<String>, now: DateTime<Utc>) -> CommerceResult<()> {
    check_delivery_transition(delivery.status, to)?;
    delivery.status = to;
    delivery.updated_at = now;
    if notes.is_some() {
        delivery.notes = notes;
    }
    if to == DeliveryStatus::Delivered {
        delivery.actual_time = Some(now);
    }
    Ok(())
}

/// Order status implied by a delivery update, if the order should move.
///
/// Pickup or transit while the order is READY puts it out for delivery; a
/// completed delivery completes the order.
pub fn order_status_for_delivery(delivery: DeliveryStatus, order: OrderStatus) -> Option<OrderStatus> {
    let target = match delivery {
        DeliveryStatus::PickedUp | DeliveryStatus::InTransit if order == OrderStatus::Ready => {
            OrderStatus::OutForDelivery
        }
        DeliveryStatus::Delivered => OrderStatus::Delivered,
        _ => return None,
    };
    order.can_transition_to(target).then_some(target)
}
