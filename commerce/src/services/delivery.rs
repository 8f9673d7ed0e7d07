use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};
use uuid::Uuid;

use crate::error::{CommerceError, CommerceResult};
use crate::model::*;
use crate::storage::{DeliveryStorage, UserStorage};
use crate::tracking::{OrderSnapshot, TrackingHub};

use super::OrderService;

/// A driver position report, from HTTP or the tracking socket.
#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LocationReport {
    pub latitude: f64,
    pub longitude: f64,
    pub accuracy: Option<f64>,
    pub heading: Option<f64>,
    pub speed: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DeliveryStats {
    pub total: usize,
    pub completed: usize,
    pub pending: usize,
    pub failed: usize,
    pub today: usize,
    pub average_rating: Option<f64>,
}

pub fn delivery_stats(deliveries: &[Delivery], now: DateTime<Utc>) -> DeliveryStats {
    let today = now.date_naive();
    let ratings: Vec<f64> = deliveries.iter().filter_map(|d| d.rating).map(f64::from).collect();
    DeliveryStats {
        total: deliveries.len(),
        completed: deliveries.iter().filter(|d| d.status == DeliveryStatus::Delivered).count(),
        pending: deliveries.iter().filter(|d| d.is_open()).count(),
        failed: deliveries.iter().filter(|d| d.status == DeliveryStatus::Failed).count(),
        today: deliveries.iter().filter(|d| d.created_at.date_naive() == today).count(),
        average_rating: (!ratings.is_empty())
            .then(|| (ratings.iter().sum::<f64>() / ratings.len() as f64 * 100.0).round() / 100.0),
    }
}

#[derive(Clone)]
pub struct DeliveryService {
    deliveries: Arc<dyn DeliveryStorage>,
    users: Arc<dyn UserStorage>,
    orders: OrderService,
    tracking: TrackingHub,
}

impl DeliveryService {
    pub fn new(deliveries: Arc<dyn DeliveryStorage>, users: Arc<dyn UserStorage>, orders: OrderService, tracking: TrackingHub) -> Self {
        Self { deliveries, users, orders, tracking }
    }

    pub async fn assign(
        &self,
        order_id: Uuid,
        driver_id: Uuid,
        estimated_time: Option<DateTime<Utc>>,
        notes: Option<String>,
        now: DateTime<Utc>,
    ) -> CommerceResult<Delivery> {
        let order = self.orders.get_order(order_id).await?;
        if order.status.is_terminal() {
            return Err(CommerceError::validation(format!("Order is already {}", order.status)));
        }
        match self.users.get_user(driver_id).await? {
            Some(driver) if driver.role == UserRole::Driver && driver.is_active => {}
            _ => return Err(CommerceError::validation("Driver must be an active user with the DRIVER role")),
        }

        let mut delivery = Delivery::new(order_id, driver_id, estimated_time, now);
        delivery.notes = notes;
        self.deliveries.create_delivery(&delivery).await?;
        info!(delivery_id = %delivery.id, order_id = %order_id, driver_id = %driver_id, "Driver assigned");
        Ok(delivery)
    }

    pub async fn my_deliveries(&self, driver_id: Uuid, status: Option<DeliveryStatus>) -> CommerceResult<Vec<Delivery>> {
        self.deliveries.list_deliveries(driver_id, status).await
    }

    /// A delivery as seen by its driver. Other drivers get a not-found.
    pub async fn driver_delivery(&self, driver_id: Uuid, delivery_id: Uuid) -> CommerceResult<Delivery> {
        match self.deliveries.get_delivery(delivery_id).await? {
            Some(delivery) if delivery.driver_id == driver_id => Ok(delivery),
            _ => Err(CommerceError::not_found(format!("Delivery {}", delivery_id))),
        }
    }

    /// Moves the delivery and, when it implies one, the order status. Both
    /// changes are stored together.
    pub async fn update_status(
        &self,
        driver_id: Uuid,
        delivery_id: Uuid,
        to: DeliveryStatus,
        notes: Option<String>,
        now: DateTime<Utc>,
    ) -> CommerceResult<(Delivery, Order)> {
        let progress = self
            .deliveries
            .transition_delivery(delivery_id, driver_id, to, notes, now)
            .await
            .inspect_err(|e| warn!(delivery_id = %delivery_id, error = %e, "Delivery status change rejected"))?;
        info!(delivery_id = %delivery_id, status = %to, "Delivery status changed");

        if progress.order_changed {
            let message = progress.order.status.description().to_string();
            self.orders.after_status_change(&progress.order, message, now).await;
        }
        Ok((progress.delivery, progress.order))
    }

    pub async fn complete(&self, driver_id: Uuid, delivery_id: Uuid, notes: Option<String>, now: DateTime<Utc>) -> CommerceResult<(Delivery, Order)> {
        let delivery = self.driver_delivery(driver_id, delivery_id).await?;
        if delivery.status == DeliveryStatus::Delivered {
            return Err(CommerceError::conflict("Delivery already completed"));
        }
        self.update_status(driver_id, delivery_id, DeliveryStatus::Delivered, notes, now).await
    }

    /// Stores the driver's position and relays it to the order's trackers.
    pub async fn update_location(
        &self,
        driver_id: Uuid,
        delivery_id: Uuid,
        report: LocationReport,
        now: DateTime<Utc>,
    ) -> CommerceResult<DriverLocation> {
        let point = GeoPoint { latitude: report.latitude, longitude: report.longitude };
        if !point.is_valid() {
            return Err(CommerceError::validation("Latitude must be within [-90, 90] and longitude within [-180, 180]"));
        }
        let delivery = self.deliveries.record_location(delivery_id, driver_id, point, now).await?;

        let location = DriverLocation {
            order_id: delivery.order_id,
            delivery_id,
            driver_id,
            point,
            accuracy: report.accuracy,
            heading: report.heading,
            speed: report.speed,
            timestamp: now,
        };
        let receivers = self.tracking.publish_location(location).await;
        tracing::debug!(delivery_id = %delivery_id, receivers, "Driver location relayed");
        Ok(location)
    }

    /// A location report from the tracking socket. Only drivers may send one.
    pub async fn report_location(
        &self,
        reporter: &User,
        delivery_id: Uuid,
        report: LocationReport,
        now: DateTime<Utc>,
    ) -> CommerceResult<DriverLocation> {
        if reporter.role != UserRole::Driver {
            return Err(CommerceError::Forbidden("Only drivers can report locations".to_string()));
        }
        self.update_location(reporter.id, delivery_id, report, now).await
    }

    /// Who may follow an order live: its customer, staff, and the driver
    /// of its current delivery.
    pub async fn may_track(&self, viewer: &User, order_id: Uuid) -> CommerceResult<bool> {
        let order = self.orders.get_order(order_id).await?;
        if order.user_id == viewer.id || viewer.role.is_admin() {
            return Ok(true);
        }
        if viewer.role == UserRole::Driver {
            return self.is_assigned_driver(order_id, viewer.id).await;
        }
        Ok(false)
    }

    /// Starting state for a new tracker: what the hub holds, completed from storage.
    pub async fn tracking_snapshot(&self, mut snapshot: OrderSnapshot) -> CommerceResult<OrderSnapshot> {
        if snapshot.status.is_none() {
            snapshot.status = Some(self.orders.get_order(snapshot.order_id).await?.status);
        }
        if snapshot.driver_location.is_none() {
            snapshot.driver_location = self
                .deliveries
                .latest_delivery_for_order(snapshot.order_id)
                .await?
                .and_then(|d| d.last_known_location());
        }
        Ok(snapshot)
    }

    pub async fn stats(&self, driver_id: Uuid, now: DateTime<Utc>) -> CommerceResult<DeliveryStats> {
        let deliveries = self.deliveries.list_deliveries(driver_id, None).await?;
        Ok(delivery_stats(&deliveries, now))
    }

    /// Whether the user is the driver of the order's current delivery.
    pub async fn is_assigned_driver(&self, order_id: Uuid, driver_id: Uuid) -> CommerceResult<bool> {
        Ok(self
            .deliveries
            .latest_delivery_for_order(order_id)
            .await?
            .is_some_and(|d| d.driver_id == driver_id))
    }
}
