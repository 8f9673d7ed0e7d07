use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::{DeliveryStatus, Order};

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GeoPoint {
    pub latitude: f64,
    pub longitude: f64,
}

impl GeoPoint {
    pub fn is_valid(&self) -> bool {
        (-90.0..=90.0).contains(&self.latitude)
            && (-180.0..=180.0).contains(&self.longitude)
            && self.latitude.is_finite()
            && self.longitude.is_finite()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Delivery {
    pub id: Uuid,
    pub order_id: Uuid,
    pub driver_id: Uuid,
    pub status: DeliveryStatus,
    pub current_location: Option<GeoPoint>,
    pub location_updated_at: Option<DateTime<Utc>>,
    pub estimated_time: Option<DateTime<Utc>>,
    pub actual_time: Option<DateTime<Utc>>,
    pub notes: Option<String>,
    /// Customer rating, 1 to 5.
    pub rating: Option<i16>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Delivery {
    pub fn new(order_id: Uuid, driver_id: Uuid, estimated_time: Option<DateTime<Utc>>, now: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4(),
            order_id,
            driver_id,
            status: DeliveryStatus::Assigned,
            current_location: None,
            location_updated_at: None,
            estimated_time,
            actual_time: None,
            notes: None,
            rating: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn is_open(&self) -> bool {
        !matches!(self.status, DeliveryStatus::Delivered | DeliveryStatus::Failed)
    }

    /// The stored position, while the delivery is still under way.
    pub fn last_known_location(&self) -> Option<DriverLocation> {
        let point = self.current_location.filter(|_| self.is_open())?;
        Some(DriverLocation {
            order_id: self.order_id,
            delivery_id: self.id,
            driver_id: self.driver_id,
            point,
            accuracy: None,
            heading: None,
            speed: None,
            timestamp: self.location_updated_at.unwrap_or(self.updated_at),
        })
    }
}

/// A driver position relayed to everyone tracking the order.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DriverLocation {
    pub order_id: Uuid,
    pub delivery_id: Uuid,
    pub driver_id: Uuid,
    #[serde(flatten)]
    pub point: GeoPoint,
    pub accuracy: Option<f64>,
    pub heading: Option<f64>,
    pub speed: Option<f64>,
    pub timestamp: DateTime<Utc>,
}

/// A delivery status change and the order as it stands afterwards.
#[derive(Debug, Clone, PartialEq)]
pub struct DeliveryProgress {
    pub delivery: Delivery,
    pub order: Order,
    /// Whether the change also moved the order status.
    pub order_changed: bool,
}
