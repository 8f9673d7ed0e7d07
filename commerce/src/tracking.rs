//! Per-order real-time relay.
//!
//! Each order gets its own broadcast channel, created by the first
//! subscriber and dropped as soon as nobody listens. Publishing never
//! creates a channel: the durable state lives in storage, and a new
//! subscriber's snapshot is completed from there.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::{broadcast, RwLock};
use tracing::debug;
use uuid::Uuid;

use crate::model::{DriverLocation, OrderStatus};

pub const DEFAULT_CHANNEL_CAPACITY: usize = 64;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderStatusUpdate {
    pub order_id: Uuid,
    pub order_number: String,
    pub status: OrderStatus,
    pub message: String,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderSnapshot {
    pub order_id: Uuid,
    pub status: Option<OrderStatus>,
    pub driver_location: Option<DriverLocation>,
}

/// Messages pushed to tracking clients, serialized as `{"event": ..., "data": ...}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data", rename_all = "snake_case")]
pub enum TrackingEvent {
    OrderStatusUpdated(OrderStatusUpdate),
    DriverLocationUpdated(DriverLocation),
    OrderCurrentStatus(OrderSnapshot),
    Error { message: String },
}

impl TrackingEvent {
    pub fn name(&self) -> &'static str {
        match self {
            TrackingEvent::OrderStatusUpdated(_) => "order_status_updated",
            TrackingEvent::DriverLocationUpdated(_) => "driver_location_updated",
            TrackingEvent::OrderCurrentStatus(_) => "order_current_status",
            TrackingEvent::Error { .. } => "error",
        }
    }
}

struct OrderChannel {
    sender: broadcast::Sender<TrackingEvent>,
    last_location: Option<DriverLocation>,
    last_status: Option<OrderStatus>,
}

impl OrderChannel {
    fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender, last_location: None, last_status: None }
    }
}

pub struct OrderSubscription {
    pub receiver: broadcast::Receiver<TrackingEvent>,
    pub snapshot: OrderSnapshot,
}

#[derive(Clone)]
pub struct TrackingHub {
    channels: Arc<RwLock<HashMap<Uuid, OrderChannel>>>,
    capacity: usize,
}

impl Default for TrackingHub {
    fn default() -> Self {
        Self::new(DEFAULT_CHANNEL_CAPACITY)
    }
}

impl TrackingHub {
    pub fn new(capacity: usize) -> Self {
        Self {
            channels: Arc::new(RwLock::new(HashMap::new())),
            capacity: capacity.max(1),
        }
    }

    pub async fn subscribe(&self, order_id: Uuid) -> OrderSubscription {
        let mut channels = self.channels.write().await;
        let channel = channels
            .entry(order_id)
            .or_insert_with(|| OrderChannel::new(self.capacity));
        OrderSubscription {
            receiver: channel.sender.subscribe(),
            snapshot: OrderSnapshot {
                order_id,
                status: channel.last_status,
                driver_location: channel.last_location,
            },
        }
    }

    /// Relays the position to the order's subscribers unless a newer one
    /// was already relayed. Returns how many subscribers received it.
    pub async fn publish_location(&self, location: DriverLocation) -> usize {
        let mut channels = self.channels.write().await;
        let Some(channel) = channels.get_mut(&location.order_id) else {
            return 0;
        };
        if channel
            .last_location
            .is_some_and(|last| last.timestamp > location.timestamp)
        {
            debug!(order_id = %location.order_id, "Dropping out-of-order driver location");
            return 0;
        }
        channel.last_location = Some(location);
        let delivered = channel.sender.send(TrackingEvent::DriverLocationUpdated(location)).unwrap_or(0);
        metrics::counter!("tracking_events_published_total", "event" => "driver_location_updated").increment(1);
        if delivered == 0 {
            channels.remove(&location.order_id);
        }
        delivered
    }

    pub async fn publish_status(&self, update: OrderStatusUpdate) -> usize {
        let order_id = update.order_id;
        let mut channels = self.channels.write().await;
        let Some(channel) = channels.get_mut(&order_id) else {
            return 0;
        };
        let terminal = update.status.is_terminal();
        channel.last_status = Some(update.status);
        if terminal {
            channel.last_location = None;
        }
        let delivered = channel.sender.send(TrackingEvent::OrderStatusUpdated(update)).unwrap_or(0);
        metrics::counter!("tracking_events_published_total", "event" => "order_status_updated").increment(1);
        if delivered == 0 {
            channels.remove(&order_id);
        }
        delivered
    }

    pub async fn last_location(&self, order_id: Uuid) -> Option<DriverLocation> {
        self.channels
            .read()
            .await
            .get(&order_id)
            .and_then(|c| c.last_location)
    }

    /// Drops the order's channel once its last subscriber is gone.
    pub async fn release(&self, order_id: Uuid) {
        let mut channels = self.channels.write().await;
        let idle = channels
            .get(&order_id)
            .is_some_and(|c| c.sender.receiver_count() == 0);
        if idle {
            channels.remove(&order_id);
        }
    }

    pub async fn subscriber_count(&self, order_id: Uuid) -> usize {
        self.channels
            .read()
            .await
            .get(&order_id)
            .map(|c| c.sender.receiver_count())
            .unwrap_or(0)
    }

    pub async fn channel_count(&self) -> usize {
        self.channels.read().await.len()
    }
}
