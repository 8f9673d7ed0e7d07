//! `/ws` tracking socket.
//!
//! Clients connect with `?token=<jwt>` and exchange `{"event", "data"}`
//! frames. Each tracked order gets its own forwarder task that relays the
//! order's broadcast channel into the socket's outbound queue.

use std::collections::HashMap;

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::response::Response;
use chrono::Utc;
use futures_util::{SinkExt, StreamExt};
use serde::Deserialize;
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::error::{CommerceError, CommerceResult};
use crate::model::User;
use crate::services::{AuthFailure, LocationReport};
use crate::tracking::{OrderSubscription, TrackingEvent};

use super::error::ApiError;
use super::extract::ApiQuery;
use super::AppState;

const OUTBOUND_BUFFER: usize = 64;

#[derive(Debug, Deserialize)]
pub struct SocketQuery {
    pub token: Option<String>,
}

/// Frames a client may send.
#[derive(Debug, Deserialize)]
#[serde(tag = "event", content = "data", rename_all = "snake_case")]
enum ClientMessage {
    #[serde(rename_all = "camelCase")]
    TrackOrder { order_id: Uuid },
    #[serde(rename_all = "camelCase")]
    UntrackOrder { order_id: Uuid },
    #[serde(rename_all = "camelCase")]
    DriverLocationUpdate {
        delivery_id: Uuid,
        latitude: f64,
        longitude: f64,
        accuracy: Option<f64>,
        heading: Option<f64>,
        speed: Option<f64>,
    },
}

pub async fn tracking_socket(
    ws: WebSocketUpgrade,
    State(state): State<AppState>,
    ApiQuery(query): ApiQuery<SocketQuery>,
) -> Result<Response, ApiError> {
    let token = query
        .token
        .filter(|t| !t.is_empty())
        .ok_or(AuthFailure::MissingToken)?;
    let user = state.auth.authenticate(&token).await?;
    Ok(ws.on_upgrade(move |socket| run_session(socket, state, user)))
}

async fn run_session(socket: WebSocket, state: AppState, user: User) {
    info!(user_id = %user.id, role = %user.role, "Tracking socket connected");
    let (mut sink, mut stream) = socket.split();
    let (outbound, mut queue) = mpsc::channel::<TrackingEvent>(OUTBOUND_BUFFER);

    let writer = tokio::spawn(async move {
        while let Some(event) = queue.recv().await {
            let text = match serde_json::to_string(&event) {
                Ok(text) => text,
                Err(e) => {
                    warn!(error = %e, "Failed to encode tracking event");
                    continue;
                }
            };
            if sink.send(Message::Text(text.into())).await.is_err() {
                break;
            }
        }
    });

    let mut session = Session { state, user, outbound, forwarders: HashMap::new() };
    while let Some(frame) = stream.next().await {
        match frame {
            Ok(Message::Text(text)) => session.handle_text(text.as_str()).await,
            Ok(Message::Close(_)) => break,
            Ok(_) => {}
            Err(e) => {
                debug!(error = %e, "Tracking socket read failed");
                break;
            }
        }
    }

    session.close().await;
    writer.abort();
}

struct Session {
    state: AppState,
    user: User,
    outbound: mpsc::Sender<TrackingEvent>,
    forwarders: HashMap<Uuid, JoinHandle<()>>,
}

impl Session {
    async fn handle_text(&mut self, text: &str) {
        let message = match serde_json::from_str::<ClientMessage>(text) {
            Ok(message) => message,
            Err(e) => {
                debug!(error = %e, "Unreadable tracking frame");
                self.send_error("Invalid message").await;
                return;
            }
        };

        let outcome = match message {
            ClientMessage::TrackOrder { order_id } => self.track(order_id).await,
            ClientMessage::UntrackOrder { order_id } => {
                self.untrack(order_id).await;
                Ok(())
            }
            ClientMessage::DriverLocationUpdate { delivery_id, latitude, longitude, accuracy, heading, speed } => {
                let report = LocationReport { latitude, longitude, accuracy, heading, speed };
                self.report_location(delivery_id, report).await
            }
        };
        if let Err(e) = outcome {
            self.send_error(&client_message(&e)).await;
        }
    }

    async fn track(&mut self, order_id: Uuid) -> CommerceResult<()> {
        if !self.state.delivery_service.may_track(&self.user, order_id).await? {
            return Err(CommerceError::Forbidden("Not allowed to track this order".to_string()));
        }
        if let Some(previous) = self.forwarders.remove(&order_id) {
            previous.abort();
            let _ = previous.await;
        }

        let OrderSubscription { mut receiver, snapshot } = self.state.tracking.subscribe(order_id).await;
        let snapshot = match self.state.delivery_service.tracking_snapshot(snapshot).await {
            Ok(snapshot) => snapshot,
            Err(e) => {
                drop(receiver);
                self.state.tracking.release(order_id).await;
                return Err(e);
            }
        };
        let _ = self.outbound.send(TrackingEvent::OrderCurrentStatus(snapshot)).await;

        let outbound = self.outbound.clone();
        let handle = tokio::spawn(async move {
            loop {
                match receiver.recv().await {
                    Ok(event) => {
                        if outbound.send(event).await.is_err() {
                            break;
                        }
                    }
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        warn!(order_id = %order_id, skipped, "Tracking subscriber lagged, skipped events");
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        });
        self.forwarders.insert(order_id, handle);
        debug!(user_id = %self.user.id, order_id = %order_id, "Tracking order");
        Ok(())
    }

    async fn untrack(&mut self, order_id: Uuid) {
        if let Some(handle) = self.forwarders.remove(&order_id) {
            handle.abort();
            let _ = handle.await;
            self.state.tracking.release(order_id).await;
        }
    }

    async fn report_location(&self, delivery_id: Uuid, report: LocationReport) -> CommerceResult<()> {
        self.state
            .delivery_service
            .report_location(&self.user, delivery_id, report, Utc::now())
            .await?;
        Ok(())
    }

    async fn send_error(&self, message: &str) {
        let _ = self
            .outbound
            .send(TrackingEvent::Error { message: message.to_string() })
            .await;
    }

    async fn close(mut self) {
        let orders: Vec<Uuid> = self.forwarders.keys().copied().collect();
        for order_id in orders {
            self.untrack(order_id).await;
        }
        info!(user_id = %self.user.id, "Tracking socket closed");
    }
}

fn client_message(error: &CommerceError) -> String {
    match error {
        CommerceError::Storage(e) => {
            tracing::error!(error = %e, "Tracking socket storage failure");
            "Internal server error".to_string()
        }
        other => other.to_string(),
    }
}
