//! Realtime side channel for pushing trip and wallet state changes to
//! connected clients.
//!
//! Clients subscribe to channels after connecting: drivers listen on their
//! vehicle-class channel (`drivers:{vehicle_type}`) and their own channel
//! (`driver:{id}`), riders on `user:{id}`. Delivery is best-effort; failures
//! are logged and never fail the owning business operation.

use crate::error::{AppError, AppResult};
use futures_util::{SinkExt, StreamExt};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::broadcast;
use tokio::sync::RwLock;
use tokio_tungstenite::{accept_async, tungstenite::Message};
use tracing::{error, info, warn};
use uuid::Uuid;

/// Realtime event types
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum WsMessage {
    #[serde(rename = "subscribe")]
    Subscribe { channel: String },
    #[serde(rename = "unsubscribe")]
    Unsubscribe { channel: String },
    #[serde(rename = "trip_requested")]
    TripRequested {
        trip_id: String,
        kind: String,
        vehicle_type: String,
        pickup_address: String,
        destination_address: String,
        fare: i64,
    },
    #[serde(rename = "trip_withdrawn")]
    TripWithdrawn { trip_id: String },
    #[serde(rename = "trip_accepted")]
    TripAccepted { trip_id: String, driver_id: String },
    #[serde(rename = "driver_arrived")]
    DriverArrived { trip_id: String },
    #[serde(rename = "trip_paid")]
    TripPaid { trip_id: String },
    #[serde(rename = "trip_started")]
    TripStarted { trip_id: String },
    #[serde(rename = "trip_completed")]
    TripCompleted { trip_id: String, fare: i64 },
    #[serde(rename = "trip_cancelled")]
    TripCancelled {
        trip_id: String,
        by: String,
        reason: String,
    },
    #[serde(rename = "trip_expired")]
    TripExpired { trip_id: String },
    #[serde(rename = "wallet_credited")]
    WalletCredited { amount: i64, balance: i64 },
    #[serde(rename = "error")]
    Error { message: String },
}

impl WsMessage {
    /// Channel a broadcast message is scoped to, when it carries one
    fn target_channel(&self) -> Option<String> {
        match self {
            WsMessage::TripRequested { vehicle_type, .. } => {
                Some(format!("drivers:{}", vehicle_type))
            }
            _ => None,
        }
    }
}

/// Notifier capability: broadcast to a channel or emit to one identity.
/// Injected into the state machine and settlement components rather than
/// imported as ambient global state.
pub struct Notifier {
    /// Broadcast sender for sending messages to all clients
    tx: broadcast::Sender<Envelope>,
    /// Active subscriptions: channel -> set of client IDs
    subscriptions: Arc<RwLock<HashMap<String, Vec<Uuid>>>>,
    /// Client subscriptions: client_id -> set of channels
    client_channels: Arc<RwLock<HashMap<Uuid, Vec<String>>>>,
}

/// A message paired with the channel it targets
#[derive(Debug, Clone)]
struct Envelope {
    channel: String,
    message: WsMessage,
}

impl Notifier {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(1000); // Buffer up to 1000 messages

        Self {
            tx,
            subscriptions: Arc::new(RwLock::new(HashMap::new())),
            client_channels: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Broadcast a message to all subscribers of a channel
    pub async fn emit(&self, channel: &str, message: WsMessage) {
        let subscriptions = self.subscriptions.read().await;

        if let Some(subscribers) = subscriptions.get(channel) {
            let count = subscribers.len();
            if count > 0 {
                info!("Broadcasting to {} subscribers on channel {}", count, channel);
                let envelope = Envelope {
                    channel: channel.to_string(),
                    message,
                };
                if let Err(e) = self.tx.send(envelope) {
                    warn!("Failed to broadcast message: {}", e);
                }
            }
        }
    }

    /// Targeted send to a rider's channel
    pub async fn emit_to_user(&self, user_id: Uuid, message: WsMessage) {
        self.emit(&format!("user:{}", user_id), message).await;
    }

    /// Targeted send to a driver's channel
    pub async fn emit_to_driver(&self, driver_id: Uuid, message: WsMessage) {
        self.emit(&format!("driver:{}", driver_id), message).await;
    }

    /// Fan a new request out to every connected driver on the vehicle channel
    pub async fn broadcast_trip_requested(&self, message: WsMessage) {
        if let Some(channel) = message.target_channel() {
            self.emit(&channel, message).await;
        }
    }

    /// Tell drivers on a vehicle channel to drop a request card
    pub async fn broadcast_trip_withdrawn(&self, vehicle_type: &str, trip_id: Uuid) {
        self.emit(
            &format!("drivers:{}", vehicle_type),
            WsMessage::TripWithdrawn {
                trip_id: trip_id.to_string(),
            },
        )
        .await;
    }

    /// Subscribe a client to a channel
    pub async fn subscribe(&self, client_id: Uuid, channel: String) {
        let mut subscriptions = self.subscriptions.write().await;
        let mut client_channels = self.client_channels.write().await;

        subscriptions
            .entry(channel.clone())
            .or_insert_with(Vec::new)
            .push(client_id);

        client_channels
            .entry(client_id)
            .or_insert_with(Vec::new)
            .push(channel.clone());

        info!("Client {} subscribed to {}", client_id, channel);
    }

    /// Unsubscribe a client from a channel
    pub async fn unsubscribe(&self, client_id: Uuid, channel: &str) {
        let mut subscriptions = self.subscriptions.write().await;
        let mut client_channels = self.client_channels.write().await;

        if let Some(subscribers) = subscriptions.get_mut(channel) {
            subscribers.retain(|&id| id != client_id);
        }

        if let Some(channels) = client_channels.get_mut(&client_id) {
            channels.retain(|c| c != channel);
        }

        info!("Client {} unsubscribed from {}", client_id, channel);
    }

    /// Get all channels a client is subscribed to
    pub async fn get_client_channels(&self, client_id: Uuid) -> Vec<String> {
        let client_channels = self.client_channels.read().await;
        client_channels.get(&client_id).cloned().unwrap_or_default()
    }

    /// Check if client is subscribed to a channel
    async fn is_client_subscribed(&self, client_id: Uuid, channel: &str) -> bool {
        let subscriptions = self.subscriptions.read().await;
        if let Some(subscribers) = subscriptions.get(channel) {
            subscribers.contains(&client_id)
        } else {
            false
        }
    }

    /// Handle a new WebSocket connection
    pub async fn handle_connection(&self, stream: tokio::net::TcpStream) -> AppResult<()> {
        let ws_stream = accept_async(stream)
            .await
            .map_err(|e| AppError::Message(format!("WebSocket handshake failed: {}", e)))?;

        let (mut ws_sender, mut ws_receiver) = ws_stream.split();
        let mut rx = self.tx.subscribe();
        let client_id = Uuid::new_v4();

        info!("New WebSocket connection: {}", client_id);

        // Send welcome message
        let welcome = serde_json::json!({
            "type": "connected",
            "client_id": client_id.to_string(),
            "message": "Connected to RideLink realtime server"
        });
        if let Err(e) = ws_sender.send(Message::Text(welcome.to_string())).await {
            warn!("Failed to send welcome message: {}", e);
        }

        // Wrap sender in Arc<Mutex> to share between tasks
        let ws_sender = Arc::new(tokio::sync::Mutex::new(ws_sender));
        let ws_sender_for_receiver = ws_sender.clone();
        let notifier_for_receiver = self.clone();

        tokio::spawn(async move {
            while let Some(msg) = ws_receiver.next().await {
                match msg {
                    Ok(Message::Text(text)) => {
                        if let Ok(sub_msg) = serde_json::from_str::<WsMessage>(&text) {
                            match sub_msg {
                                WsMessage::Subscribe { channel } => {
                                    notifier_for_receiver
                                        .subscribe(client_id, channel.clone())
                                        .await;
                                    let ack = serde_json::json!({
                                        "type": "subscribed",
                                        "channel": channel
                                    });
                                    let mut sender = ws_sender_for_receiver.lock().await;
                                    if let Err(e) = sender.send(Message::Text(ack.to_string())).await
                                    {
                                        warn!("Failed to send ack: {}", e);
                                    }
                                }
                                WsMessage::Unsubscribe { channel } => {
                                    notifier_for_receiver.unsubscribe(client_id, &channel).await;
                                    let ack = serde_json::json!({
                                        "type": "unsubscribed",
                                        "channel": channel
                                    });
                                    let mut sender = ws_sender_for_receiver.lock().await;
                                    if let Err(e) = sender.send(Message::Text(ack.to_string())).await
                                    {
                                        warn!("Failed to send ack: {}", e);
                                    }
                                }
                                _ => {
                                    warn!("Unexpected message type from client {}", client_id);
                                }
                            }
                        } else {
                            warn!("Failed to parse message from client {}: {}", client_id, text);
                            let err = serde_json::json!({
                                "type": "error",
                                "message": "Invalid message format"
                            });
                            let mut sender = ws_sender_for_receiver.lock().await;
                            let _ = sender.send(Message::Text(err.to_string())).await;
                        }
                    }
                    Ok(Message::Close(_)) => {
                        info!("WebSocket connection closed: {}", client_id);
                        break;
                    }
                    Err(e) => {
                        error!("WebSocket error: {}", e);
                        break;
                    }
                    _ => {}
                }
            }

            // Clean up all subscriptions for this client
            let channels = notifier_for_receiver.get_client_channels(client_id).await;
            for channel in channels {
                notifier_for_receiver.unsubscribe(client_id, &channel).await;
            }
        });

        // Forward broadcast messages the client subscribed to
        let notifier_for_broadcast = self.clone();
        let ws_sender_for_broadcast = ws_sender.clone();
        tokio::spawn(async move {
            while let Ok(envelope) = rx.recv().await {
                if !notifier_for_broadcast
                    .is_client_subscribed(client_id, &envelope.channel)
                    .await
                {
                    continue;
                }

                let json = match serde_json::to_string(&envelope.message) {
                    Ok(json) => json,
                    Err(e) => {
                        error!("Failed to serialize message: {}", e);
                        continue;
                    }
                };

                let mut sender = ws_sender_for_broadcast.lock().await;
                if let Err(e) = sender.send(Message::Text(json)).await {
                    error!("Failed to send message to client {}: {}", client_id, e);
                    break;
                }
            }
        });

        Ok(())
    }
}

impl Clone for Notifier {
    fn clone(&self) -> Self {
        Self {
            tx: self.tx.clone(),
            subscriptions: Arc::clone(&self.subscriptions),
            client_channels: Arc::clone(&self.client_channels),
        }
    }
}

impl Default for Notifier {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_message_serialization_is_tagged() {
        let msg = WsMessage::TripAccepted {
            trip_id: "t1".into(),
            driver_id: "d1".into(),
        };
        let json = serde_json::to_value(&msg).unwrap();
        assert_eq!(json["type"], "trip_accepted");
        assert_eq!(json["trip_id"], "t1");
    }

    #[test]
    fn test_trip_requested_targets_vehicle_channel() {
        let msg = WsMessage::TripRequested {
            trip_id: "t1".into(),
            kind: "ride".into(),
            vehicle_type: "car".into(),
            pickup_address: "A".into(),
            destination_address: "B".into(),
            fare: 1000,
        };
        assert_eq!(msg.target_channel(), Some("drivers:car".to_string()));
    }

    #[tokio::test]
    async fn test_subscribe_unsubscribe() {
        let notifier = Notifier::new();
        let client = Uuid::new_v4();

        notifier.subscribe(client, "drivers:car".into()).await;
        assert!(notifier.is_client_subscribed(client, "drivers:car").await);

        notifier.unsubscribe(client, "drivers:car").await;
        assert!(!notifier.is_client_subscribed(client, "drivers:car").await);
    }

    #[tokio::test]
    async fn test_emit_without_subscribers_is_noop() {
        let notifier = Notifier::new();
        // No subscribers, no receivers: must not panic or error
        notifier
            .emit_to_user(
                Uuid::new_v4(),
                WsMessage::TripExpired {
                    trip_id: "t1".into(),
                },
            )
            .await;
    }
}
