//! Coordinator events and their WebSocket stream.
//!
//! Every visible state transition of the coordinator is published as a
//! [`CoordinatorEvent`] on an [`EventBroadcaster`]. The `/ws` endpoint
//! forwards those events to connected clients as JSON text frames.
//!
//! # Event Types
//!
//! - `connected` - sent once on connect, carries the current snapshot
//! - `execution_started` - a run was dispatched
//! - `execution_completed` - the latest run's result was accepted
//! - `analysis_started` - an analysis was dispatched
//! - `feedback_ready` - the latest analysis was accepted
//!
//! Stale responses never produce events.

use std::sync::Arc;
use std::time::Duration;

use axum::{
    extract::{
        ws::{Message, WebSocket},
        State, WebSocketUpgrade,
    },
    response::Response,
};
use futures::{SinkExt, StreamExt};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tokio::time::interval;
use tracing::{debug, info, warn};

use crate::api::AppState;
use crate::coordinator::CoordinatorSnapshot;
use crate::execution::ExecutionResult;
use crate::feedback::{FeedbackBundle, FeedbackTier};
use crate::lane::{ExecutionStatus, RequestGeneration};

// ============================================================================
// Event Payloads
// ============================================================================

/// Payload for the `connected` event.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConnectedPayload {
    /// The coordinator state at connect time.
    pub state: CoordinatorSnapshot,
}

/// Payload for the `execution_started` event.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionStartedPayload {
    /// Generation of the dispatched run.
    pub generation: RequestGeneration,
    /// Editor language of the run.
    pub language: String,
    /// Whether this is a syntax-only check.
    pub syntax_only: bool,
}

/// Payload for the `execution_completed` event.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionCompletedPayload {
    /// Generation of the accepted run.
    pub generation: RequestGeneration,
    /// Lane status after acceptance.
    pub status: ExecutionStatus,
    /// The accepted result.
    pub result: ExecutionResult,
}

/// Payload for the `analysis_started` event.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalysisStartedPayload {
    /// Generation of the dispatched analysis.
    pub generation: RequestGeneration,
}

/// Payload for the `feedback_ready` event.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeedbackReadyPayload {
    /// Generation of the accepted analysis.
    pub generation: RequestGeneration,
    /// Ladder tier that produced the bundle.
    pub tier: FeedbackTier,
    /// The accepted bundle.
    pub bundle: FeedbackBundle,
}

// ============================================================================
// Event Enum
// ============================================================================

/// Coordinator state transition events.
///
/// Serialized as JSON objects with "event" and "payload" fields.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "event", content = "payload", rename_all = "snake_case")]
pub enum CoordinatorEvent {
    /// Sent when a client connects.
    Connected(ConnectedPayload),
    /// A run was dispatched.
    ExecutionStarted(ExecutionStartedPayload),
    /// The latest run completed.
    ExecutionCompleted(ExecutionCompletedPayload),
    /// An analysis was dispatched.
    AnalysisStarted(AnalysisStartedPayload),
    /// The latest analysis completed.
    FeedbackReady(FeedbackReadyPayload),
}

impl CoordinatorEvent {
    /// Creates a `Connected` event.
    #[must_use]
    pub const fn connected(state: CoordinatorSnapshot) -> Self {
        Self::Connected(ConnectedPayload { state })
    }

    /// Creates an `ExecutionStarted` event.
    #[must_use]
    pub const fn execution_started(
        generation: RequestGeneration,
        language: String,
        syntax_only: bool,
    ) -> Self {
        Self::ExecutionStarted(ExecutionStartedPayload {
            generation,
            language,
            syntax_only,
        })
    }

    /// Creates an `ExecutionCompleted` event.
    #[must_use]
    pub const fn execution_completed(
        generation: RequestGeneration,
        status: ExecutionStatus,
        result: ExecutionResult,
    ) -> Self {
        Self::ExecutionCompleted(ExecutionCompletedPayload {
            generation,
            status,
            result,
        })
    }

    /// Creates an `AnalysisStarted` event.
    #[must_use]
    pub const fn analysis_started(generation: RequestGeneration) -> Self {
        Self::AnalysisStarted(AnalysisStartedPayload { generation })
    }

    /// Creates a `FeedbackReady` event.
    #[must_use]
    pub const fn feedback_ready(
        generation: RequestGeneration,
        tier: FeedbackTier,
        bundle: FeedbackBundle,
    ) -> Self {
        Self::FeedbackReady(FeedbackReadyPayload {
            generation,
            tier,
            bundle,
        })
    }

    /// Returns the event name as a string.
    #[must_use]
    pub const fn event_name(&self) -> &'static str {
        match self {
            Self::Connected(_) => "connected",
            Self::ExecutionStarted(_) => "execution_started",
            Self::ExecutionCompleted(_) => "execution_completed",
            Self::AnalysisStarted(_) => "analysis_started",
            Self::FeedbackReady(_) => "feedback_ready",
        }
    }
}

// ============================================================================
// Event Broadcaster
// ============================================================================

/// Fans coordinator events out to every subscriber.
///
/// Events are not retained for subscribers that join later.
#[derive(Debug, Clone)]
pub struct EventBroadcaster {
    sender: broadcast::Sender<CoordinatorEvent>,
}

impl EventBroadcaster {
    /// Creates a broadcaster buffering `capacity` events per subscriber.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    /// Creates a new subscriber.
    ///
    /// A subscriber that falls more than `capacity` events behind receives
    /// `Lagged` and misses the overwritten events.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<CoordinatorEvent> {
        self.sender.subscribe()
    }

    /// Publishes an event. Returns the number of subscribers reached.
    pub fn send(&self, event: CoordinatorEvent) -> usize {
        // Err only means nobody is listening
        self.sender.send(event).unwrap_or(0)
    }

    /// Returns the number of active subscribers.
    #[must_use]
    pub fn receiver_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for EventBroadcaster {
    fn default() -> Self {
        Self::new(100)
    }
}

// ============================================================================
// WebSocket Handler
// ============================================================================

/// Interval between heartbeat pings.
const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(30);

/// Maximum number of missed pong responses before disconnecting.
const MAX_MISSED_PONGS: u8 = 3;

/// WebSocket upgrade handler for `GET /ws`.
pub async fn ws_handler(ws: WebSocketUpgrade, State(state): State<Arc<AppState>>) -> Response {
    info!("New WebSocket connection request");
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

/// Handles a single WebSocket connection.
///
/// - Sends `connected` with the current snapshot immediately
/// - Forwards every broadcast event
/// - Pings every 30 seconds and closes after 3 missed pongs
async fn handle_socket(socket: WebSocket, state: Arc<AppState>) {
    let (mut sender, mut receiver) = socket.split();

    // Subscribe before taking the snapshot so no transition falls in between
    let mut event_receiver = state.coordinator.subscribe();

    let snapshot = match state.coordinator.snapshot().await {
        Ok(snapshot) => snapshot,
        Err(e) => {
            warn!(error = %e, "Cannot greet WebSocket client");
            return;
        }
    };

    let connected_json = match serde_json::to_string(&CoordinatorEvent::connected(snapshot)) {
        Ok(json) => json,
        Err(e) => {
            warn!("Failed to serialize connected event: {}", e);
            return;
        }
    };

    if sender.send(Message::Text(connected_json)).await.is_err() {
        debug!("Client disconnected before receiving connected event");
        return;
    }

    info!("WebSocket client connected, sent initial state");

    let mut heartbeat_interval = interval(HEARTBEAT_INTERVAL);
    // The first tick completes immediately
    heartbeat_interval.tick().await;
    let mut missed_pongs = 0u8;

    loop {
        tokio::select! {
            msg = receiver.next() => {
                match msg {
                    Some(Ok(Message::Pong(_))) => {
                        missed_pongs = 0;
                        debug!("Received pong from client");
                    }
                    Some(Ok(Message::Close(_))) => {
                        info!("Client requested close");
                        break;
                    }
                    Some(Ok(Message::Text(_) | Message::Binary(_))) => {
                        debug!("Ignoring data message from client");
                    }
                    Some(Ok(Message::Ping(data))) => {
                        if sender.send(Message::Pong(data)).await.is_err() {
                            debug!("Failed to send pong, client disconnected");
                            break;
                        }
                    }
                    Some(Err(e)) => {
                        debug!("WebSocket error: {}", e);
                        break;
                    }
                    None => {
                        debug!("WebSocket stream ended");
                        break;
                    }
                }
            }

            event = event_receiver.recv() => {
                match event {
                    Ok(event) => {
                        let json = match serde_json::to_string(&event) {
                            Ok(j) => j,
                            Err(e) => {
                                warn!(event = event.event_name(), "Failed to serialize event: {}", e);
                                continue;
                            }
                        };

                        if sender.send(Message::Text(json)).await.is_err() {
                            debug!("Failed to send event, client disconnected");
                            break;
                        }
                    }
                    Err(broadcast::error::RecvError::Lagged(n)) => {
                        warn!("Client lagged, missed {} events", n);
                    }
                    Err(broadcast::error::RecvError::Closed) => {
                        info!("Coordinator stopped, closing stream");
                        break;
                    }
                }
            }

            _ = heartbeat_interval.tick() => {
                if sender.send(Message::Ping(vec![])).await.is_err() {
                    debug!("Failed to send ping, client disconnected");
                    break;
                }
                missed_pongs += 1;
                if missed_pongs >= MAX_MISSED_PONGS {
                    info!("Client missed {} pongs, closing connection", MAX_MISSED_PONGS);
                    break;
                }
            }
        }
    }

    info!("WebSocket client disconnected");
}

// ============================================================================
// Tests
// ============================================================================
