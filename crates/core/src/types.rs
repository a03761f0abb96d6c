use chrono::{DateTime, Utc};
use serde::Serialize;
use std::time::Instant;
use uuid::Uuid;

/// One inbound message from a perception agent.
/// `received_at` is stamped by the hub on receipt, never taken from the sender.
#[derive(Debug, Clone)]
pub struct Event {
    pub id: Uuid,
    pub source: String,
    pub content: String,
    pub received_at: Instant,
}

impl Event {
    pub fn new(source: impl Into<String>, content: impl Into<String>) -> Self {
        Self::at(source, content, Instant::now())
    }

    /// Build an event with an explicit arrival time.
    pub fn at(source: impl Into<String>, content: impl Into<String>, received_at: Instant) -> Self {
        Self {
            id: Uuid::new_v4(),
            source: source.into(),
            content: content.into(),
            received_at,
        }
    }
}

/// Downstream connection state, owned by the connection manager.
/// There is no failed state: a failed connect returns to `Disconnected`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub enum ConnectionState {
    #[default]
    Disconnected,
    Connecting,
    Connected,
}

impl std::fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Disconnected => write!(f, "disconnected"),
            Self::Connecting => write!(f, "connecting"),
            Self::Connected => write!(f, "connected"),
        }
    }
}

/// What the orchestrator did with one event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    /// Empty content; nothing to match.
    Ignored,
    /// No rule for this source matched the phrase.
    NoMatch,
    /// Every matching rule's action is cooling down.
    Suppressed { action: String },
    /// Matched and handed to the dispatcher for delivery.
    Dispatched { action: String },
    /// Matched, but the action is not forwarded downstream.
    Recognized { action: String },
}

impl Outcome {
    /// The action that fired, if any.
    pub fn fired_action(&self) -> Option<&str> {
        match self {
            Self::Dispatched { action } | Self::Recognized { action } => Some(action),
            _ => None,
        }
    }
}

/// Runtime snapshot broadcast after every event.
#[derive(Debug, Clone, Default, Serialize)]
pub struct HubStatus {
    pub events: u64,
    pub matched: u64,
    pub suppressed: u64,
    pub dispatched: u64,
    pub recognized_only: u64,
    pub last_action: Option<String>,
    pub last_intent_at: Option<DateTime<Utc>>,
}
