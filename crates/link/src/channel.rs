use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// A command delivered to the downstream peer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Command {
    pub action: String,
    #[serde(default)]
    pub params: BTreeMap<String, String>,
}

impl Command {
    pub fn new(action: impl Into<String>, params: BTreeMap<String, String>) -> Self {
        Self {
            action: action.into(),
            params,
        }
    }

    /// Encode as the JSON text frame sent on the wire.
    pub fn to_json(&self) -> Result<String, LinkError> {
        serde_json::to_string(self).map_err(LinkError::Encode)
    }
}

/// Error type for downstream link operations.
#[derive(Debug, thiserror::Error)]
pub enum LinkError {
    #[error("connect to {endpoint} failed: {reason}")]
    Connect { endpoint: String, reason: String },
    #[error("send failed: {0}")]
    Send(String),
    #[error("connection closed by peer")]
    Closed,
    #[error("timed out after {0:?}")]
    Timeout(Duration),
    #[error("encode failed: {0}")]
    Encode(#[source] serde_json::Error),
}

/// One live downstream connection.
#[async_trait::async_trait]
pub trait CommandChannel: Send {
    async fn send(&mut self, command: &Command) -> Result<(), LinkError>;

    /// False once the peer has closed its side.
    fn is_open(&self) -> bool {
        true
    }

    async fn close(&mut self) -> Result<(), LinkError> {
        Ok(())
    }
}

/// Opens downstream connections.
#[async_trait::async_trait]
pub trait Connector: Send + Sync {
    fn endpoint(&self) -> &str;

    async fn connect(&self) -> Result<Box<dyn CommandChannel>, LinkError>;
}

// ── Mock ───────────────────────────────────────────────────────

#[derive(Debug, Default)]
struct MockState {
    sent: Mutex<Vec<Command>>,
    connect_attempts: AtomicUsize,
    refuse: AtomicBool,
    fail_sends: AtomicBool,
    peer_closed: AtomicBool,
    connect_delay: Mutex<Duration>,
    send_delay: Mutex<Duration>,
}

/// Mock connector for testing. Records every delivered command.
/// Clones share state, so a test keeps one handle and gives another away.
#[derive(Debug, Clone, Default)]
pub struct MockConnector {
    state: Arc<MockState>,
}

impl MockConnector {
    pub fn new() -> Self {
        Self::default()
    }

    /// A connector whose connect attempts always fail.
    pub fn refusing() -> Self {
        let mock = Self::default();
        mock.refuse_connections(true);
        mock
    }

    pub fn with_connect_delay(self, delay: Duration) -> Self {
        *lock(&self.state.connect_delay) = delay;
        self
    }

    pub fn with_send_delay(self, delay: Duration) -> Self {
        *lock(&self.state.send_delay) = delay;
        self
    }

    pub fn refuse_connections(&self, refuse: bool) {
        self.state.refuse.store(refuse, Ordering::SeqCst);
        if !refuse {
            self.state.peer_closed.store(false, Ordering::SeqCst);
        }
    }

    pub fn fail_sends(&self, fail: bool) {
        self.state.fail_sends.store(fail, Ordering::SeqCst);
    }

    /// Simulate the peer closing every open channel.
    pub fn close_peer(&self) {
        self.state.peer_closed.store(true, Ordering::SeqCst);
    }

    pub fn sent(&self) -> Vec<Command> {
        lock(&self.state.sent).clone()
    }

    pub fn connect_attempts(&self) -> usize {
        self.state.connect_attempts.load(Ordering::SeqCst)
    }
}

#[async_trait::async_trait]
impl Connector for MockConnector {
    fn endpoint(&self) -> &str {
        "mock://downstream"
    }

    async fn connect(&self) -> Result<Box<dyn CommandChannel>, LinkError> {
        self.state.connect_attempts.fetch_add(1, Ordering::SeqCst);
        let delay = *lock(&self.state.connect_delay);
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        if self.state.refuse.load(Ordering::SeqCst) {
            return Err(LinkError::Connect {
                endpoint: self.endpoint().to_owned(),
                reason: "connection refused".into(),
            });
        }
        self.state.peer_closed.store(false, Ordering::SeqCst);
        Ok(Box::new(MockChannel {
            state: self.state.clone(),
        }))
    }
}

struct MockChannel {
    state: Arc<MockState>,
}

#[async_trait::async_trait]
impl CommandChannel for MockChannel {
    async fn send(&mut self, command: &Command) -> Result<(), LinkError> {
        let delay = *lock(&self.state.send_delay);
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        if self.state.peer_closed.load(Ordering::SeqCst) {
            return Err(LinkError::Closed);
        }
        if self.state.fail_sends.load(Ordering::SeqCst) {
            return Err(LinkError::Send("broken pipe".into()));
        }
        lock(&self.state.sent).push(command.clone());
        Ok(())
    }

    fn is_open(&self) -> bool {
        !self.state.peer_closed.load(Ordering::SeqCst)
    }
}

fn lock<T>(m: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    m.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}
