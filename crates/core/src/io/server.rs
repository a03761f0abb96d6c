//! Perception agent listener.
//!
//! One task per connected agent reads WebSocket frames in order, parses them
//! and forwards valid events to the runtime. Bad messages are logged and
//! skipped; the agent stays connected.

use std::collections::HashSet;
use std::io;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};

use futures_util::StreamExt;
use tokio::net::{TcpListener, TcpStream};
use tokio_tungstenite::accept_async;
use tokio_tungstenite::tungstenite::Message;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;

use super::input::{self, EventSender, ParseError};

#[derive(Debug, thiserror::Error)]
pub enum ServeError {
    #[error("failed to bind {addr}: {source}")]
    Bind {
        addr: String,
        #[source]
        source: io::Error,
    },
}

/// Addresses of currently connected perception agents.
#[derive(Debug, Clone, Default)]
pub struct AgentRegistry {
    agents: Arc<Mutex<HashSet<SocketAddr>>>,
}

impl AgentRegistry {
    pub fn insert(&self, addr: SocketAddr) -> usize {
        let mut agents = self.lock();
        agents.insert(addr);
        agents.len()
    }

    pub fn remove(&self, addr: &SocketAddr) -> usize {
        let mut agents = self.lock();
        agents.remove(addr);
        agents.len()
    }

    pub fn contains(&self, addr: &SocketAddr) -> bool {
        self.lock().contains(addr)
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashSet<SocketAddr>> {
        self.agents.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

/// Accepts perception agent connections.
pub struct AgentListener {
    listener: TcpListener,
    registry: AgentRegistry,
}

impl AgentListener {
    pub async fn bind(addr: &str) -> Result<Self, ServeError> {
        let listener = TcpListener::bind(addr).await.map_err(|source| ServeError::Bind {
            addr: addr.to_owned(),
            source,
        })?;
        Ok(Self {
            listener,
            registry: AgentRegistry::default(),
        })
    }

    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    pub fn registry(&self) -> AgentRegistry {
        self.registry.clone()
    }

    /// Accept agents until `token` is cancelled, then wait for their handlers to exit.
    pub async fn serve(self, events: EventSender, token: CancellationToken) {
        let handlers = TaskTracker::new();
        tracing::info!(addr = ?self.listener.local_addr().ok(), "listening for perception agents");

        loop {
            tokio::select! {
                _ = token.cancelled() => break,
                accepted = self.listener.accept() => match accepted {
                    Ok((stream, addr)) => {
                        handlers.spawn(handle_agent(
                            stream,
                            addr,
                            events.clone(),
                            self.registry.clone(),
                            token.clone(),
                        ));
                    }
                    Err(e) => tracing::warn!(error = %e, "failed to accept agent connection"),
                },
            }
        }

        handlers.close();
        handlers.wait().await;
        tracing::info!("agent listener stopped");
    }
}

async fn handle_agent(
    stream: TcpStream,
    addr: SocketAddr,
    events: EventSender,
    registry: AgentRegistry,
    token: CancellationToken,
) {
    let mut ws = match accept_async(stream).await {
        Ok(ws) => ws,
        Err(e) => {
            tracing::warn!(agent = %addr, error = %e, "websocket handshake failed");
            return;
        }
    };
    let connected = registry.insert(addr);
    tracing::info!(agent = %addr, connected, "perception agent connected");

    loop {
        let msg = tokio::select! {
            _ = token.cancelled() => break,
            msg = ws.next() => msg,
        };
        let text = match msg {
            Some(Ok(Message::Text(text))) => Ok(text),
            Some(Ok(Message::Binary(bytes))) => String::from_utf8(bytes).map_err(|_| ParseError::NotUtf8),
            Some(Ok(Message::Close(_))) | None => break,
            Some(Ok(_)) => continue,
            Some(Err(e)) => {
                tracing::warn!(agent = %addr, error = %e, "agent connection error");
                break;
            }
        };

        match text.and_then(|t| input::parse_message(&t)) {
            Ok(event) => {
                if events.send(event).await.is_err() {
                    tracing::debug!(agent = %addr, "runtime gone, closing agent connection");
                    break;
                }
            }
            Err(e) => tracing::warn!(agent = %addr, error = %e, "rejected agent message"),
        }
    }

    let connected = registry.remove(&addr);
    tracing::info!(agent = %addr, connected, "perception agent disconnected");
}
