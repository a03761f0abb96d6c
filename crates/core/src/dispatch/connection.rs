use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use hub_link::{Command, CommandChannel, Connector, LinkError};
use tokio::sync::{Mutex, watch};

use crate::types::ConnectionState;

type Slot = Option<Box<dyn CommandChannel>>;

/// Owns the single downstream connection.
///
/// Connect-or-send runs under one async mutex, so concurrent dispatches never
/// race to open a second socket. There is no background retry: a failed
/// connect leaves the manager `Disconnected` and the next `send` tries again.
pub struct ConnectionManager {
    connector: Arc<dyn Connector>,
    slot: Mutex<Slot>,
    state_tx: watch::Sender<ConnectionState>,
    /// Bound on each connect and each send. Zero disables it.
    timeout: Duration,
}

impl ConnectionManager {
    pub fn new(connector: Arc<dyn Connector>, timeout: Duration) -> Self {
        let (state_tx, _) = watch::channel(ConnectionState::Disconnected);
        Self {
            connector,
            slot: Mutex::new(None),
            state_tx,
            timeout,
        }
    }

    pub fn endpoint(&self) -> &str {
        self.connector.endpoint()
    }

    pub fn state(&self) -> ConnectionState {
        *self.state_tx.borrow()
    }

    pub fn subscribe(&self) -> watch::Receiver<ConnectionState> {
        self.state_tx.subscribe()
    }

    /// One eager connect attempt, e.g. at startup. Returns true if connected.
    pub async fn warm_up(&self) -> bool {
        let mut slot = self.slot.lock().await;
        if slot.is_some() {
            return true;
        }
        self.connect_locked(&mut slot).await.is_ok()
    }

    /// Deliver one command, connecting first if needed.
    /// On any failure the connection is torn down and the command is not retried.
    pub async fn send(&self, command: &Command) -> Result<(), LinkError> {
        let mut slot = self.slot.lock().await;

        if slot.as_ref().is_some_and(|ch| !ch.is_open()) {
            tracing::info!(endpoint = %self.endpoint(), "downstream peer closed the connection");
            self.teardown_locked(&mut slot).await;
        }

        if slot.is_none() {
            self.connect_locked(&mut slot).await?;
        }
        let Some(channel) = slot.as_mut() else {
            return Err(LinkError::Closed);
        };

        let result = bounded(self.timeout, channel.send(command)).await;
        if let Err(e) = &result {
            tracing::warn!(
                endpoint = %self.endpoint(),
                action = %command.action,
                error = %e,
                "downstream send failed, resetting connection"
            );
            self.teardown_locked(&mut slot).await;
        }
        result
    }

    /// Close the connection if one is open.
    pub async fn close(&self) {
        let mut slot = self.slot.lock().await;
        self.teardown_locked(&mut slot).await;
    }

    async fn connect_locked(&self, slot: &mut Slot) -> Result<(), LinkError> {
        self.state_tx.send_replace(ConnectionState::Connecting);
        match bounded(self.timeout, self.connector.connect()).await {
            Ok(channel) => {
                *slot = Some(channel);
                self.state_tx.send_replace(ConnectionState::Connected);
                tracing::info!(endpoint = %self.endpoint(), "connected to downstream peer");
                Ok(())
            }
            Err(e) => {
                self.state_tx.send_replace(ConnectionState::Disconnected);
                tracing::warn!(
                    endpoint = %self.endpoint(),
                    error = %e,
                    "could not connect to downstream peer"
                );
                Err(e)
            }
        }
    }

    async fn teardown_locked(&self, slot: &mut Slot) {
        if let Some(mut channel) = slot.take() {
            if let Err(e) = bounded(self.timeout, channel.close()).await {
                tracing::debug!(error = %e, "error closing downstream connection");
            }
        }
        self.state_tx.send_replace(ConnectionState::Disconnected);
    }
}

async fn bounded<T>(
    limit: Duration,
    fut: impl Future<Output = Result<T, LinkError>>,
) -> Result<T, LinkError> {
    if limit.is_zero() {
        return fut.await;
    }
    tokio::time::timeout(limit, fut)
        .await
        .unwrap_or(Err(LinkError::Timeout(limit)))
}
