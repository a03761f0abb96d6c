//! WebSocket downstream transport.
//!
//! Each command is one JSON text frame. A background reader watches the
//! receive half so a peer-initiated close is noticed before the next write.

use crate::channel::{Command, CommandChannel, Connector, LinkError};
use futures_util::stream::SplitSink;
use futures_util::{SinkExt, StreamExt};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::net::TcpStream;
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Connects to a command-consuming peer at a `ws://` URL.
#[derive(Debug, Clone)]
pub struct WsConnector {
    url: String,
}

impl WsConnector {
    pub fn new(url: impl Into<String>) -> Self {
        Self { url: url.into() }
    }
}

#[async_trait::async_trait]
impl Connector for WsConnector {
    fn endpoint(&self) -> &str {
        &self.url
    }

    async fn connect(&self) -> Result<Box<dyn CommandChannel>, LinkError> {
        let (stream, _response) =
            connect_async(self.url.as_str())
                .await
                .map_err(|e| LinkError::Connect {
                    endpoint: self.url.clone(),
                    reason: e.to_string(),
                })?;
        tracing::debug!(endpoint = %self.url, "websocket handshake complete");
        Ok(Box::new(WsChannel::spawn(stream)))
    }
}

/// An open WebSocket to the downstream peer.
pub struct WsChannel {
    sink: SplitSink<WsStream, Message>,
    open: Arc<AtomicBool>,
    reader: JoinHandle<()>,
}

impl WsChannel {
    fn spawn(stream: WsStream) -> Self {
        let (sink, mut source) = stream.split();
        let open = Arc::new(AtomicBool::new(true));
        let flag = open.clone();
        let reader = tokio::spawn(async move {
            while let Some(msg) = source.next().await {
                match msg {
                    Ok(Message::Close(frame)) => {
                        tracing::debug!(?frame, "downstream peer sent close frame");
                        break;
                    }
                    Ok(_) => {}
                    Err(e) => {
                        tracing::debug!(error = %e, "downstream read failed");
                        break;
                    }
                }
            }
            flag.store(false, Ordering::SeqCst);
        });
        Self { sink, open, reader }
    }
}

#[async_trait::async_trait]
impl CommandChannel for WsChannel {
    async fn send(&mut self, command: &Command) -> Result<(), LinkError> {
        if !self.is_open() {
            return Err(LinkError::Closed);
        }
        let text = command.to_json()?;
        self.sink
            .send(Message::Text(text))
            .await
            .map_err(|e| LinkError::Send(e.to_string()))
    }

    fn is_open(&self) -> bool {
        self.open.load(Ordering::SeqCst)
    }

    async fn close(&mut self) -> Result<(), LinkError> {
        self.open.store(false, Ordering::SeqCst);
        self.sink
            .close()
            .await
            .map_err(|e| LinkError::Send(e.to_string()))
    }
}

impl Drop for WsChannel {
    fn drop(&mut self) {
        self.reader.abort();
    }
}
