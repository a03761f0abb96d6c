use serde::Deserialize;
use std::time::Instant;
use tokio::sync::mpsc;

use crate::types::Event;

/// Event channel sender. Agent handlers push parsed events here.
pub type EventSender = mpsc::Sender<Event>;
/// Event channel receiver, drained by the runtime.
pub type EventReceiver = mpsc::Receiver<Event>;

/// Create an event channel with the given buffer size.
pub fn channel(buffer: usize) -> (EventSender, EventReceiver) {
    mpsc::channel(buffer)
}

/// Wire shape of a perception agent message. Unknown fields are ignored.
#[derive(Debug, Deserialize)]
struct InboundMessage {
    source: String,
    content: String,
}

#[derive(Debug, thiserror::Error)]
pub enum ParseError {
    #[error("malformed message: {0}")]
    Malformed(#[from] serde_json::Error),
    #[error("binary payload is not valid UTF-8")]
    NotUtf8,
}

/// Parse one agent message, stamping it with the current time.
pub fn parse_message(text: &str) -> Result<Event, ParseError> {
    parse_message_at(text, Instant::now())
}

pub fn parse_message_at(text: &str, received_at: Instant) -> Result<Event, ParseError> {
    let msg: InboundMessage = serde_json::from_str(text)?;
    Ok(Event::at(msg.source, msg.content, received_at))
}

/// Submit an event by parts, as an in-process agent would.
pub async fn submit(
    tx: &EventSender,
    source: impl Into<String>,
    content: impl Into<String>,
) -> Result<(), mpsc::error::SendError<Event>> {
    tx.send(Event::new(source, content)).await
}

/// First `max_chars` characters of `text`, with an ellipsis if cut.
pub fn preview(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => format!("{}...", &text[..idx]),
        None => text.to_owned(),
    }
}
