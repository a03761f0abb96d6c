//! Downstream command link.
//!
//! Defines the command wire format, the transport traits the hub core sends
//! through, and a WebSocket implementation of them.

pub mod channel;
pub mod ws;

pub use channel::{Command, CommandChannel, Connector, LinkError, MockConnector};
pub use ws::WsConnector;
