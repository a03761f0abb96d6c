pub mod input;
pub mod server;

pub use input::{EventReceiver, EventSender, ParseError};
pub use server::{AgentListener, AgentRegistry, ServeError};
