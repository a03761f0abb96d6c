pub mod connection;
pub mod dispatcher;

pub use connection::ConnectionManager;
pub use dispatcher::{DispatchStats, Dispatcher};
