mod engine;
mod shutdown;

pub use engine::Runtime;
pub use shutdown::ShutdownGuard;
