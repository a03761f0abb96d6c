//! Intent orchestration engine.
//!
//! Perception events flow through phrase aggregation, rule matching and a
//! cooldown gate; matched commands are delivered downstream by tracked tasks.

pub mod config;
pub mod dispatch;
pub mod intent;
pub mod io;
pub mod runtime;
pub mod sensory;
pub mod types;
