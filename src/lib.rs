//! Gen Queue — dual-lane, admission-controlled GPU job scheduler.

pub mod admission;
pub mod channels;
pub mod commands;
pub mod config;
pub mod error;
pub mod executor;
pub mod frontend;
pub mod queue;
