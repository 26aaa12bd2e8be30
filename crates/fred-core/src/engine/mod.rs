//! Tracking state machine, configuration, physics modules, progress reporting
//! and the API error type.

pub mod config;
pub mod context;
pub mod error;
pub mod physics;
pub mod plugin;
pub mod progress;
pub mod state;
pub mod tally;
pub mod tracking;
pub mod utils;
