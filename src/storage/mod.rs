//! Storage module for per-source state
//!
//! This module persists the last observed update time of every source.

pub mod state;

pub use state::StateManager;
