//! Interview session management
//!
//! This module provides the `SessionController` that owns the interview session:
//! - Credential acquisition for a freshly named room
//! - Realtime connection setup and lifecycle notifications
//! - Microphone publish and mute state
//! - Binding the interviewer's audio to the output sink
//! - Teardown on end, failure, remote disconnect or shutdown
//! - A bounded history of attempts with aggregate analytics

mod config;
mod controller;
mod state;
mod stats;

pub use config::SessionConfig;
pub use controller::SessionController;
pub use state::{ConnectionState, LastError, SessionSnapshot, SessionState, Transition};
pub use stats::{RoleCount, SessionAnalytics, SessionHistory, SessionOutcome, SessionRecord};
