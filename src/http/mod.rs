//! HTTP control API for the presentation layer
//!
//! This module provides a REST API for preparing and running an interview:
//! - POST /interview/job/url - Parse a job posting by URL
//! - POST /interview/job/text - Parse a pasted job description
//! - POST /interview/resume - Upload a resume PDF
//! - GET /interview/brief - Collected job and resume
//! - POST /interview/start - Start the session
//! - POST /interview/mute - Mute or unmute the microphone
//! - POST /interview/end - End the session
//! - POST /interview/reset - Return to idle after a failure or end
//! - GET /interview/status - Current session snapshot
//! - GET /interview/sessions - Session history
//! - GET/DELETE /interview/sessions/:id - One recorded session
//! - GET /interview/analytics - Aggregates over finished sessions
//! - GET /health - Health check

mod handlers;
mod routes;
mod state;

pub use routes::create_router;
pub use state::{AppState, InterviewBrief};
