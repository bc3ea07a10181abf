//! Job and resume ingestion
//!
//! Thin client over the Content Ingestion Service: parse a job posting by URL or pasted
//! text, and extract plain text from a resume PDF.

mod client;
mod types;

pub use client::IngestionClient;
pub use types::{JobListing, ResumeText, RESUME_PREVIEW_CHARS};
