use crate::ingestion::{IngestionClient, JobListing, ResumeText};
use crate::session::SessionController;
use std::sync::Arc;
use tokio::sync::RwLock;

/// Job and resume collected so far. Each is replaced wholesale on re-parse.
#[derive(Debug, Clone, Default)]
pub struct InterviewBrief {
    pub job: Option<JobListing>,
    pub resume: Option<ResumeText>,
}

impl InterviewBrief {
    pub fn is_ready(&self) -> bool {
        self.job.is_some() && self.resume.as_ref().map(|r| !r.is_blank()).unwrap_or(false)
    }
}

/// Shared application state for HTTP handlers
#[derive(Clone)]
pub struct AppState {
    pub controller: SessionController,
    pub ingestion: Arc<IngestionClient>,
    pub brief: Arc<RwLock<InterviewBrief>>,
}

impl AppState {
    pub fn new(controller: SessionController, ingestion: IngestionClient) -> Self {
        Self {
            controller,
            ingestion: Arc::new(ingestion),
            brief: Arc::new(RwLock::new(InterviewBrief::default())),
        }
    }
}
