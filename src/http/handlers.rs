use super::state::AppState;
use crate::error::{IngestionError, SessionError};
use crate::ingestion::JobListing;
use crate::session::SessionSnapshot;
use axum::{
    extract::{Multipart, Path, State},
    http::StatusCode,
    response::{IntoResponse, Json, Response},
};
use serde::{Deserialize, Serialize};
use tracing::{error, info, warn};

// ============================================================================
// Request/Response Types
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct ParseUrlRequest {
    pub url: String,
}

#[derive(Debug, Deserialize)]
pub struct ParseTextRequest {
    pub text: String,
}

#[derive(Debug, Deserialize)]
pub struct MuteRequest {
    pub muted: bool,
}

#[derive(Debug, Serialize)]
pub struct ResumeResponse {
    pub text: String,
}

#[derive(Debug, Serialize)]
pub struct BriefResponse {
    pub job: Option<JobListing>,
    pub resume_preview: Option<String>,
    pub ready: bool,
}

#[derive(Debug, Serialize)]
pub struct DeletedResponse {
    pub status: &'static str,
}

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

fn error_response(status: StatusCode, message: impl Into<String>) -> Response {
    (
        status,
        Json(ErrorResponse {
            error: message.into(),
        }),
    )
        .into_response()
}

fn ingestion_error(err: IngestionError) -> Response {
    let status = match &err {
        IngestionError::EmptyInput(_) | IngestionError::UnsupportedFile(_) | IngestionError::Io { .. } => {
            StatusCode::BAD_REQUEST
        }
        IngestionError::Service { status, .. } if (400..500).contains(status) => {
            StatusCode::from_u16(*status).unwrap_or(StatusCode::BAD_REQUEST)
        }
        IngestionError::Service { .. } | IngestionError::Network(_) | IngestionError::Parse(_) => {
            StatusCode::BAD_GATEWAY
        }
    };

    warn!("Ingestion failed: {}", err);
    error_response(status, err.to_string())
}

fn session_error(err: SessionError) -> Response {
    let status = match &err {
        SessionError::MissingJobListing | SessionError::MissingResume => StatusCode::BAD_REQUEST,
        SessionError::AlreadyActive(_)
        | SessionError::NotConnected(_)
        | SessionError::InvalidTransition { .. } => StatusCode::CONFLICT,
        SessionError::Microphone(_) => StatusCode::BAD_GATEWAY,
        SessionError::ControllerClosed => StatusCode::SERVICE_UNAVAILABLE,
    };

    if status.is_server_error() {
        error!("Session intent failed: {}", err);
    }
    error_response(status, err.to_string())
}

fn snapshot_response(result: Result<SessionSnapshot, SessionError>) -> Response {
    match result {
        Ok(snapshot) => (StatusCode::OK, Json(snapshot)).into_response(),
        Err(e) => session_error(e),
    }
}

// ============================================================================
// Handlers
// ============================================================================

/// POST /interview/job/url
/// Parse a job posting by URL
pub async fn parse_job_url(
    State(state): State<AppState>,
    Json(req): Json<ParseUrlRequest>,
) -> Response {
    match state.ingestion.parse_url(&req.url).await {
        Ok(job) => {
            state.brief.write().await.job = Some(job.clone());
            (StatusCode::OK, Json(job)).into_response()
        }
        Err(e) => ingestion_error(e),
    }
}

/// POST /interview/job/text
/// Extract a job listing from a pasted description
pub async fn parse_job_text(
    State(state): State<AppState>,
    Json(req): Json<ParseTextRequest>,
) -> Response {
    match state.ingestion.parse_text(&req.text).await {
        Ok(job) => {
            state.brief.write().await.job = Some(job.clone());
            (StatusCode::OK, Json(job)).into_response()
        }
        Err(e) => ingestion_error(e),
    }
}

/// POST /interview/resume
/// Upload a resume PDF (multipart field `file`)
pub async fn upload_resume(State(state): State<AppState>, mut multipart: Multipart) -> Response {
    loop {
        let field = match multipart.next_field().await {
            Ok(Some(field)) => field,
            Ok(None) => return error_response(StatusCode::BAD_REQUEST, "Missing multipart field 'file'"),
            Err(e) => return error_response(StatusCode::BAD_REQUEST, e.to_string()),
        };

        if field.name() != Some("file") {
            continue;
        }

        let file_name = field.file_name().unwrap_or_default().to_string();
        let bytes = match field.bytes().await {
            Ok(bytes) => bytes,
            Err(e) => return error_response(StatusCode::BAD_REQUEST, e.to_string()),
        };

        info!("Received resume upload: {} ({} bytes)", file_name, bytes.len());

        return match state.ingestion.parse_file_bytes(&file_name, bytes.to_vec()).await {
            Ok(resume) => {
                let text = resume.as_str().to_string();
                state.brief.write().await.resume = Some(resume);
                (StatusCode::OK, Json(ResumeResponse { text })).into_response()
            }
            Err(e) => ingestion_error(e),
        };
    }
}

/// GET /interview/brief
/// What has been collected so far
pub async fn get_brief(State(state): State<AppState>) -> impl IntoResponse {
    let brief = state.brief.read().await;

    Json(BriefResponse {
        job: brief.job.clone(),
        resume_preview: brief.resume.as_ref().map(|r| r.preview().to_string()),
        ready: brief.is_ready(),
    })
}

/// POST /interview/start
/// Start a session with the collected job and resume
pub async fn start_interview(State(state): State<AppState>) -> Response {
    let brief = state.brief.read().await.clone();
    snapshot_response(state.controller.start(brief.job, brief.resume).await)
}

/// POST /interview/mute
pub async fn toggle_mute(State(state): State<AppState>, Json(req): Json<MuteRequest>) -> Response {
    snapshot_response(state.controller.toggle_mute(req.muted).await)
}

/// POST /interview/end
pub async fn end_interview(State(state): State<AppState>) -> Response {
    snapshot_response(state.controller.end().await)
}

/// POST /interview/reset
pub async fn reset_interview(State(state): State<AppState>) -> Response {
    snapshot_response(state.controller.reset().await)
}

/// GET /interview/status
pub async fn get_status(State(state): State<AppState>) -> impl IntoResponse {
    Json(state.controller.snapshot())
}

/// GET /interview/sessions
/// Recorded sessions, oldest first
pub async fn list_sessions(State(state): State<AppState>) -> impl IntoResponse {
    Json(state.controller.history().list())
}

/// GET /interview/sessions/:id
pub async fn get_session(State(state): State<AppState>, Path(id): Path<String>) -> Response {
    match state.controller.history().get(&id) {
        Some(record) => (StatusCode::OK, Json(record)).into_response(),
        None => error_response(StatusCode::NOT_FOUND, "Session not found"),
    }
}

/// DELETE /interview/sessions/:id
pub async fn delete_session(State(state): State<AppState>, Path(id): Path<String>) -> Response {
    if state.controller.history().remove(&id) {
        info!("Deleted session record {}", id);
        (StatusCode::OK, Json(DeletedResponse { status: "deleted" })).into_response()
    } else {
        error_response(StatusCode::NOT_FOUND, "Session not found")
    }
}

/// GET /interview/analytics
/// Aggregates over finished sessions
pub async fn get_analytics(State(state): State<AppState>) -> impl IntoResponse {
    Json(state.controller.history().analytics())
}

/// GET /health
/// Health check endpoint
pub async fn health_check() -> impl IntoResponse {
    (StatusCode::OK, "OK")
}
