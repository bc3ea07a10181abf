use super::handlers;
use super::state::AppState;
use axum::{
    routing::{get, post},
    Router,
};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

/// Create the HTTP router with all routes
pub fn create_router(state: AppState) -> Router {
    Router::new()
        // Health check
        .route("/health", get(handlers::health_check))
        // Ingestion
        .route("/interview/job/url", post(handlers::parse_job_url))
        .route("/interview/job/text", post(handlers::parse_job_text))
        .route("/interview/resume", post(handlers::upload_resume))
        .route("/interview/brief", get(handlers::get_brief))
        // Session control
        .route("/interview/start", post(handlers::start_interview))
        .route("/interview/mute", post(handlers::toggle_mute))
        .route("/interview/end", post(handlers::end_interview))
        .route("/interview/reset", post(handlers::reset_interview))
        .route("/interview/status", get(handlers::get_status))
        // History
        .route("/interview/sessions", get(handlers::list_sessions))
        .route(
            "/interview/sessions/:id",
            get(handlers::get_session).delete(handlers::delete_session),
        )
        .route("/interview/analytics", get(handlers::get_analytics))
        // Browser front-ends run on another origin
        .layer(CorsLayer::permissive())
        // Add tracing middleware for request logging
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
