// Integration tests for the ingestion and credential HTTP clients
//
// Each test serves a small axum router on an ephemeral port standing in for the
// external service.

use axum::extract::Multipart;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::post;
use axum::{Json, Router};
use mock_interview::credentials::{
    CredentialProvider, CredentialRequest, HttpCredentialClient, SessionCredential,
};
use mock_interview::error::{CredentialError, IngestionError};
use mock_interview::ingestion::IngestionClient;
use serde_json::{json, Value};
use std::time::Duration;

const TIMEOUT: Duration = Duration::from_secs(5);

/// Nothing listens here
const UNREACHABLE: &str = "http://127.0.0.1:9";

async fn serve(router: Router) -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });
    format!("http://{}", addr)
}

fn ingestion(base_url: &str) -> IngestionClient {
    IngestionClient::new(base_url, TIMEOUT).unwrap()
}

// ============================================================================
// Ingestion: job URL
// ============================================================================

#[tokio::test]
async fn test_parse_url_returns_job_listing() {
    let router = Router::new().route(
        "/utils/parse-link-llm",
        post(|Json(body): Json<Value>| async move {
            Json(json!({
                "job_title": "Backend Engineer",
                "company": "Acme",
                "source": body["url"],
            }))
        }),
    );
    let client = ingestion(&serve(router).await);

    let job = client.parse_url("  https://jobs.example.com/42  ").await.unwrap();

    assert_eq!(job.title(), Some("Backend Engineer"));
    assert_eq!(job.fields()["company"], "Acme");
    // Input is trimmed before sending
    assert_eq!(job.fields()["source"], "https://jobs.example.com/42");
}

#[tokio::test]
async fn test_parse_url_inaccessible_page_gives_advice() {
    let router = Router::new().route(
        "/utils/parse-link-llm",
        post(|| async {
            (
                StatusCode::BAD_REQUEST,
                Json(json!({ "detail": "The page is not accessible (403)" })),
            )
        }),
    );
    let client = ingestion(&serve(router).await);

    let err = client.parse_url("https://linkedin.com/jobs/1").await.unwrap_err();

    match err {
        IngestionError::Service { status, message } => {
            assert_eq!(status, 400);
            assert_eq!(
                message,
                "Cannot access this URL. Please copy and paste the job description instead."
            );
        }
        other => panic!("unexpected error: {other:?}"),
    }
}

#[tokio::test]
async fn test_parse_url_passes_service_detail_through() {
    let router = Router::new().route(
        "/utils/parse-link-llm",
        post(|| async {
            (
                StatusCode::UNPROCESSABLE_ENTITY,
                Json(json!({ "detail": "No job posting found on page" })),
            )
        }),
    );
    let client = ingestion(&serve(router).await);

    let err = client.parse_url("https://example.com").await.unwrap_err();
    assert_eq!(err.to_string(), "No job posting found on page");
}

#[tokio::test]
async fn test_parse_url_rejects_empty_input_locally() {
    let client = ingestion(UNREACHABLE);

    let err = client.parse_url("   ").await.unwrap_err();
    assert!(matches!(err, IngestionError::EmptyInput(_)));
}

#[tokio::test]
async fn test_parse_url_network_failure() {
    let client = ingestion(UNREACHABLE);

    let err = client.parse_url("https://example.com").await.unwrap_err();
    assert!(matches!(err, IngestionError::Network(_)));
}

// ============================================================================
// Ingestion: job text
// ============================================================================

#[tokio::test]
async fn test_parse_text_returns_job_listing() {
    let router = Router::new().route(
        "/utils/parse-job-text-llm",
        post(|Json(body): Json<Value>| async move {
            let text = body["text"].as_str().unwrap_or_default().to_string();
            Json(json!({ "title": "SWE", "description_chars": text.len() }))
        }),
    );
    let client = ingestion(&serve(router).await);

    let job = client.parse_text("We are hiring a SWE").await.unwrap();

    assert_eq!(job.title(), Some("SWE"));
    assert_eq!(job.fields()["description_chars"], 19);
}

#[tokio::test]
async fn test_parse_text_failure_without_detail_uses_fallback() {
    let router = Router::new().route(
        "/utils/parse-job-text-llm",
        post(|| async { (StatusCode::INTERNAL_SERVER_ERROR, "boom") }),
    );
    let client = ingestion(&serve(router).await);

    let err = client.parse_text("some description").await.unwrap_err();

    match err {
        IngestionError::Service { status, message } => {
            assert_eq!(status, 500);
            assert_eq!(message, "Failed to extract job information");
        }
        other => panic!("unexpected error: {other:?}"),
    }
}

#[tokio::test]
async fn test_parse_text_non_object_is_parse_error() {
    let router = Router::new().route(
        "/utils/parse-job-text-llm",
        post(|| async { Json(json!(["not", "an", "object"])) }),
    );
    let client = ingestion(&serve(router).await);

    let err = client.parse_text("some description").await.unwrap_err();
    assert!(matches!(err, IngestionError::Parse(_)));
}

#[tokio::test]
async fn test_parse_text_rejects_blank_input_locally() {
    let client = ingestion(UNREACHABLE);

    let err = client.parse_text("\n\t ").await.unwrap_err();
    assert!(matches!(err, IngestionError::EmptyInput(_)));
}

// ============================================================================
// Ingestion: resume
// ============================================================================

async fn echo_pdf(mut multipart: Multipart) -> impl IntoResponse {
    while let Some(field) = multipart.next_field().await.unwrap() {
        if field.name() != Some("file") {
            continue;
        }
        let file_name = field.file_name().unwrap_or_default().to_string();
        let content_type = field.content_type().unwrap_or_default().to_string();
        let bytes = field.bytes().await.unwrap();

        return (
            StatusCode::OK,
            Json(json!({
                "text": format!("{} {} {}", file_name, content_type, bytes.len())
            })),
        );
    }

    (
        StatusCode::BAD_REQUEST,
        Json(json!({ "detail": "missing file" })),
    )
}

#[tokio::test]
async fn test_parse_file_bytes_uploads_pdf() {
    let router = Router::new().route("/utils/parse-pdf-upload", post(echo_pdf));
    let client = ingestion(&serve(router).await);

    let resume = client
        .parse_file_bytes("Resume.PDF", b"%PDF-1.4 fake".to_vec())
        .await
        .unwrap();

    assert_eq!(resume.as_str(), "Resume.PDF application/pdf 13");
}

#[tokio::test]
async fn test_parse_file_reads_from_disk() {
    let router = Router::new().route("/utils/parse-pdf-upload", post(echo_pdf));
    let client = ingestion(&serve(router).await);

    let dir = tempfile::TempDir::new().unwrap();
    let path = dir.path().join("cv.pdf");
    std::fs::write(&path, b"%PDF").unwrap();

    let resume = client.parse_file(&path).await.unwrap();
    assert_eq!(resume.as_str(), "cv.pdf application/pdf 4");
}

#[tokio::test]
async fn test_parse_file_rejects_non_pdf() {
    let client = ingestion(UNREACHABLE);

    let err = client
        .parse_file_bytes("resume.docx", b"PK".to_vec())
        .await
        .unwrap_err();
    assert!(matches!(err, IngestionError::UnsupportedFile(name) if name == "resume.docx"));
}

#[tokio::test]
async fn test_parse_file_missing_file() {
    let client = ingestion(UNREACHABLE);

    let err = client.parse_file("/nonexistent/resume.pdf").await.unwrap_err();
    assert!(matches!(err, IngestionError::Io { .. }));
}

#[tokio::test]
async fn test_parse_resume_failure_uses_fallback() {
    let router = Router::new().route(
        "/utils/parse-pdf-upload",
        post(|| async { StatusCode::BAD_GATEWAY }),
    );
    let client = ingestion(&serve(router).await);

    let err = client
        .parse_file_bytes("resume.pdf", b"%PDF".to_vec())
        .await
        .unwrap_err();
    assert_eq!(err.to_string(), "Failed to parse resume");
}

// ============================================================================
// Credentials
// ============================================================================

fn credential_request() -> CredentialRequest {
    CredentialRequest {
        room: "interview-1730000000000-1".to_string(),
        identity: "candidate-abc".to_string(),
        display_name: "Candidate".to_string(),
    }
}

fn credentials(base_url: &str) -> HttpCredentialClient {
    HttpCredentialClient::new(base_url, TIMEOUT).unwrap()
}

#[tokio::test]
async fn test_join_token_issued() {
    let router = Router::new().route(
        "/agent/join-token",
        post(|Json(body): Json<Value>| async move {
            assert_eq!(body["room"], "interview-1730000000000-1");
            assert_eq!(body["name"], "Candidate");
            assert_eq!(body["identity"], "candidate-abc");
            Json(json!({ "url": "nats://router:4222", "token": "secret" }))
        }),
    );
    let client = credentials(&serve(router).await);
    let request = credential_request();

    let grant = client.request_credential(&request).await.unwrap();
    let credential = SessionCredential::from_grant(grant, &request).unwrap();

    assert_eq!(credential.endpoint, "nats://router:4222");
    assert_eq!(credential.token, "secret");
    assert_eq!(credential.room, request.room);
    assert_eq!(credential.identity, "candidate-abc");
    assert!(!format!("{credential:?}").contains("secret"));
}

#[tokio::test]
async fn test_join_token_server_error() {
    let router = Router::new().route(
        "/agent/join-token",
        post(|| async { (StatusCode::INTERNAL_SERVER_ERROR, "agent pool exhausted") }),
    );
    let client = credentials(&serve(router).await);

    let err = client.request_credential(&credential_request()).await.unwrap_err();

    match err {
        CredentialError::Status { status, message } => {
            assert_eq!(status, 500);
            assert_eq!(message, "agent pool exhausted");
        }
        other => panic!("unexpected error: {other:?}"),
    }
}

#[tokio::test]
async fn test_join_token_malformed_body() {
    let router = Router::new().route("/agent/join-token", post(|| async { "<html>oops</html>" }));
    let client = credentials(&serve(router).await);

    let err = client.request_credential(&credential_request()).await.unwrap_err();
    assert!(matches!(err, CredentialError::Malformed(_)));
}

#[tokio::test]
async fn test_join_token_missing_token_fails_validation() {
    let router = Router::new().route(
        "/agent/join-token",
        post(|| async { Json(json!({ "url": "nats://router:4222" })) }),
    );
    let client = credentials(&serve(router).await);
    let request = credential_request();

    let grant = client.request_credential(&request).await.unwrap();
    let err = SessionCredential::from_grant(grant, &request).unwrap_err();
    assert!(matches!(err, CredentialError::Invalid(_)));
}

#[tokio::test]
async fn test_join_token_network_failure() {
    let client = credentials(UNREACHABLE);

    let err = client.request_credential(&credential_request()).await.unwrap_err();
    assert!(matches!(err, CredentialError::Network(_)));
}
