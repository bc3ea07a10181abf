use serde::Deserialize;
use serde_json::json;
use std::path::Path;
use std::time::Duration;
use tracing::{debug, info};

use super::types::{JobListing, ParsedResume, ResumeText};
use crate::error::IngestionError;

const USER_AGENT: &str = concat!("mock-interview/", env!("CARGO_PKG_VERSION"));

const URL_FAILED: &str = "Failed to parse job URL";
const TEXT_FAILED: &str = "Failed to extract job information";
const RESUME_FAILED: &str = "Failed to parse resume";
const URL_NOT_ACCESSIBLE: &str =
    "Cannot access this URL. Please copy and paste the job description instead.";

#[derive(Debug, Deserialize)]
struct ErrorDetail {
    detail: Option<String>,
}

/// HTTP client for the Content Ingestion Service
///
/// Every operation is a single request: no retries, no caching.
pub struct IngestionClient {
    http_client: reqwest::Client,
    base_url: String,
}

impl IngestionClient {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self, IngestionError> {
        let http_client = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .timeout(timeout)
            .build()
            .map_err(|e| IngestionError::Network(e.to_string()))?;

        Ok(Self {
            http_client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }

    /// Fetch a job posting by URL and extract its fields
    pub async fn parse_url(&self, url: &str) -> Result<JobListing, IngestionError> {
        let url = url.trim();
        if url.is_empty() {
            return Err(IngestionError::EmptyInput("Job URL"));
        }

        debug!(url, "Parsing job URL");

        let response = self
            .http_client
            .post(self.endpoint("utils/parse-link-llm"))
            .json(&json!({ "url": url }))
            .send()
            .await
            .map_err(|e| IngestionError::Network(e.to_string()))?;

        let job = match Self::check(response, URL_FAILED).await {
            Ok(response) => Self::decode_job(response).await?,
            Err(IngestionError::Service { status, message }) if message.contains("not accessible") => {
                return Err(IngestionError::Service {
                    status,
                    message: URL_NOT_ACCESSIBLE.to_string(),
                });
            }
            Err(e) => return Err(e),
        };

        info!(title = ?job.title(), "Job listing parsed from URL");
        Ok(job)
    }

    /// Extract job fields from a pasted description
    pub async fn parse_text(&self, text: &str) -> Result<JobListing, IngestionError> {
        if text.trim().is_empty() {
            return Err(IngestionError::EmptyInput("Job description"));
        }

        debug!(chars = text.len(), "Parsing job description text");

        let response = self
            .http_client
            .post(self.endpoint("utils/parse-job-text-llm"))
            .json(&json!({ "text": text }))
            .send()
            .await
            .map_err(|e| IngestionError::Network(e.to_string()))?;

        let job = Self::decode_job(Self::check(response, TEXT_FAILED).await?).await?;

        info!(title = ?job.title(), "Job listing extracted from text");
        Ok(job)
    }

    /// Upload a resume PDF from disk
    pub async fn parse_file(&self, path: impl AsRef<Path>) -> Result<ResumeText, IngestionError> {
        let path = path.as_ref();
        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        Self::check_pdf_name(&file_name)?;

        let bytes = tokio::fs::read(path).await.map_err(|e| IngestionError::Io {
            path: path.display().to_string(),
            message: e.to_string(),
        })?;

        self.parse_file_bytes(&file_name, bytes).await
    }

    /// Upload resume PDF bytes
    pub async fn parse_file_bytes(
        &self,
        file_name: &str,
        bytes: Vec<u8>,
    ) -> Result<ResumeText, IngestionError> {
        Self::check_pdf_name(file_name)?;
        if bytes.is_empty() {
            return Err(IngestionError::EmptyInput("Resume file"));
        }

        debug!(file_name, bytes = bytes.len(), "Uploading resume");

        let part = reqwest::multipart::Part::bytes(bytes)
            .file_name(file_name.to_string())
            .mime_str("application/pdf")
            .map_err(|e| IngestionError::Network(e.to_string()))?;
        let form = reqwest::multipart::Form::new().part("file", part);

        let response = self
            .http_client
            .post(self.endpoint("utils/parse-pdf-upload"))
            .multipart(form)
            .send()
            .await
            .map_err(|e| IngestionError::Network(e.to_string()))?;

        let parsed: ParsedResume = Self::check(response, RESUME_FAILED)
            .await?
            .json()
            .await
            .map_err(|e| IngestionError::Parse(e.to_string()))?;

        info!(chars = parsed.text.len(), "Resume parsed");
        Ok(ResumeText::new(parsed.text))
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path)
    }

    fn check_pdf_name(file_name: &str) -> Result<(), IngestionError> {
        if file_name.to_lowercase().ends_with(".pdf") {
            Ok(())
        } else {
            Err(IngestionError::UnsupportedFile(file_name.to_string()))
        }
    }

    /// Map a non-success response to `IngestionError::Service`
    async fn check(
        response: reqwest::Response,
        fallback: &str,
    ) -> Result<reqwest::Response, IngestionError> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let message = response
            .json::<ErrorDetail>()
            .await
            .ok()
            .and_then(|body| body.detail)
            .filter(|detail| !detail.trim().is_empty())
            .unwrap_or_else(|| fallback.to_string());

        Err(IngestionError::Service {
            status: status.as_u16(),
            message,
        })
    }

    async fn decode_job(response: reqwest::Response) -> Result<JobListing, IngestionError> {
        let value: serde_json::Value = response
            .json()
            .await
            .map_err(|e| IngestionError::Parse(e.to_string()))?;

        JobListing::from_value(value)
            .ok_or_else(|| IngestionError::Parse("job listing is not a JSON object".to_string()))
    }
}
