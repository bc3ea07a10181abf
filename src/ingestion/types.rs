use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Number of characters shown when previewing a resume
pub const RESUME_PREVIEW_CHARS: usize = 500;

/// Structured job data extracted by the ingestion service.
///
/// The field layout belongs to the service; only `title()` looks inside.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JobListing(Map<String, Value>);

impl JobListing {
    /// Wrap a JSON value; anything but an object is rejected
    pub fn from_value(value: Value) -> Option<Self> {
        match value {
            Value::Object(fields) => Some(Self(fields)),
            _ => None,
        }
    }

    pub fn fields(&self) -> &Map<String, Value> {
        &self.0
    }

    pub fn title(&self) -> Option<&str> {
        ["job_title", "title"]
            .iter()
            .find_map(|key| self.0.get(*key).and_then(Value::as_str))
    }
}

/// Plain text extracted from an uploaded resume
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ResumeText(String);

impl ResumeText {
    pub fn new(text: impl Into<String>) -> Self {
        Self(text.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Whitespace-only text counts as no resume
    pub fn is_blank(&self) -> bool {
        self.0.trim().is_empty()
    }

    pub fn preview(&self) -> &str {
        match self.0.char_indices().nth(RESUME_PREVIEW_CHARS) {
            Some((idx, _)) => &self.0[..idx],
            None => &self.0,
        }
    }
}

/// Response body of the PDF endpoint
#[derive(Debug, Clone, Deserialize)]
pub(crate) struct ParsedResume {
    pub text: String,
}
