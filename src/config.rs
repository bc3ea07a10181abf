use anyhow::Result;
use serde::Deserialize;
use std::time::Duration;

use crate::audio::CaptureConfig;
use crate::session::SessionConfig;
use crate::transport::MediaConfig;

/// Environment overrides look like `MOCK_INTERVIEW__SERVICE__HTTP__PORT=9000`
pub const ENV_PREFIX: &str = "MOCK_INTERVIEW";

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub service: ServiceConfig,
    pub ingestion: IngestionConfig,
    pub credentials: CredentialsConfig,
    pub session: SessionSettings,
    pub media: MediaConfig,
    pub audio: AudioConfig,
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct ServiceConfig {
    pub name: String,
    pub http: HttpConfig,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            name: "mock-interview".to_string(),
            http: HttpConfig::default(),
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct HttpConfig {
    pub bind: String,
    pub port: u16,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            bind: "127.0.0.1".to_string(),
            port: 8080,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct IngestionConfig {
    pub base_url: String,
    pub timeout_secs: u64,
}

impl Default for IngestionConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8000".to_string(),
            timeout_secs: 60, // LLM extraction is slow
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct CredentialsConfig {
    pub base_url: String,
    pub timeout_secs: u64,
}

impl Default for CredentialsConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8000".to_string(),
            timeout_secs: 10,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct SessionSettings {
    pub display_name: String,
    pub room_prefix: String,
    pub connect_timeout_secs: u64,
    /// Finished and running sessions kept for analytics
    pub history_limit: usize,
}

impl Default for SessionSettings {
    fn default() -> Self {
        let defaults = SessionConfig::default();
        Self {
            display_name: defaults.display_name,
            room_prefix: defaults.room_prefix,
            connect_timeout_secs: defaults.connect_timeout.as_secs(),
            history_limit: defaults.history_limit,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct AudioConfig {
    /// Where the interviewer's audio is recorded
    pub recordings_path: String,
    pub sample_rate: u32,
    pub channels: u16,
    pub frame_duration_ms: u64,
    /// WAV file played as the candidate's microphone; no microphone when unset
    pub microphone_wav: Option<String>,
}

impl Default for AudioConfig {
    fn default() -> Self {
        let capture = CaptureConfig::default();
        Self {
            recordings_path: "recordings".to_string(),
            sample_rate: capture.sample_rate,
            channels: capture.channels,
            frame_duration_ms: capture.frame_duration_ms,
            microphone_wav: None,
        }
    }
}

impl Config {
    /// Load `path` (any format the config crate understands, extension optional) and
    /// apply environment overrides. A missing file falls back to defaults.
    pub fn load(path: &str) -> Result<Self> {
        let settings = config::Config::builder()
            .add_source(config::File::with_name(path).required(false))
            .add_source(
                config::Environment::with_prefix(ENV_PREFIX)
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        Ok(settings.try_deserialize()?)
    }

    pub fn session_config(&self) -> SessionConfig {
        SessionConfig {
            display_name: self.session.display_name.clone(),
            room_prefix: self.session.room_prefix.clone(),
            connect_timeout: Duration::from_secs(self.session.connect_timeout_secs),
            history_limit: self.session.history_limit,
            media: self.media.clone(),
        }
    }

    pub fn capture_config(&self) -> CaptureConfig {
        CaptureConfig {
            sample_rate: self.audio.sample_rate,
            channels: self.audio.channels,
            frame_duration_ms: self.audio.frame_duration_ms,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_missing_file_uses_defaults() {
        let cfg = Config::load("does/not/exist/mock-interview").unwrap();
        assert_eq!(cfg.service.http.port, 8080);
        assert_eq!(cfg.session.display_name, "Candidate");
        assert!(cfg.media.echo_cancellation);
        assert!(cfg.audio.microphone_wav.is_none());
        assert_eq!(cfg.session.history_limit, 50);
    }

    #[test]
    fn test_file_overrides_defaults() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(
            file,
            r#"
[service.http]
port = 9100

[session]
room_prefix = "practice"
connect_timeout_secs = 5
history_limit = 3

[media]
dynacast = false
"#
        )
        .unwrap();

        let path = file.path().to_str().unwrap().to_string();
        let cfg = Config::load(&path).unwrap();

        assert_eq!(cfg.service.http.port, 9100);
        assert_eq!(cfg.service.http.bind, "127.0.0.1");

        let session = cfg.session_config();
        assert_eq!(session.room_prefix, "practice");
        assert_eq!(session.connect_timeout, Duration::from_secs(5));
        assert_eq!(session.history_limit, 3);
        assert!(!session.media.dynacast);
        assert!(session.media.noise_suppression);
    }
}
