use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::transport::MediaConfig;

/// Configuration for interview sessions
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionConfig {
    /// Name shown to the interviewer agent
    pub display_name: String,

    /// Prefix for generated room identifiers (e.g., "interview-1730000000000-3")
    pub room_prefix: String,

    /// How long a connection attempt may take before the session fails
    pub connect_timeout: Duration,

    /// How many sessions the history keeps
    pub history_limit: usize,

    /// Media settings requested for the call
    pub media: MediaConfig,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            display_name: "Candidate".to_string(),
            room_prefix: "interview".to_string(),
            connect_timeout: Duration::from_secs(15),
            history_limit: 50,
            media: MediaConfig::default(),
        }
    }
}

impl SessionConfig {
    /// Room identifier for a start attempt: wall-clock millis plus the attempt's epoch
    pub fn room_name(&self, epoch: u64) -> String {
        format!(
            "{}-{}-{}",
            self.room_prefix,
            chrono::Utc::now().timestamp_millis(),
            epoch
        )
    }

    pub fn participant_identity(&self) -> String {
        format!("candidate-{}", uuid::Uuid::new_v4())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_room_names_are_unique_per_epoch() {
        let config = SessionConfig::default();
        let first = config.room_name(1);
        let second = config.room_name(2);

        assert!(first.starts_with("interview-"));
        assert!(first.ends_with("-1"));
        assert_ne!(first, second);
    }

    #[test]
    fn test_identities_are_unique() {
        let config = SessionConfig::default();
        assert_ne!(config.participant_identity(), config.participant_identity());
    }
}
