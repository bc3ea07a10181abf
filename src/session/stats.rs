use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, PoisonError, RwLock};

/// Roles listed in [`SessionAnalytics::most_common_roles`]
const TOP_ROLES: usize = 5;

/// Title recorded when the job listing has none
pub const UNKNOWN_ROLE: &str = "Unknown";

/// How a session finished
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionOutcome {
    /// The candidate ended it, or the service shut down
    Ended,
    /// Credential acquisition or connection setup failed
    Failed,
    /// The connection dropped from the remote side
    Disconnected,
}

/// One interview attempt
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionRecord {
    /// The room the attempt ran in
    pub session_id: String,

    pub job_title: String,

    pub started_at: DateTime<Utc>,

    /// Unset while the session is still running
    pub ended_at: Option<DateTime<Utc>>,

    pub duration_secs: Option<f64>,

    pub outcome: Option<SessionOutcome>,
}

impl SessionRecord {
    pub fn is_finished(&self) -> bool {
        self.outcome.is_some()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoleCount {
    pub role: String,
    pub count: usize,
}

/// Aggregates over finished sessions
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionAnalytics {
    pub total_sessions: usize,
    pub failed_sessions: usize,
    /// Rounded to two decimals
    pub average_duration_secs: f64,
    /// Most practiced roles first, at most five
    pub most_common_roles: Vec<RoleCount>,
}

/// Bounded in-memory history of interview attempts, oldest first.
///
/// Written by the session controller; read by the control API. Clones share the
/// same history.
#[derive(Debug, Clone)]
pub struct SessionHistory {
    records: Arc<RwLock<VecDeque<SessionRecord>>>,
    limit: usize,
}

impl SessionHistory {
    /// Keep at most `limit` records (at least one); the oldest are dropped first
    pub fn new(limit: usize) -> Self {
        Self {
            records: Arc::new(RwLock::new(VecDeque::new())),
            limit: limit.max(1),
        }
    }

    pub fn begin(&self, session_id: &str, job_title: &str, started_at: DateTime<Utc>) {
        let mut records = self.records.write().unwrap_or_else(PoisonError::into_inner);

        while records.len() >= self.limit {
            records.pop_front();
        }

        records.push_back(SessionRecord {
            session_id: session_id.to_string(),
            job_title: job_title.to_string(),
            started_at,
            ended_at: None,
            duration_secs: None,
            outcome: None,
        });
    }

    /// Close the record for `session_id`. A record is only closed once.
    pub fn finish(&self, session_id: &str, outcome: SessionOutcome, ended_at: DateTime<Utc>) {
        let mut records = self.records.write().unwrap_or_else(PoisonError::into_inner);

        let Some(record) = records
            .iter_mut()
            .find(|r| r.session_id == session_id && !r.is_finished())
        else {
            return;
        };

        let elapsed = (ended_at - record.started_at).num_milliseconds().max(0);
        record.ended_at = Some(ended_at);
        record.duration_secs = Some(elapsed as f64 / 1000.0);
        record.outcome = Some(outcome);
    }

    pub fn list(&self) -> Vec<SessionRecord> {
        let records = self.records.read().unwrap_or_else(PoisonError::into_inner);
        records.iter().cloned().collect()
    }

    pub fn get(&self, session_id: &str) -> Option<SessionRecord> {
        let records = self.records.read().unwrap_or_else(PoisonError::into_inner);
        records.iter().find(|r| r.session_id == session_id).cloned()
    }

    /// Returns false when no such record exists
    pub fn remove(&self, session_id: &str) -> bool {
        let mut records = self.records.write().unwrap_or_else(PoisonError::into_inner);
        let before = records.len();
        records.retain(|r| r.session_id != session_id);
        records.len() != before
    }

    pub fn analytics(&self) -> SessionAnalytics {
        let records = self.records.read().unwrap_or_else(PoisonError::into_inner);
        let finished: Vec<&SessionRecord> = records.iter().filter(|r| r.is_finished()).collect();

        if finished.is_empty() {
            return SessionAnalytics {
                total_sessions: 0,
                failed_sessions: 0,
                average_duration_secs: 0.0,
                most_common_roles: Vec::new(),
            };
        }

        let total_secs: f64 = finished.iter().filter_map(|r| r.duration_secs).sum();
        let average = total_secs / finished.len() as f64;

        let mut counts: HashMap<&str, usize> = HashMap::new();
        for record in &finished {
            *counts.entry(record.job_title.as_str()).or_default() += 1;
        }
        let mut roles: Vec<RoleCount> = counts
            .into_iter()
            .map(|(role, count)| RoleCount {
                role: role.to_string(),
                count,
            })
            .collect();
        roles.sort_by(|a, b| b.count.cmp(&a.count).then_with(|| a.role.cmp(&b.role)));
        roles.truncate(TOP_ROLES);

        SessionAnalytics {
            total_sessions: finished.len(),
            failed_sessions: finished
                .iter()
                .filter(|r| r.outcome == Some(SessionOutcome::Failed))
                .count(),
            average_duration_secs: (average * 100.0).round() / 100.0,
            most_common_roles: roles,
        }
    }
}
