//! Shared job record types.
//!
//! These types define the stable contract between the store, the orchestrator
//! and the transport. Serialized forms must stay stable for polling clients.

use std::fmt;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

/// How long a written record stays reachable.
pub const RESULT_TTL_HOURS: i64 = 2;

pub const RUNNING_MESSAGE: &str = "Test running";
pub const INVALID_COMMIT_MESSAGE: &str = "Invalid commit id";
pub const INVALID_TOKEN_MESSAGE: &str = "Invalid token";
pub const NOT_FOUND_MESSAGE: &str = "Test result not found";

/// Externally visible status of a job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum JobStatus {
    Running,
    Success,
    Failure,
    Errored,
}

impl JobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Running => "RUNNING",
            Self::Success => "SUCCESS",
            Self::Failure => "FAILURE",
            Self::Errored => "ERRORED",
        }
    }

    /// True for SUCCESS, FAILURE and ERRORED.
    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::Running)
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A stored job record.
///
/// `expires_at` is always `written_at + RESULT_TTL_HOURS`; use the constructors
/// rather than building records by hand.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Job {
    pub status: JobStatus,
    pub message: String,
    pub expires_at: DateTime<Utc>,
}

impl Job {
    /// Placeholder written when a submission is accepted.
    pub fn running(now: DateTime<Utc>) -> Self {
        Self {
            status: JobStatus::Running,
            message: RUNNING_MESSAGE.to_string(),
            expires_at: expiry_from(now),
        }
    }

    pub fn terminal(status: JobStatus, message: impl Into<String>, now: DateTime<Utc>) -> Self {
        debug_assert!(status.is_terminal());
        Self {
            status,
            message: message.into(),
            expires_at: expiry_from(now),
        }
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at < now
    }

    /// The payload served to pollers.
    pub fn view(&self) -> JobView {
        JobView {
            status: self.status,
            message: self.message.clone(),
        }
    }
}

impl fmt::Display for Job {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "status={} message={} expires_at={}",
            self.status,
            self.message,
            self.expires_at.to_rfc3339()
        )
    }
}

/// Wire shape of a job as returned by a poll.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobView {
    pub status: JobStatus,
    pub message: String,
}

impl JobView {
    pub fn errored(message: impl Into<String>) -> Self {
        Self {
            status: JobStatus::Errored,
            message: message.into(),
        }
    }
}

pub fn expiry_from(now: DateTime<Utc>) -> DateTime<Utc> {
    now + Duration::hours(RESULT_TTL_HOURS)
}
