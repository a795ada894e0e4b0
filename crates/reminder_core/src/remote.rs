use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use crate::schedule::{OffsetSpec, TimeOfDay};

/// One row of the backend's scheduled-job listing.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct JobSummary {
    pub id: String,
    pub name: String,
    pub state: String,
    pub next_fire_time: Option<DateTime<Utc>>,
    pub created_by: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ReminderRequest {
    pub offset: OffsetSpec,
    pub recipient_email: String,
    pub time_of_day: TimeOfDay,
}

/// Failure reported by the platform. `body` is the structured payload the
/// server attached, if any.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Error)]
pub struct RemoteError {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub body: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl RemoteError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            body: None,
            message: Some(message.into()),
        }
    }

    pub fn with_body(body: Value) -> Self {
        Self {
            body: Some(body),
            message: None,
        }
    }

    /// Best text to show: `body.message`, then `message`, then the whole
    /// error as JSON.
    pub fn detail(&self) -> String {
        let body_message = self
            .body
            .as_ref()
            .and_then(|body| body.get("message"))
            .and_then(Value::as_str)
            .filter(|text| !text.is_empty());
        if let Some(text) = body_message {
            return text.to_string();
        }
        if let Some(text) = self.message.as_deref().filter(|text| !text.is_empty()) {
            return text.to_string();
        }
        serde_json::to_string(self).unwrap_or_default()
    }
}

impl fmt::Display for RemoteError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.detail())
    }
}

/// Platform calls the widgets depend on. Implementations may block; the host
/// decides which thread they run on.
pub trait OrgBackend: Send + Sync {
    /// `None` when the org has no trial expiration.
    fn fetch_org_expiration(&self) -> Result<Option<DateTime<Utc>>, RemoteError>;
    fn fetch_current_user_email(&self) -> Result<String, RemoteError>;
    /// Authoritative scheduling; the backend computes the real fire time.
    fn schedule_reminder(&self, request: &ReminderRequest) -> Result<(), RemoteError>;
    fn list_scheduled_jobs(&self) -> Result<Vec<JobSummary>, RemoteError>;
    fn cancel_scheduled_job(&self, job_id: &str) -> Result<(), RemoteError>;
}
