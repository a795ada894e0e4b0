use serde::{Deserialize, Serialize};

use crate::error::SchedulerError;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum NoticeLevel {
    Success,
    Warning,
    Error,
}

/// A message the host shell shows once (toast, status line, ...).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Notice {
    pub title: String,
    pub message: String,
    pub level: NoticeLevel,
}

impl Notice {
    pub fn success(message: impl Into<String>) -> Self {
        Self {
            title: "成功".to_string(),
            message: message.into(),
            level: NoticeLevel::Success,
        }
    }

    pub fn warning(message: impl Into<String>) -> Self {
        Self {
            title: "検証エラー".to_string(),
            message: message.into(),
            level: NoticeLevel::Warning,
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            title: "エラー".to_string(),
            message: message.into(),
            level: NoticeLevel::Error,
        }
    }
}

impl From<&SchedulerError> for Notice {
    fn from(err: &SchedulerError) -> Self {
        match err {
            SchedulerError::Validation(inner) => Notice::warning(inner.to_string()),
            SchedulerError::Remote { .. } => Notice::error(err.to_string()),
        }
    }
}
