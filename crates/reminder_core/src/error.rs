use chrono::NaiveDateTime;
use thiserror::Error;

use crate::remote::RemoteError;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ScheduleError {
    #[error("offset must be a positive integer, got `{0}`")]
    InvalidOffset(String),
    #[error("unknown offset unit `{0}`")]
    UnknownUnit(String),
    #[error("time of day {hour:02}:{minute:02} is out of range")]
    InvalidTimeOfDay { hour: u32, minute: u32 },
    #[error("expiration date has not been loaded")]
    MissingExpiration,
    #[error("shifted date falls outside the supported calendar range")]
    DateOutOfRange,
    #[error("local time {0} does not exist in the display time zone")]
    NonexistentLocalTime(NaiveDateTime),
    #[error("unknown time zone `{0}`")]
    UnknownTimeZone(String),
}

/// Input problems caught before any remote call. The display text is what the
/// user sees in the warning notice.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("数値を正の整数で入力してください。")]
    NonPositiveOffset,
    #[error("有効なメールアドレスを入力してください。")]
    InvalidEmail,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RemoteAction {
    FetchExpiration,
    FetchUserEmail,
    ScheduleReminder,
    ListJobs,
    CancelJob,
}

impl RemoteAction {
    pub fn failure_message(self) -> &'static str {
        match self {
            RemoteAction::FetchExpiration => "有効期限の取得中にエラーが発生しました。",
            RemoteAction::FetchUserEmail => "ユーザーメールアドレスの取得に失敗しました。",
            RemoteAction::ScheduleReminder => "スケジュールの登録に失敗しました。",
            RemoteAction::ListJobs => "スケジュール一覧の取得に失敗しました。",
            RemoteAction::CancelJob => "ジョブの削除に失敗しました。",
        }
    }
}

#[derive(Debug, Error)]
pub enum SchedulerError {
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error("{}{}", .action.failure_message(), .source.detail())]
    Remote {
        action: RemoteAction,
        #[source]
        source: RemoteError,
    },
}

impl SchedulerError {
    pub fn remote(action: RemoteAction, source: RemoteError) -> Self {
        SchedulerError::Remote { action, source }
    }

    pub fn is_validation(&self) -> bool {
        matches!(self, SchedulerError::Validation(_))
    }
}
