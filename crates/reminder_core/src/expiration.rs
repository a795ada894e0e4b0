use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use tracing::{error, info};

use crate::error::{RemoteAction, SchedulerError};
use crate::format;
use crate::remote::{OrgBackend, RemoteError};

pub const NO_TRIAL_MESSAGE: &str =
    "トライアル有効期限は設定されていません (Developer Editionまたは購入済組織である可能性があります)。";
pub const CHECKER_LOADING: &str = "組織の有効期限情報を読み込み中です...";

#[derive(Debug, Clone, PartialEq)]
pub enum ExpirationState {
    Loading,
    NoTrial,
    Expires(DateTime<Utc>),
    Failed(RemoteError),
}

/// Trial banner: shows when the org expires and hosts the scheduler modal.
#[derive(Debug, Clone)]
pub struct ExpirationChecker {
    zone: Tz,
    state: ExpirationState,
    modal_open: bool,
}

impl ExpirationChecker {
    pub fn new(zone: Tz) -> Self {
        Self {
            zone,
            state: ExpirationState::Loading,
            modal_open: false,
        }
    }

    pub fn load<B: OrgBackend + ?Sized>(&mut self, backend: &B) -> Result<(), SchedulerError> {
        match backend.fetch_org_expiration() {
            Ok(Some(expiration)) => {
                info!(%expiration, "trial expiration loaded");
                self.state = ExpirationState::Expires(expiration);
                Ok(())
            }
            Ok(None) => {
                info!("org has no trial expiration");
                self.state = ExpirationState::NoTrial;
                Ok(())
            }
            Err(source) => {
                error!(err = %source, "fetching trial expiration failed");
                self.state = ExpirationState::Failed(source.clone());
                Err(SchedulerError::remote(RemoteAction::FetchExpiration, source))
            }
        }
    }

    pub fn state(&self) -> &ExpirationState {
        &self.state
    }

    pub fn expiration(&self) -> Option<DateTime<Utc>> {
        match self.state {
            ExpirationState::Expires(expiration) => Some(expiration),
            _ => None,
        }
    }

    pub fn is_trial_org(&self) -> bool {
        self.expiration().is_some()
    }

    pub fn expiration_message(&self) -> String {
        match &self.state {
            ExpirationState::Expires(expiration) => {
                format!("{} です！", format::format_locale(expiration, &self.zone))
            }
            ExpirationState::NoTrial => NO_TRIAL_MESSAGE.to_string(),
            ExpirationState::Loading | ExpirationState::Failed(_) => CHECKER_LOADING.to_string(),
        }
    }

    pub fn error_title(&self) -> Option<&'static str> {
        match self.state {
            ExpirationState::Failed(_) => Some(RemoteAction::FetchExpiration.failure_message()),
            _ => None,
        }
    }

    pub fn open_scheduler_modal(&mut self) {
        self.modal_open = true;
    }

    pub fn close_scheduler_modal(&mut self) {
        self.modal_open = false;
    }

    pub fn is_modal_open(&self) -> bool {
        self.modal_open
    }
}
