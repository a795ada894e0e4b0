use std::sync::LazyLock;
use std::time::Instant;

use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use regex::Regex;
use tracing::{debug, error, info, warn};

use crate::error::{RemoteAction, ScheduleError, SchedulerError, ValidationError};
use crate::format;
use crate::notice::Notice;
use crate::remote::{JobSummary, OrgBackend, ReminderRequest};
use crate::schedule::{compute_schedule, OffsetSpec, OffsetUnit, TimeOfDay};

/// Row action name for deleting a scheduled job.
pub const DELETE_JOB_ACTION: &str = "delete_job";

static EMAIL_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[^\s@]+@[^\s@]+\.[^\s@]+$").expect("email pattern is a valid regex")
});

pub fn is_valid_email(candidate: &str) -> bool {
    EMAIL_PATTERN.is_match(candidate)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UnitOption {
    pub label: &'static str,
    pub value: OffsetUnit,
}

/// State behind the reminder registration form: raw inputs, the org
/// expiration, the computed preview and the backend's job list.
#[derive(Debug, Clone)]
pub struct EmailScheduler {
    zone: Tz,
    offset_input: String,
    unit: OffsetUnit,
    email: Option<String>,
    time_of_day: TimeOfDay,
    time_setting_enabled: bool,
    expiration: Option<DateTime<Utc>>,
    scheduled: Option<DateTime<Tz>>,
    jobs: Option<Vec<JobSummary>>,
    jobs_error: Option<String>,
}

impl EmailScheduler {
    /// Defaults to one week before expiration at 12:00 in `zone`.
    pub fn new(zone: Tz) -> Self {
        Self {
            zone,
            offset_input: "1".to_string(),
            unit: OffsetUnit::Week,
            email: None,
            time_of_day: TimeOfDay::default(),
            time_setting_enabled: false,
            expiration: None,
            scheduled: None,
            jobs: None,
            jobs_error: None,
        }
    }

    /// Fetch-on-init: current user email, org expiration and job list.
    /// Failures are logged and leave the corresponding field empty.
    pub fn initialize<B: OrgBackend + ?Sized>(&mut self, backend: &B) {
        let start = Instant::now();
        match backend.fetch_current_user_email() {
            Ok(email) => self.email = Some(email),
            Err(err) => warn!(%err, "unable to fetch current user email"),
        }
        if let Err(err) = self.load_expiration(backend) {
            warn!(%err, "unable to fetch org expiration");
        }
        if let Err(err) = self.refresh_jobs(backend) {
            warn!(%err, "unable to fetch scheduled jobs");
        }
        info!(
            elapsed_ms = %start.elapsed().as_millis(),
            has_expiration = self.expiration.is_some(),
            "scheduler initialized"
        );
    }

    pub fn load_expiration<B: OrgBackend + ?Sized>(
        &mut self,
        backend: &B,
    ) -> Result<(), SchedulerError> {
        let expiration = backend
            .fetch_org_expiration()
            .map_err(|source| SchedulerError::remote(RemoteAction::FetchExpiration, source))?;
        self.set_expiration(expiration);
        Ok(())
    }

    /// Re-fetches the job list. On failure the last loaded list is kept and
    /// the list error message is set.
    pub fn refresh_jobs<B: OrgBackend + ?Sized>(
        &mut self,
        backend: &B,
    ) -> Result<(), SchedulerError> {
        match backend.list_scheduled_jobs() {
            Ok(jobs) => {
                debug!(job_count = jobs.len(), "scheduled jobs refreshed");
                self.jobs = Some(jobs);
                self.jobs_error = None;
                Ok(())
            }
            Err(source) => {
                error!(err = %source, "listing scheduled jobs failed");
                self.jobs_error = Some(RemoteAction::ListJobs.failure_message().to_string());
                Err(SchedulerError::remote(RemoteAction::ListJobs, source))
            }
        }
    }

    pub fn set_expiration(&mut self, expiration: Option<DateTime<Utc>>) {
        self.expiration = expiration;
        self.recalculate();
    }

    pub fn set_offset(&mut self, raw: impl Into<String>) {
        self.offset_input = raw.into();
        self.recalculate();
    }

    pub fn set_unit(&mut self, unit: OffsetUnit) {
        self.unit = unit;
        self.recalculate();
    }

    /// Accepts 日/週/月 or day/week/month. Unknown labels leave the unit unchanged.
    pub fn set_unit_label(&mut self, label: &str) -> Result<(), ScheduleError> {
        let unit = label.parse()?;
        self.set_unit(unit);
        Ok(())
    }

    pub fn set_email(&mut self, email: impl Into<String>) {
        self.email = Some(email.into());
        self.recalculate();
    }

    pub fn set_hour(&mut self, hour: u32) -> Result<(), ScheduleError> {
        self.time_of_day = TimeOfDay::new(hour, self.time_of_day.minute())?;
        self.recalculate();
        Ok(())
    }

    pub fn set_minute(&mut self, minute: u32) -> Result<(), ScheduleError> {
        self.time_of_day = TimeOfDay::new(self.time_of_day.hour(), minute)?;
        self.recalculate();
        Ok(())
    }

    pub fn set_time_setting_enabled(&mut self, enabled: bool) {
        self.time_setting_enabled = enabled;
    }

    /// Recomputes the preview from the current inputs.
    pub fn recalculate(&mut self) {
        self.scheduled = match self.compute_preview() {
            Ok(scheduled) => Some(scheduled),
            Err(err) => {
                debug!(%err, "schedule preview unavailable");
                None
            }
        };
    }

    pub fn compute_preview(&self) -> Result<DateTime<Tz>, ScheduleError> {
        let expiration = self
            .expiration
            .as_ref()
            .ok_or(ScheduleError::MissingExpiration)?;
        let offset = OffsetSpec::parse(&self.offset_input, self.unit)?;
        compute_schedule(expiration, offset, self.time_of_day, &self.zone)
    }

    /// Checks the inputs and builds the request sent to the backend.
    pub fn validate(&self) -> Result<ReminderRequest, ValidationError> {
        let offset = OffsetSpec::parse(&self.offset_input, self.unit)
            .map_err(|_| ValidationError::NonPositiveOffset)?;
        let email = self
            .email
            .as_deref()
            .filter(|email| is_valid_email(email))
            .ok_or(ValidationError::InvalidEmail)?;
        Ok(ReminderRequest {
            offset,
            recipient_email: email.to_string(),
            time_of_day: self.time_of_day,
        })
    }

    /// Validates, schedules through the backend and re-fetches the job list.
    /// Nothing is sent when validation fails.
    pub fn register<B: OrgBackend + ?Sized>(&mut self, backend: &B) -> Result<Notice, SchedulerError> {
        let request = self.validate().inspect_err(|err| {
            warn!(%err, offset = %self.offset_input, "reminder input rejected");
        })?;

        match backend.schedule_reminder(&request) {
            Ok(()) => {
                info!(
                    offset = %request.offset,
                    time_of_day = %request.time_of_day,
                    "reminder scheduled"
                );
                if let Err(err) = self.refresh_jobs(backend) {
                    warn!(%err, "job list not refreshed after scheduling");
                }
                Ok(Notice::success("メール送信スケジュールが登録されました。"))
            }
            Err(source) => {
                error!(err = %source, "scheduling reminder failed");
                Err(SchedulerError::remote(RemoteAction::ScheduleReminder, source))
            }
        }
    }

    pub fn cancel_job<B: OrgBackend + ?Sized>(
        &mut self,
        backend: &B,
        job_id: &str,
    ) -> Result<Notice, SchedulerError> {
        match backend.cancel_scheduled_job(job_id) {
            Ok(()) => {
                info!(job_id, "scheduled job cancelled");
                if let Err(err) = self.refresh_jobs(backend) {
                    warn!(%err, "job list not refreshed after cancel");
                }
                Ok(Notice::success("スケジュールジョブが削除されました。"))
            }
            Err(source) => {
                error!(job_id, err = %source, "cancelling job failed");
                Err(SchedulerError::remote(RemoteAction::CancelJob, source))
            }
        }
    }

    /// Dispatches a job-row action. Unknown actions are ignored.
    pub fn handle_row_action<B: OrgBackend + ?Sized>(
        &mut self,
        backend: &B,
        action: &str,
        job_id: &str,
    ) -> Option<Result<Notice, SchedulerError>> {
        match action {
            DELETE_JOB_ACTION => Some(self.cancel_job(backend, job_id)),
            other => {
                debug!(action = other, "ignoring unknown row action");
                None
            }
        }
    }

    pub fn unit_options(&self) -> [UnitOption; 3] {
        OffsetUnit::ALL.map(|unit| UnitOption {
            label: unit.label(),
            value: unit,
        })
    }

    pub fn expiration_message(&self) -> String {
        format::expiration_message(self.expiration.as_ref(), &self.zone)
    }

    pub fn preview_message(&self) -> String {
        format::preview_message(self.scheduled.as_ref(), &self.zone)
    }

    pub fn scheduled_date_time(&self) -> String {
        format::format_schedule(self.scheduled.as_ref(), &self.zone)
    }

    pub fn scheduled(&self) -> Option<&DateTime<Tz>> {
        self.scheduled.as_ref()
    }

    pub fn expiration(&self) -> Option<&DateTime<Utc>> {
        self.expiration.as_ref()
    }

    pub fn offset_input(&self) -> &str {
        &self.offset_input
    }

    pub fn unit(&self) -> OffsetUnit {
        self.unit
    }

    pub fn email(&self) -> Option<&str> {
        self.email.as_deref()
    }

    pub fn time_of_day(&self) -> TimeOfDay {
        self.time_of_day
    }

    pub fn is_time_setting_enabled(&self) -> bool {
        self.time_setting_enabled
    }

    pub fn jobs(&self) -> Option<&[JobSummary]> {
        self.jobs.as_deref()
    }

    pub fn jobs_error(&self) -> Option<&str> {
        self.jobs_error.as_deref()
    }

    pub fn zone(&self) -> Tz {
        self.zone
    }
}
