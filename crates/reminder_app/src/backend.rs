use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use parking_lot::Mutex;
use serde_json::json;
use tracing::{debug, info};

use reminder_core::remote::{JobSummary, OrgBackend, ReminderRequest, RemoteError};
use reminder_core::schedule::compute_schedule;

const JOB_STATE_WAITING: &str = "WAITING";

/// In-process stand-in for the platform RPCs. Jobs live in memory and fire
/// times are computed in the org zone.
pub struct LocalBackend {
    org_zone: Tz,
    expiration: Option<DateTime<Utc>>,
    user_email: String,
    jobs: Mutex<Vec<JobSummary>>,
    next_id: Mutex<u64>,
    clock: fn() -> DateTime<Utc>,
}

impl LocalBackend {
    pub fn new(org_zone: Tz, expiration: Option<DateTime<Utc>>, user_email: impl Into<String>) -> Self {
        Self {
            org_zone,
            expiration,
            user_email: user_email.into(),
            jobs: Mutex::new(Vec::new()),
            next_id: Mutex::new(1),
            clock: Utc::now,
        }
    }

    pub fn with_clock(mut self, clock: fn() -> DateTime<Utc>) -> Self {
        self.clock = clock;
        self
    }

    fn failure(message: impl Into<String>) -> RemoteError {
        RemoteError::with_body(json!({ "message": message.into() }))
    }
}

impl OrgBackend for LocalBackend {
    fn fetch_org_expiration(&self) -> Result<Option<DateTime<Utc>>, RemoteError> {
        Ok(self.expiration)
    }

    fn fetch_current_user_email(&self) -> Result<String, RemoteError> {
        Ok(self.user_email.clone())
    }

    fn schedule_reminder(&self, request: &ReminderRequest) -> Result<(), RemoteError> {
        let expiration = self
            .expiration
            .ok_or_else(|| Self::failure("トライアル有効期限が設定されていません。"))?;
        let fire_at = compute_schedule(
            &expiration,
            request.offset,
            request.time_of_day,
            &self.org_zone,
        )
        .map_err(|err| Self::failure(err.to_string()))?;
        if fire_at.with_timezone(&Utc) <= (self.clock)() {
            return Err(Self::failure("送信日時が過去の日時です。"));
        }

        let id = {
            let mut next_id = self.next_id.lock();
            let id = format!("08e{:012}", *next_id);
            *next_id += 1;
            id
        };
        let job = JobSummary {
            id: id.clone(),
            name: format!(
                "{}-{}",
                fire_at.format("%Y/%m/%d %H:%M"),
                request.recipient_email
            ),
            state: JOB_STATE_WAITING.to_string(),
            next_fire_time: Some(fire_at.with_timezone(&Utc)),
            created_by: Some(self.user_email.clone()),
        };
        info!(job_id = %id, name = %job.name, "job scheduled");
        self.jobs.lock().push(job);
        Ok(())
    }

    fn list_scheduled_jobs(&self) -> Result<Vec<JobSummary>, RemoteError> {
        let mut jobs = self.jobs.lock().clone();
        jobs.sort_by(|a, b| {
            a.next_fire_time
                .cmp(&b.next_fire_time)
                .then_with(|| a.id.cmp(&b.id))
        });
        debug!(job_count = jobs.len(), "jobs listed");
        Ok(jobs)
    }

    fn cancel_scheduled_job(&self, job_id: &str) -> Result<(), RemoteError> {
        let mut jobs = self.jobs.lock();
        let before = jobs.len();
        jobs.retain(|job| job.id != job_id);
        if jobs.len() == before {
            return Err(Self::failure(format!("ジョブ {job_id} が見つかりません。")));
        }
        info!(job_id, "job aborted");
        Ok(())
    }
}
