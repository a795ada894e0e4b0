use chrono::{DateTime, TimeZone, Utc};
use chrono_tz::Asia::Tokyo;
use parking_lot::Mutex;
use serde_json::json;

use reminder_core::error::{RemoteAction, SchedulerError, ValidationError};
use reminder_core::expiration::ExpirationState;
use reminder_core::notice::{Notice, NoticeLevel};
use reminder_core::remote::{JobSummary, OrgBackend, ReminderRequest, RemoteError};
use reminder_core::schedule::OffsetUnit;
use reminder_core::{EmailScheduler, ExpirationChecker};

#[derive(Default)]
struct FakeBackend {
    expiration: Option<DateTime<Utc>>,
    fail_schedule: Option<RemoteError>,
    fail_list: bool,
    fail_cancel: bool,
    requests: Mutex<Vec<ReminderRequest>>,
    jobs: Mutex<Vec<JobSummary>>,
    list_calls: Mutex<usize>,
}

impl FakeBackend {
    fn trial() -> Self {
        Self {
            expiration: Some(
                Tokyo
                    .with_ymd_and_hms(2026, 10, 1, 0, 0, 0)
                    .unwrap()
                    .with_timezone(&Utc),
            ),
            ..Self::default()
        }
    }
}

impl OrgBackend for FakeBackend {
    fn fetch_org_expiration(&self) -> Result<Option<DateTime<Utc>>, RemoteError> {
        Ok(self.expiration)
    }

    fn fetch_current_user_email(&self) -> Result<String, RemoteError> {
        Ok("admin@example.com".to_string())
    }

    fn schedule_reminder(&self, request: &ReminderRequest) -> Result<(), RemoteError> {
        if let Some(err) = &self.fail_schedule {
            return Err(err.clone());
        }
        let mut jobs = self.jobs.lock();
        let next_id = jobs.len() + 1;
        jobs.push(JobSummary {
            id: format!("job-{}", next_id),
            name: format!("{}-{}", request.offset, request.recipient_email),
            state: "WAITING".to_string(),
            next_fire_time: None,
            created_by: None,
        });
        self.requests.lock().push(request.clone());
        Ok(())
    }

    fn list_scheduled_jobs(&self) -> Result<Vec<JobSummary>, RemoteError> {
        *self.list_calls.lock() += 1;
        if self.fail_list {
            return Err(RemoteError::new("list unavailable"));
        }
        Ok(self.jobs.lock().clone())
    }

    fn cancel_scheduled_job(&self, job_id: &str) -> Result<(), RemoteError> {
        if self.fail_cancel {
            return Err(RemoteError::new("abort rejected"));
        }
        self.jobs.lock().retain(|job| job.id != job_id);
        Ok(())
    }
}

#[test]
fn initialize_register_and_cancel() {
    let backend = FakeBackend::trial();
    let mut scheduler = EmailScheduler::new(Tokyo);
    scheduler.initialize(&backend);

    assert_eq!(scheduler.email(), Some("admin@example.com"));
    assert_eq!(scheduler.jobs().map(<[JobSummary]>::len), Some(0));

    scheduler.set_offset("2");
    scheduler.set_unit(OffsetUnit::Day);
    assert_eq!(scheduler.scheduled_date_time(), "2026年09月29日 12:00");

    let notice = scheduler.register(&backend).expect("register succeeds");
    assert_eq!(notice, Notice::success("メール送信スケジュールが登録されました。"));

    let requests = backend.requests.lock().clone();
    assert_eq!(requests.len(), 1);
    assert_eq!(requests[0].offset.magnitude(), 2);
    assert_eq!(requests[0].offset.unit(), OffsetUnit::Day);
    assert_eq!(requests[0].time_of_day.to_string(), "12:00");

    let jobs = scheduler.jobs().expect("jobs refreshed").to_vec();
    assert_eq!(jobs.len(), 1);

    let outcome = scheduler
        .handle_row_action(&backend, "delete_job", &jobs[0].id)
        .expect("delete is handled");
    assert_eq!(
        outcome.expect("cancel succeeds").message,
        "スケジュールジョブが削除されました。"
    );
    assert_eq!(scheduler.jobs().map(<[JobSummary]>::len), Some(0));

    assert!(scheduler
        .handle_row_action(&backend, "edit_job", &jobs[0].id)
        .is_none());
}

#[test]
fn invalid_offset_never_reaches_backend() {
    let backend = FakeBackend::trial();
    let mut scheduler = EmailScheduler::new(Tokyo);
    scheduler.initialize(&backend);
    let list_calls = *backend.list_calls.lock();

    for raw in ["0", "-3", "2.5", ""] {
        scheduler.set_offset(raw);
        let err = scheduler.register(&backend).unwrap_err();
        assert!(matches!(
            err,
            SchedulerError::Validation(ValidationError::NonPositiveOffset)
        ));
        assert_eq!(Notice::from(&err).level, NoticeLevel::Warning);
    }

    scheduler.set_offset("1");
    scheduler.set_email("not-an-email");
    let err = scheduler.register(&backend).unwrap_err();
    assert!(matches!(
        err,
        SchedulerError::Validation(ValidationError::InvalidEmail)
    ));

    assert!(backend.requests.lock().is_empty());
    assert_eq!(*backend.list_calls.lock(), list_calls);
}

#[test]
fn remote_failure_is_reported_once_and_leaves_jobs() {
    let mut backend = FakeBackend::trial();
    backend.jobs.lock().push(JobSummary {
        id: "existing".to_string(),
        name: "2026/09/24 12:00-admin@example.com".to_string(),
        state: "WAITING".to_string(),
        next_fire_time: None,
        created_by: Some("Admin".to_string()),
    });
    let mut scheduler = EmailScheduler::new(Tokyo);
    scheduler.initialize(&backend);
    let list_calls = *backend.list_calls.lock();

    backend.fail_schedule = Some(RemoteError::with_body(json!({
        "message": "Too many scheduled jobs"
    })));
    let err = scheduler.register(&backend).unwrap_err();
    assert!(matches!(
        err,
        SchedulerError::Remote {
            action: RemoteAction::ScheduleReminder,
            ..
        }
    ));
    let notice = Notice::from(&err);
    assert_eq!(notice.level, NoticeLevel::Error);
    assert_eq!(
        notice.message,
        "スケジュールの登録に失敗しました。Too many scheduled jobs"
    );
    assert_eq!(scheduler.jobs().map(<[JobSummary]>::len), Some(1));
    assert_eq!(*backend.list_calls.lock(), list_calls);

    backend.fail_cancel = true;
    let err = scheduler.cancel_job(&backend, "existing").unwrap_err();
    assert!(Notice::from(&err).message.starts_with("ジョブの削除に失敗しました。"));
    assert_eq!(scheduler.jobs().map(<[JobSummary]>::len), Some(1));
}

#[test]
fn job_list_failure_sets_list_error() {
    let backend = FakeBackend {
        fail_list: true,
        ..FakeBackend::trial()
    };
    let mut scheduler = EmailScheduler::new(Tokyo);
    scheduler.initialize(&backend);
    assert!(scheduler.jobs().is_none());
    assert_eq!(
        scheduler.jobs_error(),
        Some("スケジュール一覧の取得に失敗しました。")
    );
}

#[test]
fn failed_refresh_keeps_last_loaded_jobs() {
    let mut backend = FakeBackend::trial();
    let mut scheduler = EmailScheduler::new(Tokyo);
    scheduler.initialize(&backend);
    scheduler.register(&backend).expect("register succeeds");
    assert_eq!(scheduler.jobs().map(<[JobSummary]>::len), Some(1));
    assert!(scheduler.jobs_error().is_none());

    backend.fail_list = true;
    let err = scheduler.refresh_jobs(&backend).unwrap_err();
    assert!(matches!(
        err,
        SchedulerError::Remote {
            action: RemoteAction::ListJobs,
            ..
        }
    ));
    assert_eq!(scheduler.jobs().map(<[JobSummary]>::len), Some(1));
    assert_eq!(
        scheduler.jobs_error(),
        Some("スケジュール一覧の取得に失敗しました。")
    );

    let notice = scheduler.register(&backend).expect("mutation still succeeds");
    assert_eq!(notice.level, NoticeLevel::Success);
    assert_eq!(backend.requests.lock().len(), 2);
    assert_eq!(scheduler.jobs().map(<[JobSummary]>::len), Some(1));

    backend.fail_list = false;
    scheduler.refresh_jobs(&backend).unwrap();
    assert_eq!(scheduler.jobs().map(<[JobSummary]>::len), Some(2));
    assert!(scheduler.jobs_error().is_none());
}

#[test]
fn checker_tracks_trial_and_failure() {
    let mut checker = ExpirationChecker::new(Tokyo);
    checker.load(&FakeBackend::trial()).unwrap();
    assert!(checker.is_trial_org());
    assert_eq!(checker.expiration_message(), "2026/10/1 0:00:00 です！");

    checker.load(&FakeBackend::default()).unwrap();
    assert_eq!(checker.state(), &ExpirationState::NoTrial);

    struct Broken;
    impl OrgBackend for Broken {
        fn fetch_org_expiration(&self) -> Result<Option<DateTime<Utc>>, RemoteError> {
            Err(RemoteError::new("INSUFFICIENT_ACCESS"))
        }
        fn fetch_current_user_email(&self) -> Result<String, RemoteError> {
            Err(RemoteError::default())
        }
        fn schedule_reminder(&self, _request: &ReminderRequest) -> Result<(), RemoteError> {
            Err(RemoteError::default())
        }
        fn list_scheduled_jobs(&self) -> Result<Vec<JobSummary>, RemoteError> {
            Err(RemoteError::default())
        }
        fn cancel_scheduled_job(&self, _job_id: &str) -> Result<(), RemoteError> {
            Err(RemoteError::default())
        }
    }

    let err = checker.load(&Broken).unwrap_err();
    assert_eq!(
        Notice::from(&err).message,
        "有効期限の取得中にエラーが発生しました。INSUFFICIENT_ACCESS"
    );
    assert_eq!(
        checker.error_title(),
        Some("有効期限の取得中にエラーが発生しました。")
    );
    assert!(!checker.is_trial_org());

    let mut scheduler = EmailScheduler::new(Tokyo);
    scheduler.initialize(&Broken);
    assert!(scheduler.email().is_none());
    assert!(scheduler.expiration().is_none());
    assert_eq!(scheduler.expiration_message(), "読み込み中です...");
}
