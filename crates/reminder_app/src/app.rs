use std::cell::RefCell;
use std::io::{BufRead, Write};
use std::rc::Rc;
use std::str::FromStr;
use std::time::Duration;

use anyhow::{anyhow, bail, Context, Result};
use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use reminder_core::format::parse_zone;
use reminder_core::notice::{Notice, NoticeLevel};
use reminder_core::remote::OrgBackend;
use reminder_core::scheduler::DELETE_JOB_ACTION;
use reminder_core::timer::{TickHandle, TickSource, TimerEvent, TimerOptions};
use reminder_core::{CountdownTimer, EmailScheduler, ExpirationChecker};
use tracing::{debug, info, warn};

use crate::backend::LocalBackend;

const DEFAULT_ZONE: &str = "Asia/Tokyo";
const DEFAULT_USER_EMAIL: &str = "admin@example.com";

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub(crate) zone: Tz,
    pub(crate) org_expiration: Option<DateTime<Utc>>,
    pub(crate) user_email: String,
    pub(crate) timer: TimerOptions,
}

impl AppConfig {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds the config from `lookup`, keeping defaults for unset or
    /// unparsable values. Only an unknown zone or a malformed expiration is
    /// an error.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let mut config = Self::default();
        if let Some(zone) = lookup("REMINDER_TIME_ZONE") {
            config.zone = parse_zone(&zone).context("invalid REMINDER_TIME_ZONE")?;
        }
        if let Some(raw) = lookup("REMINDER_ORG_EXPIRATION") {
            let expiration = DateTime::parse_from_rfc3339(raw.trim())
                .with_context(|| format!("invalid REMINDER_ORG_EXPIRATION `{raw}`"))?;
            config.org_expiration = Some(expiration.with_timezone(&Utc));
        }
        if let Some(email) = lookup("REMINDER_USER_EMAIL") {
            let email = email.trim();
            if !email.is_empty() {
                config.user_email = email.to_string();
            }
        }
        if let Some(duration) = lookup("TIMER_DURATION_SECONDS") {
            if let Ok(value) = duration.trim().parse::<u64>() {
                config.timer.duration_seconds = value.max(1);
            }
        }
        if let Some(tick) = lookup("TIMER_TICK_MS") {
            if let Ok(value) = tick.trim().parse::<u64>() {
                if value > 0 {
                    config.timer.tick_interval_ms = value;
                }
            }
        }
        if let Some(flag) = lookup("TIMER_AUTOSTART") {
            if let Ok(value) = flag.trim().parse::<bool>() {
                config.timer.autostart = value;
            }
        }
        if let Some(label) = lookup("TIMER_LABEL") {
            config.timer.label = Some(label);
        }
        Ok(config)
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            zone: DEFAULT_ZONE.parse().unwrap_or(Tz::UTC),
            org_expiration: None,
            user_email: DEFAULT_USER_EMAIL.to_string(),
            timer: TimerOptions::default(),
        }
    }
}

/// Ticker for the terminal loop: hands out handles, the loop does the waiting.
#[derive(Debug, Default)]
pub struct LoopTicks {
    next: u64,
    live: Option<TickHandle>,
}

impl TickSource for LoopTicks {
    fn schedule(&mut self, _interval: Duration) -> TickHandle {
        self.next += 1;
        let handle = TickHandle(self.next);
        self.live = Some(handle);
        handle
    }

    fn cancel(&mut self, handle: TickHandle) {
        if self.live == Some(handle) {
            self.live = None;
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Help,
    Status,
    Offset(String),
    Unit(String),
    Email(String),
    Hour(u32),
    Minute(u32),
    TimeSetting(bool),
    Register,
    Jobs,
    Delete(String),
    Modal(bool),
    Timer,
    Start,
    Pause,
    Reset,
    Run,
    Settings {
        duration: String,
        message: Option<String>,
    },
    Quit,
}

impl FromStr for Command {
    type Err = anyhow::Error;

    fn from_str(line: &str) -> Result<Self> {
        let line = line.trim();
        let (head, rest) = line
            .split_once(char::is_whitespace)
            .map(|(head, rest)| (head, rest.trim()))
            .unwrap_or((line, ""));
        let required = |what: &str| -> Result<String> {
            if rest.is_empty() {
                bail!("`{head}` needs {what}");
            }
            Ok(rest.to_string())
        };
        let command = match head {
            "help" | "?" => Command::Help,
            "status" => Command::Status,
            "offset" => Command::Offset(rest.to_string()),
            "unit" => Command::Unit(required("a unit (日/週/月)")?),
            "email" => Command::Email(required("an address")?),
            "hour" => Command::Hour(
                required("an hour")?
                    .parse()
                    .context("hour must be a number")?,
            ),
            "minute" => Command::Minute(
                required("a minute")?
                    .parse()
                    .context("minute must be a number")?,
            ),
            "time" => Command::TimeSetting(parse_switch(&required("on or off")?)?),
            "register" => Command::Register,
            "jobs" => Command::Jobs,
            "delete" => Command::Delete(required("a job id")?),
            "modal" => Command::Modal(parse_switch(&required("open or close")?)?),
            "timer" => Command::Timer,
            "start" => Command::Start,
            "pause" => Command::Pause,
            "reset" => Command::Reset,
            "run" => Command::Run,
            "settings" => {
                let args = required("a duration in seconds")?;
                let (duration, message) = match args.split_once(char::is_whitespace) {
                    Some((duration, message)) => {
                        (duration.to_string(), Some(message.trim().to_string()))
                    }
                    None => (args, None),
                };
                Command::Settings { duration, message }
            }
            "quit" | "exit" => Command::Quit,
            "" => bail!("empty command"),
            other => bail!("unknown command `{other}`"),
        };
        Ok(command)
    }
}

fn parse_switch(raw: &str) -> Result<bool> {
    match raw {
        "on" | "open" | "true" => Ok(true),
        "off" | "close" | "false" => Ok(false),
        other => Err(anyhow!("expected on/off, got `{other}`")),
    }
}

const HELP: &str = "\
commands:
  status                     expiration, preview and inputs
  offset <n> | unit <日|週|月> | email <addr> | hour <h> | minute <m>
  time on|off                show the time-of-day inputs
  register                   schedule the reminder email
  jobs | delete <id>         list or cancel scheduled jobs
  modal open|close           toggle the scheduler modal
  timer | start | pause | reset | run
  settings <seconds> [message]
  quit";

/// Terminal host for the widgets. Owns the controllers and renders their
/// getters as text.
pub struct Shell<B: OrgBackend> {
    backend: B,
    checker: ExpirationChecker,
    scheduler: EmailScheduler,
    timer: CountdownTimer<LoopTicks>,
    timer_events: Rc<RefCell<Vec<TimerEvent>>>,
    sleep: fn(Duration),
}

impl<B: OrgBackend> Shell<B> {
    pub fn new(config: &AppConfig, backend: B) -> Self {
        let mut timer = CountdownTimer::mount(config.timer.clone(), LoopTicks::default());
        let timer_events = Rc::new(RefCell::new(Vec::new()));
        let sink = Rc::clone(&timer_events);
        timer.subscribe(move |event: &TimerEvent| sink.borrow_mut().push(event.clone()));
        Self {
            backend,
            checker: ExpirationChecker::new(config.zone),
            scheduler: EmailScheduler::new(config.zone),
            timer,
            timer_events,
            sleep: std::thread::sleep,
        }
    }

    pub fn with_sleep(mut self, sleep: fn(Duration)) -> Self {
        self.sleep = sleep;
        self
    }

    /// Fetch-on-init for both widgets.
    pub fn initialize(&mut self, out: &mut impl Write) -> Result<()> {
        if let Err(err) = self.checker.load(&self.backend) {
            write_notice(out, &Notice::from(&err))?;
        }
        self.scheduler.initialize(&self.backend);
        writeln!(out, "{}", self.checker.expiration_message())?;
        Ok(())
    }

    /// Runs one command. Returns false once the user asked to quit.
    pub fn execute(&mut self, command: Command, out: &mut impl Write) -> Result<bool> {
        debug!(?command, "executing command");
        match command {
            Command::Help => writeln!(out, "{HELP}")?,
            Command::Status => self.write_status(out)?,
            Command::Offset(raw) => {
                self.scheduler.set_offset(raw);
                writeln!(out, "{}", self.scheduler.scheduled_date_time())?;
            }
            Command::Unit(label) => {
                self.scheduler.set_unit_label(&label)?;
                writeln!(out, "{}", self.scheduler.scheduled_date_time())?;
            }
            Command::Email(email) => self.scheduler.set_email(email),
            Command::Hour(hour) => {
                self.scheduler.set_hour(hour)?;
                writeln!(out, "{}", self.scheduler.scheduled_date_time())?;
            }
            Command::Minute(minute) => {
                self.scheduler.set_minute(minute)?;
                writeln!(out, "{}", self.scheduler.scheduled_date_time())?;
            }
            Command::TimeSetting(enabled) => self.scheduler.set_time_setting_enabled(enabled),
            Command::Register => {
                let notice = match self.scheduler.register(&self.backend) {
                    Ok(notice) => notice,
                    Err(err) => Notice::from(&err),
                };
                write_notice(out, &notice)?;
            }
            Command::Jobs => {
                if let Err(err) = self.scheduler.refresh_jobs(&self.backend) {
                    warn!(%err, "job refresh failed");
                }
                self.write_jobs(out)?;
            }
            Command::Delete(job_id) => {
                let outcome =
                    self.scheduler
                        .handle_row_action(&self.backend, DELETE_JOB_ACTION, &job_id);
                if let Some(outcome) = outcome {
                    let notice = outcome.unwrap_or_else(|err| Notice::from(&err));
                    write_notice(out, &notice)?;
                }
            }
            Command::Modal(open) => {
                if open {
                    self.checker.open_scheduler_modal();
                } else {
                    self.checker.close_scheduler_modal();
                }
            }
            Command::Timer => self.write_timer(out)?,
            Command::Start => {
                self.timer.start();
                self.write_timer(out)?;
            }
            Command::Pause => {
                self.timer.pause();
                self.write_timer(out)?;
            }
            Command::Reset => {
                self.timer.reset();
                self.write_timer(out)?;
            }
            Command::Run => self.run_timer(out)?,
            Command::Settings { duration, message } => {
                self.timer.open_settings();
                self.timer.set_draft_duration(&duration);
                if message.is_some() {
                    self.timer.set_draft_message(message.as_deref());
                }
                self.timer.save_settings();
                self.write_timer(out)?;
            }
            Command::Quit => return Ok(false),
        }
        self.drain_timer_events(out)?;
        Ok(true)
    }

    pub fn scheduler(&self) -> &EmailScheduler {
        &self.scheduler
    }

    pub fn timer(&self) -> &CountdownTimer<LoopTicks> {
        &self.timer
    }

    pub fn checker(&self) -> &ExpirationChecker {
        &self.checker
    }

    fn run_timer(&mut self, out: &mut impl Write) -> Result<()> {
        self.timer.start();
        let interval = self.timer.tick_interval();
        while let Some(handle) = self.timer.active_ticker() {
            (self.sleep)(interval);
            self.timer.tick(handle);
            writeln!(out, "{}", self.timer.formatted_time())?;
        }
        Ok(())
    }

    fn write_status(&self, out: &mut impl Write) -> Result<()> {
        writeln!(out, "{}", self.scheduler.expiration_message())?;
        writeln!(out, "{}", self.scheduler.preview_message())?;
        writeln!(out, "{}", self.scheduler.scheduled_date_time())?;
        let time = if self.scheduler.is_time_setting_enabled() {
            self.scheduler.time_of_day().to_string()
        } else {
            format!("{} (default)", self.scheduler.time_of_day())
        };
        writeln!(
            out,
            "offset={}{} email={} time={} modal={}",
            self.scheduler.offset_input(),
            self.scheduler.unit(),
            self.scheduler.email().unwrap_or("-"),
            time,
            if self.checker.is_modal_open() { "open" } else { "closed" },
        )?;
        Ok(())
    }

    fn write_jobs(&self, out: &mut impl Write) -> Result<()> {
        if let Some(message) = self.scheduler.jobs_error() {
            writeln!(out, "{message}")?;
        }
        match self.scheduler.jobs() {
            None if self.scheduler.jobs_error().is_some() => {}
            Some([]) | None => writeln!(out, "(no scheduled jobs)")?,
            Some(jobs) => {
                for job in jobs {
                    writeln!(out, "{}\t{}\t{}", job.id, job.state, job.name)?;
                }
            }
        }
        Ok(())
    }

    fn write_timer(&self, out: &mut impl Write) -> Result<()> {
        let label = self.timer.label().unwrap_or(self.timer.message());
        writeln!(
            out,
            "{label} {} [{:?}] {}",
            self.timer.formatted_time(),
            self.timer.phase(),
            self.timer.start_label()
        )?;
        Ok(())
    }

    fn drain_timer_events(&mut self, out: &mut impl Write) -> Result<()> {
        let events: Vec<TimerEvent> = self.timer_events.borrow_mut().drain(..).collect();
        for event in events {
            match event {
                TimerEvent::Complete => writeln!(out, "{}: time is up", self.timer.message())?,
                TimerEvent::SettingsChange {
                    duration_seconds,
                    message,
                } => {
                    info!(duration_seconds, %message, "timer settings changed");
                    writeln!(out, "timer set to {duration_seconds}s \"{message}\"")?;
                }
            }
        }
        Ok(())
    }
}

fn write_notice(out: &mut impl Write, notice: &Notice) -> Result<()> {
    let marker = match notice.level {
        NoticeLevel::Success => "ok",
        NoticeLevel::Warning => "warn",
        NoticeLevel::Error => "error",
    };
    writeln!(out, "[{marker}] {}: {}", notice.title, notice.message)?;
    Ok(())
}

pub fn run(config: AppConfig) -> Result<()> {
    info!(zone = %config.zone, trial = config.org_expiration.is_some(), "starting trial reminder shell");
    let backend = LocalBackend::new(config.zone, config.org_expiration, config.user_email.clone());
    let mut shell = Shell::new(&config, backend);

    let stdout = std::io::stdout();
    let mut out = stdout.lock();
    shell.initialize(&mut out)?;
    writeln!(out, "type `help` for commands")?;

    let stdin = std::io::stdin();
    for line in stdin.lock().lines() {
        let line = line.context("failed to read command")?;
        if line.trim().is_empty() {
            continue;
        }
        let command = match line.parse::<Command>() {
            Ok(command) => command,
            Err(err) => {
                writeln!(out, "{err}")?;
                continue;
            }
        };
        match shell.execute(command, &mut out) {
            Ok(true) => {}
            Ok(false) => break,
            Err(err) => writeln!(out, "{err:#}")?,
        }
        out.flush()?;
    }
    info!("shell closed");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use chrono_tz::Asia::Tokyo;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key: &str| map.get(key).cloned()
    }

    fn no_sleep(_: Duration) {}

    fn fixed_now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 9, 1, 0, 0, 0).unwrap()
    }

    fn shell(timer: TimerOptions) -> Shell<LocalBackend> {
        let expiration = Tokyo
            .with_ymd_and_hms(2026, 10, 1, 0, 0, 0)
            .unwrap()
            .with_timezone(&Utc);
        let config = AppConfig {
            zone: Tokyo,
            org_expiration: Some(expiration),
            user_email: "admin@example.com".to_string(),
            timer,
        };
        let backend = LocalBackend::new(Tokyo, Some(expiration), "admin@example.com")
            .with_clock(fixed_now);
        Shell::new(&config, backend).with_sleep(no_sleep)
    }

    fn exec(shell: &mut Shell<LocalBackend>, line: &str) -> String {
        let mut out = Vec::new();
        shell
            .execute(line.parse().expect("command parses"), &mut out)
            .expect("command runs");
        String::from_utf8(out).expect("utf-8 output")
    }

    #[test]
    fn config_defaults_and_overrides() {
        let config = AppConfig::from_lookup(lookup(&[])).unwrap();
        assert_eq!(config.zone, Tokyo);
        assert_eq!(config.timer.duration_seconds, 600);
        assert!(config.org_expiration.is_none());

        let config = AppConfig::from_lookup(lookup(&[
            ("REMINDER_TIME_ZONE", "America/New_York"),
            ("REMINDER_ORG_EXPIRATION", "2026-10-01T00:00:00+09:00"),
            ("TIMER_DURATION_SECONDS", "0"),
            ("TIMER_TICK_MS", "nope"),
            ("TIMER_AUTOSTART", "true"),
        ]))
        .unwrap();
        assert_eq!(config.zone, chrono_tz::America::New_York);
        assert_eq!(
            config.org_expiration,
            Some(Utc.with_ymd_and_hms(2026, 9, 30, 15, 0, 0).unwrap())
        );
        assert_eq!(config.timer.duration_seconds, 1);
        assert_eq!(config.timer.tick_interval_ms, 1000);
        assert!(config.timer.autostart);

        assert!(AppConfig::from_lookup(lookup(&[("REMINDER_TIME_ZONE", "Nowhere/City")])).is_err());
    }

    #[test]
    fn parses_commands() {
        assert_eq!("offset 3".parse::<Command>().unwrap(), Command::Offset("3".into()));
        assert_eq!("hour 9".parse::<Command>().unwrap(), Command::Hour(9));
        assert_eq!(
            "settings 90 coffee break".parse::<Command>().unwrap(),
            Command::Settings {
                duration: "90".into(),
                message: Some("coffee break".into()),
            }
        );
        assert!("unit".parse::<Command>().is_err());
        assert!("launch".parse::<Command>().is_err());
    }

    #[test]
    fn register_flow_through_shell() {
        let mut shell = shell(TimerOptions::default());
        let mut out = Vec::new();
        shell.initialize(&mut out).unwrap();
        assert!(String::from_utf8(out).unwrap().contains("2026/10/1 0:00:00 です！"));

        assert_eq!(exec(&mut shell, "offset 2"), "2026年09月17日 12:00\n");
        assert_eq!(exec(&mut shell, "unit 日"), "2026年09月29日 12:00\n");
        assert!(exec(&mut shell, "register").starts_with("[ok] 成功"));
        assert!(exec(&mut shell, "jobs").contains("2026/09/29 12:00-admin@example.com"));

        let id = shell.scheduler().jobs().unwrap()[0].id.clone();
        assert!(exec(&mut shell, &format!("delete {id}")).contains("削除されました"));
        assert_eq!(exec(&mut shell, "jobs"), "(no scheduled jobs)\n");

        assert!(exec(&mut shell, "offset 0").contains("通知までの日数と時刻を入力してください。"));
        assert!(exec(&mut shell, "register").starts_with("[warn] 検証エラー"));
    }

    #[test]
    fn run_counts_down_and_reports_completion() {
        let mut shell = shell(TimerOptions {
            duration_seconds: 3,
            ..TimerOptions::default()
        });
        let output = exec(&mut shell, "run");
        assert_eq!(output, "00:02\n00:01\n00:00\n休憩時間: time is up\n");
        assert_eq!(shell.timer().remaining_ms(), 0);
    }

    #[test]
    fn settings_change_is_reported() {
        let mut shell = shell(TimerOptions::default());
        let output = exec(&mut shell, "settings 90 stretch");
        assert!(output.contains("01:30"));
        assert!(output.ends_with("timer set to 90s \"stretch\"\n"));
    }
}
