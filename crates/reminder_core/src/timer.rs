//! Countdown timer.
//!
//! The timer does not own a clock. It asks a [`TickSource`] for a periodic
//! ticker and the host feeds each firing back through [`CountdownTimer::tick`].
//! At most one ticker is live per timer; firings carrying a stale handle are
//! ignored.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::debug;

pub const DEFAULT_MESSAGE: &str = "休憩時間";

/// Identifies one periodic ticker handed out by a [`TickSource`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TickHandle(pub u64);

pub trait TickSource {
    fn schedule(&mut self, interval: Duration) -> TickHandle;
    fn cancel(&mut self, handle: TickHandle);
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TimerEvent {
    Complete,
    SettingsChange {
        duration_seconds: u64,
        message: String,
    },
}

pub trait TimerObserver {
    fn notify(&mut self, event: &TimerEvent);
}

impl<F> TimerObserver for F
where
    F: FnMut(&TimerEvent),
{
    fn notify(&mut self, event: &TimerEvent) {
        self(event)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TimerPhase {
    Idle,
    Running,
    Paused,
    Completed,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimerOptions {
    pub duration_seconds: u64,
    pub tick_interval_ms: u64,
    pub autostart: bool,
    pub label: Option<String>,
}

impl Default for TimerOptions {
    fn default() -> Self {
        Self {
            duration_seconds: 600,
            tick_interval_ms: 1000,
            autostart: false,
            label: None,
        }
    }
}

/// Uncommitted settings edit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SettingsDraft {
    pub duration_seconds: u64,
    pub message: String,
}

pub struct CountdownTimer<S: TickSource> {
    source: S,
    duration_seconds: u64,
    tick_interval_ms: u64,
    label: Option<String>,
    message: String,
    remaining_ms: u64,
    ticker: Option<TickHandle>,
    started: bool,
    paused: bool,
    draft: Option<SettingsDraft>,
    observers: Vec<Box<dyn TimerObserver>>,
}

impl<S: TickSource> CountdownTimer<S> {
    /// Creates the timer at full duration, starting it right away when
    /// `autostart` is set.
    pub fn mount(options: TimerOptions, source: S) -> Self {
        let duration_seconds = options.duration_seconds.max(1);
        let mut timer = Self {
            source,
            duration_seconds,
            tick_interval_ms: options.tick_interval_ms.max(1),
            label: options.label,
            message: DEFAULT_MESSAGE.to_string(),
            remaining_ms: duration_seconds.saturating_mul(1000),
            ticker: None,
            started: false,
            paused: false,
            draft: None,
            observers: Vec::new(),
        };
        if options.autostart {
            timer.start();
        }
        timer
    }

    pub fn subscribe(&mut self, observer: impl TimerObserver + 'static) {
        self.observers.push(Box::new(observer));
    }

    pub fn start(&mut self) {
        if self.ticker.is_some() {
            return;
        }
        if self.remaining_ms == 0 {
            self.reset_internal();
        }
        self.started = true;
        self.paused = false;

        // Resuming: take the pending tick now so the first interval is not doubled.
        if self.remaining_ms < self.total_ms() {
            self.apply_tick();
            if self.remaining_ms == 0 {
                return;
            }
        }

        let handle = self
            .source
            .schedule(Duration::from_millis(self.tick_interval_ms));
        debug!(?handle, remaining_ms = self.remaining_ms, "timer started");
        self.ticker = Some(handle);
    }

    /// Feeds one ticker firing. Ignored unless `handle` is the live ticker.
    pub fn tick(&mut self, handle: TickHandle) {
        if self.ticker != Some(handle) {
            return;
        }
        self.apply_tick();
    }

    pub fn pause(&mut self) {
        self.paused = true;
        self.clear_ticker();
    }

    pub fn reset(&mut self) {
        self.clear_ticker();
        self.reset_internal();
    }

    /// Releases the live ticker, if any. Also runs on drop.
    pub fn teardown(&mut self) {
        self.clear_ticker();
    }

    pub fn open_settings(&mut self) {
        self.draft = Some(SettingsDraft {
            duration_seconds: self.duration_seconds,
            message: self.message.clone(),
        });
    }

    pub fn close_settings(&mut self) {
        self.draft = None;
    }

    pub fn set_draft_duration(&mut self, raw: &str) {
        if let Some(draft) = self.draft.as_mut() {
            draft.duration_seconds = parse_draft_duration(raw);
        }
    }

    pub fn set_draft_message(&mut self, message: Option<&str>) {
        if let Some(draft) = self.draft.as_mut() {
            draft.message = message.unwrap_or_default().to_string();
        }
    }

    /// Commits the open draft. The countdown restarts from the new duration
    /// only if the duration actually changed. Returns false when no draft is
    /// open.
    pub fn save_settings(&mut self) -> bool {
        let Some(draft) = self.draft.take() else {
            return false;
        };
        let new_duration = draft.duration_seconds.max(1);
        let duration_changed = new_duration != self.duration_seconds;

        self.duration_seconds = new_duration;
        self.message = draft.message;

        if duration_changed {
            self.reset();
        }
        debug!(
            duration_seconds = self.duration_seconds,
            duration_changed, "timer settings saved"
        );
        self.emit(TimerEvent::SettingsChange {
            duration_seconds: self.duration_seconds,
            message: self.message.clone(),
        });
        true
    }

    pub fn phase(&self) -> TimerPhase {
        if self.remaining_ms == 0 {
            TimerPhase::Completed
        } else if self.ticker.is_some() {
            TimerPhase::Running
        } else if self.started && self.paused {
            TimerPhase::Paused
        } else {
            TimerPhase::Idle
        }
    }

    pub fn formatted_time(&self) -> String {
        format_remaining(self.remaining_ms)
    }

    pub fn remaining_ms(&self) -> u64 {
        self.remaining_ms
    }

    pub fn total_ms(&self) -> u64 {
        self.duration_seconds.saturating_mul(1000)
    }

    pub fn duration_seconds(&self) -> u64 {
        self.duration_seconds
    }

    pub fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.tick_interval_ms)
    }

    pub fn active_ticker(&self) -> Option<TickHandle> {
        self.ticker
    }

    pub fn is_running(&self) -> bool {
        self.ticker.is_some()
    }

    pub fn is_idle(&self) -> bool {
        !self.started || self.remaining_ms == self.total_ms()
    }

    pub fn is_paused(&self) -> bool {
        self.paused
    }

    pub fn is_paused_or_idle(&self) -> bool {
        self.is_paused() || self.is_idle()
    }

    pub fn start_label(&self) -> &'static str {
        if self.started && !self.paused {
            "Running"
        } else {
            "Start"
        }
    }

    pub fn label(&self) -> Option<&str> {
        self.label.as_deref()
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn is_settings_open(&self) -> bool {
        self.draft.is_some()
    }

    pub fn draft(&self) -> Option<&SettingsDraft> {
        self.draft.as_ref()
    }

    pub fn tick_source(&self) -> &S {
        &self.source
    }
}

impl<S: TickSource> CountdownTimer<S> {
    fn apply_tick(&mut self) {
        self.remaining_ms = self.remaining_ms.saturating_sub(self.tick_interval_ms);
        if self.remaining_ms == 0 {
            self.clear_ticker();
            debug!("timer completed");
            self.emit(TimerEvent::Complete);
        }
    }

    fn reset_internal(&mut self) {
        self.remaining_ms = self.total_ms();
        self.started = false;
        self.paused = false;
    }

    fn clear_ticker(&mut self) {
        if let Some(handle) = self.ticker.take() {
            self.source.cancel(handle);
        }
    }

    fn emit(&mut self, event: TimerEvent) {
        for observer in &mut self.observers {
            observer.notify(&event);
        }
    }
}

impl<S: TickSource> Drop for CountdownTimer<S> {
    fn drop(&mut self) {
        self.clear_ticker();
    }
}

/// `mm:ss` under an hour, `hh:mm:ss` otherwise. Partial seconds are dropped.
pub fn format_remaining(remaining_ms: u64) -> String {
    let total_seconds = remaining_ms / 1000;
    let hours = total_seconds / 3600;
    let minutes = (total_seconds % 3600) / 60;
    let seconds = total_seconds % 60;
    if hours > 0 {
        format!("{hours:02}:{minutes:02}:{seconds:02}")
    } else {
        format!("{minutes:02}:{seconds:02}")
    }
}

/// Settings input: anything non-numeric or below one becomes one; fractions
/// are floored.
pub fn parse_draft_duration(raw: &str) -> u64 {
    let trimmed = raw.trim();
    let value = if trimmed.is_empty() {
        0.0
    } else {
        trimmed.parse::<f64>().unwrap_or(f64::NAN)
    };
    if value.is_nan() || value < 1.0 {
        1
    } else {
        value.floor() as u64
    }
}
