//! Reminder date arithmetic.
//!
//! The computed instant is a *preview*: calendar math and the time-of-day
//! overwrite happen in the caller's display zone, while the backend that owns
//! the real job may apply its own zone rule. The two can differ by the zone
//! offset and are not reconciled here.

use std::fmt;
use std::str::FromStr;

use chrono::{
    DateTime, Datelike, Days, LocalResult, NaiveDate, NaiveDateTime, NaiveTime, TimeDelta,
    TimeZone, Utc,
};
use serde::{Deserialize, Serialize};

use crate::error::ScheduleError;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(rename_all = "snake_case")]
pub enum OffsetUnit {
    Day,
    Week,
    Month,
}

impl OffsetUnit {
    pub const ALL: [OffsetUnit; 3] = [OffsetUnit::Day, OffsetUnit::Week, OffsetUnit::Month];

    /// Label shown in the unit picker.
    pub fn label(self) -> &'static str {
        match self {
            OffsetUnit::Day => "日",
            OffsetUnit::Week => "週",
            OffsetUnit::Month => "月",
        }
    }
}

impl fmt::Display for OffsetUnit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl FromStr for OffsetUnit {
    type Err = ScheduleError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        match trimmed.to_ascii_lowercase().as_str() {
            "日" | "d" | "day" | "days" => Ok(OffsetUnit::Day),
            "週" | "w" | "week" | "weeks" => Ok(OffsetUnit::Week),
            "月" | "m" | "month" | "months" => Ok(OffsetUnit::Month),
            _ => Err(ScheduleError::UnknownUnit(trimmed.to_string())),
        }
    }
}

/// How far before the expiration the reminder goes out. The magnitude is
/// always at least one, including when deserialized.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(try_from = "RawOffsetSpec")]
pub struct OffsetSpec {
    magnitude: u32,
    unit: OffsetUnit,
}

impl OffsetSpec {
    pub fn new(magnitude: i64, unit: OffsetUnit) -> Result<Self, ScheduleError> {
        match u32::try_from(magnitude) {
            Ok(value) if value >= 1 => Ok(Self {
                magnitude: value,
                unit,
            }),
            _ => Err(ScheduleError::InvalidOffset(magnitude.to_string())),
        }
    }

    /// Parses free-form numeric input. `"2"` and `"2.0"` are both two; blanks,
    /// fractions, zero and negatives are rejected.
    pub fn parse(raw: &str, unit: OffsetUnit) -> Result<Self, ScheduleError> {
        let invalid = || ScheduleError::InvalidOffset(raw.to_string());
        let value: f64 = raw.trim().parse().map_err(|_| invalid())?;
        if !value.is_finite() || value.fract() != 0.0 || value < 1.0 || value > f64::from(u32::MAX)
        {
            return Err(invalid());
        }
        Self::new(value as i64, unit)
    }

    pub fn magnitude(&self) -> u32 {
        self.magnitude
    }

    pub fn unit(&self) -> OffsetUnit {
        self.unit
    }

    /// Moves `date` back by this offset. Months keep the day of month and
    /// let it overflow into the following month, so Mar 31 minus one month
    /// is Mar 3 (Mar 2 in a leap year).
    pub fn shift_back(&self, date: NaiveDate) -> Option<NaiveDate> {
        match self.unit {
            OffsetUnit::Day => date.checked_sub_days(Days::new(u64::from(self.magnitude))),
            OffsetUnit::Week => date.checked_sub_days(Days::new(u64::from(self.magnitude) * 7)),
            OffsetUnit::Month => {
                let months = i64::from(date.year()) * 12 + i64::from(date.month0())
                    - i64::from(self.magnitude);
                let year = i32::try_from(months.div_euclid(12)).ok()?;
                let month = u32::try_from(months.rem_euclid(12)).ok()? + 1;
                NaiveDate::from_ymd_opt(year, month, 1)?
                    .checked_add_days(Days::new(u64::from(date.day0())))
            }
        }
    }
}

#[derive(Deserialize)]
struct RawOffsetSpec {
    magnitude: i64,
    unit: OffsetUnit,
}

impl TryFrom<RawOffsetSpec> for OffsetSpec {
    type Error = ScheduleError;

    fn try_from(raw: RawOffsetSpec) -> Result<Self, Self::Error> {
        Self::new(raw.magnitude, raw.unit)
    }
}

impl fmt::Display for OffsetSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.magnitude, self.unit)
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(try_from = "RawTimeOfDay")]
pub struct TimeOfDay {
    hour: u32,
    minute: u32,
}

#[derive(Deserialize)]
struct RawTimeOfDay {
    hour: u32,
    minute: u32,
}

impl TryFrom<RawTimeOfDay> for TimeOfDay {
    type Error = ScheduleError;

    fn try_from(raw: RawTimeOfDay) -> Result<Self, Self::Error> {
        Self::new(raw.hour, raw.minute)
    }
}

impl TimeOfDay {
    pub fn new(hour: u32, minute: u32) -> Result<Self, ScheduleError> {
        if hour > 23 || minute > 59 {
            return Err(ScheduleError::InvalidTimeOfDay { hour, minute });
        }
        Ok(Self { hour, minute })
    }

    pub fn hour(&self) -> u32 {
        self.hour
    }

    pub fn minute(&self) -> u32 {
        self.minute
    }

    pub fn as_naive_time(&self) -> NaiveTime {
        NaiveTime::default() + TimeDelta::minutes(i64::from(self.hour * 60 + self.minute))
    }
}

impl Default for TimeOfDay {
    fn default() -> Self {
        Self {
            hour: 12,
            minute: 0,
        }
    }
}

impl fmt::Display for TimeOfDay {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:02}:{:02}", self.hour, self.minute)
    }
}

/// Computes when the reminder should fire: the expiration's calendar date in
/// `zone`, moved back by `offset`, at `time_of_day` with seconds zeroed.
pub fn compute_schedule<Z: TimeZone>(
    expiration: &DateTime<Utc>,
    offset: OffsetSpec,
    time_of_day: TimeOfDay,
    zone: &Z,
) -> Result<DateTime<Z>, ScheduleError> {
    let local_date = expiration.with_timezone(zone).date_naive();
    let date = offset
        .shift_back(local_date)
        .ok_or(ScheduleError::DateOutOfRange)?;
    resolve_local(zone, date.and_time(time_of_day.as_naive_time()))
}

/// Maps a wall-clock time onto `zone`. Ambiguous times take the earlier
/// instant; times skipped by a forward transition move one hour later.
fn resolve_local<Z: TimeZone>(zone: &Z, naive: NaiveDateTime) -> Result<DateTime<Z>, ScheduleError> {
    match zone.from_local_datetime(&naive) {
        LocalResult::Single(dt) => Ok(dt),
        LocalResult::Ambiguous(earliest, _) => Ok(earliest),
        LocalResult::None => zone
            .from_local_datetime(&(naive + TimeDelta::hours(1)))
            .earliest()
            .ok_or(ScheduleError::NonexistentLocalTime(naive)),
    }
}
