use std::fmt::Display;

use chrono::{DateTime, TimeZone};
use chrono_tz::Tz;

use crate::error::ScheduleError;

pub const SCHEDULE_PLACEHOLDER: &str = "通知までの日数と時刻を入力してください。";
pub const PREVIEW_PLACEHOLDER: &str = "通知日時を設定してください";
pub const EXPIRATION_LOADING: &str = "読み込み中です...";

const SCHEDULE_PATTERN: &str = "%Y年%m月%d日 %H:%M";
// ja-JP rendering: unpadded month, day and hour.
const LOCALE_PATTERN: &str = "%Y/%-m/%-d %-H:%M:%S";

pub fn parse_zone(name: &str) -> Result<Tz, ScheduleError> {
    name.trim()
        .parse::<Tz>()
        .map_err(|_| ScheduleError::UnknownTimeZone(name.to_string()))
}

/// Renders `YYYY年MM月DD日 hh:mm` (24-hour) in `zone`, or the input prompt
/// when there is nothing to show.
pub fn format_schedule<T, Z>(instant: Option<&DateTime<T>>, zone: &Z) -> String
where
    T: TimeZone,
    Z: TimeZone,
    Z::Offset: Display,
{
    match instant {
        Some(instant) => instant
            .with_timezone(zone)
            .format(SCHEDULE_PATTERN)
            .to_string(),
        None => SCHEDULE_PLACEHOLDER.to_string(),
    }
}

/// Same as [`format_schedule`] but with the zone given by its IANA name.
pub fn format_schedule_in<T: TimeZone>(
    instant: Option<&DateTime<T>>,
    zone_name: &str,
) -> Result<String, ScheduleError> {
    let zone = parse_zone(zone_name)?;
    Ok(format_schedule(instant, &zone))
}

pub fn format_locale<T, Z>(instant: &DateTime<T>, zone: &Z) -> String
where
    T: TimeZone,
    Z: TimeZone,
    Z::Offset: Display,
{
    instant.with_timezone(zone).format(LOCALE_PATTERN).to_string()
}

pub fn expiration_message<T, Z>(expiration: Option<&DateTime<T>>, zone: &Z) -> String
where
    T: TimeZone,
    Z: TimeZone,
    Z::Offset: Display,
{
    match expiration {
        Some(expiration) => format!("本組織の有効期限は {} です。", format_locale(expiration, zone)),
        None => EXPIRATION_LOADING.to_string(),
    }
}

pub fn preview_message<T, Z>(scheduled: Option<&DateTime<T>>, zone: &Z) -> String
where
    T: TimeZone,
    Z: TimeZone,
    Z::Offset: Display,
{
    match scheduled {
        Some(scheduled) => format!("メール送信日時: {}", format_locale(scheduled, zone)),
        None => PREVIEW_PLACEHOLDER.to_string(),
    }
}
