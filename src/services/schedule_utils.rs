use chrono::{
    DateTime, Datelike, Duration, FixedOffset, NaiveDate, NaiveTime, Offset, TimeZone,
};
use chrono_tz::Tz;
use serde_json::json;

use crate::error::{AppError, AppResult};

/// Longest inclusive date range any query accepts.
pub const MAX_RANGE_DAYS: i64 = 366;

pub fn parse_datetime(value: &str) -> AppResult<DateTime<FixedOffset>> {
    DateTime::parse_from_rfc3339(value.trim()).map_err(|err| {
        AppError::validation_with_details(
            "invalid timestamp",
            json!({"value": value, "error": err.to_string()}),
        )
    })
}

pub fn parse_date(value: &str) -> AppResult<NaiveDate> {
    NaiveDate::parse_from_str(value.trim(), "%Y-%m-%d").map_err(|err| {
        AppError::validation_with_details(
            "invalid date, expected YYYY-MM-DD",
            json!({"value": value, "error": err.to_string()}),
        )
    })
}

pub fn format_datetime(dt: DateTime<FixedOffset>) -> String {
    dt.to_rfc3339()
}

pub fn add_minutes(dt: DateTime<FixedOffset>, minutes: i64) -> AppResult<DateTime<FixedOffset>> {
    dt.checked_add_signed(Duration::minutes(minutes))
        .ok_or_else(|| AppError::validation("time arithmetic out of range"))
}

pub fn duration_minutes(
    start: DateTime<FixedOffset>,
    end: DateTime<FixedOffset>,
) -> AppResult<i64> {
    let total = end.signed_duration_since(start).num_minutes();
    if total < 0 {
        Err(AppError::validation("end time must not precede start time"))
    } else {
        Ok(total)
    }
}

/// Half-open `[start, end)` overlap test. Empty or inverted ranges are rejected.
pub fn overlaps(
    a_start: DateTime<FixedOffset>,
    a_end: DateTime<FixedOffset>,
    b_start: DateTime<FixedOffset>,
    b_end: DateTime<FixedOffset>,
) -> AppResult<bool> {
    ensure_window(a_start, a_end)?;
    ensure_window(b_start, b_end)?;
    Ok(intervals_overlap(a_start, a_end, b_start, b_end))
}

/// Half-open overlap test without range validation. Touching ranges do not overlap.
pub fn intervals_overlap(
    a_start: DateTime<FixedOffset>,
    a_end: DateTime<FixedOffset>,
    b_start: DateTime<FixedOffset>,
    b_end: DateTime<FixedOffset>,
) -> bool {
    a_start < b_end && b_start < a_end
}

pub fn ensure_window(start: DateTime<FixedOffset>, end: DateTime<FixedOffset>) -> AppResult<()> {
    if end <= start {
        Err(AppError::validation("time window end must be after its start"))
    } else {
        Ok(())
    }
}

pub fn clamp_time_to_window(
    current: DateTime<FixedOffset>,
    window_start: DateTime<FixedOffset>,
) -> DateTime<FixedOffset> {
    if current < window_start {
        window_start
    } else {
        current
    }
}

/// Parses a `HH:MM` wall-clock time.
pub fn parse_clock_time(value: &str) -> AppResult<NaiveTime> {
    NaiveTime::parse_from_str(value.trim(), "%H:%M").map_err(|err| {
        AppError::validation_with_details(
            "invalid clock time, expected HH:MM",
            json!({"value": value, "error": err.to_string()}),
        )
    })
}

/// Resolves a requested new start against the original one. `HH:MM` keeps the
/// original calendar day and UTC offset, anything else must be RFC 3339.
pub fn resolve_new_start(
    original: DateTime<FixedOffset>,
    raw: &str,
) -> AppResult<DateTime<FixedOffset>> {
    let trimmed = raw.trim();
    if trimmed.len() <= 5 && trimmed.contains(':') {
        let time = parse_clock_time(trimmed)?;
        let naive = original.date_naive().and_time(time);
        return original
            .offset()
            .from_local_datetime(&naive)
            .single()
            .ok_or_else(|| AppError::validation("clock time does not exist on that day"));
    }
    parse_datetime(trimmed)
}

pub fn parse_timezone(name: &str) -> AppResult<Tz> {
    name.trim().parse::<Tz>().map_err(|err| {
        AppError::validation_with_details(
            "unknown timezone",
            json!({"value": name, "error": err.to_string()}),
        )
    })
}

/// Local midnight of `date` in `tz`, expressed with the offset in force then.
pub fn local_midnight(date: NaiveDate, tz: Tz) -> AppResult<DateTime<FixedOffset>> {
    let naive = date.and_time(NaiveTime::MIN);
    let local = tz
        .from_local_datetime(&naive)
        .earliest()
        .ok_or_else(|| AppError::validation("local midnight does not exist in timezone"))?;
    let offset = local.offset().fix();
    Ok(local.with_timezone(&offset))
}

/// `[local midnight of from, local midnight after to)` for an inclusive date range.
pub fn date_range_window(
    from: NaiveDate,
    to: NaiveDate,
    tz: Tz,
) -> AppResult<(DateTime<FixedOffset>, DateTime<FixedOffset>)> {
    let days = range_days(from, to)?;
    let start = local_midnight(from, tz)?;
    let next = from
        .checked_add_signed(Duration::days(days))
        .ok_or_else(|| AppError::validation("date range out of bounds"))?;
    let end = local_midnight(next, tz)?;
    Ok((start, end))
}

pub fn day_window(
    date: NaiveDate,
    tz: Tz,
) -> AppResult<(DateTime<FixedOffset>, DateTime<FixedOffset>)> {
    date_range_window(date, date, tz)
}

/// Number of days in an inclusive range.
pub fn range_days(from: NaiveDate, to: NaiveDate) -> AppResult<i64> {
    let days = (to - from).num_days() + 1;
    if days <= 0 {
        return Err(AppError::validation_with_details(
            "date range end precedes its start",
            json!({"from": from.to_string(), "to": to.to_string()}),
        ));
    }
    if days > MAX_RANGE_DAYS {
        return Err(AppError::validation_with_details(
            "date range too long",
            json!({"days": days, "max": MAX_RANGE_DAYS}),
        ));
    }
    Ok(days)
}

pub fn local_date_of(dt: DateTime<FixedOffset>, tz: Tz) -> NaiveDate {
    dt.with_timezone(&tz).date_naive()
}

/// 0 = Sunday through 6 = Saturday.
pub fn weekday_index(date: NaiveDate) -> u8 {
    date.weekday().num_days_from_sunday() as u8
}

pub fn now_rfc3339() -> String {
    chrono::Utc::now().to_rfc3339()
}
