use chrono::{DateTime, FixedOffset, NaiveDate};

use crate::models::salon::SalonRecord;
use crate::models::schedule::WorkingHours;
use crate::models::staff::StaffScheduleRecord;
use crate::services::schedule_utils;

/// Busy interval on a staff member's day, tagged with the entity occupying it.
#[derive(Debug, Clone, PartialEq)]
pub struct BusySlot {
    pub entity_id: String,
    pub start: DateTime<FixedOffset>,
    pub end: DateTime<FixedOffset>,
}

/// Minutes-from-midnight working window plus an optional break.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DayHours {
    pub start_minute: u32,
    pub end_minute: u32,
    pub break_minutes: Option<(u32, u32)>,
}

/// Working hours of a staff member on `date`.
///
/// Staff without any recurring schedule work the salon's hours. Staff with a
/// schedule only work on days that have an available entry in effect. A
/// working-hours override narrows whatever window results.
pub fn hours_for_day(
    date: NaiveDate,
    schedules: &[StaffScheduleRecord],
    salon: &SalonRecord,
    override_hours: Option<WorkingHours>,
) -> Option<DayHours> {
    let base = if schedules.is_empty() {
        Some(DayHours {
            start_minute: salon.open_minute,
            end_minute: salon.close_minute,
            break_minutes: None,
        })
    } else {
        let weekday = schedule_utils::weekday_index(date);
        schedules
            .iter()
            .filter(|entry| entry.day_of_week == weekday && in_effect(entry, date))
            .last()
            .filter(|entry| entry.is_available)
            .map(|entry| DayHours {
                start_minute: entry.start_minute,
                end_minute: entry.end_minute,
                break_minutes: match (entry.break_start_minute, entry.break_end_minute) {
                    (Some(start), Some(end)) if start < end => Some((start, end)),
                    _ => None,
                },
            })
    }?;

    let hours = match override_hours {
        Some(limit) => DayHours {
            start_minute: base.start_minute.max(limit.start_minute),
            end_minute: base.end_minute.min(limit.end_minute),
            break_minutes: base.break_minutes,
        },
        None => base,
    };
    (hours.start_minute < hours.end_minute).then_some(hours)
}

fn in_effect(entry: &StaffScheduleRecord, date: NaiveDate) -> bool {
    let after_start = match entry.effective_from.as_deref() {
        Some(raw) => schedule_utils::parse_date(raw).map(|from| from <= date).unwrap_or(true),
        None => true,
    };
    let before_end = match entry.effective_until.as_deref() {
        Some(raw) => schedule_utils::parse_date(raw).map(|until| date <= until).unwrap_or(true),
        None => true,
    };
    after_start && before_end
}

/// One staff member's bookable window and occupied intervals for a day.
#[derive(Debug, Clone)]
pub struct StaffDay {
    pub staff_id: String,
    pub window_start: DateTime<FixedOffset>,
    pub window_end: DateTime<FixedOffset>,
    pub busy: Vec<BusySlot>,
}

impl StaffDay {
    pub fn new(
        staff_id: impl Into<String>,
        day_start: DateTime<FixedOffset>,
        hours: DayHours,
    ) -> Self {
        let at = |minute: u32| day_start + chrono::Duration::minutes(minute as i64);
        let mut day = Self {
            staff_id: staff_id.into(),
            window_start: at(hours.start_minute),
            window_end: at(hours.end_minute),
            busy: Vec::new(),
        };
        if let Some((start, end)) = hours.break_minutes {
            day.occupy("scheduled-break", at(start), at(end));
        }
        day
    }

    pub fn occupy(
        &mut self,
        entity_id: impl Into<String>,
        start: DateTime<FixedOffset>,
        end: DateTime<FixedOffset>,
    ) {
        self.busy.push(BusySlot {
            entity_id: entity_id.into(),
            start,
            end,
        });
    }

    pub fn within_hours(&self, start: DateTime<FixedOffset>, end: DateTime<FixedOffset>) -> bool {
        start >= self.window_start && end <= self.window_end
    }

    /// Busy slots that `[start, end)` would collide with, keeping a gap of
    /// `min_break` minutes on both sides. `ignore` skips the entity being moved.
    pub fn collisions<'a>(
        &'a self,
        start: DateTime<FixedOffset>,
        end: DateTime<FixedOffset>,
        min_break: i64,
        ignore: Option<&'a str>,
    ) -> impl Iterator<Item = &'a BusySlot> + 'a {
        let gap = chrono::Duration::minutes(min_break.max(0));
        self.busy.iter().filter(move |slot| {
            ignore != Some(slot.entity_id.as_str())
                && schedule_utils::intervals_overlap(start, end, slot.start - gap, slot.end + gap)
        })
    }

    pub fn fits(
        &self,
        start: DateTime<FixedOffset>,
        end: DateTime<FixedOffset>,
        min_break: i64,
        ignore: Option<&str>,
    ) -> bool {
        self.within_hours(start, end) && self.collisions(start, end, min_break, ignore).next().is_none()
    }

    /// Earliest start at or after `not_before` where `duration` minutes fit.
    pub fn earliest_fit(
        &self,
        not_before: DateTime<FixedOffset>,
        duration: i64,
        min_break: i64,
        ignore: Option<&str>,
    ) -> Option<DateTime<FixedOffset>> {
        if duration <= 0 {
            return None;
        }
        let length = chrono::Duration::minutes(duration);
        let gap = chrono::Duration::minutes(min_break.max(0));
        let mut cursor = schedule_utils::clamp_time_to_window(not_before, self.window_start);

        loop {
            let end = cursor + length;
            if end > self.window_end {
                return None;
            }
            let blocking_end = self
                .collisions(cursor, end, min_break, ignore)
                .map(|slot| slot.end + gap)
                .max();
            match blocking_end {
                Some(next) if next > cursor => cursor = next,
                Some(_) => return None,
                None => return Some(cursor),
            }
        }
    }

    /// Minutes covered by the busy slots whose entity ids pass `counted`.
    pub fn occupied_minutes(&self, counted: impl Fn(&str) -> bool) -> i64 {
        self.busy
            .iter()
            .filter(|slot| counted(&slot.entity_id))
            .map(|slot| (slot.end - slot.start).num_minutes())
            .sum()
    }
}
