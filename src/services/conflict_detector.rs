use std::cmp::Ordering;

use chrono::{DateTime, FixedOffset};
use rusqlite::Connection;
use tracing::{debug, warn};

use crate::db::repositories::appointment_repository::AppointmentRepository;
use crate::db::repositories::salon_repository::SalonRepository;
use crate::db::repositories::staff_repository::StaffRepository;
use crate::db::repositories::time_off_repository::TimeOffRepository;
use crate::db::DbPool;
use crate::error::{AppError, AppResult};
use crate::models::appointment::AppointmentRecord;
use crate::models::schedule::{
    ConflictSeverity, ConflictType, ResolutionStrategy, ScheduleConflict,
};
use crate::models::time_off::BlockedTimeRecord;
use crate::services::schedule_utils;
use crate::services::session::{require_user, SharedSession};

const OVERLAP_RESOLUTIONS: [ResolutionStrategy; 4] = [
    ResolutionStrategy::RescheduleAppointment,
    ResolutionStrategy::ReassignStaff,
    ResolutionStrategy::CancelAppointment,
    ResolutionStrategy::SplitAppointment,
];

const BLOCKED_RESOLUTIONS: [ResolutionStrategy; 3] = [
    ResolutionStrategy::RescheduleAppointment,
    ResolutionStrategy::ReassignStaff,
    ResolutionStrategy::CancelAppointment,
];

/// An appointment whose staff member and interval are known and valid.
#[derive(Debug, Clone)]
pub struct TimedAppointment {
    pub record: AppointmentRecord,
    pub staff_id: String,
    pub start: DateTime<FixedOffset>,
    pub end: DateTime<FixedOffset>,
}

impl TimedAppointment {
    /// `None` for cancelled, unassigned, untimed or empty-interval records.
    pub fn from_record(record: &AppointmentRecord) -> Option<Self> {
        if !record.status.occupies_slot() {
            return None;
        }
        let staff_id = record.staff_id.clone()?;
        let start = schedule_utils::parse_datetime(record.start_time.as_deref()?).ok()?;
        let end = schedule_utils::parse_datetime(record.end_time.as_deref()?).ok()?;
        if end <= start {
            return None;
        }
        Some(Self {
            record: record.clone(),
            staff_id,
            start,
            end,
        })
    }

    pub fn id(&self) -> &str {
        &self.record.id
    }

    pub fn duration_minutes(&self) -> i64 {
        (self.end - self.start).num_minutes()
    }

    pub fn intersects(&self, start: DateTime<FixedOffset>, end: DateTime<FixedOffset>) -> bool {
        schedule_utils::intervals_overlap(self.start, self.end, start, end)
    }
}

#[derive(Debug, Clone)]
pub struct TimedBlock {
    pub record: BlockedTimeRecord,
    pub start: DateTime<FixedOffset>,
    pub end: DateTime<FixedOffset>,
}

impl TimedBlock {
    pub fn from_record(record: &BlockedTimeRecord) -> Option<Self> {
        let start = schedule_utils::parse_datetime(&record.start_time).ok()?;
        let end = schedule_utils::parse_datetime(&record.end_time).ok()?;
        if end <= start {
            return None;
        }
        Some(Self {
            record: record.clone(),
            start,
            end,
        })
    }
}

pub fn timed_appointments(records: &[AppointmentRecord]) -> Vec<TimedAppointment> {
    let mut timed = Vec::with_capacity(records.len());
    for record in records {
        match TimedAppointment::from_record(record) {
            Some(item) => timed.push(item),
            None if record.status.occupies_slot() => {
                debug!(
                    target: "app::conflict",
                    appointment_id = %record.id,
                    "skipping appointment without staff or valid interval"
                );
            }
            None => {}
        }
    }
    timed
}

pub fn timed_blocks(records: &[BlockedTimeRecord]) -> Vec<TimedBlock> {
    records.iter().filter_map(TimedBlock::from_record).collect()
}

pub fn conflict_id(conflict_type: ConflictType, first: &str, second: &str) -> String {
    format!("{}:{}:{}", conflict_type.as_str(), first, second)
}

/// Splits a conflict id back into its type and the two entity ids.
pub fn parse_conflict_id(id: &str) -> AppResult<(ConflictType, String, String)> {
    let mut parts = id.splitn(3, ':');
    let (kind, first, second) = match (parts.next(), parts.next(), parts.next()) {
        (Some(kind), Some(first), Some(second)) if !first.is_empty() && !second.is_empty() => {
            (kind, first, second)
        }
        _ => {
            return Err(AppError::validation(format!(
                "malformed conflict id: {id}"
            )))
        }
    };
    let conflict_type = ConflictType::try_from(kind).map_err(AppError::validation)?;
    Ok((conflict_type, first.to_string(), second.to_string()))
}

/// Pairwise overlap scan for a single staff member. Appointments belonging to
/// other staff are ignored.
pub fn find_conflicts(
    staff_id: &str,
    appointments: &[TimedAppointment],
    blocked: &[TimedBlock],
) -> Vec<ScheduleConflict> {
    let mut own: Vec<&TimedAppointment> = appointments
        .iter()
        .filter(|item| item.staff_id == staff_id)
        .collect();
    own.sort_by(|a, b| a.start.cmp(&b.start).then_with(|| a.id().cmp(b.id())));

    let mut found: Vec<(DateTime<FixedOffset>, ScheduleConflict)> = Vec::new();

    for (index, first) in own.iter().enumerate() {
        for second in own.iter().skip(index + 1) {
            if !schedule_utils::intervals_overlap(first.start, first.end, second.start, second.end)
            {
                continue;
            }
            let overlap_start = first.start.max(second.start);
            let overlap_end = first.end.min(second.end);
            found.push((
                overlap_start,
                ScheduleConflict {
                    id: conflict_id(ConflictType::AppointmentOverlap, first.id(), second.id()),
                    conflict_type: ConflictType::AppointmentOverlap,
                    severity: ConflictSeverity::High,
                    staff_id: staff_id.to_string(),
                    entity_ids: vec![first.id().to_string(), second.id().to_string()],
                    overlap_start: schedule_utils::format_datetime(overlap_start),
                    overlap_end: schedule_utils::format_datetime(overlap_end),
                    message: format!(
                        "appointments {} and {} overlap for staff {}",
                        first.id(),
                        second.id(),
                        staff_id
                    ),
                    resolution_options: OVERLAP_RESOLUTIONS.to_vec(),
                },
            ));
        }
    }

    for block in blocked.iter().filter(|block| block.record.staff_id == staff_id) {
        for appointment in &own {
            if !schedule_utils::intervals_overlap(
                appointment.start,
                appointment.end,
                block.start,
                block.end,
            ) {
                continue;
            }
            let overlap_start = appointment.start.max(block.start);
            let overlap_end = appointment.end.min(block.end);
            found.push((
                overlap_start,
                ScheduleConflict {
                    id: conflict_id(
                        ConflictType::BlockedTimeOverlap,
                        appointment.id(),
                        &block.record.id,
                    ),
                    conflict_type: ConflictType::BlockedTimeOverlap,
                    severity: ConflictSeverity::Medium,
                    staff_id: staff_id.to_string(),
                    entity_ids: vec![appointment.id().to_string(), block.record.id.clone()],
                    overlap_start: schedule_utils::format_datetime(overlap_start),
                    overlap_end: schedule_utils::format_datetime(overlap_end),
                    message: format!(
                        "appointment {} falls into blocked time ({}) for staff {}",
                        appointment.id(),
                        block.record.reason,
                        staff_id
                    ),
                    resolution_options: BLOCKED_RESOLUTIONS.to_vec(),
                },
            ));
        }
    }

    found.sort_by(|(a_start, a), (b_start, b)| compare_conflicts(*a_start, a, *b_start, b));
    found.into_iter().map(|(_, conflict)| conflict).collect()
}

fn compare_conflicts(
    a_start: DateTime<FixedOffset>,
    a: &ScheduleConflict,
    b_start: DateTime<FixedOffset>,
    b: &ScheduleConflict,
) -> Ordering {
    a_start
        .cmp(&b_start)
        .then_with(|| a.severity.rank().cmp(&b.severity.rank()))
        .then_with(|| a.id.cmp(&b.id))
}

/// Runs the scan for one staff member over `[window_start, window_end)` using
/// an existing connection, so callers inside a transaction see their own writes.
pub fn detect_in_connection(
    conn: &Connection,
    staff_id: &str,
    window_start: DateTime<FixedOffset>,
    window_end: DateTime<FixedOffset>,
) -> AppResult<Vec<ScheduleConflict>> {
    schedule_utils::ensure_window(window_start, window_end)?;

    let rows = AppointmentRepository::list_by_staff(conn, staff_id, false)?;
    let records = rows
        .into_iter()
        .map(|row| row.into_record())
        .collect::<AppResult<Vec<_>>>()?;
    let appointments: Vec<TimedAppointment> = timed_appointments(&records)
        .into_iter()
        .filter(|item| item.intersects(window_start, window_end))
        .collect();

    let blocked_rows = TimeOffRepository::list_blocked_by_staff(conn, staff_id)?;
    let blocked_records = blocked_rows
        .into_iter()
        .map(|row| row.into_record())
        .collect::<AppResult<Vec<_>>>()?;
    let blocked: Vec<TimedBlock> = timed_blocks(&blocked_records)
        .into_iter()
        .filter(|block| {
            schedule_utils::intervals_overlap(block.start, block.end, window_start, window_end)
        })
        .collect();

    Ok(find_conflicts(staff_id, &appointments, &blocked))
}

/// Timezone of the salon a staff member works at.
pub(crate) fn staff_timezone(conn: &Connection, staff_id: &str) -> AppResult<chrono_tz::Tz> {
    let staff = StaffRepository::find_by_id(conn, staff_id)?.ok_or_else(AppError::not_found)?;
    salon_timezone(conn, &staff.salon_id)
}

pub(crate) fn salon_timezone(conn: &Connection, salon_id: &str) -> AppResult<chrono_tz::Tz> {
    let salon = SalonRepository::find_by_id(conn, salon_id)?.ok_or_else(AppError::not_found)?;
    schedule_utils::parse_timezone(&salon.timezone)
}

pub struct ConflictDetector {
    db: DbPool,
    session: SharedSession,
}

impl ConflictDetector {
    pub fn new(db: DbPool, session: SharedSession) -> Self {
        Self { db, session }
    }

    /// Conflicts of one staff member on `date` (`YYYY-MM-DD`, salon timezone).
    pub fn detect_for_day(&self, staff_id: &str, date: &str) -> AppResult<Vec<ScheduleConflict>> {
        require_user(self.session.as_ref())?;
        let date = schedule_utils::parse_date(date)?;

        let conflicts = self.db.with_connection(|conn| {
            let tz = staff_timezone(conn, staff_id)?;
            let (start, end) = schedule_utils::day_window(date, tz)?;
            detect_in_connection(conn, staff_id, start, end)
        })?;

        if !conflicts.is_empty() {
            warn!(
                target: "app::conflict",
                staff_id,
                date = %date,
                count = conflicts.len(),
                "schedule conflicts detected"
            );
        }
        Ok(conflicts)
    }

    /// Conflicts of one staff member inside an explicit RFC 3339 range.
    pub fn detect_for_range(
        &self,
        staff_id: &str,
        start: &str,
        end: &str,
    ) -> AppResult<Vec<ScheduleConflict>> {
        require_user(self.session.as_ref())?;
        let start = schedule_utils::parse_datetime(start)?;
        let end = schedule_utils::parse_datetime(end)?;
        self.db
            .with_connection(|conn| detect_in_connection(conn, staff_id, start, end))
    }

    /// Conflicts of every staff member of a salon over an inclusive date range.
    pub fn detect_for_salon(
        &self,
        salon_id: &str,
        from: &str,
        to: &str,
    ) -> AppResult<Vec<ScheduleConflict>> {
        require_user(self.session.as_ref())?;
        let from = schedule_utils::parse_date(from)?;
        let to = schedule_utils::parse_date(to)?;

        self.db.with_connection(|conn| {
            let tz = salon_timezone(conn, salon_id)?;
            let (start, end) = schedule_utils::date_range_window(from, to, tz)?;
            let mut conflicts = Vec::new();
            for staff in StaffRepository::list_by_salon(conn, salon_id)? {
                conflicts.extend(detect_in_connection(conn, &staff.id, start, end)?);
            }
            debug!(
                target: "app::conflict",
                salon_id,
                count = conflicts.len(),
                "salon conflict scan finished"
            );
            Ok(conflicts)
        })
    }
}
