use chrono::{DateTime, FixedOffset};
use rusqlite::Connection;
use tracing::{debug, info};
use uuid::Uuid;

use crate::db::repositories::staff_repository::StaffRepository;
use crate::db::repositories::time_off_repository::{
    BlockedTimeRow, TimeOffRepository, TimeOffRequestRow,
};
use crate::db::DbPool;
use crate::error::{AppError, AppResult};
use crate::models::schedule::ScheduleConflict;
use crate::models::staff::StaffRecord;
use crate::models::time_off::{
    BlockedTimeChange, BlockedTimeCreateInput, BlockedTimeReason, BlockedTimeRecord,
    TimeOffDecision, TimeOffRequestInput, TimeOffRequestRecord, TimeOffStatus,
};
use crate::services::conflict_detector::{self, salon_timezone};
use crate::services::schedule_utils;
use crate::services::session::{require_user, SharedSession};

/// Time-off requests and the blocked time they produce.
#[derive(Clone)]
pub struct TimeOffService {
    db: DbPool,
    session: SharedSession,
}

impl TimeOffService {
    pub fn new(db: DbPool, session: SharedSession) -> Self {
        Self { db, session }
    }

    pub fn submit(&self, input: TimeOffRequestInput) -> AppResult<TimeOffRequestRecord> {
        require_user(self.session.as_ref())?;
        let start = schedule_utils::parse_date(&input.start_date)?;
        let end = schedule_utils::parse_date(&input.end_date)?;
        schedule_utils::range_days(start, end)?;

        let now = schedule_utils::now_rfc3339();
        let record = TimeOffRequestRecord {
            id: Uuid::new_v4().to_string(),
            staff_id: input.staff_id.clone(),
            start_date: start.format("%Y-%m-%d").to_string(),
            end_date: end.format("%Y-%m-%d").to_string(),
            reason: input
                .reason
                .map(|reason| reason.trim().to_string())
                .filter(|reason| !reason.is_empty()),
            status: TimeOffStatus::Pending,
            reviewed_by: None,
            reviewed_at: None,
            review_note: None,
            created_at: now.clone(),
            updated_at: now,
        };

        self.db.with_transaction(|tx| {
            load_staff(tx, &record.staff_id)?;
            TimeOffRepository::insert_request(tx, &TimeOffRequestRow::from_record(&record))
                .map_err(|err| AppError::persistence("insert time-off request", err))
        })?;
        info!(target: "app::schedule", request_id = %record.id, staff_id = %record.staff_id, "time-off request submitted");
        Ok(record)
    }

    /// Approves a pending request and blocks the whole date range in the
    /// salon's timezone within the same transaction.
    pub fn approve(&self, id: &str, note: Option<String>) -> AppResult<TimeOffDecision> {
        let user = require_user(self.session.as_ref())?;
        let decision = self.db.with_transaction(|tx| {
            let conn: &Connection = tx;
            let mut request = load_request(conn, id)?;
            ensure_status(&request, &[TimeOffStatus::Pending], "approved")?;
            let staff = load_staff(conn, &request.staff_id)?;

            let tz = salon_timezone(conn, &staff.salon_id)?;
            let from = schedule_utils::parse_date(&request.start_date)?;
            let to = schedule_utils::parse_date(&request.end_date)?;
            let (start, end) = schedule_utils::date_range_window(from, to, tz)?;

            let now = schedule_utils::now_rfc3339();
            let blocked = BlockedTimeRecord {
                id: Uuid::new_v4().to_string(),
                staff_id: staff.id.clone(),
                salon_id: staff.salon_id.clone(),
                start_time: schedule_utils::format_datetime(start),
                end_time: schedule_utils::format_datetime(end),
                reason: BlockedTimeReason::TimeOff,
                description: request.reason.clone(),
                created_by: Some(user.id.clone()),
                time_off_request_id: Some(request.id.clone()),
                created_at: now.clone(),
            };
            TimeOffRepository::insert_blocked_time(conn, &BlockedTimeRow::from_record(&blocked))
                .map_err(|err| AppError::persistence("insert blocked time", err))?;

            request.status = TimeOffStatus::Approved;
            request.reviewed_by = Some(user.id.clone());
            request.reviewed_at = Some(now.clone());
            request.review_note = clean_note(note);
            request.updated_at = now;
            store_request(conn, &request)?;

            let conflicts = block_conflicts(conn, &blocked.staff_id, &blocked.id, start, end)?;
            Ok(TimeOffDecision {
                request,
                blocked_time: Some(blocked),
                conflicts,
            })
        })?;

        info!(
            target: "app::schedule",
            request_id = id,
            conflicts = decision.conflicts.len(),
            "time-off request approved"
        );
        Ok(decision)
    }

    pub fn reject(&self, id: &str, note: Option<String>) -> AppResult<TimeOffRequestRecord> {
        let user = require_user(self.session.as_ref())?;
        let request = self.db.with_transaction(|tx| {
            let mut request = load_request(tx, id)?;
            ensure_status(&request, &[TimeOffStatus::Pending], "rejected")?;
            let now = schedule_utils::now_rfc3339();
            request.status = TimeOffStatus::Rejected;
            request.reviewed_by = Some(user.id.clone());
            request.reviewed_at = Some(now.clone());
            request.review_note = clean_note(note);
            request.updated_at = now;
            store_request(tx, &request)?;
            Ok(request)
        })?;
        info!(target: "app::schedule", request_id = id, "time-off request rejected");
        Ok(request)
    }

    /// Withdraws a pending or approved request. Blocked time created by an
    /// approval is removed.
    pub fn cancel(&self, id: &str) -> AppResult<TimeOffRequestRecord> {
        require_user(self.session.as_ref())?;
        let (request, removed) = self.db.with_transaction(|tx| {
            let mut request = load_request(tx, id)?;
            ensure_status(
                &request,
                &[TimeOffStatus::Pending, TimeOffStatus::Approved],
                "cancelled",
            )?;
            let removed = if request.status == TimeOffStatus::Approved {
                TimeOffRepository::delete_blocked_times_for_request(tx, &request.id)?
            } else {
                0
            };
            request.status = TimeOffStatus::Cancelled;
            request.updated_at = schedule_utils::now_rfc3339();
            store_request(tx, &request)?;
            Ok((request, removed))
        })?;
        info!(target: "app::schedule", request_id = id, removed_blocks = removed, "time-off request cancelled");
        Ok(request)
    }

    pub fn list_requests(
        &self,
        staff_id: &str,
        status: Option<TimeOffStatus>,
    ) -> AppResult<Vec<TimeOffRequestRecord>> {
        require_user(self.session.as_ref())?;
        let rows = self
            .db
            .with_connection(|conn| TimeOffRepository::list_requests(conn, staff_id, status))?;
        rows.into_iter().map(|row| row.into_record()).collect()
    }

    pub fn create_blocked_time(&self, input: BlockedTimeCreateInput) -> AppResult<BlockedTimeChange> {
        let user = require_user(self.session.as_ref())?;
        let start = schedule_utils::parse_datetime(&input.start_time)?;
        let end = schedule_utils::parse_datetime(&input.end_time)?;
        schedule_utils::ensure_window(start, end)?;

        let change = self.db.with_transaction(|tx| {
            let conn: &Connection = tx;
            let staff = load_staff(conn, &input.staff_id)?;
            let blocked = BlockedTimeRecord {
                id: Uuid::new_v4().to_string(),
                staff_id: staff.id.clone(),
                salon_id: staff.salon_id.clone(),
                start_time: schedule_utils::format_datetime(start),
                end_time: schedule_utils::format_datetime(end),
                reason: input.reason,
                description: input
                    .description
                    .as_deref()
                    .map(str::trim)
                    .filter(|text| !text.is_empty())
                    .map(str::to_string),
                created_by: Some(user.id.clone()),
                time_off_request_id: None,
                created_at: schedule_utils::now_rfc3339(),
            };
            TimeOffRepository::insert_blocked_time(conn, &BlockedTimeRow::from_record(&blocked))
                .map_err(|err| AppError::persistence("insert blocked time", err))?;
            let conflicts = block_conflicts(conn, &blocked.staff_id, &blocked.id, start, end)?;
            Ok(BlockedTimeChange {
                blocked_time: blocked,
                conflicts,
            })
        })?;

        info!(
            target: "app::schedule",
            blocked_time_id = %change.blocked_time.id,
            reason = %change.blocked_time.reason,
            conflicts = change.conflicts.len(),
            "blocked time created"
        );
        Ok(change)
    }

    pub fn list_blocked_time(&self, staff_id: &str) -> AppResult<Vec<BlockedTimeRecord>> {
        require_user(self.session.as_ref())?;
        let rows = self
            .db
            .with_connection(|conn| TimeOffRepository::list_blocked_by_staff(conn, staff_id))?;
        let records = rows
            .into_iter()
            .map(|row| row.into_record())
            .collect::<AppResult<Vec<_>>>()?;
        debug!(target: "app::schedule", staff_id, count = records.len(), "blocked time listed");
        Ok(records)
    }

    pub fn delete_blocked_time(&self, id: &str) -> AppResult<()> {
        require_user(self.session.as_ref())?;
        self.db
            .with_connection(|conn| TimeOffRepository::delete_blocked_time(conn, id))?;
        info!(target: "app::schedule", blocked_time_id = id, "blocked time deleted");
        Ok(())
    }
}

fn load_staff(conn: &Connection, staff_id: &str) -> AppResult<StaffRecord> {
    StaffRepository::find_by_id(conn, staff_id)?
        .ok_or_else(|| AppError::validation(format!("unknown staff member {staff_id}")))
}

fn load_request(conn: &Connection, id: &str) -> AppResult<TimeOffRequestRecord> {
    TimeOffRepository::find_request(conn, id)?
        .ok_or_else(AppError::not_found)?
        .into_record()
}

fn store_request(conn: &Connection, request: &TimeOffRequestRecord) -> AppResult<()> {
    TimeOffRepository::update_request(conn, &TimeOffRequestRow::from_record(request))
        .map_err(|err| AppError::persistence("update time-off request", err))
}

fn ensure_status(
    request: &TimeOffRequestRecord,
    allowed: &[TimeOffStatus],
    target: &str,
) -> AppResult<()> {
    if allowed.contains(&request.status) {
        Ok(())
    } else {
        Err(AppError::conflict(format!(
            "time-off request {} is {} and cannot be {target}",
            request.id, request.status
        )))
    }
}

fn clean_note(note: Option<String>) -> Option<String> {
    note.map(|note| note.trim().to_string())
        .filter(|note| !note.is_empty())
}

fn block_conflicts(
    conn: &Connection,
    staff_id: &str,
    blocked_id: &str,
    start: DateTime<FixedOffset>,
    end: DateTime<FixedOffset>,
) -> AppResult<Vec<ScheduleConflict>> {
    let conflicts = conflict_detector::detect_in_connection(conn, staff_id, start, end)?;
    Ok(conflicts
        .into_iter()
        .filter(|conflict| conflict.involves(blocked_id))
        .collect())
}
