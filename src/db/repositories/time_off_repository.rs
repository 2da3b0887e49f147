use std::convert::TryFrom;

use rusqlite::{named_params, Connection, OptionalExtension, Row};

use crate::error::{AppError, AppResult};
use crate::models::time_off::{
    BlockedTimeReason, BlockedTimeRecord, TimeOffRequestRecord, TimeOffStatus,
};

const BLOCKED_SELECT: &str = r#"
    SELECT
        id,
        staff_id,
        salon_id,
        start_time,
        end_time,
        reason,
        description,
        created_by,
        time_off_request_id,
        created_at
    FROM blocked_times
"#;

const REQUEST_SELECT: &str = r#"
    SELECT
        id,
        staff_id,
        start_date,
        end_date,
        reason,
        status,
        reviewed_by,
        reviewed_at,
        review_note,
        created_at,
        updated_at
    FROM time_off_requests
"#;

#[derive(Debug, Clone)]
pub struct BlockedTimeRow {
    pub id: String,
    pub staff_id: String,
    pub salon_id: String,
    pub start_time: String,
    pub end_time: String,
    pub reason: String,
    pub description: Option<String>,
    pub created_by: Option<String>,
    pub time_off_request_id: Option<String>,
    pub created_at: String,
}

impl BlockedTimeRow {
    pub fn from_record(record: &BlockedTimeRecord) -> Self {
        Self {
            id: record.id.clone(),
            staff_id: record.staff_id.clone(),
            salon_id: record.salon_id.clone(),
            start_time: record.start_time.clone(),
            end_time: record.end_time.clone(),
            reason: record.reason.as_str().to_string(),
            description: record.description.clone(),
            created_by: record.created_by.clone(),
            time_off_request_id: record.time_off_request_id.clone(),
            created_at: record.created_at.clone(),
        }
    }

    pub fn into_record(self) -> AppResult<BlockedTimeRecord> {
        let reason =
            BlockedTimeReason::try_from(self.reason.as_str()).map_err(AppError::database)?;
        Ok(BlockedTimeRecord {
            id: self.id,
            staff_id: self.staff_id,
            salon_id: self.salon_id,
            start_time: self.start_time,
            end_time: self.end_time,
            reason,
            description: self.description,
            created_by: self.created_by,
            time_off_request_id: self.time_off_request_id,
            created_at: self.created_at,
        })
    }
}

impl TryFrom<&Row<'_>> for BlockedTimeRow {
    type Error = rusqlite::Error;

    fn try_from(row: &Row<'_>) -> Result<Self, Self::Error> {
        Ok(Self {
            id: row.get("id")?,
            staff_id: row.get("staff_id")?,
            salon_id: row.get("salon_id")?,
            start_time: row.get("start_time")?,
            end_time: row.get("end_time")?,
            reason: row.get("reason")?,
            description: row.get("description")?,
            created_by: row.get("created_by")?,
            time_off_request_id: row.get("time_off_request_id")?,
            created_at: row.get("created_at")?,
        })
    }
}

#[derive(Debug, Clone)]
pub struct TimeOffRequestRow {
    pub id: String,
    pub staff_id: String,
    pub start_date: String,
    pub end_date: String,
    pub reason: Option<String>,
    pub status: String,
    pub reviewed_by: Option<String>,
    pub reviewed_at: Option<String>,
    pub review_note: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

impl TimeOffRequestRow {
    pub fn from_record(record: &TimeOffRequestRecord) -> Self {
        Self {
            id: record.id.clone(),
            staff_id: record.staff_id.clone(),
            start_date: record.start_date.clone(),
            end_date: record.end_date.clone(),
            reason: record.reason.clone(),
            status: record.status.as_str().to_string(),
            reviewed_by: record.reviewed_by.clone(),
            reviewed_at: record.reviewed_at.clone(),
            review_note: record.review_note.clone(),
            created_at: record.created_at.clone(),
            updated_at: record.updated_at.clone(),
        }
    }

    pub fn into_record(self) -> AppResult<TimeOffRequestRecord> {
        let status = TimeOffStatus::try_from(self.status.as_str()).map_err(AppError::database)?;
        Ok(TimeOffRequestRecord {
            id: self.id,
            staff_id: self.staff_id,
            start_date: self.start_date,
            end_date: self.end_date,
            reason: self.reason,
            status,
            reviewed_by: self.reviewed_by,
            reviewed_at: self.reviewed_at,
            review_note: self.review_note,
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}

impl TryFrom<&Row<'_>> for TimeOffRequestRow {
    type Error = rusqlite::Error;

    fn try_from(row: &Row<'_>) -> Result<Self, Self::Error> {
        Ok(Self {
            id: row.get("id")?,
            staff_id: row.get("staff_id")?,
            start_date: row.get("start_date")?,
            end_date: row.get("end_date")?,
            reason: row.get("reason")?,
            status: row.get("status")?,
            reviewed_by: row.get("reviewed_by")?,
            reviewed_at: row.get("reviewed_at")?,
            review_note: row.get("review_note")?,
            created_at: row.get("created_at")?,
            updated_at: row.get("updated_at")?,
        })
    }
}

pub struct TimeOffRepository;

impl TimeOffRepository {
    pub fn insert_blocked_time(conn: &Connection, row: &BlockedTimeRow) -> AppResult<()> {
        conn.execute(
            r#"
                INSERT INTO blocked_times (
                    id,
                    staff_id,
                    salon_id,
                    start_time,
                    end_time,
                    reason,
                    description,
                    created_by,
                    time_off_request_id,
                    created_at
                ) VALUES (
                    :id,
                    :staff_id,
                    :salon_id,
                    :start_time,
                    :end_time,
                    :reason,
                    :description,
                    :created_by,
                    :time_off_request_id,
                    :created_at
                )
            "#,
            named_params! {
                ":id": &row.id,
                ":staff_id": &row.staff_id,
                ":salon_id": &row.salon_id,
                ":start_time": &row.start_time,
                ":end_time": &row.end_time,
                ":reason": &row.reason,
                ":description": &row.description,
                ":created_by": &row.created_by,
                ":time_off_request_id": &row.time_off_request_id,
                ":created_at": &row.created_at,
            },
        )?;
        Ok(())
    }

    pub fn delete_blocked_time(conn: &Connection, id: &str) -> AppResult<()> {
        let affected = conn.execute("DELETE FROM blocked_times WHERE id = ?1", [id])?;
        if affected == 0 {
            return Err(AppError::not_found());
        }
        Ok(())
    }

    pub fn delete_blocked_times_for_request(conn: &Connection, request_id: &str) -> AppResult<usize> {
        let affected = conn.execute(
            "DELETE FROM blocked_times WHERE time_off_request_id = ?1",
            [request_id],
        )?;
        Ok(affected)
    }

    pub fn find_blocked_time(conn: &Connection, id: &str) -> AppResult<Option<BlockedTimeRow>> {
        let mut stmt = conn.prepare(&format!("{} WHERE id = ?1", BLOCKED_SELECT))?;
        let row = stmt
            .query_row([id], |row| BlockedTimeRow::try_from(row))
            .optional()?;
        Ok(row)
    }

    pub fn list_blocked_by_staff(conn: &Connection, staff_id: &str) -> AppResult<Vec<BlockedTimeRow>> {
        let mut stmt = conn.prepare(&format!(
            "{} WHERE staff_id = ?1 ORDER BY start_time ASC, id ASC",
            BLOCKED_SELECT
        ))?;
        let rows = stmt
            .query_map([staff_id], |row| BlockedTimeRow::try_from(row))?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    pub fn list_blocked_by_salon(conn: &Connection, salon_id: &str) -> AppResult<Vec<BlockedTimeRow>> {
        let mut stmt = conn.prepare(&format!(
            "{} WHERE salon_id = ?1 ORDER BY start_time ASC, id ASC",
            BLOCKED_SELECT
        ))?;
        let rows = stmt
            .query_map([salon_id], |row| BlockedTimeRow::try_from(row))?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    pub fn insert_request(conn: &Connection, row: &TimeOffRequestRow) -> AppResult<()> {
        conn.execute(
            r#"
                INSERT INTO time_off_requests (
                    id,
                    staff_id,
                    start_date,
                    end_date,
                    reason,
                    status,
                    reviewed_by,
                    reviewed_at,
                    review_note,
                    created_at,
                    updated_at
                ) VALUES (
                    :id,
                    :staff_id,
                    :start_date,
                    :end_date,
                    :reason,
                    :status,
                    :reviewed_by,
                    :reviewed_at,
                    :review_note,
                    :created_at,
                    :updated_at
                )
            "#,
            named_params! {
                ":id": &row.id,
                ":staff_id": &row.staff_id,
                ":start_date": &row.start_date,
                ":end_date": &row.end_date,
                ":reason": &row.reason,
                ":status": &row.status,
                ":reviewed_by": &row.reviewed_by,
                ":reviewed_at": &row.reviewed_at,
                ":review_note": &row.review_note,
                ":created_at": &row.created_at,
                ":updated_at": &row.updated_at,
            },
        )?;
        Ok(())
    }

    pub fn update_request(conn: &Connection, row: &TimeOffRequestRow) -> AppResult<()> {
        let affected = conn.execute(
            r#"
                UPDATE time_off_requests SET
                    status = :status,
                    reviewed_by = :reviewed_by,
                    reviewed_at = :reviewed_at,
                    review_note = :review_note,
                    updated_at = :updated_at
                WHERE id = :id
            "#,
            named_params! {
                ":id": &row.id,
                ":status": &row.status,
                ":reviewed_by": &row.reviewed_by,
                ":reviewed_at": &row.reviewed_at,
                ":review_note": &row.review_note,
                ":updated_at": &row.updated_at,
            },
        )?;
        if affected == 0 {
            return Err(AppError::not_found());
        }
        Ok(())
    }

    pub fn find_request(conn: &Connection, id: &str) -> AppResult<Option<TimeOffRequestRow>> {
        let mut stmt = conn.prepare(&format!("{} WHERE id = ?1", REQUEST_SELECT))?;
        let row = stmt
            .query_row([id], |row| TimeOffRequestRow::try_from(row))
            .optional()?;
        Ok(row)
    }

    /// Requests for a staff member, optionally restricted to one status.
    pub fn list_requests(
        conn: &Connection,
        staff_id: &str,
        status: Option<TimeOffStatus>,
    ) -> AppResult<Vec<TimeOffRequestRow>> {
        let mut stmt = conn.prepare(&format!(
            "{} WHERE staff_id = :staff_id AND (:status IS NULL OR status = :status) ORDER BY start_date ASC, id ASC",
            REQUEST_SELECT
        ))?;
        let rows = stmt
            .query_map(
                named_params! {
                    ":staff_id": staff_id,
                    ":status": status.map(|value| value.as_str()),
                },
                |row| TimeOffRequestRow::try_from(row),
            )?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }
}
