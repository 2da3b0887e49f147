use std::collections::HashMap;
use std::convert::TryFrom;

use rusqlite::{named_params, Connection, OptionalExtension, Row};

use crate::error::{AppError, AppResult};
use crate::models::staff::{StaffRecord, StaffScheduleRecord, StaffStatus};

const STAFF_SELECT: &str = r#"
    SELECT id, salon_id, display_name, email, status, created_at, updated_at
    FROM staff
"#;

const SCHEDULE_SELECT: &str = r#"
    SELECT
        id,
        staff_id,
        day_of_week,
        start_minute,
        end_minute,
        break_start_minute,
        break_end_minute,
        effective_from,
        effective_until,
        is_available,
        created_at,
        updated_at
    FROM staff_schedules
"#;

#[derive(Debug, Clone)]
pub struct StaffRow {
    pub id: String,
    pub salon_id: String,
    pub display_name: String,
    pub email: Option<String>,
    pub status: String,
    pub created_at: String,
    pub updated_at: String,
}

impl StaffRow {
    pub fn from_record(record: &StaffRecord) -> Self {
        Self {
            id: record.id.clone(),
            salon_id: record.salon_id.clone(),
            display_name: record.display_name.clone(),
            email: record.email.clone(),
            status: record.status.as_str().to_string(),
            created_at: record.created_at.clone(),
            updated_at: record.updated_at.clone(),
        }
    }

    pub fn into_record(self, service_ids: Vec<String>) -> AppResult<StaffRecord> {
        let status = StaffStatus::try_from(self.status.as_str()).map_err(AppError::database)?;
        Ok(StaffRecord {
            id: self.id,
            salon_id: self.salon_id,
            display_name: self.display_name,
            email: self.email,
            status,
            service_ids,
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}

impl TryFrom<&Row<'_>> for StaffRow {
    type Error = rusqlite::Error;

    fn try_from(row: &Row<'_>) -> Result<Self, Self::Error> {
        Ok(Self {
            id: row.get("id")?,
            salon_id: row.get("salon_id")?,
            display_name: row.get("display_name")?,
            email: row.get("email")?,
            status: row.get("status")?,
            created_at: row.get("created_at")?,
            updated_at: row.get("updated_at")?,
        })
    }
}

#[derive(Debug, Clone)]
pub struct StaffScheduleRow {
    pub id: String,
    pub staff_id: String,
    pub day_of_week: u8,
    pub start_minute: u32,
    pub end_minute: u32,
    pub break_start_minute: Option<u32>,
    pub break_end_minute: Option<u32>,
    pub effective_from: Option<String>,
    pub effective_until: Option<String>,
    pub is_available: bool,
    pub created_at: String,
    pub updated_at: String,
}

impl StaffScheduleRow {
    pub fn from_record(record: &StaffScheduleRecord) -> Self {
        Self {
            id: record.id.clone(),
            staff_id: record.staff_id.clone(),
            day_of_week: record.day_of_week,
            start_minute: record.start_minute,
            end_minute: record.end_minute,
            break_start_minute: record.break_start_minute,
            break_end_minute: record.break_end_minute,
            effective_from: record.effective_from.clone(),
            effective_until: record.effective_until.clone(),
            is_available: record.is_available,
            created_at: record.created_at.clone(),
            updated_at: record.updated_at.clone(),
        }
    }

    pub fn into_record(self) -> StaffScheduleRecord {
        StaffScheduleRecord {
            id: self.id,
            staff_id: self.staff_id,
            day_of_week: self.day_of_week,
            start_minute: self.start_minute,
            end_minute: self.end_minute,
            break_start_minute: self.break_start_minute,
            break_end_minute: self.break_end_minute,
            effective_from: self.effective_from,
            effective_until: self.effective_until,
            is_available: self.is_available,
            created_at: self.created_at,
            updated_at: self.updated_at,
        }
    }
}

impl TryFrom<&Row<'_>> for StaffScheduleRow {
    type Error = rusqlite::Error;

    fn try_from(row: &Row<'_>) -> Result<Self, Self::Error> {
        Ok(Self {
            id: row.get("id")?,
            staff_id: row.get("staff_id")?,
            day_of_week: row.get("day_of_week")?,
            start_minute: row.get("start_minute")?,
            end_minute: row.get("end_minute")?,
            break_start_minute: row.get("break_start_minute")?,
            break_end_minute: row.get("break_end_minute")?,
            effective_from: row.get("effective_from")?,
            effective_until: row.get("effective_until")?,
            is_available: row.get::<_, i64>("is_available")? != 0,
            created_at: row.get("created_at")?,
            updated_at: row.get("updated_at")?,
        })
    }
}

pub struct StaffRepository;

impl StaffRepository {
    pub fn insert(conn: &Connection, row: &StaffRow, service_ids: &[String]) -> AppResult<()> {
        conn.execute(
            r#"
                INSERT INTO staff (
                    id, salon_id, display_name, email, status, created_at, updated_at
                ) VALUES (
                    :id, :salon_id, :display_name, :email, :status, :created_at, :updated_at
                )
            "#,
            named_params! {
                ":id": &row.id,
                ":salon_id": &row.salon_id,
                ":display_name": &row.display_name,
                ":email": &row.email,
                ":status": &row.status,
                ":created_at": &row.created_at,
                ":updated_at": &row.updated_at,
            },
        )?;
        Self::replace_services(conn, &row.id, service_ids)?;
        Ok(())
    }

    pub fn update_status(
        conn: &Connection,
        id: &str,
        status: StaffStatus,
        updated_at: &str,
    ) -> AppResult<()> {
        let affected = conn.execute(
            "UPDATE staff SET status = :status, updated_at = :updated_at WHERE id = :id",
            named_params! {
                ":id": id,
                ":status": status.as_str(),
                ":updated_at": updated_at,
            },
        )?;
        if affected == 0 {
            return Err(AppError::not_found());
        }
        Ok(())
    }

    pub fn replace_services(conn: &Connection, staff_id: &str, service_ids: &[String]) -> AppResult<()> {
        conn.execute("DELETE FROM staff_services WHERE staff_id = ?1", [staff_id])?;
        let mut stmt = conn
            .prepare("INSERT OR IGNORE INTO staff_services (staff_id, service_id) VALUES (?1, ?2)")?;
        for service_id in service_ids {
            stmt.execute([staff_id, service_id.as_str()])?;
        }
        Ok(())
    }

    pub fn find_by_id(conn: &Connection, id: &str) -> AppResult<Option<StaffRecord>> {
        let mut stmt = conn.prepare(&format!("{} WHERE id = ?1", STAFF_SELECT))?;
        let row = stmt
            .query_row([id], |row| StaffRow::try_from(row))
            .optional()?;
        match row {
            Some(row) => {
                let services = Self::service_ids_for(conn, &row.id)?;
                Ok(Some(row.into_record(services)?))
            }
            None => Ok(None),
        }
    }

    pub fn list_by_salon(conn: &Connection, salon_id: &str) -> AppResult<Vec<StaffRecord>> {
        let mut stmt = conn.prepare(&format!(
            "{} WHERE salon_id = ?1 ORDER BY display_name ASC, id ASC",
            STAFF_SELECT
        ))?;
        let rows = stmt
            .query_map([salon_id], |row| StaffRow::try_from(row))?
            .collect::<Result<Vec<_>, _>>()?;

        let mut services = Self::service_map_for_salon(conn, salon_id)?;
        rows.into_iter()
            .map(|row| {
                let ids = services.remove(&row.id).unwrap_or_default();
                row.into_record(ids)
            })
            .collect()
    }

    fn service_ids_for(conn: &Connection, staff_id: &str) -> AppResult<Vec<String>> {
        let mut stmt = conn.prepare(
            "SELECT service_id FROM staff_services WHERE staff_id = ?1 ORDER BY service_id ASC",
        )?;
        let ids = stmt
            .query_map([staff_id], |row| row.get::<_, String>(0))?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(ids)
    }

    fn service_map_for_salon(
        conn: &Connection,
        salon_id: &str,
    ) -> AppResult<HashMap<String, Vec<String>>> {
        let mut stmt = conn.prepare(
            r#"
                SELECT ss.staff_id, ss.service_id
                FROM staff_services ss
                INNER JOIN staff s ON s.id = ss.staff_id
                WHERE s.salon_id = ?1
                ORDER BY ss.staff_id ASC, ss.service_id ASC
            "#,
        )?;
        let pairs = stmt
            .query_map([salon_id], |row| {
                Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
            })?
            .collect::<Result<Vec<_>, _>>()?;

        let mut map: HashMap<String, Vec<String>> = HashMap::new();
        for (staff_id, service_id) in pairs {
            map.entry(staff_id).or_default().push(service_id);
        }
        Ok(map)
    }

    pub fn insert_schedule(conn: &Connection, row: &StaffScheduleRow) -> AppResult<()> {
        conn.execute(
            r#"
                INSERT INTO staff_schedules (
                    id,
                    staff_id,
                    day_of_week,
                    start_minute,
                    end_minute,
                    break_start_minute,
                    break_end_minute,
                    effective_from,
                    effective_until,
                    is_available,
                    created_at,
                    updated_at
                ) VALUES (
                    :id,
                    :staff_id,
                    :day_of_week,
                    :start_minute,
                    :end_minute,
                    :break_start_minute,
                    :break_end_minute,
                    :effective_from,
                    :effective_until,
                    :is_available,
                    :created_at,
                    :updated_at
                )
            "#,
            named_params! {
                ":id": &row.id,
                ":staff_id": &row.staff_id,
                ":day_of_week": row.day_of_week,
                ":start_minute": row.start_minute,
                ":end_minute": row.end_minute,
                ":break_start_minute": row.break_start_minute,
                ":break_end_minute": row.break_end_minute,
                ":effective_from": &row.effective_from,
                ":effective_until": &row.effective_until,
                ":is_available": row.is_available as i64,
                ":created_at": &row.created_at,
                ":updated_at": &row.updated_at,
            },
        )?;
        Ok(())
    }

    pub fn list_schedules_for_day(
        conn: &Connection,
        staff_id: &str,
        day_of_week: u8,
    ) -> AppResult<Vec<StaffScheduleRow>> {
        let mut stmt = conn.prepare(&format!(
            "{} WHERE staff_id = ?1 AND day_of_week = ?2 ORDER BY created_at ASC",
            SCHEDULE_SELECT
        ))?;
        let rows = stmt
            .query_map(rusqlite::params![staff_id, day_of_week], |row| {
                StaffScheduleRow::try_from(row)
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    pub fn list_schedules(conn: &Connection, staff_id: &str) -> AppResult<Vec<StaffScheduleRow>> {
        let mut stmt = conn.prepare(&format!(
            "{} WHERE staff_id = ?1 ORDER BY day_of_week ASC, start_minute ASC",
            SCHEDULE_SELECT
        ))?;
        let rows = stmt
            .query_map([staff_id], |row| StaffScheduleRow::try_from(row))?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    pub fn delete_schedule(conn: &Connection, id: &str) -> AppResult<()> {
        let affected = conn.execute("DELETE FROM staff_schedules WHERE id = ?1", [id])?;
        if affected == 0 {
            return Err(AppError::not_found());
        }
        Ok(())
    }
}
