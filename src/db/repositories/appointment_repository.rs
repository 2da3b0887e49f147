use std::convert::TryFrom;

use rusqlite::{named_params, params_from_iter, Connection, OptionalExtension, Row};

use crate::error::{AppError, AppResult};
use crate::models::appointment::{AppointmentRecord, AppointmentStatus, AppointmentView};
use crate::models::salon::ServiceRecord;
use crate::models::staff::{StaffStatus, StaffSummary};

const BASE_SELECT: &str = r#"
    SELECT
        id,
        salon_id,
        staff_id,
        customer_id,
        service_id,
        start_time,
        end_time,
        status,
        cancellation_reason,
        price,
        customer_rating,
        created_at,
        updated_at
    FROM appointments
"#;

#[derive(Debug, Clone)]
pub struct AppointmentRow {
    pub id: String,
    pub salon_id: String,
    pub staff_id: Option<String>,
    pub customer_id: String,
    pub service_id: String,
    pub start_time: Option<String>,
    pub end_time: Option<String>,
    pub status: String,
    pub cancellation_reason: Option<String>,
    pub price: Option<f64>,
    pub customer_rating: Option<f64>,
    pub created_at: String,
    pub updated_at: String,
}

impl AppointmentRow {
    pub fn from_record(record: &AppointmentRecord) -> Self {
        Self {
            id: record.id.clone(),
            salon_id: record.salon_id.clone(),
            staff_id: record.staff_id.clone(),
            customer_id: record.customer_id.clone(),
            service_id: record.service_id.clone(),
            start_time: record.start_time.clone(),
            end_time: record.end_time.clone(),
            status: record.status.as_str().to_string(),
            cancellation_reason: record.cancellation_reason.clone(),
            price: record.price,
            customer_rating: record.customer_rating,
            created_at: record.created_at.clone(),
            updated_at: record.updated_at.clone(),
        }
    }

    pub fn into_record(self) -> AppResult<AppointmentRecord> {
        let status = AppointmentStatus::try_from(self.status.as_str()).map_err(AppError::database)?;
        Ok(AppointmentRecord {
            id: self.id,
            salon_id: self.salon_id,
            staff_id: self.staff_id,
            customer_id: self.customer_id,
            service_id: self.service_id,
            start_time: self.start_time,
            end_time: self.end_time,
            status,
            cancellation_reason: self.cancellation_reason,
            price: self.price,
            customer_rating: self.customer_rating,
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}

impl TryFrom<&Row<'_>> for AppointmentRow {
    type Error = rusqlite::Error;

    fn try_from(row: &Row<'_>) -> Result<Self, Self::Error> {
        Ok(Self {
            id: row.get("id")?,
            salon_id: row.get("salon_id")?,
            staff_id: row.get("staff_id")?,
            customer_id: row.get("customer_id")?,
            service_id: row.get("service_id")?,
            start_time: row.get("start_time")?,
            end_time: row.get("end_time")?,
            status: row.get("status")?,
            cancellation_reason: row.get("cancellation_reason")?,
            price: row.get("price")?,
            customer_rating: row.get("customer_rating")?,
            created_at: row.get("created_at")?,
            updated_at: row.get("updated_at")?,
        })
    }
}

/// Staff and service columns of the joined view query. The joined entity is
/// only materialised when every one of its columns came back.
#[derive(Debug, Clone)]
struct JoinedRelations {
    staff_id: Option<String>,
    staff_display_name: Option<String>,
    staff_status: Option<String>,
    service_id: Option<String>,
    service_salon_id: Option<String>,
    service_name: Option<String>,
    service_duration_minutes: Option<i64>,
    service_price: Option<f64>,
    service_created_at: Option<String>,
    service_updated_at: Option<String>,
}

impl JoinedRelations {
    fn staff(&self) -> Option<StaffSummary> {
        match (&self.staff_id, &self.staff_display_name, &self.staff_status) {
            (Some(id), Some(display_name), Some(status)) => {
                let status = StaffStatus::try_from(status.as_str()).ok()?;
                Some(StaffSummary {
                    id: id.clone(),
                    display_name: display_name.clone(),
                    status,
                })
            }
            _ => None,
        }
    }

    fn service(&self) -> Option<ServiceRecord> {
        Some(ServiceRecord {
            id: self.service_id.clone()?,
            salon_id: self.service_salon_id.clone()?,
            name: self.service_name.clone()?,
            duration_minutes: self.service_duration_minutes?,
            price: self.service_price?,
            created_at: self.service_created_at.clone()?,
            updated_at: self.service_updated_at.clone()?,
        })
    }
}

pub struct AppointmentRepository;

impl AppointmentRepository {
    pub fn insert(conn: &Connection, row: &AppointmentRow) -> AppResult<()> {
        conn.execute(
            r#"
                INSERT INTO appointments (
                    id,
                    salon_id,
                    staff_id,
                    customer_id,
                    service_id,
                    start_time,
                    end_time,
                    status,
                    cancellation_reason,
                    price,
                    customer_rating,
                    created_at,
                    updated_at
                ) VALUES (
                    :id,
                    :salon_id,
                    :staff_id,
                    :customer_id,
                    :service_id,
                    :start_time,
                    :end_time,
                    :status,
                    :cancellation_reason,
                    :price,
                    :customer_rating,
                    :created_at,
                    :updated_at
                )
            "#,
            named_params! {
                ":id": &row.id,
                ":salon_id": &row.salon_id,
                ":staff_id": &row.staff_id,
                ":customer_id": &row.customer_id,
                ":service_id": &row.service_id,
                ":start_time": &row.start_time,
                ":end_time": &row.end_time,
                ":status": &row.status,
                ":cancellation_reason": &row.cancellation_reason,
                ":price": &row.price,
                ":customer_rating": &row.customer_rating,
                ":created_at": &row.created_at,
                ":updated_at": &row.updated_at,
            },
        )?;

        Ok(())
    }

    pub fn update(conn: &Connection, row: &AppointmentRow) -> AppResult<()> {
        let affected = conn.execute(
            r#"
                UPDATE appointments SET
                    staff_id = :staff_id,
                    start_time = :start_time,
                    end_time = :end_time,
                    status = :status,
                    cancellation_reason = :cancellation_reason,
                    price = :price,
                    customer_rating = :customer_rating,
                    updated_at = :updated_at
                WHERE id = :id
            "#,
            named_params! {
                ":id": &row.id,
                ":staff_id": &row.staff_id,
                ":start_time": &row.start_time,
                ":end_time": &row.end_time,
                ":status": &row.status,
                ":cancellation_reason": &row.cancellation_reason,
                ":price": &row.price,
                ":customer_rating": &row.customer_rating,
                ":updated_at": &row.updated_at,
            },
        )?;

        if affected == 0 {
            return Err(AppError::not_found());
        }

        Ok(())
    }

    pub fn find_by_id(conn: &Connection, id: &str) -> AppResult<Option<AppointmentRow>> {
        let mut stmt = conn.prepare(&format!("{} WHERE id = ?1", BASE_SELECT))?;
        let row = stmt
            .query_row([id], |row| AppointmentRow::try_from(row))
            .optional()?;
        Ok(row)
    }

    pub fn find_by_ids(conn: &Connection, ids: &[String]) -> AppResult<Vec<AppointmentRow>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let placeholders = vec!["?"; ids.len()].join(", ");
        let mut stmt = conn.prepare(&format!(
            "{} WHERE id IN ({}) ORDER BY id ASC",
            BASE_SELECT, placeholders
        ))?;
        let rows = stmt
            .query_map(params_from_iter(ids.iter()), |row| {
                AppointmentRow::try_from(row)
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    /// Appointments of one staff member. Cancelled rows are filtered out
    /// unless `include_cancelled` is set.
    pub fn list_by_staff(
        conn: &Connection,
        staff_id: &str,
        include_cancelled: bool,
    ) -> AppResult<Vec<AppointmentRow>> {
        let mut stmt = conn.prepare(&format!(
            "{} WHERE staff_id = :staff_id AND (:include_cancelled = 1 OR status != 'cancelled') ORDER BY start_time ASC, id ASC",
            BASE_SELECT
        ))?;
        let rows = stmt
            .query_map(
                named_params! {
                    ":staff_id": staff_id,
                    ":include_cancelled": include_cancelled as i64,
                },
                |row| AppointmentRow::try_from(row),
            )?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    pub fn list_by_salon(
        conn: &Connection,
        salon_id: &str,
        include_cancelled: bool,
    ) -> AppResult<Vec<AppointmentRow>> {
        let mut stmt = conn.prepare(&format!(
            "{} WHERE salon_id = :salon_id AND (:include_cancelled = 1 OR status != 'cancelled') ORDER BY start_time ASC, id ASC",
            BASE_SELECT
        ))?;
        let rows = stmt
            .query_map(
                named_params! {
                    ":salon_id": salon_id,
                    ":include_cancelled": include_cancelled as i64,
                },
                |row| AppointmentRow::try_from(row),
            )?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    pub fn find_view_by_id(conn: &Connection, id: &str) -> AppResult<Option<AppointmentView>> {
        let mut stmt = conn.prepare(
            r#"
                SELECT
                    a.id,
                    a.salon_id,
                    a.staff_id,
                    a.customer_id,
                    a.service_id,
                    a.start_time,
                    a.end_time,
                    a.status,
                    a.cancellation_reason,
                    a.price,
                    a.customer_rating,
                    a.created_at,
                    a.updated_at,
                    s.id AS joined_staff_id,
                    s.display_name AS joined_staff_display_name,
                    s.status AS joined_staff_status,
                    sv.id AS joined_service_id,
                    sv.salon_id AS joined_service_salon_id,
                    sv.name AS joined_service_name,
                    sv.duration_minutes AS joined_service_duration_minutes,
                    sv.price AS joined_service_price,
                    sv.created_at AS joined_service_created_at,
                    sv.updated_at AS joined_service_updated_at
                FROM appointments a
                LEFT JOIN staff s ON s.id = a.staff_id
                LEFT JOIN services sv ON sv.id = a.service_id
                WHERE a.id = ?1
            "#,
        )?;

        let joined = stmt
            .query_row([id], |row| {
                let appointment = AppointmentRow::try_from(row)?;
                let relations = JoinedRelations {
                    staff_id: row.get("joined_staff_id")?,
                    staff_display_name: row.get("joined_staff_display_name")?,
                    staff_status: row.get("joined_staff_status")?,
                    service_id: row.get("joined_service_id")?,
                    service_salon_id: row.get("joined_service_salon_id")?,
                    service_name: row.get("joined_service_name")?,
                    service_duration_minutes: row.get("joined_service_duration_minutes")?,
                    service_price: row.get("joined_service_price")?,
                    service_created_at: row.get("joined_service_created_at")?,
                    service_updated_at: row.get("joined_service_updated_at")?,
                };
                Ok((appointment, relations))
            })
            .optional()?;

        match joined {
            Some((row, relations)) => Ok(Some(AppointmentView {
                appointment: row.into_record()?,
                staff: relations.staff(),
                service: relations.service(),
            })),
            None => Ok(None),
        }
    }
}
