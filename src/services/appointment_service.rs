use rusqlite::Connection;
use tracing::{debug, info};
use uuid::Uuid;

use crate::db::repositories::appointment_repository::{AppointmentRepository, AppointmentRow};
use crate::db::repositories::salon_repository::SalonRepository;
use crate::db::repositories::staff_repository::StaffRepository;
use crate::db::DbPool;
use crate::error::{AppError, AppResult};
use crate::models::appointment::{
    AppointmentCreateInput, AppointmentRecord, AppointmentStatus, AppointmentView,
};
use crate::models::schedule::{AppointmentChange, ScheduleConflict};
use crate::models::staff::StaffRecord;
use crate::services::conflict_detector::{self, salon_timezone};
use crate::services::schedule_utils;
use crate::services::session::{require_user, SharedSession};

#[derive(Clone)]
pub struct AppointmentService {
    db: DbPool,
    session: SharedSession,
}

impl AppointmentService {
    pub fn new(db: DbPool, session: SharedSession) -> Self {
        Self { db, session }
    }

    /// Creates a booking. The end time defaults to start plus the service
    /// duration; the new appointment's conflicts are reported alongside it.
    pub fn book(&self, input: AppointmentCreateInput) -> AppResult<AppointmentChange> {
        require_user(self.session.as_ref())?;
        let status = match input.status {
            None => AppointmentStatus::Pending,
            Some(status @ (AppointmentStatus::Pending | AppointmentStatus::Confirmed)) => status,
            Some(other) => {
                return Err(AppError::validation(format!(
                    "new appointments cannot start as {other}"
                )))
            }
        };
        let start = schedule_utils::parse_datetime(&input.start_time)?;

        let change = self.db.with_transaction(|tx| {
            let conn: &Connection = tx;
            SalonRepository::find_by_id(conn, &input.salon_id)?
                .ok_or_else(|| AppError::validation(format!("unknown salon {}", input.salon_id)))?;
            let service = SalonRepository::find_service(conn, &input.service_id)?
                .map(|row| row.into_record())
                .filter(|service| service.salon_id == input.salon_id)
                .ok_or_else(|| {
                    AppError::validation(format!("unknown service {}", input.service_id))
                })?;
            let end = match input.end_time.as_deref() {
                Some(raw) => schedule_utils::parse_datetime(raw)?,
                None => schedule_utils::add_minutes(start, service.duration_minutes)?,
            };
            schedule_utils::ensure_window(start, end)?;

            let staff_id = match input.staff_id.as_deref() {
                Some(staff_id) => Some(
                    assignable_staff(conn, staff_id, &input.salon_id, &input.service_id)?.id,
                ),
                None => None,
            };

            let now = schedule_utils::now_rfc3339();
            let record = AppointmentRecord {
                id: Uuid::new_v4().to_string(),
                salon_id: input.salon_id.clone(),
                staff_id,
                customer_id: input.customer_id.clone(),
                service_id: input.service_id.clone(),
                start_time: Some(schedule_utils::format_datetime(start)),
                end_time: Some(schedule_utils::format_datetime(end)),
                status,
                cancellation_reason: None,
                price: input.price.or(Some(service.price)),
                customer_rating: None,
                created_at: now.clone(),
                updated_at: now,
            };
            AppointmentRepository::insert(conn, &AppointmentRow::from_record(&record))
                .map_err(|err| AppError::persistence("insert appointment", err))?;
            let conflicts = conflicts_involving(conn, &record)?;
            Ok(AppointmentChange {
                appointment: record,
                conflicts,
            })
        })?;

        info!(
            target: "app::schedule",
            appointment_id = %change.appointment.id,
            conflicts = change.conflicts.len(),
            "appointment booked"
        );
        Ok(change)
    }

    pub fn get(&self, id: &str) -> AppResult<Option<AppointmentRecord>> {
        require_user(self.session.as_ref())?;
        self.db
            .with_connection(|conn| AppointmentRepository::find_by_id(conn, id))?
            .map(|row| row.into_record())
            .transpose()
    }

    /// Appointment joined with its staff member and service.
    pub fn get_view(&self, id: &str) -> AppResult<Option<AppointmentView>> {
        require_user(self.session.as_ref())?;
        self.db
            .with_connection(|conn| AppointmentRepository::find_view_by_id(conn, id))
    }

    /// Salon appointments starting inside the inclusive local date range,
    /// optionally narrowed to one staff member.
    pub fn list(
        &self,
        salon_id: &str,
        from: &str,
        to: &str,
        staff_id: Option<&str>,
        include_cancelled: bool,
    ) -> AppResult<Vec<AppointmentRecord>> {
        require_user(self.session.as_ref())?;
        let from = schedule_utils::parse_date(from)?;
        let to = schedule_utils::parse_date(to)?;

        let records = self.db.with_connection(|conn| {
            let tz = salon_timezone(conn, salon_id)?;
            let (window_start, window_end) = schedule_utils::date_range_window(from, to, tz)?;
            let rows = match staff_id {
                Some(staff_id) => {
                    AppointmentRepository::list_by_staff(conn, staff_id, include_cancelled)?
                }
                None => AppointmentRepository::list_by_salon(conn, salon_id, include_cancelled)?,
            };
            let mut records = Vec::with_capacity(rows.len());
            for row in rows {
                let record = row.into_record()?;
                if record.salon_id != salon_id {
                    continue;
                }
                let starts_inside = match record.start_time.as_deref() {
                    Some(raw) => match schedule_utils::parse_datetime(raw) {
                        Ok(start) => start >= window_start && start < window_end,
                        Err(_) => false,
                    },
                    None => false,
                };
                if starts_inside {
                    records.push(record);
                }
            }
            Ok(records)
        })?;

        debug!(target: "app::schedule", salon_id, count = records.len(), "appointments listed");
        Ok(records)
    }

    /// Moves an appointment, keeping its duration. `new_time` is `HH:MM` on
    /// the current day or an RFC 3339 timestamp.
    pub fn reschedule(
        &self,
        id: &str,
        new_time: &str,
        new_staff_id: Option<&str>,
    ) -> AppResult<AppointmentChange> {
        require_user(self.session.as_ref())?;
        let change = self.mutate(|conn| reschedule_record(conn, id, new_time, new_staff_id))?;
        info!(target: "app::schedule", appointment_id = id, "appointment rescheduled");
        Ok(change)
    }

    pub fn reassign(&self, id: &str, new_staff_id: &str) -> AppResult<AppointmentChange> {
        require_user(self.session.as_ref())?;
        let change = self.mutate(|conn| reassign_record(conn, id, new_staff_id))?;
        info!(
            target: "app::schedule",
            appointment_id = id,
            staff_id = new_staff_id,
            "appointment reassigned"
        );
        Ok(change)
    }

    pub fn cancel(&self, id: &str, reason: &str) -> AppResult<AppointmentRecord> {
        require_user(self.session.as_ref())?;
        let record = self
            .db
            .with_transaction(|tx| cancel_record(tx, id, reason))?;
        info!(target: "app::schedule", appointment_id = id, "appointment cancelled");
        Ok(record)
    }

    pub fn confirm(&self, id: &str) -> AppResult<AppointmentRecord> {
        self.transition(id, AppointmentStatus::Confirmed)
    }

    pub fn complete(&self, id: &str) -> AppResult<AppointmentRecord> {
        self.transition(id, AppointmentStatus::Completed)
    }

    pub fn mark_no_show(&self, id: &str) -> AppResult<AppointmentRecord> {
        self.transition(id, AppointmentStatus::NoShow)
    }

    /// Stores a 1-5 customer rating on a completed appointment.
    pub fn rate(&self, id: &str, rating: f64) -> AppResult<AppointmentRecord> {
        require_user(self.session.as_ref())?;
        if !rating.is_finite() || !(1.0..=5.0).contains(&rating) {
            return Err(AppError::validation("rating must be between 1 and 5"));
        }
        self.db.with_transaction(|tx| {
            let mut record = load(tx, id)?;
            if record.status != AppointmentStatus::Completed {
                return Err(AppError::conflict(format!(
                    "only completed appointments can be rated, {} is {}",
                    record.id, record.status
                )));
            }
            record.customer_rating = Some(rating);
            record.updated_at = schedule_utils::now_rfc3339();
            store(tx, &record)?;
            Ok(record)
        })
    }

    fn transition(&self, id: &str, next: AppointmentStatus) -> AppResult<AppointmentRecord> {
        require_user(self.session.as_ref())?;
        let record = self.db.with_transaction(|tx| {
            let mut record = load(tx, id)?;
            if !record.status.can_transition_to(next) {
                return Err(AppError::conflict(format!(
                    "appointment {} cannot move from {} to {next}",
                    record.id, record.status
                )));
            }
            record.status = next;
            record.updated_at = schedule_utils::now_rfc3339();
            store(tx, &record)?;
            Ok(record)
        })?;
        info!(target: "app::schedule", appointment_id = id, status = %next, "appointment status changed");
        Ok(record)
    }

    fn mutate<F>(&self, apply: F) -> AppResult<AppointmentChange>
    where
        F: FnOnce(&Connection) -> AppResult<AppointmentRecord>,
    {
        self.db.with_transaction(|tx| {
            let conn: &Connection = tx;
            let appointment = apply(conn)?;
            let conflicts = conflicts_involving(conn, &appointment)?;
            Ok(AppointmentChange {
                appointment,
                conflicts,
            })
        })
    }
}

/// Staff member who may take a booking: active, of the same salon and able to
/// perform the service.
pub(crate) fn assignable_staff(
    conn: &Connection,
    staff_id: &str,
    salon_id: &str,
    service_id: &str,
) -> AppResult<StaffRecord> {
    let staff = StaffRepository::find_by_id(conn, staff_id)?
        .ok_or_else(|| AppError::validation(format!("unknown staff member {staff_id}")))?;
    if staff.salon_id != salon_id {
        return Err(AppError::validation(format!(
            "staff member {staff_id} does not work at salon {salon_id}"
        )));
    }
    if !staff.is_active() {
        return Err(AppError::validation(format!(
            "staff member {staff_id} is {}",
            staff.status
        )));
    }
    if !staff.can_perform(service_id) {
        return Err(AppError::validation(format!(
            "staff member {staff_id} cannot perform service {service_id}"
        )));
    }
    Ok(staff)
}

fn load(conn: &Connection, appointment_id: &str) -> AppResult<AppointmentRecord> {
    AppointmentRepository::find_by_id(conn, appointment_id)?
        .ok_or_else(AppError::not_found)?
        .into_record()
}

fn load_open(conn: &Connection, appointment_id: &str) -> AppResult<AppointmentRecord> {
    let record = load(conn, appointment_id)?;
    if !record.status.is_open() {
        return Err(AppError::conflict(format!(
            "appointment {} is {} and can no longer change",
            record.id, record.status
        )));
    }
    Ok(record)
}

fn store(conn: &Connection, record: &AppointmentRecord) -> AppResult<()> {
    AppointmentRepository::update(conn, &AppointmentRow::from_record(record))
        .map_err(|err| AppError::persistence("update appointment", err))
}

pub(crate) fn reschedule_record(
    conn: &Connection,
    appointment_id: &str,
    new_time: &str,
    new_staff_id: Option<&str>,
) -> AppResult<AppointmentRecord> {
    let mut record = load_open(conn, appointment_id)?;
    let (start, end) = match (record.start_time.as_deref(), record.end_time.as_deref()) {
        (Some(start), Some(end)) => (
            schedule_utils::parse_datetime(start)?,
            schedule_utils::parse_datetime(end)?,
        ),
        _ => return Err(AppError::validation("appointment has no scheduled time")),
    };
    let duration = schedule_utils::duration_minutes(start, end)?;
    let new_start = schedule_utils::resolve_new_start(start, new_time)?;
    let new_end = schedule_utils::add_minutes(new_start, duration)?;

    if let Some(staff_id) = new_staff_id {
        let staff = assignable_staff(conn, staff_id, &record.salon_id, &record.service_id)?;
        record.staff_id = Some(staff.id);
    }

    record.start_time = Some(schedule_utils::format_datetime(new_start));
    record.end_time = Some(schedule_utils::format_datetime(new_end));
    record.status = AppointmentStatus::Rescheduled;
    record.updated_at = schedule_utils::now_rfc3339();
    store(conn, &record)?;
    Ok(record)
}

pub(crate) fn reassign_record(
    conn: &Connection,
    appointment_id: &str,
    new_staff_id: &str,
) -> AppResult<AppointmentRecord> {
    let mut record = load_open(conn, appointment_id)?;
    if record.staff_id.as_deref() == Some(new_staff_id) {
        return Err(AppError::validation(
            "appointment is already assigned to that staff member",
        ));
    }
    let staff = assignable_staff(conn, new_staff_id, &record.salon_id, &record.service_id)?;
    record.staff_id = Some(staff.id);
    record.updated_at = schedule_utils::now_rfc3339();
    store(conn, &record)?;
    Ok(record)
}

pub(crate) fn cancel_record(
    conn: &Connection,
    appointment_id: &str,
    reason: &str,
) -> AppResult<AppointmentRecord> {
    let reason = reason.trim();
    if reason.is_empty() {
        return Err(AppError::validation("a cancellation reason is required"));
    }
    let mut record = load_open(conn, appointment_id)?;
    record.status = AppointmentStatus::Cancelled;
    record.cancellation_reason = Some(reason.to_string());
    record.updated_at = schedule_utils::now_rfc3339();
    store(conn, &record)?;
    Ok(record)
}

/// Conflicts that involve the appointment, found by scanning its own interval
/// so bookings past midnight are seen too.
pub(crate) fn conflicts_involving(
    conn: &Connection,
    record: &AppointmentRecord,
) -> AppResult<Vec<ScheduleConflict>> {
    if !record.status.occupies_slot() {
        return Ok(Vec::new());
    }
    let (staff_id, start, end) = match (
        record.staff_id.as_deref(),
        record.start_time.as_deref(),
        record.end_time.as_deref(),
    ) {
        (Some(staff_id), Some(start), Some(end)) => (
            staff_id,
            schedule_utils::parse_datetime(start)?,
            schedule_utils::parse_datetime(end)?,
        ),
        _ => return Ok(Vec::new()),
    };
    if end <= start {
        return Ok(Vec::new());
    }

    let conflicts = conflict_detector::detect_in_connection(conn, staff_id, start, end)?;
    Ok(conflicts
        .into_iter()
        .filter(|conflict| conflict.involves(&record.id))
        .collect())
}
