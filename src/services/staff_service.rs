use rusqlite::Connection;
use tracing::{debug, info};
use uuid::Uuid;

use crate::db::repositories::salon_repository::SalonRepository;
use crate::db::repositories::staff_repository::{StaffRepository, StaffRow, StaffScheduleRow};
use crate::db::DbPool;
use crate::error::{AppError, AppResult};
use crate::models::staff::{
    StaffCreateInput, StaffRecord, StaffScheduleInput, StaffScheduleRecord, StaffStatus,
};
use crate::services::schedule_utils;
use crate::services::session::{require_user, SharedSession};

const MINUTES_PER_DAY: u32 = 24 * 60;

#[derive(Clone)]
pub struct StaffService {
    db: DbPool,
    session: SharedSession,
}

impl StaffService {
    pub fn new(db: DbPool, session: SharedSession) -> Self {
        Self { db, session }
    }

    pub fn create(&self, input: StaffCreateInput) -> AppResult<StaffRecord> {
        require_user(self.session.as_ref())?;
        let display_name = input.display_name.trim().to_string();
        if display_name.is_empty() {
            return Err(AppError::validation("staff display name is required"));
        }
        let mut service_ids = input.service_ids.clone();
        service_ids.sort();
        service_ids.dedup();

        let now = schedule_utils::now_rfc3339();
        let record = StaffRecord {
            id: Uuid::new_v4().to_string(),
            salon_id: input.salon_id.clone(),
            display_name,
            email: input
                .email
                .map(|email| email.trim().to_string())
                .filter(|email| !email.is_empty()),
            status: StaffStatus::Active,
            service_ids,
            created_at: now.clone(),
            updated_at: now,
        };

        self.db.with_transaction(|tx| {
            ensure_services_belong(tx, &record.salon_id, &record.service_ids)?;
            StaffRepository::insert(tx, &StaffRow::from_record(&record), &record.service_ids)
                .map_err(|err| AppError::persistence("insert staff", err))
        })?;
        info!(target: "app::schedule", staff_id = %record.id, salon_id = %record.salon_id, "staff member created");
        Ok(record)
    }

    pub fn get(&self, id: &str) -> AppResult<Option<StaffRecord>> {
        require_user(self.session.as_ref())?;
        self.db
            .with_connection(|conn| StaffRepository::find_by_id(conn, id))
    }

    pub fn list(&self, salon_id: &str) -> AppResult<Vec<StaffRecord>> {
        require_user(self.session.as_ref())?;
        let staff = self
            .db
            .with_connection(|conn| StaffRepository::list_by_salon(conn, salon_id))?;
        debug!(target: "app::schedule", salon_id, count = staff.len(), "staff listed");
        Ok(staff)
    }

    pub fn set_status(&self, id: &str, status: StaffStatus) -> AppResult<StaffRecord> {
        require_user(self.session.as_ref())?;
        let now = schedule_utils::now_rfc3339();
        let record = self.db.with_transaction(|tx| {
            StaffRepository::update_status(tx, id, status, &now)?;
            StaffRepository::find_by_id(tx, id)?.ok_or_else(AppError::not_found)
        })?;
        info!(target: "app::schedule", staff_id = id, status = %status, "staff status changed");
        Ok(record)
    }

    pub fn deactivate(&self, id: &str) -> AppResult<StaffRecord> {
        self.set_status(id, StaffStatus::Inactive)
    }

    /// Replaces the services a staff member can perform.
    pub fn set_services(&self, id: &str, service_ids: Vec<String>) -> AppResult<StaffRecord> {
        require_user(self.session.as_ref())?;
        let mut service_ids = service_ids;
        service_ids.sort();
        service_ids.dedup();
        self.db.with_transaction(|tx| {
            let staff = StaffRepository::find_by_id(tx, id)?.ok_or_else(AppError::not_found)?;
            ensure_services_belong(tx, &staff.salon_id, &service_ids)?;
            StaffRepository::replace_services(tx, id, &service_ids)?;
            StaffRepository::find_by_id(tx, id)?.ok_or_else(AppError::not_found)
        })
    }

    /// Adds a recurring schedule entry. Existing entries for the same staff
    /// member and weekday whose effective ranges overlap are removed.
    pub fn upsert_schedule(&self, input: StaffScheduleInput) -> AppResult<StaffScheduleRecord> {
        require_user(self.session.as_ref())?;
        validate_schedule(&input)?;

        let now = schedule_utils::now_rfc3339();
        let record = StaffScheduleRecord {
            id: Uuid::new_v4().to_string(),
            staff_id: input.staff_id.clone(),
            day_of_week: input.day_of_week,
            start_minute: input.start_minute,
            end_minute: input.end_minute,
            break_start_minute: input.break_start_minute,
            break_end_minute: input.break_end_minute,
            effective_from: input.effective_from.clone(),
            effective_until: input.effective_until.clone(),
            is_available: input.is_available,
            created_at: now.clone(),
            updated_at: now,
        };

        let superseded = self.db.with_transaction(|tx| {
            StaffRepository::find_by_id(tx, &record.staff_id)?
                .ok_or_else(|| AppError::validation(format!("unknown staff member {}", record.staff_id)))?;
            let existing =
                StaffRepository::list_schedules_for_day(tx, &record.staff_id, record.day_of_week)?;
            let mut removed = 0usize;
            for row in existing {
                let entry = row.into_record();
                if effective_ranges_overlap(&entry, &record)? {
                    StaffRepository::delete_schedule(tx, &entry.id)?;
                    removed += 1;
                }
            }
            StaffRepository::insert_schedule(tx, &StaffScheduleRow::from_record(&record))
                .map_err(|err| AppError::persistence("insert staff schedule", err))?;
            Ok(removed)
        })?;

        info!(
            target: "app::schedule",
            staff_id = %record.staff_id,
            day_of_week = record.day_of_week,
            superseded,
            "staff schedule stored"
        );
        Ok(record)
    }

    pub fn list_schedules(&self, staff_id: &str) -> AppResult<Vec<StaffScheduleRecord>> {
        require_user(self.session.as_ref())?;
        let rows = self
            .db
            .with_connection(|conn| StaffRepository::list_schedules(conn, staff_id))?;
        Ok(rows.into_iter().map(|row| row.into_record()).collect())
    }
}

fn ensure_services_belong(conn: &Connection, salon_id: &str, service_ids: &[String]) -> AppResult<()> {
    SalonRepository::find_by_id(conn, salon_id)?
        .ok_or_else(|| AppError::validation(format!("unknown salon {salon_id}")))?;
    for service_id in service_ids {
        let belongs = SalonRepository::find_service(conn, service_id)?
            .map(|row| row.salon_id == salon_id)
            .unwrap_or(false);
        if !belongs {
            return Err(AppError::validation(format!(
                "service {service_id} is not offered by salon {salon_id}"
            )));
        }
    }
    Ok(())
}

fn validate_schedule(input: &StaffScheduleInput) -> AppResult<()> {
    if input.day_of_week > 6 {
        return Err(AppError::validation("day of week must be between 0 and 6"));
    }
    if input.start_minute >= input.end_minute || input.end_minute > MINUTES_PER_DAY {
        return Err(AppError::validation("schedule hours must be a non-empty range within one day"));
    }
    match (input.break_start_minute, input.break_end_minute) {
        (None, None) => {}
        (Some(start), Some(end))
            if start < end && start >= input.start_minute && end <= input.end_minute => {}
        _ => {
            return Err(AppError::validation(
                "break must have both ends and lie inside the working hours",
            ))
        }
    }
    let from = input
        .effective_from
        .as_deref()
        .map(schedule_utils::parse_date)
        .transpose()?;
    let until = input
        .effective_until
        .as_deref()
        .map(schedule_utils::parse_date)
        .transpose()?;
    if let (Some(from), Some(until)) = (from, until) {
        if until < from {
            return Err(AppError::validation("effective range ends before it starts"));
        }
    }
    Ok(())
}

/// Open-ended bounds extend to infinity on that side.
fn effective_ranges_overlap(a: &StaffScheduleRecord, b: &StaffScheduleRecord) -> AppResult<bool> {
    let bound = |value: &Option<String>| {
        value
            .as_deref()
            .map(schedule_utils::parse_date)
            .transpose()
    };
    let (a_from, a_until) = (bound(&a.effective_from)?, bound(&a.effective_until)?);
    let (b_from, b_until) = (bound(&b.effective_from)?, bound(&b.effective_until)?);

    let a_starts_before_b_ends = match (a_from, b_until) {
        (Some(from), Some(until)) => from <= until,
        _ => true,
    };
    let b_starts_before_a_ends = match (b_from, a_until) {
        (Some(from), Some(until)) => from <= until,
        _ => true,
    };
    Ok(a_starts_before_b_ends && b_starts_before_a_ends)
}
