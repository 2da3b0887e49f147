use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use chrono::{DateTime, FixedOffset, NaiveDate};
use tracing::{info, warn};
use uuid::Uuid;

use crate::db::repositories::appointment_repository::{AppointmentRepository, AppointmentRow};
use crate::db::DbPool;
use crate::error::{AppError, AppResult};
use crate::models::appointment::{AppointmentRecord, AppointmentStatus};
use crate::models::schedule::{
    AssignmentOutcome, PendingAppointment, ScheduleChange, ScheduleChangeType,
    SchedulingCriteria,
};
use crate::services::metrics_service::{MetricsService, SalonSnapshot};
use crate::services::schedule_utils;
use crate::services::session::{require_user, SharedSession};

/// Interval handed out earlier in the same batch.
#[derive(Debug, Clone)]
struct BatchBooking {
    staff_id: String,
    pending_id: String,
    start: DateTime<FixedOffset>,
    end: DateTime<FixedOffset>,
}

#[derive(Debug, Clone)]
struct Placement {
    staff_id: String,
    start: DateTime<FixedOffset>,
    end: DateTime<FixedOffset>,
    projected_wait: i64,
    booked_minutes: i64,
}

/// Processing order: priority descending, then flexibility ascending. The sort
/// is stable, so remaining ties keep their input order.
pub fn order_pending(pending: &[PendingAppointment]) -> Vec<PendingAppointment> {
    let mut ordered = pending.to_vec();
    ordered.sort_by(|a, b| {
        b.priority
            .cmp(&a.priority)
            .then_with(|| a.flexibility.cmp(&b.flexibility))
    });
    ordered
}

pub struct AutoAssignmentEngine {
    db: DbPool,
    session: SharedSession,
    metrics: Arc<MetricsService>,
}

impl AutoAssignmentEngine {
    pub fn new(db: DbPool, session: SharedSession, metrics: Arc<MetricsService>) -> Self {
        Self {
            db,
            session,
            metrics,
        }
    }

    /// Proposes a staff member and start for each pending appointment without
    /// writing anything.
    pub fn plan(
        &self,
        pending: &[PendingAppointment],
        criteria: &SchedulingCriteria,
    ) -> AppResult<AssignmentOutcome> {
        require_user(self.session.as_ref())?;
        Ok(self.run(pending, criteria, false))
    }

    /// Plans and stores every successful placement as a confirmed appointment.
    /// The change id of each assignment is the id of the created appointment.
    pub fn assign(
        &self,
        pending: &[PendingAppointment],
        criteria: &SchedulingCriteria,
    ) -> AppResult<AssignmentOutcome> {
        require_user(self.session.as_ref())?;
        Ok(self.run(pending, criteria, true))
    }

    fn run(
        &self,
        pending: &[PendingAppointment],
        criteria: &SchedulingCriteria,
        persist: bool,
    ) -> AssignmentOutcome {
        let mut outcome = AssignmentOutcome::default();
        let mut snapshots: HashMap<(String, NaiveDate), SalonSnapshot> = HashMap::new();
        let mut batch: Vec<BatchBooking> = Vec::new();

        for item in order_pending(pending) {
            let result = self
                .place(&item, criteria, &mut snapshots, &batch)
                .and_then(|placement| {
                    let change = to_change(&item, &placement);
                    if persist {
                        self.persist(&item, &placement, &change.id)?;
                    }
                    Ok((placement, change))
                });

            match result {
                Ok((placement, change)) => {
                    batch.push(BatchBooking {
                        staff_id: placement.staff_id,
                        pending_id: item.id.clone(),
                        start: placement.start,
                        end: placement.end,
                    });
                    outcome.assigned.push(change);
                }
                Err(err) => {
                    warn!(
                        target: "app::assignment",
                        pending_id = %item.id,
                        error = %err,
                        "pending appointment could not be assigned"
                    );
                    outcome.failure_reasons.insert(item.id.clone(), err.to_string());
                    outcome.failed.push(item);
                }
            }
        }

        info!(
            target: "app::assignment",
            assigned = outcome.assigned.len(),
            failed = outcome.failed.len(),
            persisted = persist,
            "assignment batch finished"
        );
        outcome
    }

    fn place(
        &self,
        item: &PendingAppointment,
        criteria: &SchedulingCriteria,
        snapshots: &mut HashMap<(String, NaiveDate), SalonSnapshot>,
        batch: &[BatchBooking],
    ) -> AppResult<Placement> {
        let requested = schedule_utils::parse_datetime(&item.requested_start)?;

        // The salon's timezone is needed to know which local day to load.
        let snapshot_key = (item.salon_id.clone(), requested.date_naive());
        if !snapshots.contains_key(&snapshot_key) {
            let snapshot = self.load_day(&item.salon_id, requested.date_naive())?;
            snapshots.insert(snapshot_key.clone(), snapshot);
        }
        let local_day = snapshots
            .get(&snapshot_key)
            .map(|snapshot| snapshot.local_date(requested))
            .ok_or_else(AppError::not_found)?;
        let key = (item.salon_id.clone(), local_day);
        if !snapshots.contains_key(&key) {
            let snapshot = self.load_day(&item.salon_id, local_day)?;
            snapshots.insert(key.clone(), snapshot);
        }
        let snapshot = snapshots.get(&key).ok_or_else(AppError::not_found)?;

        choose_placement(snapshot, item, requested, criteria, batch)
    }

    fn load_day(&self, salon_id: &str, date: NaiveDate) -> AppResult<SalonSnapshot> {
        let day = date.format("%Y-%m-%d").to_string();
        self.metrics.snapshot(salon_id, &day, &day)
    }

    fn persist(
        &self,
        item: &PendingAppointment,
        placement: &Placement,
        appointment_id: &str,
    ) -> AppResult<()> {
        let now = schedule_utils::now_rfc3339();
        let record = AppointmentRecord {
            id: appointment_id.to_string(),
            salon_id: item.salon_id.clone(),
            staff_id: Some(placement.staff_id.clone()),
            customer_id: item.customer_id.clone(),
            service_id: item.service_id.clone(),
            start_time: Some(schedule_utils::format_datetime(placement.start)),
            end_time: Some(schedule_utils::format_datetime(placement.end)),
            status: AppointmentStatus::Confirmed,
            cancellation_reason: None,
            price: None,
            customer_rating: None,
            created_at: now.clone(),
            updated_at: now,
        };
        self.db
            .with_transaction(|tx| AppointmentRepository::insert(tx, &AppointmentRow::from_record(&record)))
            .map_err(|err| AppError::persistence("insert appointment", err))
    }
}

/// Greedy choice of the staff member with the smallest projected wait.
fn choose_placement(
    snapshot: &SalonSnapshot,
    item: &PendingAppointment,
    requested: DateTime<FixedOffset>,
    criteria: &SchedulingCriteria,
    batch: &[BatchBooking],
) -> AppResult<Placement> {
    let duration = match item.duration_minutes {
        Some(minutes) if minutes > 0 => minutes,
        Some(_) => return Err(AppError::validation("duration must be positive")),
        None => snapshot.service_duration(&item.service_id).ok_or_else(|| {
            AppError::validation(format!("unknown service {}", item.service_id))
        })?,
    };
    let date = snapshot.local_date(requested);
    let min_break = criteria
        .constraints
        .minimum_break_minutes
        .max(snapshot.settings.minimum_break_minutes);
    let max_delay = item.flexibility.max_delay_minutes();

    let restrict_to = match (&item.preferred_staff_id, item.flexibility) {
        (Some(preferred), crate::models::schedule::Flexibility::None) => Some(preferred.as_str()),
        _ => None,
    };

    let mut best: Option<Placement> = None;
    for member in snapshot.active_staff() {
        if !member.can_perform(&item.service_id) {
            continue;
        }
        if restrict_to.is_some_and(|preferred| preferred != member.id) {
            continue;
        }
        let Some(mut day) =
            snapshot.staff_day(&member.id, date, criteria.constraints.working_hours)?
        else {
            continue;
        };
        for booking in batch.iter().filter(|booking| booking.staff_id == member.id) {
            day.occupy(booking.pending_id.as_str(), booking.start, booking.end);
        }

        let Some(start) = day.earliest_fit(requested, duration, min_break, None) else {
            continue;
        };
        let delay = (start - requested).num_minutes();
        if max_delay.is_some_and(|limit| delay > limit) {
            continue;
        }

        let is_booking = |entity: &str| {
            snapshot.appointment(entity).is_some() || batch.iter().any(|b| b.pending_id == entity)
        };
        let placement = Placement {
            staff_id: member.id.clone(),
            start,
            end: schedule_utils::add_minutes(start, duration)?,
            projected_wait: delay + duration,
            booked_minutes: day.occupied_minutes(is_booking),
        };

        let better = match &best {
            None => true,
            Some(current) => {
                (placement.projected_wait, placement.booked_minutes, &placement.staff_id)
                    < (current.projected_wait, current.booked_minutes, &current.staff_id)
            }
        };
        if better {
            best = Some(placement);
        }
    }

    best.ok_or_else(|| {
        AppError::conflict(format!(
            "no available staff within {} flexibility",
            flexibility_label(item)
        ))
    })
}

fn flexibility_label(item: &PendingAppointment) -> &'static str {
    use crate::models::schedule::Flexibility;
    match item.flexibility {
        Flexibility::None => "none",
        Flexibility::Low => "low",
        Flexibility::Medium => "medium",
        Flexibility::High => "high",
    }
}

fn to_change(item: &PendingAppointment, placement: &Placement) -> ScheduleChange {
    ScheduleChange {
        id: Uuid::new_v4().to_string(),
        change_type: ScheduleChangeType::AssignAppointment,
        target_id: item.id.clone(),
        staff_id: placement.staff_id.clone(),
        previous_staff_id: None,
        start_time: schedule_utils::format_datetime(placement.start),
        end_time: schedule_utils::format_datetime(placement.end),
        estimated_improvement: -(placement.projected_wait as f64),
        reason: format!(
            "projected wait {} minutes (priority {})",
            placement.projected_wait, item.priority
        ),
    }
}

/// Per-staff booked minutes inside a set of changes; handy for reporting.
pub fn assigned_minutes(changes: &[ScheduleChange]) -> BTreeMap<String, i64> {
    let mut totals = BTreeMap::new();
    for change in changes {
        let minutes = match (
            schedule_utils::parse_datetime(&change.start_time),
            schedule_utils::parse_datetime(&change.end_time),
        ) {
            (Ok(start), Ok(end)) => (end - start).num_minutes(),
            _ => 0,
        };
        *totals.entry(change.staff_id.clone()).or_insert(0) += minutes;
    }
    totals
}
