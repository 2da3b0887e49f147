use std::collections::{BTreeMap, HashMap};

use chrono::{DateTime, FixedOffset, NaiveDate};
use chrono_tz::Tz;
use rusqlite::Connection;
use tracing::debug;

use crate::db::repositories::appointment_repository::AppointmentRepository;
use crate::db::repositories::salon_repository::SalonRepository;
use crate::db::repositories::staff_repository::StaffRepository;
use crate::db::repositories::time_off_repository::TimeOffRepository;
use crate::db::DbPool;
use crate::error::{AppError, AppResult};
use crate::models::appointment::{AppointmentRecord, AppointmentStatus};
use crate::models::salon::{SalonRecord, ServiceRecord};
use crate::models::schedule::{OptimizationMetrics, WorkingHours};
use crate::models::settings::SchedulingSettings;
use crate::models::staff::{StaffRecord, StaffScheduleRecord};
use crate::models::time_off::BlockedTimeRecord;
use crate::services::availability::{self, StaffDay};
use crate::services::conflict_detector::{self, TimedAppointment, TimedBlock};
use crate::services::schedule_utils;
use crate::services::session::{require_user, SharedSession};
use crate::services::settings_service::SettingsService;

/// Everything the metrics and optimizer passes need about one salon over an
/// inclusive date range, loaded once and evaluated in memory.
#[derive(Debug, Clone)]
pub struct SalonSnapshot {
    pub salon: SalonRecord,
    pub timezone: Tz,
    pub from: NaiveDate,
    pub to: NaiveDate,
    pub window_start: DateTime<FixedOffset>,
    pub window_end: DateTime<FixedOffset>,
    pub staff: Vec<StaffRecord>,
    pub schedules: HashMap<String, Vec<StaffScheduleRecord>>,
    pub services: HashMap<String, ServiceRecord>,
    pub appointments: Vec<TimedAppointment>,
    pub blocked: Vec<TimedBlock>,
    pub settings: SchedulingSettings,
}

impl SalonSnapshot {
    pub fn load(
        conn: &Connection,
        salon_id: &str,
        from: NaiveDate,
        to: NaiveDate,
        settings: SchedulingSettings,
    ) -> AppResult<Self> {
        let salon = SalonRepository::find_by_id(conn, salon_id)?
            .ok_or_else(AppError::not_found)?
            .into_record();
        let timezone = schedule_utils::parse_timezone(&salon.timezone)?;
        let (window_start, window_end) = schedule_utils::date_range_window(from, to, timezone)?;

        let staff = StaffRepository::list_by_salon(conn, salon_id)?;
        let mut schedules = HashMap::new();
        for member in &staff {
            let entries = StaffRepository::list_schedules(conn, &member.id)?
                .into_iter()
                .map(|row| row.into_record())
                .collect::<Vec<_>>();
            schedules.insert(member.id.clone(), entries);
        }

        let services = SalonRepository::list_services(conn, salon_id)?
            .into_iter()
            .map(|row| {
                let record = row.into_record();
                (record.id.clone(), record)
            })
            .collect();

        let records = AppointmentRepository::list_by_salon(conn, salon_id, false)?
            .into_iter()
            .map(|row| row.into_record())
            .collect::<AppResult<Vec<_>>>()?;
        let appointments = conflict_detector::timed_appointments(&records)
            .into_iter()
            .filter(|item| item.intersects(window_start, window_end))
            .collect();

        let blocked_records = TimeOffRepository::list_blocked_by_salon(conn, salon_id)?
            .into_iter()
            .map(|row| row.into_record())
            .collect::<AppResult<Vec<BlockedTimeRecord>>>()?;
        let blocked = conflict_detector::timed_blocks(&blocked_records)
            .into_iter()
            .filter(|block| {
                schedule_utils::intervals_overlap(block.start, block.end, window_start, window_end)
            })
            .collect();

        Ok(Self {
            salon,
            timezone,
            from,
            to,
            window_start,
            window_end,
            staff,
            schedules,
            services,
            appointments,
            blocked,
            settings,
        })
    }

    pub fn days(&self) -> i64 {
        (self.to - self.from).num_days() + 1
    }

    pub fn active_staff(&self) -> impl Iterator<Item = &StaffRecord> {
        self.staff.iter().filter(|member| member.is_active())
    }

    pub fn staff_member(&self, staff_id: &str) -> Option<&StaffRecord> {
        self.staff.iter().find(|member| member.id == staff_id)
    }

    pub fn appointment(&self, appointment_id: &str) -> Option<&TimedAppointment> {
        self.appointments.iter().find(|item| item.id() == appointment_id)
    }

    pub fn service_duration(&self, service_id: &str) -> Option<i64> {
        self.services
            .get(service_id)
            .map(|service| service.duration_minutes)
    }

    /// Bookable window and busy intervals of a staff member on a local date,
    /// or `None` when they do not work that day.
    pub fn staff_day(
        &self,
        staff_id: &str,
        date: NaiveDate,
        override_hours: Option<WorkingHours>,
    ) -> AppResult<Option<StaffDay>> {
        let schedules = self
            .schedules
            .get(staff_id)
            .map(Vec::as_slice)
            .unwrap_or(&[]);
        let hours = match availability::hours_for_day(date, schedules, &self.salon, override_hours)
        {
            Some(hours) => hours,
            None => return Ok(None),
        };
        let day_start = schedule_utils::local_midnight(date, self.timezone)?;
        let mut day = StaffDay::new(staff_id, day_start, hours);

        for item in self.appointments.iter().filter(|item| item.staff_id == staff_id) {
            day.occupy(item.id(), item.start, item.end);
        }
        for block in self
            .blocked
            .iter()
            .filter(|block| block.record.staff_id == staff_id)
        {
            day.occupy(block.record.id.as_str(), block.start, block.end);
        }
        Ok(Some(day))
    }

    pub fn local_date(&self, dt: DateTime<FixedOffset>) -> NaiveDate {
        schedule_utils::local_date_of(dt, self.timezone)
    }
}

/// Pure metrics over a snapshot, so hypothetical schedules can be scored.
pub fn compute_metrics(snapshot: &SalonSnapshot) -> OptimizationMetrics {
    let slot = snapshot.settings.slot_minutes.max(1) as f64;
    let days = snapshot.days().max(0);
    let active: Vec<&StaffRecord> = snapshot.active_staff().collect();
    let operating = snapshot.salon.operating_minutes() as i64;

    let capacity_minutes = active.len() as i64 * operating * days;
    let capacity_slots = capacity_minutes as f64 / slot;

    let mut booked_minutes = 0_i64;
    let mut booked_slots = 0.0_f64;
    let mut per_staff: BTreeMap<&str, i64> = active.iter().map(|m| (m.id.as_str(), 0)).collect();
    let mut timelines: BTreeMap<&str, Vec<&TimedAppointment>> = BTreeMap::new();
    let mut revenue = 0.0_f64;
    let mut ratings: Vec<f64> = Vec::new();

    for item in &snapshot.appointments {
        let minutes = item.duration_minutes();
        booked_minutes += minutes;
        booked_slots += (minutes as f64 / slot).ceil();
        if let Some(total) = per_staff.get_mut(item.staff_id.as_str()) {
            *total += minutes;
        }
        timelines.entry(item.staff_id.as_str()).or_default().push(item);

        if item.record.status != AppointmentStatus::NoShow {
            revenue += appointment_price(snapshot, &item.record);
        }
        if let Some(rating) = item.record.customer_rating {
            ratings.push(rating);
        }
    }

    let utilization_rate = if capacity_slots > 0.0 {
        booked_slots / capacity_slots
    } else {
        0.0
    };

    let mut total_wait = 0_i64;
    let mut counted = 0_usize;
    for items in timelines.values_mut() {
        items.sort_by(|a, b| a.start.cmp(&b.start).then_with(|| a.id().cmp(b.id())));
        let mut busy_until: Option<DateTime<FixedOffset>> = None;
        for item in items.iter() {
            if let Some(until) = busy_until {
                total_wait += (until - item.start).num_minutes().max(0);
            }
            busy_until = Some(match busy_until {
                Some(until) if until > item.end => until,
                _ => item.end,
            });
            counted += 1;
        }
    }
    let average_wait_minutes = if counted > 0 {
        total_wait as f64 / counted as f64
    } else {
        0.0
    };

    let workload_balance = balance_of(per_staff.values().copied());

    let conflict_count = snapshot
        .staff
        .iter()
        .map(|member| {
            conflict_detector::find_conflicts(&member.id, &snapshot.appointments, &snapshot.blocked)
                .len()
        })
        .sum();

    let satisfaction = if ratings.is_empty() {
        None
    } else {
        Some(ratings.iter().sum::<f64>() / ratings.len() as f64)
    };

    OptimizationMetrics {
        utilization_rate,
        average_wait_minutes,
        workload_balance,
        conflict_count,
        revenue,
        satisfaction,
        booked_minutes,
        capacity_minutes,
        active_staff_count: active.len(),
    }
}

fn appointment_price(snapshot: &SalonSnapshot, record: &AppointmentRecord) -> f64 {
    record
        .price
        .or_else(|| {
            snapshot
                .services
                .get(&record.service_id)
                .map(|service| service.price)
        })
        .unwrap_or(0.0)
}

/// `1 - coefficient of variation`, clamped to `[0, 1]`.
pub fn balance_of(loads: impl Iterator<Item = i64>) -> f64 {
    let loads: Vec<f64> = loads.map(|value| value as f64).collect();
    if loads.len() < 2 {
        return 1.0;
    }
    let mean = loads.iter().sum::<f64>() / loads.len() as f64;
    if mean <= 0.0 {
        return 1.0;
    }
    let variance = loads.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / loads.len() as f64;
    (1.0 - variance.sqrt() / mean).clamp(0.0, 1.0)
}

pub struct MetricsService {
    db: DbPool,
    session: SharedSession,
    settings: std::sync::Arc<SettingsService>,
}

impl MetricsService {
    pub fn new(
        db: DbPool,
        session: SharedSession,
        settings: std::sync::Arc<SettingsService>,
    ) -> Self {
        Self {
            db,
            session,
            settings,
        }
    }

    /// Metrics of a salon over an inclusive `YYYY-MM-DD` range.
    pub fn calculate(&self, salon_id: &str, from: &str, to: &str) -> AppResult<OptimizationMetrics> {
        require_user(self.session.as_ref())?;
        let snapshot = self.snapshot(salon_id, from, to)?;
        let metrics = compute_metrics(&snapshot);
        debug!(
            target: "app::schedule",
            salon_id,
            utilization = metrics.utilization_rate,
            conflicts = metrics.conflict_count,
            "metrics calculated"
        );
        Ok(metrics)
    }

    pub(crate) fn snapshot(&self, salon_id: &str, from: &str, to: &str) -> AppResult<SalonSnapshot> {
        let from = schedule_utils::parse_date(from)?;
        let to = schedule_utils::parse_date(to)?;
        schedule_utils::range_days(from, to)?;
        let settings = self.settings.current()?;
        self.db
            .with_connection(|conn| SalonSnapshot::load(conn, salon_id, from, to, settings))
    }
}
