use std::cmp::Ordering;
use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{DateTime, FixedOffset};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::error::{AppError, AppResult};
use crate::models::schedule::{
    ConflictType, ObjectiveWeights, OptimizationMetrics, OptimizationResult, ScheduleChange,
    ScheduleChangeType, ScheduleConflict, SchedulingCriteria, WorkingHours,
};
use crate::services::conflict_detector;
use crate::services::metrics_service::{compute_metrics, MetricsService, SalonSnapshot};
use crate::services::schedule_utils;
use crate::services::session::{require_user, SharedSession};

/// Knobs for a single optimizer pass.
#[derive(Debug, Clone, Copy)]
pub struct OptimizerBudget {
    pub deadline: Instant,
    pub max_suggestions: usize,
    pub minimum_break_minutes: i64,
}

#[derive(Debug, Clone)]
struct Candidate {
    change_type: ScheduleChangeType,
    appointment_id: String,
    staff_id: String,
    previous_staff_id: Option<String>,
    start: DateTime<FixedOffset>,
    end: DateTime<FixedOffset>,
    reason: String,
}

#[derive(Debug, Clone)]
struct RankedCandidate {
    candidate: Candidate,
    improvement: f64,
}

pub struct ScheduleOptimizer {
    session: SharedSession,
    metrics: Arc<MetricsService>,
}

impl ScheduleOptimizer {
    pub fn new(session: SharedSession, metrics: Arc<MetricsService>) -> Self {
        Self { session, metrics }
    }

    /// Suggests schedule changes for a salon over an inclusive date range.
    /// Failures, including a missing session, come back as `success = false`.
    pub fn optimize(
        &self,
        salon_id: &str,
        from: &str,
        to: &str,
        criteria: &SchedulingCriteria,
    ) -> OptimizationResult {
        let started = Instant::now();

        if let Err(err) = require_user(self.session.as_ref()) {
            return failed_result(OptimizationMetrics::default(), &err, started);
        }

        let snapshot = match self.metrics.snapshot(salon_id, from, to) {
            Ok(snapshot) => snapshot,
            Err(err) => {
                warn!(target: "app::optimizer", salon_id, error = %err, "failed to load schedule");
                return failed_result(OptimizationMetrics::default(), &err, started);
            }
        };

        let settings = &snapshot.settings;
        let budget = OptimizerBudget {
            deadline: started + Duration::from_millis(settings.optimizer_deadline_ms),
            max_suggestions: settings.max_suggestions,
            minimum_break_minutes: criteria
                .constraints
                .minimum_break_minutes
                .max(settings.minimum_break_minutes),
        };

        let result = optimize_snapshot(&snapshot, criteria, budget, started);
        info!(
            target: "app::optimizer",
            salon_id,
            success = result.success,
            suggestions = result.suggestions.len(),
            score = result.score,
            timed_out = result.timed_out,
            computation_ms = result.computation_ms,
            "optimization finished"
        );
        result
    }
}

/// Runs candidate generation and ranking over an already loaded snapshot.
pub fn optimize_snapshot(
    snapshot: &SalonSnapshot,
    criteria: &SchedulingCriteria,
    budget: OptimizerBudget,
    started: Instant,
) -> OptimizationResult {
    let baseline = compute_metrics(snapshot);
    let conflicts = salon_conflicts(snapshot);

    let mut timed_out = false;
    let candidates = match generate_candidates(snapshot, criteria, &conflicts, budget, &mut timed_out)
    {
        Ok(candidates) => candidates,
        Err(err) => return failed_result(baseline, &err, started),
    };

    let weights = criteria.objectives.normalized();
    let mut ranked = Vec::new();
    for candidate in candidates {
        if Instant::now() >= budget.deadline {
            timed_out = true;
            break;
        }
        let trial = apply_candidate(snapshot, &candidate);
        let improvement = improvement(&baseline, &compute_metrics(&trial), &weights);
        debug!(
            target: "app::optimizer",
            appointment_id = %candidate.appointment_id,
            staff_id = %candidate.staff_id,
            improvement,
            "candidate evaluated"
        );
        if improvement > 0.0 {
            ranked.push(RankedCandidate {
                candidate,
                improvement,
            });
        }
    }

    let suggestions =
        select_suggestions(snapshot, ranked, budget, criteria.constraints.working_hours);
    let score = suggestions
        .iter()
        .map(|change| change.estimated_improvement)
        .sum::<f64>()
        .clamp(0.0, 100.0);

    if timed_out {
        warn!(
            target: "app::optimizer",
            kept = suggestions.len(),
            "optimizer deadline reached, returning partial ranking"
        );
    }

    OptimizationResult {
        success: true,
        metrics: baseline,
        conflicts,
        suggestions,
        score,
        computation_ms: elapsed_ms(started),
        timed_out,
        error: None,
    }
}

fn salon_conflicts(snapshot: &SalonSnapshot) -> Vec<ScheduleConflict> {
    snapshot
        .staff
        .iter()
        .flat_map(|member| {
            conflict_detector::find_conflicts(&member.id, &snapshot.appointments, &snapshot.blocked)
        })
        .collect()
}

fn generate_candidates(
    snapshot: &SalonSnapshot,
    criteria: &SchedulingCriteria,
    conflicts: &[ScheduleConflict],
    budget: OptimizerBudget,
    timed_out: &mut bool,
) -> AppResult<Vec<Candidate>> {
    let override_hours = criteria.constraints.working_hours;
    let min_break = budget.minimum_break_minutes;
    let mut candidates = Vec::new();
    let mut seen: HashSet<&str> = HashSet::new();

    for conflict in conflicts
        .iter()
        .filter(|conflict| conflict.conflict_type == ConflictType::AppointmentOverlap)
    {
        if Instant::now() >= budget.deadline {
            *timed_out = true;
            return Ok(candidates);
        }
        // The later-starting appointment of the pair is the one that moves.
        let target_id = match conflict.entity_ids.get(1) {
            Some(id) => id.as_str(),
            None => continue,
        };
        if !seen.insert(target_id) {
            continue;
        }
        let item = match snapshot.appointment(target_id) {
            Some(item) if item.record.status.is_open() => item,
            _ => continue,
        };
        let date = snapshot.local_date(item.start);
        let duration = item.duration_minutes();

        if let Some(day) = snapshot.staff_day(&item.staff_id, date, override_hours)? {
            if let Some(start) = day.earliest_fit(day.window_start, duration, min_break, Some(item.id()))
            {
                if start != item.start {
                    let end = schedule_utils::add_minutes(start, duration)?;
                    candidates.push(Candidate {
                        change_type: ScheduleChangeType::MoveAppointment,
                        appointment_id: item.id().to_string(),
                        staff_id: item.staff_id.clone(),
                        previous_staff_id: None,
                        start,
                        end,
                        reason: format!(
                            "move to the earliest free slot to clear conflict {}",
                            conflict.id
                        ),
                    });
                }
            }
        }

        for member in snapshot.active_staff() {
            if member.id == item.staff_id || !member.can_perform(&item.record.service_id) {
                continue;
            }
            let Some(day) = snapshot.staff_day(&member.id, date, override_hours)? else {
                continue;
            };
            if day.fits(item.start, item.end, min_break, None) {
                candidates.push(Candidate {
                    change_type: ScheduleChangeType::ReassignStaff,
                    appointment_id: item.id().to_string(),
                    staff_id: member.id.clone(),
                    previous_staff_id: Some(item.staff_id.clone()),
                    start: item.start,
                    end: item.end,
                    reason: format!(
                        "hand over to {} at the same time to clear conflict {}",
                        member.display_name, conflict.id
                    ),
                });
            }
        }
    }

    if Instant::now() >= budget.deadline {
        *timed_out = true;
        return Ok(candidates);
    }
    candidates.extend(balance_candidates(snapshot, override_hours, min_break)?);
    Ok(candidates)
}

/// Reassignments from the most to the least loaded active staff member.
fn balance_candidates(
    snapshot: &SalonSnapshot,
    override_hours: Option<WorkingHours>,
    min_break: i64,
) -> AppResult<Vec<Candidate>> {
    let mut loads: BTreeMap<&str, i64> = snapshot
        .active_staff()
        .map(|member| (member.id.as_str(), 0))
        .collect();
    for item in &snapshot.appointments {
        if let Some(total) = loads.get_mut(item.staff_id.as_str()) {
            *total += item.duration_minutes();
        }
    }
    if loads.len() < 2 {
        return Ok(Vec::new());
    }

    let busiest = loads
        .iter()
        .max_by(|a, b| a.1.cmp(b.1).then_with(|| b.0.cmp(a.0)))
        .map(|(id, load)| (*id, *load));
    let quietest = loads
        .iter()
        .min_by(|a, b| a.1.cmp(b.1).then_with(|| a.0.cmp(b.0)))
        .map(|(id, load)| (*id, *load));
    let (Some((busiest, high)), Some((quietest, low))) = (busiest, quietest) else {
        return Ok(Vec::new());
    };
    if busiest == quietest || high <= low {
        return Ok(Vec::new());
    }
    let Some(receiver) = snapshot.staff_member(quietest) else {
        return Ok(Vec::new());
    };

    let mut movable: Vec<_> = snapshot
        .appointments
        .iter()
        .filter(|item| item.staff_id == busiest && item.record.status.is_open())
        .filter(|item| receiver.can_perform(&item.record.service_id))
        .collect();
    movable.sort_by(|a, b| a.start.cmp(&b.start).then_with(|| a.id().cmp(b.id())));

    let mut candidates = Vec::new();
    for item in movable {
        let date = snapshot.local_date(item.start);
        let Some(day) = snapshot.staff_day(quietest, date, override_hours)? else {
            continue;
        };
        if day.fits(item.start, item.end, min_break, None) {
            candidates.push(Candidate {
                change_type: ScheduleChangeType::ReassignStaff,
                appointment_id: item.id().to_string(),
                staff_id: quietest.to_string(),
                previous_staff_id: Some(busiest.to_string()),
                start: item.start,
                end: item.end,
                reason: format!(
                    "shift work from {} to {} to balance workload",
                    busiest, receiver.display_name
                ),
            });
        }
    }
    Ok(candidates)
}

fn apply_candidate(snapshot: &SalonSnapshot, candidate: &Candidate) -> SalonSnapshot {
    let mut trial = snapshot.clone();
    if let Some(item) = trial
        .appointments
        .iter_mut()
        .find(|item| item.id() == candidate.appointment_id)
    {
        item.staff_id = candidate.staff_id.clone();
        item.start = candidate.start;
        item.end = candidate.end;
        item.record.staff_id = Some(candidate.staff_id.clone());
        item.record.start_time = Some(schedule_utils::format_datetime(candidate.start));
        item.record.end_time = Some(schedule_utils::format_datetime(candidate.end));
    }
    trial
}

/// Weighted sum of per-objective deltas, each expressed in points.
pub fn improvement(
    before: &OptimizationMetrics,
    after: &OptimizationMetrics,
    weights: &ObjectiveWeights,
) -> f64 {
    let utilization = (after.utilization_rate - before.utilization_rate) * 100.0;
    let wait = before.average_wait_minutes - after.average_wait_minutes;
    let revenue = if before.revenue > 0.0 {
        (after.revenue - before.revenue) / before.revenue * 100.0
    } else {
        0.0
    };
    let balance = (after.workload_balance - before.workload_balance) * 100.0;

    weights.maximize_utilization * utilization
        + weights.minimize_wait_time * wait
        + weights.maximize_revenue * revenue
        + weights.balance_workload * balance
}

/// Picks the best change per appointment in ranking order. A change is only
/// kept when it still fits on top of the changes already kept.
fn select_suggestions(
    snapshot: &SalonSnapshot,
    mut ranked: Vec<RankedCandidate>,
    budget: OptimizerBudget,
    override_hours: Option<WorkingHours>,
) -> Vec<ScheduleChange> {
    ranked.sort_by(|a, b| {
        b.improvement
            .partial_cmp(&a.improvement)
            .unwrap_or(Ordering::Equal)
            .then_with(|| a.candidate.appointment_id.cmp(&b.candidate.appointment_id))
            .then_with(|| a.candidate.staff_id.cmp(&b.candidate.staff_id))
    });

    let mut working = snapshot.clone();
    let mut kept_targets: HashSet<String> = HashSet::new();
    let mut suggestions = Vec::new();
    for entry in ranked {
        if suggestions.len() >= budget.max_suggestions {
            break;
        }
        let candidate = entry.candidate;
        if kept_targets.contains(&candidate.appointment_id) {
            continue;
        }
        let date = working.local_date(candidate.start);
        let still_fits = match working.staff_day(&candidate.staff_id, date, override_hours) {
            Ok(Some(day)) => day.fits(
                candidate.start,
                candidate.end,
                budget.minimum_break_minutes,
                Some(candidate.appointment_id.as_str()),
            ),
            _ => false,
        };
        if !still_fits {
            continue;
        }
        working = apply_candidate(&working, &candidate);
        kept_targets.insert(candidate.appointment_id.clone());
        suggestions.push(ScheduleChange {
            id: Uuid::new_v4().to_string(),
            change_type: candidate.change_type,
            target_id: candidate.appointment_id,
            staff_id: candidate.staff_id,
            previous_staff_id: candidate.previous_staff_id,
            start_time: schedule_utils::format_datetime(candidate.start),
            end_time: schedule_utils::format_datetime(candidate.end),
            estimated_improvement: entry.improvement,
            reason: candidate.reason,
        });
    }
    suggestions
}

fn failed_result(
    metrics: OptimizationMetrics,
    err: &AppError,
    started: Instant,
) -> OptimizationResult {
    OptimizationResult {
        success: false,
        metrics,
        conflicts: Vec::new(),
        suggestions: Vec::new(),
        score: 0.0,
        computation_ms: elapsed_ms(started),
        timed_out: false,
        error: Some(err.to_string()),
    }
}

fn elapsed_ms(started: Instant) -> u64 {
    u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX)
}
