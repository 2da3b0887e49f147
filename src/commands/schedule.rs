use serde::Deserialize;

use crate::models::schedule::{
    AssignmentOutcome, ConflictResolution, OptimizationMetrics, OptimizationResult,
    PendingAppointment, ResolutionOutcome, ScheduleConflict, SchedulingCriteria,
};

use super::{run_blocking, AppState, CommandResult};

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SalonRangePayload {
    pub salon_id: String,
    /// Inclusive `YYYY-MM-DD` range in the salon's timezone.
    pub from: String,
    pub to: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StaffDayPayload {
    pub staff_id: String,
    pub date: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StaffRangePayload {
    pub staff_id: String,
    /// RFC 3339 instants, `start` inclusive and `end` exclusive.
    pub start: String,
    pub end: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResolveConflictPayload {
    pub conflict_id: String,
    pub resolution: ConflictResolution,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OptimizePayload {
    #[serde(flatten)]
    pub range: SalonRangePayload,
    #[serde(default)]
    pub criteria: SchedulingCriteria,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AssignPayload {
    pub pending: Vec<PendingAppointment>,
    #[serde(default)]
    pub criteria: SchedulingCriteria,
}

pub async fn schedule_conflicts_for_day(
    state: &AppState,
    payload: StaffDayPayload,
) -> CommandResult<Vec<ScheduleConflict>> {
    let app_state = state.clone();
    run_blocking(move || {
        app_state
            .conflicts()
            .detect_for_day(&payload.staff_id, &payload.date)
    })
    .await
}

pub async fn schedule_conflicts_for_range(
    state: &AppState,
    payload: StaffRangePayload,
) -> CommandResult<Vec<ScheduleConflict>> {
    let app_state = state.clone();
    run_blocking(move || {
        app_state
            .conflicts()
            .detect_for_range(&payload.staff_id, &payload.start, &payload.end)
    })
    .await
}

pub async fn schedule_conflicts_for_salon(
    state: &AppState,
    payload: SalonRangePayload,
) -> CommandResult<Vec<ScheduleConflict>> {
    let app_state = state.clone();
    run_blocking(move || {
        app_state
            .conflicts()
            .detect_for_salon(&payload.salon_id, &payload.from, &payload.to)
    })
    .await
}

pub async fn schedule_resolve_conflict(
    state: &AppState,
    payload: ResolveConflictPayload,
) -> CommandResult<ResolutionOutcome> {
    let app_state = state.clone();
    run_blocking(move || {
        app_state
            .resolver()
            .resolve(&payload.conflict_id, payload.resolution)
    })
    .await
}

pub async fn schedule_metrics(
    state: &AppState,
    payload: SalonRangePayload,
) -> CommandResult<OptimizationMetrics> {
    let app_state = state.clone();
    run_blocking(move || {
        app_state
            .metrics()
            .calculate(&payload.salon_id, &payload.from, &payload.to)
    })
    .await
}

pub async fn schedule_optimize(
    state: &AppState,
    payload: OptimizePayload,
) -> CommandResult<OptimizationResult> {
    let app_state = state.clone();
    run_blocking(move || {
        let range = payload.range;
        Ok(app_state
            .optimizer()
            .optimize(&range.salon_id, &range.from, &range.to, &payload.criteria))
    })
    .await
}

pub async fn schedule_plan_assignments(
    state: &AppState,
    payload: AssignPayload,
) -> CommandResult<AssignmentOutcome> {
    let app_state = state.clone();
    run_blocking(move || app_state.assignment().plan(&payload.pending, &payload.criteria)).await
}

pub async fn schedule_auto_assign(
    state: &AppState,
    payload: AssignPayload,
) -> CommandResult<AssignmentOutcome> {
    let app_state = state.clone();
    run_blocking(move || app_state.assignment().assign(&payload.pending, &payload.criteria)).await
}
