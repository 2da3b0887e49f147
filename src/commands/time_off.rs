use serde::Deserialize;

use crate::models::time_off::{
    BlockedTimeChange, BlockedTimeCreateInput, BlockedTimeRecord, TimeOffDecision,
    TimeOffRequestInput, TimeOffRequestRecord, TimeOffStatus,
};

use super::{run_blocking, AppState, CommandResult};

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReviewPayload {
    pub request_id: String,
    #[serde(default)]
    pub note: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TimeOffListPayload {
    pub staff_id: String,
    #[serde(default)]
    pub status: Option<TimeOffStatus>,
}

pub async fn time_off_submit(
    state: &AppState,
    payload: TimeOffRequestInput,
) -> CommandResult<TimeOffRequestRecord> {
    let app_state = state.clone();
    run_blocking(move || app_state.time_off().submit(payload)).await
}

pub async fn time_off_approve(
    state: &AppState,
    payload: ReviewPayload,
) -> CommandResult<TimeOffDecision> {
    let app_state = state.clone();
    run_blocking(move || app_state.time_off().approve(&payload.request_id, payload.note)).await
}

pub async fn time_off_reject(
    state: &AppState,
    payload: ReviewPayload,
) -> CommandResult<TimeOffRequestRecord> {
    let app_state = state.clone();
    run_blocking(move || app_state.time_off().reject(&payload.request_id, payload.note)).await
}

pub async fn time_off_cancel(
    state: &AppState,
    request_id: String,
) -> CommandResult<TimeOffRequestRecord> {
    let app_state = state.clone();
    run_blocking(move || app_state.time_off().cancel(&request_id)).await
}

pub async fn time_off_list(
    state: &AppState,
    payload: TimeOffListPayload,
) -> CommandResult<Vec<TimeOffRequestRecord>> {
    let app_state = state.clone();
    run_blocking(move || {
        app_state
            .time_off()
            .list_requests(&payload.staff_id, payload.status)
    })
    .await
}

pub async fn blocked_time_create(
    state: &AppState,
    payload: BlockedTimeCreateInput,
) -> CommandResult<BlockedTimeChange> {
    let app_state = state.clone();
    run_blocking(move || app_state.time_off().create_blocked_time(payload)).await
}

pub async fn blocked_time_list(
    state: &AppState,
    staff_id: String,
) -> CommandResult<Vec<BlockedTimeRecord>> {
    let app_state = state.clone();
    run_blocking(move || app_state.time_off().list_blocked_time(&staff_id)).await
}

pub async fn blocked_time_delete(state: &AppState, blocked_time_id: String) -> CommandResult<()> {
    let app_state = state.clone();
    run_blocking(move || app_state.time_off().delete_blocked_time(&blocked_time_id)).await
}
