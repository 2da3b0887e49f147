use serde::Deserialize;

use crate::models::appointment::{AppointmentCreateInput, AppointmentRecord, AppointmentView};
use crate::models::schedule::AppointmentChange;

use super::{run_blocking, AppState, CommandResult};

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AppointmentListPayload {
    pub salon_id: String,
    pub from: String,
    pub to: String,
    #[serde(default)]
    pub staff_id: Option<String>,
    #[serde(default)]
    pub include_cancelled: bool,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReschedulePayload {
    pub appointment_id: String,
    pub new_time: String,
    #[serde(default)]
    pub new_staff_id: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReassignPayload {
    pub appointment_id: String,
    pub new_staff_id: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CancelPayload {
    pub appointment_id: String,
    pub reason: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RatePayload {
    pub appointment_id: String,
    pub rating: f64,
}

#[derive(Debug, Clone, Copy, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum StatusAction {
    Confirm,
    Complete,
    NoShow,
}

pub async fn appointments_book(
    state: &AppState,
    payload: AppointmentCreateInput,
) -> CommandResult<AppointmentChange> {
    let app_state = state.clone();
    run_blocking(move || app_state.appointments().book(payload)).await
}

pub async fn appointments_get(
    state: &AppState,
    appointment_id: String,
) -> CommandResult<Option<AppointmentView>> {
    let app_state = state.clone();
    run_blocking(move || app_state.appointments().get_view(&appointment_id)).await
}

pub async fn appointments_list(
    state: &AppState,
    payload: AppointmentListPayload,
) -> CommandResult<Vec<AppointmentRecord>> {
    let app_state = state.clone();
    run_blocking(move || {
        app_state.appointments().list(
            &payload.salon_id,
            &payload.from,
            &payload.to,
            payload.staff_id.as_deref(),
            payload.include_cancelled,
        )
    })
    .await
}

pub async fn appointments_reschedule(
    state: &AppState,
    payload: ReschedulePayload,
) -> CommandResult<AppointmentChange> {
    let app_state = state.clone();
    run_blocking(move || {
        app_state.appointments().reschedule(
            &payload.appointment_id,
            &payload.new_time,
            payload.new_staff_id.as_deref(),
        )
    })
    .await
}

pub async fn appointments_reassign(
    state: &AppState,
    payload: ReassignPayload,
) -> CommandResult<AppointmentChange> {
    let app_state = state.clone();
    run_blocking(move || {
        app_state
            .appointments()
            .reassign(&payload.appointment_id, &payload.new_staff_id)
    })
    .await
}

pub async fn appointments_cancel(
    state: &AppState,
    payload: CancelPayload,
) -> CommandResult<AppointmentRecord> {
    let app_state = state.clone();
    run_blocking(move || {
        app_state
            .appointments()
            .cancel(&payload.appointment_id, &payload.reason)
    })
    .await
}

pub async fn appointments_update_status(
    state: &AppState,
    appointment_id: String,
    action: StatusAction,
) -> CommandResult<AppointmentRecord> {
    let app_state = state.clone();
    run_blocking(move || {
        let service = app_state.appointments();
        match action {
            StatusAction::Confirm => service.confirm(&appointment_id),
            StatusAction::Complete => service.complete(&appointment_id),
            StatusAction::NoShow => service.mark_no_show(&appointment_id),
        }
    })
    .await
}

pub async fn appointments_rate(
    state: &AppState,
    payload: RatePayload,
) -> CommandResult<AppointmentRecord> {
    let app_state = state.clone();
    run_blocking(move || {
        app_state
            .appointments()
            .rate(&payload.appointment_id, payload.rating)
    })
    .await
}
