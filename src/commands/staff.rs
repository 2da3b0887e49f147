use serde::Deserialize;

use crate::models::salon::{SalonCreateInput, SalonRecord, ServiceCreateInput, ServiceRecord};
use crate::models::staff::{
    StaffCreateInput, StaffRecord, StaffScheduleInput, StaffScheduleRecord,
};

use super::{run_blocking, AppState, CommandResult};

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SalonHoursPayload {
    pub salon_id: String,
    pub open_minute: u32,
    pub close_minute: u32,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StaffServicesPayload {
    pub staff_id: String,
    pub service_ids: Vec<String>,
}

pub async fn salons_create(
    state: &AppState,
    payload: SalonCreateInput,
) -> CommandResult<SalonRecord> {
    let app_state = state.clone();
    run_blocking(move || app_state.salons().create(payload)).await
}

pub async fn salons_list(state: &AppState) -> CommandResult<Vec<SalonRecord>> {
    let app_state = state.clone();
    run_blocking(move || app_state.salons().list()).await
}

pub async fn salons_update_hours(
    state: &AppState,
    payload: SalonHoursPayload,
) -> CommandResult<SalonRecord> {
    let app_state = state.clone();
    run_blocking(move || {
        app_state
            .salons()
            .update_hours(&payload.salon_id, payload.open_minute, payload.close_minute)
    })
    .await
}

pub async fn services_create(
    state: &AppState,
    payload: ServiceCreateInput,
) -> CommandResult<ServiceRecord> {
    let app_state = state.clone();
    run_blocking(move || app_state.salons().create_service(payload)).await
}

pub async fn services_list(state: &AppState, salon_id: String) -> CommandResult<Vec<ServiceRecord>> {
    let app_state = state.clone();
    run_blocking(move || app_state.salons().list_services(&salon_id)).await
}

pub async fn staff_create(
    state: &AppState,
    payload: StaffCreateInput,
) -> CommandResult<StaffRecord> {
    let app_state = state.clone();
    run_blocking(move || app_state.staff().create(payload)).await
}

pub async fn staff_list(state: &AppState, salon_id: String) -> CommandResult<Vec<StaffRecord>> {
    let app_state = state.clone();
    run_blocking(move || app_state.staff().list(&salon_id)).await
}

pub async fn staff_deactivate(state: &AppState, staff_id: String) -> CommandResult<StaffRecord> {
    let app_state = state.clone();
    run_blocking(move || app_state.staff().deactivate(&staff_id)).await
}

pub async fn staff_set_services(
    state: &AppState,
    payload: StaffServicesPayload,
) -> CommandResult<StaffRecord> {
    let app_state = state.clone();
    run_blocking(move || {
        app_state
            .staff()
            .set_services(&payload.staff_id, payload.service_ids)
    })
    .await
}

pub async fn staff_schedule_upsert(
    state: &AppState,
    payload: StaffScheduleInput,
) -> CommandResult<StaffScheduleRecord> {
    let app_state = state.clone();
    run_blocking(move || app_state.staff().upsert_schedule(payload)).await
}

pub async fn staff_schedule_list(
    state: &AppState,
    staff_id: String,
) -> CommandResult<Vec<StaffScheduleRecord>> {
    let app_state = state.clone();
    run_blocking(move || app_state.staff().list_schedules(&staff_id)).await
}
