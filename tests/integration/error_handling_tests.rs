// Error handling and edge case tests

use std::sync::Arc;

use salon_schedule_lib::commands::appointments::{
    appointments_book, appointments_rate, appointments_update_status, RatePayload, StatusAction,
};
use salon_schedule_lib::commands::schedule::{
    schedule_conflicts_for_day, schedule_resolve_conflict, StaffDayPayload,
};
use salon_schedule_lib::commands::{AppState, CommandError};
use salon_schedule_lib::db::DbPool;
use salon_schedule_lib::error::AppError;
use salon_schedule_lib::models::appointment::{AppointmentCreateInput, AppointmentStatus};
use salon_schedule_lib::models::salon::{SalonCreateInput, ServiceCreateInput};
use salon_schedule_lib::models::settings::SchedulingSettingsUpdate;
use salon_schedule_lib::models::staff::StaffCreateInput;
use salon_schedule_lib::services::session::{AuthUser, SharedSession, StaticSession};
use serde_json::json;
use tempfile::{tempdir, TempDir};

struct Environment {
    _dir: TempDir,
    session: Arc<StaticSession>,
    state: AppState,
    salon_id: String,
    service_id: String,
    staff_id: String,
}

fn stylist() -> AuthUser {
    AuthUser {
        id: "stylist-1".into(),
        email: None,
        role: None,
    }
}

fn setup_test_environment() -> Environment {
    let dir = tempdir().expect("temp dir");
    let pool = DbPool::new(dir.path().join("test.sqlite")).expect("db pool");
    let session = Arc::new(StaticSession::signed_in(stylist()));
    let shared: SharedSession = session.clone();
    let state = AppState::new(pool, shared).expect("app state");

    let salon = state
        .salons()
        .create(SalonCreateInput {
            name: "Test salon".into(),
            timezone: Some("Europe/Berlin".into()),
            ..Default::default()
        })
        .expect("salon");
    let service = state
        .salons()
        .create_service(ServiceCreateInput {
            salon_id: salon.id.clone(),
            name: "Shave".into(),
            duration_minutes: 30,
            price: None,
        })
        .expect("service");
    let staff = state
        .staff()
        .create(StaffCreateInput {
            salon_id: salon.id.clone(),
            display_name: "Kim".into(),
            email: None,
            service_ids: vec![service.id.clone()],
        })
        .expect("staff");

    Environment {
        _dir: dir,
        session,
        state,
        salon_id: salon.id,
        service_id: service.id,
        staff_id: staff.id,
    }
}

fn booking(env: &Environment, start_time: &str) -> AppointmentCreateInput {
    AppointmentCreateInput {
        salon_id: env.salon_id.clone(),
        staff_id: Some(env.staff_id.clone()),
        customer_id: "customer-1".into(),
        service_id: env.service_id.clone(),
        start_time: start_time.into(),
        ..Default::default()
    }
}

#[test]
fn test_signed_out_mutations_are_unauthorized() {
    let env = setup_test_environment();
    env.session.sign_out();

    let booked = env
        .state
        .appointments()
        .book(booking(&env, "2025-03-10T10:00:00+01:00"));
    assert!(matches!(booked, Err(AppError::Unauthorized)));

    let created = env.state.salons().create(SalonCreateInput {
        name: "Second".into(),
        ..Default::default()
    });
    assert!(matches!(created, Err(AppError::Unauthorized)));

    let settings = env.state.settings().update(SchedulingSettingsUpdate {
        slot_minutes: Some(15),
        ..Default::default()
    });
    assert!(matches!(settings, Err(AppError::Unauthorized)));

    let detected = env
        .state
        .conflicts()
        .detect_for_day(&env.staff_id, "2025-03-10");
    assert!(matches!(detected, Err(AppError::Unauthorized)));

    // Signing back in restores access without rebuilding the state.
    env.session.sign_in(stylist());
    assert!(env
        .state
        .appointments()
        .book(booking(&env, "2025-03-10T10:00:00+01:00"))
        .is_ok());
}

#[tokio::test]
async fn test_command_errors_carry_stable_codes() {
    let env = setup_test_environment();
    env.session.sign_out();

    let err = appointments_book(&env.state, booking(&env, "2025-03-10T10:00:00+01:00"))
        .await
        .expect_err("signed out");
    assert_eq!(err.code, "UNAUTHORIZED");

    env.session.sign_in(stylist());
    let err = appointments_book(&env.state, booking(&env, "tomorrow at ten"))
        .await
        .expect_err("bad timestamp");
    assert_eq!(err.code, "VALIDATION_ERROR");
    assert_eq!(
        err.details.as_ref().and_then(|details| details.get("value")),
        Some(&json!("tomorrow at ten"))
    );

    let payload: StaffDayPayload =
        serde_json::from_value(json!({"staffId": env.staff_id, "date": "2025-02-30"}))
            .expect("payload");
    let err = schedule_conflicts_for_day(&env.state, payload)
        .await
        .expect_err("impossible date");
    assert_eq!(err.code, "VALIDATION_ERROR");
}

#[tokio::test]
async fn test_illegal_status_changes_are_conflicts() {
    let env = setup_test_environment();
    let booked = appointments_book(&env.state, booking(&env, "2025-03-10T10:00:00+01:00"))
        .await
        .expect("booking");
    let id = booked.appointment.id;
    assert_eq!(booked.appointment.status, AppointmentStatus::Pending);

    let err = appointments_update_status(&env.state, id.clone(), StatusAction::Complete)
        .await
        .expect_err("pending cannot complete");
    assert_eq!(err.code, "CONFLICT");

    let rate = || RatePayload {
        appointment_id: id.clone(),
        rating: 4.5,
    };
    let err = appointments_rate(&env.state, rate())
        .await
        .expect_err("not completed yet");
    assert_eq!(err.code, "CONFLICT");

    appointments_update_status(&env.state, id.clone(), StatusAction::Confirm)
        .await
        .expect("confirm");
    appointments_update_status(&env.state, id.clone(), StatusAction::Complete)
        .await
        .expect("complete");
    let rated = appointments_rate(&env.state, rate()).await.expect("rate");
    assert_eq!(rated.customer_rating, Some(4.5));

    let err = appointments_rate(
        &env.state,
        RatePayload {
            appointment_id: id.clone(),
            rating: 6.0,
        },
    )
    .await
    .expect_err("out of range");
    assert_eq!(err.code, "VALIDATION_ERROR");

    let err = appointments_update_status(&env.state, id, StatusAction::NoShow)
        .await
        .expect_err("completed is final");
    assert_eq!(err.code, "CONFLICT");
}

#[tokio::test]
async fn test_unsupported_resolution_is_reported_not_thrown() {
    let env = setup_test_environment();
    let first = env
        .state
        .appointments()
        .book(booking(&env, "2025-03-10T10:00:00+01:00"))
        .expect("first");
    let second = env
        .state
        .appointments()
        .book(booking(&env, "2025-03-10T10:15:00+01:00"))
        .expect("second");
    assert_eq!(second.conflicts.len(), 1);
    let conflict_id = second.conflicts[0].id.clone();
    assert!(conflict_id.contains(&first.appointment.id));

    let payload = serde_json::from_value(json!({
        "conflictId": conflict_id,
        "resolution": {
            "type": "split_appointment",
            "parameters": {"appointmentId": first.appointment.id, "splitAt": "10:10"}
        }
    }))
    .expect("payload");
    let outcome = schedule_resolve_conflict(&env.state, payload)
        .await
        .expect("resolution outcome");
    assert!(!outcome.success);
    assert_eq!(
        outcome.message.as_deref(),
        Some("not implemented: split_appointment")
    );
}

#[test]
fn test_not_implemented_maps_to_its_own_code() {
    let err = CommandError::from(AppError::not_implemented("extend_working_hours"));
    assert_eq!(err.code, "NOT_IMPLEMENTED");
    assert_eq!(err.details, Some(json!({"feature": "extend_working_hours"})));
}

#[test]
fn test_malformed_conflict_ids_fail_softly() {
    let env = setup_test_environment();
    let outcome = env
        .state
        .resolver()
        .resolve(
            "not-a-conflict",
            serde_json::from_value(json!({
                "type": "cancel_appointment",
                "parameters": {"appointmentId": "x", "reason": "typo"}
            }))
            .expect("resolution"),
        )
        .expect("outcome");
    assert!(!outcome.success);
    assert!(outcome.message.is_some());
}

#[test]
fn test_booking_validation() {
    let env = setup_test_environment();

    let mut wrong_service = booking(&env, "2025-03-10T10:00:00+01:00");
    wrong_service.service_id = "missing".into();
    assert!(matches!(
        env.state.appointments().book(wrong_service),
        Err(AppError::Validation { .. })
    ));

    let mut inverted = booking(&env, "2025-03-10T10:00:00+01:00");
    inverted.end_time = Some("2025-03-10T09:00:00+01:00".into());
    assert!(matches!(
        env.state.appointments().book(inverted),
        Err(AppError::Validation { .. })
    ));

    let mut finished = booking(&env, "2025-03-10T10:00:00+01:00");
    finished.status = Some(AppointmentStatus::Completed);
    assert!(matches!(
        env.state.appointments().book(finished),
        Err(AppError::Validation { .. })
    ));

    let deactivated = env.state.staff().deactivate(&env.staff_id).expect("deactivate");
    assert!(!deactivated.is_active());
    assert!(matches!(
        env.state
            .appointments()
            .book(booking(&env, "2025-03-10T12:00:00+01:00")),
        Err(AppError::Validation { .. })
    ));
}

#[test]
fn test_service_price_is_the_default_price() {
    let env = setup_test_environment();
    let booked = env
        .state
        .appointments()
        .book(booking(&env, "2025-03-10T10:00:00+01:00"))
        .expect("booking");
    assert_eq!(booked.appointment.price, Some(0.0));
    assert_eq!(
        booked.appointment.end_time.as_deref(),
        Some("2025-03-10T10:30:00+01:00")
    );
}

#[test]
fn test_invalid_settings_are_rejected() {
    let env = setup_test_environment();
    let result = env.state.settings().update(SchedulingSettingsUpdate {
        slot_minutes: Some(7),
        ..Default::default()
    });
    assert!(matches!(result, Err(AppError::Validation { .. })));

    let unchanged = env.state.settings().get().expect("settings");
    assert_eq!(unchanged.slot_minutes, 30);
}

#[test]
fn test_unknown_timezone_is_rejected() {
    let env = setup_test_environment();
    let result = env.state.salons().create(SalonCreateInput {
        name: "Nowhere".into(),
        timezone: Some("Mars/Olympus_Mons".into()),
        ..Default::default()
    });
    assert!(matches!(result, Err(AppError::Validation { .. })));
}
