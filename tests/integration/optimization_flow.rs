use std::collections::HashSet;
use std::sync::Arc;

use salon_schedule_lib::commands::AppState;
use salon_schedule_lib::db::DbPool;
use salon_schedule_lib::error::AppError;
use salon_schedule_lib::models::appointment::AppointmentCreateInput;
use salon_schedule_lib::models::salon::{SalonCreateInput, ServiceCreateInput};
use salon_schedule_lib::models::schedule::{
    HardConstraints, ObjectiveWeights, ScheduleChangeType, SchedulingCriteria, WorkingHours,
};
use salon_schedule_lib::models::settings::SchedulingSettingsUpdate;
use salon_schedule_lib::models::staff::StaffCreateInput;
use salon_schedule_lib::services::session::{AuthUser, SharedSession, StaticSession};
use tempfile::{tempdir, TempDir};

const DAY: &str = "2025-03-10";

struct Fixture {
    _dir: TempDir,
    session: Arc<StaticSession>,
    state: AppState,
    salon_id: String,
    service_id: String,
    busy_staff: String,
    idle_staff: String,
}

fn manager() -> AuthUser {
    AuthUser {
        id: "manager-1".into(),
        email: Some("manager@example.com".into()),
        role: Some("manager".into()),
    }
}

fn setup() -> Fixture {
    let dir = tempdir().expect("temp dir");
    let pool = DbPool::new(dir.path().join("optimizer.sqlite")).expect("db pool");
    let session = Arc::new(StaticSession::signed_in(manager()));
    let shared: SharedSession = session.clone();
    let state = AppState::new(pool, shared).expect("app state");

    let salon = state
        .salons()
        .create(SalonCreateInput {
            name: "Harbour".into(),
            ..Default::default()
        })
        .expect("salon");
    let service = state
        .salons()
        .create_service(ServiceCreateInput {
            salon_id: salon.id.clone(),
            name: "Colour".into(),
            duration_minutes: 60,
            price: Some(45.0),
        })
        .expect("service");

    let mut staff_ids = Vec::new();
    for name in ["Alex", "Sam"] {
        let member = state
            .staff()
            .create(StaffCreateInput {
                salon_id: salon.id.clone(),
                display_name: name.into(),
                email: None,
                service_ids: vec![service.id.clone()],
            })
            .expect("staff");
        staff_ids.push(member.id);
    }
    let idle_staff = staff_ids.pop().expect("second staff member");
    let busy_staff = staff_ids.pop().expect("first staff member");

    Fixture {
        _dir: dir,
        session,
        state,
        salon_id: salon.id,
        service_id: service.id,
        busy_staff,
        idle_staff,
    }
}

fn book(fixture: &Fixture, start: &str) -> String {
    fixture
        .state
        .appointments()
        .book(AppointmentCreateInput {
            salon_id: fixture.salon_id.clone(),
            staff_id: Some(fixture.busy_staff.clone()),
            customer_id: format!("customer-{start}"),
            service_id: fixture.service_id.clone(),
            start_time: format!("{DAY}T{start}:00Z"),
            ..Default::default()
        })
        .expect("booking")
        .appointment
        .id
}

#[test]
fn metrics_reflect_the_booked_day() {
    let fixture = setup();
    book(&fixture, "09:00");
    book(&fixture, "09:30");

    let metrics = fixture
        .state
        .metrics()
        .calculate(&fixture.salon_id, DAY, DAY)
        .expect("metrics");
    assert_eq!(metrics.active_staff_count, 2);
    assert_eq!(metrics.capacity_minutes, 2 * 9 * 60);
    assert_eq!(metrics.booked_minutes, 120);
    assert_eq!(metrics.conflict_count, 1);
    assert!((metrics.revenue - 90.0).abs() < 1e-9);
    assert!((metrics.average_wait_minutes - 15.0).abs() < 1e-9);
    assert!(metrics.workload_balance < 1.0);
    assert!(metrics.satisfaction.is_none());
}

#[test]
fn metrics_of_an_empty_range_are_neutral() {
    let fixture = setup();
    let metrics = fixture
        .state
        .metrics()
        .calculate(&fixture.salon_id, DAY, DAY)
        .expect("metrics");
    assert_eq!(metrics.booked_minutes, 0);
    assert_eq!(metrics.conflict_count, 0);
    assert_eq!(metrics.utilization_rate, 0.0);
    assert_eq!(metrics.average_wait_minutes, 0.0);
    assert_eq!(metrics.workload_balance, 1.0);
}

#[test]
fn suggestions_clear_the_overlap_when_applied() {
    let fixture = setup();
    book(&fixture, "09:00");
    book(&fixture, "09:30");

    let result = fixture.state.optimizer().optimize(
        &fixture.salon_id,
        DAY,
        DAY,
        &SchedulingCriteria::default(),
    );
    assert!(result.success, "optimizer failed: {:?}", result.error);
    assert_eq!(result.conflicts.len(), 1);
    assert_eq!(result.metrics.conflict_count, 1);
    assert!(!result.suggestions.is_empty());
    assert!(result.score > 0.0 && result.score <= 100.0);

    let mut targets = HashSet::new();
    for change in &result.suggestions {
        assert!(change.estimated_improvement > 0.0);
        assert!(targets.insert(change.target_id.clone()), "duplicate target");
    }

    for change in &result.suggestions {
        match change.change_type {
            ScheduleChangeType::ReassignStaff => {
                fixture
                    .state
                    .appointments()
                    .reassign(&change.target_id, &change.staff_id)
                    .expect("reassign");
            }
            ScheduleChangeType::MoveAppointment => {
                fixture
                    .state
                    .appointments()
                    .reschedule(&change.target_id, &change.start_time, None)
                    .expect("move");
            }
            ScheduleChangeType::AssignAppointment => panic!("optimizer never assigns"),
        }
    }

    let remaining = fixture
        .state
        .conflicts()
        .detect_for_salon(&fixture.salon_id, DAY, DAY)
        .expect("detect");
    assert!(remaining.is_empty());
}

#[test]
fn idle_colleague_receives_the_later_booking() {
    let fixture = setup();
    book(&fixture, "09:00");
    book(&fixture, "09:30");

    let criteria = SchedulingCriteria {
        objectives: ObjectiveWeights {
            maximize_utilization: 0.0,
            minimize_wait_time: 0.0,
            maximize_revenue: 0.0,
            balance_workload: 1.0,
        },
        constraints: HardConstraints::default(),
    };
    let result = fixture
        .state
        .optimizer()
        .optimize(&fixture.salon_id, DAY, DAY, &criteria);
    assert!(result.success);
    assert!(result
        .suggestions
        .iter()
        .all(|change| change.change_type == ScheduleChangeType::ReassignStaff));
    assert!(result
        .suggestions
        .iter()
        .all(|change| change.staff_id == fixture.idle_staff));
    assert!(result
        .suggestions
        .iter()
        .all(|change| change.previous_staff_id.as_deref() == Some(fixture.busy_staff.as_str())));
}

#[test]
fn conflict_free_balanced_day_has_nothing_to_suggest() {
    let fixture = setup();
    book(&fixture, "09:00");
    fixture
        .state
        .appointments()
        .book(AppointmentCreateInput {
            salon_id: fixture.salon_id.clone(),
            staff_id: Some(fixture.idle_staff.clone()),
            customer_id: "customer-other".into(),
            service_id: fixture.service_id.clone(),
            start_time: format!("{DAY}T11:00:00Z"),
            ..Default::default()
        })
        .expect("booking");

    let result = fixture.state.optimizer().optimize(
        &fixture.salon_id,
        DAY,
        DAY,
        &SchedulingCriteria::default(),
    );
    assert!(result.success);
    assert!(result.conflicts.is_empty());
    assert!(result.suggestions.is_empty());
    assert_eq!(result.score, 0.0);
}

#[test]
fn working_hours_override_limits_moves() {
    let fixture = setup();
    book(&fixture, "09:00");
    book(&fixture, "09:30");

    let criteria = SchedulingCriteria {
        objectives: ObjectiveWeights::default(),
        constraints: HardConstraints {
            working_hours: Some(WorkingHours {
                start_minute: 9 * 60,
                end_minute: 10 * 60 + 30,
            }),
            minimum_break_minutes: 0,
        },
    };
    let result = fixture
        .state
        .optimizer()
        .optimize(&fixture.salon_id, DAY, DAY, &criteria);
    assert!(result.success);
    for change in &result.suggestions {
        assert!(change.end_time.as_str() <= "2025-03-10T10:30:00+00:00");
    }
}

#[test]
fn suggestion_cap_follows_settings() {
    let fixture = setup();
    book(&fixture, "09:00");
    book(&fixture, "09:30");
    book(&fixture, "09:45");
    fixture
        .state
        .settings()
        .update(SchedulingSettingsUpdate {
            max_suggestions: Some(1),
            ..Default::default()
        })
        .expect("settings");

    let result = fixture.state.optimizer().optimize(
        &fixture.salon_id,
        DAY,
        DAY,
        &SchedulingCriteria::default(),
    );
    assert!(result.success);
    assert_eq!(result.suggestions.len(), 1);
}

#[test]
fn signed_out_optimization_reports_failure() {
    let fixture = setup();
    book(&fixture, "09:00");
    fixture.session.sign_out();

    let result = fixture.state.optimizer().optimize(
        &fixture.salon_id,
        DAY,
        DAY,
        &SchedulingCriteria::default(),
    );
    assert!(!result.success);
    assert!(result.suggestions.is_empty());
    assert_eq!(result.error.as_deref(), Some("authentication required"));

    let metrics = fixture.state.metrics().calculate(&fixture.salon_id, DAY, DAY);
    assert!(matches!(metrics, Err(AppError::Unauthorized)));
}

#[test]
fn unknown_salon_reports_failure() {
    let fixture = setup();
    let result = fixture.state.optimizer().optimize(
        "missing-salon",
        DAY,
        DAY,
        &SchedulingCriteria::default(),
    );
    assert!(!result.success);
    assert!(result.error.is_some());
}
