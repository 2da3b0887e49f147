use std::sync::Arc;

use salon_schedule_lib::commands::AppState;
use salon_schedule_lib::db::DbPool;
use salon_schedule_lib::error::AppError;
use salon_schedule_lib::models::appointment::{AppointmentCreateInput, AppointmentStatus};
use salon_schedule_lib::models::salon::{SalonCreateInput, ServiceCreateInput};
use salon_schedule_lib::models::schedule::{
    Flexibility, PendingAppointment, ScheduleChangeType, SchedulingCriteria,
};
use salon_schedule_lib::models::staff::StaffCreateInput;
use salon_schedule_lib::services::auto_assignment::{assigned_minutes, order_pending};
use salon_schedule_lib::services::schedule_utils::parse_datetime;
use salon_schedule_lib::services::session::{AuthUser, SharedSession, StaticSession};
use tempfile::{tempdir, TempDir};

const DAY: &str = "2025-03-10";

struct Fixture {
    _dir: TempDir,
    session: Arc<StaticSession>,
    state: AppState,
    salon_id: String,
    service_id: String,
    staff: Vec<String>,
}

fn setup(staff_count: usize) -> Fixture {
    let dir = tempdir().expect("temp dir");
    let pool = DbPool::new(dir.path().join("assignment.sqlite")).expect("db pool");
    let session = Arc::new(StaticSession::signed_in(AuthUser {
        id: "front-desk".into(),
        email: None,
        role: Some("receptionist".into()),
    }));
    let shared: SharedSession = session.clone();
    let state = AppState::new(pool, shared).expect("app state");

    let salon = state
        .salons()
        .create(SalonCreateInput {
            name: "Corner Cuts".into(),
            ..Default::default()
        })
        .expect("salon");
    let service = state
        .salons()
        .create_service(ServiceCreateInput {
            salon_id: salon.id.clone(),
            name: "Trim".into(),
            duration_minutes: 60,
            price: Some(30.0),
        })
        .expect("service");

    let staff = (0..staff_count)
        .map(|index| {
            state
                .staff()
                .create(StaffCreateInput {
                    salon_id: salon.id.clone(),
                    display_name: format!("Stylist {index}"),
                    email: None,
                    service_ids: vec![service.id.clone()],
                })
                .expect("staff")
                .id
        })
        .collect();

    Fixture {
        _dir: dir,
        session,
        state,
        salon_id: salon.id,
        service_id: service.id,
        staff,
    }
}

fn pending(
    fixture: &Fixture,
    id: &str,
    start: &str,
    priority: i32,
    flexibility: Flexibility,
) -> PendingAppointment {
    PendingAppointment {
        id: id.into(),
        salon_id: fixture.salon_id.clone(),
        customer_id: format!("customer-{id}"),
        service_id: fixture.service_id.clone(),
        requested_start: format!("{DAY}T{start}:00Z"),
        duration_minutes: None,
        priority,
        flexibility,
        preferred_staff_id: None,
    }
}

#[test]
fn higher_priority_is_placed_first() {
    let fixture = setup(1);
    let batch = vec![
        pending(&fixture, "low", "09:00", 1, Flexibility::High),
        pending(&fixture, "urgent", "09:00", 5, Flexibility::High),
    ];

    let ordered: Vec<String> = order_pending(&batch).into_iter().map(|p| p.id).collect();
    assert_eq!(ordered, vec!["urgent".to_string(), "low".to_string()]);

    let outcome = fixture
        .state
        .assignment()
        .plan(&batch, &SchedulingCriteria::default())
        .expect("plan");
    assert!(outcome.failed.is_empty());
    assert_eq!(outcome.assigned.len(), 2);
    assert_eq!(outcome.assigned[0].target_id, "urgent");
    assert_eq!(outcome.assigned[0].start_time, "2025-03-10T09:00:00+00:00");
    assert_eq!(outcome.assigned[1].target_id, "low");
    assert_eq!(outcome.assigned[1].start_time, "2025-03-10T10:00:00+00:00");
}

#[test]
fn batch_never_double_books_a_stylist() {
    let fixture = setup(2);
    let batch: Vec<PendingAppointment> = (0..4)
        .map(|index| pending(&fixture, &format!("p{index}"), "10:00", 1, Flexibility::Medium))
        .collect();

    let outcome = fixture
        .state
        .assignment()
        .plan(&batch, &SchedulingCriteria::default())
        .expect("plan");
    assert_eq!(outcome.assigned.len(), 4);

    for (index, first) in outcome.assigned.iter().enumerate() {
        for second in outcome.assigned.iter().skip(index + 1) {
            if first.staff_id != second.staff_id {
                continue;
            }
            let (a_start, a_end) = (
                parse_datetime(&first.start_time).expect("start"),
                parse_datetime(&first.end_time).expect("end"),
            );
            let (b_start, b_end) = (
                parse_datetime(&second.start_time).expect("start"),
                parse_datetime(&second.end_time).expect("end"),
            );
            assert!(a_end <= b_start || b_end <= a_start, "overlapping placements");
        }
    }

    let totals = assigned_minutes(&outcome.assigned);
    assert_eq!(totals.values().sum::<i64>(), 240);
    assert!(totals.values().all(|minutes| *minutes == 120));
}

#[test]
fn plan_leaves_the_store_untouched() {
    let fixture = setup(1);
    let batch = vec![pending(&fixture, "p1", "09:00", 1, Flexibility::Low)];
    let outcome = fixture
        .state
        .assignment()
        .plan(&batch, &SchedulingCriteria::default())
        .expect("plan");
    assert_eq!(outcome.assigned.len(), 1);

    let stored = fixture
        .state
        .appointments()
        .list(&fixture.salon_id, DAY, DAY, None, true)
        .expect("list");
    assert!(stored.is_empty());
}

#[test]
fn assign_persists_confirmed_appointments() {
    let fixture = setup(1);
    let batch = vec![
        pending(&fixture, "p1", "09:00", 2, Flexibility::Low),
        pending(&fixture, "p2", "09:00", 1, Flexibility::Medium),
    ];
    let outcome = fixture
        .state
        .assignment()
        .assign(&batch, &SchedulingCriteria::default())
        .expect("assign");
    assert_eq!(outcome.assigned.len(), 2);

    for change in &outcome.assigned {
        assert_eq!(change.change_type, ScheduleChangeType::AssignAppointment);
        let stored = fixture
            .state
            .appointments()
            .get(&change.id)
            .expect("lookup")
            .expect("persisted appointment");
        assert_eq!(stored.status, AppointmentStatus::Confirmed);
        assert_eq!(stored.staff_id.as_deref(), Some(change.staff_id.as_str()));
        assert_eq!(stored.start_time.as_deref(), Some(change.start_time.as_str()));
        assert_eq!(stored.end_time.as_deref(), Some(change.end_time.as_str()));
    }

    assert!(fixture
        .state
        .conflicts()
        .detect_for_day(&fixture.staff[0], DAY)
        .expect("detect")
        .is_empty());
}

#[test]
fn existing_bookings_push_placements_later() {
    let fixture = setup(1);
    fixture
        .state
        .appointments()
        .book(AppointmentCreateInput {
            salon_id: fixture.salon_id.clone(),
            staff_id: Some(fixture.staff[0].clone()),
            customer_id: "walk-in".into(),
            service_id: fixture.service_id.clone(),
            start_time: format!("{DAY}T09:00:00Z"),
            ..Default::default()
        })
        .expect("booking");

    let outcome = fixture
        .state
        .assignment()
        .plan(
            &[pending(&fixture, "p1", "09:00", 1, Flexibility::Medium)],
            &SchedulingCriteria::default(),
        )
        .expect("plan");
    assert_eq!(outcome.assigned.len(), 1);
    assert_eq!(outcome.assigned[0].start_time, "2025-03-10T10:00:00+00:00");
    assert_eq!(outcome.assigned[0].estimated_improvement, -120.0);
}

#[test]
fn rigid_requests_fail_with_a_reason() {
    let fixture = setup(1);
    let batch = vec![
        pending(&fixture, "first", "09:00", 3, Flexibility::None),
        pending(&fixture, "second", "09:00", 1, Flexibility::None),
    ];
    let outcome = fixture
        .state
        .assignment()
        .plan(&batch, &SchedulingCriteria::default())
        .expect("plan");

    assert_eq!(outcome.assigned.len(), 1);
    assert_eq!(outcome.assigned[0].target_id, "first");
    assert_eq!(outcome.failed.len(), 1);
    assert_eq!(outcome.failed[0].id, "second");
    let reason = outcome.failure_reasons.get("second").expect("reason");
    assert!(reason.contains("none flexibility"), "unexpected reason: {reason}");
}

#[test]
fn preferred_stylist_is_honoured_for_rigid_requests() {
    let fixture = setup(2);
    let preferred = fixture.staff[1].clone();
    let mut request = pending(&fixture, "loyal", "14:00", 1, Flexibility::None);
    request.preferred_staff_id = Some(preferred.clone());

    let outcome = fixture
        .state
        .assignment()
        .plan(&[request], &SchedulingCriteria::default())
        .expect("plan");
    assert_eq!(outcome.assigned.len(), 1);
    assert_eq!(outcome.assigned[0].staff_id, preferred);
}

#[test]
fn unknown_service_is_a_failure_not_an_error() {
    let fixture = setup(1);
    let mut request = pending(&fixture, "odd", "09:00", 1, Flexibility::High);
    request.service_id = "no-such-service".into();

    let outcome = fixture
        .state
        .assignment()
        .plan(&[request], &SchedulingCriteria::default())
        .expect("plan");
    assert!(outcome.assigned.is_empty());
    assert_eq!(outcome.failed.len(), 1);
    assert!(outcome.failure_reasons["odd"].contains("unknown service"));
}

#[test]
fn assignment_requires_a_session() {
    let fixture = setup(1);
    fixture.session.sign_out();
    let batch = vec![pending(&fixture, "p1", "09:00", 1, Flexibility::Low)];

    let planned = fixture
        .state
        .assignment()
        .plan(&batch, &SchedulingCriteria::default());
    assert!(matches!(planned, Err(AppError::Unauthorized)));
    let assigned = fixture
        .state
        .assignment()
        .assign(&batch, &SchedulingCriteria::default());
    assert!(matches!(assigned, Err(AppError::Unauthorized)));
}
