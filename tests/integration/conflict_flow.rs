use std::sync::Arc;

use salon_schedule_lib::commands::AppState;
use salon_schedule_lib::db::DbPool;
use salon_schedule_lib::models::appointment::{AppointmentCreateInput, AppointmentStatus};
use salon_schedule_lib::models::salon::{SalonCreateInput, ServiceCreateInput};
use salon_schedule_lib::models::schedule::{
    ConflictResolution, ConflictSeverity, ConflictType,
};
use salon_schedule_lib::models::staff::StaffCreateInput;
use salon_schedule_lib::models::time_off::{BlockedTimeCreateInput, BlockedTimeReason};
use salon_schedule_lib::services::session::{AuthUser, SharedSession, StaticSession};
use tempfile::{tempdir, TempDir};

const DAY: &str = "2025-03-10";

struct Fixture {
    _dir: TempDir,
    state: AppState,
    salon_id: String,
    service_id: String,
    staff_id: String,
}

fn setup() -> Fixture {
    let dir = tempdir().expect("temp dir");
    let pool = DbPool::new(dir.path().join("conflicts.sqlite")).expect("db pool");
    let session: SharedSession = Arc::new(StaticSession::signed_in(AuthUser {
        id: "manager-1".into(),
        email: None,
        role: Some("manager".into()),
    }));
    let state = AppState::new(pool, session).expect("app state");

    let salon = state
        .salons()
        .create(SalonCreateInput {
            name: "Main Street".into(),
            ..Default::default()
        })
        .expect("salon");
    let service = state
        .salons()
        .create_service(ServiceCreateInput {
            salon_id: salon.id.clone(),
            name: "Haircut".into(),
            duration_minutes: 60,
            price: Some(45.0),
        })
        .expect("service");
    let staff = state
        .staff()
        .create(StaffCreateInput {
            salon_id: salon.id.clone(),
            display_name: "Robin".into(),
            email: None,
            service_ids: vec![service.id.clone()],
        })
        .expect("staff");

    Fixture {
        _dir: dir,
        state,
        salon_id: salon.id,
        service_id: service.id,
        staff_id: staff.id,
    }
}

fn book(fixture: &Fixture, start: &str) -> String {
    fixture
        .state
        .appointments()
        .book(AppointmentCreateInput {
            salon_id: fixture.salon_id.clone(),
            staff_id: Some(fixture.staff_id.clone()),
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
fn overlapping_bookings_yield_one_high_conflict() {
    let fixture = setup();
    let first = book(&fixture, "09:00");
    let second = book(&fixture, "09:30");

    let conflicts = fixture
        .state
        .conflicts()
        .detect_for_day(&fixture.staff_id, DAY)
        .expect("detect");
    assert_eq!(conflicts.len(), 1);
    let conflict = &conflicts[0];
    assert_eq!(conflict.conflict_type, ConflictType::AppointmentOverlap);
    assert_eq!(conflict.severity, ConflictSeverity::High);
    assert_eq!(conflict.entity_ids, vec![first.clone(), second.clone()]);
    assert_eq!(conflict.id, format!("appointment_overlap:{first}:{second}"));
    assert_eq!(conflict.overlap_start, "2025-03-10T09:30:00+00:00");
    assert_eq!(conflict.overlap_end, "2025-03-10T10:00:00+00:00");
}

#[test]
fn every_overlapping_pair_is_reported_once() {
    let fixture = setup();
    book(&fixture, "09:00");
    book(&fixture, "09:30");
    book(&fixture, "09:45");
    book(&fixture, "12:00");

    let conflicts = fixture
        .state
        .conflicts()
        .detect_for_day(&fixture.staff_id, DAY)
        .expect("detect");
    assert_eq!(conflicts.len(), 3);

    let mut ids: Vec<&str> = conflicts.iter().map(|conflict| conflict.id.as_str()).collect();
    ids.sort();
    ids.dedup();
    assert_eq!(ids.len(), 3);
}

#[test]
fn touching_bookings_do_not_conflict() {
    let fixture = setup();
    book(&fixture, "09:00");
    book(&fixture, "10:00");
    let conflicts = fixture
        .state
        .conflicts()
        .detect_for_day(&fixture.staff_id, DAY)
        .expect("detect");
    assert!(conflicts.is_empty());
}

#[test]
fn detection_is_idempotent() {
    let fixture = setup();
    book(&fixture, "09:00");
    book(&fixture, "09:30");
    let detector = fixture.state.conflicts();
    let first = detector.detect_for_day(&fixture.staff_id, DAY).expect("detect");
    let second = detector.detect_for_day(&fixture.staff_id, DAY).expect("detect");
    assert_eq!(first, second);

    let salon_wide = detector
        .detect_for_salon(&fixture.salon_id, DAY, DAY)
        .expect("salon detect");
    assert_eq!(salon_wide, first);
}

#[test]
fn rescheduling_to_a_free_slot_clears_the_conflict() {
    let fixture = setup();
    let first = book(&fixture, "09:00");
    book(&fixture, "09:30");
    let conflict_id = fixture
        .state
        .conflicts()
        .detect_for_day(&fixture.staff_id, DAY)
        .expect("detect")[0]
        .id
        .clone();

    let outcome = fixture
        .state
        .resolver()
        .resolve(
            &conflict_id,
            ConflictResolution::RescheduleAppointment {
                appointment_id: first.clone(),
                new_time: "11:00".into(),
                new_staff_id: None,
            },
        )
        .expect("resolve");
    assert!(outcome.success);
    assert!(outcome.new_conflicts.is_empty());

    let moved = fixture
        .state
        .appointments()
        .get(&first)
        .expect("lookup")
        .expect("appointment");
    assert_eq!(moved.status, AppointmentStatus::Rescheduled);
    assert_eq!(moved.start_time.as_deref(), Some("2025-03-10T11:00:00+00:00"));
    assert_eq!(moved.end_time.as_deref(), Some("2025-03-10T12:00:00+00:00"));

    let remaining = fixture
        .state
        .conflicts()
        .detect_for_day(&fixture.staff_id, DAY)
        .expect("detect");
    assert!(remaining.is_empty());
}

#[test]
fn rescheduling_into_a_third_booking_reports_the_new_conflict() {
    let fixture = setup();
    let first = book(&fixture, "09:00");
    book(&fixture, "09:30");
    let third = book(&fixture, "11:00");
    let conflict_id = fixture
        .state
        .conflicts()
        .detect_for_day(&fixture.staff_id, DAY)
        .expect("detect")[0]
        .id
        .clone();

    let outcome = fixture
        .state
        .resolver()
        .resolve(
            &conflict_id,
            ConflictResolution::RescheduleAppointment {
                appointment_id: first.clone(),
                new_time: "11:30".into(),
                new_staff_id: None,
            },
        )
        .expect("resolve");
    assert!(outcome.success);
    assert_eq!(outcome.new_conflicts.len(), 1);
    assert!(outcome.new_conflicts[0].involves(&first));
    assert!(outcome.new_conflicts[0].involves(&third));
}

#[test]
fn unimplemented_strategies_leave_the_store_untouched() {
    let fixture = setup();
    let first = book(&fixture, "09:00");
    book(&fixture, "09:30");
    let conflict_id = fixture
        .state
        .conflicts()
        .detect_for_day(&fixture.staff_id, DAY)
        .expect("detect")[0]
        .id
        .clone();
    let before = fixture
        .state
        .appointments()
        .get(&first)
        .expect("lookup")
        .expect("appointment");

    for resolution in [
        ConflictResolution::SplitAppointment {
            appointment_id: first.clone(),
            split_at: "09:30".into(),
        },
        ConflictResolution::ExtendWorkingHours {
            staff_id: fixture.staff_id.clone(),
            extra_minutes: 30,
        },
        ConflictResolution::AddStaffBreak {
            staff_id: fixture.staff_id.clone(),
            start_time: "12:00".into(),
            duration_minutes: 15,
        },
        ConflictResolution::BookDifferentResource {
            appointment_id: first.clone(),
            resource_id: "chair-2".into(),
        },
    ] {
        let outcome = fixture
            .state
            .resolver()
            .resolve(&conflict_id, resolution)
            .expect("resolve");
        assert!(!outcome.success);
        assert!(outcome.new_conflicts.is_empty());
        assert!(outcome.message.unwrap_or_default().contains("not implemented"));
    }

    let after = fixture
        .state
        .appointments()
        .get(&first)
        .expect("lookup")
        .expect("appointment");
    assert_eq!(before, after);
}

#[test]
fn cancellation_needs_a_reason_and_frees_the_slot() {
    let fixture = setup();
    book(&fixture, "09:00");
    let second = book(&fixture, "09:30");
    let conflict_id = fixture
        .state
        .conflicts()
        .detect_for_day(&fixture.staff_id, DAY)
        .expect("detect")[0]
        .id
        .clone();

    let refused = fixture
        .state
        .resolver()
        .resolve(
            &conflict_id,
            ConflictResolution::CancelAppointment {
                appointment_id: second.clone(),
                reason: "   ".into(),
            },
        )
        .expect("resolve");
    assert!(!refused.success);

    let outcome = fixture
        .state
        .resolver()
        .resolve(
            &conflict_id,
            ConflictResolution::CancelAppointment {
                appointment_id: second.clone(),
                reason: "customer called in sick".into(),
            },
        )
        .expect("resolve");
    assert!(outcome.success);
    let cancelled = outcome.appointment.expect("appointment");
    assert_eq!(cancelled.status, AppointmentStatus::Cancelled);
    assert_eq!(
        cancelled.cancellation_reason.as_deref(),
        Some("customer called in sick")
    );
    assert!(fixture
        .state
        .conflicts()
        .detect_for_day(&fixture.staff_id, DAY)
        .expect("detect")
        .is_empty());
}

#[test]
fn resolution_must_target_a_party_of_the_conflict() {
    let fixture = setup();
    book(&fixture, "09:00");
    book(&fixture, "09:30");
    let outsider = book(&fixture, "14:00");
    let conflict_id = fixture
        .state
        .conflicts()
        .detect_for_day(&fixture.staff_id, DAY)
        .expect("detect")[0]
        .id
        .clone();

    let outcome = fixture
        .state
        .resolver()
        .resolve(
            &conflict_id,
            ConflictResolution::CancelAppointment {
                appointment_id: outsider,
                reason: "wrong target".into(),
            },
        )
        .expect("resolve");
    assert!(!outcome.success);
}

#[test]
fn blocked_time_over_a_booking_is_a_medium_conflict() {
    let fixture = setup();
    let booked = book(&fixture, "13:00");
    let change = fixture
        .state
        .time_off()
        .create_blocked_time(BlockedTimeCreateInput {
            staff_id: fixture.staff_id.clone(),
            start_time: format!("{DAY}T13:30:00Z"),
            end_time: format!("{DAY}T14:30:00Z"),
            reason: BlockedTimeReason::Meeting,
            description: Some("team meeting".into()),
        })
        .expect("blocked time");

    assert_eq!(change.conflicts.len(), 1);
    let conflict = &change.conflicts[0];
    assert_eq!(conflict.conflict_type, ConflictType::BlockedTimeOverlap);
    assert_eq!(conflict.severity, ConflictSeverity::Medium);
    assert_eq!(
        conflict.entity_ids,
        vec![booked, change.blocked_time.id.clone()]
    );
}

fn add_stylist(fixture: &Fixture, name: &str) -> String {
    fixture
        .state
        .staff()
        .create(StaffCreateInput {
            salon_id: fixture.salon_id.clone(),
            display_name: name.into(),
            email: None,
            service_ids: vec![fixture.service_id.clone()],
        })
        .expect("staff")
        .id
}

fn book_at(fixture: &Fixture, staff_id: &str, start_time: &str) -> String {
    fixture
        .state
        .appointments()
        .book(AppointmentCreateInput {
            salon_id: fixture.salon_id.clone(),
            staff_id: Some(staff_id.to_string()),
            customer_id: format!("customer-{start_time}"),
            service_id: fixture.service_id.clone(),
            start_time: start_time.into(),
            ..Default::default()
        })
        .expect("booking")
        .appointment
        .id
}

fn first_conflict_id(fixture: &Fixture) -> String {
    fixture
        .state
        .conflicts()
        .detect_for_day(&fixture.staff_id, DAY)
        .expect("detect")[0]
        .id
        .clone()
}

#[test]
fn rescheduling_across_midnight_reports_next_day_overlap() {
    let fixture = setup();
    let first = book(&fixture, "09:00");
    book(&fixture, "09:30");
    let late = book_at(&fixture, &fixture.staff_id, "2025-03-11T00:15:00Z");
    let conflict_id = first_conflict_id(&fixture);

    let outcome = fixture
        .state
        .resolver()
        .resolve(
            &conflict_id,
            ConflictResolution::RescheduleAppointment {
                appointment_id: first.clone(),
                new_time: "23:30".into(),
                new_staff_id: None,
            },
        )
        .expect("resolve");
    assert!(outcome.success);
    assert_eq!(outcome.new_conflicts.len(), 1);
    assert!(outcome.new_conflicts[0].involves(&first));
    assert!(outcome.new_conflicts[0].involves(&late));

    let next_day = fixture
        .state
        .conflicts()
        .detect_for_day(&fixture.staff_id, "2025-03-11")
        .expect("detect");
    assert_eq!(next_day, outcome.new_conflicts);
}

#[test]
fn booking_that_runs_past_midnight_reports_its_conflict() {
    let fixture = setup();
    let late = book_at(&fixture, &fixture.staff_id, "2025-03-11T00:15:00Z");
    let booked = fixture
        .state
        .appointments()
        .book(AppointmentCreateInput {
            salon_id: fixture.salon_id.clone(),
            staff_id: Some(fixture.staff_id.clone()),
            customer_id: "night-owl".into(),
            service_id: fixture.service_id.clone(),
            start_time: format!("{DAY}T23:45:00Z"),
            ..Default::default()
        })
        .expect("booking");
    assert_eq!(booked.conflicts.len(), 1);
    assert!(booked.conflicts[0].involves(&late));
}

#[test]
fn explicit_range_scan_spans_midnight() {
    let fixture = setup();
    let evening = book_at(&fixture, &fixture.staff_id, "2025-03-10T23:30:00Z");
    let late = book_at(&fixture, &fixture.staff_id, "2025-03-11T00:15:00Z");

    let conflicts = fixture
        .state
        .conflicts()
        .detect_for_range(
            &fixture.staff_id,
            "2025-03-10T22:00:00Z",
            "2025-03-11T02:00:00Z",
        )
        .expect("range detect");
    assert_eq!(conflicts.len(), 1);
    assert_eq!(conflicts[0].entity_ids, vec![evening, late]);

    let empty = fixture
        .state
        .conflicts()
        .detect_for_range(
            &fixture.staff_id,
            "2025-03-10T06:00:00Z",
            "2025-03-10T08:00:00Z",
        )
        .expect("range detect");
    assert!(empty.is_empty());

    let inverted = fixture.state.conflicts().detect_for_range(
        &fixture.staff_id,
        "2025-03-11T02:00:00Z",
        "2025-03-10T22:00:00Z",
    );
    assert!(inverted.is_err());
}

#[test]
fn reassigning_to_a_free_stylist_clears_the_conflict() {
    let fixture = setup();
    let first = book(&fixture, "09:00");
    let second = book(&fixture, "09:30");
    let colleague = add_stylist(&fixture, "Sam");
    let conflict_id = first_conflict_id(&fixture);

    let outcome = fixture
        .state
        .resolver()
        .resolve(
            &conflict_id,
            ConflictResolution::ReassignStaff {
                appointment_id: second.clone(),
                new_staff_id: colleague.clone(),
            },
        )
        .expect("resolve");
    assert!(outcome.success);
    assert!(outcome.new_conflicts.is_empty());

    let moved = fixture
        .state
        .appointments()
        .get(&second)
        .expect("lookup")
        .expect("appointment");
    assert_eq!(moved.staff_id.as_deref(), Some(colleague.as_str()));
    assert_eq!(moved.start_time.as_deref(), Some("2025-03-10T09:30:00+00:00"));
    assert_eq!(moved.status, AppointmentStatus::Pending);

    assert!(fixture
        .state
        .conflicts()
        .detect_for_day(&fixture.staff_id, DAY)
        .expect("detect")
        .is_empty());
    let untouched = fixture
        .state
        .appointments()
        .get(&first)
        .expect("lookup")
        .expect("appointment");
    assert_eq!(untouched.staff_id.as_deref(), Some(fixture.staff_id.as_str()));
}

#[test]
fn reassigning_to_a_busy_stylist_reports_their_conflict() {
    let fixture = setup();
    book(&fixture, "09:00");
    let second = book(&fixture, "09:30");
    let colleague = add_stylist(&fixture, "Sam");
    let blocker = book_at(&fixture, &colleague, "2025-03-10T10:00:00Z");
    let conflict_id = first_conflict_id(&fixture);

    let outcome = fixture
        .state
        .resolver()
        .resolve(
            &conflict_id,
            ConflictResolution::ReassignStaff {
                appointment_id: second.clone(),
                new_staff_id: colleague.clone(),
            },
        )
        .expect("resolve");
    assert!(outcome.success);
    assert_eq!(outcome.new_conflicts.len(), 1);
    let conflict = &outcome.new_conflicts[0];
    assert_eq!(conflict.conflict_type, ConflictType::AppointmentOverlap);
    assert_eq!(conflict.staff_id, colleague);
    assert!(conflict.involves(&second));
    assert!(conflict.involves(&blocker));
}

#[test]
fn reassigning_to_an_unknown_stylist_fails_softly() {
    let fixture = setup();
    book(&fixture, "09:00");
    let second = book(&fixture, "09:30");
    let conflict_id = first_conflict_id(&fixture);

    let outcome = fixture
        .state
        .resolver()
        .resolve(
            &conflict_id,
            ConflictResolution::ReassignStaff {
                appointment_id: second.clone(),
                new_staff_id: "nobody".into(),
            },
        )
        .expect("resolve");
    assert!(!outcome.success);
    assert!(outcome.new_conflicts.is_empty());

    let unchanged = fixture
        .state
        .appointments()
        .get(&second)
        .expect("lookup")
        .expect("appointment");
    assert_eq!(unchanged.staff_id.as_deref(), Some(fixture.staff_id.as_str()));
}
