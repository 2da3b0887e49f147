use std::sync::Arc;

use salon_schedule_lib::commands::AppState;
use salon_schedule_lib::db::DbPool;
use salon_schedule_lib::error::AppError;
use salon_schedule_lib::models::appointment::AppointmentCreateInput;
use salon_schedule_lib::models::salon::{SalonCreateInput, ServiceCreateInput};
use salon_schedule_lib::models::schedule::{
    ConflictType, Flexibility, PendingAppointment, SchedulingCriteria,
};
use salon_schedule_lib::models::staff::{StaffCreateInput, StaffScheduleInput};
use salon_schedule_lib::models::time_off::{
    BlockedTimeCreateInput, BlockedTimeReason, TimeOffRequestInput, TimeOffStatus,
};
use salon_schedule_lib::services::session::{AuthUser, SharedSession, StaticSession};
use tempfile::{tempdir, TempDir};

const MONDAY: &str = "2025-03-10";

struct Fixture {
    _dir: TempDir,
    state: AppState,
    salon_id: String,
    service_id: String,
    staff_id: String,
}

fn setup() -> Fixture {
    let dir = tempdir().expect("temp dir");
    let pool = DbPool::new(dir.path().join("time_off.sqlite")).expect("db pool");
    let session: SharedSession = Arc::new(StaticSession::signed_in(AuthUser {
        id: "owner".into(),
        email: None,
        role: Some("owner".into()),
    }));
    let state = AppState::new(pool, session).expect("app state");

    let salon = state
        .salons()
        .create(SalonCreateInput {
            name: "Riverside".into(),
            ..Default::default()
        })
        .expect("salon");
    let service = state
        .salons()
        .create_service(ServiceCreateInput {
            salon_id: salon.id.clone(),
            name: "Blow dry".into(),
            duration_minutes: 60,
            price: Some(25.0),
        })
        .expect("service");
    let staff = state
        .staff()
        .create(StaffCreateInput {
            salon_id: salon.id.clone(),
            display_name: "Jordan".into(),
            email: Some("jordan@example.com".into()),
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

fn book(fixture: &Fixture, date: &str, start: &str) -> String {
    fixture
        .state
        .appointments()
        .book(AppointmentCreateInput {
            salon_id: fixture.salon_id.clone(),
            staff_id: Some(fixture.staff_id.clone()),
            customer_id: "regular".into(),
            service_id: fixture.service_id.clone(),
            start_time: format!("{date}T{start}:00Z"),
            ..Default::default()
        })
        .expect("booking")
        .appointment
        .id
}

fn request(fixture: &Fixture, from: &str, to: &str) -> String {
    fixture
        .state
        .time_off()
        .submit(TimeOffRequestInput {
            staff_id: fixture.staff_id.clone(),
            start_date: from.into(),
            end_date: to.into(),
            reason: Some("family visit".into()),
        })
        .expect("submit")
        .id
}

fn pending_at(fixture: &Fixture, start: &str) -> PendingAppointment {
    PendingAppointment {
        id: format!("pending-{start}"),
        salon_id: fixture.salon_id.clone(),
        customer_id: "new-customer".into(),
        service_id: fixture.service_id.clone(),
        requested_start: format!("{MONDAY}T{start}:00Z"),
        duration_minutes: None,
        priority: 0,
        flexibility: Flexibility::High,
        preferred_staff_id: None,
    }
}

fn monday_hours(fixture: &Fixture, start_minute: u32, end_minute: u32) -> StaffScheduleInput {
    StaffScheduleInput {
        staff_id: fixture.staff_id.clone(),
        day_of_week: 1,
        start_minute,
        end_minute,
        is_available: true,
        ..Default::default()
    }
}

#[test]
fn approval_blocks_the_range_and_reports_collisions() {
    let fixture = setup();
    let booked = book(&fixture, MONDAY, "10:00");
    let request_id = request(&fixture, MONDAY, "2025-03-11");

    let decision = fixture
        .state
        .time_off()
        .approve(&request_id, Some("  enjoy  ".into()))
        .expect("approve");
    assert_eq!(decision.request.status, TimeOffStatus::Approved);
    assert_eq!(decision.request.reviewed_by.as_deref(), Some("owner"));
    assert!(decision.request.reviewed_at.is_some());
    assert_eq!(decision.request.review_note.as_deref(), Some("enjoy"));

    let blocked = decision.blocked_time.expect("blocked time");
    assert_eq!(blocked.reason, BlockedTimeReason::TimeOff);
    assert_eq!(blocked.start_time, "2025-03-10T00:00:00+00:00");
    assert_eq!(blocked.end_time, "2025-03-12T00:00:00+00:00");
    assert_eq!(blocked.time_off_request_id.as_deref(), Some(request_id.as_str()));
    assert_eq!(blocked.created_by.as_deref(), Some("owner"));

    assert_eq!(decision.conflicts.len(), 1);
    assert_eq!(decision.conflicts[0].conflict_type, ConflictType::BlockedTimeOverlap);
    assert!(decision.conflicts[0].involves(&booked));
}

#[test]
fn approved_time_off_keeps_assignments_away() {
    let fixture = setup();
    let request_id = request(&fixture, MONDAY, MONDAY);
    fixture
        .state
        .time_off()
        .approve(&request_id, None)
        .expect("approve");

    let outcome = fixture
        .state
        .assignment()
        .plan(&[pending_at(&fixture, "10:00")], &SchedulingCriteria::default())
        .expect("plan");
    assert!(outcome.assigned.is_empty());
    assert_eq!(outcome.failed.len(), 1);
}

#[test]
fn cancelling_an_approved_request_removes_its_block() {
    let fixture = setup();
    book(&fixture, MONDAY, "10:00");
    let request_id = request(&fixture, MONDAY, MONDAY);
    fixture
        .state
        .time_off()
        .approve(&request_id, None)
        .expect("approve");
    assert_eq!(
        fixture
            .state
            .time_off()
            .list_blocked_time(&fixture.staff_id)
            .expect("blocks")
            .len(),
        1
    );

    let cancelled = fixture
        .state
        .time_off()
        .cancel(&request_id)
        .expect("cancel");
    assert_eq!(cancelled.status, TimeOffStatus::Cancelled);
    assert!(fixture
        .state
        .time_off()
        .list_blocked_time(&fixture.staff_id)
        .expect("blocks")
        .is_empty());
    assert!(fixture
        .state
        .conflicts()
        .detect_for_day(&fixture.staff_id, MONDAY)
        .expect("detect")
        .is_empty());
}

#[test]
fn reviewed_requests_cannot_be_reviewed_again() {
    let fixture = setup();
    let request_id = request(&fixture, MONDAY, MONDAY);
    let rejected = fixture
        .state
        .time_off()
        .reject(&request_id, Some("busy week".into()))
        .expect("reject");
    assert_eq!(rejected.status, TimeOffStatus::Rejected);
    assert_eq!(rejected.review_note.as_deref(), Some("busy week"));

    let approve_again = fixture.state.time_off().approve(&request_id, None);
    assert!(matches!(approve_again, Err(AppError::Conflict { .. })));
    let cancel_rejected = fixture.state.time_off().cancel(&request_id);
    assert!(matches!(cancel_rejected, Err(AppError::Conflict { .. })));
}

#[test]
fn requests_are_listed_by_status() {
    let fixture = setup();
    let first = request(&fixture, MONDAY, MONDAY);
    let second = request(&fixture, "2025-03-17", "2025-03-18");
    fixture
        .state
        .time_off()
        .approve(&first, None)
        .expect("approve");

    let all = fixture
        .state
        .time_off()
        .list_requests(&fixture.staff_id, None)
        .expect("list");
    assert_eq!(all.len(), 2);

    let pending = fixture
        .state
        .time_off()
        .list_requests(&fixture.staff_id, Some(TimeOffStatus::Pending))
        .expect("list");
    assert_eq!(pending.len(), 1);
    assert_eq!(pending[0].id, second);
}

#[test]
fn malformed_requests_are_rejected() {
    let fixture = setup();
    let backwards = fixture.state.time_off().submit(TimeOffRequestInput {
        staff_id: fixture.staff_id.clone(),
        start_date: "2025-03-12".into(),
        end_date: MONDAY.into(),
        reason: None,
    });
    assert!(matches!(backwards, Err(AppError::Validation { .. })));

    let stranger = fixture.state.time_off().submit(TimeOffRequestInput {
        staff_id: "nobody".into(),
        start_date: MONDAY.into(),
        end_date: MONDAY.into(),
        reason: None,
    });
    assert!(matches!(stranger, Err(AppError::Validation { .. })));
}

#[test]
fn manual_blocks_can_be_removed() {
    let fixture = setup();
    let change = fixture
        .state
        .time_off()
        .create_blocked_time(BlockedTimeCreateInput {
            staff_id: fixture.staff_id.clone(),
            start_time: format!("{MONDAY}T12:00:00Z"),
            end_time: format!("{MONDAY}T13:00:00Z"),
            reason: BlockedTimeReason::Break,
            description: Some("   ".into()),
        })
        .expect("block");
    assert!(change.conflicts.is_empty());
    assert!(change.blocked_time.description.is_none());

    fixture
        .state
        .time_off()
        .delete_blocked_time(&change.blocked_time.id)
        .expect("delete");
    let missing = fixture
        .state
        .time_off()
        .delete_blocked_time(&change.blocked_time.id);
    assert!(matches!(missing, Err(AppError::NotFound)));

    let inverted = fixture
        .state
        .time_off()
        .create_blocked_time(BlockedTimeCreateInput {
            staff_id: fixture.staff_id.clone(),
            start_time: format!("{MONDAY}T13:00:00Z"),
            end_time: format!("{MONDAY}T12:00:00Z"),
            reason: BlockedTimeReason::Other,
            description: None,
        });
    assert!(matches!(inverted, Err(AppError::Validation { .. })));
}

#[test]
fn weekly_schedule_shapes_assignments() {
    let fixture = setup();
    fixture
        .state
        .staff()
        .upsert_schedule(monday_hours(&fixture, 12 * 60, 16 * 60))
        .expect("schedule");

    let outcome = fixture
        .state
        .assignment()
        .plan(&[pending_at(&fixture, "09:00")], &SchedulingCriteria::default())
        .expect("plan");
    assert_eq!(outcome.assigned.len(), 1);
    assert_eq!(outcome.assigned[0].start_time, "2025-03-10T12:00:00+00:00");
}

#[test]
fn newer_schedule_supersedes_the_same_weekday() {
    let fixture = setup();
    let staff = fixture.state.staff();
    staff
        .upsert_schedule(monday_hours(&fixture, 12 * 60, 16 * 60))
        .expect("schedule");
    staff
        .upsert_schedule(monday_hours(&fixture, 13 * 60, 17 * 60))
        .expect("schedule");
    staff
        .upsert_schedule(StaffScheduleInput {
            day_of_week: 2,
            ..monday_hours(&fixture, 9 * 60, 12 * 60)
        })
        .expect("tuesday");

    let schedules = staff.list_schedules(&fixture.staff_id).expect("list");
    assert_eq!(schedules.len(), 2);
    let monday: Vec<_> = schedules.iter().filter(|entry| entry.day_of_week == 1).collect();
    assert_eq!(monday.len(), 1);
    assert_eq!(monday[0].start_minute, 13 * 60);

    let outcome = fixture
        .state
        .assignment()
        .plan(&[pending_at(&fixture, "09:00")], &SchedulingCriteria::default())
        .expect("plan");
    assert_eq!(outcome.assigned[0].start_time, "2025-03-10T13:00:00+00:00");
}

#[test]
fn day_off_and_bad_breaks() {
    let fixture = setup();
    let staff = fixture.state.staff();
    staff
        .upsert_schedule(StaffScheduleInput {
            is_available: false,
            ..monday_hours(&fixture, 9 * 60, 17 * 60)
        })
        .expect("day off");
    let outcome = fixture
        .state
        .assignment()
        .plan(&[pending_at(&fixture, "09:00")], &SchedulingCriteria::default())
        .expect("plan");
    assert!(outcome.assigned.is_empty());

    let bad_break = staff.upsert_schedule(StaffScheduleInput {
        break_start_minute: Some(8 * 60),
        break_end_minute: Some(9 * 60),
        ..monday_hours(&fixture, 9 * 60, 17 * 60)
    });
    assert!(matches!(bad_break, Err(AppError::Validation { .. })));

    let bad_day = staff.upsert_schedule(StaffScheduleInput {
        day_of_week: 7,
        ..monday_hours(&fixture, 9 * 60, 17 * 60)
    });
    assert!(matches!(bad_day, Err(AppError::Validation { .. })));
}
