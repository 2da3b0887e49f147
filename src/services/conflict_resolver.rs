use rusqlite::Connection;
use tracing::{info, warn};

use crate::db::DbPool;
use crate::error::{AppError, AppResult};
use crate::models::appointment::AppointmentRecord;
use crate::models::schedule::{ConflictResolution, ResolutionOutcome};
use crate::services::appointment_service::{
    cancel_record, conflicts_involving, reassign_record, reschedule_record,
};
use crate::services::conflict_detector;
use crate::services::session::{require_user, SharedSession};

/// Applies a chosen remediation to a detected conflict.
pub struct ConflictResolver {
    db: DbPool,
    session: SharedSession,
}

impl ConflictResolver {
    pub fn new(db: DbPool, session: SharedSession) -> Self {
        Self { db, session }
    }

    /// Only a missing session surfaces as `Err`; every other failure comes
    /// back as an unsuccessful outcome with the store left untouched.
    pub fn resolve(
        &self,
        conflict_id: &str,
        resolution: ConflictResolution,
    ) -> AppResult<ResolutionOutcome> {
        let user = require_user(self.session.as_ref())?;
        let strategy = resolution.strategy();

        if let Err(err) = validate_target(conflict_id, &resolution) {
            return Ok(ResolutionOutcome::failed(err.to_string()));
        }

        let outcome = match resolution {
            ConflictResolution::RescheduleAppointment {
                appointment_id,
                new_time,
                new_staff_id,
            } => self.apply(|conn| {
                reschedule_record(conn, &appointment_id, &new_time, new_staff_id.as_deref())
            }),
            ConflictResolution::ReassignStaff {
                appointment_id,
                new_staff_id,
            } => self.apply(|conn| reassign_record(conn, &appointment_id, &new_staff_id)),
            ConflictResolution::CancelAppointment {
                appointment_id,
                reason,
            } => self.apply(|conn| cancel_record(conn, &appointment_id, &reason)),
            ConflictResolution::SplitAppointment { .. }
            | ConflictResolution::ExtendWorkingHours { .. }
            | ConflictResolution::AddStaffBreak { .. }
            | ConflictResolution::BookDifferentResource { .. } => {
                Err(AppError::not_implemented(strategy.as_str()))
            }
        };

        match outcome {
            Ok(outcome) => {
                info!(
                    target: "app::conflict",
                    conflict_id,
                    strategy = %strategy,
                    user_id = %user.id,
                    new_conflicts = outcome.new_conflicts.len(),
                    "conflict resolution applied"
                );
                Ok(outcome)
            }
            Err(err) => {
                warn!(
                    target: "app::conflict",
                    conflict_id,
                    strategy = %strategy,
                    error = %err,
                    "conflict resolution failed"
                );
                Ok(ResolutionOutcome::failed(err.to_string()))
            }
        }
    }

    fn apply<F>(&self, mutate: F) -> AppResult<ResolutionOutcome>
    where
        F: FnOnce(&Connection) -> AppResult<AppointmentRecord>,
    {
        self.db.with_transaction(|tx| {
            let conn: &Connection = tx;
            let updated = mutate(conn)?;
            let new_conflicts = conflicts_involving(conn, &updated)?;
            let message = if new_conflicts.is_empty() {
                "resolution applied".to_string()
            } else {
                format!(
                    "resolution applied with {} new conflict(s)",
                    new_conflicts.len()
                )
            };
            Ok(ResolutionOutcome {
                success: true,
                new_conflicts,
                message: Some(message),
                appointment: Some(updated),
            })
        })
    }
}

fn validate_target(conflict_id: &str, resolution: &ConflictResolution) -> AppResult<()> {
    let (_, first, second) = conflict_detector::parse_conflict_id(conflict_id)?;
    match resolution.target_appointment() {
        Some(target) if target != first && target != second => Err(AppError::validation(format!(
            "appointment {target} is not part of conflict {conflict_id}"
        ))),
        _ => Ok(()),
    }
}
