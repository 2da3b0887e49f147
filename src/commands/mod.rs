pub mod appointments;
pub mod schedule;
pub mod settings;
pub mod staff;
pub mod time_off;

use std::sync::Arc;

use serde::Serialize;
use serde_json::Value as JsonValue;
use tracing::{error, warn};

use crate::db::DbPool;
use crate::error::{AppError, AppResult};
use crate::services::appointment_service::AppointmentService;
use crate::services::auto_assignment::AutoAssignmentEngine;
use crate::services::conflict_detector::ConflictDetector;
use crate::services::conflict_resolver::ConflictResolver;
use crate::services::metrics_service::MetricsService;
use crate::services::salon_service::SalonService;
use crate::services::schedule_optimizer::ScheduleOptimizer;
use crate::services::session::SharedSession;
use crate::services::settings_service::SettingsService;
use crate::services::staff_service::StaffService;
use crate::services::time_off_service::TimeOffService;

/// Every service behind the UI-facing commands, sharing one pool and session.
#[derive(Clone)]
pub struct AppState {
    db_pool: DbPool,
    session: SharedSession,
    settings_service: Arc<SettingsService>,
    salon_service: Arc<SalonService>,
    staff_service: Arc<StaffService>,
    appointment_service: Arc<AppointmentService>,
    time_off_service: Arc<TimeOffService>,
    conflict_detector: Arc<ConflictDetector>,
    conflict_resolver: Arc<ConflictResolver>,
    metrics_service: Arc<MetricsService>,
    schedule_optimizer: Arc<ScheduleOptimizer>,
    auto_assignment: Arc<AutoAssignmentEngine>,
}

impl AppState {
    pub fn new(db_pool: DbPool, session: SharedSession) -> AppResult<Self> {
        let settings_service = Arc::new(SettingsService::new(db_pool.clone(), Arc::clone(&session)));
        // Warm the settings cache.
        settings_service.current()?;

        let salon_service = Arc::new(SalonService::new(
            db_pool.clone(),
            Arc::clone(&session),
            Arc::clone(&settings_service),
        ));
        let staff_service = Arc::new(StaffService::new(db_pool.clone(), Arc::clone(&session)));
        let appointment_service =
            Arc::new(AppointmentService::new(db_pool.clone(), Arc::clone(&session)));
        let time_off_service = Arc::new(TimeOffService::new(db_pool.clone(), Arc::clone(&session)));
        let conflict_detector =
            Arc::new(ConflictDetector::new(db_pool.clone(), Arc::clone(&session)));
        let conflict_resolver =
            Arc::new(ConflictResolver::new(db_pool.clone(), Arc::clone(&session)));
        let metrics_service = Arc::new(MetricsService::new(
            db_pool.clone(),
            Arc::clone(&session),
            Arc::clone(&settings_service),
        ));
        let schedule_optimizer = Arc::new(ScheduleOptimizer::new(
            Arc::clone(&session),
            Arc::clone(&metrics_service),
        ));
        let auto_assignment = Arc::new(AutoAssignmentEngine::new(
            db_pool.clone(),
            Arc::clone(&session),
            Arc::clone(&metrics_service),
        ));

        Ok(Self {
            db_pool,
            session,
            settings_service,
            salon_service,
            staff_service,
            appointment_service,
            time_off_service,
            conflict_detector,
            conflict_resolver,
            metrics_service,
            schedule_optimizer,
            auto_assignment,
        })
    }

    pub fn db(&self) -> DbPool {
        self.db_pool.clone()
    }

    pub fn session(&self) -> SharedSession {
        Arc::clone(&self.session)
    }

    pub fn settings(&self) -> Arc<SettingsService> {
        Arc::clone(&self.settings_service)
    }

    pub fn salons(&self) -> Arc<SalonService> {
        Arc::clone(&self.salon_service)
    }

    pub fn staff(&self) -> Arc<StaffService> {
        Arc::clone(&self.staff_service)
    }

    pub fn appointments(&self) -> Arc<AppointmentService> {
        Arc::clone(&self.appointment_service)
    }

    pub fn time_off(&self) -> Arc<TimeOffService> {
        Arc::clone(&self.time_off_service)
    }

    pub fn conflicts(&self) -> Arc<ConflictDetector> {
        Arc::clone(&self.conflict_detector)
    }

    pub fn resolver(&self) -> Arc<ConflictResolver> {
        Arc::clone(&self.conflict_resolver)
    }

    pub fn metrics(&self) -> Arc<MetricsService> {
        Arc::clone(&self.metrics_service)
    }

    pub fn optimizer(&self) -> Arc<ScheduleOptimizer> {
        Arc::clone(&self.schedule_optimizer)
    }

    pub fn assignment(&self) -> Arc<AutoAssignmentEngine> {
        Arc::clone(&self.auto_assignment)
    }
}

pub type CommandResult<T> = Result<T, CommandError>;

/// Error payload shown to the user as a notification.
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct CommandError {
    pub code: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<JsonValue>,
}

impl CommandError {
    pub fn new(
        code: impl Into<String>,
        message: impl Into<String>,
        details: Option<JsonValue>,
    ) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
            details,
        }
    }
}

impl From<AppError> for CommandError {
    fn from(error: AppError) -> Self {
        match error {
            AppError::Unauthorized => {
                CommandError::new("UNAUTHORIZED", "please sign in to continue", None)
            }
            AppError::Validation {
                message, details, ..
            } => CommandError::new("VALIDATION_ERROR", message, details),
            AppError::NotFound => {
                CommandError::new("NOT_FOUND", "the requested record does not exist", None)
            }
            AppError::Conflict { message } => CommandError::new("CONFLICT", message, None),
            AppError::NotImplemented { feature } => {
                warn!(target: "app::command", %feature, "unimplemented feature requested");
                CommandError::new(
                    "NOT_IMPLEMENTED",
                    format!("{feature} is not supported yet"),
                    Some(serde_json::json!({ "feature": feature })),
                )
            }
            AppError::Database { message } => {
                error!(target: "app::command", %message, "database error in command");
                CommandError::new("UNKNOWN", message, None)
            }
            AppError::Serialization(error) => {
                error!(target: "app::command", error = %error, "serialization error in command");
                CommandError::new("UNKNOWN", "failed to serialize data", None)
            }
            AppError::Io(error) => {
                error!(target: "app::command", error = %error, "io error in command");
                CommandError::new("UNKNOWN", "file system access failed", None)
            }
            AppError::Other(message) => {
                error!(target: "app::command", %message, "unexpected error in command");
                CommandError::new("UNKNOWN", message, None)
            }
        }
    }
}

/// Runs a synchronous service call off the async executor.
pub(crate) async fn run_blocking<T: Send + 'static>(
    task: impl FnOnce() -> Result<T, AppError> + Send + 'static,
) -> CommandResult<T> {
    tokio::task::spawn_blocking(task)
        .await
        .map_err(|err| CommandError::new("UNKNOWN", format!("command task failed: {err}"), None))?
        .map_err(CommandError::from)
}
