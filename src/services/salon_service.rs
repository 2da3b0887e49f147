use std::sync::Arc;

use tracing::{debug, info};
use uuid::Uuid;

use crate::db::repositories::salon_repository::{SalonRepository, SalonRow, ServiceRow};
use crate::db::DbPool;
use crate::error::{AppError, AppResult};
use crate::models::salon::{
    SalonCreateInput, SalonRecord, ServiceCreateInput, ServiceRecord,
};
use crate::services::schedule_utils;
use crate::services::session::{require_user, SharedSession};
use crate::services::settings_service::SettingsService;

const DEFAULT_TIMEZONE: &str = "UTC";

/// Salons and their service catalog.
#[derive(Clone)]
pub struct SalonService {
    db: DbPool,
    session: SharedSession,
    settings: Arc<SettingsService>,
}

impl SalonService {
    pub fn new(db: DbPool, session: SharedSession, settings: Arc<SettingsService>) -> Self {
        Self {
            db,
            session,
            settings,
        }
    }

    /// Missing operating hours fall back to the configured defaults.
    pub fn create(&self, input: SalonCreateInput) -> AppResult<SalonRecord> {
        require_user(self.session.as_ref())?;
        let name = input.name.trim().to_string();
        if name.is_empty() {
            return Err(AppError::validation("salon name is required"));
        }
        let timezone = input
            .timezone
            .map(|tz| tz.trim().to_string())
            .filter(|tz| !tz.is_empty())
            .unwrap_or_else(|| DEFAULT_TIMEZONE.to_string());
        schedule_utils::parse_timezone(&timezone)?;

        let defaults = self.settings.current()?;
        let open_minute = input.open_minute.unwrap_or(defaults.default_open_minute);
        let close_minute = input.close_minute.unwrap_or(defaults.default_close_minute);
        validate_hours(open_minute, close_minute)?;

        let now = schedule_utils::now_rfc3339();
        let record = SalonRecord {
            id: Uuid::new_v4().to_string(),
            name,
            timezone,
            open_minute,
            close_minute,
            is_active: true,
            created_at: now.clone(),
            updated_at: now,
        };
        self.db
            .with_connection(|conn| SalonRepository::insert(conn, &SalonRow::from_record(&record)))
            .map_err(|err| AppError::persistence("insert salon", err))?;
        info!(target: "app::schedule", salon_id = %record.id, timezone = %record.timezone, "salon created");
        Ok(record)
    }

    pub fn get(&self, id: &str) -> AppResult<Option<SalonRecord>> {
        require_user(self.session.as_ref())?;
        let row = self
            .db
            .with_connection(|conn| SalonRepository::find_by_id(conn, id))?;
        Ok(row.map(SalonRow::into_record))
    }

    pub fn list(&self) -> AppResult<Vec<SalonRecord>> {
        require_user(self.session.as_ref())?;
        let rows = self.db.with_connection(SalonRepository::list_all)?;
        debug!(target: "app::schedule", count = rows.len(), "salons listed");
        Ok(rows.into_iter().map(SalonRow::into_record).collect())
    }

    pub fn update_hours(
        &self,
        id: &str,
        open_minute: u32,
        close_minute: u32,
    ) -> AppResult<SalonRecord> {
        require_user(self.session.as_ref())?;
        validate_hours(open_minute, close_minute)?;
        let now = schedule_utils::now_rfc3339();
        let record = self.db.with_transaction(|tx| {
            SalonRepository::update_hours(tx, id, open_minute, close_minute, &now)?;
            SalonRepository::find_by_id(tx, id)?
                .map(SalonRow::into_record)
                .ok_or_else(AppError::not_found)
        })?;
        info!(target: "app::schedule", salon_id = id, open_minute, close_minute, "salon hours updated");
        Ok(record)
    }

    pub fn create_service(&self, input: ServiceCreateInput) -> AppResult<ServiceRecord> {
        require_user(self.session.as_ref())?;
        let name = input.name.trim().to_string();
        if name.is_empty() {
            return Err(AppError::validation("service name is required"));
        }
        if input.duration_minutes <= 0 {
            return Err(AppError::validation("service duration must be positive"));
        }
        let price = input.price.unwrap_or(0.0);
        if !price.is_finite() || price < 0.0 {
            return Err(AppError::validation("service price must not be negative"));
        }

        let now = schedule_utils::now_rfc3339();
        let record = ServiceRecord {
            id: Uuid::new_v4().to_string(),
            salon_id: input.salon_id.clone(),
            name,
            duration_minutes: input.duration_minutes,
            price,
            created_at: now.clone(),
            updated_at: now,
        };
        self.db.with_transaction(|tx| {
            SalonRepository::find_by_id(tx, &record.salon_id)?
                .ok_or_else(|| AppError::validation(format!("unknown salon {}", record.salon_id)))?;
            SalonRepository::insert_service(tx, &ServiceRow::from_record(&record))
                .map_err(|err| AppError::persistence("insert service", err))
        })?;
        info!(target: "app::schedule", service_id = %record.id, salon_id = %record.salon_id, "service created");
        Ok(record)
    }

    pub fn list_services(&self, salon_id: &str) -> AppResult<Vec<ServiceRecord>> {
        require_user(self.session.as_ref())?;
        let rows = self
            .db
            .with_connection(|conn| SalonRepository::list_services(conn, salon_id))?;
        Ok(rows.into_iter().map(ServiceRow::into_record).collect())
    }
}

fn validate_hours(open_minute: u32, close_minute: u32) -> AppResult<()> {
    if open_minute >= close_minute || close_minute > 24 * 60 {
        return Err(AppError::validation(
            "operating hours must be a non-empty range within one day",
        ));
    }
    Ok(())
}
