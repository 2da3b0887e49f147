use std::collections::HashMap;
use std::sync::RwLock;

use serde_json::json;
use tracing::{info, warn};

use crate::db::repositories::settings_repository::{SettingRow, SettingsRepository};
use crate::db::DbPool;
use crate::error::{AppError, AppResult};
use crate::models::settings::{SchedulingSettings, SchedulingSettingsUpdate};
use crate::services::schedule_utils;
use crate::services::session::{require_user, SharedSession};

const KEY_SLOT_MINUTES: &str = "slot_minutes";
const KEY_OPEN_MINUTE: &str = "default_open_minute";
const KEY_CLOSE_MINUTE: &str = "default_close_minute";
const KEY_MINIMUM_BREAK: &str = "minimum_break_minutes";
const KEY_OPTIMIZER_DEADLINE: &str = "optimizer_deadline_ms";
const KEY_MAX_SUGGESTIONS: &str = "max_suggestions";

const MINUTES_PER_DAY: u32 = 24 * 60;

pub struct SettingsService {
    db: DbPool,
    session: SharedSession,
    cache: RwLock<Option<SchedulingSettings>>,
}

impl SettingsService {
    pub fn new(db: DbPool, session: SharedSession) -> Self {
        Self {
            db,
            session,
            cache: RwLock::new(None),
        }
    }

    /// Current settings. Used internally by the engine, so no session is needed.
    pub fn current(&self) -> AppResult<SchedulingSettings> {
        if let Ok(guard) = self.cache.read() {
            if let Some(settings) = guard.as_ref() {
                return Ok(settings.clone());
            }
        }

        let settings = self.load_from_db()?;
        if let Ok(mut guard) = self.cache.write() {
            *guard = Some(settings.clone());
        }
        Ok(settings)
    }

    pub fn get(&self) -> AppResult<SchedulingSettings> {
        require_user(self.session.as_ref())?;
        self.current()
    }

    pub fn update(&self, input: SchedulingSettingsUpdate) -> AppResult<SchedulingSettings> {
        let user = require_user(self.session.as_ref())?;
        let mut next = self.current()?;

        if let Some(value) = input.slot_minutes {
            next.slot_minutes = value;
        }
        if let Some(value) = input.default_open_minute {
            next.default_open_minute = value;
        }
        if let Some(value) = input.default_close_minute {
            next.default_close_minute = value;
        }
        if let Some(value) = input.minimum_break_minutes {
            next.minimum_break_minutes = value;
        }
        if let Some(value) = input.optimizer_deadline_ms {
            next.optimizer_deadline_ms = value;
        }
        if let Some(value) = input.max_suggestions {
            next.max_suggestions = value;
        }
        validate(&next)?;

        let now = schedule_utils::now_rfc3339();
        let pairs = [
            (KEY_SLOT_MINUTES, next.slot_minutes.to_string()),
            (KEY_OPEN_MINUTE, next.default_open_minute.to_string()),
            (KEY_CLOSE_MINUTE, next.default_close_minute.to_string()),
            (KEY_MINIMUM_BREAK, next.minimum_break_minutes.to_string()),
            (KEY_OPTIMIZER_DEADLINE, next.optimizer_deadline_ms.to_string()),
            (KEY_MAX_SUGGESTIONS, next.max_suggestions.to_string()),
        ];
        self.db.with_transaction(|tx| {
            for (key, value) in &pairs {
                SettingsRepository::upsert(tx, key, value, &now)?;
            }
            Ok(())
        })?;
        next.updated_at = now;

        if let Ok(mut guard) = self.cache.write() {
            *guard = Some(next.clone());
        }
        info!(target: "app::settings", user_id = %user.id, "scheduling settings updated");
        Ok(next)
    }

    /// Drops every stored value so the defaults apply again.
    pub fn reset(&self) -> AppResult<SchedulingSettings> {
        require_user(self.session.as_ref())?;
        let removed = self.db.with_connection(SettingsRepository::clear_scheduling)?;
        if let Ok(mut guard) = self.cache.write() {
            *guard = None;
        }
        info!(target: "app::settings", removed, "scheduling settings reset");
        self.current()
    }

    fn load_from_db(&self) -> AppResult<SchedulingSettings> {
        let rows = self.db.with_connection(SettingsRepository::list_scheduling)?;
        let mut latest_updated_at: Option<String> = None;
        let mut map: HashMap<String, SettingRow> = HashMap::new();
        for row in rows {
            latest_updated_at = match latest_updated_at {
                Some(current) if current >= row.updated_at => Some(current),
                _ => Some(row.updated_at.clone()),
            };
            map.insert(row.short_key().to_string(), row);
        }

        let defaults = SchedulingSettings::default();
        let settings = SchedulingSettings {
            slot_minutes: parsed(&map, KEY_SLOT_MINUTES).unwrap_or(defaults.slot_minutes),
            default_open_minute: parsed(&map, KEY_OPEN_MINUTE)
                .unwrap_or(defaults.default_open_minute),
            default_close_minute: parsed(&map, KEY_CLOSE_MINUTE)
                .unwrap_or(defaults.default_close_minute),
            minimum_break_minutes: parsed(&map, KEY_MINIMUM_BREAK)
                .unwrap_or(defaults.minimum_break_minutes),
            optimizer_deadline_ms: parsed(&map, KEY_OPTIMIZER_DEADLINE)
                .unwrap_or(defaults.optimizer_deadline_ms),
            max_suggestions: parsed(&map, KEY_MAX_SUGGESTIONS)
                .unwrap_or(defaults.max_suggestions),
            updated_at: latest_updated_at.unwrap_or_else(schedule_utils::now_rfc3339),
        };

        if let Err(err) = validate(&settings) {
            warn!(
                target: "app::settings",
                error = %err,
                "stored scheduling settings invalid, falling back to defaults"
            );
            return Ok(SchedulingSettings {
                updated_at: settings.updated_at,
                ..defaults
            });
        }
        Ok(settings)
    }
}

fn parsed<T: std::str::FromStr>(map: &HashMap<String, SettingRow>, key: &str) -> Option<T> {
    let row = map.get(key)?;
    match row.value.trim().parse::<T>() {
        Ok(value) => Some(value),
        Err(_) => {
            warn!(target: "app::settings", key, value = %row.value, "ignoring unparsable setting");
            None
        }
    }
}

pub fn validate(settings: &SchedulingSettings) -> AppResult<()> {
    if settings.slot_minutes == 0 || 60 % settings.slot_minutes != 0 {
        return Err(AppError::validation_with_details(
            "slot length must divide an hour evenly",
            json!({"slotMinutes": settings.slot_minutes}),
        ));
    }
    if settings.default_open_minute >= settings.default_close_minute
        || settings.default_close_minute > MINUTES_PER_DAY
    {
        return Err(AppError::validation_with_details(
            "opening time must be before closing time within one day",
            json!({
                "openMinute": settings.default_open_minute,
                "closeMinute": settings.default_close_minute,
            }),
        ));
    }
    if settings.minimum_break_minutes < 0 {
        return Err(AppError::validation("minimum break cannot be negative"));
    }
    if settings.optimizer_deadline_ms == 0 {
        return Err(AppError::validation("optimizer deadline must be positive"));
    }
    if settings.max_suggestions == 0 {
        return Err(AppError::validation("at least one suggestion must be allowed"));
    }
    Ok(())
}
