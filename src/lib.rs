pub mod commands;
pub mod db;
pub mod error;
pub mod models;
pub mod services;
pub mod utils;

use std::path::PathBuf;

use tracing::info;

use crate::commands::AppState;
use crate::db::DbPool;
use crate::error::AppResult;
use crate::services::session::SharedSession;

/// Where the embedding application keeps its data.
#[derive(Debug, Clone)]
pub struct BootstrapConfig {
    pub database_path: PathBuf,
    /// Logging is left to the host when `None`.
    pub log_dir: Option<PathBuf>,
}

impl BootstrapConfig {
    /// `salon-schedule.sqlite` plus a `logs/` directory under `data_dir`.
    pub fn in_dir(data_dir: impl Into<PathBuf>) -> Self {
        let data_dir = data_dir.into();
        Self {
            database_path: data_dir.join("salon-schedule.sqlite"),
            log_dir: Some(data_dir.join("logs")),
        }
    }
}

/// Initializes logging, opens the database and wires every service.
pub fn bootstrap(config: &BootstrapConfig, session: SharedSession) -> AppResult<AppState> {
    if let Some(log_dir) = &config.log_dir {
        crate::utils::logger::init_logging(log_dir)?;
    }
    let pool = DbPool::new(config.database_path.clone())?;
    let state = AppState::new(pool, session)?;
    info!(
        target: "app::db",
        db_path = %config.database_path.display(),
        "scheduling core ready"
    );
    Ok(state)
}
