use std::path::Path;

use once_cell::sync::OnceCell;
use tracing_subscriber::{
    fmt, fmt::time::UtcTime, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter,
};

use crate::error::{AppError, AppResult};

static LOGGER_INIT: OnceCell<()> = OnceCell::new();
static LOGGER_GUARD: OnceCell<tracing_appender::non_blocking::WorkerGuard> = OnceCell::new();

const DEFAULT_LOG_DIRECTIVES: &str = "info,app::schedule=debug,app::db=info";
const LOG_FILE_PREFIX: &str = "salon-schedule.log";

/// Installs the global subscriber once: a daily rolling file under `log_dir`
/// plus stdout. `RUST_LOG` overrides the default directives.
pub fn init_logging(log_dir: &Path) -> AppResult<()> {
    LOGGER_INIT
        .get_or_try_init(|| {
            std::fs::create_dir_all(log_dir)?;

            let file_appender = tracing_appender::rolling::daily(log_dir, LOG_FILE_PREFIX);
            let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

            let env_filter = EnvFilter::try_from_default_env()
                .or_else(|_| EnvFilter::try_new(DEFAULT_LOG_DIRECTIVES))
                .map_err(|err| AppError::other(format!("invalid log directives: {err}")))?;

            LOGGER_GUARD
                .set(guard)
                .map_err(|_| AppError::other("logging already initialized"))?;

            tracing_subscriber::registry()
                .with(env_filter)
                .with(
                    fmt::layer()
                        .with_writer(non_blocking)
                        .with_ansi(false)
                        .with_target(true)
                        .with_timer(UtcTime::rfc_3339()),
                )
                .with(
                    fmt::layer()
                        .with_target(false)
                        .with_timer(UtcTime::rfc_3339()),
                )
                .try_init()
                .map_err(|err| AppError::other(format!("failed to install subscriber: {err}")))?;

            Ok(())
        })
        .map(|_| ())
}
