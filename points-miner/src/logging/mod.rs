//! Logging setup: console output plus a daily-rotated log file.

use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::error::{Error, Result};

/// Default log filter directive.
pub const DEFAULT_LOG_FILTER: &str = "points_miner=info,twitch_gql=info,sqlx=warn";

/// Initialize logging; keep the returned guard alive for the process
/// lifetime so buffered file output is flushed on exit.
pub fn init_logging(log_dir: &str) -> Result<WorkerGuard> {
    std::fs::create_dir_all(log_dir)?;

    let file_appender = tracing_appender::rolling::daily(log_dir, "points-miner.log");
    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER));

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_ansi(true))
        .with(fmt::layer().with_writer(non_blocking).with_ansi(false))
        .try_init()
        .map_err(|e| Error::Configuration(format!("failed to init logging: {e}")))?;

    Ok(guard)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_filter_covers_both_crates() {
        assert!(DEFAULT_LOG_FILTER.contains("points_miner=info"));
        assert!(DEFAULT_LOG_FILTER.contains("twitch_gql=info"));
        assert!(DEFAULT_LOG_FILTER.contains("sqlx=warn"));
    }
}
