use time::{macros::format_description, UtcOffset};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt::time::OffsetTime, EnvFilter};

/// Installs the global subscriber.
///
/// With `log_dir` set, records go to a daily rolling file through a
/// non-blocking writer and the returned guard must be held until exit so the
/// last lines are flushed. Otherwise records go to stdout. `RUST_LOG`
/// overrides `level`.
pub fn init_log(log_dir: Option<&str>, level: &str) -> Result<Option<WorkerGuard>, anyhow::Error> {
    let local_time = OffsetTime::new(
        UtcOffset::current_local_offset().unwrap_or(UtcOffset::UTC),
        format_description!("[year]-[month]-[day] [hour]:[minute]:[second].[subsecond digits:3]"),
    );
    let filter = EnvFilter::try_from_default_env().or_else(|_| EnvFilter::try_new(level))?;

    match log_dir {
        Some(dir) => {
            let file_appender = tracing_appender::rolling::daily(dir, "frame-peer");
            let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);
            tracing_subscriber::fmt()
                .with_timer(local_time)
                .with_env_filter(filter)
                .with_ansi(false)
                .with_writer(non_blocking)
                .try_init()
                .map_err(|e| anyhow::anyhow!(e))?;
            Ok(Some(guard))
        }
        None => {
            tracing_subscriber::fmt()
                .with_timer(local_time)
                .with_env_filter(filter)
                .try_init()
                .map_err(|e| anyhow::anyhow!(e))?;
            Ok(None)
        }
    }
}
