//! Logging setup and error-tolerant logging for periodic tasks.
use std::fmt::Display;
use std::path::Path;
use std::sync::Mutex;
use tracing::{debug, info, warn};
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

// Keeps the non-blocking file writer flushing for the life of the process
static LOG_GUARD: Mutex<Option<tracing_appender::non_blocking::WorkerGuard>> = Mutex::new(None);

/// Log to stderr, filtered by `log_level` (an `EnvFilter` directive).
pub fn init_stderr(log_level: &str) -> eyre::Result<()> {
    let filter = EnvFilter::try_new(log_level)?;
    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(std::io::stderr))
        .try_init()?;
    Ok(())
}

/// Log to `log_file`, appending. Used while the terminal is owned by the dashboard.
pub fn init_file(log_level: &str, log_file: &Path) -> eyre::Result<()> {
    let filter = EnvFilter::try_new(log_level)?;
    let file = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(log_file)?;
    let (non_blocking, guard) = tracing_appender::non_blocking(file);

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_ansi(false).with_writer(non_blocking))
        .try_init()?;

    if let Ok(mut g) = LOG_GUARD.lock() {
        *g = Some(guard);
    }
    Ok(())
}

/// Reports the first failure of a streak loudly and repeats quietly, then
/// announces recovery once.
#[derive(Debug, Default)]
pub struct ErrorTolerantLogger {
    failures: u64,
}

impl ErrorTolerantLogger {
    pub fn failures(&self) -> u64 {
        self.failures
    }

    pub fn log<T, E: Display>(&mut self, result: &Result<T, E>, context: &str) {
        match result {
            Ok(_) => {
                if self.failures > 0 {
                    info!(failures = self.failures, "{} recovered", context);
                }
                self.failures = 0;
            }
            Err(err) => {
                self.failures += 1;
                if self.failures == 1 {
                    warn!(error = %err, "{}", context);
                } else {
                    debug!(error = %err, failures = self.failures, "{}", context);
                }
            }
        }
    }
}
