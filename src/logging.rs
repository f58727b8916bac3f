use std::path::Path;
use std::sync::Once;

use tracing_appender::{
    non_blocking::WorkerGuard,
    rolling::{RollingFileAppender, Rotation},
};
use tracing_subscriber::{filter::EnvFilter, layer::SubscriberExt, util::SubscriberInitExt, Layer};

// Log targets
pub const INDEX_BUILD: &str = "fieldbox_index";
pub const CANDIDATES: &str = "fieldbox_candidates";
pub const POINTER_RESOLVE: &str = "fieldbox_pointer";
pub const STRATEGY: &str = "fieldbox_strategy";
pub const ORCHESTRATOR: &str = "fieldbox_orchestrator";

pub const LOG_FILE_NAME: &str = "fieldbox-resolver.log";

static INIT: Once = Once::new();

/// Installs a stdout subscriber filtered by `RUST_LOG`.
///
/// Only the first call (across both init functions) installs anything; later
/// calls return `None` without spawning a writer thread. Keep the returned
/// guard alive for as long as logs should be flushed.
pub fn init_logging() -> Option<WorkerGuard> {
    let mut guard = None;

    INIT.call_once(|| {
        let (writer, worker) = tracing_appender::non_blocking(std::io::stdout());
        let layer = tracing_subscriber::fmt::layer()
            .with_writer(writer)
            .with_target(true)
            .with_filter(EnvFilter::from_default_env());
        if tracing_subscriber::registry().with(layer).try_init().is_ok() {
            guard = Some(worker);
        }
    });

    guard
}

/// Like [`init_logging`] but writes to `<log_dir>/fieldbox-resolver.log`.
/// Resolver targets default to `debug` in the file. The log file is only
/// opened by the call that installs the subscriber.
pub fn init_logging_with_dir(log_dir: &Path) -> std::io::Result<Option<WorkerGuard>> {
    std::fs::create_dir_all(log_dir)?;
    let mut guard = None;

    INIT.call_once(|| {
        let file_appender = RollingFileAppender::new(Rotation::NEVER, log_dir, LOG_FILE_NAME);
        let (writer, worker) = tracing_appender::non_blocking(file_appender);
        let filter = [INDEX_BUILD, CANDIDATES, POINTER_RESOLVE, STRATEGY, ORCHESTRATOR]
            .iter()
            .fold(EnvFilter::from_default_env(), |filter, target| {
                match format!("{target}=debug").parse() {
                    Ok(directive) => filter.add_directive(directive),
                    Err(_) => filter,
                }
            });

        let layer = tracing_subscriber::fmt::layer()
            .with_writer(writer)
            .with_ansi(false)
            .with_thread_ids(true)
            .with_filter(filter);
        if tracing_subscriber::registry().with(layer).try_init().is_ok() {
            guard = Some(worker);
        }
    });

    Ok(guard)
}
