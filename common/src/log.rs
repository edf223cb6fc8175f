use std::io;
use std::sync::atomic::{AtomicBool, Ordering};

use tracing::Level;
use tracing_appender::rolling;
use tracing_subscriber::fmt::writer::MakeWriterExt;

static INITIALIZED: AtomicBool = AtomicBool::new(false);

#[derive(Debug, Clone)]
pub enum LogTarget {
    Stdout,
    RollingFile { dir: String },
}

#[derive(Debug, Clone)]
pub struct LogOptions {
    pub level: Level,
    pub target: LogTarget,
}

impl Default for LogOptions {
    fn default() -> Self {
        LogOptions {
            level: Level::INFO,
            target: LogTarget::Stdout,
        }
    }
}

impl LogOptions {
    pub fn debug() -> Self {
        LogOptions {
            level: Level::DEBUG,
            target: LogTarget::Stdout,
        }
    }
}

/// Initializes the global `tracing` subscriber. Idempotent: later calls
/// after the first are no-ops.
pub fn init(options: LogOptions) {
    if INITIALIZED.swap(true, Ordering::SeqCst) {
        return;
    }

    let format = tracing_subscriber::fmt::format()
        .with_file(true)
        .with_line_number(false)
        .with_target(false)
        .with_thread_ids(true)
        .compact();

    match options.target {
        LogTarget::Stdout => {
            let _ = tracing_subscriber::fmt()
                .with_max_level(options.level)
                .event_format(format)
                .try_init();
        }
        LogTarget::RollingFile { dir } => {
            let file_appender = rolling::daily(&dir, "replicate-core.log");
            let writer = file_appender.and(io::stdout);
            let _ = tracing_subscriber::fmt()
                .with_max_level(options.level)
                .event_format(format)
                .with_writer(writer)
                .try_init();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn init_is_idempotent() {
        init(LogOptions::debug());
        init(LogOptions::debug());
        tracing::info!("logging initialized");
    }
}
