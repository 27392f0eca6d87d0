use crate::types::LogLevel;
use std::path::PathBuf;
use tracing_subscriber::fmt::{self, format::FmtSpan};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Registry};

/// One-shot process-wide logging setup. Call exactly once, at the top of
/// `main`, never as a per-module lazily-initialized singleton.
pub struct Logger {
    level: LogLevel,
    log_file: Option<PathBuf>,
}

impl Logger {
    pub fn new(level: LogLevel, log_file: Option<PathBuf>) -> Self {
        Self { level, log_file }
    }

    pub fn init(&self) -> Result<(), Box<dyn std::error::Error>> {
        let filter = EnvFilter::new(self.level.as_filter_str());
        let registry = Registry::default().with(filter);

        let stdout_layer = fmt::layer()
            .with_span_events(FmtSpan::CLOSE)
            .with_target(false);

        if let Some(log_file) = &self.log_file {
            let dir = log_file
                .parent()
                .filter(|p| !p.as_os_str().is_empty())
                .unwrap_or_else(|| std::path::Path::new("."));
            let file_name = log_file
                .file_name()
                .map(|n| n.to_string_lossy().to_string())
                .unwrap_or_else(|| "FlowCon.log".to_string());
            let file_appender = tracing_appender::rolling::never(dir, file_name);
            let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);
            // Leak the guard: logging must stay live for the process lifetime.
            std::mem::forget(guard);

            let file_layer = fmt::layer()
                .with_writer(non_blocking)
                .with_span_events(FmtSpan::CLOSE)
                .with_target(false)
                .with_ansi(false);

            registry.with(stdout_layer).with(file_layer).try_init()?;
        } else {
            registry.with(stdout_layer).try_init()?;
        }

        Ok(())
    }
}
