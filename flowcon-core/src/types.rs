use serde::{Deserialize, Serialize};

/// Opaque container-runtime identifier. Containers are identified by the
/// string the runtime itself hands back (a `docker ps -q` hash); FlowCon
/// never constructs or interprets the value.
pub type ContainerId = String;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
pub enum LogLevel {
    Error,
    Warn,
    #[default]
    Info,
    Debug,
    Trace,
}

impl LogLevel {
    pub fn as_filter_str(self) -> &'static str {
        match self {
            LogLevel::Error => "error",
            LogLevel::Warn => "warn",
            LogLevel::Info => "info",
            LogLevel::Debug => "debug",
            LogLevel::Trace => "trace",
        }
    }
}
