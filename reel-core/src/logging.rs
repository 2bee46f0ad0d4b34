//! Process-wide log verbosity.
//!
//! The library reports through the `log` facade; the host application
//! installs whatever logger it likes. This shim only caps the maximum level,
//! mirroring the verbosity knob of the demuxer libraries the reader wraps.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LogLevel {
    Quiet,
    Error,
    Warning,
    Info,
    Debug,
}

impl From<LogLevel> for log::LevelFilter {
    fn from(level: LogLevel) -> Self {
        match level {
            LogLevel::Quiet => log::LevelFilter::Off,
            LogLevel::Error => log::LevelFilter::Error,
            LogLevel::Warning => log::LevelFilter::Warn,
            LogLevel::Info => log::LevelFilter::Info,
            LogLevel::Debug => log::LevelFilter::Debug,
        }
    }
}

/// Cap the process-wide log level. Intended to be called once at startup.
pub fn set_log_level(level: LogLevel) {
    log::set_max_level(level.into());
}
