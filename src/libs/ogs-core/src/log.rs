//! Logging utilities
//!
//! Thin layer over the `log` facade and `env_logger` shared by NextGCore
//! daemons and tests.

pub use log::{debug, error, info, trace, warn};

/// Log levels accepted on the command line and in configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default)]
pub enum OgsLogLevel {
    None,
    Fatal,
    Error,
    Warn,
    #[default]
    Info,
    Debug,
    Trace,
}

impl OgsLogLevel {
    /// Parse a level name, falling back to `Info` for anything unknown
    pub fn from_name(name: &str) -> Self {
        match name.to_lowercase().as_str() {
            "none" => OgsLogLevel::None,
            "fatal" => OgsLogLevel::Fatal,
            "error" => OgsLogLevel::Error,
            "warn" | "warning" => OgsLogLevel::Warn,
            "debug" => OgsLogLevel::Debug,
            "trace" => OgsLogLevel::Trace,
            _ => OgsLogLevel::Info,
        }
    }

    pub fn to_filter(self) -> log::LevelFilter {
        match self {
            OgsLogLevel::None => log::LevelFilter::Off,
            OgsLogLevel::Fatal | OgsLogLevel::Error => log::LevelFilter::Error,
            OgsLogLevel::Warn => log::LevelFilter::Warn,
            OgsLogLevel::Info => log::LevelFilter::Info,
            OgsLogLevel::Debug => log::LevelFilter::Debug,
            OgsLogLevel::Trace => log::LevelFilter::Trace,
        }
    }
}

/// Initialize the process logger at `level` with millisecond timestamps.
///
/// Safe to call more than once; later calls are ignored.
pub fn ogs_log_init_level(level: OgsLogLevel, no_color: bool) {
    let style = if no_color {
        env_logger::WriteStyle::Never
    } else {
        env_logger::WriteStyle::Auto
    };

    let _ = env_logger::Builder::new()
        .filter_level(level.to_filter())
        .write_style(style)
        .format_timestamp_millis()
        .try_init();
}
