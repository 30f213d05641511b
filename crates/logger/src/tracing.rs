use std::env::var;
use std::str::FromStr;

use tracing::{level_filters::LevelFilter, warn};
use tracing_subscriber::{Layer, filter::EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

/// Output format of the log layer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    #[default]
    Compact,
    Json,
}

impl FromStr for LogFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "compact" | "" => Ok(Self::Compact),
            "json" => Ok(Self::Json),
            other => Err(format!("unknown log format '{other}'")),
        }
    }
}

/// Level and format used when `RUST_LOG` / `RUST_LOG_FORMAT` are not set
#[derive(Debug, Clone)]
pub struct LogSettings {
    pub level: LevelFilter,
    pub format: LogFormat,
}

impl Default for LogSettings {
    fn default() -> Self {
        Self { level: LevelFilter::INFO, format: LogFormat::Compact }
    }
}

impl LogSettings {
    /// Build settings from the textual values found in a config file.
    /// Unparseable values fall back to the defaults.
    pub fn from_strings(level: &str, format: &str) -> Self {
        let defaults = Self::default();
        Self {
            level: level.parse().unwrap_or(defaults.level),
            format: format.parse().unwrap_or(defaults.format),
        }
    }
}

pub fn init() {
    init_with(&LogSettings::default());
}

/// Initialize the global tracing subscriber.
///
/// `RUST_LOG` overrides the configured level and `RUST_LOG_FORMAT` overrides
/// the configured format. Calling this twice is a no-op.
pub fn init_with(settings: &LogSettings) {
    let env_filter =
        EnvFilter::builder().with_default_directive(settings.level.into()).from_env_lossy();

    let format = match var("RUST_LOG_FORMAT") {
        Ok(raw) => raw.parse().unwrap_or_else(|error| {
            warn!("Ignoring RUST_LOG_FORMAT: {error}");
            settings.format
        }),
        Err(_) => settings.format,
    };

    let log_layer = match format {
        LogFormat::Json => tracing_subscriber::fmt::layer().json().with_filter(env_filter).boxed(),
        LogFormat::Compact => {
            tracing_subscriber::fmt::layer().compact().with_target(false).with_filter(env_filter).boxed()
        }
    };

    let _ = tracing_subscriber::registry().with(log_layer).try_init();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_formats() {
        assert_eq!("json".parse::<LogFormat>(), Ok(LogFormat::Json));
        assert_eq!("Compact".parse::<LogFormat>(), Ok(LogFormat::Compact));
        assert!("xml".parse::<LogFormat>().is_err());
    }

    #[test]
    fn bad_values_fall_back_to_defaults() {
        let settings = LogSettings::from_strings("loud", "xml");
        assert_eq!(settings.level, LevelFilter::INFO);
        assert_eq!(settings.format, LogFormat::Compact);

        let settings = LogSettings::from_strings("debug", "json");
        assert_eq!(settings.level, LevelFilter::DEBUG);
        assert_eq!(settings.format, LogFormat::Json);
    }
}
