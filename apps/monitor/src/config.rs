use std::{env, fmt, fs, io, path, time::Duration};

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("failed to read config file: {0}")]
    ReadFailed(#[source] io::Error),
    #[error("failed to write config file: {0}")]
    WriteFailed(#[source] io::Error),
    #[error("failed to parse config file: {0}")]
    ParseFailed(#[from] toml::de::Error),
    #[error("failed to serialize config: {0}")]
    SerializeFailed(#[from] toml::ser::Error),
    #[error("no config path available (neither XDG_CONFIG_HOME nor HOME is set)")]
    ConfigPathUnavailable,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub database: DatabaseConfig,
    pub schedule: ScheduleConfig,
    pub http: HttpConfig,
    pub inbound: InboundConfig,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sms_gateway: Option<SmsGatewayConfig>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mail: Option<MailConfig>,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    pub path: String,
}

/// The single recurring job driving poll cycles
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ScheduleConfig {
    pub description: String,
    pub tick_seconds: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HttpConfig {
    pub user_agent: String,
}

/// Webhook the SMS gateway pushes inbound messages to
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct InboundConfig {
    pub enabled: bool,
    pub bind: String,
    pub port: u16,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SmsGatewayConfig {
    pub url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,
    #[serde(default = "default_request_timeout")]
    pub request_timeout_seconds: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MailConfig {
    pub relay_url: String,
    pub from: String,
    #[serde(default = "default_request_timeout")]
    pub request_timeout_seconds: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
    pub format: String,
}

fn default_request_timeout() -> u64 {
    10
}

/// Used to ensure we are actually reading a toml file
fn normalize_toml_path(path: &path::Path) -> path::PathBuf {
    let mut path = path.to_path_buf();
    if path.extension().map(|ext| ext != "toml").unwrap_or(true) {
        path.set_extension("toml");
    }
    path
}

/// Get default config path ($XDG_CONFIG_HOME/service-monitor/config.toml or
/// $HOME/.config/...)
fn default_config_path() -> Result<path::PathBuf, Error> {
    #[allow(deprecated)]
    let path = if let Ok(config_home) = env::var("XDG_CONFIG_HOME") {
        path::PathBuf::from(config_home)
    } else if let Some(home_dir) = env::home_dir() {
        home_dir.join(".config")
    } else {
        return Err(Error::ConfigPathUnavailable);
    };

    Ok(path.join("service-monitor/config.toml"))
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self { path: "service-monitor.db".into() }
    }
}

impl Default for ScheduleConfig {
    fn default() -> Self {
        Self { description: "Service Monitor Schedule".into(), tick_seconds: 60 }
    }
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self { user_agent: concat!("service-monitor/", env!("CARGO_PKG_VERSION")).into() }
    }
}

impl Default for InboundConfig {
    fn default() -> Self {
        Self { enabled: true, bind: "0.0.0.0".into(), port: 8080 }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self { level: "info".into(), format: "compact".into() }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            database: DatabaseConfig::default(),
            schedule: ScheduleConfig::default(),
            http: HttpConfig::default(),
            inbound: InboundConfig::default(),
            sms_gateway: None,
            mail: None,
            logging: LoggingConfig::default(),
        }
    }
}

impl ScheduleConfig {
    pub fn tick(&self) -> Duration {
        Duration::from_secs(self.tick_seconds.max(1))
    }
}

impl fmt::Display for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let write_indented = |level: usize| {
            move |f: &mut fmt::Formatter<'_>, label: &str, value: &dyn fmt::Display| {
                writeln!(f, "  {:indent$}{}: {}", "", label, value, indent = level * 2)
            }
        };
        let write_title_indented = |level: usize| {
            move |f: &mut fmt::Formatter<'_>, label: &str| {
                writeln!(f, "{:indent$}{}", "", label, indent = level * 2)
            }
        };

        let write_title_1 = write_title_indented(1);
        let write_1 = write_indented(1);

        writeln!(f, "Current Internal Configuration State:")?;
        write_title_1(f, "Database")?;
        write_1(f, "Path", &self.database.path)?;
        write_title_1(f, "Schedule")?;
        write_1(f, "Description", &self.schedule.description)?;
        write_1(f, "Tick (seconds)", &self.schedule.tick_seconds)?;
        write_title_1(f, "HTTP")?;
        write_1(f, "User Agent", &self.http.user_agent)?;
        write_title_1(f, "Inbound Webhook")?;
        write_1(f, "Enabled", &self.inbound.enabled)?;
        write_1(f, "Bind Address", &self.inbound.bind)?;
        write_1(f, "Port", &self.inbound.port)?;
        write_title_1(f, "SMS Gateway")?;
        match &self.sms_gateway {
            Some(gateway) => {
                write_1(f, "URL", &gateway.url)?;
                write_1(f, "Token", &if gateway.token.is_some() { "set" } else { "unset" })?;
                write_1(f, "Request Timeout (seconds)", &gateway.request_timeout_seconds)?;
            }
            None => write_1(f, "URL", &"not configured")?,
        }
        write_title_1(f, "Mail")?;
        match &self.mail {
            Some(mail) => {
                write_1(f, "Relay URL", &mail.relay_url)?;
                write_1(f, "From", &mail.from)?;
                write_1(f, "Request Timeout (seconds)", &mail.request_timeout_seconds)?;
            }
            None => write_1(f, "Relay URL", &"not configured (alerts are logged)")?,
        }
        write_title_1(f, "Logging")?;
        write_1(f, "Level", &self.logging.level)?;
        write_1(f, "Format", &self.logging.format)?;

        Ok(())
    }
}

impl Config {
    /// Generate Config structure from file
    ///
    /// Creates a default config in ~/.config/service-monitor/config.toml
    ///  or the specified path, with the name config.toml if one does not exist
    ///
    /// ```rust,ignore
    /// let cfg = config::Config::from_config(None::<&path::Path>)?;
    /// println!("{}", cfg);
    /// ```
    pub fn from_config(optional_path: Option<impl AsRef<path::Path>>) -> Result<Self, Error> {
        let config_path: path::PathBuf = if let Some(path) = optional_path {
            normalize_toml_path(path.as_ref())
        } else {
            default_config_path()?
        };

        if config_path.exists() {
            let raw_string = fs::read_to_string(&config_path).map_err(Error::ReadFailed)?;
            Ok(toml::from_str(raw_string.as_str())?)
        } else {
            let config = Self::default();
            config.write_config(&config_path)?;
            Ok(config)
        }
    }

    /// Serialize and write a config to a file
    pub fn write_config(&self, path: &path::Path) -> Result<(), Error> {
        let config_str: String = toml::to_string_pretty(self)?;

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(Error::WriteFailed)?;
        }

        fs::write(path, config_str).map_err(Error::WriteFailed)
    }

    pub fn log_settings(&self) -> logger::LogSettings {
        logger::LogSettings::from_strings(&self.logging.level, &self.logging.format)
    }
}
