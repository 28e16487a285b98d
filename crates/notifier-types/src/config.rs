//! Configuration loading for the user notifier.
//!
//! Layered config: defaults -> config file -> env vars -> CLI flags.
//! The default config file lives at ~/.config/user-notifier/config.toml.
//! Environment variables use the `NOTIFIER_` prefix and `__` between
//! nested keys, e.g. `NOTIFIER_SMTP__HOST` or `NOTIFIER_SCHEDULE__INTERVAL_SECS`.

use std::path::PathBuf;
use std::time::Duration;

use config::{Config, Environment, File};
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};

use crate::error::NotifierError;

/// Recurring schedule for the email job.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScheduleSettings {
    /// Seconds between runs. The first run fires immediately on start.
    #[serde(default = "default_interval_secs")]
    pub interval_secs: u64,

    /// Optional 6-field cron expression. Takes precedence over the interval.
    #[serde(default)]
    pub cron: Option<String>,

    /// IANA timezone for cron schedules.
    #[serde(default = "default_timezone")]
    pub timezone: String,

    /// How long shutdown waits for an in-flight run to finish.
    #[serde(default = "default_shutdown_timeout_secs")]
    pub shutdown_timeout_secs: u64,
}

fn default_interval_secs() -> u64 {
    180
}

fn default_timezone() -> String {
    "UTC".to_string()
}

fn default_shutdown_timeout_secs() -> u64 {
    30
}

impl Default for ScheduleSettings {
    fn default() -> Self {
        Self {
            interval_secs: default_interval_secs(),
            cron: None,
            timezone: default_timezone(),
            shutdown_timeout_secs: default_shutdown_timeout_secs(),
        }
    }
}

impl ScheduleSettings {
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }
}

/// Remote user directory endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DirectorySettings {
    /// Base URL; the client appends `/api/User`.
    #[serde(default = "default_directory_base_url")]
    pub base_url: String,

    /// Per-request timeout in seconds.
    #[serde(default = "default_request_timeout_secs")]
    pub timeout_secs: u64,

    /// Retries for transport errors and 5xx responses.
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
}

fn default_directory_base_url() -> String {
    "https://localhost:7013".to_string()
}

fn default_request_timeout_secs() -> u64 {
    30
}

fn default_max_retries() -> u32 {
    2
}

impl Default for DirectorySettings {
    fn default() -> Self {
        Self {
            base_url: default_directory_base_url(),
            timeout_secs: default_request_timeout_secs(),
            max_retries: default_max_retries(),
        }
    }
}

/// Transport security for the SMTP connection.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, Default, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum SmtpTls {
    /// Plain connection upgraded with STARTTLS (default, port 587)
    #[default]
    Starttls,
    /// Implicit TLS (port 465)
    Tls,
    /// No encryption; local relays and tests only
    None,
}

/// SMTP transport settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SmtpSettings {
    #[serde(default = "default_smtp_host")]
    pub host: String,

    #[serde(default = "default_smtp_port")]
    pub port: u16,

    #[serde(default)]
    pub username: Option<String>,

    /// Password (prefer NOTIFIER_SMTP__PASSWORD over the config file)
    #[serde(default)]
    pub password: Option<String>,

    #[serde(default)]
    pub tls: SmtpTls,

    #[serde(default = "default_request_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_smtp_host() -> String {
    "localhost".to_string()
}

fn default_smtp_port() -> u16 {
    587
}

impl Default for SmtpSettings {
    fn default() -> Self {
        Self {
            host: default_smtp_host(),
            port: default_smtp_port(),
            username: None,
            password: None,
            tls: SmtpTls::default(),
            timeout_secs: default_request_timeout_secs(),
        }
    }
}

/// Content of the notification email.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MailSettings {
    #[serde(default = "default_from_email")]
    pub from_email: String,

    #[serde(default = "default_subject")]
    pub subject: String,

    #[serde(default = "default_body")]
    pub body: String,
}

fn default_from_email() -> String {
    "noreply@localhost".to_string()
}

fn default_subject() -> String {
    "Test Email".to_string()
}

fn default_body() -> String {
    "This is a test email sent by the notifier job.".to_string()
}

impl Default for MailSettings {
    fn default() -> Self {
        Self {
            from_email: default_from_email(),
            subject: default_subject(),
            body: default_body(),
        }
    }
}

/// Completion flag policy.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CompletionSettings {
    /// Clear the flag when a run starts with pending users, so a previous
    /// run's "complete" is not reported while a new batch is in progress.
    #[serde(default)]
    pub reset_on_pending: bool,
}

/// Main application settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Directory for daily-rolling log files; console only when unset
    #[serde(default)]
    pub log_dir: Option<String>,

    #[serde(default)]
    pub schedule: ScheduleSettings,

    #[serde(default)]
    pub directory: DirectorySettings,

    #[serde(default)]
    pub smtp: SmtpSettings,

    #[serde(default)]
    pub mail: MailSettings,

    #[serde(default)]
    pub completion: CompletionSettings,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            log_dir: None,
            schedule: ScheduleSettings::default(),
            directory: DirectorySettings::default(),
            smtp: SmtpSettings::default(),
            mail: MailSettings::default(),
            completion: CompletionSettings::default(),
        }
    }
}

impl Settings {
    /// Load settings with layered precedence:
    /// 1. Built-in defaults
    /// 2. Config file (~/.config/user-notifier/config.toml)
    /// 3. CLI-specified config file (optional)
    /// 4. Environment variables (NOTIFIER_*)
    ///
    /// CLI flags should be applied by the caller after this returns.
    pub fn load(cli_config_path: Option<&str>) -> Result<Self, NotifierError> {
        Self::load_with_env(cli_config_path, env_source())
    }

    fn load_with_env(
        cli_config_path: Option<&str>,
        env: Environment,
    ) -> Result<Self, NotifierError> {
        let config_dir = ProjectDirs::from("", "", "user-notifier")
            .map(|p| p.config_dir().to_path_buf())
            .unwrap_or_else(|| PathBuf::from("."));

        let default_config_path = config_dir.join("config");

        let mut builder = Config::builder()
            .set_default("log_level", default_log_level())
            .map_err(|e| NotifierError::Config(e.to_string()))?
            .set_default("schedule.interval_secs", default_interval_secs())
            .map_err(|e| NotifierError::Config(e.to_string()))?
            .set_default("schedule.timezone", default_timezone())
            .map_err(|e| NotifierError::Config(e.to_string()))?
            .set_default("directory.base_url", default_directory_base_url())
            .map_err(|e| NotifierError::Config(e.to_string()))?
            .set_default("smtp.host", default_smtp_host())
            .map_err(|e| NotifierError::Config(e.to_string()))?
            .set_default("smtp.port", default_smtp_port() as i64)
            .map_err(|e| NotifierError::Config(e.to_string()))?
            .set_default("mail.from_email", default_from_email())
            .map_err(|e| NotifierError::Config(e.to_string()))?
            .add_source(File::with_name(&default_config_path.to_string_lossy()).required(false));

        if let Some(path) = cli_config_path {
            builder = builder.add_source(File::with_name(path).required(true));
        }

        builder = builder.add_source(env);

        let config = builder
            .build()
            .map_err(|e| NotifierError::Config(e.to_string()))?;

        let settings: Settings = config
            .try_deserialize()
            .map_err(|e| NotifierError::Config(e.to_string()))?;

        settings.validate()?;
        Ok(settings)
    }

    /// Reject settings the scheduler or clients cannot work with.
    pub fn validate(&self) -> Result<(), NotifierError> {
        if self.schedule.interval_secs == 0 && self.schedule.cron.is_none() {
            return Err(NotifierError::Config(
                "schedule.interval_secs must be > 0".to_string(),
            ));
        }
        if !(self.directory.base_url.starts_with("http://")
            || self.directory.base_url.starts_with("https://"))
        {
            return Err(NotifierError::Config(format!(
                "directory.base_url must be an http(s) URL, got '{}'",
                self.directory.base_url
            )));
        }
        if self.mail.from_email.trim().is_empty() {
            return Err(NotifierError::Config(
                "mail.from_email must not be empty".to_string(),
            ));
        }
        if self.smtp.port == 0 {
            return Err(NotifierError::Config("smtp.port must be > 0".to_string()));
        }
        if self.smtp.username.is_some() != self.smtp.password.is_some() {
            return Err(NotifierError::Config(
                "smtp.username and smtp.password must be set together".to_string(),
            ));
        }
        Ok(())
    }
}

fn env_source() -> Environment {
    Environment::with_prefix("NOTIFIER")
        .prefix_separator("_")
        .separator("__")
        .try_parsing(true)
}
