use config::{Config, Environment, File};
use serde::Deserialize;
use std::env;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Configuration build error: {0}")]
    Build(#[from] config::ConfigError),
    #[error("Invalid configuration: {0}")]
    Validation(String),
}

#[derive(Clone, Deserialize)]
pub struct SmtpConfig {
    pub server: String,
    pub port: u16,
    pub username: String,
    pub password: String,
    pub from: String,
}

/// Broker topology: where email requests are published, which subscription
/// the dispatch consumer drains, and where dead letters end up.
#[derive(Clone, Deserialize)]
pub struct BrokerConfig {
    pub email_topic: String,
    pub email_subscription: String,
    /// Dead-letter target. When unset the subscription keeps redelivering
    /// without escalation.
    pub dead_letter_topic: Option<String>,
    pub dead_letter_subscription: String,
    #[serde(default = "default_max_delivery_attempts")]
    pub max_delivery_attempts: u32,
    /// Flow-control cap on delivered-but-unacknowledged messages.
    pub max_outstanding_messages: Option<usize>,
}

#[derive(Clone, Deserialize)]
pub struct ConsumerConfig {
    /// Start the dispatch consumer at boot instead of waiting for the API.
    #[serde(default = "default_true")]
    pub auto_start: bool,
    /// Start the dead-letter consumer at boot.
    #[serde(default)]
    pub dead_letter_auto_start: bool,
    /// Let the health monitor pause consumption while the mail server is down.
    #[serde(default = "default_true")]
    pub stop_when_mail_down: bool,
    #[serde(default = "default_health_check_interval_secs")]
    pub health_check_interval_secs: u64,
    #[serde(default = "default_stop_timeout_secs")]
    pub stop_timeout_secs: u64,
}

impl Default for ConsumerConfig {
    fn default() -> Self {
        Self {
            auto_start: true,
            dead_letter_auto_start: false,
            stop_when_mail_down: true,
            health_check_interval_secs: default_health_check_interval_secs(),
            stop_timeout_secs: default_stop_timeout_secs(),
        }
    }
}

#[derive(Clone, Deserialize)]
pub struct AppConfig {
    pub smtp: SmtpConfig,
    pub broker: BrokerConfig,
    #[serde(default)]
    pub consumer: ConsumerConfig,
}

impl ConsumerConfig {
    pub fn health_check_interval(&self) -> Duration {
        Duration::from_secs(self.health_check_interval_secs)
    }

    pub fn stop_timeout(&self) -> Duration {
        Duration::from_secs(self.stop_timeout_secs)
    }
}

fn default_max_delivery_attempts() -> u32 {
    5
}

fn default_true() -> bool {
    true
}

fn default_health_check_interval_secs() -> u64 {
    30
}

fn default_stop_timeout_secs() -> u64 {
    60
}

/// Load configuration from `config.yaml` (or `$MAIL_RELAY_CONFIG`) with
/// `__`-separated environment variable overrides, e.g. `SMTP__SERVER`.
pub fn load_config() -> Result<AppConfig, ConfigError> {
    dotenvy::dotenv().ok();

    let config_path = env::var("MAIL_RELAY_CONFIG").unwrap_or_else(|_| "config.yaml".to_string());

    let cfg = Config::builder()
        .add_source(File::with_name(&config_path).required(false))
        .add_source(Environment::default().separator("__"))
        .build()?;

    let app: AppConfig = cfg.try_deserialize()?;
    validate(&app)?;
    Ok(app)
}

fn validate(app: &AppConfig) -> Result<(), ConfigError> {
    if app.smtp.port == 0 {
        return Err(ConfigError::Validation("smtp.port must be > 0".into()));
    }
    if app.broker.email_topic.is_empty() {
        return Err(ConfigError::Validation(
            "broker.email_topic must not be empty".into(),
        ));
    }
    if app.broker.email_subscription.is_empty() {
        return Err(ConfigError::Validation(
            "broker.email_subscription must not be empty".into(),
        ));
    }
    if app.broker.max_delivery_attempts == 0 {
        return Err(ConfigError::Validation(
            "broker.max_delivery_attempts must be >= 1".into(),
        ));
    }
    if let Some(topic) = &app.broker.dead_letter_topic
        && topic.is_empty()
    {
        return Err(ConfigError::Validation(
            "broker.dead_letter_topic must not be empty when set".into(),
        ));
    }
    if let Some(0) = app.broker.max_outstanding_messages {
        return Err(ConfigError::Validation(
            "broker.max_outstanding_messages must be >= 1 when set".into(),
        ));
    }
    Ok(())
}

/// Convenience helper for binaries wanting panic-on-error behaviour.
pub fn load_config_or_panic() -> AppConfig {
    match load_config() {
        Ok(c) => c,
        Err(e) => panic!("Failed to load configuration: {e}"),
    }
}
