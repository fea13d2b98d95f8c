use config::Config;
use mail_relay::config::{AppConfig, SmtpConfig};
use std::time::Duration;

#[test]
fn test_smtp_config_deserialization() {
    let yaml_content = r#"
server: "smtp.example.com"
port: 587
username: "user@example.com"
password: "secret123"
from: "noreply@example.com"
"#;

    let config = Config::builder()
        .add_source(config::File::from_str(
            yaml_content,
            config::FileFormat::Yaml,
        ))
        .build()
        .expect("Failed to build config");

    let smtp_config: SmtpConfig = config
        .try_deserialize()
        .expect("Failed to deserialize SMTP config");
    assert_eq!(smtp_config.server, "smtp.example.com");
    assert_eq!(smtp_config.port, 587);
    assert_eq!(smtp_config.username, "user@example.com");
    assert_eq!(smtp_config.password, "secret123");
    assert_eq!(smtp_config.from, "noreply@example.com");
}

#[test]
fn test_app_config_deserialization() {
    let yaml_content = r#"
smtp:
  server: "smtp.example.com"
  port: 587
  username: "user@example.com"
  password: "secret123"
  from: "noreply@example.com"
broker:
  email_topic: "email-requests"
  email_subscription: "email-requests-sub"
  dead_letter_topic: "email-requests-dlt"
  dead_letter_subscription: "email-requests-dlt-sub"
  max_delivery_attempts: 7
  max_outstanding_messages: 100
consumer:
  auto_start: false
  stop_when_mail_down: true
  health_check_interval_secs: 10
"#;

    let config = Config::builder()
        .add_source(config::File::from_str(
            yaml_content,
            config::FileFormat::Yaml,
        ))
        .build()
        .expect("Failed to build config");

    let app_config: AppConfig = config
        .try_deserialize()
        .expect("Failed to deserialize app config");
    assert_eq!(app_config.smtp.server, "smtp.example.com");
    assert_eq!(app_config.broker.email_topic, "email-requests");
    assert_eq!(
        app_config.broker.dead_letter_topic.as_deref(),
        Some("email-requests-dlt")
    );
    assert_eq!(app_config.broker.max_delivery_attempts, 7);
    assert_eq!(app_config.broker.max_outstanding_messages, Some(100));
    assert!(!app_config.consumer.auto_start);
    assert!(app_config.consumer.stop_when_mail_down);
    assert_eq!(
        app_config.consumer.health_check_interval(),
        Duration::from_secs(10)
    );
    // Unset fields fall back to their defaults.
    assert_eq!(app_config.consumer.stop_timeout(), Duration::from_secs(60));
    assert!(!app_config.consumer.dead_letter_auto_start);
}

#[test]
fn test_broker_defaults() {
    let yaml_content = r#"
smtp:
  server: "smtp.example.com"
  port: 587
  username: "user@example.com"
  password: "secret123"
  from: "noreply@example.com"
broker:
  email_topic: "email-requests"
  email_subscription: "email-requests-sub"
  dead_letter_subscription: "email-requests-dlt-sub"
"#;

    let config = Config::builder()
        .add_source(config::File::from_str(
            yaml_content,
            config::FileFormat::Yaml,
        ))
        .build()
        .expect("Failed to build config");

    let app_config: AppConfig = config
        .try_deserialize()
        .expect("Failed to deserialize app config");
    assert_eq!(app_config.broker.max_delivery_attempts, 5);
    assert_eq!(app_config.broker.max_outstanding_messages, None);
    assert_eq!(app_config.broker.dead_letter_topic, None);
    // The consumer section is optional.
    assert!(app_config.consumer.auto_start);
}

#[test]
fn test_missing_smtp_section_fails() {
    let yaml_content = r#"
broker:
  email_topic: "email-requests"
  email_subscription: "email-requests-sub"
  dead_letter_subscription: "email-requests-dlt-sub"
"#;

    let config = Config::builder()
        .add_source(config::File::from_str(
            yaml_content,
            config::FileFormat::Yaml,
        ))
        .build()
        .expect("Failed to build config");

    assert!(config.try_deserialize::<AppConfig>().is_err());
}
