use lettre::message::Mailbox;
use lettre::{AsyncSmtpTransport, Tokio1Executor, transport::smtp::authentication::Credentials};
use mail_relay::AppResources;
use mail_relay::api::start_webserver;
use mail_relay::broker::{BrokerClient, DeadLetterPolicy, InMemoryBroker};
use mail_relay::config::load_config_or_panic;
use mail_relay::consumer::{DeadLetterConsumer, DeadLetterStore, DispatchConsumer};
use mail_relay::mail::{SmtpHealthCheck, SmtpMailer};
use mail_relay::monitor::HealthMonitor;
use mail_relay::publisher::MessagePublisher;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

fn initialize_standard_tracing() {
    let default_directives = "mail_relay=info,hyper=warn";
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_directives));

    let registry = tracing_subscriber::registry().with(env_filter);
    let layer = fmt::layer().with_target(true).with_level(true);

    registry.with(layer).init();
}

#[tokio::main]
async fn main() -> color_eyre::eyre::Result<()> {
    color_eyre::install().expect("Failed to install `color_eyre::install`");

    initialize_standard_tracing();

    // Load config
    let config = Arc::new(load_config_or_panic());

    // Set up lettre SMTP client
    let creds = Credentials::new(config.smtp.username.clone(), config.smtp.password.clone());
    let transport = Arc::new(
        AsyncSmtpTransport::<Tokio1Executor>::relay(&config.smtp.server)?
            .port(config.smtp.port)
            .credentials(creds)
            .build(),
    );
    let from: Mailbox = config.smtp.from.parse()?;

    // Set up the broker topology
    let memory_broker = InMemoryBroker::new();
    memory_broker.create_topic(&config.broker.email_topic);
    memory_broker
        .create_subscription(&config.broker.email_subscription, &config.broker.email_topic)?;
    if let Some(dead_letter_topic) = &config.broker.dead_letter_topic {
        memory_broker.create_topic(dead_letter_topic);
        memory_broker
            .create_subscription(&config.broker.dead_letter_subscription, dead_letter_topic)?;
    }
    let broker: Arc<dyn BrokerClient> = Arc::new(memory_broker);

    // Assemble the pipeline components
    let mailer = Arc::new(SmtpMailer::new(transport.clone(), from));
    let health = Arc::new(SmtpHealthCheck::new(transport.clone()));

    let publisher = Arc::new(MessagePublisher::new(
        broker.clone(),
        config.broker.email_topic.clone(),
    ));

    let dead_letter_policy = config
        .broker
        .dead_letter_topic
        .as_ref()
        .map(|topic| DeadLetterPolicy {
            dead_letter_topic: topic.clone(),
            max_delivery_attempts: config.broker.max_delivery_attempts,
        });

    let consumer = Arc::new(DispatchConsumer::new(
        broker.clone(),
        mailer,
        health.clone(),
        config.broker.email_subscription.clone(),
        dead_letter_policy,
        config.broker.max_outstanding_messages,
        config.consumer.stop_timeout(),
    ));

    let dead_letters = Arc::new(DeadLetterStore::default());
    let dead_letter_consumer = Arc::new(DeadLetterConsumer::new(
        broker.clone(),
        config.broker.dead_letter_subscription.clone(),
        dead_letters.clone(),
        config.consumer.stop_timeout(),
    ));

    if config.consumer.auto_start {
        if let Err(e) = consumer.start().await {
            tracing::error!(error = %e, "Failed to start consumer at boot");
        }
    } else {
        tracing::info!("Consumer is not started automatically. Use the API to start it.");
    }

    if config.consumer.dead_letter_auto_start {
        if let Err(e) = dead_letter_consumer.start().await {
            tracing::error!(error = %e, "Failed to start DLT consumer at boot");
        }
    } else {
        tracing::info!("DLT consumer is not started automatically. Use the API to start it.");
    }

    // Start the health monitor control loop
    if config.consumer.stop_when_mail_down {
        let monitor = Arc::new(HealthMonitor::new(
            consumer.clone(),
            health,
            config.consumer.health_check_interval(),
        ));
        tokio::spawn(monitor.run(CancellationToken::new()));
    }

    let resources = AppResources {
        publisher,
        consumer: consumer.clone(),
        dead_letter_consumer: dead_letter_consumer.clone(),
        dead_letters,
        config,
    };

    start_webserver(resources).await?;

    // Forced stop at process shutdown; both are no-ops if already stopped.
    consumer.stop().await;
    dead_letter_consumer.stop().await;
    Ok(())
}
