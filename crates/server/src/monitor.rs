//! Supervisory health monitor.
//!
//! Periodically compares mail-server health with the dispatch consumer's
//! running state and pauses/resumes consumption accordingly. The monitor
//! only restarts a consumer it stopped itself, so a manual operator stop
//! is never overridden.

use crate::consumer::DispatchConsumer;
use crate::mail::MailHealth;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio_util::sync::CancellationToken;

pub struct HealthMonitor {
    consumer: Arc<DispatchConsumer>,
    health: Arc<dyn MailHealth>,
    interval: Duration,
    /// True iff the last stop of the consumer was performed by this
    /// monitor, not an operator.
    stopped_by_monitor: AtomicBool,
}

impl HealthMonitor {
    pub fn new(
        consumer: Arc<DispatchConsumer>,
        health: Arc<dyn MailHealth>,
        interval: Duration,
    ) -> Self {
        tracing::info!(
            interval_secs = interval.as_secs(),
            "Health monitor is active and will manage the consumer based on mail server health"
        );
        Self {
            consumer,
            health,
            interval,
            stopped_by_monitor: AtomicBool::new(false),
        }
    }

    /// Fixed-interval control loop; runs until the token is cancelled.
    pub async fn run(self: Arc<Self>, cancel: CancellationToken) {
        let mut interval = tokio::time::interval(self.interval);
        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = interval.tick() => self.tick().await,
            }
        }
    }

    /// One control decision. Split from [`run`](HealthMonitor::run) so
    /// tests can drive it without timers.
    pub async fn tick(&self) {
        let healthy = self.health.is_healthy().await;
        let running = self.consumer.is_running();

        if healthy {
            // Only restart a consumer this monitor stopped; a manual stop
            // stays stopped.
            if self.stopped_by_monitor.load(Ordering::SeqCst) && !running {
                tracing::info!("Mail service is back online. Restarting consumer.");
                match self.consumer.start().await {
                    Ok(_) => self.stopped_by_monitor.store(false, Ordering::SeqCst),
                    Err(e) => {
                        // Flag stays set so the next tick retries the start.
                        tracing::error!(error = %e, "Failed to restart consumer");
                    }
                }
            }
        } else if running {
            tracing::warn!("Mail service is down. Stopping consumer to pause message processing.");
            self.consumer.stop().await;
            self.stopped_by_monitor.store(true, Ordering::SeqCst);
        }
    }

    pub fn stopped_by_monitor(&self) -> bool {
        self.stopped_by_monitor.load(Ordering::SeqCst)
    }
}
