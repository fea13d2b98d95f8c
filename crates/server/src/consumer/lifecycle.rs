//! Start/stop lifecycle shared by the dispatch and dead-letter consumers.
//!
//! Exactly one subscription may be live per consumer instance. Start and
//! stop serialize on a mutex so concurrent callers observe and mutate the
//! state atomically; `is_running` reads a mirrored atomic without taking
//! the lock.

use crate::error::BrokerError;
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;

/// Outcome of a lifecycle operation, rendered verbatim by the HTTP
/// surface.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleStatus {
    Started,
    AlreadyRunning,
    Stopped,
    NotRunning,
    /// The drain timeout elapsed before in-flight messages finished; the
    /// consumer is left in its best-effort terminated state.
    StopTimedOut,
}

impl LifecycleStatus {
    /// Human-readable status line, e.g. `"Consumer started successfully."`
    /// for `label = "Consumer"`.
    pub fn describe(&self, label: &str) -> String {
        match self {
            LifecycleStatus::Started => format!("{label} started successfully."),
            LifecycleStatus::AlreadyRunning => format!("{label} is already running."),
            LifecycleStatus::Stopped => format!("{label} stopped successfully."),
            LifecycleStatus::NotRunning => format!("{label} is not running."),
            LifecycleStatus::StopTimedOut => {
                format!("Failed to stop {label} gracefully due to a timeout.")
            }
        }
    }
}

struct ActiveSubscription {
    cancel: CancellationToken,
    tracker: TaskTracker,
}

/// Serialized lifecycle state: `None` behind the mutex means stopped.
pub struct Lifecycle {
    active: tokio::sync::Mutex<Option<ActiveSubscription>>,
    running: AtomicBool,
    stop_timeout: Duration,
}

impl Lifecycle {
    pub fn new(stop_timeout: Duration) -> Self {
        Self {
            active: tokio::sync::Mutex::new(None),
            running: AtomicBool::new(false),
            stop_timeout,
        }
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Serialized start. `setup` runs only when the consumer is stopped;
    /// it must attach the subscription and spawn the receive loop onto the
    /// provided tracker, honoring the cancellation token.
    pub async fn start<F, Fut>(&self, setup: F) -> Result<LifecycleStatus, BrokerError>
    where
        F: FnOnce(CancellationToken, TaskTracker) -> Fut,
        Fut: Future<Output = Result<(), BrokerError>>,
    {
        let mut active = self.active.lock().await;
        if active.is_some() {
            return Ok(LifecycleStatus::AlreadyRunning);
        }

        let cancel = CancellationToken::new();
        let tracker = TaskTracker::new();
        setup(cancel.clone(), tracker.clone()).await?;

        *active = Some(ActiveSubscription { cancel, tracker });
        self.running.store(true, Ordering::SeqCst);
        Ok(LifecycleStatus::Started)
    }

    /// Serialized stop: cancel the receive loop and wait up to the drain
    /// timeout for in-flight work. The state transitions to stopped either
    /// way; a timeout is reported as [`LifecycleStatus::StopTimedOut`]
    /// rather than blocking indefinitely.
    pub async fn stop(&self) -> LifecycleStatus {
        let mut active = self.active.lock().await;
        let Some(subscription) = active.take() else {
            return LifecycleStatus::NotRunning;
        };

        subscription.cancel.cancel();
        subscription.tracker.close();
        self.running.store(false, Ordering::SeqCst);

        match tokio::time::timeout(self.stop_timeout, subscription.tracker.wait()).await {
            Ok(()) => LifecycleStatus::Stopped,
            Err(_) => LifecycleStatus::StopTimedOut,
        }
    }
}
