//! Background maintenance scheduling.
//!
//! The embedding shell calls [`MaintenanceScheduler::try_spawn`] whenever it
//! likes; a pass actually starts at most once per interval. The pass runs
//! fire-and-forget on a fresh engine instance, and start/finish
//! notifications are emitted on a channel for the shell to surface.

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use tokio::sync::mpsc;
use tracing::{info, warn};

use pickle_store::Clock;

use crate::engine::Engine;

/// Minimum time between maintenance passes.
pub const DEFAULT_INTERVAL_HOURS: i64 = 4;

/// Notifications emitted around a background maintenance pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MaintenanceEvent {
    /// A pass has started.
    Started,
    /// A pass has finished; carries the error message on failure.
    Finished {
        /// `None` on success, the joined error text otherwise.
        error: Option<String>,
    },
}

/// Time-gated launcher for background maintenance passes.
#[derive(Debug)]
pub struct MaintenanceScheduler {
    clock: Arc<dyn Clock>,
    interval: Duration,
    last_started: Option<DateTime<Utc>>,
}

impl MaintenanceScheduler {
    /// Create a scheduler with the default four-hour interval.
    #[must_use]
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self::with_interval(clock, Duration::hours(DEFAULT_INTERVAL_HOURS))
    }

    /// Create a scheduler with an explicit interval.
    #[must_use]
    pub fn with_interval(clock: Arc<dyn Clock>, interval: Duration) -> Self {
        Self {
            clock,
            interval,
            last_started: None,
        }
    }

    /// Whether enough time has passed for another pass.
    #[must_use]
    pub fn should_run(&self) -> bool {
        match self.last_started {
            None => true,
            Some(last) => self.clock.now() - last >= self.interval,
        }
    }

    /// Start a background pass if the interval allows one.
    ///
    /// `build_engine` constructs a fresh engine for the pass, so the run
    /// never observes another workflow's caches. Returns whether a pass was
    /// started. The pass is not cancellable; it ends with the process.
    pub fn try_spawn<F>(&mut self, build_engine: F, events: mpsc::Sender<MaintenanceEvent>) -> bool
    where
        F: FnOnce() -> Engine + Send + 'static,
    {
        if !self.should_run() {
            return false;
        }
        self.last_started = Some(self.clock.now());

        tokio::spawn(async move {
            if events.send(MaintenanceEvent::Started).await.is_err() {
                // The shell went away; run anyway, the pass is still useful.
                info!("maintenance event channel closed");
            }

            let mut engine = build_engine();
            let error = match engine.run_maintenance().await {
                Ok(()) => None,
                Err(err) => {
                    warn!(%err, "background maintenance failed");
                    Some(err.to_string())
                }
            };

            let _ = events.send(MaintenanceEvent::Finished { error }).await;
        });

        true
    }
}
