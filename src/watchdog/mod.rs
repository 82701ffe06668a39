pub mod probe;

use crate::stream::ConsumptionControl;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

pub use probe::{AvailabilityProbe, StorageProbe};

/// What a reported persist failure led to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TriggerOutcome {
    /// Storage answered the probe; consumption continues untouched
    StorageAvailable,
    /// Consumption was paused and a recovery loop started
    Paused,
    /// A recovery loop is already running; nothing new was started
    AlreadyRecovering,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HealthState {
    Healthy,
    Degraded,
}

/// Pauses consumption while storage is down and resumes it once storage answers again.
///
/// At most one recovery loop is alive at any time; the `recovering` flag is
/// claimed with a compare-and-swap before a loop is spawned.
pub struct IngestionWatchdog {
    probe: Arc<dyn AvailabilityProbe>,
    control: Arc<ConsumptionControl>,
    poll_interval: Duration,
    recovering: Arc<AtomicBool>,
    recoveries_started: AtomicUsize,
    shutdown: CancellationToken,
}

impl IngestionWatchdog {
    pub fn new(
        probe: Arc<dyn AvailabilityProbe>,
        control: Arc<ConsumptionControl>,
        poll_interval: Duration,
        shutdown: CancellationToken,
    ) -> Self {
        Self {
            probe,
            control,
            poll_interval,
            recovering: Arc::new(AtomicBool::new(false)),
            recoveries_started: AtomicUsize::new(0),
            shutdown,
        }
    }

    /// Entry point for a persist failure whose retry budget is spent.
    pub async fn report_failure(&self, reason: &str) -> TriggerOutcome {
        error!(reason = %reason, "Persist failed, checking storage availability");

        if self.probe.is_available().await {
            warn!("Storage is reachable, failure is not an outage; consumption continues");
            return TriggerOutcome::StorageAvailable;
        }

        self.control.pause();
        error!(
            consumer_id = %self.control.consumer_id(),
            "Storage unavailable, consumption paused"
        );

        if self.start_recovery() {
            TriggerOutcome::Paused
        } else {
            TriggerOutcome::AlreadyRecovering
        }
    }

    /// Spawn the recovery loop unless one is already running.
    ///
    /// Returns `true` if a new loop was started. Must be called inside a Tokio runtime.
    pub fn start_recovery(&self) -> bool {
        if self
            .recovering
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            info!("Recovery loop already running");
            return false;
        }

        self.recoveries_started.fetch_add(1, Ordering::Relaxed);
        tokio::spawn(run_recovery(
            Arc::clone(&self.probe),
            Arc::clone(&self.control),
            Arc::clone(&self.recovering),
            self.poll_interval,
            self.shutdown.clone(),
        ));
        true
    }

    pub fn is_recovering(&self) -> bool {
        self.recovering.load(Ordering::Acquire)
    }

    /// Number of recovery loops spawned since startup
    pub fn recoveries_started(&self) -> usize {
        self.recoveries_started.load(Ordering::Relaxed)
    }

    pub fn state(&self) -> HealthState {
        if self.is_recovering() || self.control.is_paused() {
            HealthState::Degraded
        } else {
            HealthState::Healthy
        }
    }

    pub fn control(&self) -> &Arc<ConsumptionControl> {
        &self.control
    }

    /// Stop any running recovery loop at its next wait point.
    pub fn shutdown(&self) {
        self.shutdown.cancel();
    }
}

async fn run_recovery(
    probe: Arc<dyn AvailabilityProbe>,
    control: Arc<ConsumptionControl>,
    recovering: Arc<AtomicBool>,
    poll_interval: Duration,
    shutdown: CancellationToken,
) {
    info!(poll_interval_ms = poll_interval.as_millis() as u64, "Recovery loop started");

    loop {
        let mut polls: u64 = 0;
        loop {
            tokio::select! {
                _ = shutdown.cancelled() => {
                    recovering.store(false, Ordering::Release);
                    info!("Recovery loop cancelled");
                    return;
                }
                _ = tokio::time::sleep(poll_interval) => {}
            }
            polls += 1;

            if !control.is_paused() {
                info!("Consumer already running, nothing to recover");
                break;
            }

            if probe.is_available().await {
                control.resume();
                warn!(polls = polls, "Storage reachable again, consumption resumed");
                break;
            }

            info!(polls = polls, "Storage still unavailable");
        }

        recovering.store(false, Ordering::Release);

        // A failure reported between the resume above and clearing the flag
        // pauses the consumer without being able to claim a loop. Take it over.
        if control.is_paused()
            && recovering
                .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
                .is_ok()
        {
            warn!("Consumer paused again during recovery hand-off, continuing");
            continue;
        }

        break;
    }

    info!("Recovery loop finished");
}
