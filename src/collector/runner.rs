use crate::collector::batcher::EventBatcher;
use crate::config::types::BatcherConfig;
use crate::event::Event;
use crate::publisher::BatchPublisher;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

/// Drive the batcher from a fixed-period timer until `shutdown` fires.
///
/// The tick body runs inline in this task, so ticks never overlap. A slow
/// tick pushes the schedule back instead of bursting missed ticks.
pub async fn run_collector(
    mut batcher: EventBatcher,
    publisher: BatchPublisher,
    config: BatcherConfig,
    shutdown: CancellationToken,
) {
    info!(
        initial_delay_ms = config.initial_delay.as_millis() as u64,
        period_ms = config.period.as_millis() as u64,
        threshold = batcher.threshold(),
        "Starting event collector"
    );

    tokio::select! {
        _ = shutdown.cancelled() => return,
        _ = tokio::time::sleep(config.initial_delay) => {}
    }

    let mut interval = tokio::time::interval(config.period);
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = shutdown.cancelled() => break,
            _ = interval.tick() => {
                tick(&mut batcher, &publisher);
            }
        }
    }

    info!(pending = batcher.pending_len(), "Event collector stopped");
}

/// One collection step: record an event and hand off any completed batch.
///
/// Returns the number of batches handed to the publisher. Failures are
/// logged and never escape, so the timer keeps running.
pub fn tick(batcher: &mut EventBatcher, publisher: &BatchPublisher) -> usize {
    let batches = batcher.push(Event::now());
    debug!(pending = batcher.pending_len(), "Event queued");

    let mut handed_over = 0;
    for batch in batches {
        info!(events = batch.len(), "Batch ready, handing to publisher");
        match publisher.publish(batch) {
            Ok(()) => handed_over += 1,
            Err(e) => error!(error = %e, "Failed to hand batch to publisher"),
        }
    }
    handed_over
}
