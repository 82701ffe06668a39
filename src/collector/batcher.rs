use crate::event::{Event, EventBatch};
use std::collections::VecDeque;

/// Pending-event queue that cuts fixed-size batches.
///
/// Batches are drained whenever the queue holds at least `threshold` events,
/// repeatedly, so the queue never grows past `threshold - 1` after a push.
pub struct EventBatcher {
    threshold: usize,
    pending: VecDeque<Event>,
}

impl EventBatcher {
    pub fn new(threshold: usize) -> Self {
        let threshold = threshold.max(1);
        Self {
            threshold,
            pending: VecDeque::with_capacity(threshold),
        }
    }

    /// Enqueue an event and return every batch that became complete
    pub fn push(&mut self, event: Event) -> Vec<EventBatch> {
        self.pending.push_back(event);

        let mut completed = Vec::new();
        while self.pending.len() >= self.threshold {
            let events: Vec<Event> = self.pending.drain(..self.threshold).collect();
            completed.push(EventBatch::new(events));
        }
        completed
    }

    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    pub fn threshold(&self) -> usize {
        self.threshold
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    fn make_event(second: u32) -> Event {
        Event::new(Utc.with_ymd_and_hms(2026, 1, 28, 10, 0, second).unwrap())
    }

    #[test]
    fn test_batch_emitted_at_threshold() {
        let mut batcher = EventBatcher::new(10);

        for i in 0..9 {
            assert!(batcher.push(make_event(i)).is_empty());
        }
        assert_eq!(batcher.pending_len(), 9);

        let batches = batcher.push(make_event(9));
        assert_eq!(batches.len(), 1);
        assert_eq!(batches[0].len(), 10);
        assert_eq!(batcher.pending_len(), 0);
    }

    #[test]
    fn test_batch_preserves_insertion_order() {
        let mut batcher = EventBatcher::new(3);

        batcher.push(make_event(5));
        batcher.push(make_event(1));
        let batch = batcher.push(make_event(3)).remove(0);

        let seconds: Vec<u32> = batch
            .events
            .iter()
            .map(|e| chrono::Timelike::second(&e.date_time))
            .collect();
        assert_eq!(seconds, vec![5, 1, 3]);
    }

    #[test]
    fn test_consecutive_batches() {
        let mut batcher = EventBatcher::new(2);
        let mut total = Vec::new();

        for i in 0..7 {
            total.extend(batcher.push(make_event(i)));
        }

        assert_eq!(total.len(), 3);
        assert!(total.iter().all(|b| b.len() == 2));
        assert_eq!(batcher.pending_len(), 1);
    }

    #[test]
    fn test_zero_threshold_is_clamped() {
        let mut batcher = EventBatcher::new(0);
        assert_eq!(batcher.threshold(), 1);
        assert_eq!(batcher.push(make_event(0)).len(), 1);
    }
}
