//! In-process partitioned stream.
//!
//! Records are appended to per-partition logs and never removed. Each consumer
//! group keeps a committed offset per partition. Acknowledging offset `n`
//! commits `n + 1`, which also covers any earlier record that was handed out
//! and never acknowledged. Records past the committed offset are delivered
//! again after the consumer rewinds (on resume, or on a fresh subscription).

use super::{
    Acknowledgment, ConsumptionSource, Delivery, RecordMetadata, StreamError, StreamProducer,
    StreamRecord,
};
use async_trait::async_trait;
use chrono::Utc;
use std::collections::hash_map::DefaultHasher;
use std::collections::HashMap;
use std::hash::{Hash, Hasher};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::{watch, Notify};
use tracing::{debug, info};

#[derive(Default)]
struct BrokerState {
    topics: HashMap<String, Topic>,
}

struct Topic {
    partitions: Vec<Vec<StreamRecord>>,
    groups: HashMap<String, GroupOffsets>,
}

/// Commit bookkeeping for one consumer group on one topic
struct GroupOffsets {
    /// Next offset to read, per partition
    committed: Vec<u64>,
}

impl GroupOffsets {
    fn new(partitions: usize) -> Self {
        Self {
            committed: vec![0; partitions],
        }
    }

    /// Commits are cumulative and never move backwards.
    fn acknowledge(&mut self, partition: usize, offset: u64) {
        let committed = &mut self.committed[partition];
        if offset >= *committed {
            *committed = offset + 1;
        }
    }
}

struct BrokerInner {
    state: Mutex<BrokerState>,
    appended: Notify,
    closed: AtomicBool,
}

impl BrokerInner {
    fn state(&self) -> MutexGuard<'_, BrokerState> {
        // Every critical section leaves the state consistent, so a poisoned lock is still usable
        self.state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

/// Shared handle to the in-process stream. Cloning is cheap.
#[derive(Clone)]
pub struct MemoryBroker {
    inner: Arc<BrokerInner>,
}

impl Default for MemoryBroker {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryBroker {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(BrokerInner {
                state: Mutex::new(BrokerState::default()),
                appended: Notify::new(),
                closed: AtomicBool::new(false),
            }),
        }
    }

    /// Create `topic` with `partitions` partitions.
    ///
    /// Returns `Ok(false)` if an identical topic already exists.
    pub fn create_topic(&self, topic: &str, partitions: u32) -> Result<bool, StreamError> {
        if partitions == 0 {
            return Err(StreamError::InvalidTopic(format!(
                "{} needs at least one partition",
                topic
            )));
        }

        let mut state = self.inner.state();
        if let Some(existing) = state.topics.get(topic) {
            let existing_partitions = existing.partitions.len() as u32;
            if existing_partitions == partitions {
                return Ok(false);
            }
            return Err(StreamError::TopicConflict {
                topic: topic.to_string(),
                partitions: existing_partitions,
            });
        }

        state.topics.insert(
            topic.to_string(),
            Topic {
                partitions: vec![Vec::new(); partitions as usize],
                groups: HashMap::new(),
            },
        );
        info!(topic = %topic, partitions = partitions, "Created topic");
        Ok(true)
    }

    /// Join `group` on `topic`. Reading starts at the group's committed offsets.
    pub fn subscribe(
        &self,
        topic: &str,
        group: &str,
        consumer_id: &str,
    ) -> Result<MemoryConsumer, StreamError> {
        let positions = {
            let mut state = self.inner.state();
            let t = state
                .topics
                .get_mut(topic)
                .ok_or_else(|| StreamError::UnknownTopic(topic.to_string()))?;
            let partition_count = t.partitions.len();
            t.groups
                .entry(group.to_string())
                .or_insert_with(|| GroupOffsets::new(partition_count))
                .committed
                .clone()
        };

        let (paused, _) = watch::channel(false);
        info!(topic = %topic, group = %group, consumer_id = %consumer_id, "Consumer subscribed");

        Ok(MemoryConsumer {
            inner: Arc::clone(&self.inner),
            topic: topic.to_string(),
            group: group.to_string(),
            positions,
            next_partition: 0,
            handle: Arc::new(ConsumerHandle {
                consumer_id: consumer_id.to_string(),
                paused,
                rewind: AtomicBool::new(false),
            }),
        })
    }

    /// Committed offset (next offset to read) of `group` on one partition
    pub fn committed_offset(&self, topic: &str, group: &str, partition: u32) -> Option<u64> {
        let state = self.inner.state();
        state
            .topics
            .get(topic)?
            .groups
            .get(group)?
            .committed
            .get(partition as usize)
            .copied()
    }

    /// Total records appended to `topic` across partitions
    pub fn record_count(&self, topic: &str) -> usize {
        let state = self.inner.state();
        state
            .topics
            .get(topic)
            .map(|t| t.partitions.iter().map(Vec::len).sum())
            .unwrap_or(0)
    }

    /// Refuse further sends and end every consumer's `recv`.
    pub fn close(&self) {
        self.inner.closed.store(true, Ordering::Release);
        self.inner.appended.notify_waiters();
    }
}

fn partition_for_key(key: &str, partitions: usize) -> usize {
    let mut hasher = DefaultHasher::new();
    key.hash(&mut hasher);
    (hasher.finish() % partitions as u64) as usize
}

#[async_trait]
impl StreamProducer for MemoryBroker {
    async fn send(
        &self,
        topic: &str,
        key: &str,
        payload: String,
    ) -> Result<RecordMetadata, StreamError> {
        if self.inner.closed.load(Ordering::Acquire) {
            return Err(StreamError::Closed);
        }

        let metadata = {
            let mut state = self.inner.state();
            let t = state
                .topics
                .get_mut(topic)
                .ok_or_else(|| StreamError::UnknownTopic(topic.to_string()))?;

            let partition = partition_for_key(key, t.partitions.len());
            let log = &mut t.partitions[partition];
            let offset = log.len() as u64;
            log.push(StreamRecord {
                topic: topic.to_string(),
                partition: partition as u32,
                offset,
                key: Some(key.to_string()),
                value: payload,
                timestamp: Utc::now(),
            });

            RecordMetadata {
                topic: topic.to_string(),
                partition: partition as u32,
                offset,
            }
        };

        self.inner.appended.notify_waiters();
        Ok(metadata)
    }
}

/// Pause/resume side of a subscription, shareable with other tasks.
pub struct ConsumerHandle {
    consumer_id: String,
    paused: watch::Sender<bool>,
    rewind: AtomicBool,
}

impl ConsumptionSource for ConsumerHandle {
    fn consumer_id(&self) -> &str {
        &self.consumer_id
    }

    fn pause(&self) {
        self.paused.send_replace(true);
    }

    fn resume(&self) {
        // Redeliver whatever was handed out but never acknowledged
        self.rewind.store(true, Ordering::Release);
        self.paused.send_replace(false);
    }
}

/// A subscription of one consumer in one group.
pub struct MemoryConsumer {
    inner: Arc<BrokerInner>,
    topic: String,
    group: String,
    positions: Vec<u64>,
    next_partition: usize,
    handle: Arc<ConsumerHandle>,
}

impl MemoryConsumer {
    pub fn consumer_id(&self) -> &str {
        &self.handle.consumer_id
    }

    pub fn handle(&self) -> Arc<ConsumerHandle> {
        Arc::clone(&self.handle)
    }

    /// Wait for the next record. Blocks while paused; returns `None` once the broker is closed.
    pub async fn recv(&mut self) -> Option<Delivery> {
        let inner = Arc::clone(&self.inner);
        let mut paused_rx = self.handle.paused.subscribe();

        loop {
            let notified = inner.appended.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            if inner.closed.load(Ordering::Acquire) {
                return None;
            }

            if !*paused_rx.borrow_and_update() {
                if self.handle.rewind.swap(false, Ordering::AcqRel) {
                    self.rewind_to_committed();
                }
                if let Some(record) = self.poll_record() {
                    return Some(self.delivery(record));
                }
            }

            tokio::select! {
                _ = &mut notified => {}
                changed = paused_rx.changed() => {
                    if changed.is_err() {
                        return None;
                    }
                }
            }
        }
    }

    fn poll_record(&mut self) -> Option<StreamRecord> {
        let state = self.inner.state();
        let topic = state.topics.get(&self.topic)?;
        let partition_count = topic.partitions.len();

        for i in 0..partition_count {
            let partition = (self.next_partition + i) % partition_count;
            let position = self.positions[partition] as usize;
            if let Some(record) = topic.partitions[partition].get(position) {
                self.positions[partition] += 1;
                self.next_partition = (partition + 1) % partition_count;
                return Some(record.clone());
            }
        }
        None
    }

    fn rewind_to_committed(&mut self) {
        let state = self.inner.state();
        if let Some(group) = state
            .topics
            .get(&self.topic)
            .and_then(|t| t.groups.get(&self.group))
        {
            debug!(consumer_id = %self.handle.consumer_id, "Rewinding to committed offsets");
            self.positions.clone_from(&group.committed);
        }
    }

    fn delivery(&self, record: StreamRecord) -> Delivery {
        let ack = MemoryAck {
            inner: Arc::clone(&self.inner),
            topic: self.topic.clone(),
            group: self.group.clone(),
            partition: record.partition as usize,
            offset: record.offset,
        };
        Delivery {
            record,
            ack: Box::new(ack),
        }
    }
}

struct MemoryAck {
    inner: Arc<BrokerInner>,
    topic: String,
    group: String,
    partition: usize,
    offset: u64,
}

impl Acknowledgment for MemoryAck {
    fn acknowledge(self: Box<Self>) {
        let mut state = self.inner.state();
        if let Some(group) = state
            .topics
            .get_mut(&self.topic)
            .and_then(|t| t.groups.get_mut(&self.group))
        {
            group.acknowledge(self.partition, self.offset);
        }
    }
}
