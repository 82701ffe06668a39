pub mod control;
pub mod memory;

use crate::retry::{Classify, FailureKind};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;

pub use control::ConsumptionControl;
pub use memory::{MemoryBroker, MemoryConsumer};

#[derive(Debug, Error)]
pub enum StreamError {
    #[error("unknown topic: {0}")]
    UnknownTopic(String),

    #[error("invalid topic: {0}")]
    InvalidTopic(String),

    #[error("topic {topic} already exists with {partitions} partitions")]
    TopicConflict { topic: String, partitions: u32 },

    #[error("serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("send failed: {0}")]
    Send(String),

    #[error("stream closed")]
    Closed,
}

impl Classify for StreamError {
    fn kind(&self) -> FailureKind {
        match self {
            StreamError::Closed => FailureKind::Terminal,
            _ => FailureKind::Retryable,
        }
    }
}

/// Where a produced record landed
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordMetadata {
    pub topic: String,
    pub partition: u32,
    pub offset: u64,
}

/// A record as handed to a consumer
#[derive(Debug, Clone)]
pub struct StreamRecord {
    pub topic: String,
    pub partition: u32,
    pub offset: u64,
    pub key: Option<String>,
    pub value: String,
    pub timestamp: DateTime<Utc>,
}

#[async_trait]
pub trait StreamProducer: Send + Sync {
    async fn send(
        &self,
        topic: &str,
        key: &str,
        payload: String,
    ) -> Result<RecordMetadata, StreamError>;
}

/// Manual acknowledgment of one delivered record.
pub trait Acknowledgment: Send {
    fn acknowledge(self: Box<Self>);
}

/// One received record together with the means to acknowledge it
pub struct Delivery {
    pub record: StreamRecord,
    pub ack: Box<dyn Acknowledgment>,
}

/// Raw pause/resume primitives of a subscribed consumer.
///
/// Callers go through [`ConsumptionControl`], which makes both operations idempotent.
pub trait ConsumptionSource: Send + Sync {
    fn consumer_id(&self) -> &str;
    fn pause(&self);
    fn resume(&self);
}
