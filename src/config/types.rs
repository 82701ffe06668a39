use crate::retry::RetryPolicy;
use serde::{Deserialize, Deserializer, Serialize};
use std::path::PathBuf;
use std::time::Duration;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub batcher: BatcherConfig,
    pub stream: StreamConfig,
    pub producer: ProducerConfig,
    pub consumer: ConsumerConfig,
    pub watchdog: WatchdogConfig,
    pub storage: StorageConfig,
    pub web: WebConfig,
    pub shutdown: ShutdownConfig,
}

/// Event timer and batch size
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(default)]
pub struct BatcherConfig {
    #[serde(with = "humantime_serde")]
    pub initial_delay: Duration,
    #[serde(with = "humantime_serde")]
    pub period: Duration,
    pub threshold: usize,
}

impl Default for BatcherConfig {
    fn default() -> Self {
        Self {
            initial_delay: Duration::from_secs(4),
            period: Duration::from_secs(1),
            threshold: 10,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StreamConfig {
    pub topic: String,
    pub partitions: u32,
    pub key: String,
    pub group_id: String,
    pub consumer_id: String,
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            topic: "new-event-topic".to_string(),
            partitions: 3,
            key: "new-event-topic-key".to_string(),
            group_id: "event-group".to_string(),
            consumer_id: default_consumer_id(),
        }
    }
}

fn default_consumer_id() -> String {
    hostname::get()
        .ok()
        .and_then(|h| h.into_string().ok())
        .filter(|h| !h.is_empty())
        .unwrap_or_else(|| "reqlog-consumer".to_string())
}

/// A `retry` section where either field may be left out
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct PartialRetry {
    max_attempts: Option<u32>,
    #[serde(with = "humantime_serde")]
    interval: Option<Duration>,
}

impl PartialRetry {
    fn or(self, fallback: RetryPolicy) -> RetryPolicy {
        RetryPolicy::new(
            self.max_attempts.unwrap_or(fallback.max_attempts),
            self.interval.unwrap_or(fallback.interval),
        )
    }
}

fn producer_retry<'de, D: Deserializer<'de>>(deserializer: D) -> Result<RetryPolicy, D::Error> {
    Ok(PartialRetry::deserialize(deserializer)?.or(ProducerConfig::default().retry))
}

fn consumer_retry<'de, D: Deserializer<'de>>(deserializer: D) -> Result<RetryPolicy, D::Error> {
    Ok(PartialRetry::deserialize(deserializer)?.or(ConsumerConfig::default().retry))
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProducerConfig {
    #[serde(deserialize_with = "producer_retry")]
    pub retry: RetryPolicy,
}

impl Default for ProducerConfig {
    fn default() -> Self {
        Self {
            retry: RetryPolicy::new(5, Duration::from_secs(1)),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ConsumerConfig {
    #[serde(deserialize_with = "consumer_retry")]
    pub retry: RetryPolicy,
}

impl Default for ConsumerConfig {
    fn default() -> Self {
        Self {
            retry: RetryPolicy::new(3, Duration::from_secs(1)),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(default)]
pub struct WatchdogConfig {
    #[serde(with = "humantime_serde")]
    pub poll_interval: Duration,
    #[serde(with = "humantime_serde")]
    pub probe_timeout: Duration,
}

impl Default for WatchdogConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(5),
            probe_timeout: Duration::from_secs(2),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    pub path: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("~/.local/share/reqlog/reqlog.duckdb"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WebConfig {
    pub listen: String,
}

impl Default for WebConfig {
    fn default() -> Self {
        Self {
            listen: "127.0.0.1:8080".to_string(),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(default)]
pub struct ShutdownConfig {
    /// How long the publish worker may keep draining after Ctrl+C
    #[serde(with = "humantime_serde")]
    pub publish_grace: Duration,
}

impl Default for ShutdownConfig {
    fn default() -> Self {
        Self {
            publish_grace: Duration::from_secs(5),
        }
    }
}
