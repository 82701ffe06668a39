pub fn generate_starter_config() -> String {
    r#"# =============================================================================
# REQLOG CONFIGURATION
# =============================================================================
# Every section is optional; anything left out falls back to the value shown.
# Durations accept human-readable strings such as 500ms, 1s, 2m.
# Values may reference environment variables with $env{NAME}.
#
# Config file locations (in order of precedence):
#   1. Path specified via --config argument
#   2. ~/.config/reqlog/config.yml
#   3. /etc/reqlog/config.yml

# =============================================================================
# EVENT BATCHING
# =============================================================================
# One event is recorded per tick. A batch is published once `threshold`
# events are queued.

batcher:
  initial_delay: 4s
  period: 1s
  threshold: 10

# =============================================================================
# STREAM
# =============================================================================
# The topic is created with `partitions` partitions at startup if missing.
# consumer_id defaults to the host name.

stream:
  topic: new-event-topic
  partitions: 3
  key: new-event-topic-key
  group_id: event-group
  # consumer_id: my-host

# =============================================================================
# RETRIES
# =============================================================================

producer:
  retry:
    max_attempts: 5
    interval: 1s

consumer:
  retry:
    max_attempts: 3
    interval: 1s

# =============================================================================
# STORAGE WATCHDOG
# =============================================================================
# While storage is unreachable consumption is paused and storage is probed
# every poll_interval.

watchdog:
  poll_interval: 5s
  probe_timeout: 2s

# =============================================================================
# STORAGE
# =============================================================================

storage:
  # Path to DuckDB database file
  path: ~/.local/share/reqlog/reqlog.duckdb

# =============================================================================
# WEB SERVER
# =============================================================================
# Serves /health, /status and /all-events.

web:
  listen: 127.0.0.1:8080
  # Set to 0.0.0.0:8080 to allow external connections

# =============================================================================
# SHUTDOWN
# =============================================================================

shutdown:
  # How long queued batches may keep publishing after Ctrl+C
  publish_grace: 5s
"#
    .to_string()
}
