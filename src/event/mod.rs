use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A single timestamped occurrence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Event {
    #[serde(rename = "dateTime")]
    pub date_time: DateTime<Utc>,
}

impl Event {
    pub fn new(date_time: DateTime<Utc>) -> Self {
        Self { date_time }
    }

    pub fn now() -> Self {
        Self::new(Utc::now())
    }
}

/// Ordered group of events as it travels over the stream.
///
/// Wire format: `{"events":[{"dateTime":"..."}, ...]}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventBatch {
    pub events: Vec<Event>,
}

impl EventBatch {
    pub fn new(events: Vec<Event>) -> Self {
        Self { events }
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    /// Serialize to the stream envelope
    pub fn to_wire(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    /// Parse a stream envelope
    pub fn from_wire(payload: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(payload)
    }

    /// Serialize only the event list; this is the durable payload stored per record.
    pub fn to_stored_payload(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(&self.events)
    }
}

/// Parse a durable payload back into its event list.
pub fn events_from_stored_payload(payload: &str) -> Result<Vec<Event>, serde_json::Error> {
    serde_json::from_str(payload)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn make_event(second: u32) -> Event {
        Event::new(Utc.with_ymd_and_hms(2026, 1, 28, 10, 0, second).unwrap())
    }

    #[test]
    fn test_wire_format_uses_events_and_date_time() {
        let batch = EventBatch::new(vec![make_event(0)]);
        let json: serde_json::Value = serde_json::from_str(&batch.to_wire().unwrap()).unwrap();

        assert!(json["events"].is_array());
        assert_eq!(json["events"][0]["dateTime"], "2026-01-28T10:00:00Z");
    }

    #[test]
    fn test_stored_payload_is_bare_event_list() {
        let batch = EventBatch::new(vec![make_event(1), make_event(2)]);
        let payload = batch.to_stored_payload().unwrap();

        assert!(payload.starts_with('['));
        let events = events_from_stored_payload(&payload).unwrap();
        assert_eq!(events, batch.events);
    }

    #[test]
    fn test_from_wire_rejects_garbage() {
        assert!(EventBatch::from_wire("not json").is_err());
        assert!(EventBatch::from_wire("{\"eventDto\": []}").is_err());
    }
}
