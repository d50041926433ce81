//! Progress bus (C9).
//!
//! Grounded on `ponchovillalobos-maity_desktop`'s use of `dashmap::DashMap`
//! for a shared, lock-free-ish map keyed by an opaque id. Per job, a
//! `broadcast` channel fans events out to however many subscribers
//! (typically zero or one) are watching; delivery is best-effort and
//! ordering is preserved per job because there is exactly one writer per
//! job (the workflow running it).

use dashmap::DashMap;
use serde::Serialize;
use std::sync::Arc;
use tokio::sync::broadcast;
use uuid::Uuid;

const CHANNEL_CAPACITY: usize = 256;

/// One progress update (§4.9, §6). Wire shape is
/// `{"status": pending|processing|completed|failed, "progress"?: 0..100,
/// "transcript"?, "error"?}` — `status` doubles as the serde tag so the JSON
/// the API surface streams over SSE matches §6's example byte-for-byte.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum Event {
    Processing {
        #[serde(skip_serializing_if = "Option::is_none")]
        progress: Option<u8>,
    },
    Completed {
        #[serde(skip_serializing_if = "Option::is_none")]
        transcript: Option<String>,
    },
    Failed {
        error: String,
    },
}

impl Event {
    /// A heartbeat carrying `0..100` percent-done, if known (§4.9).
    pub fn processing(progress: Option<u8>) -> Self {
        Event::Processing { progress }
    }

    pub fn completed(transcript: Option<String>) -> Self {
        Event::Completed { transcript }
    }

    pub fn failed(error: impl Into<String>) -> Self {
        Event::Failed { error: error.into() }
    }
}

/// Convert a `0.0..=1.0` fraction into the wire contract's `0..100` integer.
pub fn fraction_to_percent(fraction: f64) -> u8 {
    (fraction.clamp(0.0, 1.0) * 100.0).round() as u8
}

/// Per-job-id fan-out of `Event`s. Cloning is cheap (an `Arc` to the map).
#[derive(Clone, Default)]
pub struct ProgressBus {
    channels: Arc<DashMap<Uuid, broadcast::Sender<Event>>>,
}

impl ProgressBus {
    pub fn new() -> Self {
        Self::default()
    }

    fn sender(&self, job_id: Uuid) -> broadcast::Sender<Event> {
        self.channels
            .entry(job_id)
            .or_insert_with(|| broadcast::channel(CHANNEL_CAPACITY).0)
            .clone()
    }

    /// Subscribe to a job's events. Safe to call before the job starts.
    pub fn subscribe(&self, job_id: Uuid) -> broadcast::Receiver<Event> {
        self.sender(job_id).subscribe()
    }

    /// Publish an event. Best-effort: if nobody is subscribed, the send is a
    /// no-op rather than an error (§4.9).
    pub fn publish(&self, job_id: Uuid, event: Event) {
        let _ = self.sender(job_id).send(event);
    }

    /// Drop the channel for `job_id` after a short linger, so a subscriber
    /// connecting right as the terminal event fires still sees it (§4.9).
    pub async fn retire(&self, job_id: Uuid) {
        tokio::time::sleep(std::time::Duration::from_secs(5)).await;
        self.channels.remove(&job_id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn publish_before_subscribe_is_dropped_not_errored() {
        let bus = ProgressBus::new();
        let job_id = Uuid::new_v4();
        bus.publish(job_id, Event::completed(None));

        let mut rx = bus.subscribe(job_id);
        bus.publish(job_id, Event::completed(None));
        assert!(matches!(rx.recv().await.unwrap(), Event::Completed { .. }));
    }

    #[tokio::test]
    async fn events_arrive_in_order() {
        let bus = ProgressBus::new();
        let job_id = Uuid::new_v4();
        let mut rx = bus.subscribe(job_id);

        bus.publish(job_id, Event::processing(Some(10)));
        bus.publish(job_id, Event::processing(Some(50)));
        bus.publish(job_id, Event::completed(Some("hello".to_string())));

        let first = rx.recv().await.unwrap();
        let second = rx.recv().await.unwrap();
        let third = rx.recv().await.unwrap();
        assert!(matches!(first, Event::Processing { progress: Some(p) } if p == 10));
        assert!(matches!(second, Event::Processing { progress: Some(p) } if p == 50));
        assert!(matches!(third, Event::Completed { transcript: Some(ref t) } if t == "hello"));
    }

    #[test]
    fn wire_shape_matches_spec_contract() {
        let json = serde_json::to_string(&Event::processing(Some(42))).unwrap();
        assert_eq!(json, r#"{"status":"processing","progress":42}"#);

        let json = serde_json::to_string(&Event::completed(Some("hi".to_string()))).unwrap();
        assert_eq!(json, r#"{"status":"completed","transcript":"hi"}"#);

        let json = serde_json::to_string(&Event::failed("boom")).unwrap();
        assert_eq!(json, r#"{"status":"failed","error":"boom"}"#);
    }
}
