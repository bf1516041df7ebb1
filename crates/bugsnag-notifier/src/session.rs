// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Session tracking.
//!
//! Sessions are counted per minute and delivered in batches:
//!
//! ```text
//!   start_session() ──> counts["2024-03-01T12:30:00"] += 1
//!                        │
//!                        ├─ more than 50 minutes tracked? drop the oldest
//!                        └─ delivery interval elapsed?   flush()
//!
//!   flush() ──> snapshot + clear ──> deliver
//!                                      ├─ ok:   done
//!                                      └─ err:  retry hook(snapshot), or merge back
//! ```
//!
//! The tracker also keeps the current [`Session`], whose handled/unhandled
//! counters are bumped for every event delivered while it is active.

use crate::config::Configuration;
use crate::constants::{MAX_SESSION_COUNT, SESSION_DELIVERY_INTERVAL, SESSION_PAYLOAD_VERSION};
use crate::transport::{build_headers, Transport};
use chrono::{DateTime, SecondsFormat, Utc};
use serde::Serialize;
use serde_json::json;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};
use uuid::Uuid;

/// Minute bucket (`YYYY-MM-DDTHH:MM:00`) to number of sessions started.
pub type SessionCounts = BTreeMap<String, u64>;

/// Receives the counts of a failed delivery.
pub type RetryHook = Box<dyn Fn(SessionCounts) + Send>;

/// Source of the current time.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SessionEvents {
    pub handled: u64,
    pub unhandled: u64,
}

/// The session attached to events.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Session {
    pub id: String,
    pub started_at: String,
    pub events: SessionEvents,
}

pub struct SessionTracker {
    config: Arc<Configuration>,
    transport: Arc<dyn Transport>,
    clock: Arc<dyn Clock>,
    counts: SessionCounts,
    current: Option<Session>,
    last_sent: DateTime<Utc>,
    last_attempt: DateTime<Utc>,
    delivery_interval: Duration,
    retry_hook: Option<RetryHook>,
}

impl SessionTracker {
    #[must_use]
    pub fn new(config: Arc<Configuration>, transport: Arc<dyn Transport>) -> Self {
        Self::with_clock(config, transport, Arc::new(SystemClock))
    }

    #[must_use]
    pub fn with_clock(
        config: Arc<Configuration>,
        transport: Arc<dyn Transport>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let last_sent = clock.now();
        SessionTracker {
            config,
            transport,
            clock,
            counts: SessionCounts::new(),
            current: None,
            last_sent,
            last_attempt: last_sent,
            delivery_interval: SESSION_DELIVERY_INTERVAL,
            retry_hook: None,
        }
    }

    #[must_use]
    pub fn with_delivery_interval(mut self, delivery_interval: Duration) -> Self {
        self.delivery_interval = delivery_interval;
        self
    }

    /// Failed counts go to `hook` instead of being merged back.
    #[must_use]
    pub fn with_retry_hook<F>(mut self, hook: F) -> Self
    where
        F: Fn(SessionCounts) + Send + 'static,
    {
        self.retry_hook = Some(Box::new(hook));
        self
    }

    /// Starts a new session and counts it in the current minute.
    pub fn start_session(&mut self) {
        let now = self.clock.now();
        self.current = Some(Session {
            id: Uuid::new_v4().to_string(),
            started_at: now.to_rfc3339_opts(SecondsFormat::Millis, true),
            events: SessionEvents::default(),
        });

        *self.counts.entry(minute_bucket(now)).or_insert(0) += 1;
        self.evict_oldest();

        // A failed delivery is retried at most once per interval.
        if self.interval_elapsed(now, self.last_sent)
            && self.interval_elapsed(now, self.last_attempt)
        {
            self.flush();
        }
    }

    #[must_use]
    pub fn current_session(&self) -> Option<&Session> {
        self.current.as_ref()
    }

    /// Counts an event against the current session and returns a copy of it.
    pub fn record_event(&mut self, unhandled: bool) -> Option<Session> {
        let session = self.current.as_mut()?;
        if unhandled {
            session.events.unhandled += 1;
        } else {
            session.events.handled += 1;
        }
        Some(session.clone())
    }

    #[must_use]
    pub fn counts(&self) -> &SessionCounts {
        &self.counts
    }

    /// Delivers the tracked counts. Returns whether a delivery succeeded.
    pub fn flush(&mut self) -> bool {
        let snapshot = std::mem::take(&mut self.counts);
        if snapshot.is_empty() {
            debug!("No sessions to deliver");
            return false;
        }
        self.last_attempt = self.clock.now();

        match self.deliver(&snapshot) {
            Ok(()) => {
                self.last_sent = self.clock.now();
                true
            }
            Err(e) => {
                warn!("Failed to deliver {} session buckets: {}", snapshot.len(), e);
                match &self.retry_hook {
                    Some(hook) => hook(snapshot),
                    None => {
                        for (minute, count) in snapshot {
                            *self.counts.entry(minute).or_insert(0) += count;
                        }
                        self.evict_oldest();
                    }
                }
                false
            }
        }
    }

    fn deliver(&self, counts: &SessionCounts) -> Result<(), Box<dyn std::error::Error>> {
        let session_counts: Vec<_> = counts
            .iter()
            .map(|(started_at, count)| json!({"startedAt": started_at, "sessionsStarted": count}))
            .collect();
        let payload = json!({
            "notifier": self.config.notifier_data(),
            "device": self.config.device_data(),
            "app": self.config.app_data(),
            "sessionCounts": session_counts,
        });

        let body = serde_json::to_vec(&payload)?;
        let headers = build_headers(&self.config.api_key, SESSION_PAYLOAD_VERSION)?;
        self.transport
            .deliver(&self.config.session_endpoint, body, headers)?;
        Ok(())
    }

    fn interval_elapsed(&self, now: DateTime<Utc>, since: DateTime<Utc>) -> bool {
        (now - since)
            .to_std()
            .is_ok_and(|elapsed| elapsed > self.delivery_interval)
    }

    fn evict_oldest(&mut self) {
        while self.counts.len() > MAX_SESSION_COUNT {
            if let Some((minute, count)) = self.counts.pop_first() {
                debug!("Dropping {} sessions started at {}", count, minute);
            }
        }
    }
}

impl std::fmt::Debug for SessionTracker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionTracker")
            .field("counts", &self.counts)
            .field("current", &self.current)
            .field("last_sent", &self.last_sent)
            .field("last_attempt", &self.last_attempt)
            .field("delivery_interval", &self.delivery_interval)
            .finish_non_exhaustive()
    }
}

/// Keys sort lexicographically in chronological order.
fn minute_bucket(time: DateTime<Utc>) -> String {
    time.format("%Y-%m-%dT%H:%M:00").to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::DeliveryError;
    use chrono::TimeZone;
    use reqwest::header::HeaderMap;
    use serde_json::Value;
    use std::sync::Mutex;

    #[derive(Default)]
    struct RecordingTransport {
        payloads: Mutex<Vec<(String, Value, HeaderMap)>>,
        fail: bool,
    }

    impl RecordingTransport {
        fn failing() -> Self {
            RecordingTransport {
                fail: true,
                ..Default::default()
            }
        }

        fn deliveries(&self) -> Vec<(String, Value, HeaderMap)> {
            self.payloads.lock().unwrap().clone()
        }
    }

    impl Transport for RecordingTransport {
        fn deliver(&self, uri: &str, payload: Vec<u8>, headers: HeaderMap) -> Result<(), DeliveryError> {
            let value = serde_json::from_slice(&payload).unwrap();
            self.payloads.lock().unwrap().push((uri.to_string(), value, headers));
            if self.fail {
                Err(DeliveryError::Status(500, "unavailable".to_string()))
            } else {
                Ok(())
            }
        }
    }

    /// Clock advanced by hand.
    struct ManualClock(Mutex<DateTime<Utc>>);

    impl ManualClock {
        fn at(time: DateTime<Utc>) -> Arc<Self> {
            Arc::new(ManualClock(Mutex::new(time)))
        }

        fn advance(&self, by: chrono::Duration) {
            let mut now = self.0.lock().unwrap();
            *now = *now + by;
        }
    }

    impl Clock for ManualClock {
        fn now(&self) -> DateTime<Utc> {
            *self.0.lock().unwrap()
        }
    }

    fn start() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 30).unwrap()
    }

    fn config() -> Arc<Configuration> {
        Arc::new(Configuration {
            session_endpoint: "http://sessions.test".to_string(),
            hostname: Some("web-1".to_string()),
            ..Configuration::new("abc123")
        })
    }

    fn tracker(transport: &Arc<RecordingTransport>, clock: &Arc<ManualClock>) -> SessionTracker {
        SessionTracker::with_clock(config(), transport.clone(), clock.clone())
            // keep flushing manual in tests
            .with_delivery_interval(Duration::from_secs(24 * 60 * 60))
    }

    #[test]
    fn test_minute_bucket() {
        assert_eq!(minute_bucket(start()), "2024-03-01T12:00:00");
    }

    #[test]
    fn test_start_session_counts_per_minute() {
        let transport = Arc::new(RecordingTransport::default());
        let clock = ManualClock::at(start());
        let mut tracker = tracker(&transport, &clock);

        tracker.start_session();
        tracker.start_session();
        clock.advance(chrono::Duration::minutes(1));
        tracker.start_session();

        let counts: Vec<_> = tracker.counts().iter().map(|(k, v)| (k.as_str(), *v)).collect();
        assert_eq!(
            counts,
            vec![("2024-03-01T12:00:00", 2), ("2024-03-01T12:01:00", 1)]
        );
        assert!(transport.deliveries().is_empty());
    }

    #[test]
    fn test_sixty_minutes_keeps_latest_fifty() {
        let transport = Arc::new(RecordingTransport::default());
        let clock = ManualClock::at(start());
        let mut tracker = tracker(&transport, &clock);

        for _ in 0..60 {
            tracker.start_session();
            clock.advance(chrono::Duration::minutes(1));
        }
        assert!(tracker.flush());

        let deliveries = transport.deliveries();
        assert_eq!(deliveries.len(), 1);
        let buckets = deliveries[0].1["sessionCounts"].as_array().unwrap().clone();
        assert_eq!(buckets.len(), MAX_SESSION_COUNT);
        assert_eq!(buckets[0]["startedAt"], "2024-03-01T12:10:00");
        assert_eq!(buckets[49]["startedAt"], "2024-03-01T12:59:00");
        assert!(buckets.iter().all(|b| b["sessionsStarted"] == 1));
    }

    #[test]
    fn test_flush_payload_and_headers() {
        let transport = Arc::new(RecordingTransport::default());
        let clock = ManualClock::at(start());
        let mut tracker = tracker(&transport, &clock);

        tracker.start_session();
        assert!(tracker.flush());

        let (uri, payload, headers) = transport.deliveries().remove(0);
        assert_eq!(uri, "http://sessions.test");
        assert_eq!(payload["device"]["hostname"], "web-1");
        assert_eq!(payload["app"]["releaseStage"], "production");
        assert_eq!(payload["notifier"]["name"], crate::NOTIFIER_NAME);
        assert_eq!(
            payload["sessionCounts"],
            json!([{"startedAt": "2024-03-01T12:00:00", "sessionsStarted": 1}])
        );
        assert_eq!(headers.get("Bugsnag-Payload-Version").unwrap(), "1.0");
        assert_eq!(headers.get("Bugsnag-Api-Key").unwrap(), "abc123");
        assert!(tracker.counts().is_empty());
    }

    #[test]
    fn test_empty_flush_is_noop() {
        let transport = Arc::new(RecordingTransport::default());
        let clock = ManualClock::at(start());
        let mut tracker = tracker(&transport, &clock);

        tracker.start_session();
        assert!(tracker.flush());
        assert!(!tracker.flush());
        assert_eq!(transport.deliveries().len(), 1);
    }

    #[test]
    fn test_failed_flush_merges_back() {
        let transport = Arc::new(RecordingTransport::failing());
        let clock = ManualClock::at(start());
        let mut tracker = tracker(&transport, &clock);

        tracker.start_session();
        assert!(!tracker.flush());
        tracker.start_session();

        assert_eq!(tracker.counts().get("2024-03-01T12:00:00"), Some(&2));
    }

    #[test]
    fn test_failed_flush_calls_retry_hook() {
        let transport = Arc::new(RecordingTransport::failing());
        let clock = ManualClock::at(start());
        let retried = Arc::new(Mutex::new(Vec::new()));
        let retried_clone = retried.clone();
        let mut tracker = tracker(&transport, &clock)
            .with_retry_hook(move |counts| retried_clone.lock().unwrap().push(counts));

        tracker.start_session();
        assert!(!tracker.flush());

        assert!(tracker.counts().is_empty());
        let retried = retried.lock().unwrap();
        assert_eq!(retried.len(), 1);
        assert_eq!(retried[0].get("2024-03-01T12:00:00"), Some(&1));
    }

    #[test]
    fn test_auto_flush_after_interval() {
        let transport = Arc::new(RecordingTransport::default());
        let clock = ManualClock::at(start());
        let mut tracker = SessionTracker::with_clock(config(), transport.clone(), clock.clone());

        tracker.start_session();
        assert!(transport.deliveries().is_empty());

        clock.advance(chrono::Duration::seconds(61));
        tracker.start_session();
        assert_eq!(transport.deliveries().len(), 1);
        assert!(tracker.counts().is_empty());

        clock.advance(chrono::Duration::seconds(30));
        tracker.start_session();
        assert_eq!(transport.deliveries().len(), 1);
    }

    #[test]
    fn test_failed_auto_flush_waits_an_interval() {
        let transport = Arc::new(RecordingTransport::failing());
        let clock = ManualClock::at(start());
        let mut tracker = SessionTracker::with_clock(config(), transport.clone(), clock.clone());

        clock.advance(chrono::Duration::seconds(61));
        tracker.start_session();
        assert_eq!(transport.deliveries().len(), 1);

        clock.advance(chrono::Duration::seconds(30));
        tracker.start_session();
        assert_eq!(transport.deliveries().len(), 1);
        assert_eq!(tracker.counts().values().sum::<u64>(), 2);

        clock.advance(chrono::Duration::seconds(31));
        tracker.start_session();
        assert_eq!(transport.deliveries().len(), 2);
        assert_eq!(tracker.counts().values().sum::<u64>(), 3);
    }

    #[test]
    fn test_record_event() {
        let transport = Arc::new(RecordingTransport::default());
        let clock = ManualClock::at(start());
        let mut tracker = tracker(&transport, &clock);

        assert!(tracker.record_event(false).is_none());

        tracker.start_session();
        tracker.record_event(false);
        let session = tracker.record_event(true).unwrap();
        assert_eq!(session.events, SessionEvents { handled: 1, unhandled: 1 });
        assert_eq!(session.started_at, "2024-03-01T12:00:30.000Z");

        let json = serde_json::to_value(&session).unwrap();
        assert_eq!(json["events"], json!({"handled": 1, "unhandled": 1}));
        assert!(json["id"].as_str().is_some_and(|id| Uuid::parse_str(id).is_ok()));
    }
}
