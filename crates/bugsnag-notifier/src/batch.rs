// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Batching of events into size-bounded requests.
//!
//! Queued events are sent together in one `{apiKey, notifier, events}` body.
//! When that body is larger than the intake accepts, the batch is reduced
//! with an explicit work list instead of recursion:
//!
//! ```text
//!   [e1, e2, e3]  too large ──> [e1] then [e2, e3]
//!   [e1]          too large ──> e1 without metaData
//!   [e1]          still too large ──> dropped with a warning
//! ```
//!
//! Delivery is at most once: the queue is cleared by every `send()`, whatever
//! the outcome.

use crate::config::Configuration;
use crate::constants::{EVENT_PAYLOAD_VERSION, MAX_PAYLOAD_SIZE_BYTES};
use crate::event::Event;
use crate::transport::{build_headers, Transport};
use serde::Serialize;
use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, error, warn};

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct Payload<'a> {
    api_key: &'a str,
    notifier: Value,
    events: &'a [Value],
}

pub struct BatchDeliverer {
    config: Arc<Configuration>,
    transport: Arc<dyn Transport>,
    queue: Vec<Event>,
    max_payload_size: usize,
}

impl BatchDeliverer {
    #[must_use]
    pub fn new(config: Arc<Configuration>, transport: Arc<dyn Transport>) -> Self {
        BatchDeliverer {
            config,
            transport,
            queue: Vec::new(),
            max_payload_size: MAX_PAYLOAD_SIZE_BYTES,
        }
    }

    #[must_use]
    pub fn with_max_payload_size(mut self, max_payload_size: usize) -> Self {
        self.max_payload_size = max_payload_size;
        self
    }

    pub fn queue(&mut self, event: Event) {
        self.queue.push(event);
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.queue.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    /// Delivers every queued event and clears the queue.
    pub fn send(&mut self) {
        let events = std::mem::take(&mut self.queue);
        if events.is_empty() {
            debug!("No events to send");
            return;
        }

        let serialized: Vec<Value> = events
            .iter()
            .filter_map(|event| match event.to_json() {
                Ok(value) => Some(value),
                Err(e) => {
                    warn!("Dropping '{}': {}", event.name(), e);
                    None
                }
            })
            .collect();

        // Stack of pending batches; the next batch to send is on top.
        let mut work = vec![serialized];
        while let Some(mut batch) = work.pop() {
            if batch.is_empty() {
                continue;
            }

            let body = match self.encode(&batch) {
                Ok(body) => body,
                Err(e) => {
                    warn!("Unable to serialize batch of {} events: {}", batch.len(), e);
                    continue;
                }
            };
            if body.len() <= self.max_payload_size {
                self.deliver(body, batch.len());
                continue;
            }

            if batch.len() > 1 {
                debug!(
                    "Batch of {} events is {} bytes, splitting",
                    batch.len(),
                    body.len()
                );
                let rest = batch.split_off(1);
                work.push(rest);
                work.push(batch);
                continue;
            }

            self.send_stripped(batch);
        }
    }

    /// A single event that is too large is retried without its metadata.
    fn send_stripped(&self, mut batch: Vec<Value>) {
        for event in &mut batch {
            if let Some(fields) = event.as_object_mut() {
                fields.remove("metaData");
            }
        }

        match self.encode(&batch) {
            Ok(body) if body.len() <= self.max_payload_size => {
                debug!("Sending event without metaData to fit {} bytes", self.max_payload_size);
                self.deliver(body, batch.len());
            }
            Ok(body) => {
                warn!(
                    "Discarding event: payload is {} bytes without metaData, over the {} byte limit",
                    body.len(),
                    self.max_payload_size
                );
            }
            Err(e) => warn!("Unable to serialize event: {}", e),
        }
    }

    fn encode(&self, events: &[Value]) -> Result<Vec<u8>, serde_json::Error> {
        serde_json::to_vec(&Payload {
            api_key: &self.config.api_key,
            notifier: self.config.notifier_data(),
            events,
        })
    }

    fn deliver(&self, body: Vec<u8>, count: usize) {
        let headers = match build_headers(&self.config.api_key, EVENT_PAYLOAD_VERSION) {
            Ok(headers) => headers,
            Err(e) => {
                error!("Unable to send {} events: {}", count, e);
                return;
            }
        };

        match self
            .transport
            .deliver(&self.config.notify_endpoint, body, headers)
        {
            Ok(()) => debug!("Sent {} events", count),
            Err(e) if e.is_permanent() => {
                error!("Events rejected, not retrying {} events: {}", count, e);
            }
            Err(e) => warn!("Failed to send {} events: {}", count, e),
        }
    }
}

impl std::fmt::Debug for BatchDeliverer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BatchDeliverer")
            .field("queued", &self.queue.len())
            .field("max_payload_size", &self.max_payload_size)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::DeliveryError;
    use crate::stacktrace::StackTraceBuilder;
    use reqwest::header::HeaderMap;
    use serde_json::json;
    use std::sync::Mutex;
    use tracing_test::traced_test;

    #[derive(Default)]
    struct RecordingTransport {
        bodies: Mutex<Vec<Value>>,
        status: Option<u16>,
    }

    impl RecordingTransport {
        fn bodies(&self) -> Vec<Value> {
            self.bodies.lock().unwrap().clone()
        }
    }

    impl Transport for RecordingTransport {
        fn deliver(&self, uri: &str, payload: Vec<u8>, headers: HeaderMap) -> Result<(), DeliveryError> {
            assert_eq!(uri, "http://notify.test");
            assert_eq!(headers.get("Bugsnag-Payload-Version").unwrap(), "4.0");
            self.bodies.lock().unwrap().push(serde_json::from_slice(&payload).unwrap());
            match self.status {
                Some(status) => Err(DeliveryError::Status(status, String::new())),
                None => Ok(()),
            }
        }
    }

    fn config() -> Arc<Configuration> {
        Arc::new(Configuration {
            notify_endpoint: "http://notify.test".to_string(),
            send_code: false,
            ..Configuration::new("abc123")
        })
    }

    fn event(name: &str, padding: usize) -> Event {
        let config = config();
        let builder = StackTraceBuilder::new(&config);
        let mut event = Event::from_named(config, &builder, name, None).unwrap();
        if padding > 0 {
            event.add_meta_data_section(
                "padding",
                json!({"data": "x".repeat(padding)}).as_object().unwrap().clone(),
            );
        }
        event
    }

    fn names(body: &Value) -> Vec<String> {
        body["events"]
            .as_array()
            .unwrap()
            .iter()
            .map(|e| e["exceptions"][0]["errorClass"].as_str().unwrap().to_string())
            .collect()
    }

    #[test]
    fn test_send_batch() {
        let transport = Arc::new(RecordingTransport::default());
        let mut batch = BatchDeliverer::new(config(), transport.clone());
        batch.queue(event("First", 0));
        batch.queue(event("Second", 0));
        assert_eq!(batch.len(), 2);

        batch.send();

        let bodies = transport.bodies();
        assert_eq!(bodies.len(), 1);
        assert_eq!(bodies[0]["apiKey"], "abc123");
        assert_eq!(bodies[0]["notifier"]["name"], crate::NOTIFIER_NAME);
        assert_eq!(names(&bodies[0]), vec!["First", "Second"]);
        assert!(batch.is_empty());
    }

    #[test]
    fn test_send_twice_delivers_once() {
        let transport = Arc::new(RecordingTransport::default());
        let mut batch = BatchDeliverer::new(config(), transport.clone());
        batch.queue(event("First", 0));

        batch.send();
        batch.send();
        assert_eq!(transport.bodies().len(), 1);
    }

    #[test]
    fn test_queue_cleared_after_failure() {
        let transport = Arc::new(RecordingTransport {
            status: Some(500),
            ..Default::default()
        });
        let mut batch = BatchDeliverer::new(config(), transport.clone());
        batch.queue(event("First", 0));

        batch.send();
        assert!(batch.is_empty());
        batch.send();
        assert_eq!(transport.bodies().len(), 1);
    }

    #[test]
    fn test_single_oversized_event_sent_without_meta_data() {
        let transport = Arc::new(RecordingTransport::default());
        let mut batch = BatchDeliverer::new(config(), transport.clone());
        batch.queue(event("Huge", MAX_PAYLOAD_SIZE_BYTES + 1));

        batch.send();

        let bodies = transport.bodies();
        assert_eq!(bodies.len(), 1);
        assert_eq!(names(&bodies[0]), vec!["Huge"]);
        assert!(bodies[0]["events"][0].get("metaData").is_none());
    }

    #[test]
    fn test_oversized_first_event_splits_into_two_deliveries() {
        let transport = Arc::new(RecordingTransport::default());
        let mut batch = BatchDeliverer::new(config(), transport.clone());
        batch.queue(event("Huge", MAX_PAYLOAD_SIZE_BYTES + 1));
        batch.queue(event("Small", 10));

        batch.send();

        let bodies = transport.bodies();
        assert_eq!(bodies.len(), 2);
        assert_eq!(names(&bodies[0]), vec!["Huge"]);
        assert!(bodies[0]["events"][0].get("metaData").is_none());
        assert_eq!(names(&bodies[1]), vec!["Small"]);
        assert_eq!(bodies[1]["events"][0]["metaData"]["padding"]["data"], "x".repeat(10));
    }

    #[test]
    fn test_split_preserves_order() {
        let transport = Arc::new(RecordingTransport::default());
        let single = {
            let probe = BatchDeliverer::new(config(), transport.clone());
            probe.encode(&[event("A", 500).to_json().unwrap()]).unwrap().len()
        };

        // room for two padded events per request, not three
        let mut batch =
            BatchDeliverer::new(config(), transport.clone()).with_max_payload_size(single * 2);
        for name in ["A", "B", "C", "D"] {
            batch.queue(event(name, 500));
        }
        batch.send();

        let delivered: Vec<String> = transport.bodies().iter().flat_map(names).collect();
        assert_eq!(delivered, vec!["A", "B", "C", "D"]);
        assert_eq!(transport.bodies().len(), 3);
    }

    #[test]
    #[traced_test]
    fn test_event_too_large_without_meta_data_is_dropped() {
        let transport = Arc::new(RecordingTransport::default());
        let mut batch = BatchDeliverer::new(config(), transport.clone()).with_max_payload_size(64);
        batch.queue(event("TooBig", 0));

        batch.send();

        assert!(transport.bodies().is_empty());
        assert!(logs_contain("Discarding event"));
    }

    #[test]
    #[traced_test]
    fn test_permanent_failure_logged() {
        let transport = Arc::new(RecordingTransport {
            status: Some(400),
            ..Default::default()
        });
        let mut batch = BatchDeliverer::new(config(), transport);
        batch.queue(event("First", 0));

        batch.send();
        assert!(logs_contain("not retrying"));
    }
}
