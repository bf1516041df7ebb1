// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use crate::event::Event;
use crate::lock;
use crate::pipeline::{Next, Stage};
use crate::session::SessionTracker;
use std::sync::{Arc, Mutex};

/// Counts the event against the current session and attaches the session.
///
/// Events raised while no session is active pass through untouched.
#[derive(Debug, Clone)]
pub struct SessionData {
    tracker: Arc<Mutex<SessionTracker>>,
}

impl SessionData {
    #[must_use]
    pub fn new(tracker: Arc<Mutex<SessionTracker>>) -> Self {
        SessionData { tracker }
    }
}

impl Stage for SessionData {
    fn handle(&self, event: &mut Event, next: Next<'_>) -> bool {
        let session = lock(&self.tracker).record_event(event.unhandled());
        if session.is_some() {
            event.set_session(session);
        }
        next.run(event)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::DeliveryError;
    use crate::middleware::test_support::{config, event};
    use crate::pipeline::Pipeline;
    use crate::transport::Transport;
    use reqwest::header::HeaderMap;

    struct NullTransport;

    impl Transport for NullTransport {
        fn deliver(&self, _: &str, _: Vec<u8>, _: HeaderMap) -> Result<(), DeliveryError> {
            Ok(())
        }
    }

    #[test]
    fn test_attaches_and_counts_session() {
        let tracker = Arc::new(Mutex::new(SessionTracker::new(
            Arc::new(config()),
            Arc::new(NullTransport),
        )));
        let mut pipeline = Pipeline::new();
        pipeline.pipe(SessionData::new(tracker.clone()));

        let mut event = event("Error");
        assert!(pipeline.execute(&mut event, |_| true));
        assert!(event.session().is_none());

        lock(&tracker).start_session();
        let mut handled = crate::middleware::test_support::event("Error");
        pipeline.execute(&mut handled, |_| true);
        let mut unhandled = crate::middleware::test_support::event("Crash");
        unhandled.set_unhandled(true);
        pipeline.execute(&mut unhandled, |_| true);

        let session = unhandled.session().unwrap();
        assert_eq!(session.events.handled, 1);
        assert_eq!(session.events.unhandled, 1);
        assert_eq!(handled.session().unwrap().id, session.id);
    }
}
