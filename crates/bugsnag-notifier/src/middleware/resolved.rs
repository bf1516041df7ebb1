// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Stages backed by a [`Resolve`] capability, evaluated per event.

use crate::event::Event;
use crate::middleware::{isolate, Resolve};
use crate::pipeline::{Next, Stage};

/// Merges resolved metadata into the event.
pub struct ResolvedMetaData {
    resolver: Box<dyn Resolve>,
}

impl ResolvedMetaData {
    pub fn new<R: Resolve + 'static>(resolver: R) -> Self {
        ResolvedMetaData {
            resolver: Box::new(resolver),
        }
    }
}

impl Stage for ResolvedMetaData {
    fn handle(&self, event: &mut Event, next: Next<'_>) -> bool {
        if let Some(meta_data) = isolate("Metadata resolver", || self.resolver.resolve()) {
            event.set_meta_data(meta_data);
        }
        next.run(event)
    }
}

/// Replaces the event user with the resolved one.
pub struct ResolvedUser {
    resolver: Box<dyn Resolve>,
}

impl ResolvedUser {
    pub fn new<R: Resolve + 'static>(resolver: R) -> Self {
        ResolvedUser {
            resolver: Box::new(resolver),
        }
    }
}

impl Stage for ResolvedUser {
    fn handle(&self, event: &mut Event, next: Next<'_>) -> bool {
        if let Some(user) = isolate("User resolver", || self.resolver.resolve()) {
            event.set_user(user);
        }
        next.run(event)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::middleware::test_support::event;
    use crate::pipeline::Pipeline;
    use serde_json::{json, Map, Value};

    #[test]
    fn test_resolved_meta_data() {
        let mut pipeline = Pipeline::new();
        pipeline.pipe(ResolvedMetaData::new(|| {
            json!({"request": {"path": "/cart"}}).as_object().unwrap().clone()
        }));

        let mut event = event("Error");
        assert!(pipeline.execute(&mut event, |_| true));
        assert_eq!(event.meta_data()["request"]["path"], "/cart");
    }

    #[test]
    fn test_resolved_user() {
        let mut pipeline = Pipeline::new();
        pipeline.pipe(ResolvedUser::new(|| json!({"id": "42"}).as_object().unwrap().clone()));

        let mut event = event("Error");
        assert!(pipeline.execute(&mut event, |_| true));
        assert_eq!(Value::Object(event.user().clone()), json!({"id": "42"}));
    }

    #[test]
    fn test_panicking_resolver_is_skipped() {
        let mut pipeline = Pipeline::new();
        pipeline.pipe(ResolvedUser::new(|| -> Map<String, Value> { panic!("no session") }));

        let mut event = event("Error");
        assert!(pipeline.execute(&mut event, |_| true));
        assert!(event.user().is_empty());
    }
}
