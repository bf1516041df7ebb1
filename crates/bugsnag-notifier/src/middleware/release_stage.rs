// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use crate::config::Configuration;
use crate::event::Event;
use crate::pipeline::{Next, Stage};
use std::sync::Arc;
use tracing::debug;

/// Drops every event when the release stage is not one of
/// `notify_release_stages`.
#[derive(Debug, Clone)]
pub struct NotificationSkipper {
    config: Arc<Configuration>,
}

impl NotificationSkipper {
    #[must_use]
    pub fn new(config: Arc<Configuration>) -> Self {
        NotificationSkipper { config }
    }
}

impl Stage for NotificationSkipper {
    fn handle(&self, event: &mut Event, next: Next<'_>) -> bool {
        if !self.config.should_notify() {
            debug!(
                "Skipping '{}': release stage {:?} is not notified",
                event.name(),
                self.config.release_stage
            );
            return false;
        }
        next.run(event)
    }
}
