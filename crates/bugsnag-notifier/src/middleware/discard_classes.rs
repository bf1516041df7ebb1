// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use crate::config::Configuration;
use crate::event::Event;
use crate::pipeline::{Next, Stage};
use std::sync::Arc;
use tracing::debug;

/// Drops events whose name is listed in `discard_classes`.
#[derive(Debug, Clone)]
pub struct DiscardClasses {
    config: Arc<Configuration>,
}

impl DiscardClasses {
    #[must_use]
    pub fn new(config: Arc<Configuration>) -> Self {
        DiscardClasses { config }
    }
}

impl Stage for DiscardClasses {
    fn handle(&self, event: &mut Event, next: Next<'_>) -> bool {
        if self.config.discard_classes.iter().any(|name| name == event.name()) {
            debug!("Discarding '{}'", event.name());
            return false;
        }
        next.run(event)
    }
}
