// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use crate::config::Configuration;
use crate::event::Event;
use crate::pipeline::{Next, Stage};
use std::sync::Arc;

/// Merges `Configuration::meta_data` into every event.
#[derive(Debug, Clone)]
pub struct GlobalMetaData {
    config: Arc<Configuration>,
}

impl GlobalMetaData {
    #[must_use]
    pub fn new(config: Arc<Configuration>) -> Self {
        GlobalMetaData { config }
    }
}

impl Stage for GlobalMetaData {
    fn handle(&self, event: &mut Event, next: Next<'_>) -> bool {
        if !self.config.meta_data.is_empty() {
            event.set_meta_data(self.config.meta_data.clone());
        }
        next.run(event)
    }
}
