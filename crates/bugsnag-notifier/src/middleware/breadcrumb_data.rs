// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use crate::breadcrumbs::Recorder;
use crate::event::Event;
use crate::lock;
use crate::pipeline::{Next, Stage};
use std::sync::{Arc, Mutex};

/// Attaches a snapshot of the recorded breadcrumbs.
#[derive(Debug, Clone)]
pub struct BreadcrumbData {
    recorder: Arc<Mutex<Recorder>>,
}

impl BreadcrumbData {
    #[must_use]
    pub fn new(recorder: Arc<Mutex<Recorder>>) -> Self {
        BreadcrumbData { recorder }
    }
}

impl Stage for BreadcrumbData {
    fn handle(&self, event: &mut Event, next: Next<'_>) -> bool {
        let breadcrumbs = lock(&self.recorder).snapshot();
        event.set_breadcrumbs(breadcrumbs);
        next.run(event)
    }
}
