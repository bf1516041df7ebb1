// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use crate::breadcrumbs::circular_buffer::{CircularBuffer, Iter};
use crate::breadcrumbs::Breadcrumb;
use crate::constants::{MAX_BREADCRUMBS, MAX_BREADCRUMB_METADATA_SIZE_BYTES};
use tracing::warn;

/// Keeps the most recent breadcrumbs, oldest first.
#[derive(Debug, Clone)]
pub struct Recorder {
    buffer: CircularBuffer<Breadcrumb>,
}

impl Default for Recorder {
    fn default() -> Self {
        Self::with_capacity(MAX_BREADCRUMBS)
    }
}

impl Recorder {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        Recorder {
            buffer: CircularBuffer::new(capacity),
        }
    }

    /// Records a breadcrumb, overwriting the oldest one when full.
    ///
    /// Metadata larger than the per-breadcrumb limit is dropped; the
    /// breadcrumb itself is kept.
    pub fn record(&mut self, mut breadcrumb: Breadcrumb) {
        let meta_size = serde_json::to_vec(breadcrumb.meta_data()).map_or(usize::MAX, |bytes| bytes.len());
        if meta_size > MAX_BREADCRUMB_METADATA_SIZE_BYTES {
            warn!(
                "Breadcrumb '{}' metadata is {} bytes, over the {} byte limit; dropping metadata",
                breadcrumb.name(),
                meta_size,
                MAX_BREADCRUMB_METADATA_SIZE_BYTES
            );
            breadcrumb.drop_meta_data();
        }
        self.buffer.push(breadcrumb);
    }

    #[must_use]
    pub fn iter(&self) -> Iter<'_, Breadcrumb> {
        self.buffer.iter()
    }

    /// Copy of the current breadcrumbs, oldest first.
    #[must_use]
    pub fn snapshot(&self) -> Vec<Breadcrumb> {
        self.iter().cloned().collect()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    pub fn clear(&mut self) {
        self.buffer.clear();
    }
}
