// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Limits and wire constants shared by the notifier components.
//!
//! The size limits mirror what the intake accepts; anything larger is rejected
//! with a 413 (Payload Too Large), so the batch deliverer enforces
//! [`MAX_PAYLOAD_SIZE_BYTES`] before handing a body to the transport.

use std::time::Duration;

/// Maximum size of one request body in bytes (1MB).
///
/// Batches that serialize larger than this are split, then stripped of
/// metadata, then dropped. See [`crate::batch`].
pub const MAX_PAYLOAD_SIZE_BYTES: usize = 1_048_576;

/// Number of breadcrumbs kept by the recorder. Older entries are overwritten.
pub const MAX_BREADCRUMBS: usize = 25;

/// Maximum length of a breadcrumb name, in characters.
pub const MAX_BREADCRUMB_NAME_LENGTH: usize = 30;

/// Maximum serialized size of breadcrumb metadata in bytes.
///
/// Breadcrumbs over this size are recorded without their metadata.
pub const MAX_BREADCRUMB_METADATA_SIZE_BYTES: usize = 4096;

/// Maximum number of per-minute session buckets retained between flushes.
pub const MAX_SESSION_COUNT: usize = 50;

/// Minimum time between two automatic session flushes.
pub const SESSION_DELIVERY_INTERVAL: Duration = Duration::from_secs(60);

/// Number of source lines attached around a frame's line.
pub const DEFAULT_CONTEXT_LINES: usize = 7;

/// Source lines longer than this are truncated, in characters.
pub const MAX_CODE_LINE_LENGTH: usize = 200;

/// Upper bound on the number of causes walked when building an event.
pub const MAX_CAUSE_CHAIN_DEPTH: usize = 32;

/// Payload version sent with error batches.
pub const EVENT_PAYLOAD_VERSION: &str = "4.0";

/// Payload version sent with session batches.
pub const SESSION_PAYLOAD_VERSION: &str = "1.0";

/// Marker that replaces the value of filtered metadata keys.
pub const FILTERED_VALUE: &str = "[FILTERED]";

/// Default intake for error batches.
pub const DEFAULT_NOTIFY_ENDPOINT: &str = "https://notify.bugsnag.com";

/// Default intake for session batches.
pub const DEFAULT_SESSION_ENDPOINT: &str = "https://sessions.bugsnag.com";

/// Default request timeout for the HTTP transport, in seconds.
pub const DEFAULT_TIMEOUT_SECS: u64 = 10;
