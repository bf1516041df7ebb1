// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! # Bugsnag Notifier
//!
//! An in-process error notifier. It turns errors raised by the host application
//! into normalized events, runs them through a middleware pipeline and delivers
//! them in size-bounded batches to a Bugsnag-compatible intake over HTTP/JSON.
//!
//! ## Architecture
//!
//! - [`stacktrace`]: raw backtrace normalization and source snippets
//! - [`event`]: the event model, cause chains and payload serialization
//! - [`pipeline`] / [`middleware`]: ordered enrichment and discard stages
//! - [`breadcrumbs`]: fixed-capacity history of what happened before an error
//! - [`session`]: per-minute session counting and periodic flushing
//! - [`batch`] / [`transport`]: batching, payload size adaptation and HTTP delivery
//! - [`client`]: the composition root tying the pieces together
//!
//! Everything runs on the calling thread. There is no background task: events
//! are delivered when [`client::Client::flush`] is called (or the client is
//! dropped), and sessions are delivered when the delivery interval elapses.
//!
//! ```no_run
//! use bugsnag_notifier::{client::Client, config::Configuration, event::CapturedError};
//!
//! let config = Configuration::new("0123456789abcdef0123456789abcdef");
//! let client = Client::make(config).expect("valid configuration");
//! client
//!     .notify(CapturedError::named("Timeout", "upstream took too long"))
//!     .expect("valid error");
//! client.flush();
//! ```

#![cfg_attr(not(test), deny(clippy::panic))]
#![cfg_attr(not(test), deny(clippy::unwrap_used))]
#![cfg_attr(not(test), deny(clippy::expect_used))]
#![cfg_attr(not(test), deny(clippy::todo))]
#![cfg_attr(not(test), deny(clippy::unimplemented))]

/// Size-adaptive batching of events
pub mod batch;

/// Breadcrumb model and fixed-capacity recorder
pub mod breadcrumbs;

/// Client composing stack traces, pipeline, breadcrumbs, sessions and delivery
pub mod client;

/// Source code snippet extraction for stack frames
pub mod code;

/// Notifier configuration from code and environment variables
pub mod config;

/// Limits and wire constants
pub mod constants;

/// Error types
pub mod error;

/// Static lookup table for raw error codes
pub mod error_types;

/// Event model and serialization
pub mod event;

/// Logging infrastructure and tracing setup
pub mod logger;

/// Standard pipeline stages
pub mod middleware;

/// Ordered middleware pipeline
pub mod pipeline;

/// Session tracking and aggregation
pub mod session;

/// Stack trace normalization
pub mod stacktrace;

/// HTTP delivery of payloads
pub mod transport;

/// Name reported in the `notifier` section of every payload.
pub const NOTIFIER_NAME: &str = "Bugsnag Rust";

/// Version reported in the `notifier` section of every payload.
pub const NOTIFIER_VERSION: &str = env!("CARGO_PKG_VERSION");

/// URL reported in the `notifier` section of every payload.
pub const NOTIFIER_URL: &str = "https://github.com/DataDog/serverless-components";

/// Locks `mutex`, recovering the data if a previous holder panicked.
pub(crate) fn lock<T>(mutex: &std::sync::Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(std::sync::PoisonError::into_inner)
}
