// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Standard pipeline stages.
//!
//! The client registers them in this order:
//!
//! 1. [`NotificationSkipper`] - drop events outside the notify release stages
//! 2. [`DiscardClasses`] - drop events by name
//! 3. [`GlobalMetaData`] - merge configured metadata
//! 4. [`BreadcrumbData`] - attach recorded breadcrumbs
//! 5. [`SessionData`] - attach and count against the current session
//!
//! [`CallbackBridge`], [`ResolvedMetaData`] and [`ResolvedUser`] run code
//! supplied by the host application. A panic or error in that code never
//! stops the event: the stage is skipped and the event continues unchanged.

use serde_json::{Map, Value};
use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use tracing::warn;

pub mod breadcrumb_data;
pub mod callback_bridge;
pub mod discard_classes;
pub mod global_meta_data;
pub mod release_stage;
pub mod resolved;
pub mod session_data;

pub use breadcrumb_data::BreadcrumbData;
pub use callback_bridge::{CallbackBridge, CallbackResult};
pub use discard_classes::DiscardClasses;
pub use global_meta_data::GlobalMetaData;
pub use release_stage::NotificationSkipper;
pub use resolved::{ResolvedMetaData, ResolvedUser};
pub use session_data::SessionData;

/// Produces a map on demand, e.g. the current request or user.
pub trait Resolve: Send + Sync {
    fn resolve(&self) -> Map<String, Value>;
}

impl<F> Resolve for F
where
    F: Fn() -> Map<String, Value> + Send + Sync,
{
    fn resolve(&self) -> Map<String, Value> {
        self()
    }
}

/// Runs host-supplied code, turning a panic into `None`.
pub(crate) fn isolate<T>(what: &str, f: impl FnOnce() -> T) -> Option<T> {
    match panic::catch_unwind(AssertUnwindSafe(f)) {
        Ok(value) => Some(value),
        Err(payload) => {
            warn!("{} panicked: {}", what, panic_message(payload.as_ref()));
            None
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    if let Some(message) = payload.downcast_ref::<&str>() {
        message
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message
    } else {
        "unknown panic"
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use crate::config::Configuration;
    use crate::event::Event;
    use crate::stacktrace::StackTraceBuilder;
    use std::sync::Arc;

    pub fn config() -> Configuration {
        Configuration {
            send_code: false,
            ..Configuration::new("0123456789abcdef0123456789abcdef")
        }
    }

    pub fn event_with(config: Configuration, name: &str) -> Event {
        let config = Arc::new(config);
        let builder = StackTraceBuilder::new(&config);
        Event::from_named(config, &builder, name, Some("message")).unwrap()
    }

    pub fn event(name: &str) -> Event {
        event_with(config(), name)
    }
}
