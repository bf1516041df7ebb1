// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use crate::event::Event;
use crate::middleware::isolate;
use crate::pipeline::{Next, Stage};
use std::error::Error;
use tracing::{debug, warn};

/// `Ok(false)` discards the event; errors are logged and ignored.
pub type CallbackResult = Result<bool, Box<dyn Error + Send + Sync>>;

type Callback = Box<dyn Fn(&mut Event) -> CallbackResult + Send>;

/// Runs a host callback that may modify or discard the event.
///
/// If the callback panics or returns an error, any change it made is rolled
/// back and the event continues down the pipeline.
pub struct CallbackBridge {
    callback: Callback,
}

impl CallbackBridge {
    pub fn new<F>(callback: F) -> Self
    where
        F: Fn(&mut Event) -> CallbackResult + Send + 'static,
    {
        CallbackBridge {
            callback: Box::new(callback),
        }
    }
}

impl Stage for CallbackBridge {
    fn handle(&self, event: &mut Event, next: Next<'_>) -> bool {
        let original = event.clone();
        match isolate("Callback", || (self.callback)(event)) {
            Some(Ok(true)) => {}
            Some(Ok(false)) => {
                debug!("Callback discarded '{}'", event.name());
                return false;
            }
            Some(Err(e)) => {
                warn!("Callback failed for '{}': {}", original.name(), e);
                *event = original;
            }
            None => *event = original,
        }
        next.run(event)
    }
}

impl std::fmt::Debug for CallbackBridge {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CallbackBridge").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::middleware::test_support::event;
    use crate::pipeline::Pipeline;

    fn run(bridge: CallbackBridge, event: &mut Event) -> bool {
        let mut pipeline = Pipeline::new();
        pipeline.pipe(bridge);
        pipeline.execute(event, |_| true)
    }

    #[test]
    fn test_callback_modifies_event() {
        let bridge = CallbackBridge::new(|event: &mut Event| {
            event.set_context(Some("/cart"));
            Ok(true)
        });
        let mut event = event("Error");
        assert!(run(bridge, &mut event));
        assert_eq!(event.context(), Some("/cart"));
    }

    #[test]
    fn test_callback_discards_event() {
        let bridge = CallbackBridge::new(|_: &mut Event| Ok(false));
        assert!(!run(bridge, &mut event("Error")));
    }

    #[test]
    fn test_callback_error_rolls_back() {
        let bridge = CallbackBridge::new(|event: &mut Event| {
            event.set_context(Some("half done"));
            Err("lookup failed".into())
        });
        let mut event = event("Error");
        assert!(run(bridge, &mut event));
        assert_eq!(event.context(), None);
    }

    #[test]
    fn test_callback_panic_rolls_back() {
        let bridge = CallbackBridge::new(|event: &mut Event| {
            event.set_context(Some("half done"));
            panic!("callback bug");
        });
        let mut event = event("Error");
        assert!(run(bridge, &mut event));
        assert_eq!(event.context(), None);
    }
}
