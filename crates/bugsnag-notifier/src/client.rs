// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! The notifier client.
//!
//! ```text
//!   notify(error)
//!       │
//!       v
//!   Event::from_error ──> Pipeline (standard stages, then host stages)
//!                              │
//!                              v
//!                         BatchDeliverer ──flush()──> Transport
//!
//!   leave_breadcrumb ──> Recorder        (read by BreadcrumbData)
//!   start_session    ──> SessionTracker  (read by SessionData)
//! ```
//!
//! Every component sits behind a `Mutex`, so a `Client` can be shared across
//! threads. Stages and callbacks run while the pipeline is locked and must
//! not call back into the same client's `notify`.

use crate::batch::BatchDeliverer;
use crate::breadcrumbs::{Breadcrumb, BreadcrumbType, Recorder};
use crate::config::Configuration;
use crate::constants::MAX_BREADCRUMB_NAME_LENGTH;
use crate::error::NotifierError;
use crate::event::{CapturedError, Event};
use crate::lock;
use crate::middleware::{
    isolate, BreadcrumbData, CallbackBridge, CallbackResult, DiscardClasses, GlobalMetaData,
    NotificationSkipper, SessionData,
};
use crate::pipeline::{Pipeline, Stage, StageHandle};
use crate::session::SessionTracker;
use crate::stacktrace::StackTraceBuilder;
use crate::transport::{HttpTransport, Transport};
use serde_json::{Map, Value};
use std::sync::{Arc, Mutex};
use tracing::debug;

pub struct Client {
    config: Arc<Configuration>,
    stacktrace: StackTraceBuilder,
    pipeline: Mutex<Pipeline>,
    recorder: Arc<Mutex<Recorder>>,
    sessions: Arc<Mutex<SessionTracker>>,
    batch: Mutex<BatchDeliverer>,
}

impl Client {
    /// Creates a client delivering over the default HTTP transport.
    pub fn make(config: Configuration) -> Result<Self, NotifierError> {
        let transport = Arc::new(HttpTransport::new(&config));
        Self::new(config, transport)
    }

    pub fn new(config: Configuration, transport: Arc<dyn Transport>) -> Result<Self, NotifierError> {
        config.validate()?;
        let config = Arc::new(config);

        let recorder = Arc::new(Mutex::new(Recorder::new()));
        let sessions = Arc::new(Mutex::new(SessionTracker::new(
            config.clone(),
            transport.clone(),
        )));

        let mut pipeline = Pipeline::new();
        pipeline.pipe(NotificationSkipper::new(config.clone()));
        pipeline.pipe(DiscardClasses::new(config.clone()));
        pipeline.pipe(GlobalMetaData::new(config.clone()));
        pipeline.pipe(BreadcrumbData::new(recorder.clone()));
        pipeline.pipe(SessionData::new(sessions.clone()));

        let client = Client {
            stacktrace: StackTraceBuilder::new(&config),
            batch: Mutex::new(BatchDeliverer::new(config.clone(), transport)),
            pipeline: Mutex::new(pipeline),
            recorder,
            sessions,
            config,
        };

        if client.config.auto_capture_sessions {
            client.start_session();
        }
        Ok(client)
    }

    #[must_use]
    pub fn config(&self) -> &Configuration {
        &self.config
    }

    /// Notifies an error.
    ///
    /// Returns `Ok(false)` when the error was filtered out (masked error code,
    /// dropped by a stage) and an error when it could not be turned into an
    /// event.
    pub fn notify(&self, error: CapturedError) -> Result<bool, NotifierError> {
        self.notify_with(error, |_| true)
    }

    /// Notifies an error, running `callback` after every pipeline stage.
    /// Returning `false` from the callback discards the event.
    pub fn notify_with<F>(&self, error: CapturedError, callback: F) -> Result<bool, NotifierError>
    where
        F: FnOnce(&mut Event) -> bool,
    {
        if let CapturedError::RawCode { code, .. } = &error {
            if self.config.should_ignore_error_code(*code) {
                debug!("Ignoring error code {} masked by error_reporting_level", code);
                return Ok(false);
            }
        }

        let event = Event::from_error(self.config.clone(), &self.stacktrace, error)?;
        Ok(self.notify_event(event, callback))
    }

    /// Runs an already built event through the pipeline and queues it.
    pub fn notify_event<F>(&self, mut event: Event, callback: F) -> bool
    where
        F: FnOnce(&mut Event) -> bool,
    {
        let accepted = lock(&self.pipeline).execute(&mut event, |event| {
            isolate("Notify callback", || callback(event)).unwrap_or(true)
        });
        if !accepted {
            debug!("Event '{}' was not delivered", event.name());
            return false;
        }

        self.record_error_breadcrumb(&event);

        let mut batch = lock(&self.batch);
        batch.queue(event);
        if !self.config.batch_sending {
            batch.send();
        }
        true
    }

    /// Records a breadcrumb. `breadcrumb_type` must be one of the
    /// [`BreadcrumbType`] names.
    pub fn leave_breadcrumb(
        &self,
        name: &str,
        breadcrumb_type: &str,
        meta_data: Map<String, Value>,
    ) -> Result<(), NotifierError> {
        let breadcrumb = Breadcrumb::new(name, breadcrumb_type, meta_data)?;
        self.record_breadcrumb(breadcrumb);
        Ok(())
    }

    pub fn record_breadcrumb(&self, breadcrumb: Breadcrumb) {
        lock(&self.recorder).record(breadcrumb);
    }

    pub fn clear_breadcrumbs(&self) {
        lock(&self.recorder).clear();
    }

    /// Appends a stage after the standard ones.
    pub fn register_middleware<S>(&self, stage: S) -> StageHandle
    where
        S: Stage + 'static,
    {
        lock(&self.pipeline).pipe(stage)
    }

    pub fn insert_middleware_before<S>(&self, stage: S, before: StageHandle) -> StageHandle
    where
        S: Stage + 'static,
    {
        lock(&self.pipeline).insert_before(stage, before)
    }

    /// Registers a callback run for every event; see [`CallbackBridge`].
    pub fn register_callback<F>(&self, callback: F) -> StageHandle
    where
        F: Fn(&mut Event) -> CallbackResult + Send + 'static,
    {
        self.register_middleware(CallbackBridge::new(callback))
    }

    pub fn start_session(&self) {
        lock(&self.sessions).start_session();
    }

    /// Sends queued events, then tracked session counts.
    pub fn flush(&self) {
        lock(&self.batch).send();
        lock(&self.sessions).flush();
    }

    fn record_error_breadcrumb(&self, event: &Event) {
        let mut meta_data = Map::new();
        meta_data.insert("name".to_string(), Value::from(event.name()));
        if let Some(message) = event.message() {
            meta_data.insert("message".to_string(), Value::from(message));
        }
        meta_data.insert("severity".to_string(), Value::from(event.severity().as_str()));

        let name: String = event.name().chars().take(MAX_BREADCRUMB_NAME_LENGTH).collect();
        match Breadcrumb::with_type(&name, BreadcrumbType::Error, meta_data) {
            Ok(breadcrumb) => self.record_breadcrumb(breadcrumb),
            Err(e) => debug!("Unable to record error breadcrumb: {}", e),
        }
    }
}

impl Drop for Client {
    fn drop(&mut self) {
        self.flush();
    }
}

impl std::fmt::Debug for Client {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Client")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}
