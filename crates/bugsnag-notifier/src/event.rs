// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! The event model.
//!
//! An [`Event`] is one captured error, normalized and ready to be enriched by
//! the pipeline. Errors enter the model through the [`CapturedError`] union,
//! which covers native Rust errors, raw numeric error codes and user-named
//! errors.

use crate::breadcrumbs::Breadcrumb;
use crate::config::Configuration;
use crate::constants::{EVENT_PAYLOAD_VERSION, FILTERED_VALUE, MAX_CAUSE_CHAIN_DEPTH};
use crate::error::NotifierError;
use crate::error_types;
use crate::session::Session;
use crate::stacktrace::{Frame, RawFrame, StackTraceBuilder};
use serde::Serialize;
use serde_json::{Map, Value};
use std::error::Error;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Error,
    Warning,
    Info,
}

impl Severity {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Severity::Error => "error",
            Severity::Warning => "warning",
            Severity::Info => "info",
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Severity {
    type Err = NotifierError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "error" => Ok(Severity::Error),
            "warning" => Ok(Severity::Warning),
            "info" => Ok(Severity::Info),
            other => Err(NotifierError::InvalidSeverity(other.to_string())),
        }
    }
}

/// Why an event has its severity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum SeverityReason {
    HandledException,
    HandledError,
    UnhandledError,
    UserSpecifiedSeverity,
}

/// An error handed to the notifier.
#[derive(Debug)]
pub enum CapturedError {
    /// A Rust error value; its `source()` chain becomes the cause chain.
    Native {
        name: String,
        error: Box<dyn Error + Send + Sync + 'static>,
    },
    /// A numeric error code with the location it was raised at.
    RawCode {
        code: u32,
        message: String,
        file: String,
        line: u32,
        backtrace: Option<Vec<RawFrame>>,
    },
    /// An error identified only by a name chosen by the caller.
    Named {
        name: String,
        message: Option<String>,
    },
}

impl CapturedError {
    /// Wraps an error value, naming it after its concrete type.
    pub fn native<E>(error: E) -> Self
    where
        E: Error + Send + Sync + 'static,
    {
        CapturedError::Native {
            name: short_type_name(std::any::type_name::<E>()).to_string(),
            error: Box::new(error),
        }
    }

    /// Wraps an already boxed error. The concrete type is erased, so the name
    /// is taken from its `Debug` output.
    #[must_use]
    pub fn boxed(error: Box<dyn Error + Send + Sync + 'static>) -> Self {
        CapturedError::Native {
            name: debug_name(error.as_ref()),
            error,
        }
    }

    #[must_use]
    pub fn raw_code(code: u32, message: &str, file: &str, line: u32) -> Self {
        CapturedError::RawCode {
            code,
            message: message.to_string(),
            file: file.to_string(),
            line,
            backtrace: None,
        }
    }

    /// Attaches a raw backtrace to a [`CapturedError::RawCode`]. Other variants
    /// are returned unchanged.
    #[must_use]
    pub fn with_backtrace(self, frames: Vec<RawFrame>) -> Self {
        match self {
            CapturedError::RawCode {
                code,
                message,
                file,
                line,
                ..
            } => CapturedError::RawCode {
                code,
                message,
                file,
                line,
                backtrace: Some(frames),
            },
            other => other,
        }
    }

    #[must_use]
    pub fn named(name: &str, message: &str) -> Self {
        CapturedError::Named {
            name: name.to_string(),
            message: Some(message.to_string()).filter(|m| !m.is_empty()),
        }
    }
}

/// One captured error occurrence.
#[derive(Debug, Clone)]
pub struct Event {
    config: Arc<Configuration>,
    name: String,
    message: Option<String>,
    severity: Severity,
    severity_reason: SeverityReason,
    unhandled: bool,
    stacktrace: Vec<Frame>,
    meta_data: Map<String, Value>,
    user: Map<String, Value>,
    context: Option<String>,
    grouping_hash: Option<String>,
    previous: Option<Box<Event>>,
    breadcrumbs: Vec<Breadcrumb>,
    session: Option<Session>,
}

impl Event {
    /// Builds an event from any captured error.
    pub fn from_error(
        config: Arc<Configuration>,
        stacktrace: &StackTraceBuilder,
        error: CapturedError,
    ) -> Result<Self, NotifierError> {
        match error {
            CapturedError::Native { name, error } => {
                Ok(Self::from_native(config, stacktrace, &name, error.as_ref()))
            }
            CapturedError::RawCode {
                code,
                message,
                file,
                line,
                backtrace,
            } => Ok(Self::from_raw_code(
                config,
                stacktrace,
                code,
                &message,
                &file,
                line,
                backtrace.as_deref(),
            )),
            CapturedError::Named { name, message } => {
                Self::from_named(config, stacktrace, &name, message.as_deref())
            }
        }
    }

    /// The stack trace is captured at the call site; causes from `source()`
    /// are attached with empty stack traces.
    pub fn from_native(
        config: Arc<Configuration>,
        stacktrace: &StackTraceBuilder,
        name: &str,
        error: &(dyn Error + 'static),
    ) -> Self {
        let mut event = Self::new(config.clone(), name, Some(error.to_string()), stacktrace.capture());
        event.previous = cause_chain(&config, error);
        event
    }

    pub fn from_raw_code(
        config: Arc<Configuration>,
        stacktrace: &StackTraceBuilder,
        code: u32,
        message: &str,
        file: &str,
        line: u32,
        backtrace: Option<&[RawFrame]>,
    ) -> Self {
        let frames = match backtrace {
            Some(raw_frames) => stacktrace.from_backtrace(raw_frames, file, line),
            None => stacktrace.from_single_location(file, line),
        };

        let mut event = Self::new(config, error_types::name(code), Some(message.to_string()), frames);
        event.severity = error_types::severity(code);
        if error_types::is_fatal(code) {
            event.unhandled = true;
            event.severity_reason = SeverityReason::UnhandledError;
        } else {
            event.severity_reason = SeverityReason::HandledError;
        }
        event
    }

    pub fn from_named(
        config: Arc<Configuration>,
        stacktrace: &StackTraceBuilder,
        name: &str,
        message: Option<&str>,
    ) -> Result<Self, NotifierError> {
        if name.trim().is_empty() {
            return Err(NotifierError::InvalidError(
                "Error name cannot be empty".to_string(),
            ));
        }
        Ok(Self::new(
            config,
            name,
            message.map(ToString::to_string),
            stacktrace.capture(),
        ))
    }

    fn new(
        config: Arc<Configuration>,
        name: &str,
        message: Option<String>,
        stacktrace: Vec<Frame>,
    ) -> Self {
        Event {
            config,
            name: name.to_string(),
            message,
            severity: Severity::Warning,
            severity_reason: SeverityReason::HandledException,
            unhandled: false,
            stacktrace,
            meta_data: Map::new(),
            user: Map::new(),
            context: None,
            grouping_hash: None,
            previous: None,
            breadcrumbs: Vec::new(),
            session: None,
        }
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn set_name(&mut self, name: &str) -> Result<(), NotifierError> {
        if name.trim().is_empty() {
            return Err(NotifierError::InvalidError(
                "Error name cannot be empty".to_string(),
            ));
        }
        self.name = name.to_string();
        Ok(())
    }

    #[must_use]
    pub fn message(&self) -> Option<&str> {
        self.message.as_deref()
    }

    pub fn set_message(&mut self, message: Option<&str>) {
        self.message = message.map(ToString::to_string);
    }

    #[must_use]
    pub fn severity(&self) -> Severity {
        self.severity
    }

    /// Sets the severity from its string form.
    pub fn set_severity(&mut self, severity: &str) -> Result<(), NotifierError> {
        self.severity = severity.parse()?;
        self.severity_reason = SeverityReason::UserSpecifiedSeverity;
        Ok(())
    }

    #[must_use]
    pub fn severity_reason(&self) -> SeverityReason {
        self.severity_reason
    }

    #[must_use]
    pub fn unhandled(&self) -> bool {
        self.unhandled
    }

    pub fn set_unhandled(&mut self, unhandled: bool) {
        self.unhandled = unhandled;
    }

    #[must_use]
    pub fn stacktrace(&self) -> &[Frame] {
        &self.stacktrace
    }

    #[must_use]
    pub fn meta_data(&self) -> &Map<String, Value> {
        &self.meta_data
    }

    /// Recursively merges `data` into the event metadata.
    pub fn set_meta_data(&mut self, data: Map<String, Value>) {
        merge_meta_data(&mut self.meta_data, data);
    }

    /// Merges `data` into the tab named `section`.
    pub fn add_meta_data_section(&mut self, section: &str, data: Map<String, Value>) {
        let mut tab = Map::new();
        tab.insert(section.to_string(), Value::Object(data));
        self.set_meta_data(tab);
    }

    pub fn clear_meta_data(&mut self) {
        self.meta_data.clear();
    }

    #[must_use]
    pub fn user(&self) -> &Map<String, Value> {
        &self.user
    }

    pub fn set_user(&mut self, user: Map<String, Value>) {
        self.user = user;
    }

    #[must_use]
    pub fn context(&self) -> Option<&str> {
        self.context.as_deref()
    }

    pub fn set_context(&mut self, context: Option<&str>) {
        self.context = context.map(ToString::to_string);
    }

    #[must_use]
    pub fn grouping_hash(&self) -> Option<&str> {
        self.grouping_hash.as_deref()
    }

    pub fn set_grouping_hash(&mut self, grouping_hash: Option<&str>) {
        self.grouping_hash = grouping_hash.map(ToString::to_string);
    }

    #[must_use]
    pub fn previous(&self) -> Option<&Event> {
        self.previous.as_deref()
    }

    pub fn set_previous(&mut self, previous: Option<Event>) {
        self.previous = previous.map(Box::new);
    }

    #[must_use]
    pub fn breadcrumbs(&self) -> &[Breadcrumb] {
        &self.breadcrumbs
    }

    pub fn set_breadcrumbs(&mut self, breadcrumbs: Vec<Breadcrumb>) {
        self.breadcrumbs = breadcrumbs;
    }

    #[must_use]
    pub fn session(&self) -> Option<&Session> {
        self.session.as_ref()
    }

    pub fn set_session(&mut self, session: Option<Session>) {
        self.session = session;
    }

    #[must_use]
    pub fn config(&self) -> &Configuration {
        &self.config
    }

    /// Serializes the event for the intake.
    ///
    /// `metaData` is filtered; `exceptions` lists the cause chain oldest first.
    pub fn to_json(&self) -> Result<Value, NotifierError> {
        let mut event = Map::new();
        event.insert("app".to_string(), self.config.app_data());
        event.insert("device".to_string(), self.config.device_data());
        event.insert("user".to_string(), Value::Object(self.user.clone()));
        event.insert("context".to_string(), serde_json::to_value(&self.context)?);
        event.insert("payloadVersion".to_string(), Value::from(EVENT_PAYLOAD_VERSION));
        event.insert("severity".to_string(), serde_json::to_value(self.severity)?);
        event.insert(
            "severityReason".to_string(),
            serde_json::json!({ "type": self.severity_reason }),
        );
        event.insert("unhandled".to_string(), Value::Bool(self.unhandled));
        event.insert("exceptions".to_string(), Value::Array(self.exceptions()?));
        if !self.breadcrumbs.is_empty() {
            event.insert("breadcrumbs".to_string(), serde_json::to_value(&self.breadcrumbs)?);
        }
        if let Some(session) = &self.session {
            event.insert("session".to_string(), serde_json::to_value(session)?);
        }
        event.insert(
            "metaData".to_string(),
            filter_value(&Value::Object(self.meta_data.clone()), &self.config.filters),
        );
        if let Some(grouping_hash) = &self.grouping_hash {
            event.insert("groupingHash".to_string(), Value::from(grouping_hash.as_str()));
        }
        Ok(Value::Object(event))
    }

    fn exceptions(&self) -> Result<Vec<Value>, NotifierError> {
        let mut chain = Vec::new();
        let mut current = Some(self);
        while let Some(event) = current {
            chain.push(event);
            current = event.previous.as_deref();
        }

        chain
            .iter()
            .rev()
            .map(|event| -> Result<Value, NotifierError> {
                Ok(serde_json::json!({
                    "errorClass": event.name,
                    "message": event.message,
                    "stacktrace": serde_json::to_value(&event.stacktrace)?,
                }))
            })
            .collect()
    }
}

/// Recursively merges `source` into `target`: nested maps are unioned,
/// anything else overwrites.
pub fn merge_meta_data(target: &mut Map<String, Value>, source: Map<String, Value>) {
    for (key, value) in source {
        match (target.get_mut(&key), value) {
            (Some(Value::Object(existing)), Value::Object(incoming)) => {
                merge_meta_data(existing, incoming);
            }
            (_, value) => {
                target.insert(key, value);
            }
        }
    }
}

/// Replaces the value of every key containing one of `filters` with
/// `[FILTERED]`, at any depth.
#[must_use]
pub fn filter_value(value: &Value, filters: &[String]) -> Value {
    match value {
        Value::Object(map) => Value::Object(
            map.iter()
                .map(|(key, value)| {
                    if filters.iter().any(|filter| key.contains(filter.as_str())) {
                        (key.clone(), Value::from(FILTERED_VALUE))
                    } else {
                        (key.clone(), filter_value(value, filters))
                    }
                })
                .collect(),
        ),
        Value::Array(items) => Value::Array(items.iter().map(|item| filter_value(item, filters)).collect()),
        other => other.clone(),
    }
}

/// Links the `source()` chain of `error` as events, newest cause first.
fn cause_chain(config: &Arc<Configuration>, error: &(dyn Error + 'static)) -> Option<Box<Event>> {
    // A field at offset 0 shares its wrapper's address, so an address alone
    // does not identify an error.
    let identity = |error: &(dyn Error + 'static)| {
        ((error as *const dyn Error).cast::<()>(), debug_name(error))
    };
    let mut seen = vec![identity(error)];
    let mut causes: Vec<(&(dyn Error + 'static), String)> = Vec::new();
    let mut current = error.source();

    while let Some(cause) = current {
        let id = identity(cause);
        if causes.len() >= MAX_CAUSE_CHAIN_DEPTH || seen.contains(&id) {
            break;
        }
        causes.push((cause, id.1.clone()));
        seen.push(id);
        current = cause.source();
    }

    causes.into_iter().rev().fold(None, |previous, (cause, name)| {
        let mut event = Event::new(config.clone(), &name, Some(cause.to_string()), Vec::new());
        event.previous = previous;
        Some(Box::new(event))
    })
}

/// `app::errors::Wrapper<alloc::string::String>` -> `Wrapper`
fn short_type_name(type_name: &str) -> &str {
    let base = type_name.split('<').next().unwrap_or(type_name);
    base.rsplit("::").next().unwrap_or(base)
}

/// Leading identifier of the `Debug` output, e.g. `ParseIntError` for
/// `ParseIntError { kind: InvalidDigit }`.
fn debug_name(error: &(dyn Error + 'static)) -> String {
    let debug = format!("{error:?}");
    let path: String = debug
        .chars()
        .take_while(|c| c.is_alphanumeric() || *c == '_' || *c == ':')
        .collect();
    match path.rsplit("::").next() {
        Some(name) if !name.is_empty() => name.to_string(),
        _ => "Error".to_string(),
    }
}
