// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use crate::constants::{DEFAULT_NOTIFY_ENDPOINT, DEFAULT_SESSION_ENDPOINT, DEFAULT_TIMEOUT_SECS};
use crate::error::NotifierError;
use crate::{NOTIFIER_NAME, NOTIFIER_URL, NOTIFIER_VERSION};
use serde_json::{json, Map, Value};
use std::env;
use std::time::Duration;

/// Release stage assumed when none is configured.
pub const DEFAULT_RELEASE_STAGE: &str = "production";

/// Metadata keys filtered by default.
pub const DEFAULT_FILTERS: [&str; 6] = [
    "password",
    "cookie",
    "authorization",
    "php-auth-user",
    "php-auth-pw",
    "php-auth-digest",
];

/// Configuration shared by every notifier component.
///
/// Built once and handed to components behind an `Arc`; nothing in the crate
/// reads process-wide state after construction.
#[derive(Debug, Clone)]
pub struct Configuration {
    /// Project API key, sent with every payload
    pub api_key: String,
    /// Intake for error batches
    pub notify_endpoint: String,
    /// Intake for session batches
    pub session_endpoint: String,
    /// Release stage of the running application (e.g. production, staging)
    pub release_stage: Option<String>,
    /// When set, events are only delivered from these release stages
    pub notify_release_stages: Option<Vec<String>>,
    pub app_version: Option<String>,
    pub app_type: Option<String>,
    pub hostname: Option<String>,
    /// Metadata keys containing any of these strings are replaced by `[FILTERED]`
    pub filters: Vec<String>,
    /// Files under this prefix are marked as in-project
    pub project_root: Option<String>,
    /// Prefix removed from file paths; defaults to `project_root`
    pub strip_path: Option<String>,
    /// Attach source snippets to stack frames
    pub send_code: bool,
    /// Queue events until flush instead of sending each one immediately
    pub batch_sending: bool,
    /// Start a session when the client is created
    pub auto_capture_sessions: bool,
    /// Events with these names are dropped
    pub discard_classes: Vec<String>,
    /// Bit mask of raw error codes to report; `None` reports every code
    pub error_reporting_level: Option<u32>,
    /// Metadata merged into every event
    pub meta_data: Map<String, Value>,
    /// Frames declared in this namespace are treated as notifier internals
    pub internal_namespace: String,
    /// HTTPS proxy URL
    pub https_proxy: Option<String>,
    /// Request timeout for the HTTP transport
    pub timeout: Duration,
    /// Log level (e.g., trace, debug, info, warn, error)
    pub log_level: String,
}

impl Default for Configuration {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            notify_endpoint: DEFAULT_NOTIFY_ENDPOINT.to_string(),
            session_endpoint: DEFAULT_SESSION_ENDPOINT.to_string(),
            release_stage: None,
            notify_release_stages: None,
            app_version: None,
            app_type: None,
            hostname: None,
            filters: DEFAULT_FILTERS.iter().map(ToString::to_string).collect(),
            project_root: None,
            strip_path: None,
            send_code: true,
            batch_sending: true,
            auto_capture_sessions: false,
            discard_classes: Vec::new(),
            error_reporting_level: None,
            meta_data: Map::new(),
            internal_namespace: env!("CARGO_CRATE_NAME").to_string(),
            https_proxy: None,
            timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
            log_level: "info".to_string(),
        }
    }
}

impl Configuration {
    #[must_use]
    pub fn new(api_key: &str) -> Self {
        Self {
            api_key: api_key.to_string(),
            ..Default::default()
        }
    }

    /// Create configuration from environment variables
    pub fn from_env() -> Result<Self, NotifierError> {
        let defaults = Self::default();

        let api_key = env::var("BUGSNAG_API_KEY").unwrap_or_default();
        let notify_endpoint = env_string("BUGSNAG_ENDPOINT").unwrap_or(defaults.notify_endpoint);
        let session_endpoint =
            env_string("BUGSNAG_SESSION_ENDPOINT").unwrap_or(defaults.session_endpoint);
        let filters = env_list("BUGSNAG_FILTERS").unwrap_or(defaults.filters);
        let error_reporting_level = env::var("BUGSNAG_ERROR_REPORTING_LEVEL")
            .ok()
            .and_then(|level| level.trim().parse::<u32>().ok());
        let timeout = env::var("BUGSNAG_TIMEOUT")
            .ok()
            .and_then(|secs| secs.trim().parse::<u64>().ok())
            .map_or(defaults.timeout, Duration::from_secs);
        let https_proxy = env::var("BUGSNAG_PROXY_HTTPS")
            .or_else(|_| env::var("HTTPS_PROXY"))
            .ok();
        let log_level = env::var("BUGSNAG_LOG_LEVEL")
            .map(|val| val.trim().to_lowercase())
            .unwrap_or(defaults.log_level);

        let config = Self {
            api_key,
            notify_endpoint,
            session_endpoint,
            release_stage: env_string("BUGSNAG_RELEASE_STAGE"),
            notify_release_stages: env_list("BUGSNAG_NOTIFY_RELEASE_STAGES"),
            app_version: env_string("BUGSNAG_APP_VERSION"),
            app_type: env_string("BUGSNAG_APP_TYPE"),
            hostname: env_string("BUGSNAG_HOSTNAME"),
            filters,
            project_root: env_string("BUGSNAG_PROJECT_ROOT"),
            strip_path: env_string("BUGSNAG_STRIP_PATH"),
            send_code: env_bool("BUGSNAG_SEND_CODE", defaults.send_code),
            batch_sending: env_bool("BUGSNAG_BATCH_SENDING", defaults.batch_sending),
            auto_capture_sessions: env_bool(
                "BUGSNAG_AUTO_CAPTURE_SESSIONS",
                defaults.auto_capture_sessions,
            ),
            discard_classes: env_list("BUGSNAG_DISCARD_CLASSES").unwrap_or_default(),
            error_reporting_level,
            meta_data: Map::new(),
            internal_namespace: defaults.internal_namespace,
            https_proxy,
            timeout,
            log_level,
        };

        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), NotifierError> {
        if self.api_key.trim().is_empty() {
            return Err(NotifierError::InvalidConfig(
                "API key cannot be empty".to_string(),
            ));
        }

        for (name, endpoint) in [
            ("notify endpoint", &self.notify_endpoint),
            ("session endpoint", &self.session_endpoint),
        ] {
            let endpoint = endpoint.trim();
            if !(endpoint.starts_with("http://") || endpoint.starts_with("https://")) {
                return Err(NotifierError::InvalidConfig(format!(
                    "Invalid {name} '{endpoint}'. Must be an http or https URL"
                )));
            }
        }

        if self.timeout.is_zero() {
            return Err(NotifierError::InvalidConfig(
                "Timeout must be greater than 0".to_string(),
            ));
        }

        let valid_log_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_log_levels.contains(&self.log_level.as_str()) {
            return Err(NotifierError::InvalidConfig(format!(
                "Invalid log level '{}'. Must be one of: trace, debug, info, warn, error",
                self.log_level
            )));
        }

        Ok(())
    }

    /// Whether events from the configured release stage should be delivered.
    #[must_use]
    pub fn should_notify(&self) -> bool {
        let Some(stages) = &self.notify_release_stages else {
            return true;
        };
        let stage = self
            .release_stage
            .as_deref()
            .unwrap_or(DEFAULT_RELEASE_STAGE);
        stages.iter().any(|s| s == stage)
    }

    /// Whether a raw error code is masked out by `error_reporting_level`.
    #[must_use]
    pub fn should_ignore_error_code(&self, code: u32) -> bool {
        self.error_reporting_level
            .is_some_and(|level| level & code == 0)
    }

    /// The `notifier` section of every payload.
    #[must_use]
    pub fn notifier_data(&self) -> Value {
        json!({
            "name": NOTIFIER_NAME,
            "version": NOTIFIER_VERSION,
            "url": NOTIFIER_URL,
        })
    }

    /// The `app` section of event and session payloads.
    #[must_use]
    pub fn app_data(&self) -> Value {
        let mut app = Map::new();
        if let Some(version) = &self.app_version {
            app.insert("version".to_string(), Value::from(version.as_str()));
        }
        app.insert(
            "releaseStage".to_string(),
            Value::from(
                self.release_stage
                    .as_deref()
                    .unwrap_or(DEFAULT_RELEASE_STAGE),
            ),
        );
        if let Some(app_type) = &self.app_type {
            app.insert("type".to_string(), Value::from(app_type.as_str()));
        }
        Value::Object(app)
    }

    /// The `device` section of event and session payloads.
    #[must_use]
    pub fn device_data(&self) -> Value {
        let hostname = self
            .hostname
            .clone()
            .or_else(|| env::var("HOSTNAME").ok())
            .unwrap_or_default();
        json!({ "hostname": hostname })
    }
}

fn env_string(name: &str) -> Option<String> {
    env::var(name)
        .ok()
        .map(|val| val.trim().to_string())
        .filter(|val| !val.is_empty())
}

/// Comma separated list; blank entries are dropped.
fn env_list(name: &str) -> Option<Vec<String>> {
    env_string(name).map(|val| {
        val.split(',')
            .map(str::trim)
            .filter(|item| !item.is_empty())
            .map(ToString::to_string)
            .collect()
    })
}

fn env_bool(name: &str, default: bool) -> bool {
    env::var(name)
        .map(|val| val.trim().to_lowercase() != "false")
        .unwrap_or(default)
}
