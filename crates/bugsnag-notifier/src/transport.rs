// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! HTTP delivery of payloads.
//!
//! The notifier only needs one capability from the network:
//! `deliver(uri, payload, headers)`. [`Transport`] is that seam; the default
//! [`HttpTransport`] is a blocking `reqwest` client, and tests substitute
//! recording implementations.
//!
//! There are no retries here. Error batches are delivered at most once and
//! session counts are re-queued by their owner.

use crate::config::Configuration;
use crate::error::DeliveryError;
use chrono::{SecondsFormat, Utc};
use core::time::Duration;
use reqwest::blocking::Client;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue, CONTENT_TYPE};
use tracing::{debug, error};

// `HeaderName::from_static` only accepts lowercase; on the wire these are
// Bugsnag-Api-Key, Bugsnag-Sent-At and Bugsnag-Payload-Version.
pub const API_KEY_HEADER: HeaderName = HeaderName::from_static("bugsnag-api-key");
pub const SENT_AT_HEADER: HeaderName = HeaderName::from_static("bugsnag-sent-at");
pub const PAYLOAD_VERSION_HEADER: HeaderName = HeaderName::from_static("bugsnag-payload-version");

/// Delivers one serialized payload.
pub trait Transport: Send + Sync {
    fn deliver(&self, uri: &str, payload: Vec<u8>, headers: HeaderMap) -> Result<(), DeliveryError>;
}

/// Headers sent with every payload.
pub fn build_headers(api_key: &str, payload_version: &str) -> Result<HeaderMap, DeliveryError> {
    let sent_at = Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true);

    let mut headers = HeaderMap::new();
    for (name, value) in [
        (API_KEY_HEADER, api_key),
        (SENT_AT_HEADER, sent_at.as_str()),
        (PAYLOAD_VERSION_HEADER, payload_version),
    ] {
        let value = HeaderValue::from_str(value)
            .map_err(|e| DeliveryError::Transport(format!("Invalid {name} header: {e}")))?;
        headers.insert(name, value);
    }
    headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
    Ok(headers)
}

/// Blocking HTTP transport.
///
/// Must not be created or used from inside an async runtime; `reqwest`'s
/// blocking client runs its own.
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: Client,
}

impl HttpTransport {
    #[must_use]
    pub fn new(config: &Configuration) -> Self {
        HttpTransport {
            client: get_client(config),
        }
    }
}

impl Transport for HttpTransport {
    fn deliver(&self, uri: &str, payload: Vec<u8>, headers: HeaderMap) -> Result<(), DeliveryError> {
        let response = self
            .client
            .post(uri)
            .headers(headers)
            .body(payload)
            .send()
            .map_err(|e| DeliveryError::Transport(e.to_string()))?;

        let status = response.status();
        if status.is_success() {
            debug!("Delivered payload to {}: {}", uri, status);
            return Ok(());
        }

        let body = response.text().unwrap_or_default();
        Err(DeliveryError::Status(status.as_u16(), body))
    }
}

/// Builds the HTTP client, falling back to a direct connection when the proxy
/// configuration is unusable.
#[must_use]
pub fn get_client(config: &Configuration) -> Client {
    match build_client(config, true) {
        Ok(client) => client,
        Err(e) => {
            error!(
                "Unable to parse proxy configuration: {}, falling back to direct connection",
                e
            );
            match build_client(config, false) {
                Ok(client) => client,
                Err(inner) => {
                    error!(
                        "Failed to build HTTP client without proxy: {}, using reqwest defaults",
                        inner
                    );
                    Client::new()
                }
            }
        }
    }
}

fn build_client(config: &Configuration, allow_proxy: bool) -> Result<Client, reqwest::Error> {
    let mut builder = Client::builder()
        .timeout(config.timeout)
        .pool_idle_timeout(Some(Duration::from_secs(270)))
        .tcp_keepalive(Some(Duration::from_secs(120)));

    if allow_proxy {
        if let Some(https_uri) = &config.https_proxy {
            builder = builder.proxy(reqwest::Proxy::https(https_uri.as_str())?);
        }
    }

    builder.build()
}
