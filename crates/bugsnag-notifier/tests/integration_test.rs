// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use bugsnag_notifier::client::Client;
use bugsnag_notifier::config::Configuration;
use bugsnag_notifier::event::CapturedError;
use bugsnag_notifier::stacktrace::StackTraceBuilder;
use mockito::{Matcher, Server};
use serde_json::{json, Map};
use std::fmt;

#[derive(Debug)]
struct PaymentDeclined;

impl fmt::Display for PaymentDeclined {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "card was declined")
    }
}

impl std::error::Error for PaymentDeclined {}

fn config(server: &Server) -> Configuration {
    Configuration {
        notify_endpoint: format!("{}/notify", server.url()),
        session_endpoint: format!("{}/sessions", server.url()),
        release_stage: Some("production".to_string()),
        app_version: Some("1.2.3".to_string()),
        send_code: false,
        ..Configuration::new("0123456789abcdef0123456789abcdef")
    }
}

#[test]
fn test_notify_and_flush() {
    let mut server = Server::new();
    let notify = server
        .mock("POST", "/notify")
        .match_header("bugsnag-api-key", "0123456789abcdef0123456789abcdef")
        .match_header("bugsnag-payload-version", "4.0")
        .match_header("bugsnag-sent-at", Matcher::Any)
        .match_header("content-type", "application/json")
        .match_body(Matcher::PartialJson(json!({
            "apiKey": "0123456789abcdef0123456789abcdef",
            "notifier": {"name": "Bugsnag Rust"},
            "events": [{
                "payloadVersion": "4.0",
                "severity": "warning",
                "severityReason": {"type": "handledException"},
                "unhandled": false,
                "app": {"releaseStage": "production", "version": "1.2.3"},
                "exceptions": [{
                    "errorClass": "PaymentDeclined",
                    "message": "card was declined",
                }],
                "breadcrumbs": [{"name": "Checkout", "type": "navigation"}],
                "metaData": {"order": {"id": 42, "password": "[FILTERED]"}},
            }],
        })))
        .with_status(200)
        .expect(1)
        .create();
    let sessions = server
        .mock("POST", "/sessions")
        .match_header("bugsnag-payload-version", "1.0")
        .match_body(Matcher::PartialJson(json!({
            "notifier": {"name": "Bugsnag Rust"},
            "app": {"releaseStage": "production", "version": "1.2.3"},
        })))
        .with_status(202)
        .expect(1)
        .create();

    let client = Client::make(config(&server)).unwrap();
    client.start_session();
    client
        .leave_breadcrumb("Checkout", "navigation", Map::new())
        .unwrap();

    let delivered = client
        .notify_with(CapturedError::native(PaymentDeclined), |event| {
            event.add_meta_data_section(
                "order",
                json!({"id": 42, "password": "hunter2"})
                    .as_object()
                    .unwrap()
                    .clone(),
            );
            true
        })
        .unwrap();
    assert!(delivered);

    client.flush();
    client.flush();

    notify.assert();
    sessions.assert();
}

#[test]
fn test_skipped_events_never_reach_the_network() {
    let mut server = Server::new();
    let notify = server.mock("POST", "/notify").expect(0).create();

    let client = Client::make(Configuration {
        notify_release_stages: Some(vec!["staging".to_string()]),
        ..config(&server)
    })
    .unwrap();
    assert!(!client
        .notify(CapturedError::named("Timeout", "took too long"))
        .unwrap());
    client.flush();

    notify.assert();
}

#[test]
fn test_rejected_batch_is_not_retried() {
    let mut server = Server::new();
    let notify = server
        .mock("POST", "/notify")
        .with_status(400)
        .with_body("bad payload")
        .expect(1)
        .create();

    let client = Client::make(config(&server)).unwrap();
    client
        .notify(CapturedError::named("Timeout", "took too long"))
        .unwrap();
    client.flush();
    client.flush();
    drop(client);

    notify.assert();
}

#[test]
fn test_captured_frames_report_call_site() {
    let builder = StackTraceBuilder::new(&Configuration {
        send_code: false,
        ..Configuration::new("0123456789abcdef0123456789abcdef")
    });
    let (frames, line) = (builder.capture(), line!());

    let top = &frames[0];
    assert!(top.file.ends_with("integration_test.rs"), "file: {}", top.file);
    assert_eq!(top.line, line);
    assert!(top
        .method
        .as_deref()
        .is_some_and(|method| method.ends_with("test_captured_frames_report_call_site")));
}
