// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

#![cfg_attr(not(test), deny(clippy::panic))]
#![cfg_attr(not(test), deny(clippy::unwrap_used))]
#![cfg_attr(not(test), deny(clippy::expect_used))]
#![cfg_attr(not(test), deny(clippy::todo))]
#![cfg_attr(not(test), deny(clippy::unimplemented))]

//! Sends one named error and one session using configuration from the
//! `BUGSNAG_*` environment variables.

use clap::Parser;
use std::process::ExitCode;
use tracing::{debug, error, info};
use tracing_subscriber::EnvFilter;

use bugsnag_notifier::{
    client::Client, config::Configuration, event::CapturedError, logger::Formatter,
};

#[derive(Debug, Parser)]
#[command(name = "bugsnag-notify")]
#[command(about = "Send a named error and a session to a Bugsnag-compatible intake", long_about = None)]
#[command(version)]
struct Cli {
    /// Error class reported for the event
    name: String,

    /// Error message
    message: Option<String>,
}

pub fn main() -> ExitCode {
    let cli = Cli::parse();

    let config = match Configuration::from_env() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("{e}");
            return ExitCode::FAILURE;
        }
    };

    let env_filter = format!("h2=off,hyper=off,rustls=off,{}", config.log_level);
    let filter = match EnvFilter::try_new(env_filter) {
        Ok(filter) => filter,
        Err(e) => {
            eprintln!("could not parse log level in configuration: {e}");
            return ExitCode::FAILURE;
        }
    };
    let subscriber = tracing_subscriber::fmt::Subscriber::builder()
        .with_env_filter(filter)
        .event_format(Formatter)
        .finish();
    if let Err(e) = tracing::subscriber::set_global_default(subscriber) {
        eprintln!("setting default subscriber failed: {e}");
        return ExitCode::FAILURE;
    }
    debug!("Logging subsystem enabled");

    let Cli { name, message } = cli;
    let message = message.unwrap_or_default();

    let client = match Client::make(config) {
        Ok(client) => client,
        Err(e) => {
            error!("Unable to create notifier: {}", e);
            return ExitCode::FAILURE;
        }
    };

    client.start_session();
    match client.notify(CapturedError::named(&name, &message)) {
        Ok(true) => info!("Queued '{}'", name),
        Ok(false) => info!("'{}' was filtered out, nothing to send", name),
        Err(e) => {
            error!("Unable to notify '{}': {}", name, e);
            return ExitCode::FAILURE;
        }
    }
    client.flush();

    ExitCode::SUCCESS
}
