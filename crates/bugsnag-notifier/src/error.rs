// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

/// Errors returned synchronously to the caller
#[derive(Debug, thiserror::Error)]
pub enum NotifierError {
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Invalid breadcrumb name: {0}")]
    InvalidBreadcrumbName(String),

    #[error("Invalid breadcrumb type '{0}'")]
    InvalidBreadcrumbType(String),

    #[error("Invalid severity '{0}'. Must be one of: error, warning, info")]
    InvalidSeverity(String),

    #[error("Invalid error: {0}")]
    InvalidError(String),

    #[error("Failed to serialize payload: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Outcome of a failed delivery attempt. Never surfaced to the application.
#[derive(Debug, thiserror::Error)]
pub enum DeliveryError {
    /// The request could not be built or sent.
    #[error("Transport error: {0}")]
    Transport(String),

    /// The intake answered with a non-success status code.
    #[error("{0}: Intake rejected payload: {1}")]
    Status(u16, String),
}

impl DeliveryError {
    /// 4xx responses will fail again if retried.
    #[must_use]
    pub fn is_permanent(&self) -> bool {
        match self {
            DeliveryError::Transport(_) => false,
            DeliveryError::Status(code, _) => (400..500).contains(code),
        }
    }
}
