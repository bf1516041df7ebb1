// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use crate::constants::MAX_BREADCRUMB_NAME_LENGTH;
use crate::error::NotifierError;
use chrono::{DateTime, SecondsFormat, Utc};
use serde::Serialize;
use serde_json::{Map, Value};
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum BreadcrumbType {
    Navigation,
    Request,
    Process,
    Log,
    User,
    State,
    Error,
    Manual,
}

impl BreadcrumbType {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            BreadcrumbType::Navigation => "navigation",
            BreadcrumbType::Request => "request",
            BreadcrumbType::Process => "process",
            BreadcrumbType::Log => "log",
            BreadcrumbType::User => "user",
            BreadcrumbType::State => "state",
            BreadcrumbType::Error => "error",
            BreadcrumbType::Manual => "manual",
        }
    }
}

impl fmt::Display for BreadcrumbType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for BreadcrumbType {
    type Err = NotifierError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "navigation" => Ok(BreadcrumbType::Navigation),
            "request" => Ok(BreadcrumbType::Request),
            "process" => Ok(BreadcrumbType::Process),
            "log" => Ok(BreadcrumbType::Log),
            "user" => Ok(BreadcrumbType::User),
            "state" => Ok(BreadcrumbType::State),
            "error" => Ok(BreadcrumbType::Error),
            "manual" => Ok(BreadcrumbType::Manual),
            other => Err(NotifierError::InvalidBreadcrumbType(other.to_string())),
        }
    }
}

/// A timestamped record of something that happened before an error.
///
/// Name and type are validated on construction, so a `Breadcrumb` value is
/// always valid.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Breadcrumb {
    timestamp: String,
    name: String,
    #[serde(rename = "type")]
    breadcrumb_type: BreadcrumbType,
    #[serde(skip_serializing_if = "Map::is_empty")]
    meta_data: Map<String, Value>,
}

impl Breadcrumb {
    /// Creates a breadcrumb from the string form of its type.
    pub fn new(
        name: &str,
        breadcrumb_type: &str,
        meta_data: Map<String, Value>,
    ) -> Result<Self, NotifierError> {
        Self::with_type(name, breadcrumb_type.parse()?, meta_data)
    }

    pub fn with_type(
        name: &str,
        breadcrumb_type: BreadcrumbType,
        meta_data: Map<String, Value>,
    ) -> Result<Self, NotifierError> {
        Self::at(Utc::now(), name, breadcrumb_type, meta_data)
    }

    /// Creates a breadcrumb with an explicit timestamp.
    pub fn at(
        timestamp: DateTime<Utc>,
        name: &str,
        breadcrumb_type: BreadcrumbType,
        meta_data: Map<String, Value>,
    ) -> Result<Self, NotifierError> {
        let length = name.chars().count();
        if length == 0 {
            return Err(NotifierError::InvalidBreadcrumbName(
                "name cannot be empty".to_string(),
            ));
        }
        if length > MAX_BREADCRUMB_NAME_LENGTH {
            return Err(NotifierError::InvalidBreadcrumbName(format!(
                "name must be at most {MAX_BREADCRUMB_NAME_LENGTH} characters, got {length}"
            )));
        }

        Ok(Breadcrumb {
            timestamp: timestamp.to_rfc3339_opts(SecondsFormat::Millis, true),
            name: name.to_string(),
            breadcrumb_type,
            meta_data,
        })
    }

    #[must_use]
    pub fn timestamp(&self) -> &str {
        &self.timestamp
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub fn breadcrumb_type(&self) -> BreadcrumbType {
        self.breadcrumb_type
    }

    #[must_use]
    pub fn meta_data(&self) -> &Map<String, Value> {
        &self.meta_data
    }

    pub(crate) fn drop_meta_data(&mut self) {
        self.meta_data.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use serde_json::json;

    #[test]
    fn test_valid_breadcrumb() {
        let breadcrumb = Breadcrumb::new("Clicked button", "user", Map::new()).unwrap();
        assert_eq!(breadcrumb.name(), "Clicked button");
        assert_eq!(breadcrumb.breadcrumb_type(), BreadcrumbType::User);
    }

    #[test]
    fn test_name_length_bounds() {
        assert!(matches!(
            Breadcrumb::new("", "log", Map::new()),
            Err(NotifierError::InvalidBreadcrumbName(_))
        ));
        assert!(Breadcrumb::new(&"a".repeat(30), "log", Map::new()).is_ok());
        assert!(matches!(
            Breadcrumb::new(&"a".repeat(31), "log", Map::new()),
            Err(NotifierError::InvalidBreadcrumbName(_))
        ));
        // characters, not bytes
        assert!(Breadcrumb::new(&"é".repeat(30), "log", Map::new()).is_ok());
    }

    #[test]
    fn test_invalid_type() {
        let result = Breadcrumb::new("Clicked", "click", Map::new());
        assert!(matches!(
            result,
            Err(NotifierError::InvalidBreadcrumbType(t)) if t == "click"
        ));
    }

    #[test]
    fn test_serialization() {
        let timestamp = Utc.with_ymd_and_hms(2024, 3, 1, 12, 30, 5).unwrap();
        let mut meta = Map::new();
        meta.insert("path".to_string(), json!("/checkout"));
        let breadcrumb = Breadcrumb::at(timestamp, "GET /checkout", BreadcrumbType::Request, meta).unwrap();

        assert_eq!(
            serde_json::to_value(&breadcrumb).unwrap(),
            json!({
                "timestamp": "2024-03-01T12:30:05.000Z",
                "name": "GET /checkout",
                "type": "request",
                "metaData": {"path": "/checkout"},
            })
        );

        let bare = Breadcrumb::at(timestamp, "Started", BreadcrumbType::Process, Map::new()).unwrap();
        assert!(serde_json::to_value(&bare).unwrap().get("metaData").is_none());
    }
}
