// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Static lookup of raw error codes.
//!
//! Hosts that surface errors as numeric codes (runtime warnings, notices,
//! fatal errors detected at shutdown) report them through
//! [`crate::event::CapturedError::RawCode`]. The codes are bit flags so they can
//! be combined into an `error_reporting_level` mask.

use crate::event::Severity;

pub const E_ERROR: u32 = 1;
pub const E_WARNING: u32 = 2;
pub const E_PARSE: u32 = 4;
pub const E_NOTICE: u32 = 8;
pub const E_CORE_ERROR: u32 = 16;
pub const E_CORE_WARNING: u32 = 32;
pub const E_COMPILE_ERROR: u32 = 64;
pub const E_COMPILE_WARNING: u32 = 128;
pub const E_USER_ERROR: u32 = 256;
pub const E_USER_WARNING: u32 = 512;
pub const E_USER_NOTICE: u32 = 1024;
pub const E_STRICT: u32 = 2048;
pub const E_RECOVERABLE_ERROR: u32 = 4096;
pub const E_DEPRECATED: u32 = 8192;
pub const E_USER_DEPRECATED: u32 = 16384;

/// Description of one raw error code.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ErrorType {
    pub code: u32,
    pub name: &'static str,
    pub severity: Severity,
    /// Fatal errors terminate the host; they are usually only seen at shutdown.
    pub fatal: bool,
}

#[rustfmt::skip]
const ERROR_TYPES: [ErrorType; 15] = [
    ErrorType { code: E_ERROR, name: "Fatal Error", severity: Severity::Error, fatal: true },
    ErrorType { code: E_WARNING, name: "Warning", severity: Severity::Warning, fatal: false },
    ErrorType { code: E_PARSE, name: "Parse Error", severity: Severity::Error, fatal: true },
    ErrorType { code: E_NOTICE, name: "Notice", severity: Severity::Info, fatal: false },
    ErrorType { code: E_CORE_ERROR, name: "Core Error", severity: Severity::Error, fatal: true },
    ErrorType { code: E_CORE_WARNING, name: "Core Warning", severity: Severity::Warning, fatal: false },
    ErrorType { code: E_COMPILE_ERROR, name: "Compile Error", severity: Severity::Error, fatal: true },
    ErrorType { code: E_COMPILE_WARNING, name: "Compile Warning", severity: Severity::Warning, fatal: false },
    ErrorType { code: E_USER_ERROR, name: "User Error", severity: Severity::Error, fatal: true },
    ErrorType { code: E_USER_WARNING, name: "User Warning", severity: Severity::Warning, fatal: false },
    ErrorType { code: E_USER_NOTICE, name: "User Notice", severity: Severity::Info, fatal: false },
    ErrorType { code: E_STRICT, name: "Strict", severity: Severity::Info, fatal: false },
    ErrorType { code: E_RECOVERABLE_ERROR, name: "Recoverable Error", severity: Severity::Error, fatal: false },
    ErrorType { code: E_DEPRECATED, name: "Deprecated", severity: Severity::Info, fatal: false },
    ErrorType { code: E_USER_DEPRECATED, name: "User Deprecated", severity: Severity::Info, fatal: false },
];

/// Looks up a code. Unknown codes yield `None`.
#[must_use]
pub fn lookup(code: u32) -> Option<&'static ErrorType> {
    ERROR_TYPES.iter().find(|error_type| error_type.code == code)
}

/// Name for a code, `"Unknown"` when the code is not in the table.
#[must_use]
pub fn name(code: u32) -> &'static str {
    lookup(code).map_or("Unknown", |error_type| error_type.name)
}

/// Severity for a code; unknown codes are reported as errors.
#[must_use]
pub fn severity(code: u32) -> Severity {
    lookup(code).map_or(Severity::Error, |error_type| error_type.severity)
}

#[must_use]
pub fn is_fatal(code: u32) -> bool {
    lookup(code).is_some_and(|error_type| error_type.fatal)
}
