// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Stack trace normalization.
//!
//! Converts a raw backtrace into the frames sent to the intake. Raw frames
//! follow the "call site" convention: the `file`/`line` of raw frame `i` is the
//! place where frame `i` was *called*, which lies inside the code of frame
//! `i + 1`. The builder therefore tracks the current location and emits each
//! frame with the location carried forward from the previous one:
//!
//! ```text
//!   raw[0] { function: read, at: service.rs:40 }     -> read      @ top_file:top_line
//!   raw[1] { function: handle, at: main.rs:12 }      -> handle    @ service.rs:40
//!                                                    -> [main]    @ main.rs:12
//! ```
//!
//! Frames declared inside the notifier itself are not emitted, but they still
//! move the tracked location so the next emitted frame points at user code.

use crate::code::{self, CodeSnippet};
use crate::config::Configuration;
use crate::constants::DEFAULT_CONTEXT_LINES;
use regex::Regex;
use serde::Serialize;
use std::backtrace::Backtrace;
use std::path::Path;
use std::sync::OnceLock;
use tracing::debug;

/// File reported when a frame has no location (e.g. inside a built-in call).
pub const INTERNAL_FILE: &str = "[internal]";

/// Method label of the synthetic entry-point frame.
pub const MAIN_METHOD: &str = "[main]";

/// One entry of a raw backtrace, as handed over by the host.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RawFrame {
    pub file: Option<String>,
    pub line: Option<u32>,
    pub function: Option<String>,
    pub class: Option<String>,
}

impl RawFrame {
    #[must_use]
    pub fn new(file: &str, line: u32, function: &str) -> Self {
        Self {
            file: Some(file.to_string()),
            line: Some(line),
            function: Some(function.to_string()),
            class: None,
        }
    }

    #[must_use]
    pub fn with_class(mut self, class: &str) -> Self {
        self.class = Some(class.to_string());
        self
    }
}

/// A normalized stack frame.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Frame {
    pub file: String,
    #[serde(rename = "lineNumber")]
    pub line: u32,
    /// `Class::function` when the declaring class is known
    pub method: Option<String>,
    #[serde(skip)]
    pub class: Option<String>,
    pub in_project: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code: Option<CodeSnippet>,
}

/// Builds normalized stack traces according to the notifier configuration.
#[derive(Debug, Clone)]
pub struct StackTraceBuilder {
    /// Removed from the front of file paths
    strip_pattern: Option<Regex>,
    /// Matching files are in-project
    project_pattern: Option<Regex>,
    internal_namespace: String,
    send_code: bool,
    context_lines: usize,
}

impl StackTraceBuilder {
    #[must_use]
    pub fn new(config: &Configuration) -> Self {
        let project_pattern = config.project_root.as_deref().and_then(prefix_pattern);
        let strip_pattern = config
            .strip_path
            .as_deref()
            .or(config.project_root.as_deref())
            .and_then(prefix_pattern);

        StackTraceBuilder {
            strip_pattern,
            project_pattern,
            internal_namespace: config.internal_namespace.clone(),
            send_code: config.send_code,
            context_lines: DEFAULT_CONTEXT_LINES,
        }
    }

    #[must_use]
    pub fn with_context_lines(mut self, context_lines: usize) -> Self {
        self.context_lines = context_lines;
        self
    }

    /// Normalizes a raw backtrace whose innermost location is
    /// `top_file:top_line`.
    ///
    /// Returns one frame per non-internal raw frame plus the synthetic
    /// `[main]` frame.
    #[must_use]
    pub fn from_backtrace(&self, raw_frames: &[RawFrame], top_file: &str, top_line: u32) -> Vec<Frame> {
        let mut frames = Vec::with_capacity(raw_frames.len() + 1);
        let mut file = top_file.to_string();
        let mut line = top_line;

        for raw in raw_frames {
            if !self.is_internal(raw.class.as_deref()) {
                frames.push(self.frame(&file, line, raw.function.as_deref(), raw.class.as_deref()));
            }

            match (&raw.file, raw.line) {
                (Some(raw_file), Some(raw_line)) => {
                    file.clone_from(raw_file);
                    line = raw_line;
                }
                _ => {
                    file = INTERNAL_FILE.to_string();
                    line = 0;
                }
            }
        }

        frames.push(self.frame(&file, line, Some(MAIN_METHOD), None));
        frames
    }

    /// Single frame trace for errors that carry no backtrace, such as fatal
    /// errors only detected when the host shuts down.
    #[must_use]
    pub fn from_single_location(&self, file: &str, line: u32) -> Vec<Frame> {
        vec![self.frame(file, line, Some(MAIN_METHOD), None)]
    }

    /// Captures the stack of the calling thread.
    #[must_use]
    pub fn capture(&self) -> Vec<Frame> {
        let backtrace = Backtrace::force_capture();
        let resolved = parse_backtrace(&backtrace.to_string());
        let (raw_frames, top_file, top_line) = to_call_sites(&resolved);
        self.from_backtrace(&raw_frames, &top_file, top_line)
    }

    fn frame(&self, file: &str, line: u32, function: Option<&str>, class: Option<&str>) -> Frame {
        let (file, line) = rewrite_generated_location(file, line);

        let method = match (class, function) {
            (Some(class), Some(function)) => Some(format!("{class}::{function}")),
            (None, Some(function)) => Some(function.to_string()),
            (Some(class), None) => Some(class.to_string()),
            (None, None) => None,
        };

        let code = if self.send_code && file != INTERNAL_FILE {
            code::read_code(Path::new(&file), line, self.context_lines)
        } else {
            None
        };

        let in_project = self
            .project_pattern
            .as_ref()
            .is_some_and(|pattern| pattern.is_match(&file));

        let file = match &self.strip_pattern {
            Some(pattern) => pattern.replace(&file, "").into_owned(),
            None => file,
        };

        Frame {
            file,
            line,
            method,
            class: class.map(ToString::to_string),
            in_project,
            code,
        }
    }

    /// Whether a declaring class lives in the notifier's own namespace.
    fn is_internal(&self, class: Option<&str>) -> bool {
        let Some(class) = class else {
            return false;
        };
        let class = class.trim_start_matches('<');
        class
            .split("::")
            .next()
            .is_some_and(|root| root == self.internal_namespace)
    }
}

/// `^<prefix>[\/]?`, case-insensitive.
fn prefix_pattern(prefix: &str) -> Option<Regex> {
    let prefix = prefix.trim_end_matches(['/', '\\']);
    if prefix.is_empty() {
        return None;
    }
    match Regex::new(&format!(r"(?i)^{}[\\/]?", regex::escape(prefix))) {
        Ok(pattern) => Some(pattern),
        Err(e) => {
            debug!("Ignoring path prefix '{}': {}", prefix, e);
            None
        }
    }
}

/// `path(12) : eval()'d code` and `path(12) : runtime-created function`
/// describe generated code; report the location that generated it.
fn rewrite_generated_location(file: &str, line: u32) -> (String, u32) {
    static GENERATED: OnceLock<Option<Regex>> = OnceLock::new();
    let pattern = GENERATED.get_or_init(|| {
        Regex::new(r"^(.*?)\(([0-9]+)\) : (?:eval\(\)'d code|runtime-created function)$").ok()
    });

    if let Some(captures) = pattern.as_ref().and_then(|p| p.captures(file)) {
        if let Ok(generated_line) = captures[2].parse::<u32>() {
            return (captures[1].to_string(), generated_line);
        }
    }
    (file.to_string(), line)
}

/// A frame as printed by `std::backtrace::Backtrace`: the symbol and the
/// location inside that symbol.
#[derive(Debug, Clone, PartialEq, Eq)]
struct ResolvedFrame {
    symbol: Option<String>,
    file: Option<String>,
    line: Option<u32>,
}

/// Parses the `Display` output of a captured `Backtrace`, dropping the frames
/// of the capture machinery.
fn parse_backtrace(text: &str) -> Vec<ResolvedFrame> {
    static PATTERNS: OnceLock<Option<(Regex, Regex, Regex)>> = OnceLock::new();
    let Some((symbol_line, location_line, hash_suffix)) = PATTERNS
        .get_or_init(|| {
            Some((
                Regex::new(r"^\s*[0-9]+: (.+)$").ok()?,
                Regex::new(r"^\s*at (.+?):([0-9]+)(?::[0-9]+)?$").ok()?,
                Regex::new(r"::h[0-9a-f]{16}$").ok()?,
            ))
        })
        .as_ref()
    else {
        return Vec::new();
    };

    let mut frames: Vec<ResolvedFrame> = Vec::new();
    for text_line in text.lines() {
        if let Some(captures) = symbol_line.captures(text_line) {
            let symbol = hash_suffix.replace(captures[1].trim(), "").into_owned();
            frames.push(ResolvedFrame {
                symbol: (symbol != "<unknown>").then_some(symbol),
                file: None,
                line: None,
            });
        } else if let Some(captures) = location_line.captures(text_line) {
            // Inlined frames repeat "at" lines; the first one belongs to the symbol.
            if let Some(frame) = frames.last_mut().filter(|frame| frame.file.is_none()) {
                frame.file = Some(captures[1].to_string());
                frame.line = captures[2].parse().ok();
            }
        }
    }

    let capture_frames = frames
        .iter()
        .take_while(|frame| {
            frame.symbol.as_deref().is_some_and(|symbol| {
                symbol.starts_with("std::backtrace") || symbol.starts_with("backtrace::")
            })
        })
        .count();
    frames.split_off(capture_frames)
}

/// Converts resolved frames into the call-site convention used by
/// [`StackTraceBuilder::from_backtrace`].
///
/// The outermost frame's symbol is replaced by the `[main]` label.
fn to_call_sites(resolved: &[ResolvedFrame]) -> (Vec<RawFrame>, String, u32) {
    let location = |frame: &ResolvedFrame| match (&frame.file, frame.line) {
        (Some(file), Some(line)) => (Some(file.clone()), Some(line)),
        _ => (None, None),
    };

    let (top_file, top_line) = match resolved.first().map(location) {
        Some((Some(file), Some(line))) => (file, line),
        _ => (INTERNAL_FILE.to_string(), 0),
    };

    let raw_frames = resolved
        .windows(2)
        .map(|pair| {
            let (class, function) = split_symbol(pair[0].symbol.as_deref());
            let (file, line) = location(&pair[1]);
            RawFrame {
                file,
                line,
                function,
                class,
            }
        })
        .collect();

    (raw_frames, top_file, top_line)
}

/// `a::b::C::method` -> (`a::b::C`, `method`)
fn split_symbol(symbol: Option<&str>) -> (Option<String>, Option<String>) {
    match symbol {
        Some(symbol) => match symbol.rsplit_once("::") {
            Some((class, function)) => (Some(class.to_string()), Some(function.to_string())),
            None => (None, Some(symbol.to_string())),
        },
        None => (None, None),
    }
}
