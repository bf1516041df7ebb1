// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Source snippets attached to stack frames.
//!
//! A window of lines centred on the frame's line is read from disk. Near the
//! start or end of a file the window shifts so it still covers `num_lines`
//! lines whenever the file is long enough.

use crate::constants::MAX_CODE_LINE_LENGTH;
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;
use tracing::debug;

/// Line number to source text.
pub type CodeSnippet = BTreeMap<u32, String>;

/// Returns the inclusive `(start, end)` window for `line` in a file of
/// `total_lines` lines, or `None` when the window would be empty.
#[must_use]
pub fn window(line: u32, num_lines: usize, total_lines: usize) -> Option<(usize, usize)> {
    if num_lines == 0 || total_lines == 0 || line == 0 {
        return None;
    }
    let line = line as usize;
    if line > total_lines {
        return None;
    }

    let mut start = line.saturating_sub(num_lines / 2).max(1);
    let mut end = start + num_lines - 1;
    if end > total_lines {
        end = total_lines;
        start = end.saturating_sub(num_lines - 1).max(1);
    }
    Some((start, end))
}

/// Reads the snippet around `line` from `path`.
///
/// Missing or unreadable files produce `None`. Invalid UTF-8 is decoded
/// lossily.
#[must_use]
pub fn read_code(path: &Path, line: u32, num_lines: usize) -> Option<CodeSnippet> {
    let bytes = match fs::read(path) {
        Ok(bytes) => bytes,
        Err(e) => {
            debug!("Unable to read source for {}: {}", path.display(), e);
            return None;
        }
    };
    let contents = String::from_utf8_lossy(&bytes);
    let lines: Vec<&str> = contents.lines().collect();

    let (start, end) = window(line, num_lines, lines.len())?;

    let snippet = (start..=end)
        .filter_map(|number| {
            let text = lines.get(number - 1)?;
            let truncated: String = text.chars().take(MAX_CODE_LINE_LENGTH).collect();
            Some((u32::try_from(number).ok()?, truncated.trim_end().to_string()))
        })
        .collect();
    Some(snippet)
}
