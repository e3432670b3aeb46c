//! Numbered excerpts from a parsed patch.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::parse::ParsedPatch;

/// Returned when no indexed line falls in the requested range.
pub const NO_LINES_SENTINEL: &str = "(no lines available in range)";

/// Default lines of context either side of a range.
pub const DEFAULT_CONTEXT_LINES: u32 = 3;

/// Which side of the diff line numbers refer to.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Side {
    /// Pre-change file (`LEFT` in review APIs).
    Old,
    /// Post-change file (`RIGHT` in review APIs).
    New,
}

impl FromStr for Side {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "old" | "left" => Ok(Self::Old),
            "new" | "right" => Ok(Self::New),
            other => Err(format!("unknown side '{other}' (expected old or new)")),
        }
    }
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Old => "old",
            Self::New => "new",
        })
    }
}

impl ParsedPatch {
    /// Line index for `side`.
    pub fn index(&self, side: Side) -> &BTreeMap<u32, String> {
        match side {
            Side::Old => &self.old_lines,
            Side::New => &self.new_lines,
        }
    }
}

/// [`snippet_with_context`] with three lines of context.
pub fn snippet(patch: &ParsedPatch, side: Side, start: u32, end: u32) -> String {
    snippet_with_context(patch, side, start, end, DEFAULT_CONTEXT_LINES)
}

/// Lines `start - context ..= end + context` on `side`, as `"{n}: {text}"`.
///
/// Numbers absent from the index (lines only on the other side, or outside
/// any hunk) are skipped. A reversed range is read as if swapped.
pub fn snippet_with_context(
    patch: &ParsedPatch,
    side: Side,
    start: u32,
    end: u32,
    context_lines: u32,
) -> String {
    let (start, end) = if start <= end { (start, end) } else { (end, start) };
    let lo = start.saturating_sub(context_lines).max(1);
    let hi = end.saturating_add(context_lines);
    if lo > hi {
        return NO_LINES_SENTINEL.to_string();
    }

    let lines: Vec<String> = patch
        .index(side)
        .range(lo..=hi)
        .map(|(n, text)| format!("{n}: {text}"))
        .collect();

    if lines.is_empty() {
        NO_LINES_SENTINEL.to_string()
    } else {
        lines.join("\n")
    }
}
