//! Line numbering for unified diffs.

use std::collections::BTreeMap;

use serde::Serialize;

use crate::hunk::{Hunk, LineKind, content, split_hunks};

/// A hunk line tagged with its position on each side.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AnnotatedLine {
    /// Line classification.
    pub kind: LineKind,
    /// Old-side number, for removed and context lines.
    pub old: Option<u32>,
    /// New-side number, for added and context lines.
    pub new: Option<u32>,
    /// The raw line, marker included.
    pub raw: String,
}

impl AnnotatedLine {
    /// `"{old:>6} {new:>6} | {raw}"`, blank where a side is absent.
    pub fn render(&self) -> String {
        let side = |n: Option<u32>| n.map(|n| n.to_string()).unwrap_or_default();
        format!("{:>6} {:>6} | {}", side(self.old), side(self.new), self.raw)
    }
}

impl Hunk {
    /// Number every body line. Counters start at the header's starts and
    /// advance independently per side.
    ///
    /// A side whose numbering would pass `u32::MAX` stops being numbered.
    pub fn annotate(&self) -> Vec<AnnotatedLine> {
        let mut old = Some(self.old_start);
        let mut new = Some(self.new_start);
        self.lines
            .iter()
            .map(|raw| {
                let kind = LineKind::of(raw);
                let old_no = if kind.on_old_side() { advance(&mut old) } else { None };
                let new_no = if kind.on_new_side() { advance(&mut new) } else { None };
                AnnotatedLine {
                    kind,
                    old: old_no,
                    new: new_no,
                    raw: raw.clone(),
                }
            })
            .collect()
    }
}

/// Current line number, moving the counter past it.
fn advance(counter: &mut Option<u32>) -> Option<u32> {
    let current = *counter;
    *counter = current.and_then(|n| n.checked_add(1));
    current
}

/// A fully numbered patch.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ParsedPatch {
    /// The patch with a line-number gutter on every hunk body line.
    pub annotated_diff: String,
    /// Old-side line number to text (marker stripped).
    pub old_lines: BTreeMap<u32, String>,
    /// New-side line number to text (marker stripped).
    pub new_lines: BTreeMap<u32, String>,
    /// Hunks in document order.
    pub hunks: Vec<Hunk>,
}

/// Number every line of `raw` on its old and new side.
///
/// Lines before the first hunk header pass through the annotated diff
/// unchanged and are not indexed.
pub fn parse(raw: &str) -> ParsedPatch {
    let split = split_hunks(raw);
    let mut out: Vec<String> = split.preamble;
    let mut old_lines = BTreeMap::new();
    let mut new_lines = BTreeMap::new();

    for hunk in &split.hunks {
        out.push(hunk.header.clone());
        for line in hunk.annotate() {
            let text = content(&line.raw, line.kind);
            if let Some(n) = line.old {
                let _ = old_lines.insert(n, text.to_string());
            }
            if let Some(n) = line.new {
                let _ = new_lines.insert(n, text.to_string());
            }
            out.push(line.render());
        }
    }

    ParsedPatch {
        annotated_diff: out.join("\n"),
        old_lines,
        new_lines,
        hunks: split.hunks,
    }
}
