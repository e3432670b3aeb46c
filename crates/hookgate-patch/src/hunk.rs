//! Hunk splitting and per-hunk scoring.

use std::sync::LazyLock;

use regex::Regex;
use serde::Serialize;

static HUNK_HEADER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^@@ -(\d+)(?:,(\d+))? \+(\d+)(?:,(\d+))? @@").expect("valid hunk header pattern")
});

/// Keywords whose presence in a changed line marks it as risky: auth and
/// secrets, concurrency, error handling, unsafe execution.
static RISK_KEYWORDS: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)\b(auth\w*|login|password|passwd|secret\w*|token\w*|credential\w*|api[_-]?key|private[_-]?key|crypt\w*|hash\w*|session|cookie|jwt|oauth|permission\w*|sudo|exec\w*|eval|unsafe|mutex|lock\w*|race|atomic\w*|thread\w*|spawn\w*|concurren\w*|deadlock|semaphore|panic\w*|unwrap|expect|catch|throw\w*|error\w*|err|exception\w*|retry|timeout|sql|query|inject\w*|sanitiz\w*|escape\w*)\b",
    )
    .expect("valid risk keyword pattern")
});

const ADDED_RISK_BONUS: u32 = 4;
const REMOVED_RISK_BONUS: u32 = 2;

/// Classification of one line inside a hunk.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum LineKind {
    /// `+` line: new side only.
    Added,
    /// `-` line: old side only.
    Removed,
    /// Unchanged line: both sides.
    Context,
    /// `\ No newline at end of file`: neither side.
    NoNewline,
}

impl LineKind {
    /// Classify a raw hunk line by its first character.
    pub fn of(line: &str) -> Self {
        match line.as_bytes().first() {
            Some(b'+') => Self::Added,
            Some(b'-') => Self::Removed,
            Some(b'\\') => Self::NoNewline,
            _ => Self::Context,
        }
    }

    /// Whether the line occupies a number on the old side.
    pub fn on_old_side(self) -> bool {
        matches!(self, Self::Removed | Self::Context)
    }

    /// Whether the line occupies a number on the new side.
    pub fn on_new_side(self) -> bool {
        matches!(self, Self::Added | Self::Context)
    }
}

/// Line text without its diff marker.
pub fn content(line: &str, kind: LineKind) -> &str {
    match kind {
        LineKind::Added | LineKind::Removed | LineKind::NoNewline => line.get(1..).unwrap_or(""),
        LineKind::Context => line.strip_prefix(' ').unwrap_or(line),
    }
}

/// One `@@ ... @@` block.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Hunk {
    /// The header line verbatim, including any trailing section text.
    pub header: String,
    /// First old-side line number.
    pub old_start: u32,
    /// First new-side line number.
    pub new_start: u32,
    /// Body lines verbatim, in order.
    pub lines: Vec<String>,
}

impl Hunk {
    /// Parse `line` as a hunk header, yielding an empty hunk.
    pub fn from_header(line: &str) -> Option<Self> {
        let caps = HUNK_HEADER.captures(line)?;
        Some(Self {
            header: line.to_string(),
            old_start: caps.get(1)?.as_str().parse().ok()?,
            new_start: caps.get(3)?.as_str().parse().ok()?,
            lines: Vec::new(),
        })
    }

    /// Review priority: +1 for the header, +1 per changed line, plus a bonus
    /// for changed lines that mention a risk keyword.
    pub fn risk_score(&self) -> u32 {
        let body: u32 = self
            .lines
            .iter()
            .map(|line| {
                let kind = LineKind::of(line);
                let bonus = match kind {
                    LineKind::Added => ADDED_RISK_BONUS,
                    LineKind::Removed => REMOVED_RISK_BONUS,
                    LineKind::Context | LineKind::NoNewline => return 0,
                };
                if RISK_KEYWORDS.is_match(content(line, kind)) {
                    1 + bonus
                } else {
                    1
                }
            })
            .sum();
        1 + body
    }

    /// Header and body, newline-joined.
    pub fn render(&self) -> String {
        let mut out = self.header.clone();
        for line in &self.lines {
            out.push('\n');
            out.push_str(line);
        }
        out
    }
}

/// A patch cut at hunk boundaries.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SplitPatch {
    /// Lines before the first hunk header (file headers and the like).
    pub preamble: Vec<String>,
    /// Hunks in document order.
    pub hunks: Vec<Hunk>,
}

/// Cut `raw` into a preamble and hunks.
pub fn split_hunks(raw: &str) -> SplitPatch {
    let mut split = SplitPatch::default();
    for line in raw.lines() {
        if line.starts_with("@@") {
            if let Some(hunk) = Hunk::from_header(line) {
                split.hunks.push(hunk);
                continue;
            }
        }
        match split.hunks.last_mut() {
            Some(hunk) => hunk.lines.push(line.to_string()),
            None => split.preamble.push(line.to_string()),
        }
    }
    split
}
