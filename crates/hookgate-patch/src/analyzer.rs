use hookgate_settings::PatchSettings;

use crate::parse::{ParsedPatch, parse};
use crate::prioritize::prioritize;
use crate::snippet::{Side, snippet_with_context};

/// Patch operations bound to configured limits.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PatchAnalyzer {
    max_chars: usize,
    context_lines: u32,
}

impl Default for PatchAnalyzer {
    fn default() -> Self {
        Self::from_settings(&PatchSettings::default())
    }
}

impl PatchAnalyzer {
    /// Analyzer using `settings.max_chars` and `settings.snippet_context_lines`.
    pub fn from_settings(settings: &PatchSettings) -> Self {
        Self {
            max_chars: settings.max_chars,
            context_lines: settings.snippet_context_lines,
        }
    }

    /// Character budget for [`prepare`](Self::prepare).
    pub fn max_chars(&self) -> usize {
        self.max_chars
    }

    /// Parse `raw`.
    pub fn parse(&self, raw: &str) -> ParsedPatch {
        parse(raw)
    }

    /// Fit `raw` into the configured budget.
    pub fn prepare(&self, raw: &str) -> String {
        prioritize(raw, self.max_chars)
    }

    /// Snippet with the configured context.
    pub fn snippet(&self, patch: &ParsedPatch, side: Side, start: u32, end: u32) -> String {
        snippet_with_context(patch, side, start, end, self.context_lines)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn uses_configured_limits() {
        let analyzer = PatchAnalyzer::from_settings(&PatchSettings {
            max_chars: 10,
            snippet_context_lines: 0,
        });
        assert!(analyzer.prepare(&"z".repeat(40)).starts_with("zzzzzzzzzz\n..."));

        let parsed = analyzer.parse("@@ -1,3 +1,3 @@\n a\n-b\n+B\n c");
        assert_eq!(analyzer.snippet(&parsed, Side::New, 2, 2), "2: B");
    }

    #[test]
    fn defaults_match_settings() {
        assert_eq!(PatchAnalyzer::default().max_chars(), PatchSettings::default().max_chars);
    }
}
