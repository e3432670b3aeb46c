//! Fitting oversized patches into a character budget.

use metrics::counter;
use tracing::debug;

use crate::hunk::split_hunks;

fn char_len(s: &str) -> usize {
    s.chars().count()
}

/// Shrink `raw` to roughly `max_chars` characters, keeping the riskiest hunks.
///
/// A patch that already fits is returned unchanged. Otherwise hunks are taken
/// in descending [`risk_score`](crate::Hunk::risk_score) order (earlier hunk
/// wins a tie) until the next one would overflow the budget; the first pick is
/// always kept even if it alone overflows. Survivors are emitted in their
/// original order, followed by a truncation marker. A patch with no hunk
/// headers is cut at `max_chars` characters instead.
pub fn prioritize(raw: &str, max_chars: usize) -> String {
    if char_len(raw) <= max_chars {
        return raw.to_string();
    }

    let split = split_hunks(raw);
    if split.hunks.is_empty() {
        let mut out: String = raw.chars().take(max_chars).collect();
        out.push_str(&format!("\n... [diff truncated at {max_chars} chars]"));
        return out;
    }

    let rendered: Vec<String> = split.hunks.iter().map(crate::Hunk::render).collect();
    let scores: Vec<u32> = split.hunks.iter().map(crate::Hunk::risk_score).collect();

    let mut ranking: Vec<usize> = (0..split.hunks.len()).collect();
    ranking.sort_by(|&a, &b| scores[b].cmp(&scores[a]).then(a.cmp(&b)));

    let preamble = split.preamble.join("\n");
    let mut used = if split.preamble.is_empty() {
        0
    } else {
        char_len(&preamble) + 1
    };
    let mut keep = vec![false; rendered.len()];
    let mut kept = 0usize;
    for idx in ranking {
        let cost = char_len(&rendered[idx]) + 1;
        if kept > 0 && used + cost > max_chars {
            break;
        }
        keep[idx] = true;
        kept += 1;
        used += cost;
    }

    let mut parts: Vec<&str> = Vec::with_capacity(kept + 1);
    if !split.preamble.is_empty() {
        parts.push(&preamble);
    }
    parts.extend(
        rendered
            .iter()
            .zip(&keep)
            .filter(|(_, keep)| **keep)
            .map(|(text, _)| text.as_str()),
    );
    let mut out = parts.join("\n");

    let total = rendered.len();
    let dropped = total - kept;
    if dropped > 0 {
        debug!(total, dropped, max_chars, "patch over budget, dropped low-priority hunks");
        counter!("patch_hunks_dropped_total").increment(dropped as u64);
        out.push_str(&format!(
            "\n... [diff truncated: {dropped} of {total} hunks omitted]"
        ));
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn plain_hunk(start: u32, tag: &str) -> String {
        format!("@@ -{start},1 +{start},1 @@\n-old {tag}\n+new {tag}")
    }

    fn risky_hunk(start: u32, tag: &str) -> String {
        format!("@@ -{start},1 +{start},1 @@\n-old {tag}\n+check password {tag}")
    }

    #[test]
    fn fitting_patch_is_unchanged() {
        let raw = format!("{}\n{}", plain_hunk(1, "a"), plain_hunk(10, "b"));
        assert_eq!(prioritize(&raw, raw.len()), raw);
        assert_eq!(prioritize(&raw, 10_000), raw);
    }

    #[test]
    fn keeps_highest_scoring_in_document_order() {
        let hunks = [
            plain_hunk(1, "a"),
            risky_hunk(10, "b"),
            plain_hunk(20, "c"),
            risky_hunk(30, "d"),
            risky_hunk(40, "e"),
        ];
        let raw = hunks.join("\n");
        let budget: usize = [&hunks[1], &hunks[3], &hunks[4]]
            .iter()
            .map(|h| h.chars().count() + 1)
            .sum();

        let out = prioritize(&raw, budget);
        let expected = format!(
            "{}\n{}\n{}\n... [diff truncated: 2 of 5 hunks omitted]",
            hunks[1], hunks[3], hunks[4]
        );
        assert_eq!(out, expected);
    }

    #[test]
    fn ties_prefer_earlier_hunks() {
        let hunks = [plain_hunk(1, "a"), plain_hunk(10, "b"), plain_hunk(20, "c")];
        let raw = hunks.join("\n");
        let budget = hunks[0].chars().count() + 1 + hunks[1].chars().count() + 1;
        let out = prioritize(&raw, budget);
        assert!(out.starts_with(&format!("{}\n{}\n", hunks[0], hunks[1])));
        assert!(out.ends_with("[diff truncated: 1 of 3 hunks omitted]"));
    }

    #[test]
    fn first_pick_kept_even_when_over_budget() {
        let big = format!(
            "@@ -1,1 +1,1 @@\n-x\n+{}",
            "secret ".repeat(50)
        );
        let raw = format!("{big}\n{}", plain_hunk(100, "z"));
        let out = prioritize(&raw, 20);
        assert!(out.starts_with(&big));
        assert!(out.ends_with("[diff truncated: 1 of 2 hunks omitted]"));
    }

    #[test]
    fn selection_stops_at_first_overflow() {
        let small_risky = risky_hunk(1, "a");
        let large = format!("@@ -5,1 +5,1 @@\n-{}\n+{}\n+token", "x".repeat(200), "y".repeat(200));
        let small_plain = plain_hunk(50, "c");
        let raw = format!("{small_risky}\n{large}\n{small_plain}");
        // large scores highest, then small_risky; large alone overflows but is the first pick
        let out = prioritize(&raw, 100);
        assert!(out.contains(&large));
        assert!(!out.contains("new c"));
        assert!(out.ends_with("[diff truncated: 2 of 3 hunks omitted]"));
    }

    #[test]
    fn preamble_is_counted_and_kept() {
        let hunks = [plain_hunk(1, "a"), plain_hunk(10, "b")];
        let raw = format!("--- a/f\n+++ b/f\n{}", hunks.join("\n"));
        let budget = "--- a/f\n+++ b/f".len() + 1 + hunks[0].len() + 1;
        let out = prioritize(&raw, budget);
        assert!(out.starts_with("--- a/f\n+++ b/f\n@@ -1,1"));
        assert!(out.ends_with("[diff truncated: 1 of 2 hunks omitted]"));
    }

    #[test]
    fn hunkless_input_is_hard_truncated() {
        let raw = "x".repeat(50);
        assert_eq!(
            prioritize(&raw, 10),
            format!("{}\n... [diff truncated at 10 chars]", "x".repeat(10))
        );
    }

    #[test]
    fn budget_counts_characters_not_bytes() {
        let raw = "é".repeat(8);
        assert_eq!(prioritize(&raw, 8), raw);
        assert!(prioritize(&raw, 4).starts_with("éééé\n"));
    }
}
