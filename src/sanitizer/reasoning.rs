//! Reasoning block removal
//!
//! Some models wrap a scratchpad around the answer (`<think>...</think>`).
//! The text is walked by a small state machine so that any number of blocks
//! is removed and the walk always terminates: every transition moves the
//! cursor forward or ends the scan.

const DELIMITERS: &[(&str, &str)] = &[
    ("<thinking>", "</thinking>"),
    ("<think>", "</think>"),
    ("<reasoning>", "</reasoning>"),
    ("<scratchpad>", "</scratchpad>"),
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ScanState {
    Scanning,
    InsideReasoningBlock { closer: &'static str },
    Done,
}

enum Marker {
    Opener { at: usize, opener: &'static str, closer: &'static str },
    StrayCloser { at: usize, closer: &'static str },
}

/// Earliest opener, or a closer that shows up before any opener.
fn next_marker(lower: &str, from: usize) -> Option<Marker> {
    let haystack = &lower[from..];
    let mut best: Option<Marker> = None;

    for &(opener, closer) in DELIMITERS {
        if let Some(i) = haystack.find(opener) {
            let at = from + i;
            if best.as_ref().map_or(true, |m| at < marker_pos(m)) {
                best = Some(Marker::Opener { at, opener, closer });
            }
        }
        if let Some(i) = haystack.find(closer) {
            let at = from + i;
            if best.as_ref().map_or(true, |m| at < marker_pos(m)) {
                best = Some(Marker::StrayCloser { at, closer });
            }
        }
    }

    best
}

fn marker_pos(marker: &Marker) -> usize {
    match marker {
        Marker::Opener { at, .. } | Marker::StrayCloser { at, .. } => *at,
    }
}

/// Remove every delimited reasoning region.
///
/// An opener without a closer truncates the text at the opener. A closer with
/// no opener means the model started mid-thought, so everything before it is
/// dropped.
pub fn strip_reasoning_blocks(text: &str) -> String {
    // ASCII lowering keeps byte offsets identical to `text`
    let lower = text.to_ascii_lowercase();
    let mut out = String::with_capacity(text.len());
    let mut pos = 0;
    let mut state = ScanState::Scanning;

    loop {
        state = match state {
            ScanState::Scanning => match next_marker(&lower, pos) {
                Some(Marker::Opener { at, opener, closer }) => {
                    out.push_str(&text[pos..at]);
                    pos = at + opener.len();
                    ScanState::InsideReasoningBlock { closer }
                }
                Some(Marker::StrayCloser { at, closer }) => {
                    out.clear();
                    pos = at + closer.len();
                    ScanState::Scanning
                }
                None => {
                    out.push_str(&text[pos..]);
                    ScanState::Done
                }
            },
            ScanState::InsideReasoningBlock { closer } => match lower[pos..].find(closer) {
                Some(i) => {
                    pos += i + closer.len();
                    ScanState::Scanning
                }
                None => ScanState::Done,
            },
            ScanState::Done => break,
        };
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_no_blocks_is_identity() {
        assert_eq!(strip_reasoning_blocks("SELECT 1 FROM t"), "SELECT 1 FROM t");
    }

    #[test]
    fn test_single_block_removed() {
        let out = strip_reasoning_blocks("<think>user wants totals</think>SELECT SUM(a) FROM t");
        assert_eq!(out, "SELECT SUM(a) FROM t");
    }

    #[test]
    fn test_multiple_blocks_removed() {
        let raw = "<think>one</think>SELECT a <THINKING>two</THINKING>FROM t<reasoning>three</reasoning>";
        assert_eq!(strip_reasoning_blocks(raw), "SELECT a FROM t");
    }

    #[test]
    fn test_unclosed_block_truncates() {
        let raw = "SELECT a FROM t <think>but maybe I should also";
        assert_eq!(strip_reasoning_blocks(raw), "SELECT a FROM t ");
    }

    #[test]
    fn test_unclosed_block_at_start_leaves_nothing() {
        assert_eq!(strip_reasoning_blocks("<scratchpad>SELECT a FROM t"), "");
    }

    #[test]
    fn test_stray_closer_drops_preceding_thought() {
        let raw = "the user asks for totals\n</think>\nSELECT SUM(a) FROM t";
        assert_eq!(strip_reasoning_blocks(raw).trim(), "SELECT SUM(a) FROM t");
    }

    #[test]
    fn test_non_ascii_text_survives() {
        let raw = "<think>€ Überlegung</think>SELECT * FROM t WHERE city = 'Zürich'";
        assert_eq!(
            strip_reasoning_blocks(raw),
            "SELECT * FROM t WHERE city = 'Zürich'"
        );
    }
}
