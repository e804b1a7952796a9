//! Transfer file format for scenario sets.
//!
//! One row per scenario file: a path, then a bracketed, comma-separated list
//! of line numbers.
//!
//! ```text
//! features/login.feature,[12, 48, 50]
//! features/cart.feature,[3]
//! ```
//!
//! Paths that contain quotes, commas, brackets, line breaks or surrounding
//! whitespace (or are empty) are written as CSV quoted fields.
//!
//! Parsing is lenient. Whitespace around columns is ignored, CSV-style
//! quoting around either column is stripped, and a token that is not a line
//! number is skipped and reported instead of failing the whole file.

use super::{ScenarioReference, ScenarioSet};
use serde::{Deserialize, Serialize};

/// A piece of the transfer file that could not be used.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum SkippedEntry {
    /// A line-number token that is not a non-negative integer.
    LineToken {
        row: usize,
        path: String,
        token: String,
    },
    /// A row without a bracketed line list or without a path.
    Row { row: usize, text: String },
}

impl std::fmt::Display for SkippedEntry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::LineToken { row, path, token } => {
                write!(f, "row {row}: ignored line token '{token}' for {path}")
            }
            Self::Row { row, text } => write!(f, "row {row}: ignored malformed row '{text}'"),
        }
    }
}

/// Result of parsing a transfer file.
#[derive(Debug, Clone, Default)]
pub struct ParsedTransfer {
    pub scenarios: ScenarioSet,
    pub skipped: Vec<SkippedEntry>,
}

impl ParsedTransfer {
    #[must_use]
    pub fn is_clean(&self) -> bool {
        self.skipped.is_empty()
    }
}

/// Serialize a scenario set, files in insertion order.
///
/// Paths that would not survive [`parse`] as bare text are written as a
/// CSV quoted field, with `"` doubled.
#[must_use]
pub fn encode(set: &ScenarioSet) -> String {
    let mut out = String::new();
    for file in set.files() {
        let lines: Vec<String> = file.lines.iter().map(u32::to_string).collect();
        push_path(&mut out, &file.path);
        out.push_str(",[");
        out.push_str(&lines.join(", "));
        out.push_str("]\n");
    }
    out
}

fn needs_quoting(path: &str) -> bool {
    path.is_empty()
        || path.trim() != path
        || path.starts_with('\u{feff}')
        || path.contains(['"', ',', '[', '\n', '\r'])
}

fn push_path(out: &mut String, path: &str) {
    if needs_quoting(path) {
        out.push('"');
        out.push_str(&path.replace('"', "\"\""));
        out.push('"');
    } else {
        out.push_str(path);
    }
}

/// Parse transfer file text.
///
/// Never fails: anything unusable lands in [`ParsedTransfer::skipped`].
#[must_use]
pub fn parse(text: &str) -> ParsedTransfer {
    let mut parsed = ParsedTransfer::default();
    let mut physical = text.split('\n').enumerate();

    while let Some((idx, first)) = physical.next() {
        let row = idx + 1;

        // A quoted path may span physical lines.
        let mut record = first.to_string();
        while opens_unterminated_quote(&record) {
            let Some((_, next)) = physical.next() else {
                break;
            };
            record.push('\n');
            record.push_str(next);
        }

        let line = record.trim_start_matches('\u{feff}').trim();
        if line.is_empty() {
            continue;
        }

        let Some((path, numbers)) = split_row(line) else {
            parsed.skipped.push(SkippedEntry::Row {
                row,
                text: line.to_string(),
            });
            continue;
        };

        for token in numbers.split(',') {
            let token = token.trim();
            if token.is_empty() {
                continue;
            }
            match token.parse::<u32>() {
                Ok(n) => {
                    parsed.scenarios.insert(ScenarioReference::new(path.clone(), n));
                }
                Err(_) => parsed.skipped.push(SkippedEntry::LineToken {
                    row,
                    path: path.clone(),
                    token: token.to_string(),
                }),
            }
        }
    }

    parsed
}

/// Byte index of the quote closing the field that opens `field`.
fn closing_quote(field: &str) -> Option<usize> {
    let bytes = field.as_bytes();
    let mut i = 1;
    while i < bytes.len() {
        if bytes[i] == b'"' {
            if bytes.get(i + 1) == Some(&b'"') {
                i += 2;
                continue;
            }
            return Some(i);
        }
        i += 1;
    }
    None
}

fn opens_unterminated_quote(record: &str) -> bool {
    let start = record.trim_start_matches('\u{feff}').trim_start();
    start.starts_with('"') && closing_quote(start).is_none()
}

/// Split a row into its path and the inside of the bracketed list.
///
/// A quoted path is taken verbatim. A bare path ends at the last `[`, so
/// commas inside it are fine.
fn split_row(line: &str) -> Option<(String, &str)> {
    let (path, list) = if line.starts_with('"') {
        let end = closing_quote(line)?;
        let path = line[1..end].replace("\"\"", "\"");
        let list = line[end + 1..].trim_start().strip_prefix(',')?;
        (path, list)
    } else {
        let open = line.rfind('[')?;
        let path = line[..open]
            .trim_end()
            .trim_end_matches('"')
            .trim_end()
            .strip_suffix(',')?
            .trim();
        if path.is_empty() {
            return None;
        }
        (path.to_string(), &line[open..])
    };

    let numbers = list
        .trim()
        .trim_matches('"')
        .trim()
        .strip_prefix('[')?
        .strip_suffix(']')?;
    Some((path, numbers))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn r(path: &str, line: u32) -> ScenarioReference {
        ScenarioReference::new(path, line)
    }

    #[test]
    fn test_encode_format() {
        let set: ScenarioSet = vec![r("a.feature", 12), r("b.feature", 3), r("a.feature", 48)]
            .into_iter()
            .collect();
        assert_eq!(encode(&set), "a.feature,[12, 48]\nb.feature,[3]\n");
    }

    #[test]
    fn test_encode_empty_set() {
        assert_eq!(encode(&ScenarioSet::new()), "");
        assert!(parse("").scenarios.is_empty());
    }

    #[test]
    fn test_parse_basic_rows() {
        let parsed = parse("path/to/file.feature,[12, 48, 50]\nother.feature,[1]\n");
        assert!(parsed.is_clean());
        assert_eq!(parsed.scenarios.len(), 4);
        assert_eq!(
            parsed.scenarios.lines_for("path/to/file.feature"),
            Some(&[12, 48, 50][..])
        );
    }

    #[test]
    fn test_parse_skips_malformed_token() {
        let parsed = parse("x.feature,[3, abc, 7]");
        let expected: ScenarioSet = vec![r("x.feature", 3), r("x.feature", 7)].into_iter().collect();
        assert_eq!(parsed.scenarios, expected);
        assert_eq!(
            parsed.skipped,
            vec![SkippedEntry::LineToken {
                row: 1,
                path: "x.feature".into(),
                token: "abc".into()
            }]
        );
    }

    #[test]
    fn test_parse_tolerates_whitespace_and_quotes() {
        let parsed = parse("  \"dir, with comma/a.feature\" , \"[ 4 ,5 ]\"  \r\n\n");
        assert!(parsed.is_clean());
        assert_eq!(
            parsed.scenarios.lines_for("dir, with comma/a.feature"),
            Some(&[4, 5][..])
        );
    }

    #[test]
    fn test_parse_skips_rows_without_list() {
        let parsed = parse("just a path\n,[1, 2]\nok.feature,[9]");
        assert_eq!(parsed.scenarios.len(), 1);
        assert_eq!(parsed.skipped.len(), 2);
        assert!(matches!(parsed.skipped[0], SkippedEntry::Row { row: 1, .. }));
        assert!(matches!(parsed.skipped[1], SkippedEntry::Row { row: 2, .. }));
    }

    #[test]
    fn test_parse_rejects_negative_numbers() {
        let parsed = parse("a.feature,[-3, 4]");
        assert_eq!(parsed.scenarios.len(), 1);
        assert!(parsed.scenarios.contains(&r("a.feature", 4)));
    }

    #[test]
    fn test_parse_collapses_duplicate_lines() {
        let parsed = parse("a.feature,[4, 4]\na.feature,[4, 5]");
        assert_eq!(parsed.scenarios.len(), 2);
    }

    #[test]
    fn test_round_trip_preserves_set() {
        let set: ScenarioSet = vec![
            r("features/a.feature", 1),
            r("features/b.feature", 20),
            r("features/a.feature", 7),
        ]
        .into_iter()
        .collect();
        assert_eq!(parse(&encode(&set)).scenarios, set);
    }

    #[test]
    fn test_round_trip_preserves_awkward_paths() {
        let paths = [
            "\"quoted\".feature",
            " lead.feature",
            "trail.feature ",
            "",
            "a\nb.feature",
            "a\r\nb.feature",
            "dir, with comma/x.feature",
            "[tagged].feature",
            "\u{feff}bom.feature",
        ];

        for path in paths {
            let set: ScenarioSet = std::iter::once(r(path, 5)).collect();
            let parsed = parse(&encode(&set));
            assert!(parsed.is_clean(), "{path:?}: {:?}", parsed.skipped);
            assert_eq!(parsed.scenarios, set, "{path:?}");
        }

        let all: ScenarioSet = paths
            .iter()
            .enumerate()
            .map(|(i, p)| r(p, i as u32 + 1))
            .collect();
        assert_eq!(parse(&encode(&all)).scenarios, all);
    }

    #[test]
    fn test_encode_quotes_only_when_needed() {
        let set: ScenarioSet = vec![r("plain.feature", 1), r("say \"hi\".feature", 2)]
            .into_iter()
            .collect();
        assert_eq!(
            encode(&set),
            "plain.feature,[1]\n\"say \"\"hi\"\".feature\",[2]\n"
        );
    }

    #[test]
    fn test_unterminated_quote_is_skipped() {
        let parsed = parse("\"open.feature,[1]\nok.feature,[2]");
        assert!(parsed.scenarios.is_empty());
        assert_eq!(parsed.skipped.len(), 1);
    }

    #[test]
    fn test_skipped_entry_display() {
        let entry = SkippedEntry::LineToken {
            row: 2,
            path: "a.feature".into(),
            token: "x1".into(),
        };
        assert_eq!(entry.to_string(), "row 2: ignored line token 'x1' for a.feature");
    }
}
