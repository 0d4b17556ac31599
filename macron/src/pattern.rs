use std::sync::LazyLock;

use regex::Regex;

/// The three line forms the extractor reacts to. Markers are recognized
/// whether the comment is left open or closed on the same line.
/// - `HeaderStart`: `/* MACRO.HEADER <name>`
/// - `BodyStart`: `/* MACRO.BODY <name>` (name must match the header's, if given)
/// - `End`: a lone `*/` on an otherwise blank line
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PatternKind {
    HeaderStart,
    BodyStart,
    End,
}

/// Result of classifying a single line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PatternMatch {
    pub kind: PatternKind,
    /// The identifier word following the marker, if any.
    pub name: Option<String>,
}

static PATTERNS: LazyLock<[(PatternKind, Regex); 3]> = LazyLock::new(|| {
    [
        (
            PatternKind::HeaderStart,
            Regex::new(r"^[ \t]*/\*+[ \t]*MACRO\.HEADER.*$").unwrap(),
        ),
        (
            PatternKind::BodyStart,
            Regex::new(r"^[ \t]*/\*+[ \t]*MACRO\.BODY.*$").unwrap(),
        ),
        (PatternKind::End, Regex::new(r"^[ \t]*\*/[ \t]*$").unwrap()),
    ]
});

/// Classify one line, returning `None` for ordinary text.
/// If a line somehow matched more than one form, the last scanned match wins.
pub fn match_line(line: &str) -> Option<PatternMatch> {
    let mut matched = None;
    for (kind, pattern) in PATTERNS.iter() {
        if pattern.is_match(line) {
            matched = Some(*kind);
        }
    }
    let kind = matched?;
    let name = match kind {
        PatternKind::HeaderStart | PatternKind::BodyStart => extract_name(line),
        PatternKind::End => None,
    };
    Some(PatternMatch { kind, name })
}

/// Pull the optional identifier out of a marker line: strip the comment
/// delimiters, collapse whitespace, and take the word after the marker.
fn extract_name(line: &str) -> Option<String> {
    let stripped = line.replacen("/*", "", 1).replacen("*/", "", 1);
    let mut words = stripped.split_whitespace();
    words.next(); // the MACRO.HEADER / MACRO.BODY marker itself
    words.next().map(|s| s.to_string())
}
