use std::fmt;
use std::ops::Range;

use codespan_reporting::diagnostic::{Diagnostic, Label, Severity};

/// The failure classes a document can produce. Every one of these aborts the
/// current expansion; none are downgraded to warnings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MacroErrorKind {
    /// A named header (or a header used as a body closing tag) reuses a name.
    DuplicateMacroName,
    /// A named body start references a header that was never declared.
    MacroNameNotFound,
    /// An unnamed body start with no prior macro to attach to.
    MacroHeaderMissing,
    /// A closing marker's name disagrees with the block's opening name.
    MacroNameMismatch,
    /// A marker appeared in a state with no defined transition.
    UnexpectedPattern,
    /// A range specification matches none of the four recognized shapes.
    BadRangeFormat,
    /// An interval range with `from > to`.
    BadInterval,
    /// The generator script failed to parse, threw, or did not yield both
    /// `TOKENS` and `RANGES`.
    GeneratorFailure,
}

impl fmt::Display for MacroErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let msg = match self {
            MacroErrorKind::DuplicateMacroName => "macro name already exists",
            MacroErrorKind::MacroNameNotFound => "macro name not found",
            MacroErrorKind::MacroHeaderMissing => "macro header missing",
            MacroErrorKind::MacroNameMismatch => "macro name mismatch",
            MacroErrorKind::UnexpectedPattern => "unexpected pattern",
            MacroErrorKind::BadRangeFormat => "bad range format",
            MacroErrorKind::BadInterval => "bad interval (from > to)",
            MacroErrorKind::GeneratorFailure => "generator script failed",
        };
        f.write_str(msg)
    }
}

/// An expansion failure with source location information.
#[derive(Debug, Clone)]
pub struct MacroError {
    pub kind: MacroErrorKind,
    /// The offending line's text, when the failure is tied to one line.
    pub row: Option<String>,
    /// 1-based line number of `row`.
    pub line: Option<usize>,
    /// Byte span in the source, for codespan-reporting.
    pub span: Option<Range<usize>>,
    pub file_id: usize,
    /// Human-readable detail on the failure condition.
    pub details: String,
}

impl MacroError {
    pub fn new(kind: MacroErrorKind, details: impl Into<String>) -> Self {
        MacroError {
            kind,
            row: None,
            line: None,
            span: None,
            file_id: 0,
            details: details.into(),
        }
    }

    /// Attach the offending row, its 1-based line number, and its byte span.
    pub fn at_row(
        kind: MacroErrorKind,
        details: impl Into<String>,
        row: &str,
        line: usize,
        span: Range<usize>,
        file_id: usize,
    ) -> Self {
        MacroError {
            kind,
            row: Some(row.to_string()),
            line: Some(line),
            span: Some(span),
            file_id,
            details: details.into(),
        }
    }

    pub fn with_span(mut self, span: Range<usize>, file_id: usize) -> Self {
        self.span = Some(span);
        self.file_id = file_id;
        self
    }

    /// Shift the span by `offset` bytes. Used to rebase spans produced
    /// against an extracted fragment into whole-document coordinates.
    pub fn rebase_span(mut self, offset: usize) -> Self {
        if let Some(span) = self.span.take() {
            self.span = Some(span.start + offset..span.end + offset);
        }
        self
    }

    /// Convert to a codespan-reporting Diagnostic for display.
    pub fn to_diagnostic(&self) -> Diagnostic<usize> {
        let mut diagnostic = Diagnostic::new(Severity::Error)
            .with_message(self.kind.to_string())
            .with_notes(vec![self.details.clone()]);
        if let Some(span) = &self.span {
            diagnostic =
                diagnostic.with_labels(vec![Label::primary(self.file_id, span.clone())]);
        }
        diagnostic
    }
}

impl fmt::Display for MacroError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.kind)?;
        if let Some(row) = &self.row {
            write!(f, "\n  {}", row.trim_end())?;
        }
        write!(f, "\n  {}", self.details)?;
        if let Some(line) = self.line {
            write!(f, " on row {}", line)?;
        }
        Ok(())
    }
}

impl std::error::Error for MacroError {}
