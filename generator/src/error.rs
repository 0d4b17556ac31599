use std::fmt;
use std::ops::Range;

#[derive(Debug)]
pub enum RuntimeError {
    TypeError { expected: String, got: String },
    UndefinedVariable(String),
    ArityMismatch { expected: usize, got: usize },
    IndexOutOfBounds(i64),
    UnknownField(String),
    DivisionByZero,
    StackOverflow,
    IoError(String),
    Custom(String),
}

impl fmt::Display for RuntimeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RuntimeError::TypeError { expected, got } => {
                write!(f, "type error: expected {}, got {}", expected, got)
            }
            RuntimeError::UndefinedVariable(name) => write!(f, "undefined variable: {}", name),
            RuntimeError::ArityMismatch { expected, got } => {
                write!(f, "function takes {} arguments, got {}", expected, got)
            }
            RuntimeError::IndexOutOfBounds(idx) => write!(f, "index {} out of bounds", idx),
            RuntimeError::UnknownField(name) => write!(f, "record has no field '{}'", name),
            RuntimeError::DivisionByZero => write!(f, "division by zero"),
            RuntimeError::StackOverflow => write!(f, "stack overflow"),
            RuntimeError::IoError(msg) => write!(f, "I/O error: {}", msg),
            RuntimeError::Custom(msg) => write!(f, "{}", msg),
        }
    }
}

impl std::error::Error for RuntimeError {}

/// A runtime error enriched with the span of the expression it arose from,
/// when one is known. Spans are relative to the script fragment being
/// evaluated; the executor rebases them into document coordinates.
#[derive(Debug)]
pub struct DiagnosticError {
    pub error: RuntimeError,
    pub span: Option<Range<usize>>,
}

impl DiagnosticError {
    pub fn at(error: RuntimeError, span: Range<usize>) -> Self {
        DiagnosticError {
            error,
            span: Some(span),
        }
    }
}

impl From<RuntimeError> for DiagnosticError {
    fn from(error: RuntimeError) -> Self {
        DiagnosticError { error, span: None }
    }
}

impl fmt::Display for DiagnosticError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.error.fmt(f)
    }
}

impl std::error::Error for DiagnosticError {}
