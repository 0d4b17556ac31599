pub mod expr;
mod parse;

use std::ops::Range;

use crate::error::MacroError;
use expr::Expr;

/// A generator script: a sequence of statements, one per line. Brackets may
/// keep an expression open across lines; `//` starts a comment.
#[derive(Debug, Clone)]
pub struct Script {
    pub statements: Vec<Statement>,
}

#[derive(Debug, Clone)]
pub enum Statement {
    /// `name = expr` binds a variable in the current scope.
    Assignment {
        variable: String,
        value: Expr,
        span: Range<usize>,
    },
    /// A bare expression, evaluated for effect.
    Expression {
        value: Expr,
        span: Range<usize>,
    },
}

impl Statement {
    pub fn span(&self) -> &Range<usize> {
        match self {
            Statement::Assignment { span, .. } => span,
            Statement::Expression { span, .. } => span,
        }
    }
}

/// Parse script source. Spans are byte offsets into `source`; failures carry
/// the `GeneratorFailure` kind since a header that does not parse cannot
/// produce tokens.
pub fn parse(source: &str, file_id: usize) -> Result<Script, MacroError> {
    parse::parse_script(source, file_id)
}
