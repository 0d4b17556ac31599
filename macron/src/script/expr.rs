use std::ops::Range;

/// Binary operators, lowest to highest precedence tier.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOperator {
    LogicalOr,
    LogicalAnd,
    Equality,
    Inequality,
    GreaterThan,
    LessThan,
    GreaterThanOrEqual,
    LessThanOrEqual,
    Addition,
    Subtraction,
    Multiplication,
    Division,
    Modulo,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOperator {
    Negation,
    LogicalNot,
}

/// Text with optional `{expr}` interpolations.
#[derive(Debug, Clone)]
pub struct TemplateText {
    pub parts: Vec<TextPart>,
}

#[derive(Debug, Clone)]
pub enum TextPart {
    Literal(String),
    Expression(Expr),
}

impl TemplateText {
    pub fn literal(s: impl Into<String>) -> Self {
        TemplateText {
            parts: vec![TextPart::Literal(s.into())],
        }
    }
}

/// An expression in the generator script language.
#[derive(Debug, Clone)]
pub enum Expr {
    NumberLiteral(f64),
    BooleanLiteral(bool),
    /// A string literal; may interpolate embedded `{expr}` parts.
    TextLiteral(TemplateText),
    ListLiteral(Vec<Expr>),
    /// Record literal; keys keep their written order.
    RecordLiteral(Vec<(String, Expr)>),
    Variable(String, Range<usize>),
    /// `fn(a, b) expr` — an anonymous generator function.
    Lambda {
        params: Vec<String>,
        body: Box<Expr>,
    },
    Call {
        callee: Box<Expr>,
        args: Vec<Expr>,
        span: Range<usize>,
    },
    /// `target[index]` — list position or record key.
    Index {
        target: Box<Expr>,
        index: Box<Expr>,
        span: Range<usize>,
    },
    /// `target.name` — record field access.
    Field {
        target: Box<Expr>,
        name: String,
        span: Range<usize>,
    },
    Unary {
        operator: UnaryOperator,
        operand: Box<Expr>,
    },
    Binary {
        operator: BinaryOperator,
        left: Box<Expr>,
        right: Box<Expr>,
    },
    /// `condition ? true_branch : false_branch`
    Conditional {
        condition: Box<Expr>,
        true_branch: Box<Expr>,
        false_branch: Box<Expr>,
    },
}
