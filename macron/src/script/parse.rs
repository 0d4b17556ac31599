use std::ops::Range;

use crate::error::{MacroError, MacroErrorKind};
use crate::script::expr::{
    BinaryOperator, Expr, TemplateText, TextPart, UnaryOperator,
};
use crate::script::{Script, Statement};

// ---------------------------------------------------------------------------
// Token types
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Number(f64),
    Str(String),
    Ident(String),
    True,
    False,
    Fn,

    /// Statement separator; only emitted outside brackets.
    Newline,

    Plus,
    Minus,
    Star,
    Slash,
    Percent,
    Eq,
    EqEq,
    BangEq,
    Gt,
    Lt,
    GtEq,
    LtEq,
    AmpAmp,
    PipePipe,
    Bang,
    Question,
    Colon,
    Comma,
    Dot,

    LParen,
    RParen,
    LBracket,
    RBracket,
    LBrace,
    RBrace,
}

type Spanned = (Token, Range<usize>);

// ---------------------------------------------------------------------------
// Public API
// ---------------------------------------------------------------------------

/// Parse generator script source into a list of statements. All failures are
/// `GeneratorFailure` errors; the caller rebases spans into the document.
pub(crate) fn parse_script(source: &str, file_id: usize) -> Result<Script, MacroError> {
    let tokens = tokenize(source, 0, true, file_id)?;
    let mut parser = ExprParser::new(tokens, file_id);
    let mut statements = Vec::new();

    loop {
        parser.skip_newlines();
        if parser.at_end() {
            break;
        }
        statements.push(parser.parse_statement()?);
        match parser.peek() {
            None => break,
            Some(Token::Newline) => {}
            Some(_) => return Err(parser.error("unexpected tokens after statement")),
        }
    }

    Ok(Script { statements })
}

// ---------------------------------------------------------------------------
// Tokenizer
// ---------------------------------------------------------------------------

/// Tokenize script text. Newline tokens are emitted only at bracket depth
/// zero (and only when `statement_mode` is set), so expressions may span
/// lines inside `()`, `[]` and `{}`.
fn tokenize(
    text: &str,
    base_offset: usize,
    statement_mode: bool,
    file_id: usize,
) -> Result<Vec<Spanned>, MacroError> {
    let chars: Vec<char> = text.chars().collect();
    let len = chars.len();
    let mut tokens: Vec<Spanned> = Vec::new();
    let mut depth = 0u32;
    let mut i = 0;

    // Map character indices to byte offsets within the text
    let byte_pos: Vec<usize> = {
        let mut bp = Vec::with_capacity(len + 1);
        let mut offset = 0;
        for c in &chars {
            bp.push(offset);
            offset += c.len_utf8();
        }
        bp.push(offset);
        bp
    };
    let span = |start: usize, end: usize| base_offset + byte_pos[start]..base_offset + byte_pos[end];

    while i < len {
        let c = chars[i];
        match c {
            ' ' | '\t' | '\r' => {
                i += 1;
            }

            '\n' => {
                if statement_mode && depth == 0 {
                    tokens.push((Token::Newline, span(i, i + 1)));
                }
                i += 1;
            }

            // String literal; interpolation is parsed later
            '"' => {
                i += 1;
                let start = i;
                while i < len && chars[i] != '"' {
                    i += 1;
                }
                if i >= len {
                    return Err(parse_error("unterminated string literal", span(start - 1, len), file_id));
                }
                let s: String = chars[start..i].iter().collect();
                let string_span = span(start - 1, i + 1);
                i += 1; // closing quote
                tokens.push((Token::Str(s), string_span));
            }

            // Numbers
            '0'..='9' => {
                let start = i;
                while i < len && (chars[i].is_ascii_digit() || chars[i] == '.') {
                    i += 1;
                }
                let num_str: String = chars[start..i].iter().collect();
                match num_str.parse::<f64>() {
                    Ok(n) => tokens.push((Token::Number(n), span(start, i))),
                    Err(_) => {
                        return Err(parse_error(
                            format!("malformed number '{}'", num_str),
                            span(start, i),
                            file_id,
                        ));
                    }
                }
            }

            // Identifiers and keywords
            'a'..='z' | 'A'..='Z' | '_' => {
                let start = i;
                while i < len && (chars[i].is_alphanumeric() || chars[i] == '_') {
                    i += 1;
                }
                let ident: String = chars[start..i].iter().collect();
                let token = match ident.as_str() {
                    "true" => Token::True,
                    "false" => Token::False,
                    "fn" => Token::Fn,
                    _ => Token::Ident(ident),
                };
                tokens.push((token, span(start, i)));
            }

            // Comment to end of line
            '/' if i + 1 < len && chars[i + 1] == '/' => {
                while i < len && chars[i] != '\n' {
                    i += 1;
                }
            }

            // Two-character operators
            '=' => {
                if i + 1 < len && chars[i + 1] == '=' {
                    tokens.push((Token::EqEq, span(i, i + 2)));
                    i += 2;
                } else {
                    tokens.push((Token::Eq, span(i, i + 1)));
                    i += 1;
                }
            }
            '!' => {
                if i + 1 < len && chars[i + 1] == '=' {
                    tokens.push((Token::BangEq, span(i, i + 2)));
                    i += 2;
                } else {
                    tokens.push((Token::Bang, span(i, i + 1)));
                    i += 1;
                }
            }
            '>' => {
                if i + 1 < len && chars[i + 1] == '=' {
                    tokens.push((Token::GtEq, span(i, i + 2)));
                    i += 2;
                } else {
                    tokens.push((Token::Gt, span(i, i + 1)));
                    i += 1;
                }
            }
            '<' => {
                if i + 1 < len && chars[i + 1] == '=' {
                    tokens.push((Token::LtEq, span(i, i + 2)));
                    i += 2;
                } else {
                    tokens.push((Token::Lt, span(i, i + 1)));
                    i += 1;
                }
            }
            '&' => {
                if i + 1 < len && chars[i + 1] == '&' {
                    tokens.push((Token::AmpAmp, span(i, i + 2)));
                    i += 2;
                } else {
                    return Err(parse_error("unexpected character '&'", span(i, i + 1), file_id));
                }
            }
            '|' => {
                if i + 1 < len && chars[i + 1] == '|' {
                    tokens.push((Token::PipePipe, span(i, i + 2)));
                    i += 2;
                } else {
                    return Err(parse_error("unexpected character '|'", span(i, i + 1), file_id));
                }
            }

            // Single-character tokens
            '+' => { tokens.push((Token::Plus, span(i, i + 1))); i += 1; }
            '-' => { tokens.push((Token::Minus, span(i, i + 1))); i += 1; }
            '*' => { tokens.push((Token::Star, span(i, i + 1))); i += 1; }
            '/' => { tokens.push((Token::Slash, span(i, i + 1))); i += 1; }
            '%' => { tokens.push((Token::Percent, span(i, i + 1))); i += 1; }
            '?' => { tokens.push((Token::Question, span(i, i + 1))); i += 1; }
            ':' => { tokens.push((Token::Colon, span(i, i + 1))); i += 1; }
            ',' => { tokens.push((Token::Comma, span(i, i + 1))); i += 1; }
            '.' => { tokens.push((Token::Dot, span(i, i + 1))); i += 1; }
            '(' => { depth += 1; tokens.push((Token::LParen, span(i, i + 1))); i += 1; }
            ')' => { depth = depth.saturating_sub(1); tokens.push((Token::RParen, span(i, i + 1))); i += 1; }
            '[' => { depth += 1; tokens.push((Token::LBracket, span(i, i + 1))); i += 1; }
            ']' => { depth = depth.saturating_sub(1); tokens.push((Token::RBracket, span(i, i + 1))); i += 1; }
            '{' => { depth += 1; tokens.push((Token::LBrace, span(i, i + 1))); i += 1; }
            '}' => { depth = depth.saturating_sub(1); tokens.push((Token::RBrace, span(i, i + 1))); i += 1; }

            other => {
                return Err(parse_error(
                    format!("unexpected character '{}'", other),
                    span(i, i + 1),
                    file_id,
                ));
            }
        }
    }

    Ok(tokens)
}

fn parse_error(
    details: impl Into<String>,
    span: Range<usize>,
    file_id: usize,
) -> MacroError {
    MacroError::new(MacroErrorKind::GeneratorFailure, details).with_span(span, file_id)
}

// ---------------------------------------------------------------------------
// Pratt parser
// ---------------------------------------------------------------------------

struct ExprParser {
    tokens: Vec<Spanned>,
    pos: usize,
    file_id: usize,
}

// Binding powers (precedence). Higher = tighter binding.
const BP_CONDITIONAL: u8 = 2; // ? :
const BP_OR: u8 = 4; // ||
const BP_AND: u8 = 6; // &&
const BP_EQUALITY: u8 = 8; // == !=
const BP_COMPARISON: u8 = 10; // < > <= >=
const BP_ADDITIVE: u8 = 12; // + -
const BP_MULTIPLICATIVE: u8 = 14; // * / %
const BP_UNARY: u8 = 16; // ! -

impl ExprParser {
    fn new(tokens: Vec<Spanned>, file_id: usize) -> Self {
        ExprParser {
            tokens,
            pos: 0,
            file_id,
        }
    }

    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos).map(|(t, _)| t)
    }

    fn advance(&mut self) -> Option<Token> {
        let token = self.tokens.get(self.pos).map(|(t, _)| t.clone());
        if token.is_some() {
            self.pos += 1;
        }
        token
    }

    fn at_end(&self) -> bool {
        self.pos >= self.tokens.len()
    }

    fn current_span(&self) -> Range<usize> {
        self.tokens
            .get(self.pos.min(self.tokens.len().saturating_sub(1)))
            .map(|(_, s)| s.clone())
            .unwrap_or(0..0)
    }

    fn previous_span(&self) -> Range<usize> {
        self.tokens
            .get(self.pos.saturating_sub(1))
            .map(|(_, s)| s.clone())
            .unwrap_or(0..0)
    }

    fn skip_newlines(&mut self) {
        while matches!(self.peek(), Some(Token::Newline)) {
            self.pos += 1;
        }
    }

    fn error(&self, msg: impl Into<String>) -> MacroError {
        parse_error(msg, self.current_span(), self.file_id)
    }

    fn expect(&mut self, token: Token, what: &str) -> Result<(), MacroError> {
        match self.advance() {
            Some(t) if t == token => Ok(()),
            _ => Err(self.error(format!("expected {}", what))),
        }
    }

    // ------------------------------------------------------------------
    // Statements
    // ------------------------------------------------------------------

    fn parse_statement(&mut self) -> Result<Statement, MacroError> {
        let start = self.current_span().start;

        // Assignment: ident = expr (single `=`, not `==`)
        if let (Some((Token::Ident(name), _)), Some((Token::Eq, _))) =
            (self.tokens.get(self.pos), self.tokens.get(self.pos + 1))
        {
            let name = name.clone();
            self.pos += 2;
            let value = self.parse_expr(0)?;
            let span = start..self.previous_span().end;
            return Ok(Statement::Assignment {
                variable: name,
                value,
                span,
            });
        }

        let value = self.parse_expr(0)?;
        let span = start..self.previous_span().end;
        Ok(Statement::Expression { value, span })
    }

    // ------------------------------------------------------------------
    // Pratt parser core
    // ------------------------------------------------------------------

    fn parse_expr(&mut self, min_bp: u8) -> Result<Expr, MacroError> {
        let mut left = self.parse_prefix()?;
        left = self.parse_postfix(left)?;

        loop {
            let Some(token) = self.peek() else { break };
            let Some((l_bp, r_bp)) = infix_bp(token) else {
                break;
            };
            if l_bp < min_bp {
                break;
            }

            // Conditional operator: cond ? a : b
            if matches!(token, Token::Question) {
                self.advance();
                let true_branch = self.parse_expr(0)?;
                self.expect(Token::Colon, "':' in conditional")?;
                let false_branch = self.parse_expr(0)?;
                left = Expr::Conditional {
                    condition: Box::new(left),
                    true_branch: Box::new(true_branch),
                    false_branch: Box::new(false_branch),
                };
                continue;
            }

            let operator = match self.advance() {
                Some(Token::Plus) => BinaryOperator::Addition,
                Some(Token::Minus) => BinaryOperator::Subtraction,
                Some(Token::Star) => BinaryOperator::Multiplication,
                Some(Token::Slash) => BinaryOperator::Division,
                Some(Token::Percent) => BinaryOperator::Modulo,
                Some(Token::EqEq) => BinaryOperator::Equality,
                Some(Token::BangEq) => BinaryOperator::Inequality,
                Some(Token::Gt) => BinaryOperator::GreaterThan,
                Some(Token::Lt) => BinaryOperator::LessThan,
                Some(Token::GtEq) => BinaryOperator::GreaterThanOrEqual,
                Some(Token::LtEq) => BinaryOperator::LessThanOrEqual,
                Some(Token::AmpAmp) => BinaryOperator::LogicalAnd,
                Some(Token::PipePipe) => BinaryOperator::LogicalOr,
                _ => return Err(self.error("unexpected infix operator")),
            };

            let right = self.parse_expr(r_bp)?;
            left = Expr::Binary {
                operator,
                left: Box::new(left),
                right: Box::new(right),
            };
        }

        Ok(left)
    }

    fn parse_prefix(&mut self) -> Result<Expr, MacroError> {
        let span = self.current_span();
        let token = self
            .advance()
            .ok_or_else(|| self.error("unexpected end of expression"))?;

        match token {
            Token::Number(n) => Ok(Expr::NumberLiteral(n)),
            Token::True => Ok(Expr::BooleanLiteral(true)),
            Token::False => Ok(Expr::BooleanLiteral(false)),
            Token::Str(s) => self.parse_text_literal(&s, span),
            Token::Ident(name) => Ok(Expr::Variable(name, span)),

            Token::Bang => {
                let operand = self.parse_expr(BP_UNARY)?;
                Ok(Expr::Unary {
                    operator: UnaryOperator::LogicalNot,
                    operand: Box::new(operand),
                })
            }
            Token::Minus => {
                let operand = self.parse_expr(BP_UNARY)?;
                Ok(Expr::Unary {
                    operator: UnaryOperator::Negation,
                    operand: Box::new(operand),
                })
            }

            Token::LParen => {
                let expr = self.parse_expr(0)?;
                self.expect(Token::RParen, "')'")?;
                Ok(expr)
            }

            Token::LBracket => self.parse_list_literal(),
            Token::LBrace => self.parse_record_literal(),
            Token::Fn => self.parse_lambda(),

            other => Err(parse_error(
                format!("unexpected token {:?}", other),
                span,
                self.file_id,
            )),
        }
    }

    /// Postfix chain: calls, indexing, and field access bind tighter than
    /// any operator.
    fn parse_postfix(&mut self, mut expr: Expr) -> Result<Expr, MacroError> {
        loop {
            match self.peek() {
                Some(Token::LParen) => {
                    let span_start = self.current_span().start;
                    self.advance();
                    let args = self.parse_argument_list()?;
                    expr = Expr::Call {
                        callee: Box::new(expr),
                        args,
                        span: span_start..self.previous_span().end,
                    };
                }
                Some(Token::LBracket) => {
                    let span_start = self.current_span().start;
                    self.advance();
                    let index = self.parse_expr(0)?;
                    self.expect(Token::RBracket, "']'")?;
                    expr = Expr::Index {
                        target: Box::new(expr),
                        index: Box::new(index),
                        span: span_start..self.previous_span().end,
                    };
                }
                Some(Token::Dot) => {
                    let span_start = self.current_span().start;
                    self.advance();
                    let name = match self.advance() {
                        Some(Token::Ident(name)) => name,
                        _ => return Err(self.error("expected field name after '.'")),
                    };
                    expr = Expr::Field {
                        target: Box::new(expr),
                        name,
                        span: span_start..self.previous_span().end,
                    };
                }
                _ => break,
            }
        }
        Ok(expr)
    }

    fn parse_argument_list(&mut self) -> Result<Vec<Expr>, MacroError> {
        let mut args = Vec::new();
        if matches!(self.peek(), Some(Token::RParen)) {
            self.advance();
            return Ok(args);
        }
        loop {
            args.push(self.parse_expr(0)?);
            match self.advance() {
                Some(Token::Comma) => {}
                Some(Token::RParen) => break,
                _ => return Err(self.error("expected ',' or ')' in argument list")),
            }
        }
        Ok(args)
    }

    fn parse_list_literal(&mut self) -> Result<Expr, MacroError> {
        let mut items = Vec::new();
        if matches!(self.peek(), Some(Token::RBracket)) {
            self.advance();
            return Ok(Expr::ListLiteral(items));
        }
        loop {
            items.push(self.parse_expr(0)?);
            match self.advance() {
                Some(Token::Comma) => {
                    // Allow a trailing comma before the closing bracket
                    if matches!(self.peek(), Some(Token::RBracket)) {
                        self.advance();
                        break;
                    }
                }
                Some(Token::RBracket) => break,
                _ => return Err(self.error("expected ',' or ']' in list")),
            }
        }
        Ok(Expr::ListLiteral(items))
    }

    fn parse_record_literal(&mut self) -> Result<Expr, MacroError> {
        let mut entries = Vec::new();
        if matches!(self.peek(), Some(Token::RBrace)) {
            self.advance();
            return Ok(Expr::RecordLiteral(entries));
        }
        loop {
            let key = match self.advance() {
                Some(Token::Ident(name)) => name,
                Some(Token::Str(s)) => s,
                Some(Token::Number(n)) => format_number(n),
                _ => return Err(self.error("expected record key")),
            };
            self.expect(Token::Colon, "':' after record key")?;
            let value = self.parse_expr(0)?;
            entries.push((key, value));
            match self.advance() {
                Some(Token::Comma) => {
                    if matches!(self.peek(), Some(Token::RBrace)) {
                        self.advance();
                        break;
                    }
                }
                Some(Token::RBrace) => break,
                _ => return Err(self.error("expected ',' or '}' in record")),
            }
        }
        Ok(Expr::RecordLiteral(entries))
    }

    fn parse_lambda(&mut self) -> Result<Expr, MacroError> {
        self.expect(Token::LParen, "'(' after fn")?;
        let mut params = Vec::new();
        if matches!(self.peek(), Some(Token::RParen)) {
            self.advance();
        } else {
            loop {
                match self.advance() {
                    Some(Token::Ident(name)) => params.push(name),
                    _ => return Err(self.error("expected parameter name")),
                }
                match self.advance() {
                    Some(Token::Comma) => {}
                    Some(Token::RParen) => break,
                    _ => return Err(self.error("expected ',' or ')' in parameter list")),
                }
            }
        }
        let body = self.parse_expr(0)?;
        Ok(Expr::Lambda {
            params,
            body: Box::new(body),
        })
    }

    /// Parse a string literal's content for `{expr}` interpolations.
    fn parse_text_literal(
        &mut self,
        s: &str,
        span: Range<usize>,
    ) -> Result<Expr, MacroError> {
        let mut parts = Vec::new();
        let mut current_literal = String::new();
        let chars: Vec<char> = s.chars().collect();
        let mut i = 0;

        // Byte offset of each character within the literal's content, so
        // interpolated expressions keep accurate document spans. The content
        // starts one byte past the opening quote.
        let byte_pos: Vec<usize> = {
            let mut bp = Vec::with_capacity(chars.len() + 1);
            let mut offset = 0;
            for c in &chars {
                bp.push(offset);
                offset += c.len_utf8();
            }
            bp.push(offset);
            bp
        };

        while i < chars.len() {
            if chars[i] == '{' {
                if !current_literal.is_empty() {
                    parts.push(TextPart::Literal(std::mem::take(&mut current_literal)));
                }
                i += 1;
                let mut depth = 1u32;
                let start = i;
                while i < chars.len() {
                    if chars[i] == '{' {
                        depth += 1;
                    } else if chars[i] == '}' {
                        depth -= 1;
                        if depth == 0 {
                            break;
                        }
                    }
                    i += 1;
                }
                if depth != 0 {
                    return Err(parse_error(
                        "unterminated '{' interpolation in string",
                        span,
                        self.file_id,
                    ));
                }
                let expr_str: String = chars[start..i].iter().collect();
                i += 1; // closing brace

                let expr_offset = span.start + 1 + byte_pos[start];
                let mut inner = tokenize(&expr_str, expr_offset, false, self.file_id)?;
                inner.retain(|(t, _)| !matches!(t, Token::Newline));
                let mut parser = ExprParser::new(inner, self.file_id);
                let expr = parser.parse_expr(0)?;
                if !parser.at_end() {
                    return Err(parse_error(
                        "unexpected tokens in string interpolation",
                        span,
                        self.file_id,
                    ));
                }
                parts.push(TextPart::Expression(expr));
            } else {
                current_literal.push(chars[i]);
                i += 1;
            }
        }

        if !current_literal.is_empty() {
            parts.push(TextPart::Literal(current_literal));
        }
        if parts.is_empty() {
            parts.push(TextPart::Literal(String::new()));
        }

        Ok(Expr::TextLiteral(TemplateText { parts }))
    }
}

/// Infix binding powers: (left_bp, right_bp), or None if not infix.
fn infix_bp(token: &Token) -> Option<(u8, u8)> {
    match token {
        Token::Question => Some((BP_CONDITIONAL, BP_CONDITIONAL)),
        Token::PipePipe => Some((BP_OR, BP_OR + 1)),
        Token::AmpAmp => Some((BP_AND, BP_AND + 1)),
        Token::EqEq | Token::BangEq => Some((BP_EQUALITY, BP_EQUALITY + 1)),
        Token::Gt | Token::Lt | Token::GtEq | Token::LtEq => {
            Some((BP_COMPARISON, BP_COMPARISON + 1))
        }
        Token::Plus | Token::Minus => Some((BP_ADDITIVE, BP_ADDITIVE + 1)),
        Token::Star | Token::Slash | Token::Percent => {
            Some((BP_MULTIPLICATIVE, BP_MULTIPLICATIVE + 1))
        }
        _ => None,
    }
}

/// Render a numeric record key the way runtime values print: integral
/// numbers without a fractional part.
fn format_number(n: f64) -> String {
    if n.is_finite() && n == n.floor() && n.abs() < 1e15 {
        format!("{}", n as i64)
    } else {
        format!("{}", n)
    }
}
