use std::fmt;

use macron::script::expr::Expr;

/// A runtime value produced by evaluating a generator script expression.
#[derive(Debug, Clone)]
pub enum RuntimeValue {
    Number(f64),
    Boolean(bool),
    Text(String),
    List(Vec<RuntimeValue>),
    /// Record: ordered key/value pairs. Insertion order is iteration order,
    /// which the range algebra depends on.
    Record(Vec<(String, RuntimeValue)>),
    /// An unapplied `fn(..)` literal.
    Function { params: Vec<String>, body: Expr },
}

impl RuntimeValue {
    pub fn is_truthy(&self) -> bool {
        !matches!(self, RuntimeValue::Boolean(false))
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            RuntimeValue::Number(_) => "number",
            RuntimeValue::Boolean(_) => "boolean",
            RuntimeValue::Text(_) => "text",
            RuntimeValue::List(_) => "list",
            RuntimeValue::Record(_) => "record",
            RuntimeValue::Function { .. } => "function",
        }
    }

    /// Record field lookup by key; first match wins.
    pub fn field(&self, name: &str) -> Option<&RuntimeValue> {
        match self {
            RuntimeValue::Record(entries) => entries
                .iter()
                .find(|(k, _)| k == name)
                .map(|(_, v)| v),
            _ => None,
        }
    }
}

impl fmt::Display for RuntimeValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RuntimeValue::Number(n) => {
                if n.is_finite() && *n == n.floor() && n.abs() < 1e15 {
                    write!(f, "{}", *n as i64)
                } else {
                    write!(f, "{}", n)
                }
            }
            RuntimeValue::Boolean(b) => write!(f, "{}", b),
            RuntimeValue::Text(s) => write!(f, "{}", s),
            RuntimeValue::List(items) => {
                write!(f, "[")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", item)?;
                }
                write!(f, "]")
            }
            RuntimeValue::Record(entries) => {
                write!(f, "{{")?;
                for (i, (k, v)) in entries.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}: {}", k, v)?;
                }
                write!(f, "}}")
            }
            RuntimeValue::Function { params, .. } => {
                write!(f, "fn({})", params.join(", "))
            }
        }
    }
}

impl PartialEq for RuntimeValue {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (RuntimeValue::Number(a), RuntimeValue::Number(b)) => a == b, // NaN != NaN per IEEE 754
            (RuntimeValue::Boolean(a), RuntimeValue::Boolean(b)) => a == b,
            (RuntimeValue::Text(a), RuntimeValue::Text(b)) => a == b,
            (RuntimeValue::List(a), RuntimeValue::List(b)) => a == b,
            (RuntimeValue::Record(a), RuntimeValue::Record(b)) => a == b,
            // Functions have no useful equality
            _ => false,
        }
    }
}

impl From<i64> for RuntimeValue {
    fn from(n: i64) -> Self {
        RuntimeValue::Number(n as f64)
    }
}

impl From<String> for RuntimeValue {
    fn from(s: String) -> Self {
        RuntimeValue::Text(s)
    }
}
