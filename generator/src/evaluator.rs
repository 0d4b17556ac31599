use std::collections::HashMap;
use std::ops::Range;
use std::path::PathBuf;

use macron::script::expr::{BinaryOperator, Expr, TextPart, UnaryOperator};
use macron::script::{Script, Statement};

use crate::environment::{Environment, Scope};
use crate::error::{DiagnosticError, RuntimeError};
use crate::runtime_value::RuntimeValue;

const MAX_DEPTH: usize = 256;

/// Shared evaluation context: the directory scripts resolve `load()` paths
/// against, and a cache of already-loaded script files keyed by canonical
/// path.
pub struct ScriptContext {
    base_dir: PathBuf,
    load_cache: HashMap<PathBuf, RuntimeValue>,
}

impl ScriptContext {
    pub fn new(base_dir: PathBuf) -> Self {
        ScriptContext {
            base_dir,
            load_cache: HashMap::new(),
        }
    }

    pub fn base_dir(&self) -> &PathBuf {
        &self.base_dir
    }
}

/// Run a script's statements against an environment. Errors pick up the
/// statement's span when the failing expression carries none of its own.
/// `depth` is inherited by every statement's evaluation, so a script run on
/// behalf of `load()` keeps counting against the caller's recursion budget.
pub fn run_script(
    script: &Script,
    env: &mut Environment,
    ctx: &mut ScriptContext,
    depth: usize,
) -> Result<(), DiagnosticError> {
    for statement in &script.statements {
        let result = match statement {
            Statement::Assignment { variable, value, .. } => {
                let value = evaluate(value, env, ctx, depth)?;
                env.set_variable(variable, value);
                Ok(())
            }
            Statement::Expression { value, .. } => {
                evaluate(value, env, ctx, depth).map(|_| ())
            }
        };
        result.map_err(|mut err| {
            if err.span.is_none() {
                err.span = Some(statement.span().clone());
            }
            err
        })?;
    }
    Ok(())
}

/// Evaluate an expression to produce a RuntimeValue.
pub fn evaluate(
    expr: &Expr,
    env: &mut Environment,
    ctx: &mut ScriptContext,
    depth: usize,
) -> Result<RuntimeValue, DiagnosticError> {
    if depth > MAX_DEPTH {
        return Err(RuntimeError::StackOverflow.into());
    }

    match expr {
        // --- Literals ---
        Expr::NumberLiteral(n) => Ok(RuntimeValue::Number(*n)),
        Expr::BooleanLiteral(b) => Ok(RuntimeValue::Boolean(*b)),

        Expr::TextLiteral(text) => {
            let mut result = String::new();
            for part in &text.parts {
                match part {
                    TextPart::Literal(s) => result.push_str(s),
                    TextPart::Expression(inner) => {
                        let val = evaluate(inner, env, ctx, depth + 1)?;
                        result.push_str(&val.to_string());
                    }
                }
            }
            Ok(RuntimeValue::Text(result))
        }

        Expr::ListLiteral(items) => {
            let mut values = Vec::with_capacity(items.len());
            for item in items {
                values.push(evaluate(item, env, ctx, depth + 1)?);
            }
            Ok(RuntimeValue::List(values))
        }

        Expr::RecordLiteral(entries) => {
            let mut values = Vec::with_capacity(entries.len());
            for (key, value) in entries {
                values.push((key.clone(), evaluate(value, env, ctx, depth + 1)?));
            }
            Ok(RuntimeValue::Record(values))
        }

        // --- References ---
        Expr::Variable(name, span) => env
            .get_variable(name)
            .cloned()
            .ok_or_else(|| {
                DiagnosticError::at(
                    RuntimeError::UndefinedVariable(name.clone()),
                    span.clone(),
                )
            }),

        Expr::Lambda { params, body } => Ok(RuntimeValue::Function {
            params: params.clone(),
            body: (**body).clone(),
        }),

        // --- Application ---
        Expr::Call { callee, args, span } => {
            let mut arg_values = Vec::with_capacity(args.len());
            for arg in args {
                arg_values.push(evaluate(arg, env, ctx, depth + 1)?);
            }

            // A name that is not bound in any scope may still be a builtin.
            if let Expr::Variable(name, name_span) = callee.as_ref() {
                if env.get_variable(name).is_none() {
                    return call_builtin(name, arg_values, env, ctx, depth, name_span)
                        .map_err(|mut err| {
                            if err.span.is_none() {
                                err.span = Some(span.clone());
                            }
                            err
                        });
                }
            }

            let callee_value = evaluate(callee, env, ctx, depth + 1)?;
            call_function(&callee_value, arg_values, env, ctx, depth, span)
        }

        Expr::Index { target, index, span } => {
            let target_value = evaluate(target, env, ctx, depth + 1)?;
            let index_value = evaluate(index, env, ctx, depth + 1)?;
            match (&target_value, &index_value) {
                (RuntimeValue::List(items), RuntimeValue::Number(n)) => {
                    let idx = *n as i64;
                    if idx < 0 || idx as usize >= items.len() {
                        return Err(DiagnosticError::at(
                            RuntimeError::IndexOutOfBounds(idx),
                            span.clone(),
                        ));
                    }
                    Ok(items[idx as usize].clone())
                }
                (RuntimeValue::Record(_), RuntimeValue::Text(key)) => target_value
                    .field(key)
                    .cloned()
                    .ok_or_else(|| {
                        DiagnosticError::at(
                            RuntimeError::UnknownField(key.clone()),
                            span.clone(),
                        )
                    }),
                _ => Err(DiagnosticError::at(
                    RuntimeError::TypeError {
                        expected: "list[number] or record[text]".to_string(),
                        got: format!(
                            "{}[{}]",
                            target_value.type_name(),
                            index_value.type_name()
                        ),
                    },
                    span.clone(),
                )),
            }
        }

        Expr::Field { target, name, span } => {
            let target_value = evaluate(target, env, ctx, depth + 1)?;
            match &target_value {
                RuntimeValue::Record(_) => target_value.field(name).cloned().ok_or_else(|| {
                    DiagnosticError::at(RuntimeError::UnknownField(name.clone()), span.clone())
                }),
                other => Err(DiagnosticError::at(
                    RuntimeError::TypeError {
                        expected: "record".to_string(),
                        got: other.type_name().to_string(),
                    },
                    span.clone(),
                )),
            }
        }

        // --- Operations ---
        Expr::Unary { operator, operand } => {
            let val = evaluate(operand, env, ctx, depth + 1)?;
            match operator {
                UnaryOperator::Negation => {
                    let n = coerce_number(&val)?;
                    Ok(RuntimeValue::Number(-n))
                }
                UnaryOperator::LogicalNot => Ok(RuntimeValue::Boolean(!val.is_truthy())),
            }
        }

        Expr::Binary { operator, left, right } => {
            let l = evaluate(left, env, ctx, depth + 1)?;
            let r = evaluate(right, env, ctx, depth + 1)?;
            Ok(eval_binary_op(operator, &l, &r)?)
        }

        Expr::Conditional {
            condition,
            true_branch,
            false_branch,
        } => {
            let cond = evaluate(condition, env, ctx, depth + 1)?;
            if cond.is_truthy() {
                evaluate(true_branch, env, ctx, depth + 1)
            } else {
                evaluate(false_branch, env, ctx, depth + 1)
            }
        }
    }
}

/// Apply a function value to already-evaluated arguments. The body runs in a
/// fresh scope pushed on the caller's stack, so it sees the caller's bindings.
pub fn call_function(
    callee: &RuntimeValue,
    args: Vec<RuntimeValue>,
    env: &mut Environment,
    ctx: &mut ScriptContext,
    depth: usize,
    span: &Range<usize>,
) -> Result<RuntimeValue, DiagnosticError> {
    let RuntimeValue::Function { params, body } = callee else {
        return Err(DiagnosticError::at(
            RuntimeError::TypeError {
                expected: "function".to_string(),
                got: callee.type_name().to_string(),
            },
            span.clone(),
        ));
    };

    if params.len() != args.len() {
        return Err(DiagnosticError::at(
            RuntimeError::ArityMismatch {
                expected: params.len(),
                got: args.len(),
            },
            span.clone(),
        ));
    }

    let mut scope = Scope::new();
    for (param, arg) in params.iter().zip(args) {
        scope.set_variable(param, arg);
    }
    env.push_scope(scope);
    let result = evaluate(body, env, ctx, depth + 1);
    let _ = env.pop_scope();
    result
}

// ---------------------------------------------------------------------------
// Builtins
// ---------------------------------------------------------------------------

fn call_builtin(
    name: &str,
    mut args: Vec<RuntimeValue>,
    env: &mut Environment,
    ctx: &mut ScriptContext,
    depth: usize,
    span: &Range<usize>,
) -> Result<RuntimeValue, DiagnosticError> {
    let arity = |expected: usize, args: &[RuntimeValue]| -> Result<(), DiagnosticError> {
        if args.len() != expected {
            Err(DiagnosticError::at(
                RuntimeError::ArityMismatch {
                    expected,
                    got: args.len(),
                },
                span.clone(),
            ))
        } else {
            Ok(())
        }
    };

    match name {
        "keys" => {
            arity(1, &args)?;
            let entries = coerce_record(&args[0])?;
            Ok(RuntimeValue::List(
                entries
                    .iter()
                    .map(|(k, _)| RuntimeValue::Text(k.clone()))
                    .collect(),
            ))
        }

        "entries" => {
            arity(1, &args)?;
            let entries = coerce_record(&args[0])?;
            Ok(RuntimeValue::List(
                entries
                    .iter()
                    .map(|(k, v)| {
                        RuntimeValue::Record(vec![
                            ("key".to_string(), RuntimeValue::Text(k.clone())),
                            ("value".to_string(), v.clone()),
                        ])
                    })
                    .collect(),
            ))
        }

        "map" => {
            arity(2, &args)?;
            let f = args.pop().unwrap_or(RuntimeValue::Boolean(false));
            let list = match args.pop() {
                Some(RuntimeValue::List(items)) => items,
                Some(other) => {
                    return Err(RuntimeError::TypeError {
                        expected: "list".to_string(),
                        got: other.type_name().to_string(),
                    }
                    .into());
                }
                None => Vec::new(),
            };
            let mut out = Vec::with_capacity(list.len());
            for item in list {
                out.push(call_function(&f, vec![item], env, ctx, depth + 1, span)?);
            }
            Ok(RuntimeValue::List(out))
        }

        "len" => {
            arity(1, &args)?;
            let n = match &args[0] {
                RuntimeValue::List(items) => items.len(),
                RuntimeValue::Record(entries) => entries.len(),
                RuntimeValue::Text(s) => s.chars().count(),
                other => {
                    return Err(RuntimeError::TypeError {
                        expected: "list, record, or text".to_string(),
                        got: other.type_name().to_string(),
                    }
                    .into());
                }
            };
            Ok(RuntimeValue::Number(n as f64))
        }

        "str" => {
            arity(1, &args)?;
            Ok(RuntimeValue::Text(args[0].to_string()))
        }

        "typeof" => {
            arity(1, &args)?;
            Ok(RuntimeValue::Text(args[0].type_name().to_string()))
        }

        "upper" => {
            arity(1, &args)?;
            Ok(RuntimeValue::Text(coerce_text(&args[0])?.to_uppercase()))
        }

        "lower" => {
            arity(1, &args)?;
            Ok(RuntimeValue::Text(coerce_text(&args[0])?.to_lowercase()))
        }

        "capitalize" => {
            arity(1, &args)?;
            let s = coerce_text(&args[0])?;
            let mut chars = s.chars();
            let capitalized = match chars.next() {
                Some(first) => first.to_uppercase().collect::<String>() + chars.as_str(),
                None => String::new(),
            };
            Ok(RuntimeValue::Text(capitalized))
        }

        "load" => {
            arity(1, &args)?;
            let path = coerce_text(&args[0])?.to_string();
            load_script(ctx, &path, depth)
        }

        _ => Err(DiagnosticError::at(
            RuntimeError::UndefinedVariable(name.to_string()),
            span.clone(),
        )),
    }
}

/// Run another script file and return its top-level bindings as a record,
/// keys sorted. Results are cached per canonical path, so a file shared by
/// several generators runs once.
fn load_script(
    ctx: &mut ScriptContext,
    path: &str,
    depth: usize,
) -> Result<RuntimeValue, DiagnosticError> {
    if depth > MAX_DEPTH {
        return Err(RuntimeError::StackOverflow.into());
    }

    let resolved = ctx.base_dir.join(path);
    let canonical = resolved
        .canonicalize()
        .map_err(|e| RuntimeError::IoError(format!("cannot resolve '{}': {}", path, e)))?;

    if let Some(cached) = ctx.load_cache.get(&canonical) {
        return Ok(cached.clone());
    }

    let source = std::fs::read_to_string(&canonical)
        .map_err(|e| RuntimeError::IoError(format!("cannot read '{}': {}", path, e)))?;

    let script = macron::script::parse(&source, 0).map_err(|e| {
        RuntimeError::Custom(format!("parse error in '{}': {}", path, e.details))
    })?;

    let mut env = Environment::new();
    env.set_variable("DIR", dir_value(&canonical));
    run_script(&script, &mut env, ctx, depth + 1).map_err(|e| {
        RuntimeError::Custom(format!("error in '{}': {}", path, e.error))
    })?;

    let mut entries: Vec<(String, RuntimeValue)> =
        env.into_root_bindings().into_iter().collect();
    entries.sort_by(|(a, _), (b, _)| a.cmp(b));
    let record = RuntimeValue::Record(entries);

    ctx.load_cache.insert(canonical, record.clone());
    Ok(record)
}

/// The `DIR` binding for a script: the directory of the file it came from.
pub fn dir_value(script_path: &std::path::Path) -> RuntimeValue {
    let dir = script_path
        .parent()
        .map(|p| p.display().to_string())
        .unwrap_or_default();
    RuntimeValue::Text(dir)
}

// ---------------------------------------------------------------------------
// Coercions and operators
// ---------------------------------------------------------------------------

fn coerce_number(val: &RuntimeValue) -> Result<f64, RuntimeError> {
    match val {
        RuntimeValue::Number(n) => Ok(*n),
        other => Err(RuntimeError::TypeError {
            expected: "number".to_string(),
            got: other.type_name().to_string(),
        }),
    }
}

fn coerce_text(val: &RuntimeValue) -> Result<&str, RuntimeError> {
    match val {
        RuntimeValue::Text(s) => Ok(s),
        other => Err(RuntimeError::TypeError {
            expected: "text".to_string(),
            got: other.type_name().to_string(),
        }),
    }
}

fn coerce_record(val: &RuntimeValue) -> Result<&[(String, RuntimeValue)], RuntimeError> {
    match val {
        RuntimeValue::Record(entries) => Ok(entries),
        other => Err(RuntimeError::TypeError {
            expected: "record".to_string(),
            got: other.type_name().to_string(),
        }),
    }
}

fn eval_binary_op(
    op: &BinaryOperator,
    left: &RuntimeValue,
    right: &RuntimeValue,
) -> Result<RuntimeValue, RuntimeError> {
    match op {
        BinaryOperator::Addition => match (left, right) {
            (RuntimeValue::Number(a), RuntimeValue::Number(b)) => {
                Ok(RuntimeValue::Number(a + b))
            }
            (RuntimeValue::Text(a), RuntimeValue::Text(b)) => {
                Ok(RuntimeValue::Text(format!("{}{}", a, b)))
            }
            (RuntimeValue::List(a), RuntimeValue::List(b)) => {
                let mut joined = a.clone();
                joined.extend(b.iter().cloned());
                Ok(RuntimeValue::List(joined))
            }
            _ => Err(RuntimeError::TypeError {
                expected: "matching numeric, text, or list types".to_string(),
                got: format!("{} + {}", left.type_name(), right.type_name()),
            }),
        },
        BinaryOperator::Subtraction => numeric_binop(left, right, |a, b| a - b),
        BinaryOperator::Multiplication => numeric_binop(left, right, |a, b| a * b),
        BinaryOperator::Division => {
            let a = coerce_number(left)?;
            let b = coerce_number(right)?;
            if b == 0.0 {
                return Err(RuntimeError::DivisionByZero);
            }
            Ok(RuntimeValue::Number(a / b))
        }
        BinaryOperator::Modulo => {
            let a = coerce_number(left)?;
            let b = coerce_number(right)?;
            if b == 0.0 {
                return Err(RuntimeError::DivisionByZero);
            }
            Ok(RuntimeValue::Number(a % b))
        }
        BinaryOperator::Equality => Ok(RuntimeValue::Boolean(left == right)),
        BinaryOperator::Inequality => Ok(RuntimeValue::Boolean(left != right)),
        BinaryOperator::GreaterThan => numeric_cmp(left, right, |a, b| a > b),
        BinaryOperator::LessThan => numeric_cmp(left, right, |a, b| a < b),
        BinaryOperator::GreaterThanOrEqual => numeric_cmp(left, right, |a, b| a >= b),
        BinaryOperator::LessThanOrEqual => numeric_cmp(left, right, |a, b| a <= b),
        BinaryOperator::LogicalAnd => {
            Ok(RuntimeValue::Boolean(left.is_truthy() && right.is_truthy()))
        }
        BinaryOperator::LogicalOr => {
            Ok(RuntimeValue::Boolean(left.is_truthy() || right.is_truthy()))
        }
    }
}

fn numeric_binop(
    left: &RuntimeValue,
    right: &RuntimeValue,
    f: impl Fn(f64, f64) -> f64,
) -> Result<RuntimeValue, RuntimeError> {
    let a = coerce_number(left)?;
    let b = coerce_number(right)?;
    Ok(RuntimeValue::Number(f(a, b)))
}

fn numeric_cmp(
    left: &RuntimeValue,
    right: &RuntimeValue,
    f: impl Fn(f64, f64) -> bool,
) -> Result<RuntimeValue, RuntimeError> {
    let a = coerce_number(left)?;
    let b = coerce_number(right)?;
    Ok(RuntimeValue::Boolean(f(a, b)))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn eval(source: &str) -> RuntimeValue {
        let script = macron::script::parse(source, 0).expect("parse failed");
        let mut env = Environment::new();
        let mut ctx = ScriptContext::new(PathBuf::from("."));
        run_script(&script, &mut env, &mut ctx, 0).expect("run failed");
        env.get_variable("out").expect("no 'out' binding").clone()
    }

    fn eval_err(source: &str) -> RuntimeError {
        let script = macron::script::parse(source, 0).expect("parse failed");
        let mut env = Environment::new();
        let mut ctx = ScriptContext::new(PathBuf::from("."));
        run_script(&script, &mut env, &mut ctx, 0)
            .expect_err("expected failure")
            .error
    }

    #[test]
    fn arithmetic() {
        assert_eq!(eval("out = 2 + 3 * 4"), RuntimeValue::Number(14.0));
        assert_eq!(eval("out = (2 + 3) * 4"), RuntimeValue::Number(20.0));
        assert_eq!(eval("out = 10 % 3"), RuntimeValue::Number(1.0));
        assert_eq!(eval("out = -5 + 10"), RuntimeValue::Number(5.0));
    }

    #[test]
    fn division_by_zero() {
        assert!(matches!(eval_err("out = 1 / 0"), RuntimeError::DivisionByZero));
    }

    #[test]
    fn variables_chain_across_statements() {
        assert_eq!(
            eval("x = 5\ny = x * 2\nout = x + y"),
            RuntimeValue::Number(15.0)
        );
    }

    #[test]
    fn text_concatenation_and_interpolation() {
        assert_eq!(
            eval("name = \"vec\"\nout = \"get\" + upper(name)"),
            RuntimeValue::Text("getVEC".into())
        );
        assert_eq!(
            eval("n = 3\nout = \"v{n + 1}\""),
            RuntimeValue::Text("v4".into())
        );
    }

    #[test]
    fn conditional_and_comparison() {
        assert_eq!(
            eval("out = 3 > 2 ? \"yes\" : \"no\""),
            RuntimeValue::Text("yes".into())
        );
        assert_eq!(eval("out = !(1 == 1)"), RuntimeValue::Boolean(false));
    }

    #[test]
    fn function_application() {
        assert_eq!(
            eval("double = fn(x) x * 2\nout = double(21)"),
            RuntimeValue::Number(42.0)
        );
    }

    #[test]
    fn function_sees_caller_bindings() {
        assert_eq!(
            eval("base = 10\nadd = fn(x) base + x\nout = add(5)"),
            RuntimeValue::Number(15.0)
        );
    }

    #[test]
    fn arity_is_checked() {
        assert!(matches!(
            eval_err("f = fn(a, b) a + b\nout = f(1)"),
            RuntimeError::ArityMismatch { expected: 2, got: 1 }
        ));
    }

    #[test]
    fn list_indexing_and_len() {
        assert_eq!(eval("out = [10, 20, 30][1]"), RuntimeValue::Number(20.0));
        assert_eq!(eval("out = len([1, 2, 3])"), RuntimeValue::Number(3.0));
        assert!(matches!(
            eval_err("out = [1][5]"),
            RuntimeError::IndexOutOfBounds(5)
        ));
    }

    #[test]
    fn record_access() {
        assert_eq!(
            eval("r = { a: 1, b: 2 }\nout = r.b"),
            RuntimeValue::Number(2.0)
        );
        assert_eq!(
            eval("r = { a: 1 }\nout = r[\"a\"]"),
            RuntimeValue::Number(1.0)
        );
        assert!(matches!(
            eval_err("r = { a: 1 }\nout = r.missing"),
            RuntimeError::UnknownField(_)
        ));
    }

    #[test]
    fn keys_and_entries_preserve_order() {
        assert_eq!(
            eval("out = keys({ b: 1, a: 2 })"),
            RuntimeValue::List(vec![
                RuntimeValue::Text("b".into()),
                RuntimeValue::Text("a".into())
            ])
        );
        assert_eq!(
            eval("out = entries({ x: 7 })[0].value"),
            RuntimeValue::Number(7.0)
        );
    }

    #[test]
    fn map_applies_function() {
        assert_eq!(
            eval("out = map([1, 2, 3], fn(x) x * x)"),
            RuntimeValue::List(vec![
                RuntimeValue::Number(1.0),
                RuntimeValue::Number(4.0),
                RuntimeValue::Number(9.0)
            ])
        );
    }

    #[test]
    fn string_builtins() {
        assert_eq!(eval("out = upper(\"abc\")"), RuntimeValue::Text("ABC".into()));
        assert_eq!(eval("out = lower(\"ABC\")"), RuntimeValue::Text("abc".into()));
        assert_eq!(
            eval("out = capitalize(\"vector\")"),
            RuntimeValue::Text("Vector".into())
        );
        assert_eq!(eval("out = str(42)"), RuntimeValue::Text("42".into()));
        assert_eq!(eval("out = typeof([])"), RuntimeValue::Text("list".into()));
    }

    #[test]
    fn bindings_shadow_builtins() {
        assert_eq!(
            eval("upper = fn(s) s\nout = upper(\"abc\")"),
            RuntimeValue::Text("abc".into())
        );
    }

    #[test]
    fn undefined_variable_reports_its_name() {
        assert!(matches!(
            eval_err("out = missing + 1"),
            RuntimeError::UndefinedVariable(name) if name == "missing"
        ));
    }

    #[test]
    fn deep_recursion_overflows() {
        assert!(matches!(
            eval_err("f = fn(x) f(x)\nout = f(1)"),
            RuntimeError::StackOverflow
        ));
    }
}
