use std::path::PathBuf;

use macron::block::Macro;
use macron::error::{MacroError, MacroErrorKind};
use macron::range::{self, RangeSpec};
use macron::template::{self, TokenRecord};
use macron::{Extraction, script};

use crate::environment::Environment;
use crate::error::DiagnosticError;
use crate::evaluator::{call_function, run_script};
use crate::runtime_value::RuntimeValue;
use crate::ScriptContext;

/// Run one macro's header script and instantiate its body template, returning
/// the generated lines. Macros that never opened a body produce nothing; the
/// header is not executed either.
pub fn run_macro(
    mac: &Macro,
    ctx: &mut ScriptContext,
    file_id: usize,
) -> Result<Vec<String>, MacroError> {
    let Some(body) = &mac.body else {
        return Ok(Vec::new());
    };

    let source = mac.header_source();
    let script = script::parse(&source, file_id)
        .map_err(|e| e.rebase_span(mac.header_offset))?;

    let mut env = Environment::new();
    env.set_variable(
        "DIR",
        RuntimeValue::Text(ctx.base_dir().display().to_string()),
    );
    run_script(&script, &mut env, ctx, 0)
        .map_err(|e| script_error(e, mac.header_offset, file_id))?;

    let tokens_fn = match env.get_variable("TOKENS") {
        Some(f @ RuntimeValue::Function { .. }) => f.clone(),
        Some(other) => {
            return Err(MacroError::new(
                MacroErrorKind::GeneratorFailure,
                format!("'TOKENS' must be a function, got {}", other.type_name()),
            ));
        }
        None => {
            return Err(MacroError::new(
                MacroErrorKind::GeneratorFailure,
                "header script did not define 'TOKENS'",
            ));
        }
    };
    let range_values = match env.get_variable("RANGES") {
        Some(RuntimeValue::List(items)) => items.clone(),
        Some(other) => {
            return Err(MacroError::new(
                MacroErrorKind::GeneratorFailure,
                format!("'RANGES' must be a list, got {}", other.type_name()),
            ));
        }
        None => {
            return Err(MacroError::new(
                MacroErrorKind::GeneratorFailure,
                "header script did not define 'RANGES'",
            ));
        }
    };

    let mut expanded = Vec::with_capacity(range_values.len());
    for value in &range_values {
        expanded.push(range::expand(classify_range(value)?)?);
    }
    let tuples = range::combine(&expanded);

    let mut records: Vec<TokenRecord> = Vec::new();
    for tuple in tuples {
        let result = call_function(&tokens_fn, tuple, &mut env, ctx, 0, &(0..0))
            .map_err(|e| script_error(e, mac.header_offset, file_id))?;
        collect_records(result, &mut records)?;
    }

    Ok(template::substitute(&records, body))
}

/// Expand a whole document: run each macro in registration order and splice
/// its output over the placeholder line in the residual document. Macros
/// whose placeholder never made it into the residual are skipped.
pub fn expand_document(
    extraction: &Extraction,
    script_dir: PathBuf,
) -> Result<Vec<String>, MacroError> {
    let mut ctx = ScriptContext::new(script_dir);
    let mut residual = extraction.residual.clone();

    for (index, mac) in extraction.macros.iter().enumerate() {
        let placeholder = Macro::placeholder(index);
        let Some(pos) = residual.iter().position(|line| *line == placeholder) else {
            continue;
        };
        let lines = run_macro(mac, &mut ctx, extraction.source_id)?;
        residual.splice(pos..pos + 1, lines);
    }

    Ok(residual)
}

/// Classify a `RANGES` element into one of the four recognized shapes, in
/// precedence order: `each`, then `keys`, then `from`/`to`, then `values`.
fn classify_range(value: &RuntimeValue) -> Result<RangeSpec<RuntimeValue>, MacroError> {
    let RuntimeValue::Record(_) = value else {
        return Err(bad_range(format!(
            "range must be a record, got {}",
            value.type_name()
        )));
    };

    if let Some(each) = value.field("each") {
        return match each {
            RuntimeValue::Record(entries) => Ok(RangeSpec::Each(entries.clone())),
            other => Err(bad_range(format!(
                "'each' must be a record, got {}",
                other.type_name()
            ))),
        };
    }

    if let Some(keys) = value.field("keys") {
        return match keys {
            RuntimeValue::Record(entries) => Ok(RangeSpec::Keys(entries.clone())),
            other => Err(bad_range(format!(
                "'keys' must be a record, got {}",
                other.type_name()
            ))),
        };
    }

    if let (Some(from), Some(to)) = (value.field("from"), value.field("to")) {
        let from = integer_bound(from, "from")?;
        let to = integer_bound(to, "to")?;
        return Ok(RangeSpec::Interval { from, to });
    }

    if let Some(values) = value.field("values") {
        return match values {
            RuntimeValue::List(items) => Ok(RangeSpec::Values(items.clone())),
            other => Err(bad_range(format!(
                "'values' must be a list, got {}",
                other.type_name()
            ))),
        };
    }

    Err(bad_range(format!(
        "range defines none of 'each', 'keys', 'from'/'to', or 'values': {}",
        value
    )))
}

fn integer_bound(value: &RuntimeValue, field: &str) -> Result<i64, MacroError> {
    match value {
        RuntimeValue::Number(n) if n.is_finite() && *n == n.floor() => Ok(*n as i64),
        other => Err(bad_range(format!(
            "'{}' must be an integer, got {}",
            field, other
        ))),
    }
}

fn bad_range(details: String) -> MacroError {
    MacroError::new(MacroErrorKind::BadRangeFormat, details)
}

/// A `TOKENS` call yields one token record, or a list of records (possibly
/// empty, which skips the tuple entirely).
fn collect_records(
    result: RuntimeValue,
    records: &mut Vec<TokenRecord>,
) -> Result<(), MacroError> {
    match result {
        RuntimeValue::Record(entries) => {
            records.push(flatten_record(entries));
            Ok(())
        }
        RuntimeValue::List(items) => {
            for item in items {
                match item {
                    RuntimeValue::Record(entries) => records.push(flatten_record(entries)),
                    other => {
                        return Err(MacroError::new(
                            MacroErrorKind::GeneratorFailure,
                            format!(
                                "'TOKENS' returned a list containing {}, expected records",
                                other.type_name()
                            ),
                        ));
                    }
                }
            }
            Ok(())
        }
        other => Err(MacroError::new(
            MacroErrorKind::GeneratorFailure,
            format!(
                "'TOKENS' must return a record or list of records, got {}",
                other.type_name()
            ),
        )),
    }
}

fn flatten_record(entries: Vec<(String, RuntimeValue)>) -> TokenRecord {
    entries
        .into_iter()
        .map(|(k, v)| (k, v.to_string()))
        .collect()
}

fn script_error(err: DiagnosticError, offset: usize, file_id: usize) -> MacroError {
    let mut out = MacroError::new(MacroErrorKind::GeneratorFailure, err.error.to_string());
    if let Some(span) = err.span {
        out = out.with_span(span.start + offset..span.end + offset, file_id);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use macron::extract::extract;

    fn run(source: &str) -> Vec<String> {
        let extraction = extract(source, 0).expect("extract failed");
        expand_document(&extraction, PathBuf::from(".")).expect("expansion failed")
    }

    fn run_err(source: &str) -> MacroError {
        let extraction = extract(source, 0).expect("extract failed");
        expand_document(&extraction, PathBuf::from(".")).expect_err("expected failure")
    }

    #[test]
    fn expands_interval_over_template() {
        let out = run(&[
            "/* MACRO.HEADER n */",
            "RANGES = [ { from: 1, to: 3 } ]",
            "TOKENS = fn(i) { n: i }",
            "/* MACRO.HEADER n */",
            "/* MACRO.BODY n */",
            "v%n%",
            "/* MACRO.BODY n */",
        ]
        .join("\n"));
        assert_eq!(out, vec!["v1", "v2", "v3"]);
    }

    #[test]
    fn combines_two_ranges_last_fastest() {
        let out = run(&[
            "/* MACRO.HEADER m */",
            "RANGES = [ { values: [ \"a\", \"b\" ] }, { from: 1, to: 2 } ]",
            "TOKENS = fn(c, i) { c: c, i: i }",
            "/* MACRO.HEADER m */",
            "/* MACRO.BODY m */",
            "%c%%i%",
            "/* MACRO.BODY m */",
        ]
        .join("\n"));
        assert_eq!(out, vec!["a1", "a2", "b1", "b2"]);
    }

    #[test]
    fn tokens_may_skip_tuples_with_empty_list() {
        let out = run(&[
            "/* MACRO.HEADER m */",
            "RANGES = [ { from: 1, to: 3 } ]",
            "TOKENS = fn(i) i == 2 ? [] : [ { n: i } ]",
            "/* MACRO.HEADER m */",
            "/* MACRO.BODY m */",
            "v%n%",
            "/* MACRO.BODY m */",
        ]
        .join("\n"));
        assert_eq!(out, vec!["v1", "v3"]);
    }

    #[test]
    fn bodyless_macro_never_runs() {
        // A header block that closes without a body contributes nothing.
        let out = run(&[
            "keep",
            "/* MACRO.HEADER m */",
            "RANGES = [ { from: 1, to: 2 } ]",
            "TOKENS = fn(i) { n: i }",
            "/* MACRO.HEADER m */",
            "also keep",
        ]
        .join("\n"));
        assert_eq!(out, vec!["keep", "also keep"]);
    }

    #[test]
    fn missing_tokens_fails() {
        let err = run_err(&[
            "/* MACRO.HEADER m */",
            "RANGES = [ { from: 1, to: 2 } ]",
            "/* MACRO.HEADER m */",
            "/* MACRO.BODY m */",
            "x",
            "/* MACRO.BODY m */",
        ]
        .join("\n"));
        assert_eq!(err.kind, MacroErrorKind::GeneratorFailure);
        assert!(err.details.contains("TOKENS"));
    }

    #[test]
    fn backwards_interval_fails() {
        let err = run_err(&[
            "/* MACRO.HEADER m */",
            "RANGES = [ { from: 5, to: 1 } ]",
            "TOKENS = fn(i) { n: i }",
            "/* MACRO.HEADER m */",
            "/* MACRO.BODY m */",
            "x",
            "/* MACRO.BODY m */",
        ]
        .join("\n"));
        assert_eq!(err.kind, MacroErrorKind::BadInterval);
    }

    #[test]
    fn unrecognized_range_shape_fails() {
        let err = run_err(&[
            "/* MACRO.HEADER m */",
            "RANGES = [ { count: 3 } ]",
            "TOKENS = fn(i) { n: i }",
            "/* MACRO.HEADER m */",
            "/* MACRO.BODY m */",
            "x",
            "/* MACRO.BODY m */",
        ]
        .join("\n"));
        assert_eq!(err.kind, MacroErrorKind::BadRangeFormat);
    }

    #[test]
    fn script_errors_carry_document_spans() {
        let source = [
            "/* MACRO.HEADER m */",
            "RANGES = oops",
            "TOKENS = fn(i) { n: i }",
            "/* MACRO.HEADER m */",
            "/* MACRO.BODY m */",
            "x",
            "/* MACRO.BODY m */",
        ]
        .join("\n");
        let err = run_err(&source);
        assert_eq!(err.kind, MacroErrorKind::GeneratorFailure);
        let span = err.span.expect("expected a span");
        assert_eq!(&source[span], "oops");
    }
}
