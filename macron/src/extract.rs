use crate::Extraction;
use crate::block::Macro;
use crate::error::{MacroError, MacroErrorKind};
use crate::pattern::{self, PatternKind, PatternMatch};

/// Extractor state. `InBody` holds an index into the registered macro list
/// rather than a reference; a macro is registered the moment its header
/// closes, even though its body may still be filled in later.
enum State {
    Idle,
    InHeader(Macro),
    InBody(usize),
}

/// Walk the document line by line, collecting macros and producing the
/// residual document with each captured block replaced by one placeholder.
///
/// State machine:
/// - Idle: plain lines pass through; a header start opens a new macro; a body
///   start attaches to an existing macro (by name, or the most recent one);
///   a bare `*/` is ordinary text.
/// - InHeader: plain lines accumulate; a header marker, body marker, or `*/`
///   closes the header (registering the macro); a body marker also opens the
///   body.
/// - InBody: plain lines accumulate; a body marker or `*/` closes the block
///   and emits the placeholder; a header marker closes the block and opens
///   the next macro in one step.
///
/// A document that ends mid-block is accepted silently; the open block is
/// discarded without a placeholder.
pub fn extract(source: &str, file_id: usize) -> Result<Extraction, MacroError> {
    let mut macros: Vec<Macro> = Vec::new();
    let mut residual: Vec<String> = Vec::new();
    let mut state = State::Idle;

    let mut offset = 0usize;
    for (index, line) in source.split('\n').enumerate() {
        let span = offset..offset + line.len();
        offset = span.end + 1;
        let row = index + 1;
        let event = pattern::match_line(line);

        state = match (state, event) {
            (State::Idle, None) => {
                residual.push(line.to_string());
                State::Idle
            }
            (State::Idle, Some(PatternMatch { kind: PatternKind::End, .. })) => {
                // Lenient: a stray end-of-comment with no open block is text.
                residual.push(line.to_string());
                State::Idle
            }
            (State::Idle, Some(PatternMatch { kind: PatternKind::HeaderStart, name })) => {
                check_unique_name(&macros, name.as_deref(), line, row, span, file_id)?;
                State::InHeader(Macro::new(name, offset))
            }
            (State::Idle, Some(PatternMatch { kind: PatternKind::BodyStart, name })) => {
                let index = match &name {
                    Some(name) => find_by_name(&macros, name).ok_or_else(|| {
                        MacroError::at_row(
                            MacroErrorKind::MacroNameNotFound,
                            format!("macro header not defined for '{}'", name),
                            line,
                            row,
                            span.clone(),
                            file_id,
                        )
                    })?,
                    None => {
                        if macros.is_empty() {
                            return Err(MacroError::at_row(
                                MacroErrorKind::MacroHeaderMissing,
                                "defining an unnamed macro body, but no previous macro header defined",
                                line,
                                row,
                                span,
                                file_id,
                            ));
                        }
                        macros.len() - 1
                    }
                };
                macros[index].body = Some(Vec::new());
                State::InBody(index)
            }

            (State::InHeader(mut mac), None) => {
                mac.header.push(line.to_string());
                State::InHeader(mac)
            }
            (State::InHeader(mac), Some(PatternMatch { kind: PatternKind::HeaderStart, name })) => {
                check_closing_name(&mac, name.as_deref(), line, row, span, file_id)?;
                macros.push(mac);
                State::Idle
            }
            (State::InHeader(mac), Some(PatternMatch { kind: PatternKind::End, .. })) => {
                macros.push(mac);
                State::Idle
            }
            (State::InHeader(mac), Some(PatternMatch { kind: PatternKind::BodyStart, name })) => {
                check_closing_name(&mac, name.as_deref(), line, row, span, file_id)?;
                macros.push(mac);
                let index = macros.len() - 1;
                macros[index].body = Some(Vec::new());
                State::InBody(index)
            }

            (State::InBody(index), None) => {
                if let Some(body) = macros[index].body.as_mut() {
                    body.push(line.to_string());
                }
                State::InBody(index)
            }
            (State::InBody(index), Some(PatternMatch { kind: PatternKind::BodyStart, name })) => {
                check_closing_name(&macros[index], name.as_deref(), line, row, span, file_id)?;
                residual.push(Macro::placeholder(index));
                State::Idle
            }
            (State::InBody(index), Some(PatternMatch { kind: PatternKind::End, .. })) => {
                residual.push(Macro::placeholder(index));
                State::Idle
            }
            (State::InBody(index), Some(PatternMatch { kind: PatternKind::HeaderStart, name })) => {
                check_unique_name(&macros, name.as_deref(), line, row, span, file_id)?;
                residual.push(Macro::placeholder(index));
                State::InHeader(Macro::new(name, offset))
            }
        };
    }

    Ok(Extraction {
        macros,
        residual,
        source_id: file_id,
    })
}

fn find_by_name(macros: &[Macro], name: &str) -> Option<usize> {
    macros
        .iter()
        .position(|m| m.name.as_deref() == Some(name))
}

fn check_unique_name(
    macros: &[Macro],
    name: Option<&str>,
    line: &str,
    row: usize,
    span: std::ops::Range<usize>,
    file_id: usize,
) -> Result<(), MacroError> {
    if let Some(name) = name {
        if find_by_name(macros, name).is_some() {
            return Err(MacroError::at_row(
                MacroErrorKind::DuplicateMacroName,
                format!("macro name '{}' already exists", name),
                line,
                row,
                span,
                file_id,
            ));
        }
    }
    Ok(())
}

/// A closing marker may carry a name; if it does, it must match the name the
/// block opened with.
fn check_closing_name(
    mac: &Macro,
    name: Option<&str>,
    line: &str,
    row: usize,
    span: std::ops::Range<usize>,
    file_id: usize,
) -> Result<(), MacroError> {
    if let Some(name) = name {
        if mac.name.as_deref() != Some(name) {
            return Err(MacroError::at_row(
                MacroErrorKind::MacroNameMismatch,
                format!(
                    "macro block starts as '{}', ends as '{}'",
                    mac.name.as_deref().unwrap_or("<unnamed>"),
                    name
                ),
                line,
                row,
                span,
                file_id,
            ));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lines(doc: &[&str]) -> String {
        doc.join("\n")
    }

    #[test]
    fn extracts_named_macros_in_sequential_order() {
        let source = lines(&[
            "class Vector {",
            "",
            "\t/* MACRO.HEADER 1 */",
            "\tRANGES = [ { values: [ 1, 2 ] } ]",
            "\tTOKENS = fn(v) { n: v }",
            "\t/* MACRO.HEADER 1 */",
            "\t/* MACRO.BODY 1 */",
            "\tget%n% () {}",
            "\t/* MACRO.BODY 1 */",
            "\t/* MACRO.HEADER 2 */",
            "\tRANGES = [ { values: [ 1 ] } ]",
            "\tTOKENS = fn(v) { n: v }",
            "\t/* MACRO.HEADER 2 */",
            "\t/* MACRO.BODY 2 */",
            "\tset%n% () {}",
            "\t/* MACRO.BODY 2 */",
            "}",
        ]);
        let res = extract(&source, 0).unwrap();
        assert_eq!(res.macros.len(), 2);
        assert_eq!(res.macros[0].name.as_deref(), Some("1"));
        assert_eq!(res.macros[1].name.as_deref(), Some("2"));
        assert_eq!(
            res.macros[0].header,
            vec![
                "\tRANGES = [ { values: [ 1, 2 ] } ]",
                "\tTOKENS = fn(v) { n: v }"
            ]
        );
        assert_eq!(
            res.macros[0].body.as_deref().unwrap(),
            ["\tget%n% () {}"]
        );
        assert_eq!(
            res.macros[1].body.as_deref().unwrap(),
            ["\tset%n% () {}"]
        );
        assert_eq!(
            res.residual,
            vec![
                "class Vector {",
                "",
                "<<< MACRO BODY 0 >>>",
                "<<< MACRO BODY 1 >>>",
                "}",
            ]
        );
    }

    #[test]
    fn unnamed_body_attaches_to_most_recent_macro() {
        let source = lines(&[
            "/* MACRO.HEADER */",
            "RANGES = [ { values: [ 1 ] } ]",
            "/* MACRO.HEADER */",
            "/* MACRO.BODY */",
            "a%n%",
            "/* MACRO.BODY */",
        ]);
        let res = extract(&source, 0).unwrap();
        assert_eq!(res.macros.len(), 1);
        assert_eq!(res.macros[0].name, None);
        assert_eq!(res.macros[0].body.as_deref().unwrap(), ["a%n%"]);
        assert_eq!(res.residual, vec!["<<< MACRO BODY 0 >>>"]);
    }

    #[test]
    fn open_comment_markers_close_with_bare_end() {
        let source = lines(&[
            "/* MACRO.HEADER x",
            "RANGES = [ { values: [ 1 ] } ]",
            "*/",
            "/* MACRO.BODY x",
            "line",
            "*/",
        ]);
        let res = extract(&source, 0).unwrap();
        assert_eq!(res.macros.len(), 1);
        assert_eq!(res.macros[0].name.as_deref(), Some("x"));
        assert_eq!(res.macros[0].body.as_deref().unwrap(), ["line"]);
    }

    #[test]
    fn headers_first_bodies_attach_by_name() {
        let source = lines(&[
            "/* MACRO.HEADER a */",
            "ha",
            "/* MACRO.HEADER a */",
            "/* MACRO.HEADER b */",
            "hb",
            "/* MACRO.HEADER b */",
            "/* MACRO.BODY b */",
            "body b",
            "/* MACRO.BODY b */",
            "/* MACRO.BODY a */",
            "body a",
            "/* MACRO.BODY a */",
        ]);
        let res = extract(&source, 0).unwrap();
        assert_eq!(res.macros.len(), 2);
        assert_eq!(res.macros[0].name.as_deref(), Some("a"));
        assert_eq!(res.macros[0].body.as_deref().unwrap(), ["body a"]);
        assert_eq!(res.macros[1].body.as_deref().unwrap(), ["body b"]);
        // Residual order follows document order: b's block first.
        assert_eq!(
            res.residual,
            vec!["<<< MACRO BODY 1 >>>", "<<< MACRO BODY 0 >>>"]
        );
    }

    #[test]
    fn body_closed_by_next_header() {
        let source = lines(&[
            "/* MACRO.HEADER a */",
            "ha",
            "/* MACRO.BODY a */",
            "body a",
            "/* MACRO.HEADER b */",
            "hb",
            "*/",
        ]);
        let res = extract(&source, 0).unwrap();
        assert_eq!(res.macros.len(), 2);
        assert_eq!(res.macros[0].body.as_deref().unwrap(), ["body a"]);
        assert_eq!(res.macros[1].name.as_deref(), Some("b"));
        assert_eq!(res.macros[1].body, None);
        assert_eq!(res.residual, vec!["<<< MACRO BODY 0 >>>"]);
    }

    #[test]
    fn stray_end_marker_passes_through() {
        let source = lines(&["text", "*/", "more"]);
        let res = extract(&source, 0).unwrap();
        assert!(res.macros.is_empty());
        assert_eq!(res.residual, vec!["text", "*/", "more"]);
    }

    #[test]
    fn unterminated_block_is_dropped_silently() {
        let source = lines(&["keep", "/* MACRO.HEADER x", "dangling"]);
        let res = extract(&source, 0).unwrap();
        assert!(res.macros.is_empty());
        assert_eq!(res.residual, vec!["keep"]);
    }

    #[test]
    fn duplicate_name_fresh_header() {
        let source = lines(&[
            "/* MACRO.HEADER 1 */",
            "h",
            "/* MACRO.HEADER 1 */",
            "/* MACRO.BODY 1 */",
            "b",
            "/* MACRO.BODY 1 */",
            "/* MACRO.HEADER 1 */",
            "h",
            "/* MACRO.HEADER 1 */",
        ]);
        let err = extract(&source, 0).unwrap_err();
        assert_eq!(err.kind, MacroErrorKind::DuplicateMacroName);
        assert_eq!(err.line, Some(7));
    }

    #[test]
    fn duplicate_name_header_closing_a_body() {
        // A header marker that terminates an open body must still respect
        // name uniqueness for the macro it opens.
        let source = lines(&[
            "/* MACRO.HEADER 1 */",
            "h",
            "/* MACRO.BODY 1 */",
            "b",
            "/* MACRO.HEADER 1 */",
        ]);
        let err = extract(&source, 0).unwrap_err();
        assert_eq!(err.kind, MacroErrorKind::DuplicateMacroName);
    }

    #[test]
    fn named_body_without_header() {
        let source = lines(&["/* MACRO.BODY 1 */", "b", "/* MACRO.BODY 1 */"]);
        let err = extract(&source, 0).unwrap_err();
        assert_eq!(err.kind, MacroErrorKind::MacroNameNotFound);
        assert_eq!(err.line, Some(1));
    }

    #[test]
    fn unnamed_body_without_any_macro() {
        let source = lines(&["/* MACRO.BODY */", "b", "/* MACRO.BODY */"]);
        let err = extract(&source, 0).unwrap_err();
        assert_eq!(err.kind, MacroErrorKind::MacroHeaderMissing);
    }

    #[test]
    fn name_mismatch_on_header_close() {
        let source = lines(&["/* MACRO.HEADER 1 */", "h", "/* MACRO.HEADER 2 */"]);
        let err = extract(&source, 0).unwrap_err();
        assert_eq!(err.kind, MacroErrorKind::MacroNameMismatch);
        assert_eq!(err.line, Some(3));
    }

    #[test]
    fn name_mismatch_on_body_close() {
        let source = lines(&[
            "/* MACRO.HEADER 1 */",
            "h",
            "/* MACRO.BODY 1 */",
            "b",
            "/* MACRO.BODY 2 */",
        ]);
        let err = extract(&source, 0).unwrap_err();
        assert_eq!(err.kind, MacroErrorKind::MacroNameMismatch);
    }

    #[test]
    fn name_mismatch_header_open_vs_body_open() {
        let source = lines(&["/* MACRO.HEADER 1 */", "h", "/* MACRO.BODY 2 */"]);
        let err = extract(&source, 0).unwrap_err();
        assert_eq!(err.kind, MacroErrorKind::MacroNameMismatch);
    }

    #[test]
    fn named_close_of_unnamed_block_is_a_mismatch() {
        let source = lines(&["/* MACRO.HEADER */", "h", "/* MACRO.HEADER 1 */"]);
        let err = extract(&source, 0).unwrap_err();
        assert_eq!(err.kind, MacroErrorKind::MacroNameMismatch);
    }

    #[test]
    fn header_offset_points_at_first_script_line() {
        let source = "x\n/* MACRO.HEADER 1 */\nRANGES = 1\n*/\n";
        let res = extract(source, 0).unwrap();
        let offset = res.macros[0].header_offset;
        assert_eq!(&source[offset..offset + 10], "RANGES = 1");
    }
}
