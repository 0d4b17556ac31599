/// One concrete binding of token names to replacement text, in insertion
/// order. Token names carry no `%` decoration.
pub type TokenRecord = Vec<(String, String)>;

/// Instantiate a template once per token record and concatenate the results
/// in record order. Tokens appear in the template as `%name%`; matching is
/// case-sensitive and non-overlapping, and inserted values are never
/// re-scanned, so a value that itself looks like a token is kept literal.
pub fn substitute(records: &[TokenRecord], template: &[String]) -> Vec<String> {
    let joined = template.join("\n");
    let mut out = Vec::new();
    for record in records {
        let expanded = substitute_record(record, &joined);
        out.extend(expanded.split('\n').map(|s| s.to_string()));
    }
    out
}

/// Single left-to-right pass over the template text for one record.
fn substitute_record(record: &TokenRecord, text: &str) -> String {
    let chars: Vec<char> = text.chars().collect();
    let mut out = String::with_capacity(text.len());
    let mut i = 0;

    while i < chars.len() {
        if chars[i] == '%' {
            if let Some(width) = match_token(record, &chars[i + 1..], &mut out) {
                i += width + 2;
                continue;
            }
        }
        out.push(chars[i]);
        i += 1;
    }

    out
}

/// If the characters after an opening `%` form `name%` for a name bound in
/// the record, append the bound value to `out` and return the name's width.
/// Unknown names and stray `%` signs are left for the caller to pass through.
fn match_token(record: &TokenRecord, rest: &[char], out: &mut String) -> Option<usize> {
    let close = rest.iter().position(|&c| c == '%')?;
    let name: String = rest[..close].iter().collect();
    if name.is_empty() || !name.chars().all(|c| c.is_alphanumeric() || c == '_') {
        return None;
    }
    let (_, value) = record.iter().find(|(k, _)| *k == name)?;
    out.push_str(value);
    Some(close)
}
