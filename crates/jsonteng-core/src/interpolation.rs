//! Placeholder expansion inside strings
//!
//! Handles strings like:
//! - `${name}` - whole-string placeholder, keeps the parameter's type
//! - `host-${env.name}.example.com` - embedded placeholder, spliced as text
//! - `${outer_${inner}}` - nested placeholders, innermost first
//! - `\${literal}` - escaped, kept as text until the final unescape pass

use crate::error::{Error, Result};
use crate::resolver::Resolution;
use crate::value::{Resolved, Value};

/// Expand every placeholder in `text` against the current scope chain.
///
/// When a single placeholder spans the whole string, the resolved value is
/// returned with its own type. Otherwise each resolved value is converted to
/// text, spliced in, and scanning restarts at the splice point so produced
/// text may itself contain placeholders.
pub fn resolve_string(text: &str, cx: &mut Resolution<'_>) -> Result<Resolved> {
    let mut current = text.to_string();
    let mut open: Vec<usize> = Vec::new();
    let mut i = 0;

    while i < current.len() {
        let bytes = current.as_bytes();
        match bytes[i] {
            b'\\' => i += 2,
            b'$' if bytes.get(i + 1) == Some(&b'{') => {
                open.push(i);
                i += 2;
            }
            b'}' => {
                i += 1;
                // An unmatched closing brace is literal text
                let Some(start) = open.pop() else {
                    continue;
                };
                let param = &current[start + 2..i - 1];
                if param.is_empty() {
                    return Err(Error::parse(format!(
                        "Empty parameter name in \"{}\"",
                        current
                    )));
                }

                let value = cx.resolve_param(param)?;
                let before = &current[..start];
                let after = &current[i..];
                if before.is_empty() && after.is_empty() {
                    return cx.resolve_element(&value);
                }

                let spliced = match cx.resolve_element(&value)? {
                    Resolved::Value(v) => v.to_splice_text()?,
                    Resolved::Omit => {
                        return Err(Error::type_mismatch("a value to splice", "omit")
                            .with_help(format!("Parameter \"{}\" produced nothing", param)))
                    }
                };
                current = format!("{}{}{}", before, spliced, after);
                i = start;
            }
            _ => i += 1,
        }
    }

    if !open.is_empty() {
        return Err(Error::parse(format!(
            "Mis-formed parameterized string \"{}\".",
            current
        ))
        .with_help("Every ${ needs a matching }"));
    }

    Ok(Resolved::Value(Value::String(current)))
}

/// Check whether a string contains an unescaped `${`
pub fn contains_placeholder(text: &str) -> bool {
    let bytes = text.as_bytes();
    let mut i = 0;
    while i < bytes.len() {
        match bytes[i] {
            b'\\' => i += 2,
            b'$' if bytes.get(i + 1) == Some(&b'{') => return true,
            _ => i += 1,
        }
    }
    false
}

/// Remove escape characters: every `\` is dropped and the character after it
/// is kept literally. A trailing lone `\` is dropped.
pub fn unescape(text: &str) -> String {
    if !text.contains('\\') {
        return text.to_string();
    }

    let mut result = String::with_capacity(text.len());
    let mut chars = text.chars();
    while let Some(c) = chars.next() {
        if c == '\\' {
            if let Some(escaped) = chars.next() {
                result.push(escaped);
            }
        } else {
            result.push(c);
        }
    }
    result
}

/// Apply [`unescape`] to every string and object key in a value
pub fn unescape_value(value: Value) -> Value {
    match value {
        Value::String(s) => Value::String(unescape(&s)),
        Value::Array(items) => Value::Array(items.into_iter().map(unescape_value).collect()),
        Value::Object(map) => Value::Object(
            map.into_iter()
                .map(|(k, v)| (unescape(&k), unescape_value(v)))
                .collect(),
        ),
        other => other,
    }
}
