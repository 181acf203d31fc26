//! Parameter lookup over the scope chain
//!
//! A parameter path is split on unescaped `.` into segments; a segment may
//! carry an index suffix (`servers[1]`). Within each scope the longest
//! remaining suffix is first tried as a single key, so flat keys that
//! contain dots (`"db.host": ...`) resolve too.

use std::sync::OnceLock;

use regex::Regex;

use crate::error::{Error, ErrorKind, Result};
use crate::interpolation::unescape;
use crate::stats::Stats;
use crate::value::Value;

fn index_pattern() -> Result<&'static Regex> {
    static PATTERN: OnceLock<Option<Regex>> = OnceLock::new();
    PATTERN
        .get_or_init(|| Regex::new(r"^(.+)\[([0-9]+)\]$").ok())
        .as_ref()
        .ok_or_else(|| Error::internal("Parameter index pattern failed to compile"))
}

/// Find `path` in the first scope that contains it.
///
/// Scopes are searched in iteration order. A successful lookup is counted
/// in `stats` under the full path text.
pub fn resolve_param<'s>(
    path: &str,
    scopes: impl Iterator<Item = &'s Value>,
    stats: &mut Stats,
) -> Result<Value> {
    let separators = separator_indices(path);
    let mut shape_error: Option<Error> = None;

    for scope in scopes {
        match find_in_scope(path, &separators, scope) {
            Ok(value) => {
                stats.record(path);
                return Ok(value.clone());
            }
            Err(e) if e.is_invalid_reference() => {
                log::trace!("Parameter '{}' not in scope: {:?}", path, e.cause);
            }
            Err(e) if matches!(e.kind, ErrorKind::Template(_)) => {
                // Another scope may still hold the parameter
                shape_error.get_or_insert(e);
            }
            Err(e) => return Err(e),
        }
    }

    match shape_error {
        Some(e) => Err(e),
        None => Err(Error::unresolvable_parameter(path)),
    }
}

/// Byte offsets of every `.` not preceded by an escape
fn separator_indices(path: &str) -> Vec<usize> {
    let bytes = path.as_bytes();
    let mut indices = Vec::new();
    let mut i = 0;
    while i < bytes.len() {
        match bytes[i] {
            b'\\' => i += 2,
            b'.' => {
                indices.push(i);
                i += 1;
            }
            _ => i += 1,
        }
    }
    indices
}

fn find_in_scope<'v>(path: &str, separators: &[usize], scope: &'v Value) -> Result<&'v Value> {
    let mut current = scope;
    let mut start: usize = 0;

    for depth in 0..=separators.len() {
        let Value::Object(map) = current else {
            if depth == 0 {
                return Err(Error::invalid_reference("invalid scope"));
            }
            return Err(Error::type_mismatch("object", current.type_name()).with_help(format!(
                "Parameter \"{}\" descends into '{}', which is not an object",
                path,
                &path[..start.saturating_sub(1)]
            )));
        };

        if let Some(value) = match_key(path, &path[start..], map)? {
            return Ok(value);
        }

        if depth < separators.len() {
            let token = &path[start..separators[depth]];
            match match_key(path, token, map)? {
                Some(next) => current = next,
                None => return Err(Error::invalid_reference("mismatch binding data")),
            }
            start = separators[depth] + 1;
        }
    }

    Err(Error::invalid_reference("mismatch binding data"))
}

/// Look up one key, honouring a trailing `[n]` index suffix.
///
/// A plain key match wins over the index interpretation. An index applied to
/// a non-array is a type mismatch; an index past the end is a miss.
fn match_key<'v>(
    path: &str,
    key: &str,
    map: &'v indexmap::IndexMap<String, Value>,
) -> Result<Option<&'v Value>> {
    let plain = unescape(key);
    if let Some(value) = map.get(&plain) {
        return Ok(Some(value));
    }

    let Some(caps) = index_pattern()?.captures(key) else {
        return Ok(None);
    };
    let base = unescape(&caps[1]);
    let Ok(index) = caps[2].parse::<usize>() else {
        return Ok(None);
    };

    match map.get(&base) {
        Some(Value::Array(items)) => Ok(items.get(index)),
        Some(other) => Err(Error::type_mismatch("array", other.type_name())
            .with_help(format!("Parameter \"{}\" indexes into '{}'", path, base))),
        None => Ok(None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn json(text: &str) -> Value {
        Value::from_json_str(text).unwrap()
    }

    fn lookup(path: &str, scopes: &[Value]) -> Result<Value> {
        let mut stats = Stats::new();
        resolve_param(path, scopes.iter(), &mut stats)
    }

    #[test]
    fn test_simple_key() {
        assert_eq!(lookup("x", &[json(r#"{"x": 1}"#)]).unwrap(), Value::Number(1.0));
    }

    #[test]
    fn test_first_scope_wins() {
        let scopes = [json(r#"{"x": 1}"#), json(r#"{"x": 2}"#)];
        assert_eq!(lookup("x", &scopes).unwrap(), Value::Number(1.0));
    }

    #[test]
    fn test_falls_through_to_later_scope() {
        let scopes = [json(r#"{"y": 1}"#), json(r#"{"x": 2}"#)];
        assert_eq!(lookup("x", &scopes).unwrap(), Value::Number(2.0));
    }

    #[test]
    fn test_dotted_path() {
        let scopes = [json(r#"{"db": {"host": "h", "port": 5432}}"#)];
        assert_eq!(lookup("db.host", &scopes).unwrap(), Value::from("h"));
        assert_eq!(lookup("db.port", &scopes).unwrap(), Value::Number(5432.0));
    }

    #[test]
    fn test_flat_key_with_dot() {
        let scopes = [json(r#"{"db.host": "flat", "db": {"host": "nested"}}"#)];
        assert_eq!(lookup("db.host", &scopes).unwrap(), Value::from("flat"));
    }

    #[test]
    fn test_remaining_suffix_as_key() {
        let scopes = [json(r#"{"a": {"b.c": 7}}"#)];
        assert_eq!(lookup("a.b.c", &scopes).unwrap(), Value::Number(7.0));
    }

    #[test]
    fn test_escaped_dot() {
        let scopes = [json(r#"{"a.b": {"c": 3}}"#)];
        assert_eq!(lookup(r"a\.b.c", &scopes).unwrap(), Value::Number(3.0));
    }

    #[test]
    fn test_index_suffix() {
        let scopes = [json(r#"{"x": [1, 2, 3], "s": [{"name": "a"}, {"name": "b"}]}"#)];
        assert_eq!(lookup("x[1]", &scopes).unwrap(), Value::Number(2.0));
        assert_eq!(lookup("s[1].name", &scopes).unwrap(), Value::from("b"));
    }

    #[test]
    fn test_index_out_of_range_tries_next_scope() {
        let scopes = [json(r#"{"x": [1]}"#), json(r#"{"x": [1, 2, 3]}"#)];
        assert_eq!(lookup("x[2]", &scopes).unwrap(), Value::Number(3.0));

        let err = lookup("x[5]", &scopes).unwrap_err();
        assert!(err.is_unresolvable());
    }

    #[test]
    fn test_null_is_a_match() {
        let scopes = [json(r#"{"x": null}"#), json(r#"{"x": 1}"#)];
        assert_eq!(lookup("x", &scopes).unwrap(), Value::Null);
    }

    #[test]
    fn test_missing_everywhere_is_unresolvable() {
        let err = lookup("nope", &[json("{}"), json(r#"{"a": 1}"#)]).unwrap_err();
        assert!(err.is_unresolvable());
        assert!(err.to_string().contains("Unable to resolve parameter \"nope\"."));
    }

    #[test]
    fn test_descending_into_scalar_is_type_mismatch() {
        let err = lookup("x.x1", &[json(r#"{"x": 1}"#)]).unwrap_err();
        assert!(!err.is_unresolvable());
        assert!(err.to_string().contains("descends into 'x', which is not an object"));
        assert!(matches!(err.kind, ErrorKind::Template(_)));
    }

    #[test]
    fn test_shape_mismatch_does_not_hide_later_match() {
        let scopes = [json(r#"{"a": "text"}"#), json(r#"{"a": {"b": 2}}"#)];
        assert_eq!(lookup("a.b", &scopes).unwrap(), Value::Number(2.0));
    }

    #[test]
    fn test_non_object_scope_is_skipped() {
        let scopes = [Value::from("item"), json(r#"{"x": 1}"#)];
        assert_eq!(lookup("x", &scopes).unwrap(), Value::Number(1.0));
    }

    #[test]
    fn test_stats_counted_by_full_path() {
        let scopes = [json(r#"{"db": {"host": "h"}}"#)];
        let mut stats = Stats::new();

        resolve_param("db.host", scopes.iter(), &mut stats).unwrap();
        resolve_param("db.host", scopes.iter(), &mut stats).unwrap();
        let _ = resolve_param("db.port", scopes.iter(), &mut stats);

        assert_eq!(stats.get("db.host"), 2);
        assert_eq!(stats.get("db.port"), 0);
    }

    #[test]
    fn test_separator_indices_skip_escapes() {
        assert_eq!(separator_indices("a.b.c"), vec![1, 3]);
        assert_eq!(separator_indices(r"a\.b.c"), vec![4]);
        assert!(separator_indices("abc").is_empty());
    }
}
