//! Tag architecture
//!
//! Tags are array-encoded macros: `["#name", arg1, arg2, ...]`, or an object
//! entry `"#name": [arg1, ...]` whose result is merged into the enclosing
//! object. A `:label` suffix on the name (`"#for-each:servers"`) is
//! documentation only. Arguments reach the tag unresolved; each tag decides
//! what to resolve and when.

use std::collections::HashMap;
use std::sync::{Arc, OnceLock, PoisonError, RwLock};

use crate::condition;
use crate::error::{Error, Result};
use crate::resolver::Resolution;
use crate::value::{Resolved, Value};

/// Sigil that marks a tag name
pub const TAG_SIGIL: char = '#';

/// Name bound to the iteration index inside `for-each`
pub const INDEX_PARAM: &str = "_index_";

// Global tag registry for extension packages
static GLOBAL_REGISTRY: OnceLock<RwLock<TagRegistry>> = OnceLock::new();

/// Get the global tag registry.
///
/// This registry is lazily initialized with built-in tags.
/// Extension packages can register additional tags here; engines created
/// afterwards pick them up.
pub fn global_registry() -> &'static RwLock<TagRegistry> {
    GLOBAL_REGISTRY.get_or_init(|| RwLock::new(TagRegistry::with_builtins()))
}

/// Register a tag in the global registry.
///
/// # Arguments
/// * `tag` - The tag to register
/// * `force` - If true, overwrite any existing tag with the same name.
///   If false, return an error if the name is already registered.
pub fn register_global(tag: Arc<dyn Tag>, force: bool) -> Result<()> {
    let mut registry = global_registry()
        .write()
        .unwrap_or_else(PoisonError::into_inner);
    registry.register_with_force(tag, force)
}

/// Snapshot of the global registry
pub fn global_snapshot() -> TagRegistry {
    global_registry()
        .read()
        .unwrap_or_else(PoisonError::into_inner)
        .clone()
}

/// Extract the tag name from `#name` or `#name:label`.
///
/// Returns `None` for strings that are not tags, including a lone `#`.
pub fn parse_tag_name(text: &str) -> Option<&str> {
    if text.len() < 2 {
        return None;
    }
    let rest = text.strip_prefix(TAG_SIGIL)?;
    Some(match rest.split_once(':') {
        Some((name, _label)) => name,
        None => rest,
    })
}

/// Trait for tag implementations
pub trait Tag: Send + Sync {
    /// Process a tag invocation
    ///
    /// # Arguments
    /// * `args` - Unresolved argument tokens (the tag name is not included)
    /// * `cx` - The resolution in progress, used to resolve arguments
    fn process(&self, args: &[Value], cx: &mut Resolution<'_>) -> Result<Resolved>;

    /// Get the name of this tag (without the sigil)
    fn name(&self) -> &str;
}

/// A simple function-based tag
pub struct FnTag<F>
where
    F: Fn(&[Value], &mut Resolution<'_>) -> Result<Resolved> + Send + Sync,
{
    name: String,
    func: F,
}

impl<F> FnTag<F>
where
    F: Fn(&[Value], &mut Resolution<'_>) -> Result<Resolved> + Send + Sync,
{
    /// Create a new function-based tag
    pub fn new(name: impl Into<String>, func: F) -> Self {
        Self {
            name: name.into(),
            func,
        }
    }
}

impl<F> Tag for FnTag<F>
where
    F: Fn(&[Value], &mut Resolution<'_>) -> Result<Resolved> + Send + Sync,
{
    fn process(&self, args: &[Value], cx: &mut Resolution<'_>) -> Result<Resolved> {
        (self.func)(args, cx)
    }

    fn name(&self) -> &str {
        &self.name
    }
}

/// Registry of available tags
#[derive(Clone)]
pub struct TagRegistry {
    tags: HashMap<String, Arc<dyn Tag>>,
}

impl Default for TagRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for TagRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TagRegistry")
            .field("tags", &self.names())
            .finish()
    }
}

impl TagRegistry {
    /// Create a new empty registry
    pub fn new() -> Self {
        Self {
            tags: HashMap::new(),
        }
    }

    /// Create a registry with the standard built-in tags
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        registry.register_builtin_tags();
        registry
    }

    /// Register the built-in tags (at, exists, len, one-of, for-each, to-*)
    fn register_builtin_tags(&mut self) {
        // Lookup tags
        self.register(Arc::new(FnTag::new("at", at_tag)));
        self.register(Arc::new(FnTag::new("exists", exists_tag)));
        self.register(Arc::new(FnTag::new("len", len_tag)));

        // Control tags
        self.register(Arc::new(FnTag::new("one-of", one_of_tag)));
        self.register(Arc::new(FnTag::new("for-each", for_each_tag)));

        // Conversion tags
        self.register(Arc::new(FnTag::new("to-bool", to_bool_tag)));
        self.register(Arc::new(FnTag::new("to-int", to_int_tag)));
        self.register(Arc::new(FnTag::new("to-float", to_float_tag)));
        self.register(Arc::new(FnTag::new("to-null", to_null_tag)));
    }

    /// Register a tag, replacing any tag with the same name
    pub fn register(&mut self, tag: Arc<dyn Tag>) {
        self.tags.insert(tag.name().to_string(), tag);
    }

    /// Register a tag with optional force overwrite.
    ///
    /// # Returns
    /// * `Ok(())` on success
    /// * `Err(Error)` if force=false and a tag with the same name exists
    pub fn register_with_force(&mut self, tag: Arc<dyn Tag>, force: bool) -> Result<()> {
        let name = tag.name().to_string();
        if !force && self.tags.contains_key(&name) {
            return Err(Error::tag_already_registered(&name));
        }
        self.tags.insert(name, tag);
        Ok(())
    }

    /// Register a function as a tag
    pub fn register_fn<F>(&mut self, name: impl Into<String>, func: F)
    where
        F: Fn(&[Value], &mut Resolution<'_>) -> Result<Resolved> + Send + Sync + 'static,
    {
        self.register(Arc::new(FnTag::new(name, func)));
    }

    /// Get a tag by name
    pub fn get(&self, name: &str) -> Option<&Arc<dyn Tag>> {
        self.tags.get(name)
    }

    /// Check if a tag is registered
    pub fn contains(&self, name: &str) -> bool {
        self.tags.contains_key(name)
    }

    /// Registered tag names, sorted
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.tags.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }
}

/// Fail unless exactly `expected` arguments were given
pub fn require_args(tag: &str, args: &[Value], expected: usize) -> Result<()> {
    if args.len() != expected {
        return Err(Error::arity(tag, expected.to_string(), args.len()));
    }
    Ok(())
}

/// Resolve an argument that must produce a string
pub fn resolve_string_arg(tag: &str, arg: &Value, cx: &mut Resolution<'_>) -> Result<String> {
    match cx.resolve_value(arg)? {
        Value::String(s) => Ok(s),
        other => Err(Error::type_mismatch("string", other.type_name())
            .with_help(format!("Tag \"{}\" parameter not a string type", tag))),
    }
}

/// `["#at", container, key]`
///
/// Arrays are indexed by number, objects by string key. Any other container
/// produces nothing.
fn at_tag(args: &[Value], cx: &mut Resolution<'_>) -> Result<Resolved> {
    require_args("at", args, 2)?;
    let container = cx.resolve_value(&args[0])?;
    let key = cx.resolve_value(&args[1])?;

    match container {
        Value::Array(mut items) => {
            let Value::Number(n) = key else {
                return Err(Error::type_mismatch("number", key.type_name())
                    .with_help("Arrays are indexed by number"));
            };
            if n < 0.0 || n.fract() != 0.0 || n >= items.len() as f64 {
                return Err(Error::invalid_argument(
                    "at",
                    format!("Index {} is out of range for {} element(s)", n, items.len()),
                ));
            }
            Ok(Resolved::Value(items.swap_remove(n as usize)))
        }
        Value::Object(mut map) => {
            let Value::String(k) = key else {
                return Err(Error::type_mismatch("string", key.type_name())
                    .with_help("Objects are indexed by string key"));
            };
            match map.swap_remove(&k) {
                Some(v) => Ok(Resolved::Value(v)),
                None => Err(Error::invalid_argument(
                    "at",
                    format!("Key \"{}\" not found", k),
                )),
            }
        }
        other => {
            log::debug!("Tag \"at\" applied to {}, producing nothing", other.type_name());
            Ok(Resolved::Omit)
        }
    }
}

/// `["#exists", token]`: false only when a parameter cannot be found
fn exists_tag(args: &[Value], cx: &mut Resolution<'_>) -> Result<Resolved> {
    require_args("exists", args, 1)?;
    match cx.resolve_element(&args[0]) {
        Ok(_) => Ok(Resolved::Value(Value::Bool(true))),
        Err(e) if e.is_unresolvable() => Ok(Resolved::Value(Value::Bool(false))),
        Err(e) => Err(e),
    }
}

/// `["#len", token]`: entry count of an object or array, otherwise -1
fn len_tag(args: &[Value], cx: &mut Resolution<'_>) -> Result<Resolved> {
    require_args("len", args, 1)?;
    let count = match cx.resolve_element(&args[0])? {
        Resolved::Value(Value::Array(items)) => items.len() as f64,
        Resolved::Value(Value::Object(map)) => map.len() as f64,
        _ => -1.0,
    };
    Ok(Resolved::Value(Value::Number(count)))
}

/// `["#one-of", [cond, value], ..., fallback?]`
///
/// Returns the value of the first pair whose condition holds. A final
/// argument that is not an array is the fallback. No match and no fallback
/// produces nothing.
fn one_of_tag(args: &[Value], cx: &mut Resolution<'_>) -> Result<Resolved> {
    if args.is_empty() {
        return Err(Error::arity("one-of", "at least 1", 0));
    }

    let last = args.len() - 1;
    for (i, arg) in args.iter().enumerate() {
        match arg {
            Value::Array(pair) if pair.len() == 2 => {
                let condition = cx.resolve_value(&pair[0])?;
                if condition::evaluate(&condition)? {
                    return cx.resolve_element(&pair[1]);
                }
            }
            fallback if i == last && !fallback.is_array() => {
                return cx.resolve_element(fallback)
            }
            other => {
                return Err(Error::invalid_argument(
                    "one-of",
                    format!(
                        "Parameter {} must be a [condition, value] pair, got {}",
                        i + 1,
                        other.type_name()
                    ),
                ))
            }
        }
    }

    Ok(Resolved::Omit)
}

/// `["#for-each", items, template, condition?]`
///
/// The template is resolved once per item with two extra scopes in front of
/// the chain: `{"_index_": i}` and, nearer still, the item itself.
fn for_each_tag(args: &[Value], cx: &mut Resolution<'_>) -> Result<Resolved> {
    if !(2..=3).contains(&args.len()) {
        return Err(Error::arity("for-each", "2 or 3", args.len()));
    }

    // Inline templates usually reference per-item parameters that cannot
    // resolve yet; fall back to the raw token.
    let template_ref = match cx.resolve_element(&args[1]) {
        Ok(Resolved::Value(v)) => v,
        Ok(Resolved::Omit) => args[1].clone(),
        Err(e) => {
            log::debug!("Using for-each template reference as given: {}", e);
            args[1].clone()
        }
    };

    let name = match template_ref {
        Value::String(name) => name,
        template => return for_each_items(args, &template, cx),
    };

    let template = cx.loader().load(&name)?;
    let result = for_each_items(args, &template, cx);
    let unloaded = cx.loader().unload(&name);
    let items = result?;
    unloaded?;
    Ok(items)
}

fn for_each_items(args: &[Value], template: &Value, cx: &mut Resolution<'_>) -> Result<Resolved> {
    let items = match cx.resolve_value(&args[0])? {
        Value::Array(items) => items,
        other => {
            return Err(Error::type_mismatch("array", other.type_name())
                .with_help("Tag \"for-each\" requires a list of items"))
        }
    };

    let condition = args.get(2);
    let mut results = Vec::with_capacity(items.len());
    for (index, item) in items.into_iter().enumerate() {
        let mut index_scope = indexmap::IndexMap::new();
        index_scope.insert(INDEX_PARAM.to_string(), Value::from(index));

        let resolved = cx.with_scopes(vec![Value::Object(index_scope), item], |cx| {
            if let Some(condition) = condition {
                let value = cx.resolve_value(condition)?;
                if !condition::evaluate(&value)? {
                    return Ok(Resolved::Omit);
                }
            }
            cx.resolve_element(template)
        });

        match resolved.map_err(|e| e.within(&format!("[{}]", index)))? {
            Resolved::Value(v) => results.push(v),
            Resolved::Omit => {}
        }
    }

    Ok(Resolved::Value(Value::Array(results)))
}

/// `["#to-bool", "true" | "false"]`, case-insensitive
fn to_bool_tag(args: &[Value], cx: &mut Resolution<'_>) -> Result<Resolved> {
    require_args("to-bool", args, 1)?;
    let text = resolve_string_arg("to-bool", &args[0], cx)?;
    if text.eq_ignore_ascii_case("true") {
        Ok(Resolved::Value(Value::Bool(true)))
    } else if text.eq_ignore_ascii_case("false") {
        Ok(Resolved::Value(Value::Bool(false)))
    } else {
        Err(Error::invalid_argument(
            "to-bool",
            format!("Invalid string \"{}\"", text),
        ))
    }
}

/// `["#to-int", "12.5"]`
///
/// Parses any real number; the value is not truncated.
fn to_int_tag(args: &[Value], cx: &mut Resolution<'_>) -> Result<Resolved> {
    require_args("to-int", args, 1)?;
    let text = resolve_string_arg("to-int", &args[0], cx)?;
    parse_number("to-int", &text).map(|n| Resolved::Value(Value::Number(n)))
}

/// `["#to-float", "12.5"]`
fn to_float_tag(args: &[Value], cx: &mut Resolution<'_>) -> Result<Resolved> {
    require_args("to-float", args, 1)?;
    let text = resolve_string_arg("to-float", &args[0], cx)?;
    parse_number("to-float", &text).map(|n| Resolved::Value(Value::Number(n)))
}

/// `["#to-null", "null"]`, case-insensitive
fn to_null_tag(args: &[Value], cx: &mut Resolution<'_>) -> Result<Resolved> {
    require_args("to-null", args, 1)?;
    let text = resolve_string_arg("to-null", &args[0], cx)?;
    if text.eq_ignore_ascii_case("null") {
        Ok(Resolved::Value(Value::Null))
    } else {
        Err(Error::invalid_argument(
            "to-null",
            format!("Invalid string \"{}\"", text),
        ))
    }
}

fn parse_number(tag: &str, text: &str) -> Result<f64> {
    match text.parse::<f64>() {
        Ok(n) if n.is_finite() => Ok(n),
        _ => Err(Error::invalid_argument(
            tag,
            format!("Invalid number \"{}\"", text),
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{ErrorKind, TemplateErrorKind};
    use crate::loader::StaticLoader;
    use crate::stats::Stats;
    use pretty_assertions::assert_eq;

    fn json(text: &str) -> Value {
        Value::from_json_str(text).unwrap()
    }

    fn run(template: &str, scopes: &[Value]) -> Result<Resolved> {
        run_with_loader(template, scopes, &mut StaticLoader::new())
    }

    fn run_with_loader(
        template: &str,
        scopes: &[Value],
        loader: &mut StaticLoader,
    ) -> Result<Resolved> {
        let tags = TagRegistry::with_builtins();
        let mut stats = Stats::new();
        let mut cx = Resolution::new(&tags, loader, &mut stats, scopes.iter().collect());
        cx.resolve_element(&json(template))
    }

    fn value(template: &str, scopes: &[Value]) -> Value {
        run(template, scopes).unwrap().into_value().unwrap()
    }

    fn is_arity(err: &Error) -> bool {
        matches!(
            err.kind,
            ErrorKind::Template(TemplateErrorKind::Arity { .. })
        )
    }

    #[test]
    fn test_parse_tag_name() {
        assert_eq!(parse_tag_name("#len"), Some("len"));
        assert_eq!(parse_tag_name("#for-each:servers"), Some("for-each"));
        assert_eq!(parse_tag_name("#"), None);
        assert_eq!(parse_tag_name("len"), None);
        assert_eq!(parse_tag_name(""), None);
    }

    #[test]
    fn test_registry_builtins() {
        let registry = TagRegistry::with_builtins();
        for name in [
            "at", "exists", "len", "one-of", "for-each", "to-bool", "to-int", "to-float",
            "to-null",
        ] {
            assert!(registry.contains(name), "{}", name);
        }
        assert!(!registry.contains("nope"));
    }

    #[test]
    fn test_register_later_overwrites() {
        let mut registry = TagRegistry::with_builtins();
        registry.register_fn("len", |_, _| Ok(Resolved::Value(Value::from(99))));

        let mut loader = StaticLoader::new();
        let mut stats = Stats::new();
        let mut cx = Resolution::new(&registry, &mut loader, &mut stats, vec![]);
        let result = cx.resolve_element(&json(r##"["#len", [1]]"##)).unwrap();
        assert_eq!(result, Resolved::Value(Value::Number(99.0)));
    }

    #[test]
    fn test_register_with_force() {
        let mut registry = TagRegistry::new();
        registry
            .register_with_force(Arc::new(FnTag::new("x", |_, _| Ok(Resolved::Omit))), false)
            .unwrap();

        let err = registry
            .register_with_force(Arc::new(FnTag::new("x", |_, _| Ok(Resolved::Omit))), false)
            .unwrap_err();
        assert!(err.to_string().contains("already registered"));

        registry
            .register_with_force(Arc::new(FnTag::new("x", |_, _| Ok(Resolved::Omit))), true)
            .unwrap();
        assert_eq!(registry.names(), vec!["x"]);
    }

    #[test]
    fn test_global_registry_has_builtins() {
        let snapshot = global_snapshot();
        assert!(snapshot.contains("for-each"));
    }

    #[test]
    fn test_at_array_and_object() {
        let scopes = [json(r#"{"list": [10, 20, 30], "map": {"k": "v"}, "i": 2}"#)];

        assert_eq!(value(r##"["#at", "${list}", 1]"##, &scopes), Value::from(20));
        assert_eq!(value(r##"["#at", "${list}", "${i}"]"##, &scopes), Value::from(30));
        assert_eq!(value(r##"["#at", "${map}", "k"]"##, &scopes), Value::from("v"));
    }

    #[test]
    fn test_at_other_container_omits() {
        assert_eq!(run(r##"["#at", "text", 0]"##, &[]).unwrap(), Resolved::Omit);
        assert_eq!(value(r##"[1, ["#at", 5, 0], 2]"##, &[]), json("[1, 2]"));
    }

    #[test]
    fn test_at_key_type_mismatch() {
        let err = run(r##"["#at", [1, 2], "0"]"##, &[]).unwrap_err();
        assert!(matches!(
            err.kind,
            ErrorKind::Template(TemplateErrorKind::TypeMismatch { .. })
        ));
        assert!(run(r##"["#at", {"a": 1}, 0]"##, &[]).is_err());
    }

    #[test]
    fn test_at_out_of_range_is_error() {
        assert!(run(r##"["#at", [1, 2], 2]"##, &[]).is_err());
        assert!(run(r##"["#at", [1, 2], -1]"##, &[]).is_err());
    }

    #[test]
    fn test_at_arity() {
        assert!(is_arity(&run(r##"["#at", [1]]"##, &[]).unwrap_err()));
    }

    #[test]
    fn test_exists() {
        let scopes = [json(r#"{"a": 1, "obj": {"b": null}}"#)];

        assert_eq!(value(r##"["#exists", "${a}"]"##, &scopes), Value::Bool(true));
        assert_eq!(value(r##"["#exists", "${obj.b}"]"##, &scopes), Value::Bool(true));
        assert_eq!(value(r##"["#exists", "${missing}"]"##, &scopes), Value::Bool(false));
    }

    #[test]
    fn test_exists_propagates_other_errors() {
        let scopes = [json(r#"{"a": 1}"#)];

        let err = run(r##"["#exists", "${a.b}"]"##, &scopes).unwrap_err();
        assert!(!err.is_unresolvable());

        let err = run(r##"["#exists", "${a"]"##, &scopes).unwrap_err();
        assert_eq!(err.kind, ErrorKind::Parse);
    }

    #[test]
    fn test_len() {
        let scopes = [json(r#"{"list": [1, 2, 3], "map": {"a": 1}}"#)];

        assert_eq!(value(r##"["#len", "${list}"]"##, &scopes), Value::from(3));
        assert_eq!(value(r##"["#len", "${map}"]"##, &scopes), Value::from(1));
        assert_eq!(value(r##"["#len", "text"]"##, &scopes), Value::from(-1));
        assert_eq!(value(r##"["#len", 7]"##, &scopes), Value::from(-1));
    }

    #[test]
    fn test_len_arity() {
        assert!(is_arity(&run(r##"["#len"]"##, &[]).unwrap_err()));
        assert!(is_arity(&run(r##"["#len", 1, 2]"##, &[]).unwrap_err()));
    }

    #[test]
    fn test_one_of_first_match() {
        assert_eq!(
            value(r##"["#one-of", [false, 1], [true, 2], 3]"##, &[]),
            Value::from(2)
        );
    }

    #[test]
    fn test_one_of_fallback() {
        assert_eq!(value(r##"["#one-of", [false, 1], 3]"##, &[]), Value::from(3));
    }

    #[test]
    fn test_one_of_no_match_omits() {
        assert_eq!(run(r##"["#one-of", [false, 1]]"##, &[]).unwrap(), Resolved::Omit);
    }

    #[test]
    fn test_one_of_string_conditions() {
        let scopes = [json(r#"{"env": "prod"}"#)];
        let template = r##"["#one-of", ["1 == 2", "a"], ["'${env}' == 'prod'", "b"], "c"]"##;
        assert_eq!(value(template, &scopes), Value::from("b"));
    }

    #[test]
    fn test_one_of_resolves_chosen_value() {
        let scopes = [json(r#"{"x": {"n": 1}}"#)];
        assert_eq!(
            value(r##"["#one-of", [true, "${x}"]]"##, &scopes),
            json(r#"{"n": 1}"#)
        );
    }

    #[test]
    fn test_one_of_invalid_entry() {
        let err = run(r##"["#one-of", 5, [true, 1]]"##, &[]).unwrap_err();
        assert!(err.to_string().contains("Tag \"one-of\" contains an invalid parameter"));
    }

    #[test]
    fn test_one_of_final_array_must_be_pair() {
        let err = run(r##"["#one-of", [false, 1], [1, 2, 3]]"##, &[]).unwrap_err();
        assert!(err.to_string().contains("Tag \"one-of\" contains an invalid parameter"));
        assert!(run(r##"["#one-of", [false, 1], []]"##, &[]).is_err());
    }

    #[test]
    fn test_one_of_arity() {
        assert!(is_arity(&run(r##"["#one-of"]"##, &[]).unwrap_err()));
    }

    #[test]
    fn test_for_each_inline_template() {
        let scopes = [json(r#"{"items": [{"n": 1}, {"n": 2}]}"#)];
        let template = r##"["#for-each", "${items}", {"i": "${_index_}", "n": "${n}"}]"##;

        assert_eq!(
            value(template, &scopes),
            json(r#"[{"i": 0, "n": 1}, {"i": 1, "n": 2}]"#)
        );
    }

    #[test]
    fn test_for_each_template_as_json_text() {
        let scopes = [json(r#"{"list": [{"z": "100"}, {"z": "200"}]}"#)];
        let template = r##"{"x": ["#for-each", "${list}", "{\"y\":\"${z}\"}"]}"##;

        assert_eq!(
            value(template, &scopes),
            json(r#"{"x": [{"y": "100"}, {"y": "200"}]}"#)
        );
    }

    #[test]
    fn test_for_each_named_template() {
        let mut loader = StaticLoader::new();
        loader.insert("server.json", json(r#"{"host": "${name}.example.com"}"#));
        let scopes = [json(r#"{"servers": [{"name": "a"}, {"name": "b"}], "tmpl": "server.json"}"#)];

        let result = run_with_loader(r##"["#for-each", "${servers}", "${tmpl}"]"##, &scopes, &mut loader)
            .unwrap()
            .into_value()
            .unwrap();
        assert_eq!(
            result,
            json(r#"[{"host": "a.example.com"}, {"host": "b.example.com"}]"#)
        );
        assert_eq!(loader.depth(), 0);
    }

    #[test]
    fn test_for_each_condition() {
        let scopes = [json(r#"{"items": [{"n": 1, "on": true}, {"n": 2, "on": false}, {"n": 3, "on": true}]}"#)];
        let template = r##"["#for-each", "${items}", {"n": "${n}"}, "${on}"]"##;

        assert_eq!(value(template, &scopes), json(r#"[{"n": 1}, {"n": 3}]"#));
    }

    #[test]
    fn test_for_each_condition_expression() {
        let scopes = [json(r#"{"items": [1, 2, 3, 4]}"#)];
        let template = r##"["#for-each", "${items}", "${_index_}", "${_index_} % 2 == 0"]"##;

        assert_eq!(value(template, &scopes), json("[0, 2]"));
    }

    #[test]
    fn test_for_each_item_nearer_than_index() {
        let scopes = [json(r#"{"items": [{"_index_": "own"}, {"m": 1}]}"#)];
        let template = r##"["#for-each", "${items}", "${_index_}"]"##;

        assert_eq!(value(template, &scopes), json(r#"["own", 1]"#));
    }

    #[test]
    fn test_for_each_scalar_items() {
        let scopes = [json(r#"{"names": ["a", "b"]}"#)];
        let template = r##"["#for-each", "${names}", "n${_index_}"]"##;

        assert_eq!(value(template, &scopes), json(r#"["n0", "n1"]"#));
    }

    #[test]
    fn test_for_each_template_resolved_before_iteration() {
        let scopes = [json(r#"{"n": "outer", "items": [{"n": "inner"}]}"#)];
        let template = r##"["#for-each", "${items}", {"v": "${n}"}]"##;

        assert_eq!(value(template, &scopes), json(r#"[{"v": "outer"}]"#));
    }

    #[test]
    fn test_for_each_requires_list() {
        let scopes = [json(r#"{"items": {"a": 1}}"#)];
        let err = run(r##"["#for-each", "${items}", "x"]"##, &scopes).unwrap_err();
        assert!(err.to_string().contains("requires a list"));
    }

    #[test]
    fn test_for_each_error_unloads_template() {
        let mut loader = StaticLoader::new();
        loader.insert("t.json", json(r#"{"v": "${missing}"}"#));
        let scopes = [json(r#"{"items": [1]}"#)];

        let err = run_with_loader(r##"["#for-each", "${items}", "t.json"]"##, &scopes, &mut loader)
            .unwrap_err();
        assert!(err.is_unresolvable());
        assert_eq!(loader.depth(), 0);
    }

    #[test]
    fn test_for_each_arity() {
        assert!(is_arity(&run(r##"["#for-each", []]"##, &[]).unwrap_err()));
        assert!(is_arity(&run(r##"["#for-each", [], "a", true, 1]"##, &[]).unwrap_err()));
    }

    #[test]
    fn test_to_bool() {
        assert_eq!(value(r##"["#to-bool", "TRUE"]"##, &[]), Value::Bool(true));
        assert_eq!(value(r##"["#to-bool", "false"]"##, &[]), Value::Bool(false));
        assert!(run(r##"["#to-bool", "yes"]"##, &[]).is_err());
        assert!(run(r##"["#to-bool", true]"##, &[]).is_err());
    }

    #[test]
    fn test_to_int_keeps_fraction() {
        let scopes = [json(r#"{"port": "8080"}"#)];
        assert_eq!(value(r##"["#to-int", "${port}"]"##, &scopes), Value::from(8080));
        assert_eq!(value(r##"["#to-int", "12.5"]"##, &[]), Value::Number(12.5));
        assert!(run(r##"["#to-int", "abc"]"##, &[]).is_err());
        assert!(run(r##"["#to-int", "inf"]"##, &[]).is_err());
        assert!(run(r##"["#to-int", 3]"##, &[]).is_err());
    }

    #[test]
    fn test_to_float() {
        assert_eq!(value(r##"["#to-float", "1e3"]"##, &[]), Value::from(1000));
    }

    #[test]
    fn test_to_null() {
        assert_eq!(value(r##"["#to-null", "Null"]"##, &[]), Value::Null);
        assert!(run(r##"["#to-null", "none"]"##, &[]).is_err());
    }
}
