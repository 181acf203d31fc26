//! Main TemplateEngine type for jsonteng
//!
//! The engine ties together the tag registry, the resource loader and the
//! per-call diagnostics. Each `resolve` call owns its stats and duplicate
//! diagnostics; run concurrent resolutions on separate engines.

use std::sync::Arc;

use indexmap::IndexMap;

use crate::error::Result;
use crate::interpolation::unescape_value;
use crate::loader::{DefaultLoader, Loader, LoaderOptions};
use crate::resolver::Resolution;
use crate::stats::{find_duplicates, Stats};
use crate::tags::{global_snapshot, Tag, TagRegistry};
use crate::value::Value;

/// Options for constructing a [`TemplateEngine`]
#[derive(Debug, Clone, Default)]
pub struct EngineOptions {
    /// Global environment scope, searched after every binding document
    pub env: Option<Value>,
    /// Maximum nesting of resolved elements (unlimited when `None`)
    pub max_depth: Option<usize>,
    /// Options for the default loader
    pub loader: LoaderOptions,
}

/// Resolves JSON templates against binding data
pub struct TemplateEngine {
    tags: TagRegistry,
    loader: Box<dyn Loader>,
    env: Option<Value>,
    max_depth: Option<usize>,
    stats: Stats,
    duplicates: IndexMap<String, Vec<Value>>,
}

impl std::fmt::Debug for TemplateEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TemplateEngine")
            .field("tags", &self.tags)
            .field("env", &self.env)
            .field("max_depth", &self.max_depth)
            .finish_non_exhaustive()
    }
}

impl Default for TemplateEngine {
    fn default() -> Self {
        Self::new(EngineOptions::default())
    }
}

impl TemplateEngine {
    /// Create an engine with the default file/HTTP loader.
    ///
    /// Tags are taken from the global registry, so tags registered there by
    /// extension crates are available.
    pub fn new(options: EngineOptions) -> Self {
        let loader = DefaultLoader::new(options.loader.clone());
        Self::with_loader(options, Box::new(loader))
    }

    /// Create an engine with a custom loader
    pub fn with_loader(options: EngineOptions, loader: Box<dyn Loader>) -> Self {
        Self {
            tags: global_snapshot(),
            loader,
            env: options.env,
            max_depth: options.max_depth,
            stats: Stats::new(),
            duplicates: IndexMap::new(),
        }
    }

    /// Replace the tag registry
    pub fn with_tags(mut self, tags: TagRegistry) -> Self {
        self.tags = tags;
        self
    }

    /// Register a tag, replacing any tag with the same name
    pub fn register_tag(&mut self, tag: Arc<dyn Tag>) {
        self.tags.register(tag);
    }

    /// The tag registry, for bulk registration
    pub fn tags_mut(&mut self) -> &mut TagRegistry {
        &mut self.tags
    }

    /// Names of all available tags, sorted
    pub fn tag_names(&self) -> Vec<&str> {
        self.tags.names()
    }

    /// Resolve the template named `main_template` against `bindings`.
    ///
    /// The template is fetched through the loader and released again however
    /// resolution ends. Bindings are searched in order, then the environment.
    pub fn resolve(&mut self, main_template: &str, bindings: &[Value]) -> Result<Value> {
        self.stats.clear();
        log::debug!("Resolving template '{}'", main_template);

        let template = self.loader.load(main_template)?;
        let result = self.resolve_loaded(&template, bindings);
        let unloaded = self.loader.unload(main_template);

        let value = result?;
        unloaded?;
        Ok(value)
    }

    /// Resolve an already parsed template against `bindings`
    pub fn resolve_value(&mut self, template: &Value, bindings: &[Value]) -> Result<Value> {
        self.stats.clear();
        self.resolve_loaded(template, bindings)
    }

    fn resolve_loaded(&mut self, template: &Value, bindings: &[Value]) -> Result<Value> {
        let scopes: Vec<&Value> = bindings.iter().chain(self.env.as_ref()).collect();
        self.duplicates = find_duplicates(&scopes);

        let mut cx = Resolution::new(&self.tags, self.loader.as_mut(), &mut self.stats, scopes)
            .with_max_depth(self.max_depth);
        let resolved = cx.resolve_element(template)?;

        // Nothing at the top level renders as null
        let value = resolved.into_value().unwrap_or(Value::Null);
        Ok(unescape_value(value))
    }

    /// Parameter usage counts from the last resolution
    pub fn stats(&self) -> &Stats {
        &self.stats
    }

    /// Field names bound to more than one value in the last resolution's
    /// initial scopes
    pub fn duplicated_parameters(&self) -> &IndexMap<String, Vec<Value>> {
        &self.duplicates
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use crate::loader::StaticLoader;
    use crate::value::Resolved;
    use pretty_assertions::assert_eq;
    use std::cell::RefCell;
    use std::rc::Rc;

    fn json(text: &str) -> Value {
        Value::from_json_str(text).unwrap()
    }

    fn engine() -> TemplateEngine {
        TemplateEngine::with_loader(EngineOptions::default(), Box::new(StaticLoader::new()))
    }

    fn resolve(template: &str, bindings: &[Value]) -> Result<Value> {
        engine().resolve_value(&json(template), bindings)
    }

    /// Loader that records load/unload calls
    struct RecordingLoader {
        inner: StaticLoader,
        log: Rc<RefCell<Vec<String>>>,
    }

    impl Loader for RecordingLoader {
        fn load(&mut self, name: &str) -> Result<Value> {
            self.log.borrow_mut().push(format!("load {}", name));
            self.inner.load(name)
        }

        fn unload(&mut self, name: &str) -> Result<()> {
            self.log.borrow_mut().push(format!("unload {}", name));
            self.inner.unload(name)
        }
    }

    #[test]
    fn test_placeholder_types() {
        let bindings = [json(r#"{"x": 5}"#)];
        assert_eq!(resolve(r#"{"a": "${x}"}"#, &bindings).unwrap(), json(r#"{"a": 5}"#));
        assert_eq!(
            resolve(r#"{"a": "val=${x}"}"#, &bindings).unwrap(),
            json(r#"{"a": "val=5"}"#)
        );
    }

    #[test]
    fn test_bindings_before_env() {
        let options = EngineOptions {
            env: Some(json(r#"{"x": "env", "y": "env"}"#)),
            ..Default::default()
        };
        let mut engine = TemplateEngine::with_loader(options, Box::new(StaticLoader::new()));

        let result = engine
            .resolve_value(&json(r#"["${x}", "${y}"]"#), &[json(r#"{"x": "binding"}"#)])
            .unwrap();
        assert_eq!(result, json(r#"["binding", "env"]"#));
    }

    #[test]
    fn test_resolve_named_template() {
        let loader = StaticLoader::new().with_document(
            "main.json",
            json(r##"{"servers": ["#for-each", "${names}", {"host": "${_index_}-${name}"}]}"##),
        );
        let mut engine = TemplateEngine::with_loader(EngineOptions::default(), Box::new(loader));
        let bindings = [json(r#"{"names": [{"name": "a"}, {"name": "b"}]}"#)];

        assert_eq!(
            engine.resolve("main.json", &bindings).unwrap(),
            json(r#"{"servers": [{"host": "0-a"}, {"host": "1-b"}]}"#)
        );
    }

    #[test]
    fn test_template_unloaded_on_error() {
        let log = Rc::new(RefCell::new(Vec::new()));
        let loader = RecordingLoader {
            inner: StaticLoader::new().with_document("t", json(r#"{"a": "${missing}"}"#)),
            log: Rc::clone(&log),
        };
        let mut engine = TemplateEngine::with_loader(EngineOptions::default(), Box::new(loader));

        let err = engine.resolve("t", &[json("{}")]).unwrap_err();
        assert!(err.is_unresolvable());
        assert_eq!(*log.borrow(), vec!["load t", "unload t"]);
    }

    #[test]
    fn test_literal_template_name() {
        let mut engine = engine();
        let result = engine
            .resolve(r#"{"v": "${x}"}"#, &[json(r#"{"x": [1]}"#)])
            .unwrap();
        assert_eq!(result, json(r#"{"v": [1]}"#));
    }

    #[test]
    fn test_unescape_applied_once() {
        let bindings = [json(r#"{"x": 1}"#)];
        assert_eq!(
            resolve(r#"{"lit": "\\${x}", "mixed": "a\\.b-${x}"}"#, &bindings).unwrap(),
            json(r#"{"lit": "${x}", "mixed": "a.b-1"}"#)
        );
    }

    #[test]
    fn test_top_level_omit_is_null() {
        assert_eq!(resolve(r##"["#one-of", [false, 1]]"##, &[]).unwrap(), Value::Null);
    }

    #[test]
    fn test_omission_preserves_order() {
        let template = r##"{
            "list": [1, ["#one-of", [false, 0]], 2, ["#one-of", [false, 0]], 3],
            "gone": ["#one-of", [false, 0]],
            "kept": true
        }"##;
        assert_eq!(
            resolve(template, &[]).unwrap(),
            json(r#"{"list": [1, 2, 3], "kept": true}"#)
        );
    }

    #[test]
    fn test_idempotent_without_placeholders() {
        let template = r#"{"a": [1, {"b": null}], "c": "text", "d": 2.5}"#;
        assert_eq!(resolve(template, &[]).unwrap(), json(template));
    }

    #[test]
    fn test_stats_reset_per_call() {
        let mut engine = engine();
        let bindings = [json(r#"{"x": 1, "y": 2}"#)];

        engine.resolve_value(&json(r#"["${x}", "${x}"]"#), &bindings).unwrap();
        assert_eq!(engine.stats().get("x"), 2);

        engine.resolve_value(&json(r#"["${y}"]"#), &bindings).unwrap();
        assert_eq!(engine.stats().get("x"), 0);
        assert_eq!(engine.stats().get("y"), 1);
    }

    #[test]
    fn test_duplicated_parameters() {
        let options = EngineOptions {
            env: Some(json(r#"{"port": 3}"#)),
            ..Default::default()
        };
        let mut engine = TemplateEngine::with_loader(options, Box::new(StaticLoader::new()));
        let bindings = [json(r#"{"port": 1}"#), json(r#"{"svc": {"port": 2}}"#)];

        engine.resolve_value(&json(r#""${port}""#), &bindings).unwrap();
        assert_eq!(
            engine.duplicated_parameters()["port"],
            vec![Value::from(1), Value::from(2), Value::from(3)]
        );
    }

    #[test]
    fn test_register_tag() {
        let mut engine = engine();
        engine.register_tag(Arc::new(crate::tags::FnTag::new("upper", |args, cx| {
            let text = crate::tags::resolve_string_arg("upper", &args[0], cx)?;
            Ok(Resolved::Value(Value::String(text.to_uppercase())))
        })));

        assert!(engine.tag_names().contains(&"upper"));
        let result = engine
            .resolve_value(&json(r##"["#upper", "${x}"]"##), &[json(r#"{"x": "hi"}"#)])
            .unwrap();
        assert_eq!(result, Value::from("HI"));
    }

    #[test]
    fn test_with_tags_replaces_registry() {
        let template = json(r##"["#len", [1, 2]]"##);

        let mut bare = engine().with_tags(TagRegistry::new());
        assert!(bare.tag_names().is_empty());
        let err = bare.resolve_value(&template, &[]).unwrap_err();
        assert!(err.to_string().contains("Unknown tag \"len\"."));

        let mut builtins = engine().with_tags(TagRegistry::with_builtins());
        assert_eq!(builtins.resolve_value(&template, &[]).unwrap(), Value::from(2));
    }

    #[test]
    fn test_max_depth() {
        let options = EngineOptions {
            max_depth: Some(16),
            ..Default::default()
        };
        let mut engine = TemplateEngine::with_loader(options, Box::new(StaticLoader::new()));

        let err = engine
            .resolve_value(&json(r#""${a}""#), &[json(r#"{"a": "${a}"}"#)])
            .unwrap_err();
        assert!(matches!(err.kind, ErrorKind::Template(_)));
        assert!(err.to_string().contains("depth"));
    }

    #[test]
    fn test_malformed_template_is_error() {
        let err = resolve(r#"{"a": ["ok", "x${y"]}"#, &[json(r#"{"y": 1}"#)]).unwrap_err();
        assert_eq!(err.kind, ErrorKind::Parse);
    }

    #[test]
    fn test_default_loader_from_directory() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("main.json"), r#"{"greeting": "hello ${who}"}"#).unwrap();

        let options = EngineOptions {
            loader: LoaderOptions::default().with_root(dir.path().display().to_string()),
            ..Default::default()
        };
        let mut engine = TemplateEngine::new(options);
        assert_eq!(
            engine.resolve("main.json", &[json(r#"{"who": "world"}"#)]).unwrap(),
            json(r#"{"greeting": "hello world"}"#)
        );
    }
}
