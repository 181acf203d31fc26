//! Element resolution
//!
//! [`Resolution`] carries the state of one `resolve` call: the tag registry,
//! the loader, usage stats and the scope chain. Elements are resolved
//! recursively; strings go through placeholder expansion and tag-shaped
//! arrays and object keys are dispatched to the tag registry, both of which
//! call back into [`Resolution::resolve_element`].

use indexmap::IndexMap;

use crate::error::{Error, Result};
use crate::interpolation::resolve_string;
use crate::loader::Loader;
use crate::params;
use crate::stats::Stats;
use crate::tags::{parse_tag_name, TagRegistry};
use crate::value::{Resolved, Value};

/// Priority-ordered list of binding documents.
///
/// The initial scopes are borrowed from the caller. Scopes pushed while
/// resolving (by `for-each`) are owned and always sit in front of them.
#[derive(Debug, Default)]
pub struct ScopeChain<'a> {
    base: Vec<&'a Value>,
    pushed: Vec<Value>,
}

impl<'a> ScopeChain<'a> {
    /// Create a chain from scopes in priority order (first is highest)
    pub fn new(base: Vec<&'a Value>) -> Self {
        Self {
            base,
            pushed: Vec::new(),
        }
    }

    /// Iterate scopes from highest to lowest priority
    pub fn iter(&self) -> impl Iterator<Item = &Value> {
        self.pushed.iter().rev().chain(self.base.iter().copied())
    }

    /// Number of scopes in the chain
    pub fn len(&self) -> usize {
        self.pushed.len() + self.base.len()
    }

    /// Check if the chain has no scopes
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn push_front(&mut self, scope: Value) {
        self.pushed.push(scope);
    }

    fn pop_front(&mut self) -> Option<Value> {
        self.pushed.pop()
    }
}

/// State for a single resolution
pub struct Resolution<'a> {
    tags: &'a TagRegistry,
    loader: &'a mut dyn Loader,
    stats: &'a mut Stats,
    scopes: ScopeChain<'a>,
    depth: usize,
    max_depth: Option<usize>,
}

impl<'a> Resolution<'a> {
    /// Create a resolution over `scopes` (first is highest priority)
    pub fn new(
        tags: &'a TagRegistry,
        loader: &'a mut dyn Loader,
        stats: &'a mut Stats,
        scopes: Vec<&'a Value>,
    ) -> Self {
        Self {
            tags,
            loader,
            stats,
            scopes: ScopeChain::new(scopes),
            depth: 0,
            max_depth: None,
        }
    }

    /// Fail instead of recursing deeper than `limit` nested elements
    pub fn with_max_depth(mut self, limit: Option<usize>) -> Self {
        self.max_depth = limit;
        self
    }

    /// The current scope chain
    pub fn scopes(&self) -> &ScopeChain<'a> {
        &self.scopes
    }

    /// The loader used for templates referenced by tags
    pub fn loader(&mut self) -> &mut dyn Loader {
        &mut *self.loader
    }

    /// Look up a parameter path in the scope chain without resolving it
    pub fn resolve_param(&mut self, path: &str) -> Result<Value> {
        params::resolve_param(path, self.scopes.iter(), self.stats)
    }

    /// Run `f` with `scopes` pushed onto the front of the chain.
    ///
    /// Scopes are pushed in order, so the last one has the highest priority.
    /// They are popped again however `f` returns.
    pub fn with_scopes<T>(
        &mut self,
        scopes: Vec<Value>,
        f: impl FnOnce(&mut Self) -> Result<T>,
    ) -> Result<T> {
        let count = scopes.len();
        for scope in scopes {
            self.scopes.push_front(scope);
        }
        log::trace!("Pushed {} scope(s), chain length {}", count, self.scopes.len());

        let result = f(self);

        for _ in 0..count {
            self.scopes.pop_front();
        }
        result
    }

    /// Resolve an element that must produce a value
    pub fn resolve_value(&mut self, element: &Value) -> Result<Value> {
        match self.resolve_element(element)? {
            Resolved::Value(v) => Ok(v),
            Resolved::Omit => Err(Error::type_mismatch("a value", "omit")),
        }
    }

    /// Resolve one element of a template.
    ///
    /// Scalars are returned unchanged, strings are expanded, arrays and
    /// objects are rebuilt from their resolved children. The first error
    /// aborts the whole element.
    pub fn resolve_element(&mut self, element: &Value) -> Result<Resolved> {
        if let Some(limit) = self.max_depth {
            if self.depth >= limit {
                return Err(Error::depth_exceeded(limit));
            }
        }

        self.depth += 1;
        let result = match element {
            Value::Null | Value::Bool(_) | Value::Number(_) => Ok(Resolved::Value(element.clone())),
            Value::String(s) => resolve_string(s, self),
            Value::Array(items) => self.resolve_array(items),
            Value::Object(map) => self.resolve_object(map),
        };
        self.depth -= 1;
        result
    }

    fn resolve_array(&mut self, items: &[Value]) -> Result<Resolved> {
        if let Some(name) = items.first().and_then(Value::as_str).and_then(parse_tag_name) {
            return self.dispatch(name, &items[1..]);
        }

        let mut resolved = Vec::with_capacity(items.len());
        for (i, item) in items.iter().enumerate() {
            match self.resolve_element(item) {
                Ok(Resolved::Value(v)) => resolved.push(v),
                Ok(Resolved::Omit) => {}
                Err(e) => return Err(e.within(&format!("[{}]", i))),
            }
        }
        Ok(Resolved::Value(Value::Array(resolved)))
    }

    fn resolve_object(&mut self, map: &IndexMap<String, Value>) -> Result<Resolved> {
        let mut resolved = IndexMap::with_capacity(map.len());

        for (key, value) in map {
            if let Some(name) = parse_tag_name(key) {
                let Value::Array(args) = value else {
                    return Err(Error::type_mismatch("array", value.type_name())
                        .with_help("Value must be a list if name is a tag")
                        .within(key));
                };
                match self.dispatch(name, args).map_err(|e| e.within(key))? {
                    Resolved::Value(Value::Object(entries)) => resolved.extend(entries),
                    Resolved::Omit => {}
                    other => {
                        return Err(Error::invalid_tag_result(name, other.type_name()).within(key))
                    }
                }
                continue;
            }

            let resolved_key = match resolve_string(key, self).map_err(|e| e.within(key))? {
                Resolved::Value(Value::String(k)) => k,
                other => {
                    return Err(Error::type_mismatch("string", other.type_name())
                        .with_help("Object keys must resolve to strings")
                        .within(key))
                }
            };

            match self.resolve_element(value).map_err(|e| e.within(key))? {
                Resolved::Value(v) => {
                    resolved.insert(resolved_key, v);
                }
                Resolved::Omit => {}
            }
        }

        Ok(Resolved::Value(Value::Object(resolved)))
    }

    /// Invoke the tag registered under `name` with unresolved `args`
    pub fn dispatch(&mut self, name: &str, args: &[Value]) -> Result<Resolved> {
        let tags = self.tags;
        let tag = tags.get(name).ok_or_else(|| Error::unknown_tag(name))?;
        log::trace!("Dispatching tag '{}' with {} argument(s)", name, args.len());
        tag.process(args, self)
    }
}
