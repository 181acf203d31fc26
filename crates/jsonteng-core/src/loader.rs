//! Resource loading for templates and binding data
//!
//! A loader turns a resource name into a [`Value`]. Names are resolved
//! relative to the resource currently being loaded, so a template can refer
//! to its siblings by relative path. Every successful `load` must be paired
//! with an `unload` of the same name, in reverse order.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::{Error, ErrorKind, Result};
use crate::value::Value;

/// Environment variable naming the default template directory
pub const TEMPLATE_HOME_ENV: &str = "TEMPLATE_HOME";

/// Name of the context entry the stack starts with
const ROOT_CONTEXT: &str = "root";

/// Default HTTP timeout
const DEFAULT_HTTP_TIMEOUT: Duration = Duration::from_secs(30);

/// Trait for resource loaders
pub trait Loader {
    /// Load a resource and make it the context for relative names
    fn load(&mut self, name: &str) -> Result<Value>;

    /// Release the most recently loaded resource.
    ///
    /// Fails if `name` is not the resource on top of the context stack.
    fn unload(&mut self, name: &str) -> Result<()>;
}

/// Interpret text as a literal value.
///
/// Tried in order: JSON text, integer, real number, boolean, and finally the
/// text itself as a string.
pub fn parse_literal(text: &str) -> Value {
    if let Ok(value) = Value::from_json_str(text) {
        return value;
    }
    let trimmed = text.trim();
    if let Ok(n) = trimmed.parse::<i64>() {
        return Value::Number(n as f64);
    }
    if let Some(n) = trimmed.parse::<f64>().ok().filter(|n| n.is_finite()) {
        return Value::Number(n);
    }
    if let Some(b) = parse_bool(trimmed) {
        return Value::Bool(b);
    }
    Value::String(text.to_string())
}

fn parse_bool(text: &str) -> Option<bool> {
    match text {
        "1" | "t" | "T" | "true" | "TRUE" | "True" => Some(true),
        "0" | "f" | "F" | "false" | "FALSE" | "False" => Some(false),
        _ => None,
    }
}

/// Parse resource text, as YAML when the name says so, otherwise as JSON
fn parse_resource(location: &str, text: &str) -> Result<Value> {
    let lower = location.to_ascii_lowercase();
    let parsed = if lower.ends_with(".yaml") || lower.ends_with(".yml") {
        Value::from_yaml_str(text)
    } else {
        Value::from_json_str(text)
    };
    parsed.map_err(|e| e.with_path(location))
}

/// Options for [`DefaultLoader`]
#[derive(Debug, Clone, PartialEq)]
pub struct LoaderOptions {
    /// Directory or URL relative names resolve against.
    /// Falls back to `TEMPLATE_HOME`, then to the working directory.
    pub root: Option<String>,
    /// Timeout for HTTP fetches
    pub http_timeout: Duration,
}

impl Default for LoaderOptions {
    fn default() -> Self {
        Self {
            root: None,
            http_timeout: DEFAULT_HTTP_TIMEOUT,
        }
    }
}

impl LoaderOptions {
    /// Set the root directory or URL
    pub fn with_root(mut self, root: impl Into<String>) -> Self {
        self.root = Some(root.into());
        self
    }

    /// Set the HTTP timeout
    pub fn with_http_timeout(mut self, timeout: Duration) -> Self {
        self.http_timeout = timeout;
        self
    }
}

/// Where relative names are resolved from
#[derive(Debug, Clone, PartialEq)]
enum Base {
    Dir(PathBuf),
    /// A URL; relative names are joined onto it
    Url(String),
}

/// Where a name points after resolution against the current base
#[derive(Debug, Clone, PartialEq)]
enum Location {
    File(PathBuf),
    Url(String),
}

/// Loader for local files and HTTP(S) URLs.
///
/// A name that cannot be fetched is interpreted as a literal value (see
/// [`parse_literal`]), so JSON text can be passed wherever a resource name
/// is expected.
#[derive(Debug)]
pub struct DefaultLoader {
    options: LoaderOptions,
    stack: Vec<(String, Base)>,
}

impl Default for DefaultLoader {
    fn default() -> Self {
        Self::new(LoaderOptions::default())
    }
}

impl DefaultLoader {
    /// Create a loader rooted at `options.root`
    pub fn new(options: LoaderOptions) -> Self {
        let root = options
            .root
            .clone()
            .or_else(|| std::env::var(TEMPLATE_HOME_ENV).ok())
            .unwrap_or_default();
        let base = if root.contains("://") {
            Base::Url(root)
        } else {
            Base::Dir(PathBuf::from(root))
        };
        Self {
            options,
            stack: vec![(ROOT_CONTEXT.to_string(), base)],
        }
    }

    /// Number of resources currently loaded
    pub fn depth(&self) -> usize {
        self.stack.len() - 1
    }

    fn current(&self) -> &Base {
        // The root entry is never popped
        &self.stack[self.stack.len() - 1].1
    }

    fn locate(&self, name: &str) -> Location {
        if name.contains("://") {
            return match name.strip_prefix("file://") {
                Some(path) => Location::File(PathBuf::from(path)),
                None => Location::Url(name.to_string()),
            };
        }
        match self.current() {
            Base::Url(base) => Location::Url(join_url(base, name)),
            Base::Dir(dir) => Location::File(dir.join(name)),
        }
    }

    fn fetch(&self, location: &Location) -> Result<Value> {
        match location {
            Location::File(path) => {
                let text = std::fs::read_to_string(path).map_err(|e| {
                    if e.kind() == std::io::ErrorKind::NotFound {
                        Error::resource_not_found(path.display().to_string())
                    } else {
                        Error::io(format!("{}: {}", path.display(), e))
                    }
                })?;
                parse_resource(&path.display().to_string(), &text)
            }
            Location::Url(url) => {
                let text = http_fetch(url, self.options.http_timeout)?;
                parse_resource(url_path(url), &text)
            }
        }
    }
}

impl Loader for DefaultLoader {
    fn load(&mut self, name: &str) -> Result<Value> {
        let location = self.locate(name);
        match self.fetch(&location) {
            Ok(value) => {
                let base = match location {
                    Location::File(path) => Base::Dir(parent_dir(&path)),
                    Location::Url(url) => Base::Url(url),
                };
                log::debug!("Loaded resource '{}'", name);
                self.stack.push((name.to_string(), base));
                Ok(value)
            }
            Err(e) => {
                if e.kind == ErrorKind::Parse {
                    log::warn!("Resource '{}' is not valid, treating name as value: {}", name, e);
                } else {
                    log::debug!("Treat {} as JSON value.", name);
                }
                let base = self.current().clone();
                self.stack.push((name.to_string(), base));
                Ok(parse_literal(name))
            }
        }
    }

    fn unload(&mut self, name: &str) -> Result<()> {
        if self.stack.len() <= 1 {
            return Err(Error::out_of_order(ROOT_CONTEXT, name));
        }
        match self.stack.pop() {
            Some((loaded, _)) if loaded == name => Ok(()),
            Some((loaded, _)) => Err(Error::out_of_order(loaded, name)),
            None => Err(Error::out_of_order(ROOT_CONTEXT, name)),
        }
    }
}

fn parent_dir(path: &Path) -> PathBuf {
    path.parent().map(Path::to_path_buf).unwrap_or_default()
}

/// Path component of a URL, for format detection
fn url_path(url: &str) -> &str {
    url.split(['?', '#']).next().unwrap_or(url)
}

#[cfg(feature = "http")]
fn join_url(base: &str, name: &str) -> String {
    match url::Url::parse(base).and_then(|b| b.join(name)) {
        Ok(joined) => joined.to_string(),
        Err(e) => {
            log::debug!("Cannot join '{}' onto '{}': {}", name, base, e);
            name.to_string()
        }
    }
}

#[cfg(not(feature = "http"))]
fn join_url(base: &str, name: &str) -> String {
    match base.rfind('/') {
        Some(i) => format!("{}/{}", &base[..i], name),
        None => name.to_string(),
    }
}

/// Fetch a URL as text
#[cfg(feature = "http")]
fn http_fetch(url: &str, timeout: Duration) -> Result<String> {
    let config = ureq::Agent::config_builder()
        .timeout_global(Some(timeout))
        .build();
    let agent: ureq::Agent = config.into();

    let response = agent.get(url).call().map_err(|e| {
        let (status, message) = match &e {
            ureq::Error::StatusCode(code) => (Some(*code), format!("HTTP {}", code)),
            ureq::Error::Timeout(kind) => (None, format!("Request timeout: {:?}", kind)),
            ureq::Error::Io(io_err) => (None, format!("Connection error: {}", io_err)),
            _ => (None, format!("HTTP request failed: {}", e)),
        };
        Error::http_request_failed(url, status, message)
    })?;

    response
        .into_body()
        .read_to_string()
        .map_err(|e| Error::http_request_failed(url, None, e.to_string()))
}

#[cfg(not(feature = "http"))]
fn http_fetch(url: &str, _timeout: Duration) -> Result<String> {
    Err(Error::http_request_failed(
        url,
        None,
        "HTTP support is disabled; rebuild with the 'http' feature",
    ))
}

/// In-memory loader over named documents.
///
/// Unknown names are interpreted as literal values, like [`DefaultLoader`].
#[derive(Debug, Clone, Default)]
pub struct StaticLoader {
    documents: HashMap<String, Value>,
    stack: Vec<String>,
}

impl StaticLoader {
    /// Create a loader with no documents
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a document, builder style
    pub fn with_document(mut self, name: impl Into<String>, document: Value) -> Self {
        self.insert(name, document);
        self
    }

    /// Add or replace a document
    pub fn insert(&mut self, name: impl Into<String>, document: Value) {
        self.documents.insert(name.into(), document);
    }

    /// Number of resources currently loaded
    pub fn depth(&self) -> usize {
        self.stack.len()
    }
}

impl Loader for StaticLoader {
    fn load(&mut self, name: &str) -> Result<Value> {
        let value = match self.documents.get(name) {
            Some(document) => document.clone(),
            None => parse_literal(name),
        };
        self.stack.push(name.to_string());
        Ok(value)
    }

    fn unload(&mut self, name: &str) -> Result<()> {
        match self.stack.pop() {
            Some(loaded) if loaded == name => Ok(()),
            Some(loaded) => Err(Error::out_of_order(loaded, name)),
            None => Err(Error::out_of_order(ROOT_CONTEXT, name)),
        }
    }
}
