//! jsonteng-core: JSON template engine
//!
//! This crate resolves JSON templates against layered binding data. Strings
//! may contain `${param}` placeholders, and arrays of the form
//! `["#tag", args...]` invoke tags such as `for-each` and `one-of`.
//!
//! # Example
//!
//! ```rust
//! use jsonteng_core::{EngineOptions, StaticLoader, TemplateEngine, Value};
//!
//! let template = Value::from_json_str(r##"{
//!     "name": "${app}",
//!     "ports": ["#for-each", "${services}", "${port}"]
//! }"##).unwrap();
//! let bindings = Value::from_json_str(r#"{
//!     "app": "shop",
//!     "services": [{"port": 80}, {"port": 443}]
//! }"#).unwrap();
//!
//! let mut engine = TemplateEngine::with_loader(EngineOptions::default(), Box::new(StaticLoader::new()));
//! let result = engine.resolve_value(&template, &[bindings]).unwrap();
//! assert_eq!(result.to_json_text().unwrap(), r#"{"name":"shop","ports":[80,443]}"#);
//! ```

pub mod condition;
pub mod error;
pub mod interpolation;
pub mod loader;
pub mod params;
pub mod resolver;
pub mod stats;
pub mod tags;
pub mod value;

mod engine;

pub use engine::{EngineOptions, TemplateEngine};
pub use error::{Error, Result};
pub use loader::{DefaultLoader, Loader, LoaderOptions, StaticLoader};
pub use resolver::Resolution;
pub use stats::Stats;
pub use tags::{register_global, FnTag, Tag, TagRegistry};
pub use value::{Resolved, Value};
