//! Error types for jsonteng
//!
//! Errors are structured: a kind, an optional location inside the template
//! being resolved, the underlying cause and an actionable help message.

use std::fmt;

/// Result type alias for jsonteng operations
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for jsonteng operations
#[derive(Debug, Clone)]
pub struct Error {
    /// The kind of error that occurred
    pub kind: ErrorKind,
    /// Location in the template where the error occurred (e.g., "servers[1].name")
    pub path: Option<String>,
    /// Actionable help message
    pub help: Option<String>,
    /// Underlying cause (as string for Clone compatibility)
    pub cause: Option<String>,
}

/// Categories of errors that can occur
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ErrorKind {
    /// Malformed template string or resource text
    Parse,
    /// Template-level failure (unknown tag, arity, type mismatch, ...)
    Template(TemplateErrorKind),
    /// A single scope did not contain the parameter.
    ///
    /// Consumed by the parameter lookup; never returned from
    /// [`TemplateEngine::resolve`](crate::TemplateEngine::resolve).
    InvalidReference,
    /// No scope in the chain contains the parameter
    UnresolvableParameter { param: String },
    /// Resource loading failure
    Loader(LoaderErrorKind),
    /// I/O error (file not readable, etc.)
    Io,
    /// Internal error (bug in jsonteng)
    Internal,
}

/// Specific template error categories
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TemplateErrorKind {
    /// No tag registered under this name
    UnknownTag { name: String },
    /// Wrong number of tag arguments
    Arity {
        tag: String,
        expected: String,
        given: usize,
    },
    /// A value had the wrong type for where it was used
    TypeMismatch { expected: String, got: String },
    /// A tag used as an object key produced something other than an object
    InvalidTagResult { tag: String },
    /// A tag argument has the wrong shape
    InvalidArgument { tag: String },
    /// A condition could not be evaluated to a boolean
    Condition,
    /// Nested resolution went deeper than the configured limit
    DepthExceeded { limit: usize },
    /// Tag already registered
    AlreadyRegistered { name: String },
}

/// Specific loader error categories
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoaderErrorKind {
    /// `unload` did not match the most recent `load`
    OutOfOrder { expected: String, found: String },
    /// Resource does not exist
    NotFound { resource: String },
    /// HTTP request failed
    Http { url: String, status: Option<u16> },
}

impl Error {
    fn new(kind: ErrorKind) -> Self {
        Self {
            kind,
            path: None,
            help: None,
            cause: None,
        }
    }

    /// Create a new parse error
    pub fn parse(message: impl Into<String>) -> Self {
        Self {
            cause: Some(message.into()),
            ..Self::new(ErrorKind::Parse)
        }
    }

    /// Create an unknown tag error
    pub fn unknown_tag(name: impl Into<String>) -> Self {
        let n = name.into();
        Self {
            help: Some(format!("Register the '{}' tag or check for typos", n)),
            ..Self::new(ErrorKind::Template(TemplateErrorKind::UnknownTag { name: n }))
        }
    }

    /// Create an argument count error
    pub fn arity(tag: impl Into<String>, expected: impl Into<String>, given: usize) -> Self {
        Self::new(ErrorKind::Template(TemplateErrorKind::Arity {
            tag: tag.into(),
            expected: expected.into(),
            given,
        }))
    }

    /// Create a type mismatch error
    pub fn type_mismatch(expected: impl Into<String>, got: impl Into<String>) -> Self {
        Self::new(ErrorKind::Template(TemplateErrorKind::TypeMismatch {
            expected: expected.into(),
            got: got.into(),
        }))
    }

    /// Create an invalid object-key tag result error
    pub fn invalid_tag_result(tag: impl Into<String>, got: impl Into<String>) -> Self {
        Self {
            help: Some("A tag used as an object key must produce an object".into()),
            cause: Some(format!("Got: {}", got.into())),
            ..Self::new(ErrorKind::Template(TemplateErrorKind::InvalidTagResult {
                tag: tag.into(),
            }))
        }
    }

    /// Create an invalid tag argument error
    pub fn invalid_argument(tag: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            cause: Some(message.into()),
            ..Self::new(ErrorKind::Template(TemplateErrorKind::InvalidArgument {
                tag: tag.into(),
            }))
        }
    }

    /// Create a condition evaluation error
    pub fn condition(message: impl Into<String>) -> Self {
        Self {
            help: Some(
                "Conditions must be booleans or self-contained expressions such as \"1 == 2\""
                    .into(),
            ),
            cause: Some(message.into()),
            ..Self::new(ErrorKind::Template(TemplateErrorKind::Condition))
        }
    }

    /// Create a resolution depth error
    pub fn depth_exceeded(limit: usize) -> Self {
        Self {
            help: Some("Check the binding data for parameters that refer to themselves".into()),
            ..Self::new(ErrorKind::Template(TemplateErrorKind::DepthExceeded { limit }))
        }
    }

    /// Create a tag already registered error
    pub fn tag_already_registered(name: impl Into<String>) -> Self {
        let n = name.into();
        Self {
            help: Some(format!(
                "Use register_with_force(..., force=true) to override the '{}' tag",
                n
            )),
            ..Self::new(ErrorKind::Template(TemplateErrorKind::AlreadyRegistered {
                name: n,
            }))
        }
    }

    /// Create the per-scope miss signal
    pub(crate) fn invalid_reference(message: impl Into<String>) -> Self {
        Self {
            cause: Some(message.into()),
            ..Self::new(ErrorKind::InvalidReference)
        }
    }

    /// Create an unresolvable parameter error
    pub fn unresolvable_parameter(param: impl Into<String>) -> Self {
        Self {
            help: Some("Add the parameter to one of the binding data documents".into()),
            ..Self::new(ErrorKind::UnresolvableParameter {
                param: param.into(),
            })
        }
    }

    /// Create an out-of-order unload error
    pub fn out_of_order(expected: impl Into<String>, found: impl Into<String>) -> Self {
        let expected = expected.into();
        let found = found.into();
        Self {
            cause: Some(format!("Expected '{}', found '{}'", expected, found)),
            ..Self::new(ErrorKind::Loader(LoaderErrorKind::OutOfOrder {
                expected,
                found,
            }))
        }
    }

    /// Create a resource not found error
    pub fn resource_not_found(resource: impl Into<String>) -> Self {
        Self {
            help: Some("Check the resource name and the TEMPLATE_HOME directory".into()),
            ..Self::new(ErrorKind::Loader(LoaderErrorKind::NotFound {
                resource: resource.into(),
            }))
        }
    }

    /// Create an HTTP request failed error
    pub fn http_request_failed(
        url: impl Into<String>,
        status: Option<u16>,
        message: impl Into<String>,
    ) -> Self {
        let url_str = url.into();
        Self {
            help: Some(format!(
                "Check that the URL '{}' is accessible and returns valid content",
                url_str
            )),
            cause: Some(message.into()),
            ..Self::new(ErrorKind::Loader(LoaderErrorKind::Http {
                url: url_str,
                status,
            }))
        }
    }

    /// Create an I/O error
    pub fn io(message: impl Into<String>) -> Self {
        Self {
            cause: Some(message.into()),
            ..Self::new(ErrorKind::Io)
        }
    }

    /// Create an internal error (bug in jsonteng)
    pub fn internal(message: impl Into<String>) -> Self {
        Self {
            help: Some("This is likely a bug in jsonteng. Please report it.".into()),
            cause: Some(message.into()),
            ..Self::new(ErrorKind::Internal)
        }
    }

    /// Add path context to the error
    pub fn with_path(mut self, path: impl Into<String>) -> Self {
        self.path = Some(path.into());
        self
    }

    /// Add help message to the error
    pub fn with_help(mut self, help: impl Into<String>) -> Self {
        self.help = Some(help.into());
        self
    }

    /// Prefix the error location with the enclosing key or index.
    ///
    /// Index segments are written as `[n]` and attach without a dot.
    pub fn within(mut self, segment: &str) -> Self {
        self.path = Some(match self.path.take() {
            None => segment.to_string(),
            Some(inner) if inner.starts_with('[') => format!("{}{}", segment, inner),
            Some(inner) => format!("{}.{}", segment, inner),
        });
        self
    }

    /// True when every scope was searched without finding the parameter
    pub fn is_unresolvable(&self) -> bool {
        matches!(self.kind, ErrorKind::UnresolvableParameter { .. })
    }

    /// True for the internal per-scope miss signal
    pub fn is_invalid_reference(&self) -> bool {
        matches!(self.kind, ErrorKind::InvalidReference)
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Main error message
        match &self.kind {
            ErrorKind::Parse => write!(f, "Parse error")?,
            ErrorKind::Template(t) => match t {
                TemplateErrorKind::UnknownTag { name } => write!(f, "Unknown tag \"{}\".", name)?,
                TemplateErrorKind::Arity {
                    tag,
                    expected,
                    given,
                } => write!(
                    f,
                    "Tag \"{}\" requires {} parameter(s). Parameters given {}",
                    tag, expected, given
                )?,
                TemplateErrorKind::TypeMismatch { expected, got } => {
                    write!(f, "Type mismatch: expected {}, got {}", expected, got)?
                }
                TemplateErrorKind::InvalidTagResult { tag } => write!(
                    f,
                    "Invalid tag result format for JSON object name tag \"{}\"",
                    tag
                )?,
                TemplateErrorKind::InvalidArgument { tag } => {
                    write!(f, "Tag \"{}\" contains an invalid parameter", tag)?
                }
                TemplateErrorKind::Condition => write!(f, "Invalid condition")?,
                TemplateErrorKind::DepthExceeded { limit } => {
                    write!(f, "Maximum resolution depth {} exceeded", limit)?
                }
                TemplateErrorKind::AlreadyRegistered { name } => {
                    write!(f, "Tag '{}' is already registered", name)?
                }
            },
            ErrorKind::InvalidReference => write!(f, "Invalid reference")?,
            ErrorKind::UnresolvableParameter { param } => {
                write!(f, "Unable to resolve parameter \"{}\".", param)?
            }
            ErrorKind::Loader(l) => match l {
                LoaderErrorKind::OutOfOrder { .. } => {
                    write!(f, "JSON resource loading is out of order")?
                }
                LoaderErrorKind::NotFound { resource } => {
                    write!(f, "Resource not found: {}", resource)?
                }
                LoaderErrorKind::Http { url, status } => {
                    write!(f, "HTTP request failed: {}", url)?;
                    if let Some(s) = status {
                        write!(f, " (status {})", s)?;
                    }
                }
            },
            ErrorKind::Io => write!(f, "I/O error")?,
            ErrorKind::Internal => write!(f, "Internal error")?,
        }

        // Location context
        if let Some(path) = &self.path {
            write!(f, "\n  Path: {}", path)?;
        }

        // Cause
        if let Some(cause) = &self.cause {
            write!(f, "\n  {}", cause)?;
        }

        // Help
        if let Some(help) = &self.help {
            write!(f, "\n  Help: {}", help)?;
        }

        Ok(())
    }
}

impl std::error::Error for Error {}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Error::io(err.to_string())
    }
}
