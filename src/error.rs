// ============================================================================
// File: packages/adles/src/error.rs
// ----------------------------------------------------------------------------
// Error taxonomy for specification processing and environment execution.
//
// Structural errors (schema, reference, instancing) always carry the full
// list of problems found in one pass. Execution errors (platform, not found,
// cancelled) are scoped to a single operation.
// ============================================================================

use std::fmt;
use std::path::PathBuf;

use crate::resolver::Diagnostic;

/// A single located problem in a specification
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Problem {
    /// Dotted path of the offending entity (e.g. `folders.teams.instances`)
    pub path: String,

    /// Human-readable description
    pub message: String,
}

impl Problem {
    /// Create a new problem at `path`
    pub fn new<P: Into<String>, M: Into<String>>(path: P, message: M) -> Self {
        Self {
            path: path.into(),
            message: message.into(),
        }
    }
}

impl fmt::Display for Problem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.path, self.message)
    }
}

/// Top-level error type for adles
#[derive(Debug, thiserror::Error)]
pub enum AdlesError {
    /// The document does not match the specification schema
    #[error("invalid specification ({} problems)", .problems.len())]
    Schema { problems: Vec<Problem> },

    /// One or more labels could not be resolved
    #[error("unresolved references ({} errors)", .diagnostics.len())]
    Reference { diagnostics: Vec<Diagnostic> },

    /// Instance counts or allocations could not be determined
    #[error("instancing failed ({} problems)", .problems.len())]
    Instancing { problems: Vec<Problem> },

    /// A platform driver call failed
    #[error("platform error on {target}: {message}")]
    Platform { target: String, message: String },

    /// Target entity does not exist on the platform
    #[error("{target} was not found")]
    NotFound { target: String },

    /// Run was aborted by the user
    #[error("operation cancelled")]
    Cancelled,

    /// Infrastructure or runtime configuration is invalid
    #[error("configuration error: {message}")]
    Config { message: String },

    /// File could not be read
    #[error("could not read {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// YAML syntax error
    #[error("YAML syntax error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// JSON syntax error
    #[error("JSON syntax error: {0}")]
    Json(#[from] serde_json::Error),

    /// Internal invariant violated
    #[error("internal error: {message}")]
    Internal { message: String },
}

impl AdlesError {
    /// Create a schema error from a list of problems
    pub fn schema(problems: Vec<Problem>) -> Self {
        Self::Schema { problems }
    }

    /// Create an instancing error with a single problem
    pub fn instancing<P: Into<String>, M: Into<String>>(path: P, message: M) -> Self {
        Self::Instancing {
            problems: vec![Problem::new(path, message)],
        }
    }

    /// Create a platform error
    pub fn platform<T: Into<String>, M: Into<String>>(target: T, message: M) -> Self {
        Self::Platform {
            target: target.into(),
            message: message.into(),
        }
    }

    /// Create a configuration error
    pub fn config<M: Into<String>>(message: M) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    /// Create an I/O error tied to a path
    pub fn io<P: Into<PathBuf>>(path: P, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Create an internal error
    pub fn internal<M: Into<String>>(message: M) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// True for errors detected before any platform call
    pub fn is_structural(&self) -> bool {
        matches!(
            self,
            Self::Schema { .. } | Self::Reference { .. } | Self::Instancing { .. }
        )
    }

    /// Every located problem carried by a structural error, one per line
    pub fn problem_lines(&self) -> Vec<String> {
        match self {
            Self::Schema { problems } | Self::Instancing { problems } => {
                problems.iter().map(ToString::to_string).collect()
            }
            Self::Reference { diagnostics } => {
                diagnostics.iter().map(ToString::to_string).collect()
            }
            other => vec![other.to_string()],
        }
    }
}

/// Result type for adles operations
pub type AdlesResult<T> = Result<T, AdlesError>;
