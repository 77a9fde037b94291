use thiserror::Error;

/// Build-time failures. Any of these aborts compilation of the whole policy
/// document; a partially built tree is never returned.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("unsupported policy revision {0}")]
    UnsupportedRevision(u64),

    #[error("{at}: unknown check type '{kind}'")]
    UnknownCheck { kind: String, at: String },

    #[error("{at}: missing required field '{field}'")]
    MissingField { field: &'static str, at: String },

    #[error("{at}: invalid field '{field}': {reason}")]
    InvalidField {
        field: String,
        at: String,
        reason: String,
    },

    #[error("{at}: invalid pattern: {source}")]
    InvalidPattern {
        at: String,
        #[source]
        source: regex::Error,
    },

    #[error("{at}: invalid query: {reason}")]
    InvalidQuery { at: String, reason: String },

    #[error("{at}: unknown node: {reason}")]
    UnknownNode { at: String, reason: String },

    #[error("check type '{0}' is built in and cannot be registered")]
    BuiltinCheck(String),
}

#[derive(Debug, Error)]
pub enum PolicyError {
    #[error("config error: {0}")]
    Config(#[from] ConfigError),

    #[error("lookup of {resource} failed: {reason}")]
    Lookup { resource: String, reason: String },

    #[error("action '{op}' failed: {reason}")]
    Action { op: String, reason: String },

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Yaml(#[from] serde_yaml::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

impl PolicyError {
    pub fn lookup(resource: impl Into<String>, reason: impl std::fmt::Display) -> Self {
        PolicyError::Lookup {
            resource: resource.into(),
            reason: reason.to_string(),
        }
    }

    pub fn action(op: impl Into<String>, reason: impl std::fmt::Display) -> Self {
        PolicyError::Action {
            op: op.into(),
            reason: reason.to_string(),
        }
    }

    pub fn is_config(&self) -> bool {
        matches!(self, PolicyError::Config(_))
    }
}

pub type Result<T> = std::result::Result<T, PolicyError>;
