use crate::check::{Check, Predicate};
use crate::error::ConfigError;
use crate::metadata::scalar_string;
use regex::Regex;
use serde_yaml::{Mapping, Value};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

/// Check types the engine implements itself.
pub const BUILTIN_CHECKS: &[&str] = &[
    "comment-body",
    "query",
    "metadata-comment",
    "metadata-exists",
    "metadata-v2-exists",
    "isdraft",
    "variable",
    "variable-exists",
    "variable-value",
    "force-fail",
];

/// Check types held back for future use. Policies that mention them still
/// compile; the check is dropped from its group.
pub const RESERVED_CHECKS: &[&str] = &["comment", "metadata-file"];

pub type CheckFactory =
    Arc<dyn Fn(&CheckNode<'_>) -> Result<Arc<dyn Predicate>, ConfigError> + Send + Sync>;

// ---------------------------------------------------------------------------
// CheckNode
// ---------------------------------------------------------------------------

/// One `check` entry of the policy document, with typed field accessors that
/// report the entry's path on failure.
pub struct CheckNode<'a> {
    kind: &'a str,
    mapping: &'a Mapping,
    at: &'a str,
}

impl<'a> CheckNode<'a> {
    pub fn kind(&self) -> &str {
        self.kind
    }

    pub fn at(&self) -> &str {
        self.at
    }

    pub fn get(&self, field: &str) -> Option<&'a Value> {
        self.mapping.get(field)
    }

    fn missing(&self, field: &'static str) -> ConfigError {
        ConfigError::MissingField {
            field,
            at: self.at.to_string(),
        }
    }

    fn invalid(&self, field: &str, reason: &str) -> ConfigError {
        ConfigError::InvalidField {
            field: field.to_string(),
            at: self.at.to_string(),
            reason: reason.to_string(),
        }
    }

    pub fn required_str(&self, field: &'static str) -> Result<String, ConfigError> {
        match self.get(field) {
            None | Some(Value::Null) => Err(self.missing(field)),
            Some(Value::String(s)) if !s.is_empty() => Ok(s.clone()),
            Some(_) => Err(self.invalid(field, "expected a non-empty string")),
        }
    }

    /// Any scalar, rendered as a string (`value: 3` and `value: "3"` agree).
    pub fn required_scalar(&self, field: &'static str) -> Result<String, ConfigError> {
        match self.get(field) {
            None | Some(Value::Null) => Err(self.missing(field)),
            Some(v) => scalar_string(v).ok_or_else(|| self.invalid(field, "expected a scalar")),
        }
    }

    pub fn required_bool(&self, field: &'static str) -> Result<bool, ConfigError> {
        match self.get(field) {
            None | Some(Value::Null) => Err(self.missing(field)),
            Some(Value::Bool(b)) => Ok(*b),
            Some(_) => Err(self.invalid(field, "expected true or false")),
        }
    }

    pub fn required_pattern(&self, field: &'static str) -> Result<Regex, ConfigError> {
        let raw = self.required_str(field)?;
        Regex::new(&raw).map_err(|source| ConfigError::InvalidPattern {
            at: self.at.to_string(),
            source,
        })
    }
}

// ---------------------------------------------------------------------------
// CheckRegistry
// ---------------------------------------------------------------------------

/// Maps check type strings to check constructors.
#[derive(Clone, Default)]
pub struct CheckRegistry {
    custom: BTreeMap<String, CheckFactory>,
}

impl fmt::Debug for CheckRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CheckRegistry")
            .field("custom", &self.custom.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl CheckRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a host-defined check type. Built-in types cannot be replaced.
    pub fn register<F>(&mut self, kind: impl Into<String>, factory: F) -> Result<(), ConfigError>
    where
        F: Fn(&CheckNode<'_>) -> Result<Arc<dyn Predicate>, ConfigError> + Send + Sync + 'static,
    {
        let kind = kind.into();
        if BUILTIN_CHECKS.contains(&kind.as_str()) {
            return Err(ConfigError::BuiltinCheck(kind));
        }
        self.custom.insert(kind, Arc::new(factory));
        Ok(())
    }

    pub fn is_reserved(&self, kind: &str) -> bool {
        RESERVED_CHECKS.contains(&kind) && !self.custom.contains_key(kind)
    }

    pub fn is_known(&self, kind: &str) -> bool {
        BUILTIN_CHECKS.contains(&kind) || self.custom.contains_key(kind)
    }

    /// Builds one check from its document node. `Ok(None)` means the type is
    /// reserved and the entry is skipped.
    pub fn build(&self, node: &Value, at: &str) -> Result<Option<Check>, ConfigError> {
        let mapping = node.as_mapping().ok_or_else(|| ConfigError::InvalidField {
            field: "check".to_string(),
            at: at.to_string(),
            reason: "expected a mapping with a 'type' key".to_string(),
        })?;
        let kind = match mapping.get("type") {
            None | Some(Value::Null) => {
                return Err(ConfigError::MissingField {
                    field: "type",
                    at: at.to_string(),
                })
            }
            Some(Value::String(s)) => s.as_str(),
            Some(_) => {
                return Err(ConfigError::InvalidField {
                    field: "type".to_string(),
                    at: at.to_string(),
                    reason: "expected a string".to_string(),
                })
            }
        };
        let node = CheckNode { kind, mapping, at };

        let check = match kind {
            "comment-body" => Check::CommentBody {
                pattern: node.required_pattern("value")?,
            },
            "query" => {
                let expression = node.required_str("value")?;
                jmespath::compile(&expression).map_err(|e| ConfigError::InvalidQuery {
                    at: at.to_string(),
                    reason: e.to_string(),
                })?;
                Check::Query { expression }
            }
            "metadata-comment" => Check::MetadataComment {
                name: node.required_str("name")?.to_lowercase(),
                pattern: node.required_pattern("value")?,
            },
            "metadata-exists" => Check::MetadataExists,
            "metadata-v2-exists" => Check::MetadataV2Exists,
            "isdraft" => Check::IsDraft {
                expected: node.required_bool("value")?,
            },
            "variable" => Check::Variable {
                name: node.required_str("name")?,
                value: node.required_scalar("value")?,
            },
            "variable-exists" => Check::VariableExists {
                name: node.required_str("name")?,
            },
            "variable-value" => Check::VariableValue {
                name: node.required_str("name")?,
                pattern: node.required_pattern("value")?,
            },
            "force-fail" => Check::ForceFail,
            other => match self.custom.get(other) {
                Some(factory) => Check::Custom {
                    kind: other.to_string(),
                    predicate: factory(&node)?,
                },
                None if RESERVED_CHECKS.contains(&other) => {
                    tracing::debug!(check = other, at, "reserved check type skipped");
                    return Ok(None);
                }
                None => {
                    return Err(ConfigError::UnknownCheck {
                        kind: other.to_string(),
                        at: at.to_string(),
                    })
                }
            },
        };

        tracing::debug!(check = check.kind(), at, "check built");
        Ok(Some(check))
    }
}
