use crate::state::State;
use regex::Regex;
use std::fmt;
use std::sync::Arc;

/// A host-supplied predicate, registered under its own check type.
///
/// Implementations must not have side effects on the context; they may only
/// read it.
pub trait Predicate: fmt::Debug + Send + Sync {
    fn evaluate(&self, state: &State<'_>) -> bool;
}

/// A compiled check. Parameters are fixed at build time; evaluation is a pure
/// function of the parameters and the context.
#[derive(Debug, Clone)]
pub enum Check {
    CommentBody { pattern: Regex },
    /// JMESPath expression, validated when the policy is compiled.
    Query { expression: String },
    MetadataComment { name: String, pattern: Regex },
    MetadataExists,
    MetadataV2Exists,
    IsDraft { expected: bool },
    Variable { name: String, value: String },
    VariableExists { name: String },
    VariableValue { name: String, pattern: Regex },
    ForceFail,
    Custom {
        kind: String,
        predicate: Arc<dyn Predicate>,
    },
}

impl Check {
    pub fn kind(&self) -> &str {
        match self {
            Check::CommentBody { .. } => "comment-body",
            Check::Query { .. } => "query",
            Check::MetadataComment { .. } => "metadata-comment",
            Check::MetadataExists => "metadata-exists",
            Check::MetadataV2Exists => "metadata-v2-exists",
            Check::IsDraft { .. } => "isdraft",
            Check::Variable { .. } => "variable",
            Check::VariableExists { .. } => "variable-exists",
            Check::VariableValue { .. } => "variable-value",
            Check::ForceFail => "force-fail",
            Check::Custom { kind, .. } => kind.as_str(),
        }
    }

    /// Evaluates the check and logs the outcome. Never fails: anything that
    /// cannot be evaluated counts as `false`.
    pub fn run(&self, state: &State<'_>) -> bool {
        let passed = self.evaluate(state);
        tracing::debug!(parent: state.span(), check = self.kind(), passed, "check evaluated");
        passed
    }

    fn evaluate(&self, state: &State<'_>) -> bool {
        match self {
            Check::CommentBody { pattern } => pattern.is_match(state.item().body_text()),
            Check::Query { expression } => run_query(expression, state),
            Check::MetadataComment { name, pattern } => state
                .metadata_value(name)
                .is_some_and(|value| pattern.is_match(value)),
            Check::MetadataExists => !state.metadata().is_empty(),
            Check::MetadataV2Exists => state.has_v2_metadata(),
            Check::IsDraft { expected } => {
                let item = state.item();
                item.is_pull_request() && item.draft == *expected
            }
            Check::Variable { name, value } => state.variable(name) == Some(value.as_str()),
            Check::VariableExists { name } => state.variable(name).is_some(),
            Check::VariableValue { name, pattern } => state
                .variable(name)
                .is_some_and(|value| pattern.is_match(value)),
            Check::ForceFail => false,
            Check::Custom { predicate, .. } => predicate.evaluate(state),
        }
    }
}

fn run_query(expression: &str, state: &State<'_>) -> bool {
    let compiled = match jmespath::compile(expression) {
        Ok(compiled) => compiled,
        Err(e) => {
            tracing::warn!(parent: state.span(), expression, error = %e, "query failed to compile");
            return false;
        }
    };
    match compiled.search(state.query_document().clone()) {
        Ok(result) => result.is_truthy(),
        Err(e) => {
            tracing::warn!(parent: state.span(), expression, error = %e, "query failed");
            false
        }
    }
}
