use crate::action::ActionExecutor;
use crate::compile::Compiler;
use crate::error::{ConfigError, Result};
use crate::event::EventSnapshot;
use crate::registry::CheckRegistry;
use crate::repo::RepoLookup;
use crate::runner::Runner;
use crate::state::{EvaluationSummary, State};
use serde::{Deserialize, Serialize};
use serde_yaml::Value;
use std::collections::BTreeMap;
use std::path::Path;

pub const SUPPORTED_REVISION: u64 = 1;

const RESERVED_KEYS: &[&str] = &["revision", "name", "config"];

// ---------------------------------------------------------------------------
// PolicyWarning / WarnLevel
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PolicyWarning {
    pub level: WarnLevel,
    pub at: String,
    pub message: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WarnLevel {
    Info,
    Warning,
}

// ---------------------------------------------------------------------------
// Policy
// ---------------------------------------------------------------------------

/// A compiled policy document: one runner per `(event, action)` trigger.
///
/// Built once and shared read-only; every evaluation gets its own [`State`].
#[derive(Debug, Clone)]
pub struct Policy {
    pub revision: u64,
    pub name: Option<String>,
    /// The document's free-form `config` section, untouched.
    pub config: Value,
    events: BTreeMap<String, BTreeMap<String, Runner>>,
    warnings: Vec<PolicyWarning>,
}

impl Policy {
    pub fn load(path: &Path) -> Result<Self> {
        Self::load_with(path, &CheckRegistry::new())
    }

    pub fn load_with(path: &Path, registry: &CheckRegistry) -> Result<Self> {
        let data = std::fs::read_to_string(path)?;
        Self::from_yaml_str_with(&data, registry)
    }

    pub fn from_yaml_str(data: &str) -> Result<Self> {
        Self::from_yaml_str_with(data, &CheckRegistry::new())
    }

    pub fn from_yaml_str_with(data: &str, registry: &CheckRegistry) -> Result<Self> {
        let doc: Value = serde_yaml::from_str(data)?;
        Ok(Self::compile(&doc, registry)?)
    }

    pub fn compile(doc: &Value, registry: &CheckRegistry) -> std::result::Result<Self, ConfigError> {
        let root = doc.as_mapping().ok_or_else(|| ConfigError::InvalidField {
            field: "document".to_string(),
            at: "<root>".to_string(),
            reason: "expected a mapping".to_string(),
        })?;

        let revision = match root.get("revision") {
            None | Some(Value::Null) => SUPPORTED_REVISION,
            Some(v) => v.as_u64().ok_or_else(|| ConfigError::InvalidField {
                field: "revision".to_string(),
                at: "revision".to_string(),
                reason: "expected a positive integer".to_string(),
            })?,
        };
        if revision != SUPPORTED_REVISION {
            return Err(ConfigError::UnsupportedRevision(revision));
        }

        let name = root.get("name").and_then(Value::as_str).map(str::to_string);
        let config = root.get("config").cloned().unwrap_or(Value::Null);

        let mut compiler = Compiler::new(registry);
        let mut events = BTreeMap::new();
        for (key, value) in root {
            let event = key.as_str().ok_or_else(|| ConfigError::InvalidField {
                field: "event".to_string(),
                at: "<root>".to_string(),
                reason: "event keys must be strings".to_string(),
            })?;
            if RESERVED_KEYS.contains(&event) {
                continue;
            }
            let actions = value.as_mapping().ok_or_else(|| ConfigError::InvalidField {
                field: event.to_string(),
                at: event.to_string(),
                reason: "expected a mapping of event action to nodes".to_string(),
            })?;

            let mut runners = BTreeMap::new();
            for (action_key, nodes) in actions {
                let action = action_key.as_str().ok_or_else(|| ConfigError::InvalidField {
                    field: "action".to_string(),
                    at: event.to_string(),
                    reason: "event actions must be strings".to_string(),
                })?;
                let at = format!("{event}.{action}");
                let runner = compiler.compile_runner(nodes, &at)?;
                runners.insert(action.to_string(), runner);
            }
            events.insert(event.to_string(), runners);
        }

        let mut warnings = compiler.into_warnings();
        for (event, runners) in &events {
            for (action, runner) in runners {
                if runner.is_empty() {
                    warnings.push(PolicyWarning {
                        level: WarnLevel::Warning,
                        at: format!("{event}.{action}"),
                        message: "trigger has no nodes".to_string(),
                    });
                }
            }
        }

        tracing::debug!(
            triggers = events.values().map(BTreeMap::len).sum::<usize>(),
            warnings = warnings.len(),
            "policy compiled"
        );

        Ok(Self {
            revision,
            name,
            config,
            events,
            warnings,
        })
    }

    pub fn runner_for(&self, event: &str, action: &str) -> Option<&Runner> {
        self.events.get(event)?.get(action)
    }

    /// All `(event, action)` pairs with a runner, sorted.
    pub fn triggers(&self) -> impl Iterator<Item = (&str, &str)> {
        self.events.iter().flat_map(|(event, runners)| {
            runners
                .keys()
                .map(move |action| (event.as_str(), action.as_str()))
        })
    }

    pub fn warnings(&self) -> &[PolicyWarning] {
        &self.warnings
    }

    /// Evaluates the trigger matching the snapshot, then flushes pooled
    /// actions. Any lookup or executor error aborts the run; mutations already
    /// applied are not rolled back.
    pub fn evaluate(
        &self,
        snapshot: &EventSnapshot,
        lookup: &dyn RepoLookup,
        executor: &mut dyn ActionExecutor,
    ) -> Result<EvaluationSummary> {
        let Some(runner) = self.runner_for(&snapshot.event, &snapshot.action) else {
            tracing::debug!(
                event = %snapshot.event,
                action = %snapshot.action,
                "no policy for trigger"
            );
            return Ok(EvaluationSummary::default());
        };

        let mut state = State::new(snapshot, lookup, executor);
        let span = state.span().clone();
        tracing::info!(parent: &span, "evaluating policy");

        let outcome = runner
            .run(&mut state)
            .and_then(|()| state.run_pooled_actions().map(|_| ()));
        if let Err(e) = outcome {
            tracing::warn!(parent: &span, error = %e, "evaluation aborted");
            return Err(e);
        }

        let summary = state.into_summary();
        tracing::info!(
            parent: &span,
            passed = summary.groups_passed,
            failed = summary.groups_failed,
            applied = summary.actions_applied,
            "policy evaluated"
        );
        Ok(summary)
    }
}
