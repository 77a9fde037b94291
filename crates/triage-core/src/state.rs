use crate::action::{Action, ActionExecutor, Mutation};
use crate::error::Result;
use crate::event::{EventSnapshot, Item};
use crate::metadata;
use crate::repo::{Milestone, Project, ProjectColumn, RepoLookup};
use chrono::{DateTime, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::cell::OnceCell;
use std::collections::{BTreeMap, BTreeSet, HashMap, VecDeque};
use std::sync::OnceLock;
use tracing::Span;

// ---------------------------------------------------------------------------
// EvaluationSummary
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EvaluationSummary {
    pub groups_passed: usize,
    pub groups_failed: usize,
    pub actions_applied: usize,
    pub actions_skipped: usize,
    pub pooled_flushed: usize,
}

// ---------------------------------------------------------------------------
// State
// ---------------------------------------------------------------------------

/// Per-event evaluation context.
///
/// Created once per event, threaded by `&mut` through the runner tree and
/// dropped after the pooled actions are flushed. Checks only ever see `&State`.
pub struct State<'a> {
    event: &'a EventSnapshot,
    metadata: BTreeMap<String, String>,
    has_v2_metadata: bool,
    variables: BTreeMap<String, String>,
    labels: BTreeSet<String>,
    milestones: Option<Vec<Milestone>>,
    projects: Option<Vec<Project>>,
    project_columns: HashMap<String, Vec<ProjectColumn>>,
    pooled: VecDeque<Action>,
    query_document: OnceCell<serde_json::Value>,
    lookup: &'a dyn RepoLookup,
    executor: &'a mut dyn ActionExecutor,
    span: Span,
    summary: EvaluationSummary,
}

static PLACEHOLDER_RE: OnceLock<Regex> = OnceLock::new();

fn placeholder_re() -> &'static Regex {
    PLACEHOLDER_RE.get_or_init(|| Regex::new(r"\{([A-Za-z0-9_.\-]+)\}").unwrap())
}

impl<'a> State<'a> {
    pub fn new(
        event: &'a EventSnapshot,
        lookup: &'a dyn RepoLookup,
        executor: &'a mut dyn ActionExecutor,
    ) -> Self {
        let item = &event.item;
        let parsed = metadata::parse(item.body_text());
        let mut doc_metadata = parsed.entries;
        for (k, v) in &event.metadata {
            doc_metadata.insert(k.to_lowercase(), v.clone());
        }

        let mut variables = BTreeMap::new();
        variables.insert("number".to_string(), item.number.to_string());
        variables.insert("title".to_string(), item.title.clone());
        variables.insert("author".to_string(), item.author.clone());
        variables.insert("event".to_string(), event.event.clone());
        variables.insert("action".to_string(), event.action.clone());
        variables.extend(event.variables.clone());

        let span = tracing::info_span!(
            "policy",
            event = %event.event,
            action = %event.action,
            number = item.number
        );

        Self {
            event,
            metadata: doc_metadata,
            has_v2_metadata: parsed.v2,
            variables,
            labels: item.labels.iter().cloned().collect(),
            milestones: None,
            projects: None,
            project_columns: HashMap::new(),
            pooled: VecDeque::new(),
            query_document: OnceCell::new(),
            lookup,
            executor,
            span,
            summary: EvaluationSummary::default(),
        }
    }

    // -----------------------------------------------------------------------
    // Read-only views
    // -----------------------------------------------------------------------

    pub fn event(&self) -> &EventSnapshot {
        self.event
    }

    pub fn item(&self) -> &Item {
        &self.event.item
    }

    pub fn span(&self) -> &Span {
        &self.span
    }

    pub fn metadata(&self) -> &BTreeMap<String, String> {
        &self.metadata
    }

    pub fn metadata_value(&self, key: &str) -> Option<&str> {
        self.metadata.get(&key.to_lowercase()).map(String::as_str)
    }

    pub fn has_v2_metadata(&self) -> bool {
        self.has_v2_metadata
    }

    pub fn variables(&self) -> &BTreeMap<String, String> {
        &self.variables
    }

    pub fn variable(&self, name: &str) -> Option<&str> {
        self.variables.get(name).map(String::as_str)
    }

    /// Current label set: the snapshot labels plus label mutations applied so far.
    pub fn has_label(&self, label: &str) -> bool {
        self.labels.contains(label)
    }

    pub fn labels(&self) -> impl Iterator<Item = &str> {
        self.labels.iter().map(String::as_str)
    }

    /// Time used to pick `@next-due` milestones.
    pub fn reference_time(&self) -> DateTime<Utc> {
        self.event.item.created_at.unwrap_or_else(Utc::now)
    }

    pub fn summary(&self) -> &EvaluationSummary {
        &self.summary
    }

    pub fn into_summary(self) -> EvaluationSummary {
        self.summary
    }

    /// Replaces `{name}` placeholders with bound variables. Unbound
    /// placeholders are left exactly as written.
    pub fn expand_variables(&self, template: &str) -> String {
        placeholder_re()
            .replace_all(template, |caps: &regex::Captures<'_>| {
                match self.variables.get(&caps[1]) {
                    Some(value) => value.clone(),
                    None => caps[0].to_string(),
                }
            })
            .into_owned()
    }

    /// JSON projection of the context that `query` checks run against. Built
    /// on first use and reused for the rest of the run.
    pub fn query_document(&self) -> &serde_json::Value {
        self.query_document.get_or_init(|| {
            serde_json::json!({
                "event": self.event.event,
                "action": self.event.action,
                "item": serde_json::to_value(&self.event.item).unwrap_or(serde_json::Value::Null),
                "labels": self.labels.iter().collect::<Vec<_>>(),
                "metadata": self.metadata,
                "has_v2_metadata": self.has_v2_metadata,
                "variables": self.variables,
                "payload": self.event.payload,
            })
        })
    }

    // -----------------------------------------------------------------------
    // Memoized lookups
    // -----------------------------------------------------------------------

    pub fn milestones(&mut self) -> Result<&[Milestone]> {
        if self.milestones.is_none() {
            let fetched = self.lookup.milestones().inspect_err(|e| {
                tracing::warn!(parent: &self.span, error = %e, "milestone lookup failed");
            })?;
            tracing::debug!(parent: &self.span, count = fetched.len(), "milestones cached");
            self.milestones = Some(fetched);
        }
        Ok(self.milestones.as_deref().unwrap_or(&[]))
    }

    pub fn projects(&mut self) -> Result<&[Project]> {
        if self.projects.is_none() {
            let fetched = self.lookup.projects().inspect_err(|e| {
                tracing::warn!(parent: &self.span, error = %e, "project lookup failed");
            })?;
            tracing::debug!(parent: &self.span, count = fetched.len(), "projects cached");
            self.projects = Some(fetched);
        }
        Ok(self.projects.as_deref().unwrap_or(&[]))
    }

    pub fn project_columns(&mut self, project_id: &str) -> Result<&[ProjectColumn]> {
        if !self.project_columns.contains_key(project_id) {
            let fetched = self.lookup.project_columns(project_id).inspect_err(|e| {
                tracing::warn!(parent: &self.span, project_id, error = %e, "column lookup failed");
            })?;
            tracing::debug!(parent: &self.span, project_id, count = fetched.len(), "columns cached");
            self.project_columns.insert(project_id.to_string(), fetched);
        }
        Ok(self
            .project_columns
            .get(project_id)
            .map(Vec::as_slice)
            .unwrap_or(&[]))
    }

    // -----------------------------------------------------------------------
    // Pooled actions
    // -----------------------------------------------------------------------

    pub fn enqueue_pooled_action(&mut self, action: Action) {
        self.pooled.push_back(action);
    }

    pub fn pooled_len(&self) -> usize {
        self.pooled.len()
    }

    /// Drains the pooled queue in FIFO order. Called once, after the root
    /// runner has finished; returns how many pooled actions ran.
    pub fn run_pooled_actions(&mut self) -> Result<usize> {
        let mut flushed = 0;
        while let Some(action) = self.pooled.pop_front() {
            action.execute(self)?;
            flushed += 1;
        }
        self.summary.pooled_flushed += flushed;
        if flushed > 0 {
            tracing::debug!(parent: &self.span, flushed, "pooled actions flushed");
        }
        Ok(flushed)
    }

    // -----------------------------------------------------------------------
    // Mutation bookkeeping
    // -----------------------------------------------------------------------

    pub fn apply(&mut self, mutation: Mutation) -> Result<()> {
        tracing::info!(parent: &self.span, op = mutation.op(), "applying mutation");
        self.executor.apply(self.event.item.number, &mutation)?;
        match &mutation {
            Mutation::AddLabels { labels } => self.labels.extend(labels.iter().cloned()),
            Mutation::RemoveLabels { labels } => {
                for l in labels {
                    self.labels.remove(l);
                }
            }
            _ => {}
        }
        if matches!(
            mutation,
            Mutation::AddLabels { .. } | Mutation::RemoveLabels { .. }
        ) {
            // `labels` in the query document must track the live set.
            self.query_document.take();
        }
        self.summary.actions_applied += 1;
        Ok(())
    }

    pub(crate) fn skip(&mut self, op: &str, reason: &str) {
        tracing::debug!(parent: &self.span, op, reason, "action skipped");
        self.summary.actions_skipped += 1;
    }

    pub(crate) fn record_group(&mut self, passed: bool) {
        if passed {
            self.summary.groups_passed += 1;
        } else {
            self.summary.groups_failed += 1;
        }
    }
}
