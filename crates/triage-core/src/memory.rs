//! In-memory host doubles: fixture-backed lookups and a recording executor.
//! Used by the CLI dry run and by tests.

use crate::action::{ActionExecutor, Mutation};
use crate::error::{PolicyError, Result};
use crate::repo::{Milestone, Project, ProjectColumn, RepoLookup};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicUsize, Ordering};

// ---------------------------------------------------------------------------
// InMemoryLookup
// ---------------------------------------------------------------------------

#[derive(Debug, Default, Deserialize)]
pub struct InMemoryLookup {
    #[serde(default)]
    pub milestones: Vec<Milestone>,
    #[serde(default)]
    pub projects: Vec<Project>,
    /// Columns keyed by project id.
    #[serde(default)]
    pub columns: BTreeMap<String, Vec<ProjectColumn>>,
    /// Resource whose lookup fails: `milestones`, `projects` or `columns`.
    #[serde(default)]
    pub fail: Option<String>,
    #[serde(skip)]
    calls: LookupCalls,
}

#[derive(Debug, Default)]
struct LookupCalls {
    milestones: AtomicUsize,
    projects: AtomicUsize,
    columns: AtomicUsize,
}

impl InMemoryLookup {
    pub fn with_milestones(mut self, milestones: Vec<Milestone>) -> Self {
        self.milestones = milestones;
        self
    }

    pub fn with_project(mut self, project: Project, columns: Vec<ProjectColumn>) -> Self {
        self.columns.insert(project.id.clone(), columns);
        self.projects.push(project);
        self
    }

    pub fn failing(mut self, resource: impl Into<String>) -> Self {
        self.fail = Some(resource.into());
        self
    }

    pub fn milestone_calls(&self) -> usize {
        self.calls.milestones.load(Ordering::SeqCst)
    }

    pub fn project_calls(&self) -> usize {
        self.calls.projects.load(Ordering::SeqCst)
    }

    pub fn column_calls(&self) -> usize {
        self.calls.columns.load(Ordering::SeqCst)
    }

    fn check_failure(&self, resource: &str) -> Result<()> {
        match &self.fail {
            Some(f) if f == resource => Err(PolicyError::lookup(resource, "injected failure")),
            _ => Ok(()),
        }
    }
}

impl RepoLookup for InMemoryLookup {
    fn milestones(&self) -> Result<Vec<Milestone>> {
        self.calls.milestones.fetch_add(1, Ordering::SeqCst);
        self.check_failure("milestones")?;
        Ok(self.milestones.clone())
    }

    fn projects(&self) -> Result<Vec<Project>> {
        self.calls.projects.fetch_add(1, Ordering::SeqCst);
        self.check_failure("projects")?;
        Ok(self.projects.clone())
    }

    fn project_columns(&self, project_id: &str) -> Result<Vec<ProjectColumn>> {
        self.calls.columns.fetch_add(1, Ordering::SeqCst);
        self.check_failure("columns")?;
        Ok(self.columns.get(project_id).cloned().unwrap_or_default())
    }
}

// ---------------------------------------------------------------------------
// RecordingExecutor
// ---------------------------------------------------------------------------

/// Records every mutation instead of sending it anywhere.
#[derive(Debug, Default)]
pub struct RecordingExecutor {
    pub applied: Vec<(u64, Mutation)>,
    fail_on: Option<String>,
}

impl RecordingExecutor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fails every mutation whose op equals `op`.
    pub fn failing_on(op: impl Into<String>) -> Self {
        Self {
            applied: Vec::new(),
            fail_on: Some(op.into()),
        }
    }

    pub fn mutations(&self) -> Vec<&Mutation> {
        self.applied.iter().map(|(_, m)| m).collect()
    }

    pub fn count(&self, op: &str) -> usize {
        self.applied.iter().filter(|(_, m)| m.op() == op).count()
    }
}

impl ActionExecutor for RecordingExecutor {
    fn apply(&mut self, number: u64, mutation: &Mutation) -> Result<()> {
        if self.fail_on.as_deref() == Some(mutation.op()) {
            return Err(PolicyError::action(mutation.op(), "injected failure"));
        }
        self.applied.push((number, mutation.clone()));
        Ok(())
    }
}
