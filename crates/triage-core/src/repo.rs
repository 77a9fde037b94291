use crate::error::Result;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Milestone {
    pub number: u64,
    pub title: String,
    #[serde(default = "default_open")]
    pub open: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub due_on: Option<DateTime<Utc>>,
}

fn default_open() -> bool {
    true
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Project {
    pub id: String,
    pub number: u64,
    #[serde(default)]
    pub title: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProjectColumn {
    pub id: String,
    pub name: String,
}

/// Read-only repository lookups supplied by the host.
///
/// The evaluation context calls each method at most once per run (per project
/// id for columns) and memoizes the answer. An `Err` aborts the run.
pub trait RepoLookup {
    fn milestones(&self) -> Result<Vec<Milestone>>;

    fn projects(&self) -> Result<Vec<Project>>;

    fn project_columns(&self, project_id: &str) -> Result<Vec<ProjectColumn>>;
}

/// Picks the open milestone due soonest at or after `reference`.
pub fn next_due(milestones: &[Milestone], reference: DateTime<Utc>) -> Option<&Milestone> {
    milestones
        .iter()
        .filter(|m| m.open)
        .filter_map(|m| m.due_on.filter(|due| *due >= reference).map(|due| (due, m)))
        .min_by_key(|(due, _)| *due)
        .map(|(_, m)| m)
}
