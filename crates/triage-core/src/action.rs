use crate::error::{ConfigError, Result};
use crate::metadata::scalar_string;
use crate::repo::{next_due, Milestone};
use crate::state::State;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_yaml::Value;

// ---------------------------------------------------------------------------
// Mutation (what the host executes)
// ---------------------------------------------------------------------------

/// A fully resolved remote change for the item the event is about.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "kebab-case")]
pub enum Mutation {
    AddLabels { labels: Vec<String> },
    RemoveLabels { labels: Vec<String> },
    AddAssignees { logins: Vec<String> },
    AddReviewers { logins: Vec<String> },
    AddComment { body: String },
    SetMilestone { number: u64, title: String },
    RemoveMilestone,
    AddToProject { project_id: String, column_id: String },
    Close,
    Reopen,
}

impl Mutation {
    pub fn op(&self) -> &'static str {
        match self {
            Mutation::AddLabels { .. } => "add-labels",
            Mutation::RemoveLabels { .. } => "remove-labels",
            Mutation::AddAssignees { .. } => "add-assignees",
            Mutation::AddReviewers { .. } => "add-reviewers",
            Mutation::AddComment { .. } => "add-comment",
            Mutation::SetMilestone { .. } => "set-milestone",
            Mutation::RemoveMilestone => "remove-milestone",
            Mutation::AddToProject { .. } => "add-to-project",
            Mutation::Close => "close",
            Mutation::Reopen => "reopen",
        }
    }
}

/// Host side of the engine: sends resolved mutations to the remote API.
pub trait ActionExecutor {
    fn apply(&mut self, number: u64, mutation: &Mutation) -> Result<()>;
}

// ---------------------------------------------------------------------------
// MilestoneRef
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MilestoneRef {
    Number(u64),
    /// Exact title; a title that parses as a number also matches by number.
    Title(String),
    /// The open milestone due soonest at or after the event's creation time.
    NextDue,
}

const NEXT_DUE: &str = "@next-due";

fn resolve_milestone<'m>(
    milestones: &'m [Milestone],
    target: &MilestoneRef,
    reference: DateTime<Utc>,
) -> Option<&'m Milestone> {
    match target {
        MilestoneRef::Number(n) => milestones.iter().find(|m| m.number == *n),
        MilestoneRef::Title(title) => milestones
            .iter()
            .find(|m| m.title == *title)
            .or_else(|| {
                let n: u64 = title.parse().ok()?;
                milestones.iter().find(|m| m.number == n)
            }),
        MilestoneRef::NextDue => next_due(milestones, reference),
    }
}

// ---------------------------------------------------------------------------
// Action (compiled action node)
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    AddLabels(Vec<String>),
    RemoveLabels(Vec<String>),
    AddAssignees(Vec<String>),
    AddReviewers(Vec<String>),
    AddComment(String),
    SetMilestone(MilestoneRef),
    RemoveMilestone,
    AddToProject { project: u64, column: String },
    Close,
    Reopen,
}

pub const ACTION_NAMES: &[&str] = &[
    "add-labels",
    "remove-labels",
    "add-assignees",
    "add-reviewers",
    "add-comment",
    "set-milestone",
    "remove-milestone",
    "add-to-project",
    "close",
    "reopen",
];

impl Action {
    pub fn name(&self) -> &'static str {
        match self {
            Action::AddLabels(_) => "add-labels",
            Action::RemoveLabels(_) => "remove-labels",
            Action::AddAssignees(_) => "add-assignees",
            Action::AddReviewers(_) => "add-reviewers",
            Action::AddComment(_) => "add-comment",
            Action::SetMilestone(_) => "set-milestone",
            Action::RemoveMilestone => "remove-milestone",
            Action::AddToProject { .. } => "add-to-project",
            Action::Close => "close",
            Action::Reopen => "reopen",
        }
    }

    /// Label changes and project placement are deferred until the whole tree
    /// has run; everything else applies in tree order.
    pub fn is_pooled(&self) -> bool {
        matches!(
            self,
            Action::AddLabels(_) | Action::RemoveLabels(_) | Action::AddToProject { .. }
        )
    }

    /// Builds an action from its node key and argument.
    pub fn build(name: &str, arg: &Value, at: &str) -> std::result::Result<Self, ConfigError> {
        let action = match name {
            "add-labels" => Action::AddLabels(string_list(arg, name, at)?),
            "remove-labels" => Action::RemoveLabels(string_list(arg, name, at)?),
            "add-assignees" => Action::AddAssignees(string_list(arg, name, at)?),
            "add-reviewers" => Action::AddReviewers(string_list(arg, name, at)?),
            "add-comment" => match arg {
                Value::String(s) if !s.trim().is_empty() => Action::AddComment(s.clone()),
                _ => return Err(invalid(name, at, "expected a non-empty comment template")),
            },
            "set-milestone" => match arg {
                Value::Number(n) => match n.as_u64() {
                    Some(n) => Action::SetMilestone(MilestoneRef::Number(n)),
                    None => return Err(invalid(name, at, "milestone number must be positive")),
                },
                Value::String(s) if s == NEXT_DUE => Action::SetMilestone(MilestoneRef::NextDue),
                Value::String(s) if !s.trim().is_empty() => {
                    Action::SetMilestone(MilestoneRef::Title(s.clone()))
                }
                _ => return Err(invalid(name, at, "expected a milestone number or title")),
            },
            "remove-milestone" => Action::RemoveMilestone,
            "add-to-project" => {
                let map = arg
                    .as_mapping()
                    .ok_or_else(|| invalid(name, at, "expected a mapping with project and column"))?;
                let project = map
                    .get("project")
                    .ok_or_else(|| ConfigError::MissingField {
                        field: "project",
                        at: at.to_string(),
                    })?
                    .as_u64()
                    .ok_or_else(|| invalid("project", at, "expected a project number"))?;
                let column = map
                    .get("column")
                    .and_then(scalar_string)
                    .filter(|c| !c.is_empty())
                    .ok_or_else(|| ConfigError::MissingField {
                        field: "column",
                        at: at.to_string(),
                    })?;
                Action::AddToProject { project, column }
            }
            "close" => Action::Close,
            "reopen" => Action::Reopen,
            other => {
                return Err(ConfigError::UnknownNode {
                    at: at.to_string(),
                    reason: format!(
                        "unknown action '{other}' (expected one of: {})",
                        ACTION_NAMES.join(", ")
                    ),
                })
            }
        };
        Ok(action)
    }

    /// Expands `{variable}` placeholders in every string argument.
    pub fn expand(&self, state: &State<'_>) -> Action {
        let list = |items: &[String]| -> Vec<String> {
            items.iter().map(|s| state.expand_variables(s)).collect()
        };
        match self {
            Action::AddLabels(l) => Action::AddLabels(list(l)),
            Action::RemoveLabels(l) => Action::RemoveLabels(list(l)),
            Action::AddAssignees(l) => Action::AddAssignees(list(l)),
            Action::AddReviewers(l) => Action::AddReviewers(list(l)),
            Action::AddComment(body) => Action::AddComment(state.expand_variables(body)),
            Action::SetMilestone(MilestoneRef::Title(t)) => {
                Action::SetMilestone(MilestoneRef::Title(state.expand_variables(t)))
            }
            Action::AddToProject { project, column } => Action::AddToProject {
                project: *project,
                column: state.expand_variables(column),
            },
            other => other.clone(),
        }
    }

    /// Runs the action as a tree node: pooled actions are queued, the rest
    /// execute immediately.
    pub fn run(&self, state: &mut State<'_>) -> Result<()> {
        let action = self.expand(state);
        if action.is_pooled() {
            tracing::debug!(parent: state.span(), action = action.name(), "action pooled");
            state.enqueue_pooled_action(action);
            Ok(())
        } else {
            action.execute(state)
        }
    }

    /// Resolves the action against the context and hands the mutation to the
    /// executor. Unresolvable targets are skipped; lookup failures propagate.
    pub fn execute(&self, state: &mut State<'_>) -> Result<()> {
        match self {
            Action::AddLabels(labels) => {
                let missing: Vec<String> = labels
                    .iter()
                    .filter(|l| !state.has_label(l))
                    .cloned()
                    .collect();
                if missing.is_empty() {
                    state.skip(self.name(), "labels already present");
                    return Ok(());
                }
                state.apply(Mutation::AddLabels { labels: missing })
            }
            Action::RemoveLabels(labels) => {
                let present: Vec<String> = labels
                    .iter()
                    .filter(|l| state.has_label(l))
                    .cloned()
                    .collect();
                if present.is_empty() {
                    state.skip(self.name(), "labels not present");
                    return Ok(());
                }
                state.apply(Mutation::RemoveLabels { labels: present })
            }
            Action::AddAssignees(logins) => state.apply(Mutation::AddAssignees {
                logins: logins.clone(),
            }),
            Action::AddReviewers(logins) => {
                if !state.item().is_pull_request() {
                    tracing::warn!(parent: state.span(), "reviewers requested on an issue");
                    state.skip(self.name(), "item is not a pull request");
                    return Ok(());
                }
                state.apply(Mutation::AddReviewers {
                    logins: logins.clone(),
                })
            }
            Action::AddComment(body) => state.apply(Mutation::AddComment { body: body.clone() }),
            Action::SetMilestone(target) => {
                let reference = state.reference_time();
                let found = resolve_milestone(state.milestones()?, target, reference).cloned();
                match found {
                    Some(m) => state.apply(Mutation::SetMilestone {
                        number: m.number,
                        title: m.title,
                    }),
                    None => {
                        tracing::warn!(parent: state.span(), milestone = ?target, "milestone not found");
                        state.skip(self.name(), "milestone not found");
                        Ok(())
                    }
                }
            }
            Action::RemoveMilestone => state.apply(Mutation::RemoveMilestone),
            Action::AddToProject { project, column } => {
                let project_id = state
                    .projects()?
                    .iter()
                    .find(|p| p.number == *project)
                    .map(|p| p.id.clone());
                let Some(project_id) = project_id else {
                    tracing::warn!(parent: state.span(), project, "project not found");
                    state.skip(self.name(), "project not found");
                    return Ok(());
                };
                let column_id = state
                    .project_columns(&project_id)?
                    .iter()
                    .find(|c| c.name.eq_ignore_ascii_case(column))
                    .map(|c| c.id.clone());
                let Some(column_id) = column_id else {
                    tracing::warn!(parent: state.span(), project, column = %column, "project column not found");
                    state.skip(self.name(), "column not found");
                    return Ok(());
                };
                state.apply(Mutation::AddToProject {
                    project_id,
                    column_id,
                })
            }
            Action::Close => state.apply(Mutation::Close),
            Action::Reopen => state.apply(Mutation::Reopen),
        }
    }
}

fn invalid(field: &str, at: &str, reason: &str) -> ConfigError {
    ConfigError::InvalidField {
        field: field.to_string(),
        at: at.to_string(),
        reason: reason.to_string(),
    }
}

fn string_list(arg: &Value, name: &str, at: &str) -> std::result::Result<Vec<String>, ConfigError> {
    let items: Vec<String> = match arg {
        Value::Sequence(seq) => seq
            .iter()
            .map(|v| {
                scalar_string(v)
                    .filter(|s| !s.is_empty())
                    .ok_or_else(|| invalid(name, at, "expected a list of strings"))
            })
            .collect::<std::result::Result<_, _>>()?,
        other => match scalar_string(other).filter(|s| !s.is_empty()) {
            Some(s) => vec![s],
            None => return Err(invalid(name, at, "expected a string or list of strings")),
        },
    };
    if items.is_empty() {
        return Err(invalid(name, at, "expected at least one value"));
    }
    Ok(items)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::{EventSnapshot, Item};
    use crate::memory::{InMemoryLookup, RecordingExecutor};
    use crate::repo::{Project, ProjectColumn};
    use chrono::TimeZone;

    fn yaml(s: &str) -> Value {
        serde_yaml::from_str(s).unwrap()
    }

    #[test]
    fn build_accepts_scalar_or_list() {
        assert_eq!(
            Action::build("add-labels", &yaml("bug"), "t").unwrap(),
            Action::AddLabels(vec!["bug".into()])
        );
        assert_eq!(
            Action::build("remove-labels", &yaml("[a, b]"), "t").unwrap(),
            Action::RemoveLabels(vec!["a".into(), "b".into()])
        );
    }

    #[test]
    fn build_rejects_empty_list() {
        let err = Action::build("add-labels", &yaml("[]"), "x[0]").unwrap_err();
        assert!(matches!(err, ConfigError::InvalidField { .. }));
        assert!(err.to_string().starts_with("x[0]"));
    }

    #[test]
    fn build_milestone_variants() {
        assert_eq!(
            Action::build("set-milestone", &yaml("12"), "t").unwrap(),
            Action::SetMilestone(MilestoneRef::Number(12))
        );
        assert_eq!(
            Action::build("set-milestone", &yaml("\"@next-due\""), "t").unwrap(),
            Action::SetMilestone(MilestoneRef::NextDue)
        );
        assert_eq!(
            Action::build("set-milestone", &yaml("Backlog"), "t").unwrap(),
            Action::SetMilestone(MilestoneRef::Title("Backlog".into()))
        );
    }

    #[test]
    fn build_project_requires_column() {
        let err = Action::build("add-to-project", &yaml("project: 3"), "t").unwrap_err();
        assert!(matches!(err, ConfigError::MissingField { field: "column", .. }));
    }

    #[test]
    fn build_unknown_action_is_error() {
        let err = Action::build("launch-rocket", &Value::Null, "t").unwrap_err();
        assert!(matches!(err, ConfigError::UnknownNode { .. }));
    }

    #[test]
    fn add_labels_skips_labels_already_present() {
        let mut item = Item::issue(4, "t");
        item.labels = vec!["bug".into()];
        let event = EventSnapshot::new("issues", "opened", item);
        let lookup = InMemoryLookup::default();
        let mut exec = RecordingExecutor::new();
        {
            let mut state = State::new(&event, &lookup, &mut exec);
            Action::AddLabels(vec!["bug".into(), "docs".into()])
                .execute(&mut state)
                .unwrap();
            Action::AddLabels(vec!["bug".into()])
                .execute(&mut state)
                .unwrap();
            assert_eq!(state.summary().actions_skipped, 1);
        }
        assert_eq!(
            exec.mutations(),
            vec![&Mutation::AddLabels {
                labels: vec!["docs".into()]
            }]
        );
    }

    #[test]
    fn remove_labels_only_sends_present_labels() {
        let mut item = Item::issue(4, "t");
        item.labels = vec!["needs-triage".into()];
        let event = EventSnapshot::new("issues", "opened", item);
        let lookup = InMemoryLookup::default();
        let mut exec = RecordingExecutor::new();
        {
            let mut state = State::new(&event, &lookup, &mut exec);
            Action::RemoveLabels(vec!["needs-triage".into(), "other".into()])
                .execute(&mut state)
                .unwrap();
            Action::RemoveLabels(vec!["needs-triage".into()])
                .execute(&mut state)
                .unwrap();
        }
        assert_eq!(exec.applied.len(), 1);
    }

    #[test]
    fn set_milestone_by_title_and_next_due() {
        let mut item = Item::issue(9, "t");
        item.created_at = Some(Utc.with_ymd_and_hms(2024, 2, 1, 0, 0, 0).unwrap());
        let event = EventSnapshot::new("issues", "opened", item).with_variable("sprint", "Sprint 2");
        let lookup = InMemoryLookup::default().with_milestones(vec![
            Milestone {
                number: 1,
                title: "Sprint 1".into(),
                open: true,
                due_on: Some(Utc.with_ymd_and_hms(2024, 1, 15, 0, 0, 0).unwrap()),
            },
            Milestone {
                number: 2,
                title: "Sprint 2".into(),
                open: true,
                due_on: Some(Utc.with_ymd_and_hms(2024, 2, 15, 0, 0, 0).unwrap()),
            },
        ]);
        let mut exec = RecordingExecutor::new();
        {
            let mut state = State::new(&event, &lookup, &mut exec);
            Action::SetMilestone(MilestoneRef::Title("{sprint}".into()))
                .run(&mut state)
                .unwrap();
            Action::SetMilestone(MilestoneRef::NextDue)
                .run(&mut state)
                .unwrap();
            Action::SetMilestone(MilestoneRef::Title("Nope".into()))
                .run(&mut state)
                .unwrap();
            assert_eq!(state.summary().actions_skipped, 1);
        }
        let expected = Mutation::SetMilestone {
            number: 2,
            title: "Sprint 2".into(),
        };
        assert_eq!(exec.mutations(), vec![&expected, &expected]);
        assert_eq!(lookup.milestone_calls(), 1);
    }

    #[test]
    fn add_to_project_resolves_column_at_flush() {
        let event = EventSnapshot::new("issues", "opened", Item::issue(5, "t"));
        let lookup = InMemoryLookup::default().with_project(
            Project {
                id: "P_1".into(),
                number: 3,
                title: "Docs".into(),
            },
            vec![ProjectColumn {
                id: "C_9".into(),
                name: "Triage".into(),
            }],
        );
        let mut exec = RecordingExecutor::new();
        {
            let mut state = State::new(&event, &lookup, &mut exec);
            Action::AddToProject {
                project: 3,
                column: "triage".into(),
            }
            .run(&mut state)
            .unwrap();
            assert_eq!(lookup.project_calls(), 0);
            assert_eq!(state.run_pooled_actions().unwrap(), 1);
        }
        assert_eq!(
            exec.mutations(),
            vec![&Mutation::AddToProject {
                project_id: "P_1".into(),
                column_id: "C_9".into()
            }]
        );
    }

    #[test]
    fn reviewers_on_issue_are_skipped() {
        let event = EventSnapshot::new("issues", "opened", Item::issue(5, "t"));
        let lookup = InMemoryLookup::default();
        let mut exec = RecordingExecutor::new();
        {
            let mut state = State::new(&event, &lookup, &mut exec);
            Action::AddReviewers(vec!["octocat".into()])
                .run(&mut state)
                .unwrap();
        }
        assert!(exec.applied.is_empty());
    }

    #[test]
    fn comment_expands_variables() {
        let mut item = Item::issue(5, "t");
        item.author = "mona".into();
        let event = EventSnapshot::new("issues", "opened", item);
        let lookup = InMemoryLookup::default();
        let mut exec = RecordingExecutor::new();
        {
            let mut state = State::new(&event, &lookup, &mut exec);
            Action::AddComment("Thanks @{author}, see {link}".into())
                .run(&mut state)
                .unwrap();
        }
        assert_eq!(
            exec.mutations(),
            vec![&Mutation::AddComment {
                body: "Thanks @mona, see {link}".into()
            }]
        );
    }

    #[test]
    fn mutation_serializes_with_op_tag() {
        let json = serde_json::to_value(Mutation::AddLabels {
            labels: vec!["x".into()],
        })
        .unwrap();
        assert_eq!(json["op"], "add-labels");
        assert_eq!(Mutation::RemoveMilestone.op(), "remove-milestone");
    }
}
