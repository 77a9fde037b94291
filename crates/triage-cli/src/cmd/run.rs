use crate::output::{print_json, print_table};
use anyhow::Context;
use std::path::Path;
use triage_core::action::Mutation;
use triage_core::event::EventSnapshot;
use triage_core::memory::{InMemoryLookup, RecordingExecutor};
use triage_core::policy::Policy;

pub fn run(
    policy_path: &Path,
    event_path: &Path,
    fixtures: Option<&Path>,
    json: bool,
) -> anyhow::Result<()> {
    let policy = Policy::load(policy_path)
        .with_context(|| format!("failed to load policy {}", policy_path.display()))?;

    let data = std::fs::read_to_string(event_path)
        .with_context(|| format!("failed to read event {}", event_path.display()))?;
    let snapshot: EventSnapshot =
        serde_json::from_str(&data).context("failed to parse event snapshot")?;

    let lookup = match fixtures {
        Some(path) => {
            let data = std::fs::read_to_string(path)
                .with_context(|| format!("failed to read fixtures {}", path.display()))?;
            serde_json::from_str::<InMemoryLookup>(&data).context("failed to parse fixtures")?
        }
        None => InMemoryLookup::default(),
    };

    let mut executor = RecordingExecutor::new();
    let summary = policy
        .evaluate(&snapshot, &lookup, &mut executor)
        .with_context(|| format!("evaluation of {}.{} failed", snapshot.event, snapshot.action))?;

    if json {
        let mutations: Vec<_> = executor
            .applied
            .iter()
            .map(|(number, mutation)| serde_json::json!({ "number": number, "mutation": mutation }))
            .collect();
        let value = serde_json::json!({
            "summary": summary,
            "mutations": mutations,
        });
        return print_json(&value);
    }

    if executor.applied.is_empty() {
        println!("No mutations planned.");
    } else {
        let rows = executor
            .applied
            .iter()
            .map(|(number, mutation)| {
                vec![
                    format!("#{number}"),
                    mutation.op().to_string(),
                    describe(mutation),
                ]
            })
            .collect();
        print_table(&["ITEM", "OP", "DETAIL"], rows);
    }
    println!();
    println!(
        "Groups: {} passed, {} failed. Actions: {} applied, {} skipped.",
        summary.groups_passed,
        summary.groups_failed,
        summary.actions_applied,
        summary.actions_skipped
    );
    Ok(())
}

fn describe(mutation: &Mutation) -> String {
    match mutation {
        Mutation::AddLabels { labels } | Mutation::RemoveLabels { labels } => labels.join(", "),
        Mutation::AddAssignees { logins } | Mutation::AddReviewers { logins } => logins.join(", "),
        Mutation::AddComment { body } => body.lines().next().unwrap_or_default().to_string(),
        Mutation::SetMilestone { number, title } => format!("{title} (#{number})"),
        Mutation::AddToProject {
            project_id,
            column_id,
        } => format!("{project_id} / {column_id}"),
        Mutation::RemoveMilestone | Mutation::Close | Mutation::Reopen => String::new(),
    }
}
