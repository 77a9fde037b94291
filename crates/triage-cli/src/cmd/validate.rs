use crate::output::print_json;
use anyhow::Context;
use std::path::Path;
use triage_core::policy::{Policy, WarnLevel};

pub fn run(path: &Path, json: bool) -> anyhow::Result<()> {
    let policy = Policy::load(path)
        .with_context(|| format!("failed to load policy {}", path.display()))?;
    let triggers: Vec<String> = policy
        .triggers()
        .map(|(event, action)| format!("{event}.{action}"))
        .collect();

    if json {
        let value = serde_json::json!({
            "name": policy.name,
            "revision": policy.revision,
            "triggers": triggers,
            "warnings": policy.warnings(),
        });
        return print_json(&value);
    }

    match &policy.name {
        Some(name) => println!("Policy:   {name} (revision {})", policy.revision),
        None => println!("Policy:   {} (revision {})", path.display(), policy.revision),
    }
    if triggers.is_empty() {
        println!("Triggers: none");
    } else {
        println!("Triggers: {}", triggers.join(", "));
    }

    if policy.warnings().is_empty() {
        println!("Policy is valid. No warnings.");
    } else {
        for w in policy.warnings() {
            let prefix = match w.level {
                WarnLevel::Info => "info",
                WarnLevel::Warning => "warning",
            };
            println!("[{prefix}] {}: {}", w.at, w.message);
        }
    }
    Ok(())
}
