use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

// ---------------------------------------------------------------------------
// ItemKind
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ItemKind {
    Issue,
    PullRequest,
}

impl ItemKind {
    pub fn as_str(self) -> &'static str {
        match self {
            ItemKind::Issue => "issue",
            ItemKind::PullRequest => "pull_request",
        }
    }
}

impl fmt::Display for ItemKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// ItemState
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ItemState {
    #[default]
    Open,
    Closed,
}

// ---------------------------------------------------------------------------
// Item
// ---------------------------------------------------------------------------

/// Projection of the issue or pull request the event is about.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Item {
    pub number: u64,
    pub kind: ItemKind,
    #[serde(default)]
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub body: Option<String>,
    #[serde(default)]
    pub author: String,
    #[serde(default)]
    pub labels: Vec<String>,
    #[serde(default)]
    pub draft: bool,
    #[serde(default)]
    pub state: ItemState,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
}

impl Item {
    pub fn issue(number: u64, title: impl Into<String>) -> Self {
        Self {
            number,
            kind: ItemKind::Issue,
            title: title.into(),
            body: None,
            author: String::new(),
            labels: Vec::new(),
            draft: false,
            state: ItemState::Open,
            created_at: None,
        }
    }

    pub fn pull_request(number: u64, title: impl Into<String>) -> Self {
        Self {
            kind: ItemKind::PullRequest,
            ..Self::issue(number, title)
        }
    }

    pub fn is_pull_request(&self) -> bool {
        self.kind == ItemKind::PullRequest
    }

    pub fn body_text(&self) -> &str {
        self.body.as_deref().unwrap_or("")
    }
}

// ---------------------------------------------------------------------------
// EventSnapshot
// ---------------------------------------------------------------------------

/// Everything the host knows about one repository event. Immutable for the
/// duration of an evaluation run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventSnapshot {
    /// Event type, e.g. `issues` or `pull_request`.
    pub event: String,
    /// Event action, e.g. `opened` or `labeled`.
    pub action: String,
    pub item: Item,
    /// Initial variable bindings. These win over the built-in variables.
    #[serde(default)]
    pub variables: BTreeMap<String, String>,
    /// Metadata the host already extracted; overrides anything parsed from the body.
    #[serde(default)]
    pub metadata: BTreeMap<String, String>,
    /// Raw webhook payload, exposed to `query` checks.
    #[serde(default)]
    pub payload: serde_json::Value,
}

impl EventSnapshot {
    pub fn new(event: impl Into<String>, action: impl Into<String>, item: Item) -> Self {
        Self {
            event: event.into(),
            action: action.into(),
            item,
            variables: BTreeMap::new(),
            metadata: BTreeMap::new(),
            payload: serde_json::Value::Null,
        }
    }

    pub fn with_body(mut self, body: impl Into<String>) -> Self {
        self.item.body = Some(body.into());
        self
    }

    pub fn with_variable(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.variables.insert(name.into(), value.into());
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn snapshot_json_defaults() {
        let json = r#"{
            "event": "pull_request",
            "action": "opened",
            "item": { "number": 7, "kind": "pull_request", "draft": true }
        }"#;
        let snap: EventSnapshot = serde_json::from_str(json).unwrap();
        assert!(snap.item.is_pull_request());
        assert!(snap.item.draft);
        assert_eq!(snap.item.state, ItemState::Open);
        assert_eq!(snap.item.body_text(), "");
        assert!(snap.variables.is_empty());
        assert!(snap.payload.is_null());
    }

    #[test]
    fn item_kind_serializes_snake_case() {
        let item = Item::pull_request(1, "x");
        let json = serde_json::to_value(&item).unwrap();
        assert_eq!(json["kind"], "pull_request");
        assert!(json.get("body").is_none());
    }
}
