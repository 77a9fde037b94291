//! Doc metadata carried in issue and pull request bodies.
//!
//! Two layouts are recognised:
//!
//! * v1: bullet lines (`* Key: value`) following a `Document Details` heading,
//!   as written by the docs feedback issue template.
//! * v2: an HTML comment block opening with `<!-- metadata` whose content is a
//!   YAML mapping. Its presence sets [`DocMetadata::v2`] and its keys win over v1.
//!
//! Keys are lowercased so lookups are case-insensitive.

use regex::Regex;
use std::collections::BTreeMap;
use std::sync::OnceLock;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct DocMetadata {
    pub entries: BTreeMap<String, String>,
    pub v2: bool,
}

static HEADING_RE: OnceLock<Regex> = OnceLock::new();
static BULLET_RE: OnceLock<Regex> = OnceLock::new();
static V2_RE: OnceLock<Regex> = OnceLock::new();

fn heading_re() -> &'static Regex {
    HEADING_RE.get_or_init(|| Regex::new(r"(?i)^\s*#{1,6}\s*document details\s*$").unwrap())
}

fn bullet_re() -> &'static Regex {
    BULLET_RE.get_or_init(|| Regex::new(r"^\s*[*-]\s+([^:]+?)\s*:\s*(.*?)\s*$").unwrap())
}

fn v2_re() -> &'static Regex {
    V2_RE.get_or_init(|| Regex::new(r"(?s)<!--\s*metadata[ \t]*\r?\n(.*?)-->").unwrap())
}

pub fn parse(body: &str) -> DocMetadata {
    let mut meta = DocMetadata {
        entries: parse_v1(body),
        v2: false,
    };

    if let Some(block) = v2_re().captures(body).and_then(|c| c.get(1)) {
        match serde_yaml::from_str::<serde_yaml::Value>(block.as_str()) {
            Ok(serde_yaml::Value::Mapping(map)) => {
                meta.v2 = true;
                for (k, v) in map {
                    if let (Some(key), Some(value)) = (scalar_string(&k), scalar_string(&v)) {
                        meta.entries.insert(key.to_lowercase(), value);
                    }
                }
            }
            Ok(serde_yaml::Value::Null) => meta.v2 = true,
            Ok(_) => tracing::debug!("metadata comment is not a mapping; ignoring"),
            Err(e) => tracing::debug!(error = %e, "metadata comment is not valid YAML; ignoring"),
        }
    }

    meta
}

fn parse_v1(body: &str) -> BTreeMap<String, String> {
    let mut entries = BTreeMap::new();
    let mut in_details = false;

    for line in body.lines() {
        if heading_re().is_match(line) {
            in_details = true;
            continue;
        }
        if !in_details {
            continue;
        }
        // Any other heading ends the section.
        if line.trim_start().starts_with('#') {
            break;
        }
        if let Some(caps) = bullet_re().captures(line) {
            let key = clean_value(&caps[1]).to_lowercase();
            let value = clean_value(&caps[2]);
            entries.insert(key, value);
        }
    }

    entries
}

fn clean_value(raw: &str) -> String {
    raw.replace("**", "").replace('`', "").trim().to_string()
}

/// Renders a YAML scalar as a string; `None` for sequences and mappings.
pub(crate) fn scalar_string(value: &serde_yaml::Value) -> Option<String> {
    match value {
        serde_yaml::Value::String(s) => Some(s.clone()),
        serde_yaml::Value::Bool(b) => Some(b.to_string()),
        serde_yaml::Value::Number(n) => Some(n.to_string()),
        serde_yaml::Value::Null => Some(String::new()),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const V1_BODY: &str = "\
The sample on this page does not compile.

---
#### Document Details

*Do not edit this section.*

* ID: 6f2b-1c
* Content Source: [docs/core/tutorial.md](https://example.com)
* Service: **dotnet-fundamentals**
* GitHub Login: `@writer`
";

    #[test]
    fn parses_v1_document_details() {
        let meta = parse(V1_BODY);
        assert!(!meta.v2);
        assert_eq!(meta.entries.get("id").map(String::as_str), Some("6f2b-1c"));
        assert_eq!(
            meta.entries.get("service").map(String::as_str),
            Some("dotnet-fundamentals")
        );
        assert_eq!(
            meta.entries.get("github login").map(String::as_str),
            Some("@writer")
        );
    }

    #[test]
    fn bullets_outside_details_are_ignored() {
        let meta = parse("* not: metadata\n\nplain text");
        assert!(meta.entries.is_empty());
    }

    #[test]
    fn later_heading_ends_details() {
        let body = "## Document Details\n* ms.date: 2024-02-01\n## Other\n* extra: nope\n";
        let meta = parse(body);
        assert_eq!(meta.entries.len(), 1);
        assert_eq!(
            meta.entries.get("ms.date").map(String::as_str),
            Some("2024-02-01")
        );
    }

    #[test]
    fn parses_v2_comment_and_overrides_v1() {
        let body = "\
#### Document Details
* ms.author: old

<!-- metadata
ms.author: new
ms.date: 2024-05-01
ms.topic: how-to
priority: 2
-->
";
        let meta = parse(body);
        assert!(meta.v2);
        assert_eq!(meta.entries.get("ms.author").map(String::as_str), Some("new"));
        assert_eq!(meta.entries.get("ms.date").map(String::as_str), Some("2024-05-01"));
        assert_eq!(meta.entries.get("priority").map(String::as_str), Some("2"));
    }

    #[test]
    fn malformed_v2_block_is_ignored() {
        let meta = parse("<!-- metadata\n: : [\n-->");
        assert!(!meta.v2);
        assert!(meta.entries.is_empty());
    }

    #[test]
    fn empty_body_has_no_metadata() {
        assert_eq!(parse(""), DocMetadata::default());
    }
}
