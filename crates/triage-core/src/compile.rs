//! Turns the policy document's node sequences into runner trees.

use crate::action::Action;
use crate::check::Check;
use crate::error::ConfigError;
use crate::group::Group;
use crate::policy::{PolicyWarning, WarnLevel};
use crate::registry::CheckRegistry;
use crate::runner::{Node, Runner};
use serde_yaml::{Mapping, Value};

const GROUP_KEYS: &[&str] = &["check", "pass", "fail", "name"];

pub struct Compiler<'r> {
    registry: &'r CheckRegistry,
    warnings: Vec<PolicyWarning>,
}

impl<'r> Compiler<'r> {
    pub fn new(registry: &'r CheckRegistry) -> Self {
        Self {
            registry,
            warnings: Vec::new(),
        }
    }

    pub fn into_warnings(self) -> Vec<PolicyWarning> {
        self.warnings
    }

    fn warn(&mut self, level: WarnLevel, at: &str, message: impl Into<String>) {
        self.warnings.push(PolicyWarning {
            level,
            at: at.to_string(),
            message: message.into(),
        });
    }

    /// A runner is a node sequence; `null` is an empty runner.
    pub fn compile_runner(&mut self, value: &Value, at: &str) -> Result<Runner, ConfigError> {
        let seq = match value {
            Value::Null => return Ok(Runner::default()),
            Value::Sequence(seq) => seq,
            _ => {
                return Err(ConfigError::InvalidField {
                    field: at.rsplit('.').next().unwrap_or(at).to_string(),
                    at: at.to_string(),
                    reason: "expected a sequence of nodes".to_string(),
                })
            }
        };

        let mut runner = Runner::default();
        for (i, item) in seq.iter().enumerate() {
            let node_at = format!("{at}[{i}]");
            runner.push(self.compile_node(item, &node_at)?);
        }
        Ok(runner)
    }

    fn compile_node(&mut self, value: &Value, at: &str) -> Result<Node, ConfigError> {
        match value {
            Value::String(name) => Ok(Node::Action(Action::build(name, &Value::Null, at)?)),
            Value::Mapping(map) if map.contains_key("check") => {
                Ok(Node::Group(self.compile_group(map, at)?))
            }
            Value::Mapping(map) if map.len() == 1 => {
                let Some((Value::String(name), arg)) = map.iter().next() else {
                    return Err(unknown_node(at, "action key must be a string"));
                };
                Ok(Node::Action(Action::build(name, arg, at)?))
            }
            Value::Mapping(_) => Err(unknown_node(
                at,
                "expected a group (with 'check') or a single action",
            )),
            _ => Err(unknown_node(at, "expected a mapping or an action name")),
        }
    }

    fn compile_group(&mut self, map: &Mapping, at: &str) -> Result<Group, ConfigError> {
        for key in map.keys() {
            match key.as_str() {
                Some(k) if GROUP_KEYS.contains(&k) => {}
                Some(k) => return Err(unknown_node(at, &format!("unexpected key '{k}' in group"))),
                None => return Err(unknown_node(at, "group keys must be strings")),
            }
        }

        let check_at = format!("{at}.check");
        let entries: &[Value] = match map.get("check") {
            Some(Value::Sequence(seq)) => seq,
            Some(Value::Null) | None => &[],
            Some(_) => {
                return Err(ConfigError::InvalidField {
                    field: "check".to_string(),
                    at: at.to_string(),
                    reason: "expected a sequence of checks".to_string(),
                })
            }
        };

        let mut checks = Vec::with_capacity(entries.len());
        for (i, entry) in entries.iter().enumerate() {
            let entry_at = format!("{check_at}[{i}]");
            match self.registry.build(entry, &entry_at)? {
                Some(check) => checks.push(check),
                None => self.warn(WarnLevel::Info, &entry_at, "reserved check type skipped"),
            }
        }

        if checks.is_empty() {
            self.warn(WarnLevel::Info, at, "group has no checks and always passes");
        }
        if checks.iter().any(|c| matches!(c, Check::ForceFail)) {
            self.warn(WarnLevel::Info, at, "group is disabled by force-fail");
        }

        let name = map.get("name").and_then(Value::as_str).map(str::to_string);
        let pass = self.optional_runner(map, "pass", at)?;
        let fail = self.optional_runner(map, "fail", at)?;
        if pass.is_none() && fail.is_none() {
            self.warn(WarnLevel::Warning, at, "group has neither pass nor fail actions");
        }

        Ok(Group {
            name,
            checks,
            pass,
            fail,
        })
    }

    fn optional_runner(
        &mut self,
        map: &Mapping,
        key: &str,
        at: &str,
    ) -> Result<Option<Runner>, ConfigError> {
        match map.get(key) {
            None => Ok(None),
            Some(value) => {
                let runner = self.compile_runner(value, &format!("{at}.{key}"))?;
                Ok((!runner.is_empty()).then_some(runner))
            }
        }
    }
}

fn unknown_node(at: &str, reason: &str) -> ConfigError {
    ConfigError::UnknownNode {
        at: at.to_string(),
        reason: reason.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn compile(doc: &str) -> Result<(Runner, Vec<PolicyWarning>), ConfigError> {
        let registry = CheckRegistry::new();
        let mut compiler = Compiler::new(&registry);
        let value: Value = serde_yaml::from_str(doc).unwrap();
        let runner = compiler.compile_runner(&value, "root")?;
        Ok((runner, compiler.into_warnings()))
    }

    #[test]
    fn compiles_groups_and_actions() {
        let (runner, warnings) = compile(
            r#"
- check:
    - type: isdraft
      value: false
  pass:
    - add-labels: [ready-for-review]
    - check:
        - type: variable-exists
          name: team
      pass:
        - add-assignees: "{team}"
  fail:
    - close
- add-comment: "seen"
"#,
        )
        .unwrap();
        assert_eq!(runner.nodes().len(), 2);
        let Node::Group(group) = &runner.nodes()[0] else {
            panic!("expected group");
        };
        assert_eq!(group.checks.len(), 1);
        assert_eq!(group.pass.as_ref().map(|r| r.nodes().len()), Some(2));
        assert!(matches!(
            group.fail.as_ref().unwrap().nodes()[0],
            Node::Action(Action::Close)
        ));
        assert!(warnings.is_empty());
    }

    #[test]
    fn unknown_check_aborts_whole_compile() {
        let err = compile(
            r#"
- check:
    - type: isdraft
      value: true
  pass:
    - check:
        - type: no-such-check
      pass:
        - close
"#,
        )
        .unwrap_err();
        assert_eq!(
            err.to_string(),
            "root[0].pass[0].check[0]: unknown check type 'no-such-check'"
        );
    }

    #[test]
    fn reserved_checks_are_dropped_with_info_warning() {
        let (runner, warnings) = compile(
            r#"
- check:
    - type: comment
      value: anything
  pass:
    - close
"#,
        )
        .unwrap();
        let Node::Group(group) = &runner.nodes()[0] else {
            panic!("expected group");
        };
        assert!(group.checks.is_empty());
        assert!(warnings.iter().all(|w| w.level == WarnLevel::Info));
        assert!(warnings.iter().any(|w| w.at == "root[0].check[0]"));
        assert!(warnings.iter().any(|w| w.message.contains("always passes")));
    }

    #[test]
    fn force_fail_group_is_flagged() {
        let (_, warnings) = compile("- check:\n    - type: force-fail\n  pass:\n    - close\n").unwrap();
        assert!(warnings.iter().any(|w| w.message.contains("force-fail")));
    }

    #[test]
    fn unexpected_group_key_is_error() {
        let err = compile("- check: []\n  passs:\n    - close\n").unwrap_err();
        assert!(matches!(err, ConfigError::UnknownNode { .. }));
    }

    #[test]
    fn multi_key_action_mapping_is_error() {
        let err = compile("- add-labels: [a]\n  close: true\n").unwrap_err();
        assert!(matches!(err, ConfigError::UnknownNode { .. }));
    }

    #[test]
    fn non_sequence_runner_is_error() {
        let err = compile("add-labels: [a]").unwrap_err();
        assert!(matches!(err, ConfigError::InvalidField { .. }));
    }
}
