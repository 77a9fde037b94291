use crate::check::Check;
use crate::error::Result;
use crate::runner::Runner;
use crate::state::State;

/// Checks joined with a short-circuiting AND, and the branch to run for
/// each outcome. A group with no checks passes.
#[derive(Debug, Clone, Default)]
pub struct Group {
    pub name: Option<String>,
    pub checks: Vec<Check>,
    pub pass: Option<Runner>,
    pub fail: Option<Runner>,
}

impl Group {
    pub fn new(checks: Vec<Check>) -> Self {
        Self {
            checks,
            ..Self::default()
        }
    }

    pub fn with_pass(mut self, runner: Runner) -> Self {
        self.pass = Some(runner);
        self
    }

    pub fn with_fail(mut self, runner: Runner) -> Self {
        self.fail = Some(runner);
        self
    }

    /// Stops at the first failing check; later checks are not evaluated.
    pub fn evaluate(&self, state: &State<'_>) -> bool {
        self.checks.iter().all(|check| check.run(state))
    }

    pub fn run(&self, state: &mut State<'_>) -> Result<()> {
        let passed = self.evaluate(state);
        state.record_group(passed);
        tracing::debug!(
            parent: state.span(),
            group = self.name.as_deref().unwrap_or("-"),
            passed,
            "group evaluated"
        );

        let branch = if passed { &self.pass } else { &self.fail };
        match branch {
            Some(runner) => runner.run(state),
            None => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::action::{Action, Mutation};
    use crate::check::Predicate;
    use crate::event::{EventSnapshot, Item};
    use crate::memory::{InMemoryLookup, RecordingExecutor};
    use crate::runner::Node;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[derive(Debug)]
    struct Probe {
        result: bool,
        calls: Arc<AtomicUsize>,
    }

    impl Predicate for Probe {
        fn evaluate(&self, _state: &State<'_>) -> bool {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.result
        }
    }

    fn probe(result: bool) -> (Check, Arc<AtomicUsize>) {
        let calls = Arc::new(AtomicUsize::new(0));
        let check = Check::Custom {
            kind: "probe".into(),
            predicate: Arc::new(Probe {
                result,
                calls: calls.clone(),
            }),
        };
        (check, calls)
    }

    fn comment(body: &str) -> Runner {
        Runner::new(vec![Node::Action(Action::AddComment(body.into()))])
    }

    fn run_group(group: &Group) -> RecordingExecutor {
        let event = EventSnapshot::new("issues", "opened", Item::issue(1, "t"));
        let lookup = InMemoryLookup::default();
        let mut exec = RecordingExecutor::new();
        {
            let mut state = State::new(&event, &lookup, &mut exec);
            group.run(&mut state).unwrap();
        }
        exec
    }

    fn bodies(exec: &RecordingExecutor) -> Vec<String> {
        exec.mutations()
            .into_iter()
            .filter_map(|m| match m {
                Mutation::AddComment { body } => Some(body.clone()),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn stops_at_first_failing_check() {
        let (first, first_calls) = probe(true);
        let (second, second_calls) = probe(false);
        let (third, third_calls) = probe(true);
        let group = Group::new(vec![first, second, third]);
        run_group(&group);
        assert_eq!(first_calls.load(Ordering::SeqCst), 1);
        assert_eq!(second_calls.load(Ordering::SeqCst), 1);
        assert_eq!(third_calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn empty_group_passes() {
        let group = Group::new(Vec::new())
            .with_pass(comment("pass"))
            .with_fail(comment("fail"));
        assert_eq!(bodies(&run_group(&group)), vec!["pass"]);
    }

    #[test]
    fn exactly_one_branch_runs() {
        for outcomes in [
            vec![true, true],
            vec![true, false],
            vec![false, true],
            vec![false, false],
        ] {
            let expected = outcomes.iter().all(|o| *o);
            let checks = outcomes.iter().map(|o| probe(*o).0).collect();
            let both = Group::new(checks)
                .with_pass(comment("pass"))
                .with_fail(comment("fail"));
            let got = bodies(&run_group(&both));
            assert_eq!(got, vec![if expected { "pass" } else { "fail" }]);

            let checks = outcomes.iter().map(|o| probe(*o).0).collect();
            let pass_only = Group::new(checks).with_pass(comment("pass"));
            let got = bodies(&run_group(&pass_only));
            assert_eq!(got.len(), usize::from(expected));
        }
    }

    #[test]
    fn nested_groups_run_depth_first() {
        let inner = Group::new(Vec::new()).with_pass(comment("inner"));
        let outer = Group::new(Vec::new()).with_pass(Runner::new(vec![
            Node::Action(Action::AddComment("before".into())),
            Node::Group(inner),
            Node::Action(Action::AddComment("after".into())),
        ]));
        assert_eq!(bodies(&run_group(&outer)), vec!["before", "inner", "after"]);
    }
}
