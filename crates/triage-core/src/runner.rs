use crate::action::Action;
use crate::error::Result;
use crate::group::Group;
use crate::state::State;

/// One entry of a runner: a group (which may branch into further runners)
/// or an action.
#[derive(Debug, Clone)]
pub enum Node {
    Group(Group),
    Action(Action),
}

impl Node {
    pub fn run(&self, state: &mut State<'_>) -> Result<()> {
        match self {
            Node::Group(group) => group.run(state),
            Node::Action(action) => action.run(state),
        }
    }
}

/// Ordered nodes, all of which run in declaration order. A runner never looks
/// at the outcome of its groups; only an error stops it.
#[derive(Debug, Clone, Default)]
pub struct Runner {
    nodes: Vec<Node>,
}

impl Runner {
    pub fn new(nodes: Vec<Node>) -> Self {
        Self { nodes }
    }

    pub fn push(&mut self, node: Node) {
        self.nodes.push(node);
    }

    pub fn nodes(&self) -> &[Node] {
        &self.nodes
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn run(&self, state: &mut State<'_>) -> Result<()> {
        for node in &self.nodes {
            node.run(state)?;
        }
        Ok(())
    }
}
