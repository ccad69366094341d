//! Name and parent lookup over a rooted agent tree.

use std::collections::HashMap;
use std::sync::Arc;

use super::Agent;
use crate::error::{Result, TrellisError};
use crate::session::USER_AUTHOR;

struct Node {
    agent: Arc<dyn Agent>,
    parent: Option<String>,
}

/// Immutable index built once from a root agent.
///
/// Rebuild it when the tree changes; it is never mutated.
pub struct AgentTree {
    root: Arc<dyn Agent>,
    nodes: HashMap<String, Node>,
}

impl std::fmt::Debug for AgentTree {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut names: Vec<&String> = self.nodes.keys().collect();
        names.sort();
        f.debug_struct("AgentTree")
            .field("root", &self.root.name())
            .field("agents", &names)
            .finish()
    }
}

impl AgentTree {
    /// Index every agent reachable from `root`.
    ///
    /// Fails on a name used twice, an empty name, or the reserved user author.
    pub fn build(root: Arc<dyn Agent>) -> Result<Self> {
        let mut nodes = HashMap::new();
        let mut pending: Vec<(Arc<dyn Agent>, Option<String>)> = vec![(root.clone(), None)];

        while let Some((agent, parent)) = pending.pop() {
            let name = agent.name().to_string();
            if name.is_empty() {
                return Err(TrellisError::Configuration("agent name must not be empty".into()));
            }
            if name == USER_AUTHOR {
                return Err(TrellisError::Configuration(format!(
                    "agent name '{USER_AUTHOR}' is reserved for user messages"
                )));
            }
            if nodes.contains_key(&name) {
                return Err(TrellisError::DuplicateAgentName(name));
            }
            for child in agent.sub_agents() {
                pending.push((child.clone(), Some(name.clone())));
            }
            nodes.insert(name, Node { agent, parent });
        }

        Ok(Self { root, nodes })
    }

    pub fn root(&self) -> &Arc<dyn Agent> {
        &self.root
    }

    pub fn find(&self, name: &str) -> Option<&Arc<dyn Agent>> {
        self.nodes.get(name).map(|n| &n.agent)
    }

    /// Parent of `name`; `None` for the root or an unknown name.
    pub fn parent(&self, name: &str) -> Option<&Arc<dyn Agent>> {
        let parent = self.nodes.get(name)?.parent.as_deref()?;
        self.find(parent)
    }

    /// `name` followed by each of its ancestors up to and including the root.
    pub fn lineage<'a>(&'a self, name: &str) -> impl Iterator<Item = &'a Arc<dyn Agent>> + 'a {
        let mut next = self.find(name);
        std::iter::from_fn(move || {
            let current = next?;
            next = self.parent(current.name());
            Some(current)
        })
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }
}
