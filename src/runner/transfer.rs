//! Which agent handles the next turn of a session.

use std::sync::Arc;

use crate::agent::{Agent, AgentTree};
use crate::session::Session;

/// Pick the agent to resume.
///
/// Walks the history newest first, skipping user events and authors unknown
/// to `tree`. The first author whose whole lineage allows transfer is
/// returned; otherwise the root.
pub fn find_agent_to_run(session: &Session, tree: &AgentTree) -> Arc<dyn Agent> {
    for event in session.events().iter().rev() {
        if event.is_from_user() {
            continue;
        }
        let Some(agent) = tree.find(&event.author) else {
            tracing::warn!(
                author = %event.author,
                event_id = %event.id,
                "event from an unknown agent"
            );
            continue;
        };
        if is_transferable(agent.name(), tree) {
            return agent.clone();
        }
    }
    tree.root().clone()
}

/// Whether `name` and every ancestor up to the root are LLM agents that
/// allow transfer to their parent.
pub fn is_transferable(name: &str, tree: &AgentTree) -> bool {
    let mut lineage = tree.lineage(name).peekable();
    if lineage.peek().is_none() {
        return false;
    }
    lineage.all(|agent| {
        agent
            .llm()
            .is_some_and(|llm| !llm.transfer_policy().disallow_transfer_to_parent)
    })
}
