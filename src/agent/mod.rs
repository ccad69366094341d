//! Agents: named nodes that produce a turn's events.
//!
//! Every agent exposes the same minimal surface ([`Agent`]). Whether an agent
//! is LLM-backed is discovered at runtime through [`Agent::llm`] rather than
//! fixed by type.

pub mod context;
pub mod custom;
pub mod llm;
pub mod tree;

pub use context::InvocationContext;
pub use custom::FunctionAgent;
pub use llm::LlmAgent;
pub use tree::AgentTree;

use std::sync::Arc;

use futures::stream::BoxStream;
use futures::StreamExt;

use crate::error::{Result, TrellisError};
use crate::model::Model;
use crate::session::Event;

/// Lazy output of an agent. Dropping it stops the agent.
pub type EventStream = BoxStream<'static, Result<Event>>;

/// A node in an agent tree.
pub trait Agent: Send + Sync {
    /// Unique within the tree.
    fn name(&self) -> &str;

    fn description(&self) -> &str {
        ""
    }

    fn sub_agents(&self) -> &[Arc<dyn Agent>] {
        &[]
    }

    /// Produce this agent's events. Callers go through [`execute`].
    fn run(&self, ctx: InvocationContext) -> EventStream;

    /// The LLM facet, if this agent is model-backed.
    fn llm(&self) -> Option<&dyn LlmCapable> {
        None
    }
}

/// Whether control may move away from an LLM agent across turns.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TransferPolicy {
    pub disallow_transfer_to_parent: bool,
    pub disallow_transfer_to_peers: bool,
}

/// Facet exposed by model-backed agents.
pub trait LlmCapable: Send + Sync {
    fn model(&self) -> &Arc<dyn Model>;

    fn transfer_policy(&self) -> TransferPolicy;

    fn input_schema(&self) -> Option<&serde_json::Value> {
        None
    }

    fn output_schema(&self) -> Option<&serde_json::Value> {
        None
    }
}

/// Start `agent` under `parent`'s invocation.
///
/// Rebinds the context to `agent`, stamps each event with the agent name,
/// invocation id and branch when it does not carry them already, and stops
/// with [`TrellisError::Canceled`] as soon as the context's token fires.
/// The agent's stream ends at its first error.
pub fn execute(agent: Arc<dyn Agent>, parent: &InvocationContext) -> EventStream {
    let ctx = parent.clone().with_agent(agent.clone());
    let token = ctx.cancellation_token().clone();
    let invocation_id = ctx.invocation_id().to_string();
    let branch = ctx.branch().map(str::to_string);

    Box::pin(async_stream::stream! {
        if token.is_cancelled() {
            yield Err(TrellisError::Canceled);
            return;
        }
        let name = agent.name().to_string();
        tracing::debug!(invocation_id = %invocation_id, agent = %name, "agent started");

        let mut events = agent.run(ctx);
        loop {
            let next = tokio::select! {
                biased;
                _ = token.cancelled() => None,
                item = events.next() => Some(item),
            };
            match next {
                None => {
                    tracing::debug!(invocation_id = %invocation_id, agent = %name, "agent canceled");
                    yield Err(TrellisError::Canceled);
                    return;
                }
                Some(None) => break,
                Some(Some(Ok(mut event))) => {
                    if event.author.is_empty() {
                        event.author = name.clone();
                    }
                    if event.invocation_id.is_empty() {
                        event.invocation_id = invocation_id.clone();
                    }
                    if event.branch.is_none() {
                        event.branch = branch.clone();
                    }
                    yield Ok(event);
                }
                Some(Some(Err(e))) => {
                    yield Err(e);
                    return;
                }
            }
        }
        tracing::debug!(invocation_id = %invocation_id, agent = %name, "agent finished");
    })
}
