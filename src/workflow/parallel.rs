//! Run children concurrently and merge their output.

use std::sync::Arc;

use futures::StreamExt;
use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tokio_stream::wrappers::ReceiverStream;

use crate::agent::{execute, Agent, EventStream, InvocationContext};
use crate::error::{Result, TrellisError};
use crate::session::Event;

/// Runs every child as its own task and merges their events.
///
/// Each child's order is preserved; interleaving across children is not.
/// The first error is relayed and cancels the remaining children. Dropping
/// the stream cancels and aborts all of them.
#[derive(Clone)]
pub struct ParallelAgent {
    name: String,
    description: String,
    sub_agents: Vec<Arc<dyn Agent>>,
}

impl ParallelAgent {
    pub fn new(name: impl Into<String>, sub_agents: Vec<Arc<dyn Agent>>) -> Self {
        Self {
            name: name.into(),
            description: String::new(),
            sub_agents,
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }
}

fn child_branch(parent: Option<&str>, parallel: &str, child: &str) -> String {
    match parent {
        Some(parent) if !parent.is_empty() => format!("{parent}.{parallel}.{child}"),
        _ => format!("{parallel}.{child}"),
    }
}

/// Drive one child into the shared queue until it ends, fails, or the
/// merged stream goes away.
async fn drive_child(
    child: Arc<dyn Agent>,
    ctx: InvocationContext,
    tx: mpsc::Sender<Result<Event>>,
) {
    let mut events = execute(child, &ctx);
    while let Some(item) = events.next().await {
        let failed = item.is_err();
        if tx.send(item).await.is_err() || failed {
            break;
        }
    }
}

impl Agent for ParallelAgent {
    fn name(&self) -> &str {
        &self.name
    }

    fn description(&self) -> &str {
        &self.description
    }

    fn sub_agents(&self) -> &[Arc<dyn Agent>] {
        &self.sub_agents
    }

    fn run(&self, ctx: InvocationContext) -> EventStream {
        let children = self.sub_agents.clone();
        let name = self.name.clone();

        Box::pin(async_stream::stream! {
            let parent_token = ctx.cancellation_token().clone();
            let token = parent_token.child_token();
            let _cancel_on_drop = token.clone().drop_guard();

            let (tx, rx) = mpsc::channel(ctx.runtime().parallel_buffer());
            let mut units = JoinSet::new();
            for child in children {
                let branch = child_branch(ctx.branch(), &name, child.name());
                let child_ctx = ctx
                    .clone()
                    .with_branch(Some(branch))
                    .with_cancellation(token.child_token());
                units.spawn(drive_child(child, child_ctx, tx.clone()));
            }
            drop(tx);
            tracing::debug!(agent = %name, units = units.len(), "parallel branches started");

            let mut merged = ReceiverStream::new(rx);
            loop {
                let next = tokio::select! {
                    biased;
                    _ = parent_token.cancelled() => None,
                    item = merged.next() => Some(item),
                };
                match next {
                    None => {
                        yield Err(TrellisError::Canceled);
                        break;
                    }
                    Some(None) => break,
                    Some(Some(Ok(event))) => yield Ok(event),
                    Some(Some(Err(e))) => {
                        token.cancel();
                        yield Err(e);
                        break;
                    }
                }
            }
            units.abort_all();
        })
    }
}
