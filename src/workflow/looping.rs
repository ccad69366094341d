//! Repeat children in order.

use std::sync::Arc;

use futures::StreamExt;

use super::sequential::run_in_order;
use crate::agent::{Agent, EventStream, InvocationContext};
use crate::error::TrellisError;

/// Repeats its children in order `max_iterations` times, or forever when
/// `max_iterations == 0`.
///
/// Stops early on a child error, on an event that escalates, or when the
/// invocation is cancelled. Child instances are reused across iterations.
#[derive(Clone)]
pub struct LoopAgent {
    name: String,
    description: String,
    sub_agents: Vec<Arc<dyn Agent>>,
    max_iterations: u32,
}

impl LoopAgent {
    pub fn new(
        name: impl Into<String>,
        sub_agents: Vec<Arc<dyn Agent>>,
        max_iterations: u32,
    ) -> Self {
        Self {
            name: name.into(),
            description: String::new(),
            sub_agents,
            max_iterations,
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn max_iterations(&self) -> u32 {
        self.max_iterations
    }
}

impl Agent for LoopAgent {
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
        let max_iterations = self.max_iterations;
        let name = self.name.clone();

        Box::pin(async_stream::stream! {
            if children.is_empty() {
                return;
            }
            let token = ctx.cancellation_token().clone();
            let mut iteration: u32 = 0;

            while max_iterations == 0 || iteration < max_iterations {
                tokio::task::yield_now().await;
                if token.is_cancelled() {
                    yield Err(TrellisError::Canceled);
                    return;
                }
                tracing::trace!(agent = %name, iteration, "loop iteration");

                let mut events = run_in_order(children.clone(), ctx.clone());
                while let Some(item) = events.next().await {
                    match item {
                        Ok(event) => {
                            let escalate = event.actions.escalate;
                            yield Ok(event);
                            if escalate {
                                return;
                            }
                        }
                        Err(e) => {
                            yield Err(e);
                            return;
                        }
                    }
                }
                iteration = iteration.saturating_add(1);
            }
        })
    }
}
