//! Run children one after another.

use std::sync::Arc;

use futures::StreamExt;

use crate::agent::{execute, Agent, EventStream, InvocationContext};

/// Drains each child fully before starting the next; stops at the first error.
#[derive(Clone)]
pub struct SequentialAgent {
    name: String,
    description: String,
    sub_agents: Vec<Arc<dyn Agent>>,
}

impl SequentialAgent {
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

/// One pass over `children` in order. Returns after relaying the first error.
pub(crate) fn run_in_order(children: Vec<Arc<dyn Agent>>, ctx: InvocationContext) -> EventStream {
    Box::pin(async_stream::stream! {
        for child in children {
            let mut events = execute(child, &ctx);
            while let Some(item) = events.next().await {
                let failed = item.is_err();
                yield item;
                if failed {
                    return;
                }
            }
        }
    })
}

impl Agent for SequentialAgent {
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
        run_in_order(self.sub_agents.clone(), ctx)
    }
}
