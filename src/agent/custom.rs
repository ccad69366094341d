//! Caller-supplied agents backed by a closure.

use std::sync::Arc;

use super::{Agent, EventStream, InvocationContext};

type RunFn = dyn Fn(InvocationContext) -> EventStream + Send + Sync;

/// Agent whose behaviour is a closure.
///
/// Any state the closure captures lives as long as the agent, so it persists
/// across loop iterations. Keep it `Sync`-safe if the agent also sits inside a
/// parallel composition.
#[derive(Clone)]
pub struct FunctionAgent {
    name: String,
    description: String,
    sub_agents: Vec<Arc<dyn Agent>>,
    run: Arc<RunFn>,
}

impl FunctionAgent {
    pub fn new<F>(name: impl Into<String>, run: F) -> Self
    where
        F: Fn(InvocationContext) -> EventStream + Send + Sync + 'static,
    {
        Self {
            name: name.into(),
            description: String::new(),
            sub_agents: Vec::new(),
            run: Arc::new(run),
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn with_sub_agents(mut self, sub_agents: Vec<Arc<dyn Agent>>) -> Self {
        self.sub_agents = sub_agents;
        self
    }
}

impl std::fmt::Debug for FunctionAgent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FunctionAgent")
            .field("name", &self.name)
            .field("description", &self.description)
            .field("sub_agents", &self.sub_agents.len())
            .finish()
    }
}

impl Agent for FunctionAgent {
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
        (self.run)(ctx)
    }
}
