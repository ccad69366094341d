//! Per-turn invocation context.

use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use super::{Agent, AgentTree};
use crate::artifact::Artifacts;
use crate::config::{RunConfig, RuntimeConfig};
use crate::memory::Memory;
use crate::session::{SessionHandle, State};
use crate::types::Content;

/// Everything an agent sees while driving one turn.
///
/// Cheap to clone; composition agents derive child contexts from it. Never
/// persisted.
#[derive(Clone)]
pub struct InvocationContext {
    invocation_id: String,
    agent: Arc<dyn Agent>,
    session: SessionHandle,
    artifacts: Option<Artifacts>,
    memory: Option<Memory>,
    user_content: Option<Content>,
    run_config: RunConfig,
    runtime: Arc<RuntimeConfig>,
    tree: Arc<AgentTree>,
    cancellation: CancellationToken,
    branch: Option<String>,
}

impl std::fmt::Debug for InvocationContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InvocationContext")
            .field("invocation_id", &self.invocation_id)
            .field("agent", &self.agent.name())
            .field("branch", &self.branch)
            .field("run_config", &self.run_config)
            .finish_non_exhaustive()
    }
}

impl InvocationContext {
    /// Create a context for a fresh invocation rooted at `tree.root()`.
    pub fn new(tree: Arc<AgentTree>, session: SessionHandle) -> Self {
        Self {
            invocation_id: format!("e-{}", Uuid::new_v4()),
            agent: tree.root().clone(),
            session,
            artifacts: None,
            memory: None,
            user_content: None,
            run_config: RunConfig::default(),
            runtime: Arc::new(RuntimeConfig::default()),
            tree,
            cancellation: CancellationToken::new(),
            branch: None,
        }
    }

    pub fn with_agent(mut self, agent: Arc<dyn Agent>) -> Self {
        self.agent = agent;
        self
    }

    pub fn with_artifacts(mut self, artifacts: Option<Artifacts>) -> Self {
        self.artifacts = artifacts;
        self
    }

    pub fn with_memory(mut self, memory: Option<Memory>) -> Self {
        self.memory = memory;
        self
    }

    pub fn with_user_content(mut self, content: Option<Content>) -> Self {
        self.user_content = content;
        self
    }

    pub fn with_run_config(mut self, run_config: RunConfig) -> Self {
        self.run_config = run_config;
        self
    }

    pub fn with_runtime(mut self, runtime: Arc<RuntimeConfig>) -> Self {
        self.runtime = runtime;
        self
    }

    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancellation = token;
        self
    }

    pub fn with_branch(mut self, branch: Option<String>) -> Self {
        self.branch = branch;
        self
    }

    pub fn invocation_id(&self) -> &str {
        &self.invocation_id
    }

    /// The agent currently being driven.
    pub fn agent(&self) -> &Arc<dyn Agent> {
        &self.agent
    }

    pub fn session(&self) -> &SessionHandle {
        &self.session
    }

    /// Snapshot of the session state.
    pub async fn state(&self) -> State {
        self.session.read().await.state().clone()
    }

    pub fn artifacts(&self) -> Option<&Artifacts> {
        self.artifacts.as_ref()
    }

    pub fn memory(&self) -> Option<&Memory> {
        self.memory.as_ref()
    }

    /// The inbound message that started this turn, if any.
    pub fn user_content(&self) -> Option<&Content> {
        self.user_content.as_ref()
    }

    pub fn run_config(&self) -> &RunConfig {
        &self.run_config
    }

    pub fn runtime(&self) -> &RuntimeConfig {
        &self.runtime
    }

    pub fn tree(&self) -> &Arc<AgentTree> {
        &self.tree
    }

    pub fn cancellation_token(&self) -> &CancellationToken {
        &self.cancellation
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancellation.is_cancelled()
    }

    /// Dotted path of the parallel branches this context runs under.
    pub fn branch(&self) -> Option<&str> {
        self.branch.as_deref()
    }
}
