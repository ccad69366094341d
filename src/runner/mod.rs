//! Turn orchestration.
//!
//! A [`Runner`] owns an agent tree and its collaborators. Each call to
//! [`Runner::run`] resolves the session and the agent to resume, commits the
//! inbound message, then drives the agent, committing every non-partial event
//! before relaying it to the caller.

pub mod transfer;

pub use transfer::{find_agent_to_run, is_transferable};

use std::sync::Arc;

use bon::Builder;
use futures::StreamExt;
use tokio::sync::RwLock;
use tokio_util::sync::CancellationToken;

use crate::agent::{execute, Agent, AgentTree, EventStream, InvocationContext};
use crate::artifact::{ArtifactService, Artifacts};
use crate::config::{RunConfig, RuntimeConfig};
use crate::error::{Result, TrellisError};
use crate::memory::{Memory, MemoryService};
use crate::session::{Event, GetRequest, Session, SessionService, USER_AUTHOR};
use crate::types::{Content, Part};

/// Everything a [`Runner`] is wired with.
#[derive(Builder)]
pub struct RunnerConfig {
    #[builder(into)]
    pub app_name: String,
    pub agent: Arc<dyn Agent>,
    pub session_service: Arc<dyn SessionService>,
    pub artifact_service: Option<Arc<dyn ArtifactService>>,
    pub memory_service: Option<Arc<dyn MemoryService>>,
    #[builder(default)]
    pub runtime: RuntimeConfig,
}

/// Drives turns of conversation against an agent tree.
///
/// Cheap to clone; clones share the tree and collaborators.
#[derive(Clone)]
pub struct Runner {
    app_name: String,
    tree: Arc<AgentTree>,
    session_service: Arc<dyn SessionService>,
    artifact_service: Option<Arc<dyn ArtifactService>>,
    memory_service: Option<Arc<dyn MemoryService>>,
    runtime: Arc<RuntimeConfig>,
}

impl std::fmt::Debug for Runner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Runner")
            .field("app_name", &self.app_name)
            .field("tree", &self.tree)
            .field("runtime", &self.runtime)
            .finish_non_exhaustive()
    }
}

impl Runner {
    /// Index the agent tree; fails on duplicate or reserved agent names.
    pub fn new(config: RunnerConfig) -> Result<Self> {
        let tree = AgentTree::build(config.agent)?;
        Ok(Self {
            app_name: config.app_name,
            tree: Arc::new(tree),
            session_service: config.session_service,
            artifact_service: config.artifact_service,
            memory_service: config.memory_service,
            runtime: Arc::new(config.runtime),
        })
    }

    pub fn app_name(&self) -> &str {
        &self.app_name
    }

    pub fn tree(&self) -> &Arc<AgentTree> {
        &self.tree
    }

    pub fn runtime(&self) -> &RuntimeConfig {
        &self.runtime
    }

    /// Run one turn. `new_message` may be `None` to resume without input.
    pub fn run(
        &self,
        user_id: impl Into<String>,
        session_id: impl Into<String>,
        new_message: Option<Content>,
        run_config: RunConfig,
    ) -> EventStream {
        self.run_with_cancellation(
            user_id,
            session_id,
            new_message,
            run_config,
            CancellationToken::new(),
        )
    }

    /// Like [`run`](Self::run), stopping with [`TrellisError::Canceled`] once
    /// `token` fires.
    pub fn run_with_cancellation(
        &self,
        user_id: impl Into<String>,
        session_id: impl Into<String>,
        new_message: Option<Content>,
        run_config: RunConfig,
        token: CancellationToken,
    ) -> EventStream {
        let runner = self.clone();
        let user_id = user_id.into();
        let session_id = session_id.into();

        Box::pin(async_stream::stream! {
            let request = GetRequest {
                app_name: runner.app_name.clone(),
                user_id: user_id.clone(),
                session_id: session_id.clone(),
                ..Default::default()
            };
            let session = match runner.session_service.get(request).await {
                Ok(response) => response.session,
                Err(e) => {
                    yield Err(e);
                    return;
                }
            };

            let agent = find_agent_to_run(&session, &runner.tree);
            if run_config.support_cfc {
                if let Err(e) = runner.check_cfc(agent.as_ref()) {
                    yield Err(e);
                    return;
                }
            }

            let mut ctx = runner.invocation_context(session, agent.clone(), new_message.clone(), run_config, token);
            tracing::debug!(
                invocation_id = %ctx.invocation_id(),
                session_id = %session_id,
                agent = %agent.name(),
                "turn started"
            );

            if let Some(message) = new_message.filter(|m| !m.is_empty()) {
                match runner.commit_user_message(&ctx, message).await {
                    Ok(committed) => ctx = ctx.with_user_content(Some(committed)),
                    Err(e) => {
                        yield Err(e);
                        return;
                    }
                }
            }

            let mut events = execute(agent, &ctx);
            while let Some(item) = events.next().await {
                let event = match item {
                    Ok(event) => event,
                    Err(e) => {
                        yield Err(e);
                        return;
                    }
                };
                if !event.is_partial() {
                    if let Err(e) = runner.commit(&ctx, event.clone()).await {
                        yield Err(e);
                        return;
                    }
                }
                yield Ok(event);
            }
            tracing::debug!(invocation_id = %ctx.invocation_id(), "turn finished");
        })
    }

    fn check_cfc(&self, agent: &dyn Agent) -> Result<()> {
        let llm = agent.llm().ok_or_else(|| {
            TrellisError::UnsupportedOperation(format!(
                "CFC requires an LLM agent, '{}' is not one",
                agent.name()
            ))
        })?;
        let model = llm.model().name();
        if !self.runtime.supports_cfc(model) {
            return Err(TrellisError::UnsupportedOperation(format!(
                "CFC is not supported for model '{model}'"
            )));
        }
        Ok(())
    }

    fn invocation_context(
        &self,
        session: Session,
        agent: Arc<dyn Agent>,
        user_content: Option<Content>,
        run_config: RunConfig,
        token: CancellationToken,
    ) -> InvocationContext {
        let artifacts = self.artifact_service.clone().map(|service| {
            Artifacts::new(service, session.app_name(), session.user_id(), session.id())
        });
        let memory = self
            .memory_service
            .clone()
            .map(|service| Memory::new(service, session.app_name(), session.user_id()));

        InvocationContext::new(self.tree.clone(), Arc::new(RwLock::new(session)))
            .with_agent(agent)
            .with_artifacts(artifacts)
            .with_memory(memory)
            .with_user_content(user_content)
            .with_run_config(run_config)
            .with_runtime(self.runtime.clone())
            .with_cancellation(token)
    }

    /// Off-load inline blobs if asked to, then append the user's message.
    /// Returns the message as committed.
    async fn commit_user_message(
        &self,
        ctx: &InvocationContext,
        mut message: Content,
    ) -> Result<Content> {
        if ctx.run_config().save_input_blobs_as_artifacts {
            match ctx.artifacts() {
                Some(artifacts) => {
                    for (i, part) in message.parts.iter_mut().enumerate() {
                        if part.as_blob().is_none() {
                            continue;
                        }
                        let file_name = format!("artifact_{}_{i}", ctx.invocation_id());
                        artifacts.save(&file_name, part.clone()).await.map_err(|e| {
                            TrellisError::persistence(format!("failed to save artifact {file_name}"), e)
                        })?;
                        *part = Part::text(format!(
                            "Uploaded file: {file_name}. It has been saved to the artifacts"
                        ));
                    }
                }
                None => tracing::warn!(
                    invocation_id = %ctx.invocation_id(),
                    "save_input_blobs_as_artifacts is set but no artifact service is configured"
                ),
            }
        }

        let event = Event::from_content(message.clone()).with_author(USER_AUTHOR);
        let event = Event {
            invocation_id: ctx.invocation_id().to_string(),
            ..event
        };
        self.commit(ctx, event).await?;
        Ok(message)
    }

    async fn commit(&self, ctx: &InvocationContext, event: Event) -> Result<()> {
        let mut session = ctx.session().write().await;
        self.session_service
            .append_event(&mut *session, event)
            .await
            .map_err(|e| TrellisError::persistence("failed to append event to session", e))
    }
}
