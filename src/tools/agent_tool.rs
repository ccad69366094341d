//! Expose an agent as a tool of another agent's model.
//!
//! Each call runs a complete, isolated turn: fresh in-memory services, a new
//! session seeded with the caller's state, and a nested [`Runner`].

use std::sync::Arc;

use async_trait::async_trait;
use futures::StreamExt;
use serde_json::json;

use super::tool::{Tool, ToolContext, ToolDeclaration};
use super::validation::{validate_against_schema, validate_arguments};
use crate::agent::Agent;
use crate::artifact::InMemoryArtifactService;
use crate::config::{RunConfig, StreamingMode};
use crate::error::{Result, TrellisError};
use crate::memory::InMemoryMemoryService;
use crate::runner::{Runner, RunnerConfig};
use crate::session::{CreateRequest, InMemorySessionService, SessionService};
use crate::types::Content;

/// An agent callable as a function tool.
#[derive(Clone)]
pub struct AgentTool {
    agent: Arc<dyn Agent>,
    skip_summarization: bool,
}

impl AgentTool {
    pub fn new(agent: Arc<dyn Agent>) -> Self {
        Self {
            agent,
            skip_summarization: false,
        }
    }

    /// Ask the calling agent not to summarize this tool's result.
    pub fn with_skip_summarization(mut self, skip: bool) -> Self {
        self.skip_summarization = skip;
        self
    }

    fn input_schema(&self) -> Option<&serde_json::Value> {
        self.agent.llm().and_then(|llm| llm.input_schema())
    }

    fn output_schema(&self) -> Option<&serde_json::Value> {
        self.agent.llm().and_then(|llm| llm.output_schema())
    }

    fn request_content(&self, args: &serde_json::Value) -> Result<Content> {
        if let Some(schema) = self.input_schema() {
            validate_arguments(self.name(), args, schema)?;
            return Ok(Content::user_text(serde_json::to_string(args)?));
        }
        let request = args
            .as_object()
            .ok_or_else(|| TrellisError::tool(self.name(), "expects an object of arguments"))?
            .get("request")
            .ok_or_else(|| TrellisError::tool(self.name(), "missing required argument 'request'"))?;
        let text = match request {
            serde_json::Value::String(s) => s.clone(),
            other => other.to_string(),
        };
        Ok(Content::user_text(text))
    }

    fn shape_output(&self, text: String) -> Result<serde_json::Value> {
        if text.is_empty() {
            return Ok(json!({}));
        }
        let Some(schema) = self.output_schema() else {
            return Ok(json!({ "result": text }));
        };
        let parsed: serde_json::Value = serde_json::from_str(&text).map_err(|e| {
            TrellisError::tool(self.name(), format!("output is not valid JSON: {e}"))
        })?;
        validate_against_schema(&parsed, schema).map_err(|msg| {
            TrellisError::tool(self.name(), format!("output validation failed: {msg}"))
        })?;
        Ok(parsed)
    }
}

impl std::fmt::Debug for AgentTool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AgentTool")
            .field("agent", &self.agent.name())
            .field("skip_summarization", &self.skip_summarization)
            .finish()
    }
}

#[async_trait]
impl Tool for AgentTool {
    fn name(&self) -> &str {
        self.agent.name()
    }

    fn description(&self) -> &str {
        self.agent.description()
    }

    fn declaration(&self) -> ToolDeclaration {
        let parameters = self.input_schema().cloned().unwrap_or_else(|| {
            json!({
                "type": "object",
                "properties": { "request": { "type": "string" } },
                "required": ["request"],
            })
        });
        ToolDeclaration {
            name: self.name().to_string(),
            description: self.description().to_string(),
            parameters,
        }
    }

    async fn run(
        &self,
        ctx: &mut ToolContext,
        args: serde_json::Value,
    ) -> Result<serde_json::Value> {
        if self.skip_summarization {
            ctx.actions_mut().skip_summarization = true;
        }
        let content = self.request_content(&args)?;

        let sessions = Arc::new(InMemorySessionService::new());
        let runner = Runner::new(
            RunnerConfig::builder()
                .app_name(self.name())
                .agent(self.agent.clone())
                .session_service(sessions.clone())
                .artifact_service(Arc::new(InMemoryArtifactService::new()))
                .memory_service(Arc::new(InMemoryMemoryService::new()))
                .runtime(ctx.invocation().runtime().clone())
                .build(),
        )?;

        let session = sessions
            .create(CreateRequest {
                app_name: self.name().to_string(),
                user_id: ctx.user_id().await,
                session_id: None,
                state: ctx.state().await.without_internal(),
            })
            .await?
            .session;

        tracing::debug!(
            tool = %self.name(),
            session_id = %session.id(),
            "running agent as tool"
        );

        let mut events = runner.run_with_cancellation(
            session.user_id(),
            session.id(),
            Some(content),
            RunConfig::default().with_streaming_mode(StreamingMode::Sse),
            ctx.invocation().cancellation_token().child_token(),
        );

        let mut last_content = None;
        while let Some(item) = events.next().await {
            let event = item?;
            if event.is_partial() {
                continue;
            }
            if let Some(content) = event.content() {
                last_content = Some(content.clone());
            }
        }

        let text = last_content
            .map(|c| c.text_parts().filter(|t| !t.is_empty()).collect::<Vec<_>>().join("\n"))
            .unwrap_or_default();
        self.shape_output(text)
    }
}
