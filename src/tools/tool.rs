//! Tool trait, call context and closure-based tool wrapper.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::agent::InvocationContext;
use crate::error::Result;
use crate::session::{EventActions, State};

/// Function declaration advertised to the model.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ToolDeclaration {
    pub name: String,
    pub description: String,
    /// JSON Schema of the arguments object.
    pub parameters: serde_json::Value,
}

/// Context available during one tool call.
///
/// Actions recorded here are attached to the function-response event.
#[derive(Debug, Clone)]
pub struct ToolContext {
    invocation: InvocationContext,
    function_call_id: Option<String>,
    actions: EventActions,
}

impl ToolContext {
    pub fn new(invocation: InvocationContext, function_call_id: Option<String>) -> Self {
        Self {
            invocation,
            function_call_id,
            actions: EventActions::default(),
        }
    }

    pub fn invocation(&self) -> &InvocationContext {
        &self.invocation
    }

    pub fn function_call_id(&self) -> Option<&str> {
        self.function_call_id.as_deref()
    }

    /// Snapshot of the calling session's state.
    pub async fn state(&self) -> State {
        self.invocation.state().await
    }

    pub async fn user_id(&self) -> String {
        self.invocation.session().read().await.user_id().to_string()
    }

    pub fn actions(&self) -> &EventActions {
        &self.actions
    }

    pub fn actions_mut(&mut self) -> &mut EventActions {
        &mut self.actions
    }

    pub fn into_actions(self) -> EventActions {
        self.actions
    }
}

/// Core tool trait.
#[async_trait]
pub trait Tool: Send + Sync {
    /// Tool name (must match what the model calls).
    fn name(&self) -> &str;

    fn description(&self) -> &str;

    fn declaration(&self) -> ToolDeclaration;

    async fn run(&self, ctx: &mut ToolContext, args: serde_json::Value)
        -> Result<serde_json::Value>;
}

type ToolHandler = dyn Fn(
        serde_json::Value,
    ) -> Pin<Box<dyn Future<Output = Result<serde_json::Value>> + Send>>
    + Send
    + Sync;

/// Closure-based tool; arguments are validated against `parameters` first.
#[derive(Clone)]
pub struct FunctionTool {
    name: String,
    description: String,
    parameters: serde_json::Value,
    handler: Arc<ToolHandler>,
}

impl FunctionTool {
    pub fn new<F, Fut>(
        name: impl Into<String>,
        description: impl Into<String>,
        parameters: serde_json::Value,
        handler: F,
    ) -> Self
    where
        F: Fn(serde_json::Value) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<serde_json::Value>> + Send + 'static,
    {
        Self {
            name: name.into(),
            description: description.into(),
            parameters,
            handler: Arc::new(move |args| Box::pin(handler(args))),
        }
    }
}

#[async_trait]
impl Tool for FunctionTool {
    fn name(&self) -> &str {
        &self.name
    }

    fn description(&self) -> &str {
        &self.description
    }

    fn declaration(&self) -> ToolDeclaration {
        ToolDeclaration {
            name: self.name.clone(),
            description: self.description.clone(),
            parameters: self.parameters.clone(),
        }
    }

    async fn run(
        &self,
        _ctx: &mut ToolContext,
        args: serde_json::Value,
    ) -> Result<serde_json::Value> {
        super::validate_arguments(&self.name, &args, &self.parameters)?;
        (self.handler)(args).await
    }
}

impl std::fmt::Debug for FunctionTool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FunctionTool")
            .field("name", &self.name)
            .field("description", &self.description)
            .finish()
    }
}
