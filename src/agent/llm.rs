//! Minimal model-backed agent.

use std::sync::Arc;

use bon::Builder;
use futures::StreamExt;
use serde_json::json;

use super::{Agent, EventStream, InvocationContext, LlmCapable, TransferPolicy};
use crate::config::StreamingMode;
use crate::error::TrellisError;
use crate::model::{aggregate, LlmRequest, Model};
use crate::session::{Event, EventActions};
use crate::tools::{Tool, ToolContext};
use crate::types::{Content, FunctionCall, FunctionResponse, Part, Role};

/// Agent that answers by calling a [`Model`], running any tools the model
/// asks for until it replies without function calls.
#[derive(Clone, Builder)]
#[builder(on(String, into))]
pub struct LlmAgent {
    name: String,
    #[builder(default)]
    description: String,
    model: Arc<dyn Model>,
    #[builder(default)]
    instruction: String,
    #[builder(default)]
    sub_agents: Vec<Arc<dyn Agent>>,
    #[builder(default)]
    tools: Vec<Arc<dyn Tool>>,
    #[builder(default)]
    disallow_transfer_to_parent: bool,
    #[builder(default)]
    disallow_transfer_to_peers: bool,
    input_schema: Option<serde_json::Value>,
    output_schema: Option<serde_json::Value>,
    /// Session state key receiving the final reply text.
    output_key: Option<String>,
}

impl std::fmt::Debug for LlmAgent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LlmAgent")
            .field("name", &self.name)
            .field("model", &self.model.name())
            .field("tools", &self.tools.iter().map(|t| t.name()).collect::<Vec<_>>())
            .field("sub_agents", &self.sub_agents.len())
            .finish_non_exhaustive()
    }
}

impl LlmAgent {
    fn identity_instruction(&self) -> String {
        let mut identity = format!("You are an agent. Your internal name is \"{}\".", self.name);
        if !self.description.is_empty() {
            identity.push_str(&format!(
                " The description about you is \"{}\".",
                self.description
            ));
        }
        identity
    }

    /// Committed conversation visible from `ctx`'s branch.
    async fn history(&self, ctx: &InvocationContext) -> Vec<Content> {
        let session = ctx.session().read().await;
        session
            .events()
            .iter()
            .filter(|event| on_branch(event.branch.as_deref(), ctx.branch()))
            .filter_map(|event| event.content().cloned())
            .filter(|content| !content.is_empty())
            .collect()
    }

    fn request(&self, contents: Vec<Content>) -> LlmRequest {
        let mut request = LlmRequest {
            model: self.model.name().to_string(),
            contents,
            tools: self.tools.iter().map(|t| t.declaration()).collect(),
            response_schema: self.output_schema.clone(),
            ..Default::default()
        };
        request.append_instruction(&self.identity_instruction());
        request.append_instruction(&self.instruction);
        request
    }

    fn output_value(&self, text: String) -> serde_json::Value {
        if self.output_schema.is_some() {
            if let Ok(parsed) = serde_json::from_str(&text) {
                return parsed;
            }
        }
        serde_json::Value::String(text)
    }

    /// Run the requested tools; tool failures are reported back to the model.
    async fn call_tools(
        &self,
        ctx: &InvocationContext,
        calls: Vec<FunctionCall>,
    ) -> Result<Event, TrellisError> {
        let mut actions = EventActions::default();
        let mut parts = Vec::with_capacity(calls.len());

        for call in calls {
            let tool = self
                .tools
                .iter()
                .find(|t| t.name() == call.name)
                .ok_or_else(|| TrellisError::tool(&call.name, "tool not found"))?;

            let mut tool_ctx = ToolContext::new(ctx.clone(), call.id.clone());
            let response = match tool.run(&mut tool_ctx, call.args).await {
                Ok(value) => value,
                Err(e) if e.is_canceled() => return Err(e),
                Err(e) => {
                    tracing::debug!(agent = %self.name, tool = %call.name, error = %e, "tool failed");
                    json!({ "error": e.to_string() })
                }
            };

            let tool_actions = tool_ctx.into_actions();
            actions.state_delta.extend(tool_actions.state_delta);
            actions.skip_summarization |= tool_actions.skip_summarization;
            actions.escalate |= tool_actions.escalate;
            if tool_actions.transfer_to_agent.is_some() {
                actions.transfer_to_agent = tool_actions.transfer_to_agent;
            }

            parts.push(Part::FunctionResponse(FunctionResponse {
                id: call.id,
                name: call.name,
                response,
            }));
        }

        Ok(Event::from_content(Content::new(Role::User, parts)).with_actions(actions))
    }
}

fn on_branch(event_branch: Option<&str>, current: Option<&str>) -> bool {
    match (event_branch, current) {
        (None, _) => true,
        (Some(_), None) => false,
        (Some(event), Some(current)) => {
            current == event
                || current
                    .strip_prefix(event)
                    .is_some_and(|rest| rest.starts_with('.'))
        }
    }
}

impl Agent for LlmAgent {
    fn name(&self) -> &str {
        &self.name
    }

    fn description(&self) -> &str {
        &self.description
    }

    fn sub_agents(&self) -> &[Arc<dyn Agent>] {
        &self.sub_agents
    }

    fn llm(&self) -> Option<&dyn LlmCapable> {
        Some(self)
    }

    fn run(&self, ctx: InvocationContext) -> EventStream {
        let agent = self.clone();
        Box::pin(async_stream::stream! {
            let streaming = ctx.run_config().streaming_mode != StreamingMode::None;
            let mut history = agent.history(&ctx).await;

            loop {
                let request = agent.request(history.clone());
                let responses = match agent.model.generate_content(request, streaming).await {
                    Ok(responses) => responses,
                    Err(e) => {
                        yield Err(e);
                        return;
                    }
                };
                let mut responses = if streaming { aggregate(responses) } else { responses };

                let mut calls: Vec<FunctionCall> = Vec::new();
                while let Some(item) = responses.next().await {
                    let response = match item {
                        Ok(response) => response,
                        Err(e) => {
                            yield Err(e);
                            return;
                        }
                    };
                    let mut event = Event::from_response(response);
                    if !event.is_partial() {
                        if let Some(content) = event.content() {
                            history.push(content.clone());
                            calls.extend(content.function_calls().into_iter().cloned());
                        }
                        if let Some(key) = &agent.output_key {
                            let text = event.text();
                            if !text.is_empty() && calls.is_empty() {
                                let value = agent.output_value(text);
                                event.actions.state_delta.insert(key.clone(), value);
                            }
                        }
                    }
                    yield Ok(event);
                }

                if calls.is_empty() {
                    break;
                }
                let responses = match agent.call_tools(&ctx, calls).await {
                    Ok(event) => event,
                    Err(e) => {
                        yield Err(e);
                        return;
                    }
                };
                if let Some(content) = responses.content() {
                    history.push(content.clone());
                }
                let stop = responses.actions.skip_summarization;
                yield Ok(responses);
                if stop {
                    break;
                }
            }
        })
    }
}

impl LlmCapable for LlmAgent {
    fn model(&self) -> &Arc<dyn Model> {
        &self.model
    }

    fn transfer_policy(&self) -> TransferPolicy {
        TransferPolicy {
            disallow_transfer_to_parent: self.disallow_transfer_to_parent,
            disallow_transfer_to_peers: self.disallow_transfer_to_peers,
        }
    }

    fn input_schema(&self) -> Option<&serde_json::Value> {
        self.input_schema.as_ref()
    }

    fn output_schema(&self) -> Option<&serde_json::Value> {
        self.output_schema.as_ref()
    }
}

#[cfg(test)]
mod tests {
    use super::on_branch;

    #[test]
    fn branch_visibility_follows_dotted_prefixes() {
        assert!(on_branch(None, Some("p.a")));
        assert!(on_branch(Some("p"), Some("p.a")));
        assert!(on_branch(Some("p.a"), Some("p.a")));
        assert!(!on_branch(Some("p.b"), Some("p.a")));
        assert!(!on_branch(Some("p.ab"), Some("p.a")));
        assert!(!on_branch(Some("p"), None));
    }
}
