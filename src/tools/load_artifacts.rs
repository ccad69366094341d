//! Built-in `load_artifacts` tool.
//!
//! Lets a model fetch artifacts of the current session by name, such as the
//! files the runner off-loaded from an inbound message. Called with no names
//! it lists what is available.

use async_trait::async_trait;
use serde_json::json;

use super::tool::{Tool, ToolContext, ToolDeclaration};
use super::validation::validate_arguments;
use crate::error::{Result, TrellisError};

const NAME: &str = "load_artifacts";

/// Loads session artifacts into the model's view.
///
/// Text artifacts come back as text; binary ones as `inline_data` parts with
/// base64 data. A name that does not exist fails the call.
#[derive(Debug, Clone, Copy, Default)]
pub struct LoadArtifactsTool;

impl LoadArtifactsTool {
    pub fn new() -> Self {
        Self
    }

    fn parameters() -> serde_json::Value {
        json!({
            "type": "object",
            "properties": {
                "artifact_names": {
                    "type": "array",
                    "items": { "type": "string" },
                    "description": "Names of the artifacts to load. Leave empty to list them."
                }
            }
        })
    }
}

#[async_trait]
impl Tool for LoadArtifactsTool {
    fn name(&self) -> &str {
        NAME
    }

    fn description(&self) -> &str {
        "Loads the artifacts and adds them to the session."
    }

    fn declaration(&self) -> ToolDeclaration {
        ToolDeclaration {
            name: NAME.to_string(),
            description: self.description().to_string(),
            parameters: Self::parameters(),
        }
    }

    async fn run(
        &self,
        ctx: &mut ToolContext,
        args: serde_json::Value,
    ) -> Result<serde_json::Value> {
        validate_arguments(NAME, &args, &Self::parameters())?;
        let artifacts = ctx
            .invocation()
            .artifacts()
            .ok_or_else(|| TrellisError::tool(NAME, "no artifact service is configured"))?;

        let names: Vec<String> = args
            .get("artifact_names")
            .and_then(|v| v.as_array())
            .map(|names| {
                names
                    .iter()
                    .filter_map(|n| n.as_str().map(str::to_string))
                    .collect()
            })
            .unwrap_or_default();

        if names.is_empty() {
            return Ok(json!({ "artifact_names": artifacts.list().await? }));
        }

        let mut loaded = serde_json::Map::new();
        for name in names {
            let part = artifacts.load(&name).await?;
            let value = match part.as_text() {
                Some(text) => json!(text),
                None => serde_json::to_value(&part)?,
            };
            loaded.insert(name, value);
        }
        tracing::debug!(tool = NAME, count = loaded.len(), "artifacts loaded");
        Ok(json!({ "artifacts": loaded }))
    }
}
