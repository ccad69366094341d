//! Model collaborator boundary.
//!
//! Provider clients live outside this crate. An LLM-backed agent only needs
//! something that turns an [`LlmRequest`] into a stream of [`LlmResponse`]s.

pub mod aggregator;

pub use aggregator::{aggregate, StreamingResponseAggregator};

use async_trait::async_trait;
use futures::stream::BoxStream;
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::tools::ToolDeclaration;
use crate::types::{Content, LlmResponse};

/// Stream of responses from one model call.
pub type ResponseStream = BoxStream<'static, Result<LlmResponse>>;

/// A request sent to a model.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct LlmRequest {
    pub model: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub system_instruction: Option<String>,
    pub contents: Vec<Content>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tools: Vec<ToolDeclaration>,
    /// JSON schema the reply must conform to.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub response_schema: Option<serde_json::Value>,
}

impl LlmRequest {
    pub fn append_instruction(&mut self, instruction: &str) {
        if instruction.is_empty() {
            return;
        }
        match &mut self.system_instruction {
            Some(existing) => {
                existing.push_str("\n\n");
                existing.push_str(instruction);
            }
            None => self.system_instruction = Some(instruction.to_string()),
        }
    }
}

/// A language model.
///
/// With `stream == true` implementations yield raw incremental fragments
/// (flagged `partial`) and the caller runs them through a
/// [`StreamingResponseAggregator`]; otherwise they yield complete responses.
#[async_trait]
pub trait Model: Send + Sync {
    fn name(&self) -> &str;

    async fn generate_content(&self, request: LlmRequest, stream: bool) -> Result<ResponseStream>;
}
