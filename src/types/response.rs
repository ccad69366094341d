//! Model responses as carried by events.

use serde::{Deserialize, Serialize};

use super::content::Content;
use super::usage::{FinishReason, Usage};

/// One response (or one streamed fragment of a response) from a model.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct LlmResponse {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<Content>,
    /// Transient streaming fragment; never committed to a session.
    #[serde(default)]
    pub partial: bool,
    #[serde(default)]
    pub turn_complete: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub finish_reason: Option<FinishReason>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub usage: Option<Usage>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
}

impl LlmResponse {
    pub fn from_content(content: Content) -> Self {
        Self {
            content: Some(content),
            ..Default::default()
        }
    }

    pub fn partial(content: Content) -> Self {
        Self {
            content: Some(content),
            partial: true,
            ..Default::default()
        }
    }

    /// Concatenated non-thought text, empty when there is no content.
    pub fn text(&self) -> String {
        self.content.as_ref().map(Content::text).unwrap_or_default()
    }
}
