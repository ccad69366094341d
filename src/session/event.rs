//! Events: the unit of turn output and of session history.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::types::{Content, LlmResponse};

/// Author used for events carrying the caller's message.
pub const USER_AUTHOR: &str = "user";

/// Side effects an event requests from the runtime.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct EventActions {
    /// State changes applied when the event is committed.
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub state_delta: HashMap<String, serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub transfer_to_agent: Option<String>,
    /// Ask the enclosing loop to stop after this event.
    #[serde(default)]
    pub escalate: bool,
    #[serde(default)]
    pub skip_summarization: bool,
}

/// One unit of turn output.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Event {
    pub id: String,
    pub invocation_id: String,
    /// Agent name, or [`USER_AUTHOR`].
    pub author: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub branch: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub response: Option<LlmResponse>,
    #[serde(default)]
    pub actions: EventActions,
    pub timestamp: DateTime<Utc>,
}

impl Default for Event {
    fn default() -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            invocation_id: String::new(),
            author: String::new(),
            branch: None,
            response: None,
            actions: EventActions::default(),
            timestamp: Utc::now(),
        }
    }
}

impl Event {
    /// Create an empty event for an invocation.
    pub fn new(invocation_id: impl Into<String>) -> Self {
        Self {
            invocation_id: invocation_id.into(),
            ..Default::default()
        }
    }

    /// Create an event carrying a complete (non-partial) message.
    pub fn from_content(content: Content) -> Self {
        Self::from_response(LlmResponse::from_content(content))
    }

    pub fn from_response(response: LlmResponse) -> Self {
        Self {
            response: Some(response),
            ..Default::default()
        }
    }

    pub fn with_author(mut self, author: impl Into<String>) -> Self {
        self.author = author.into();
        self
    }

    pub fn with_actions(mut self, actions: EventActions) -> Self {
        self.actions = actions;
        self
    }

    /// True iff the event carries a response flagged as a streaming fragment.
    ///
    /// Partial events are relayed to the caller but never committed.
    pub fn is_partial(&self) -> bool {
        self.response.as_ref().is_some_and(|r| r.partial)
    }

    pub fn content(&self) -> Option<&Content> {
        self.response.as_ref().and_then(|r| r.content.as_ref())
    }

    /// Concatenated non-thought text, empty when there is none.
    pub fn text(&self) -> String {
        self.content().map(Content::text).unwrap_or_default()
    }

    pub fn is_from_user(&self) -> bool {
        self.author == USER_AUTHOR
    }
}
