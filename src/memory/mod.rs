//! Long-term memory: searchable recollections of past sessions.

pub mod in_memory;

pub use in_memory::InMemoryMemoryService;

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::error::Result;
use crate::session::Session;
use crate::types::Content;

/// One remembered message.
#[derive(Debug, Clone, PartialEq)]
pub struct MemoryEntry {
    pub content: Content,
    pub author: String,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, Default)]
pub struct SearchRequest {
    pub app_name: String,
    pub user_id: String,
    pub query: String,
}

#[derive(Debug, Clone, Default)]
pub struct SearchResponse {
    pub memories: Vec<MemoryEntry>,
}

#[async_trait]
pub trait MemoryService: Send + Sync {
    /// Ingest every event of `session` that carries content.
    async fn add_session(&self, session: &Session) -> Result<()>;

    async fn search(&self, request: SearchRequest) -> Result<SearchResponse>;
}

/// Memory access bound to the user of one session.
#[derive(Clone)]
pub struct Memory {
    service: Arc<dyn MemoryService>,
    app_name: String,
    user_id: String,
}

impl std::fmt::Debug for Memory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Memory")
            .field("app_name", &self.app_name)
            .field("user_id", &self.user_id)
            .finish_non_exhaustive()
    }
}

impl Memory {
    pub fn new(
        service: Arc<dyn MemoryService>,
        app_name: impl Into<String>,
        user_id: impl Into<String>,
    ) -> Self {
        Self {
            service,
            app_name: app_name.into(),
            user_id: user_id.into(),
        }
    }

    pub async fn add_session(&self, session: &Session) -> Result<()> {
        self.service.add_session(session).await
    }

    pub async fn search(&self, query: &str) -> Result<Vec<MemoryEntry>> {
        let request = SearchRequest {
            app_name: self.app_name.clone(),
            user_id: self.user_id.clone(),
            query: query.to_string(),
        };
        Ok(self.service.search(request).await?.memories)
    }
}
