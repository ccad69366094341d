//! Keyword-matching memory kept in process.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, RwLock};

use async_trait::async_trait;

use super::{MemoryEntry, MemoryService, SearchRequest, SearchResponse};
use crate::error::{Result, TrellisError};
use crate::session::Session;

type UserKey = (String, String);

#[derive(Debug, Clone)]
struct Indexed {
    entry: MemoryEntry,
    words: HashSet<String>,
}

/// Memories grouped by (app, user) and then by session id.
#[derive(Debug, Clone, Default)]
pub struct InMemoryMemoryService {
    store: Arc<RwLock<HashMap<UserKey, HashMap<String, Vec<Indexed>>>>>,
}

impl InMemoryMemoryService {
    pub fn new() -> Self {
        Self::default()
    }
}

fn words(text: &str) -> HashSet<String> {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|w| !w.is_empty())
        .map(str::to_lowercase)
        .collect()
}

#[async_trait]
impl MemoryService for InMemoryMemoryService {
    async fn add_session(&self, session: &Session) -> Result<()> {
        let entries: Vec<Indexed> = session
            .events()
            .iter()
            .filter_map(|event| {
                let content = event.content()?;
                let words = words(&content.text());
                if words.is_empty() {
                    return None;
                }
                Some(Indexed {
                    entry: MemoryEntry {
                        content: content.clone(),
                        author: event.author.clone(),
                        timestamp: event.timestamp,
                    },
                    words,
                })
            })
            .collect();

        let key = (session.app_name().to_string(), session.user_id().to_string());
        let mut store = self
            .store
            .write()
            .map_err(|_| TrellisError::Io(std::io::Error::other("memory store lock poisoned")))?;
        store
            .entry(key)
            .or_default()
            .insert(session.id().to_string(), entries);
        Ok(())
    }

    async fn search(&self, request: SearchRequest) -> Result<SearchResponse> {
        let query = words(&request.query);
        let store = self
            .store
            .read()
            .map_err(|_| TrellisError::Io(std::io::Error::other("memory store lock poisoned")))?;
        let Some(sessions) = store.get(&(request.app_name, request.user_id)) else {
            return Ok(SearchResponse::default());
        };

        let mut memories: Vec<MemoryEntry> = sessions
            .values()
            .flatten()
            .filter(|indexed| !indexed.words.is_disjoint(&query))
            .map(|indexed| indexed.entry.clone())
            .collect();
        memories.sort_by_key(|m| m.timestamp);
        Ok(SearchResponse { memories })
    }
}
