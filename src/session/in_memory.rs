//! In-memory session service (tests, nested agent-as-tool runs, demos).

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use chrono::Utc;
use uuid::Uuid;

use super::{
    CreateRequest, CreateResponse, DeleteRequest, Event, GetRequest, GetResponse, ListRequest,
    ListResponse, Session, SessionService,
};
use crate::error::{Result, TrellisError};

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct SessionKey {
    app_name: String,
    user_id: String,
    session_id: String,
}

impl SessionKey {
    fn new(app_name: &str, user_id: &str, session_id: &str) -> Self {
        Self {
            app_name: app_name.to_string(),
            user_id: user_id.to_string(),
            session_id: session_id.to_string(),
        }
    }

    fn of(session: &Session) -> Self {
        Self::new(session.app_name(), session.user_id(), session.id())
    }
}

/// Sessions held in a process-local map.
#[derive(Debug, Clone, Default)]
pub struct InMemorySessionService {
    sessions: Arc<RwLock<HashMap<SessionKey, Session>>>,
}

impl InMemorySessionService {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock_poisoned() -> TrellisError {
        TrellisError::Io(std::io::Error::other("session store lock poisoned"))
    }
}

#[async_trait]
impl SessionService for InMemorySessionService {
    async fn create(&self, request: CreateRequest) -> Result<CreateResponse> {
        let session_id = request
            .session_id
            .filter(|id| !id.is_empty())
            .unwrap_or_else(|| Uuid::new_v4().to_string());
        let key = SessionKey::new(&request.app_name, &request.user_id, &session_id);

        let mut sessions = self.sessions.write().map_err(|_| Self::lock_poisoned())?;
        if sessions.contains_key(&key) {
            return Err(TrellisError::SessionAlreadyExists(session_id));
        }
        let session = Session::new(request.app_name, request.user_id, session_id)
            .with_state(request.state);
        sessions.insert(key, session.clone());
        Ok(CreateResponse { session })
    }

    async fn get(&self, request: GetRequest) -> Result<GetResponse> {
        let key = SessionKey::new(&request.app_name, &request.user_id, &request.session_id);
        let sessions = self.sessions.read().map_err(|_| Self::lock_poisoned())?;
        let mut session = sessions
            .get(&key)
            .cloned()
            .ok_or_else(|| TrellisError::SessionNotFound(request.session_id.clone()))?;
        drop(sessions);

        if let Some(after) = request.after {
            session.events_mut().retain_after(after);
        }
        if let Some(count) = request.num_recent_events {
            session.events_mut().retain_recent(count);
        }
        Ok(GetResponse { session })
    }

    async fn list(&self, request: ListRequest) -> Result<ListResponse> {
        let sessions = self.sessions.read().map_err(|_| Self::lock_poisoned())?;
        let mut found: Vec<Session> = sessions
            .iter()
            .filter(|(k, _)| k.app_name == request.app_name && k.user_id == request.user_id)
            .map(|(_, s)| s.clone())
            .collect();
        found.sort_by(|a, b| a.id().cmp(b.id()));
        Ok(ListResponse { sessions: found })
    }

    async fn delete(&self, request: DeleteRequest) -> Result<()> {
        let key = SessionKey::new(&request.app_name, &request.user_id, &request.session_id);
        let mut sessions = self.sessions.write().map_err(|_| Self::lock_poisoned())?;
        sessions
            .remove(&key)
            .map(|_| ())
            .ok_or(TrellisError::SessionNotFound(request.session_id))
    }

    async fn append_event(&self, session: &mut Session, event: Event) -> Result<()> {
        if event.is_partial() {
            return Ok(());
        }
        let key = SessionKey::of(session);
        let mut sessions = self.sessions.write().map_err(|_| Self::lock_poisoned())?;
        let stored = sessions
            .get_mut(&key)
            .ok_or_else(|| TrellisError::SessionNotFound(session.id().to_string()))?;

        let mut event = event;
        if event.timestamp > Utc::now() {
            event.timestamp = Utc::now();
        }
        stored.apply_event(event.clone());
        session.apply_event(event);
        Ok(())
    }
}
