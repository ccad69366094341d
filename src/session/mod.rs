//! Sessions: persisted conversation history and state.
//!
//! A [`Session`] is identified by (app, user, session id) and owns an
//! append-only [`Events`] log plus a key/value [`State`]. Sessions are only
//! mutated through a [`SessionService`]; the runner requests appends and never
//! writes storage directly.

pub mod event;
pub mod in_memory;

pub use event::{Event, EventActions, USER_AUTHOR};
pub use in_memory::InMemorySessionService;

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::Result;

/// Shared handle to the session being driven by one turn.
///
/// The runner is the only writer; agents take read locks.
pub type SessionHandle = Arc<tokio::sync::RwLock<Session>>;

/// Key/value state attached to a session.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(transparent)]
pub struct State(HashMap<String, serde_json::Value>);

impl State {
    /// Keys shared by every session of an app.
    pub const APP_PREFIX: &'static str = "app:";
    /// Keys shared by every session of a user.
    pub const USER_PREFIX: &'static str = "user:";
    /// Keys that are never persisted.
    pub const TEMP_PREFIX: &'static str = "temp:";
    /// Keys reserved for the runtime itself.
    pub const INTERNAL_PREFIX: &'static str = "_trellis";

    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &str) -> Option<&serde_json::Value> {
        self.0.get(key)
    }

    pub fn set(&mut self, key: impl Into<String>, value: serde_json::Value) {
        self.0.insert(key.into(), value);
    }

    pub fn remove(&mut self, key: &str) -> Option<serde_json::Value> {
        self.0.remove(key)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &serde_json::Value)> {
        self.0.iter()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Copy of this state without runtime-internal keys.
    pub fn without_internal(&self) -> State {
        State(
            self.0
                .iter()
                .filter(|(k, _)| !k.starts_with(Self::INTERNAL_PREFIX))
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect(),
        )
    }

    /// Apply an event's state delta, skipping `temp:` keys.
    pub fn apply_delta(&mut self, delta: &HashMap<String, serde_json::Value>) {
        for (key, value) in delta {
            if key.starts_with(Self::TEMP_PREFIX) {
                continue;
            }
            self.0.insert(key.clone(), value.clone());
        }
    }
}

impl From<HashMap<String, serde_json::Value>> for State {
    fn from(map: HashMap<String, serde_json::Value>) -> Self {
        Self(map)
    }
}

/// Ordered, indexable read view over a session's events.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(transparent)]
pub struct Events(Vec<Event>);

impl Events {
    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn at(&self, index: usize) -> Option<&Event> {
        self.0.get(index)
    }

    pub fn last(&self) -> Option<&Event> {
        self.0.last()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Event> {
        self.0.iter()
    }

    pub(crate) fn push(&mut self, event: Event) {
        self.0.push(event);
    }

    /// Keep only the most recent `count` events.
    pub fn retain_recent(&mut self, count: usize) {
        let skip = self.0.len().saturating_sub(count);
        self.0.drain(..skip);
    }

    /// Keep only events at or after `after`.
    pub fn retain_after(&mut self, after: DateTime<Utc>) {
        self.0.retain(|e| e.timestamp >= after);
    }
}

impl<'a> IntoIterator for &'a Events {
    type Item = &'a Event;
    type IntoIter = std::slice::Iter<'a, Event>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

/// A conversation between one user and one app.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Session {
    id: String,
    app_name: String,
    user_id: String,
    state: State,
    events: Events,
    last_update_time: DateTime<Utc>,
}

impl Session {
    pub fn new(app_name: impl Into<String>, user_id: impl Into<String>, id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            app_name: app_name.into(),
            user_id: user_id.into(),
            state: State::default(),
            events: Events::default(),
            last_update_time: Utc::now(),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn app_name(&self) -> &str {
        &self.app_name
    }

    pub fn user_id(&self) -> &str {
        &self.user_id
    }

    pub fn state(&self) -> &State {
        &self.state
    }

    pub fn events(&self) -> &Events {
        &self.events
    }

    pub fn last_update_time(&self) -> DateTime<Utc> {
        self.last_update_time
    }

    /// Seed the state, e.g. when creating or loading a session.
    pub fn with_state(mut self, state: State) -> Self {
        self.state = state;
        self
    }

    /// Restore previously stored events without re-applying their deltas.
    pub fn with_events(mut self, events: Vec<Event>) -> Self {
        if let Some(last) = events.last() {
            self.last_update_time = last.timestamp;
        }
        self.events = Events(events);
        self
    }

    pub fn events_mut(&mut self) -> &mut Events {
        &mut self.events
    }

    /// Append an event, apply its state delta and bump the update time.
    ///
    /// [`SessionService::append_event`] implementations call this on the
    /// caller's copy so the running turn sees what was stored.
    pub fn apply_event(&mut self, event: Event) {
        self.state.apply_delta(&event.actions.state_delta);
        self.last_update_time = event.timestamp;
        self.events.push(event);
    }
}

#[derive(Debug, Clone, Default)]
pub struct CreateRequest {
    pub app_name: String,
    pub user_id: String,
    /// Generated when absent.
    pub session_id: Option<String>,
    pub state: State,
}

#[derive(Debug, Clone)]
pub struct CreateResponse {
    pub session: Session,
}

#[derive(Debug, Clone, Default)]
pub struct GetRequest {
    pub app_name: String,
    pub user_id: String,
    pub session_id: String,
    /// Keep only the most recent N events.
    pub num_recent_events: Option<usize>,
    /// Keep only events at or after this time.
    pub after: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone)]
pub struct GetResponse {
    pub session: Session,
}

#[derive(Debug, Clone, Default)]
pub struct ListRequest {
    pub app_name: String,
    pub user_id: String,
}

#[derive(Debug, Clone)]
pub struct ListResponse {
    pub sessions: Vec<Session>,
}

#[derive(Debug, Clone, Default)]
pub struct DeleteRequest {
    pub app_name: String,
    pub user_id: String,
    pub session_id: String,
}

/// Storage for sessions.
#[async_trait]
pub trait SessionService: Send + Sync {
    async fn create(&self, request: CreateRequest) -> Result<CreateResponse>;

    async fn get(&self, request: GetRequest) -> Result<GetResponse>;

    async fn list(&self, request: ListRequest) -> Result<ListResponse>;

    async fn delete(&self, request: DeleteRequest) -> Result<()>;

    /// Durably append `event` and mirror it onto the caller's `session`
    /// with [`Session::apply_event`]. Partial events are not stored.
    async fn append_event(&self, session: &mut Session, event: Event) -> Result<()>;
}
