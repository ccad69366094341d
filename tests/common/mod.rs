//! Shared test helpers: scripted model, custom agents and collectors.

#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use futures::{Stream, StreamExt};

use trellis::agent::{Agent, EventStream, FunctionAgent};
use trellis::error::{Result, TrellisError};
use trellis::model::{LlmRequest, Model, ResponseStream};
use trellis::runner::{Runner, RunnerConfig};
use trellis::session::{
    CreateRequest, Event, GetRequest, InMemorySessionService, Session, SessionService,
};
use trellis::types::{Content, FinishReason, LlmResponse, Part, Usage};

pub const APP: &str = "test_app";
pub const USER: &str = "test_user";

enum Reply {
    Content(Content),
    Error(String),
}

/// A model that replays queued replies in order.
///
/// When streaming, text replies are cut into five-character partial
/// fragments; anything else is sent as one fragment.
pub struct MockModel {
    name: String,
    replies: Mutex<VecDeque<Reply>>,
    requests: Mutex<Vec<LlmRequest>>,
}

impl MockModel {
    pub fn new(name: &str) -> Arc<Self> {
        Arc::new(Self {
            name: name.to_string(),
            replies: Mutex::new(VecDeque::new()),
            requests: Mutex::new(Vec::new()),
        })
    }

    pub fn queue_text(&self, text: &str) {
        self.queue_content(Content::model_text(text));
    }

    pub fn queue_content(&self, content: Content) {
        self.replies.lock().unwrap().push_back(Reply::Content(content));
    }

    pub fn queue_function_call(&self, name: &str, args: serde_json::Value) {
        self.queue_content(Content::new(
            trellis::types::Role::Model,
            vec![Part::FunctionCall(trellis::types::FunctionCall {
                id: Some(format!("call-{name}")),
                name: name.to_string(),
                args,
            })],
        ));
    }

    /// Queue a reply that fails mid-stream.
    pub fn queue_error(&self, message: &str) {
        self.replies
            .lock()
            .unwrap()
            .push_back(Reply::Error(message.to_string()));
    }

    pub fn requests(&self) -> Vec<LlmRequest> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl Model for MockModel {
    fn name(&self) -> &str {
        &self.name
    }

    async fn generate_content(&self, request: LlmRequest, stream: bool) -> Result<ResponseStream> {
        self.requests.lock().unwrap().push(request);
        let reply = self
            .replies
            .lock()
            .unwrap()
            .pop_front()
            .ok_or_else(|| TrellisError::model(&self.name, "no data"))?;

        let content = match reply {
            Reply::Error(message) => {
                let err = TrellisError::model(&self.name, message);
                return Ok(Box::pin(futures::stream::once(async move { Err::<LlmResponse, _>(err) })));
            }
            Reply::Content(content) => content,
        };

        let text_only = content.parts.iter().all(Part::is_text);
        if !stream || !text_only {
            let response = LlmResponse {
                content: Some(content),
                turn_complete: true,
                finish_reason: Some(FinishReason::Stop),
                ..Default::default()
            };
            return Ok(Box::pin(futures::stream::once(async move { Ok::<_, TrellisError>(response) })));
        }

        let text = content.text();
        Ok(Box::pin(async_stream::stream! {
            let chars: Vec<char> = text.chars().collect();
            let count = chars.chunks(5).count();
            for (i, chunk) in chars.chunks(5).enumerate() {
                let mut fragment = LlmResponse::partial(Content::model_text(chunk.iter().collect::<String>()));
                if i + 1 == count {
                    fragment.finish_reason = Some(FinishReason::Stop);
                    fragment.usage = Some(Usage { input_tokens: 10, output_tokens: 20, total_tokens: 30, ..Default::default() });
                }
                yield Ok::<_, TrellisError>(fragment);
            }
        }))
    }
}

/// Agent that emits one model-text event per entry of `texts`.
pub fn text_agent(name: &str, texts: &[&str]) -> Arc<dyn Agent> {
    let texts: Vec<String> = texts.iter().map(|t| t.to_string()).collect();
    Arc::new(FunctionAgent::new(name, move |_ctx| -> EventStream {
        let texts = texts.clone();
        Box::pin(futures::stream::iter(
            texts
                .into_iter()
                .map(|t| Ok::<_, TrellisError>(Event::from_content(Content::model_text(t)))),
        ))
    }))
}

/// Agent that counts its runs and emits `"<name> run <n>"` each time.
pub fn counting_agent(name: &str, runs: Arc<AtomicUsize>) -> Arc<dyn Agent> {
    let label = name.to_string();
    Arc::new(FunctionAgent::new(name, move |_ctx| -> EventStream {
        let n = runs.fetch_add(1, Ordering::SeqCst) + 1;
        let text = format!("{label} run {n}");
        Box::pin(futures::stream::once(async move {
            Ok::<_, TrellisError>(Event::from_content(Content::model_text(text)))
        }))
    }))
}

/// Agent that fails immediately.
pub fn failing_agent(name: &str, message: &str) -> Arc<dyn Agent> {
    let agent = name.to_string();
    let message = message.to_string();
    Arc::new(FunctionAgent::new(name, move |_ctx| -> EventStream {
        let err = TrellisError::agent(&agent, &message);
        Box::pin(futures::stream::once(async move { Err::<Event, _>(err) }))
    }))
}

/// Agent that emits an event every `period` forever.
pub fn ticking_agent(name: &str, period: Duration, ticks: Arc<AtomicUsize>) -> Arc<dyn Agent> {
    Arc::new(FunctionAgent::new(name, move |_ctx| -> EventStream {
        let ticks = ticks.clone();
        Box::pin(async_stream::stream! {
            loop {
                tokio::time::sleep(period).await;
                let n = ticks.fetch_add(1, Ordering::SeqCst);
                yield Ok::<_, TrellisError>(Event::from_content(Content::model_text(format!("tick {n}"))));
            }
        })
    }))
}

/// Agent that emits one partial fragment and nothing else.
pub fn partial_agent(name: &str, text: &str) -> Arc<dyn Agent> {
    let text = text.to_string();
    Arc::new(FunctionAgent::new(name, move |_ctx| -> EventStream {
        let event = Event::from_response(LlmResponse::partial(Content::model_text(text.clone())));
        Box::pin(futures::stream::once(async move { Ok::<_, TrellisError>(event) }))
    }))
}

/// Drain a stream, stopping at the first error.
pub async fn collect<S>(stream: S) -> (Vec<Event>, Option<TrellisError>)
where
    S: Stream<Item = Result<Event>> + Unpin,
{
    let mut stream = stream;
    let mut events = Vec::new();
    while let Some(item) = stream.next().await {
        match item {
            Ok(event) => events.push(event),
            Err(e) => return (events, Some(e)),
        }
    }
    (events, None)
}

pub fn texts(events: &[Event]) -> Vec<String> {
    events.iter().map(Event::text).collect()
}

pub fn authors(events: &[Event]) -> Vec<String> {
    events.iter().map(|e| e.author.clone()).collect()
}

/// A runner over an in-memory session service, plus a ready session.
pub struct TestRunner {
    pub runner: Runner,
    pub sessions: Arc<InMemorySessionService>,
    pub session_id: String,
}

impl TestRunner {
    pub async fn new(agent: Arc<dyn Agent>) -> Self {
        let sessions = Arc::new(InMemorySessionService::new());
        let runner = Runner::new(
            RunnerConfig::builder()
                .app_name(APP)
                .agent(agent)
                .session_service(sessions.clone())
                .build(),
        )
        .unwrap();
        let session_id = create_session(sessions.as_ref(), "s1").await.id().to_string();
        Self {
            runner,
            sessions,
            session_id,
        }
    }

    pub fn run(&self, text: &str) -> EventStream {
        self.runner.run(
            USER,
            self.session_id.clone(),
            Some(Content::user_text(text)),
            Default::default(),
        )
    }

    pub async fn session(&self) -> Session {
        stored_session(self.sessions.as_ref(), &self.session_id).await
    }
}

pub async fn create_session(sessions: &dyn SessionService, id: &str) -> Session {
    sessions
        .create(CreateRequest {
            app_name: APP.into(),
            user_id: USER.into(),
            session_id: Some(id.into()),
            ..Default::default()
        })
        .await
        .unwrap()
        .session
}

pub async fn stored_session(sessions: &dyn SessionService, id: &str) -> Session {
    sessions
        .get(GetRequest {
            app_name: APP.into(),
            user_id: USER.into(),
            session_id: id.into(),
            ..Default::default()
        })
        .await
        .unwrap()
        .session
}
