//! Turn orchestration: agent resolution, commit policy and failure modes.

mod common;

use std::sync::atomic::AtomicUsize;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures::StreamExt;
use pretty_assertions::assert_eq;
use tokio_util::sync::CancellationToken;

use common::*;
use trellis::agent::{Agent, AgentTree, EventStream, FunctionAgent, LlmAgent};
use trellis::artifact::{ArtifactKey, ArtifactService, InMemoryArtifactService, LoadRequest};
use trellis::config::{RunConfig, StreamingMode};
use trellis::error::{ErrorCategory, Result, TrellisError};
use trellis::runner::{find_agent_to_run, Runner, RunnerConfig};
use trellis::session::{
    CreateRequest, CreateResponse, DeleteRequest, Event, GetRequest, GetResponse,
    InMemorySessionService, ListRequest, ListResponse, Session, SessionService,
};
use trellis::types::{Content, Part, Role};
use trellis::workflow::SequentialAgent;

fn llm(name: &str, disallow_parent: bool, sub_agents: Vec<Arc<dyn Agent>>) -> Arc<dyn Agent> {
    Arc::new(
        LlmAgent::builder()
            .name(name)
            .model(MockModel::new("mock"))
            .disallow_transfer_to_parent(disallow_parent)
            .sub_agents(sub_agents)
            .build(),
    )
}

async fn session_with_authors(authors: &[&str]) -> Session {
    let sessions = InMemorySessionService::new();
    let mut session = create_session(&sessions, "history").await;
    for author in authors {
        let event = Event::from_content(Content::model_text("hi")).with_author(*author);
        sessions.append_event(&mut session, event).await.unwrap();
    }
    session
}

fn transfer_tree() -> AgentTree {
    AgentTree::build(llm(
        "root",
        false,
        vec![llm("no_transfer", true, vec![]), llm("allows_transfer", false, vec![])],
    ))
    .unwrap()
}

#[tokio::test]
async fn resolves_last_transferable_author() {
    let tree = transfer_tree();
    let session = session_with_authors(&["allows_transfer", "user"]).await;
    assert_eq!(find_agent_to_run(&session, &tree).name(), "allows_transfer");
}

#[tokio::test]
async fn falls_back_to_root_when_transfer_disallowed() {
    let tree = transfer_tree();
    let session = session_with_authors(&["no_transfer", "user"]).await;
    assert_eq!(find_agent_to_run(&session, &tree).name(), "root");
}

#[tokio::test]
async fn falls_back_to_root_without_agent_events() {
    let tree = transfer_tree();
    assert_eq!(find_agent_to_run(&session_with_authors(&["user"]).await, &tree).name(), "root");
    assert_eq!(find_agent_to_run(&session_with_authors(&[]).await, &tree).name(), "root");
}

#[tokio::test]
async fn skips_unknown_authors() {
    let tree = transfer_tree();
    let session = session_with_authors(&["allows_transfer", "stranger", "user"]).await;
    assert_eq!(find_agent_to_run(&session, &tree).name(), "allows_transfer");
}

#[tokio::test]
async fn middle_ancestor_blocks_transfer_of_its_subtree() {
    let tree = AgentTree::build(llm(
        "root",
        false,
        vec![llm("middle", true, vec![llm("leaf", false, vec![])])],
    ))
    .unwrap();
    let session = session_with_authors(&["leaf", "user"]).await;
    assert_eq!(find_agent_to_run(&session, &tree).name(), "root");
}

#[tokio::test]
async fn non_llm_ancestor_blocks_transfer() {
    let root: Arc<dyn Agent> = Arc::new(SequentialAgent::new(
        "pipeline",
        vec![llm("writer", false, vec![])],
    ));
    let tree = AgentTree::build(root).unwrap();
    let session = session_with_authors(&["writer"]).await;
    assert_eq!(find_agent_to_run(&session, &tree).name(), "pipeline");
}

#[tokio::test]
async fn next_turn_resumes_transferable_sub_agent() {
    let root_model = MockModel::new("mock");
    let helper_model = MockModel::new("mock");
    root_model.queue_text("from root");
    helper_model.queue_text("from helper");

    let helper: Arc<dyn Agent> = Arc::new(
        LlmAgent::builder().name("helper").model(helper_model.clone()).build(),
    );
    let root: Arc<dyn Agent> = Arc::new(
        LlmAgent::builder()
            .name("root")
            .model(root_model.clone())
            .sub_agents(vec![helper])
            .build(),
    );
    let t = TestRunner::new(root).await;

    // Simulate an earlier turn answered by the helper.
    let mut session = t.session().await;
    let earlier = Event::from_content(Content::model_text("earlier")).with_author("helper");
    t.sessions.append_event(&mut session, earlier).await.unwrap();

    let (events, err) = collect(t.run("again")).await;
    assert!(err.is_none());
    assert_eq!(authors(&events), vec!["helper"]);
    assert_eq!(texts(&events), vec!["from helper"]);
    assert!(root_model.requests().is_empty());
}

#[tokio::test]
async fn commits_user_message_and_final_events() {
    let t = TestRunner::new(text_agent("echo", &["one", "two"])).await;

    let (events, err) = collect(t.run("hello")).await;
    assert!(err.is_none());
    assert_eq!(texts(&events), vec!["one", "two"]);

    let session = t.session().await;
    let committed: Vec<(String, String)> = session
        .events()
        .iter()
        .map(|e| (e.author.clone(), e.text()))
        .collect();
    assert_eq!(
        committed,
        vec![
            ("user".to_string(), "hello".to_string()),
            ("echo".to_string(), "one".to_string()),
            ("echo".to_string(), "two".to_string()),
        ]
    );
    let invocation = &session.events().at(0).unwrap().invocation_id;
    assert!(!invocation.is_empty());
    assert!(session.events().iter().all(|e| &e.invocation_id == invocation));
}

#[tokio::test]
async fn partial_events_are_relayed_but_not_committed() {
    let t = TestRunner::new(partial_agent("streamer", "frag")).await;
    let before = t.session().await.events().len();

    let events = t.runner.run(USER, t.session_id.clone(), None, RunConfig::default());
    let (events, err) = collect(events).await;

    assert!(err.is_none());
    assert_eq!(events.len(), 1);
    assert!(events[0].is_partial());
    assert_eq!(t.session().await.events().len(), before);
}

#[tokio::test]
async fn empty_message_is_not_committed() {
    let t = TestRunner::new(text_agent("echo", &["one"])).await;
    let empty = Content::new(Role::User, vec![]);
    let events = t.runner.run(USER, t.session_id.clone(), Some(empty), RunConfig::default());
    let (_, err) = collect(events).await;
    assert!(err.is_none());
    let session = t.session().await;
    let committed: Vec<&str> = session.events().iter().map(|e| e.author.as_str()).collect();
    assert_eq!(committed, vec!["echo"]);
}

#[tokio::test]
async fn missing_session_ends_turn_without_side_effects() {
    let t = TestRunner::new(text_agent("echo", &["one"])).await;
    let events = t.runner.run(USER, "nope", Some(Content::user_text("hi")), RunConfig::default());
    let (events, err) = collect(events).await;

    assert!(events.is_empty());
    let err = err.unwrap();
    assert!(matches!(err, TrellisError::SessionNotFound(_)));
    assert_eq!(err.category(), ErrorCategory::Resolution);
}

#[tokio::test]
async fn cfc_requires_eligible_model_before_any_mutation() {
    let t = TestRunner::new(llm("assistant", false, vec![])).await;
    let config = RunConfig::builder().support_cfc(true).build();
    let (events, err) = collect(t.runner.run(
        USER,
        t.session_id.clone(),
        Some(Content::user_text("hi")),
        config,
    ))
    .await;

    assert!(events.is_empty());
    let err = err.unwrap();
    assert_eq!(err.category(), ErrorCategory::Capability);
    assert!(err.to_string().contains("mock"));
    assert!(t.session().await.events().is_empty());
}

#[tokio::test]
async fn cfc_rejects_agents_without_a_model() {
    let t = TestRunner::new(text_agent("plain", &["x"])).await;
    let config = RunConfig::builder().support_cfc(true).build();
    let (_, err) = collect(t.runner.run(USER, t.session_id.clone(), None, config)).await;
    assert!(matches!(err, Some(TrellisError::UnsupportedOperation(_))));
}

#[tokio::test]
async fn cfc_accepts_matching_model_family() {
    let model = MockModel::new("gemini-2.0-flash");
    model.queue_text("ok");
    let agent: Arc<dyn Agent> = Arc::new(LlmAgent::builder().name("assistant").model(model).build());
    let t = TestRunner::new(agent).await;

    let config = RunConfig::builder().support_cfc(true).build();
    let (events, err) = collect(t.runner.run(
        USER,
        t.session_id.clone(),
        Some(Content::user_text("hi")),
        config,
    ))
    .await;
    assert!(err.is_none());
    assert_eq!(texts(&events), vec!["ok"]);
}

#[tokio::test]
async fn input_blobs_are_saved_as_artifacts() {
    let sessions = Arc::new(InMemorySessionService::new());
    let artifacts = Arc::new(InMemoryArtifactService::new());
    let runner = Runner::new(
        RunnerConfig::builder()
            .app_name(APP)
            .agent(text_agent("echo", &["got it"]))
            .session_service(sessions.clone())
            .artifact_service(artifacts.clone())
            .build(),
    )
    .unwrap();
    create_session(sessions.as_ref(), "s1").await;

    let message = Content::new(
        Role::User,
        vec![Part::text("see attached"), Part::blob("image/png", vec![1, 2, 3])],
    );
    let config = RunConfig::builder().save_input_blobs_as_artifacts(true).build();
    let (_, err) = collect(runner.run(USER, "s1", Some(message), config)).await;
    assert!(err.is_none());

    let session = stored_session(sessions.as_ref(), "s1").await;
    let user_event = session.events().at(0).unwrap();
    let file_name = format!("artifact_{}_1", user_event.invocation_id);
    let parts = &user_event.content().unwrap().parts;
    assert_eq!(parts[0], Part::text("see attached"));
    assert_eq!(
        parts[1],
        Part::text(format!("Uploaded file: {file_name}. It has been saved to the artifacts"))
    );

    let stored = artifacts
        .load(LoadRequest {
            key: ArtifactKey {
                app_name: APP.into(),
                user_id: USER.into(),
                session_id: "s1".into(),
                file_name,
            },
            version: None,
        })
        .await
        .unwrap();
    assert_eq!(stored.part, Part::blob("image/png", vec![1, 2, 3]));
}

#[tokio::test]
async fn agents_see_the_message_as_committed() {
    let sessions = Arc::new(InMemorySessionService::new());
    let inspector = Arc::new(FunctionAgent::new("inspector", |ctx| -> EventStream {
        let blobs = ctx
            .user_content()
            .map(|c| c.parts.iter().filter(|p| p.as_blob().is_some()).count())
            .unwrap_or_default();
        let text = ctx.user_content().map(Content::text).unwrap_or_default();
        Box::pin(futures::stream::once(async move {
            Ok::<_, TrellisError>(Event::from_content(Content::model_text(format!(
                "{blobs} blobs: {text}"
            ))))
        }))
    }));
    let runner = Runner::new(
        RunnerConfig::builder()
            .app_name(APP)
            .agent(inspector)
            .session_service(sessions.clone())
            .artifact_service(Arc::new(InMemoryArtifactService::new()))
            .build(),
    )
    .unwrap();
    create_session(sessions.as_ref(), "s1").await;

    let message = Content::new(Role::User, vec![Part::blob("image/png", vec![9])]);
    let config = RunConfig::builder().save_input_blobs_as_artifacts(true).build();
    let (events, err) = collect(runner.run(USER, "s1", Some(message), config)).await;
    assert!(err.is_none());

    let session = stored_session(sessions.as_ref(), "s1").await;
    let committed = session.events().at(0).unwrap().text();
    assert!(committed.starts_with("Uploaded file: artifact_"));
    assert_eq!(texts(&events), vec![format!("0 blobs: {committed}")]);
}

#[tokio::test]
async fn blobs_stay_inline_without_artifact_service() {
    let t = TestRunner::new(text_agent("echo", &["ok"])).await;
    let message = Content::new(Role::User, vec![Part::blob("text/plain", b"data".to_vec())]);
    let config = RunConfig::builder().save_input_blobs_as_artifacts(true).build();
    let (_, err) = collect(t.runner.run(USER, t.session_id.clone(), Some(message.clone()), config)).await;
    assert!(err.is_none());

    let session = t.session().await;
    assert_eq!(session.events().at(0).unwrap().content(), Some(&message));
}

#[tokio::test]
async fn agent_error_terminates_turn() {
    let agent: Arc<dyn Agent> = Arc::new(SequentialAgent::new(
        "pipeline",
        vec![
            text_agent("first", &["before"]),
            failing_agent("broken", "boom"),
            text_agent("last", &["after"]),
        ],
    ));
    let t = TestRunner::new(agent).await;

    let (events, err) = collect(t.run("go")).await;
    assert_eq!(texts(&events), vec!["before"]);
    let err = err.unwrap();
    assert_eq!(err.category(), ErrorCategory::Execution);
    assert!(err.to_string().contains("boom"));

    let committed = t.session().await;
    assert_eq!(committed.events().len(), 2);
}

#[tokio::test]
async fn duplicate_agent_names_fail_construction() {
    let agent: Arc<dyn Agent> = Arc::new(SequentialAgent::new(
        "pipeline",
        vec![text_agent("same", &[]), text_agent("same", &[])],
    ));
    let result = Runner::new(
        RunnerConfig::builder()
            .app_name(APP)
            .agent(agent)
            .session_service(Arc::new(InMemorySessionService::new()))
            .build(),
    );
    let err = result.unwrap_err();
    assert!(matches!(err, TrellisError::DuplicateAgentName(ref name) if name == "same"));
    assert_eq!(err.category(), ErrorCategory::Construction);
}

#[tokio::test]
async fn cancellation_token_stops_the_turn() {
    let ticks = Arc::new(AtomicUsize::new(0));
    let t = TestRunner::new(ticking_agent("clock", Duration::from_millis(5), ticks)).await;
    let token = CancellationToken::new();
    let mut events = t.runner.run_with_cancellation(
        USER,
        t.session_id.clone(),
        None,
        RunConfig::default(),
        token.clone(),
    );

    let first = events.next().await.unwrap().unwrap();
    assert_eq!(first.text(), "tick 0");
    token.cancel();

    let (_, err) = collect(events).await;
    assert!(err.unwrap().is_canceled());
}

#[tokio::test]
async fn streaming_turn_commits_only_the_consolidated_reply() {
    let model = MockModel::new("mock");
    model.queue_text("Hello there, friend");
    let agent: Arc<dyn Agent> = Arc::new(
        LlmAgent::builder()
            .name("assistant")
            .model(model.clone())
            .output_key("last_reply")
            .build(),
    );
    let t = TestRunner::new(agent).await;

    let config = RunConfig::default().with_streaming_mode(StreamingMode::Sse);
    let (events, err) = collect(t.runner.run(
        USER,
        t.session_id.clone(),
        Some(Content::user_text("hi")),
        config,
    ))
    .await;
    assert!(err.is_none());

    let partial: Vec<String> = events.iter().filter(|e| e.is_partial()).map(Event::text).collect();
    assert_eq!(partial, vec!["Hello", " ther", "e, fr", "iend"]);
    let last = events.last().unwrap();
    assert!(!last.is_partial());
    assert_eq!(last.text(), "Hello there, friend");

    let session = t.session().await;
    assert_eq!(texts(&session.events().iter().cloned().collect::<Vec<_>>()), vec!["hi", "Hello there, friend"]);
    assert_eq!(
        session.state().get("last_reply"),
        Some(&serde_json::json!("Hello there, friend"))
    );

    let request = &model.requests()[0];
    assert_eq!(request.contents, vec![Content::user_text("hi")]);
    assert!(request
        .system_instruction
        .as_deref()
        .unwrap()
        .contains("Your internal name is \"assistant\""));
}

/// Session service whose appends always fail.
struct ReadOnlySessions(InMemorySessionService);

#[async_trait]
impl SessionService for ReadOnlySessions {
    async fn create(&self, request: CreateRequest) -> Result<CreateResponse> {
        self.0.create(request).await
    }

    async fn get(&self, request: GetRequest) -> Result<GetResponse> {
        self.0.get(request).await
    }

    async fn list(&self, request: ListRequest) -> Result<ListResponse> {
        self.0.list(request).await
    }

    async fn delete(&self, request: DeleteRequest) -> Result<()> {
        self.0.delete(request).await
    }

    async fn append_event(&self, _session: &mut Session, _event: Event) -> Result<()> {
        Err(TrellisError::Io(std::io::Error::other("disk full")))
    }
}

#[tokio::test]
async fn append_failure_is_a_persistence_error() {
    let sessions = Arc::new(ReadOnlySessions(InMemorySessionService::new()));
    create_session(sessions.as_ref(), "s1").await;
    let runner = Runner::new(
        RunnerConfig::builder()
            .app_name(APP)
            .agent(text_agent("echo", &["one"]))
            .session_service(sessions.clone())
            .build(),
    )
    .unwrap();

    let (events, err) = collect(runner.run(USER, "s1", None, RunConfig::default())).await;
    assert!(events.is_empty());
    let err = err.unwrap();
    assert_eq!(err.category(), ErrorCategory::Persistence);
    let source = std::error::Error::source(&err).map(|s| s.to_string());
    assert_eq!(source.as_deref(), Some("IO error: disk full"));
}
