//! Trellis: agent orchestration runtime.
//!
//! Drives a tree of cooperating agents through turns of conversation. A
//! [`Runner`](runner::Runner) resolves which agent handles a new message,
//! drives it against a persisted session, commits durable events and relays
//! everything (including streaming fragments) to the caller. Sequential,
//! loop and parallel composition agents combine child agents into larger
//! behaviours.
//!
//! # Quick Start
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use futures::StreamExt;
//! use trellis::prelude::*;
//!
//! # async fn example(model: Arc<dyn Model>) -> trellis::error::Result<()> {
//! let agent = LlmAgent::builder().name("helper").model(model).build();
//! let sessions = Arc::new(InMemorySessionService::new());
//! let runner = Runner::new(
//!     RunnerConfig::builder()
//!         .app_name("demo")
//!         .agent(Arc::new(agent))
//!         .session_service(sessions.clone())
//!         .build(),
//! )?;
//!
//! let session = sessions
//!     .create(CreateRequest {
//!         app_name: "demo".into(),
//!         user_id: "u1".into(),
//!         ..Default::default()
//!     })
//!     .await?
//!     .session;
//!
//! let mut events = runner.run("u1", session.id(), Some(Content::user_text("Hello!")), RunConfig::default());
//! while let Some(event) = events.next().await {
//!     println!("{}", event?.text());
//! }
//! # Ok(())
//! # }
//! ```

pub mod agent;
pub mod artifact;
pub mod config;
pub mod error;
pub mod memory;
pub mod model;
pub mod prelude;
pub mod runner;
pub mod session;
pub mod tools;
pub mod types;
pub mod workflow;

#[cfg(feature = "console")]
pub mod console;
