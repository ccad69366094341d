//! Convenience re-exports for common use.

pub use crate::agent::{
    execute, Agent, AgentTree, EventStream, FunctionAgent, InvocationContext, LlmAgent,
    LlmCapable, TransferPolicy,
};
pub use crate::artifact::{ArtifactService, Artifacts, InMemoryArtifactService};
pub use crate::config::{RunConfig, RuntimeConfig, StreamingMode};
pub use crate::error::{Result, TrellisError};
pub use crate::memory::{InMemoryMemoryService, Memory, MemoryService};
pub use crate::model::{LlmRequest, Model, ResponseStream, StreamingResponseAggregator};
pub use crate::runner::{Runner, RunnerConfig};
pub use crate::session::{
    CreateRequest, Event, EventActions, GetRequest, InMemorySessionService, Session,
    SessionService, State,
};
pub use crate::tools::{
    AgentTool, FunctionTool, LoadArtifactsTool, Tool, ToolContext, ToolDeclaration,
};
pub use crate::types::{Content, FinishReason, LlmResponse, Part, Role, Usage};
pub use crate::workflow::{LoopAgent, ParallelAgent, SequentialAgent};
