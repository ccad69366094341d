//! Tools an LLM agent can call, including agents wrapped as tools.

pub mod agent_tool;
pub mod load_artifacts;
pub mod tool;
pub mod validation;

pub use agent_tool::AgentTool;
pub use load_artifacts::LoadArtifactsTool;
pub use tool::{FunctionTool, Tool, ToolContext, ToolDeclaration};
pub use validation::{validate_against_schema, validate_arguments};
