//! AI layer: an OpenAI-compatible LLM client, the guarded tool set, the
//! conversation agent and the bulk summarisation job.

pub mod agent;
pub mod llm;
pub mod process;
pub mod runtime_config;
pub mod tools;

pub use agent::{Agent, MAX_ROUNDS, Thread, TurnOutcome};
pub use llm::{
    AgentMessage, AgentRole, ChatResponse, LlmClient, LlmError, OpenAiCompatClient, Provider,
    ToolCall, ToolSchema,
};
pub use process::{ProcessReport, process_pending};
pub use runtime_config::{LlmRuntimeConfig, LlmSecrets, RuntimeConfigCache, RuntimeLlm};
pub use tools::{SafeTool, Tool, ToolError, ToolPolicy, ToolSet, sanitize_summary};
