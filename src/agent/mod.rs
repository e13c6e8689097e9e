//! LLM agent modules for production analysis.
//!
//! This module provides the session store, the tool-calling agent loop, and
//! the tools the model can invoke against a loaded dataset.

pub mod agent_loop;
pub mod errors;
pub mod llm;
pub mod prompts;
pub mod session;
pub mod tools;

pub use agent_loop::{AgentConfig, AnalystAgent, StopReason, TurnOutcome, DEFAULT_MAX_ROUNDS};
pub use errors::{AgentError, LlmError};
pub use llm::{ChatClient, ClientConfig, OllamaClient};
pub use session::SessionStore;
