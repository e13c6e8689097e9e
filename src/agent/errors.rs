//! Error types for the agent layer.

use thiserror::Error;

/// Failures talking to the LLM endpoint.
#[derive(Debug, Error)]
pub enum LlmError {
    #[error("Cannot connect to Ollama at {url}. Is Ollama running?")]
    Connection { url: String },

    #[error("Request timed out after {seconds}s")]
    Timeout { seconds: u64 },

    #[error("Ollama API error {status}: {body}")]
    Http { status: u16, body: String },

    #[error("Failed to parse Ollama response: {0}")]
    Decode(String),

    #[error("Failed to send request: {0}")]
    Request(String),
}

/// Errors surfaced by an agent invocation.
#[derive(Debug, Error)]
pub enum AgentError {
    #[error("LLM API error: {0}")]
    Llm(#[from] LlmError),

    #[error("No data loaded for session {session_id}")]
    NoDataset { session_id: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_llm_error_is_wrapped_verbatim() {
        let err = AgentError::from(LlmError::Http {
            status: 500,
            body: "model not found".to_string(),
        });
        assert_eq!(err.to_string(), "LLM API error: Ollama API error 500: model not found");
    }

    #[test]
    fn test_no_dataset_message() {
        let err = AgentError::NoDataset {
            session_id: "abc".to_string(),
        };
        assert_eq!(err.to_string(), "No data loaded for session abc");
    }
}
