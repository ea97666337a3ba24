//! Agent Client (C4): a streaming call over a resumable session with the
//! external LLM, plus the port abstraction that lets tests swap in a
//! deterministic mock.

pub mod client;
pub mod mock;
pub mod prompt;
pub mod tool_dispatcher;

use std::path::PathBuf;
use std::pin::Pin;
use std::sync::Arc;

use async_trait::async_trait;
use futures_util::Stream;
use serde::Serialize;

pub use tool_dispatcher::{ToolDispatcher, ToolEffects};

/// Substrings that classify an upstream error as "session invalid": the
/// conversation handle the agent gave us is no longer resumable and a
/// recovery pass (engine::session::game_session) should run.
pub const SESSION_INVALID_MARKERS: &[&str] = &[
    "session not found",
    "invalid session",
    "session expired",
    "conversation not found",
    "resume failed",
    "no conversation",
    "process exited with code",
];

#[derive(Debug, thiserror::Error)]
pub enum AgentError {
    #[error("rate limited: {0}")]
    RateLimit(String),
    #[error("auth/billing error: {0}")]
    Auth(String),
    #[error("upstream server error: {0}")]
    Server(String),
    #[error("invalid request: {0}")]
    InvalidRequest(String),
    #[error("transport error: {0}")]
    Transport(String),
}

impl AgentError {
    /// Classify per the session-recovery detection rule: code
    /// `invalid_request`, or a message containing one of
    /// [`SESSION_INVALID_MARKERS`].
    pub fn is_session_invalid(&self) -> bool {
        if matches!(self, AgentError::InvalidRequest(_)) {
            return true;
        }
        let msg = self.to_string().to_lowercase();
        SESSION_INVALID_MARKERS.iter().any(|m| msg.contains(m))
    }

    pub fn is_retryable(&self) -> bool {
        matches!(self, AgentError::RateLimit(_))
    }
}

/// A single tool invocation reported inside a completed assistant message.
/// By the time the session sees this, the tool has already run (the agent
/// client dispatches tools inline as it streams).
#[derive(Debug, Clone)]
pub struct ToolInvocation {
    pub name: String,
}

/// One message in the lazy, finite, non-restartable sequence a call to the
/// agent produces.
#[derive(Debug, Clone)]
pub enum AgentEvent {
    /// Emitted exactly once near the start; the session persists this for
    /// resumption.
    Init { agent_session_id: String },
    ContentBlockStart,
    TextDelta(String),
    ContentBlockEnd,
    /// The full message: accumulated text, any tools invoked during the
    /// turn, and an optional inline error the upstream attached instead of
    /// failing the whole call.
    Complete {
        text: String,
        tool_uses: Vec<ToolInvocation>,
        error: Option<String>,
    },
}

/// What's delivered to [`PostToolHook::on_tool_complete`] after each tool
/// call, whether it went through our dispatcher or was one of the agent's
/// own built-in tools (e.g. a file write).
#[derive(Debug, Clone)]
pub struct PostToolHookEvent {
    pub tool_name: String,
    pub tool_input: serde_json::Value,
}

/// Synchronous (from the agent's perspective) callback fired after every
/// tool completes. Implementations must return within the bounded timeout
/// the caller enforces (default 5s) — if it times out, the agent call
/// proceeds without waiting further.
#[async_trait]
pub trait PostToolHook: Send + Sync {
    async fn on_tool_complete(&self, event: PostToolHookEvent);
}

/// A declared tool surfaced to the agent as discoverable and callable.
#[derive(Debug, Clone, Serialize)]
pub struct ToolDefinition {
    pub name: String,
    pub description: String,
    pub input_schema: serde_json::Value,
}

/// Inputs to one streaming agent call.
pub struct AgentRequest {
    pub prompt: String,
    pub system_prompt: String,
    pub resume_session_id: Option<String>,
    pub tool_definitions: Vec<ToolDefinition>,
    pub cwd: PathBuf,
    pub max_turns: u32,
}

pub const DEFAULT_PERMISSION_MODE: &str = "auto-accept-edits";
pub const DEFAULT_POST_TOOL_HOOK_TIMEOUT_MS: u64 = 5_000;

pub type AgentStream = Pin<Box<dyn Stream<Item = Result<AgentEvent, AgentError>> + Send>>;

/// Port for the external LLM-as-GM service. The real implementation
/// ([`client::HttpAgentClient`]) and the deterministic
/// [`mock::MockAgentClient`] both implement this.
#[async_trait]
pub trait AgentPort: Send + Sync {
    async fn call(
        &self,
        request: AgentRequest,
        effects: Arc<dyn ToolEffects>,
        hook: Arc<dyn PostToolHook>,
    ) -> AgentStream;

    /// A non-streaming one-shot call used by the history compactor: no
    /// tools, no resumption, just prompt in, text out.
    async fn generate_once(&self, prompt: &str, system_prompt: &str) -> Result<String, AgentError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn invalid_request_is_always_session_invalid() {
        let err = AgentError::InvalidRequest("bad shape".into());
        assert!(err.is_session_invalid());
    }

    #[test]
    fn message_substring_classifies_session_invalid() {
        let err = AgentError::Server("resume failed: no such conversation".into());
        assert!(err.is_session_invalid());
    }

    #[test]
    fn unrelated_server_error_is_not_session_invalid() {
        let err = AgentError::Server("internal error 500".into());
        assert!(!err.is_session_invalid());
    }

    #[test]
    fn only_rate_limit_is_retryable() {
        assert!(AgentError::RateLimit("slow down".into()).is_retryable());
        assert!(!AgentError::Auth("bad key".into()).is_retryable());
    }
}
