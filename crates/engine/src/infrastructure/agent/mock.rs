//! Deterministic in-process agent, the concrete realization of `MOCK_SDK=true`.
//!
//! Driven by a small scripted-response queue so end-to-end scenario tests
//! (spec.md §8) can assert exact message sequences without a real upstream.

use std::collections::VecDeque;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::Mutex;

use super::{
    AgentError, AgentEvent, AgentPort, AgentRequest, AgentStream, PostToolHook, ToolEffects,
    ToolInvocation,
};

/// One scripted turn: either a normal streamed reply, or a failure to
/// surface instead (used to script session-recovery and error scenarios).
#[derive(Debug, Clone)]
pub enum ScriptedTurn {
    /// Stream this text back chunked at word boundaries, optionally
    /// emitting a single tool call after the text completes.
    Reply {
        agent_session_id: String,
        text: String,
        tool_call: Option<(String, serde_json::Value)>,
    },
    /// Fail the call outright with this error.
    Fail(fn(String) -> AgentError),
}

/// A scripted, deterministic stand-in for the real upstream LLM. Consumes
/// queued [`ScriptedTurn`]s in order; once exhausted, falls back to an
/// empty acknowledgement reply so tests that under-script don't panic.
pub struct MockAgentClient {
    script: Mutex<VecDeque<ScriptedTurn>>,
    one_shot_replies: Mutex<VecDeque<String>>,
}

impl MockAgentClient {
    pub fn new() -> Self {
        Self {
            script: Mutex::new(VecDeque::new()),
            one_shot_replies: Mutex::new(VecDeque::new()),
        }
    }

    /// Queue a turn to be returned by the next `call()`.
    pub async fn push_turn(&self, turn: ScriptedTurn) {
        self.script.lock().await.push_back(turn);
    }

    /// Queue a response for the next `generate_once()` (used by the
    /// history compactor and forced-save turns).
    pub async fn push_one_shot(&self, text: impl Into<String>) {
        self.one_shot_replies.lock().await.push_back(text.into());
    }
}

impl Default for MockAgentClient {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl AgentPort for MockAgentClient {
    async fn call(
        &self,
        _request: AgentRequest,
        effects: Arc<dyn ToolEffects>,
        hook: Arc<dyn PostToolHook>,
    ) -> AgentStream {
        let turn = self
            .script
            .lock()
            .await
            .pop_front()
            .unwrap_or(ScriptedTurn::Reply {
                agent_session_id: "mock-session".to_string(),
                text: "The story continues.".to_string(),
                tool_call: None,
            });

        let stream = async_stream::stream! {
            match turn {
                ScriptedTurn::Fail(make_err) => {
                    yield Err(make_err("scripted failure".to_string()));
                }
                ScriptedTurn::Reply { agent_session_id, text, tool_call } => {
                    yield Ok(AgentEvent::Init { agent_session_id });
                    yield Ok(AgentEvent::ContentBlockStart);
                    for word in text.split_inclusive(' ') {
                        yield Ok(AgentEvent::TextDelta(word.to_string()));
                    }
                    yield Ok(AgentEvent::ContentBlockEnd);

                    let mut tool_uses = Vec::new();
                    if let Some((name, input)) = tool_call {
                        hook.on_tool_complete(super::PostToolHookEvent {
                            tool_name: name.clone(),
                            tool_input: input.clone(),
                        }).await;
                        let dispatcher = super::ToolDispatcher::new();
                        let _ = dispatcher.dispatch(&name, input, effects.as_ref()).await;
                        tool_uses.push(ToolInvocation { name });
                    }

                    yield Ok(AgentEvent::Complete { text, tool_uses, error: None });
                }
            }
        };

        Box::pin(stream)
    }

    async fn generate_once(&self, _prompt: &str, _system_prompt: &str) -> Result<String, AgentError> {
        let reply = self.one_shot_replies.lock().await.pop_front();
        Ok(reply.unwrap_or_else(|| "Summary of earlier events.".to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::agent::tool_dispatcher::{PanelArgs, SetCharacterArgs, SetThemeArgs, SetWorldArgs, SetXpStyleArgs};
    use futures_util::StreamExt;

    struct NoopEffects;
    #[async_trait]
    impl ToolEffects for NoopEffects {
        async fn set_theme(&self, _args: SetThemeArgs) -> Result<String, String> {
            Ok("ok".into())
        }
        async fn set_xp_style(&self, _args: SetXpStyleArgs) -> Result<String, String> {
            Ok("ok".into())
        }
        async fn set_character(&self, _args: SetCharacterArgs) -> Result<String, String> {
            Ok("ok".into())
        }
        async fn set_world(&self, _args: SetWorldArgs) -> Result<String, String> {
            Ok("ok".into())
        }
        async fn list_characters(&self) -> Result<String, String> {
            Ok("[]".into())
        }
        async fn list_worlds(&self) -> Result<String, String> {
            Ok("[]".into())
        }
        async fn create_panel(&self, _args: PanelArgs) -> Result<String, String> {
            Ok("ok".into())
        }
        async fn update_panel(&self, _args: PanelArgs) -> Result<String, String> {
            Ok("ok".into())
        }
        async fn dismiss_panel(&self, _id: String) -> Result<String, String> {
            Ok("ok".into())
        }
        async fn list_panels(&self) -> Result<String, String> {
            Ok("[]".into())
        }
    }

    struct NoopHook;
    #[async_trait]
    impl PostToolHook for NoopHook {
        async fn on_tool_complete(&self, _event: super::super::PostToolHookEvent) {}
    }

    #[tokio::test]
    async fn default_reply_streams_init_then_complete() {
        let mock = MockAgentClient::new();
        let request = AgentRequest {
            prompt: "hi".into(),
            system_prompt: "sys".into(),
            resume_session_id: None,
            tool_definitions: Vec::new(),
            cwd: "/tmp".into(),
            max_turns: 1,
        };
        let mut stream = mock
            .call(request, Arc::new(NoopEffects), Arc::new(NoopHook))
            .await;

        let mut saw_init = false;
        let mut saw_complete = false;
        while let Some(event) = stream.next().await {
            match event.unwrap() {
                AgentEvent::Init { .. } => saw_init = true,
                AgentEvent::Complete { .. } => saw_complete = true,
                _ => {}
            }
        }
        assert!(saw_init);
        assert!(saw_complete);
    }

    #[tokio::test]
    async fn scripted_failure_surfaces_as_error() {
        let mock = MockAgentClient::new();
        mock.push_turn(ScriptedTurn::Fail(AgentError::InvalidRequest)).await;
        let request = AgentRequest {
            prompt: "hi".into(),
            system_prompt: "sys".into(),
            resume_session_id: Some("stale".into()),
            tool_definitions: Vec::new(),
            cwd: "/tmp".into(),
            max_turns: 1,
        };
        let mut stream = mock
            .call(request, Arc::new(NoopEffects), Arc::new(NoopHook))
            .await;
        let first = stream.next().await.unwrap();
        assert!(first.is_err());
        assert!(first.unwrap_err().is_session_invalid());
    }
}
