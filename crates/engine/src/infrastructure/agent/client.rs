//! Real agent client: streams a resumable conversation from the upstream
//! LLM-as-GM service over HTTP, dispatching in-band tool calls as they
//! arrive and presenting the dispatcher to the upstream service as its
//! MCP-style tool server.
//!
//! The upstream wire protocol itself is the excluded "agent runtime"
//! collaborator (spec §1) — only the message-sequence contract in spec §6.2
//! is ours to honor. This client assumes an NDJSON streaming endpoint that
//! emits one JSON object per line, each tagged by `type`.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures_util::StreamExt;
use reqwest::Client;
use serde::{Deserialize, Serialize};

use super::{
    AgentError, AgentEvent, AgentPort, AgentRequest, AgentStream, PostToolHook, PostToolHookEvent,
    ToolDefinition, ToolEffects, ToolInvocation, DEFAULT_PERMISSION_MODE,
    DEFAULT_POST_TOOL_HOOK_TIMEOUT_MS,
};

const CUSTOM_TOOL_NAMES: &[&str] = &[
    "set_theme",
    "set_xp_style",
    "set_character",
    "set_world",
    "list_characters",
    "list_worlds",
    "create_panel",
    "update_panel",
    "dismiss_panel",
    "list_panels",
];

#[derive(Clone)]
pub struct HttpAgentClient {
    client: Client,
    base_url: String,
    model: String,
    api_key: Option<String>,
}

impl HttpAgentClient {
    pub fn new(base_url: &str, model: &str, api_key: Option<String>) -> Self {
        let client = Client::builder()
            .timeout(Duration::from_secs(300))
            .build()
            .unwrap_or_else(|_| Client::new());
        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            model: model.to_string(),
            api_key,
        }
    }
}

#[derive(Serialize)]
struct WireRequest<'a> {
    model: &'a str,
    prompt: &'a str,
    system_prompt: &'a str,
    resume_session_id: Option<&'a str>,
    tools: &'a [ToolDefinition],
    cwd: String,
    max_turns: u32,
    permission_mode: &'static str,
    stream: bool,
}

#[derive(Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum WireEvent {
    Init {
        session_id: String,
    },
    BlockStart,
    Delta {
        text: String,
    },
    BlockEnd,
    ToolCall {
        name: String,
        input: serde_json::Value,
    },
    Complete {
        text: String,
        #[serde(default)]
        error: Option<String>,
    },
    Error {
        kind: String,
        message: String,
    },
}

#[async_trait]
impl AgentPort for HttpAgentClient {
    async fn call(
        &self,
        request: AgentRequest,
        effects: Arc<dyn ToolEffects>,
        hook: Arc<dyn PostToolHook>,
    ) -> AgentStream {
        let wire_request = WireRequest {
            model: &self.model,
            prompt: &request.prompt,
            system_prompt: &request.system_prompt,
            resume_session_id: request.resume_session_id.as_deref(),
            tools: &request.tool_definitions,
            cwd: request.cwd.display().to_string(),
            max_turns: request.max_turns,
            permission_mode: DEFAULT_PERMISSION_MODE,
            stream: true,
        };

        let mut builder = self
            .client
            .post(format!("{}/v1/agent/stream", self.base_url))
            .json(&wire_request);
        if let Some(key) = &self.api_key {
            builder = builder.bearer_auth(key);
        }

        let response = match builder.send().await {
            Ok(r) => r,
            Err(e) => {
                return Box::pin(futures_util::stream::once(async move {
                    Err(AgentError::Transport(e.to_string()))
                }));
            }
        };

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            let err = classify_http_error(status.as_u16(), &body);
            return Box::pin(futures_util::stream::once(async move { Err(err) }));
        }

        let mut byte_stream = response.bytes_stream();
        let tool_uses = Arc::new(tokio::sync::Mutex::new(Vec::<ToolInvocation>::new()));

        let stream = async_stream::stream! {
            let mut buf = Vec::new();
            while let Some(chunk) = byte_stream.next().await {
                let chunk = match chunk {
                    Ok(c) => c,
                    Err(e) => {
                        yield Err(AgentError::Transport(e.to_string()));
                        return;
                    }
                };
                buf.extend_from_slice(&chunk);

                while let Some(pos) = buf.iter().position(|b| *b == b'\n') {
                    let line: Vec<u8> = buf.drain(..=pos).collect();
                    let line = &line[..line.len() - 1];
                    if line.iter().all(|b| b.is_ascii_whitespace()) {
                        continue;
                    }
                    match serde_json::from_slice::<WireEvent>(line) {
                        Ok(WireEvent::Init { session_id }) => {
                            yield Ok(AgentEvent::Init { agent_session_id: session_id });
                        }
                        Ok(WireEvent::BlockStart) => yield Ok(AgentEvent::ContentBlockStart),
                        Ok(WireEvent::Delta { text }) => yield Ok(AgentEvent::TextDelta(text)),
                        Ok(WireEvent::BlockEnd) => yield Ok(AgentEvent::ContentBlockEnd),
                        Ok(WireEvent::ToolCall { name, input }) => {
                            let hook_call = hook.on_tool_complete(PostToolHookEvent {
                                tool_name: name.clone(),
                                tool_input: input.clone(),
                            });
                            if tokio::time::timeout(
                                Duration::from_millis(DEFAULT_POST_TOOL_HOOK_TIMEOUT_MS),
                                hook_call,
                            )
                            .await
                            .is_err()
                            {
                                tracing::warn!(tool = %name, "post-tool hook timed out, proceeding");
                            }
                            if CUSTOM_TOOL_NAMES.contains(&name.as_str()) {
                                let dispatcher = super::ToolDispatcher::new();
                                let _ = dispatcher.dispatch(&name, input, effects.as_ref()).await;
                            }
                            tool_uses.lock().await.push(ToolInvocation { name });
                        }
                        Ok(WireEvent::Complete { text, error }) => {
                            let uses = std::mem::take(&mut *tool_uses.lock().await);
                            yield Ok(AgentEvent::Complete { text, tool_uses: uses, error });
                        }
                        Ok(WireEvent::Error { kind, message }) => {
                            yield Err(classify_wire_error(&kind, &message));
                        }
                        Err(e) => {
                            yield Err(AgentError::Transport(format!("malformed agent event: {e}")));
                        }
                    }
                }
            }
        };

        Box::pin(stream)
    }

    async fn generate_once(&self, prompt: &str, system_prompt: &str) -> Result<String, AgentError> {
        #[derive(Serialize)]
        struct OneShotRequest<'a> {
            model: &'a str,
            prompt: &'a str,
            system_prompt: &'a str,
        }
        #[derive(Deserialize)]
        struct OneShotResponse {
            text: String,
        }

        let response = self
            .client
            .post(format!("{}/v1/agent/generate", self.base_url))
            .json(&OneShotRequest {
                model: &self.model,
                prompt,
                system_prompt,
            })
            .send()
            .await
            .map_err(|e| AgentError::Transport(e.to_string()))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(classify_http_error(status.as_u16(), &body));
        }

        let parsed: OneShotResponse = response
            .json()
            .await
            .map_err(|e| AgentError::Transport(e.to_string()))?;
        Ok(parsed.text)
    }
}

fn classify_http_error(status: u16, body: &str) -> AgentError {
    match status {
        429 => AgentError::RateLimit(body.to_string()),
        401 | 402 | 403 => AgentError::Auth(body.to_string()),
        400 => AgentError::InvalidRequest(body.to_string()),
        _ => AgentError::Server(format!("http {status}: {body}")),
    }
}

fn classify_wire_error(kind: &str, message: &str) -> AgentError {
    match kind {
        "rate_limit" => AgentError::RateLimit(message.to_string()),
        "auth" | "billing" => AgentError::Auth(message.to_string()),
        "invalid_request" => AgentError::InvalidRequest(message.to_string()),
        _ => AgentError::Server(message.to_string()),
    }
}
