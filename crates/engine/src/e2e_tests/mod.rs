//! Deterministic scenario tests (spec.md §8): each drives a real
//! `GameSession` against a scripted `MockAgentClient` and asserts on the
//! exact outbound message sequence and/or the state persisted to disk,
//! rather than on internal call counts.

mod capacity_tests;
mod panel_tests;
mod theme_tests;

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;

use taleforge_domain::SessionToken;
use taleforge_shared::ServerMessage;

use crate::infrastructure::agent::mock::MockAgentClient;
use crate::infrastructure::agent::AgentPort;
use crate::infrastructure::image::{ImageService, MockImageService};
use crate::infrastructure::session::{GameSession, GameSessionHandle};
use crate::infrastructure::state_store::{AdventureHandle, StateStore};

/// A running session plus everything a scenario needs to drive it and
/// inspect what it persisted.
pub(crate) struct Harness {
    pub handle: GameSessionHandle,
    pub outbound: mpsc::UnboundedReceiver<ServerMessage>,
    pub store: StateStore,
    pub adventure_id: String,
    pub token: SessionToken,
}

/// Boots a fresh adventure under `project_dir/adventures` and wires a
/// `GameSession` around it. `seed` runs against the handle before the
/// session takes ownership of it, so a scenario can pre-populate history or
/// bindings the way a long-running adventure would have accumulated them.
pub(crate) fn spawn(
    project_dir: &Path,
    agent: &Arc<MockAgentClient>,
    image: Arc<dyn ImageService>,
    seed: impl FnOnce(&mut AdventureHandle),
) -> Harness {
    let adventures_dir = project_dir.join("adventures");
    std::fs::create_dir_all(&adventures_dir).expect("create adventures dir");
    let store = StateStore::new(adventures_dir);
    let mut handle = store.create().expect("create adventure");
    seed(&mut handle);

    let adventure_id = handle.adventure().id.to_string();
    let token = handle.adventure().session_token;

    let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();
    let agent_port: Arc<dyn AgentPort> = agent.clone();
    let init = GameSession::initialize(handle, agent_port, image, project_dir.to_path_buf(), outbound_tx);

    Harness {
        handle: init.handle,
        outbound: outbound_rx,
        store,
        adventure_id,
        token,
    }
}

pub(crate) fn default_image() -> Arc<dyn ImageService> {
    Arc::new(MockImageService::new())
}

/// Drains the outbound channel, collecting every message up to and
/// including the first one `stop` accepts. Bounded per-recv so a scenario
/// that never sends the expected message fails the test instead of hanging
/// the suite.
pub(crate) async fn collect_until(
    rx: &mut mpsc::UnboundedReceiver<ServerMessage>,
    mut stop: impl FnMut(&ServerMessage) -> bool,
) -> Vec<ServerMessage> {
    let mut messages = Vec::new();
    loop {
        let next = tokio::time::timeout(Duration::from_secs(2), rx.recv())
            .await
            .expect("timed out waiting for an outbound message")
            .expect("outbound channel closed unexpectedly");
        let done = stop(&next);
        messages.push(next);
        if done {
            return messages;
        }
    }
}

/// A short, stable label for a message, for asserting on orderings without
/// matching out every field.
pub(crate) fn kind(message: &ServerMessage) -> &'static str {
    match message {
        ServerMessage::Pong => "pong",
        ServerMessage::AdventureLoaded { .. } => "adventure_loaded",
        ServerMessage::ThemeChange { .. } => "theme_change",
        ServerMessage::GmResponseStart { .. } => "gm_response_start",
        ServerMessage::GmResponseChunk { .. } => "gm_response_chunk",
        ServerMessage::GmResponseEnd { .. } => "gm_response_end",
        ServerMessage::ToolStatus { .. } => "tool_status",
        ServerMessage::PanelCreate { .. } => "panel_create",
        ServerMessage::PanelUpdate { .. } => "panel_update",
        ServerMessage::PanelDismiss { .. } => "panel_dismiss",
        ServerMessage::RecapStarted => "recap_started",
        ServerMessage::RecapComplete { .. } => "recap_complete",
        ServerMessage::RecapError { .. } => "recap_error",
        ServerMessage::Error { .. } => "error",
        ServerMessage::Unknown => "unknown",
    }
}

pub(crate) fn is_idle_tool_status(message: &ServerMessage) -> bool {
    matches!(
        message,
        ServerMessage::ToolStatus { state: taleforge_shared::ToolStatusState::Idle, .. }
    )
}
