//! Game Session (C7): the single-writer actor that owns one adventure's
//! live state, drives the agent turn by turn, and talks to its connection
//! over an outbound message channel. One task per session; everything it
//! touches is reached only from that task, which is the "single
//! serialization domain" the design calls for.

pub mod effects;

use std::collections::VecDeque;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures_util::StreamExt;
use tokio::sync::{mpsc, Mutex};
use uuid::Uuid;

use taleforge_domain::{EntryType, NarrativeEntry};
use taleforge_shared::{ServerMessage, ToolStatusState};

use crate::infrastructure::agent::{
    AgentError, AgentPort, AgentRequest, PostToolHook, ToolDispatcher, ToolEffects,
};
use crate::infrastructure::compactor::{self, CompactionConfig};
use crate::infrastructure::entity_manager::EntityManager;
use crate::infrastructure::error::InfraError;
use crate::infrastructure::image::ImageService;
use crate::infrastructure::panels::{self, PanelEvent, PanelRegistry};
use crate::infrastructure::sanitizer;
use crate::infrastructure::state_store::AdventureHandle;
use crate::infrastructure::agent::prompt;

use effects::{vague_tool_description, SessionEffects, SessionPostToolHook, SessionShared};

/// How long one queued input may run before the processor synthesizes a
/// `PROCESSING_TIMEOUT` error and moves on (spec.md §4.7.1).
const DEFAULT_INPUT_TIMEOUT: Duration = Duration::from_secs(120);

/// Cut-point policy for the periodic "pending compaction" pass run at
/// queue-drain, distinct from the zero-retention pass a recap forces.
const ROLLING_RETAINED_COUNT: usize = 20;
const ROLLING_RETAINED_CHARS: usize = 12_000;

/// Compaction is scheduled, not run inline, so one slow summarization call
/// never blocks the turn that triggered it. A turn that leaves history
/// comfortably past the rolling-retention target sets the pending bit; the
/// next queue drain (spec.md §4.10) does the actual work.
const COMPACTION_TRIGGER_COUNT: usize = ROLLING_RETAINED_COUNT * 3;
const COMPACTION_TRIGGER_CHARS: usize = ROLLING_RETAINED_CHARS * 3;

/// Queue soft-cap (spec.md §9 open question): reject further input once
/// this many are already waiting, rather than letting the queue grow
/// unbounded while a player mashes enter.
const QUEUE_SOFT_CAP: usize = 32;

struct QueuedInput {
    text: String,
}

/// Pull the slug back out of a `<prefix>/<slug>` reference string, as
/// persisted in `playerRef`/`worldRef`.
fn slug_from_ref<'a>(reference: &'a str, prefix: &str) -> Option<&'a str> {
    reference.strip_prefix(prefix)?.strip_prefix('/')
}

enum SessionCommand {
    Input { text: String, is_system: bool },
    Recap,
    Abort,
}

/// A cheap, cloneable handle to a running session's command channel and
/// its cancellation generation counter.
#[derive(Clone)]
pub struct GameSessionHandle {
    tx: mpsc::UnboundedSender<SessionCommand>,
    cancel_generation: Arc<AtomicU64>,
}

impl GameSessionHandle {
    /// Sanitize (unless `is_system`) and enqueue a player input. Blocked
    /// input never reaches the queue; the caller gets an inline error
    /// message on its outbound channel instead.
    pub fn handle_input(&self, text: String, is_system: bool) {
        let _ = self.tx.send(SessionCommand::Input { text, is_system });
    }

    pub fn handle_recap(&self) {
        let _ = self.tx.send(SessionCommand::Recap);
    }

    /// Cancel whatever turn is in flight and drop all queued input. Bumping
    /// the generation is synchronous and lock-free, so the in-flight stream
    /// notices at its next message boundary without waiting on the run
    /// loop; the queued-input drop is sent as a command since the queue
    /// itself only the run loop may touch.
    pub fn abort(&self) {
        self.cancel_generation.fetch_add(1, Ordering::SeqCst);
        let _ = self.tx.send(SessionCommand::Abort);
    }
}

struct TurnOutcome {
    text: String,
    was_aborted: bool,
    agent_session_id: Option<String>,
}

pub struct GameSession {
    shared: Arc<Mutex<SessionShared>>,
    agent: Arc<dyn AgentPort>,
    effects: Arc<dyn ToolEffects>,
    hook: Arc<dyn PostToolHook>,
    outbound: mpsc::UnboundedSender<ServerMessage>,
    project_dir: PathBuf,
    queue: VecDeque<QueuedInput>,
    recovery_attempt: u32,
    cancel_generation: Arc<AtomicU64>,
    input_timeout: Duration,
}

/// Everything the caller (the connection hub) needs to send the two
/// opening messages and start routing client input.
pub struct SessionInit {
    pub handle: GameSessionHandle,
    pub adventure_id: String,
    pub history: Vec<NarrativeEntry>,
    pub theme: taleforge_domain::Theme,
}

impl GameSession {
    /// Accept flow step: build a session around an already-loaded adventure,
    /// rebuild the panel registry from whatever panel files already exist on
    /// disk, and spawn the run loop. Returns immediately; panel-create
    /// events for pre-existing panels are sent on `outbound` as part of this
    /// call, before the returned handle is used for anything else.
    pub fn initialize(
        state: AdventureHandle,
        agent: Arc<dyn AgentPort>,
        image: Arc<dyn ImageService>,
        project_dir: PathBuf,
        outbound: mpsc::UnboundedSender<ServerMessage>,
    ) -> SessionInit {
        let adventure_id = state.adventure().id.to_string();
        let history = state.history().entries.clone();
        let theme = state.adventure().current_theme.clone();

        let player_manager = Arc::new(EntityManager::new(
            &project_dir,
            crate::infrastructure::entity_manager::EntityKind::Player,
        ));
        let world_manager = Arc::new(EntityManager::new(
            &project_dir,
            crate::infrastructure::entity_manager::EntityKind::World,
        ));

        // spec.md §4.7 `initialize`: auto-create missing directories for any
        // playerRef/worldRef already bound in state, restoring the template
        // tree at its saved slug rather than probing for a fresh one.
        if let Some(slug) = state
            .adventure()
            .player_ref
            .as_deref()
            .and_then(|r| slug_from_ref(r, "players"))
        {
            if !player_manager.exists(slug) {
                let _ = player_manager.create_at_slug(slug);
            }
        }
        if let Some(slug) = state
            .adventure()
            .world_ref
            .as_deref()
            .and_then(|r| slug_from_ref(r, "worlds"))
        {
            if !world_manager.exists(slug) {
                let _ = world_manager.create_at_slug(slug);
            }
        }

        let mut panels = PanelRegistry::new();
        if let Some(player_ref) = state.adventure().player_ref.clone() {
            let panels_dir = project_dir.join(&player_ref).join("panels");
            if let Ok(read_dir) = std::fs::read_dir(&panels_dir) {
                for entry in read_dir.flatten() {
                    let path = entry.path();
                    let Some(path_str) = path.to_str() else { continue };
                    match panels::handle_write(&mut panels, path_str) {
                        Ok(Some(PanelEvent::Create(panel))) => {
                            let _ = outbound.send(ServerMessage::PanelCreate { panel });
                        }
                        Ok(_) => {}
                        Err(_) => {
                            // A malformed pre-existing panel file is surfaced to
                            // the GM on the first turn, same as a live write error.
                        }
                    }
                }
            }
        }

        let shared = Arc::new(Mutex::new(SessionShared::new(state, panels)));

        let session_effects = Arc::new(SessionEffects {
            shared: shared.clone(),
            outbound: outbound.clone(),
            image,
            player_manager,
            world_manager,
        });
        let hook = Arc::new(SessionPostToolHook {
            shared: shared.clone(),
            outbound: outbound.clone(),
            project_dir: project_dir.clone(),
        });

        let cancel_generation = Arc::new(AtomicU64::new(0));
        let (tx, rx) = mpsc::unbounded_channel();

        let session = GameSession {
            shared,
            agent,
            effects: session_effects,
            hook,
            outbound,
            project_dir,
            queue: VecDeque::new(),
            recovery_attempt: 0,
            cancel_generation: cancel_generation.clone(),
            input_timeout: DEFAULT_INPUT_TIMEOUT,
        };

        tokio::spawn(session.run(rx));

        SessionInit {
            handle: GameSessionHandle { tx, cancel_generation },
            adventure_id,
            history,
            theme,
        }
    }

    async fn run(mut self, mut rx: mpsc::UnboundedReceiver<SessionCommand>) {
        while let Some(command) = rx.recv().await {
            match command {
                SessionCommand::Input { text, is_system } => {
                    if !is_system {
                        let outcome = sanitizer::sanitize(&text);
                        if outcome.blocked {
                            let _ = self.outbound.send(ServerMessage::error(
                                taleforge_shared::ErrorCode::GmError,
                                "Please describe your action differently.",
                            ));
                            continue;
                        }
                        if self.queue.len() >= QUEUE_SOFT_CAP {
                            let _ = self.outbound.send(ServerMessage::error(
                                taleforge_shared::ErrorCode::GmError,
                                "You're getting ahead of the story — slow down a little.",
                            ));
                            continue;
                        }
                        self.queue.push_back(QueuedInput { text: outcome.sanitized });
                    } else {
                        self.queue.push_back(QueuedInput { text });
                    }
                    self.drain_queue().await;
                }
                SessionCommand::Recap => {
                    self.handle_recap().await;
                }
                SessionCommand::Abort => {
                    self.queue.clear();
                }
            }
        }
    }

    async fn drain_queue(&mut self) {
        let mut any_real_processed = false;
        while let Some(input) = self.queue.pop_front() {
            any_real_processed = true;
            match tokio::time::timeout(self.input_timeout, self.process_one(input.text)).await {
                Ok(_) => {}
                Err(_elapsed) => {
                    let _ = self.outbound.send(ServerMessage::error(
                        taleforge_shared::ErrorCode::ProcessingTimeout,
                        "The GM took too long to respond to that.",
                    ));
                }
            }
        }

        if any_real_processed {
            let pending = {
                let shared = self.shared.lock().await;
                shared.state.is_compaction_pending()
            };
            if pending {
                self.run_pending_compaction().await;
            }
        }
    }

    async fn run_pending_compaction(&mut self) {
        let (entries, summary, dir) = {
            let shared = self.shared.lock().await;
            (
                shared.state.history().entries.clone(),
                shared.state.history().summary.clone(),
                shared.state.dir().to_path_buf(),
            )
        };

        let config = CompactionConfig {
            retained_count: ROLLING_RETAINED_COUNT,
            target_retained_char_count: ROLLING_RETAINED_CHARS,
        };
        let result = compactor::compact(self.agent.as_ref(), &dir, entries, summary, config).await;

        match result {
            Ok(success) => {
                let mut shared = self.shared.lock().await;
                if let Err(e) = shared.state.replace_history(success.retained_entries, success.summary) {
                    tracing::warn!(error = %e, "failed to persist compacted history");
                    return;
                }
                shared.state.run_pending_compaction();
            }
            Err(failure) => {
                // Original history is untouched; the bit stays set and the
                // next queue drain will try again.
                tracing::warn!(error = %failure.error, "rolling compaction pass failed, will retry");
            }
        }
    }

    /// A single queued input through the GM: mint a message id and a fresh
    /// cancellation handle, stream the reply, and persist the result.
    async fn process_one(&mut self, text: String) -> Result<(), InfraError> {
        let message_id = Uuid::new_v4().to_string();
        let my_generation = self.cancel_generation.fetch_add(1, Ordering::SeqCst) + 1;

        {
            let mut shared = self.shared.lock().await;
            shared
                .state
                .append_history(NarrativeEntry::new(EntryType::PlayerInput, text.clone()))?;
        }

        let _ = self.outbound.send(ServerMessage::GmResponseStart {
            message_id: message_id.clone(),
        });

        let (system_prompt, resume_session_id) = {
            let mut shared = self.shared.lock().await;
            let panel_errors = std::mem::take(&mut shared.pending_panel_errors);
            let system_prompt = prompt::build_system_prompt(shared.state.adventure(), &panel_errors);
            let resume = shared.state.adventure().agent_session_id.clone();
            (system_prompt, resume)
        };

        match self
            .run_agent_turn(&message_id, text.clone(), system_prompt, resume_session_id, my_generation)
            .await
        {
            Ok(outcome) => self.finish_turn(&message_id, outcome).await,
            Err(agent_error) => {
                if agent_error.is_session_invalid() && self.recovery_attempt < 1 {
                    self.attempt_recovery(&message_id, text, my_generation).await
                } else {
                    self.fail_turn(&message_id, agent_error).await
                }
            }
        }
    }

    /// spec.md §4.7.4: one recovery attempt per input, with a trimmed
    /// context window prepended so the fresh conversation can stay
    /// consistent without the stale `agent_session_id`.
    async fn attempt_recovery(
        &mut self,
        message_id: &str,
        original_text: String,
        my_generation: u64,
    ) -> Result<(), InfraError> {
        self.recovery_attempt += 1;
        let _ = self.outbound.send(ServerMessage::ToolStatus {
            state: ToolStatusState::Active,
            description: "Reconnecting…".to_string(),
        });

        {
            let mut shared = self.shared.lock().await;
            shared.state.clear_agent_session_id()?;
        }

        if self.cancel_generation.load(Ordering::SeqCst) != my_generation {
            let _ = self.outbound.send(ServerMessage::GmResponseEnd {
                message_id: message_id.to_string(),
            });
            let _ = self.outbound.send(ServerMessage::ToolStatus {
                state: ToolStatusState::Idle,
                description: "Interrupted".to_string(),
            });
            return Ok(());
        }

        let recovery_context = self.build_recovery_context().await;
        let prompt_with_context = format!("{recovery_context}\n\n{original_text}");

        let system_prompt = {
            let mut shared = self.shared.lock().await;
            let panel_errors = std::mem::take(&mut shared.pending_panel_errors);
            prompt::build_system_prompt(shared.state.adventure(), &panel_errors)
        };

        let _ = self.outbound.send(ServerMessage::ToolStatus {
            state: ToolStatusState::Active,
            description: "Restoring…".to_string(),
        });

        match self
            .run_agent_turn(message_id, prompt_with_context, system_prompt, None, my_generation)
            .await
        {
            Ok(outcome) => self.finish_turn(message_id, outcome).await,
            Err(agent_error) => self.fail_turn(message_id, agent_error).await,
        }
    }

    async fn build_recovery_context(&self) -> String {
        let shared = self.shared.lock().await;
        let history = shared.state.history();

        let mut sections = Vec::new();
        if let Some(summary) = &history.summary {
            sections.push(format!("Summary of earlier events: {}", summary.text));
        }

        let mut recent = String::new();
        for entry in history.entries.iter().rev().take(20).collect::<Vec<_>>().into_iter().rev() {
            recent.push_str(&format!("[{:?}] {}\n", entry.entry_type, entry.content));
        }
        if recent.chars().count() > 12_000 {
            recent = recent.chars().take(12_000).collect();
        }
        sections.push(format!("Recent history:\n{recent}"));

        format!(
            "RECOVERY CONTEXT (the conversation was reset; use this to stay consistent):\n{}",
            sections.join("\n\n")
        )
    }

    /// Stream one agent call to completion, injecting a paragraph break
    /// between consecutive text blocks and surfacing `tool_status{active}`
    /// for each tool used, checking the cancellation generation at every
    /// stream-message boundary (spec.md §4.7.2, §5).
    async fn run_agent_turn(
        &self,
        message_id: &str,
        prompt: String,
        system_prompt: String,
        resume_session_id: Option<String>,
        my_generation: u64,
    ) -> Result<TurnOutcome, AgentError> {
        let request = AgentRequest {
            prompt,
            system_prompt,
            resume_session_id,
            tool_definitions: ToolDispatcher::new().tool_definitions(),
            cwd: self.project_dir.clone(),
            max_turns: 8,
        };

        let mut stream = self
            .agent
            .call(request, self.effects.clone(), self.hook.clone())
            .await;

        let mut text = String::new();
        let mut was_aborted = false;
        let mut agent_session_id = None;
        let mut blocks_seen = 0u32;

        while let Some(event) = stream.next().await {
            if self.cancel_generation.load(Ordering::SeqCst) != my_generation {
                was_aborted = true;
                break;
            }

            match event? {
                super::agent::AgentEvent::Init { agent_session_id: id } => {
                    agent_session_id = Some(id);
                }
                super::agent::AgentEvent::ContentBlockStart => {
                    if blocks_seen > 0 {
                        text.push_str("\n\n");
                        let _ = self.outbound.send(ServerMessage::GmResponseChunk {
                            message_id: message_id.to_string(),
                            text: "\n\n".to_string(),
                        });
                    }
                    blocks_seen += 1;
                }
                super::agent::AgentEvent::TextDelta(delta) => {
                    text.push_str(&delta);
                    let _ = self.outbound.send(ServerMessage::GmResponseChunk {
                        message_id: message_id.to_string(),
                        text: delta,
                    });
                }
                super::agent::AgentEvent::ContentBlockEnd => {}
                super::agent::AgentEvent::Complete { text: full, tool_uses, error: _ } => {
                    for tool in tool_uses {
                        let _ = self.outbound.send(ServerMessage::ToolStatus {
                            state: ToolStatusState::Active,
                            description: vague_tool_description(&tool.name).to_string(),
                        });
                    }
                    if full.len() > text.len() {
                        text = full;
                    }
                }
            }
        }

        Ok(TurnOutcome { text, was_aborted, agent_session_id })
    }

    async fn finish_turn(&mut self, message_id: &str, outcome: TurnOutcome) -> Result<(), InfraError> {
        let _ = self.outbound.send(ServerMessage::GmResponseEnd {
            message_id: message_id.to_string(),
        });
        let idle_description = if outcome.was_aborted { "Interrupted" } else { "Ready" };
        let _ = self.outbound.send(ServerMessage::ToolStatus {
            state: ToolStatusState::Idle,
            description: idle_description.to_string(),
        });

        if outcome.was_aborted && outcome.text.is_empty() {
            return Ok(());
        }

        let persisted_text = if outcome.was_aborted {
            format!("{}\n\n*[Response interrupted]*", outcome.text)
        } else {
            outcome.text.clone()
        };

        let mut shared = self.shared.lock().await;
        shared
            .state
            .append_history(NarrativeEntry::new(EntryType::GmResponse, persisted_text.clone()))?;

        let first_paragraph: String = persisted_text.split("\n\n").next().unwrap_or("").chars().take(500).collect();
        let location = shared.state.adventure().current_scene.location.clone();
        shared.state.update_scene(first_paragraph, location)?;

        if let Some(id) = outcome.agent_session_id {
            shared.state.update_agent_session_id(id)?;
        }

        let history = shared.state.history();
        let total_chars: usize = history.entries.iter().map(|e| e.content.len()).sum();
        if history.len() > COMPACTION_TRIGGER_COUNT || total_chars > COMPACTION_TRIGGER_CHARS {
            shared.state.mark_compaction_pending(true);
        }
        drop(shared);

        if !outcome.was_aborted {
            self.recovery_attempt = 0;
        }
        Ok(())
    }

    async fn fail_turn(&mut self, message_id: &str, agent_error: AgentError) -> Result<(), InfraError> {
        let _ = self.outbound.send(ServerMessage::GmResponseEnd {
            message_id: message_id.to_string(),
        });
        let _ = self.outbound.send(ServerMessage::ToolStatus {
            state: ToolStatusState::Idle,
            description: "Ready".to_string(),
        });
        let infra = InfraError::from(agent_error);
        let _ = self.outbound.send(ServerMessage::error(infra.code(), infra.to_string()));
        Ok(())
    }

    /// spec.md §4.7.3: force a system checkpoint turn, then run a
    /// zero-retention compaction pass and resume in a fresh conversation.
    async fn handle_recap(&mut self) {
        let history_len = {
            let shared = self.shared.lock().await;
            shared.state.history().len()
        };
        if history_len < 10 {
            let _ = self.outbound.send(ServerMessage::RecapError {
                reason: "There isn't enough history yet to recap.".to_string(),
            });
            return;
        }

        let _ = self.outbound.send(ServerMessage::RecapStarted);

        if let Err(e) = self.process_one(prompt::forced_save_prompt().to_string()).await {
            let _ = self.outbound.send(ServerMessage::RecapError { reason: e.to_string() });
            return;
        }

        let (entries, summary, dir) = {
            let shared = self.shared.lock().await;
            (
                shared.state.history().entries.clone(),
                shared.state.history().summary.clone(),
                shared.state.dir().to_path_buf(),
            )
        };

        let config = CompactionConfig {
            retained_count: 0,
            target_retained_char_count: 0,
        };
        match compactor::compact(self.agent.as_ref(), &dir, entries, summary, config).await {
            Ok(success) => {
                let mut shared = self.shared.lock().await;
                if let Err(e) = shared.state.replace_history(success.retained_entries, success.summary.clone()) {
                    let message = e.to_string();
                    drop(shared);
                    let _ = self.outbound.send(ServerMessage::RecapError { reason: message });
                    return;
                }
                if let Err(e) = shared.state.clear_agent_session_id() {
                    let message = e.to_string();
                    drop(shared);
                    let _ = self.outbound.send(ServerMessage::RecapError { reason: message });
                    return;
                }
                drop(shared);

                let _ = self.outbound.send(ServerMessage::RecapComplete {
                    history: Vec::new(),
                    summary: success.summary,
                });

                self.queue.push_back(QueuedInput {
                    text: prompt::recap_resume_prompt().to_string(),
                });
                self.drain_queue().await;
            }
            Err(failure) => {
                let _ = self.outbound.send(ServerMessage::RecapError { reason: failure.error });
            }
        }
    }
}
