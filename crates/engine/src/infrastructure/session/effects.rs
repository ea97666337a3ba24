//! The session's own `ToolEffects`/`PostToolHook` implementations: the
//! capability struct the dispatcher and the agent client call into, and the
//! panel-file-hook reaction to the agent's own Write/Bash tool calls
//! (spec.md §9 "Callbacks into session from the tool dispatcher").
//!
//! Both share one `Arc<Mutex<SessionShared>>` with the processing loop.
//! The mutex is never contended in practice: only the single task driving
//! this session ever calls through these types, one tool call at a time,
//! which is exactly the "single serialization domain" the design notes
//! call for — the lock exists only because trait objects need `Send + Sync`
//! interior mutability, not because of real concurrency.

use std::path::PathBuf;
use std::str::FromStr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use tokio::sync::{mpsc, Mutex};

use taleforge_domain::{Genre, Mood, Panel, PanelPosition, Region, Theme, XpStyle};
use taleforge_shared::ServerMessage;

use crate::infrastructure::agent::{PostToolHook, PostToolHookEvent, ToolEffects};
use crate::infrastructure::agent::tool_dispatcher::{
    PanelArgs, SetCharacterArgs, SetThemeArgs, SetWorldArgs, SetXpStyleArgs,
};
use crate::infrastructure::entity_manager::EntityManager;
use crate::infrastructure::image::ImageService;
use crate::infrastructure::panels::{self, PanelEvent, PanelRegistry};
use crate::infrastructure::state_store::AdventureHandle;

/// Theme debounce window (spec.md §8 boundary: 999ms suppressed, 1001ms honored).
const THEME_DEBOUNCE: Duration = Duration::from_millis(1_000);

/// State shared between the processing loop and the tool effects/post-tool
/// hook, all owned by this one session.
pub struct SessionShared {
    pub state: AdventureHandle,
    pub panels: PanelRegistry,
    pub pending_panel_errors: Vec<String>,
    last_theme_set: Option<(Mood, Instant)>,
}

impl SessionShared {
    pub fn new(state: AdventureHandle, panels: PanelRegistry) -> Self {
        Self {
            state,
            panels,
            pending_panel_errors: Vec::new(),
            last_theme_set: None,
        }
    }
}

pub struct SessionEffects {
    pub shared: Arc<Mutex<SessionShared>>,
    pub outbound: mpsc::UnboundedSender<ServerMessage>,
    pub image: Arc<dyn ImageService>,
    pub player_manager: Arc<EntityManager>,
    pub world_manager: Arc<EntityManager>,
}

#[async_trait]
impl ToolEffects for SessionEffects {
    async fn set_theme(&self, args: SetThemeArgs) -> Result<String, String> {
        let mood = Mood::from_str(&args.mood)?;
        let genre = Genre::from_str(&args.genre)?;
        let region = Region::from_str(&args.region)?;

        let mut shared = self.shared.lock().await;
        let now = Instant::now();
        // spec.md §4.7.6 / §8: debounce is keyed on `mood` alone within the
        // window, regardless of genre/region.
        if let Some((last_mood, at)) = shared.last_theme_set {
            if last_mood == mood && now.duration_since(at) < THEME_DEBOUNCE {
                return Ok("theme unchanged (debounced)".to_string());
            }
        }
        shared.last_theme_set = Some((mood, now));

        let background_url = self
            .image
            .background_for(mood, genre, region, args.force_generate, args.image_prompt.as_deref())
            .await;

        let theme = Theme {
            mood,
            genre,
            region,
            background_url: background_url.clone(),
        };
        shared.state.update_theme(theme).map_err(|e| e.to_string())?;

        let _ = self.outbound.send(ServerMessage::ThemeChange {
            mood,
            genre,
            region,
            background_url,
        });

        Ok("theme updated".to_string())
    }

    async fn set_xp_style(&self, args: SetXpStyleArgs) -> Result<String, String> {
        let xp_style = XpStyle::from_str(&args.xp_style)?;
        let mut shared = self.shared.lock().await;
        shared.state.update_xp_style(xp_style).map_err(|e| e.to_string())?;
        Ok("xp style updated".to_string())
    }

    async fn set_character(&self, args: SetCharacterArgs) -> Result<String, String> {
        let slug = if args.is_new {
            self.player_manager.create(&args.name).map_err(|e| e.to_string())?
        } else {
            self.player_manager
                .list()
                .into_iter()
                .find(|entity| entity.display_name.eq_ignore_ascii_case(&args.name))
                .map(|entity| entity.slug)
                .ok_or_else(|| format!("no existing character named '{}'", args.name))?
        };
        let player_ref = self
            .player_manager
            .get_ref(&slug)
            .ok_or_else(|| "generated slug failed validation".to_string())?;

        let mut shared = self.shared.lock().await;
        shared
            .state
            .update_player_ref(Some(player_ref.clone()))
            .map_err(|e| e.to_string())?;
        Ok(format!("character bound: {player_ref}"))
    }

    async fn set_world(&self, args: SetWorldArgs) -> Result<String, String> {
        let slug = if args.is_new {
            self.world_manager.create(&args.name).map_err(|e| e.to_string())?
        } else {
            self.world_manager
                .list()
                .into_iter()
                .find(|entity| entity.display_name.eq_ignore_ascii_case(&args.name))
                .map(|entity| entity.slug)
                .ok_or_else(|| format!("no existing world named '{}'", args.name))?
        };
        let world_ref = self
            .world_manager
            .get_ref(&slug)
            .ok_or_else(|| "generated slug failed validation".to_string())?;

        let mut shared = self.shared.lock().await;
        shared
            .state
            .update_world_ref(Some(world_ref.clone()))
            .map_err(|e| e.to_string())?;
        Ok(format!("world bound: {world_ref}"))
    }

    async fn list_characters(&self) -> Result<String, String> {
        let entries = self.player_manager.list();
        serde_json::to_string(&entries.into_iter().map(|e| e.display_name).collect::<Vec<_>>())
            .map_err(|e| e.to_string())
    }

    async fn list_worlds(&self) -> Result<String, String> {
        let entries = self.world_manager.list();
        serde_json::to_string(&entries.into_iter().map(|e| e.display_name).collect::<Vec<_>>())
            .map_err(|e| e.to_string())
    }

    async fn create_panel(&self, args: PanelArgs) -> Result<String, String> {
        let position = match args.position.as_deref() {
            Some(p) => PanelPosition::from_str(p)?,
            None => PanelPosition::Sidebar,
        };
        let panel = Panel::new(args.id, args.title, args.content, position, None, args.persistent)
            .map_err(|e| e.to_string())?;

        let mut shared = self.shared.lock().await;
        shared.panels.create(panel.clone())?;
        let _ = self.outbound.send(ServerMessage::PanelCreate { panel });
        Ok("panel created".to_string())
    }

    async fn update_panel(&self, args: PanelArgs) -> Result<String, String> {
        let mut shared = self.shared.lock().await;
        shared.panels.update_content(&args.id, args.content.clone())?;
        let _ = self.outbound.send(ServerMessage::PanelUpdate {
            id: args.id,
            content: args.content,
        });
        Ok("panel updated".to_string())
    }

    async fn dismiss_panel(&self, id: String) -> Result<String, String> {
        let mut shared = self.shared.lock().await;
        if shared.panels.dismiss(&id).is_none() {
            return Err(format!("no panel with id '{id}'"));
        }
        let _ = self.outbound.send(ServerMessage::PanelDismiss { id });
        Ok("panel dismissed".to_string())
    }

    async fn list_panels(&self) -> Result<String, String> {
        let shared = self.shared.lock().await;
        let ids: Vec<&String> = shared.panels.ids().collect();
        serde_json::to_string(&ids).map_err(|e| e.to_string())
    }
}

/// Observes the agent's own `Write`/`Bash` tool calls to derive panel
/// lifecycle events from files under `<project_dir>/<playerRef>/panels/`
/// (spec.md §4.6). Validation errors are queued for the next system prompt
/// rather than surfaced to the client directly (spec.md §7).
pub struct SessionPostToolHook {
    pub shared: Arc<Mutex<SessionShared>>,
    pub outbound: mpsc::UnboundedSender<ServerMessage>,
    pub project_dir: PathBuf,
}

impl SessionPostToolHook {
    fn panels_dir(&self, shared: &SessionShared) -> Option<PathBuf> {
        let player_ref = shared.state.adventure().player_ref.as_ref()?;
        Some(self.project_dir.join(player_ref).join("panels"))
    }
}

#[async_trait]
impl PostToolHook for SessionPostToolHook {
    async fn on_tool_complete(&self, event: PostToolHookEvent) {
        let mut shared = self.shared.lock().await;
        match event.tool_name.as_str() {
            "Write" => {
                let Some(file_path) = event.tool_input.get("file_path").and_then(|v| v.as_str()) else {
                    return;
                };
                match panels::handle_write(&mut shared.panels, file_path) {
                    Ok(Some(PanelEvent::Create(panel))) => {
                        let _ = self.outbound.send(ServerMessage::PanelCreate { panel });
                    }
                    Ok(Some(PanelEvent::Update { id, content })) => {
                        let _ = self.outbound.send(ServerMessage::PanelUpdate { id, content });
                    }
                    Ok(Some(PanelEvent::Dismiss { id })) => {
                        let _ = self.outbound.send(ServerMessage::PanelDismiss { id });
                    }
                    Ok(None) => {}
                    Err(reason) => shared.pending_panel_errors.push(reason),
                }
            }
            "Bash" => {
                let Some(command) = event.tool_input.get("command").and_then(|v| v.as_str()) else {
                    return;
                };
                if !panels::is_suspicious_bash(command) {
                    return;
                }
                let Some(dir) = self.panels_dir(&shared) else {
                    return;
                };
                for panel_event in panels::handle_suspicious_bash(&mut shared.panels, command, &dir) {
                    match panel_event {
                        PanelEvent::Create(panel) => {
                            let _ = self.outbound.send(ServerMessage::PanelCreate { panel });
                        }
                        PanelEvent::Update { id, content } => {
                            let _ = self.outbound.send(ServerMessage::PanelUpdate { id, content });
                        }
                        PanelEvent::Dismiss { id } => {
                            let _ = self.outbound.send(ServerMessage::PanelDismiss { id });
                        }
                    }
                }
            }
            _ => {}
        }
    }
}

/// Vague, internal-tool-name-obscuring descriptions for `tool_status{active}`
/// (spec.md §4.7.2 step 4).
pub fn vague_tool_description(tool_name: &str) -> &'static str {
    match tool_name {
        "Write" => "Updating world state…",
        "Bash" => "Running a command…",
        "Read" => "Reviewing notes…",
        "set_theme" => "Adjusting the mood…",
        "set_xp_style" | "set_character" | "set_world" => "Updating your profile…",
        "create_panel" | "update_panel" | "dismiss_panel" => "Updating the display…",
        "list_characters" | "list_worlds" | "list_panels" => "Looking things up…",
        _ => "Thinking…",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn vague_description_obscures_write_and_falls_back_for_unknown() {
        assert_eq!(vague_tool_description("Write"), "Updating world state…");
        assert_eq!(vague_tool_description("some_internal_tool"), "Thinking…");
    }
}
