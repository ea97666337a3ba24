//! Tool Dispatcher / MCP Surface (C5).
//!
//! Registers the fixed tool set and routes calls to a capability struct
//! (`ToolEffects`) supplied by the session, per the "capability struct"
//! pattern: the dispatcher holds no session state of its own.

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;

use super::ToolDefinition;

/// Side-effect handlers for the fixed tool set. Implemented by the game
/// session (or a thin facade over it): dispatcher and session share a
/// single serialization domain, so no locking is needed here.
#[async_trait]
pub trait ToolEffects: Send + Sync {
    async fn set_theme(&self, args: SetThemeArgs) -> Result<String, String>;
    async fn set_xp_style(&self, args: SetXpStyleArgs) -> Result<String, String>;
    async fn set_character(&self, args: SetCharacterArgs) -> Result<String, String>;
    async fn set_world(&self, args: SetWorldArgs) -> Result<String, String>;
    async fn list_characters(&self) -> Result<String, String>;
    async fn list_worlds(&self) -> Result<String, String>;
    async fn create_panel(&self, args: PanelArgs) -> Result<String, String>;
    async fn update_panel(&self, args: PanelArgs) -> Result<String, String>;
    async fn dismiss_panel(&self, id: String) -> Result<String, String>;
    async fn list_panels(&self) -> Result<String, String>;
}

#[derive(Debug, Clone, Deserialize)]
pub struct SetThemeArgs {
    pub mood: String,
    pub genre: String,
    pub region: String,
    #[serde(default)]
    pub image_prompt: Option<String>,
    #[serde(default)]
    pub force_generate: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SetXpStyleArgs {
    pub xp_style: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SetCharacterArgs {
    pub name: String,
    #[serde(default)]
    pub is_new: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SetWorldArgs {
    pub name: String,
    #[serde(default)]
    pub is_new: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PanelArgs {
    pub id: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub content: String,
    #[serde(default)]
    pub position: Option<String>,
    #[serde(default)]
    pub persistent: bool,
    #[serde(default)]
    pub x: Option<f64>,
    #[serde(default)]
    pub y: Option<f64>,
}

/// Stateless router from a tool name + raw JSON args to a `ToolEffects`
/// call. Handler errors are translated to a textual `Error: <msg>` result
/// so the agent can see and retry.
pub struct ToolDispatcher;

impl ToolDispatcher {
    pub fn new() -> Self {
        Self
    }

    /// Dispatch one named tool call. Returns the textual result visible to
    /// the agent (`content:[textBlock]` in spec terms) — always `Ok`, since
    /// handler failures are folded into the text as `Error: <msg>` rather
    /// than propagated, matching the dispatch contract in spec.md §4.5.
    pub async fn dispatch(
        &self,
        name: &str,
        args: serde_json::Value,
        effects: &dyn ToolEffects,
    ) -> String {
        let result = match name {
            "set_theme" => match parse::<SetThemeArgs>(args) {
                Ok(a) => effects.set_theme(a).await,
                Err(e) => Err(e),
            },
            "set_xp_style" => match parse::<SetXpStyleArgs>(args) {
                Ok(a) => effects.set_xp_style(a).await,
                Err(e) => Err(e),
            },
            "set_character" => match parse::<SetCharacterArgs>(args) {
                Ok(a) => effects.set_character(a).await,
                Err(e) => Err(e),
            },
            "set_world" => match parse::<SetWorldArgs>(args) {
                Ok(a) => effects.set_world(a).await,
                Err(e) => Err(e),
            },
            "list_characters" => Ok(effects.list_characters().await),
            "list_worlds" => Ok(effects.list_worlds().await),
            "create_panel" => match parse::<PanelArgs>(args) {
                Ok(a) => effects.create_panel(a).await,
                Err(e) => Err(e),
            },
            "update_panel" => match parse::<PanelArgs>(args) {
                Ok(a) => effects.update_panel(a).await,
                Err(e) => Err(e),
            },
            "dismiss_panel" => match parse_dismiss(args) {
                Ok(id) => effects.dismiss_panel(id).await,
                Err(e) => Err(e),
            },
            "list_panels" => Ok(effects.list_panels().await),
            other => Err(format!("unknown tool: {other}")),
        };

        match result {
            Ok(text) => text,
            Err(e) => format!("Error: {e}"),
        }
    }

    /// The fixed tool set, with declared JSON schemas, presented to the
    /// agent as discoverable capabilities.
    pub fn tool_definitions(&self) -> Vec<ToolDefinition> {
        vec![
            ToolDefinition {
                name: "set_theme".into(),
                description: "Change the adventure's visual theme and fetch a matching background image.".into(),
                input_schema: json!({
                    "type": "object",
                    "properties": {
                        "mood": {"type": "string"},
                        "genre": {"type": "string"},
                        "region": {"type": "string"},
                        "image_prompt": {"type": "string"},
                        "force_generate": {"type": "boolean"}
                    },
                    "required": ["mood", "genre", "region"]
                }),
            },
            ToolDefinition {
                name: "set_xp_style".into(),
                description: "Persist the player's XP-feedback preference.".into(),
                input_schema: json!({
                    "type": "object",
                    "properties": {"xp_style": {"type": "string"}},
                    "required": ["xp_style"]
                }),
            },
            ToolDefinition {
                name: "set_character".into(),
                description: "Bind or create the player's character slug.".into(),
                input_schema: json!({
                    "type": "object",
                    "properties": {"name": {"type": "string"}, "is_new": {"type": "boolean"}},
                    "required": ["name"]
                }),
            },
            ToolDefinition {
                name: "set_world".into(),
                description: "Bind or create the adventure's world slug.".into(),
                input_schema: json!({
                    "type": "object",
                    "properties": {"name": {"type": "string"}, "is_new": {"type": "boolean"}},
                    "required": ["name"]
                }),
            },
            ToolDefinition {
                name: "list_characters".into(),
                description: "Enumerate available character slugs with display names.".into(),
                input_schema: json!({"type": "object", "properties": {}}),
            },
            ToolDefinition {
                name: "list_worlds".into(),
                description: "Enumerate available world slugs with display names.".into(),
                input_schema: json!({"type": "object", "properties": {}}),
            },
            ToolDefinition {
                name: "create_panel".into(),
                description: "Create an info panel shown alongside the narrative.".into(),
                input_schema: panel_schema(),
            },
            ToolDefinition {
                name: "update_panel".into(),
                description: "Update an existing info panel's content.".into(),
                input_schema: panel_schema(),
            },
            ToolDefinition {
                name: "dismiss_panel".into(),
                description: "Dismiss an info panel.".into(),
                input_schema: json!({
                    "type": "object",
                    "properties": {"id": {"type": "string"}},
                    "required": ["id"]
                }),
            },
            ToolDefinition {
                name: "list_panels".into(),
                description: "List currently active info panels.".into(),
                input_schema: json!({"type": "object", "properties": {}}),
            },
        ]
    }
}

impl Default for ToolDispatcher {
    fn default() -> Self {
        Self::new()
    }
}

fn panel_schema() -> serde_json::Value {
    json!({
        "type": "object",
        "properties": {
            "id": {"type": "string"},
            "title": {"type": "string"},
            "content": {"type": "string"},
            "position": {"type": "string"},
            "persistent": {"type": "boolean"},
            "x": {"type": "number"},
            "y": {"type": "number"}
        },
        "required": ["id"]
    })
}

fn parse<T: serde::de::DeserializeOwned>(args: serde_json::Value) -> Result<T, String> {
    serde_json::from_value(args).map_err(|e| format!("invalid arguments: {e}"))
}

fn parse_dismiss(args: serde_json::Value) -> Result<String, String> {
    #[derive(Deserialize)]
    struct Dismiss {
        id: String,
    }
    let d: Dismiss = parse(args)?;
    Ok(d.id)
}

#[cfg(test)]
mod tests {
    use super::*;

    struct RecordingEffects;

    #[async_trait]
    impl ToolEffects for RecordingEffects {
        async fn set_theme(&self, args: SetThemeArgs) -> Result<String, String> {
            Ok(format!("theme set to {}/{}/{}", args.mood, args.genre, args.region))
        }
        async fn set_xp_style(&self, _args: SetXpStyleArgs) -> Result<String, String> {
            Ok("xp style set".into())
        }
        async fn set_character(&self, _args: SetCharacterArgs) -> Result<String, String> {
            Ok("character bound".into())
        }
        async fn set_world(&self, _args: SetWorldArgs) -> Result<String, String> {
            Ok("world bound".into())
        }
        async fn list_characters(&self) -> Result<String, String> {
            Ok("[]".into())
        }
        async fn list_worlds(&self) -> Result<String, String> {
            Ok("[]".into())
        }
        async fn create_panel(&self, _args: PanelArgs) -> Result<String, String> {
            Err("panel limit reached".into())
        }
        async fn update_panel(&self, _args: PanelArgs) -> Result<String, String> {
            Ok("updated".into())
        }
        async fn dismiss_panel(&self, id: String) -> Result<String, String> {
            Ok(format!("dismissed {id}"))
        }
        async fn list_panels(&self) -> Result<String, String> {
            Ok("[]".into())
        }
    }

    #[tokio::test]
    async fn dispatch_routes_to_matching_handler() {
        let dispatcher = ToolDispatcher::new();
        let effects = RecordingEffects;
        let result = dispatcher
            .dispatch(
                "set_theme",
                json!({"mood": "ominous", "genre": "high-fantasy", "region": "forest"}),
                &effects,
            )
            .await;
        assert_eq!(result, "theme set to ominous/high-fantasy/forest");
    }

    #[tokio::test]
    async fn handler_error_becomes_textual_error() {
        let dispatcher = ToolDispatcher::new();
        let effects = RecordingEffects;
        let result = dispatcher
            .dispatch("create_panel", json!({"id": "x"}), &effects)
            .await;
        assert_eq!(result, "Error: panel limit reached");
    }

    #[tokio::test]
    async fn unknown_tool_name_is_reported() {
        let dispatcher = ToolDispatcher::new();
        let effects = RecordingEffects;
        let result = dispatcher.dispatch("nonexistent", json!({}), &effects).await;
        assert_eq!(result, "Error: unknown tool: nonexistent");
    }

    #[tokio::test]
    async fn malformed_arguments_are_reported() {
        let dispatcher = ToolDispatcher::new();
        let effects = RecordingEffects;
        let result = dispatcher.dispatch("set_theme", json!({}), &effects).await;
        assert!(result.starts_with("Error: invalid arguments"));
    }
}
