//! spec.md §8 scenario 4: a panel's full lifecycle (create, update, dismiss)
//! as derived from the agent's own `Write`/`Bash` tool calls against
//! `<playerRef>/panels/`.

use std::sync::Arc;

use serde_json::json;
use tempfile::tempdir;

use taleforge_shared::ServerMessage;

use crate::infrastructure::agent::mock::{MockAgentClient, ScriptedTurn};

use super::{collect_until, default_image, is_idle_tool_status, kind, spawn};

const FRONT_MATTER_CLEAR: &str = "---\ntitle: Weather Status\nposition: sidebar\npriority: medium\n---\nClear";
const FRONT_MATTER_STORM: &str = "---\ntitle: Weather Status\nposition: sidebar\npriority: medium\n---\nStorm";

#[tokio::test]
async fn weather_panel_is_created_updated_then_dismissed() {
    let project_dir = tempdir().unwrap();
    let panels_dir = project_dir.path().join("players/test-hero/panels");
    std::fs::create_dir_all(&panels_dir).unwrap();
    let file = panels_dir.join("weather.md");

    let agent = Arc::new(MockAgentClient::new());

    let mut harness = spawn(project_dir.path(), &agent, default_image(), |handle| {
        handle.update_player_ref(Some("players/test-hero".to_string())).unwrap();
    });

    // Create: the agent writes a fresh panel file.
    std::fs::write(&file, FRONT_MATTER_CLEAR).unwrap();
    agent
        .push_turn(ScriptedTurn::Reply {
            agent_session_id: "sess-1".to_string(),
            text: "You check the sky. ".to_string(),
            tool_call: Some(("Write".to_string(), json!({"file_path": file.to_str().unwrap()}))),
        })
        .await;
    harness.handle.handle_input("check the weather".to_string(), false);
    let turn = collect_until(&mut harness.outbound, is_idle_tool_status).await;
    let create = turn
        .iter()
        .find(|m| kind(m) == "panel_create")
        .expect("panel_create was sent");
    match create {
        ServerMessage::PanelCreate { panel } => {
            assert_eq!(panel.id, "weather");
            assert_eq!(panel.content, "Clear");
        }
        other => panic!("expected panel_create, got {other:?}"),
    }

    // Update: the agent rewrites the same file.
    std::fs::write(&file, FRONT_MATTER_STORM).unwrap();
    agent
        .push_turn(ScriptedTurn::Reply {
            agent_session_id: "sess-1".to_string(),
            text: "The sky darkens. ".to_string(),
            tool_call: Some(("Write".to_string(), json!({"file_path": file.to_str().unwrap()}))),
        })
        .await;
    harness.handle.handle_input("check again".to_string(), false);
    let turn = collect_until(&mut harness.outbound, is_idle_tool_status).await;
    let update = turn
        .iter()
        .find(|m| kind(m) == "panel_update")
        .expect("panel_update was sent");
    assert!(matches!(
        update,
        ServerMessage::PanelUpdate { id, content } if id == "weather" && content == "Storm"
    ));

    // Dismiss: the agent removes the file via a shell command.
    std::fs::remove_file(&file).unwrap();
    agent
        .push_turn(ScriptedTurn::Reply {
            agent_session_id: "sess-1".to_string(),
            text: "The weather report is gone. ".to_string(),
            tool_call: Some((
                "Bash".to_string(),
                json!({"command": format!("rm {}", file.to_str().unwrap())}),
            )),
        })
        .await;
    harness.handle.handle_input("clear the panel".to_string(), false);
    let turn = collect_until(&mut harness.outbound, is_idle_tool_status).await;
    let dismiss = turn
        .iter()
        .find(|m| kind(m) == "panel_dismiss")
        .expect("panel_dismiss was sent");
    assert!(matches!(dismiss, ServerMessage::PanelDismiss { id } if id == "weather"));
}
