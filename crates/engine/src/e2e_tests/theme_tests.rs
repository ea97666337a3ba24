//! spec.md §8 scenarios 1-2: the dark-forest theme trigger and the
//! duplicate-trigger debounce.

use std::sync::Arc;

use serde_json::json;
use tempfile::tempdir;

use taleforge_shared::ServerMessage;

use crate::infrastructure::agent::mock::{MockAgentClient, ScriptedTurn};

use super::{collect_until, default_image, is_idle_tool_status, kind, spawn};

#[tokio::test]
async fn dark_forest_input_triggers_ordered_theme_change() {
    let project_dir = tempdir().unwrap();
    let agent = Arc::new(MockAgentClient::new());
    agent
        .push_turn(ScriptedTurn::Reply {
            agent_session_id: "sess-1".to_string(),
            text: "The trees close in and the light dies around you. ".to_string(),
            tool_call: Some((
                "set_theme".to_string(),
                json!({"mood": "ominous", "genre": "high-fantasy", "region": "forest"}),
            )),
        })
        .await;

    let mut harness = spawn(project_dir.path(), &agent, default_image(), |_| {});
    harness.handle.handle_input("I step into the dark forest".to_string(), false);

    let messages = collect_until(&mut harness.outbound, is_idle_tool_status).await;
    let kinds: Vec<&str> = messages.iter().map(kind).collect();

    assert_eq!(kinds.first(), Some(&"gm_response_start"));
    assert_eq!(kinds.last(), Some(&"tool_status"));

    let theme_pos = kinds.iter().position(|k| *k == "theme_change").expect("theme_change was sent");
    let end_pos = kinds.iter().position(|k| *k == "gm_response_end").expect("gm_response_end was sent");
    assert!(theme_pos < end_pos, "theme_change must land before gm_response_end: {kinds:?}");

    match &messages[theme_pos] {
        ServerMessage::ThemeChange { mood, genre, region, .. } => {
            assert_eq!(mood.to_string(), "ominous");
            assert_eq!(genre.to_string(), "high-fantasy");
            assert_eq!(region.to_string(), "forest");
        }
        other => panic!("expected theme_change at position {theme_pos}, got {other:?}"),
    }

    let reloaded = harness.store.load(&harness.adventure_id, harness.token).unwrap();
    assert_eq!(reloaded.adventure().current_theme.mood.to_string(), "ominous");
}

#[tokio::test]
async fn back_to_back_identical_triggers_debounce_to_one_theme_change() {
    let project_dir = tempdir().unwrap();
    let agent = Arc::new(MockAgentClient::new());
    let tool_call = Some((
        "set_theme".to_string(),
        json!({"mood": "calm", "genre": "low-fantasy", "region": "village"}),
    ));
    agent
        .push_turn(ScriptedTurn::Reply {
            agent_session_id: "sess-1".to_string(),
            text: "The square is quiet. ".to_string(),
            tool_call: tool_call.clone(),
        })
        .await;
    agent
        .push_turn(ScriptedTurn::Reply {
            agent_session_id: "sess-1".to_string(),
            text: "Still quiet. ".to_string(),
            tool_call,
        })
        .await;

    let mut harness = spawn(project_dir.path(), &agent, default_image(), |_| {});
    harness.handle.handle_input("look around the village square".to_string(), false);
    let first_turn = collect_until(&mut harness.outbound, is_idle_tool_status).await;

    harness.handle.handle_input("look around again".to_string(), false);
    let second_turn = collect_until(&mut harness.outbound, is_idle_tool_status).await;

    let theme_changes = first_turn
        .iter()
        .chain(second_turn.iter())
        .filter(|m| kind(m) == "theme_change")
        .count();
    assert_eq!(theme_changes, 1, "a repeated identical trigger within the debounce window must not resend theme_change");
}
