//! GM system-prompt construction contract.
//!
//! The prompt's wording is out of scope; what's specified is its slots and
//! the sanitization each one gets before interpolation.

use taleforge_domain::{Adventure, XpStyle};

use crate::infrastructure::sanitizer::sanitize_state_value;

const SCENE_MAX: usize = 500;
const PATH_MAX: usize = 200;

fn xp_guidance(style: Option<XpStyle>) -> &'static str {
    match style {
        Some(XpStyle::Frequent) => "Award small amounts of XP often, after most meaningful actions.",
        Some(XpStyle::Milestone) => "Award XP only at major story milestones.",
        Some(XpStyle::CombatPlus) => "Weight XP rewards heavily toward combat encounters.",
        None => "No XP preference has been set yet; ask the player if it comes up naturally.",
    }
}

/// Build the GM system prompt for a normal turn. `panel_errors`, if
/// non-empty, becomes a "Panel Validation Errors" section (collected by
/// the panel file hook during the previous turn) and is cleared by the
/// caller once consumed.
pub fn build_system_prompt(
    adventure: &Adventure,
    panel_errors: &[String],
) -> String {
    let scene = sanitize_state_value(&adventure.current_scene.description, SCENE_MAX);
    let xp = xp_guidance(adventure.xp_style);

    let player_path = adventure
        .player_ref
        .as_deref()
        .map(|r| sanitize_state_value(r, PATH_MAX))
        .unwrap_or_else(|| "(no character bound yet)".to_string());
    let world_path = adventure
        .world_ref
        .as_deref()
        .map(|r| sanitize_state_value(r, PATH_MAX))
        .unwrap_or_else(|| "(no world bound yet)".to_string());

    let mut prompt = String::new();
    prompt.push_str("You are the Game Master for an interactive text adventure.\n\n");
    prompt.push_str(&format!("Current scene: {scene}\n"));
    prompt.push_str(&format!("XP guidance: {xp}\n"));
    prompt.push_str(&format!("Player file path: {player_path}\n"));
    prompt.push_str(&format!("World file path: {world_path}\n"));

    if !panel_errors.is_empty() {
        prompt.push_str("\nPanel Validation Errors (fix these before writing new panel files):\n");
        for err in panel_errors {
            prompt.push_str(&format!("- {}\n", sanitize_state_value(err, SCENE_MAX)));
        }
    }

    prompt
}

/// The canned prompt fed through `handleInput` as a system input after a
/// recap completes, asking the GM for a returning-player greeting in a
/// fresh conversation.
pub fn recap_resume_prompt() -> &'static str {
    "RECAP SESSION: The player is returning after a full history recap. Greet them \
     briefly, acknowledging the passage of time, using only the summary and current \
     scene for continuity."
}

/// The internal system input asking the GM to persist volatile narrative
/// state to files before a forced save / compaction pass.
pub fn forced_save_prompt() -> &'static str {
    "SYSTEM CHECKPOINT: Persist any important narrative state (character status, \
     world changes, active quests) to the appropriate files now, using your tools. \
     Do not narrate this action to the player."
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn includes_panel_errors_section_only_when_present() {
        let adventure = Adventure::new();
        let without = build_system_prompt(&adventure, &[]);
        assert!(!without.contains("Panel Validation Errors"));

        let with = build_system_prompt(&adventure, &["bad front-matter".to_string()]);
        assert!(with.contains("Panel Validation Errors"));
        assert!(with.contains("bad front-matter"));
    }

    #[test]
    fn sanitizes_scene_description_slot() {
        let mut adventure = Adventure::new();
        adventure.current_scene.description = "x".repeat(600);
        let prompt = build_system_prompt(&adventure, &[]);
        assert!(prompt.contains('\u{2026}'));
    }

    #[test]
    fn reports_unbound_refs_without_panicking() {
        let adventure = Adventure::new();
        let prompt = build_system_prompt(&adventure, &[]);
        assert!(prompt.contains("no character bound yet"));
        assert!(prompt.contains("no world bound yet"));
    }
}
