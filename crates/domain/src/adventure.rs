//! The Adventure record: the durable per-player unit of state.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::ids::{AdventureId, SessionToken};
use crate::theme::Theme;

/// A short, human-readable description of where the player currently is.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct CurrentScene {
    pub description: String,
    pub location: String,
}

impl CurrentScene {
    pub fn unknown() -> Self {
        Self {
            description: "Unknown".to_string(),
            location: "Unknown".to_string(),
        }
    }
}

/// Persisted XP-feedback preference chosen by the player.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum XpStyle {
    Frequent,
    Milestone,
    CombatPlus,
}

impl std::fmt::Display for XpStyle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            XpStyle::Frequent => "frequent",
            XpStyle::Milestone => "milestone",
            XpStyle::CombatPlus => "combat-plus",
        };
        write!(f, "{s}")
    }
}

impl std::str::FromStr for XpStyle {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "frequent" => Ok(XpStyle::Frequent),
            "milestone" => Ok(XpStyle::Milestone),
            "combat-plus" => Ok(XpStyle::CombatPlus),
            other => Err(format!("unknown xp style: {other}")),
        }
    }
}

/// The durable record for a single adventure.
///
/// `id` is never reused. `session_token` is never exposed to clients beyond
/// its creator. `agent_session_id` may be cleared and re-acquired during
/// recovery (see the session-recovery flow in `engine::session`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Adventure {
    pub id: AdventureId,
    pub session_token: SessionToken,
    pub agent_session_id: Option<String>,
    pub created_at: DateTime<Utc>,
    pub last_active_at: DateTime<Utc>,
    pub current_scene: CurrentScene,
    pub current_theme: Theme,
    pub player_ref: Option<String>,
    pub world_ref: Option<String>,
    pub xp_style: Option<XpStyle>,
}

impl Adventure {
    /// A freshly-created adventure with no history, default theme and an
    /// unknown starting scene.
    pub fn new() -> Self {
        let now = Utc::now();
        Self {
            id: AdventureId::new(),
            session_token: SessionToken::new(),
            agent_session_id: None,
            created_at: now,
            last_active_at: now,
            current_scene: CurrentScene::unknown(),
            current_theme: Theme::default(),
            player_ref: None,
            world_ref: None,
            xp_style: None,
        }
    }

    pub fn touch(&mut self) {
        self.last_active_at = Utc::now();
    }
}

impl Default for Adventure {
    fn default() -> Self {
        Self::new()
    }
}

/// The subset of an adventure exposed by the public, unauthenticated
/// metadata endpoint: no session token, no refs.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AdventureMetadata {
    pub id: AdventureId,
    pub created_at: DateTime<Utc>,
    pub last_active_at: DateTime<Utc>,
    pub current_scene: CurrentScene,
}

impl From<&Adventure> for AdventureMetadata {
    fn from(a: &Adventure) -> Self {
        Self {
            id: a.id,
            created_at: a.created_at,
            last_active_at: a.last_active_at,
            current_scene: a.current_scene.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_adventure_has_unknown_scene_and_no_refs() {
        let a = Adventure::new();
        assert_eq!(a.current_scene.description, "Unknown");
        assert!(a.player_ref.is_none());
        assert!(a.world_ref.is_none());
        assert!(a.agent_session_id.is_none());
    }

    #[test]
    fn xp_style_round_trips_through_string() {
        for s in [XpStyle::Frequent, XpStyle::Milestone, XpStyle::CombatPlus] {
            let parsed: XpStyle = s.to_string().parse().unwrap();
            assert_eq!(s, parsed);
        }
    }
}
