//! GM-derived UI panels.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::DomainError;

/// Maximum number of active panels a single session may hold at once.
pub const MAX_ACTIVE_PANELS: usize = 5;

/// Maximum panel body size.
pub const MAX_PANEL_CONTENT_BYTES: usize = 2 * 1024;

/// Maximum length of a panel id.
pub const MAX_PANEL_ID_LEN: usize = 32;

/// Where a panel is displayed in the client UI.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PanelPosition {
    Sidebar,
    Header,
    Overlay,
}

impl std::fmt::Display for PanelPosition {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            PanelPosition::Sidebar => "sidebar",
            PanelPosition::Header => "header",
            PanelPosition::Overlay => "overlay",
        };
        write!(f, "{s}")
    }
}

impl std::str::FromStr for PanelPosition {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "sidebar" => Ok(PanelPosition::Sidebar),
            "header" => Ok(PanelPosition::Header),
            "overlay" => Ok(PanelPosition::Overlay),
            other => Err(format!("unknown panel position: {other}")),
        }
    }
}

/// A GM-derived UI card shown alongside the narrative.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Panel {
    pub id: String,
    pub title: String,
    pub content: String,
    pub position: PanelPosition,
    pub priority: Option<String>,
    pub persistent: bool,
    pub created_at: DateTime<Utc>,
}

impl Panel {
    /// Validate and construct a panel, enforcing the content-size invariant.
    ///
    /// Id-shape and per-session count limits are enforced by the registry
    /// that owns the panel map, not here: this constructor only checks what
    /// is true of any valid panel in isolation.
    pub fn new(
        id: impl Into<String>,
        title: impl Into<String>,
        content: impl Into<String>,
        position: PanelPosition,
        priority: Option<String>,
        persistent: bool,
    ) -> Result<Self, DomainError> {
        let id = id.into();
        let content = content.into();

        if id.is_empty() || id.len() > MAX_PANEL_ID_LEN {
            return Err(DomainError::validation(format!(
                "panel id must be 1-{MAX_PANEL_ID_LEN} chars, got {}",
                id.len()
            )));
        }
        if content.len() > MAX_PANEL_CONTENT_BYTES {
            return Err(DomainError::validation(format!(
                "panel content exceeds {MAX_PANEL_CONTENT_BYTES} bytes"
            )));
        }

        Ok(Self {
            id,
            title: title.into(),
            content,
            position,
            priority,
            persistent,
            created_at: Utc::now(),
        })
    }
}
