extern crate self as taleforge_domain;

pub mod adventure;
pub mod error;
pub mod ids;
pub mod narrative;
pub mod panel;
pub mod theme;

pub use adventure::{Adventure, AdventureMetadata, CurrentScene, XpStyle};
pub use error::DomainError;
pub use ids::{AdventureId, EntryId, SessionToken};
pub use narrative::{EntryType, NarrativeEntry, NarrativeHistory, Summary};
pub use panel::{Panel, PanelPosition, MAX_ACTIVE_PANELS, MAX_PANEL_CONTENT_BYTES, MAX_PANEL_ID_LEN};
pub use theme::{Genre, Mood, Region, Theme};
