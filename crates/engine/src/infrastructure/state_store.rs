//! Adventure State Store (C3): load/persist adventure JSON and the
//! narrative log, with session-token authentication.

use std::path::{Path, PathBuf};

use taleforge_domain::{
    Adventure, AdventureId, AdventureMetadata, NarrativeEntry, NarrativeHistory, SessionToken,
    Theme, XpStyle,
};

use super::fs::{create_dir_all_restricted, read_if_exists, validate_adventure_id, write_atomic, FsError};

const STATE_FILE: &str = "state.json";
const HISTORY_FILE: &str = "history.json";

#[derive(Debug, thiserror::Error)]
pub enum StateStoreError {
    #[error("invalid adventure id")]
    InvalidId,
    #[error("adventure not found")]
    NotFound,
    #[error("adventure state is corrupted at {path}: {reason}")]
    Corrupted { path: PathBuf, reason: String },
    #[error("session token does not match")]
    InvalidToken,
    #[error(transparent)]
    Fs(#[from] FsError),
}

/// Persists and mediates access to one adventure's durable state.
///
/// Owned exclusively by the session that initialized it: the store does not
/// itself arbitrate concurrent writers (see the single-writer-per-adventure
/// policy), it only guarantees that whichever writer there is never leaves
/// the files half-written.
pub struct StateStore {
    adventures_dir: PathBuf,
}

impl StateStore {
    pub fn new(adventures_dir: impl Into<PathBuf>) -> Self {
        Self {
            adventures_dir: adventures_dir.into(),
        }
    }

    fn dir_for(&self, id: &AdventureId) -> PathBuf {
        self.adventures_dir.join(id.to_string())
    }

    /// Create a brand-new adventure with default scene/theme and empty
    /// history, and persist it immediately.
    pub fn create(&self) -> Result<AdventureHandle, StateStoreError> {
        let adventure = Adventure::new();
        let dir = self.dir_for(&adventure.id);
        create_dir_all_restricted(&dir)?;

        let history = NarrativeHistory::new();
        write_state(&dir, &adventure)?;
        write_history(&dir, &history)?;

        Ok(AdventureHandle {
            dir,
            adventure,
            history,
            compaction_pending: false,
        })
    }

    /// Load an existing adventure, authenticating `token` in constant time
    /// against the stored session token. Missing history is treated as
    /// empty; a malformed file of either kind is `Corrupted`.
    pub fn load(
        &self,
        id: &str,
        token: SessionToken,
    ) -> Result<AdventureHandle, StateStoreError> {
        validate_adventure_id(id).map_err(|_| StateStoreError::InvalidId)?;
        let dir = self.adventures_dir.join(id);

        let state_path = dir.join(STATE_FILE);
        let bytes = read_if_exists(&state_path)?.ok_or(StateStoreError::NotFound)?;
        let adventure: Adventure = serde_json::from_slice(&bytes).map_err(|e| StateStoreError::Corrupted {
            path: state_path.clone(),
            reason: e.to_string(),
        })?;

        if adventure.session_token != token {
            return Err(StateStoreError::InvalidToken);
        }

        let history_path = dir.join(HISTORY_FILE);
        let history = match read_if_exists(&history_path)? {
            None => NarrativeHistory::new(),
            Some(bytes) => serde_json::from_slice(&bytes).map_err(|e| StateStoreError::Corrupted {
                path: history_path.clone(),
                reason: e.to_string(),
            })?,
        };

        Ok(AdventureHandle {
            dir,
            adventure,
            history,
            compaction_pending: false,
        })
    }

    /// Read just `{id, createdAt, lastActiveAt, currentScene}` without
    /// validating any session token, for the public metadata endpoint.
    pub fn load_metadata(&self, id: &str) -> Result<AdventureMetadata, StateStoreError> {
        validate_adventure_id(id).map_err(|_| StateStoreError::InvalidId)?;
        let dir = self.adventures_dir.join(id);
        let state_path = dir.join(STATE_FILE);
        let bytes = read_if_exists(&state_path)?.ok_or(StateStoreError::NotFound)?;
        let adventure: Adventure = serde_json::from_slice(&bytes).map_err(|e| StateStoreError::Corrupted {
            path: state_path,
            reason: e.to_string(),
        })?;
        Ok(AdventureMetadata::from(&adventure))
    }
}

fn write_state(dir: &Path, adventure: &Adventure) -> Result<(), StateStoreError> {
    let bytes = serde_json::to_vec_pretty(adventure).expect("Adventure always serializes");
    write_atomic(&dir.join(STATE_FILE), &bytes)?;
    Ok(())
}

fn write_history(dir: &Path, history: &NarrativeHistory) -> Result<(), StateStoreError> {
    let bytes = serde_json::to_vec_pretty(history).expect("NarrativeHistory always serializes");
    write_atomic(&dir.join(HISTORY_FILE), &bytes)?;
    Ok(())
}

/// An in-memory, exclusively-owned view of one adventure's state, backed by
/// its on-disk files. Every mutator persists before returning.
pub struct AdventureHandle {
    dir: PathBuf,
    adventure: Adventure,
    history: NarrativeHistory,
    compaction_pending: bool,
}

impl AdventureHandle {
    pub fn adventure(&self) -> &Adventure {
        &self.adventure
    }

    pub fn history(&self) -> &NarrativeHistory {
        &self.history
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn append_history(&mut self, entry: NarrativeEntry) -> Result<(), StateStoreError> {
        self.history
            .append(entry)
            .map_err(|e| StateStoreError::Corrupted {
                path: self.dir.join(HISTORY_FILE),
                reason: e.to_string(),
            })?;
        write_history(&self.dir, &self.history)
    }

    pub fn replace_history(
        &mut self,
        entries: Vec<NarrativeEntry>,
        summary: Option<taleforge_domain::Summary>,
    ) -> Result<(), StateStoreError> {
        self.history.replace(entries, summary);
        write_history(&self.dir, &self.history)
    }

    pub fn update_scene(&mut self, description: String, location: String) -> Result<(), StateStoreError> {
        self.adventure.current_scene.description = description;
        self.adventure.current_scene.location = location;
        self.touch_and_persist()
    }

    pub fn update_theme(&mut self, theme: Theme) -> Result<(), StateStoreError> {
        self.adventure.current_theme = theme;
        self.touch_and_persist()
    }

    pub fn update_player_ref(&mut self, player_ref: Option<String>) -> Result<(), StateStoreError> {
        self.adventure.player_ref = player_ref;
        self.touch_and_persist()
    }

    pub fn update_world_ref(&mut self, world_ref: Option<String>) -> Result<(), StateStoreError> {
        self.adventure.world_ref = world_ref;
        self.touch_and_persist()
    }

    pub fn update_agent_session_id(&mut self, session_id: String) -> Result<(), StateStoreError> {
        self.adventure.agent_session_id = Some(session_id);
        self.touch_and_persist()
    }

    pub fn clear_agent_session_id(&mut self) -> Result<(), StateStoreError> {
        self.adventure.agent_session_id = None;
        self.touch_and_persist()
    }

    pub fn update_xp_style(&mut self, xp_style: XpStyle) -> Result<(), StateStoreError> {
        self.adventure.xp_style = Some(xp_style);
        self.touch_and_persist()
    }

    fn touch_and_persist(&mut self) -> Result<(), StateStoreError> {
        self.adventure.touch();
        write_state(&self.dir, &self.adventure)
    }

    /// Flag that the history should be compacted the next time the
    /// session's queue drains. Scheduling policy (when to set this) lives
    /// in the history compactor; the store only remembers the bit.
    pub fn mark_compaction_pending(&mut self, pending: bool) {
        self.compaction_pending = pending;
    }

    pub fn is_compaction_pending(&self) -> bool {
        self.compaction_pending
    }

    /// Clear the pending-compaction bit; called once the session has
    /// actually run a compaction pass.
    pub fn run_pending_compaction(&mut self) {
        self.compaction_pending = false;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use taleforge_domain::EntryType;
    use tempfile::tempdir;

    #[test]
    fn create_then_load_round_trips_modulo_last_active_at() {
        let dir = tempdir().unwrap();
        let store = StateStore::new(dir.path());
        let handle = store.create().unwrap();
        let id = handle.adventure().id;
        let token = handle.adventure().session_token;

        let loaded = store.load(&id.to_string(), token).unwrap();
        assert_eq!(loaded.adventure().id, id);
        assert_eq!(loaded.adventure().session_token, token);
        assert_eq!(loaded.adventure().current_scene, handle.adventure().current_scene);
    }

    #[test]
    fn load_rejects_wrong_token() {
        let dir = tempdir().unwrap();
        let store = StateStore::new(dir.path());
        let handle = store.create().unwrap();
        let id = handle.adventure().id.to_string();

        let wrong = SessionToken::new();
        let result = store.load(&id, wrong);
        assert!(matches!(result, Err(StateStoreError::InvalidToken)));
    }

    #[test]
    fn load_missing_adventure_is_not_found() {
        let dir = tempdir().unwrap();
        let store = StateStore::new(dir.path());
        let result = store.load(&AdventureId::new().to_string(), SessionToken::new());
        assert!(matches!(result, Err(StateStoreError::NotFound)));
    }

    #[test]
    fn load_rejects_traversal_attempt() {
        let dir = tempdir().unwrap();
        let store = StateStore::new(dir.path());
        let result = store.load("../etc", SessionToken::new());
        assert!(matches!(result, Err(StateStoreError::InvalidId)));
    }

    #[test]
    fn append_history_persists_and_enforces_order() {
        let dir = tempdir().unwrap();
        let store = StateStore::new(dir.path());
        let mut handle = store.create().unwrap();

        handle
            .append_history(NarrativeEntry::new(EntryType::PlayerInput, "hi"))
            .unwrap();
        assert_eq!(handle.history().len(), 1);

        let id = handle.adventure().id.to_string();
        let token = handle.adventure().session_token;
        let reloaded = store.load(&id, token).unwrap();
        assert_eq!(reloaded.history().len(), 1);
    }

    #[test]
    fn missing_history_file_loads_as_empty() {
        let dir = tempdir().unwrap();
        let store = StateStore::new(dir.path());
        let handle = store.create().unwrap();
        let id = handle.adventure().id.to_string();
        let token = handle.adventure().session_token;

        std::fs::remove_file(handle.dir().join(HISTORY_FILE)).unwrap();
        let reloaded = store.load(&id, token).unwrap();
        assert!(reloaded.history().is_empty());
    }

    #[test]
    fn load_metadata_requires_no_token() {
        let dir = tempdir().unwrap();
        let store = StateStore::new(dir.path());
        let handle = store.create().unwrap();
        let meta = store.load_metadata(&handle.adventure().id.to_string()).unwrap();
        assert_eq!(meta.id, handle.adventure().id);
    }
}
