//! Character/World Managers (C11): CRUD on `players/<slug>/` and
//! `worlds/<slug>/` template trees under the project directory.

use std::path::{Path, PathBuf};

use super::fs::{
    create_dir_all_restricted, generate_slug, safe_resolve, validate_slug, write_atomic, FsError,
};

#[derive(Debug, thiserror::Error)]
pub enum EntityManagerError {
    #[error("invalid slug")]
    InvalidSlug,
    #[error(transparent)]
    Fs(#[from] FsError),
}

/// Which entity kind an [`EntityManager`] governs: determines the template
/// file set and the subdirectory name under the project root.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntityKind {
    Player,
    World,
}

impl EntityKind {
    fn subdir(self) -> &'static str {
        match self {
            EntityKind::Player => "players",
            EntityKind::World => "worlds",
        }
    }

    /// `(file name, initial content)` pairs written for a freshly created
    /// entity directory. Content is a fixed template, not player-authored.
    fn templates(self) -> &'static [(&'static str, &'static str)] {
        match self {
            EntityKind::Player => &[
                ("sheet.md", "# Unnamed Adventurer\n\n## Stats\n\n## Inventory\n"),
                ("state.md", "# Current State\n\nNo notable state yet.\n"),
            ],
            EntityKind::World => &[
                ("world_state.md", "# World State\n\nNo notable state yet.\n"),
                ("locations.md", "# Locations\n\nNo locations recorded yet.\n"),
                ("characters.md", "# Characters\n\nNo characters recorded yet.\n"),
                ("quests.md", "# Quests\n\nNo quests recorded yet.\n"),
                ("art-style.md", "# Art Style\n\nNo art style recorded yet.\n"),
            ],
        }
    }
}

/// A display name plus the slug it was derived from, as returned by `list()`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntitySummary {
    pub slug: String,
    pub display_name: String,
}

/// CRUD over one entity kind's subtree (`players/` or `worlds/`) beneath a
/// project directory. Every mutation goes through the atomic file store;
/// every path is validated before it touches disk.
pub struct EntityManager {
    kind: EntityKind,
    root: PathBuf,
}

impl EntityManager {
    pub fn new(project_dir: &Path, kind: EntityKind) -> Self {
        Self {
            kind,
            root: project_dir.join(kind.subdir()),
        }
    }

    /// Create a new entity with a freshly generated, collision-free slug.
    pub fn create(&self, name: &str) -> Result<String, EntityManagerError> {
        create_dir_all_restricted(&self.root)?;
        let slug = generate_slug(name, &self.root);
        self.write_templates(&slug)?;
        Ok(slug)
    }

    /// Create at an explicit slug with no collision probing, for restoring
    /// a previously saved reference whose directory is missing on disk.
    pub fn create_at_slug(&self, slug: &str) -> Result<(), EntityManagerError> {
        validate_slug(slug).map_err(|_| EntityManagerError::InvalidSlug)?;
        create_dir_all_restricted(&self.root)?;
        self.write_templates(slug)
    }

    fn write_templates(&self, slug: &str) -> Result<(), EntityManagerError> {
        let dir = self
            .root
            .join(slug);
        create_dir_all_restricted(&dir)?;
        for (name, content) in self.kind.templates() {
            write_atomic(&dir.join(name), content.as_bytes())?;
        }
        Ok(())
    }

    /// Whether `slug` names an existing, path-safe entity directory.
    pub fn exists(&self, slug: &str) -> bool {
        match safe_resolve(&self.root, slug) {
            Some(path) => path.is_dir(),
            None => false,
        }
    }

    /// The relative reference string (`players/<slug>` or `worlds/<slug>`)
    /// for `slug`, or `None` if the slug is invalid.
    pub fn get_ref(&self, slug: &str) -> Option<String> {
        if validate_slug(slug).is_err() {
            return None;
        }
        Some(format!("{}/{}", self.kind.subdir(), slug))
    }

    /// List every valid-slug subdirectory, reading a display name from the
    /// first `# H1` of `sheet.md` when present (falling back to the slug).
    /// Hidden and invalid entries are skipped. Players sort by slug; worlds
    /// sort by display name.
    pub fn list(&self) -> Vec<EntitySummary> {
        let mut out = Vec::new();
        let Ok(read_dir) = std::fs::read_dir(&self.root) else {
            return out;
        };
        for entry in read_dir.flatten() {
            let Ok(file_type) = entry.file_type() else {
                continue;
            };
            if !file_type.is_dir() {
                continue;
            }
            let slug = entry.file_name().to_string_lossy().to_string();
            if slug.starts_with('.') || validate_slug(&slug).is_err() {
                continue;
            }
            let display_name = self.display_name_for(&slug).unwrap_or_else(|| slug.clone());
            out.push(EntitySummary { slug, display_name });
        }

        match self.kind {
            EntityKind::Player => out.sort_by(|a, b| a.slug.cmp(&b.slug)),
            EntityKind::World => out.sort_by(|a, b| a.display_name.cmp(&b.display_name)),
        }
        out
    }

    fn display_name_for(&self, slug: &str) -> Option<String> {
        let sheet_path = self.root.join(slug).join("sheet.md");
        let contents = std::fs::read_to_string(sheet_path).ok()?;
        contents.lines().find_map(|line| {
            line.strip_prefix("# ").map(|rest| rest.trim().to_string())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn create_writes_fixed_template_files() {
        let dir = tempdir().unwrap();
        let manager = EntityManager::new(dir.path(), EntityKind::Player);
        let slug = manager.create("Sir Reginald").unwrap();
        assert_eq!(slug, "sir-reginald");
        assert!(dir.path().join("players/sir-reginald/sheet.md").exists());
        assert!(dir.path().join("players/sir-reginald/state.md").exists());
    }

    #[test]
    fn world_create_writes_five_templates() {
        let dir = tempdir().unwrap();
        let manager = EntityManager::new(dir.path(), EntityKind::World);
        let slug = manager.create("Eldoria").unwrap();
        for file in ["world_state.md", "locations.md", "characters.md", "quests.md", "art-style.md"] {
            assert!(dir.path().join("worlds").join(&slug).join(file).exists());
        }
    }

    #[test]
    fn get_ref_rejects_traversal_slug() {
        let dir = tempdir().unwrap();
        let manager = EntityManager::new(dir.path(), EntityKind::Player);
        assert!(manager.get_ref("../../etc").is_none());
        assert_eq!(manager.get_ref("bob").unwrap(), "players/bob");
    }

    #[test]
    fn list_reads_display_name_from_sheet_h1() {
        let dir = tempdir().unwrap();
        let manager = EntityManager::new(dir.path(), EntityKind::Player);
        manager.create_at_slug("bob").unwrap();
        write_atomic(
            &dir.path().join("players/bob/sheet.md"),
            b"# Bob the Brave\n\nStats here.\n",
        )
        .unwrap();

        let list = manager.list();
        assert_eq!(list.len(), 1);
        assert_eq!(list[0].display_name, "Bob the Brave");
    }

    #[test]
    fn list_skips_hidden_and_invalid_entries() {
        let dir = tempdir().unwrap();
        let manager = EntityManager::new(dir.path(), EntityKind::Player);
        manager.create_at_slug("bob").unwrap();
        create_dir_all_restricted(&dir.path().join("players/.hidden")).unwrap();

        let list = manager.list();
        assert_eq!(list.len(), 1);
        assert_eq!(list[0].slug, "bob");
    }

    #[test]
    fn create_at_slug_skips_collision_probing() {
        let dir = tempdir().unwrap();
        let manager = EntityManager::new(dir.path(), EntityKind::Player);
        manager.create_at_slug("fixed-slug").unwrap();
        assert!(manager.exists("fixed-slug"));
    }
}
