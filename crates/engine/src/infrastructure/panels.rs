//! Panel Registry + File Hook (C6).
//!
//! The registry is a per-session map owned exclusively by the session; the
//! file hook derives panel lifecycle events from the agent's own file
//! writes/deletes under `<playerRef>/panels/`, observed via the agent
//! client's post-tool hook.

use std::collections::HashMap;
use std::path::Path;

use chrono::{DateTime, Utc};

use taleforge_domain::{Panel, PanelPosition, MAX_ACTIVE_PANELS};

use super::fs::{path_validator::validate_slug, read_if_exists};

/// What the file hook observed and wants the session to tell the client.
#[derive(Debug, Clone, PartialEq)]
pub enum PanelEvent {
    Create(Panel),
    Update { id: String, content: String },
    Dismiss { id: String },
}

/// Owns the live panel set for one session. All mutation goes through this
/// type so the size cap and id-uniqueness invariants hold everywhere.
#[derive(Debug, Default)]
pub struct PanelRegistry {
    panels: HashMap<String, Panel>,
}

impl PanelRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.panels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.panels.is_empty()
    }

    pub fn contains(&self, id: &str) -> bool {
        self.panels.contains_key(id)
    }

    pub fn get(&self, id: &str) -> Option<&Panel> {
        self.panels.get(id)
    }

    pub fn ids(&self) -> impl Iterator<Item = &String> {
        self.panels.keys()
    }

    pub fn values(&self) -> impl Iterator<Item = &Panel> {
        self.panels.values()
    }

    /// Insert or replace a created-from-tool-call panel. Rejects once the
    /// registry is at capacity and the id is new.
    pub fn create(&mut self, panel: Panel) -> Result<(), &'static str> {
        if !self.panels.contains_key(&panel.id) && self.panels.len() >= MAX_ACTIVE_PANELS {
            return Err("panel limit reached");
        }
        self.panels.insert(panel.id.clone(), panel);
        Ok(())
    }

    pub fn update_content(&mut self, id: &str, content: String) -> Result<(), &'static str> {
        let panel = self.panels.get_mut(id).ok_or("panel not found")?;
        panel.content = content;
        Ok(())
    }

    pub fn dismiss(&mut self, id: &str) -> Option<Panel> {
        self.panels.remove(id)
    }
}

/// Strict, hand-rolled front-matter parser: key:value pairs up to a closing
/// `---` line. Deliberately not a general YAML parser — the schema is
/// small and fixed (spec.md §9 "Panel file parsing").
#[derive(Debug, Clone, PartialEq)]
struct FrontMatter {
    title: String,
    position: PanelPosition,
    priority: Option<String>,
    body: String,
}

fn parse_front_matter(contents: &str) -> Result<FrontMatter, String> {
    let mut lines = contents.lines();
    match lines.next() {
        Some("---") => {}
        _ => return Err("missing opening `---` front-matter delimiter".to_string()),
    }

    let mut title: Option<String> = None;
    let mut position: Option<String> = None;
    let mut priority: Option<String> = None;
    let mut closed = false;
    let mut consumed = 1; // the opening `---`

    for line in lines.by_ref() {
        consumed += 1;
        if line == "---" {
            closed = true;
            break;
        }
        let Some((key, value)) = line.split_once(':') else {
            return Err(format!("malformed front-matter line: {line:?}"));
        };
        let key = key.trim();
        let value = value.trim().trim_matches('"').to_string();
        match key {
            "title" => title = Some(value),
            "position" => position = Some(value),
            "priority" => priority = Some(value),
            _ => {} // unknown keys are ignored, not rejected
        }
    }

    if !closed {
        return Err("missing closing `---` front-matter delimiter".to_string());
    }

    let title = title.ok_or("front-matter missing required `title`")?;
    let position_raw = position.ok_or("front-matter missing required `position`")?;
    let position: PanelPosition = position_raw
        .parse()
        .map_err(|_| format!("invalid `position`: {position_raw}"))?;

    let body = contents
        .lines()
        .skip(consumed)
        .collect::<Vec<_>>()
        .join("\n")
        .trim()
        .to_string();

    Ok(FrontMatter {
        title,
        position,
        priority,
        body,
    })
}

/// Derive the panel id from a `panels/<id>.md` file path. `None` if the
/// path doesn't match the panel-file shape or the stem isn't a valid slug.
pub fn panel_id_from_path(path: &str) -> Option<String> {
    let path = Path::new(path);
    if path.extension().and_then(|e| e.to_str()) != Some("md") {
        return None;
    }
    if path.parent().and_then(|p| p.file_name()).and_then(|n| n.to_str()) != Some("panels") {
        return None;
    }
    let stem = path.file_stem()?.to_str()?.to_string();
    validate_slug(&stem).ok()?;
    Some(stem)
}

fn birth_time_or_now(path: &Path) -> DateTime<Utc> {
    std::fs::metadata(path)
        .and_then(|m| m.created())
        .map(DateTime::<Utc>::from)
        .unwrap_or_else(|_| Utc::now())
}

/// React to a `Write`-shaped tool call: if `file_path` is a panel file
/// under `panels/`, read and validate its front-matter and return the
/// resulting create/update event, or a validation-error string destined
/// for the *next* GM system prompt (spec.md §4.6).
pub fn handle_write(
    registry: &mut PanelRegistry,
    file_path: &str,
) -> Result<Option<PanelEvent>, String> {
    let Some(id) = panel_id_from_path(file_path) else {
        return Ok(None);
    };

    let path = Path::new(file_path);
    let contents = read_if_exists(path)
        .map_err(|e| format!("could not read panel file {file_path}: {e}"))?
        .ok_or_else(|| format!("panel file {file_path} disappeared before it could be read"))?;
    let contents = String::from_utf8_lossy(&contents).to_string();

    let front_matter = parse_front_matter(&contents)
        .map_err(|e| format!("invalid panel front-matter in {file_path}: {e}"))?;

    if registry.contains(&id) {
        registry
            .update_content(&id, front_matter.body.clone())
            .map_err(|e| e.to_string())?;
        Ok(Some(PanelEvent::Update {
            id,
            content: front_matter.body,
        }))
    } else {
        let mut panel = Panel::new(
            id,
            front_matter.title,
            front_matter.body,
            front_matter.position,
            front_matter.priority,
            true,
        )
        .map_err(|e| e.to_string())?;
        panel.created_at = birth_time_or_now(path);
        registry.create(panel.clone()).map_err(|e| e.to_string())?;
        Ok(Some(PanelEvent::Create(panel)))
    }
}

/// Suspicious-Bash-command detection: a command mentioning `rm`, `delete`
/// or `mv` against a `panels/` path, or anything hinting at bulk deletion
/// under `panels/` (e.g. `find ... -delete`). Heuristic by design (spec.md
/// §9 open question).
pub fn is_suspicious_bash(command: &str) -> bool {
    let lower = command.to_lowercase();
    let mentions_panels = lower.contains("panels/");
    if !mentions_panels {
        return false;
    }
    lower.contains("rm ")
        || lower.contains("rm\t")
        || lower.starts_with("rm ")
        || lower.contains("delete")
        || lower.contains(" mv ")
        || lower.starts_with("mv ")
        || lower.contains("-delete")
}

/// Try to lexically extract an `rm <path>`-style single target referencing
/// a panel file from a Bash command.
fn rm_target_panel_id(command: &str) -> Option<String> {
    for token in command.split_whitespace() {
        if let Some(id) = panel_id_from_path(token) {
            return Some(id);
        }
    }
    None
}

/// React to a suspicious Bash tool call: dismiss the exact panel named in
/// an `rm`-shaped command (if any), then verify every other known panel
/// file still exists on disk, emitting a dismiss for any that vanished —
/// this is what catches `rm -rf`, `find -delete`, `mv panels/…` and
/// similar bulk operations the lexical parse above can't target precisely.
pub fn handle_suspicious_bash(
    registry: &mut PanelRegistry,
    command: &str,
    playerref_panels_dir: &Path,
) -> Vec<PanelEvent> {
    let mut events = Vec::new();

    if let Some(id) = rm_target_panel_id(command) {
        if registry.dismiss(&id).is_some() {
            events.push(PanelEvent::Dismiss { id });
        }
    }

    let vanished: Vec<String> = registry
        .ids()
        .filter(|id| !playerref_panels_dir.join(format!("{id}.md")).exists())
        .cloned()
        .collect();
    for id in vanished {
        if registry.dismiss(&id).is_some() {
            events.push(PanelEvent::Dismiss { id });
        }
    }

    events
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn panel_id_from_path_matches_panels_dir_md_files() {
        assert_eq!(
            panel_id_from_path("players/test-hero/panels/weather.md"),
            Some("weather".to_string())
        );
        assert_eq!(panel_id_from_path("players/test-hero/sheet.md"), None);
        assert_eq!(panel_id_from_path("players/test-hero/panels/weather.txt"), None);
    }

    #[test]
    fn parse_front_matter_extracts_required_fields() {
        let content = "---\ntitle: Weather Status\nposition: sidebar\npriority: medium\n---\nClear";
        let parsed = parse_front_matter(content).unwrap();
        assert_eq!(parsed.title, "Weather Status");
        assert_eq!(parsed.position, PanelPosition::Sidebar);
        assert_eq!(parsed.priority.as_deref(), Some("medium"));
        assert_eq!(parsed.body, "Clear");
    }

    #[test]
    fn parse_front_matter_rejects_missing_title() {
        let content = "---\nposition: sidebar\n---\nbody";
        assert!(parse_front_matter(content).is_err());
    }

    #[test]
    fn parse_front_matter_rejects_unclosed_block() {
        let content = "---\ntitle: X\nposition: sidebar\nbody without closing delimiter";
        assert!(parse_front_matter(content).is_err());
    }

    #[test]
    fn lifecycle_create_update_dismiss() {
        let dir = tempdir().unwrap();
        let panels_dir = dir.path().join("players/test-hero/panels");
        std::fs::create_dir_all(&panels_dir).unwrap();
        let file = panels_dir.join("weather.md");

        let mut registry = PanelRegistry::new();

        std::fs::write(&file, "---\ntitle: Weather Status\nposition: sidebar\npriority: medium\n---\nClear").unwrap();
        let event = handle_write(&mut registry, file.to_str().unwrap()).unwrap().unwrap();
        assert!(matches!(event, PanelEvent::Create(ref p) if p.id == "weather" && p.content == "Clear"));
        assert_eq!(registry.len(), 1);

        std::fs::write(&file, "---\ntitle: Weather Status\nposition: sidebar\npriority: medium\n---\nStorm").unwrap();
        let event = handle_write(&mut registry, file.to_str().unwrap()).unwrap().unwrap();
        assert!(matches!(event, PanelEvent::Update { ref id, ref content } if id == "weather" && content == "Storm"));

        std::fs::remove_file(&file).unwrap();
        let events = handle_suspicious_bash(
            &mut registry,
            "rm players/test-hero/panels/weather.md",
            &panels_dir,
        );
        assert_eq!(events, vec![PanelEvent::Dismiss { id: "weather".to_string() }]);
        assert!(registry.is_empty());
    }

    #[test]
    fn capacity_is_enforced() {
        let mut registry = PanelRegistry::new();
        for i in 0..MAX_ACTIVE_PANELS {
            let panel = Panel::new(format!("p{i}"), "T", "c", PanelPosition::Sidebar, None, true).unwrap();
            registry.create(panel).unwrap();
        }
        let extra = Panel::new("overflow", "T", "c", PanelPosition::Sidebar, None, true).unwrap();
        assert!(registry.create(extra).is_err());
    }

    #[test]
    fn is_suspicious_bash_detects_rm_delete_mv_under_panels() {
        assert!(is_suspicious_bash("rm players/hero/panels/weather.md"));
        assert!(is_suspicious_bash("find players/hero/panels -delete"));
        assert!(is_suspicious_bash("mv players/hero/panels/weather.md /tmp"));
        assert!(!is_suspicious_bash("rm players/hero/sheet.md"));
        assert!(!is_suspicious_bash("ls players/hero/panels"));
    }

    #[test]
    fn bulk_deletion_is_caught_by_reconciliation_not_lexical_parse() {
        let dir = tempdir().unwrap();
        let panels_dir = dir.path().join("players/test-hero/panels");
        std::fs::create_dir_all(&panels_dir).unwrap();
        let file = panels_dir.join("weather.md");
        std::fs::write(&file, "---\ntitle: W\nposition: sidebar\n---\nClear").unwrap();

        let mut registry = PanelRegistry::new();
        handle_write(&mut registry, file.to_str().unwrap()).unwrap();

        std::fs::remove_dir_all(&panels_dir).unwrap();
        let events = handle_suspicious_bash(&mut registry, "rm -rf players/test-hero/panels", &panels_dir);
        assert_eq!(events, vec![PanelEvent::Dismiss { id: "weather".to_string() }]);
    }
}
