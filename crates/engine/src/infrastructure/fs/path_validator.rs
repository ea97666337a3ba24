//! Path & Slug Validator (C1).
//!
//! Every filesystem mutation reachable from a session goes through
//! [`safe_resolve`] first; nothing in this module touches disk itself.

use std::path::{Path, PathBuf};

/// Why an adventure id or slug was rejected.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    #[error("identifier is empty or whitespace-only")]
    Empty,
    #[error("identifier contains a null byte")]
    NullByte,
    #[error("identifier contains a path separator")]
    PathSeparator,
    #[error("identifier contains '.' or '..'")]
    DotSegment,
}

fn decoded_variants(s: &str) -> Vec<String> {
    // Defends against `%2e%2e`, `%2f`, etc. smuggling a traversal sequence
    // past a naive literal check.
    let mut out = vec![s.to_string()];
    if let Ok(decoded) = percent_decode(s) {
        if decoded != s {
            out.push(decoded);
        }
    }
    out
}

fn percent_decode(s: &str) -> Result<String, ()> {
    let bytes = s.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'%' && i + 2 < bytes.len() {
            let hex = std::str::from_utf8(&bytes[i + 1..i + 3]).map_err(|_| ())?;
            let byte = u8::from_str_radix(hex, 16).map_err(|_| ())?;
            out.push(byte);
            i += 3;
        } else {
            out.push(bytes[i]);
            i += 1;
        }
    }
    String::from_utf8(out).map_err(|_| ())
}

fn check_basic(candidate: &str) -> Result<(), ValidationError> {
    if candidate.trim().is_empty() {
        return Err(ValidationError::Empty);
    }
    if candidate.contains('\0') {
        return Err(ValidationError::NullByte);
    }
    if candidate.contains('/') || candidate.contains('\\') {
        return Err(ValidationError::PathSeparator);
    }
    if candidate == "." || candidate == ".." {
        return Err(ValidationError::DotSegment);
    }
    Ok(())
}

/// Validate an adventure id: rejects empty/whitespace, null bytes, path
/// separators, `.`/`..`, and percent-decoded variants of any of those.
pub fn validate_adventure_id(id: &str) -> Result<(), ValidationError> {
    for variant in decoded_variants(id) {
        check_basic(&variant)?;
    }
    Ok(())
}

/// Validate a player/world slug: the adventure-id rules, plus rejecting any
/// `..` substring anywhere (not just as a whole segment).
pub fn validate_slug(slug: &str) -> Result<(), ValidationError> {
    for variant in decoded_variants(slug) {
        check_basic(&variant)?;
        if variant.contains("..") {
            return Err(ValidationError::DotSegment);
        }
    }
    Ok(())
}

/// Resolve `id` under `base`, returning `None` unless the result lexically
/// resolves to a path directly inside `base` (no `..` escape, no absolute
/// override). Purely lexical: does not touch the filesystem, so it works
/// for paths that don't exist yet.
pub fn safe_resolve(base: &Path, id: &str) -> Option<PathBuf> {
    if validate_adventure_id(id).is_err() {
        return None;
    }
    let candidate = base.join(id);
    let base = normalize(base);
    let candidate = normalize(&candidate);
    if candidate.starts_with(&base) && candidate != base {
        Some(candidate)
    } else {
        None
    }
}

/// Purely lexical normalization (no symlink resolution, no disk access):
/// collapses `.` segments and rejects would-be `..` escapes by construction,
/// since callers only ever reach this after a single-segment validation.
fn normalize(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        use std::path::Component;
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                out.pop();
            }
            other => out.push(other),
        }
    }
    out
}

/// Derive a filesystem-safe slug from a human-entered name.
///
/// Lowercases, maps any run of non-`[a-z0-9]` characters to a single `-`,
/// trims leading/trailing `-`, truncates to 64 chars, falls back to
/// `"unnamed"` if that leaves nothing, then probes `existing_dir` for a
/// free name by appending `-2`, `-3`, … .
pub fn generate_slug(name: &str, existing_dir: &Path) -> String {
    let mut slug = String::with_capacity(name.len());
    let mut last_was_dash = false;
    for ch in name.to_lowercase().chars() {
        if ch.is_ascii_alphanumeric() {
            slug.push(ch);
            last_was_dash = false;
        } else if !last_was_dash {
            slug.push('-');
            last_was_dash = true;
        }
    }
    let slug = slug.trim_matches('-');
    let mut slug: String = slug.chars().take(64).collect();
    let slug = slug.trim_end_matches('-').to_string();
    if slug.is_empty() {
        slug = "unnamed".to_string();
    }

    if !existing_dir.join(&slug).exists() {
        return slug;
    }
    let mut n = 2u32;
    loop {
        let candidate = format!("{slug}-{n}");
        if !existing_dir.join(&candidate).exists() {
            return candidate;
        }
        n += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn rejects_empty_and_dot_segments() {
        assert!(validate_adventure_id("").is_err());
        assert!(validate_adventure_id("   ").is_err());
        assert!(validate_adventure_id(".").is_err());
        assert!(validate_adventure_id("..").is_err());
    }

    #[test]
    fn rejects_path_separators_and_percent_encoded_variants() {
        assert!(validate_adventure_id("a/b").is_err());
        assert!(validate_adventure_id("a\\b").is_err());
        assert!(validate_adventure_id("%2e%2e").is_err());
        assert!(validate_adventure_id("%2f").is_err());
    }

    #[test]
    fn slug_rejects_embedded_dotdot() {
        assert!(validate_slug("foo..bar").is_err());
        assert!(validate_slug("foo").is_ok());
    }

    #[test]
    fn safe_resolve_stays_within_base() {
        let dir = tempdir().unwrap();
        let resolved = safe_resolve(dir.path(), "abc-123").unwrap();
        assert!(resolved.starts_with(dir.path()));
    }

    #[test]
    fn safe_resolve_rejects_traversal() {
        let dir = tempdir().unwrap();
        assert!(safe_resolve(dir.path(), "../escape").is_none());
    }

    #[test]
    fn generate_slug_collapses_and_lowercases() {
        let dir = tempdir().unwrap();
        let slug = generate_slug("Sir Reginald!! The  Bold", dir.path());
        assert_eq!(slug, "sir-reginald-the-bold");
    }

    #[test]
    fn generate_slug_probes_for_free_name() {
        let dir = tempdir().unwrap();
        std::fs::create_dir(dir.path().join("bob")).unwrap();
        std::fs::create_dir(dir.path().join("bob-2")).unwrap();
        let slug = generate_slug("Bob", dir.path());
        assert_eq!(slug, "bob-3");
    }

    #[test]
    fn generate_slug_falls_back_to_unnamed() {
        let dir = tempdir().unwrap();
        let slug = generate_slug("!!!", dir.path());
        assert_eq!(slug, "unnamed");
    }
}
