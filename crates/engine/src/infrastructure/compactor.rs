//! History Compactor (C10): collapses the archivable prefix of a narrative
//! history into a rolling summary, writing the archived entries to a
//! rotating archive file. Never loses data on failure — callers retain the
//! original history unless `compact` reports success.

use std::path::{Path, PathBuf};

use chrono::Utc;

use taleforge_domain::{NarrativeEntry, Summary};

use super::agent::{AgentError, AgentPort};
use super::fs::write_atomic;

/// Cut-point policy: the retained tail must have at least `retained_count`
/// entries *and* at most `target_retained_char_count` characters — whichever
/// constraint is more restrictive wins.
#[derive(Debug, Clone, Copy)]
pub struct CompactionConfig {
    pub retained_count: usize,
    pub target_retained_char_count: usize,
}

#[derive(Debug, Clone)]
pub struct CompactionSuccess {
    pub archive_path: Option<PathBuf>,
    pub entries_archived: usize,
    pub retained_entries: Vec<NarrativeEntry>,
    pub summary: Option<Summary>,
}

#[derive(Debug, Clone)]
pub struct CompactionFailure {
    pub error: String,
}

pub type CompactionResult = Result<CompactionSuccess, CompactionFailure>;

/// Find the smallest suffix of `entries` that satisfies both the
/// minimum-count and maximum-chars constraints. Returns the cut index: the
/// number of leading entries that should be archived.
fn cut_point(entries: &[NarrativeEntry], config: CompactionConfig) -> usize {
    let len = entries.len();
    if len <= config.retained_count {
        return 0;
    }

    let mut retained_chars = 0usize;
    let mut retained_count = 0usize;
    let mut cut = len;

    for entry in entries.iter().rev() {
        let next_chars = retained_chars + entry.content.len();
        let next_count = retained_count + 1;
        if retained_count >= config.retained_count && next_chars > config.target_retained_char_count {
            break;
        }
        retained_chars = next_chars;
        retained_count = next_count;
        cut -= 1;
    }

    cut
}

fn archive_file_name() -> String {
    format!("history-archive-{}.json", Utc::now().to_rfc3339())
}

#[derive(serde::Serialize)]
struct ArchivePayload<'a> {
    archived_entries: &'a [NarrativeEntry],
    previous_summary: &'a Option<Summary>,
}

fn build_compaction_prompt(archived: &[NarrativeEntry], previous_summary: &Option<Summary>) -> String {
    let mut prompt = String::new();
    prompt.push_str(
        "Summarize the following narrative history into a concise recap a returning \
         player could use to reorient themselves. Preserve important names, decisions \
         and unresolved threads.\n\n",
    );
    if let Some(summary) = previous_summary {
        prompt.push_str("Previous summary:\n");
        prompt.push_str(&summary.text);
        prompt.push_str("\n\n");
    }
    prompt.push_str("Entries to fold into the summary:\n");
    for entry in archived {
        prompt.push_str(&format!("- ({:?}) {}\n", entry.entry_type, entry.content));
    }
    prompt
}

const COMPACTION_SYSTEM_PROMPT: &str =
    "You are compacting an interactive text adventure's narrative history into a \
     short, faithful summary. Respond with only the summary text.";

/// Run one compaction pass. On any failure (agent call, archive write),
/// returns `Err` and the caller must retain the original history unchanged.
pub async fn compact(
    agent: &dyn AgentPort,
    adventure_dir: &Path,
    entries: Vec<NarrativeEntry>,
    previous_summary: Option<Summary>,
    config: CompactionConfig,
) -> CompactionResult {
    let cut = cut_point(&entries, config);

    if cut == 0 {
        return Ok(CompactionSuccess {
            archive_path: None,
            entries_archived: 0,
            retained_entries: entries,
            summary: previous_summary,
        });
    }

    let (archived, retained) = entries.split_at(cut);
    let retained_entries = retained.to_vec();

    let prompt = build_compaction_prompt(archived, &previous_summary);
    let summary_text = match agent.generate_once(&prompt, COMPACTION_SYSTEM_PROMPT).await {
        Ok(text) => text,
        Err(AgentError::RateLimit(msg))
        | Err(AgentError::Auth(msg))
        | Err(AgentError::Server(msg))
        | Err(AgentError::InvalidRequest(msg))
        | Err(AgentError::Transport(msg)) => {
            return Err(CompactionFailure {
                error: format!("compaction summary call failed: {msg}"),
            });
        }
    };

    let covering_entry_ids = archived.iter().map(|entry| entry.id).collect();
    let summary = Summary {
        text: summary_text,
        covering_entry_ids,
    };

    let archive_path = adventure_dir.join(archive_file_name());
    let payload = ArchivePayload {
        archived_entries: archived,
        previous_summary: &previous_summary,
    };
    let bytes = match serde_json::to_vec_pretty(&payload) {
        Ok(bytes) => bytes,
        Err(e) => {
            return Err(CompactionFailure {
                error: format!("could not serialize archive payload: {e}"),
            })
        }
    };
    if let Err(e) = write_atomic(&archive_path, &bytes) {
        return Err(CompactionFailure {
            error: format!("could not write archive file: {e}"),
        });
    }

    Ok(CompactionSuccess {
        archive_path: Some(archive_path),
        entries_archived: archived.len(),
        retained_entries,
        summary: Some(summary),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::agent::mock::MockAgentClient;
    use taleforge_domain::EntryType;
    use tempfile::tempdir;

    fn entry(content: &str) -> NarrativeEntry {
        NarrativeEntry::new(EntryType::PlayerInput, content)
    }

    #[test]
    fn cut_point_respects_retained_count_over_chars() {
        let entries: Vec<_> = (0..5).map(|i| entry(&format!("entry {i}"))).collect();
        let config = CompactionConfig {
            retained_count: 2,
            target_retained_char_count: 0,
        };
        assert_eq!(cut_point(&entries, config), 3);
    }

    #[test]
    fn cut_point_zero_when_under_retained_count() {
        let entries: Vec<_> = (0..2).map(|i| entry(&format!("entry {i}"))).collect();
        let config = CompactionConfig {
            retained_count: 5,
            target_retained_char_count: 100,
        };
        assert_eq!(cut_point(&entries, config), 0);
    }

    #[tokio::test]
    async fn no_archiving_needed_returns_all_retained() {
        let dir = tempdir().unwrap();
        let mock = MockAgentClient::new();
        let entries = vec![entry("only one")];
        let result = compact(
            &mock,
            dir.path(),
            entries.clone(),
            None,
            CompactionConfig {
                retained_count: 10,
                target_retained_char_count: 10_000,
            },
        )
        .await
        .unwrap();
        assert_eq!(result.entries_archived, 0);
        assert_eq!(result.retained_entries, entries);
        assert!(result.archive_path.is_none());
    }

    #[tokio::test]
    async fn archiving_writes_file_and_retains_nothing_with_zero_config() {
        let dir = tempdir().unwrap();
        let mock = MockAgentClient::new();
        mock.push_one_shot("A brief summary of the adventure so far.").await;
        let entries: Vec<_> = (0..12).map(|i| entry(&format!("entry {i}"))).collect();

        let result = compact(
            &mock,
            dir.path(),
            entries,
            None,
            CompactionConfig {
                retained_count: 0,
                target_retained_char_count: 0,
            },
        )
        .await
        .unwrap();

        assert_eq!(result.entries_archived, 12);
        assert!(result.retained_entries.is_empty());
        assert!(result.summary.is_some());
        assert!(result.archive_path.unwrap().exists());
    }
}
