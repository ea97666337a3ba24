//! Append-only narrative history and its rolling summary.

use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::DomainError;
use crate::ids::EntryId;

/// Whether a history entry came from the player or the GM.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntryType {
    PlayerInput,
    GmResponse,
}

/// A single entry in an adventure's narrative log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NarrativeEntry {
    pub id: EntryId,
    pub timestamp: DateTime<Utc>,
    #[serde(rename = "type")]
    pub entry_type: EntryType,
    pub content: String,
}

impl NarrativeEntry {
    pub fn new(entry_type: EntryType, content: impl Into<String>) -> Self {
        Self {
            id: EntryId::new(),
            timestamp: Utc::now(),
            entry_type,
            content: content.into(),
        }
    }
}

/// A compacted rollup of archived entries, replacing them in the retained log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Summary {
    pub text: String,
    pub covering_entry_ids: BTreeSet<EntryId>,
}

/// The ordered, append-only sequence of narrative entries for one adventure,
/// plus an optional rolling summary covering entries archived by compaction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct NarrativeHistory {
    pub entries: Vec<NarrativeEntry>,
    pub summary: Option<Summary>,
}

impl NarrativeHistory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append an entry, enforcing monotonically increasing timestamps.
    ///
    /// A backdated entry would violate the invariant that history is
    /// strictly ordered by time; callers should not produce one, but if an
    /// upstream clock glitch ever does, reject it rather than corrupt order.
    pub fn append(&mut self, entry: NarrativeEntry) -> Result<(), DomainError> {
        if let Some(last) = self.entries.last() {
            if entry.timestamp < last.timestamp {
                return Err(DomainError::constraint(
                    "narrative entry timestamp precedes the last retained entry",
                ));
            }
        }
        self.entries.push(entry);
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Replace the retained entries and summary wholesale, as compaction does.
    pub fn replace(&mut self, entries: Vec<NarrativeEntry>, summary: Option<Summary>) {
        self.entries = entries;
        self.summary = summary;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn append_rejects_out_of_order_timestamps() {
        let mut history = NarrativeHistory::new();
        let first = NarrativeEntry::new(EntryType::PlayerInput, "hello");
        history.append(first.clone()).unwrap();

        let mut second = NarrativeEntry::new(EntryType::GmResponse, "hi there");
        second.timestamp = first.timestamp - Duration::seconds(1);
        assert!(history.append(second).is_err());
        assert_eq!(history.len(), 1);
    }

    #[test]
    fn replace_swaps_entries_and_summary() {
        let mut history = NarrativeHistory::new();
        history
            .append(NarrativeEntry::new(EntryType::PlayerInput, "a"))
            .unwrap();
        let summary = Summary {
            text: "recap".into(),
            covering_entry_ids: BTreeSet::new(),
        };
        history.replace(Vec::new(), Some(summary.clone()));
        assert!(history.is_empty());
        assert_eq!(history.summary, Some(summary));
    }
}
