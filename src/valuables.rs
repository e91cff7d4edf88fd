use crate::model::{ValuableItem, VerificationRecord};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, warn};

/// Verification state for the unit's registered valuable items.
///
/// Holds the item snapshot fetched at session start plus the per-item
/// verification photos and notes captured during the session. Notes are
/// drafted separately and only stored on explicit confirmation, mirroring a
/// dialog that saves on "Done" rather than on every keystroke.
#[derive(Debug, Default)]
pub struct VerificationLog {
    items: Vec<ValuableItem>,
    records: HashMap<String, VerificationRecord>,
    note_drafts: HashMap<String, String>,
}

impl VerificationLog {
    /// Build the log from the item snapshot fetched for this unit. The
    /// snapshot is not re-fetched mid-session.
    pub fn from_snapshot(items: Vec<ValuableItem>) -> Self {
        debug!("Valuable item snapshot loaded: {} item(s)", items.len());
        Self {
            items,
            records: HashMap::new(),
            note_drafts: HashMap::new(),
        }
    }

    /// All registered items, flattened across rooms
    pub fn items(&self) -> &[ValuableItem] {
        &self.items
    }

    /// Look up an item in the snapshot
    pub fn item(&self, item_id: &str) -> Option<&ValuableItem> {
        self.items.iter().find(|i| i.id == item_id)
    }

    /// Store the verification photo for an item, replacing any earlier one
    pub fn record_verification(&mut self, item_id: &str, uri: String, data: Arc<Vec<u8>>) {
        let notes = self
            .records
            .get(item_id)
            .and_then(|existing| existing.notes.clone());
        self.records.insert(
            item_id.to_string(),
            VerificationRecord {
                uri,
                notes,
                data: Some(data),
            },
        );
    }

    /// Verification record for an item, if one was captured
    pub fn record(&self, item_id: &str) -> Option<&VerificationRecord> {
        self.records.get(item_id)
    }

    /// True once the item has a verification photo with a non-empty uri
    pub fn is_verified(&self, item_id: &str) -> bool {
        self.records
            .get(item_id)
            .map(|r| !r.uri.is_empty())
            .unwrap_or(false)
    }

    /// Update the uncommitted notes draft for an item
    pub fn stage_notes(&mut self, item_id: &str, text: &str) {
        self.note_drafts
            .insert(item_id.to_string(), text.to_string());
    }

    /// Commit the drafted notes onto the item's verification record
    pub fn confirm_notes(&mut self, item_id: &str) {
        let Some(draft) = self.note_drafts.remove(item_id) else {
            return;
        };
        match self.records.get_mut(item_id) {
            Some(record) => {
                record.notes = if draft.is_empty() { None } else { Some(draft) };
            }
            None => {
                warn!(
                    "Discarding notes for unverified item {} (no verification photo yet)",
                    item_id
                );
            }
        }
    }

    /// Throw away the uncommitted draft for an item
    pub fn discard_notes(&mut self, item_id: &str) {
        self.note_drafts.remove(item_id);
    }

    /// Items that still have no verification photo, in snapshot order
    pub fn unverified_items(&self) -> Vec<&ValuableItem> {
        self.items
            .iter()
            .filter(|item| !self.is_verified(&item.id))
            .collect()
    }

    /// Live counters for the UI: (verified, total)
    pub fn progress(&self) -> (usize, usize) {
        let total = self.items.len();
        (total - self.unverified_items().len(), total)
    }

    /// Drop all captured state, keeping the snapshot
    pub fn clear(&mut self) {
        self.records.clear();
        self.note_drafts.clear();
    }
}
