use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// How the current capture session was opened
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionMode {
    /// Fresh inspection, nothing on the server yet
    New,
    /// Re-opening a previously submitted inspection to amend its media
    Editing,
    /// Re-doing an inspection the reviewer rejected; only the named rooms
    /// need new photos
    Resubmission {
        failed_room_ids: Vec<String>,
        reason: String,
    },
}

impl SessionMode {
    pub fn is_resubmission(&self) -> bool {
        matches!(self, SessionMode::Resubmission { .. })
    }
}

/// A staged inspection photo held in memory for the duration of the session
#[derive(Debug, Clone)]
pub struct Photo {
    /// Locally generated (timestamp-based) or the server media id in edit mode
    pub id: String,
    /// Local file path or remote URL of the image bytes
    pub uri: String,
    /// None means the photo has not been assigned to a room yet
    pub room_id: Option<String>,
    /// Denormalized display label, kept in sync with `room_id`
    pub room_name: Option<String>,
    /// True when loaded from a previously submitted inspection
    pub is_existing: bool,
    /// Prepared upload bytes; None for existing media already on the server
    pub data: Option<Arc<Vec<u8>>>,
}

impl Photo {
    pub fn is_assigned(&self) -> bool {
        self.room_id.is_some()
    }
}

/// A named area of the unit that must be photographed (server-owned, read-only)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Room {
    pub id: String,
    pub name: String,
    #[serde(rename = "type", default)]
    pub kind: Option<String>,
    #[serde(default)]
    pub tips: Option<String>,
}

/// A registered high-value item requiring its own verification photo
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValuableItem {
    pub id: String,
    pub name: String,
    pub room_id: String,
    pub room_name: String,
}

/// Verification photo (and optional notes) captured for one valuable item
#[derive(Debug, Clone)]
pub struct VerificationRecord {
    pub uri: String,
    pub notes: Option<String>,
    /// Prepared upload bytes for the verification photo
    pub data: Option<Arc<Vec<u8>>>,
}

/// Server-side inspection record; the client only holds the id
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Inspection {
    pub id: String,
}

/// Media kind reported by the server for previously uploaded files
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MediaKind {
    Photo,
    Video,
    #[serde(other)]
    Other,
}

/// A media row from a previously submitted inspection, consumed in edit mode
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MediaRecord {
    pub id: String,
    pub uri: String,
    pub kind: MediaKind,
    #[serde(default)]
    pub room_id: Option<String>,
}
