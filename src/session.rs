use crate::api::InspectionApi;
use crate::config::MediaConfig;
use crate::error::{InspectError, Result};
use crate::events::{CaptureOrigin, EventBus, SessionEvent};
use crate::media;
use crate::model::{Inspection, MediaKind, MediaRecord, Photo, Room, SessionMode};
use crate::source::{CapturedImage, MediaSource, Permission};
use crate::valuables::VerificationLog;
use chrono::Utc;
use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info, warn};

/// Room name shown for existing media whose room is no longer in the room list
const UNKNOWN_ROOM_NAME: &str = "Unknown Room";

/// A valuable item still missing its verification photo, as reported to the user
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnverifiedItem {
    pub name: String,
    pub room_name: String,
}

impl fmt::Display for UnverifiedItem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.name, self.room_name)
    }
}

/// Why submission is currently blocked, in strict priority order
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SubmitBlocker {
    #[error("no photos have been taken")]
    NoPhotos,

    #[error("{count} photo(s) not assigned to a room")]
    UnassignedPhotos { count: usize },

    #[error("rooms without photos: {}", .names.join(", "))]
    MissingRooms { names: Vec<String> },

    #[error("valuable items not verified: {}", .items.iter().map(|i| i.to_string()).collect::<Vec<_>>().join(", "))]
    UnverifiedValuables { items: Vec<UnverifiedItem> },
}

/// Result of a gallery pick: which photos were staged and whether the single
/// room-assignment prompt should open
#[derive(Debug, Clone)]
pub struct StagedBatch {
    pub photo_ids: Vec<String>,
}

impl StagedBatch {
    /// The assignment prompt opens only when exactly one photo was picked;
    /// larger batches are assigned individually later
    pub fn assignment_prompt(&self) -> Option<&str> {
        match self.photo_ids.as_slice() {
            [only] => Some(only.as_str()),
            _ => None,
        }
    }
}

/// One inspection capture session: the authoritative in-memory list of staged
/// photos, their room assignments, and the valuable-item verification state.
///
/// The session is explicitly scoped: it is created when the capture workflow
/// opens and dropped (or cleared after a successful submission) when it ends.
/// Nothing here outlives the session or is shared across screens.
pub struct InspectionSession {
    unit_id: String,
    assignment_id: Option<String>,
    mode: SessionMode,
    rooms: Vec<Room>,
    photos: Vec<Photo>,
    valuables: VerificationLog,
    inspection: Option<Inspection>,
    /// Photo currently awaiting its room-assignment prompt
    pending_assignment: Option<String>,
    media_config: MediaConfig,
    event_bus: Arc<EventBus>,
    photo_seq: u64,
}

impl InspectionSession {
    /// Create a session over the caller-supplied room list. Valuable items
    /// start empty; use [`begin`](Self::begin) to fetch the snapshot.
    pub fn new(
        unit_id: impl Into<String>,
        assignment_id: Option<String>,
        rooms: Vec<Room>,
        mode: SessionMode,
        media_config: MediaConfig,
        event_bus: Arc<EventBus>,
    ) -> Self {
        let unit_id = unit_id.into();
        info!(
            "Inspection session opened for unit {} ({} room(s), mode {:?})",
            unit_id,
            rooms.len(),
            mode
        );
        Self {
            unit_id,
            assignment_id,
            mode,
            rooms,
            photos: Vec::new(),
            valuables: VerificationLog::default(),
            inspection: None,
            pending_assignment: None,
            media_config,
            event_bus,
            photo_seq: 0,
        }
    }

    /// Create a session and fetch the valuable-item snapshot for the unit.
    /// The snapshot is taken once and not re-fetched mid-session.
    pub async fn begin(
        api: &dyn InspectionApi,
        unit_id: impl Into<String>,
        assignment_id: Option<String>,
        rooms: Vec<Room>,
        mode: SessionMode,
        media_config: MediaConfig,
        event_bus: Arc<EventBus>,
    ) -> Result<Self> {
        let mut session = Self::new(unit_id, assignment_id, rooms, mode, media_config, event_bus);
        let items = api.fetch_valuable_items(&session.unit_id).await?;
        session.valuables = VerificationLog::from_snapshot(items);
        Ok(session)
    }

    pub fn unit_id(&self) -> &str {
        &self.unit_id
    }

    pub fn assignment_id(&self) -> Option<&str> {
        self.assignment_id.as_deref()
    }

    pub fn mode(&self) -> &SessionMode {
        &self.mode
    }

    pub fn rooms(&self) -> &[Room] {
        &self.rooms
    }

    pub fn photos(&self) -> &[Photo] {
        &self.photos
    }

    pub fn photo(&self, photo_id: &str) -> Option<&Photo> {
        self.photos.iter().find(|p| p.id == photo_id)
    }

    pub fn valuables(&self) -> &VerificationLog {
        &self.valuables
    }

    pub fn inspection(&self) -> Option<&Inspection> {
        self.inspection.as_ref()
    }

    pub fn set_inspection(&mut self, inspection: Inspection) {
        debug!("Session bound to inspection {}", inspection.id);
        self.inspection = Some(inspection);
    }

    /// Photo id awaiting the room-assignment prompt, if any
    pub fn pending_assignment(&self) -> Option<&str> {
        self.pending_assignment.as_deref()
    }

    pub fn unassigned_count(&self) -> usize {
        self.photos.iter().filter(|p| !p.is_assigned()).count()
    }

    /// Capture one photo from the camera. Returns the staged photo id, or
    /// Ok(None) when the user cancelled the shot. The new photo is unassigned
    /// and immediately becomes the pending assignment prompt.
    pub async fn capture_photo(&mut self, source: &dyn MediaSource) -> Result<Option<String>> {
        self.check_permission(source).await?;

        let Some(image) = source.capture_one().await? else {
            debug!("Capture cancelled by user");
            return Ok(None);
        };

        let photo_id = self.stage_image(image, CaptureOrigin::Camera);
        self.pending_assignment = Some(photo_id.clone());
        Ok(Some(photo_id))
    }

    /// Pick any number of photos from the gallery. All are staged unassigned;
    /// the assignment prompt opens only for a single-photo pick.
    pub async fn pick_from_gallery(&mut self, source: &dyn MediaSource) -> Result<StagedBatch> {
        self.check_permission(source).await?;

        let images = source.capture_many().await?;
        let photo_ids: Vec<String> = images
            .into_iter()
            .map(|image| self.stage_image(image, CaptureOrigin::Gallery))
            .collect();

        let batch = StagedBatch { photo_ids };
        self.pending_assignment = batch.assignment_prompt().map(str::to_string);
        if batch.photo_ids.len() > 1 {
            debug!(
                "{} photos picked; room assignment deferred to individual taps",
                batch.photo_ids.len()
            );
        }
        Ok(batch)
    }

    /// Capture the verification photo for a valuable item, using the same
    /// permission and preparation path as room photos
    pub async fn verify_item(
        &mut self,
        item_id: &str,
        source: &dyn MediaSource,
    ) -> Result<Option<()>> {
        if self.valuables.item(item_id).is_none() {
            return Err(InspectError::component(
                "session",
                format!("unknown valuable item: {}", item_id),
            ));
        }

        self.check_permission(source).await?;

        let Some(image) = source.capture_one().await? else {
            debug!("Verification capture cancelled by user");
            return Ok(None);
        };

        let prepared = media::prepare_for_upload(&image.bytes, &self.media_config);
        self.valuables
            .record_verification(item_id, image.uri, Arc::new(prepared.bytes));
        self.event_bus.publish(SessionEvent::ItemVerified {
            item_id: item_id.to_string(),
        });
        Ok(Some(()))
    }

    /// Update the uncommitted notes draft for a valuable item
    pub fn stage_item_notes(&mut self, item_id: &str, text: &str) {
        self.valuables.stage_notes(item_id, text);
    }

    /// Commit the drafted notes; called when the notes dialog is confirmed
    pub fn confirm_item_notes(&mut self, item_id: &str) {
        self.valuables.confirm_notes(item_id);
    }

    /// Assign (or reassign) a staged photo to a room, closing the prompt
    pub fn assign_room(&mut self, photo_id: &str, room: &Room) -> Result<()> {
        let photo = self
            .photos
            .iter_mut()
            .find(|p| p.id == photo_id)
            .ok_or_else(|| {
                InspectError::component("session", format!("unknown photo id: {}", photo_id))
            })?;

        photo.room_id = Some(room.id.clone());
        photo.room_name = Some(room.name.clone());

        if self.pending_assignment.as_deref() == Some(photo_id) {
            self.pending_assignment = None;
        }

        self.event_bus.publish(SessionEvent::RoomAssigned {
            photo_id: photo_id.to_string(),
            room_id: room.id.clone(),
        });
        Ok(())
    }

    /// Remove a staged photo. The confirmation step belongs to the caller's UI.
    pub fn delete_photo(&mut self, photo_id: &str) -> Result<()> {
        let before = self.photos.len();
        self.photos.retain(|p| p.id != photo_id);
        if self.photos.len() == before {
            return Err(InspectError::component(
                "session",
                format!("unknown photo id: {}", photo_id),
            ));
        }

        if self.pending_assignment.as_deref() == Some(photo_id) {
            self.pending_assignment = None;
        }

        self.event_bus.publish(SessionEvent::PhotoDeleted {
            photo_id: photo_id.to_string(),
        });
        Ok(())
    }

    /// Load media from a previously submitted inspection (edit mode). Only
    /// photo records are staged; room names are resolved against the room
    /// list, falling back to "Unknown Room" for ids no longer present.
    pub fn load_existing(&mut self, media: &[MediaRecord]) {
        let mut loaded = 0;
        for record in media {
            if record.kind != MediaKind::Photo {
                continue;
            }

            let room_name = record.room_id.as_ref().map(|room_id| {
                self.rooms
                    .iter()
                    .find(|r| &r.id == room_id)
                    .map(|r| r.name.clone())
                    .unwrap_or_else(|| UNKNOWN_ROOM_NAME.to_string())
            });

            self.photos.push(Photo {
                id: record.id.clone(),
                uri: record.uri.clone(),
                room_id: record.room_id.clone(),
                room_name,
                is_existing: true,
                data: None,
            });
            self.event_bus.publish(SessionEvent::PhotoStaged {
                photo_id: record.id.clone(),
                origin: CaptureOrigin::Existing,
            });
            loaded += 1;
        }
        info!("Loaded {} existing photo(s) for editing", loaded);
    }

    /// Rooms that must have at least one photo before submission. In
    /// resubmission mode only the rejected rooms are required; an empty
    /// rejected list falls back to the full room list.
    pub fn required_rooms(&self) -> Vec<&Room> {
        match &self.mode {
            SessionMode::Resubmission { failed_room_ids, .. } if !failed_room_ids.is_empty() => {
                self.rooms
                    .iter()
                    .filter(|r| failed_room_ids.contains(&r.id))
                    .collect()
            }
            _ => self.rooms.iter().collect(),
        }
    }

    /// Check the four submission invariants, reporting the first violation in
    /// strict priority order. Strict with no bypass.
    pub fn submit_check(&self) -> std::result::Result<(), SubmitBlocker> {
        if self.photos.is_empty() {
            return Err(SubmitBlocker::NoPhotos);
        }

        let unassigned = self.unassigned_count();
        if unassigned > 0 {
            return Err(SubmitBlocker::UnassignedPhotos { count: unassigned });
        }

        let covered: HashSet<&str> = self
            .photos
            .iter()
            .filter_map(|p| p.room_id.as_deref())
            .collect();
        let missing: Vec<String> = self
            .required_rooms()
            .iter()
            .filter(|r| !covered.contains(r.id.as_str()))
            .map(|r| r.name.clone())
            .collect();
        if !missing.is_empty() {
            return Err(SubmitBlocker::MissingRooms { names: missing });
        }

        let unverified: Vec<UnverifiedItem> = self
            .valuables
            .unverified_items()
            .into_iter()
            .map(|item| UnverifiedItem {
                name: item.name.clone(),
                room_name: item.room_name.clone(),
            })
            .collect();
        if !unverified.is_empty() {
            return Err(SubmitBlocker::UnverifiedValuables { items: unverified });
        }

        Ok(())
    }

    /// Discard all session state after a successful submission (or on
    /// explicit teardown). The room list and item snapshot stay readable.
    pub fn clear(&mut self) {
        self.photos.clear();
        self.valuables.clear();
        self.inspection = None;
        self.pending_assignment = None;
        self.event_bus.publish(SessionEvent::SessionCleared);
    }

    async fn check_permission(&self, source: &dyn MediaSource) -> Result<()> {
        match source.request_permission().await {
            Permission::Granted => Ok(()),
            Permission::Denied => {
                warn!("{} permission denied", source.device());
                Err(InspectError::PermissionDenied {
                    device: source.device(),
                })
            }
        }
    }

    fn stage_image(&mut self, image: CapturedImage, origin: CaptureOrigin) -> String {
        let prepared = media::prepare_for_upload(&image.bytes, &self.media_config);
        let photo_id = self.next_photo_id();

        self.photos.push(Photo {
            id: photo_id.clone(),
            uri: image.uri,
            room_id: None,
            room_name: None,
            is_existing: false,
            data: Some(Arc::new(prepared.bytes)),
        });

        self.event_bus.publish(SessionEvent::PhotoStaged {
            photo_id: photo_id.clone(),
            origin,
        });
        photo_id
    }

    /// Timestamp-based local photo id; the sequence suffix keeps ids unique
    /// when several photos are staged within one millisecond
    fn next_photo_id(&mut self) -> String {
        self.photo_seq += 1;
        format!(
            "{}_{:03}",
            Utc::now().format("%Y%m%d_%H%M%S_%3f"),
            self.photo_seq
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::ValuableItem;
    use crate::source::{MediaDevice, MockMediaSource};
    use std::io::Cursor;

    fn jpeg_bytes(width: u32, height: u32) -> Vec<u8> {
        let img = image::RgbImage::from_pixel(width, height, image::Rgb([10, 20, 30]));
        let mut bytes = Vec::new();
        image::DynamicImage::ImageRgb8(img)
            .write_to(&mut Cursor::new(&mut bytes), image::ImageOutputFormat::Jpeg(80))
            .unwrap();
        bytes
    }

    fn room(id: &str, name: &str) -> Room {
        Room {
            id: id.to_string(),
            name: name.to_string(),
            kind: None,
            tips: None,
        }
    }

    fn test_session(rooms: Vec<Room>) -> InspectionSession {
        InspectionSession::new(
            "unit-1",
            Some("assignment-1".to_string()),
            rooms,
            SessionMode::New,
            MediaConfig::default(),
            Arc::new(EventBus::new(64)),
        )
    }

    fn session_with_photo(rooms: Vec<Room>) -> InspectionSession {
        let mut session = test_session(rooms);
        let source =
            MockMediaSource::new(MediaDevice::Camera).with_image("shot.jpg", jpeg_bytes(32, 32));
        block_on(session.capture_photo(&source)).unwrap();
        session
    }

    // Small helper so sync tests can drive the async capture path
    fn block_on<F: std::future::Future>(fut: F) -> F::Output {
        tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .unwrap()
            .block_on(fut)
    }

    #[tokio::test]
    async fn denied_camera_permission_aborts_capture() {
        let mut session = test_session(vec![room("r1", "Kitchen")]);
        let source = MockMediaSource::new(MediaDevice::Camera).deny_permission();

        let err = session.capture_photo(&source).await.unwrap_err();
        assert!(matches!(
            err,
            InspectError::PermissionDenied {
                device: MediaDevice::Camera
            }
        ));
        assert!(session.photos().is_empty());
    }

    #[tokio::test]
    async fn cancelled_capture_stages_nothing() {
        let mut session = test_session(vec![room("r1", "Kitchen")]);
        let source = MockMediaSource::new(MediaDevice::Camera);

        assert!(session.capture_photo(&source).await.unwrap().is_none());
        assert!(session.photos().is_empty());
        assert!(session.pending_assignment().is_none());
    }

    #[tokio::test]
    async fn captured_photo_opens_assignment_prompt() {
        let mut session = test_session(vec![room("r1", "Kitchen")]);
        let source =
            MockMediaSource::new(MediaDevice::Camera).with_image("shot.jpg", jpeg_bytes(32, 32));

        let photo_id = session.capture_photo(&source).await.unwrap().unwrap();
        assert_eq!(session.pending_assignment(), Some(photo_id.as_str()));
        assert_eq!(session.unassigned_count(), 1);

        let kitchen = room("r1", "Kitchen");
        session.assign_room(&photo_id, &kitchen).unwrap();
        assert!(session.pending_assignment().is_none());
        assert_eq!(
            session.photo(&photo_id).unwrap().room_name.as_deref(),
            Some("Kitchen")
        );
    }

    #[tokio::test]
    async fn multi_pick_defers_assignment() {
        let mut session = test_session(vec![room("r1", "Kitchen")]);
        let source = MockMediaSource::new(MediaDevice::MediaLibrary)
            .with_image("a.jpg", jpeg_bytes(16, 16))
            .with_image("b.jpg", jpeg_bytes(16, 16));

        let batch = session.pick_from_gallery(&source).await.unwrap();
        assert_eq!(batch.photo_ids.len(), 2);
        assert!(batch.assignment_prompt().is_none());
        assert!(session.pending_assignment().is_none());
        assert_eq!(session.unassigned_count(), 2);
    }

    #[tokio::test]
    async fn single_pick_opens_assignment_prompt() {
        let mut session = test_session(vec![room("r1", "Kitchen")]);
        let source = MockMediaSource::new(MediaDevice::MediaLibrary)
            .with_image("a.jpg", jpeg_bytes(16, 16));

        let batch = session.pick_from_gallery(&source).await.unwrap();
        assert_eq!(batch.assignment_prompt(), Some(batch.photo_ids[0].as_str()));
        assert_eq!(session.pending_assignment(), batch.assignment_prompt());
    }

    #[test]
    fn submit_check_empty_list() {
        let session = test_session(vec![room("r1", "Kitchen")]);
        assert_eq!(session.submit_check(), Err(SubmitBlocker::NoPhotos));
    }

    #[test]
    fn submit_check_counts_unassigned() {
        let session = session_with_photo(vec![room("r1", "Kitchen")]);
        assert_eq!(
            session.submit_check(),
            Err(SubmitBlocker::UnassignedPhotos { count: 1 })
        );
    }

    #[test]
    fn submit_check_reports_all_missing_rooms_in_order() {
        let rooms = vec![room("r1", "Kitchen"), room("r2", "Bath"), room("r3", "Patio")];
        let mut session = session_with_photo(rooms);

        let photo_id = session.photos()[0].id.clone();
        let bath = room("r2", "Bath");
        session.assign_room(&photo_id, &bath).unwrap();

        assert_eq!(
            session.submit_check(),
            Err(SubmitBlocker::MissingRooms {
                names: vec!["Kitchen".to_string(), "Patio".to_string()]
            })
        );
    }

    #[test]
    fn submit_check_blocks_on_unverified_valuables() {
        let mut session = session_with_photo(vec![room("r1", "Kitchen")]);
        let photo_id = session.photos()[0].id.clone();
        session.assign_room(&photo_id, &room("r1", "Kitchen")).unwrap();

        session.valuables = VerificationLog::from_snapshot(vec![ValuableItem {
            id: "v1".to_string(),
            name: "Espresso machine".to_string(),
            room_id: "r1".to_string(),
            room_name: "Kitchen".to_string(),
        }]);

        match session.submit_check() {
            Err(SubmitBlocker::UnverifiedValuables { items }) => {
                assert_eq!(items.len(), 1);
                assert_eq!(items[0].name, "Espresso machine");
                assert_eq!(items[0].room_name, "Kitchen");
            }
            other => panic!("expected unverified valuables, got {:?}", other),
        }
    }

    #[test]
    fn submit_check_passes_when_all_invariants_hold() {
        let mut session = session_with_photo(vec![room("r1", "Kitchen")]);
        let photo_id = session.photos()[0].id.clone();
        session.assign_room(&photo_id, &room("r1", "Kitchen")).unwrap();
        assert_eq!(session.submit_check(), Ok(()));
    }

    #[test]
    fn resubmission_requires_only_failed_rooms() {
        let rooms = vec![room("r1", "Kitchen"), room("r2", "Bath")];
        let mut session = InspectionSession::new(
            "unit-1",
            None,
            rooms,
            SessionMode::Resubmission {
                failed_room_ids: vec!["r2".to_string()],
                reason: "bath photos too dark".to_string(),
            },
            MediaConfig::default(),
            Arc::new(EventBus::new(64)),
        );

        let source =
            MockMediaSource::new(MediaDevice::Camera).with_image("shot.jpg", jpeg_bytes(16, 16));
        let photo_id = block_on(session.capture_photo(&source))
            .unwrap()
            .unwrap();
        session.assign_room(&photo_id, &room("r2", "Bath")).unwrap();

        assert_eq!(session.submit_check(), Ok(()));
    }

    #[test]
    fn load_existing_maps_photos_and_unknown_rooms() {
        let mut session = test_session(vec![room("r1", "Kitchen")]);
        session.load_existing(&[
            MediaRecord {
                id: "m1".to_string(),
                uri: "https://cdn.example/m1.jpg".to_string(),
                kind: MediaKind::Photo,
                room_id: Some("r1".to_string()),
            },
            MediaRecord {
                id: "m2".to_string(),
                uri: "https://cdn.example/m2.jpg".to_string(),
                kind: MediaKind::Photo,
                room_id: Some("r-gone".to_string()),
            },
            MediaRecord {
                id: "m3".to_string(),
                uri: "https://cdn.example/m3.mp4".to_string(),
                kind: MediaKind::Video,
                room_id: None,
            },
        ]);

        assert_eq!(session.photos().len(), 2);
        assert!(session.photos().iter().all(|p| p.is_existing));
        assert_eq!(
            session.photo("m1").unwrap().room_name.as_deref(),
            Some("Kitchen")
        );
        assert_eq!(
            session.photo("m2").unwrap().room_name.as_deref(),
            Some("Unknown Room")
        );
    }

    #[test]
    fn delete_photo_removes_entry() {
        let mut session = session_with_photo(vec![room("r1", "Kitchen")]);
        let photo_id = session.photos()[0].id.clone();

        session.delete_photo(&photo_id).unwrap();
        assert!(session.photos().is_empty());
        assert!(session.delete_photo(&photo_id).is_err());
    }

    #[test]
    fn blocker_messages_name_the_deficiency() {
        let blocker = SubmitBlocker::MissingRooms {
            names: vec!["Kitchen".to_string(), "Bath".to_string()],
        };
        assert_eq!(blocker.to_string(), "rooms without photos: Kitchen, Bath");

        let blocker = SubmitBlocker::UnverifiedValuables {
            items: vec![UnverifiedItem {
                name: "Telescope".to_string(),
                room_name: "Study".to_string(),
            }],
        };
        assert_eq!(
            blocker.to_string(),
            "valuable items not verified: Telescope (Study)"
        );
    }
}
