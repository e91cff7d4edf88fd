use tokio::sync::broadcast;
use tracing::{debug, error, info};

/// Where a staged photo came from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CaptureOrigin {
    Camera,
    Gallery,
    Existing,
}

/// Events emitted during an inspection capture session
#[derive(Debug, Clone)]
pub enum SessionEvent {
    /// A new photo was staged in the session
    PhotoStaged {
        photo_id: String,
        origin: CaptureOrigin,
    },
    /// A staged photo was assigned (or reassigned) to a room
    RoomAssigned { photo_id: String, room_id: String },
    /// A staged photo was removed
    PhotoDeleted { photo_id: String },
    /// A valuable item received its verification photo
    ItemVerified { item_id: String },
    /// The submission sequence started
    UploadStarted { total: usize },
    /// One upload in the sequence finished
    UploadProgress { completed: usize, total: usize },
    /// A blocking upload step failed; the submission was aborted
    UploadFailed { stage: String, error: String },
    /// The inspection was submitted and local state cleared
    UploadCompleted { inspection_id: String },
    /// Session state was discarded
    SessionCleared,
}

impl SessionEvent {
    /// Get a human-readable description of the event
    pub fn description(&self) -> String {
        match self {
            SessionEvent::PhotoStaged { photo_id, origin } => {
                format!("Photo {} staged from {:?}", photo_id, origin)
            }
            SessionEvent::RoomAssigned { photo_id, room_id } => {
                format!("Photo {} assigned to room {}", photo_id, room_id)
            }
            SessionEvent::PhotoDeleted { photo_id } => {
                format!("Photo {} deleted", photo_id)
            }
            SessionEvent::ItemVerified { item_id } => {
                format!("Valuable item {} verified", item_id)
            }
            SessionEvent::UploadStarted { total } => {
                format!("Upload started ({} files)", total)
            }
            SessionEvent::UploadProgress { completed, total } => {
                format!("Upload progress: {}/{}", completed, total)
            }
            SessionEvent::UploadFailed { stage, error } => {
                format!("Upload failed at {}: {}", stage, error)
            }
            SessionEvent::UploadCompleted { inspection_id } => {
                format!("Inspection {} submitted", inspection_id)
            }
            SessionEvent::SessionCleared => "Session cleared".to_string(),
        }
    }

    /// Get the event type as a string for filtering
    pub fn event_type(&self) -> &'static str {
        match self {
            SessionEvent::PhotoStaged { .. } => "photo_staged",
            SessionEvent::RoomAssigned { .. } => "room_assigned",
            SessionEvent::PhotoDeleted { .. } => "photo_deleted",
            SessionEvent::ItemVerified { .. } => "item_verified",
            SessionEvent::UploadStarted { .. } => "upload_started",
            SessionEvent::UploadProgress { .. } => "upload_progress",
            SessionEvent::UploadFailed { .. } => "upload_failed",
            SessionEvent::UploadCompleted { .. } => "upload_completed",
            SessionEvent::SessionCleared => "session_cleared",
        }
    }
}

/// Broadcast bus carrying session events to any interested observer
pub struct EventBus {
    sender: broadcast::Sender<SessionEvent>,
}

impl EventBus {
    /// Create a new event bus with the specified channel capacity
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Subscribe to events and get a receiver
    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.sender.subscribe()
    }

    /// Publish an event to all subscribers; returns the receiver count.
    /// Having no subscribers is normal for headless library use.
    pub fn publish(&self, event: SessionEvent) -> usize {
        match &event {
            SessionEvent::UploadFailed { stage, error } => {
                error!("Upload failed at {}: {}", stage, error);
            }
            SessionEvent::UploadCompleted { inspection_id } => {
                info!("Inspection {} submitted", inspection_id);
            }
            SessionEvent::UploadStarted { total } => {
                info!("Upload started ({} files)", total);
            }
            _ => {
                debug!("Session event: {}", event.description());
            }
        }

        match self.sender.send(event) {
            Ok(receivers) => receivers,
            Err(_) => 0,
        }
    }

    /// Number of active subscribers
    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(100)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn events_reach_subscribers() {
        let bus = EventBus::new(16);
        let mut rx = bus.subscribe();

        let delivered = bus.publish(SessionEvent::PhotoStaged {
            photo_id: "p1".to_string(),
            origin: CaptureOrigin::Camera,
        });
        assert_eq!(delivered, 1);

        match rx.recv().await.unwrap() {
            SessionEvent::PhotoStaged { photo_id, origin } => {
                assert_eq!(photo_id, "p1");
                assert_eq!(origin, CaptureOrigin::Camera);
            }
            other => panic!("unexpected event: {}", other.description()),
        }
    }

    #[test]
    fn publish_without_subscribers_is_not_an_error() {
        let bus = EventBus::new(16);
        let delivered = bus.publish(SessionEvent::SessionCleared);
        assert_eq!(delivered, 0);
    }
}
