use crate::api::InspectionApi;
use crate::config::{UploadConfig, VerificationFailurePolicy};
use crate::error::{InspectError, Result};
use crate::events::{EventBus, SessionEvent};
use crate::session::InspectionSession;
use std::collections::VecDeque;
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{debug, info, warn};

/// Progress of an in-flight submission, visible to the UI
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct UploadProgress {
    pub completed: usize,
    pub total: usize,
}

/// One pending upload in the submission queue
enum UploadJob {
    RoomPhoto {
        photo_id: String,
        room_id: String,
        data: Arc<Vec<u8>>,
    },
    Verification {
        item_id: String,
        uri: String,
        data: Arc<Vec<u8>>,
        notes: Option<String>,
    },
}

/// Result of a completed submission
#[derive(Debug, Clone)]
pub struct UploadOutcome {
    pub inspection_id: String,
    /// Items whose verification upload failed under the `continue` policy
    pub verification_failures: Vec<String>,
}

/// Drives the strictly sequential submission sequence: lazily create the
/// inspection, drain the upload queue one request at a time, then mark the
/// inspection submitted.
///
/// There is deliberately no parallel fan-out, no automatic retry, and no
/// mid-upload cancellation: a single worker awaits each request so progress
/// reporting stays predictable. Any blocking failure leaves the session state
/// untouched, so the caller can retry the whole sequence idempotently.
pub struct Uploader {
    config: UploadConfig,
    event_bus: Arc<EventBus>,
    progress_tx: watch::Sender<UploadProgress>,
    progress_rx: watch::Receiver<UploadProgress>,
}

impl Uploader {
    pub fn new(config: UploadConfig, event_bus: Arc<EventBus>) -> Self {
        let (progress_tx, progress_rx) = watch::channel(UploadProgress::default());
        Self {
            config,
            event_bus,
            progress_tx,
            progress_rx,
        }
    }

    /// Subscribe to the `{completed, total}` progress channel
    pub fn progress(&self) -> watch::Receiver<UploadProgress> {
        self.progress_rx.clone()
    }

    /// Validate the session and run the full submission sequence. On success
    /// the session is cleared; on a blocking failure it is left intact.
    pub async fn perform_upload(
        &self,
        session: &mut InspectionSession,
        api: &dyn InspectionApi,
        damage_report: Option<&str>,
    ) -> Result<UploadOutcome> {
        if let Err(blocker) = session.submit_check() {
            warn!("Submission blocked: {}", blocker);
            return Err(InspectError::Validation(blocker));
        }

        // Lazy inspection creation: only once an upload is about to happen
        let inspection_id = match session.inspection() {
            Some(inspection) => inspection.id.clone(),
            None => {
                let inspection = api
                    .create_inspection(session.unit_id(), session.assignment_id())
                    .await
                    .map_err(|e| self.fail("create_inspection", e))?;
                let id = inspection.id.clone();
                session.set_inspection(inspection);
                id
            }
        };

        let mut queue = Self::build_queue(session);
        let total = queue.len();
        self.report(UploadProgress {
            completed: 0,
            total,
        });
        self.event_bus.publish(SessionEvent::UploadStarted { total });
        info!(
            "Starting submission of inspection {} ({} upload(s))",
            inspection_id, total
        );

        let mut completed = 0;
        let mut verification_failures = Vec::new();

        // Single worker: each request is awaited before the next is issued
        while let Some(job) = queue.pop_front() {
            let succeeded = match job {
                UploadJob::RoomPhoto {
                    photo_id,
                    room_id,
                    data,
                } => {
                    let file_name = format!("{}.jpg", photo_id);
                    api.upload_media(&inspection_id, &file_name, data.as_ref().clone(), &room_id)
                        .await
                        .map_err(|e| self.fail("upload_media", e))?;
                    true
                }
                UploadJob::Verification {
                    item_id,
                    uri,
                    data,
                    notes,
                } => {
                    let file_name = verification_file_name(&uri, &item_id);
                    let result = api
                        .verify_valuable_item(
                            &item_id,
                            &inspection_id,
                            &file_name,
                            data.as_ref().clone(),
                            notes.as_deref(),
                        )
                        .await;

                    match result {
                        Ok(()) => true,
                        Err(e) => match self.config.verification_failure_policy {
                            VerificationFailurePolicy::Abort => {
                                return Err(self.fail("verify_valuable_item", e));
                            }
                            VerificationFailurePolicy::Continue => {
                                warn!(
                                    "Verification upload for item {} failed, continuing: {}",
                                    item_id, e
                                );
                                verification_failures.push(item_id);
                                false
                            }
                        },
                    }
                }
            };

            // Failed uploads are never reported as completed work
            if succeeded {
                completed += 1;
                self.report(UploadProgress { completed, total });
                self.event_bus
                    .publish(SessionEvent::UploadProgress { completed, total });
            }
        }

        api.submit_inspection(&inspection_id, damage_report)
            .await
            .map_err(|e| self.fail("submit_inspection", e))?;

        self.event_bus.publish(SessionEvent::UploadCompleted {
            inspection_id: inspection_id.clone(),
        });
        session.clear();

        Ok(UploadOutcome {
            inspection_id,
            verification_failures,
        })
    }

    /// Room photos first, in staged list order, then verification photos in
    /// item snapshot order. Existing media already lives on the server and is
    /// not re-uploaded.
    fn build_queue(session: &InspectionSession) -> VecDeque<UploadJob> {
        let mut queue = VecDeque::new();

        for photo in session.photos() {
            if photo.is_existing {
                continue;
            }
            let (Some(room_id), Some(data)) = (photo.room_id.as_ref(), photo.data.as_ref()) else {
                // submit_check guarantees assignment; photos without bytes
                // cannot be uploaded
                debug!("Skipping photo {} without upload payload", photo.id);
                continue;
            };
            queue.push_back(UploadJob::RoomPhoto {
                photo_id: photo.id.clone(),
                room_id: room_id.clone(),
                data: Arc::clone(data),
            });
        }

        for item in session.valuables().items() {
            let Some(record) = session.valuables().record(&item.id) else {
                continue;
            };
            if record.uri.is_empty() {
                continue;
            }
            let Some(data) = record.data.as_ref() else {
                continue;
            };
            queue.push_back(UploadJob::Verification {
                item_id: item.id.clone(),
                uri: record.uri.clone(),
                data: Arc::clone(data),
                notes: record.notes.clone(),
            });
        }

        queue
    }

    fn report(&self, progress: UploadProgress) {
        // Receivers may have gone away; progress is best-effort
        let _ = self.progress_tx.send(progress);
    }

    fn fail(&self, stage: &str, error: InspectError) -> InspectError {
        self.event_bus.publish(SessionEvent::UploadFailed {
            stage: stage.to_string(),
            error: error.to_string(),
        });
        error
    }
}

/// Keep the original file name when the uri has one, otherwise derive from
/// the item id
fn verification_file_name(uri: &str, item_id: &str) -> String {
    uri.rsplit('/')
        .next()
        .filter(|name| !name.is_empty())
        .map(str::to_string)
        .unwrap_or_else(|| format!("{}.jpg", item_id))
}
