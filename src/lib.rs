pub mod api;
pub mod config;
pub mod error;
pub mod events;
pub mod media;
pub mod model;
pub mod session;
pub mod source;
pub mod upload;
pub mod valuables;

pub use api::{ApiCall, HttpApiClient, InspectionApi, MockApi};
pub use config::{
    ApiConfig, InspectConfig, MediaConfig, SystemConfig, UploadConfig, VerificationFailurePolicy,
};
pub use error::{InspectError, Result};
pub use events::{CaptureOrigin, EventBus, SessionEvent};
pub use media::{prepare_for_upload, PreparedImage};
pub use model::{
    Inspection, MediaKind, MediaRecord, Photo, Room, SessionMode, ValuableItem, VerificationRecord,
};
pub use session::{InspectionSession, StagedBatch, SubmitBlocker, UnverifiedItem};
pub use source::{CapturedImage, FileSource, MediaDevice, MediaSource, MockMediaSource, Permission};
pub use upload::{UploadOutcome, UploadProgress, Uploader};
pub use valuables::VerificationLog;
