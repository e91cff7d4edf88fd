use crate::error::Result;
use async_trait::async_trait;
use std::collections::VecDeque;
use std::fmt;
use std::path::PathBuf;
use std::sync::Mutex;
use tokio::fs;
use tracing::{debug, info};

/// Device class a media source draws from; used for permission messaging
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MediaDevice {
    Camera,
    MediaLibrary,
}

impl fmt::Display for MediaDevice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MediaDevice::Camera => write!(f, "Camera"),
            MediaDevice::MediaLibrary => write!(f, "Media library"),
        }
    }
}

/// Outcome of a permission request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Permission {
    Granted,
    Denied,
}

/// Raw image acquired from a media source, before upload preparation
#[derive(Debug, Clone)]
pub struct CapturedImage {
    /// Origin reference (file path, device identifier) kept for display
    pub uri: String,
    pub bytes: Vec<u8>,
}

/// Abstraction over camera/gallery acquisition so the session logic does not
/// depend on any concrete device
#[async_trait]
pub trait MediaSource: Send + Sync {
    fn device(&self) -> MediaDevice;

    /// Ask the platform for access to the underlying device
    async fn request_permission(&self) -> Permission;

    /// Acquire a single image; Ok(None) means the user cancelled
    async fn capture_one(&self) -> Result<Option<CapturedImage>>;

    /// Acquire any number of images (multi-select); empty means cancelled
    async fn capture_many(&self) -> Result<Vec<CapturedImage>>;
}

/// Disk-backed media source used by the CLI: each queued path stands in for
/// one camera shot or gallery pick
pub struct FileSource {
    device: MediaDevice,
    queue: Mutex<VecDeque<PathBuf>>,
}

impl FileSource {
    pub fn new(device: MediaDevice, paths: Vec<PathBuf>) -> Self {
        info!("File media source created with {} file(s)", paths.len());
        Self {
            device,
            queue: Mutex::new(paths.into()),
        }
    }

    fn pop_next(&self) -> Option<PathBuf> {
        let mut queue = self.queue.lock().unwrap_or_else(|e| e.into_inner());
        queue.pop_front()
    }

    fn drain_all(&self) -> Vec<PathBuf> {
        let mut queue = self.queue.lock().unwrap_or_else(|e| e.into_inner());
        queue.drain(..).collect()
    }

    async fn read_image(path: PathBuf) -> Result<CapturedImage> {
        let bytes = fs::read(&path).await?;
        debug!("Read {} bytes from {}", bytes.len(), path.display());
        Ok(CapturedImage {
            uri: path.display().to_string(),
            bytes,
        })
    }
}

#[async_trait]
impl MediaSource for FileSource {
    fn device(&self) -> MediaDevice {
        self.device
    }

    async fn request_permission(&self) -> Permission {
        // Local files need no platform permission
        Permission::Granted
    }

    async fn capture_one(&self) -> Result<Option<CapturedImage>> {
        match self.pop_next() {
            Some(path) => Ok(Some(Self::read_image(path).await?)),
            None => Ok(None),
        }
    }

    async fn capture_many(&self) -> Result<Vec<CapturedImage>> {
        let mut images = Vec::new();
        for path in self.drain_all() {
            images.push(Self::read_image(path).await?);
        }
        Ok(images)
    }
}

/// Scripted media source for tests and demos: serves queued in-memory images
/// and can simulate denied permissions or user cancellation
pub struct MockMediaSource {
    device: MediaDevice,
    permission: Permission,
    queue: Mutex<VecDeque<CapturedImage>>,
}

impl MockMediaSource {
    pub fn new(device: MediaDevice) -> Self {
        Self {
            device,
            permission: Permission::Granted,
            queue: Mutex::new(VecDeque::new()),
        }
    }

    /// Simulate the user refusing the permission dialog
    pub fn deny_permission(mut self) -> Self {
        self.permission = Permission::Denied;
        self
    }

    /// Queue an image to be served by the next capture call
    pub fn with_image(self, uri: &str, bytes: Vec<u8>) -> Self {
        {
            let mut queue = self.queue.lock().unwrap_or_else(|e| e.into_inner());
            queue.push_back(CapturedImage {
                uri: uri.to_string(),
                bytes,
            });
        }
        self
    }
}

#[async_trait]
impl MediaSource for MockMediaSource {
    fn device(&self) -> MediaDevice {
        self.device
    }

    async fn request_permission(&self) -> Permission {
        self.permission
    }

    async fn capture_one(&self) -> Result<Option<CapturedImage>> {
        let mut queue = self.queue.lock().unwrap_or_else(|e| e.into_inner());
        Ok(queue.pop_front())
    }

    async fn capture_many(&self) -> Result<Vec<CapturedImage>> {
        let mut queue = self.queue.lock().unwrap_or_else(|e| e.into_inner());
        Ok(queue.drain(..).collect())
    }
}
