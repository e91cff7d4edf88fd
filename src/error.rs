use crate::session::SubmitBlocker;
use crate::source::MediaDevice;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum InspectError {
    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] toml::ser::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("API error ({status}): {message}")]
    Api { status: u16, message: String },

    #[error("{device} permission denied")]
    PermissionDenied { device: MediaDevice },

    #[error("Submission blocked: {0}")]
    Validation(SubmitBlocker),

    #[error("Component error in {component}: {message}")]
    Component { component: String, message: String },
}

impl InspectError {
    pub fn api(status: u16, message: impl Into<String>) -> Self {
        Self::Api {
            status,
            message: message.into(),
        }
    }

    pub fn component(component: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Component {
            component: component.into(),
            message: message.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, InspectError>;
