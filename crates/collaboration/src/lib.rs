/// Client side of the collaborative annotation store
/// Wire protocol, store access, push notifications and the editing workspace
use thiserror::Error;

pub use protocol::*;

mod store;
pub use store::*;

mod http;
pub use http::*;

mod push;
pub use push::*;

mod workspace;
pub use workspace::*;

#[derive(Debug, Error)]
pub enum CollaborationError {
    #[error("network error: {0}")]
    NetworkError(String),

    #[error("server returned {status}: {message}")]
    HttpError { status: u16, message: String },

    #[error("not authenticated")]
    Unauthorized,

    #[error("serialization error: {0}")]
    SerializationError(String),

    #[error("invalid url: {0}")]
    InvalidUrl(String),
}

impl CollaborationError {
    /// 401/403 from the store: the token is gone and the user must log in again.
    pub fn requires_login(&self) -> bool {
        matches!(self, Self::Unauthorized)
    }
}

impl From<reqwest::Error> for CollaborationError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            Self::SerializationError(err.to_string())
        } else {
            Self::NetworkError(err.to_string())
        }
    }
}

impl From<serde_json::Error> for CollaborationError {
    fn from(err: serde_json::Error) -> Self {
        Self::SerializationError(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, CollaborationError>;
