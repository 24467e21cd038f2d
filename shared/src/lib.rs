#![forbid(unsafe_code)]
#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::must_use_candidate)]
#![allow(clippy::missing_errors_doc)]

pub mod app;
pub mod capabilities;
pub mod category_cache;
pub mod config;
pub mod coordinator;
pub mod event;
pub mod favorites;
pub mod image_cache;
pub mod model;
pub mod remote;
pub mod session;
#[cfg(any(test, feature = "test-utils"))]
pub mod testing;

use serde::{Deserialize, Serialize};
use thiserror::Error;

pub use app::{App, Capabilities, Effect, Model, ViewModel};
pub use category_cache::CategoryCache;
pub use config::ClientConfig;
pub use coordinator::SyncCoordinator;
pub use event::Event;
pub use favorites::FavoritesShadowCache;
pub use image_cache::ImageCache;
pub use model::{
    AuthToken, Category, CategoryId, DisplayMode, GalleryImage, ImageId, Session, UserId,
};
pub use remote::{GalleryApi, GalleryRoutes, RemoteClient};
pub use session::SessionState;

pub const DEFAULT_BASE_URL: &str = "http://tomnab.fr/img-api/";
pub const FAVORITES_TITLE: &str = "Coups de coeur";
pub const DEFAULT_AUTH_HEADER: &str = "hash";
pub const MAX_ERROR_REASON_LENGTH: usize = 512;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ErrorKind {
    Transport,
    Rejected,
    MalformedResponse,
    PreconditionViolation,
    InvalidRequest,
}

impl ErrorKind {
    #[must_use]
    pub const fn code(self) -> &'static str {
        match self {
            Self::Transport => "TRANSPORT_FAILURE",
            Self::Rejected => "REJECTED_BY_SERVER",
            Self::MalformedResponse => "MALFORMED_RESPONSE",
            Self::PreconditionViolation => "PRECONDITION_VIOLATION",
            Self::InvalidRequest => "INVALID_REQUEST",
        }
    }

    /// Whether a caller-side retry could plausibly succeed. The core never retries.
    #[must_use]
    pub const fn is_retryable(self) -> bool {
        matches!(self, Self::Transport)
    }
}

/// The `Failure` half of every [`Outcome`].
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize)]
pub enum GalleryError {
    #[error("no response from server: {reason}")]
    Transport { reason: String },

    #[error("server rejected request (HTTP {status}): {reason}")]
    Rejected { status: u16, reason: String },

    #[error("malformed response: {reason}")]
    MalformedResponse { reason: String },

    #[error("{operation} requires an authenticated session")]
    PreconditionViolation { operation: &'static str },

    #[error("invalid request: {reason}")]
    InvalidRequest { reason: String },
}

impl GalleryError {
    pub fn transport(reason: impl Into<String>) -> Self {
        Self::Transport {
            reason: bounded(reason.into()),
        }
    }

    pub fn rejected(status: u16, reason: impl Into<String>) -> Self {
        Self::Rejected {
            status,
            reason: bounded(reason.into()),
        }
    }

    pub fn malformed(reason: impl Into<String>) -> Self {
        Self::MalformedResponse {
            reason: bounded(reason.into()),
        }
    }

    pub const fn precondition(operation: &'static str) -> Self {
        Self::PreconditionViolation { operation }
    }

    #[must_use]
    pub const fn kind(&self) -> ErrorKind {
        match self {
            Self::Transport { .. } => ErrorKind::Transport,
            Self::Rejected { .. } => ErrorKind::Rejected,
            Self::MalformedResponse { .. } => ErrorKind::MalformedResponse,
            Self::PreconditionViolation { .. } => ErrorKind::PreconditionViolation,
            Self::InvalidRequest { .. } => ErrorKind::InvalidRequest,
        }
    }

    #[must_use]
    pub const fn code(&self) -> &'static str {
        self.kind().code()
    }

    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        self.kind().is_retryable()
    }

    /// Builds a `Rejected` error from a non-success response, preferring the
    /// server's own `message` when the body is a JSON error document.
    #[must_use]
    pub fn from_status(status: u16, body: Option<&[u8]>) -> Self {
        let reason = body
            .and_then(|b| serde_json::from_slice::<ApiErrorResponse>(b).ok())
            .map(|e| e.message)
            .filter(|m| !m.is_empty())
            .unwrap_or_else(|| format!("HTTP error: {status}"));

        Self::rejected(status, reason)
    }
}

impl From<capabilities::HttpError> for GalleryError {
    fn from(e: capabilities::HttpError) -> Self {
        if e.is_transport() {
            return Self::transport(e.to_string());
        }
        match e {
            capabilities::HttpError::InvalidResponse { .. } => Self::malformed(e.to_string()),
            _ => Self::InvalidRequest {
                reason: bounded(e.to_string()),
            },
        }
    }
}

impl From<config::ConfigError> for GalleryError {
    fn from(e: config::ConfigError) -> Self {
        Self::InvalidRequest {
            reason: bounded(e.to_string()),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
struct ApiErrorResponse {
    #[serde(default)]
    message: String,
}

/// `Success(T) | Failure(reason)`.
pub type Outcome<T> = Result<T, GalleryError>;

fn bounded(mut reason: String) -> String {
    if reason.len() > MAX_ERROR_REASON_LENGTH {
        let mut end = MAX_ERROR_REASON_LENGTH;
        while !reason.is_char_boundary(end) {
            end -= 1;
        }
        reason.truncate(end);
    }
    reason
}
