use std::fmt;

use serde::{Deserialize, Serialize};

use crate::fetch::FetchedPage;

/// Server-side operations the watcher issues against the site.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ServerOp {
    CheckFulfillmentStatus,
    ReserveItem,
    StartFulfillment,
}

impl ServerOp {
    /// Idempotence key used by the request client.
    pub fn key(self) -> &'static str {
        match self {
            ServerOp::CheckFulfillmentStatus => "fulfillment-status",
            ServerOp::ReserveItem => "reserve",
            ServerOp::StartFulfillment => crate::request::LEAVING_KEY,
        }
    }
}

/// Site-relative endpoint paths for each [`ServerOp`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Endpoints {
    pub fulfillment_status: String,
    pub reserve: String,
    pub start_fulfillment: String,
}

impl Default for Endpoints {
    fn default() -> Self {
        Self {
            fulfillment_status: "/ajax/delivery/status".to_string(),
            reserve: "/ajax/delivery/reserve".to_string(),
            start_fulfillment: "/ajax/delivery/start".to_string(),
        }
    }
}

impl Endpoints {
    pub fn path(&self, op: ServerOp) -> &str {
        match op {
            ServerOp::CheckFulfillmentStatus => &self.fulfillment_status,
            ServerOp::ReserveItem => &self.reserve,
            ServerOp::StartFulfillment => &self.start_fulfillment,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EngineEvent {
    PageLoaded {
        path: String,
        page: FetchedPage,
    },
    PageFailed {
        path: String,
        error: FetchError,
    },
    StatusChecked(Result<bool, FetchError>),
    ReservationSettled {
        item_id: String,
        result: Result<(), FetchError>,
    },
    FulfillmentStartSettled(Result<(), FetchError>),
    AlertFinished,
    TimerFired {
        token: u64,
    },
    /// The site answered 403; the session must be re-established.
    LoginRequired,
    /// A request failed and nobody handled it; the page should be reloaded.
    ReloadSuggested(FetchError),
    ShutdownRequested,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{kind}: {message}")]
pub struct FetchError {
    pub kind: FailureKind,
    pub message: String,
}

impl FetchError {
    pub(crate) fn new(kind: FailureKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    /// HTTP status carried by the failure, if the server answered at all.
    pub fn status(&self) -> Option<u16> {
        match self.kind {
            FailureKind::HttpStatus(code) => Some(code),
            FailureKind::Unauthorized => Some(403),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FailureKind {
    InvalidUrl,
    Unauthorized,
    HttpStatus(u16),
    Timeout,
    TooLarge { max_bytes: u64, actual: Option<u64> },
    UnsupportedContentType { content_type: String },
    InvalidResponse,
    Network,
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FailureKind::InvalidUrl => write!(f, "invalid url"),
            FailureKind::Unauthorized => write!(f, "unauthorized"),
            FailureKind::HttpStatus(code) => write!(f, "http status {code}"),
            FailureKind::Timeout => write!(f, "timeout"),
            FailureKind::TooLarge { max_bytes, actual } => {
                write!(f, "response too large (max {max_bytes}, actual {actual:?})")
            }
            FailureKind::UnsupportedContentType { content_type } => {
                write!(f, "unsupported content type {content_type}")
            }
            FailureKind::InvalidResponse => write!(f, "invalid response body"),
            FailureKind::Network => write!(f, "network error"),
        }
    }
}

pub(crate) fn map_reqwest_error(err: reqwest::Error) -> FetchError {
    if err.is_timeout() {
        return FetchError::new(FailureKind::Timeout, err.to_string());
    }
    FetchError::new(FailureKind::Network, err.to_string())
}
