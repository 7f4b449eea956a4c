//! Error taxonomy for the dispatch core.
//!
//! None of these are fatal: the control loop logs and absorbs every variant.

use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ErrorKind {
    /// Payload did not decode into any known message shape.
    #[error("payload did not decode: {0}")]
    ParseError(String),

    /// A delete referenced a schedule entry that is not pending.
    #[error("no matching schedule entry")]
    NotFound,

    /// Wall clock has not been synchronised yet.
    #[error("wall clock is not synchronised")]
    ClockUnavailable,

    #[error("transport disconnected: {0}")]
    TransportDisconnected(String),

    /// The outbound request queue rejected a publish or subscribe.
    #[error("request for '{topic}' rejected: {reason}")]
    PublishFailed { topic: String, reason: String },
}

impl From<serde_json::Error> for ErrorKind {
    fn from(e: serde_json::Error) -> Self {
        Self::ParseError(e.to_string())
    }
}
