//! Message bridge between an editing surface and the document host.
//!
//! # Responsibility
//! - Define the envelope wire contract ([`messages`]).
//! - Correlate surface requests with host responses ([`client`]).
//! - Serve requests against a document store and template storage
//!   ([`host`]).
//!
//! # Invariants
//! - At most one mutating request is in flight per client.
//! - Every mutating request gets exactly one correlated result message.

pub mod client;
pub mod host;
pub mod messages;

use crate::repo::document_store::StoreError;
use crate::timeline::{DecodeError, TimelineError};
use std::error::Error;
use std::fmt::{Display, Formatter};

pub use client::{BridgeClient, Delivery};
pub use host::BridgeHost;
pub use messages::{InboundMessage, ModelState, OutboundMessage};

pub type BridgeResult<T> = Result<T, BridgeError>;

#[derive(Debug)]
pub enum BridgeError {
    /// Envelope is not a JSON object of the expected shape.
    Malformed(serde_json::Error),
    MissingAction,
    UnknownAction(String),
    Decode(DecodeError),
    /// A mutating request is still waiting for its result.
    Busy { pending: &'static str },
    /// A result arrived with no matching request.
    Unexpected(String),
    Timeline(TimelineError),
    Store(StoreError),
}

impl Display for BridgeError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Malformed(err) => write!(f, "malformed message: {err}"),
            Self::MissingAction => write!(f, "message has no `action`"),
            Self::UnknownAction(action) => write!(f, "unknown action: {action}"),
            Self::Decode(err) => write!(f, "{err}"),
            Self::Busy { pending } => write!(f, "busy: {pending} is still in flight"),
            Self::Unexpected(action) => write!(f, "uncorrelated response: {action}"),
            Self::Timeline(err) => write!(f, "{err}"),
            Self::Store(err) => write!(f, "{err}"),
        }
    }
}

impl Error for BridgeError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Malformed(err) => Some(err),
            Self::Decode(err) => Some(err),
            Self::Timeline(err) => Some(err),
            Self::Store(err) => Some(err),
            _ => None,
        }
    }
}

impl From<serde_json::Error> for BridgeError {
    fn from(value: serde_json::Error) -> Self {
        Self::Malformed(value)
    }
}

impl From<DecodeError> for BridgeError {
    fn from(value: DecodeError) -> Self {
        Self::Decode(value)
    }
}

impl From<TimelineError> for BridgeError {
    fn from(value: TimelineError) -> Self {
        Self::Timeline(value)
    }
}

impl From<StoreError> for BridgeError {
    fn from(value: StoreError) -> Self {
        Self::Store(value)
    }
}
