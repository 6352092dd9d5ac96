//! Bridge and transport failures.

use cmdline_contract::BridgeFault;
use cmdline_engine::TypeError;
use thiserror::Error;

/// Transport-level failures.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TransportError {
    /// The transport was closed by either side.
    #[error("transport closed")]
    Closed,
    /// No peer is reachable.
    #[error("transport unavailable: {0}")]
    Unavailable(String),
}

/// Failures of a front call.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum BridgeError {
    /// The request never completed a round trip.
    #[error(transparent)]
    Transport(#[from] TransportError),
    /// The actor rejected the request.
    #[error("remote fault: {0}")]
    Fault(BridgeFault),
    /// A newer call of the same operation was issued before this one completed.
    #[error("`{op}` request superseded by a newer one")]
    Superseded {
        /// Operation name.
        op: &'static str,
    },
    /// A frame could not be encoded or decoded, or answered another request.
    #[error("protocol error: {0}")]
    Protocol(String),
    /// The client-side remote type could not be installed.
    #[error(transparent)]
    Type(#[from] TypeError),
}

impl From<serde_json::Error> for BridgeError {
    fn from(err: serde_json::Error) -> Self {
        Self::Protocol(err.to_string())
    }
}
