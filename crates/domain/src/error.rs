//! Common error types used across the workspace.
//!
//! Each layer defines its own typed errors and converts into
//! [`SmartishError`] at port boundaries.

/// Boxed error used by adapters to carry their own typed failures across
/// port boundaries.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Top-level error shared by every crate in the workspace.
#[derive(Debug, thiserror::Error)]
pub enum SmartishError {
    /// A value failed a domain invariant.
    #[error("validation error")]
    Validation(#[from] ValidationError),

    /// The home-automation server rejected the access token.
    #[error("authentication rejected: {0}")]
    AuthRejected(String),

    /// The protocol connection was closed by the peer.
    #[error("protocol connection closed")]
    ConnectionClosed,

    /// An inbound frame could not be decoded.
    #[error("malformed frame")]
    MalformedFrame(#[source] serde_json::Error),

    /// The protocol transport failed.
    #[error("transport error")]
    Transport(#[source] BoxError),

    /// The message bus failed.
    #[error("message bus error")]
    Bus(#[source] BoxError),

    /// The state store failed.
    #[error("storage error")]
    Storage(#[source] BoxError),
}

/// Domain invariant violations.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ValidationError {
    /// A mode command carried something other than `heat` or `off`.
    #[error("unsupported climate mode: {0:?}")]
    InvalidMode(String),

    /// A setpoint command was not a finite number.
    #[error("invalid setpoint: {0:?}")]
    InvalidSetpoint(String),

    /// Temperature bounds are empty or inverted.
    #[error("invalid temperature bounds: min {min} must be below max {max}")]
    InvalidBounds { min: f64, max: f64 },
}
