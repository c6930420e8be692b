//! WebSocket adapter error types.

use smartish_domain::error::SmartishError;
use tokio_tungstenite::tungstenite;

/// Errors specific to the WebSocket adapter.
#[derive(Debug, thiserror::Error)]
pub enum WsError {
    /// The WebSocket handshake failed.
    #[error("unable to connect to {url}")]
    Connect {
        url: String,
        #[source]
        source: tungstenite::Error,
    },

    /// Reading from the socket failed.
    #[error("WebSocket receive failed")]
    Receive(#[source] tungstenite::Error),

    /// The writer task has stopped, so nothing more can be sent.
    #[error("WebSocket writer closed")]
    WriterClosed,
}

impl WsError {
    /// Convert into a [`SmartishError::Transport`] for propagation across
    /// port boundaries.
    pub fn into_domain(self) -> SmartishError {
        SmartishError::Transport(Box::new(self))
    }
}

impl From<WsError> for SmartishError {
    fn from(err: WsError) -> Self {
        err.into_domain()
    }
}
