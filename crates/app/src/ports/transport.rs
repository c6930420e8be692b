//! Protocol transport port — one decoded JSON frame per call.

use std::future::Future;

use smartish_domain::error::SmartishError;

/// Outbound half of the protocol connection.
///
/// Each call enqueues exactly one frame; frames are delivered in call order.
pub trait FrameSink: Clone + Send + Sync + 'static {
    /// Enqueue a frame for transmission.
    fn send(
        &self,
        frame: serde_json::Value,
    ) -> impl Future<Output = Result<(), SmartishError>> + Send;
}

/// Inbound half of the protocol connection.
pub trait FrameSource: Send {
    /// Wait for the next frame.
    ///
    /// Returns `Ok(None)` once the peer has closed the connection.
    fn recv(
        &mut self,
    ) -> impl Future<Output = Result<Option<serde_json::Value>, SmartishError>> + Send;
}
