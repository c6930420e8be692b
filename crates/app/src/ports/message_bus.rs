//! Message bus port — publish/subscribe towards the home-automation front end.

use std::future::Future;

use tokio::sync::mpsc;

use smartish_domain::error::SmartishError;

/// A message received on a subscribed topic.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BusMessage {
    pub topic: String,
    pub payload: String,
}

/// Stream of messages matching one topic filter.
///
/// Dropping the subscription stops delivery to it.
#[derive(Debug)]
pub struct Subscription {
    receiver: mpsc::Receiver<BusMessage>,
}

impl Subscription {
    #[must_use]
    pub fn new(receiver: mpsc::Receiver<BusMessage>) -> Self {
        Self { receiver }
    }

    /// Wait for the next message; `None` once the bus side is gone.
    pub async fn recv(&mut self) -> Option<BusMessage> {
        self.receiver.recv().await
    }
}

/// Publish/subscribe client.
pub trait MessageBus: Clone + Send + Sync + 'static {
    /// Publish `payload` on `topic` (not retained).
    fn publish(
        &self,
        topic: &str,
        payload: String,
    ) -> impl Future<Output = Result<(), SmartishError>> + Send;

    /// Subscribe to a topic filter.
    fn subscribe(
        &self,
        filter: &str,
    ) -> impl Future<Output = Result<Subscription, SmartishError>> + Send;

    /// Drop a subscription previously created with [`subscribe`](Self::subscribe).
    fn unsubscribe(&self, filter: &str) -> impl Future<Output = Result<(), SmartishError>> + Send;
}
