//! Command/response correlator — tracks in-flight requests by id.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::Mutex;

use smartish_domain::error::SmartishError;
use smartish_domain::id::RequestId;

use super::frame::{RequestKind, auth_frame, request_frame};
use super::sequencer::IdSequencer;
use crate::ports::{FrameSink, ServiceCall, ServiceCaller};

/// Sends requests and remembers what each pending id was for.
///
/// Cheap to clone; clones share the sequencer and the pending table, so
/// controllers can issue service calls while the session loop matches
/// responses.
pub struct Correlator<S> {
    inner: Arc<Inner<S>>,
}

struct Inner<S> {
    sink: S,
    sequencer: IdSequencer,
    pending: Mutex<HashMap<RequestId, RequestKind>>,
    // Held from id allocation until the frame is handed to the sink, so ids
    // reach the wire in increasing order.
    outbound: Mutex<()>,
}

impl<S> Clone for Correlator<S> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<S: FrameSink> Correlator<S> {
    pub fn new(sink: S) -> Self {
        Self {
            inner: Arc::new(Inner {
                sink,
                sequencer: IdSequencer::new(),
                pending: Mutex::new(HashMap::new()),
                outbound: Mutex::new(()),
            }),
        }
    }

    /// Allocate an id, record it as pending, and transmit the request.
    ///
    /// The record is made before transmission so a fast response can never
    /// miss it; it is removed again if transmission fails. Concurrent callers
    /// are serialized so the server always sees increasing ids.
    ///
    /// # Errors
    ///
    /// Propagates the transport error from the sink.
    pub async fn send(
        &self,
        kind: RequestKind,
        payload: Option<serde_json::Map<String, serde_json::Value>>,
    ) -> Result<RequestId, SmartishError> {
        let _outbound = self.inner.outbound.lock().await;
        let id = self.inner.sequencer.next_id();
        self.inner.pending.lock().await.insert(id, kind);
        tracing::debug!(request_id = %id, kind = %kind, "sending request");
        if let Err(err) = self.inner.sink.send(request_frame(id, kind, payload)).await {
            self.inner.pending.lock().await.remove(&id);
            return Err(err);
        }
        Ok(id)
    }

    /// Send the access token in reply to `auth_required`.
    ///
    /// # Errors
    ///
    /// Propagates the transport error from the sink.
    pub async fn authenticate(&self, token: &str) -> Result<(), SmartishError> {
        self.inner.sink.send(auth_frame(token)).await
    }

    /// What the pending request `id` was for.
    pub async fn lookup(&self, id: RequestId) -> Option<RequestKind> {
        self.inner.pending.lock().await.get(&id).copied()
    }

    /// Forget a completed request. Returns its kind if it was pending.
    pub async fn retire(&self, id: RequestId) -> Option<RequestKind> {
        self.inner.pending.lock().await.remove(&id)
    }

    /// Number of requests still awaiting a response (subscriptions included).
    pub async fn pending_count(&self) -> usize {
        self.inner.pending.lock().await.len()
    }
}

impl<S: FrameSink> ServiceCaller for Correlator<S> {
    async fn call_service(&self, call: ServiceCall) -> Result<RequestId, SmartishError> {
        let payload = match serde_json::to_value(call) {
            Ok(serde_json::Value::Object(map)) => map,
            Ok(_) => serde_json::Map::new(),
            Err(err) => return Err(SmartishError::MalformedFrame(err)),
        };
        self.send(RequestKind::CallService, Some(payload)).await
    }
}
