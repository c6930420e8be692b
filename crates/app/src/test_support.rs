//! In-memory port fakes shared by the unit tests of this crate.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};

use tokio::sync::mpsc;

use smartish_domain::error::SmartishError;
use smartish_domain::id::RequestId;

use crate::ports::{
    BusMessage, FrameSink, FrameSource, MessageBus, ServiceCall, ServiceCaller, Subscription,
};

fn io_error(message: &str) -> Box<dyn std::error::Error + Send + Sync> {
    Box::new(std::io::Error::other(message.to_string()))
}

// ── Message bus ────────────────────────────────────────────────────

#[derive(Default)]
struct BusInner {
    published: Vec<(String, String)>,
    subscribers: HashMap<String, mpsc::Sender<BusMessage>>,
    subscribed: Vec<String>,
    unsubscribed: Vec<String>,
    failing_filters: Vec<String>,
}

/// Records publishes and lets tests inject command messages.
#[derive(Clone, Default)]
pub struct RecordingBus {
    inner: Arc<Mutex<BusInner>>,
}

impl RecordingBus {
    pub fn published(&self) -> Vec<(String, String)> {
        self.inner.lock().unwrap().published.clone()
    }

    pub fn published_on(&self, topic: &str) -> Vec<String> {
        self.published()
            .into_iter()
            .filter(|(t, _)| t == topic)
            .map(|(_, payload)| payload)
            .collect()
    }

    pub fn last_on(&self, topic: &str) -> Option<String> {
        self.published_on(topic).pop()
    }

    pub fn clear(&self) {
        self.inner.lock().unwrap().published.clear();
    }

    pub fn subscribed(&self) -> Vec<String> {
        self.inner.lock().unwrap().subscribed.clone()
    }

    pub fn unsubscribed(&self) -> Vec<String> {
        self.inner.lock().unwrap().unsubscribed.clone()
    }

    /// Make the next subscribe to `filter` fail.
    pub fn fail_subscribe(&self, filter: &str) {
        self.inner.lock().unwrap().failing_filters.push(filter.to_string());
    }

    pub async fn inject(&self, topic: &str, payload: &str) {
        let sender = self.inner.lock().unwrap().subscribers.get(topic).cloned();
        if let Some(sender) = sender {
            let _ = sender
                .send(BusMessage {
                    topic: topic.to_string(),
                    payload: payload.to_string(),
                })
                .await;
        }
    }
}

impl MessageBus for RecordingBus {
    async fn publish(&self, topic: &str, payload: String) -> Result<(), SmartishError> {
        self.inner
            .lock()
            .unwrap()
            .published
            .push((topic.to_string(), payload));
        Ok(())
    }

    async fn subscribe(&self, filter: &str) -> Result<Subscription, SmartishError> {
        let (tx, rx) = mpsc::channel(16);
        let mut inner = self.inner.lock().unwrap();
        if let Some(index) = inner.failing_filters.iter().position(|f| f == filter) {
            inner.failing_filters.remove(index);
            return Err(SmartishError::Bus(io_error("subscribe refused")));
        }
        inner.subscribers.insert(filter.to_string(), tx);
        inner.subscribed.push(filter.to_string());
        Ok(Subscription::new(rx))
    }

    async fn unsubscribe(&self, filter: &str) -> Result<(), SmartishError> {
        let mut inner = self.inner.lock().unwrap();
        inner.subscribers.remove(filter);
        inner.unsubscribed.push(filter.to_string());
        Ok(())
    }
}

// ── Service caller ─────────────────────────────────────────────────

#[derive(Default)]
struct CallerInner {
    calls: Vec<ServiceCall>,
    fail: bool,
    next_id: u64,
}

/// Records service calls; can be told to fail.
#[derive(Clone, Default)]
pub struct RecordingCaller {
    inner: Arc<Mutex<CallerInner>>,
}

impl RecordingCaller {
    pub fn calls(&self) -> Vec<ServiceCall> {
        self.inner.lock().unwrap().calls.clone()
    }

    pub fn fail_calls(&self, fail: bool) {
        self.inner.lock().unwrap().fail = fail;
    }
}

impl ServiceCaller for RecordingCaller {
    async fn call_service(&self, call: ServiceCall) -> Result<RequestId, SmartishError> {
        let mut inner = self.inner.lock().unwrap();
        if inner.fail {
            return Err(SmartishError::Transport(io_error("sink closed")));
        }
        inner.calls.push(call);
        inner.next_id += 1;
        Ok(RequestId::new(inner.next_id))
    }
}

// ── Protocol transport ─────────────────────────────────────────────

#[derive(Default)]
struct SinkInner {
    frames: Vec<serde_json::Value>,
    fail: bool,
}

/// Records outbound frames.
#[derive(Clone, Default)]
pub struct RecordingSink {
    inner: Arc<Mutex<SinkInner>>,
}

impl RecordingSink {
    pub fn frames(&self) -> Vec<serde_json::Value> {
        self.inner.lock().unwrap().frames.clone()
    }

    pub fn frames_of_type(&self, kind: &str) -> Vec<serde_json::Value> {
        self.frames()
            .into_iter()
            .filter(|frame| frame["type"] == kind)
            .collect()
    }

    pub fn fail_sends(&self, fail: bool) {
        self.inner.lock().unwrap().fail = fail;
    }
}

impl FrameSink for RecordingSink {
    async fn send(&self, frame: serde_json::Value) -> Result<(), SmartishError> {
        let mut inner = self.inner.lock().unwrap();
        if inner.fail {
            return Err(SmartishError::Transport(io_error("sink closed")));
        }
        inner.frames.push(frame);
        Ok(())
    }
}

/// Replays scripted frames, then either reports the connection closed or
/// idles forever.
pub struct ScriptedSource {
    frames: VecDeque<serde_json::Value>,
    idle_when_drained: bool,
}

impl ScriptedSource {
    pub fn closing(frames: Vec<serde_json::Value>) -> Self {
        Self {
            frames: frames.into(),
            idle_when_drained: false,
        }
    }

    pub fn idling(frames: Vec<serde_json::Value>) -> Self {
        Self {
            frames: frames.into(),
            idle_when_drained: true,
        }
    }
}

impl FrameSource for ScriptedSource {
    async fn recv(&mut self) -> Result<Option<serde_json::Value>, SmartishError> {
        if let Some(frame) = self.frames.pop_front() {
            return Ok(Some(frame));
        }
        if self.idle_when_drained {
            std::future::pending::<()>().await;
        }
        Ok(None)
    }
}

/// Let spawned tasks run until they are all idle.
pub async fn settle() {
    tokio::time::sleep(std::time::Duration::from_millis(1)).await;
}
