//! Wire frames of the home-automation WebSocket API.

use serde::Deserialize;

use smartish_domain::entity::EntityState;
use smartish_domain::error::SmartishError;
use smartish_domain::id::RequestId;

/// Event type the session subscribes to once bootstrapped.
pub const STATE_CHANGED: &str = "state_changed";

/// Kind of an outbound, id-correlated request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RequestKind {
    AreaRegistryList,
    DeviceRegistryList,
    EntityRegistryList,
    GetStates,
    SubscribeEvents,
    CallService,
}

impl RequestKind {
    /// The `type` string sent on the wire.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::AreaRegistryList => "config/area_registry/list",
            Self::DeviceRegistryList => "config/device_registry/list",
            Self::EntityRegistryList => "config/entity_registry/list",
            Self::GetStates => "get_states",
            Self::SubscribeEvents => "subscribe_events",
            Self::CallService => "call_service",
        }
    }

    /// Subscriptions keep receiving frames under their id and are never retired.
    #[must_use]
    pub fn is_subscription(self) -> bool {
        matches!(self, Self::SubscribeEvents)
    }
}

impl std::fmt::Display for RequestKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Build an id-correlated request frame: `{id, type, ...payload}`.
#[must_use]
pub fn request_frame(
    id: RequestId,
    kind: RequestKind,
    payload: Option<serde_json::Map<String, serde_json::Value>>,
) -> serde_json::Value {
    let mut frame = payload.unwrap_or_default();
    frame.insert("id".to_string(), serde_json::json!(id));
    frame.insert("type".to_string(), serde_json::json!(kind.as_str()));
    serde_json::Value::Object(frame)
}

/// Build the (uncorrelated) authentication frame.
#[must_use]
pub fn auth_frame(token: &str) -> serde_json::Value {
    serde_json::json!({ "type": "auth", "access_token": token })
}

/// A decoded inbound frame.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum InboundFrame {
    AuthRequired,
    AuthOk,
    AuthInvalid {
        #[serde(default)]
        message: Option<String>,
    },
    Result {
        id: RequestId,
        #[serde(default)]
        success: bool,
        #[serde(default)]
        result: Option<serde_json::Value>,
        #[serde(default)]
        error: Option<serde_json::Value>,
    },
    Event {
        id: RequestId,
        event: EventPayload,
    },
    #[serde(other)]
    Unsupported,
}

impl InboundFrame {
    /// Decode a raw frame.
    ///
    /// # Errors
    ///
    /// Returns [`SmartishError::MalformedFrame`] when the frame has no
    /// recognisable shape.
    pub fn decode(raw: serde_json::Value) -> Result<Self, SmartishError> {
        serde_json::from_value(raw).map_err(SmartishError::MalformedFrame)
    }
}

/// The `event` member of an event frame.
#[derive(Debug, Clone, Deserialize)]
pub struct EventPayload {
    pub event_type: String,
    #[serde(default)]
    pub data: serde_json::Value,
}

impl EventPayload {
    /// The new state carried by a `state_changed` event.
    ///
    /// `Ok(None)` means the entity was removed (`new_state` is `null`).
    ///
    /// # Errors
    ///
    /// Returns [`SmartishError::MalformedFrame`] when `new_state` is present
    /// but is not a state object.
    pub fn new_state(&self) -> Result<Option<EntityState>, SmartishError> {
        match self.data.get("new_state") {
            None | Some(serde_json::Value::Null) => Ok(None),
            Some(raw) => serde_json::from_value(raw.clone())
                .map(Some)
                .map_err(SmartishError::MalformedFrame),
        }
    }
}
