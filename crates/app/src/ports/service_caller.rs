//! Service-call port — asks the home-automation server to act on an entity.

use std::future::Future;

use serde::Serialize;

use smartish_domain::error::SmartishError;
use smartish_domain::id::{EntityId, RequestId};

/// A `call_service` request body.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ServiceCall {
    pub domain: String,
    pub service: String,
    pub service_data: serde_json::Value,
}

impl ServiceCall {
    /// `climate.set_temperature` for one actuator.
    #[must_use]
    pub fn set_temperature(entity_id: &EntityId, temperature: f64) -> Self {
        Self {
            domain: "climate".to_string(),
            service: "set_temperature".to_string(),
            service_data: serde_json::json!({
                "entity_id": entity_id,
                "temperature": temperature,
            }),
        }
    }
}

/// Issues service calls. There is no execution acknowledgement: success only
/// means the request was handed to the transport.
pub trait ServiceCaller: Clone + Send + Sync + 'static {
    fn call_service(
        &self,
        call: ServiceCall,
    ) -> impl Future<Output = Result<RequestId, SmartishError>> + Send;
}
