//! Port definitions — traits that adapters implement.
//!
//! Ports are the boundaries between the bridge core and the outside world:
//! the home-automation protocol transport, the message bus, and the state
//! file. They are defined here (in `app`) so that both the use-case layer and
//! the adapter layer can depend on them without creating circular
//! dependencies.

pub mod message_bus;
pub mod service_caller;
pub mod state_store;
pub mod transport;

pub use message_bus::{BusMessage, MessageBus, Subscription};
pub use service_caller::{ServiceCall, ServiceCaller};
pub use state_store::StateStore;
pub use transport::{FrameSink, FrameSource};
