//! WebSocket bridge for the Boa JS engine
//!
//! Exposes binary WebSockets to the script as integer handles, backed by
//! tokio-tungstenite. The script calls the exported create/send/destroy
//! functions; host events come back through the engine's command channel
//! and are delivered to the module's callback functions.

mod bridge;
mod extension;
mod manager;
mod registry;
#[cfg(test)]
pub(crate) mod testing;

pub use bridge::{
    EventSink, HostSocket, Listeners, ModuleCallbacks, ReadyState, SocketBridge, SocketConnector,
    SocketEvent, parse_socket_url,
};
pub(crate) use extension::{ContextCallbacks, register_socket_functions};
pub use manager::{TungsteniteConnector, TungsteniteSocket};
pub use registry::{HandleRegistry, SocketHandle};
