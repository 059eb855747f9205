//! # Boa socket bridge
//!
//! Gives a script running in a sandboxed Boa engine access to the host's
//! WebSockets. The script sees four exported functions and must define four
//! callbacks:
//!
//! ```js
//! function websocket_on_open(handle) {}
//! function websocket_on_message(handle, data, length) {} // data is only valid during the call
//! function websocket_on_error(handle) {}
//! function websocket_on_close(handle) {}
//!
//! var handle = websocket_create('wss://example.com/echo'); // 0 on failure
//! websocket_send(handle, new Uint8Array([1, 2]), 2);       // ignored unless open
//! websocket_ready_state(handle);                            // 0..3
//! websocket_destroy(handle);
//! ```
//!
//! Only binary frames are carried. Connections run on a shared Tokio runtime
//! through tokio-tungstenite; every callback runs on the engine thread.
//!
//! ```rust,no_run
//! use boa_socket_bridge::{JsEngineBuilder, SocketBridgeConfig};
//!
//! let engine = JsEngineBuilder::new()
//!     .with_config(SocketBridgeConfig::new().with_origin("http://localhost"))
//!     .build()
//!     .unwrap();
//! engine.client().execute("var h = websocket_create('ws://localhost:9001');");
//! ```

mod config;
mod error;
pub mod js;

pub use config::{CallbackNames, ExportNames, SocketBridgeConfig};
pub use error::{BridgeError, BridgeResult};
pub use js::websocket::{
    EventSink, HostSocket, Listeners, ModuleCallbacks, ReadyState, SocketBridge, SocketConnector,
    SocketEvent, SocketHandle, TungsteniteConnector,
};
pub use js::{JsCommand, JsEngine, JsEngineBuilder, JsEngineClient};
