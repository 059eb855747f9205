//! Bridge configuration
//!
//! Every field has a default, so a partial JSON document (or none at all)
//! yields a working configuration.

use serde::Deserialize;

use crate::error::BridgeResult;

/// Names of the functions exported into the script's global scope.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct ExportNames {
    pub create: String,
    pub send: String,
    pub destroy: String,
    pub ready_state: String,
}

impl Default for ExportNames {
    fn default() -> Self {
        Self {
            create: "websocket_create".to_string(),
            send: "websocket_send".to_string(),
            destroy: "websocket_destroy".to_string(),
            ready_state: "websocket_ready_state".to_string(),
        }
    }
}

/// Names of the global functions the module must define to receive events.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct CallbackNames {
    pub on_open: String,
    pub on_message: String,
    pub on_error: String,
    pub on_close: String,
}

impl Default for CallbackNames {
    fn default() -> Self {
        Self {
            on_open: "websocket_on_open".to_string(),
            on_message: "websocket_on_message".to_string(),
            on_error: "websocket_on_error".to_string(),
            on_close: "websocket_on_close".to_string(),
        }
    }
}

/// Configuration for the socket bridge and its host connections.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct SocketBridgeConfig {
    pub exports: ExportNames,
    pub callbacks: CallbackNames,
    /// Sent as the `Origin` header of every handshake.
    pub origin: Option<String>,
    /// Offered through `Sec-WebSocket-Protocol`.
    pub subprotocols: Vec<String>,
}

impl SocketBridgeConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse a configuration from JSON, defaulting any missing field.
    pub fn from_json(source: &str) -> BridgeResult<Self> {
        Ok(serde_json::from_str(source)?)
    }

    pub fn with_origin(mut self, origin: impl Into<String>) -> Self {
        self.origin = Some(origin.into());
        self
    }

    pub fn with_subprotocol(mut self, protocol: impl Into<String>) -> Self {
        self.subprotocols.push(protocol.into());
        self
    }
}
