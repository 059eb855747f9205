use std::sync::mpsc;

use crate::error::{BridgeError, BridgeResult};
use crate::js::JsCommand;
use crate::js::websocket::{EventSink, SocketEvent, SocketHandle};

/// Client handle for communicating with the JS engine thread.
///
/// Cheap to clone and safe to share across threads. Host socket tasks use
/// it as their [`EventSink`], so their events reach the engine in order.
#[derive(Clone)]
pub struct JsEngineClient {
    pub(crate) sender: mpsc::Sender<JsCommand>,
}

impl JsEngineClient {
    /// Run pending jobs and timers.
    pub fn flush_event_loop(&self) {
        if let Err(e) = self.sender.send(JsCommand::FlushEventLoop) {
            log::warn!("Failed to send flush event loop command: {}", e);
        }
    }

    /// Execute a script.
    pub fn execute(&self, source: impl Into<String>) {
        if let Err(e) = self.sender.send(JsCommand::Execute {
            source: source.into(),
        }) {
            log::error!("Failed to send execute command: {}", e);
        }
    }

    /// Execute a script and wait for its result as a string.
    pub fn evaluate(&self, source: impl Into<String>) -> BridgeResult<String> {
        let (reply, response) = mpsc::channel();
        self.sender
            .send(JsCommand::Evaluate {
                source: source.into(),
                reply,
            })
            .map_err(|e| BridgeError::Engine(format!("Failed to send evaluate command: {}", e)))?;
        response
            .recv()
            .map_err(|e| BridgeError::Engine(format!("JS engine stopped: {}", e)))?
            .map_err(BridgeError::Engine)
    }

    /// Shutdown the JS engine.
    pub fn shutdown(&self) {
        let _ = self.sender.send(JsCommand::Shutdown);
    }
}

impl EventSink for JsEngineClient {
    fn push(&self, handle: SocketHandle, event: SocketEvent) {
        if let Err(e) = self.sender.send(JsCommand::SocketEvent { handle, event }) {
            log::warn!("[WebSocket {}] JS engine gone, event dropped: {}", handle, e);
        }
    }
}
