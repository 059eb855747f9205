//! JavaScript Engine
//!
//! Runs the Boa context on a dedicated worker thread. Scripts, host socket
//! events and shutdown all arrive through one command channel, so the
//! module only ever runs on this thread and sees events in arrival order.

use boa_engine::{Context, Source};
use std::rc::Rc;
use std::sync::mpsc::{Receiver, Sender};
use std::thread::JoinHandle;

use crate::config::SocketBridgeConfig;
use crate::js::JsEngineClient;
use crate::js::websocket::{ContextCallbacks, SocketBridge, SocketEvent, SocketHandle};

/// Commands that can be sent to the JS engine thread.
#[derive(Debug)]
pub enum JsCommand {
    /// Execute a JS script.
    Execute { source: String },
    /// Execute a JS script and reply with its value converted to a string.
    Evaluate {
        source: String,
        reply: Sender<Result<String, String>>,
    },
    /// Deliver a host socket event to the module.
    SocketEvent {
        handle: SocketHandle,
        event: SocketEvent,
    },
    /// Run pending jobs and timers.
    FlushEventLoop,
    /// Shutdown the JS engine.
    Shutdown,
}

/// JavaScript engine with dedicated worker thread.
///
/// Dropping the engine shuts the thread down and waits for it.
pub struct JsEngine {
    pub(crate) client: JsEngineClient,
    pub(crate) handle: Option<JoinHandle<()>>,
}

impl JsEngine {
    /// Get a client handle for communicating with the engine.
    pub fn client(&self) -> JsEngineClient {
        self.client.clone()
    }

    /// Stop the engine thread and wait for it to exit. Live sockets are
    /// closed with it.
    pub fn shutdown(mut self) {
        self.stop();
    }

    fn stop(&mut self) {
        if let Some(handle) = self.handle.take() {
            self.client.shutdown();
            if handle.join().is_err() {
                log::error!("JS engine thread panicked during shutdown");
            }
        }
    }
}

impl Drop for JsEngine {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Main loop for the JS engine thread.
pub(crate) fn run_js_loop(
    receiver: Receiver<JsCommand>,
    mut context: Context,
    bridge: Rc<SocketBridge>,
    config: &SocketBridgeConfig,
) {
    log::info!("JS engine thread started");

    loop {
        match receiver.recv() {
            Ok(JsCommand::Execute { source }) => {
                log::info!("Executing script ({} bytes)...", source.len());
                if let Err(e) = context.eval(Source::from_bytes(source.as_bytes())) {
                    log::error!("Failed to execute script: {}", e);
                }
                flush_event_loop(&mut context);
            }
            Ok(JsCommand::Evaluate { source, reply }) => {
                let result = context
                    .eval(Source::from_bytes(source.as_bytes()))
                    .and_then(|value| value.to_string(&mut context))
                    .map(|value| value.to_std_string_escaped())
                    .map_err(|e| e.to_string());
                flush_event_loop(&mut context);
                let _ = reply.send(result);
            }
            Ok(JsCommand::SocketEvent { handle, event }) => {
                let mut callbacks = ContextCallbacks::new(&mut context, &config.callbacks);
                bridge.deliver(handle, event, &mut callbacks);
                flush_event_loop(&mut context);
            }
            Ok(JsCommand::FlushEventLoop) => {
                flush_event_loop(&mut context);
            }
            Ok(JsCommand::Shutdown) => {
                log::info!("JS engine shutting down");
                break;
            }
            Err(e) => {
                log::error!("JS engine channel error: {}", e);
                break;
            }
        }
    }

    bridge.close_all();
    log::info!("JS engine thread stopped");
}

/// Run microtasks (jobs) and due timers.
fn flush_event_loop(context: &mut Context) {
    if let Err(e) = context.run_jobs() {
        log::error!("Error running Boa jobs: {}", e);
    }
}
