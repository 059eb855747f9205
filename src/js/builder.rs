use std::rc::Rc;
use std::sync::{Arc, mpsc};
use std::thread;

use boa_engine::{Context, JsError};
use boa_runtime::extensions::{ConsoleExtension, MicrotaskExtension, TimeoutExtension};

use crate::config::SocketBridgeConfig;
use crate::error::{BridgeError, BridgeResult};
use crate::js::engine::run_js_loop;
use crate::js::websocket::{SocketBridge, SocketConnector, TungsteniteConnector};
use crate::js::{JsEngine, JsEngineClient};

pub struct JsEngineBuilder {
    config: SocketBridgeConfig,
    connector: Option<Box<dyn SocketConnector + Send>>,
}

impl Default for JsEngineBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl JsEngineBuilder {
    pub fn new() -> Self {
        JsEngineBuilder {
            config: SocketBridgeConfig::default(),
            connector: None,
        }
    }

    pub fn with_config(mut self, config: SocketBridgeConfig) -> Self {
        self.config = config;
        self
    }

    /// Replace the tokio-tungstenite host facility.
    pub fn with_connector(mut self, connector: impl SocketConnector + Send + 'static) -> Self {
        self.connector = Some(Box::new(connector));
        self
    }

    /// Start the engine thread. Returns once the context is initialized.
    pub fn build(self) -> BridgeResult<JsEngine> {
        let (sender, receiver) = mpsc::channel();
        let client = JsEngineClient { sender };
        let (ready_tx, ready_rx) = mpsc::channel::<Result<(), String>>();

        let config = self.config;
        let connector: Box<dyn SocketConnector + Send> = match self.connector {
            Some(connector) => connector,
            None => Box::new(TungsteniteConnector::new(&config)),
        };
        let client_for_thread = client.clone();

        let handle = thread::Builder::new()
            .name("js-engine".to_string())
            .spawn(move || {
                let bridge = Rc::new(SocketBridge::new(
                    connector,
                    Arc::new(client_for_thread),
                ));
                let context = match build_context(&config, bridge.clone()) {
                    Ok(context) => {
                        let _ = ready_tx.send(Ok(()));
                        context
                    }
                    Err(e) => {
                        log::error!("Failed to initialize JS engine: {}", e);
                        let _ = ready_tx.send(Err(e.to_string()));
                        return;
                    }
                };

                let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
                    run_js_loop(receiver, context, bridge, &config);
                }));
                if let Err(e) = result {
                    log::error!("JS engine panicked: {:?}", e);
                }
            })
            .map_err(|e| BridgeError::Engine(format!("Failed to spawn JS engine thread: {}", e)))?;

        match ready_rx.recv() {
            Ok(Ok(())) => Ok(JsEngine {
                client,
                handle: Some(handle),
            }),
            Ok(Err(e)) => {
                let _ = handle.join();
                Err(BridgeError::Engine(e))
            }
            Err(e) => {
                let _ = handle.join();
                Err(BridgeError::Engine(format!("JS engine thread exited: {}", e)))
            }
        }
    }
}

fn build_context(config: &SocketBridgeConfig, bridge: Rc<SocketBridge>) -> Result<Context, JsError> {
    let mut context = Context::builder().build()?;

    // Register Boa runtime extensions
    boa_runtime::register(
        (
            ConsoleExtension::default(),
            TimeoutExtension {},
            MicrotaskExtension {},
        ),
        None,
        &mut context,
    )?;

    crate::js::websocket::register_socket_functions(&mut context, bridge, &config.exports)?;

    Ok(context)
}
