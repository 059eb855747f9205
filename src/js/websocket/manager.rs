//! Host socket facility backed by tokio-tungstenite.
//!
//! Every connection runs as a task on a shared Tokio runtime. The engine
//! thread only sees the [`TungsteniteSocket`] handle: an outbound channel
//! plus an atomic ready state. Events go back through the socket's
//! [`Listeners`].

use futures_util::{SinkExt, StreamExt};
use once_cell::sync::Lazy;
use std::sync::Arc;
use std::sync::atomic::{AtomicU8, Ordering};
use tokio::runtime::Runtime;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::handshake::client::Request;
use tokio_tungstenite::tungstenite::http::HeaderValue;
use tokio_tungstenite::tungstenite::Message;
use url::Url;

use super::bridge::{HostSocket, Listeners, ReadyState, SocketConnector, SocketEvent};
use crate::config::SocketBridgeConfig;
use crate::error::{BridgeError, BridgeResult};

/// Runtime shared by all host connections.
pub(crate) static TOKIO: Lazy<Runtime> = Lazy::new(|| {
    tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .worker_threads(2)
        .thread_name("websocket-host")
        .build()
        .expect("Failed to build WebSocket runtime")
});

#[derive(Debug)]
enum Outbound {
    Binary(Vec<u8>),
    Close,
}

/// Handle to one tungstenite connection task.
pub struct TungsteniteSocket {
    sender: mpsc::UnboundedSender<Outbound>,
    ready_state: Arc<AtomicU8>,
}

impl HostSocket for TungsteniteSocket {
    fn ready_state(&self) -> ReadyState {
        ReadyState::from_u8(self.ready_state.load(Ordering::SeqCst))
    }

    fn send(&self, data: Vec<u8>) {
        if let Err(e) = self.sender.send(Outbound::Binary(data)) {
            log::warn!("Failed to queue outbound frame: {}", e);
        }
    }

    fn close(&self) {
        let _ = self.ready_state.fetch_update(Ordering::SeqCst, Ordering::SeqCst, |state| {
            (state < ReadyState::Closing as u8).then_some(ReadyState::Closing as u8)
        });
        // The task may already be gone; nothing left to close then.
        let _ = self.sender.send(Outbound::Close);
    }
}

/// Opens binary-mode WebSocket connections with tokio-tungstenite.
#[derive(Debug, Clone, Default)]
pub struct TungsteniteConnector {
    origin: Option<String>,
    subprotocols: Vec<String>,
}

impl TungsteniteConnector {
    pub fn new(config: &SocketBridgeConfig) -> Self {
        Self {
            origin: config.origin.clone(),
            subprotocols: config.subprotocols.clone(),
        }
    }

    fn build_request(&self, url: &Url) -> BridgeResult<Request> {
        let mut request = url
            .as_str()
            .into_client_request()
            .map_err(|e| BridgeError::Connect(format!("Invalid request: {}", e)))?;

        if let Some(origin) = &self.origin {
            let value = HeaderValue::from_str(origin)
                .map_err(|e| BridgeError::Connect(format!("Invalid Origin header: {}", e)))?;
            request.headers_mut().insert("Origin", value);
        }

        if !self.subprotocols.is_empty() {
            let value = HeaderValue::from_str(&self.subprotocols.join(", ")).map_err(|e| {
                BridgeError::Connect(format!("Invalid Sec-WebSocket-Protocol header: {}", e))
            })?;
            request.headers_mut().insert("Sec-WebSocket-Protocol", value);
        }

        Ok(request)
    }
}

impl SocketConnector for TungsteniteConnector {
    fn connect(&self, url: &Url, listeners: Listeners) -> BridgeResult<Box<dyn HostSocket>> {
        let request = self.build_request(url)?;
        let (tx, rx) = mpsc::unbounded_channel();
        let ready_state = Arc::new(AtomicU8::new(ReadyState::Connecting as u8));

        TOKIO.spawn(run_connection(request, rx, ready_state.clone(), listeners));

        Ok(Box::new(TungsteniteSocket {
            sender: tx,
            ready_state,
        }))
    }
}

fn mark(ready_state: &AtomicU8, state: ReadyState) {
    ready_state.store(state as u8, Ordering::SeqCst);
}

async fn run_connection(
    request: Request,
    mut outbound: mpsc::UnboundedReceiver<Outbound>,
    ready_state: Arc<AtomicU8>,
    listeners: Listeners,
) {
    let id = listeners.handle();
    log::info!("[WebSocket {}] Performing WebSocket handshake", id);

    let mut ws_stream = match tokio_tungstenite::connect_async(request).await {
        Ok((stream, response)) => {
            log::info!(
                "[WebSocket {}] Connected successfully (status: {})",
                id,
                response.status()
            );
            stream
        }
        Err(e) => {
            log::error!("[WebSocket {}] Handshake failed: {}", id, e);
            mark(&ready_state, ReadyState::Closed);
            listeners.emit(SocketEvent::Error);
            listeners.emit(SocketEvent::Close);
            return;
        }
    };

    // Closed while still connecting.
    if ready_state
        .compare_exchange(
            ReadyState::Connecting as u8,
            ReadyState::Open as u8,
            Ordering::SeqCst,
            Ordering::SeqCst,
        )
        .is_err()
    {
        log::info!("[WebSocket {}] Close requested during handshake", id);
        let _ = ws_stream.close(None).await;
        mark(&ready_state, ReadyState::Closed);
        listeners.emit(SocketEvent::Close);
        return;
    }
    listeners.emit(SocketEvent::Open);

    let (mut write, mut read) = ws_stream.split();

    let writer = tokio::spawn(async move {
        while let Some(frame) = outbound.recv().await {
            match frame {
                Outbound::Binary(data) => {
                    if let Err(e) = write.send(Message::Binary(data.into())).await {
                        log::error!("[WebSocket {}] Send error: {}", id, e);
                        return;
                    }
                }
                Outbound::Close => break,
            }
        }
        // Close requested, or the socket handle was dropped.
        if let Err(e) = write.send(Message::Close(None)).await {
            log::debug!("[WebSocket {}] Close frame not sent: {}", id, e);
        }
    });

    let mut failed = false;
    while let Some(msg_result) = read.next().await {
        match msg_result {
            Ok(Message::Binary(data)) => {
                log::debug!("[WebSocket {}] Received binary ({} bytes)", id, data.len());
                listeners.emit(SocketEvent::Message(data.to_vec()));
            }
            Ok(Message::Text(text)) => {
                log::warn!(
                    "[WebSocket {}] Dropping text frame ({} bytes), only binary is supported",
                    id,
                    text.len()
                );
            }
            Ok(Message::Ping(_)) | Ok(Message::Pong(_)) | Ok(Message::Frame(_)) => {}
            Ok(Message::Close(frame)) => {
                let (code, reason) = frame
                    .map(|f| (u16::from(f.code), f.reason.to_string()))
                    .unwrap_or((1005, String::new()));
                log::info!("[WebSocket {}] Received close: {} {}", id, code, reason);
                break;
            }
            Err(e) => {
                log::error!("[WebSocket {}] Read error: {}", id, e);
                failed = true;
                break;
            }
        }
    }

    mark(&ready_state, ReadyState::Closed);
    if failed {
        listeners.emit(SocketEvent::Error);
    }
    listeners.emit(SocketEvent::Close);
    writer.abort();
    log::info!("[WebSocket {}] Connection ended", id);
}
