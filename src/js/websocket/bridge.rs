//! Socket bridge
//!
//! Owns the handle registry and proxies create/send/destroy from the module
//! to the host socket facility, and host events back into the module.
//!
//! Everything here runs on the engine thread. Host connections live
//! elsewhere and only reach the bridge through an [`EventSink`], which
//! queues events so [`SocketBridge::deliver`] can hand them to the module
//! one at a time.

use std::cell::RefCell;
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use url::Url;

use super::registry::{HandleRegistry, SocketHandle};
use crate::error::{BridgeError, BridgeResult};

/// WebSocket ready states, numbered as in the browser API.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ReadyState {
    Connecting = 0,
    Open = 1,
    Closing = 2,
    Closed = 3,
}

impl ReadyState {
    pub fn from_u8(value: u8) -> Self {
        match value {
            0 => ReadyState::Connecting,
            1 => ReadyState::Open,
            2 => ReadyState::Closing,
            _ => ReadyState::Closed,
        }
    }
}

/// An event emitted by a host socket.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SocketEvent {
    Open,
    /// A binary frame.
    Message(Vec<u8>),
    /// Transport failure. The detail stays on the host side.
    Error,
    Close,
}

impl SocketEvent {
    pub fn kind(&self) -> &'static str {
        match self {
            SocketEvent::Open => "open",
            SocketEvent::Message(_) => "message",
            SocketEvent::Error => "error",
            SocketEvent::Close => "close",
        }
    }
}

/// Where host sockets queue their events for the engine thread.
pub trait EventSink: Send + Sync {
    fn push(&self, handle: SocketHandle, event: SocketEvent);
}

/// The event listeners of one socket, closed over its handle.
///
/// Cloned into the host connection. Once detached, emitting is a no-op.
#[derive(Clone)]
pub struct Listeners {
    handle: SocketHandle,
    attached: Arc<AtomicBool>,
    sink: Arc<dyn EventSink>,
}

impl Listeners {
    pub fn new(handle: SocketHandle, sink: Arc<dyn EventSink>) -> Self {
        Self {
            handle,
            attached: Arc::new(AtomicBool::new(true)),
            sink,
        }
    }

    pub fn handle(&self) -> SocketHandle {
        self.handle
    }

    pub fn emit(&self, event: SocketEvent) {
        if self.is_attached() {
            self.sink.push(self.handle, event);
        } else {
            log::trace!(
                "[WebSocket {}] Listeners detached, dropping {} event",
                self.handle,
                event.kind()
            );
        }
    }

    pub fn is_attached(&self) -> bool {
        self.attached.load(Ordering::SeqCst)
    }

    pub fn detach(&self) {
        self.attached.store(false, Ordering::SeqCst);
    }
}

impl fmt::Debug for Listeners {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Listeners")
            .field("handle", &self.handle)
            .field("attached", &self.is_attached())
            .finish()
    }
}

/// A host-side socket. Sends are fire-and-forget.
pub trait HostSocket {
    fn ready_state(&self) -> ReadyState;
    fn send(&self, data: Vec<u8>);
    /// Request the close handshake. Best-effort.
    fn close(&self);
}

/// The host's native socket facility.
pub trait SocketConnector {
    /// Construct a binary-mode socket for `url`. Connection establishment
    /// completes later and is reported through `listeners`.
    fn connect(&self, url: &Url, listeners: Listeners) -> BridgeResult<Box<dyn HostSocket>>;
}

/// The module's callback table.
///
/// `on_message` borrows the payload for the duration of the call only.
pub trait ModuleCallbacks {
    fn on_open(&mut self, handle: SocketHandle) -> BridgeResult<()>;
    fn on_message(&mut self, handle: SocketHandle, data: &[u8]) -> BridgeResult<()>;
    fn on_error(&mut self, handle: SocketHandle) -> BridgeResult<()>;
    fn on_close(&mut self, handle: SocketHandle) -> BridgeResult<()>;
}

/// Decode and validate a socket URL the way a browser `WebSocket`
/// constructor does.
pub fn parse_socket_url(bytes: &[u8]) -> BridgeResult<Url> {
    let text = std::str::from_utf8(bytes)?;
    let url = Url::parse(text)?;
    match url.scheme() {
        "ws" | "wss" => {}
        other => return Err(BridgeError::UnsupportedScheme(other.to_string())),
    }
    if url.fragment().is_some() {
        return Err(BridgeError::UrlFragment);
    }
    Ok(url)
}

struct SocketEntry {
    socket: Box<dyn HostSocket>,
    listeners: Listeners,
}

/// Handle registry and event proxy.
pub struct SocketBridge {
    connector: Box<dyn SocketConnector>,
    sink: Arc<dyn EventSink>,
    registry: RefCell<HandleRegistry<SocketEntry>>,
}

impl SocketBridge {
    pub fn new(connector: Box<dyn SocketConnector>, sink: Arc<dyn EventSink>) -> Self {
        Self {
            connector,
            sink,
            registry: RefCell::new(HandleRegistry::new()),
        }
    }

    /// Open a socket to the UTF-8 URL in `url`. The handle is only issued
    /// once the socket exists and the mapping is recorded.
    pub fn create(&self, url: &[u8]) -> BridgeResult<SocketHandle> {
        let url = parse_socket_url(url)?;
        let handle = self
            .registry
            .borrow()
            .next_handle()
            .ok_or(BridgeError::HandlesExhausted)?;

        log::info!("[WebSocket {}] Connecting to {}", handle, url);
        let listeners = Listeners::new(handle, self.sink.clone());
        let socket = self.connector.connect(&url, listeners.clone())?;

        self.registry
            .borrow_mut()
            .install(handle, SocketEntry { socket, listeners });
        Ok(handle)
    }

    /// Copy `data` to the socket. Ignored unless the handle is live and open.
    pub fn send(&self, handle: u32, data: &[u8]) {
        let Some(handle) = SocketHandle::new(handle) else {
            return;
        };
        let registry = self.registry.borrow();
        let Some(entry) = registry.get(handle) else {
            log::trace!("[WebSocket {}] send on unknown handle ignored", handle);
            return;
        };
        let state = entry.socket.ready_state();
        if state != ReadyState::Open {
            log::debug!("[WebSocket {}] send ignored in state {:?}", handle, state);
            return;
        }
        log::debug!("[WebSocket {}] Sending {} bytes", handle, data.len());
        entry.socket.send(data.to_vec());
    }

    /// Detach the listeners, forget the handle and request the close.
    pub fn destroy(&self, handle: u32) {
        let Some(handle) = SocketHandle::new(handle) else {
            return;
        };
        let Some(entry) = self.registry.borrow_mut().remove(handle) else {
            return;
        };
        entry.listeners.detach();
        log::info!("[WebSocket {}] Closing", handle);
        entry.socket.close();
    }

    /// Ready state of a live handle; unknown handles report `Closed`.
    pub fn ready_state(&self, handle: u32) -> ReadyState {
        SocketHandle::new(handle)
            .and_then(|handle| {
                self.registry
                    .borrow()
                    .get(handle)
                    .map(|entry| entry.socket.ready_state())
            })
            .unwrap_or(ReadyState::Closed)
    }

    pub fn contains(&self, handle: SocketHandle) -> bool {
        self.registry.borrow().contains(handle)
    }

    pub fn len(&self) -> usize {
        self.registry.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.registry.borrow().is_empty()
    }

    /// Hand one queued host event to the module.
    ///
    /// No registry borrow is held while the callback runs, so the module
    /// may call back into the bridge.
    pub fn deliver(
        &self,
        handle: SocketHandle,
        event: SocketEvent,
        callbacks: &mut dyn ModuleCallbacks,
    ) {
        if !self.contains(handle) {
            log::debug!(
                "[WebSocket {}] Dropping {} event for retired handle",
                handle,
                event.kind()
            );
            return;
        }

        log::debug!("[WebSocket {}] Dispatching {} event", handle, event.kind());
        let result = match &event {
            SocketEvent::Open => callbacks.on_open(handle),
            SocketEvent::Message(data) => callbacks.on_message(handle, data),
            SocketEvent::Error => callbacks.on_error(handle),
            SocketEvent::Close => callbacks.on_close(handle),
        };
        if let Err(e) = result {
            log::error!("[WebSocket {}] {}", handle, e);
        }

        if event == SocketEvent::Close {
            self.retire(handle);
        }
    }

    /// Destroy every live socket.
    pub fn close_all(&self) {
        let entries: Vec<_> = self.registry.borrow_mut().drain().collect();
        for (handle, entry) in entries {
            entry.listeners.detach();
            log::debug!("[WebSocket {}] Closing on shutdown", handle);
            entry.socket.close();
        }
    }

    fn retire(&self, handle: SocketHandle) {
        if let Some(entry) = self.registry.borrow_mut().remove(handle) {
            entry.listeners.detach();
            log::info!("[WebSocket {}] Connection ended", handle);
        }
    }
}

impl Drop for SocketBridge {
    fn drop(&mut self) {
        self.close_all();
    }
}
