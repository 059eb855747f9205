//! Test doubles for the host socket facility and the module callbacks.

use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use std::sync::{Arc, Mutex};

use url::Url;

use super::bridge::{
    EventSink, HostSocket, Listeners, ModuleCallbacks, ReadyState, SocketConnector, SocketEvent,
};
use super::registry::SocketHandle;
use crate::error::{BridgeError, BridgeResult};

/// A socket driven by the test instead of the network.
pub(crate) struct FakeSocket {
    url: Url,
    state: AtomicU8,
    sent: Mutex<Vec<Vec<u8>>>,
    close_requested: AtomicBool,
    listeners: Listeners,
}

impl FakeSocket {
    pub(crate) fn url(&self) -> &Url {
        &self.url
    }

    pub(crate) fn listeners(&self) -> &Listeners {
        &self.listeners
    }

    pub(crate) fn sent(&self) -> Vec<Vec<u8>> {
        self.sent.lock().unwrap().clone()
    }

    pub(crate) fn close_requested(&self) -> bool {
        self.close_requested.load(Ordering::SeqCst)
    }

    pub(crate) fn open(&self) {
        self.state.store(ReadyState::Open as u8, Ordering::SeqCst);
        self.listeners.emit(SocketEvent::Open);
    }

    pub(crate) fn receive(&self, data: &[u8]) {
        self.listeners.emit(SocketEvent::Message(data.to_vec()));
    }

    pub(crate) fn fail(&self) {
        self.listeners.emit(SocketEvent::Error);
    }

    pub(crate) fn close_by_host(&self) {
        self.state.store(ReadyState::Closed as u8, Ordering::SeqCst);
        self.listeners.emit(SocketEvent::Close);
    }
}

impl HostSocket for Arc<FakeSocket> {
    fn ready_state(&self) -> ReadyState {
        ReadyState::from_u8(self.state.load(Ordering::SeqCst))
    }

    fn send(&self, data: Vec<u8>) {
        self.sent.lock().unwrap().push(data);
    }

    fn close(&self) {
        self.close_requested.store(true, Ordering::SeqCst);
        self.state.store(ReadyState::Closing as u8, Ordering::SeqCst);
    }
}

/// Connector that records every socket it creates.
#[derive(Clone, Default)]
pub(crate) struct FakeConnector {
    sockets: Arc<Mutex<Vec<Arc<FakeSocket>>>>,
    refused_hosts: Arc<Mutex<Vec<String>>>,
}

impl FakeConnector {
    pub(crate) fn refuse(&self, host: &str) {
        self.refused_hosts.lock().unwrap().push(host.to_string());
    }

    pub(crate) fn sockets(&self) -> Vec<Arc<FakeSocket>> {
        self.sockets.lock().unwrap().clone()
    }

    pub(crate) fn socket(&self, index: usize) -> Arc<FakeSocket> {
        self.sockets.lock().unwrap()[index].clone()
    }
}

impl SocketConnector for FakeConnector {
    fn connect(&self, url: &Url, listeners: Listeners) -> BridgeResult<Box<dyn HostSocket>> {
        let host = url.host_str().unwrap_or_default();
        if self.refused_hosts.lock().unwrap().iter().any(|h| h == host) {
            return Err(BridgeError::Connect(format!("{} refused", host)));
        }
        let socket = Arc::new(FakeSocket {
            url: url.clone(),
            state: AtomicU8::new(ReadyState::Connecting as u8),
            sent: Mutex::new(Vec::new()),
            close_requested: AtomicBool::new(false),
            listeners,
        });
        self.sockets.lock().unwrap().push(socket.clone());
        Ok(Box::new(socket))
    }
}

/// Sink that queues events until the test pumps them.
#[derive(Default)]
pub(crate) struct RecordingSink {
    events: Mutex<Vec<(SocketHandle, SocketEvent)>>,
}

impl RecordingSink {
    pub(crate) fn drain(&self) -> Vec<(SocketHandle, SocketEvent)> {
        std::mem::take(&mut *self.events.lock().unwrap())
    }
}

impl EventSink for RecordingSink {
    fn push(&self, handle: SocketHandle, event: SocketEvent) {
        self.events.lock().unwrap().push((handle, event));
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Call {
    Open(u32),
    Message(u32, Vec<u8>),
    Error(u32),
    Close(u32),
}

#[derive(Default)]
pub(crate) struct RecordingCallbacks {
    pub(crate) calls: Vec<Call>,
    pub(crate) fail_on_open: bool,
}

impl ModuleCallbacks for RecordingCallbacks {
    fn on_open(&mut self, handle: SocketHandle) -> BridgeResult<()> {
        self.calls.push(Call::Open(handle.get()));
        if self.fail_on_open {
            return Err(BridgeError::Callback {
                name: "on_open".to_string(),
                message: "boom".to_string(),
            });
        }
        Ok(())
    }

    fn on_message(&mut self, handle: SocketHandle, data: &[u8]) -> BridgeResult<()> {
        self.calls.push(Call::Message(handle.get(), data.to_vec()));
        Ok(())
    }

    fn on_error(&mut self, handle: SocketHandle) -> BridgeResult<()> {
        self.calls.push(Call::Error(handle.get()));
        Ok(())
    }

    fn on_close(&mut self, handle: SocketHandle) -> BridgeResult<()> {
        self.calls.push(Call::Close(handle.get()));
        Ok(())
    }
}
