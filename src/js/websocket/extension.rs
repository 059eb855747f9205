//! Script-facing side of the socket bridge.
//!
//! Registers the exported socket functions into a Boa context and calls the
//! module's global callback functions when events are delivered.

use std::rc::Rc;

use boa_engine::object::builtins::{JsArrayBuffer, JsUint8Array};
use boa_engine::{Context, JsError, JsResult, JsString, JsValue, NativeFunction};
use boa_gc::{Finalize, Trace, empty_trace};

use super::bridge::{ModuleCallbacks, SocketBridge};
use super::registry::SocketHandle;
use crate::config::{CallbackNames, ExportNames};
use crate::error::{BridgeError, BridgeResult};

/// Shared bridge captured by the native functions.
#[derive(Clone, Finalize)]
struct BridgeRef(Rc<SocketBridge>);

// Holds no GC-managed values.
unsafe impl Trace for BridgeRef {
    empty_trace!();
}

/// Register the socket functions in the JS global scope.
pub(crate) fn register_socket_functions(
    context: &mut Context,
    bridge: Rc<SocketBridge>,
    exports: &ExportNames,
) -> JsResult<()> {
    let bridge = BridgeRef(bridge);

    // create(url: Uint8Array | string, length?: number) -> number
    context.register_global_callable(
        JsString::from(exports.create.as_str()),
        2,
        NativeFunction::from_copy_closure_with_captures(
            |_this: &JsValue, args: &[JsValue], bridge: &BridgeRef, ctx: &mut Context| {
                create_fn(args, bridge, ctx)
            },
            bridge.clone(),
        ),
    )?;

    // send(handle: number, data: Uint8Array, length?: number) -> void
    context.register_global_callable(
        JsString::from(exports.send.as_str()),
        3,
        NativeFunction::from_copy_closure_with_captures(
            |_this: &JsValue, args: &[JsValue], bridge: &BridgeRef, ctx: &mut Context| {
                send_fn(args, bridge, ctx)
            },
            bridge.clone(),
        ),
    )?;

    // destroy(handle: number) -> void
    context.register_global_callable(
        JsString::from(exports.destroy.as_str()),
        1,
        NativeFunction::from_copy_closure_with_captures(
            |_this: &JsValue, args: &[JsValue], bridge: &BridgeRef, ctx: &mut Context| {
                let id = handle_arg(args, ctx);
                bridge.0.destroy(id);
                Ok(JsValue::undefined())
            },
            bridge.clone(),
        ),
    )?;

    // ready_state(handle: number) -> number
    context.register_global_callable(
        JsString::from(exports.ready_state.as_str()),
        1,
        NativeFunction::from_copy_closure_with_captures(
            |_this: &JsValue, args: &[JsValue], bridge: &BridgeRef, ctx: &mut Context| {
                let id = handle_arg(args, ctx);
                Ok(JsValue::from(bridge.0.ready_state(id) as u32))
            },
            bridge,
        ),
    )?;

    log::info!("Registered WebSocket native functions");
    Ok(())
}

/// Read a handle argument. Anything that is not a whole number in
/// `1..=u32::MAX` is 0, which names no socket.
fn handle_arg(args: &[JsValue], ctx: &mut Context) -> u32 {
    let Some(number) = args.first().and_then(|v| v.to_number(ctx).ok()) else {
        return 0;
    };
    if number.is_finite() && number.fract() == 0.0 && (1.0..=u32::MAX as f64).contains(&number) {
        number as u32
    } else {
        0
    }
}

/// Creation never throws into the module; every failure is handle 0.
fn create_fn(args: &[JsValue], bridge: &BridgeRef, ctx: &mut Context) -> JsResult<JsValue> {
    let url = match copy_from_module(args.first(), args.get(1), ctx) {
        Ok(url) => url,
        Err(e) => {
            log::error!("[WebSocket Native] create: unreadable URL argument: {}", e);
            return Ok(JsValue::from(0));
        }
    };

    let id = match bridge.0.create(&url) {
        Ok(handle) => handle.get(),
        Err(e) => {
            log::error!("[WebSocket Native] Failed to create WebSocket: {}", e);
            0
        }
    };
    Ok(JsValue::from(id))
}

fn send_fn(args: &[JsValue], bridge: &BridgeRef, ctx: &mut Context) -> JsResult<JsValue> {
    let id = handle_arg(args, ctx);
    match copy_from_module(args.get(1), args.get(2), ctx) {
        Ok(data) => bridge.0.send(id, &data),
        Err(e) => log::warn!("[WebSocket {}] send: unreadable data argument: {}", id, e),
    }
    Ok(JsValue::undefined())
}

/// Copy `length` bytes out of a module buffer into an owned vector.
///
/// A missing length means the whole buffer; a length past the end is
/// clamped. Strings are taken as their UTF-8 bytes.
fn copy_from_module(
    data: Option<&JsValue>,
    length: Option<&JsValue>,
    ctx: &mut Context,
) -> JsResult<Vec<u8>> {
    let requested = match length {
        Some(v) if !v.is_undefined() => Some(v.to_u32(ctx)? as usize),
        _ => None,
    };

    let Some(data) = data else {
        return Err(boa_engine::JsNativeError::typ()
            .with_message("Missing data")
            .into());
    };

    if let Some(text) = data.as_string() {
        let text = text.to_std_string_escaped();
        match requested {
            Some(requested) if requested > text.len() => {
                log::warn!(
                    "[WebSocket Native] length {} exceeds string of {} bytes, clamping",
                    requested,
                    text.len()
                );
            }
            Some(requested) if !text.is_char_boundary(requested) => {
                log::warn!(
                    "[WebSocket Native] length {} splits a UTF-8 character of the string argument",
                    requested
                );
            }
            _ => {}
        }
        let mut bytes = text.into_bytes();
        if let Some(requested) = requested {
            bytes.truncate(requested);
        }
        return Ok(bytes);
    }

    let Some(obj) = data.as_object() else {
        return Err(boa_engine::JsNativeError::typ()
            .with_message("Expected Uint8Array")
            .into());
    };
    let typed_array = JsUint8Array::from_object(obj.clone())?;
    let available = typed_array.length(ctx)? as usize;
    let count = match requested {
        Some(requested) if requested > available => {
            log::warn!(
                "[WebSocket Native] length {} exceeds buffer of {} bytes, clamping",
                requested,
                available
            );
            available
        }
        Some(requested) => requested,
        None => available,
    };

    let mut bytes = Vec::with_capacity(count);
    for i in 0..count {
        let value = typed_array.get(i, ctx)?;
        bytes.push(value.to_u32(ctx)? as u8);
    }
    Ok(bytes)
}

/// Invokes the module's global callback functions.
pub(crate) struct ContextCallbacks<'a> {
    context: &'a mut Context,
    names: &'a CallbackNames,
}

impl<'a> ContextCallbacks<'a> {
    pub(crate) fn new(context: &'a mut Context, names: &'a CallbackNames) -> Self {
        Self { context, names }
    }

    fn invoke(&mut self, name: &str, args: &[JsValue]) -> BridgeResult<()> {
        let global = self.context.global_object();
        let value = global
            .get(JsString::from(name), self.context)
            .map_err(|e| callback_error(name, e))?;
        let Some(function) = value.as_callable() else {
            return Err(BridgeError::MissingCallback(name.to_string()));
        };
        function
            .call(&JsValue::undefined(), args, self.context)
            .map(|_| ())
            .map_err(|e| callback_error(name, e))
    }
}

fn callback_error(name: &str, e: JsError) -> BridgeError {
    BridgeError::Callback {
        name: name.to_string(),
        message: e.to_string(),
    }
}

/// Detach the buffer behind a loaned array so the module cannot read it
/// after the callback returns.
fn release(array: &JsUint8Array, ctx: &mut Context) {
    let released = array.buffer(ctx).and_then(|buffer| {
        let Some(obj) = buffer.as_object() else {
            return Ok(());
        };
        JsArrayBuffer::from_object(obj.clone())?
            .detach(&JsValue::undefined())
            .map(|_| ())
    });
    if let Err(e) = released {
        log::warn!("[WebSocket Native] Failed to release message buffer: {}", e);
    }
}

impl ModuleCallbacks for ContextCallbacks<'_> {
    fn on_open(&mut self, handle: SocketHandle) -> BridgeResult<()> {
        let names = self.names;
        self.invoke(&names.on_open, &[JsValue::from(handle.get())])
    }

    fn on_message(&mut self, handle: SocketHandle, data: &[u8]) -> BridgeResult<()> {
        let names = self.names;
        let array = JsUint8Array::from_iter(data.iter().copied(), self.context)
            .map_err(|e| callback_error(&names.on_message, e))?;

        let result = self.invoke(
            &names.on_message,
            &[
                JsValue::from(handle.get()),
                JsValue::from(array.clone()),
                JsValue::from(data.len() as u32),
            ],
        );
        release(&array, self.context);
        result
    }

    fn on_error(&mut self, handle: SocketHandle) -> BridgeResult<()> {
        let names = self.names;
        self.invoke(&names.on_error, &[JsValue::from(handle.get())])
    }

    fn on_close(&mut self, handle: SocketHandle) -> BridgeResult<()> {
        let names = self.names;
        self.invoke(&names.on_close, &[JsValue::from(handle.get())])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SocketBridgeConfig;
    use crate::js::websocket::testing::{FakeConnector, RecordingSink};
    use boa_engine::Source;
    use std::sync::Arc;

    const MODULE: &str = r#"
        var log = [];
        var kept = null;
        function websocket_on_open(h) { log.push('open:' + h); }
        function websocket_on_message(h, data, len) {
            kept = data;
            log.push('message:' + h + ':' + Array.prototype.join.call(data, '-') + ':' + len);
        }
        function websocket_on_error(h) { log.push('error:' + h); }
        function websocket_on_close(h) { log.push('close:' + h); }
    "#;

    struct Module {
        context: Context,
        config: SocketBridgeConfig,
        connector: FakeConnector,
        sink: Arc<RecordingSink>,
        bridge: Rc<SocketBridge>,
    }

    impl Module {
        fn load(source: &str) -> Self {
            let config = SocketBridgeConfig::default();
            let connector = FakeConnector::default();
            let sink = Arc::new(RecordingSink::default());
            let bridge = Rc::new(SocketBridge::new(Box::new(connector.clone()), sink.clone()));
            let mut context = Context::default();
            register_socket_functions(&mut context, bridge.clone(), &config.exports).unwrap();
            let mut module = Self {
                context,
                config,
                connector,
                sink,
                bridge,
            };
            module.eval(source);
            module
        }

        fn eval(&mut self, source: &str) -> String {
            self.context
                .eval(Source::from_bytes(source.as_bytes()))
                .unwrap()
                .to_string(&mut self.context)
                .unwrap()
                .to_std_string_escaped()
        }

        fn pump(&mut self) {
            for (handle, event) in self.sink.drain() {
                let mut callbacks = ContextCallbacks::new(&mut self.context, &self.config.callbacks);
                self.bridge.deliver(handle, event, &mut callbacks);
            }
        }
    }

    fn bytes_literal(text: &str) -> String {
        let bytes: Vec<String> = text.bytes().map(|b| b.to_string()).collect();
        format!("new Uint8Array([{}])", bytes.join(","))
    }

    #[test]
    fn test_create_from_bytes_with_length() {
        let mut m = Module::load(MODULE);
        // Trailing bytes past the given length are not part of the URL.
        let url = bytes_literal("wss://example/echo???");
        let handle = m.eval(&format!("websocket_create({}, 18)", url));
        assert_eq!(handle, "1");
        assert_eq!(m.connector.socket(0).url().as_str(), "wss://example/echo");
    }

    #[test]
    fn test_create_from_string() {
        let mut m = Module::load(MODULE);
        assert_eq!(m.eval("websocket_create('ws://example/a')"), "1");
        assert_eq!(m.eval("websocket_create('ws://example/b')"), "2");
        assert_eq!(m.bridge.len(), 2);
    }

    #[test]
    fn test_create_failures_return_zero() {
        let mut m = Module::load(MODULE);
        m.connector.refuse("refused.example");
        assert_eq!(m.eval("websocket_create('http://example/')"), "0");
        assert_eq!(m.eval("websocket_create('ws://refused.example/')"), "0");
        assert_eq!(m.eval("websocket_create(new Uint8Array([0xff, 0xfe]))"), "0");
        assert_eq!(m.eval("websocket_create(42)"), "0");
        assert_eq!(m.eval("websocket_create()"), "0");
        assert!(m.bridge.is_empty());
    }

    #[test]
    fn test_send_copies_requested_length() {
        let mut m = Module::load(MODULE);
        m.eval("var h = websocket_create('ws://example/')");
        let socket = m.connector.socket(0);

        m.eval("websocket_send(h, new Uint8Array([1, 2, 3]), 3)");
        assert!(socket.sent().is_empty());

        socket.open();
        m.pump();
        m.eval("var buf = new Uint8Array([1, 2, 3, 4]); websocket_send(h, buf, 2); buf[0] = 9;");
        m.eval("websocket_send(h, new Uint8Array([5, 6]), 10)");
        m.eval("websocket_send(h, new Uint8Array([7]))");
        assert_eq!(socket.sent(), vec![vec![1, 2], vec![5, 6], vec![7]]);
    }

    #[test]
    fn test_send_bad_arguments_are_ignored() {
        let mut m = Module::load(MODULE);
        m.eval("var h = websocket_create('ws://example/')");
        m.connector.socket(0).open();
        m.pump();
        assert_eq!(m.eval("websocket_send(h, {}, 1); 'ok'"), "ok");
        assert_eq!(m.eval("websocket_send(99, new Uint8Array([1]), 1); 'ok'"), "ok");
        assert!(m.connector.socket(0).sent().is_empty());
    }

    #[test]
    fn test_string_length_inside_a_character_fails_create() {
        let mut m = Module::load(MODULE);
        // 'ws://example/' is 13 bytes; 14 cuts the two-byte 'é' in half.
        assert_eq!(m.eval("websocket_create('ws://example/é', 14)"), "0");
        assert!(m.bridge.is_empty());
        assert_eq!(m.eval("websocket_create('ws://example/é', 15)"), "1");
        assert_eq!(m.eval("websocket_create('ws://example/', 99)"), "2");
    }

    #[test]
    fn test_handles_outside_issued_range_are_ignored() {
        let mut m = Module::load(MODULE);
        assert_eq!(m.eval("var h = websocket_create('ws://example/'); h"), "1");
        let socket = m.connector.socket(0);
        socket.open();
        m.pump();

        for bogus in ["4294967297", "1.7", "-4294967295", "-1", "NaN", "Infinity", "'1x'"] {
            m.eval(&format!("websocket_send({}, new Uint8Array([9]), 1)", bogus));
            m.eval(&format!("websocket_destroy({})", bogus));
            assert_eq!(m.eval(&format!("websocket_ready_state({})", bogus)), "3");
        }

        assert!(socket.sent().is_empty());
        assert!(!socket.close_requested());
        assert_eq!(m.bridge.len(), 1);
        assert_eq!(m.eval("websocket_ready_state(h)"), "1");

        // A numeric string naming an issued handle still resolves.
        m.eval("websocket_send('1', new Uint8Array([3]), 1)");
        assert_eq!(socket.sent(), vec![vec![3]]);
    }

    #[test]
    fn test_ready_state_export() {
        let mut m = Module::load(MODULE);
        m.eval("var h = websocket_create('ws://example/')");
        assert_eq!(m.eval("websocket_ready_state(h)"), "0");
        m.connector.socket(0).open();
        assert_eq!(m.eval("websocket_ready_state(h)"), "1");
        m.eval("websocket_destroy(h)");
        assert_eq!(m.eval("websocket_ready_state(h)"), "3");
        assert_eq!(m.eval("websocket_ready_state(0)"), "3");
    }

    #[test]
    fn test_message_buffer_is_released_after_callback() {
        let mut m = Module::load(MODULE);
        m.eval("websocket_create('ws://example/')");
        let socket = m.connector.socket(0);
        socket.open();
        socket.receive(&[1, 2, 250]);
        m.pump();

        assert_eq!(m.eval("log.join(',')"), "open:1,message:1:1-2-250:3");
        assert_eq!(m.eval("kept.length"), "0");
    }

    #[test]
    fn test_throwing_callback_is_contained() {
        let mut m = Module::load(MODULE);
        m.eval(
            r#"
            var count = 0;
            function websocket_on_message(h, data, len) {
                count += 1;
                kept = data;
                throw new Error('module failure');
            }
            websocket_create('ws://example/');
            "#,
        );
        let socket = m.connector.socket(0);
        socket.open();
        socket.receive(&[1]);
        socket.receive(&[2]);
        socket.close_by_host();
        m.pump();

        assert_eq!(m.eval("count"), "2");
        assert_eq!(m.eval("kept.length"), "0");
        assert_eq!(m.eval("log.join(',')"), "open:1,close:1");
        assert!(m.bridge.is_empty());
    }

    #[test]
    fn test_missing_callbacks_are_tolerated() {
        let mut m = Module::load("var h = websocket_create('ws://example/');");
        let socket = m.connector.socket(0);
        socket.open();
        socket.receive(&[1]);
        socket.fail();
        socket.close_by_host();
        m.pump();
        assert!(m.bridge.is_empty());
    }

    #[test]
    fn test_reentrant_calls_from_callbacks() {
        let mut m = Module::load(
            r#"
            var closed = [];
            function websocket_on_open(h) { websocket_send(h, new Uint8Array([42]), 1); }
            function websocket_on_message(h, data, len) { websocket_destroy(h); }
            function websocket_on_close(h) { closed.push(h); }
            websocket_create('ws://example/');
            "#,
        );
        let socket = m.connector.socket(0);
        socket.open();
        socket.receive(&[1]);
        m.pump();

        assert_eq!(socket.sent(), vec![vec![42]]);
        assert!(socket.close_requested());
        assert!(m.bridge.is_empty());

        socket.close_by_host();
        m.pump();
        assert_eq!(m.eval("closed.length"), "0");
    }

    #[test]
    fn test_echo_scenario_through_script() {
        let mut m = Module::load(MODULE);
        assert_eq!(m.eval("var h = websocket_create('wss://example/echo'); h"), "1");
        let socket = m.connector.socket(0);

        socket.open();
        m.pump();
        m.eval("websocket_send(h, new Uint8Array([1, 2]), 2)");
        assert_eq!(socket.sent(), vec![vec![0x01, 0x02]]);

        socket.receive(&[0x01, 0x02]);
        m.pump();
        m.eval("websocket_destroy(h); websocket_send(h, new Uint8Array([3]), 1)");
        assert_eq!(socket.sent().len(), 1);

        socket.close_by_host();
        m.pump();
        assert_eq!(m.eval("log.join(',')"), "open:1,message:1:1-2:2");
    }
}
