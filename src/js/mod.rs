//! JavaScript Engine Module
//!
//! A Boa JS engine on its own thread, driven by a command channel, with the
//! WebSocket bridge registered into its global scope.

mod builder;
mod client;
mod engine;
pub mod websocket;

pub use builder::JsEngineBuilder;
pub use client::JsEngineClient;
pub use engine::{JsCommand, JsEngine};
