//! Error types for the socket bridge

use thiserror::Error;

/// Result type alias for bridge operations
pub type BridgeResult<T> = Result<T, BridgeError>;

/// Errors that can occur while bridging sockets into the script engine.
///
/// None of these ever cross into the module as an exception: creation
/// failures become handle 0, everything else is logged.
#[derive(Error, Debug)]
pub enum BridgeError {
    /// The URL bytes handed over by the module are not UTF-8
    #[error("socket URL is not valid UTF-8: {0}")]
    InvalidUtf8(#[from] std::str::Utf8Error),

    /// The URL could not be parsed
    #[error("invalid socket URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    /// Only `ws` and `wss` are accepted
    #[error("unsupported URL scheme '{0}', expected ws or wss")]
    UnsupportedScheme(String),

    /// Socket URLs carry no fragment
    #[error("socket URL must not contain a fragment")]
    UrlFragment,

    /// Every handle up to `u32::MAX` has been issued
    #[error("socket handle space exhausted")]
    HandlesExhausted,

    /// The host facility refused to construct the socket
    #[error("connection refused by host: {0}")]
    Connect(String),

    /// A module callback threw
    #[error("module callback '{name}' failed: {message}")]
    Callback { name: String, message: String },

    /// The module does not define the callback
    #[error("module callback '{0}' is not defined")]
    MissingCallback(String),

    /// The configuration JSON could not be read
    #[error("invalid configuration: {0}")]
    Config(#[from] serde_json::Error),

    /// The engine thread is gone or failed to start
    #[error("JS engine error: {0}")]
    Engine(String),
}
