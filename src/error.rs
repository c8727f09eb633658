//! Error types shared across the relay client.
//!
//! Relay- and frame-scoped errors ([`TransportError`], [`ProtocolError`]) are
//! recovered inside the aggregation layer. Only [`FetchError`] reaches callers.

use thiserror::Error;

/// Failure to decode a bech32-style identifier.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DecodeError {
    /// No `1` separator, or the separator is the first character.
    #[error("identifier has no separator")]
    MissingSeparator,

    /// A data character outside the 32-symbol alphabet.
    #[error("invalid character {0:?} in identifier")]
    InvalidCharacter(char),

    /// Fewer bytes than a key needs could be assembled.
    #[error("identifier payload too short: {0} bytes")]
    ShortPayload(usize),

    /// A TLV-encoded identifier without a usable key entry.
    #[error("identifier has no author key entry")]
    MissingKey,
}

/// Failure to encode a key into an identifier.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum EncodeError {
    #[error("key must be 32 bytes, got {0}")]
    InvalidLength(usize),

    #[error("invalid hex key: {0}")]
    InvalidHex(String),
}

/// Identifier surface form that cannot be used for a query.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum InputError {
    #[error("empty identifier")]
    Empty,

    #[error("unsupported identifier: {0}")]
    Unsupported(String),
}

/// Failure scoped to one relay connection or one frame on it.
#[derive(Error, Debug)]
pub enum TransportError {
    #[error("invalid relay url: {0}")]
    InvalidUrl(String),

    #[error("connection failed: {0}")]
    Connect(String),

    #[error("proxy error: {0}")]
    Proxy(#[from] tokio_socks::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("websocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),

    /// A single inbound frame was unusable; the connection stays up.
    #[error("discarded frame: {0}")]
    Frame(String),
}

impl TransportError {
    /// Whether the connection can no longer be used.
    pub fn is_fatal(&self) -> bool {
        !matches!(self, TransportError::Frame(_))
    }
}

/// An inbound frame that could not be understood.
#[derive(Error, Debug)]
pub enum ProtocolError {
    #[error("malformed json: {0}")]
    Json(#[from] serde_json::Error),

    #[error("unexpected message shape: {0}")]
    Shape(String),
}

/// Failure returned from the caller-facing fetch operations.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FetchError {
    #[error(transparent)]
    Input(#[from] InputError),

    #[error("invalid identifier: {0}")]
    Decode(#[from] DecodeError),

    /// Every relay completed without producing a single record.
    #[error("no records found for author")]
    NoResults,
}
