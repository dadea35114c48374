//! Error types for the protocol layer.

/// Errors that can occur while encoding or decoding messages.
///
/// Each Stakegrid crate owns its error enum, so a `ProtocolError` always
/// means the problem is in (de)serialization, never in room or
/// settlement logic.
#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    /// Serialization failed.
    #[cfg(feature = "json")]
    #[error("encode failed: {0}")]
    Encode(serde_json::Error),

    /// Deserialization failed: malformed input, missing fields, or a
    /// payload of the wrong shape.
    #[cfg(feature = "json")]
    #[error("decode failed: {0}")]
    Decode(serde_json::Error),

    /// The message decoded but is not acceptable, e.g. an amount that
    /// does not parse as a decimal.
    #[error("invalid message: {0}")]
    InvalidMessage(String),
}
