//! Wire protocol error types.

use thiserror::Error;

/// Result type for wire operations.
pub type WireResult<T> = Result<T, WireError>;

/// Errors that can occur while encoding or decoding kernel messages.
#[derive(Debug, Error)]
pub enum WireError {
    /// The `<IDS|MSG>` delimiter frame was not found.
    #[error("missing <IDS|MSG> delimiter in {0} frames")]
    MissingDelimiter(usize),

    /// Fewer frames than the envelope requires follow the delimiter.
    #[error("truncated message: expected at least 5 frames after delimiter, got {0}")]
    Truncated(usize),

    /// The signature frame does not match the message body.
    #[error("invalid message signature")]
    InvalidSignature,

    /// The signing key could not be used.
    #[error("invalid signing key: {0}")]
    InvalidKey(String),

    /// A JSON frame could not be (de)serialized.
    #[error("malformed {frame} frame: {source}")]
    Json {
        frame: &'static str,
        source: serde_json::Error,
    },

    /// Message content did not have the shape expected for its type.
    #[error("unexpected content for {msg_type}: {source}")]
    Content {
        msg_type: String,
        source: serde_json::Error,
    },
}
