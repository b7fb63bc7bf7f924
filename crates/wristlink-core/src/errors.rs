//! Error taxonomy for the connectivity coordinator.
//!
//! Native session errors are mapped into this taxonomy at the delegate
//! boundary and never leak past the coordinator. Codec and registry
//! failures are pure-function errors returned directly to the caller.

use thiserror::Error;
use wristlink_session::SessionError;

// ============================================================================
// Connectivity Errors
// ============================================================================

/// Errors surfaced by coordinator entry points.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConnectivityError {
    /// The platform lacks the paired-device channel entirely.
    #[error("paired-device transport is not supported on this platform")]
    Unsupported,

    /// The session has not completed activation yet.
    #[error("session is not activated")]
    NotActivated,

    /// An activation attempt is already in flight; never queue a second
    /// waiter behind it.
    #[error("activation already in progress")]
    ActivationInProgress,

    /// The transport reported an activation failure.
    #[error("activation failed: {0}")]
    ActivationFailed(#[source] SessionError),

    /// The activation attempt outlived its deadline.
    #[error("activation timed out")]
    ActivationTimedOut,

    /// No companion device is paired.
    #[error("companion device is not paired")]
    CompanionNotPaired,

    /// The companion app is not installed on the paired device.
    #[error("companion app is not installed")]
    CompanionAppNotInstalled,

    /// Interactive messaging is unavailable right now.
    #[error("companion is not reachable")]
    NotReachable,

    /// The serialized payload exceeds the transport ceiling.
    #[error("payload too large: {size} bytes (limit: {limit})")]
    PayloadTooLarge { size: usize, limit: usize },

    /// The payload contained values the transport cannot carry.
    #[error("payload contains unsupported value types")]
    UnsupportedPayloadValue,

    /// A caller-supplied argument was invalid.
    #[error("invalid parameter: {0}")]
    InvalidParameter(&'static str),

    /// The interactive exchange failed on the transport side.
    #[error("reply failed: {0}")]
    ReplyFailed(#[source] SessionError),

    /// No reply arrived before the caller's deadline.
    #[error("reply timed out")]
    ReplyTimedOut,

    /// A one-way delivery failed on the transport side.
    #[error("delivery failed: {0}")]
    DeliveryFailed(#[source] SessionError),

    /// Not enough space to stage the transfer.
    #[error("insufficient space to stage the transfer")]
    InsufficientSpace,

    /// Reserved for the deferred large-transfer surface.
    #[error("file access denied")]
    FileAccessDenied,

    /// Message encoding or decoding failed before any transport call.
    #[error("codec error: {0}")]
    Codec(#[from] CodecError),

    /// Catch-all wrapper for session errors with no dedicated kind.
    #[error("transport session error: {0}")]
    Session(SessionError),
}

impl ConnectivityError {
    /// Map a native session error into the taxonomy.
    ///
    /// Kinds with a dedicated variant map directly; anything else is
    /// wrapped so callers still see a typed error rather than the native
    /// one.
    pub fn from_session(error: SessionError) -> Self {
        match error {
            SessionError::Unsupported => ConnectivityError::Unsupported,
            SessionError::NotActivated => ConnectivityError::NotActivated,
            SessionError::ActivationFailed(_) => ConnectivityError::ActivationFailed(error),
            SessionError::NotPaired => ConnectivityError::CompanionNotPaired,
            SessionError::CompanionAppNotInstalled => ConnectivityError::CompanionAppNotInstalled,
            SessionError::NotReachable => ConnectivityError::NotReachable,
            SessionError::InvalidPayload => ConnectivityError::UnsupportedPayloadValue,
            SessionError::InsufficientSpace => ConnectivityError::InsufficientSpace,
            SessionError::FileAccessDenied => ConnectivityError::FileAccessDenied,
            SessionError::DeliveryFailed(_) | SessionError::Other(_) => {
                ConnectivityError::Session(error)
            }
        }
    }

    /// Map a session error reported while awaiting an interactive reply.
    pub fn from_reply_failure(error: SessionError) -> Self {
        match error {
            SessionError::DeliveryFailed(_) | SessionError::Other(_) => {
                ConnectivityError::ReplyFailed(error)
            }
            other => Self::from_session(other),
        }
    }

    /// Map a session error reported by the background replication path.
    pub fn from_context_failure(error: SessionError) -> Self {
        match error {
            SessionError::DeliveryFailed(_) | SessionError::Other(_) => {
                ConnectivityError::DeliveryFailed(error)
            }
            other => Self::from_session(other),
        }
    }
}

// ============================================================================
// Codec / Decoder Errors
// ============================================================================

/// Serialization-specific errors from the codec and the type registry.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CodecError {
    /// A message's own payload encoder failed.
    #[error("encoding failed: {0}")]
    EncodingFailed(String),

    /// A registered constructor rejected the payload.
    #[error("decoding failed: {0}")]
    DecodingFailed(String),

    /// The binary payload was structurally unusable.
    #[error("invalid binary data")]
    InvalidBinaryData,

    /// The decoded type key did not match the expected type.
    #[error("type key mismatch: expected {expected}, found {found}")]
    TypeKeyMismatch { expected: String, found: String },

    /// A dictionary message carried no type key field.
    #[error("missing type key")]
    MissingTypeKey,

    /// No type is registered under the decoded key.
    #[error("unknown message type: {0}")]
    UnknownMessageType(String),

    /// The resolved type does not support binary decoding.
    #[error("message type is not binary-capable: {0}")]
    NotBinaryCapable(String),

    /// The buffer is too short to carry a type footer.
    #[error("truncated type footer")]
    TruncatedFooter,

    /// The footer's declared key length exceeds the buffer.
    #[error("type footer length out of bounds: key length {key_len}, buffer {buffer_len}")]
    FooterLengthOutOfBounds { key_len: usize, buffer_len: usize },

    /// The type-key bytes were not valid UTF-8.
    #[error("type key is not valid UTF-8")]
    InvalidTypeKeyEncoding,
}

// ============================================================================
// Unit Tests
// ============================================================================
