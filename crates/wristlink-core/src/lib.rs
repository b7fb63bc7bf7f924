//! Connectivity coordination for a paired phone/wrist-device channel.
//!
//! The platform transport is callback-driven and single-delegate; this
//! crate turns it into an awaitable, multi-consumer surface:
//!
//! - [`Coordinator`]: awaitable activation with a timeout, and sends
//!   routed between live interactive exchange and background
//!   replication based on reachability;
//! - [`Messagable`] / [`BinaryMessagable`]: typed messages over the
//!   transport-native dictionary or an opaque byte payload;
//! - [`codec`]: the trailing type-footer wire format for binary
//!   payloads;
//! - [`MessageRegistry`]: inbound payload decoding keyed by type;
//! - [`ConnectivityObserver`] / [`ObserverRegistry`]: fan-out of
//!   session-state changes and inbound messages.
//!
//! Session bindings live in `wristlink-session`; this crate is
//! transport-agnostic above that seam.

#![forbid(unsafe_code)]

pub mod codec;
pub mod coordinator;
pub mod errors;
pub mod harness;
pub mod message;
pub mod observers;
pub mod registry;

pub use coordinator::{
    Coordinator, CoordinatorConfig, CoordinatorStats, CoordinatorStatsSnapshot, SendResult,
};
pub use errors::{CodecError, ConnectivityError};
pub use harness::ConnectivityHarness;
pub use message::{
    envelope, open_envelope, unwrap_binary, wrap_binary, BinaryMessagable, Messagable,
    MessageTransport, BINARY_PAYLOAD_FIELD, DEFAULT_MESSAGE_SIZE_LIMIT, PARAMETERS_FIELD,
    TYPE_KEY_FIELD,
};
pub use observers::{
    ConnectivityObserver, DataReplyResponder, ObserverRegistry, ReceiveContext, ReceivedData,
    ReceivedMessage, ReplyResponder,
};
pub use registry::{DecodedMessage, MessageRegistry};

pub use wristlink_session::{
    ActivationState, ConnectivityMessage, MessageValue, SessionError, SessionEvent,
    TransportSession, UnavailableSession,
};
