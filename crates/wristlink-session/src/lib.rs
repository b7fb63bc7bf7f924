//! Transport session abstraction for the WristLink paired-device channel.
//!
//! The operating system exposes the phone/wrist channel through a
//! single-delegate, callback-oriented session object. This crate models
//! that surface as a capability trait so the coordination layer can be
//! written and tested against it without the platform:
//! - `TransportSession` trait and its delegate event surface
//! - the transport-native message value model
//! - an `UnavailableSession` stub for platforms lacking the channel
//! - a scripted `MockSession` for tests

#![forbid(unsafe_code)]

pub mod message;
pub mod testing;
pub mod traits;

pub use message::{ConnectivityMessage, MessageValue};
pub use traits::{
    ActivationState, DataCompletion, DataReplyFn, MessageCompletion, ReplyFn, SessionError,
    SessionEvent, TransportSession, UnavailableSession,
};
