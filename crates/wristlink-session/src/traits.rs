//! Session capability traits and the delegate event surface.
//!
//! The platform session is callback-driven: operations complete through
//! handlers passed at the call site, and unsolicited events (activation
//! completion, reachability flips, inbound messages) arrive through a
//! single delegate. The coordination layer bridges this surface into
//! awaitable operations; everything here stays callback-shaped on purpose.

use bytes::Bytes;
use thiserror::Error;
use tokio::sync::mpsc;

use crate::message::ConnectivityMessage;

/// Mirror of the transport's activation machinery for one session lifetime.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActivationState {
    /// Initial state; the channel has never been activated.
    NotActivated,
    /// Activation has been requested and is in flight.
    Activating,
    /// The channel is live.
    Activated,
    /// The platform signalled transient inactivity.
    Inactive,
}

/// Errors raised by the native transport session.
///
/// These never leak past the coordination layer; they are mapped into the
/// coordinator's taxonomy at the delegate boundary.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SessionError {
    /// The platform does not provide the paired-device channel at all.
    #[error("paired-device transport is not supported on this platform")]
    Unsupported,

    /// The session has not completed activation.
    #[error("session is not activated")]
    NotActivated,

    /// Activation was attempted and failed.
    #[error("activation failed: {0}")]
    ActivationFailed(String),

    /// No companion device is paired.
    #[error("companion device is not paired")]
    NotPaired,

    /// The companion app is not installed on the paired device.
    #[error("companion app is not installed")]
    CompanionAppNotInstalled,

    /// The companion cannot receive an interactive message right now.
    #[error("companion is not reachable")]
    NotReachable,

    /// The payload contained values the transport cannot carry.
    #[error("payload contains unsupported value types")]
    InvalidPayload,

    /// The transport accepted the message but could not deliver it.
    #[error("delivery failed: {0}")]
    DeliveryFailed(String),

    /// Not enough space to stage the transfer.
    #[error("insufficient space to stage the transfer")]
    InsufficientSpace,

    /// The transport could not read a staged file. Reserved for the
    /// deferred large-transfer surface.
    #[error("file access denied")]
    FileAccessDenied,

    /// Anything else the native layer reports.
    #[error("transport session error: {0}")]
    Other(String),
}

/// Completion handler for an interactive dictionary send.
pub type MessageCompletion = Box<dyn FnOnce(Result<ConnectivityMessage, SessionError>) + Send>;

/// Completion handler for an interactive binary send.
pub type DataCompletion = Box<dyn FnOnce(Result<Bytes, SessionError>) + Send>;

/// One-shot reply handler handed up with an inbound interactive message.
pub type ReplyFn = Box<dyn FnOnce(ConnectivityMessage) + Send>;

/// One-shot reply handler handed up with an inbound binary message.
pub type DataReplyFn = Box<dyn FnOnce(Bytes) + Send>;

/// Events raised by the session delegate.
///
/// Delivered on an arbitrary thread by the native layer; consumers must
/// hand off into their own isolation domain before touching state.
pub enum SessionEvent {
    /// The activation attempt finished.
    ActivationCompleted(Result<(), SessionError>),
    /// The platform signalled transient inactivity.
    BecameInactive,
    /// The platform tore the session down.
    Deactivated,
    /// Live reachability of the companion flipped.
    ReachabilityChanged(bool),
    /// Companion pairing or app installation changed.
    CompanionStateChanged { app_installed: bool, paired: bool },
    /// An interactive or fire-and-forget dictionary message arrived.
    /// `reply` is present when the sender is awaiting a response.
    MessageReceived {
        message: ConnectivityMessage,
        reply: Option<ReplyFn>,
    },
    /// A replicated application context arrived.
    ApplicationContextReceived(ConnectivityMessage),
    /// A binary payload arrived. `reply` is present when the sender is
    /// awaiting a binary response.
    DataReceived { data: Bytes, reply: Option<DataReplyFn> },
}

impl SessionEvent {
    /// Short name for logging; events carry non-Debug callbacks.
    pub fn kind(&self) -> &'static str {
        match self {
            SessionEvent::ActivationCompleted(_) => "activation-completed",
            SessionEvent::BecameInactive => "became-inactive",
            SessionEvent::Deactivated => "deactivated",
            SessionEvent::ReachabilityChanged(_) => "reachability-changed",
            SessionEvent::CompanionStateChanged { .. } => "companion-state-changed",
            SessionEvent::MessageReceived { .. } => "message-received",
            SessionEvent::ApplicationContextReceived(_) => "application-context-received",
            SessionEvent::DataReceived { .. } => "data-received",
        }
    }
}

impl std::fmt::Debug for SessionEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.kind())
    }
}

/// Capability trait over the platform session object.
///
/// One concrete binding talks to the OS pairing/messaging service; the
/// `UnavailableSession` binding covers platforms without the channel, and
/// `testing::MockSession` scripts the surface for tests.
pub trait TransportSession: Send + Sync {
    /// Kick off activation. Completion arrives as
    /// `SessionEvent::ActivationCompleted` on the delegate, not here.
    fn begin_activation(&self) -> Result<(), SessionError>;

    /// The transport's own view of the activation machinery.
    fn activation_state(&self) -> ActivationState;

    /// Whether the companion can receive an interactive message now.
    fn is_reachable(&self) -> bool;

    /// Whether a companion device is paired.
    fn is_paired(&self) -> bool;

    /// Whether the companion app is installed on the paired device.
    fn is_companion_app_installed(&self) -> bool;

    /// Best-effort, last-value-wins background replication.
    fn update_application_context(&self, context: ConnectivityMessage) -> Result<(), SessionError>;

    /// One-shot interactive dictionary send. The completion handler is
    /// invoked exactly once with the reply or an error, or dropped if the
    /// transport abandons the exchange.
    fn send_message(&self, message: ConnectivityMessage, on_complete: MessageCompletion);

    /// One-shot interactive binary send.
    fn send_message_data(&self, data: Bytes, on_complete: DataCompletion);

    /// Install the single delegate. Events must be pushed into `delegate`
    /// from whatever thread the native layer uses.
    fn install_delegate(&self, delegate: mpsc::UnboundedSender<SessionEvent>);
}

/// Binding for platforms that lack the paired-device channel entirely.
///
/// Every query answers "no channel" and every operation fails with
/// `SessionError::Unsupported`. No delegate events are ever raised.
#[derive(Debug, Default)]
pub struct UnavailableSession;

impl UnavailableSession {
    pub fn new() -> Self {
        Self
    }
}

impl TransportSession for UnavailableSession {
    fn begin_activation(&self) -> Result<(), SessionError> {
        Err(SessionError::Unsupported)
    }

    fn activation_state(&self) -> ActivationState {
        ActivationState::NotActivated
    }

    fn is_reachable(&self) -> bool {
        false
    }

    fn is_paired(&self) -> bool {
        false
    }

    fn is_companion_app_installed(&self) -> bool {
        false
    }

    fn update_application_context(&self, _context: ConnectivityMessage) -> Result<(), SessionError> {
        Err(SessionError::Unsupported)
    }

    fn send_message(&self, _message: ConnectivityMessage, on_complete: MessageCompletion) {
        on_complete(Err(SessionError::Unsupported));
    }

    fn send_message_data(&self, _data: Bytes, on_complete: DataCompletion) {
        on_complete(Err(SessionError::Unsupported));
    }

    fn install_delegate(&self, _delegate: mpsc::UnboundedSender<SessionEvent>) {}
}
