//! Connectivity coordinator: activation bridging and message routing.
//!
//! The coordinator reconciles the single-delegate, callback-oriented
//! transport session with a many-consumer async surface:
//! - `activate` bridges the callback-based activation protocol into one
//!   awaitable operation with a timeout, with at most one attempt in
//!   flight per coordinator;
//! - `send` routes between live interactive exchange and best-effort
//!   background replication based on reachability at decision time;
//! - delegate events are handed into a single owning task before any
//!   state is touched, then fanned out to registered observers.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::codec;
use crate::errors::ConnectivityError;
use crate::message::{
    envelope, wrap_binary, BinaryMessagable, Messagable, MessageTransport, PARAMETERS_FIELD,
    TYPE_KEY_FIELD, DEFAULT_MESSAGE_SIZE_LIMIT,
};
use crate::observers::{
    ConnectivityObserver, DataReplyResponder, ObserverRegistry, ReceiveContext, ReceivedData,
    ReceivedMessage, ReplyResponder,
};
use wristlink_session::{
    ActivationState, ConnectivityMessage, SessionError, SessionEvent, TransportSession,
};

// ============================================================================
// Configuration
// ============================================================================

/// Tunables for a coordinator instance.
#[derive(Debug, Clone)]
pub struct CoordinatorConfig {
    /// Ceiling for serialized payloads, checked before any transport call.
    pub message_size_limit: usize,
    /// Timeout used by [`Coordinator::activate_with_default_timeout`].
    pub default_activation_timeout: Duration,
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self {
            message_size_limit: DEFAULT_MESSAGE_SIZE_LIMIT,
            default_activation_timeout: Duration::from_secs(10),
        }
    }
}

// ============================================================================
// Send Results
// ============================================================================

/// Outcome of a successful send, with the wire representation used.
///
/// Failures are the `Err` side of the entry points; a background
/// fallback is never coerced into a reply result.
#[derive(Debug)]
pub enum SendResult {
    /// The message was applied as a last-value-wins background update.
    AppliedAsBackgroundUpdate { transport: MessageTransport },
    /// The companion replied with a dictionary message.
    Replied {
        message: ConnectivityMessage,
        transport: MessageTransport,
    },
    /// The companion replied with a binary payload.
    RepliedData {
        data: Bytes,
        transport: MessageTransport,
    },
}

impl SendResult {
    /// The wire representation this send used.
    pub fn transport(&self) -> MessageTransport {
        match self {
            SendResult::AppliedAsBackgroundUpdate { transport }
            | SendResult::Replied { transport, .. }
            | SendResult::RepliedData { transport, .. } => *transport,
        }
    }
}

// ============================================================================
// Statistics
// ============================================================================

/// Counters for send and event activity.
#[derive(Debug, Default)]
pub struct CoordinatorStats {
    /// Interactive sends attempted.
    pub interactive_sends: AtomicU64,
    /// Interactive sends that received a reply.
    pub replies: AtomicU64,
    /// Interactive sends resolved by the reply timeout.
    pub reply_timeouts: AtomicU64,
    /// Sends routed to background replication.
    pub background_updates: AtomicU64,
    /// Sends that failed for any other reason.
    pub send_failures: AtomicU64,
    /// Sends rejected by the payload ceiling.
    pub oversize_rejected: AtomicU64,
    /// Delegate events processed.
    pub events: AtomicU64,
}

impl CoordinatorStats {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of the counters at a point in time.
    pub fn snapshot(&self) -> CoordinatorStatsSnapshot {
        CoordinatorStatsSnapshot {
            interactive_sends: self.interactive_sends.load(Ordering::Relaxed),
            replies: self.replies.load(Ordering::Relaxed),
            reply_timeouts: self.reply_timeouts.load(Ordering::Relaxed),
            background_updates: self.background_updates.load(Ordering::Relaxed),
            send_failures: self.send_failures.load(Ordering::Relaxed),
            oversize_rejected: self.oversize_rejected.load(Ordering::Relaxed),
            events: self.events.load(Ordering::Relaxed),
        }
    }

    fn inc_interactive_sends(&self) {
        self.interactive_sends.fetch_add(1, Ordering::Relaxed);
    }

    fn inc_replies(&self) {
        self.replies.fetch_add(1, Ordering::Relaxed);
    }

    fn inc_reply_timeouts(&self) {
        self.reply_timeouts.fetch_add(1, Ordering::Relaxed);
    }

    fn inc_background_updates(&self) {
        self.background_updates.fetch_add(1, Ordering::Relaxed);
    }

    fn inc_send_failures(&self) {
        self.send_failures.fetch_add(1, Ordering::Relaxed);
    }

    fn inc_oversize_rejected(&self) {
        self.oversize_rejected.fetch_add(1, Ordering::Relaxed);
    }

    fn inc_events(&self) {
        self.events.fetch_add(1, Ordering::Relaxed);
    }
}

/// Point-in-time copy of [`CoordinatorStats`].
#[derive(Debug, Clone, Copy, Default)]
pub struct CoordinatorStatsSnapshot {
    pub interactive_sends: u64,
    pub replies: u64,
    pub reply_timeouts: u64,
    pub background_updates: u64,
    pub send_failures: u64,
    pub oversize_rejected: u64,
    pub events: u64,
}

// ============================================================================
// Coordinator Task
// ============================================================================

/// One event's worth of observer notification, applied to each observer.
type Notification = Box<dyn Fn(&dyn ConnectivityObserver) + Send>;

enum Command {
    Activate {
        timeout: Duration,
        responder: oneshot::Sender<Result<(), ConnectivityError>>,
    },
    ActivationTimedOut {
        generation: u64,
    },
    QueryState {
        responder: oneshot::Sender<ActivationState>,
    },
    Session(SessionEvent),
}

/// The single in-flight activation attempt.
///
/// Exactly one of {delegate success, delegate failure, timer} claims the
/// slot; the losers become no-ops. The generation tag keeps a stale
/// timer from resolving a later attempt.
struct PendingActivation {
    responder: oneshot::Sender<Result<(), ConnectivityError>>,
    generation: u64,
    timer: JoinHandle<()>,
}

/// State owned exclusively by the coordinator's event-loop task.
struct CoordinatorTask {
    session: Arc<dyn TransportSession>,
    stats: Arc<CoordinatorStats>,
    cmd_tx: mpsc::UnboundedSender<Command>,
    notify_tx: mpsc::UnboundedSender<Notification>,
    state: ActivationState,
    pending: Option<PendingActivation>,
    generation: u64,
}

impl CoordinatorTask {
    async fn run(mut self, mut cmd_rx: mpsc::UnboundedReceiver<Command>) {
        while let Some(command) = cmd_rx.recv().await {
            self.handle(command);
        }
        debug!("coordinator task stopped");
    }

    fn handle(&mut self, command: Command) {
        match command {
            Command::Activate { timeout, responder } => self.handle_activate(timeout, responder),
            Command::ActivationTimedOut { generation } => self.handle_activation_timeout(generation),
            Command::QueryState { responder } => {
                let _ = responder.send(self.state);
            }
            Command::Session(event) => {
                self.stats.inc_events();
                self.handle_session_event(event);
            }
        }
    }

    fn handle_activate(
        &mut self,
        timeout: Duration,
        responder: oneshot::Sender<Result<(), ConnectivityError>>,
    ) {
        if self.state == ActivationState::Activated {
            let _ = responder.send(Ok(()));
            return;
        }
        if self.pending.is_some() {
            let _ = responder.send(Err(ConnectivityError::ActivationInProgress));
            return;
        }

        self.generation += 1;
        let generation = self.generation;
        let cmd_tx = self.cmd_tx.clone();
        let timer = tokio::spawn(async move {
            tokio::time::sleep(timeout).await;
            let _ = cmd_tx.send(Command::ActivationTimedOut { generation });
        });
        self.pending = Some(PendingActivation {
            responder,
            generation,
            timer,
        });

        self.set_state(ActivationState::Activating);
        if let Err(error) = self.session.begin_activation() {
            warn!(%error, "activation could not be started");
            self.resolve_pending(Err(ConnectivityError::from_session(error)));
            self.set_state(ActivationState::NotActivated);
        }
    }

    fn handle_activation_timeout(&mut self, generation: u64) {
        let matches = self
            .pending
            .as_ref()
            .is_some_and(|pending| pending.generation == generation);
        if !matches {
            debug!(generation, "stale activation timer ignored");
            return;
        }
        warn!("activation timed out");
        self.resolve_pending(Err(ConnectivityError::ActivationTimedOut));
        self.set_state(ActivationState::NotActivated);
    }

    fn handle_session_event(&mut self, event: SessionEvent) {
        match event {
            SessionEvent::ActivationCompleted(Ok(())) => {
                self.resolve_pending(Ok(()));
                self.set_state(ActivationState::Activated);
            }
            SessionEvent::ActivationCompleted(Err(error)) => {
                warn!(%error, "activation failed");
                self.resolve_pending(Err(ConnectivityError::ActivationFailed(error)));
                self.set_state(ActivationState::NotActivated);
            }
            SessionEvent::BecameInactive => {
                self.set_state(ActivationState::Inactive);
            }
            SessionEvent::Deactivated => {
                self.set_state(ActivationState::NotActivated);
            }
            SessionEvent::ReachabilityChanged(reachable) => {
                debug!(reachable, "reachability changed");
                self.fan_out(move |observer| observer.reachability_changed(reachable));
            }
            SessionEvent::CompanionStateChanged {
                app_installed,
                paired,
            } => {
                debug!(app_installed, paired, "companion state changed");
                self.fan_out(move |observer| {
                    observer.companion_app_install_changed(app_installed);
                    observer.paired_changed(paired);
                });
            }
            SessionEvent::MessageReceived { message, reply } => {
                let context = match reply {
                    Some(reply) => ReceiveContext::AwaitingReply(ReplyResponder::new(reply)),
                    None => ReceiveContext::BackgroundUpdate,
                };
                let received = Arc::new(ReceivedMessage { message, context });
                self.fan_out(move |observer| observer.message_received(&received));
            }
            SessionEvent::ApplicationContextReceived(context) => {
                let context = Arc::new(context);
                self.fan_out(move |observer| observer.application_context_received(&context));
            }
            SessionEvent::DataReceived { data, reply } => {
                debug!(
                    len = data.len(),
                    prefix = %hex::encode(&data[..data.len().min(8)]),
                    "binary payload received"
                );
                let received = Arc::new(ReceivedData {
                    data,
                    reply: reply.map(DataReplyResponder::new),
                });
                self.fan_out(move |observer| observer.message_data_received(&received));
            }
        }
    }

    /// Resolve the pending activation, if any, and cancel its timer.
    fn resolve_pending(&mut self, result: Result<(), ConnectivityError>) {
        if let Some(pending) = self.pending.take() {
            pending.timer.abort();
            let _ = pending.responder.send(result);
        }
    }

    fn set_state(&mut self, new_state: ActivationState) {
        if self.state == new_state {
            return;
        }
        debug!(from = ?self.state, to = ?new_state, "activation state changed");
        self.state = new_state;
        self.fan_out(move |observer| observer.activation_state_changed(new_state));
    }

    /// Queue a fan-out on the notifier task.
    ///
    /// Notifications are delivered by a single long-lived task, one event
    /// at a time in queue order, so slow or re-entrant observer code never
    /// stalls delegate handling and observers are never entered
    /// concurrently by this bus.
    fn fan_out(&self, notify: impl Fn(&dyn ConnectivityObserver) + Send + 'static) {
        let _ = self.notify_tx.send(Box::new(notify));
    }
}

// ============================================================================
// Coordinator Handle
// ============================================================================

/// Handle to a connectivity coordinator.
///
/// Cheap to clone; all clones share the same session, observer registry
/// and activation state machine. Must be created inside a tokio runtime.
#[derive(Clone)]
pub struct Coordinator {
    session: Arc<dyn TransportSession>,
    observers: Arc<ObserverRegistry>,
    stats: Arc<CoordinatorStats>,
    config: CoordinatorConfig,
    cmd_tx: mpsc::UnboundedSender<Command>,
}

impl Coordinator {
    /// Create a coordinator over `session` with default configuration.
    pub fn new(session: Arc<dyn TransportSession>) -> Self {
        Self::with_config(session, CoordinatorConfig::default())
    }

    /// Create a coordinator with explicit configuration.
    pub fn with_config(session: Arc<dyn TransportSession>, config: CoordinatorConfig) -> Self {
        let observers = Arc::new(ObserverRegistry::new());
        let stats = Arc::new(CoordinatorStats::new());
        let (cmd_tx, cmd_rx) = mpsc::unbounded_channel();

        // Delegate events hand off into the owning task before any state
        // is touched; the native layer raises them on arbitrary threads.
        let (event_tx, mut event_rx) = mpsc::unbounded_channel();
        session.install_delegate(event_tx);
        let forward_tx = cmd_tx.clone();
        tokio::spawn(async move {
            while let Some(event) = event_rx.recv().await {
                if forward_tx.send(Command::Session(event)).is_err() {
                    break;
                }
            }
        });

        // Single notifier task: fan-outs for consecutive events run on one
        // execution context, serialized in event order.
        let (notify_tx, mut notify_rx) = mpsc::unbounded_channel::<Notification>();
        let notify_observers = observers.clone();
        tokio::spawn(async move {
            while let Some(notify) = notify_rx.recv().await {
                notify_observers.notify_each(|observer| notify(observer));
            }
        });

        let task = CoordinatorTask {
            session: session.clone(),
            stats: stats.clone(),
            cmd_tx: cmd_tx.clone(),
            notify_tx,
            state: ActivationState::NotActivated,
            pending: None,
            generation: 0,
        };
        tokio::spawn(task.run(cmd_rx));

        Self {
            session,
            observers,
            stats,
            config,
            cmd_tx,
        }
    }

    /// The observer registry for this coordinator.
    pub fn observers(&self) -> &Arc<ObserverRegistry> {
        &self.observers
    }

    /// Register an observer; convenience over [`Coordinator::observers`].
    pub fn add_observer(&self, observer: Arc<dyn ConnectivityObserver>) {
        self.observers.add(observer);
    }

    /// Send/event counters for this coordinator.
    pub fn stats(&self) -> &Arc<CoordinatorStats> {
        &self.stats
    }

    /// The coordinator's view of the activation state machine.
    pub async fn activation_state(&self) -> ActivationState {
        let (tx, rx) = oneshot::channel();
        if self.cmd_tx.send(Command::QueryState { responder: tx }).is_err() {
            return ActivationState::NotActivated;
        }
        rx.await.unwrap_or(ActivationState::NotActivated)
    }

    /// Whether the companion can receive an interactive message now.
    pub fn is_reachable(&self) -> bool {
        self.session.is_reachable()
    }

    /// Whether a companion device is paired.
    pub fn is_paired(&self) -> bool {
        self.session.is_paired()
    }

    /// Whether the companion app is installed on the paired device.
    pub fn is_companion_app_installed(&self) -> bool {
        self.session.is_companion_app_installed()
    }

    /// Activate the channel, waiting at most `timeout`.
    ///
    /// Idempotent once activated. Fails fast with
    /// [`ConnectivityError::ActivationInProgress`] if another activation
    /// is already in flight; a second waiter is never queued.
    pub async fn activate(&self, timeout: Duration) -> Result<(), ConnectivityError> {
        let (tx, rx) = oneshot::channel();
        self.cmd_tx
            .send(Command::Activate {
                timeout,
                responder: tx,
            })
            .map_err(|_| Self::stopped())?;
        rx.await.map_err(|_| Self::stopped())?
    }

    /// [`Coordinator::activate`] with the configured default timeout.
    pub async fn activate_with_default_timeout(&self) -> Result<(), ConnectivityError> {
        self.activate(self.config.default_activation_timeout).await
    }

    /// Send a typed message on the dictionary transport.
    pub async fn send<M: Messagable>(
        &self,
        message: &M,
        reply_timeout: Duration,
    ) -> Result<SendResult, ConnectivityError> {
        let payload = envelope(message)?;
        self.send_message(payload, reply_timeout).await
    }

    /// Send a raw dictionary message.
    ///
    /// Routing: reachable companions get a live interactive exchange
    /// raced against `reply_timeout`; unreachable-but-installed
    /// companions get a background replication update; otherwise the
    /// send fails without touching the transport. Reachability is
    /// consulted once, at decision time.
    pub async fn send_message(
        &self,
        payload: ConnectivityMessage,
        reply_timeout: Duration,
    ) -> Result<SendResult, ConnectivityError> {
        let size = payload.estimated_size();
        if size > self.config.message_size_limit {
            self.stats.inc_oversize_rejected();
            return Err(ConnectivityError::PayloadTooLarge {
                size,
                limit: self.config.message_size_limit,
            });
        }

        if self.session.is_reachable() {
            self.stats.inc_interactive_sends();
            let (tx, rx) = oneshot::channel();
            self.session.send_message(
                payload,
                Box::new(move |result| {
                    // A reply arriving after the timeout lands in a closed
                    // channel and is dropped; the caller already resolved.
                    let _ = tx.send(result);
                }),
            );
            match tokio::time::timeout(reply_timeout, rx).await {
                Ok(Ok(Ok(reply))) => {
                    self.stats.inc_replies();
                    Ok(SendResult::Replied {
                        message: reply,
                        transport: MessageTransport::Dictionary,
                    })
                }
                Ok(Ok(Err(error))) => {
                    self.stats.inc_send_failures();
                    Err(ConnectivityError::from_reply_failure(error))
                }
                Ok(Err(_closed)) => {
                    self.stats.inc_send_failures();
                    Err(ConnectivityError::DeliveryFailed(SessionError::Other(
                        "transport dropped the reply callback".into(),
                    )))
                }
                Err(_elapsed) => {
                    warn!("reply timed out");
                    self.stats.inc_reply_timeouts();
                    Err(ConnectivityError::ReplyTimedOut)
                }
            }
        } else if self.session.is_companion_app_installed() {
            debug!("companion unreachable, applying as background update");
            self.session
                .update_application_context(payload)
                .map_err(|error| {
                    self.stats.inc_send_failures();
                    ConnectivityError::from_context_failure(error)
                })?;
            self.stats.inc_background_updates();
            Ok(SendResult::AppliedAsBackgroundUpdate {
                transport: MessageTransport::Dictionary,
            })
        } else if !self.session.is_paired() {
            self.stats.inc_send_failures();
            Err(ConnectivityError::CompanionNotPaired)
        } else {
            self.stats.inc_send_failures();
            Err(ConnectivityError::CompanionAppNotInstalled)
        }
    }

    /// Send a binary-capable message on the binary transport.
    ///
    /// The encoded payload carries the type footer. On the background
    /// path the encoded bytes ride the replication dictionary under the
    /// reserved binary key; the transport is still recorded as binary.
    pub async fn send_binary<M: BinaryMessagable>(
        &self,
        message: &M,
        reply_timeout: Duration,
    ) -> Result<SendResult, ConnectivityError> {
        let encoded = codec::encode_message(message)?;

        let size = encoded.len();
        if size > self.config.message_size_limit {
            self.stats.inc_oversize_rejected();
            return Err(ConnectivityError::PayloadTooLarge {
                size,
                limit: self.config.message_size_limit,
            });
        }

        if self.session.is_reachable() {
            self.stats.inc_interactive_sends();
            let (tx, rx) = oneshot::channel();
            self.session.send_message_data(
                encoded,
                Box::new(move |result| {
                    let _ = tx.send(result);
                }),
            );
            match tokio::time::timeout(reply_timeout, rx).await {
                Ok(Ok(Ok(data))) => {
                    self.stats.inc_replies();
                    Ok(SendResult::RepliedData {
                        data,
                        transport: MessageTransport::Binary,
                    })
                }
                Ok(Ok(Err(error))) => {
                    self.stats.inc_send_failures();
                    Err(ConnectivityError::from_reply_failure(error))
                }
                Ok(Err(_closed)) => {
                    self.stats.inc_send_failures();
                    Err(ConnectivityError::DeliveryFailed(SessionError::Other(
                        "transport dropped the reply callback".into(),
                    )))
                }
                Err(_elapsed) => {
                    warn!("binary reply timed out");
                    self.stats.inc_reply_timeouts();
                    Err(ConnectivityError::ReplyTimedOut)
                }
            }
        } else if self.session.is_companion_app_installed() {
            debug!("companion unreachable, replicating binary payload");
            self.session
                .update_application_context(wrap_binary(encoded))
                .map_err(|error| {
                    self.stats.inc_send_failures();
                    ConnectivityError::from_context_failure(error)
                })?;
            self.stats.inc_background_updates();
            Ok(SendResult::AppliedAsBackgroundUpdate {
                transport: MessageTransport::Binary,
            })
        } else if !self.session.is_paired() {
            self.stats.inc_send_failures();
            Err(ConnectivityError::CompanionNotPaired)
        } else {
            self.stats.inc_send_failures();
            Err(ConnectivityError::CompanionAppNotInstalled)
        }
    }

    /// Send a binary-capable message on the dictionary transport.
    ///
    /// Escape hatch for compatibility testing: the raw payload rides the
    /// envelope under the reserved binary key, no footer involved.
    pub async fn send_binary_via_dictionary<M: BinaryMessagable>(
        &self,
        message: &M,
        reply_timeout: Duration,
    ) -> Result<SendResult, ConnectivityError> {
        let payload = ConnectivityMessage::new()
            .with(TYPE_KEY_FIELD, M::type_key())
            .with(PARAMETERS_FIELD, wrap_binary(message.to_bytes()?));
        self.send_message(payload, reply_timeout).await
    }

    fn stopped() -> ConnectivityError {
        ConnectivityError::Session(SessionError::Other("coordinator task stopped".into()))
    }
}
