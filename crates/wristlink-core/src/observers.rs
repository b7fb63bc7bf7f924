//! Multi-subscriber notification bus for session-state changes.
//!
//! The registry holds strong references for the coordinator's lifetime;
//! callers unregister explicitly. Earlier weak-reference designs of this
//! kind of bus dropped observers mid-flight, so ownership is deliberate
//! here, not an oversight.

use std::sync::Arc;

use parking_lot::Mutex;
use tracing::debug;

use crate::errors::ConnectivityError;
use wristlink_session::{ActivationState, ConnectivityMessage, DataReplyFn, ReplyFn};

// ============================================================================
// Receive Context
// ============================================================================

/// One-shot responder for an inbound interactive message.
///
/// Shared across the fan-out; exactly one handler may consume it.
pub struct ReplyResponder {
    reply: Mutex<Option<ReplyFn>>,
}

impl ReplyResponder {
    pub(crate) fn new(reply: ReplyFn) -> Self {
        Self {
            reply: Mutex::new(Some(reply)),
        }
    }

    /// Send the reply. Fails if a reply has already been sent.
    pub fn reply(&self, message: ConnectivityMessage) -> Result<(), ConnectivityError> {
        match self.reply.lock().take() {
            Some(reply) => {
                reply(message);
                Ok(())
            }
            None => Err(ConnectivityError::InvalidParameter("reply already sent")),
        }
    }

    /// Whether a reply has been sent.
    pub fn is_consumed(&self) -> bool {
        self.reply.lock().is_none()
    }
}

impl std::fmt::Debug for ReplyResponder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReplyResponder")
            .field("consumed", &self.is_consumed())
            .finish()
    }
}

/// One-shot responder for an inbound interactive binary payload.
pub struct DataReplyResponder {
    reply: Mutex<Option<DataReplyFn>>,
}

impl DataReplyResponder {
    pub(crate) fn new(reply: DataReplyFn) -> Self {
        Self {
            reply: Mutex::new(Some(reply)),
        }
    }

    /// Send the binary reply. Fails if a reply has already been sent.
    pub fn reply(&self, data: bytes::Bytes) -> Result<(), ConnectivityError> {
        match self.reply.lock().take() {
            Some(reply) => {
                reply(data);
                Ok(())
            }
            None => Err(ConnectivityError::InvalidParameter("reply already sent")),
        }
    }
}

/// How an inbound message arrived.
#[derive(Debug)]
pub enum ReceiveContext {
    /// The sender is awaiting an interactive reply.
    AwaitingReply(ReplyResponder),
    /// Fire-and-forget or replicated delivery; no reply channel.
    BackgroundUpdate,
}

/// An inbound dictionary message with its delivery context.
#[derive(Debug)]
pub struct ReceivedMessage {
    pub message: ConnectivityMessage,
    pub context: ReceiveContext,
}

/// An inbound binary payload with its reply channel, if any.
pub struct ReceivedData {
    pub data: bytes::Bytes,
    pub reply: Option<DataReplyResponder>,
}

// ============================================================================
// Observer Capability
// ============================================================================

/// Push-notification capability for connectivity changes.
///
/// Every method has a no-op default so implementers override only what
/// they need. Notifications are delivered off the delegate callback, one
/// event at a time, so implementations need no internal locking for state
/// driven purely by this bus.
pub trait ConnectivityObserver: Send + Sync {
    /// The coordinator's activation state changed.
    fn activation_state_changed(&self, _state: ActivationState) {}

    /// Live reachability of the companion flipped.
    fn reachability_changed(&self, _reachable: bool) {}

    /// The companion app was installed or removed.
    fn companion_app_install_changed(&self, _installed: bool) {}

    /// Pairing changed. Only raised on the primary device.
    fn paired_changed(&self, _paired: bool) {}

    /// An interactive or fire-and-forget dictionary message arrived.
    fn message_received(&self, _received: &ReceivedMessage) {}

    /// A binary payload arrived.
    fn message_data_received(&self, _received: &ReceivedData) {}

    /// A replicated application context arrived.
    fn application_context_received(&self, _context: &ConnectivityMessage) {}
}

// ============================================================================
// Observer Registry
// ============================================================================

/// Concurrency-safe observer collection.
///
/// Notification snapshots the collection and iterates outside the lock,
/// so concurrent registration or removal never tears an in-flight
/// fan-out; each observer is notified at most once per event.
#[derive(Default)]
pub struct ObserverRegistry {
    observers: Mutex<Vec<Arc<dyn ConnectivityObserver>>>,
}

impl ObserverRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an observer. The registry holds a strong reference until
    /// it is explicitly removed.
    pub fn add(&self, observer: Arc<dyn ConnectivityObserver>) {
        let mut observers = self.observers.lock();
        observers.push(observer);
        debug!(count = observers.len(), "observer registered");
    }

    /// Remove one observer by identity. Returns whether it was present.
    pub fn remove(&self, observer: &Arc<dyn ConnectivityObserver>) -> bool {
        let mut observers = self.observers.lock();
        let before = observers.len();
        observers.retain(|existing| !Arc::ptr_eq(existing, observer));
        let removed = observers.len() < before;
        if removed {
            debug!(count = observers.len(), "observer removed");
        }
        removed
    }

    /// Remove every observer matching the predicate. Returns the number
    /// removed.
    pub fn remove_where(
        &self,
        predicate: impl Fn(&Arc<dyn ConnectivityObserver>) -> bool,
    ) -> usize {
        let mut observers = self.observers.lock();
        let before = observers.len();
        observers.retain(|existing| !predicate(existing));
        before - observers.len()
    }

    /// Number of registered observers.
    pub fn len(&self) -> usize {
        self.observers.lock().len()
    }

    /// Whether the registry is empty.
    pub fn is_empty(&self) -> bool {
        self.observers.lock().is_empty()
    }

    /// Notify every currently-registered observer exactly once.
    ///
    /// The snapshot is taken before the first call, so an observer that
    /// removes itself (or others) mid-notification affects the next
    /// event, not this one.
    pub fn notify_each(&self, notify: impl Fn(&dyn ConnectivityObserver)) {
        let snapshot: Vec<Arc<dyn ConnectivityObserver>> = self.observers.lock().clone();
        for observer in snapshot {
            notify(observer.as_ref());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Default)]
    struct CountingObserver {
        reachability_events: AtomicUsize,
    }

    impl ConnectivityObserver for CountingObserver {
        fn reachability_changed(&self, _reachable: bool) {
            self.reachability_events.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[test]
    fn test_fan_out_notifies_each_observer_once() {
        let registry = ObserverRegistry::new();
        let observers: Vec<Arc<CountingObserver>> =
            (0..5).map(|_| Arc::new(CountingObserver::default())).collect();
        for observer in &observers {
            registry.add(observer.clone());
        }

        registry.notify_each(|o| o.reachability_changed(true));

        for observer in &observers {
            assert_eq!(observer.reachability_events.load(Ordering::SeqCst), 1);
        }
    }

    #[test]
    fn test_remove_by_identity() {
        let registry = ObserverRegistry::new();
        let first: Arc<dyn ConnectivityObserver> = Arc::new(CountingObserver::default());
        let second: Arc<dyn ConnectivityObserver> = Arc::new(CountingObserver::default());
        registry.add(first.clone());
        registry.add(second.clone());

        assert!(registry.remove(&first));
        assert!(!registry.remove(&first));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_remove_where_bulk() {
        let registry = ObserverRegistry::new();
        for _ in 0..4 {
            registry.add(Arc::new(CountingObserver::default()));
        }
        assert_eq!(registry.remove_where(|_| true), 4);
        assert!(registry.is_empty());
    }

    struct SelfRemovingObserver {
        registry: Arc<ObserverRegistry>,
        this: Mutex<Option<Arc<dyn ConnectivityObserver>>>,
        notified: AtomicUsize,
    }

    impl ConnectivityObserver for SelfRemovingObserver {
        fn reachability_changed(&self, _reachable: bool) {
            self.notified.fetch_add(1, Ordering::SeqCst);
            if let Some(this) = self.this.lock().take() {
                self.registry.remove(&this);
            }
        }
    }

    #[test]
    fn test_observer_can_remove_itself_mid_notification() {
        let registry = Arc::new(ObserverRegistry::new());
        let bystander = Arc::new(CountingObserver::default());

        let remover = Arc::new(SelfRemovingObserver {
            registry: registry.clone(),
            this: Mutex::new(None),
            notified: AtomicUsize::new(0),
        });
        let remover_dyn: Arc<dyn ConnectivityObserver> = remover.clone();
        *remover.this.lock() = Some(remover_dyn.clone());

        registry.add(remover_dyn);
        registry.add(bystander.clone());

        registry.notify_each(|o| o.reachability_changed(false));

        // Everyone saw this event exactly once...
        assert_eq!(remover.notified.load(Ordering::SeqCst), 1);
        assert_eq!(bystander.reachability_events.load(Ordering::SeqCst), 1);
        // ...and the self-removal takes effect for the next one.
        assert_eq!(registry.len(), 1);
        registry.notify_each(|o| o.reachability_changed(true));
        assert_eq!(remover.notified.load(Ordering::SeqCst), 1);
        assert_eq!(bystander.reachability_events.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_reply_responder_is_one_shot() {
        let delivered = Arc::new(Mutex::new(Vec::new()));
        let sink = delivered.clone();
        let responder = ReplyResponder::new(Box::new(move |message| {
            sink.lock().push(message);
        }));

        assert!(!responder.is_consumed());
        responder.reply(ConnectivityMessage::new().with("ok", true)).unwrap();
        assert!(responder.is_consumed());
        assert_eq!(delivered.lock().len(), 1);

        let again = responder.reply(ConnectivityMessage::new());
        assert_eq!(
            again,
            Err(ConnectivityError::InvalidParameter("reply already sent"))
        );
        assert_eq!(delivered.lock().len(), 1);
    }
}
