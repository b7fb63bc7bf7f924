//! Scripted session implementations for testing the coordination layer.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio::time::sleep;

use crate::message::ConnectivityMessage;
use crate::traits::{
    ActivationState, DataCompletion, MessageCompletion, SessionError, SessionEvent,
    TransportSession,
};

/// How a scripted session responds to `begin_activation`.
#[derive(Clone)]
pub enum ActivationScript {
    /// Activation completes successfully after the configured latency.
    Succeed,
    /// Activation completes with the given error.
    Fail(SessionError),
    /// The delegate never hears back; used for timeout tests.
    Ignore,
}

type AutoReply = Arc<dyn Fn(&ConnectivityMessage) -> ConnectivityMessage + Send + Sync>;
type AutoDataReply = Arc<dyn Fn(&Bytes) -> Bytes + Send + Sync>;

/// Mock session with scripted reachability, pairing and reply behavior.
///
/// Completion handlers for sends without a scripted reply are parked
/// rather than dropped, so tests can release them after a timeout to
/// exercise late-reply handling.
pub struct MockSession {
    reachable: AtomicBool,
    paired: AtomicBool,
    app_installed: AtomicBool,
    activation_state: Arc<Mutex<ActivationState>>,
    activation_script: Mutex<ActivationScript>,
    latency: Duration,
    auto_reply: Mutex<Option<AutoReply>>,
    auto_data_reply: Mutex<Option<AutoDataReply>>,
    sent_messages: Mutex<Vec<ConnectivityMessage>>,
    sent_data: Mutex<Vec<Bytes>>,
    context_updates: Mutex<Vec<ConnectivityMessage>>,
    context_failure: Mutex<Option<SessionError>>,
    parked_completions: Mutex<Vec<MessageCompletion>>,
    parked_data_completions: Mutex<Vec<DataCompletion>>,
    delegate: Mutex<Option<mpsc::UnboundedSender<SessionEvent>>>,
}

impl MockSession {
    pub fn new() -> Self {
        Self {
            reachable: AtomicBool::new(false),
            paired: AtomicBool::new(true),
            app_installed: AtomicBool::new(true),
            activation_state: Arc::new(Mutex::new(ActivationState::NotActivated)),
            activation_script: Mutex::new(ActivationScript::Succeed),
            latency: Duration::ZERO,
            auto_reply: Mutex::new(None),
            auto_data_reply: Mutex::new(None),
            sent_messages: Mutex::new(Vec::new()),
            sent_data: Mutex::new(Vec::new()),
            context_updates: Mutex::new(Vec::new()),
            context_failure: Mutex::new(None),
            parked_completions: Mutex::new(Vec::new()),
            parked_data_completions: Mutex::new(Vec::new()),
            delegate: Mutex::new(None),
        }
    }

    /// Configure initial reachability.
    pub fn with_reachable(self, reachable: bool) -> Self {
        self.reachable.store(reachable, Ordering::Relaxed);
        self
    }

    /// Configure initial pairing state.
    pub fn with_paired(self, paired: bool) -> Self {
        self.paired.store(paired, Ordering::Relaxed);
        self
    }

    /// Configure whether the companion app is installed.
    pub fn with_app_installed(self, installed: bool) -> Self {
        self.app_installed.store(installed, Ordering::Relaxed);
        self
    }

    /// Configure activation behavior.
    pub fn with_activation(self, script: ActivationScript) -> Self {
        *self.activation_script.lock() = script;
        self
    }

    /// Configure simulated delivery latency for replies and activation.
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    /// Script a reply for interactive dictionary sends.
    pub fn with_auto_reply(
        self,
        reply: impl Fn(&ConnectivityMessage) -> ConnectivityMessage + Send + Sync + 'static,
    ) -> Self {
        *self.auto_reply.lock() = Some(Arc::new(reply));
        self
    }

    /// Script a reply for interactive binary sends.
    pub fn with_auto_data_reply(
        self,
        reply: impl Fn(&Bytes) -> Bytes + Send + Sync + 'static,
    ) -> Self {
        *self.auto_data_reply.lock() = Some(Arc::new(reply));
        self
    }

    /// Make `update_application_context` fail with the given error.
    pub fn with_context_failure(self, error: SessionError) -> Self {
        *self.context_failure.lock() = Some(error);
        self
    }

    /// Flip reachability at runtime (does not raise a delegate event).
    pub fn set_reachable(&self, reachable: bool) {
        self.reachable.store(reachable, Ordering::Relaxed);
    }

    /// Messages handed to `send_message` so far.
    pub fn sent_messages(&self) -> Vec<ConnectivityMessage> {
        self.sent_messages.lock().clone()
    }

    /// Payloads handed to `send_message_data` so far.
    pub fn sent_data(&self) -> Vec<Bytes> {
        self.sent_data.lock().clone()
    }

    /// Contexts handed to `update_application_context` so far.
    pub fn context_updates(&self) -> Vec<ConnectivityMessage> {
        self.context_updates.lock().clone()
    }

    /// Number of completion handlers parked without a reply.
    pub fn parked_completion_count(&self) -> usize {
        self.parked_completions.lock().len()
    }

    /// Invoke every parked dictionary completion with `reply`.
    ///
    /// Used to deliver a reply after the caller has already timed out.
    pub fn release_parked_completions(&self, reply: ConnectivityMessage) {
        let parked: Vec<MessageCompletion> = self.parked_completions.lock().drain(..).collect();
        for complete in parked {
            complete(Ok(reply.clone()));
        }
    }

    /// Push a delegate event as the native layer would.
    pub fn inject_event(&self, event: SessionEvent) {
        if let Some(delegate) = self.delegate.lock().as_ref() {
            let _ = delegate.send(event);
        }
    }

    fn send_delegate(&self, event: SessionEvent) {
        self.inject_event(event);
    }
}

impl Default for MockSession {
    fn default() -> Self {
        Self::new()
    }
}

impl TransportSession for MockSession {
    fn begin_activation(&self) -> Result<(), SessionError> {
        let script = self.activation_script.lock().clone();
        *self.activation_state.lock() = ActivationState::Activating;
        match script {
            ActivationScript::Succeed => {
                let latency = self.latency;
                let delegate = self.delegate.lock().clone();
                let state = self.activation_state.clone();
                // Completion is delivered off the caller's stack, like the
                // real delegate. The state flip rides the completion: while
                // the attempt is in flight the mock still reports Activating.
                tokio::spawn(async move {
                    if !latency.is_zero() {
                        sleep(latency).await;
                    }
                    *state.lock() = ActivationState::Activated;
                    if let Some(delegate) = delegate {
                        let _ = delegate.send(SessionEvent::ActivationCompleted(Ok(())));
                    }
                });
                Ok(())
            }
            ActivationScript::Fail(error) => {
                *self.activation_state.lock() = ActivationState::NotActivated;
                self.send_delegate(SessionEvent::ActivationCompleted(Err(error)));
                Ok(())
            }
            ActivationScript::Ignore => Ok(()),
        }
    }

    fn activation_state(&self) -> ActivationState {
        *self.activation_state.lock()
    }

    fn is_reachable(&self) -> bool {
        self.reachable.load(Ordering::Relaxed)
    }

    fn is_paired(&self) -> bool {
        self.paired.load(Ordering::Relaxed)
    }

    fn is_companion_app_installed(&self) -> bool {
        self.app_installed.load(Ordering::Relaxed)
    }

    fn update_application_context(&self, context: ConnectivityMessage) -> Result<(), SessionError> {
        if let Some(error) = self.context_failure.lock().clone() {
            return Err(error);
        }
        self.context_updates.lock().push(context);
        Ok(())
    }

    fn send_message(&self, message: ConnectivityMessage, on_complete: MessageCompletion) {
        self.sent_messages.lock().push(message.clone());
        let reply_fn = self.auto_reply.lock().clone();
        match reply_fn {
            Some(reply_fn) => {
                let latency = self.latency;
                tokio::spawn(async move {
                    if !latency.is_zero() {
                        sleep(latency).await;
                    }
                    on_complete(Ok(reply_fn(&message)));
                });
            }
            None => {
                // No scripted reply: park the completion so tests can
                // release it later (e.g. after the caller timed out).
                self.parked_completions.lock().push(on_complete);
            }
        }
    }

    fn send_message_data(&self, data: Bytes, on_complete: DataCompletion) {
        self.sent_data.lock().push(data.clone());
        let reply_fn = self.auto_data_reply.lock().clone();
        match reply_fn {
            Some(reply_fn) => {
                let latency = self.latency;
                tokio::spawn(async move {
                    if !latency.is_zero() {
                        sleep(latency).await;
                    }
                    on_complete(Ok(reply_fn(&data)));
                });
            }
            None => {
                self.parked_data_completions.lock().push(on_complete);
            }
        }
    }

    fn install_delegate(&self, delegate: mpsc::UnboundedSender<SessionEvent>) {
        *self.delegate.lock() = Some(delegate);
    }
}
