//! In-process harness: a coordinator wired to a scripted session.
//!
//! Used by the integration-style tests below and exported for downstream
//! crates that want to exercise their observers and message types without
//! a paired device.

use std::sync::Arc;

use crate::coordinator::{Coordinator, CoordinatorConfig};
use wristlink_session::testing::MockSession;

/// A coordinator bound to a [`MockSession`], with both halves exposed.
pub struct ConnectivityHarness {
    pub session: Arc<MockSession>,
    pub coordinator: Coordinator,
}

impl ConnectivityHarness {
    /// Wire `session` to a fresh coordinator with default configuration.
    pub fn new(session: MockSession) -> Self {
        Self::with_config(session, CoordinatorConfig::default())
    }

    /// Wire `session` to a fresh coordinator with explicit configuration.
    pub fn with_config(session: MockSession, config: CoordinatorConfig) -> Self {
        let session = Arc::new(session);
        let coordinator = Coordinator::with_config(session.clone(), config);
        Self {
            session,
            coordinator,
        }
    }
}
