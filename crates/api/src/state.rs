//! Shared application state.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use checkout::{CheckoutConfig, Collaborators, PaymentOrchestrator, RecordingHost};
use domain::CustomerId;
use ledger::OrderLedger;

/// Callbacks kept per checkout screen.
pub const SESSION_EVENT_LIMIT: usize = 64;

/// Open sessions before idle ones are evicted.
pub const DEFAULT_SESSION_LIMIT: usize = 1024;

/// One customer's checkout screen: its orchestrator and the callbacks it
/// has received.
pub struct Session {
    pub orchestrator: PaymentOrchestrator,
    pub host: RecordingHost,
}

impl Session {
    /// No payment is in flight, so dropping the session loses nothing but
    /// its event log.
    fn is_idle(&self) -> bool {
        self.orchestrator.active_attempt().is_none()
    }
}

/// Shared application state accessible from all handlers.
pub struct AppState {
    collaborators: Collaborators,
    checkout_config: CheckoutConfig,
    session_limit: usize,
    sessions: Mutex<HashMap<CustomerId, Arc<Session>>>,
}

impl AppState {
    pub fn new(collaborators: Collaborators, checkout_config: CheckoutConfig) -> Self {
        Self {
            collaborators,
            checkout_config,
            session_limit: DEFAULT_SESSION_LIMIT,
            sessions: Mutex::new(HashMap::new()),
        }
    }

    /// Sets how many sessions may stay open before idle ones are evicted.
    pub fn with_session_limit(mut self, limit: usize) -> Self {
        self.session_limit = limit.max(1);
        self
    }

    pub fn ledger(&self) -> &Arc<dyn OrderLedger> {
        &self.collaborators.ledger
    }

    fn sessions(&self) -> MutexGuard<'_, HashMap<CustomerId, Arc<Session>>> {
        self.sessions.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Returns the customer's session, opening one if needed.
    pub fn session(&self, customer_id: &CustomerId) -> Arc<Session> {
        let mut sessions = self.sessions();
        if let Some(session) = sessions.get(customer_id) {
            return session.clone();
        }

        if sessions.len() >= self.session_limit {
            let before = sessions.len();
            sessions.retain(|_, session| !session.is_idle());
            tracing::info!(evicted = before - sessions.len(), "evicted idle checkout sessions");
        }

        let host = RecordingHost::bounded(SESSION_EVENT_LIMIT);
        let orchestrator = PaymentOrchestrator::new(
            self.collaborators.clone(),
            self.checkout_config.clone(),
            Arc::new(host.clone()),
        );
        let session = Arc::new(Session { orchestrator, host });
        sessions.insert(customer_id.clone(), session.clone());
        session
    }

    pub fn session_count(&self) -> usize {
        self.sessions().len()
    }

    /// Sessions whose checkout is still waiting on the gateway.
    pub fn payments_in_flight(&self) -> usize {
        self.sessions()
            .values()
            .filter(|s| s.orchestrator.active_attempt().is_some_and(|a| a.awaiting_gateway))
            .count()
    }

    pub fn existing_session(&self, customer_id: &CustomerId) -> Option<Arc<Session>> {
        self.sessions().get(customer_id).cloned()
    }

    /// Tears the customer's session down and forgets it.
    pub fn end_session(&self, customer_id: &CustomerId) -> Option<Arc<Session>> {
        let session = self.sessions().remove(customer_id)?;
        session.orchestrator.teardown();
        Some(session)
    }
}
