//! Collaborator ports used by the orchestrator, with in-memory
//! implementations.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use domain::CustomerId;
use serde::Serialize;
use thiserror::Error;

use crate::result::CheckoutResult;

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Errors raised by cart, loyalty and launcher ports.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PortError {
    #[error("Service unavailable: {0}")]
    Unavailable(String),
}

/// The customer's shopping cart.
#[async_trait]
pub trait CartStore: Send + Sync {
    async fn clear_cart(&self, customer_id: &CustomerId) -> Result<(), PortError>;
}

/// The loyalty points ledger.
#[async_trait]
pub trait LoyaltyProgram: Send + Sync {
    async fn accrue_points(&self, customer_id: &CustomerId, points: u32) -> Result<(), PortError>;
}

/// Opens payment app deep links on the customer's device.
#[async_trait]
pub trait UrlLauncher: Send + Sync {
    async fn can_open(&self, url: &str) -> bool;
    async fn open(&self, url: &str) -> Result<(), PortError>;
}

/// Callbacks into the screen that started the checkout.
pub trait CheckoutHost: Send + Sync {
    /// The checkout finished; navigate accordingly.
    fn on_result(&self, result: &CheckoutResult);
    /// A status check completed while waiting for the payment.
    fn on_progress(&self, status: &str, attempt: u32);
    /// The customer has to do something outside the app.
    fn on_require_user_action(&self, message: &str);
}

/// A host callback, as recorded by [`RecordingHost`].
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum HostEvent {
    Result { result: CheckoutResult },
    Progress { status: String, attempt: u32 },
    UserAction { message: String },
}

/// Host that records callbacks, optionally keeping only the most recent
/// ones.
#[derive(Debug, Clone, Default)]
pub struct RecordingHost {
    events: Arc<Mutex<VecDeque<HostEvent>>>,
    capacity: Option<usize>,
}

impl RecordingHost {
    /// Records every callback.
    pub fn new() -> Self {
        Self::default()
    }

    /// Keeps at most `capacity` callbacks, dropping the oldest first.
    pub fn bounded(capacity: usize) -> Self {
        Self {
            events: Arc::default(),
            capacity: Some(capacity.max(1)),
        }
    }

    fn record(&self, event: HostEvent) {
        let mut events = lock(&self.events);
        if let Some(capacity) = self.capacity {
            while events.len() >= capacity {
                events.pop_front();
            }
        }
        events.push_back(event);
    }

    /// Retained callbacks, oldest first.
    pub fn events(&self) -> Vec<HostEvent> {
        lock(&self.events).iter().cloned().collect()
    }

    /// Results delivered so far.
    pub fn results(&self) -> Vec<CheckoutResult> {
        lock(&self.events)
            .iter()
            .filter_map(|e| match e {
                HostEvent::Result { result } => Some(result.clone()),
                _ => None,
            })
            .collect()
    }

    /// Number of progress callbacks received.
    pub fn progress_count(&self) -> usize {
        lock(&self.events)
            .iter()
            .filter(|e| matches!(e, HostEvent::Progress { .. }))
            .count()
    }

    /// User action prompts received so far.
    pub fn user_actions(&self) -> Vec<String> {
        lock(&self.events)
            .iter()
            .filter_map(|e| match e {
                HostEvent::UserAction { message } => Some(message.clone()),
                _ => None,
            })
            .collect()
    }
}

impl CheckoutHost for RecordingHost {
    fn on_result(&self, result: &CheckoutResult) {
        self.record(HostEvent::Result {
            result: result.clone(),
        });
    }

    fn on_progress(&self, status: &str, attempt: u32) {
        self.record(HostEvent::Progress {
            status: status.to_string(),
            attempt,
        });
    }

    fn on_require_user_action(&self, message: &str) {
        self.record(HostEvent::UserAction {
            message: message.to_string(),
        });
    }
}

/// In-memory cart store for testing.
#[derive(Debug, Clone, Default)]
pub struct InMemoryCartStore {
    cleared: Arc<Mutex<Vec<CustomerId>>>,
    fail: Arc<AtomicBool>,
}

impl InMemoryCartStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Configures the store to fail on clear calls.
    pub fn set_fail_on_clear(&self, fail: bool) {
        self.fail.store(fail, Ordering::SeqCst);
    }

    /// Number of successful clear calls.
    pub fn clear_count(&self) -> usize {
        lock(&self.cleared).len()
    }

    /// Customers whose cart was cleared, in order.
    pub fn cleared_for(&self) -> Vec<CustomerId> {
        lock(&self.cleared).clone()
    }
}

#[async_trait]
impl CartStore for InMemoryCartStore {
    async fn clear_cart(&self, customer_id: &CustomerId) -> Result<(), PortError> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(PortError::Unavailable("cart store offline".to_string()));
        }
        lock(&self.cleared).push(customer_id.clone());
        Ok(())
    }
}

/// In-memory loyalty program for testing.
#[derive(Debug, Clone, Default)]
pub struct InMemoryLoyaltyProgram {
    balances: Arc<Mutex<HashMap<CustomerId, u32>>>,
    accruals: Arc<Mutex<Vec<(CustomerId, u32)>>>,
}

impl InMemoryLoyaltyProgram {
    pub fn new() -> Self {
        Self::default()
    }

    /// Current points balance of a customer.
    pub fn balance(&self, customer_id: &CustomerId) -> u32 {
        lock(&self.balances).get(customer_id).copied().unwrap_or(0)
    }

    /// Number of accrual calls received.
    pub fn accrual_count(&self) -> usize {
        lock(&self.accruals).len()
    }
}

#[async_trait]
impl LoyaltyProgram for InMemoryLoyaltyProgram {
    async fn accrue_points(&self, customer_id: &CustomerId, points: u32) -> Result<(), PortError> {
        lock(&self.accruals).push((customer_id.clone(), points));
        *lock(&self.balances).entry(customer_id.clone()).or_default() += points;
        Ok(())
    }
}

/// In-memory URL launcher for testing.
#[derive(Debug, Clone)]
pub struct InMemoryUrlLauncher {
    can_open: Arc<AtomicBool>,
    fail_open: Arc<AtomicBool>,
    opened: Arc<Mutex<Vec<String>>>,
}

impl InMemoryUrlLauncher {
    /// Creates a launcher that can open every URL.
    pub fn new() -> Self {
        Self {
            can_open: Arc::new(AtomicBool::new(true)),
            fail_open: Arc::new(AtomicBool::new(false)),
            opened: Arc::default(),
        }
    }

    /// Creates a launcher with no app to handle payment links.
    pub fn unable() -> Self {
        let launcher = Self::new();
        launcher.set_can_open(false);
        launcher
    }

    pub fn set_can_open(&self, can_open: bool) {
        self.can_open.store(can_open, Ordering::SeqCst);
    }

    /// Makes `open` fail even when `can_open` reports true.
    pub fn set_fail_on_open(&self, fail: bool) {
        self.fail_open.store(fail, Ordering::SeqCst);
    }

    /// URLs opened so far.
    pub fn opened(&self) -> Vec<String> {
        lock(&self.opened).clone()
    }
}

impl Default for InMemoryUrlLauncher {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl UrlLauncher for InMemoryUrlLauncher {
    async fn can_open(&self, _url: &str) -> bool {
        self.can_open.load(Ordering::SeqCst)
    }

    async fn open(&self, url: &str) -> Result<(), PortError> {
        if self.fail_open.load(Ordering::SeqCst) {
            return Err(PortError::Unavailable("no handler for link".to_string()));
        }
        lock(&self.opened).push(url.to_string());
        Ok(())
    }
}
