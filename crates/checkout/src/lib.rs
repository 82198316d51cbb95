//! Payment orchestration for storefront checkout.
//!
//! A checkout runs through these stages:
//! 1. Intake writes a `Pending`/`Processing` order to the ledger
//! 2. The initiator submits the payment to the gateway
//! 3. Pending payments are routed to the customer's payment app and polled
//! 4. The reconciler turns the terminal outcome into ledger, cart and
//!    loyalty state
//!
//! Cash orders skip the gateway and go straight to reconciliation.

pub mod config;
pub mod epoch;
pub mod error;
pub mod gateway;
pub mod initiator;
pub mod intake;
pub mod orchestrator;
pub mod poller;
pub mod ports;
pub mod reconciler;
pub mod recovery;
pub mod result;
pub mod router;
pub mod txn_id;

pub use config::{CheckoutConfig, GatewayConfig, PollerConfig, RetryPolicy};
pub use epoch::Epochs;
pub use error::{CheckoutError, Result};
pub use gateway::{
    CardDetails, ChecksumScheme, GatewayError, GatewayInitiation, GatewayRequest, GatewayStatus,
    HttpPaymentGateway, InMemoryPaymentGateway, PaymentGateway, PaymentInstrument,
};
pub use initiator::{InitiationOutcome, PaymentInitiator, PaymentOutcome, PendingPayment};
pub use intake::OrderIntake;
pub use orchestrator::{
    ActiveAttempt, CheckoutRequest, Collaborators, LeaveDecision, PaymentOrchestrator,
    StatusReport,
};
pub use poller::{AttemptTicket, PollOutcome, StatusPoller};
pub use ports::{
    CartStore, CheckoutHost, HostEvent, InMemoryCartStore, InMemoryLoyaltyProgram,
    InMemoryUrlLauncher, LoyaltyProgram, PortError, RecordingHost, UrlLauncher,
};
pub use reconciler::Reconciler;
pub use recovery::{
    FileRecoveryStore, InMemoryRecoveryStore, RecoveryError, RecoveryRecord, RecoveryStore,
};
pub use result::{CheckoutResult, SupportContact};
pub use router::{CompletionRouter, RouteDecision};
pub use txn_id::{EntropySource, OsEntropy, TransactionIdGenerator};
