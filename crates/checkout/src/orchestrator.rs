//! The checkout coordinator.
//!
//! One orchestrator serves one checkout screen. Each `checkout` call takes a
//! new epoch; only the attempt holding the current epoch may reach the
//! ledger or the host. Starting a new checkout cancels the previous poll,
//! and `teardown` silences everything still in flight.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use chrono::{DateTime, Utc};
use common::OrderId;
use domain::{MerchantTransactionId, NewOrder, Order, OrderStatus, PaymentStatus};
use ledger::{LedgerExt, OrderLedger};
use serde::Serialize;
use tokio::sync::watch;

use crate::config::CheckoutConfig;
use crate::epoch::Epochs;
use crate::error::{CheckoutError, Result};
use crate::gateway::{PaymentGateway, PaymentInstrument};
use crate::initiator::{InitiationOutcome, PaymentInitiator, PaymentOutcome};
use crate::intake::OrderIntake;
use crate::poller::{AttemptTicket, PollOutcome, StatusPoller};
use crate::ports::{CartStore, CheckoutHost, LoyaltyProgram, UrlLauncher};
use crate::reconciler::Reconciler;
use crate::recovery::RecoveryStore;
use crate::result::{CheckoutResult, SupportContact};
use crate::router::CompletionRouter;
use crate::txn_id::TransactionIdGenerator;

const LEAVE_MESSAGE: &str =
    "Your payment is still being processed. Leaving now will not cancel it.";
const NOT_STARTED_REASON: &str = "Payment could not be started";
const UNCONFIRMED_MESSAGE: &str =
    "We could not confirm your payment. Check the payment status before trying again.";

/// External services a checkout talks to.
#[derive(Clone)]
pub struct Collaborators {
    pub ledger: Arc<dyn OrderLedger>,
    pub gateway: Arc<dyn PaymentGateway>,
    pub cart: Arc<dyn CartStore>,
    pub loyalty: Arc<dyn LoyaltyProgram>,
    pub launcher: Arc<dyn UrlLauncher>,
    pub recovery: Arc<dyn RecoveryStore>,
}

/// A checkout as submitted by the customer.
#[derive(Debug, Clone)]
pub struct CheckoutRequest {
    pub order: NewOrder,
    /// Decides the order's payment mode.
    pub instrument: PaymentInstrument,
}

/// The checkout currently owned by the orchestrator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ActiveAttempt {
    pub order_id: OrderId,
    pub merchant_transaction_id: MerchantTransactionId,
    pub epoch: u64,
    /// True while money may be moving at the gateway.
    pub awaiting_gateway: bool,
    pub started_at: DateTime<Utc>,
}

/// Answer to a navigation request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "decision", rename_all = "snake_case")]
pub enum LeaveDecision {
    Allowed,
    /// A gateway payment is in flight; the customer has to confirm.
    ConfirmationRequired { order_id: OrderId, message: String },
}

/// Read-only view of an order's payment, ledger and gateway side by side.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StatusReport {
    pub order_id: OrderId,
    pub merchant_transaction_id: Option<MerchantTransactionId>,
    pub order_status: OrderStatus,
    pub payment_status: PaymentStatus,
    /// Raw gateway status; `None` for cash orders.
    pub gateway_status: Option<String>,
    pub gateway_payment_id: Option<String>,
}

struct Slot {
    attempt: ActiveAttempt,
    cancel: watch::Sender<bool>,
}

/// Forwards callbacks only while the attempt is current and the screen is
/// still there.
struct GuardedHost<'a> {
    inner: &'a dyn CheckoutHost,
    epochs: &'a Epochs,
    epoch: u64,
    torn_down: &'a AtomicBool,
}

impl GuardedHost<'_> {
    fn is_open(&self) -> bool {
        !self.torn_down.load(Ordering::SeqCst) && self.epochs.is_current(self.epoch)
    }
}

impl CheckoutHost for GuardedHost<'_> {
    fn on_result(&self, result: &CheckoutResult) {
        if self.is_open() {
            self.inner.on_result(result);
        } else {
            tracing::debug!(epoch = self.epoch, outcome = result.label(), "result callback suppressed");
        }
    }

    fn on_progress(&self, status: &str, attempt: u32) {
        if self.is_open() {
            self.inner.on_progress(status, attempt);
        }
    }

    fn on_require_user_action(&self, message: &str) {
        if self.is_open() {
            self.inner.on_require_user_action(message);
        }
    }
}

/// Drives checkouts from intake to a customer-facing result.
pub struct PaymentOrchestrator {
    ledger: Arc<dyn OrderLedger>,
    gateway: Arc<dyn PaymentGateway>,
    intake: OrderIntake,
    initiator: PaymentInitiator,
    router: CompletionRouter,
    poller: StatusPoller,
    reconciler: Reconciler,
    config: CheckoutConfig,
    host: Arc<dyn CheckoutHost>,
    epochs: Epochs,
    active: Mutex<Option<Slot>>,
    torn_down: AtomicBool,
}

impl PaymentOrchestrator {
    pub fn new(
        collaborators: Collaborators,
        config: CheckoutConfig,
        host: Arc<dyn CheckoutHost>,
    ) -> Self {
        Self::with_id_generator(collaborators, config, host, TransactionIdGenerator::default())
    }

    pub fn with_id_generator(
        collaborators: Collaborators,
        config: CheckoutConfig,
        host: Arc<dyn CheckoutHost>,
        ids: TransactionIdGenerator,
    ) -> Self {
        let Collaborators {
            ledger,
            gateway,
            cart,
            loyalty,
            launcher,
            recovery,
        } = collaborators;

        Self {
            intake: OrderIntake::new(ledger.clone()),
            initiator: PaymentInitiator::new(gateway.clone(), ids, &config),
            router: CompletionRouter::new(launcher),
            poller: StatusPoller::new(gateway.clone(), config.poller),
            reconciler: Reconciler::new(ledger.clone(), cart, loyalty, recovery, &config),
            ledger,
            gateway,
            config,
            host,
            epochs: Epochs::new(),
            active: Mutex::new(None),
            torn_down: AtomicBool::new(false),
        }
    }

    fn lock_active(&self) -> MutexGuard<'_, Option<Slot>> {
        self.active.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Runs a checkout to completion.
    ///
    /// Pre-charge input and ledger errors are returned as errors; every
    /// outcome after intake is a [`CheckoutResult`], also delivered to the
    /// host unless the attempt was superseded or the screen torn down.
    #[tracing::instrument(
        skip(self, request),
        fields(customer_id = %request.order.customer_id, mode = %request.instrument.mode())
    )]
    pub async fn checkout(&self, request: CheckoutRequest) -> Result<CheckoutResult> {
        metrics::counter!("checkout_started_total").increment(1);

        let CheckoutRequest {
            order: mut new_order,
            instrument,
        } = request;
        new_order.payment_mode = instrument.mode();

        let epoch = self.epochs.advance();
        let (cancel_tx, cancel_rx) = watch::channel(false);
        if let Some(previous) = self.lock_active().take() {
            tracing::info!(previous_epoch = previous.attempt.epoch, "superseding active checkout");
            let _ = previous.cancel.send(true);
        }

        let host = GuardedHost {
            inner: self.host.as_ref(),
            epochs: &self.epochs,
            epoch,
            torn_down: &self.torn_down,
        };

        let merchant_transaction_id = self.initiator.next_transaction_id().await;
        let order = match self.intake.place(new_order, merchant_transaction_id.clone()).await {
            Ok(order) => order,
            Err(err) => {
                tracing::warn!(error = %err, "checkout rejected before payment");
                host.on_result(&CheckoutResult::Failed {
                    order_id: None,
                    reason: err.to_string(),
                    retryable: true,
                    support: SupportContact {
                        contact: self.config.support_contact.clone(),
                        reference: merchant_transaction_id.to_string(),
                    },
                });
                return Err(err);
            }
        };

        {
            let mut active = self.lock_active();
            if self.epochs.is_current(epoch) {
                *active = Some(Slot {
                    attempt: ActiveAttempt {
                        order_id: order.id,
                        merchant_transaction_id: merchant_transaction_id.clone(),
                        epoch,
                        awaiting_gateway: order.payment_mode.requires_gateway(),
                        started_at: Utc::now(),
                    },
                    cancel: cancel_tx,
                });
            }
        }

        let result = self
            .run_payment(&order, instrument, epoch, cancel_rx, &host)
            .await;
        self.release(epoch);

        if !matches!(result, CheckoutResult::AlreadySettled { .. }) {
            host.on_result(&result);
        }
        Ok(result)
    }

    async fn run_payment(
        &self,
        order: &Order,
        instrument: PaymentInstrument,
        epoch: u64,
        cancel: watch::Receiver<bool>,
        host: &GuardedHost<'_>,
    ) -> CheckoutResult {
        let merchant_transaction_id = order
            .merchant_transaction_id
            .clone()
            .unwrap_or_else(|| MerchantTransactionId::new(order.id.to_string()));

        if !order.payment_mode.requires_gateway() {
            let outcome = PaymentOutcome::cash(merchant_transaction_id, order.total_amount);
            return self.settle(order, outcome, epoch).await;
        }

        // A timeout is only settled when the gateway confirmed the attempt
        let (polled_transaction_id, settle_on_timeout) = match self
            .initiator
            .initiate(order, instrument)
            .await
        {
            Ok(InitiationOutcome::Terminal(outcome)) => {
                return self.settle(order, outcome, epoch).await;
            }
            Ok(InitiationOutcome::Pending(pending)) => {
                self.router.route(&pending, host).await;
                (pending.merchant_transaction_id, true)
            }
            Err(CheckoutError::Initiation(err)) if !err.is_definitive() => {
                tracing::warn!(
                    error = %err,
                    order_id = %order.id,
                    merchant_transaction_id = %merchant_transaction_id,
                    "initiation outcome unknown, asking the gateway"
                );
                (merchant_transaction_id, false)
            }
            Err(CheckoutError::Initiation(err)) => {
                let rejected = PaymentOutcome::rejected(merchant_transaction_id.clone());
                if let Err(reconcile_err) = self
                    .reconciler
                    .reconcile(rejected, order.id, order.total_amount)
                    .await
                {
                    tracing::warn!(error = %reconcile_err, "could not record rejected payment");
                }
                return CheckoutResult::Failed {
                    order_id: Some(order.id),
                    reason: format!("{NOT_STARTED_REASON}: {err}"),
                    retryable: true,
                    support: self.support(order.id, &merchant_transaction_id),
                };
            }
            Err(err) => return self.unconfirmed(order, &merchant_transaction_id, err),
        };

        let ticket = AttemptTicket {
            order_id: order.id,
            merchant_transaction_id: polled_transaction_id,
            epoch,
        };
        match self.poller.poll(&ticket, &self.epochs, cancel, host).await {
            PollOutcome::Terminal(outcome) => self.settle(order, outcome, epoch).await,
            PollOutcome::TimedOut { attempts, elapsed } => {
                let err = CheckoutError::Timeout { attempts, elapsed };
                if !settle_on_timeout {
                    // The order stays Processing so a late result can still land
                    return self.unconfirmed(order, &ticket.merchant_transaction_id, err);
                }
                tracing::warn!(error = %err, "payment did not resolve in time");
                let outcome = PaymentOutcome::timed_out(ticket.merchant_transaction_id);
                self.settle(order, outcome, epoch).await
            }
            PollOutcome::Superseded | PollOutcome::Cancelled => CheckoutResult::Abandoned {
                order_id: order.id,
                merchant_transaction_id: ticket.merchant_transaction_id,
            },
        }
    }

    /// Reconciles an outcome if the attempt still owns the checkout.
    async fn settle(&self, order: &Order, outcome: PaymentOutcome, epoch: u64) -> CheckoutResult {
        if !self.epochs.is_current(epoch) {
            let stale = CheckoutError::StaleResultIgnored {
                order_id: order.id,
                epoch,
            };
            tracing::warn!(error = %stale, "dropping result of superseded checkout");
            return CheckoutResult::Abandoned {
                order_id: order.id,
                merchant_transaction_id: outcome.merchant_transaction_id,
            };
        }

        let merchant_transaction_id = outcome.merchant_transaction_id.clone();
        match self
            .reconciler
            .reconcile(outcome, order.id, order.total_amount)
            .await
        {
            Ok(result) => result,
            Err(err) => self.unconfirmed(order, &merchant_transaction_id, err),
        }
    }

    /// The gateway may have charged but the outcome could not be applied.
    /// The order stays `Processing` for manual follow-up.
    fn unconfirmed(
        &self,
        order: &Order,
        merchant_transaction_id: &MerchantTransactionId,
        err: CheckoutError,
    ) -> CheckoutResult {
        tracing::error!(error = %err, order_id = %order.id, "payment outcome could not be confirmed");
        CheckoutResult::StatusUnknown {
            order_id: order.id,
            merchant_transaction_id: merchant_transaction_id.clone(),
            message: UNCONFIRMED_MESSAGE.to_string(),
            support: self.support(order.id, merchant_transaction_id),
        }
    }

    fn support(&self, order_id: OrderId, txn: &MerchantTransactionId) -> SupportContact {
        SupportContact::for_order(&self.config.support_contact, order_id, Some(txn))
    }

    fn release(&self, epoch: u64) {
        let mut active = self.lock_active();
        if active.as_ref().is_some_and(|slot| slot.attempt.epoch == epoch) {
            *active = None;
        }
    }

    /// Asks whether the customer may navigate away.
    pub fn request_leave(&self) -> LeaveDecision {
        match self.lock_active().as_ref() {
            Some(slot) if slot.attempt.awaiting_gateway => LeaveDecision::ConfirmationRequired {
                order_id: slot.attempt.order_id,
                message: LEAVE_MESSAGE.to_string(),
            },
            _ => LeaveDecision::Allowed,
        }
    }

    /// The customer confirmed leaving: stop waiting for the active attempt.
    ///
    /// The order stays `Processing`; the checkout resolves as `Abandoned`.
    pub fn confirm_leave(&self) -> Option<ActiveAttempt> {
        let slot = self.lock_active().take()?;
        tracing::info!(order_id = %slot.attempt.order_id, "customer left during payment");
        let _ = slot.cancel.send(true);
        Some(slot.attempt)
    }

    /// The screen is gone: cancel polling and drop every later callback.
    pub fn teardown(&self) {
        self.torn_down.store(true, Ordering::SeqCst);
        if let Some(slot) = self.lock_active().take() {
            tracing::info!(order_id = %slot.attempt.order_id, "checkout torn down");
            let _ = slot.cancel.send(true);
        }
    }

    pub fn is_torn_down(&self) -> bool {
        self.torn_down.load(Ordering::SeqCst)
    }

    pub fn active_attempt(&self) -> Option<ActiveAttempt> {
        self.lock_active().as_ref().map(|slot| slot.attempt.clone())
    }

    pub fn current_epoch(&self) -> u64 {
        self.epochs.current()
    }

    /// Looks up an order's payment at the ledger and the gateway. Never
    /// writes.
    #[tracing::instrument(skip(self))]
    pub async fn check_status(&self, order_id: OrderId) -> Result<StatusReport> {
        let order = self.ledger.require_order(order_id).await?;

        let gateway = match &order.merchant_transaction_id {
            Some(txn) if order.payment_mode.requires_gateway() => Some(
                self.gateway
                    .status(txn)
                    .await
                    .map_err(CheckoutError::StatusQuery)?,
            ),
            _ => None,
        };

        Ok(StatusReport {
            order_id,
            merchant_transaction_id: order.merchant_transaction_id,
            order_status: order.status,
            payment_status: order.payment_status,
            gateway_status: gateway.as_ref().map(|g| g.status.clone()),
            gateway_payment_id: gateway.and_then(|g| g.payment_id),
        })
    }
}
