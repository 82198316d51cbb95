//! Turns terminal payment outcomes into ledger, cart and loyalty state.

use std::sync::Arc;

use chrono::Utc;
use common::OrderId;
use domain::{
    AttemptStatus, Money, Order, OrderError, PaymentAttempt, PaymentMode, PaymentSettlement,
    PaymentStatus,
};
use ledger::{LedgerExt, OrderLedger};

use crate::config::CheckoutConfig;
use crate::error::{CheckoutError, Result};
use crate::initiator::PaymentOutcome;
use crate::ports::{CartStore, LoyaltyProgram};
use crate::recovery::{RecoveryRecord, RecoveryStore};
use crate::result::{CheckoutResult, SupportContact};

const UNSAVED_MESSAGE: &str =
    "Your payment went through but we could not update your order. Do not pay again; contact support with the reference below.";
const CASH_UNSAVED_MESSAGE: &str =
    "We could not record your order. Show the reference below at the counter before paying.";
const STATUS_UNKNOWN_MESSAGE: &str =
    "We could not confirm your payment yet. Check the payment status before trying again.";

enum Settled {
    Applied(Order),
    AlreadySettled(PaymentStatus),
}

/// Applies payment outcomes exactly once per order.
///
/// The cart and loyalty ports are touched only here, and only after the
/// ledger has recorded a successful payment.
#[derive(Clone)]
pub struct Reconciler {
    ledger: Arc<dyn OrderLedger>,
    cart: Arc<dyn CartStore>,
    loyalty: Arc<dyn LoyaltyProgram>,
    recovery: Arc<dyn RecoveryStore>,
    config: CheckoutConfig,
}

impl Reconciler {
    pub fn new(
        ledger: Arc<dyn OrderLedger>,
        cart: Arc<dyn CartStore>,
        loyalty: Arc<dyn LoyaltyProgram>,
        recovery: Arc<dyn RecoveryStore>,
        config: &CheckoutConfig,
    ) -> Self {
        Self {
            ledger,
            cart,
            loyalty,
            recovery,
            config: config.clone(),
        }
    }

    #[tracing::instrument(
        skip(self, outcome),
        fields(merchant_transaction_id = %outcome.merchant_transaction_id, status = %outcome.status)
    )]
    pub async fn reconcile(
        &self,
        outcome: PaymentOutcome,
        order_id: OrderId,
        amount: Money,
    ) -> Result<CheckoutResult> {
        let result = match outcome.status {
            AttemptStatus::Success => self.reconcile_success(&outcome, order_id, amount).await?,
            AttemptStatus::Failed | AttemptStatus::Cancelled => {
                self.reconcile_failure(&outcome, order_id, amount).await
            }
            AttemptStatus::Timeout => self.reconcile_timeout(&outcome, order_id, amount).await,
            AttemptStatus::Pending => {
                return Err(CheckoutError::UnexpectedStatus {
                    status: outcome.status.to_string(),
                });
            }
        };

        metrics::counter!("payment_reconciliations_total", "outcome" => result.label()).increment(1);
        tracing::info!(outcome = result.label(), "payment reconciled");
        Ok(result)
    }

    async fn reconcile_success(
        &self,
        outcome: &PaymentOutcome,
        order_id: OrderId,
        amount: Money,
    ) -> Result<CheckoutResult> {
        let Some(payment_id) = outcome.payment_id.clone() else {
            return Err(CheckoutError::IncompleteResult {
                order_id,
                field: "payment_id",
            });
        };
        if let Some(reported) = outcome.amount
            && reported != amount
        {
            tracing::warn!(reported = %reported, expected = %amount, "gateway amount differs from order total");
        }

        let policy = self.config.ledger_retry;
        let mut attempt = 1;
        let mut payment_mode = None;
        let failure = loop {
            let settled = match self.ledger.require_order(order_id).await {
                Ok(order) => {
                    payment_mode = Some(order.payment_mode);
                    self.settle_loaded(order, outcome, amount).await
                }
                Err(err) => Err(err),
            };
            match settled {
                Ok(Settled::Applied(order)) => {
                    self.apply_side_effects(&order, amount).await;
                    return Ok(CheckoutResult::Confirmed {
                        order_id,
                        amount,
                        payment_id,
                    });
                }
                Ok(Settled::AlreadySettled(payment_status)) => {
                    return Ok(CheckoutResult::AlreadySettled {
                        order_id,
                        payment_status,
                    });
                }
                Err(err) if attempt < policy.max_attempts && err.is_transient() => {
                    let delay = policy.delay_after(attempt);
                    tracing::warn!(error = %err, attempt, delay_ms = delay.as_millis() as u64, "ledger write failed, retrying");
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(err) => break err,
            }
        };

        let err = CheckoutError::LedgerWrite {
            attempts: attempt,
            source: failure,
        };
        tracing::error!(error = %err, payment_id = %payment_id, "payment succeeded but the ledger was not updated");
        self.write_recovery_record(outcome, order_id, amount, &payment_id, &err)
            .await;

        // No money moved for cash, so "do not pay again" would be wrong
        let message = match payment_mode {
            Some(PaymentMode::Cash) => CASH_UNSAVED_MESSAGE,
            _ => UNSAVED_MESSAGE,
        };
        Ok(CheckoutResult::ConfirmedUnsaved {
            order_id,
            amount,
            payment_id,
            message: message.to_string(),
            support: self.support(order_id, outcome),
        })
    }

    async fn reconcile_failure(
        &self,
        outcome: &PaymentOutcome,
        order_id: OrderId,
        amount: Money,
    ) -> CheckoutResult {
        match self.settle_once(order_id, outcome, amount).await {
            Ok(Settled::AlreadySettled(payment_status)) => {
                return CheckoutResult::AlreadySettled {
                    order_id,
                    payment_status,
                };
            }
            Ok(Settled::Applied(_)) => {}
            Err(err) => tracing::warn!(error = %err, "could not record failed payment"),
        }

        let reason = if outcome.status == AttemptStatus::Cancelled {
            "Payment was cancelled"
        } else {
            "Payment failed"
        };
        CheckoutResult::Failed {
            order_id: Some(order_id),
            reason: reason.to_string(),
            retryable: true,
            support: self.support(order_id, outcome),
        }
    }

    async fn reconcile_timeout(
        &self,
        outcome: &PaymentOutcome,
        order_id: OrderId,
        amount: Money,
    ) -> CheckoutResult {
        match self.settle_once(order_id, outcome, amount).await {
            Ok(Settled::AlreadySettled(payment_status)) => {
                return CheckoutResult::AlreadySettled {
                    order_id,
                    payment_status,
                };
            }
            Ok(Settled::Applied(_)) => {}
            Err(err) => tracing::warn!(error = %err, "could not record payment timeout"),
        }

        CheckoutResult::StatusUnknown {
            order_id,
            merchant_transaction_id: outcome.merchant_transaction_id.clone(),
            message: STATUS_UNKNOWN_MESSAGE.to_string(),
            support: self.support(order_id, outcome),
        }
    }

    /// One read-check-write pass. The ledger's own compare-and-set catches
    /// a settlement that lands between the read and the write.
    async fn settle_once(
        &self,
        order_id: OrderId,
        outcome: &PaymentOutcome,
        amount: Money,
    ) -> ledger::Result<Settled> {
        let order = self.ledger.require_order(order_id).await?;
        self.settle_loaded(order, outcome, amount).await
    }

    async fn settle_loaded(
        &self,
        order: Order,
        outcome: &PaymentOutcome,
        amount: Money,
    ) -> ledger::Result<Settled> {
        let order_id = order.id;
        if order.payment_status.is_terminal() {
            tracing::info!(payment_status = %order.payment_status, "order already settled");
            return Ok(Settled::AlreadySettled(order.payment_status));
        }

        let settlement = self.settlement_for(&order, outcome, amount)?;
        match self.ledger.settle_payment(order_id, settlement).await {
            Ok(order) => Ok(Settled::Applied(order)),
            Err(err) => match err.settled_status() {
                Some(status) => {
                    tracing::info!(payment_status = %status, "lost settlement race");
                    Ok(Settled::AlreadySettled(status))
                }
                None => Err(err),
            },
        }
    }

    fn settlement_for(
        &self,
        order: &Order,
        outcome: &PaymentOutcome,
        amount: Money,
    ) -> std::result::Result<PaymentSettlement, OrderError> {
        let mut attempt = PaymentAttempt::pending(
            outcome.merchant_transaction_id.clone(),
            order.id,
            amount,
            self.config.currency.clone(),
            order.payment_mode,
        );
        attempt.gateway_transaction_id = outcome.gateway_transaction_id.clone();
        attempt.raw_response = outcome.raw.clone();
        attempt.transition(outcome.status)?;
        PaymentSettlement::from_attempt(attempt, amount, outcome.payment_id.clone())
    }

    /// Cart and loyalty updates. Failures are logged; the payment stands.
    async fn apply_side_effects(&self, order: &Order, amount: Money) {
        if let Err(err) = self.cart.clear_cart(&order.customer_id).await {
            tracing::warn!(error = %err, customer_id = %order.customer_id, "failed to clear cart");
        }

        let points = match order.loyalty {
            Some(loyalty) => loyalty.points_earned,
            None => self.config.points_for(amount),
        };
        if points == 0 {
            return;
        }
        if let Err(err) = self.loyalty.accrue_points(&order.customer_id, points).await {
            tracing::warn!(error = %err, customer_id = %order.customer_id, points, "failed to accrue loyalty points");
        }
    }

    async fn write_recovery_record(
        &self,
        outcome: &PaymentOutcome,
        order_id: OrderId,
        amount: Money,
        payment_id: &str,
        err: &CheckoutError,
    ) {
        let record = RecoveryRecord {
            order_id,
            merchant_transaction_id: outcome.merchant_transaction_id.clone(),
            payment_id: payment_id.to_string(),
            amount,
            raw_payment: outcome.raw.clone(),
            ledger_error: err.to_string(),
            recorded_at: Utc::now(),
        };
        match self.recovery.persist(&record).await {
            Ok(()) => {
                metrics::counter!("payment_recovery_records_total").increment(1);
                tracing::error!(%order_id, "recovery record written");
            }
            Err(recovery_err) => {
                tracing::error!(error = %recovery_err, %order_id, payment_id, "failed to write recovery record");
            }
        }
    }

    fn support(&self, order_id: OrderId, outcome: &PaymentOutcome) -> SupportContact {
        SupportContact::for_order(
            &self.config.support_contact,
            order_id,
            Some(&outcome.merchant_transaction_id),
        )
    }
}
