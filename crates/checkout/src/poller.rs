//! Status polling for pending payments.
//!
//! One cooperative loop waits on three things at once: cancellation, the
//! overall deadline and the next interval tick. A status query in flight is
//! raced against cancellation and the deadline too, so a slow gateway can
//! never stretch the wait past its budget.

use std::sync::Arc;
use std::time::Duration;

use common::OrderId;
use domain::{AttemptStatus, MerchantTransactionId};
use tokio::sync::watch;
use tokio::time::{Instant, MissedTickBehavior};

use crate::config::PollerConfig;
use crate::epoch::Epochs;
use crate::gateway::PaymentGateway;
use crate::initiator::PaymentOutcome;
use crate::ports::CheckoutHost;

/// Identifies the attempt a poll belongs to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttemptTicket {
    pub order_id: OrderId,
    pub merchant_transaction_id: MerchantTransactionId,
    /// Epoch the attempt was started under.
    pub epoch: u64,
}

/// How a poll ended.
#[derive(Debug, Clone, PartialEq)]
pub enum PollOutcome {
    /// The gateway reported a terminal status.
    Terminal(PaymentOutcome),
    /// Attempt cap or deadline reached first.
    TimedOut { attempts: u32, elapsed: Duration },
    /// A newer attempt took over; the result must not be applied.
    Superseded,
    /// Cancelled while the attempt was still current.
    Cancelled,
}

/// Resolves once cancellation is requested or the sender is gone.
async fn cancelled(cancel: &mut watch::Receiver<bool>) {
    let _ = cancel.wait_for(|stop| *stop).await;
}

/// Polls the gateway until a pending payment resolves.
#[derive(Clone)]
pub struct StatusPoller {
    gateway: Arc<dyn PaymentGateway>,
    config: PollerConfig,
}

impl StatusPoller {
    pub fn new(gateway: Arc<dyn PaymentGateway>, config: PollerConfig) -> Self {
        Self {
            gateway,
            config: config.sanitized(),
        }
    }

    pub fn config(&self) -> &PollerConfig {
        &self.config
    }

    #[tracing::instrument(
        skip_all,
        fields(order_id = %ticket.order_id, merchant_transaction_id = %ticket.merchant_transaction_id, epoch = ticket.epoch)
    )]
    pub async fn poll(
        &self,
        ticket: &AttemptTicket,
        epochs: &Epochs,
        mut cancel: watch::Receiver<bool>,
        host: &dyn CheckoutHost,
    ) -> PollOutcome {
        let started = Instant::now();
        let deadline = tokio::time::sleep(self.config.timeout);
        tokio::pin!(deadline);
        let mut ticker = tokio::time::interval_at(started + self.config.interval, self.config.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut attempts = 0u32;

        let outcome = loop {
            if attempts >= self.config.max_attempts {
                break PollOutcome::TimedOut {
                    attempts,
                    elapsed: started.elapsed(),
                };
            }

            tokio::select! {
                biased;
                _ = cancelled(&mut cancel) => break Self::stopped(ticket, epochs),
                _ = &mut deadline => break PollOutcome::TimedOut { attempts, elapsed: started.elapsed() },
                _ = ticker.tick() => {}
            }

            if !epochs.is_current(ticket.epoch) {
                break Self::superseded(ticket);
            }

            attempts += 1;
            metrics::counter!("payment_poll_ticks_total").increment(1);

            let response = tokio::select! {
                biased;
                _ = cancelled(&mut cancel) => break Self::stopped(ticket, epochs),
                _ = &mut deadline => break PollOutcome::TimedOut { attempts, elapsed: started.elapsed() },
                response = self.gateway.status(&ticket.merchant_transaction_id) => response,
            };

            let response = match response {
                Ok(response) => response,
                Err(err) => {
                    tracing::warn!(error = %err, attempt = attempts, "status check failed, still waiting");
                    continue;
                }
            };
            host.on_progress(&response.status, attempts);

            match AttemptStatus::from_gateway(&response.status) {
                Ok(AttemptStatus::Pending) => {
                    tracing::debug!(attempt = attempts, "payment still pending");
                }
                Ok(status) => {
                    if !epochs.is_current(ticket.epoch) {
                        break Self::superseded(ticket);
                    }
                    tracing::info!(status = %status, attempt = attempts, "payment resolved");
                    break PollOutcome::Terminal(PaymentOutcome::from_gateway(
                        ticket.merchant_transaction_id.clone(),
                        status,
                        response,
                    ));
                }
                Err(err) => {
                    tracing::warn!(error = %err, attempt = attempts, "ignoring unrecognised status");
                }
            }
        };

        metrics::histogram!("payment_poll_duration_seconds").record(started.elapsed().as_secs_f64());
        if let PollOutcome::TimedOut { attempts, elapsed } = &outcome {
            tracing::warn!(attempts, elapsed_ms = elapsed.as_millis() as u64, "payment status unknown");
        }
        outcome
    }

    fn stopped(ticket: &AttemptTicket, epochs: &Epochs) -> PollOutcome {
        if epochs.is_current(ticket.epoch) {
            tracing::info!("polling cancelled");
            PollOutcome::Cancelled
        } else {
            Self::superseded(ticket)
        }
    }

    fn superseded(ticket: &AttemptTicket) -> PollOutcome {
        tracing::warn!(epoch = ticket.epoch, "stale result ignored");
        PollOutcome::Superseded
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gateway::{GatewayError, InMemoryPaymentGateway};
    use crate::ports::RecordingHost;

    fn config(interval_ms: u64, max_attempts: u32, timeout_ms: u64) -> PollerConfig {
        PollerConfig {
            interval: Duration::from_millis(interval_ms),
            max_attempts,
            timeout: Duration::from_millis(timeout_ms),
        }
    }

    fn setup(config: PollerConfig) -> (StatusPoller, InMemoryPaymentGateway, Epochs, AttemptTicket) {
        let gateway = InMemoryPaymentGateway::new();
        let poller = StatusPoller::new(Arc::new(gateway.clone()), config);
        let epochs = Epochs::new();
        let ticket = AttemptTicket {
            order_id: OrderId::new(),
            merchant_transaction_id: MerchantTransactionId::new("TXN1"),
            epoch: epochs.advance(),
        };
        (poller, gateway, epochs, ticket)
    }

    fn pending() -> Result<crate::gateway::GatewayStatus, GatewayError> {
        Ok(InMemoryPaymentGateway::status_response("PENDING", None))
    }

    #[tokio::test(start_paused = true)]
    async fn test_stops_on_terminal_status() {
        let (poller, gateway, epochs, ticket) = setup(config(1000, 10, 60_000));
        gateway.script_status(
            "TXN1",
            vec![
                pending(),
                pending(),
                Ok(InMemoryPaymentGateway::status_response("success", Some("PAY-1"))),
            ],
        );
        let host = RecordingHost::new();
        let (_tx, rx) = watch::channel(false);

        let started = Instant::now();
        let outcome = poller.poll(&ticket, &epochs, rx, &host).await;

        match outcome {
            PollOutcome::Terminal(outcome) => {
                assert_eq!(outcome.status, AttemptStatus::Success);
                assert_eq!(outcome.payment_id.as_deref(), Some("PAY-1"));
            }
            other => panic!("expected terminal outcome, got {other:?}"),
        }
        assert_eq!(gateway.status_calls(), 3);
        assert_eq!(host.progress_count(), 3);
        assert_eq!(started.elapsed(), Duration::from_secs(3));
    }

    #[tokio::test(start_paused = true)]
    async fn test_zero_interval_uses_default_cadence() {
        let (poller, gateway, epochs, ticket) = setup(config(0, 10, 60_000));
        gateway.script_status(
            "TXN1",
            vec![
                pending(),
                Ok(InMemoryPaymentGateway::status_response("SUCCESS", Some("PAY-1"))),
            ],
        );
        let host = RecordingHost::new();
        let (_tx, rx) = watch::channel(false);

        let started = Instant::now();
        let outcome = poller.poll(&ticket, &epochs, rx, &host).await;

        assert!(matches!(outcome, PollOutcome::Terminal(_)));
        assert_eq!(poller.config().interval, PollerConfig::default().interval);
        assert_eq!(started.elapsed(), PollerConfig::default().interval * 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_attempt_cap_ends_wait() {
        let (poller, gateway, epochs, ticket) = setup(config(1000, 5, 60_000));
        let (_tx, rx) = watch::channel(false);

        let outcome = poller.poll(&ticket, &epochs, rx, &RecordingHost::new()).await;

        assert!(matches!(outcome, PollOutcome::TimedOut { attempts: 5, .. }));
        assert_eq!(gateway.status_calls(), 5);
    }

    #[tokio::test(start_paused = true)]
    async fn test_deadline_holds_with_slow_ticks() {
        let (poller, gateway, epochs, ticket) = setup(config(1000, 100, 10_000));
        gateway.set_status_latency(Duration::from_secs(4));
        let (_tx, rx) = watch::channel(false);

        let started = Instant::now();
        let outcome = poller.poll(&ticket, &epochs, rx, &RecordingHost::new()).await;

        assert!(matches!(outcome, PollOutcome::TimedOut { .. }));
        assert!(started.elapsed() <= Duration::from_secs(10));
        assert!(gateway.status_calls() <= 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_transport_errors_and_unknown_statuses_are_swallowed() {
        let (poller, gateway, epochs, ticket) = setup(config(500, 10, 60_000));
        gateway.script_status(
            "TXN1",
            vec![
                Err(GatewayError::Transport("network blip".to_string())),
                Ok(InMemoryPaymentGateway::status_response("AUTHORIZED", None)),
                Ok(InMemoryPaymentGateway::status_response("CANCELLED", None)),
            ],
        );
        let (_tx, rx) = watch::channel(false);

        let outcome = poller.poll(&ticket, &epochs, rx, &RecordingHost::new()).await;

        match outcome {
            PollOutcome::Terminal(outcome) => assert_eq!(outcome.status, AttemptStatus::Cancelled),
            other => panic!("expected terminal outcome, got {other:?}"),
        }
        assert_eq!(gateway.status_calls(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancellation_stops_polling() {
        let (poller, gateway, epochs, ticket) = setup(config(1000, 100, 60_000));
        let (tx, rx) = watch::channel(false);
        let host = RecordingHost::new();

        let (outcome, _) = tokio::join!(poller.poll(&ticket, &epochs, rx, &host), async {
            tokio::time::sleep(Duration::from_millis(2500)).await;
            tx.send(true).unwrap();
        });

        assert_eq!(outcome, PollOutcome::Cancelled);
        assert_eq!(gateway.status_calls(), 2);

        // No further queries once the loop has ended
        tokio::time::sleep(Duration::from_secs(10)).await;
        assert_eq!(gateway.status_calls(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_superseded_attempt_stops_before_querying() {
        let (poller, gateway, epochs, ticket) = setup(config(1000, 10, 60_000));
        epochs.advance();
        let (_tx, rx) = watch::channel(false);

        let outcome = poller.poll(&ticket, &epochs, rx, &RecordingHost::new()).await;

        assert_eq!(outcome, PollOutcome::Superseded);
        assert_eq!(gateway.status_calls(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_after_supersede_reports_superseded() {
        let (poller, _gateway, epochs, ticket) = setup(config(1000, 10, 60_000));
        let (tx, rx) = watch::channel(false);
        epochs.advance();
        tx.send(true).unwrap();

        let outcome = poller.poll(&ticket, &epochs, rx, &RecordingHost::new()).await;
        assert_eq!(outcome, PollOutcome::Superseded);
    }
}
