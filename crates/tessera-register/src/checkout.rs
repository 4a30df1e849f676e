//! # Checkout
//!
//! The sale finalizer's operations on a [`Register`].
//!
//! ## Finalize Sequence
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                       Finalize Sequence                                 │
//! │                                                                         │
//! │  1. Guard ──────────────────────────────────────────────────────────►   │
//! │     • reject a second trigger (CheckoutInProgress)                      │
//! │     • reject an empty cart (EmptyCart)                                  │
//! │                                                                         │
//! │  2. Settle ─────────────────────────────────────────────────────────►   │
//! │     • pending tax is resolved (or falls back) before totals are final   │
//! │     • Transaction snapshot: lines, totals, jurisdiction, tender         │
//! │                                                                         │
//! │  3. Pay ────────────────────────────────────────────────────────────►   │
//! │     • cash / mobile: straight to Completing                             │
//! │     • card: AwaitingPayment until confirmed, declined or cancelled      │
//! │                                                                         │
//! │  4. Complete ───────────────────────────────────────────────────────►   │
//! │     • AccountingSink::submit (no auto-retry)                            │
//! │     • notify, then hand off to the ReceiptRenderer                      │
//! │     • reset cart, discount, notes, party, tax for the next sale         │
//! │     • Completed, then Idle                                              │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tokio::sync::Notify;
use tracing::{error, info, warn};
use uuid::Uuid;

use tessera_core::totals::Totals;
use tessera_core::validation::validate_tendered_cents;
use tessera_core::{CashTender, CoreError, Money, PaymentAttempt, PaymentMethod, TaxJurisdiction, Transaction};

use crate::config::TenderPolicy;
use crate::error::{CollaboratorError, RegisterError, RegisterResult};
use crate::finalizer::SaleState;
use crate::ports::{GatewayOutcome, PaymentRequest, SinkReceipt};
use crate::register::Register;
use crate::tax::TaxWarning;

// =============================================================================
// Request & Outcome Types
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckoutRequest {
    pub method: PaymentMethod,
    /// Cash handed over. Defaults to the exact total.
    pub tendered: Option<Money>,
}

impl CheckoutRequest {
    pub fn cash(tendered: Option<Money>) -> Self {
        CheckoutRequest {
            method: PaymentMethod::Cash,
            tendered,
        }
    }

    pub fn mobile() -> Self {
        CheckoutRequest {
            method: PaymentMethod::Mobile,
            tendered: None,
        }
    }

    pub fn card() -> Self {
        CheckoutRequest {
            method: PaymentMethod::Card,
            tendered: None,
        }
    }
}

/// A recoverable condition raised while finalizing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CheckoutWarning {
    /// Cash below the total under the warn-only tender policy.
    InsufficientTender { tendered: Money, total: Money },
    Tax(TaxWarning),
    /// The sale is committed; only the receipt hand-off failed.
    ReceiptFailed(String),
}

/// A committed sale.
#[derive(Debug, Clone, PartialEq)]
pub struct CompletedSale {
    pub transaction: Transaction,
    pub receipt: SinkReceipt,
    pub warnings: Vec<CheckoutWarning>,
}

impl CompletedSale {
    pub fn change_due(&self) -> Money {
        self.transaction
            .cash
            .map(|cash| cash.change)
            .unwrap_or_default()
    }
}

/// Cancels a suspended card interaction from another task.
#[derive(Debug, Clone)]
pub struct PaymentCancelHandle {
    attempt_id: String,
    notify: Arc<Notify>,
}

impl PaymentCancelHandle {
    pub fn attempt_id(&self) -> &str {
        &self.attempt_id
    }

    /// Takes effect even if nobody is awaiting the payment yet.
    pub fn cancel(&self) {
        info!(attempt_id = %self.attempt_id, "Payment cancellation requested");
        self.notify.notify_one();
    }
}

/// The checkout is suspended on the payment gateway.
#[derive(Debug, Clone)]
pub struct AwaitingPayment {
    pub attempt_id: String,
    pub amount: Money,
    pub cancel: PaymentCancelHandle,
}

#[derive(Debug, Clone)]
pub enum CheckoutOutcome {
    Completed(CompletedSale),
    AwaitingPayment(AwaitingPayment),
}

// =============================================================================
// Suspended State
// =============================================================================

pub(crate) struct PendingPayment {
    transaction: Transaction,
    request: PaymentRequest,
    cancel: Arc<Notify>,
    warnings: Vec<CheckoutWarning>,
}

/// A built transaction the sink did not take.
pub(crate) struct FailedCompletion {
    transaction: Transaction,
    warnings: Vec<CheckoutWarning>,
}

impl FailedCompletion {
    /// A card was charged; re-running checkout would charge it again.
    pub(crate) fn has_captured_payment(&self) -> bool {
        self.transaction.gateway_token.is_some()
    }
}

// =============================================================================
// Finalizer Operations
// =============================================================================

impl Register {
    /// Starts finalizing the active sale.
    pub async fn checkout(&mut self, request: CheckoutRequest) -> RegisterResult<CheckoutOutcome> {
        let state = self.state();
        if state.is_busy() {
            warn!(%state, "Checkout triggered while another is running");
            return Err(RegisterError::CheckoutInProgress);
        }
        if self.failed.as_ref().is_some_and(|f| f.has_captured_payment()) {
            return Err(RegisterError::InvalidState {
                action: "start a new checkout",
                state,
            });
        }
        if self.cart.is_empty() {
            return Err(RegisterError::EmptyCart);
        }

        self.failed = None;
        self.advance(SaleState::Submitting, "checkout")?;

        let (transaction, warnings) = match self.build_transaction(request).await {
            Ok(built) => built,
            Err(e) => {
                self.advance(SaleState::Idle, "abort checkout")?;
                return Err(e);
            }
        };

        info!(
            transaction_id = %transaction.id,
            method = ?transaction.payment_method,
            total = %transaction.presented.total,
            lines = transaction.lines.len(),
            "Checkout submitted"
        );

        if transaction.payment_method.is_synchronous() {
            self.advance(SaleState::Completing, "complete")?;
            return self
                .complete(transaction, warnings)
                .await
                .map(CheckoutOutcome::Completed);
        }

        let request = PaymentRequest {
            attempt_id: Uuid::new_v4().to_string(),
            amount: transaction.presented.total,
            currency: self.business.currency.clone(),
            customer_id: transaction.customer_id.clone(),
        };
        self.attempts.push(PaymentAttempt::pending(
            request.attempt_id.clone(),
            request.amount,
            request.currency.clone(),
        ));

        let notify = Arc::new(Notify::new());
        let awaiting = AwaitingPayment {
            attempt_id: request.attempt_id.clone(),
            amount: request.amount,
            cancel: PaymentCancelHandle {
                attempt_id: request.attempt_id.clone(),
                notify: notify.clone(),
            },
        };
        self.payment = Some(PendingPayment {
            transaction,
            request,
            cancel: notify,
            warnings,
        });
        self.advance(SaleState::AwaitingPayment, "request payment")?;
        info!(attempt_id = %awaiting.attempt_id, amount = %awaiting.amount, "Awaiting card payment");

        Ok(CheckoutOutcome::AwaitingPayment(awaiting))
    }

    /// Handle for the outstanding card interaction, if any.
    pub fn payment_cancel_handle(&self) -> Option<PaymentCancelHandle> {
        self.payment.as_ref().map(|p| PaymentCancelHandle {
            attempt_id: p.request.attempt_id.clone(),
            notify: p.cancel.clone(),
        })
    }

    /// Runs the card interaction on the gateway until it answers or is
    /// cancelled through a [`PaymentCancelHandle`].
    ///
    /// With `gateway_timeout_secs` set, a silent gateway returns
    /// [`RegisterError::PaymentTimedOut`] and the payment stays pending: call
    /// this again, settle it with [`Register::resolve_payment`], or cancel it.
    pub async fn await_payment(&mut self) -> RegisterResult<CompletedSale> {
        let Some(pending) = self.payment.as_ref() else {
            return Err(RegisterError::InvalidState {
                action: "await a payment",
                state: self.state(),
            });
        };

        let request = pending.request.clone();
        let cancel = pending.cancel.clone();
        let gateway = self.ports.gateway.clone();
        let timeout_secs = self.config.checkout.gateway_timeout_secs;

        let answer = tokio::select! {
            _ = cancel.notified() => Ok(GatewayOutcome::Cancelled),
            answer = authorize_within(timeout_secs, gateway.authorize(&request)) => answer,
        };

        let outcome = match answer {
            Ok(outcome) => outcome,
            Err(AuthorizeError::Gateway(e)) => {
                warn!(attempt_id = %request.attempt_id, error = %e, "Payment gateway error");
                GatewayOutcome::Declined { reason: e.to_string() }
            }
            Err(AuthorizeError::TimedOut(after_secs)) => {
                warn!(attempt_id = %request.attempt_id, after_secs, "Payment gateway silent, payment still pending");
                self.emitter
                    .emit_warning(&format!("No answer from the card terminal after {}s", after_secs));
                return Err(RegisterError::PaymentTimedOut { after_secs });
            }
        };

        self.resolve_payment(outcome).await
    }

    /// Applies the gateway's answer to the suspended checkout. Also the entry
    /// point for confirmations that arrive out of band.
    pub async fn resolve_payment(&mut self, outcome: GatewayOutcome) -> RegisterResult<CompletedSale> {
        if self.state() != SaleState::AwaitingPayment {
            return Err(RegisterError::InvalidState {
                action: "resolve a payment",
                state: self.state(),
            });
        }
        let Some(pending) = self.payment.take() else {
            return Err(RegisterError::InvalidState {
                action: "resolve a payment",
                state: self.state(),
            });
        };
        let PendingPayment {
            mut transaction,
            request,
            warnings,
            ..
        } = pending;
        let attempt_id = request.attempt_id;

        match outcome {
            GatewayOutcome::Confirmed { token } => {
                if let Some(attempt) = self.attempt_mut(&attempt_id) {
                    attempt.confirm(token.clone());
                }
                self.advance(SaleState::PaymentConfirmed, "confirm payment")?;
                info!(%attempt_id, "Card payment confirmed");

                transaction.gateway_token = Some(token);
                self.advance(SaleState::Completing, "complete")?;
                self.complete(transaction, warnings).await
            }
            GatewayOutcome::Declined { reason } => {
                if let Some(attempt) = self.attempt_mut(&attempt_id) {
                    attempt.fail(reason.clone());
                }
                self.advance(SaleState::PaymentFailed, "fail payment")?;
                self.advance(SaleState::Idle, "return to cart")?;
                warn!(%attempt_id, %reason, "Card payment failed, cart preserved");
                self.emitter.emit_warning(&format!("Payment failed: {}", reason));
                Err(RegisterError::PaymentFailed { reason })
            }
            GatewayOutcome::Cancelled => {
                if let Some(attempt) = self.attempt_mut(&attempt_id) {
                    attempt.fail("cancelled");
                }
                self.advance(SaleState::Idle, "cancel payment")?;
                info!(%attempt_id, "Card payment cancelled, cart preserved");
                Err(RegisterError::PaymentCancelled)
            }
        }
    }

    /// Resubmits the transaction the sink refused. Never contacts the
    /// payment gateway.
    pub async fn retry_completion(&mut self) -> RegisterResult<CompletedSale> {
        if self.state() != SaleState::Failed {
            return Err(RegisterError::InvalidState {
                action: "retry completion",
                state: self.state(),
            });
        }
        let Some(failed) = self.failed.take() else {
            return Err(RegisterError::InvalidState {
                action: "retry completion",
                state: self.state(),
            });
        };

        info!(transaction_id = %failed.transaction.id, "Retrying sale completion");
        self.advance(SaleState::Completing, "retry completion")?;
        self.complete(failed.transaction, failed.warnings).await
    }

    /// The transaction kept after a sink failure.
    pub fn failed_transaction(&self) -> Option<&Transaction> {
        self.failed.as_ref().map(|f| &f.transaction)
    }

    // =========================================================================
    // Internals
    // =========================================================================

    async fn build_transaction(
        &mut self,
        request: CheckoutRequest,
    ) -> RegisterResult<(Transaction, Vec<CheckoutWarning>)> {
        let mut warnings = Vec::new();

        if !self.tax_status.is_settled() {
            let tax_warnings = self.refresh_tax().await;
            warnings.extend(tax_warnings.into_iter().map(CheckoutWarning::Tax));
        }
        let jurisdiction = self
            .tax_status
            .jurisdiction()
            .cloned()
            .unwrap_or_else(TaxJurisdiction::none);

        let totals = Totals::compute(self.cart.lines(), &self.discount, jurisdiction.total_rate)?;
        let presented = totals.present();

        let cash = match request.method {
            PaymentMethod::Cash => {
                let tendered = request.tendered.unwrap_or(presented.total);
                validate_tendered_cents(tendered.cents()).map_err(CoreError::from)?;
                let tender = CashTender::settle(tendered, presented.total);
                if tender.is_short(presented.total) {
                    match self.config.checkout.tender_policy {
                        TenderPolicy::Block => {
                            return Err(RegisterError::InsufficientTender {
                                tendered,
                                total: presented.total,
                            });
                        }
                        TenderPolicy::WarnOnly => {
                            warn!(%tendered, total = %presented.total, "Cash tender below total");
                            warnings.push(CheckoutWarning::InsufficientTender {
                                tendered,
                                total: presented.total,
                            });
                        }
                    }
                }
                Some(tender)
            }
            PaymentMethod::Mobile | PaymentMethod::Card => None,
        };

        let transaction = Transaction {
            id: Uuid::new_v4().to_string(),
            lines: self.cart.lines().to_vec(),
            discount: self.discount,
            totals,
            presented,
            jurisdiction,
            payment_method: request.method,
            cash,
            gateway_token: None,
            customer_id: self.party.customer_id().map(str::to_string),
            notes: self.notes.clone(),
            created_at: Utc::now(),
        };

        Ok((transaction, warnings))
    }

    /// Completing: sink, notify, receipt, reset.
    async fn complete(
        &mut self,
        transaction: Transaction,
        mut warnings: Vec<CheckoutWarning>,
    ) -> RegisterResult<CompletedSale> {
        let receipt = match self.ports.sink.submit(&transaction).await {
            Ok(receipt) => receipt,
            Err(e) => {
                error!(transaction_id = %transaction.id, error = %e, "Sink rejected sale, cart preserved");
                let retryable = e.is_retryable();
                let reason = e.to_string();
                self.failed = Some(FailedCompletion {
                    transaction,
                    warnings,
                });
                self.advance(SaleState::Failed, "record sale")?;
                self.emitter.emit_warning(&format!("Sale could not be recorded: {}", reason));
                return Err(RegisterError::SinkSubmission { reason, retryable });
            }
        };

        info!(
            transaction_id = %transaction.id,
            record_id = %receipt.record_id,
            inventory_updated = receipt.inventory_updated,
            accounting_entries_created = receipt.accounting_entries_created,
            backorders_created = receipt.backorders_created,
            "Sale recorded"
        );
        self.emitter.emit_completed(&transaction, &receipt);

        if let Err(e) = self.ports.receipts.render(&transaction, &self.business).await {
            warn!(transaction_id = %transaction.id, error = %e, "Receipt hand-off failed");
            warnings.push(CheckoutWarning::ReceiptFailed(e.to_string()));
        }

        self.reset_for_next_sale();
        self.advance(SaleState::Completed, "complete")?;
        self.advance(SaleState::Idle, "ready for next sale")?;

        Ok(CompletedSale {
            transaction,
            receipt,
            warnings,
        })
    }

    fn attempt_mut(&mut self, attempt_id: &str) -> Option<&mut PaymentAttempt> {
        self.attempts.iter_mut().find(|a| a.id == attempt_id)
    }
}

enum AuthorizeError {
    Gateway(CollaboratorError),
    TimedOut(u64),
}

async fn authorize_within<F>(timeout_secs: Option<u64>, authorize: F) -> Result<GatewayOutcome, AuthorizeError>
where
    F: std::future::Future<Output = Result<GatewayOutcome, CollaboratorError>>,
{
    let answer = match timeout_secs {
        Some(secs) => tokio::time::timeout(Duration::from_secs(secs), authorize)
            .await
            .map_err(|_| AuthorizeError::TimedOut(secs))?,
        None => authorize.await,
    };
    answer.map_err(AuthorizeError::Gateway)
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RegisterConfig;
    use crate::error::CollaboratorError;
    use crate::register::tests::{default_config, fixture_with, opened};
    use crate::tax::PartySelection;
    use rust_decimal::Decimal;
    use tessera_core::cart::{AddOutcome, Decision};
    use tessera_core::totals::Discount;
    use tessera_core::PaymentAttemptStatus;

    /// Oil Filter x1 + Wiper Blade x2 for a walk-in: 45.00 subtotal.
    async fn walk_in_sale() -> (Register, crate::memory::MemoryCollaborators) {
        let (mut register, memory) = opened().await;
        register.scan("4006381333931").await.unwrap();
        register.scan("WB-22").await.unwrap();
        register.update_quantity("p-2", 2).unwrap();
        register.select_party(PartySelection::WalkIn).unwrap();
        (register, memory)
    }

    fn completed(outcome: CheckoutOutcome) -> CompletedSale {
        match outcome {
            CheckoutOutcome::Completed(sale) => sale,
            other => panic!("expected a completed sale, got {:?}", other),
        }
    }

    fn awaiting(outcome: CheckoutOutcome) -> AwaitingPayment {
        match outcome {
            CheckoutOutcome::AwaitingPayment(handle) => handle,
            other => panic!("expected a suspended card payment, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_cash_sale_with_discount_and_change() {
        let (mut register, memory) = walk_in_sale().await;
        register
            .set_discount(Discount::percentage(Decimal::new(10, 0)))
            .unwrap();

        let sale = completed(
            register
                .checkout(CheckoutRequest::cash(Some(Money::from_cents(5000))))
                .await
                .unwrap(),
        );

        let shown = &sale.transaction.presented;
        assert_eq!(shown.subtotal, Money::from_cents(4500));
        assert_eq!(shown.discount, Money::from_cents(450));
        assert_eq!(shown.tax, Money::from_cents(324));
        assert_eq!(shown.total, Money::from_cents(4374));
        assert_eq!(sale.change_due(), Money::from_cents(626));
        assert!(sale.warnings.is_empty());
        assert_eq!(sale.receipt.record_id, "rec-1");

        assert_eq!(memory.sink.committed().len(), 1);
        let payload: serde_json::Value =
            serde_json::from_str(&memory.sink.payloads()[0]).unwrap();
        assert_eq!(payload["payment_method"], "cash");
        assert_eq!(memory.receipts.rendered().len(), 1);
        assert!(memory.receipts.rendered()[0].contains("Change $6.26"));

        assert_eq!(register.state(), SaleState::Idle);
        assert!(register.cart().is_empty());
        assert_eq!(register.discount(), &Discount::none());
        assert_eq!(register.party(), &PartySelection::None);
    }

    #[tokio::test]
    async fn test_exact_cash_when_tender_omitted() {
        let (mut register, _memory) = walk_in_sale().await;
        let sale = completed(register.checkout(CheckoutRequest::cash(None)).await.unwrap());

        let cash = sale.transaction.cash.unwrap();
        assert_eq!(cash.tendered, sale.transaction.presented.total);
        assert!(cash.change.is_zero());
    }

    #[tokio::test]
    async fn test_mobile_completes_synchronously() {
        let (mut register, memory) = walk_in_sale().await;
        let sale = completed(register.checkout(CheckoutRequest::mobile()).await.unwrap());

        assert_eq!(sale.transaction.payment_method, PaymentMethod::Mobile);
        assert!(sale.transaction.cash.is_none());
        assert!(memory.gateway.requests().is_empty());
    }

    #[tokio::test]
    async fn test_empty_cart_is_rejected() {
        let (mut register, memory) = opened().await;
        let err = register.checkout(CheckoutRequest::cash(None)).await.unwrap_err();

        assert_eq!(err, RegisterError::EmptyCart);
        assert_eq!(register.state(), SaleState::Idle);
        assert!(memory.sink.committed().is_empty());
    }

    #[tokio::test]
    async fn test_short_tender_warns_by_default() {
        let (mut register, _memory) = walk_in_sale().await;
        let sale = completed(
            register
                .checkout(CheckoutRequest::cash(Some(Money::from_cents(1000))))
                .await
                .unwrap(),
        );

        assert!(sale.change_due().is_zero());
        assert_eq!(
            sale.warnings,
            vec![CheckoutWarning::InsufficientTender {
                tendered: Money::from_cents(1000),
                total: Money::from_cents(4860),
            }]
        );
    }

    #[tokio::test]
    async fn test_short_tender_blocks_under_strict_policy() {
        let mut config: RegisterConfig = default_config();
        config.checkout.tender_policy = TenderPolicy::Block;
        let (mut register, memory) = fixture_with(config);
        register.open().await.unwrap();
        register.scan("WB-22").await.unwrap();

        let err = register
            .checkout(CheckoutRequest::cash(Some(Money::from_cents(100))))
            .await
            .unwrap_err();

        assert!(matches!(err, RegisterError::InsufficientTender { .. }));
        assert_eq!(register.state(), SaleState::Idle);
        assert_eq!(register.cart().lines().len(), 1);
        assert!(memory.sink.committed().is_empty());
    }

    #[tokio::test]
    async fn test_negative_tender_is_rejected() {
        let (mut register, _memory) = walk_in_sale().await;
        let err = register
            .checkout(CheckoutRequest::cash(Some(Money::from_cents(-5))))
            .await
            .unwrap_err();

        assert!(matches!(err, RegisterError::Core(_)));
        assert_eq!(register.state(), SaleState::Idle);
    }

    #[tokio::test]
    async fn test_card_payment_confirms_and_completes() {
        let (mut register, memory) = walk_in_sale().await;
        let handle = awaiting(register.checkout(CheckoutRequest::card()).await.unwrap());

        assert_eq!(handle.amount, Money::from_cents(4860));
        assert_eq!(register.state(), SaleState::AwaitingPayment);
        assert_eq!(register.payment_attempts().len(), 1);
        assert!(register.payment_attempts()[0].is_pending());

        let sale = register.await_payment().await.unwrap();

        let token = sale.transaction.gateway_token.clone().unwrap();
        assert!(token.starts_with("tok_"));
        assert_eq!(register.payment_attempts()[0].status, PaymentAttemptStatus::Confirmed);
        assert_eq!(memory.gateway.requests()[0].attempt_id, handle.attempt_id);
        assert_eq!(register.state(), SaleState::Idle);
        assert_eq!(memory.sink.committed().len(), 1);
    }

    #[tokio::test]
    async fn test_cart_locked_while_awaiting_payment() {
        let (mut register, _memory) = walk_in_sale().await;
        let _handle = awaiting(register.checkout(CheckoutRequest::card()).await.unwrap());

        assert_eq!(register.update_quantity("p-1", 3), Err(RegisterError::CartLocked));
        assert_eq!(register.scan("WB-22").await, Err(RegisterError::CartLocked));
        assert_eq!(
            register.checkout(CheckoutRequest::card()).await.unwrap_err(),
            RegisterError::CheckoutInProgress
        );
        assert_eq!(register.payment_attempts().len(), 1);
    }

    #[tokio::test]
    async fn test_cancel_before_await_preserves_cart() {
        let (mut register, memory) = walk_in_sale().await;
        memory.gateway.set_hold(true);
        let handle = awaiting(register.checkout(CheckoutRequest::card()).await.unwrap());

        handle.cancel.cancel();
        let err = register.await_payment().await.unwrap_err();

        assert_eq!(err, RegisterError::PaymentCancelled);
        assert_eq!(register.state(), SaleState::Idle);
        assert_eq!(register.cart().lines().len(), 2);
        assert_eq!(register.payment_attempts()[0].status, PaymentAttemptStatus::Failed);
        assert!(memory.sink.committed().is_empty());
    }

    #[tokio::test]
    async fn test_cancel_from_another_task() {
        let (mut register, memory) = walk_in_sale().await;
        memory.gateway.set_hold(true);
        let _ = register.checkout(CheckoutRequest::card()).await.unwrap();

        let cancel = register.payment_cancel_handle().unwrap();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(10)).await;
            cancel.cancel();
        });

        assert_eq!(
            register.await_payment().await.unwrap_err(),
            RegisterError::PaymentCancelled
        );
        assert!(register.payment_cancel_handle().is_none());

        // the operator can edit and try again
        register.update_quantity("p-2", 1).unwrap();
        memory.gateway.set_hold(false);
        let _ = register.checkout(CheckoutRequest::card()).await.unwrap();
        let sale = register.await_payment().await.unwrap();
        assert_eq!(sale.transaction.presented.total, Money::from_cents(3564));
        assert_eq!(register.payment_attempts().len(), 2);
    }

    #[tokio::test]
    async fn test_declined_payment_returns_to_cart() {
        let (mut register, memory) = walk_in_sale().await;
        memory.gateway.push(Ok(GatewayOutcome::Declined {
            reason: "insufficient funds".into(),
        }));
        let _ = register.checkout(CheckoutRequest::card()).await.unwrap();

        let err = register.await_payment().await.unwrap_err();

        assert_eq!(
            err,
            RegisterError::PaymentFailed {
                reason: "insufficient funds".into()
            }
        );
        assert_eq!(register.state(), SaleState::Idle);
        assert_eq!(register.cart().lines().len(), 2);
        assert!(memory.sink.committed().is_empty());
    }

    #[tokio::test]
    async fn test_gateway_error_is_a_failed_payment() {
        let (mut register, memory) = walk_in_sale().await;
        memory
            .gateway
            .push(Err(CollaboratorError::Unavailable("terminal offline".into())));
        let _ = register.checkout(CheckoutRequest::card()).await.unwrap();

        assert!(matches!(
            register.await_payment().await,
            Err(RegisterError::PaymentFailed { .. })
        ));
        assert_eq!(register.state(), SaleState::Idle);
    }

    #[tokio::test(start_paused = true)]
    async fn test_gateway_timeout_leaves_payment_pending() {
        let mut config = default_config();
        config.checkout.gateway_timeout_secs = Some(120);
        let (mut register, memory) = fixture_with(config);
        register.open().await.unwrap();
        register.scan("WB-22").await.unwrap();
        memory.gateway.set_hold(true);
        let handle = awaiting(register.checkout(CheckoutRequest::card()).await.unwrap());

        let err = register.await_payment().await.unwrap_err();

        assert_eq!(err, RegisterError::PaymentTimedOut { after_secs: 120 });
        assert_eq!(register.state(), SaleState::AwaitingPayment);
        assert!(register.payment_attempts()[0].is_pending());
        assert_eq!(
            register.payment_cancel_handle().unwrap().attempt_id(),
            handle.attempt_id
        );
        assert_eq!(register.update_quantity("p-2", 3), Err(RegisterError::CartLocked));
        assert_eq!(
            register.checkout(CheckoutRequest::card()).await.unwrap_err(),
            RegisterError::CheckoutInProgress
        );

        // the terminal answers late, out of band
        let sale = register
            .resolve_payment(GatewayOutcome::Confirmed {
                token: "tok_late".into(),
            })
            .await
            .unwrap();
        assert_eq!(sale.transaction.gateway_token.as_deref(), Some("tok_late"));
        assert_eq!(register.payment_attempts()[0].status, PaymentAttemptStatus::Confirmed);
        assert_eq!(memory.gateway.requests().len(), 1);
        assert_eq!(memory.sink.committed().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_card_wait_has_no_deadline_by_default() {
        let (mut register, memory) = walk_in_sale().await;
        memory.gateway.set_hold(true);
        let _ = register.checkout(CheckoutRequest::card()).await.unwrap();

        let cancel = register.payment_cancel_handle().unwrap();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(6 * 60 * 60)).await;
            cancel.cancel();
        });

        assert_eq!(
            register.await_payment().await.unwrap_err(),
            RegisterError::PaymentCancelled
        );
        assert_eq!(register.state(), SaleState::Idle);
        assert_eq!(register.cart().lines().len(), 2);
    }

    #[tokio::test]
    async fn test_external_confirmation() {
        let (mut register, memory) = walk_in_sale().await;
        let _ = register.checkout(CheckoutRequest::card()).await.unwrap();

        let sale = register
            .resolve_payment(GatewayOutcome::Confirmed {
                token: "ext-1".into(),
            })
            .await
            .unwrap();

        assert_eq!(sale.transaction.gateway_token.as_deref(), Some("ext-1"));
        assert!(memory.gateway.requests().is_empty());
    }

    #[tokio::test]
    async fn test_resolve_without_pending_payment() {
        let (mut register, _memory) = walk_in_sale().await;
        let err = register
            .resolve_payment(GatewayOutcome::Cancelled)
            .await
            .unwrap_err();

        assert_eq!(
            err,
            RegisterError::InvalidState {
                action: "resolve a payment",
                state: SaleState::Idle
            }
        );
    }

    #[tokio::test]
    async fn test_sink_failure_keeps_cart_and_retries() {
        let (mut register, memory) = walk_in_sale().await;
        memory.sink.fail_next(1);

        let err = register.checkout(CheckoutRequest::cash(None)).await.unwrap_err();

        let RegisterError::SinkSubmission { retryable, .. } = err else {
            panic!("expected a sink failure");
        };
        assert!(retryable);
        assert_eq!(register.state(), SaleState::Failed);
        assert_eq!(register.cart().lines().len(), 2);
        let kept_id = register.failed_transaction().unwrap().id.clone();

        let sale = register.retry_completion().await.unwrap();
        assert_eq!(sale.transaction.id, kept_id);
        assert_eq!(memory.sink.committed().len(), 1);
        assert!(register.cart().is_empty());
    }

    #[tokio::test]
    async fn test_failed_cash_sale_discarded_on_edit() {
        let (mut register, memory) = walk_in_sale().await;
        memory.sink.set_rejecting(true);

        let err = register.checkout(CheckoutRequest::cash(None)).await.unwrap_err();
        assert!(matches!(err, RegisterError::SinkSubmission { retryable: false, .. }));

        register.update_quantity("p-1", 2).unwrap();
        assert_eq!(register.state(), SaleState::Idle);
        assert!(register.failed_transaction().is_none());
        assert_eq!(
            register.retry_completion().await.unwrap_err(),
            RegisterError::InvalidState {
                action: "retry completion",
                state: SaleState::Idle
            }
        );
    }

    #[tokio::test]
    async fn test_captured_card_payment_is_never_recharged() {
        let (mut register, memory) = walk_in_sale().await;
        memory.sink.fail_next(1);
        let _ = register.checkout(CheckoutRequest::card()).await.unwrap();

        assert!(matches!(
            register.await_payment().await,
            Err(RegisterError::SinkSubmission { .. })
        ));
        assert_eq!(register.state(), SaleState::Failed);

        assert_eq!(register.scan("WB-22").await, Err(RegisterError::CartLocked));
        assert!(matches!(
            register.checkout(CheckoutRequest::card()).await,
            Err(RegisterError::InvalidState { .. })
        ));

        let sale = register.retry_completion().await.unwrap();
        assert!(sale.transaction.gateway_token.is_some());
        assert_eq!(memory.gateway.requests().len(), 1);
        assert_eq!(memory.sink.committed().len(), 1);
    }

    #[tokio::test]
    async fn test_pending_tax_settles_at_checkout_with_fallback() {
        let (mut register, memory) = opened().await;
        register.scan("WB-22").await.unwrap();
        register
            .select_party(PartySelection::Customer("c-local".into()))
            .unwrap();
        memory.tax_settings.set_failing(true);

        let sale = completed(register.checkout(CheckoutRequest::mobile()).await.unwrap());

        // Marin lookup failed, primed business default (8%) used
        assert_eq!(sale.transaction.jurisdiction.total_rate, Decimal::new(8, 0));
        assert_eq!(sale.transaction.customer_id.as_deref(), Some("c-local"));
        assert!(matches!(
            sale.warnings.as_slice(),
            [CheckoutWarning::Tax(TaxWarning::LookupFailed { .. })]
        ));
    }

    #[tokio::test]
    async fn test_receipt_failure_is_only_a_warning() {
        let (mut register, memory) = walk_in_sale().await;
        memory.receipts.set_failing(true);

        let sale = completed(register.checkout(CheckoutRequest::cash(None)).await.unwrap());

        assert!(matches!(
            sale.warnings.as_slice(),
            [CheckoutWarning::ReceiptFailed(_)]
        ));
        assert_eq!(memory.sink.committed().len(), 1);
        assert_eq!(register.state(), SaleState::Idle);
    }

    #[tokio::test]
    async fn test_accepted_backorder_reaches_the_sink() {
        let (mut register, memory) = opened().await;
        let rotor = register.search("Brake Rotor").await.unwrap();
        let AddOutcome::NeedsDecision(pending) = register.add_product(&rotor, 2).unwrap() else {
            panic!("expected a backorder prompt");
        };
        register.resume_add(pending, Decision::Accept).unwrap();
        register.set_notes(Some("  call when in  ".into())).unwrap();

        let sale = completed(register.checkout(CheckoutRequest::mobile()).await.unwrap());

        assert_eq!(sale.receipt.backorders_created, 1);
        assert_eq!(sale.transaction.lines[0].backorder_quantity, 2);
        assert_eq!(sale.transaction.notes.as_deref(), Some("call when in"));
        assert!(register.notes().is_none());
    }

    #[derive(Default)]
    struct StateLog(std::sync::Mutex<Vec<SaleState>>);

    impl crate::ports::RegisterEventEmitter for StateLog {
        fn emit_state(&self, state: SaleState) {
            self.0.lock().unwrap().push(state);
        }

        fn emit_completed(&self, _transaction: &Transaction, _receipt: &SinkReceipt) {}

        fn emit_warning(&self, _message: &str) {}
    }

    #[tokio::test]
    async fn test_completion_returns_to_idle() {
        let (register, _memory) = walk_in_sale().await;
        let log = Arc::new(StateLog::default());
        let mut register = register.with_emitter(log.clone());

        let _ = completed(register.checkout(CheckoutRequest::mobile()).await.unwrap());

        assert_eq!(
            *log.0.lock().unwrap(),
            vec![
                SaleState::Submitting,
                SaleState::Completing,
                SaleState::Completed,
                SaleState::Idle,
            ]
        );
        assert_eq!(register.state(), SaleState::Idle);
        assert!(!register.state().is_busy());
    }

    #[tokio::test]
    async fn test_next_sale_after_completion() {
        let (mut register, memory) = walk_in_sale().await;
        let _ = register.checkout(CheckoutRequest::cash(None)).await.unwrap();
        assert_eq!(register.state(), SaleState::Idle);

        register.scan("WB-22").await.unwrap();
        let sale = completed(register.checkout(CheckoutRequest::cash(None)).await.unwrap());

        // party reset to none: zero-rated
        assert!(sale.transaction.presented.tax.is_zero());
        assert_eq!(memory.sink.committed().len(), 2);
    }
}
