//! # Register Session
//!
//! One terminal's active sale: keystrokes in, a committed transaction out.
//!
//! ## Session Flow
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        Register Session                                 │
//! │                                                                         │
//! │  Operator Action         Register Method           State Change         │
//! │  ───────────────         ───────────────           ────────────         │
//! │                                                                         │
//! │  Key events ────────────► push_key() ────────────► scanner buffer      │
//! │  Scan / Enter ──────────► handle_dispatch() ─────► cart.add            │
//! │  Backorder prompt ──────► resume_add() ──────────► cart.resume         │
//! │  Pick customer ─────────► select_party() ────────► tax Pending         │
//! │                           refresh_tax() ─────────► tax Settled         │
//! │  Pay ───────────────────► checkout() ────────────► finalizer           │
//! │                                                    (see checkout.rs)    │
//! │                                                                         │
//! │  NOTE: cart mutations are refused while a payment is outstanding.      │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! One `Register` per terminal session. It is not shared: the UI shell owns
//! it and drives it one call at a time.

use std::sync::Arc;

use tracing::{debug, info, warn};

use tessera_core::cart::{AddOutcome, Cart, CartLine, Decision, PendingDecision};
use tessera_core::scanner::{Dispatch, KeyEvent, ScanDetector};
use tessera_core::tax::ManualOverride;
use tessera_core::totals::{Discount, Totals};
use tessera_core::validation::validate_discount_value;
use tessera_core::{Address, BusinessProfile, PaymentAttempt, Product, TaxJurisdiction};

use crate::checkout::{FailedCompletion, PendingPayment};
use crate::config::RegisterConfig;
use crate::error::{RegisterError, RegisterResult};
use crate::finalizer::{Finalizer, SaleState};
use crate::lookup::ProductLookup;
use crate::ports::{Collaborators, NoOpEmitter, RegisterEventEmitter};
use crate::tax::{PartySelection, TaxResolver, TaxStatus, TaxWarning};

/// What a completed keyboard input led to.
#[derive(Debug, Clone, PartialEq)]
pub enum InputOutcome {
    /// A scan went straight to the cart.
    Scanned(AddOutcome),
    /// A manual search found a product for the operator to confirm.
    Found(Product),
}

pub struct Register {
    pub(crate) config: RegisterConfig,
    pub(crate) business: BusinessProfile,
    pub(crate) ports: Collaborators,
    pub(crate) emitter: Arc<dyn RegisterEventEmitter>,

    scanner: ScanDetector,
    lookup: ProductLookup,
    pub(crate) tax: TaxResolver,

    pub(crate) cart: Cart,
    pub(crate) discount: Discount,
    pub(crate) notes: Option<String>,
    pub(crate) party: PartySelection,
    pub(crate) tax_status: TaxStatus,

    pub(crate) finalizer: Finalizer,
    pub(crate) payment: Option<PendingPayment>,
    pub(crate) failed: Option<FailedCompletion>,
    pub(crate) attempts: Vec<PaymentAttempt>,
}

impl Register {
    pub fn new(config: RegisterConfig, ports: Collaborators) -> Self {
        let business = config.business_profile();
        let tax = TaxResolver::new(
            ports.tax_settings.clone(),
            ports.customers.clone(),
            business.location.clone(),
            config.manual_override(),
        );

        Register {
            scanner: ScanDetector::new(config.scanner.clone()),
            lookup: ProductLookup::new(ports.catalog.clone()),
            tax,
            business,
            emitter: Arc::new(NoOpEmitter),
            ports,
            config,
            cart: Cart::new(),
            discount: Discount::none(),
            notes: None,
            party: PartySelection::None,
            tax_status: TaxStatus::Settled(TaxJurisdiction::none()),
            finalizer: Finalizer::new(),
            payment: None,
            failed: None,
            attempts: Vec::new(),
        }
    }

    pub fn with_emitter(mut self, emitter: Arc<dyn RegisterEventEmitter>) -> Self {
        self.emitter = emitter;
        self
    }

    /// Session start: loads the catalog snapshot and the business default
    /// tax rate.
    pub async fn open(&mut self) -> RegisterResult<Vec<TaxWarning>> {
        let products = self.lookup.refresh_catalog().await?;
        let primed = self.tax.prime_business_default().await;
        info!(
            store = %self.business.name,
            products,
            business_rate = %primed.jurisdiction.total_rate,
            "Register session opened"
        );
        self.emit_tax_warnings(&primed.warnings);
        Ok(primed.warnings)
    }

    pub async fn refresh_catalog(&mut self) -> RegisterResult<usize> {
        self.lookup.refresh_catalog().await
    }

    // =========================================================================
    // Input
    // =========================================================================

    pub fn push_key(&mut self, event: KeyEvent) -> Option<Dispatch> {
        self.scanner.push(event)
    }

    /// Drives the scanner's idle auto-clear.
    pub fn tick(&mut self, now_ms: u64) {
        self.scanner.tick(now_ms);
    }

    /// Leaving the sale screen: the scanner stops listening and forgets its
    /// state.
    pub fn close_screen(&mut self) {
        self.scanner.teardown();
        debug!("Scanner detached");
    }

    pub fn open_screen(&mut self) {
        self.scanner.attach();
    }

    pub fn scanner(&self) -> &ScanDetector {
        &self.scanner
    }

    pub async fn handle_dispatch(&mut self, dispatch: Dispatch) -> RegisterResult<InputOutcome> {
        match dispatch {
            Dispatch::Scan(payload) => self.scan(&payload).await.map(InputOutcome::Scanned),
            Dispatch::ManualSearch(term) => self.search(&term).await.map(InputOutcome::Found),
        }
    }

    /// Resolves a scan payload and adds one unit.
    pub async fn scan(&mut self, payload: &str) -> RegisterResult<AddOutcome> {
        self.unlock_for_edit()?;
        let product = self.lookup.resolve(payload).await?;
        self.add_product(&product, 1)
    }

    pub async fn search(&mut self, term: &str) -> RegisterResult<Product> {
        self.lookup.resolve(term).await
    }

    // =========================================================================
    // Cart
    // =========================================================================

    pub fn add_product(&mut self, product: &Product, quantity: i64) -> RegisterResult<AddOutcome> {
        self.unlock_for_edit()?;
        let outcome = self.cart.add(product, quantity)?;
        match &outcome {
            AddOutcome::Added => {
                debug!(product_id = %product.id, quantity, "Added to cart");
            }
            AddOutcome::NeedsDecision(pending) => {
                info!(
                    product_id = %product.id,
                    shortfall = ?pending.shortfall(),
                    "Backorder decision required"
                );
            }
        }
        Ok(outcome)
    }

    /// Completes an add suspended on a backorder prompt.
    pub fn resume_add(&mut self, pending: PendingDecision, decision: Decision) -> RegisterResult<()> {
        self.unlock_for_edit()?;
        let product_id = pending.product().id.clone();
        self.cart.resume(pending, decision)?;
        info!(%product_id, "Backorder accepted");
        Ok(())
    }

    pub fn update_quantity(&mut self, product_id: &str, quantity: i64) -> RegisterResult<()> {
        self.unlock_for_edit()?;
        self.cart.update_quantity(product_id, quantity)?;
        Ok(())
    }

    pub fn remove_line(&mut self, product_id: &str) -> RegisterResult<CartLine> {
        self.unlock_for_edit()?;
        Ok(self.cart.remove(product_id)?)
    }

    pub fn clear_cart(&mut self) -> RegisterResult<()> {
        self.unlock_for_edit()?;
        self.cart.clear();
        Ok(())
    }

    pub fn set_discount(&mut self, discount: Discount) -> RegisterResult<()> {
        self.unlock_for_edit()?;
        validate_discount_value(discount.value).map_err(tessera_core::CoreError::from)?;
        self.discount = discount;
        Ok(())
    }

    pub fn set_notes(&mut self, notes: Option<String>) -> RegisterResult<()> {
        self.unlock_for_edit()?;
        self.notes = notes.map(|n| n.trim().to_string()).filter(|n| !n.is_empty());
        Ok(())
    }

    pub fn cart(&self) -> &Cart {
        &self.cart
    }

    pub fn discount(&self) -> &Discount {
        &self.discount
    }

    pub fn notes(&self) -> Option<&str> {
        self.notes.as_deref()
    }

    /// Cart edits are refused while a finalize runs or a captured payment
    /// waits for its completion retry. A failed cash sale is dropped on the
    /// first edit.
    fn unlock_for_edit(&mut self) -> RegisterResult<()> {
        let state = self.finalizer.state();
        if state.is_busy() {
            return Err(RegisterError::CartLocked);
        }
        if state == SaleState::Failed {
            if self.failed.as_ref().is_some_and(|f| f.has_captured_payment()) {
                return Err(RegisterError::CartLocked);
            }
            warn!("Discarding failed cash sale, cart edited");
            self.failed = None;
            self.advance(SaleState::Idle, "edit the cart")?;
        }
        Ok(())
    }

    // =========================================================================
    // Party & Tax
    // =========================================================================

    /// Changes the counterparty. Tax goes pending until `refresh_tax`.
    pub fn select_party(&mut self, selection: PartySelection) -> RegisterResult<()> {
        self.unlock_for_edit()?;
        debug!(?selection, "Party selected");
        self.party = selection;
        self.tax_status = TaxStatus::Pending;
        Ok(())
    }

    pub fn set_business_location(&mut self, location: Address) -> RegisterResult<()> {
        self.unlock_for_edit()?;
        self.business.location = location.clone();
        self.tax.set_business_location(location);
        self.tax_status = TaxStatus::Pending;
        Ok(())
    }

    pub fn set_manual_override(&mut self, manual_override: Option<ManualOverride>) -> RegisterResult<()> {
        self.unlock_for_edit()?;
        self.tax.set_manual_override(manual_override);
        self.tax_status = TaxStatus::Pending;
        Ok(())
    }

    /// Re-runs the full waterfall and settles the tax status.
    pub async fn refresh_tax(&mut self) -> Vec<TaxWarning> {
        let resolution = self.tax.resolve(&self.party).await;
        self.emit_tax_warnings(&resolution.warnings);
        self.tax_status = TaxStatus::Settled(resolution.jurisdiction);
        resolution.warnings
    }

    pub fn party(&self) -> &PartySelection {
        &self.party
    }

    pub fn tax_status(&self) -> &TaxStatus {
        &self.tax_status
    }

    /// Totals at the current tax status. A pending jurisdiction counts as 0%.
    pub fn totals(&self) -> RegisterResult<Totals> {
        Ok(Totals::compute(
            self.cart.lines(),
            &self.discount,
            self.tax_status.rate(),
        )?)
    }

    fn emit_tax_warnings(&self, warnings: &[TaxWarning]) {
        for warning in warnings {
            self.emitter.emit_warning(&warning.to_string());
        }
    }

    // =========================================================================
    // Finalizer Accessors
    // =========================================================================

    pub fn state(&self) -> SaleState {
        self.finalizer.state()
    }

    pub fn payment_attempts(&self) -> &[PaymentAttempt] {
        &self.attempts
    }

    pub fn business(&self) -> &BusinessProfile {
        &self.business
    }

    pub fn config(&self) -> &RegisterConfig {
        &self.config
    }

    pub(crate) fn advance(&mut self, next: SaleState, action: &'static str) -> RegisterResult<()> {
        self.finalizer.advance(next, action)?;
        self.emitter.emit_state(next);
        Ok(())
    }

    /// Makes the register ready for the next sale.
    pub(crate) fn reset_for_next_sale(&mut self) {
        self.cart = Cart::new();
        self.discount = Discount::none();
        self.notes = None;
        self.party = PartySelection::None;
        self.tax.reset_session();
        self.tax_status = TaxStatus::Settled(TaxJurisdiction::none());
        self.payment = None;
        self.failed = None;
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
