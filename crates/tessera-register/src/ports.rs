//! # Collaborator Ports
//!
//! The external systems a register talks to, as object-safe async traits.
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                          Register Ports                                 │
//! │                                                                         │
//! │   read                    async                    write                │
//! │   ────                    ─────                    ─────                │
//! │   CatalogSource           PaymentGateway           AccountingSink       │
//! │   CustomerDirectory                                ReceiptRenderer      │
//! │   TaxSettingsStore                                                      │
//! │                                                                         │
//! │   Every method returns CollaboratorError on failure. The register       │
//! │   normalizes it before anything reaches the operator.                   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use tessera_core::{Address, BusinessProfile, Customer, JurisdictionRate, Money, Product, Transaction};

use crate::error::CollaboratorError;

/// Result type for collaborator calls.
pub type PortResult<T> = Result<T, CollaboratorError>;

// =============================================================================
// Read Ports
// =============================================================================

/// Product catalog.
#[async_trait]
pub trait CatalogSource: Send + Sync {
    /// Full snapshot for local resolution.
    async fn list(&self) -> PortResult<Vec<Product>>;

    /// Single-product fetch. `Ok(None)` when the id is unknown.
    async fn fetch_by_id(&self, id: &str) -> PortResult<Option<Product>>;
}

#[async_trait]
pub trait CustomerDirectory: Send + Sync {
    async fn customer(&self, id: &str) -> PortResult<Option<Customer>>;
}

/// Jurisdiction rate table.
#[async_trait]
pub trait TaxSettingsStore: Send + Sync {
    /// Rate for a normalized address. `Ok(None)` means "not configured".
    async fn rate(&self, address: &Address) -> PortResult<Option<JurisdictionRate>>;
}

// =============================================================================
// Payment Gateway
// =============================================================================

/// What the register asks the gateway to charge.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentRequest {
    /// Payment attempt id, doubles as the idempotency key.
    pub attempt_id: String,
    pub amount: Money,
    pub currency: String,
    pub customer_id: Option<String>,
}

/// How a card interaction ended.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "outcome")]
pub enum GatewayOutcome {
    Confirmed { token: String },
    Declined { reason: String },
    Cancelled,
}

#[async_trait]
pub trait PaymentGateway: Send + Sync {
    /// Runs the card interaction. May take arbitrarily long.
    async fn authorize(&self, request: &PaymentRequest) -> PortResult<GatewayOutcome>;
}

// =============================================================================
// Write Ports
// =============================================================================

/// What the accounting/inventory sink confirms for a committed sale.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct SinkReceipt {
    pub record_id: String,
    pub inventory_updated: bool,
    pub accounting_entries_created: bool,
    /// Backorder records created for flagged lines.
    pub backorders_created: usize,
}

#[async_trait]
pub trait AccountingSink: Send + Sync {
    async fn submit(&self, transaction: &Transaction) -> PortResult<SinkReceipt>;
}

/// Downstream consumer of finalized sales.
#[async_trait]
pub trait ReceiptRenderer: Send + Sync {
    async fn render(&self, transaction: &Transaction, business: &BusinessProfile) -> PortResult<()>;
}

// =============================================================================
// Bundle
// =============================================================================

/// The collaborators a register is wired to.
#[derive(Clone)]
pub struct Collaborators {
    pub catalog: Arc<dyn CatalogSource>,
    pub customers: Arc<dyn CustomerDirectory>,
    pub tax_settings: Arc<dyn TaxSettingsStore>,
    pub gateway: Arc<dyn PaymentGateway>,
    pub sink: Arc<dyn AccountingSink>,
    pub receipts: Arc<dyn ReceiptRenderer>,
}

// =============================================================================
// Event Emitter
// =============================================================================

/// Receives register lifecycle notifications (implemented by the UI shell).
pub trait RegisterEventEmitter: Send + Sync {
    /// Emits a finalizer state change.
    fn emit_state(&self, state: crate::finalizer::SaleState);

    /// Emits a committed sale.
    fn emit_completed(&self, transaction: &Transaction, receipt: &SinkReceipt);

    /// Emits a non-fatal warning for a toast.
    fn emit_warning(&self, message: &str);
}

/// No-op event emitter for testing.
pub struct NoOpEmitter;

impl RegisterEventEmitter for NoOpEmitter {
    fn emit_state(&self, _state: crate::finalizer::SaleState) {}
    fn emit_completed(&self, _transaction: &Transaction, _receipt: &SinkReceipt) {}
    fn emit_warning(&self, _message: &str) {}
}
