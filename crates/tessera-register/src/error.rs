//! # Register Error Types
//!
//! Error types for the register session.
//!
//! ## Error Hierarchy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                     Register Error Categories                           │
//! │                                                                         │
//! │  ┌─────────────────┐  ┌─────────────────┐  ┌─────────────────────────┐ │
//! │  │  Collaborator   │  │    Operator     │  │     Session             │ │
//! │  │  (ports only)   │  │                 │  │                         │ │
//! │  │  Unavailable    │  │  ProductNotFound│  │  CheckoutInProgress     │ │
//! │  │  Timeout        │  │  StockPolicy... │  │  CartLocked             │ │
//! │  │  Rejected       │  │  EmptyCart      │  │  InvalidState           │ │
//! │  │  NotFound       │  │  Insufficient.. │  │                         │ │
//! │  └────────┬────────┘  └─────────────────┘  └─────────────────────────┘ │
//! │           │ normalized at the component boundary                        │
//! │           ▼                                                             │
//! │  ┌─────────────────┐  ┌─────────────────┐  ┌─────────────────────────┐ │
//! │  │    Payment      │  │   Completion    │  │     Configuration       │ │
//! │  │  PaymentFailed  │  │  SinkSubmission │  │  LoadFailed             │ │
//! │  │  PaymentCancel..│  │  CatalogUnavail.│  │  Invalid                │ │
//! │  └─────────────────┘  └─────────────────┘  └─────────────────────────┘ │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! A [`CollaboratorError`] never reaches the caller of a register operation.
//! Tax lookup failures are not errors at all: they surface as
//! [`crate::tax::TaxWarning`] values next to a fallback rate.

use thiserror::Error;

use tessera_core::{CoreError, Money};

use crate::finalizer::SaleState;

/// Result type alias for register operations.
pub type RegisterResult<T> = Result<T, RegisterError>;

// =============================================================================
// Collaborator Error
// =============================================================================

/// What an external collaborator (catalog, directory, tax settings, gateway,
/// sink, renderer) reports when a call fails.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CollaboratorError {
    /// The collaborator could not be reached.
    #[error("Collaborator unavailable: {0}")]
    Unavailable(String),

    #[error("Collaborator timed out after {after_ms}ms")]
    Timeout { after_ms: u64 },

    /// The collaborator answered and refused the request.
    #[error("Request rejected: {0}")]
    Rejected(String),

    #[error("Not found: {0}")]
    NotFound(String),
}

impl CollaboratorError {
    /// Returns true if the same call may succeed when repeated.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            CollaboratorError::Unavailable(_) | CollaboratorError::Timeout { .. }
        )
    }
}

// =============================================================================
// Configuration Error
// =============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("Failed to load config: {0}")]
    LoadFailed(String),

    #[error("Failed to save config: {0}")]
    SaveFailed(String),

    #[error("Invalid register configuration: {0}")]
    Invalid(String),
}

impl From<std::io::Error> for ConfigError {
    fn from(err: std::io::Error) -> Self {
        ConfigError::LoadFailed(err.to_string())
    }
}

impl From<toml::de::Error> for ConfigError {
    fn from(err: toml::de::Error) -> Self {
        ConfigError::LoadFailed(err.to_string())
    }
}

impl From<toml::ser::Error> for ConfigError {
    fn from(err: toml::ser::Error) -> Self {
        ConfigError::SaveFailed(err.to_string())
    }
}

// =============================================================================
// Register Error
// =============================================================================

/// Everything a register operation can fail with.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum RegisterError {
    // =========================================================================
    // Operator Errors
    // =========================================================================
    /// Nothing matched locally or remotely. The operator can rescan.
    #[error("Product not found: {term}")]
    ProductNotFound { term: String },

    /// The operator declined a backorder prompt; nothing was added.
    #[error("Backorder declined for product {product_id}")]
    StockPolicyDeclined { product_id: String },

    #[error("Cart is empty")]
    EmptyCart,

    /// Cash tendered below the total while the tender policy blocks.
    #[error("Tendered {tendered} is less than the total {total}")]
    InsufficientTender { tendered: Money, total: Money },

    // =========================================================================
    // Session Errors
    // =========================================================================
    /// A second checkout trigger while one is already running.
    #[error("A checkout is already in progress")]
    CheckoutInProgress,

    /// Cart mutation while a payment is outstanding.
    #[error("The cart is locked until the current payment is resolved")]
    CartLocked,

    #[error("Cannot {action} while the sale is {state}")]
    InvalidState {
        action: &'static str,
        state: SaleState,
    },

    // =========================================================================
    // Payment Errors
    // =========================================================================
    /// The gateway declined or errored. The cart is preserved.
    #[error("Payment failed: {reason}")]
    PaymentFailed { reason: String },

    /// The card interaction was cancelled. The cart is preserved.
    #[error("Payment cancelled")]
    PaymentCancelled,

    /// The gateway gave no answer in time. The payment is still pending:
    /// await it again, resolve it out of band, or cancel it.
    #[error("No answer from the payment gateway after {after_secs}s")]
    PaymentTimedOut { after_secs: u64 },

    // =========================================================================
    // Completion Errors
    // =========================================================================
    /// The accounting/inventory sink refused or could not take the sale.
    /// The transaction is kept for `retry_completion`.
    #[error("Sale could not be recorded: {reason}")]
    SinkSubmission { reason: String, retryable: bool },

    /// The catalog snapshot could not be refreshed.
    #[error("Catalog unavailable: {0}")]
    CatalogUnavailable(String),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Core(CoreError),
}

impl From<CoreError> for RegisterError {
    fn from(err: CoreError) -> Self {
        match err {
            CoreError::ProductNotFound { term } => RegisterError::ProductNotFound { term },
            CoreError::StockPolicyDeclined { product_id } => {
                RegisterError::StockPolicyDeclined { product_id }
            }
            CoreError::EmptyCart => RegisterError::EmptyCart,
            other => RegisterError::Core(other),
        }
    }
}

// =============================================================================
// Error Categorization
// =============================================================================

impl RegisterError {
    /// Returns true if the operator can repeat the operation and expect a
    /// different outcome.
    ///
    /// ## Retryable Errors
    /// - Product misses (rescan, type another term)
    /// - Payment failures and cancellations (cart is untouched)
    /// - Gateway timeouts (the payment is still pending)
    /// - Sink submissions that failed transiently
    pub fn is_retryable(&self) -> bool {
        match self {
            RegisterError::ProductNotFound { .. }
            | RegisterError::PaymentFailed { .. }
            | RegisterError::PaymentCancelled
            | RegisterError::PaymentTimedOut { .. }
            | RegisterError::CatalogUnavailable(_) => true,
            RegisterError::SinkSubmission { retryable, .. } => *retryable,
            _ => false,
        }
    }

    /// Returns true for the hard stops: the sale cannot move on until the
    /// operator acts.
    pub fn is_blocking(&self) -> bool {
        matches!(
            self,
            RegisterError::EmptyCart
                | RegisterError::SinkSubmission { .. }
                | RegisterError::InsufficientTender { .. }
        )
    }
}
