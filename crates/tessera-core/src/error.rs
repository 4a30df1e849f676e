//! # Error Types
//!
//! Domain-specific error types for tessera-core.
//!
//! ## Error Hierarchy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         Error Types                                     │
//! │                                                                         │
//! │  tessera-core errors (this file)                                       │
//! │  ├── CoreError        - Business rule outcomes the operator sees       │
//! │  └── ValidationError  - Input validation failures                      │
//! │                                                                         │
//! │  tessera-register errors (separate crate)                              │
//! │  ├── CollaboratorError - Transport failures from external systems      │
//! │  └── RegisterError     - What the finalize caller sees                 │
//! │                                                                         │
//! │  Flow: ValidationError → CoreError → RegisterError → Operator          │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! A scanner tie-break is never an error: the disambiguator resolves
//! ambiguous input itself and routes it as a manual search.

use thiserror::Error;

// =============================================================================
// Core Error
// =============================================================================

/// Core business logic errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CoreError {
    /// Nothing in the catalog matched the scanned or typed term.
    ///
    /// ## When This Occurs
    /// - Barcode unknown to the local catalog and no structured id to fetch
    /// - Remote single-product fetch came back empty or failed
    ///
    /// Retryable: the operator can rescan or type a different term.
    #[error("Product not found: {term}")]
    ProductNotFound { term: String },

    /// The operator declined a backorder prompt. The add was aborted and the
    /// cart is untouched.
    #[error("Backorder declined for product {product_id}")]
    StockPolicyDeclined { product_id: String },

    /// Checkout was triggered with nothing in the cart.
    #[error("Cart is empty")]
    EmptyCart,

    /// Quantity update or removal for a product that has no line.
    #[error("Product {0} is not in the cart")]
    LineNotInCart(String),

    /// Cart has exceeded maximum allowed lines.
    #[error("Cart cannot have more than {max} items")]
    CartTooLarge { max: usize },

    /// Line quantity exceeds maximum allowed.
    #[error("Quantity {requested} exceeds maximum allowed ({max})")]
    QuantityTooLarge { requested: i64, max: i64 },

    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),
}

// =============================================================================
// Validation Error
// =============================================================================

/// Input validation errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("{field} is required")]
    Required { field: String },

    #[error("{field} must be at most {max} characters")]
    TooLong { field: String, max: usize },

    #[error("{field} must be between {min} and {max}")]
    OutOfRange { field: String, min: i64, max: i64 },

    #[error("{field} must be positive")]
    MustBePositive { field: String },

    #[error("{field} has invalid format: {reason}")]
    InvalidFormat { field: String, reason: String },

    /// Arithmetic on the value left the representable range.
    #[error("{field} is too large to compute")]
    Overflow { field: String },
}

/// Convenience type alias for Results with CoreError.
pub type CoreResult<T> = Result<T, CoreError>;

// =============================================================================
// Unit Tests
// =============================================================================
