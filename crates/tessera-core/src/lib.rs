//! # tessera-core: Pure Business Logic for Tessera POS
//!
//! This crate is the transaction core of Tessera POS: everything between a
//! keystroke and a computed total, as pure, deterministic code.
//!
//! ## Architecture Position
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        Tessera POS Architecture                         │
//! │                                                                         │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │               ★ tessera-core (THIS CRATE) ★                     │   │
//! │  │                                                                 │   │
//! │  │   keystrokes ──► scanner ──► resolver ──► cart ──► totals       │   │
//! │  │                                                      ▲          │   │
//! │  │                                  tax (waterfall) ────┘          │   │
//! │  │                                                                 │   │
//! │  │   NO I/O • NO CLOCK READS FOR HEURISTICS • PURE FUNCTIONS       │   │
//! │  └─────────────────────────────┬───────────────────────────────────┘   │
//! │                                │                                        │
//! │  ┌─────────────────────────────▼───────────────────────────────────┐   │
//! │  │                 tessera-register (Session Layer)                │   │
//! │  │   catalog fetches, tax lookups, payment gateway, sale commit    │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Modules
//!
//! - [`scanner`] - Input disambiguator (scan burst vs. human typing)
//! - [`resolver`] - Scan payload / search term → product
//! - [`cart`] - Line items and stock policy with explicit backorder decisions
//! - [`tax`] - Jurisdiction waterfall planning
//! - [`totals`] - Subtotal, discount, tax, total at full precision
//! - [`types`] - Domain types (Product, Customer, TaxJurisdiction, Transaction)
//! - [`money`] - Integer-cent Money for prices, tender and change
//! - [`validation`] - Input validation
//! - [`error`] - Domain error types
//!
//! ## Example Usage
//!
//! ```rust
//! use rust_decimal::Decimal;
//! use tessera_core::cart::{AddOutcome, Cart};
//! use tessera_core::totals::{Discount, Totals};
//! use tessera_core::{Money, Product};
//!
//! let mut cart = Cart::new();
//! let filter = Product::new("p1", "Oil Filter", 2100).with_stock(10);
//! assert_eq!(cart.add(&filter, 1).unwrap(), AddOutcome::Added);
//!
//! let totals = Totals::compute(cart.lines(), &Discount::none(), Decimal::new(8, 0)).unwrap();
//! assert_eq!(totals.present().total, Money::from_cents(2268));
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod cart;
pub mod error;
pub mod money;
pub mod resolver;
pub mod scanner;
pub mod tax;
pub mod totals;
pub mod types;
pub mod validation;

// =============================================================================
// Re-exports for Convenience
// =============================================================================

pub use error::{CoreError, CoreResult, ValidationError};
pub use money::Money;
pub use types::*;

// =============================================================================
// Crate-Level Constants
// =============================================================================

/// Maximum distinct lines in a single cart.
pub const MAX_CART_ITEMS: usize = 100;

/// Maximum quantity of a single line.
///
/// ## Business Reason
/// Prevents accidental over-ordering (typing 1000 instead of 10).
pub const MAX_ITEM_QUANTITY: i64 = 999;

/// Longest search term or scan payload accepted.
pub const MAX_SEARCH_TERM_LEN: usize = 512;

/// Highest unit price a product may carry ($1,000,000.00).
///
/// Caps scanned payload prices too, so cart and totals arithmetic stays far
/// from the i64 and Decimal limits.
pub const MAX_UNIT_PRICE_CENTS: i64 = 100_000_000;

/// Highest discount value, read as percent or as major currency units.
pub const MAX_DISCOUNT_VALUE: i64 = 1_000_000;
