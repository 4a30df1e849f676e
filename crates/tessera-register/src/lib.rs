//! # tessera-register: Terminal Session for Tessera POS
//!
//! This crate runs one register session: it owns the scanner, the cart and
//! the sale finalizer, and it is the only place that talks to external
//! collaborators.
//!
//! ## Architecture Overview
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         Register Session                                │
//! │                                                                         │
//! │  ┌──────────────────────────────────────────────────────────────────┐  │
//! │  │                      Register (Orchestrator)                     │  │
//! │  │                                                                  │  │
//! │  │  keystrokes ─► ScanDetector ─► ProductLookup ─► Cart             │  │
//! │  │  party / location / override ─► TaxResolver ─► TaxStatus         │  │
//! │  │  checkout ─► Finalizer (SaleState) ─► gateway ─► sink ─► receipt │  │
//! │  └────────────────────────────┬─────────────────────────────────────┘  │
//! │                               │                                         │
//! │         ┌─────────────────────┼─────────────────────┐                  │
//! │         ▼                     ▼                     ▼                   │
//! │  ┌────────────────┐  ┌────────────────┐  ┌────────────────────────┐    │
//! │  │ Read ports     │  │ Payment port   │  │ Write ports            │    │
//! │  │                │  │                │  │                        │    │
//! │  │ CatalogSource  │  │ PaymentGateway │  │ AccountingSink         │    │
//! │  │ CustomerDir.   │  │ (cancellable)  │  │ ReceiptRenderer        │    │
//! │  │ TaxSettings    │  │                │  │                        │    │
//! │  └────────────────┘  └────────────────┘  └────────────────────────┘    │
//! │                                                                         │
//! │  EVENTS (to the UI shell via RegisterEventEmitter):                    │
//! │  • state changes • completed sales • non-fatal warnings                │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Module Organization
//! - [`register`] - `Register` session: input, cart edits, tax status
//! - [`checkout`] - Finalize, card payment suspension, completion, retry
//! - [`finalizer`] - Sale state machine
//! - [`tax`] - Tax resolver with session cache and fallback
//! - [`lookup`] - Catalog snapshot with remote fetch
//! - [`ports`] - Collaborator traits
//! - [`memory`] - In-memory collaborators
//! - [`config`] - Register configuration (TOML + env)
//! - [`error`] - Register error types
//! - [`telemetry`] - Tracing setup
//!
//! ## Usage
//!
//! ```rust,ignore
//! use tessera_register::{CheckoutRequest, Register, RegisterConfig};
//!
//! let config = RegisterConfig::load_or_default(None);
//! let mut register = Register::new(config, collaborators);
//! register.open().await?;
//!
//! register.scan("4006381333931").await?;
//! register.select_party(PartySelection::WalkIn)?;
//! let outcome = register.checkout(CheckoutRequest::cash(None)).await?;
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod checkout;
pub mod config;
pub mod error;
pub mod finalizer;
pub mod lookup;
pub mod memory;
pub mod ports;
pub mod register;
pub mod tax;
pub mod telemetry;

// =============================================================================
// Re-exports for Convenience
// =============================================================================

pub use checkout::{
    AwaitingPayment, CheckoutOutcome, CheckoutRequest, CheckoutWarning, CompletedSale,
    PaymentCancelHandle,
};
pub use config::{RegisterConfig, TenderPolicy};
pub use error::{CollaboratorError, ConfigError, RegisterError, RegisterResult};
pub use finalizer::SaleState;
pub use ports::{
    Collaborators, GatewayOutcome, NoOpEmitter, PaymentRequest, RegisterEventEmitter, SinkReceipt,
};
pub use register::{InputOutcome, Register};
pub use tax::{PartySelection, TaxStatus, TaxWarning};
