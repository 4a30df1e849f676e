//! # Register Simulation
//!
//! Drives one register session against in-memory collaborators: a scanner
//! burst, a manual search, a cash sale and a card sale.
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  register.toml ──► RegisterConfig ──► Register ──► MemoryCollaborators  │
//! │                                          │                              │
//! │                       keystrokes ────────┤                              │
//! │                       checkout ──────────┴──► receipts on stdout        │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Usage
//! ```text
//! RUST_LOG=debug cargo run -p tessera-register --bin simulate
//! ```

use std::error::Error;
use std::sync::Arc;

use rust_decimal::Decimal;
use tracing::{info, warn};

use tessera_core::scanner::{Dispatch, KeyEvent};
use tessera_core::totals::Discount;
use tessera_core::{
    Address, Customer, JurisdictionRate, Money, Product, TaxComponent, Transaction,
};
use tessera_register::memory::{
    MemoryCatalog, MemoryCollaborators, MemoryCustomers, MemoryTaxSettings,
};
use tessera_register::{
    telemetry, CheckoutOutcome, CheckoutRequest, PartySelection, Register,
    RegisterConfig, RegisterEventEmitter, SaleState, SinkReceipt,
};

/// Forwards register events to the log.
struct LogEmitter;

impl RegisterEventEmitter for LogEmitter {
    fn emit_state(&self, state: SaleState) {
        info!(%state, "register://state");
    }

    fn emit_completed(&self, transaction: &Transaction, receipt: &SinkReceipt) {
        info!(
            transaction_id = %transaction.id,
            record_id = %receipt.record_id,
            "register://completed"
        );
    }

    fn emit_warning(&self, message: &str) {
        warn!(warning = message, "register://warning");
    }
}

fn demo_collaborators(location: &Address) -> MemoryCollaborators {
    let catalog = MemoryCatalog::new(vec![
        Product::new("p-100", "Synthetic Oil 5W-30", 3499)
            .with_sku("OIL-530")
            .with_barcode("4006381333931")
            .with_stock(24),
        Product::new("p-101", "Cabin Air Filter", 1899)
            .with_sku("CAF-12")
            .with_stock(6),
        Product::new("p-102", "Brake Pads (Front)", 5450)
            .with_sku("BP-F2")
            .with_stock(0),
    ])
    .with_remote(Product::new("p-200", "Headlight Bulb H11", 1250).with_stock(40));

    let customers = MemoryCustomers::new().with_customer(Customer {
        id: "c-fleet".into(),
        name: "Harbor Fleet Services".into(),
        billing: Some(Address::new("US", "CA", "")),
        shipping: Some(Address::new("US", "CA", "Marin")),
    });

    let tax_settings = MemoryTaxSettings::new()
        .with_rate(
            location.clone(),
            JurisdictionRate::from_components(vec![
                TaxComponent {
                    component_type: "state".into(),
                    name: "State".into(),
                    rate: Decimal::new(6, 0),
                },
                TaxComponent {
                    component_type: "county".into(),
                    name: "County".into(),
                    rate: Decimal::new(25, 1),
                },
            ]),
        )
        .with_rate(
            Address::new("US", "CA", "Marin"),
            JurisdictionRate::flat(Decimal::new(925, 2)),
        );

    MemoryCollaborators::new(catalog, customers, tax_settings)
}

/// Replays a barcode the way a wedge scanner types it: 8ms per key.
fn scanner_burst(register: &mut Register, code: &str, start_ms: u64) -> Option<Dispatch> {
    let mut at = start_ms;
    for ch in code.chars() {
        let _ = register.push_key(KeyEvent::char(ch, at));
        at += 8;
    }
    register.push_key(KeyEvent::submit(at, code))
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    telemetry::init_tracing();

    let mut config = RegisterConfig::load_or_default(None);
    if config.store.location.is_blank() {
        config.store.location = Address::new("US", "CA", "Alameda");
    }
    info!(store = %config.store.name, currency = %config.store.currency, "Starting register simulation");

    let memory = demo_collaborators(&config.store.location);
    let mut register = Register::new(config, memory.ports()).with_emitter(Arc::new(LogEmitter));
    register.open().await?;

    // Sale 1: scanner burst, manual search, walk-in, cash
    if let Some(dispatch) = scanner_burst(&mut register, "4006381333931", 1_000) {
        let outcome = register.handle_dispatch(dispatch).await?;
        info!(?outcome, "Scanner input handled");
    }

    let filter = register.search("CAF-12").await?;
    let _ = register.add_product(&filter, 2)?;
    register.set_discount(Discount::percentage(Decimal::new(5, 0)))?;
    register.select_party(PartySelection::WalkIn)?;
    register.refresh_tax().await;

    let totals = register.totals()?.present();
    info!(total = %totals.total, tax = %totals.tax, "Cart ready");

    match register
        .checkout(CheckoutRequest::cash(Some(Money::from_cents(10_000))))
        .await?
    {
        CheckoutOutcome::Completed(sale) => {
            info!(change = %sale.change_due(), warnings = sale.warnings.len(), "Cash sale complete");
        }
        CheckoutOutcome::AwaitingPayment(_) => warn!("Cash sale unexpectedly awaiting payment"),
    }

    // Sale 2: structured payload for a product outside the snapshot, fleet customer, card
    register.scan(r#"{"id":"p-200","name":"Headlight Bulb H11"}"#).await?;
    register.select_party(PartySelection::Customer("c-fleet".into()))?;
    register.set_notes(Some("PO 4471".into()))?;

    if let CheckoutOutcome::AwaitingPayment(handle) = register.checkout(CheckoutRequest::card()).await? {
        info!(attempt_id = %handle.attempt_id, amount = %handle.amount, "Present card");
        let sale = register.await_payment().await?;
        info!(
            rate = %sale.transaction.jurisdiction.total_rate,
            county = %sale.transaction.jurisdiction.county,
            "Card sale complete"
        );
    }

    for receipt in memory.receipts.rendered() {
        println!("{}", receipt);
    }
    info!(committed = memory.sink.committed().len(), "Simulation finished");

    Ok(())
}
