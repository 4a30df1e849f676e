//! # Domain Types
//!
//! Core domain types used throughout Tessera POS.
//!
//! ## Type Hierarchy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         Domain Types                                    │
//! │                                                                         │
//! │  ┌─────────────────┐   ┌─────────────────┐   ┌─────────────────┐       │
//! │  │    Product      │   │    Customer     │   │ TaxJurisdiction │       │
//! │  │  ─────────────  │   │  ─────────────  │   │  ─────────────  │       │
//! │  │  id / sku       │   │  id             │   │  country/state/ │       │
//! │  │  barcode        │   │  billing addr   │   │  county         │       │
//! │  │  pricing model  │   │  shipping addr  │   │  components     │       │
//! │  │  stock quantity │   └─────────────────┘   │  total_rate     │       │
//! │  └─────────────────┘                         │  source         │       │
//! │                                              └─────────────────┘       │
//! │  ┌─────────────────┐   ┌─────────────────┐   ┌─────────────────┐       │
//! │  │  Transaction    │   │ PaymentAttempt  │   │ PaymentMethod   │       │
//! │  │  ─────────────  │   │  ─────────────  │   │  ─────────────  │       │
//! │  │  lines, totals  │   │  pending →      │   │  Cash  (sync)   │       │
//! │  │  jurisdiction   │   │  confirmed |    │   │  Mobile (sync)  │       │
//! │  │  tender/token   │   │  failed         │   │  Card  (async)  │       │
//! │  └─────────────────┘   └─────────────────┘   └─────────────────┘       │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use ts_rs::TS;

use crate::cart::CartLine;
use crate::money::Money;
use crate::totals::{Discount, PresentedTotals, Totals};

// =============================================================================
// Product
// =============================================================================

/// How a product's unit price is derived.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "snake_case", tag = "model")]
pub enum PricingModel {
    /// `price_cents` is the selling price.
    #[default]
    Fixed,
    /// Price is computed from cost plus a markup in basis points.
    Markup { cost_cents: i64, markup_bps: u32 },
}

/// A product available for sale.
///
/// Once copied into a cart line the product is an immutable snapshot; later
/// catalog edits do not reach lines already in the cart.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct Product {
    /// Catalog identifier.
    pub id: String,

    /// Display name shown to cashier and on receipt.
    pub name: String,

    /// Stock Keeping Unit.
    pub sku: Option<String>,

    /// Barcode (EAN-13, UPC-A, etc.).
    pub barcode: Option<String>,

    /// Listed price in cents. Authoritative only for `PricingModel::Fixed`.
    pub price_cents: i64,

    #[serde(default)]
    pub pricing: PricingModel,

    /// On-hand stock. `None` means the catalog does not know.
    pub stock_quantity: Option<i64>,
}

impl Product {
    /// Returns the effective unit price.
    ///
    /// ```rust
    /// use tessera_core::{PricingModel, Product};
    ///
    /// let mut p = Product::new("p1", "Filter", 0);
    /// p.pricing = PricingModel::Markup { cost_cents: 1000, markup_bps: 2500 };
    /// assert_eq!(p.unit_price().cents(), 1250);
    /// ```
    pub fn unit_price(&self) -> Money {
        match self.pricing {
            PricingModel::Fixed => Money::from_cents(self.price_cents),
            PricingModel::Markup {
                cost_cents,
                markup_bps,
            } => {
                let markup = (cost_cents as i128 * markup_bps as i128 + 5000) / 10000;
                let cents = (cost_cents as i128 + markup).clamp(i64::MIN as i128, i64::MAX as i128);
                Money::from_cents(cents as i64)
            }
        }
    }

    /// Stock used by the cart's stock policy. Unknown stock counts as zero.
    #[inline]
    pub fn available_stock(&self) -> i64 {
        self.stock_quantity.unwrap_or(0).max(0)
    }

    /// Minimal fixed-price product with unknown stock.
    pub fn new(id: impl Into<String>, name: impl Into<String>, price_cents: i64) -> Self {
        Product {
            id: id.into(),
            name: name.into(),
            sku: None,
            barcode: None,
            price_cents,
            pricing: PricingModel::Fixed,
            stock_quantity: None,
        }
    }

    pub fn with_sku(mut self, sku: impl Into<String>) -> Self {
        self.sku = Some(sku.into());
        self
    }

    pub fn with_barcode(mut self, barcode: impl Into<String>) -> Self {
        self.barcode = Some(barcode.into());
        self
    }

    pub fn with_stock(mut self, stock: i64) -> Self {
        self.stock_quantity = Some(stock);
        self
    }
}

// =============================================================================
// Addresses & Customers
// =============================================================================

/// A postal jurisdiction. Only the three tax-relevant fields are modelled.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct Address {
    #[serde(default)]
    pub country: String,
    #[serde(default)]
    pub state: String,
    #[serde(default)]
    pub county: String,
}

impl Address {
    pub fn new(
        country: impl Into<String>,
        state: impl Into<String>,
        county: impl Into<String>,
    ) -> Self {
        Address {
            country: country.into(),
            state: state.into(),
            county: county.into(),
        }
    }

    /// Trimmed, uppercased copy. All comparisons happen on this form.
    pub fn normalized(&self) -> Address {
        Address {
            country: normalize_field(&self.country),
            state: normalize_field(&self.state),
            county: normalize_field(&self.county),
        }
    }

    /// True when every field is blank after trimming.
    pub fn is_blank(&self) -> bool {
        self.country.trim().is_empty() && self.state.trim().is_empty() && self.county.trim().is_empty()
    }
}

/// Normalizes one address field for comparison.
pub fn normalize_field(value: &str) -> String {
    value.trim().to_uppercase()
}

/// A customer record as returned by the Customer Directory.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct Customer {
    pub id: String,
    pub name: String,
    pub billing: Option<Address>,
    pub shipping: Option<Address>,
}

impl Customer {
    /// True when neither address carries any field.
    pub fn has_address(&self) -> bool {
        let present = |a: &Option<Address>| a.as_ref().is_some_and(|a| !a.is_blank());
        present(&self.billing) || present(&self.shipping)
    }
}

/// The store running this terminal.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct BusinessProfile {
    pub name: String,
    pub location: Address,
    /// ISO 4217 currency code.
    pub currency: String,
}

// =============================================================================
// Tax Jurisdiction
// =============================================================================

/// Which rule of the jurisdiction waterfall produced a rate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "snake_case")]
pub enum JurisdictionSource {
    CustomerBilling,
    CustomerShipping,
    BusinessDefault,
    ManualOverride,
    InternationalExport,
    #[default]
    None,
}

/// One named slice of a jurisdiction's rate (state, county, city, ...).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct TaxComponent {
    #[serde(rename = "type")]
    pub component_type: String,
    pub name: String,
    /// Percentage, e.g. `6.25` for 6.25%.
    #[ts(as = "String")]
    pub rate: Decimal,
}

/// The jurisdiction and rate that govern a sale.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct TaxJurisdiction {
    pub country: String,
    pub state: String,
    pub county: String,
    pub components: Vec<TaxComponent>,
    /// Percentage, the sum of `components` when any are present.
    #[ts(as = "String")]
    pub total_rate: Decimal,
    pub source: JurisdictionSource,
}

impl TaxJurisdiction {
    /// A zero-rated jurisdiction for the given address.
    pub fn zero_rated(address: &Address, source: JurisdictionSource) -> Self {
        TaxJurisdiction {
            country: address.country.clone(),
            state: address.state.clone(),
            county: address.county.clone(),
            components: Vec::new(),
            total_rate: Decimal::ZERO,
            source,
        }
    }

    /// The "no party selected" gate.
    pub fn none() -> Self {
        TaxJurisdiction::default()
    }

    pub fn address(&self) -> Address {
        Address::new(&self.country, &self.state, &self.county)
    }
}

/// A rate table entry as stored by the Tax Settings Store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct JurisdictionRate {
    pub components: Vec<TaxComponent>,
    #[ts(as = "String")]
    pub total_rate: Decimal,
}

impl JurisdictionRate {
    /// Builds a rate whose total is the sum of its components.
    pub fn from_components(components: Vec<TaxComponent>) -> Self {
        let total_rate = components.iter().map(|c| c.rate).sum();
        JurisdictionRate {
            components,
            total_rate,
        }
    }

    /// A single unnamed rate.
    pub fn flat(total_rate: Decimal) -> Self {
        JurisdictionRate {
            components: Vec::new(),
            total_rate,
        }
    }
}

// =============================================================================
// Payment
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "snake_case")]
pub enum PaymentMethod {
    /// Physical cash payment.
    Cash,
    /// Mobile wallet confirmed at the counter.
    Mobile,
    /// Card payment through the payment gateway.
    Card,
}

impl PaymentMethod {
    /// Cash and mobile commit without waiting on the gateway.
    #[inline]
    pub const fn is_synchronous(&self) -> bool {
        matches!(self, PaymentMethod::Cash | PaymentMethod::Mobile)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "snake_case")]
pub enum PaymentAttemptStatus {
    Pending,
    Confirmed,
    Failed,
}

/// One interaction with the payment gateway.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct PaymentAttempt {
    pub id: String,
    pub amount: Money,
    pub currency: String,
    pub status: PaymentAttemptStatus,
    /// Gateway confirmation token once confirmed.
    pub token: Option<String>,
    /// Failure or cancellation reason once failed.
    pub failure: Option<String>,
    #[ts(as = "String")]
    pub created_at: DateTime<Utc>,
    #[ts(as = "Option<String>")]
    pub resolved_at: Option<DateTime<Utc>>,
}

impl PaymentAttempt {
    pub fn pending(id: impl Into<String>, amount: Money, currency: impl Into<String>) -> Self {
        PaymentAttempt {
            id: id.into(),
            amount,
            currency: currency.into(),
            status: PaymentAttemptStatus::Pending,
            token: None,
            failure: None,
            created_at: Utc::now(),
            resolved_at: None,
        }
    }

    pub fn confirm(&mut self, token: impl Into<String>) {
        self.status = PaymentAttemptStatus::Confirmed;
        self.token = Some(token.into());
        self.resolved_at = Some(Utc::now());
    }

    pub fn fail(&mut self, reason: impl Into<String>) {
        self.status = PaymentAttemptStatus::Failed;
        self.failure = Some(reason.into());
        self.resolved_at = Some(Utc::now());
    }

    #[inline]
    pub fn is_pending(&self) -> bool {
        self.status == PaymentAttemptStatus::Pending
    }
}

/// Cash handed over and change returned.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct CashTender {
    pub tendered: Money,
    pub change: Money,
}

impl CashTender {
    /// `change = max(0, tendered - total)`.
    pub fn settle(tendered: Money, total: Money) -> Self {
        CashTender {
            tendered,
            change: tendered.saturating_difference(total),
        }
    }

    /// True when the customer handed over less than the total.
    pub fn is_short(&self, total: Money) -> bool {
        self.tendered < total
    }
}

// =============================================================================
// Transaction
// =============================================================================

/// A finalized sale. Built once per successful finalize, never mutated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transaction {
    pub id: String,
    pub lines: Vec<CartLine>,
    pub discount: Discount,
    pub totals: Totals,
    pub presented: PresentedTotals,
    pub jurisdiction: TaxJurisdiction,
    pub payment_method: PaymentMethod,
    pub cash: Option<CashTender>,
    pub gateway_token: Option<String>,
    pub customer_id: Option<String>,
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl Transaction {
    /// Lines the sink must turn into backorder records.
    pub fn backordered_lines(&self) -> impl Iterator<Item = &CartLine> {
        self.lines
            .iter()
            .filter(|l| l.is_backorder || l.is_partial_backorder)
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_markup_pricing_rounds_half_up() {
        let mut p = Product::new("p", "Widget", 999);
        p.pricing = PricingModel::Markup {
            cost_cents: 333,
            markup_bps: 1500,
        };
        // 333 × 15% = 49.95 → 50
        assert_eq!(p.unit_price().cents(), 383);
    }

    #[test]
    fn test_unknown_stock_counts_as_zero() {
        let p = Product::new("p", "Widget", 100);
        assert_eq!(p.available_stock(), 0);
        assert_eq!(p.with_stock(-3).available_stock(), 0);
    }

    #[test]
    fn test_address_normalization() {
        let a = Address::new("  us ", "ca", " Alameda ");
        assert_eq!(a.normalized(), Address::new("US", "CA", "ALAMEDA"));
        assert!(Address::new(" ", "", "").is_blank());
    }

    #[test]
    fn test_customer_has_address() {
        let mut c = Customer {
            id: "c1".into(),
            name: "Ada".into(),
            billing: Some(Address::default()),
            shipping: None,
        };
        assert!(!c.has_address());
        c.shipping = Some(Address::new("US", "", ""));
        assert!(c.has_address());
    }

    #[test]
    fn test_rate_from_components_sums() {
        let rate = JurisdictionRate::from_components(vec![
            TaxComponent {
                component_type: "state".into(),
                name: "California".into(),
                rate: Decimal::new(725, 2),
            },
            TaxComponent {
                component_type: "county".into(),
                name: "Alameda".into(),
                rate: Decimal::new(300, 2),
            },
        ]);
        assert_eq!(rate.total_rate, Decimal::new(1025, 2));
    }

    #[test]
    fn test_cash_tender_change() {
        let tender = CashTender::settle(Money::from_cents(5000), Money::from_cents(4374));
        assert_eq!(tender.change.cents(), 626);
        let short = CashTender::settle(Money::from_cents(4000), Money::from_cents(4374));
        assert_eq!(short.change, Money::zero());
        assert!(short.is_short(Money::from_cents(4374)));
    }

    #[test]
    fn test_payment_attempt_lifecycle() {
        let mut attempt = PaymentAttempt::pending("a1", Money::from_cents(100), "USD");
        assert!(attempt.is_pending());
        attempt.confirm("tok_1");
        assert_eq!(attempt.status, PaymentAttemptStatus::Confirmed);
        assert_eq!(attempt.token.as_deref(), Some("tok_1"));
        assert!(attempt.resolved_at.is_some());
    }

    #[test]
    fn test_payment_method_paths() {
        assert!(PaymentMethod::Cash.is_synchronous());
        assert!(PaymentMethod::Mobile.is_synchronous());
        assert!(!PaymentMethod::Card.is_synchronous());
    }
}
