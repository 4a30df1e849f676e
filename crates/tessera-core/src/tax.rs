//! # Jurisdiction Waterfall
//!
//! Decides which jurisdiction governs a sale. This module is the pure half of
//! the tax resolver: it either settles the jurisdiction outright or names the
//! one rate-table query that would settle it. The register performs the
//! query and handles lookup failures.
//!
//! ## Waterfall (first applicable rule wins)
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  1. no party selected ─────────────────────► 0%  source=none            │
//! │                                                                         │
//! │  2. walk-in / no address on file ──────────► query business location    │
//! │                                               source=business_default   │
//! │                                                                         │
//! │  3. party address = billing, per-field fallback to shipping,            │
//! │     normalized (trimmed, uppercase)                                     │
//! │                                                                         │
//! │  4. party country ≠ business country ──────► 0%  international_export   │
//! │     (both non-empty)                                                    │
//! │                                                                         │
//! │  5. query (country, state, county) ────────► customer_billing |         │
//! │                                               customer_shipping         │
//! │                                                                         │
//! │  6. manual override replaces the result of 2 and 5 only; the zero-rate  │
//! │     gates of 1 and 4 always win                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::types::{
    normalize_field, Address, Customer, JurisdictionRate, JurisdictionSource, TaxComponent,
    TaxJurisdiction,
};

// =============================================================================
// Inputs
// =============================================================================

/// The selected counterparty of a sale.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "kind")]
pub enum Party {
    /// Explicit "walk-in" selection, no customer record.
    WalkIn,
    Customer(Customer),
}

/// A configured flat rate that replaces table lookups.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ManualOverride {
    /// Percentage.
    pub rate: Decimal,
    #[serde(default = "default_override_label")]
    pub label: String,
}

fn default_override_label() -> String {
    "Manual override".to_string()
}

impl ManualOverride {
    pub fn new(rate: Decimal) -> Self {
        ManualOverride {
            rate,
            label: default_override_label(),
        }
    }

    fn jurisdiction_at(&self, address: &Address) -> TaxJurisdiction {
        TaxJurisdiction {
            country: address.country.clone(),
            state: address.state.clone(),
            county: address.county.clone(),
            components: vec![TaxComponent {
                component_type: "override".to_string(),
                name: self.label.clone(),
                rate: self.rate,
            }],
            total_rate: self.rate,
            source: JurisdictionSource::ManualOverride,
        }
    }
}

/// Everything the waterfall reads.
#[derive(Debug, Clone, Copy)]
pub struct TaxContext<'a> {
    pub party: Option<&'a Party>,
    pub business_location: &'a Address,
    pub manual_override: Option<&'a ManualOverride>,
}

// =============================================================================
// Address Sources
// =============================================================================

/// One address the party address may be drawn from.
#[derive(Debug, Clone, Copy)]
pub struct AddressSource<'a> {
    pub source: JurisdictionSource,
    pub address: &'a Address,
}

/// A party address assembled from an ordered list of sources.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MergedAddress {
    /// Normalized.
    pub address: Address,
    /// The highest-priority source that contributed a field.
    pub source: JurisdictionSource,
}

/// Builds the party address field by field: each field takes the first
/// non-empty normalized value in `sources` order.
///
/// Returns `None` when no source contributes anything.
pub fn merge_address_sources(sources: &[AddressSource<'_>]) -> Option<MergedAddress> {
    let country = first_non_empty(sources, |a| &a.country);
    let state = first_non_empty(sources, |a| &a.state);
    let county = first_non_empty(sources, |a| &a.county);

    let first = [&country, &state, &county]
        .into_iter()
        .flatten()
        .map(|(index, _)| *index)
        .min()?;

    let value = |field: Option<(usize, String)>| field.map(|(_, v)| v).unwrap_or_default();
    Some(MergedAddress {
        address: Address {
            country: value(country),
            state: value(state),
            county: value(county),
        },
        source: sources[first].source,
    })
}

/// Index of the first source with a non-empty value for `field`, and that
/// value normalized.
fn first_non_empty(
    sources: &[AddressSource<'_>],
    field: impl Fn(&Address) -> &str,
) -> Option<(usize, String)> {
    sources.iter().enumerate().find_map(|(index, source)| {
        let value = normalize_field(field(source.address));
        (!value.is_empty()).then_some((index, value))
    })
}

/// Billing first, shipping second.
pub fn customer_address_sources(customer: &Customer) -> Vec<AddressSource<'_>> {
    let mut sources = Vec::with_capacity(2);
    if let Some(billing) = &customer.billing {
        sources.push(AddressSource {
            source: JurisdictionSource::CustomerBilling,
            address: billing,
        });
    }
    if let Some(shipping) = &customer.shipping {
        sources.push(AddressSource {
            source: JurisdictionSource::CustomerShipping,
            address: shipping,
        });
    }
    sources
}

// =============================================================================
// Plan
// =============================================================================

/// A rate-table query the waterfall needs answered.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RateQuery {
    /// Normalized.
    pub address: Address,
    pub source: JurisdictionSource,
}

impl RateQuery {
    /// Completes the query with the rate table's answer. `None` means the
    /// table has no entry ("not configured"): the sale is taxed at 0%.
    pub fn settle(&self, rate: Option<JurisdictionRate>) -> TaxJurisdiction {
        match rate {
            Some(rate) => TaxJurisdiction {
                country: self.address.country.clone(),
                state: self.address.state.clone(),
                county: self.address.county.clone(),
                components: rate.components,
                total_rate: rate.total_rate,
                source: self.source,
            },
            None => TaxJurisdiction::zero_rated(&self.address, self.source),
        }
    }

    pub fn is_business_default(&self) -> bool {
        self.source == JurisdictionSource::BusinessDefault
    }
}

/// Outcome of running the waterfall without I/O.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TaxPlan {
    /// No lookup needed.
    Settled(TaxJurisdiction),
    /// One rate-table query decides the jurisdiction.
    Lookup(RateQuery),
}

/// Runs the jurisdiction waterfall.
///
/// ## Example
/// ```rust
/// use tessera_core::tax::{plan, TaxContext, TaxPlan};
/// use tessera_core::{Address, JurisdictionSource};
///
/// let business = Address::new("US", "CA", "Alameda");
/// let ctx = TaxContext { party: None, business_location: &business, manual_override: None };
/// let TaxPlan::Settled(j) = plan(&ctx) else { unreachable!() };
/// assert_eq!(j.source, JurisdictionSource::None);
/// assert!(j.total_rate.is_zero());
/// ```
pub fn plan(ctx: &TaxContext<'_>) -> TaxPlan {
    let business = ctx.business_location.normalized();

    // 1. No party: deliberate gate, nothing is computed.
    let Some(party) = ctx.party else {
        return TaxPlan::Settled(TaxJurisdiction::none());
    };

    // 3. Party address from billing with per-field shipping fallback.
    let merged = match party {
        Party::WalkIn => None,
        Party::Customer(customer) => merge_address_sources(&customer_address_sources(customer)),
    };

    // 2. Walk-in or no address on file.
    let Some(merged) = merged else {
        return match ctx.manual_override {
            Some(manual) => TaxPlan::Settled(manual.jurisdiction_at(&business)),
            None => TaxPlan::Lookup(RateQuery {
                address: business,
                source: JurisdictionSource::BusinessDefault,
            }),
        };
    };

    // 4. Cross-border: zero-rated export, overrides do not apply.
    if is_export(&merged.address, &business) {
        return TaxPlan::Settled(TaxJurisdiction::zero_rated(
            &merged.address,
            JurisdictionSource::InternationalExport,
        ));
    }

    // 5 / 6.
    match ctx.manual_override {
        Some(manual) => TaxPlan::Settled(manual.jurisdiction_at(&merged.address)),
        None => TaxPlan::Lookup(RateQuery {
            address: merged.address,
            source: merged.source,
        }),
    }
}

/// Both countries set and different. Inputs must already be normalized.
pub fn is_export(party: &Address, business: &Address) -> bool {
    !party.country.is_empty() && !business.country.is_empty() && party.country != business.country
}

/// The query that loads the business's own rate.
pub fn business_default_query(business_location: &Address) -> RateQuery {
    RateQuery {
        address: business_location.normalized(),
        source: JurisdictionSource::BusinessDefault,
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
