//! # Tax Resolver Service
//!
//! Answers the rate-table queries the jurisdiction waterfall asks for, and
//! keeps checkout moving when the tax settings store does not answer.
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        Tax Resolution                                   │
//! │                                                                         │
//! │  PartySelection ──► CustomerDirectory ──► Party                         │
//! │                      (failure: no address on file + warning)           │
//! │                                                                         │
//! │  Party + business location + override ──► tessera_core::tax::plan       │
//! │                                                                         │
//! │     Settled ─────────────────────────────────────────► jurisdiction    │
//! │     Lookup(query) ──► session cache ──► TaxSettingsStore                │
//! │                         hit │               │ ok        │ error         │
//! │                             ▼               ▼           ▼               │
//! │                        jurisdiction    jurisdiction   last business     │
//! │                                        (cached)       default + warning │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! The cache lives for one checkout session. Fallback answers are never
//! cached, so the next recompute asks the store again.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use tessera_core::tax::{business_default_query, plan, ManualOverride, Party, RateQuery, TaxContext, TaxPlan};
use tessera_core::{Address, Customer, JurisdictionSource, TaxJurisdiction};

use crate::ports::{CustomerDirectory, TaxSettingsStore};

// =============================================================================
// Party Selection
// =============================================================================

/// What the operator picked in the customer selector.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "kind", content = "id")]
pub enum PartySelection {
    /// Nothing picked yet. Tax stays at zero.
    #[default]
    None,
    WalkIn,
    Customer(String),
}

impl PartySelection {
    pub fn customer_id(&self) -> Option<&str> {
        match self {
            PartySelection::Customer(id) => Some(id),
            _ => None,
        }
    }
}

// =============================================================================
// Warnings & Status
// =============================================================================

/// A non-fatal tax condition shown to the operator as a toast.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "kind")]
pub enum TaxWarning {
    /// The rate table did not answer; the business default was used.
    LookupFailed {
        address: Address,
        reason: String,
        fallback_rate: Decimal,
    },
    /// The customer record could not be loaded; taxed as if no address is
    /// on file.
    CustomerUnavailable { customer_id: String, reason: String },
}

impl fmt::Display for TaxWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TaxWarning::LookupFailed {
                reason,
                fallback_rate,
                ..
            } => write!(
                f,
                "Tax rate lookup failed ({}); using business default {}%",
                reason, fallback_rate
            ),
            TaxWarning::CustomerUnavailable {
                customer_id,
                reason,
            } => write!(
                f,
                "Customer {} could not be loaded ({}); using business location",
                customer_id, reason
            ),
        }
    }
}

/// Whether the active checkout's jurisdiction is known yet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TaxStatus {
    /// Inputs changed and resolution has not finished. Totals use 0%.
    Pending,
    Settled(TaxJurisdiction),
}

impl TaxStatus {
    /// The rate totals should use right now.
    pub fn rate(&self) -> Decimal {
        match self {
            TaxStatus::Pending => Decimal::ZERO,
            TaxStatus::Settled(j) => j.total_rate,
        }
    }

    pub fn jurisdiction(&self) -> Option<&TaxJurisdiction> {
        match self {
            TaxStatus::Pending => None,
            TaxStatus::Settled(j) => Some(j),
        }
    }

    pub fn is_settled(&self) -> bool {
        matches!(self, TaxStatus::Settled(_))
    }
}

/// Outcome of one waterfall run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaxResolution {
    pub jurisdiction: TaxJurisdiction,
    pub warnings: Vec<TaxWarning>,
}

// =============================================================================
// Tax Resolver
// =============================================================================

pub struct TaxResolver {
    settings: Arc<dyn TaxSettingsStore>,
    customers: Arc<dyn CustomerDirectory>,
    business_location: Address,
    manual_override: Option<ManualOverride>,
    last_business_default: Option<TaxJurisdiction>,
    session: HashMap<RateQuery, TaxJurisdiction>,
}

impl TaxResolver {
    pub fn new(
        settings: Arc<dyn TaxSettingsStore>,
        customers: Arc<dyn CustomerDirectory>,
        business_location: Address,
        manual_override: Option<ManualOverride>,
    ) -> Self {
        TaxResolver {
            settings,
            customers,
            business_location,
            manual_override,
            last_business_default: None,
            session: HashMap::new(),
        }
    }

    pub fn business_location(&self) -> &Address {
        &self.business_location
    }

    /// Moves the business. The previous business default stays the
    /// fallback until a lookup for the new location succeeds.
    pub fn set_business_location(&mut self, location: Address) {
        info!(?location, "Business location changed");
        self.business_location = location;
        self.session.clear();
    }

    pub fn manual_override(&self) -> Option<&ManualOverride> {
        self.manual_override.as_ref()
    }

    pub fn set_manual_override(&mut self, manual_override: Option<ManualOverride>) {
        self.manual_override = manual_override;
    }

    /// The fallback used when a lookup fails.
    pub fn last_business_default(&self) -> Option<&TaxJurisdiction> {
        self.last_business_default.as_ref()
    }

    /// Loads the business's own jurisdiction so later failures have a
    /// fallback. Call at session start.
    pub async fn prime_business_default(&mut self) -> TaxResolution {
        let query = business_default_query(&self.business_location);
        let (jurisdiction, warning) = self.lookup(query).await;
        TaxResolution {
            jurisdiction,
            warnings: warning.into_iter().collect(),
        }
    }

    /// Drops everything cached for the active checkout.
    pub fn reset_session(&mut self) {
        debug!(entries = self.session.len(), "Tax session cache cleared");
        self.session.clear();
    }

    /// Runs the full waterfall for `selection`.
    pub async fn resolve(&mut self, selection: &PartySelection) -> TaxResolution {
        let mut warnings = Vec::new();

        let party = match selection {
            PartySelection::None => None,
            PartySelection::WalkIn => Some(Party::WalkIn),
            PartySelection::Customer(id) => {
                let (customer, warning) = self.load_customer(id).await;
                warnings.extend(warning);
                Some(Party::Customer(customer))
            }
        };

        let ctx = TaxContext {
            party: party.as_ref(),
            business_location: &self.business_location,
            manual_override: self.manual_override.as_ref(),
        };

        let jurisdiction = match plan(&ctx) {
            TaxPlan::Settled(jurisdiction) => jurisdiction,
            TaxPlan::Lookup(query) => {
                let (jurisdiction, warning) = self.lookup(query).await;
                warnings.extend(warning);
                jurisdiction
            }
        };

        debug!(
            source = ?jurisdiction.source,
            rate = %jurisdiction.total_rate,
            warnings = warnings.len(),
            "Tax jurisdiction resolved"
        );

        TaxResolution {
            jurisdiction,
            warnings,
        }
    }

    async fn load_customer(&self, id: &str) -> (Customer, Option<TaxWarning>) {
        let reason = match self.customers.customer(id).await {
            Ok(Some(customer)) => return (customer, None),
            Ok(None) => "not found".to_string(),
            Err(e) => e.to_string(),
        };

        warn!(customer_id = %id, %reason, "Customer lookup failed, treating as no address on file");
        let placeholder = Customer {
            id: id.to_string(),
            name: id.to_string(),
            billing: None,
            shipping: None,
        };
        let warning = TaxWarning::CustomerUnavailable {
            customer_id: id.to_string(),
            reason,
        };
        (placeholder, Some(warning))
    }

    async fn lookup(&mut self, query: RateQuery) -> (TaxJurisdiction, Option<TaxWarning>) {
        if let Some(cached) = self.session.get(&query) {
            return (cached.clone(), None);
        }

        match self.settings.rate(&query.address).await {
            Ok(rate) => {
                if rate.is_none() {
                    debug!(address = ?query.address, "No rate configured, taxing at 0%");
                }
                let jurisdiction = query.settle(rate);
                if query.is_business_default() {
                    self.last_business_default = Some(jurisdiction.clone());
                }
                self.session.insert(query, jurisdiction.clone());
                (jurisdiction, None)
            }
            Err(e) => {
                let fallback = self.fallback();
                warn!(
                    address = ?query.address,
                    error = %e,
                    fallback_rate = %fallback.total_rate,
                    "Tax lookup failed, falling back to business default"
                );
                let warning = TaxWarning::LookupFailed {
                    address: query.address,
                    reason: e.to_string(),
                    fallback_rate: fallback.total_rate,
                };
                (fallback, Some(warning))
            }
        }
    }

    fn fallback(&self) -> TaxJurisdiction {
        self.last_business_default.clone().unwrap_or_else(|| {
            TaxJurisdiction::zero_rated(
                &self.business_location.normalized(),
                JurisdictionSource::BusinessDefault,
            )
        })
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::{MemoryCustomers, MemoryTaxSettings};
    use tessera_core::JurisdictionRate;

    fn business() -> Address {
        Address::new("US", "CA", "Alameda")
    }

    fn rate(percent: i64) -> JurisdictionRate {
        JurisdictionRate::flat(Decimal::new(percent, 0))
    }

    fn resolver(settings: Arc<MemoryTaxSettings>, customers: Arc<MemoryCustomers>) -> TaxResolver {
        TaxResolver::new(settings, customers, business(), None)
    }

    #[tokio::test]
    async fn test_no_party_is_zero_without_lookup() {
        let settings = Arc::new(MemoryTaxSettings::new().with_rate(business(), rate(8)));
        let mut tax = resolver(settings.clone(), Arc::new(MemoryCustomers::new()));

        let resolution = tax.resolve(&PartySelection::None).await;
        assert!(resolution.jurisdiction.total_rate.is_zero());
        assert_eq!(resolution.jurisdiction.source, JurisdictionSource::None);
        assert_eq!(settings.calls(), 0);
    }

    #[tokio::test]
    async fn test_walk_in_uses_business_default() {
        let settings = Arc::new(MemoryTaxSettings::new().with_rate(business(), rate(8)));
        let mut tax = resolver(settings, Arc::new(MemoryCustomers::new()));

        let resolution = tax.resolve(&PartySelection::WalkIn).await;
        assert_eq!(resolution.jurisdiction.total_rate, Decimal::new(8, 0));
        assert_eq!(resolution.jurisdiction.source, JurisdictionSource::BusinessDefault);
        assert!(resolution.warnings.is_empty());
        assert!(tax.last_business_default().is_some());
    }

    #[tokio::test]
    async fn test_export_is_zero_even_with_configured_rate() {
        let abroad = Address::new("ca", "ON", "");
        let settings = Arc::new(
            MemoryTaxSettings::new()
                .with_rate(business(), rate(8))
                .with_rate(abroad.clone(), rate(13)),
        );
        let customers = Arc::new(MemoryCustomers::new().with_customer(Customer {
            id: "c-1".into(),
            name: "Northern Parts".into(),
            billing: Some(abroad),
            shipping: None,
        }));
        let mut tax = resolver(settings.clone(), customers);

        let resolution = tax.resolve(&PartySelection::Customer("c-1".into())).await;
        assert!(resolution.jurisdiction.total_rate.is_zero());
        assert_eq!(
            resolution.jurisdiction.source,
            JurisdictionSource::InternationalExport
        );
        assert_eq!(settings.calls(), 0);
    }

    #[tokio::test]
    async fn test_lookup_failure_falls_back_with_warning() {
        let settings = Arc::new(MemoryTaxSettings::new().with_rate(business(), rate(8)));
        let customers = Arc::new(MemoryCustomers::new().with_customer(Customer {
            id: "c-2".into(),
            name: "Bay Garage".into(),
            billing: Some(Address::new("US", "CA", "Marin")),
            shipping: None,
        }));
        let mut tax = resolver(settings.clone(), customers);
        tax.prime_business_default().await;

        settings.set_failing(true);
        let resolution = tax.resolve(&PartySelection::Customer("c-2".into())).await;

        assert_eq!(resolution.jurisdiction.total_rate, Decimal::new(8, 0));
        assert_eq!(resolution.jurisdiction.source, JurisdictionSource::BusinessDefault);
        assert!(matches!(
            resolution.warnings.as_slice(),
            [TaxWarning::LookupFailed { fallback_rate, .. }] if *fallback_rate == Decimal::new(8, 0)
        ));
    }

    #[tokio::test]
    async fn test_location_change_keeps_fallback_until_reprimed() {
        let marin = Address::new("US", "CA", "Marin");
        let settings = Arc::new(
            MemoryTaxSettings::new()
                .with_rate(business(), rate(8))
                .with_rate(marin.clone(), rate(9)),
        );
        let mut tax = resolver(settings.clone(), Arc::new(MemoryCustomers::new()));
        tax.prime_business_default().await;

        tax.set_business_location(marin);
        settings.set_failing(true);
        let resolution = tax.resolve(&PartySelection::WalkIn).await;

        assert_eq!(resolution.jurisdiction.total_rate, Decimal::new(8, 0));
        assert!(matches!(
            resolution.warnings.as_slice(),
            [TaxWarning::LookupFailed { fallback_rate, .. }] if *fallback_rate == Decimal::new(8, 0)
        ));

        settings.set_failing(false);
        tax.prime_business_default().await;
        assert_eq!(
            tax.last_business_default().unwrap().total_rate,
            Decimal::new(9, 0)
        );
    }

    #[tokio::test]
    async fn test_failure_without_primed_default_is_zero() {
        let settings = Arc::new(MemoryTaxSettings::new());
        settings.set_failing(true);
        let mut tax = resolver(settings, Arc::new(MemoryCustomers::new()));

        let resolution = tax.resolve(&PartySelection::WalkIn).await;
        assert!(resolution.jurisdiction.total_rate.is_zero());
        assert_eq!(resolution.warnings.len(), 1);
    }

    #[tokio::test]
    async fn test_missing_customer_degrades_to_business_location() {
        let settings = Arc::new(MemoryTaxSettings::new().with_rate(business(), rate(8)));
        let mut tax = resolver(settings, Arc::new(MemoryCustomers::new()));

        let resolution = tax.resolve(&PartySelection::Customer("ghost".into())).await;
        assert_eq!(resolution.jurisdiction.source, JurisdictionSource::BusinessDefault);
        assert_eq!(resolution.jurisdiction.total_rate, Decimal::new(8, 0));
        assert!(matches!(
            resolution.warnings.as_slice(),
            [TaxWarning::CustomerUnavailable { customer_id, .. }] if customer_id == "ghost"
        ));
    }

    #[tokio::test]
    async fn test_session_cache_is_idempotent_and_resettable() {
        let settings = Arc::new(MemoryTaxSettings::new().with_rate(business(), rate(8)));
        let mut tax = resolver(settings.clone(), Arc::new(MemoryCustomers::new()));

        let first = tax.resolve(&PartySelection::WalkIn).await;
        let second = tax.resolve(&PartySelection::WalkIn).await;
        assert_eq!(first, second);
        assert_eq!(settings.calls(), 1);

        tax.reset_session();
        let third = tax.resolve(&PartySelection::WalkIn).await;
        assert_eq!(third, first);
        assert_eq!(settings.calls(), 2);
    }

    #[tokio::test]
    async fn test_manual_override_skips_table() {
        let settings = Arc::new(MemoryTaxSettings::new().with_rate(business(), rate(8)));
        let mut tax = resolver(settings.clone(), Arc::new(MemoryCustomers::new()));
        tax.set_manual_override(Some(ManualOverride::new(Decimal::new(5, 0))));

        let resolution = tax.resolve(&PartySelection::WalkIn).await;
        assert_eq!(resolution.jurisdiction.total_rate, Decimal::new(5, 0));
        assert_eq!(resolution.jurisdiction.source, JurisdictionSource::ManualOverride);
        assert_eq!(settings.calls(), 0);
    }

    #[test]
    fn test_pending_status_uses_zero_rate() {
        assert!(TaxStatus::Pending.rate().is_zero());
        assert!(!TaxStatus::Pending.is_settled());
    }
}
