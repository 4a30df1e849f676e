//! # Product Resolver
//!
//! Maps a decoded scan payload or a typed search term to a catalog product.
//!
//! ## Resolution Flow
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  payload                                                                │
//! │     │                                                                   │
//! │     ▼                                                                   │
//! │  structured record? ── id + name + price ──► Transient product          │
//! │     │                                        (no catalog lookup)        │
//! │     │ partial / plain                                                   │
//! │     ▼                                                                   │
//! │  candidate terms: raw  |  id, sku, name, barcode                        │
//! │     │                                                                   │
//! │     ▼                                                                   │
//! │  exact id → exact sku → exact barcode → name (ci) → name substring      │
//! │     │                                          (terms longer than 2)    │
//! │     ▼                                                                   │
//! │  miss ──► Unresolved { term, remote_id }                                │
//! │           the register fetches remote_id, caches it and retries         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Each rule is tried against every candidate term before the next, weaker
//! rule runs, so an exact barcode always beats a name substring.

use std::str::FromStr;

use rust_decimal::Decimal;
use serde::Deserialize;
use serde_json::Value;

use crate::error::CoreError;
use crate::money::Money;
use crate::types::{PricingModel, Product};
use crate::validation::validate_unit_price;

/// Terms this short never match by name substring.
const MIN_SUBSTRING_TERM_LEN: usize = 3;

// =============================================================================
// Structured Payloads
// =============================================================================

/// A structured record encoded in a QR code, e.g.
/// `{"id":"p-17","name":"Oil Filter","price":"12.00","sku":"OF-17"}`.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct StructuredPayload {
    #[serde(default, deserialize_with = "lenient_string")]
    pub id: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub name: Option<String>,
    #[serde(default)]
    pub price: Option<Value>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub sku: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub barcode: Option<String>,
    #[serde(default)]
    pub stock: Option<i64>,
}

/// Accepts strings and numbers (`"id": 17`), drops blanks.
fn lenient_string<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    Ok(match value {
        Some(Value::String(s)) => Some(s.trim().to_string()).filter(|s| !s.is_empty()),
        Some(Value::Number(n)) => Some(n.to_string()),
        _ => None,
    })
}

impl StructuredPayload {
    /// Parses a payload. Anything that is not a JSON object is `None`.
    pub fn parse(raw: &str) -> Option<Self> {
        let trimmed = raw.trim();
        if !trimmed.starts_with('{') {
            return None;
        }
        serde_json::from_str(trimmed).ok()
    }

    /// Price in cents, if present, numeric and a plausible unit price.
    /// Negative or oversized prices make the record incomplete.
    pub fn price_cents(&self) -> Option<i64> {
        let amount = match self.price.as_ref()? {
            Value::Number(n) => Decimal::from_str(&n.to_string()).ok()?,
            Value::String(s) => Decimal::from_str(s.trim()).ok()?,
            _ => return None,
        };
        let cents = Money::round_from_decimal(amount)?.cents();
        validate_unit_price(cents).ok()?;
        Some(cents)
    }

    /// A complete record becomes a product without touching the catalog.
    pub fn to_transient_product(&self) -> Option<Product> {
        let id = self.id.clone()?;
        let name = self.name.clone()?;
        let price_cents = self.price_cents()?;
        Some(Product {
            id,
            name,
            sku: self.sku.clone(),
            barcode: self.barcode.clone(),
            price_cents,
            pricing: PricingModel::Fixed,
            stock_quantity: self.stock,
        })
    }

    /// Fields usable as lookup terms, strongest first.
    fn candidate_terms(&self) -> Vec<String> {
        [&self.id, &self.sku, &self.name, &self.barcode]
            .into_iter()
            .flatten()
            .cloned()
            .collect()
    }
}

// =============================================================================
// Resolution
// =============================================================================

/// How a product was found.
#[derive(Debug, Clone, PartialEq)]
pub enum Resolved {
    /// Found in the catalog snapshot.
    Catalog(Product),
    /// Synthesized from a complete structured record.
    Transient(Product),
}

impl Resolved {
    pub fn product(&self) -> &Product {
        match self {
            Resolved::Catalog(p) | Resolved::Transient(p) => p,
        }
    }

    pub fn into_product(self) -> Product {
        match self {
            Resolved::Catalog(p) | Resolved::Transient(p) => p,
        }
    }
}

/// Nothing matched locally.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Unresolved {
    /// The term reported back to the operator.
    pub term: String,
    /// Structured id worth a remote single-product fetch.
    pub remote_id: Option<String>,
}

impl From<Unresolved> for CoreError {
    fn from(miss: Unresolved) -> Self {
        CoreError::ProductNotFound { term: miss.term }
    }
}

/// A match rule of the resolution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum MatchRule {
    Id,
    Sku,
    Barcode,
    NameExact,
    NameSubstring,
}

const RESOLUTION_ORDER: [MatchRule; 5] = [
    MatchRule::Id,
    MatchRule::Sku,
    MatchRule::Barcode,
    MatchRule::NameExact,
    MatchRule::NameSubstring,
];

impl MatchRule {
    fn matches(self, product: &Product, term: &str, term_lower: &str) -> bool {
        match self {
            MatchRule::Id => product.id == term,
            MatchRule::Sku => product.sku.as_deref() == Some(term),
            MatchRule::Barcode => product.barcode.as_deref() == Some(term),
            MatchRule::NameExact => product.name.to_lowercase() == term_lower,
            MatchRule::NameSubstring => {
                term.chars().count() >= MIN_SUBSTRING_TERM_LEN
                    && product.name.to_lowercase().contains(term_lower)
            }
        }
    }
}

/// Resolves `input` against a catalog snapshot.
///
/// ## Example
/// ```rust
/// use tessera_core::resolver::{resolve, Resolved};
/// use tessera_core::Product;
///
/// let catalog = vec![Product::new("p1", "Cola 330ml", 199).with_barcode("5449000000996")];
/// let hit = resolve("5449000000996", &catalog).unwrap();
/// assert!(matches!(hit, Resolved::Catalog(p) if p.id == "p1"));
/// ```
pub fn resolve(input: &str, catalog: &[Product]) -> Result<Resolved, Unresolved> {
    let raw = input.trim();
    let structured = StructuredPayload::parse(raw);

    if let Some(product) = structured.as_ref().and_then(|s| s.to_transient_product()) {
        return Ok(Resolved::Transient(product));
    }

    let terms = match &structured {
        Some(payload) => {
            let terms = payload.candidate_terms();
            if terms.is_empty() {
                vec![raw.to_string()]
            } else {
                terms
            }
        }
        None => vec![raw.to_string()],
    };

    if let Some(product) = find_by_terms(&terms, catalog) {
        return Ok(Resolved::Catalog(product.clone()));
    }

    Err(Unresolved {
        term: terms.into_iter().next().unwrap_or_default(),
        remote_id: structured.and_then(|s| s.id),
    })
}

/// Runs the resolution order over a list of candidate terms.
pub fn find_by_terms<'a>(terms: &[String], catalog: &'a [Product]) -> Option<&'a Product> {
    let prepared: Vec<(&str, String)> = terms
        .iter()
        .map(|t| t.trim())
        .filter(|t| !t.is_empty())
        .map(|t| (t, t.to_lowercase()))
        .collect();

    RESOLUTION_ORDER.iter().find_map(|rule| {
        prepared.iter().find_map(|(term, lower)| {
            catalog
                .iter()
                .find(|product| rule.matches(product, term, lower))
        })
    })
}

// =============================================================================
// Unit Tests
// =============================================================================
