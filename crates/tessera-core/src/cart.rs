//! # Cart
//!
//! The ordered set of line items for the sale in progress, and the stock
//! policy that guards every add.
//!
//! ## Stock Policy on Add
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  add(product, qty)                                                      │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  stock = product.stock_quantity (unknown → 0)                           │
//! │       │                                                                 │
//! │       ├── stock == 0 ───────────────► NeedsDecision(OutOfStock)         │
//! │       │                                  accept → is_backorder          │
//! │       │                                                                 │
//! │       ├── existing + qty > stock ───► NeedsDecision(Overage)            │
//! │       │                                  accept → is_partial_backorder  │
//! │       │                                           backorder_qty = over  │
//! │       │                                                                 │
//! │       └── otherwise ────────────────► Added                             │
//! │                                                                         │
//! │  decline → StockPolicyDeclined, cart untouched                          │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Invariants
//! - At most one line per product id (adding again merges)
//! - Every line has quantity >= 1; setting 0 or less removes it
//! - Line totals are computed on demand, never stored

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use ts_rs::TS;

use crate::error::{CoreError, CoreResult};
use crate::money::Money;
use crate::types::Product;
use crate::validation::{validate_cart_size, validate_quantity, validate_unit_price};
use crate::{MAX_CART_ITEMS, MAX_ITEM_QUANTITY};

// =============================================================================
// Cart Line
// =============================================================================

/// One product in the cart.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct CartLine {
    /// Frozen copy of the product at the time it was first added.
    pub product: Product,

    /// Unit price pinned at add time.
    pub unit_price: Money,

    pub quantity: i64,

    /// Added while the product had no stock at all.
    pub is_backorder: bool,

    /// Added beyond the available stock.
    pub is_partial_backorder: bool,

    /// Units to fulfil later.
    pub backorder_quantity: i64,

    #[ts(as = "String")]
    pub added_at: DateTime<Utc>,
}

impl CartLine {
    fn from_product(product: &Product, quantity: i64) -> Self {
        CartLine {
            unit_price: product.unit_price(),
            product: product.clone(),
            quantity,
            is_backorder: false,
            is_partial_backorder: false,
            backorder_quantity: 0,
            added_at: Utc::now(),
        }
    }

    #[inline]
    pub fn product_id(&self) -> &str {
        &self.product.id
    }

    /// `unit_price × quantity`.
    #[inline]
    pub fn line_total(&self) -> Money {
        self.unit_price.multiply_quantity(self.quantity)
    }

    fn refresh_partial_backorder(&mut self) {
        if self.is_backorder {
            self.backorder_quantity = self.quantity;
            return;
        }
        if self.is_partial_backorder {
            let over = (self.quantity - self.product.available_stock()).max(0);
            self.backorder_quantity = over;
            self.is_partial_backorder = over > 0;
        }
    }
}

// =============================================================================
// Stock Decisions
// =============================================================================

/// Why an add needs the operator's confirmation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "kind")]
pub enum StockShortfall {
    /// The product has no stock.
    OutOfStock,
    /// The merged quantity exceeds stock by `overage` units.
    Overage { available: i64, overage: i64 },
}

/// An add suspended on a backorder prompt. Hand it back to
/// [`Cart::resume`] with the operator's answer.
#[derive(Debug, Clone, PartialEq)]
#[must_use = "a pending add does nothing until resumed"]
pub struct PendingDecision {
    product: Product,
    quantity: i64,
    shortfall: StockShortfall,
}

impl PendingDecision {
    pub fn product(&self) -> &Product {
        &self.product
    }

    pub fn quantity(&self) -> i64 {
        self.quantity
    }

    pub fn shortfall(&self) -> StockShortfall {
        self.shortfall
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Decision {
    Accept,
    Decline,
}

/// Result of [`Cart::add`].
#[derive(Debug, Clone, PartialEq)]
#[must_use]
pub enum AddOutcome {
    Added,
    NeedsDecision(PendingDecision),
}

// =============================================================================
// Cart
// =============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Cart {
    lines: Vec<CartLine>,
    created_at: DateTime<Utc>,
}

impl Cart {
    pub fn new() -> Self {
        Cart {
            lines: Vec::new(),
            created_at: Utc::now(),
        }
    }

    /// Adds `quantity` of `product`, merging into an existing line.
    ///
    /// Returns `NeedsDecision` when the stock policy wants confirmation; the
    /// cart is not touched until the decision is resumed.
    pub fn add(&mut self, product: &Product, quantity: i64) -> CoreResult<AddOutcome> {
        let merged = self.check_limits(product, quantity)?;

        match shortfall_for(product, merged) {
            Some(shortfall) => Ok(AddOutcome::NeedsDecision(PendingDecision {
                product: product.clone(),
                quantity,
                shortfall,
            })),
            None => {
                self.apply(product, quantity, None);
                Ok(AddOutcome::Added)
            }
        }
    }

    /// Completes a suspended add.
    ///
    /// Decline aborts with `StockPolicyDeclined` and no mutation. On accept
    /// the shortfall is measured again against the current cart, so a line
    /// edited while the prompt was open is flagged by what it holds now.
    pub fn resume(&mut self, pending: PendingDecision, decision: Decision) -> CoreResult<()> {
        if decision == Decision::Decline {
            return Err(CoreError::StockPolicyDeclined {
                product_id: pending.product.id,
            });
        }

        let merged = self.check_limits(&pending.product, pending.quantity)?;
        let shortfall = shortfall_for(&pending.product, merged);
        self.apply(&pending.product, pending.quantity, shortfall);
        Ok(())
    }

    /// Sets a line's quantity. `quantity <= 0` removes the line.
    pub fn update_quantity(&mut self, product_id: &str, quantity: i64) -> CoreResult<()> {
        if quantity <= 0 {
            return self.remove(product_id).map(|_| ());
        }

        if quantity > MAX_ITEM_QUANTITY {
            return Err(CoreError::QuantityTooLarge {
                requested: quantity,
                max: MAX_ITEM_QUANTITY,
            });
        }

        let line = self
            .lines
            .iter_mut()
            .find(|l| l.product.id == product_id)
            .ok_or_else(|| CoreError::LineNotInCart(product_id.to_string()))?;
        line.quantity = quantity;
        line.refresh_partial_backorder();
        Ok(())
    }

    /// Removes and returns a line.
    pub fn remove(&mut self, product_id: &str) -> CoreResult<CartLine> {
        let index = self
            .lines
            .iter()
            .position(|l| l.product.id == product_id)
            .ok_or_else(|| CoreError::LineNotInCart(product_id.to_string()))?;
        Ok(self.lines.remove(index))
    }

    pub fn clear(&mut self) {
        self.lines.clear();
        self.created_at = Utc::now();
    }

    pub fn lines(&self) -> &[CartLine] {
        &self.lines
    }

    pub fn line(&self, product_id: &str) -> Option<&CartLine> {
        self.lines.iter().find(|l| l.product.id == product_id)
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    /// Number of distinct lines.
    pub fn item_count(&self) -> usize {
        self.lines.len()
    }

    /// Units across all lines.
    pub fn total_quantity(&self) -> i64 {
        self.lines.iter().map(|l| l.quantity).sum()
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    // -------------------------------------------------------------------------
    // Internals
    // -------------------------------------------------------------------------

    /// Validates an add and returns the merged line quantity.
    fn check_limits(&self, product: &Product, quantity: i64) -> CoreResult<i64> {
        validate_quantity(quantity)?;
        validate_unit_price(product.unit_price().cents())?;

        let existing = self.line(&product.id).map(|l| l.quantity);
        if existing.is_none() {
            validate_cart_size(self.lines.len()).map_err(|_| CoreError::CartTooLarge {
                max: MAX_CART_ITEMS,
            })?;
        }

        let merged = existing.unwrap_or(0) + quantity;
        if merged > MAX_ITEM_QUANTITY {
            return Err(CoreError::QuantityTooLarge {
                requested: merged,
                max: MAX_ITEM_QUANTITY,
            });
        }
        Ok(merged)
    }

    fn apply(&mut self, product: &Product, quantity: i64, accepted: Option<StockShortfall>) {
        let index = match self.lines.iter().position(|l| l.product.id == product.id) {
            Some(index) => {
                self.lines[index].quantity += quantity;
                index
            }
            None => {
                self.lines.push(CartLine::from_product(product, quantity));
                self.lines.len() - 1
            }
        };

        let line = &mut self.lines[index];
        match accepted {
            Some(StockShortfall::OutOfStock) => {
                line.is_backorder = true;
                line.backorder_quantity = line.quantity;
            }
            Some(StockShortfall::Overage { available, .. }) => {
                if line.is_backorder {
                    line.backorder_quantity = line.quantity;
                } else {
                    line.is_partial_backorder = true;
                    line.backorder_quantity = (line.quantity - available).max(0);
                }
            }
            None => {
                if line.is_backorder {
                    line.backorder_quantity = line.quantity;
                }
            }
        }
    }
}

/// Stock shortfall for a line that would hold `merged` units.
fn shortfall_for(product: &Product, merged: i64) -> Option<StockShortfall> {
    let stock = product.available_stock();
    if stock == 0 {
        Some(StockShortfall::OutOfStock)
    } else if merged > stock {
        Some(StockShortfall::Overage {
            available: stock,
            overage: merged - stock,
        })
    } else {
        None
    }
}

impl Default for Cart {
    fn default() -> Self {
        Self::new()
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn product(id: &str, price_cents: i64, stock: i64) -> Product {
        Product::new(id, format!("Product {}", id), price_cents).with_stock(stock)
    }

    #[test]
    fn test_add_merges_by_product_id() {
        let mut cart = Cart::new();
        let p = product("1", 999, 50);

        assert_eq!(cart.add(&p, 2).unwrap(), AddOutcome::Added);
        assert_eq!(cart.add(&p, 3).unwrap(), AddOutcome::Added);

        assert_eq!(cart.item_count(), 1);
        assert_eq!(cart.total_quantity(), 5);
        assert_eq!(cart.lines()[0].line_total().cents(), 4995);
    }

    #[test]
    fn test_price_is_pinned_at_add() {
        let mut cart = Cart::new();
        let mut p = product("1", 1000, 10);
        let _ = cart.add(&p, 1).unwrap();

        p.price_cents = 5000;
        let _ = cart.add(&p, 1).unwrap();
        assert_eq!(cart.lines()[0].unit_price.cents(), 1000);
        assert_eq!(cart.lines()[0].line_total().cents(), 2000);
    }

    #[test]
    fn test_out_of_stock_decline_leaves_cart_unchanged() {
        let mut cart = Cart::new();
        let _ = cart.add(&product("a", 100, 5), 1).unwrap();
        let before = cart.clone();

        let AddOutcome::NeedsDecision(pending) = cart.add(&product("z", 100, 0), 1).unwrap() else {
            panic!("expected a backorder prompt");
        };
        assert_eq!(pending.shortfall(), StockShortfall::OutOfStock);

        let err = cart.resume(pending, Decision::Decline).unwrap_err();
        assert!(matches!(err, CoreError::StockPolicyDeclined { .. }));
        assert_eq!(cart, before);
        assert_eq!(cart.item_count(), 1);
    }

    #[test]
    fn test_out_of_stock_accept_marks_backorder() {
        let mut cart = Cart::new();
        let p = Product::new("q", "Unknown stock", 100);
        let AddOutcome::NeedsDecision(pending) = cart.add(&p, 2).unwrap() else {
            panic!("unknown stock must prompt");
        };
        cart.resume(pending, Decision::Accept).unwrap();

        let line = cart.line("q").unwrap();
        assert!(line.is_backorder);
        assert_eq!(line.backorder_quantity, 2);
    }

    #[test]
    fn test_partial_backorder_on_merge() {
        let mut cart = Cart::new();
        let p = product("s5", 1200, 5);

        assert_eq!(cart.add(&p, 3).unwrap(), AddOutcome::Added);
        let AddOutcome::NeedsDecision(pending) = cart.add(&p, 3).unwrap() else {
            panic!("expected overage prompt");
        };
        assert_eq!(
            pending.shortfall(),
            StockShortfall::Overage {
                available: 5,
                overage: 1
            }
        );
        cart.resume(pending, Decision::Accept).unwrap();

        let line = cart.line("s5").unwrap();
        assert_eq!(line.quantity, 6);
        assert!(line.is_partial_backorder);
        assert!(!line.is_backorder);
        assert_eq!(line.backorder_quantity, 1);
    }

    #[test]
    fn test_overage_decline_keeps_existing_quantity() {
        let mut cart = Cart::new();
        let p = product("s5", 1200, 5);
        let _ = cart.add(&p, 3).unwrap();
        let AddOutcome::NeedsDecision(pending) = cart.add(&p, 3).unwrap() else {
            panic!("expected overage prompt");
        };
        assert!(cart.resume(pending, Decision::Decline).is_err());
        assert_eq!(cart.line("s5").unwrap().quantity, 3);
        assert!(!cart.line("s5").unwrap().is_partial_backorder);
    }

    #[test]
    fn test_accept_after_line_removed_is_a_plain_add() {
        let mut cart = Cart::new();
        let p = product("s5", 1200, 5);
        let _ = cart.add(&p, 3).unwrap();
        let AddOutcome::NeedsDecision(pending) = cart.add(&p, 3).unwrap() else {
            panic!("expected overage prompt");
        };

        cart.remove("s5").unwrap();
        cart.resume(pending, Decision::Accept).unwrap();

        let line = cart.line("s5").unwrap();
        assert_eq!(line.quantity, 3);
        assert!(!line.is_partial_backorder);
        assert_eq!(line.backorder_quantity, 0);
    }

    #[test]
    fn test_accept_measures_overage_against_current_line() {
        let mut cart = Cart::new();
        let p = product("s5", 1200, 5);
        let _ = cart.add(&p, 4).unwrap();
        let AddOutcome::NeedsDecision(pending) = cart.add(&p, 4).unwrap() else {
            panic!("expected overage prompt");
        };

        cart.update_quantity("s5", 2).unwrap();
        cart.resume(pending, Decision::Accept).unwrap();

        let line = cart.line("s5").unwrap();
        assert_eq!(line.quantity, 6);
        assert!(line.is_partial_backorder);
        assert_eq!(line.backorder_quantity, 1);
    }

    #[test]
    fn test_unit_price_out_of_range_is_rejected() {
        let mut cart = Cart::new();
        let huge = product("big", 90_000_000_000_000_000, 10);
        let negative = product("neg", -500, 10);

        assert!(matches!(cart.add(&huge, 2), Err(CoreError::Validation(_))));
        assert!(matches!(cart.add(&negative, 1), Err(CoreError::Validation(_))));
        assert!(cart.is_empty());
    }

    #[test]
    fn test_update_quantity_recomputes_partial_backorder() {
        let mut cart = Cart::new();
        let p = product("s5", 1200, 5);
        let AddOutcome::NeedsDecision(pending) = cart.add(&p, 7).unwrap() else {
            panic!("expected overage prompt");
        };
        cart.resume(pending, Decision::Accept).unwrap();
        assert_eq!(cart.line("s5").unwrap().backorder_quantity, 2);

        cart.update_quantity("s5", 8).unwrap();
        assert_eq!(cart.line("s5").unwrap().backorder_quantity, 3);

        cart.update_quantity("s5", 4).unwrap();
        let line = cart.line("s5").unwrap();
        assert_eq!(line.backorder_quantity, 0);
        assert!(!line.is_partial_backorder);
    }

    #[test]
    fn test_update_to_zero_removes_line() {
        let mut cart = Cart::new();
        let _ = cart.add(&product("1", 100, 10), 2).unwrap();
        cart.update_quantity("1", 0).unwrap();
        assert!(cart.is_empty());

        assert!(matches!(
            cart.update_quantity("1", 3),
            Err(CoreError::LineNotInCart(_))
        ));
    }

    #[test]
    fn test_quantity_ceiling() {
        let mut cart = Cart::new();
        let p = product("1", 100, 5000);
        let _ = cart.add(&p, 990).unwrap();
        assert!(matches!(
            cart.add(&p, 10),
            Err(CoreError::QuantityTooLarge { requested: 1000, .. })
        ));
        assert!(cart.update_quantity("1", 1000).is_err());
    }

    #[test]
    fn test_cart_line_ceiling() {
        let mut cart = Cart::new();
        for i in 0..MAX_CART_ITEMS {
            let _ = cart.add(&product(&i.to_string(), 100, 10), 1).unwrap();
        }
        assert!(matches!(
            cart.add(&product("overflow", 100, 10), 1),
            Err(CoreError::CartTooLarge { .. })
        ));
        // merging into an existing line is still allowed
        assert!(cart.add(&product("0", 100, 10), 1).is_ok());
    }

    /// Random add/update/remove sequences never produce duplicate lines or a
    /// line whose total drifts from price × quantity.
    #[test]
    fn test_random_sequences_keep_invariants() {
        let mut seed: u64 = 0x9E37_79B9_7F4A_7C15;
        let mut next = move |bound: u64| {
            seed ^= seed << 13;
            seed ^= seed >> 7;
            seed ^= seed << 17;
            seed % bound
        };

        let products: Vec<Product> = (0..6)
            .map(|i| product(&format!("p{}", i), 100 + i * 37, i % 3 * 4))
            .collect();

        for _ in 0..50 {
            let mut cart = Cart::new();
            for _ in 0..40 {
                let p = &products[next(products.len() as u64) as usize];
                match next(3) {
                    0 => {
                        let qty = next(4) as i64 + 1;
                        if let Ok(AddOutcome::NeedsDecision(pending)) = cart.add(p, qty) {
                            let decision = if next(2) == 0 {
                                Decision::Accept
                            } else {
                                Decision::Decline
                            };
                            let _ = cart.resume(pending, decision);
                        }
                    }
                    1 => {
                        let _ = cart.update_quantity(&p.id, next(6) as i64 - 1);
                    }
                    _ => {
                        let _ = cart.remove(&p.id);
                    }
                }

                let mut ids: Vec<&str> = cart.lines().iter().map(|l| l.product_id()).collect();
                ids.sort_unstable();
                ids.dedup();
                assert_eq!(ids.len(), cart.item_count());
                for line in cart.lines() {
                    assert!(line.quantity >= 1);
                    assert_eq!(
                        line.line_total().cents(),
                        line.unit_price.cents() * line.quantity
                    );
                }
            }
        }
    }
}
