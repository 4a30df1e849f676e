//! # Totals Calculator
//!
//! Pure function of (cart lines, discount, tax rate).
//!
//! ```text
//! subtotal        = Σ unit_price × quantity
//! discount_amount = percentage ? subtotal × value / 100 : value
//! taxable_base    = subtotal − discount_amount
//! tax_amount      = taxable_base × tax_rate / 100
//! total           = taxable_base + tax_amount
//! ```
//!
//! Arithmetic runs at full decimal precision. Rounding to cents happens once,
//! in [`Totals::present`], so `total == subtotal − discount + tax` holds
//! exactly before presentation. The discount is not clamped: a discount
//! larger than the subtotal yields a negative taxable base.
//!
//! Every step is checked. A figure that leaves the representable range is a
//! [`ValidationError::Overflow`], never a panic.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use ts_rs::TS;

use crate::cart::CartLine;
use crate::error::{CoreError, CoreResult, ValidationError};
use crate::money::Money;

// =============================================================================
// Discount
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "snake_case")]
pub enum DiscountType {
    #[default]
    Percentage,
    Amount,
}

/// A whole-sale discount.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct Discount {
    /// Percent for `Percentage`, major currency units for `Amount`.
    #[ts(as = "String")]
    pub value: Decimal,
    #[serde(rename = "type")]
    pub discount_type: DiscountType,
}

impl Discount {
    pub fn none() -> Self {
        Discount::default()
    }

    pub fn percentage(value: Decimal) -> Self {
        Discount {
            value,
            discount_type: DiscountType::Percentage,
        }
    }

    pub fn amount(value: Decimal) -> Self {
        Discount {
            value,
            discount_type: DiscountType::Amount,
        }
    }

    /// Discount amount for a given subtotal, `None` on overflow.
    pub fn amount_for(&self, subtotal: Decimal) -> Option<Decimal> {
        match self.discount_type {
            DiscountType::Percentage => subtotal
                .checked_mul(self.value)?
                .checked_div(Decimal::ONE_HUNDRED),
            DiscountType::Amount => Some(self.value),
        }
    }
}

// =============================================================================
// Totals
// =============================================================================

/// Full-precision totals for the active checkout. Recomputed on demand.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Totals {
    pub subtotal: Decimal,
    pub discount_amount: Decimal,
    pub taxable_base: Decimal,
    pub tax_rate: Decimal,
    pub tax_amount: Decimal,
    pub total: Decimal,
}

impl Totals {
    /// ## Example
    /// ```rust
    /// use rust_decimal::Decimal;
    /// use tessera_core::totals::{Discount, Totals};
    ///
    /// let t = Totals::compute(&[], &Discount::none(), Decimal::new(8, 0)).unwrap();
    /// assert!(t.total.is_zero());
    /// ```
    pub fn compute(lines: &[CartLine], discount: &Discount, tax_rate: Decimal) -> CoreResult<Totals> {
        let mut subtotal = Decimal::ZERO;
        for line in lines {
            let line_total = line
                .unit_price
                .checked_multiply_quantity(line.quantity)
                .ok_or_else(|| overflow("line total"))?;
            subtotal = subtotal
                .checked_add(line_total.to_decimal())
                .ok_or_else(|| overflow("subtotal"))?;
        }

        let discount_amount = discount
            .amount_for(subtotal)
            .ok_or_else(|| overflow("discount"))?;
        let taxable_base = subtotal
            .checked_sub(discount_amount)
            .ok_or_else(|| overflow("taxable base"))?;
        let tax_amount = taxable_base
            .checked_mul(tax_rate)
            .and_then(|t| t.checked_div(Decimal::ONE_HUNDRED))
            .ok_or_else(|| overflow("tax"))?;
        let total = taxable_base
            .checked_add(tax_amount)
            .ok_or_else(|| overflow("sale total"))?;

        // Presentation must be able to round every figure to cents.
        for figure in [subtotal, discount_amount, taxable_base, tax_amount, total] {
            if Money::round_from_decimal(figure).is_none() {
                return Err(overflow("sale total"));
            }
        }

        Ok(Totals {
            subtotal,
            discount_amount,
            taxable_base,
            tax_rate,
            tax_amount,
            total,
        })
    }

    /// Rounds every figure to cents for display, receipts and tender.
    pub fn present(&self) -> PresentedTotals {
        PresentedTotals {
            subtotal: to_cents(self.subtotal),
            discount: to_cents(self.discount_amount),
            taxable_base: to_cents(self.taxable_base),
            tax: to_cents(self.tax_amount),
            total: to_cents(self.total),
        }
    }
}

fn overflow(field: &str) -> CoreError {
    CoreError::Validation(ValidationError::Overflow {
        field: field.to_string(),
    })
}

fn to_cents(amount: Decimal) -> Money {
    Money::round_from_decimal(amount).unwrap_or_else(|| {
        if amount.is_sign_negative() {
            Money::from_cents(i64::MIN)
        } else {
            Money::from_cents(i64::MAX)
        }
    })
}

/// Totals rounded to cents. Each figure is rounded independently from the
/// full-precision value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct PresentedTotals {
    pub subtotal: Money,
    pub discount: Money,
    pub taxable_base: Money,
    pub tax: Money,
    pub total: Money,
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cart::{AddOutcome, Cart};
    use crate::types::Product;

    fn cart_with(lines: &[(i64, i64)]) -> Cart {
        let mut cart = Cart::new();
        for (i, (price, qty)) in lines.iter().enumerate() {
            let p = Product::new(format!("p{}", i), "Item", *price).with_stock(1000);
            assert_eq!(cart.add(&p, *qty).unwrap(), AddOutcome::Added);
        }
        cart
    }

    #[test]
    fn test_reference_checkout() {
        let cart = cart_with(&[(2100, 1), (1200, 2)]);
        let t = Totals::compute(
            cart.lines(),
            &Discount::percentage(Decimal::new(10, 0)),
            Decimal::new(8, 0),
        )
        .unwrap();

        assert_eq!(t.subtotal, Decimal::new(4500, 2));
        assert_eq!(t.discount_amount, Decimal::new(450, 2));
        assert_eq!(t.taxable_base, Decimal::new(4050, 2));
        assert_eq!(t.tax_amount, Decimal::new(324, 2));
        assert_eq!(t.total, Decimal::new(4374, 2));

        let shown = t.present();
        assert_eq!(shown.total, Money::from_cents(4374));
        assert_eq!(shown.tax, Money::from_cents(324));
    }

    #[test]
    fn test_amount_discount_can_exceed_subtotal() {
        let cart = cart_with(&[(1000, 1)]);
        let t = Totals::compute(
            cart.lines(),
            &Discount::amount(Decimal::new(15, 0)),
            Decimal::new(10, 0),
        )
        .unwrap();
        assert_eq!(t.taxable_base, Decimal::new(-5, 0));
        assert_eq!(t.tax_amount, Decimal::new(-5, 1));
        assert_eq!(t.present().total, Money::from_cents(-550));
    }

    #[test]
    fn test_rounding_only_at_presentation() {
        // 3 × $0.33 at 8.875% → tax 0.0878625 kept in full
        let cart = cart_with(&[(33, 3)]);
        let t = Totals::compute(cart.lines(), &Discount::none(), Decimal::new(8875, 3)).unwrap();
        assert_eq!(t.tax_amount, Decimal::new(878625, 7));
        assert_eq!(t.present().tax, Money::from_cents(9));
        assert_eq!(t.present().total, Money::from_cents(108));
    }

    #[test]
    fn test_total_identity_holds_before_rounding() {
        let carts = [
            vec![(1999, 3), (1, 7)],
            vec![(33, 3)],
            vec![(123_457, 2), (999, 999)],
        ];
        let discounts = [
            Discount::none(),
            Discount::percentage(Decimal::new(125, 1)),
            Discount::amount(Decimal::new(1_000_000, 2)),
        ];
        let rates = [Decimal::ZERO, Decimal::new(8875, 3), Decimal::new(25, 0)];

        for lines in &carts {
            let cart = cart_with(lines);
            for discount in &discounts {
                for rate in rates {
                    let t = Totals::compute(cart.lines(), discount, rate).unwrap();
                    assert_eq!(t.total, t.subtotal - t.discount_amount + t.tax_amount);
                }
            }
        }
    }

    #[test]
    fn test_zero_rate_has_no_tax() {
        let cart = cart_with(&[(2100, 1)]);
        let t = Totals::compute(cart.lines(), &Discount::none(), Decimal::ZERO).unwrap();
        assert!(t.tax_amount.is_zero());
        assert_eq!(t.total, t.subtotal);
    }

    #[test]
    fn test_unbounded_amount_discount_is_an_error() {
        let cart = cart_with(&[(1000, 1)]);
        let err = Totals::compute(
            cart.lines(),
            &Discount::amount(Decimal::MAX),
            Decimal::new(8, 0),
        )
        .unwrap_err();
        assert!(matches!(
            err,
            CoreError::Validation(ValidationError::Overflow { .. })
        ));
    }

    #[test]
    fn test_unbounded_percentage_discount_is_an_error() {
        let cart = cart_with(&[(1000, 1)]);
        let result = Totals::compute(
            cart.lines(),
            &Discount::percentage(Decimal::MAX),
            Decimal::ZERO,
        );
        assert!(result.is_err());
    }

    #[test]
    fn test_line_overflow_is_an_error() {
        // Built by hand: the cart itself refuses prices this large.
        let line = CartLine {
            product: Product::new("huge", "Huge", 1),
            unit_price: Money::from_cents(9_000_000_000_000_000_000),
            quantity: 2,
            is_backorder: false,
            is_partial_backorder: false,
            backorder_quantity: 0,
            added_at: chrono::Utc::now(),
        };
        let err = Totals::compute(&[line], &Discount::none(), Decimal::ZERO).unwrap_err();
        assert!(matches!(
            err,
            CoreError::Validation(ValidationError::Overflow { .. })
        ));
    }
}
