//! # Validation Module
//!
//! Input validation for values that cross into the transaction core.
//!
//! ## Validation Strategy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                      Validation Layers                                  │
//! │                                                                         │
//! │  Layer 1: Register session                                             │
//! │  ├── Quantity entered by operator                                      │
//! │  ├── Discount value, cash tendered                                     │
//! │  └── Manual tax override from config                                   │
//! │           │                                                             │
//! │           ▼                                                             │
//! │  Layer 2: Cart / Totals (this crate)                                   │
//! │  ├── Line count and quantity ceilings                                  │
//! │  └── Stock policy (see `cart`)                                         │
//! │           │                                                             │
//! │           ▼                                                             │
//! │  Layer 3: Accounting sink                                              │
//! │  └── Authoritative acceptance of the finished transaction              │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use rust_decimal::Decimal;

use crate::error::ValidationError;
use crate::{
    MAX_CART_ITEMS, MAX_DISCOUNT_VALUE, MAX_ITEM_QUANTITY, MAX_SEARCH_TERM_LEN, MAX_UNIT_PRICE_CENTS,
};

/// Result type for validation operations.
pub type ValidationResult<T> = Result<T, ValidationError>;

// =============================================================================
// String Validators
// =============================================================================

/// Validates a manual search term or scan payload.
///
/// ## Returns
/// The trimmed term.
///
/// ```rust
/// use tessera_core::validation::validate_search_term;
///
/// assert_eq!(validate_search_term("  cola ").unwrap(), "cola");
/// assert!(validate_search_term("   ").is_err());
/// ```
pub fn validate_search_term(term: &str) -> ValidationResult<String> {
    let term = term.trim();

    if term.is_empty() {
        return Err(ValidationError::Required {
            field: "search term".to_string(),
        });
    }

    if term.chars().count() > MAX_SEARCH_TERM_LEN {
        return Err(ValidationError::TooLong {
            field: "search term".to_string(),
            max: MAX_SEARCH_TERM_LEN,
        });
    }

    Ok(term.to_string())
}

// =============================================================================
// Numeric Validators
// =============================================================================

/// Validates a line quantity.
///
/// ## Rules
/// - Must be positive (> 0)
/// - Must not exceed MAX_ITEM_QUANTITY (999)
///
/// `update_quantity` treats `qty <= 0` as removal before this runs.
pub fn validate_quantity(qty: i64) -> ValidationResult<()> {
    if qty <= 0 {
        return Err(ValidationError::MustBePositive {
            field: "quantity".to_string(),
        });
    }

    if qty > MAX_ITEM_QUANTITY {
        return Err(ValidationError::OutOfRange {
            field: "quantity".to_string(),
            min: 1,
            max: MAX_ITEM_QUANTITY,
        });
    }

    Ok(())
}

/// Validates cash handed over by the customer.
///
/// Zero is allowed (the operator may record a shortfall); negative is not.
pub fn validate_tendered_cents(cents: i64) -> ValidationResult<()> {
    if cents < 0 {
        return Err(ValidationError::OutOfRange {
            field: "tendered".to_string(),
            min: 0,
            max: i64::MAX,
        });
    }

    Ok(())
}

/// Validates a unit price in cents.
///
/// ## Rules
/// - Must not be negative (free items are allowed)
/// - Must not exceed MAX_UNIT_PRICE_CENTS
pub fn validate_unit_price(cents: i64) -> ValidationResult<()> {
    if !(0..=MAX_UNIT_PRICE_CENTS).contains(&cents) {
        return Err(ValidationError::OutOfRange {
            field: "unit price".to_string(),
            min: 0,
            max: MAX_UNIT_PRICE_CENTS,
        });
    }

    Ok(())
}

/// Validates a discount value.
///
/// Sign and ceiling only. A discount larger than the subtotal is allowed and
/// produces a negative taxable base.
pub fn validate_discount_value(value: Decimal) -> ValidationResult<()> {
    if value.is_sign_negative() && !value.is_zero() {
        return Err(ValidationError::InvalidFormat {
            field: "discount".to_string(),
            reason: "must not be negative".to_string(),
        });
    }

    if value > Decimal::from(MAX_DISCOUNT_VALUE) {
        return Err(ValidationError::OutOfRange {
            field: "discount".to_string(),
            min: 0,
            max: MAX_DISCOUNT_VALUE,
        });
    }

    Ok(())
}

/// Validates a tax percentage (0% to 100%).
pub fn validate_tax_percentage(rate: Decimal) -> ValidationResult<()> {
    if rate < Decimal::ZERO || rate > Decimal::ONE_HUNDRED {
        return Err(ValidationError::OutOfRange {
            field: "tax rate".to_string(),
            min: 0,
            max: 100,
        });
    }

    Ok(())
}

// =============================================================================
// Collection Validators
// =============================================================================

/// Validates that one more line fits in the cart.
pub fn validate_cart_size(current_lines: usize) -> ValidationResult<()> {
    if current_lines >= MAX_CART_ITEMS {
        return Err(ValidationError::OutOfRange {
            field: "cart items".to_string(),
            min: 0,
            max: MAX_CART_ITEMS as i64,
        });
    }

    Ok(())
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_search_term() {
        assert_eq!(validate_search_term("4006381333931").unwrap(), "4006381333931");
        assert!(validate_search_term("").is_err());
        assert!(validate_search_term(&"9".repeat(MAX_SEARCH_TERM_LEN + 1)).is_err());
    }

    #[test]
    fn test_validate_quantity() {
        assert!(validate_quantity(1).is_ok());
        assert!(validate_quantity(999).is_ok());
        assert!(validate_quantity(0).is_err());
        assert!(validate_quantity(-1).is_err());
        assert!(validate_quantity(1000).is_err());
    }

    #[test]
    fn test_validate_tendered() {
        assert!(validate_tendered_cents(0).is_ok());
        assert!(validate_tendered_cents(5000).is_ok());
        assert!(validate_tendered_cents(-1).is_err());
    }

    #[test]
    fn test_validate_discount_value() {
        assert!(validate_discount_value(Decimal::ZERO).is_ok());
        assert!(validate_discount_value(Decimal::new(10, 0)).is_ok());
        assert!(validate_discount_value(Decimal::new(-1, 2)).is_err());
        // above 100% stays allowed, only the ceiling is enforced
        assert!(validate_discount_value(Decimal::new(250, 0)).is_ok());
        assert!(validate_discount_value(Decimal::from(MAX_DISCOUNT_VALUE)).is_ok());
        assert!(validate_discount_value(Decimal::from(MAX_DISCOUNT_VALUE + 1)).is_err());
        assert!(validate_discount_value(Decimal::MAX).is_err());
    }

    #[test]
    fn test_validate_unit_price() {
        assert!(validate_unit_price(0).is_ok());
        assert!(validate_unit_price(MAX_UNIT_PRICE_CENTS).is_ok());
        assert!(validate_unit_price(MAX_UNIT_PRICE_CENTS + 1).is_err());
        assert!(validate_unit_price(-1).is_err());
    }

    #[test]
    fn test_validate_tax_percentage() {
        assert!(validate_tax_percentage(Decimal::ZERO).is_ok());
        assert!(validate_tax_percentage(Decimal::new(8875, 3)).is_ok());
        assert!(validate_tax_percentage(Decimal::new(10001, 2)).is_err());
        assert!(validate_tax_percentage(Decimal::new(-1, 0)).is_err());
    }

    #[test]
    fn test_validate_cart_size() {
        assert!(validate_cart_size(0).is_ok());
        assert!(validate_cart_size(MAX_CART_ITEMS - 1).is_ok());
        assert!(validate_cart_size(MAX_CART_ITEMS).is_err());
    }
}
