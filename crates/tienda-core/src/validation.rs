//! # Validation Module
//!
//! Input validation and code generation for Tienda.
//!
//! ## Validation Strategy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                      Validation Layers                                  │
//! │                                                                         │
//! │  Layer 1: Front end forms                                              │
//! │           │                                                             │
//! │           ▼                                                             │
//! │  Layer 2: THIS MODULE, called by every repository write               │
//! │  ├── names, codes, quantities, prices                                  │
//! │  └── sale lines and combo bills                                        │
//! │           │                                                             │
//! │           ▼                                                             │
//! │  Layer 3: SQLite (NOT NULL, UNIQUE, foreign keys)                      │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use rand::Rng;

use crate::error::ValidationError;
use crate::line_item::{ComboItem, LineItem};
use crate::purchase::PurchaseLineInput;
use crate::{CODE_LENGTH, MAX_DOCUMENT_LINES, MAX_LINE_QUANTITY, MAX_PRICE_CENTS};

/// Result type for validation operations.
pub type ValidationResult<T> = Result<T, ValidationError>;

// =============================================================================
// String Validators
// =============================================================================

/// Validates a product or combo code (barcode).
///
/// ## Rules
/// - Must not be empty
/// - At most 50 characters
/// - No whitespace
///
/// ## Example
/// ```rust
/// use tienda_core::validation::validate_code;
///
/// assert!(validate_code("779123456789").is_ok());
/// assert!(validate_code("").is_err());
/// assert!(validate_code("12 34").is_err());
/// ```
pub fn validate_code(code: &str) -> ValidationResult<()> {
    let code = code.trim();

    if code.is_empty() {
        return Err(ValidationError::required("code"));
    }

    if code.len() > 50 {
        return Err(ValidationError::TooLong {
            field: "code".to_string(),
            max: 50,
        });
    }

    if code.chars().any(char::is_whitespace) {
        return Err(ValidationError::InvalidFormat {
            field: "code".to_string(),
            reason: "must not contain spaces".to_string(),
        });
    }

    Ok(())
}

/// Validates a display name (products, combos, clients, suppliers).
pub fn validate_name(field: &str, name: &str) -> ValidationResult<()> {
    let name = name.trim();

    if name.is_empty() {
        return Err(ValidationError::required(field));
    }

    if name.len() > 200 {
        return Err(ValidationError::TooLong {
            field: field.to_string(),
            max: 200,
        });
    }

    Ok(())
}

/// Validates a search query. Returns the trimmed query.
pub fn validate_search_query(query: &str) -> ValidationResult<String> {
    let query = query.trim();

    if query.len() > 100 {
        return Err(ValidationError::TooLong {
            field: "query".to_string(),
            max: 100,
        });
    }

    Ok(query.to_string())
}

// =============================================================================
// Numeric Validators
// =============================================================================

/// Validates a line quantity: positive and at most [`MAX_LINE_QUANTITY`].
pub fn validate_quantity(qty: i64) -> ValidationResult<()> {
    if qty <= 0 {
        return Err(ValidationError::MustBePositive {
            field: "quantity".to_string(),
        });
    }

    if qty > MAX_LINE_QUANTITY {
        return Err(ValidationError::OutOfRange {
            field: "quantity".to_string(),
            min: 1,
            max: MAX_LINE_QUANTITY,
        });
    }

    Ok(())
}

/// Validates an amount in cents: zero up to [`MAX_PRICE_CENTS`].
///
/// ```rust
/// use tienda_core::validation::validate_price_cents;
///
/// assert!(validate_price_cents("price", 0).is_ok());
/// assert!(validate_price_cents("price", -100).is_err());
/// assert!(validate_price_cents("price", i64::MAX / 2).is_err());
/// ```
pub fn validate_price_cents(field: &str, cents: i64) -> ValidationResult<()> {
    if !(0..=MAX_PRICE_CENTS).contains(&cents) {
        return Err(ValidationError::OutOfRange {
            field: field.to_string(),
            min: 0,
            max: MAX_PRICE_CENTS,
        });
    }

    Ok(())
}

/// Validates an IVA rate in basis points (0% to 100%).
pub fn validate_iva_bps(bps: u32) -> ValidationResult<()> {
    if bps > 10000 {
        return Err(ValidationError::OutOfRange {
            field: "iva".to_string(),
            min: 0,
            max: 10000,
        });
    }

    Ok(())
}

// =============================================================================
// Collection Validators
// =============================================================================

/// Validates the contents of a combo (bill of materials or override).
pub fn validate_combo_items(field: &str, items: &[ComboItem]) -> ValidationResult<()> {
    if items.is_empty() {
        return Err(ValidationError::required(field));
    }

    items.iter().try_for_each(|item| validate_quantity(item.quantity))
}

/// Validates one sale line.
pub fn validate_line_item(line: &LineItem) -> ValidationResult<()> {
    validate_quantity(line.quantity())?;
    validate_price_cents("price", line.unit_price().cents())?;

    if let Some(items) = line.override_items() {
        validate_combo_items("modified combo items", items)?;
    }

    Ok(())
}

/// Validates how many lines a sale or purchase carries.
pub fn validate_line_count(count: usize) -> ValidationResult<()> {
    if count > MAX_DOCUMENT_LINES {
        return Err(ValidationError::OutOfRange {
            field: "lines".to_string(),
            min: 1,
            max: MAX_DOCUMENT_LINES as i64,
        });
    }

    Ok(())
}

/// Validates the lines of a sale: at least one, at most
/// [`MAX_DOCUMENT_LINES`], each valid.
pub fn validate_sale_lines(lines: &[LineItem]) -> ValidationResult<()> {
    if lines.is_empty() {
        return Err(ValidationError::required("lines"));
    }
    validate_line_count(lines.len())?;

    lines.iter().try_for_each(validate_line_item)
}

/// Validates one purchase line.
pub fn validate_purchase_line(line: &PurchaseLineInput) -> ValidationResult<()> {
    validate_quantity(line.quantity)?;
    validate_price_cents("price", line.unit_price_cents)?;
    validate_iva_bps(line.iva_bps)
}

// =============================================================================
// Code Generation
// =============================================================================

/// Draws a random numeric code of [`CODE_LENGTH`] digits.
///
/// The first digit is never zero so the code survives spreadsheets that
/// strip leading zeros. Uniqueness is checked by the caller against both
/// products and combos.
///
/// ```rust
/// use tienda_core::validation::random_code;
///
/// let code = random_code(&mut rand::thread_rng());
/// assert_eq!(code.len(), 12);
/// assert!(code.chars().all(|c| c.is_ascii_digit()));
/// ```
pub fn random_code<R: Rng + ?Sized>(rng: &mut R) -> String {
    let mut code = String::with_capacity(CODE_LENGTH);
    code.push(char::from(b'0' + rng.gen_range(1..=9u8)));
    for _ in 1..CODE_LENGTH {
        code.push(char::from(b'0' + rng.gen_range(0..=9u8)));
    }
    code
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::money::Money;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn test_validate_code() {
        assert!(validate_code("779123456789").is_ok());
        assert!(validate_code("ABC-123").is_ok());

        assert!(validate_code("").is_err());
        assert!(validate_code("   ").is_err());
        assert!(validate_code("has space").is_err());
        assert!(validate_code(&"1".repeat(60)).is_err());
    }

    #[test]
    fn test_validate_name() {
        assert!(validate_name("name", "Yerba 1kg").is_ok());
        assert!(matches!(
            validate_name("name", " "),
            Err(ValidationError::Required { .. })
        ));
        assert!(validate_name("name", &"A".repeat(300)).is_err());
    }

    #[test]
    fn test_validate_quantity() {
        assert!(validate_quantity(1).is_ok());
        assert!(validate_quantity(MAX_LINE_QUANTITY).is_ok());

        assert!(validate_quantity(0).is_err());
        assert!(validate_quantity(-1).is_err());
        assert!(validate_quantity(MAX_LINE_QUANTITY + 1).is_err());
    }

    #[test]
    fn test_price_ceiling_keeps_totals_in_range() {
        assert!(validate_price_cents("price", MAX_PRICE_CENTS).is_ok());
        assert!(matches!(
            validate_price_cents("price", MAX_PRICE_CENTS + 1),
            Err(ValidationError::OutOfRange { max: MAX_PRICE_CENTS, .. })
        ));

        // Largest line at 100% IVA, repeated on every allowed line.
        let worst_line = (MAX_PRICE_CENTS * 2).checked_mul(MAX_LINE_QUANTITY);
        let worst_total = worst_line.and_then(|l| l.checked_mul(MAX_DOCUMENT_LINES as i64));
        assert!(worst_total.and_then(|t| t.checked_add(MAX_PRICE_CENTS)).is_some());

        assert!(validate_line_count(MAX_DOCUMENT_LINES).is_ok());
        assert!(validate_line_count(MAX_DOCUMENT_LINES + 1).is_err());
    }

    #[test]
    fn test_validate_iva() {
        assert!(validate_iva_bps(0).is_ok());
        assert!(validate_iva_bps(2100).is_ok());
        assert!(validate_iva_bps(10001).is_err());
    }

    #[test]
    fn test_validate_sale_lines() {
        assert!(validate_sale_lines(&[]).is_err());

        let product = LineItem::Product {
            product_id: 1,
            quantity: 2,
            unit_price: Money::from_cents(100),
            wholesale: false,
        };
        assert!(validate_sale_lines(&[product.clone()]).is_ok());

        let negative_price = LineItem::Product {
            product_id: 1,
            quantity: 2,
            unit_price: Money::from_cents(-1),
            wholesale: false,
        };
        assert!(validate_sale_lines(&[product, negative_price]).is_err());

        let empty_override = LineItem::ModifiedCombo {
            combo_id: 1,
            quantity: 1,
            unit_price: Money::zero(),
            items: vec![],
        };
        assert!(validate_line_item(&empty_override).is_err());

        let zero_item = LineItem::ModifiedCombo {
            combo_id: 1,
            quantity: 1,
            unit_price: Money::zero(),
            items: vec![ComboItem::new(3, 0)],
        };
        assert!(validate_line_item(&zero_item).is_err());
    }

    #[test]
    fn test_random_code_shape() {
        let mut rng = StdRng::seed_from_u64(42);
        for _ in 0..50 {
            let code = random_code(&mut rng);
            assert_eq!(code.len(), CODE_LENGTH);
            assert!(code.chars().all(|c| c.is_ascii_digit()));
            assert!(!code.starts_with('0'));
            assert!(validate_code(&code).is_ok());
        }
    }
}
