//! # Error Types
//!
//! Domain-specific error types for tienda-core.
//!
//! ## Error Hierarchy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         Error Types                                     │
//! │                                                                         │
//! │  tienda-core errors (this file)                                        │
//! │  ├── CoreError        - Business rule violations                       │
//! │  └── ValidationError  - Input validation failures                      │
//! │                                                                         │
//! │  tienda-db errors (separate crate)                                     │
//! │  └── DbError          - Database failures, wraps CoreError             │
//! │                                                                         │
//! │  Flow: ValidationError → CoreError → DbError → caller                  │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use thiserror::Error;

use crate::sale_status::SaleStatus;
use crate::stock::{format_shortages, StockShortage};

// =============================================================================
// Core Error
// =============================================================================

/// Core business logic errors.
#[derive(Debug, Error)]
pub enum CoreError {
    /// One or more stock requirements exceed what is on hand.
    ///
    /// ## When This Occurs
    /// Only when a sale moves into "Para embalar". Sale creation and sale
    /// edits never raise it; they record the shortage through the initial
    /// status instead.
    ///
    /// The message lists every short product, one block per requirement:
    /// ```text
    /// Insufficient stock for the following products:
    ///
    /// - Yerba 1kg (Code: 779123456789, ID: 4) from combo "Kit mate"
    ///   Available: 1, Required: 2
    /// ```
    #[error("{}", format_shortages(.0))]
    InsufficientStock(Vec<StockShortage>),

    /// The requested status change is not in the transition table.
    #[error("Cannot change sale status from '{from}' to '{to}'")]
    InvalidTransition { from: SaleStatus, to: SaleStatus },

    /// A combo line was expanded without its bill of materials.
    #[error("Bill of materials for combo {0} was not loaded")]
    ComboRecipeMissing(i64),

    /// Every random code drawn was already taken.
    #[error("Could not generate a unique code after {attempts} attempts")]
    CodeGenerationExhausted { attempts: u32 },

    /// Validation error (wraps ValidationError).
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),
}

impl CoreError {
    /// Returns the short items when this is an insufficient stock error.
    pub fn shortages(&self) -> Option<&[StockShortage]> {
        match self {
            CoreError::InsufficientStock(items) => Some(items),
            _ => None,
        }
    }
}

// =============================================================================
// Validation Error
// =============================================================================

/// Input validation errors.
///
/// Raised before any statement runs, so a rejected request never opens a
/// transaction.
#[derive(Debug, Error)]
pub enum ValidationError {
    /// A required field is missing or empty.
    #[error("{field} is required")]
    Required { field: String },

    /// Field value is too long.
    #[error("{field} must be at most {max} characters")]
    TooLong { field: String, max: usize },

    /// Numeric value is out of range.
    #[error("{field} must be between {min} and {max}")]
    OutOfRange { field: String, min: i64, max: i64 },

    /// Value must be positive.
    #[error("{field} must be positive")]
    MustBePositive { field: String },

    /// Invalid format (e.g. non-numeric code, malformed date).
    #[error("{field} has invalid format: {reason}")]
    InvalidFormat { field: String, reason: String },

    /// Duplicate value (e.g. a code already used by a product or combo).
    #[error("{field} '{value}' already exists")]
    Duplicate { field: String, value: String },
}

impl ValidationError {
    pub fn required(field: impl Into<String>) -> Self {
        ValidationError::Required {
            field: field.into(),
        }
    }

    pub fn duplicate(field: impl Into<String>, value: impl Into<String>) -> Self {
        ValidationError::Duplicate {
            field: field.into(),
            value: value.into(),
        }
    }
}

// =============================================================================
// Result Type Alias
// =============================================================================

/// Convenience type alias for Results with CoreError.
pub type CoreResult<T> = Result<T, CoreError>;

// =============================================================================
// Unit Tests
// =============================================================================
