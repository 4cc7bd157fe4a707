//! # Sale Status
//!
//! Fulfillment workflow of a sale as an explicit state machine.
//!
//! ```text
//!                 stock ok on create
//!        ┌──────────────────────────────────┐
//!        │                                  ▼
//!   ┌─────────┐  stock re-check   ┌──────────────┐         ┌────────────┐         ┌────────────┐
//!   │Pendiente│ ────────────────► │ Para embalar │ ──────► │ Despachado │ ──────► │ Completado │
//!   └─────────┘ ◄──────────────── └──────────────┘         └────────────┘         └────────────┘
//!        ▲           put back
//!        └── stock short on create
//! ```
//!
//! Only the move into "Para embalar" touches stock (a re-verification pass).
//! Everything else is a plain status write.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use ts_rs::TS;

use crate::error::{CoreError, CoreResult, ValidationError};

/// The status of a sale.
///
/// Stored and serialized with the exact labels the shop uses
/// (`"Pendiente"`, `"Para embalar"`, `"Despachado"`, `"Completado"`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[ts(export)]
pub enum SaleStatus {
    /// Waiting for stock (or put back by an operator).
    #[serde(rename = "Pendiente")]
    #[cfg_attr(feature = "sqlx", sqlx(rename = "Pendiente"))]
    Pendiente,
    /// Stock is reserved, ready to be packed.
    #[serde(rename = "Para embalar")]
    #[cfg_attr(feature = "sqlx", sqlx(rename = "Para embalar"))]
    ParaEmbalar,
    /// Handed to the carrier.
    #[serde(rename = "Despachado")]
    #[cfg_attr(feature = "sqlx", sqlx(rename = "Despachado"))]
    Despachado,
    /// Delivered. Terminal.
    #[serde(rename = "Completado")]
    #[cfg_attr(feature = "sqlx", sqlx(rename = "Completado"))]
    Completado,
}

/// What a validated status change requires from the caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    /// Target equals the current status; nothing to write.
    Unchanged,
    /// Write the new status, re-verifying stock first when asked to.
    Apply { verify_stock: bool },
}

impl SaleStatus {
    pub const ALL: [SaleStatus; 4] = [
        SaleStatus::Pendiente,
        SaleStatus::ParaEmbalar,
        SaleStatus::Despachado,
        SaleStatus::Completado,
    ];

    /// Label used in storage and on the wire.
    pub const fn as_str(&self) -> &'static str {
        match self {
            SaleStatus::Pendiente => "Pendiente",
            SaleStatus::ParaEmbalar => "Para embalar",
            SaleStatus::Despachado => "Despachado",
            SaleStatus::Completado => "Completado",
        }
    }

    /// Status assigned when a sale is created.
    pub const fn initial(stock_sufficient: bool) -> Self {
        if stock_sufficient {
            SaleStatus::ParaEmbalar
        } else {
            SaleStatus::Pendiente
        }
    }

    /// Statuses reachable in one step from `self`.
    pub const fn allowed_targets(&self) -> &'static [SaleStatus] {
        match self {
            SaleStatus::Pendiente => &[SaleStatus::ParaEmbalar],
            SaleStatus::ParaEmbalar => &[SaleStatus::Pendiente, SaleStatus::Despachado],
            SaleStatus::Despachado => &[SaleStatus::Completado],
            SaleStatus::Completado => &[],
        }
    }

    pub fn can_transition_to(&self, target: SaleStatus) -> bool {
        self.allowed_targets().contains(&target)
    }

    /// Validates a status change against the transition table.
    ///
    /// ## Example
    /// ```rust
    /// use tienda_core::sale_status::{SaleStatus, Transition};
    ///
    /// let t = SaleStatus::Pendiente.transition_to(SaleStatus::ParaEmbalar).unwrap();
    /// assert_eq!(t, Transition::Apply { verify_stock: true });
    ///
    /// assert!(SaleStatus::Pendiente.transition_to(SaleStatus::Completado).is_err());
    /// ```
    pub fn transition_to(&self, target: SaleStatus) -> CoreResult<Transition> {
        if *self == target {
            return Ok(Transition::Unchanged);
        }

        if !self.can_transition_to(target) {
            return Err(CoreError::InvalidTransition {
                from: *self,
                to: target,
            });
        }

        Ok(Transition::Apply {
            verify_stock: target == SaleStatus::ParaEmbalar,
        })
    }

    /// Not yet shipped: counts as pending work on the dashboard.
    pub const fn is_open(&self) -> bool {
        matches!(self, SaleStatus::Pendiente | SaleStatus::ParaEmbalar)
    }
}

impl Default for SaleStatus {
    fn default() -> Self {
        SaleStatus::Pendiente
    }
}

impl fmt::Display for SaleStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SaleStatus {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        SaleStatus::ALL
            .into_iter()
            .find(|status| status.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| ValidationError::InvalidFormat {
                field: "estado".to_string(),
                reason: format!("unknown sale status '{}'", s.trim()),
            })
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
