//! # Ticket Lifecycle
//!
//! The status of a ticket unit and the transitions allowed between states.
//!
//! ## State Machine
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                                                                         │
//! │   generate ──► AVAILABLE ──── Sell (valid only) ────► SOLD              │
//! │                    ▲                                    │               │
//! │                    ├──────────── Release (amend) ───────┤               │
//! │                    └──────────── Refund ────────────────┘               │
//! │                                                                         │
//! │   REFUNDED: recognised storage value, no transitions in or out.        │
//! │   `valid` is an independent flag and never changes status.             │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! The database layer turns each transition into a compare-and-set:
//! `UPDATE tickets SET status = <to> WHERE id = ? AND status = <from>`.
//! A zero row count means the unit was not in the expected state.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use ts_rs::TS;

use crate::error::CoreError;

// =============================================================================
// Ticket Status
// =============================================================================

/// Lifecycle status of a ticket unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "lowercase"))]
#[ts(export)]
#[serde(rename_all = "lowercase")]
pub enum TicketStatus {
    /// Generated and waiting to be sold.
    #[default]
    Available,
    /// Attached to an order with a price snapshot.
    Sold,
    /// Terminal state kept for rows written by older tooling.
    Refunded,
}

impl TicketStatus {
    /// The value stored in the `tickets.status` column.
    pub const fn as_str(&self) -> &'static str {
        match self {
            TicketStatus::Available => "available",
            TicketStatus::Sold => "sold",
            TicketStatus::Refunded => "refunded",
        }
    }
}

impl fmt::Display for TicketStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TicketStatus {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "available" => Ok(TicketStatus::Available),
            "sold" => Ok(TicketStatus::Sold),
            "refunded" => Ok(TicketStatus::Refunded),
            other => Err(CoreError::invalid_input("ticket status", other)),
        }
    }
}

// =============================================================================
// Transitions
// =============================================================================

/// A named lifecycle transition with a fixed expected prior state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TicketTransition {
    /// available → sold, only for valid units.
    Sell,
    /// sold → available when an amendment removes the unit from its order.
    Release,
    /// sold → available through the refund flow.
    Refund,
}

impl TicketTransition {
    /// The status a unit must be in for the transition to apply.
    pub const fn from(&self) -> TicketStatus {
        match self {
            TicketTransition::Sell => TicketStatus::Available,
            TicketTransition::Release | TicketTransition::Refund => TicketStatus::Sold,
        }
    }

    /// The status after the transition.
    pub const fn to(&self) -> TicketStatus {
        match self {
            TicketTransition::Sell => TicketStatus::Sold,
            TicketTransition::Release | TicketTransition::Refund => TicketStatus::Available,
        }
    }

    /// Whether the unit's `valid` flag must be set.
    pub const fn requires_valid(&self) -> bool {
        matches!(self, TicketTransition::Sell)
    }

    /// Past participle used in conflict messages ("cannot be sold").
    pub const fn verb(&self) -> &'static str {
        match self {
            TicketTransition::Sell => "sold",
            TicketTransition::Release => "released",
            TicketTransition::Refund => "refunded",
        }
    }

    /// Checks a unit's current state against this transition.
    ///
    /// ## Returns
    /// * `Ok(to)` - the status the unit moves to
    /// * `Err(CoreError::Conflict)` - wrong prior status, or invalid unit
    ///   for a sale
    pub fn check(&self, unit_id: i64, current: TicketStatus, valid: bool) -> Result<TicketStatus, CoreError> {
        if current != self.from() {
            return Err(CoreError::Conflict {
                unit_id,
                action: self.verb().to_string(),
                reason: format!("status is {}", current),
            });
        }

        if self.requires_valid() && !valid {
            return Err(CoreError::Conflict {
                unit_id,
                action: self.verb().to_string(),
                reason: "ticket is invalidated".to_string(),
            });
        }

        Ok(self.to())
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sell_requires_available_and_valid() {
        let sell = TicketTransition::Sell;
        assert_eq!(sell.check(1, TicketStatus::Available, true).unwrap(), TicketStatus::Sold);
        assert!(matches!(
            sell.check(1, TicketStatus::Sold, true),
            Err(CoreError::Conflict { unit_id: 1, .. })
        ));
        assert!(matches!(
            sell.check(1, TicketStatus::Available, false),
            Err(CoreError::Conflict { .. })
        ));
        assert!(sell.check(1, TicketStatus::Refunded, true).is_err());
    }

    #[test]
    fn test_release_and_refund_ignore_validity() {
        for transition in [TicketTransition::Release, TicketTransition::Refund] {
            assert_eq!(
                transition.check(9, TicketStatus::Sold, false).unwrap(),
                TicketStatus::Available
            );
            assert!(transition.check(9, TicketStatus::Available, true).is_err());
        }
    }

    #[test]
    fn test_status_round_trips_through_str() {
        for status in [TicketStatus::Available, TicketStatus::Sold, TicketStatus::Refunded] {
            assert_eq!(status.as_str().parse::<TicketStatus>().unwrap(), status);
        }
        assert!("void".parse::<TicketStatus>().is_err());
    }
}
