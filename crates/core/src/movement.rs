use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::fmt;

use super::money::Money;

/// Reconciliation state of a bank movement. The only transitions are
/// `Unreconciled` → `Reconciled` (match or manual resolution) and back
/// (undo).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ReconcileState {
    Unreconciled,
    Reconciled,
}

impl ReconcileState {
    pub fn as_str(self) -> &'static str {
        match self {
            ReconcileState::Unreconciled => "unreconciled",
            ReconcileState::Reconciled => "reconciled",
        }
    }

    pub fn parse(s: &str) -> Self {
        match s {
            "reconciled" => ReconcileState::Reconciled,
            _ => ReconcileState::Unreconciled,
        }
    }
}

impl fmt::Display for ReconcileState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Direction of a movement as seen by the account holder: a credit
/// (abono) is money in, a debit (cargo) is money out.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Flow {
    Credit,
    Debit,
}

/// One line item of an imported bank statement.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BankMovement {
    pub id: i64,
    /// Monotonic, assigned at insert. Higher means more recent.
    pub sequence: i64,
    pub date: NaiveDate,
    pub description: String,
    pub branch: String,
    /// Bank-assigned operation reference; empty when the source column
    /// was missing or blank. Non-empty references are unique.
    pub reference: String,
    /// Signed: positive = credit/inflow, negative = debit/outflow.
    pub amount: Money,
    /// Running balance as declared by the source statement.
    pub balance: Option<Money>,
    pub state: ReconcileState,
    pub created_at: String,
}

impl BankMovement {
    pub fn flow(&self) -> Option<Flow> {
        if self.amount.is_positive() {
            Some(Flow::Credit)
        } else if self.amount.is_negative() {
            Some(Flow::Debit)
        } else {
            None
        }
    }

    pub fn is_reconciled(&self) -> bool {
        self.state == ReconcileState::Reconciled
    }
}

/// A normalized statement row not yet persisted. The store assigns id,
/// sequence and timestamps at insert.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewMovement {
    pub date: NaiveDate,
    pub description: String,
    pub branch: String,
    pub reference: String,
    pub amount: Money,
    pub balance: Option<Money>,
}
