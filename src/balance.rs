// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2025 Daniel Negri
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU Affero General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the
// GNU Affero General Public License for more details.
//
// You should have received a copy of the GNU Affero General Public License
// along with this program. If not, see <https://www.gnu.org/licenses/>.

//! Balance derivation.
//!
//! A balance is never stored. It is the signed sum of a user's completed
//! transactions, accumulated at full precision and rounded only when shown.
//!
//! # Example
//!
//! ```
//! use earnings_ledger_rs::balance::{compute_balance, round_for_display};
//! use rust_decimal_macros::dec;
//!
//! assert_eq!(compute_balance(&[]), dec!(0));
//! assert_eq!(round_for_display(dec!(400), 2).to_string(), "400.00");
//! ```

use crate::base::UserId;
use crate::plan::UserSubscription;
use crate::transaction::{Direction, Transaction, TransactionStatus, TransactionType};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::ser::{Serialize, SerializeStruct, Serializer};

/// Decimal places used when a balance is shown.
pub const DISPLAY_PRECISION: u32 = 2;

/// Sums completed credits minus completed debits.
///
/// Pending and declined transactions contribute nothing. The caller supplies
/// every transaction of a single user; a partial list gives a partial sum.
///
/// Never panics: a sum that leaves the range of [`Decimal`] saturates.
pub fn compute_balance(transactions: &[Transaction]) -> Decimal {
    transactions
        .iter()
        .map(Transaction::signed_amount)
        .fold(Decimal::ZERO, Decimal::saturating_add)
}

/// Rounds to `precision` places and pads to a fixed scale, e.g. `400` -> `400.00`.
pub fn round_for_display(amount: Decimal, precision: u32) -> Decimal {
    let mut rounded = amount.round_dp(precision);
    rounded.rescale(precision);
    rounded
}

/// Renders an amount with its currency label, e.g. `KES 1250.50`.
pub fn format_amount(amount: Decimal, currency: &str, precision: u32) -> String {
    format!("{currency} {}", round_for_display(amount, precision))
}

/// Per-user totals derived from the full transaction list.
#[derive(Debug, Clone, PartialEq)]
pub struct AccountSummary {
    pub user_id: UserId,
    pub balance: Decimal,
    /// Completed credits.
    pub earned: Decimal,
    /// Completed debits.
    pub spent: Decimal,
    pub pending_withdrawals: Decimal,
    precision: u32,
}

impl AccountSummary {
    pub fn from_transactions(user_id: UserId, transactions: &[Transaction]) -> Self {
        let mut summary = Self {
            user_id,
            balance: Decimal::ZERO,
            earned: Decimal::ZERO,
            spent: Decimal::ZERO,
            pending_withdrawals: Decimal::ZERO,
            precision: DISPLAY_PRECISION,
        };

        for tx in transactions.iter().filter(|tx| tx.user_id == user_id) {
            match (tx.status, tx.transaction_type.direction()) {
                (TransactionStatus::Completed, Direction::Credit) => {
                    summary.earned = summary.earned.saturating_add(tx.amount)
                }
                (TransactionStatus::Completed, Direction::Debit) => {
                    summary.spent = summary.spent.saturating_add(tx.amount)
                }
                (TransactionStatus::Pending, _)
                    if tx.transaction_type == TransactionType::Withdrawal =>
                {
                    summary.pending_withdrawals =
                        summary.pending_withdrawals.saturating_add(tx.amount)
                }
                _ => {}
            }
        }
        summary.balance = summary.earned.saturating_sub(summary.spent);
        summary
    }

    /// Sets the number of decimal places used when serializing.
    pub fn with_precision(mut self, precision: u32) -> Self {
        self.precision = precision;
        self
    }
}

impl Serialize for AccountSummary {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let mut state = serializer.serialize_struct("AccountSummary", 5)?;
        state.serialize_field("user", &self.user_id)?;
        state.serialize_field("balance", &round_for_display(self.balance, self.precision))?;
        state.serialize_field("earned", &round_for_display(self.earned, self.precision))?;
        state.serialize_field("spent", &round_for_display(self.spent, self.precision))?;
        state.serialize_field(
            "pending_withdrawals",
            &round_for_display(self.pending_withdrawals, self.precision),
        )?;
        state.end()
    }
}

/// Platform-wide figures for the administrator dashboard.
#[derive(Debug, Clone, Default, PartialEq, serde::Serialize)]
pub struct LedgerStats {
    /// Sum of completed subscription payments.
    pub total_revenue: Decimal,
    /// Sum of withdrawals awaiting review.
    pub pending_withdrawals: Decimal,
    /// Number of transactions awaiting review.
    pub pending_count: usize,
    /// Number of known profiles.
    pub total_users: usize,
    /// Subscriptions running at the time the stats were taken.
    pub active_subscriptions: usize,
}

impl LedgerStats {
    /// Transaction figures only; user and subscription counts stay zero.
    pub fn from_transactions(transactions: &[Transaction]) -> Self {
        transactions.iter().fold(Self::default(), |mut stats, tx| {
            match (tx.transaction_type, tx.status) {
                (TransactionType::SubscriptionPayment, TransactionStatus::Completed) => {
                    stats.total_revenue = stats.total_revenue.saturating_add(tx.amount);
                }
                (TransactionType::Withdrawal, TransactionStatus::Pending) => {
                    stats.pending_withdrawals = stats.pending_withdrawals.saturating_add(tx.amount);
                }
                _ => {}
            }
            if tx.status == TransactionStatus::Pending {
                stats.pending_count += 1;
            }
            stats
        })
    }

    /// Fills in the user count and the subscriptions active at `at`.
    pub fn with_accounts(
        mut self,
        total_users: usize,
        subscriptions: &[UserSubscription],
        at: DateTime<Utc>,
    ) -> Self {
        self.total_users = total_users;
        self.active_subscriptions = subscriptions.iter().filter(|sub| sub.is_active_at(at)).count();
        self
    }
}
