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

//! Transaction records and the rules that govern them.
//!
//! A transaction's direction is derived from its [`TransactionType`]; amounts
//! are always stored positive. Status follows a two-branch state machine:
//!
//! ```text
//!  Pending ──approve──► Completed
//!     │
//!     └─────decline───► Declined
//! ```
//!
//! `Completed` and `Declined` are terminal.

use crate::TransactionError;
use crate::base::{PlanId, TransactionId, UserId};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Largest amount a single transaction may carry.
///
/// Balances are sums of these, so the cap keeps them far inside the range
/// of [`Decimal`].
pub const MAX_AMOUNT: Decimal = Decimal::from_parts(1_000_000_000, 0, 0, false, 0);

/// True for amounts a transaction may carry: positive and at most [`MAX_AMOUNT`].
pub fn is_valid_amount(amount: Decimal) -> bool {
    amount > Decimal::ZERO && amount <= MAX_AMOUNT
}

/// Kind of value movement a transaction records.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum TransactionType {
    Deposit,
    Earning,
    ReferralCommission,
    Withdrawal,
    SubscriptionPayment,
}

/// Effect a completed transaction has on the balance.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Credit,
    Debit,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum TransactionStatus {
    Pending,
    Completed,
    Declined,
}

impl TransactionType {
    pub const ALL: [TransactionType; 5] = [
        Self::Deposit,
        Self::Earning,
        Self::ReferralCommission,
        Self::Withdrawal,
        Self::SubscriptionPayment,
    ];

    pub fn direction(self) -> Direction {
        match self {
            Self::Deposit | Self::Earning | Self::ReferralCommission => Direction::Credit,
            Self::Withdrawal | Self::SubscriptionPayment => Direction::Debit,
        }
    }

    /// Status a freshly created transaction of this type starts in.
    ///
    /// Only platform-awarded earnings skip administrator review.
    pub fn initial_status(self) -> TransactionStatus {
        match self {
            Self::Earning => TransactionStatus::Completed,
            _ => TransactionStatus::Pending,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Deposit => "deposit",
            Self::Earning => "earning",
            Self::ReferralCommission => "referral_commission",
            Self::Withdrawal => "withdrawal",
            Self::SubscriptionPayment => "subscription_payment",
        }
    }
}

impl fmt::Display for TransactionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TransactionType {
    type Err = TransactionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|t| t.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| TransactionError::UnknownType(s.to_string()))
    }
}

impl TransactionStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Declined)
    }

    /// Validates a status change and returns the new status.
    ///
    /// # Errors
    ///
    /// - [`TransactionError::InvalidStatusTarget`] if `to` is `Pending`.
    /// - [`TransactionError::AlreadyProcessed`] if `self` is terminal.
    pub fn transition(
        self,
        id: TransactionId,
        to: TransactionStatus,
    ) -> Result<TransactionStatus, TransactionError> {
        if to == Self::Pending {
            return Err(TransactionError::InvalidStatusTarget(to));
        }
        if self.is_terminal() {
            return Err(TransactionError::AlreadyProcessed { id, status: self });
        }
        Ok(to)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Completed => "completed",
            Self::Declined => "declined",
        }
    }
}

impl fmt::Display for TransactionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TransactionStatus {
    type Err = TransactionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        [Self::Pending, Self::Completed, Self::Declined]
            .into_iter()
            .find(|status| status.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| TransactionError::UnknownStatus(s.to_string()))
    }
}

/// A persisted transaction row.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Transaction {
    pub id: TransactionId,
    pub user_id: UserId,
    pub amount: Decimal,
    #[serde(rename = "type")]
    pub transaction_type: TransactionType,
    pub status: TransactionStatus,
    pub description: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<serde_json::Value>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Transaction {
    /// Signed contribution to the balance: zero unless completed.
    pub fn signed_amount(&self) -> Decimal {
        if self.status != TransactionStatus::Completed {
            return Decimal::ZERO;
        }
        match self.transaction_type.direction() {
            Direction::Credit => self.amount,
            Direction::Debit => -self.amount,
        }
    }

    /// Plan referenced by a subscription payment's metadata, if any.
    pub fn plan_id(&self) -> Option<PlanId> {
        self.metadata
            .as_ref()?
            .get("plan_id")?
            .as_str()?
            .parse()
            .ok()
    }
}

/// A transaction about to be inserted. The gateway assigns id and timestamps.
#[derive(Debug, Clone, PartialEq)]
pub struct NewTransaction {
    pub user_id: UserId,
    pub amount: Decimal,
    pub transaction_type: TransactionType,
    pub status: TransactionStatus,
    pub description: String,
    pub metadata: Option<serde_json::Value>,
}

impl NewTransaction {
    /// Builds a record in the initial status for its type.
    ///
    /// # Errors
    ///
    /// Returns [`TransactionError::InvalidAmount`] if `amount <= 0` or
    /// `amount > MAX_AMOUNT`.
    pub fn new(
        user_id: UserId,
        transaction_type: TransactionType,
        amount: Decimal,
        description: impl Into<String>,
    ) -> Result<Self, TransactionError> {
        if !is_valid_amount(amount) {
            return Err(TransactionError::InvalidAmount);
        }
        Ok(Self {
            user_id,
            amount,
            transaction_type,
            status: transaction_type.initial_status(),
            description: description.into(),
            metadata: None,
        })
    }

    pub fn with_metadata(mut self, metadata: serde_json::Value) -> Self {
        self.metadata = Some(metadata);
        self
    }
}

/// Platform activity an earning was awarded for.
///
/// Its [`Display`](fmt::Display) form is the earning's description.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum EarningSource {
    Trivia { question: String },
    Article { title: String },
}

impl fmt::Display for EarningSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Trivia { question } => write!(f, "Trivia: {question}"),
            Self::Article { title } => write!(f, "Article Read: {title}"),
        }
    }
}
