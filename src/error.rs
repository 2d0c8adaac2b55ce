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

//! Error types for ledger operations.
//!
//! Every variant belongs to one [`ErrorKind`], which decides how the
//! presentation layer reacts: validation errors are shown and not retried,
//! conflicts ask the caller to refresh, persistence failures get a generic
//! notice.

use crate::base::{PlanId, TransactionId, UserId};
use crate::gateway::GatewayError;
use crate::transaction::TransactionStatus;
use rust_decimal::Decimal;
use thiserror::Error;

/// Ledger operation errors.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransactionError {
    /// Amount is zero, negative or above the per-transaction cap
    #[error("invalid amount (must be positive and at most {})", crate::transaction::MAX_AMOUNT)]
    InvalidAmount,

    /// Withdrawal would exceed the completed balance
    #[error("insufficient balance: requested {requested}, available {available}")]
    InsufficientBalance {
        requested: Decimal,
        available: Decimal,
    },

    /// Withdrawal request without payout details
    #[error("missing payout details")]
    MissingPayoutDetails,

    /// Subscription payment for a plan that is not on sale
    #[error("subscription plan {0} is not active")]
    InactivePlan(PlanId),

    /// Transitions may only target a terminal status
    #[error("cannot transition a transaction to `{0}`")]
    InvalidStatusTarget(TransactionStatus),

    #[error("unknown transaction type `{0}`")]
    UnknownType(String),

    #[error("unknown transaction status `{0}`")]
    UnknownStatus(String),

    /// Transaction has already left `pending`
    #[error("transaction {id} already processed (status `{status}`)")]
    AlreadyProcessed {
        id: TransactionId,
        status: TransactionStatus,
    },

    /// Duplicate transaction ID
    #[error("duplicate transaction ID {0}")]
    DuplicateTransaction(TransactionId),

    /// Referenced transaction ID does not exist
    #[error("transaction {0} not found")]
    TransactionNotFound(TransactionId),

    #[error("subscription plan {0} not found")]
    PlanNotFound(PlanId),

    #[error("profile {0} not found")]
    ProfileNotFound(UserId),

    /// Activation requested for a transaction that is not a subscription payment
    #[error("transaction {0} is not a subscription payment")]
    NotSubscriptionPayment(TransactionId),

    /// Activation requested for a payment that has not been approved
    #[error("payment {id} is `{status}`, not completed")]
    PaymentNotCompleted {
        id: TransactionId,
        status: TransactionStatus,
    },

    /// Subscription payment whose metadata carries no plan reference
    #[error("transaction {0} does not reference a subscription plan")]
    MissingPlanReference(TransactionId),

    /// Administrator-only operation requested by a regular user
    #[error("operation requires an administrator")]
    Forbidden,

    /// Gateway I/O failure (network, auth, storage)
    #[error("persistence failure: {0}")]
    Persistence(String),
}

/// How an error is surfaced to the user.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Validation,
    Conflict,
    NotFound,
    Forbidden,
    Persistence,
}

impl TransactionError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::InvalidAmount
            | Self::InsufficientBalance { .. }
            | Self::MissingPayoutDetails
            | Self::InactivePlan(_)
            | Self::InvalidStatusTarget(_)
            | Self::UnknownType(_)
            | Self::UnknownStatus(_)
            | Self::NotSubscriptionPayment(_) => ErrorKind::Validation,
            Self::AlreadyProcessed { .. }
            | Self::DuplicateTransaction(_)
            | Self::PaymentNotCompleted { .. } => ErrorKind::Conflict,
            Self::TransactionNotFound(_)
            | Self::PlanNotFound(_)
            | Self::ProfileNotFound(_)
            | Self::MissingPlanReference(_) => ErrorKind::NotFound,
            Self::Forbidden => ErrorKind::Forbidden,
            Self::Persistence(_) => ErrorKind::Persistence,
        }
    }

    /// Notification text for the presentation layer.
    pub fn user_message(&self) -> String {
        match self {
            Self::InvalidAmount => "Please enter a valid amount.".to_string(),
            Self::InsufficientBalance { .. } => "Insufficient balance.".to_string(),
            Self::MissingPayoutDetails => "Please enter your payment details.".to_string(),
            Self::InactivePlan(_) => "This plan is no longer available.".to_string(),
            Self::AlreadyProcessed { .. } | Self::DuplicateTransaction(_) => {
                "This transaction has already been processed.".to_string()
            }
            Self::Forbidden => "You are not allowed to do that.".to_string(),
            Self::Persistence(_) => "Something went wrong. Please try again.".to_string(),
            other => format!("Error: {other}"),
        }
    }
}

impl From<GatewayError> for TransactionError {
    fn from(err: GatewayError) -> Self {
        match err {
            GatewayError::Conflict { id, status } => Self::AlreadyProcessed { id, status },
            GatewayError::DuplicateTransaction(id) => Self::DuplicateTransaction(id),
            GatewayError::TransactionNotFound(id) => Self::TransactionNotFound(id),
            GatewayError::PlanNotFound(id) => Self::PlanNotFound(id),
            GatewayError::ProfileNotFound(id) => Self::ProfileNotFound(id),
            GatewayError::Io(message) => Self::Persistence(message),
        }
    }
}
