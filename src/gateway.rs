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

//! Persistence boundary.
//!
//! The ledger owns no durable state. Every row lives behind a
//! [`PersistenceGateway`], which must give single-row atomicity and an
//! update-if-pending guarantee for status changes.

use crate::base::{PlanId, TransactionId, UserId};
use crate::plan::{NewUserSubscription, SubscriptionPlan, UserSubscription};
use crate::profile::Profile;
use crate::transaction::{NewTransaction, Transaction, TransactionStatus};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;

/// Failures reported by a gateway implementation.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum GatewayError {
    /// Conditional update found the row outside `pending`
    #[error("transaction {id} is `{status}`, not pending")]
    Conflict {
        id: TransactionId,
        status: TransactionStatus,
    },

    #[error("duplicate transaction ID {0}")]
    DuplicateTransaction(TransactionId),

    #[error("transaction {0} not found")]
    TransactionNotFound(TransactionId),

    #[error("subscription plan {0} not found")]
    PlanNotFound(PlanId),

    #[error("profile {0} not found")]
    ProfileNotFound(UserId),

    /// Transport or storage failure
    #[error("gateway I/O failure: {0}")]
    Io(String),
}

/// Row storage consumed by the [`Engine`](crate::Engine).
///
/// Implementations do not retry; timeouts belong to their transport.
#[async_trait]
pub trait PersistenceGateway: Send + Sync {
    /// Inserts one row, assigning its id and timestamps.
    async fn insert_transaction(&self, record: NewTransaction)
    -> Result<Transaction, GatewayError>;

    /// Sets `status` and `updated_at` only if the stored status is `pending`.
    ///
    /// Returns [`GatewayError::Conflict`] otherwise, leaving the row untouched.
    async fn update_transaction_status(
        &self,
        id: TransactionId,
        status: TransactionStatus,
        updated_at: DateTime<Utc>,
    ) -> Result<Transaction, GatewayError>;

    async fn get_transaction(&self, id: TransactionId) -> Result<Transaction, GatewayError>;

    /// A user's transactions, newest first, optionally filtered by status.
    async fn list_transactions(
        &self,
        user_id: UserId,
        status: Option<TransactionStatus>,
    ) -> Result<Vec<Transaction>, GatewayError>;

    /// Every user's transactions, newest first, optionally filtered by status.
    async fn list_all_transactions(
        &self,
        status: Option<TransactionStatus>,
    ) -> Result<Vec<Transaction>, GatewayError>;

    async fn get_plan(&self, id: PlanId) -> Result<SubscriptionPlan, GatewayError>;

    /// Plans ordered by ascending price.
    async fn list_plans(&self, active_only: bool) -> Result<Vec<SubscriptionPlan>, GatewayError>;

    async fn get_profile(&self, id: UserId) -> Result<Profile, GatewayError>;

    /// Number of profiles known to the identity provider.
    async fn count_profiles(&self) -> Result<usize, GatewayError>;

    /// Stores an active subscription for `record.payment_id`.
    ///
    /// Idempotent per payment: if one already exists it is returned as-is.
    async fn activate_subscription(
        &self,
        record: NewUserSubscription,
    ) -> Result<UserSubscription, GatewayError>;

    async fn subscription_for_payment(
        &self,
        payment_id: TransactionId,
    ) -> Result<Option<UserSubscription>, GatewayError>;

    /// A user's subscriptions, most recently started first.
    async fn list_subscriptions(
        &self,
        user_id: UserId,
    ) -> Result<Vec<UserSubscription>, GatewayError>;

    /// Every user's subscriptions, most recently started first.
    async fn list_all_subscriptions(&self) -> Result<Vec<UserSubscription>, GatewayError>;
}
