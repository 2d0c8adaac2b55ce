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

//! In-process persistence gateway.
//!
//! Backs the CLI, the demo server and the tests. Rows live in [`DashMap`]s;
//! a status update holds the row's shard lock for the whole
//! check-and-set, which gives the update-if-pending guarantee the engine
//! relies on when several administrators act at once.

use crate::base::{PlanId, SubscriptionId, TransactionId, UserId};
use crate::gateway::{GatewayError, PersistenceGateway};
use crate::plan::{NewUserSubscription, SubscriptionPlan, SubscriptionStatus, UserSubscription};
use crate::profile::Profile;
use crate::transaction::{NewTransaction, Transaction, TransactionStatus};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use tracing::debug;

#[derive(Debug, Clone)]
struct StoredTransaction {
    /// Insertion order, breaks ties between equal `created_at`.
    sequence: u64,
    transaction: Transaction,
}

/// A thread-safe, in-memory [`PersistenceGateway`].
#[derive(Debug, Default)]
pub struct InMemoryGateway {
    transactions: DashMap<TransactionId, StoredTransaction>,
    next_sequence: AtomicU64,
    plans: DashMap<PlanId, SubscriptionPlan>,
    profiles: DashMap<UserId, Profile>,
    subscriptions: Mutex<Vec<UserSubscription>>,
    fail_reads: AtomicBool,
    fail_writes: AtomicBool,
    fail_activations: AtomicBool,
}

impl InMemoryGateway {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stores an existing row as-is, e.g. from an export.
    ///
    /// # Errors
    ///
    /// Returns [`GatewayError::DuplicateTransaction`] if the id is taken.
    pub fn restore_transaction(&self, transaction: Transaction) -> Result<(), GatewayError> {
        // Entry API keeps check-and-insert atomic
        match self.transactions.entry(transaction.id) {
            Entry::Occupied(_) => Err(GatewayError::DuplicateTransaction(transaction.id)),
            Entry::Vacant(entry) => {
                entry.insert(StoredTransaction {
                    sequence: self.next_sequence.fetch_add(1, Ordering::Relaxed),
                    transaction,
                });
                Ok(())
            }
        }
    }

    pub fn add_plan(&self, plan: SubscriptionPlan) {
        self.plans.insert(plan.id, plan);
    }

    /// Deletes a plan. Transactions referencing it are left untouched.
    pub fn remove_plan(&self, id: PlanId) -> Option<SubscriptionPlan> {
        self.plans.remove(&id).map(|(_, plan)| plan)
    }

    pub fn add_profile(&self, profile: Profile) {
        self.profiles.insert(profile.id, profile);
    }

    pub fn transaction_count(&self) -> usize {
        self.transactions.len()
    }

    /// Makes every subsequent read fail with [`GatewayError::Io`].
    pub fn set_fail_reads(&self, fail: bool) {
        self.fail_reads.store(fail, Ordering::SeqCst);
    }

    /// Makes every subsequent write fail with [`GatewayError::Io`].
    pub fn set_fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    /// Makes subscription activation fail with [`GatewayError::Io`] while
    /// every other write still succeeds.
    pub fn set_fail_activations(&self, fail: bool) {
        self.fail_activations.store(fail, Ordering::SeqCst);
    }

    fn check_reads(&self) -> Result<(), GatewayError> {
        if self.fail_reads.load(Ordering::SeqCst) {
            return Err(GatewayError::Io("read failed".to_string()));
        }
        Ok(())
    }

    fn check_writes(&self) -> Result<(), GatewayError> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(GatewayError::Io("write failed".to_string()));
        }
        Ok(())
    }

    fn collect_newest_first(&self, keep: impl Fn(&Transaction) -> bool) -> Vec<Transaction> {
        let mut rows: Vec<StoredTransaction> = self
            .transactions
            .iter()
            .filter(|entry| keep(&entry.transaction))
            .map(|entry| entry.value().clone())
            .collect();
        rows.sort_by(|a, b| {
            b.transaction
                .created_at
                .cmp(&a.transaction.created_at)
                .then(b.sequence.cmp(&a.sequence))
        });
        rows.into_iter().map(|row| row.transaction).collect()
    }

    fn collect_subscriptions(
        &self,
        keep: impl Fn(&UserSubscription) -> bool,
    ) -> Vec<UserSubscription> {
        let mut subscriptions: Vec<UserSubscription> = self
            .subscriptions
            .lock()
            .iter()
            .filter(|sub| keep(sub))
            .cloned()
            .collect();
        // Latest activation first among equal starts; the sort is stable
        subscriptions.reverse();
        subscriptions.sort_by(|a, b| b.starts_at.cmp(&a.starts_at));
        subscriptions
    }
}

#[async_trait]
impl PersistenceGateway for InMemoryGateway {
    async fn insert_transaction(
        &self,
        record: NewTransaction,
    ) -> Result<Transaction, GatewayError> {
        self.check_writes()?;
        let now = Utc::now();
        let transaction = Transaction {
            id: TransactionId::new_v4(),
            user_id: record.user_id,
            amount: record.amount,
            transaction_type: record.transaction_type,
            status: record.status,
            description: record.description,
            metadata: record.metadata,
            created_at: now,
            updated_at: now,
        };
        self.restore_transaction(transaction.clone())?;
        debug!(transaction_id = %transaction.id, "inserted transaction");
        Ok(transaction)
    }

    async fn update_transaction_status(
        &self,
        id: TransactionId,
        status: TransactionStatus,
        updated_at: DateTime<Utc>,
    ) -> Result<Transaction, GatewayError> {
        self.check_writes()?;
        let mut entry = self
            .transactions
            .get_mut(&id)
            .ok_or(GatewayError::TransactionNotFound(id))?;
        let stored = &mut entry.value_mut().transaction;

        if stored.status != TransactionStatus::Pending {
            return Err(GatewayError::Conflict {
                id,
                status: stored.status,
            });
        }
        stored.status = status;
        stored.updated_at = updated_at;
        Ok(stored.clone())
    }

    async fn get_transaction(&self, id: TransactionId) -> Result<Transaction, GatewayError> {
        self.check_reads()?;
        self.transactions
            .get(&id)
            .map(|entry| entry.transaction.clone())
            .ok_or(GatewayError::TransactionNotFound(id))
    }

    async fn list_transactions(
        &self,
        user_id: UserId,
        status: Option<TransactionStatus>,
    ) -> Result<Vec<Transaction>, GatewayError> {
        self.check_reads()?;
        Ok(self.collect_newest_first(|tx| {
            tx.user_id == user_id && status.is_none_or(|s| tx.status == s)
        }))
    }

    async fn list_all_transactions(
        &self,
        status: Option<TransactionStatus>,
    ) -> Result<Vec<Transaction>, GatewayError> {
        self.check_reads()?;
        Ok(self.collect_newest_first(|tx| status.is_none_or(|s| tx.status == s)))
    }

    async fn get_plan(&self, id: PlanId) -> Result<SubscriptionPlan, GatewayError> {
        self.check_reads()?;
        self.plans
            .get(&id)
            .map(|entry| entry.value().clone())
            .ok_or(GatewayError::PlanNotFound(id))
    }

    async fn list_plans(&self, active_only: bool) -> Result<Vec<SubscriptionPlan>, GatewayError> {
        self.check_reads()?;
        let mut plans: Vec<SubscriptionPlan> = self
            .plans
            .iter()
            .filter(|entry| !active_only || entry.is_active)
            .map(|entry| entry.value().clone())
            .collect();
        plans.sort_by(|a, b| a.price.cmp(&b.price).then_with(|| a.name.cmp(&b.name)));
        Ok(plans)
    }

    async fn get_profile(&self, id: UserId) -> Result<Profile, GatewayError> {
        self.check_reads()?;
        self.profiles
            .get(&id)
            .map(|entry| entry.value().clone())
            .ok_or(GatewayError::ProfileNotFound(id))
    }

    async fn count_profiles(&self) -> Result<usize, GatewayError> {
        self.check_reads()?;
        Ok(self.profiles.len())
    }

    async fn activate_subscription(
        &self,
        record: NewUserSubscription,
    ) -> Result<UserSubscription, GatewayError> {
        self.check_writes()?;
        if self.fail_activations.load(Ordering::SeqCst) {
            return Err(GatewayError::Io("activation failed".to_string()));
        }

        // Lookup and push under one lock so a payment activates at most once
        let mut subscriptions = self.subscriptions.lock();
        if let Some(existing) = subscriptions
            .iter()
            .find(|sub| sub.payment_id == record.payment_id)
        {
            debug!(payment_id = %record.payment_id, "subscription already active");
            return Ok(existing.clone());
        }

        let subscription = UserSubscription {
            id: SubscriptionId::new_v4(),
            user_id: record.user_id,
            plan_id: record.plan_id,
            payment_id: record.payment_id,
            status: SubscriptionStatus::Active,
            starts_at: record.starts_at,
            ends_at: record.ends_at,
        };
        subscriptions.push(subscription.clone());
        Ok(subscription)
    }

    async fn subscription_for_payment(
        &self,
        payment_id: TransactionId,
    ) -> Result<Option<UserSubscription>, GatewayError> {
        self.check_reads()?;
        Ok(self
            .subscriptions
            .lock()
            .iter()
            .find(|sub| sub.payment_id == payment_id)
            .cloned())
    }

    async fn list_subscriptions(
        &self,
        user_id: UserId,
    ) -> Result<Vec<UserSubscription>, GatewayError> {
        self.check_reads()?;
        Ok(self.collect_subscriptions(|sub| sub.user_id == user_id))
    }

    async fn list_all_subscriptions(&self) -> Result<Vec<UserSubscription>, GatewayError> {
        self.check_reads()?;
        Ok(self.collect_subscriptions(|_| true))
    }
}
