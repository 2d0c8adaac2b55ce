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

//! Ledger engine.
//!
//! The [`Engine`] owns the ledger rules, not the data. Every call fetches what
//! it needs from the [`PersistenceGateway`], applies the rules and writes at
//! most one transaction row.
//!
//! # Operations
//!
//! - **Earnings**: platform-awarded credits, completed on creation.
//! - **Withdrawals**: pending debits, limited by the completed balance.
//! - **Subscription payments**: pending debits for an active plan.
//! - **Approve / decline**: administrator review of pending transactions.
//!   Approving a subscription payment also activates the subscription; a
//!   failed activation can be finished later with
//!   [`Engine::activate_subscription_for`].
//!
//! # Concurrency
//!
//! The engine holds no mutable state. Two administrators acting on the same
//! transaction are serialized by the gateway's update-if-pending guarantee;
//! the loser receives [`TransactionError::AlreadyProcessed`].

use crate::TransactionError;
use crate::balance::{AccountSummary, LedgerStats, compute_balance};
use crate::base::{PlanId, TransactionId, UserId};
use crate::config::LedgerConfig;
use crate::events::LedgerEvent;
use crate::gateway::{GatewayError, PersistenceGateway};
use crate::plan::{NewUserSubscription, SubscriptionPlan, UserSubscription};
use crate::profile::Profile;
use crate::transaction::{NewTransaction, Transaction, TransactionStatus, TransactionType};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Serialize;
use serde_json::json;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::{debug, error, info, warn};

/// A transaction paired with its owner's profile, for the review queue.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AttributedTransaction {
    #[serde(flatten)]
    pub transaction: Transaction,
    /// `None` when the identity provider has no profile for the owner.
    pub owner: Option<Profile>,
}

/// Ledger engine over an external persistence gateway.
///
/// # Invariants
///
/// - Amounts are strictly positive; direction comes from the type.
/// - Only `completed` transactions affect a balance.
/// - `completed` and `declined` are terminal.
pub struct Engine {
    gateway: Arc<dyn PersistenceGateway>,
    config: LedgerConfig,
    events: broadcast::Sender<LedgerEvent>,
}

impl Engine {
    /// Creates an engine with the default configuration.
    pub fn new(gateway: Arc<dyn PersistenceGateway>) -> Self {
        Self::with_config(gateway, LedgerConfig::default())
    }

    pub fn with_config(gateway: Arc<dyn PersistenceGateway>, config: LedgerConfig) -> Self {
        let (events, _) = broadcast::channel(config.event_capacity.max(1));
        Engine {
            gateway,
            config,
            events,
        }
    }

    pub fn config(&self) -> &LedgerConfig {
        &self.config
    }

    /// Receives a [`LedgerEvent`] after every operation that changes a balance.
    pub fn subscribe(&self) -> broadcast::Receiver<LedgerEvent> {
        self.events.subscribe()
    }

    // === Reads ===

    /// Current balance, recomputed from the user's completed transactions.
    pub async fn get_balance(&self, user_id: UserId) -> Result<Decimal, TransactionError> {
        let completed = self
            .gateway
            .list_transactions(user_id, Some(TransactionStatus::Completed))
            .await
            .inspect_err(|e| error!(%user_id, error = %e, "failed to load transactions"))?;
        let balance = compute_balance(&completed);
        debug!(%user_id, %balance, rows = completed.len(), "computed balance");
        Ok(balance)
    }

    pub async fn account_summary(
        &self,
        user_id: UserId,
    ) -> Result<AccountSummary, TransactionError> {
        let transactions = self.gateway.list_transactions(user_id, None).await?;
        Ok(AccountSummary::from_transactions(user_id, &transactions)
            .with_precision(self.config.display_precision))
    }

    /// A user's history, newest first.
    pub async fn list_user_transactions(
        &self,
        user_id: UserId,
    ) -> Result<Vec<Transaction>, TransactionError> {
        Ok(self.gateway.list_transactions(user_id, None).await?)
    }

    /// Review queue across all users, newest first.
    pub async fn list_transactions(
        &self,
        status: Option<TransactionStatus>,
    ) -> Result<Vec<AttributedTransaction>, TransactionError> {
        let transactions = self.gateway.list_all_transactions(status).await?;

        let mut owners: HashMap<UserId, Option<Profile>> = HashMap::new();
        for tx in &transactions {
            if owners.contains_key(&tx.user_id) {
                continue;
            }
            let owner = match self.gateway.get_profile(tx.user_id).await {
                Ok(profile) => Some(profile),
                Err(GatewayError::ProfileNotFound(_)) => None,
                Err(e) => return Err(e.into()),
            };
            owners.insert(tx.user_id, owner);
        }

        Ok(transactions
            .into_iter()
            .map(|transaction| AttributedTransaction {
                owner: owners.get(&transaction.user_id).cloned().flatten(),
                transaction,
            })
            .collect())
    }

    /// Dashboard figures: revenue, review backlog, users and running subscriptions.
    pub async fn stats(&self) -> Result<LedgerStats, TransactionError> {
        let transactions = self.gateway.list_all_transactions(None).await?;
        let total_users = self.gateway.count_profiles().await?;
        let subscriptions = self.gateway.list_all_subscriptions().await?;
        Ok(LedgerStats::from_transactions(&transactions).with_accounts(
            total_users,
            &subscriptions,
            Utc::now(),
        ))
    }

    /// A user's subscriptions, most recently started first. Subscriptions
    /// past their end are reported as expired.
    pub async fn user_subscriptions(
        &self,
        user_id: UserId,
    ) -> Result<Vec<UserSubscription>, TransactionError> {
        let now = Utc::now();
        let mut subscriptions = self.gateway.list_subscriptions(user_id).await?;
        for subscription in &mut subscriptions {
            subscription.status = subscription.status_at(now);
        }
        Ok(subscriptions)
    }

    pub async fn get_profile(&self, user_id: UserId) -> Result<Profile, TransactionError> {
        Ok(self.gateway.get_profile(user_id).await?)
    }

    /// Plans on sale, cheapest first.
    pub async fn list_plans(&self) -> Result<Vec<SubscriptionPlan>, TransactionError> {
        Ok(self.gateway.list_plans(true).await?)
    }

    // === Creation ===

    /// Records a platform-awarded earning. It counts toward the balance at once.
    ///
    /// # Errors
    ///
    /// - [`TransactionError::InvalidAmount`] - `amount <= 0`; nothing is written.
    /// - [`TransactionError::Persistence`] - the insert failed.
    pub async fn log_earning(
        &self,
        user_id: UserId,
        amount: Decimal,
        description: impl Into<String>,
    ) -> Result<Transaction, TransactionError> {
        let record = NewTransaction::new(user_id, TransactionType::Earning, amount, description)
            .inspect_err(|e| warn!(%user_id, %amount, error = %e, "rejected earning"))?;

        let transaction = self.insert(record).await?;
        self.notify_balance_changed(&transaction);
        Ok(transaction)
    }

    /// Files a withdrawal for administrator review.
    ///
    /// The amount is not subtracted until the withdrawal is approved.
    ///
    /// # Errors
    ///
    /// - [`TransactionError::InvalidAmount`] - `amount <= 0`.
    /// - [`TransactionError::MissingPayoutDetails`] - `details` is blank.
    /// - [`TransactionError::InsufficientBalance`] - `amount` exceeds the
    ///   completed balance (unless the limit is disabled in [`LedgerConfig`]).
    /// - [`TransactionError::Persistence`] - a read or the insert failed.
    pub async fn request_withdrawal(
        &self,
        user_id: UserId,
        amount: Decimal,
        details: &str,
    ) -> Result<Transaction, TransactionError> {
        let details = details.trim();
        let record = NewTransaction::new(
            user_id,
            TransactionType::Withdrawal,
            amount,
            format!("Withdrawal request. Details: {details}"),
        )
        .inspect_err(|e| warn!(%user_id, %amount, error = %e, "rejected withdrawal"))?;

        if details.is_empty() {
            warn!(%user_id, "rejected withdrawal without payout details");
            return Err(TransactionError::MissingPayoutDetails);
        }

        if self.config.enforce_withdrawal_limit {
            let available = self.get_balance(user_id).await?;
            if amount > available {
                warn!(%user_id, %amount, %available, "rejected withdrawal over balance");
                return Err(TransactionError::InsufficientBalance {
                    requested: amount,
                    available,
                });
            }
        }

        self.insert(record).await
    }

    /// Files a payment for `plan_id` for administrator review.
    ///
    /// # Errors
    ///
    /// - [`TransactionError::PlanNotFound`] - no such plan.
    /// - [`TransactionError::InactivePlan`] - the plan is not on sale.
    /// - [`TransactionError::InvalidAmount`] - the plan's price is not positive.
    /// - [`TransactionError::Persistence`] - a read or the insert failed.
    pub async fn create_subscription_payment(
        &self,
        user_id: UserId,
        plan_id: PlanId,
    ) -> Result<Transaction, TransactionError> {
        let plan = self.gateway.get_plan(plan_id).await?;
        if !plan.is_active {
            warn!(%user_id, %plan_id, "rejected payment for inactive plan");
            return Err(TransactionError::InactivePlan(plan_id));
        }

        let record = NewTransaction::new(
            user_id,
            TransactionType::SubscriptionPayment,
            plan.price,
            format!("Payment for {} plan", plan.name),
        )?
        .with_metadata(json!({ "plan_id": plan.id }));

        self.insert(record).await
    }

    // === Review ===

    /// Marks a pending transaction `completed`.
    pub async fn approve_transaction(
        &self,
        id: TransactionId,
    ) -> Result<Transaction, TransactionError> {
        self.update_transaction_status(id, TransactionStatus::Completed)
            .await
    }

    /// Marks a pending transaction `declined`. The amount never touches the balance.
    pub async fn decline_transaction(
        &self,
        id: TransactionId,
    ) -> Result<Transaction, TransactionError> {
        self.update_transaction_status(id, TransactionStatus::Declined)
            .await
    }

    /// Moves a pending transaction to a terminal status.
    ///
    /// Approving a subscription payment activates the user's subscription for
    /// the plan's duration. The plan is resolved before the status is written,
    /// so a missing plan leaves the transaction pending.
    ///
    /// # Errors
    ///
    /// - [`TransactionError::InvalidStatusTarget`] - `new_status` is `pending`.
    /// - [`TransactionError::AlreadyProcessed`] - the transaction is terminal,
    ///   including when another caller won a concurrent update.
    /// - [`TransactionError::TransactionNotFound`] - no such transaction.
    /// - [`TransactionError::MissingPlanReference`] /
    ///   [`TransactionError::PlanNotFound`] - approving a subscription payment
    ///   whose plan cannot be resolved.
    /// - [`TransactionError::Persistence`] - a gateway call failed. A failure
    ///   while activating the subscription is reported after the status change
    ///   has been stored; it is not rolled back. Call
    ///   [`Engine::activate_subscription_for`] to finish the activation.
    pub async fn update_transaction_status(
        &self,
        id: TransactionId,
        new_status: TransactionStatus,
    ) -> Result<Transaction, TransactionError> {
        let current = self.gateway.get_transaction(id).await?;
        current
            .status
            .transition(id, new_status)
            .inspect_err(|e| warn!(transaction_id = %id, error = %e, "rejected transition"))?;

        let plan = match (new_status, current.transaction_type) {
            (TransactionStatus::Completed, TransactionType::SubscriptionPayment) => {
                let plan_id = current
                    .plan_id()
                    .ok_or(TransactionError::MissingPlanReference(id))?;
                Some(self.gateway.get_plan(plan_id).await?)
            }
            _ => None,
        };

        let now = Utc::now();
        let updated = self
            .gateway
            .update_transaction_status(id, new_status, now)
            .await
            .inspect_err(|e| warn!(transaction_id = %id, error = %e, "status update failed"))?;
        info!(
            transaction_id = %id,
            user_id = %updated.user_id,
            kind = %updated.transaction_type,
            status = %updated.status,
            "transaction reviewed"
        );

        if updated.status == TransactionStatus::Completed {
            self.notify_balance_changed(&updated);
        }

        if let Some(plan) = plan {
            self.activate(&updated, &plan, now).await?;
        }

        Ok(updated)
    }

    /// Activates the subscription bought by an approved payment.
    ///
    /// Idempotent: if the payment already activated a subscription, that
    /// subscription is returned and nothing is written. Used to finish an
    /// approval whose activation step failed.
    ///
    /// # Errors
    ///
    /// - [`TransactionError::TransactionNotFound`] - no such transaction.
    /// - [`TransactionError::NotSubscriptionPayment`] - wrong transaction type.
    /// - [`TransactionError::PaymentNotCompleted`] - the payment is pending or
    ///   declined.
    /// - [`TransactionError::MissingPlanReference`] /
    ///   [`TransactionError::PlanNotFound`] - the plan cannot be resolved.
    /// - [`TransactionError::Persistence`] - a gateway call failed.
    pub async fn activate_subscription_for(
        &self,
        payment_id: TransactionId,
    ) -> Result<UserSubscription, TransactionError> {
        let payment = self.gateway.get_transaction(payment_id).await?;
        if payment.transaction_type != TransactionType::SubscriptionPayment {
            return Err(TransactionError::NotSubscriptionPayment(payment_id));
        }
        if payment.status != TransactionStatus::Completed {
            return Err(TransactionError::PaymentNotCompleted {
                id: payment_id,
                status: payment.status,
            });
        }

        if let Some(existing) = self.gateway.subscription_for_payment(payment_id).await? {
            debug!(transaction_id = %payment_id, subscription_id = %existing.id, "already active");
            return Ok(existing);
        }

        let plan_id = payment
            .plan_id()
            .ok_or(TransactionError::MissingPlanReference(payment_id))?;
        let plan = self.gateway.get_plan(plan_id).await?;
        self.activate(&payment, &plan, Utc::now()).await
    }

    async fn activate(
        &self,
        payment: &Transaction,
        plan: &SubscriptionPlan,
        now: DateTime<Utc>,
    ) -> Result<UserSubscription, TransactionError> {
        let record = NewUserSubscription::for_payment(payment, plan, now);
        let subscription = self
            .gateway
            .activate_subscription(record)
            .await
            .inspect_err(|e| {
                error!(transaction_id = %payment.id, error = %e, "subscription activation failed")
            })?;
        info!(
            subscription_id = %subscription.id,
            user_id = %subscription.user_id,
            plan_id = %plan.id,
            ends_at = %subscription.ends_at,
            "subscription activated"
        );
        Ok(subscription)
    }

    async fn insert(&self, record: NewTransaction) -> Result<Transaction, TransactionError> {
        let user_id = record.user_id;
        let transaction = self
            .gateway
            .insert_transaction(record)
            .await
            .inspect_err(|e| error!(%user_id, error = %e, "failed to insert transaction"))?;
        info!(
            transaction_id = %transaction.id,
            %user_id,
            kind = %transaction.transaction_type,
            amount = %transaction.amount,
            status = %transaction.status,
            "transaction created"
        );
        Ok(transaction)
    }

    fn notify_balance_changed(&self, transaction: &Transaction) {
        // No receivers is fine
        let _ = self.events.send(LedgerEvent::BalanceChanged {
            user_id: transaction.user_id,
            transaction_id: transaction.id,
        });
    }
}
