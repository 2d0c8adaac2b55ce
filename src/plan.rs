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

//! Subscription plans and the subscriptions they activate.

use crate::base::{PlanId, SubscriptionId, TransactionId, UserId};
use crate::transaction::Transaction;
use chrono::{DateTime, Duration, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// A plan users can pay for. Administrators own its lifecycle.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SubscriptionPlan {
    pub id: PlanId,
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub price: Decimal,
    pub duration_days: u32,
    pub is_active: bool,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum SubscriptionStatus {
    Active,
    Expired,
}

/// A subscription activated by an approved payment.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct UserSubscription {
    pub id: SubscriptionId,
    pub user_id: UserId,
    pub plan_id: PlanId,
    /// The `subscription_payment` that activated it. At most one
    /// subscription exists per payment.
    pub payment_id: TransactionId,
    pub status: SubscriptionStatus,
    pub starts_at: DateTime<Utc>,
    pub ends_at: DateTime<Utc>,
}

impl UserSubscription {
    pub fn is_active_at(&self, at: DateTime<Utc>) -> bool {
        self.status == SubscriptionStatus::Active && self.starts_at <= at && at < self.ends_at
    }

    /// Stored status, with an active subscription past its end read as expired.
    pub fn status_at(&self, at: DateTime<Utc>) -> SubscriptionStatus {
        match self.status {
            SubscriptionStatus::Active if at >= self.ends_at => SubscriptionStatus::Expired,
            status => status,
        }
    }
}

/// A subscription about to be inserted.
#[derive(Debug, Clone, PartialEq)]
pub struct NewUserSubscription {
    pub user_id: UserId,
    pub plan_id: PlanId,
    pub payment_id: TransactionId,
    pub starts_at: DateTime<Utc>,
    pub ends_at: DateTime<Utc>,
}

impl NewUserSubscription {
    /// Subscription bought by `payment`, running `plan.duration_days` from
    /// `starts_at`.
    pub fn for_payment(
        payment: &Transaction,
        plan: &SubscriptionPlan,
        starts_at: DateTime<Utc>,
    ) -> Self {
        Self {
            user_id: payment.user_id,
            plan_id: plan.id,
            payment_id: payment.id,
            starts_at,
            ends_at: starts_at + Duration::days(i64::from(plan.duration_days)),
        }
    }
}
