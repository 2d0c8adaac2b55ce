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

//! # Earnings Ledger
//!
//! This library derives user balances for an earn-by-engagement platform and
//! enforces the rules for creating and reviewing transactions: earnings,
//! withdrawals and subscription payments.
//!
//! ## Core Components
//!
//! - [`Engine`]: Ledger operations over a [`PersistenceGateway`]
//! - [`compute_balance`]: Pure balance derivation from a transaction list
//! - [`TransactionType`] / [`TransactionStatus`]: Classification and review state machine
//! - [`InMemoryGateway`]: Concurrent in-process gateway
//! - [`TransactionError`]: Error types for ledger operations
//!
//! ## Example
//!
//! ```
//! use earnings_ledger_rs::{Engine, InMemoryGateway, UserId};
//! use rust_decimal_macros::dec;
//! use std::sync::Arc;
//!
//! # tokio::runtime::Runtime::new().unwrap().block_on(async {
//! let engine = Engine::new(Arc::new(InMemoryGateway::new()));
//! let user = UserId::new_v4();
//!
//! // Earnings count immediately
//! engine.log_earning(user, dec!(500), "Trivia: Capital of Kenya?").await.unwrap();
//!
//! // Withdrawals wait for an administrator
//! let withdrawal = engine.request_withdrawal(user, dec!(100), "0712345678").await.unwrap();
//! assert_eq!(engine.get_balance(user).await.unwrap(), dec!(500));
//!
//! engine.approve_transaction(withdrawal.id).await.unwrap();
//! assert_eq!(engine.get_balance(user).await.unwrap(), dec!(400));
//! # });
//! ```
//!
//! ## Concurrency
//!
//! The engine keeps no mutable state of its own. Conflicting reviews of the
//! same transaction are settled by the gateway's update-if-pending guarantee.

pub mod balance;
mod base;
pub mod config;
mod engine;
pub mod error;
mod events;
pub mod gateway;
mod memory;
mod plan;
mod profile;
mod transaction;

pub use balance::{AccountSummary, LedgerStats, compute_balance};
pub use base::{PlanId, SubscriptionId, TransactionId, UserId};
pub use config::LedgerConfig;
pub use engine::{AttributedTransaction, Engine};
pub use error::{ErrorKind, TransactionError};
pub use events::LedgerEvent;
pub use gateway::{GatewayError, PersistenceGateway};
pub use memory::InMemoryGateway;
pub use plan::{NewUserSubscription, SubscriptionPlan, SubscriptionStatus, UserSubscription};
pub use profile::Profile;
pub use transaction::{
    Direction, EarningSource, MAX_AMOUNT, NewTransaction, Transaction, TransactionStatus,
    TransactionType, is_valid_amount,
};
