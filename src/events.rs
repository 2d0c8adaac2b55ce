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

//! Ledger change notifications.
//!
//! Views that render a balance subscribe here instead of caching the last
//! value they drew; on [`LedgerEvent::BalanceChanged`] they fetch it again.

use crate::base::{TransactionId, UserId};
use serde::Serialize;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum LedgerEvent {
    /// A completed transaction now counts toward `user_id`'s balance.
    BalanceChanged {
        user_id: UserId,
        transaction_id: TransactionId,
    },
}

impl LedgerEvent {
    pub fn user_id(&self) -> UserId {
        match self {
            Self::BalanceChanged { user_id, .. } => *user_id,
        }
    }
}
