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

//! Engine configuration.

use serde::Deserialize;

/// Default display currency label.
pub const DEFAULT_CURRENCY: &str = "KES";
/// Environment variable for the currency label.
pub const CURRENCY_ENV_VAR: &str = "LEDGER_CURRENCY";
/// Environment variable for display precision.
pub const PRECISION_ENV_VAR: &str = "LEDGER_DISPLAY_PRECISION";
/// Environment variable for the log filter.
pub const LOG_ENV_VAR: &str = "RUST_LOG";

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct LedgerConfig {
    /// Single fixed currency; only used as a display label.
    pub currency: String,
    /// Decimal places applied when amounts are shown.
    pub display_precision: u32,
    /// Reject withdrawals larger than the completed balance.
    pub enforce_withdrawal_limit: bool,
    /// Buffered [`LedgerEvent`](crate::LedgerEvent)s per subscriber.
    pub event_capacity: usize,
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            currency: DEFAULT_CURRENCY.to_string(),
            display_precision: crate::balance::DISPLAY_PRECISION,
            enforce_withdrawal_limit: true,
            event_capacity: 64,
        }
    }
}
