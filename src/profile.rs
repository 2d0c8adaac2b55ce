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

//! User profiles, as supplied by the identity provider.

use crate::TransactionError;
use crate::base::UserId;
use serde::{Deserialize, Serialize};

/// Read-only view of a user. The ledger never mutates profiles.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Profile {
    pub id: UserId,
    pub full_name: String,
    pub email: String,
    #[serde(default)]
    pub avatar_url: Option<String>,
    pub referral_code: String,
    #[serde(default)]
    pub is_admin: bool,
}

impl Profile {
    /// # Errors
    ///
    /// Returns [`TransactionError::Forbidden`] for regular users.
    pub fn ensure_admin(&self) -> Result<(), TransactionError> {
        if self.is_admin {
            Ok(())
        } else {
            Err(TransactionError::Forbidden)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_profile(is_admin: bool) -> Profile {
        Profile {
            id: UserId::new_v4(),
            full_name: "Wanjiru Kamau".to_string(),
            email: "wanjiru@example.com".to_string(),
            avatar_url: None,
            referral_code: "WK2026".to_string(),
            is_admin,
        }
    }

    #[test]
    fn only_admins_pass() {
        assert_eq!(make_profile(true).ensure_admin(), Ok(()));
        assert_eq!(
            make_profile(false).ensure_admin(),
            Err(TransactionError::Forbidden)
        );
    }

    #[test]
    fn is_admin_defaults_to_false() {
        let json = serde_json::json!({
            "id": UserId::new_v4(),
            "full_name": "A",
            "email": "a@example.com",
            "referral_code": "A1",
        });
        let profile: Profile = serde_json::from_value(json).unwrap();
        assert!(!profile.is_admin);
        assert_eq!(profile.avatar_url, None);
    }
}
