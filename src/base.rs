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

//! Core identity types: record sequence numbers and subscribers.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Position of a CDR line within one rating request.
///
/// 0-based and strictly increasing in input order; used to restore file order
/// after out-of-order completion on the worker pool.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Deserialize, Serialize)]
#[serde(transparent)]
pub struct Sequence(pub u64);

impl Sequence {
    pub fn next(self) -> Sequence {
        Sequence(self.0 + 1)
    }
}

impl fmt::Display for Sequence {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A billed party, keyed by phone number.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Deserialize, Serialize)]
pub struct Subscriber {
    pub phone_number: String,
    pub client_name: String,
}

impl Subscriber {
    pub fn new(phone_number: impl Into<String>, client_name: impl Into<String>) -> Self {
        Self {
            phone_number: phone_number.into(),
            client_name: client_name.into(),
        }
    }

    /// Identity used for a calling party missing from the subscriber table.
    pub fn anonymous(phone_number: impl Into<String>) -> Self {
        Self::new(phone_number, String::new())
    }
}

/// Strips surrounding whitespace and one leading `+` from a dialled number.
pub fn normalize_number(number: &str) -> &str {
    let number = number.trim();
    number.strip_prefix('+').unwrap_or(number)
}
