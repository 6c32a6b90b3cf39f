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

//! Rating request options and results.

use crate::base::Subscriber;
use crate::money::Money;
use crate::record::RatedCall;
use serde::{Deserialize, Serialize};

/// Per-request rating options.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RateOptions {
    /// Also return every rated call, in input order.
    pub collect_calls: bool,
}

impl RateOptions {
    pub fn with_calls() -> Self {
        Self {
            collect_calls: true,
        }
    }
}

/// Running total for one calling party within a request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubscriberTotal {
    pub phone_number: String,
    /// Empty for calling parties missing from the subscriber table.
    pub client_name: String,
    pub total_cost: Money,
    pub calls_count: u64,
}

impl SubscriberTotal {
    pub(crate) fn open(subscriber: &Subscriber) -> Self {
        Self {
            phone_number: subscriber.phone_number.clone(),
            client_name: subscriber.client_name.clone(),
            total_cost: Money::ZERO,
            calls_count: 0,
        }
    }
}

/// Outcome of a successful rating request.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Report {
    /// One entry per distinct calling party, sorted by phone number.
    pub totals: Vec<SubscriberTotal>,
    /// Present only when [`RateOptions::collect_calls`] was set; in input
    /// line order.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub calls: Option<Vec<RatedCall>>,
}

impl Report {
    pub fn total_cost(&self) -> Money {
        self.totals.iter().map(|total| total.total_cost).sum()
    }

    pub fn total_for(&self, phone_number: &str) -> Option<&SubscriberTotal> {
        self.totals
            .binary_search_by(|total| total.phone_number.as_str().cmp(phone_number))
            .ok()
            .map(|index| &self.totals[index])
    }
}
