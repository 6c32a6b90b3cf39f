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

//! Tariff rules and call pricing.

use crate::money::Money;
use crate::record::{AppliedTariff, CdrRecord, Disposition};
use crate::window::{Timeband, WeekdayMask, minute_of_day};
use chrono::{Datelike, NaiveDateTime, Weekday};
use serde::{Deserialize, Serialize};

/// How the per-minute charge is rounded to whole minor units.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Rounding {
    /// `rate * seconds / 60`, truncated toward zero.
    #[default]
    Truncate,
    /// `(rate * seconds + 59) / 60`.
    Ceil,
}

impl Rounding {
    /// Converts a `rate * seconds` product to minor units.
    pub fn per_minute(self, rate_seconds: i64) -> i64 {
        match self {
            Self::Truncate => rate_seconds / 60,
            Self::Ceil => rate_seconds.saturating_add(59) / 60,
        }
    }
}

/// Pricing policy for destinations starting with `prefix`.
///
/// Rules are immutable once loaded and identified by load position; several
/// rules may overlap, the matcher picks one at rating time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TariffRule {
    pub prefix: String,
    pub destination: String,
    pub rate_per_minute: Money,
    pub connection_fee: Money,
    pub timeband: Timeband,
    pub weekdays: WeekdayMask,
    pub priority: i32,
    /// Inclusive.
    pub effective_start: NaiveDateTime,
    /// Exclusive.
    pub expiry_exclusive: NaiveDateTime,
}

impl TariffRule {
    /// Whether the rule is active at `at`: inside the date range, on an
    /// allowed weekday and within the timeband.
    pub fn is_applicable(&self, at: NaiveDateTime) -> bool {
        self.applies(at, minute_of_day(&at), at.weekday())
    }

    /// [`is_applicable`](Self::is_applicable) with the minute of day and
    /// weekday already derived from `at`.
    pub(crate) fn applies(&self, at: NaiveDateTime, minute: u16, weekday: Weekday) -> bool {
        self.effective_start <= at
            && at < self.expiry_exclusive
            && self.weekdays.allows(weekday)
            && self.timeband.contains(minute)
    }

    /// Connection fee (answered calls only) plus the per-minute charge for
    /// the billable seconds.
    pub fn cost_for(&self, record: &CdrRecord, rounding: Rounding) -> Money {
        let fee = if record.disposition == Disposition::Answered {
            self.connection_fee
        } else {
            Money::ZERO
        };
        let rate_seconds = self
            .rate_per_minute
            .minor_units()
            .saturating_mul(i64::from(record.billable_sec));
        fee + Money(rounding.per_minute(rate_seconds))
    }

    pub fn applied(&self) -> AppliedTariff {
        AppliedTariff {
            prefix: self.prefix.clone(),
            destination: self.destination.clone(),
            priority: self.priority,
        }
    }
}
