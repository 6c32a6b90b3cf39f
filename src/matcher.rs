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

//! Tariff selection.
//!
//! # Selection rule
//!
//! Every candidate from [`TariffSnapshot::candidates`] is checked against the
//! call instant (date range, weekday, timeband). Among applicable rules:
//!
//! 1. higher `priority` wins;
//! 2. at equal priority, the longer matched prefix wins;
//! 3. at equal priority and prefix length, the first rule visited (load
//!    order) wins.
//!
//! The candidate sequence is consumed to the end, so a short prefix with a
//! strictly higher priority overrides a longer prefix: priority dominates,
//! specificity only breaks ties.

use crate::money::Money;
use crate::record::{AppliedTariff, CdrRecord, Direction};
use crate::store::TariffSnapshot;
use crate::tariff::{Rounding, TariffRule};
use crate::window::minute_of_day;
use chrono::{Datelike, NaiveDateTime};

/// An applicable rule together with the prefix length it matched on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Match<'a> {
    pub rule: &'a TariffRule,
    pub prefix_len: usize,
}

impl Match<'_> {
    fn beats(&self, best: &Match<'_>) -> bool {
        self.rule.priority > best.rule.priority
            || (self.rule.priority == best.rule.priority && self.prefix_len > best.prefix_len)
    }
}

/// Picks the single rule that prices a call to `number` starting at `at`.
pub fn match_best<'a>(snapshot: &'a TariffSnapshot, number: &str, at: NaiveDateTime) -> Option<Match<'a>> {
    let minute = minute_of_day(&at);
    let weekday = at.weekday();

    snapshot
        .candidates(number)
        .filter(|(rule, _)| rule.applies(at, minute, weekday))
        .map(|(rule, prefix_len)| Match { rule, prefix_len })
        .fold(None, |best, candidate| match best {
            Some(best) if !candidate.beats(&best) => Some(best),
            _ => Some(candidate),
        })
}

/// Prices one call: outgoing calls are matched against the tariff table,
/// every other direction is free. An outgoing call with no applicable rule
/// is free as well.
pub fn rate_call(
    snapshot: &TariffSnapshot,
    record: &CdrRecord,
    rounding: Rounding,
) -> (Money, Option<AppliedTariff>) {
    if record.direction != Direction::Outgoing {
        return (Money::ZERO, None);
    }
    match match_best(snapshot, &record.called_party, record.start_time) {
        Some(found) => (found.rule.cost_for(record, rounding), Some(found.rule.applied())),
        None => (Money::ZERO, None),
    }
}
