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

//! In-memory tariff table indexed by exact prefix.

use crate::base::normalize_number;
use crate::error::Result;
use crate::store::TariffRepository;
use crate::tariff::TariffRule;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::iter::FusedIterator;
use std::mem;
use std::ops::ControlFlow;
use std::slice;
use std::sync::Arc;
use tracing::info;

/// Immutable, fully built view of the tariff table.
#[derive(Debug, Default)]
pub struct TariffSnapshot {
    /// Rules in load order; a rule's index is its identity.
    rules: Vec<TariffRule>,
    /// Exact prefix to the positions of every rule registered under it.
    by_prefix: HashMap<String, Vec<usize>>,
    max_prefix_len: usize,
}

impl TariffSnapshot {
    pub fn new(rules: Vec<TariffRule>) -> Self {
        let mut by_prefix: HashMap<String, Vec<usize>> = HashMap::with_capacity(rules.len());
        let mut max_prefix_len = 0;
        for (position, rule) in rules.iter().enumerate() {
            by_prefix.entry(rule.prefix.clone()).or_default().push(position);
            max_prefix_len = max_prefix_len.max(rule.prefix.len());
        }
        Self {
            rules,
            by_prefix,
            max_prefix_len,
        }
    }

    pub fn rules(&self) -> &[TariffRule] {
        &self.rules
    }

    pub fn max_prefix_len(&self) -> usize {
        self.max_prefix_len
    }

    /// Every rule whose prefix is a leading part of `number`, paired with the
    /// matched prefix length, longest prefixes first and load order within
    /// one prefix.
    ///
    /// A leading `+` is ignored. The sequence always runs down to length 1;
    /// consumers that want to stop early simply stop pulling.
    pub fn candidates<'a, 'n>(&'a self, number: &'n str) -> Candidates<'a, 'n> {
        let number = normalize_number(number);
        Candidates {
            snapshot: self,
            number,
            next_len: self.max_prefix_len.min(number.len()),
            current_len: 0,
            pending: Default::default(),
        }
    }

    /// Visitor form of [`candidates`](Self::candidates): `visit` receives each
    /// `(rule, prefix_len)` pair and returns `ControlFlow::Break` to stop.
    pub fn for_each_candidate<F>(&self, number: &str, mut visit: F)
    where
        F: FnMut(&TariffRule, usize) -> ControlFlow<()>,
    {
        for (rule, len) in self.candidates(number) {
            if visit(rule, len).is_break() {
                return;
            }
        }
    }
}

/// Lazy candidate sequence produced by [`TariffSnapshot::candidates`].
#[derive(Debug)]
pub struct Candidates<'a, 'n> {
    snapshot: &'a TariffSnapshot,
    number: &'n str,
    /// Next prefix length to look up; 0 once lengths are exhausted.
    next_len: usize,
    /// Prefix length of the rules in `pending`.
    current_len: usize,
    pending: slice::Iter<'a, usize>,
}

impl<'a> Iterator for Candidates<'a, '_> {
    type Item = (&'a TariffRule, usize);

    fn next(&mut self) -> Option<Self::Item> {
        let snapshot = self.snapshot;
        loop {
            if let Some(&position) = self.pending.next() {
                return Some((&snapshot.rules[position], self.current_len));
            }
            if self.next_len == 0 {
                return None;
            }
            let len = self.next_len;
            self.next_len -= 1;
            // `get` returns None when `len` splits a multi-byte character
            if let Some(positions) = self
                .number
                .get(..len)
                .and_then(|prefix| snapshot.by_prefix.get(prefix))
            {
                self.current_len = len;
                self.pending = positions.iter();
            }
        }
    }
}

impl FusedIterator for Candidates<'_, '_> {}

/// Tariff repository holding an atomically replaceable [`TariffSnapshot`].
#[derive(Debug, Default)]
pub struct TariffStore {
    // Write lock is held only for the pointer swap, never while building
    // the new snapshot or freeing the old one.
    current: RwLock<Arc<TariffSnapshot>>,
}

impl TariffStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Visits candidates for `number` against the current snapshot.
    pub fn for_each_candidate<F>(&self, number: &str, visit: F)
    where
        F: FnMut(&TariffRule, usize) -> ControlFlow<()>,
    {
        self.snapshot().for_each_candidate(number, visit);
    }
}

impl TariffRepository for TariffStore {
    fn replace_all(&self, rules: Vec<TariffRule>) -> Result<()> {
        let snapshot = Arc::new(TariffSnapshot::new(rules));
        info!(
            rules = snapshot.rules.len(),
            prefixes = snapshot.by_prefix.len(),
            max_prefix_len = snapshot.max_prefix_len,
            "publishing tariff snapshot"
        );
        let previous = mem::replace(&mut *self.current.write(), snapshot);
        // freed here, after the guard, unless a reader still holds it
        drop(previous);
        Ok(())
    }

    fn snapshot(&self) -> Arc<TariffSnapshot> {
        Arc::clone(&self.current.read())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::money::Money;
    use crate::window::{Timeband, WeekdayMask};
    use chrono::NaiveDate;

    fn rule(prefix: &str, destination: &str) -> TariffRule {
        let day = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();
        TariffRule {
            prefix: prefix.into(),
            destination: destination.into(),
            rate_per_minute: Money(100),
            connection_fee: Money::ZERO,
            timeband: Timeband::ALL_DAY,
            weekdays: WeekdayMask::ANY,
            priority: 0,
            effective_start: day.and_hms_opt(0, 0, 0).unwrap(),
            expiry_exclusive: day.and_hms_opt(0, 0, 0).unwrap(),
        }
    }

    fn visited(snapshot: &TariffSnapshot, number: &str) -> Vec<(String, usize)> {
        snapshot
            .candidates(number)
            .map(|(rule, len)| (rule.destination.clone(), len))
            .collect()
    }

    #[test]
    fn empty_store_yields_nothing() {
        let store = TariffStore::new();
        assert!(store.is_empty());
        assert_eq!(store.snapshot().candidates("380441234567").count(), 0);
    }

    #[test]
    fn candidates_run_longest_prefix_first() {
        let snapshot = TariffSnapshot::new(vec![
            rule("380", "Ukraine"),
            rule("38044", "Kyiv"),
            rule("3", "Zone 3"),
            rule("7", "Russia"),
        ]);
        assert_eq!(snapshot.max_prefix_len(), 5);
        assert_eq!(
            visited(&snapshot, "380441234567"),
            vec![
                ("Kyiv".to_string(), 5),
                ("Ukraine".to_string(), 3),
                ("Zone 3".to_string(), 1)
            ]
        );
    }

    #[test]
    fn rules_sharing_a_prefix_keep_load_order() {
        let snapshot = TariffSnapshot::new(vec![
            rule("44", "first"),
            rule("4", "short"),
            rule("44", "second"),
        ]);
        assert_eq!(
            visited(&snapshot, "+4420"),
            vec![
                ("first".to_string(), 2),
                ("second".to_string(), 2),
                ("short".to_string(), 1)
            ]
        );
    }

    #[test]
    fn number_shorter_than_longest_prefix() {
        let snapshot = TariffSnapshot::new(vec![rule("38044", "Kyiv"), rule("38", "UA")]);
        assert_eq!(visited(&snapshot, "380"), vec![("UA".to_string(), 2)]);
    }

    #[test]
    fn plus_only_number_has_no_candidates() {
        let snapshot = TariffSnapshot::new(vec![rule("3", "Zone 3")]);
        assert!(visited(&snapshot, "+").is_empty());
        assert!(visited(&snapshot, "").is_empty());
    }

    #[test]
    fn visitor_can_stop_early() {
        let store = TariffStore::new();
        store
            .replace_all(vec![rule("380", "Ukraine"), rule("38044", "Kyiv")])
            .unwrap();
        let mut seen = Vec::new();
        store.for_each_candidate("380441234567", |rule, _| {
            seen.push(rule.destination.clone());
            ControlFlow::Break(())
        });
        assert_eq!(seen, vec!["Kyiv".to_string()]);
    }

    #[test]
    fn captured_snapshot_survives_reload() {
        let store = TariffStore::new();
        store.replace_all(vec![rule("7", "old")]).unwrap();
        let before = store.snapshot();
        store.replace_all(vec![rule("7", "new"), rule("8", "more")]).unwrap();

        assert_eq!(visited(&before, "79"), vec![("old".to_string(), 1)]);
        assert_eq!(visited(&store.snapshot(), "79"), vec![("new".to_string(), 1)]);
        assert_eq!(store.len(), 2);
    }
}
