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

//! Per-request aggregation state for the rating pipeline.
//!
//! A batch lives for one [`Engine::rate_stream`](crate::Engine::rate_stream)
//! call and is shared between the reader and every worker that picks up one
//! of its jobs.
//!
//! ```text
//!  Reading ──reader done──► Draining ──pending == 0──► Completed ─┐
//!     │                        │                                  ├──► Closed
//!     └────── first error ─────┴──────────────────────► Failed ───┘
//! ```
//!
//! Totals are folded into a [`DashMap`] keyed by phone number, so workers
//! rating different subscribers do not contend. Rated calls go to a
//! lock-free [`SegQueue`] in completion order and are sorted back into input
//! order when the batch is finalized.

use crate::base::Subscriber;
use crate::cancel::CancelScope;
use crate::error::RatingError;
use crate::record::RatedCall;
use crate::report::{Report, SubscriberTotal};
use crossbeam::queue::SegQueue;
use dashmap::DashMap;
use parking_lot::{Condvar, Mutex};
use std::time::Duration;

#[derive(Debug, Default)]
struct Progress {
    /// Jobs submitted but not yet finished.
    pending: u64,
    /// The reader has submitted its last job.
    reading_done: bool,
}

impl Progress {
    fn is_settled(&self) -> bool {
        self.reading_done && self.pending == 0
    }
}

#[derive(Debug)]
pub(crate) struct Batch {
    collect_calls: bool,
    /// Request scope; cancelled by the first error.
    scope: CancelScope,
    totals: DashMap<String, SubscriberTotal>,
    calls: SegQueue<RatedCall>,
    error: Mutex<Option<RatingError>>,
    // pending and reading_done change under one lock so the last finish and
    // the end of reading cannot both miss the wake-up
    progress: Mutex<Progress>,
    settled: Condvar,
}

impl Batch {
    pub(crate) fn new(collect_calls: bool, scope: CancelScope) -> Self {
        Self {
            collect_calls,
            scope,
            totals: DashMap::new(),
            calls: SegQueue::new(),
            error: Mutex::new(None),
            progress: Mutex::new(Progress::default()),
            settled: Condvar::new(),
        }
    }

    pub(crate) fn scope(&self) -> &CancelScope {
        &self.scope
    }

    /// Records `error` unless an earlier one is already stored, and cancels
    /// the request scope. Later errors are dropped.
    pub(crate) fn fail(&self, error: RatingError) {
        let mut slot = self.error.lock();
        if slot.is_none() {
            *slot = Some(error);
            self.scope.cancel();
        }
    }

    pub(crate) fn has_failed(&self) -> bool {
        self.error.lock().is_some()
    }

    pub(crate) fn first_error(&self) -> Option<RatingError> {
        self.error.lock().clone()
    }

    pub(crate) fn add_pending(&self) {
        self.progress.lock().pending += 1;
    }

    pub(crate) fn finish_one(&self) {
        let mut progress = self.progress.lock();
        debug_assert!(progress.pending > 0, "finish_one without a pending job");
        progress.pending = progress.pending.saturating_sub(1);
        if progress.is_settled() {
            self.settled.notify_all();
        }
    }

    pub(crate) fn mark_reading_done(&self) {
        let mut progress = self.progress.lock();
        progress.reading_done = true;
        if progress.is_settled() {
            self.settled.notify_all();
        }
    }

    /// Folds one rated call into the running totals.
    ///
    /// The subscriber comes from the snapshot at fold time; if an earlier
    /// fold for the same number had no client name and this one does, the
    /// name is filled in.
    pub(crate) fn fold(&self, subscriber: Subscriber, call: RatedCall) {
        {
            let mut total = self
                .totals
                .entry(subscriber.phone_number.clone())
                .or_insert_with(|| SubscriberTotal::open(&subscriber));
            if total.client_name.is_empty() && !subscriber.client_name.is_empty() {
                total.client_name = subscriber.client_name;
            }
            total.total_cost += call.cost;
            total.calls_count += 1;
        }

        if self.collect_calls {
            self.calls.push(call);
        }
    }

    /// Blocks until every submitted job has finished, re-checking the
    /// caller and service scopes every `poll`.
    ///
    /// # Errors
    ///
    /// - The caller scope's error if the caller cancelled or timed out first.
    /// - [`RatingError::ServiceClosed`] if the service shut down first.
    pub(crate) fn wait(
        &self,
        caller: &CancelScope,
        service: &CancelScope,
        poll: Duration,
    ) -> Result<(), RatingError> {
        let mut progress = self.progress.lock();
        while !progress.is_settled() {
            if let Some(error) = caller.error() {
                drop(progress);
                self.fail(error.clone());
                return Err(error);
            }
            if service.is_cancelled() {
                drop(progress);
                self.fail(RatingError::ServiceClosed);
                return Err(RatingError::ServiceClosed);
            }
            self.settled.wait_for(&mut progress, poll);
        }
        Ok(())
    }

    /// Builds the report: totals sorted by phone number, calls (if
    /// collected) sorted back into input order.
    pub(crate) fn finalize(&self) -> Report {
        let mut totals: Vec<SubscriberTotal> =
            self.totals.iter().map(|entry| entry.value().clone()).collect();
        totals.sort_by(|a, b| a.phone_number.cmp(&b.phone_number));

        let calls = self.collect_calls.then(|| {
            let mut calls = Vec::with_capacity(self.calls.len());
            while let Some(call) = self.calls.pop() {
                calls.push(call);
            }
            calls.sort_by_key(|call| call.sequence);
            calls
        });

        Report { totals, calls }
    }
}
