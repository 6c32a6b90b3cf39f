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

//! Rating engine.
//!
//! The [`Engine`] owns the tariff and subscriber stores and a fixed pool of
//! worker threads started once at construction. Every concurrent
//! [`rate_stream`](Engine::rate_stream) call feeds the same dispatch queue:
//!
//! ```text
//!  caller thread                      worker pool
//!  ─────────────                      ───────────
//!  parse line ─► Job ──► [ dispatch ] ──► lookup subscriber
//!  parse line ─► Job ──►   channel    ──► match tariff, price call
//!      ...                            ──► fold into the request's Batch
//!  wait for batch ◄──────────────────────── pending reaches zero
//! ```
//!
//! The dispatch channel is bounded (by default a rendezvous channel), so a
//! reader blocks while every worker is busy. That keeps in-flight jobs at
//! roughly the worker count no matter how many requests stream at once.
//!
//! # Failure
//!
//! The first error a request hits (a malformed line, a read failure, a
//! repository failure, cancellation) is stored on its batch and cancels the
//! request scope. Queued jobs of that request are then discarded by the
//! workers, and the caller gets that one error and no report.

use crate::base::{Sequence, Subscriber};
use crate::batch::Batch;
use crate::cancel::CancelScope;
use crate::config::EngineConfig;
use crate::error::{RatingError, Result};
use crate::loader;
use crate::matcher;
use crate::record::{CdrRecord, RatedCall};
use crate::report::{RateOptions, Report};
use crate::store::{SubscriberRepository, SubscriberStore, TariffRepository, TariffStore};
use crossbeam::channel::{self, Receiver, RecvTimeoutError, SendTimeoutError, Sender};
use parking_lot::Mutex;
use std::io::Read;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::{self, JoinHandle};
use std::time::Instant;
use tracing::{debug, info, trace, warn};

/// One CDR line on its way to a worker.
struct Job {
    batch: Arc<Batch>,
    sequence: Sequence,
    record: CdrRecord,
}

/// State the workers share with the engine.
struct Shared {
    config: EngineConfig,
    tariffs: Arc<dyn TariffRepository>,
    subscribers: Arc<dyn SubscriberRepository>,
    /// Service-wide scope, cancelled by [`Engine::close`].
    shutdown: CancelScope,
}

/// Concurrent CDR rating service.
///
/// # Invariants
///
/// - Workers are started once, in [`Engine::new`], and joined once, in
///   [`Engine::close`].
/// - Each request sees one tariff snapshot and one subscriber table per job;
///   reloads never expose a partially built table.
/// - A request yields either a complete [`Report`] or exactly one error.
pub struct Engine {
    shared: Arc<Shared>,
    dispatch: Mutex<Option<Sender<Job>>>,
    workers: Mutex<Vec<JoinHandle<()>>>,
    closed: AtomicBool,
}

impl Engine {
    /// Starts an engine backed by empty in-memory stores.
    pub fn new(config: EngineConfig) -> Result<Self> {
        Self::with_repositories(
            config,
            Arc::new(TariffStore::new()),
            Arc::new(SubscriberStore::new()),
        )
    }

    /// Starts an engine over caller-supplied repositories.
    ///
    /// # Errors
    ///
    /// - [`RatingError::Config`] if `workers` is zero.
    /// - [`RatingError::Io`] if a worker thread cannot be spawned.
    pub fn with_repositories(
        config: EngineConfig,
        tariffs: Arc<dyn TariffRepository>,
        subscribers: Arc<dyn SubscriberRepository>,
    ) -> Result<Self> {
        if config.workers == 0 {
            return Err(RatingError::Config("workers must be at least 1".into()));
        }

        let (sender, receiver) = channel::bounded(config.queue_capacity);
        let worker_count = config.workers;
        let shared = Arc::new(Shared {
            config,
            tariffs,
            subscribers,
            shutdown: CancelScope::new(),
        });

        let engine = Engine {
            shared: Arc::clone(&shared),
            dispatch: Mutex::new(Some(sender)),
            workers: Mutex::new(Vec::with_capacity(worker_count)),
            closed: AtomicBool::new(false),
        };

        for id in 0..worker_count {
            let shared = Arc::clone(&shared);
            let receiver = receiver.clone();
            let handle = thread::Builder::new()
                .name(format!("cdr-rater-worker-{id}"))
                .spawn(move || worker_loop(&shared, &receiver))?;
            engine.workers.lock().push(handle);
        }

        info!(
            workers = worker_count,
            queue_capacity = engine.shared.config.queue_capacity,
            "rating engine started"
        );
        Ok(engine)
    }

    pub fn config(&self) -> &EngineConfig {
        &self.shared.config
    }

    /// Replaces the tariff table with the contents of `input`, parsed with
    /// the configured [`TariffSchema`](crate::TariffSchema).
    ///
    /// The whole input is parsed before anything is published; on error the
    /// previous table stays in force.
    pub fn load_tariffs<R: Read>(&self, input: R) -> Result<usize> {
        self.ensure_open()?;
        let rules = loader::read_tariffs(input, self.shared.config.tariff_schema)?;
        let count = rules.len();
        self.shared.tariffs.replace_all(rules)?;
        Ok(count)
    }

    /// Replaces the subscriber table with the contents of `input`. Same
    /// all-or-nothing behavior as [`load_tariffs`](Self::load_tariffs).
    pub fn load_subscribers<R: Read>(&self, input: R) -> Result<usize> {
        self.ensure_open()?;
        let subscribers = loader::read_subscribers(input)?;
        let count = subscribers.len();
        self.shared.subscribers.replace_all(subscribers)?;
        Ok(count)
    }

    pub fn tariff_count(&self) -> usize {
        self.shared.tariffs.len()
    }

    pub fn subscriber_count(&self) -> usize {
        self.shared.subscribers.len()
    }

    /// Rates every CDR line of `input` and aggregates totals per calling
    /// party.
    ///
    /// Runs the reading side on the calling thread and blocks until every
    /// submitted line has been rated, the request fails, or `cancel` fires.
    ///
    /// # Errors
    ///
    /// - [`RatingError::Parse`] / [`RatingError::Io`] for bad input.
    /// - [`RatingError::Lookup`] if a repository read fails.
    /// - [`RatingError::Cancelled`] / [`RatingError::DeadlineExceeded`] if
    ///   `cancel` fires first.
    /// - [`RatingError::ServiceClosed`] if the engine is closed or closing.
    pub fn rate_stream<R: Read>(
        &self,
        input: R,
        options: RateOptions,
        cancel: &CancelScope,
    ) -> Result<Report> {
        self.ensure_open()?;
        if let Some(error) = cancel.error() {
            return Err(error);
        }
        let sender = self
            .dispatch
            .lock()
            .clone()
            .ok_or(RatingError::ServiceClosed)?;

        let started = Instant::now();
        let batch = Arc::new(Batch::new(options.collect_calls, cancel.child()));
        let lines = self.submit_all(input, &batch, &sender);
        batch.mark_reading_done();
        drop(sender);

        let poll = self.shared.config.poll_interval();
        if let Err(error) = batch.wait(cancel, &self.shared.shutdown, poll) {
            let error = batch.first_error().unwrap_or(error);
            warn!(%error, lines, "rating request aborted");
            return Err(error);
        }
        // workers settle queued jobs unrated once shutdown starts
        if self.shared.shutdown.is_cancelled() {
            batch.fail(RatingError::ServiceClosed);
        }
        if let Some(error) = batch.first_error() {
            warn!(%error, lines, "rating request failed");
            return Err(error);
        }

        let report = batch.finalize();
        debug!(
            lines,
            subscribers = report.totals.len(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "rating request completed"
        );
        Ok(report)
    }

    /// Parses `input` and hands each record to the pool until the input
    /// ends or the batch fails. Returns the number of records submitted.
    fn submit_all<R: Read>(&self, input: R, batch: &Arc<Batch>, sender: &Sender<Job>) -> u64 {
        let mut sequence = Sequence::default();
        for record in loader::cdr_records(input) {
            if batch.has_failed() {
                break;
            }
            let record = match record {
                Ok(record) => record,
                Err(error) => {
                    batch.fail(error);
                    break;
                }
            };

            batch.add_pending();
            let job = Job {
                batch: Arc::clone(batch),
                sequence,
                record,
            };
            if let Err(error) = self.submit(sender, job, batch.scope()) {
                batch.fail(error);
                batch.finish_one();
                break;
            }
            sequence = sequence.next();
        }
        sequence.0
    }

    /// Blocks until a worker accepts `job`, re-checking the request and
    /// service scopes before each attempt and every poll interval.
    fn submit(&self, sender: &Sender<Job>, mut job: Job, scope: &CancelScope) -> Result<()> {
        let poll = self.shared.config.poll_interval();
        loop {
            if self.shared.shutdown.is_cancelled() {
                return Err(RatingError::ServiceClosed);
            }
            if let Some(error) = scope.error() {
                return Err(error);
            }
            match sender.send_timeout(job, poll) {
                Ok(()) => return Ok(()),
                Err(SendTimeoutError::Disconnected(_)) => return Err(RatingError::ServiceClosed),
                Err(SendTimeoutError::Timeout(returned)) => job = returned,
            }
        }
    }

    fn ensure_open(&self) -> Result<()> {
        if self.closed.load(Ordering::Acquire) {
            Err(RatingError::ServiceClosed)
        } else {
            Ok(())
        }
    }

    /// Stops accepting work, cancels the service scope and joins every
    /// worker. Requests still waiting fail with
    /// [`RatingError::ServiceClosed`]. Workers stop within one poll interval
    /// whether or not requests are still reading. Safe to call more than
    /// once.
    pub fn close(&self) {
        if self.closed.swap(true, Ordering::AcqRel) {
            return;
        }
        self.shared.shutdown.cancel();
        drop(self.dispatch.lock().take());

        let mut workers = self.workers.lock();
        let count = workers.len();
        for handle in workers.drain(..) {
            if handle.join().is_err() {
                warn!("rating worker panicked");
            }
        }
        info!(workers = count, "rating engine closed");
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }
}

impl Drop for Engine {
    fn drop(&mut self) {
        self.close();
    }
}

fn worker_loop(shared: &Shared, jobs: &Receiver<Job>) {
    let poll = shared.config.poll_interval();
    loop {
        if shared.shutdown.is_cancelled() {
            // settle whatever is still queued so no batch waits on it
            for job in jobs.try_iter() {
                job.batch.finish_one();
            }
            trace!("worker stopping");
            return;
        }
        let job = match jobs.recv_timeout(poll) {
            Ok(job) => job,
            Err(RecvTimeoutError::Timeout) => continue,
            Err(RecvTimeoutError::Disconnected) => return,
        };

        let batch = Arc::clone(&job.batch);
        let _finished = Finished(&batch);
        if batch.scope().is_cancelled() || shared.shutdown.is_cancelled() {
            trace!(sequence = %job.sequence, "discarding job of cancelled request");
        } else if let Err(error) = rate_job(shared, job) {
            batch.fail(error);
        }
    }
}

/// Settles one pending job of a batch when dropped, also while unwinding.
struct Finished<'a>(&'a Batch);

impl Drop for Finished<'_> {
    fn drop(&mut self) {
        if thread::panicking() {
            self.0.fail(RatingError::Lookup("rating worker panicked".into()));
        }
        self.0.finish_one();
    }
}

fn rate_job(shared: &Shared, job: Job) -> Result<()> {
    let Job {
        batch,
        sequence,
        record,
    } = job;

    let subscriber = shared
        .subscribers
        .lookup(&record.calling_party)?
        .unwrap_or_else(|| Subscriber::anonymous(record.calling_party.as_str()));

    let tariffs = shared.tariffs.snapshot();
    let (cost, tariff) = matcher::rate_call(&tariffs, &record, shared.config.rounding);

    batch.fold(
        subscriber,
        RatedCall {
            sequence,
            record,
            cost,
            tariff,
        },
    );
    Ok(())
}
