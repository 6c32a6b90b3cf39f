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

//! Concurrency tests for the shared worker pool.
//!
//! Every test runs with parking_lot's deadlock detector watching the lock
//! graph, so a lock-order cycle between batches, stores and the engine fails
//! the test instead of hanging it.

use cdr_rater::{
    CancelScope, Engine, EngineConfig, Money, RateOptions, RatingError, Report, TariffRepository,
    TariffRule, TariffStore, Timeband, WeekdayMask,
};
use chrono::NaiveDate;
use crossbeam::channel::{self, Receiver};
use parking_lot::deadlock;
use std::io::{Cursor, Read};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

const CHEAP: &str = "380;Ukraine;1.00;0;00:00-00:00;1-7;0;2024-01-01\n";
const DEAR: &str = "380;Ukraine;2.00;0;00:00-00:00;1-7;0;2024-01-01\n";

// === Deadlock detector ===

struct DeadlockDetector {
    running: Arc<AtomicBool>,
    handle: JoinHandle<usize>,
}

impl DeadlockDetector {
    fn start() -> Self {
        let running = Arc::new(AtomicBool::new(true));
        let flag = Arc::clone(&running);
        let handle = thread::spawn(move || {
            let mut found = 0;
            while flag.load(Ordering::SeqCst) {
                thread::sleep(Duration::from_millis(50));
                let deadlocks = deadlock::check_deadlock();
                for (i, threads) in deadlocks.iter().enumerate() {
                    eprintln!("\n=== DEADLOCK #{} ===", i + 1);
                    for t in threads {
                        eprintln!("Thread ID: {:?}", t.thread_id());
                        eprintln!("Backtrace:\n{:#?}", t.backtrace());
                    }
                }
                found += deadlocks.len();
            }
            found
        });
        Self { running, handle }
    }

    fn stop(self) {
        self.running.store(false, Ordering::SeqCst);
        let found = self.handle.join().unwrap();
        assert_eq!(found, 0, "deadlock detected, see stderr");
    }
}

// === Helpers ===

fn engine(workers: usize) -> Arc<Engine> {
    let engine = Engine::new(EngineConfig::default().with_workers(workers)).unwrap();
    engine.load_tariffs(Cursor::new(CHEAP)).unwrap();
    engine.load_subscribers(Cursor::new("")).unwrap();
    Arc::new(engine)
}

fn stream(calling: &str, calls: usize) -> String {
    (0..calls)
        .map(|i| {
            format!(
                "2024-06-03 10:00:00|2024-06-03 10:01:00|{calling}|38050{i:07}|outgoing|no_answer|60|60|0|||\n"
            )
        })
        .collect()
}

fn rate(engine: &Engine, input: String, options: RateOptions) -> Result<Report, RatingError> {
    engine.rate_stream(Cursor::new(input), options, &CancelScope::new())
}

/// CDR input that never ends.
struct Endless(Cursor<Vec<u8>>);

impl Read for Endless {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        let n = self.0.read(buf)?;
        if n == 0 {
            self.0.set_position(0);
            return self.0.read(buf);
        }
        Ok(n)
    }
}

/// CDR input that yields its lines, then blocks in `read` once until
/// released.
struct Stalled {
    lines: Cursor<Vec<u8>>,
    release: Option<Receiver<()>>,
}

impl Read for Stalled {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        let n = self.lines.read(buf)?;
        if n == 0 {
            if let Some(release) = self.release.take() {
                let _ = release.recv_timeout(Duration::from_secs(10));
            }
        }
        Ok(n)
    }
}

fn large_table(rules: usize) -> Vec<TariffRule> {
    let start = NaiveDate::from_ymd_opt(2024, 1, 1)
        .unwrap()
        .and_hms_opt(0, 0, 0)
        .unwrap();
    (0..rules)
        .map(|i| TariffRule {
            prefix: format!("{}", 1_000_000 + i),
            destination: format!("Destination {i}"),
            rate_per_minute: Money(100),
            connection_fee: Money::ZERO,
            timeband: Timeband::ALL_DAY,
            weekdays: WeekdayMask::ANY,
            priority: 0,
            effective_start: start,
            expiry_exclusive: start,
        })
        .collect()
}

// === Tests ===

#[test]
fn concurrent_requests_are_isolated() {
    let detector = DeadlockDetector::start();
    let engine = engine(4);

    let handles: Vec<_> = (0..8)
        .map(|n| {
            let engine = Arc::clone(&engine);
            thread::spawn(move || {
                let caller = format!("{}", 1000 + n);
                let report = rate(&engine, stream(&caller, 50 + n), RateOptions::with_calls()).unwrap();
                (caller, n, report)
            })
        })
        .collect();

    for handle in handles {
        let (caller, n, report) = handle.join().unwrap();
        assert_eq!(report.totals.len(), 1);
        let total = report.total_for(&caller).unwrap();
        assert_eq!(total.calls_count, (50 + n) as u64);
        assert_eq!(total.total_cost, Money(100 * (50 + n) as i64));

        let calls = report.calls.unwrap();
        assert!(calls.windows(2).all(|w| w[0].sequence < w[1].sequence));
        assert!(calls.iter().all(|c| c.record.calling_party == caller));
    }

    detector.stop();
}

#[test]
fn reload_during_rating_never_mixes_tables() {
    let detector = DeadlockDetector::start();
    let engine = engine(4);
    let done = Arc::new(AtomicBool::new(false));

    let reloader = {
        let engine = Arc::clone(&engine);
        let done = Arc::clone(&done);
        thread::spawn(move || {
            let mut reloads = 0u64;
            loop {
                let table = if reloads % 2 == 0 { DEAR } else { CHEAP };
                engine.load_tariffs(Cursor::new(table)).unwrap();
                engine.load_subscribers(Cursor::new("2000;Acme\n")).unwrap();
                reloads += 1;
                if done.load(Ordering::SeqCst) {
                    return reloads;
                }
            }
        })
    };

    let raters: Vec<_> = (0..4)
        .map(|_| {
            let engine = Arc::clone(&engine);
            thread::spawn(move || {
                for _ in 0..10 {
                    let report = rate(&engine, stream("2000", 100), RateOptions::with_calls()).unwrap();
                    for call in report.calls.unwrap() {
                        assert!(
                            call.cost == Money(100) || call.cost == Money(200),
                            "unexpected cost {}",
                            call.cost
                        );
                    }
                }
            })
        })
        .collect();

    for rater in raters {
        rater.join().unwrap();
    }
    done.store(true, Ordering::SeqCst);
    assert!(reloader.join().unwrap() > 0);

    detector.stop();
}

#[test]
fn cancelling_one_request_spares_the_others() {
    let detector = DeadlockDetector::start();
    // a single worker forces both requests through the same queue
    let engine = engine(1);
    let scope = CancelScope::new();

    let endless = {
        let engine = Arc::clone(&engine);
        let scope = scope.clone();
        thread::spawn(move || {
            let input = Endless(Cursor::new(stream("3000", 1).into_bytes()));
            engine.rate_stream(input, RateOptions::default(), &scope)
        })
    };

    let bounded = {
        let engine = Arc::clone(&engine);
        thread::spawn(move || rate(&engine, stream("4000", 500), RateOptions::default()))
    };

    thread::sleep(Duration::from_millis(30));
    scope.cancel();

    assert_eq!(endless.join().unwrap(), Err(RatingError::Cancelled));
    let report = bounded.join().unwrap().unwrap();
    assert_eq!(report.total_for("4000").unwrap().calls_count, 500);

    detector.stop();
}

#[test]
fn first_error_under_contention() {
    let detector = DeadlockDetector::start();
    let engine = engine(8);

    let handles: Vec<_> = (0..6)
        .map(|n| {
            let engine = Arc::clone(&engine);
            thread::spawn(move || {
                let mut input = stream("5000", 200);
                if n % 2 == 0 {
                    input.push_str("not a cdr\n");
                    input.push_str(&stream("5000", 200));
                }
                (n, rate(&engine, input, RateOptions::default()))
            })
        })
        .collect();

    for handle in handles {
        let (n, result) = handle.join().unwrap();
        if n % 2 == 0 {
            assert!(matches!(result, Err(RatingError::Parse { line: 201, .. })));
        } else {
            assert_eq!(result.unwrap().total_cost(), Money(100 * 200));
        }
    }

    detector.stop();
}

#[test]
fn close_while_busy_joins_workers() {
    let detector = DeadlockDetector::start();
    let engine = engine(4);

    let requests: Vec<_> = (0..4)
        .map(|_| {
            let engine = Arc::clone(&engine);
            thread::spawn(move || {
                let input = Endless(Cursor::new(stream("6000", 3).into_bytes()));
                engine.rate_stream(input, RateOptions::default(), &CancelScope::new())
            })
        })
        .collect();

    thread::sleep(Duration::from_millis(30));
    engine.close();

    for request in requests {
        assert_eq!(request.join().unwrap(), Err(RatingError::ServiceClosed));
    }
    assert!(engine.is_closed());

    detector.stop();
}

#[test]
fn close_does_not_wait_for_a_stalled_reader() {
    let detector = DeadlockDetector::start();
    let engine = engine(2);
    let (release, released) = channel::bounded(1);

    let request = {
        let engine = Arc::clone(&engine);
        thread::spawn(move || {
            let input = Stalled {
                lines: Cursor::new(stream("7000", 1).into_bytes()),
                release: Some(released),
            };
            engine.rate_stream(input, RateOptions::default(), &CancelScope::new())
        })
    };

    thread::sleep(Duration::from_millis(100));
    let started = Instant::now();
    engine.close();
    let closing = started.elapsed();
    assert!(closing < Duration::from_secs(2), "close took {closing:?}");

    release.send(()).unwrap();
    assert_eq!(request.join().unwrap(), Err(RatingError::ServiceClosed));

    detector.stop();
}

#[test]
fn reload_does_not_stall_readers() {
    let detector = DeadlockDetector::start();
    let store = Arc::new(TariffStore::new());
    store.replace_all(large_table(300_000)).unwrap();
    let running = Arc::new(AtomicBool::new(true));

    let reader = {
        let store = Arc::clone(&store);
        let running = Arc::clone(&running);
        thread::spawn(move || {
            let mut worst = Duration::ZERO;
            while running.load(Ordering::SeqCst) {
                let started = Instant::now();
                let snapshot = store.snapshot();
                worst = worst.max(started.elapsed());
                // freeing a snapshot this reader happened to outlive is not
                // part of the read
                drop(snapshot);
            }
            worst
        })
    };

    thread::sleep(Duration::from_millis(20));
    let started = Instant::now();
    store.replace_all(Vec::new()).unwrap();
    let reload = started.elapsed();
    thread::sleep(Duration::from_millis(20));

    running.store(false, Ordering::SeqCst);
    let worst = reader.join().unwrap();
    assert!(store.is_empty());
    assert!(
        worst < (reload / 4).max(Duration::from_millis(100)),
        "reader waited {worst:?} during a {reload:?} reload"
    );

    detector.stop();
}
