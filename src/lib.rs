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

//! # CDR Rater
//!
//! This library rates call detail records (CDRs) against a prefix-indexed
//! tariff table and aggregates the cost per calling subscriber.
//!
//! ## Core Components
//!
//! - [`Engine`]: worker pool and rating pipeline; loads tables and rates streams
//! - [`TariffStore`] / [`SubscriberStore`]: snapshot stores swapped whole on reload
//! - [`match_best`]: priority-then-specificity tariff selection
//! - [`CancelScope`]: per-request cancellation and deadlines
//! - [`Report`]: per-subscriber totals and, optionally, every rated call
//! - [`RatingError`]: error types for load and rating failures
//!
//! ## Example
//!
//! ```
//! use cdr_rater::{CancelScope, Engine, EngineConfig, Money, RateOptions};
//! use std::io::Cursor;
//!
//! let engine = Engine::new(EngineConfig::default().with_workers(2)).unwrap();
//! engine
//!     .load_tariffs(Cursor::new("380;Ukraine;1.80;0.50;00:00-00:00;1-7;0;2024-01-01\n"))
//!     .unwrap();
//! engine.load_subscribers(Cursor::new("100;Acme\n")).unwrap();
//!
//! let cdrs = "2024-06-03 10:00:00|2024-06-03 10:02:00|100|380441234567|outgoing|answered|120|120|0|ACC|c1|t1\n";
//! let report = engine
//!     .rate_stream(Cursor::new(cdrs), RateOptions::default(), &CancelScope::new())
//!     .unwrap();
//!
//! let acme = report.total_for("100").unwrap();
//! assert_eq!(acme.client_name, "Acme");
//! assert_eq!(acme.total_cost, Money(410));
//! ```
//!
//! ## Thread Safety
//!
//! One engine serves any number of concurrent `rate_stream` calls. Table
//! reloads publish a fresh snapshot and never block readers.

mod base;
mod batch;
pub mod cancel;
pub mod config;
mod engine;
pub mod error;
pub mod loader;
pub mod matcher;
mod money;
mod record;
mod report;
pub mod store;
mod tariff;
mod window;

pub use base::{Sequence, Subscriber, normalize_number};
pub use cancel::CancelScope;
pub use config::{EngineConfig, TariffSchema};
pub use engine::Engine;
pub use error::{ParseError, RatingError, Result};
pub use matcher::{Match, match_best, rate_call};
pub use money::Money;
pub use record::{AppliedTariff, CdrRecord, Direction, Disposition, RatedCall};
pub use report::{RateOptions, Report, SubscriberTotal};
pub use store::{SubscriberRepository, SubscriberStore, TariffRepository, TariffSnapshot, TariffStore};
pub use tariff::{Rounding, TariffRule};
pub use window::{Timeband, WeekdayMask, minute_of_day};
