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

//! Snapshot repositories for the tariff and subscriber tables.
//!
//! Each store owns one immutable snapshot behind an [`Arc`]. A reload builds
//! a complete new snapshot off to the side and publishes it with a single
//! pointer swap, so a reader that captured the old snapshot keeps a
//! consistent view for the whole of its operation and never observes a
//! half-built table.
//!
//! The traits are the seam the [`Engine`](crate::Engine) talks to; the
//! in-memory stores are the default implementation.

mod subscriber;
mod tariff;

pub use subscriber::SubscriberStore;
pub use tariff::{Candidates, TariffSnapshot, TariffStore};

use crate::base::Subscriber;
use crate::error::Result;
use crate::tariff::TariffRule;
use std::sync::Arc;

/// Phone-number keyed subscriber table.
pub trait SubscriberRepository: Send + Sync {
    /// Replaces the whole table. Readers see either the old or the new table.
    fn replace_all(&self, subscribers: Vec<Subscriber>) -> Result<()>;

    /// Looks up a subscriber in the current table; `Ok(None)` on a miss.
    fn lookup(&self, phone_number: &str) -> Result<Option<Subscriber>>;

    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Prefix-indexed tariff table.
pub trait TariffRepository: Send + Sync {
    /// Replaces the whole table. Readers see either the old or the new table.
    fn replace_all(&self, rules: Vec<TariffRule>) -> Result<()>;

    /// The currently published snapshot. Callers capture it once per
    /// operation and do not re-read mid-operation.
    fn snapshot(&self) -> Arc<TariffSnapshot>;

    fn len(&self) -> usize {
        self.snapshot().rules().len()
    }

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
