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

//! In-memory subscriber table.

use crate::base::Subscriber;
use crate::error::Result;
use crate::store::SubscriberRepository;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::mem;
use std::sync::Arc;
use tracing::info;

/// Subscriber repository holding an atomically replaceable phone map.
#[derive(Debug, Default)]
pub struct SubscriberStore {
    // Write lock is held only for the pointer swap, never while building
    // the new map or freeing the old one.
    current: RwLock<Arc<HashMap<String, Subscriber>>>,
}

impl SubscriberStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl SubscriberRepository for SubscriberStore {
    /// A later entry for the same phone number replaces an earlier one.
    fn replace_all(&self, subscribers: Vec<Subscriber>) -> Result<()> {
        let by_phone: HashMap<String, Subscriber> = subscribers
            .into_iter()
            .map(|sub| (sub.phone_number.clone(), sub))
            .collect();
        info!(subscribers = by_phone.len(), "publishing subscriber snapshot");
        let previous = mem::replace(&mut *self.current.write(), Arc::new(by_phone));
        drop(previous);
        Ok(())
    }

    fn lookup(&self, phone_number: &str) -> Result<Option<Subscriber>> {
        let snapshot = Arc::clone(&self.current.read());
        Ok(snapshot.get(phone_number).cloned())
    }

    fn len(&self) -> usize {
        self.current.read().len()
    }
}
