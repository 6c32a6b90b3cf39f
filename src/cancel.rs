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

//! Hierarchical cancellation scopes.
//!
//! A scope is cancelled when it is cancelled directly, when its deadline
//! passes, or when any ancestor is cancelled. Cancelling a child never
//! affects its parent or siblings, which is how one rating request is torn
//! down without touching other requests sharing the worker pool.
//!
//! # Example
//!
//! ```
//! use cdr_rater::{CancelScope, RatingError};
//!
//! let caller = CancelScope::new();
//! let request = caller.child();
//! request.cancel();
//! assert_eq!(request.error(), Some(RatingError::Cancelled));
//! assert!(!caller.is_cancelled());
//! ```

use crate::error::RatingError;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

#[derive(Debug, Clone, Default)]
pub struct CancelScope {
    inner: Arc<ScopeInner>,
}

#[derive(Debug, Default)]
struct ScopeInner {
    cancelled: AtomicBool,
    deadline: Option<Instant>,
    parent: Option<CancelScope>,
}

impl CancelScope {
    /// A root scope with no deadline.
    pub fn new() -> Self {
        Self::default()
    }

    /// A root scope that expires after `timeout`.
    pub fn with_timeout(timeout: Duration) -> Self {
        Self::with_deadline(Instant::now() + timeout)
    }

    pub fn with_deadline(deadline: Instant) -> Self {
        Self::build(Some(deadline), None)
    }

    /// A scope cancelled whenever `self` is, and cancellable on its own.
    pub fn child(&self) -> Self {
        Self::build(None, Some(self.clone()))
    }

    pub fn child_with_deadline(&self, deadline: Instant) -> Self {
        Self::build(Some(deadline), Some(self.clone()))
    }

    fn build(deadline: Option<Instant>, parent: Option<CancelScope>) -> Self {
        Self {
            inner: Arc::new(ScopeInner {
                cancelled: AtomicBool::new(false),
                deadline,
                parent,
            }),
        }
    }

    pub fn cancel(&self) {
        self.inner.cancelled.store(true, Ordering::Release);
    }

    pub fn is_cancelled(&self) -> bool {
        self.error().is_some()
    }

    /// Why the scope is done, or `None` while it is live. The nearest cause
    /// wins: an explicit cancel, then this scope's deadline, then ancestors.
    pub fn error(&self) -> Option<RatingError> {
        let mut scope = Some(self);
        while let Some(current) = scope {
            if current.inner.cancelled.load(Ordering::Acquire) {
                return Some(RatingError::Cancelled);
            }
            if current
                .inner
                .deadline
                .is_some_and(|deadline| Instant::now() >= deadline)
            {
                return Some(RatingError::DeadlineExceeded);
            }
            scope = current.inner.parent.as_ref();
        }
        None
    }
}
