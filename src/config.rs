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

//! Engine configuration.
//!
//! Values come from built-in defaults, then an optional config file, then
//! environment variables prefixed with `CDR_RATER__`, e.g.
//! `CDR_RATER__WORKERS=8` or `CDR_RATER__TARIFF_SCHEMA=with_expiry`.

use crate::error::RatingError;
use crate::tariff::Rounding;
use config::{Config, Environment, File};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Column layout of tariff files.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TariffSchema {
    /// `prefix;destination;rate_per_min;connection_fee;timeband;weekday;priority;effective_date`.
    /// Rules stay in force until [`OPEN_ENDED_EXPIRY`](crate::loader::OPEN_ENDED_EXPIRY).
    #[default]
    EffectiveOnly,
    /// The eight columns above plus `expiry_date`; a rule is in force up to
    /// and including its expiry date.
    WithExpiry,
}

impl TariffSchema {
    pub fn field_count(self) -> usize {
        match self {
            Self::EffectiveOnly => 8,
            Self::WithExpiry => 9,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Size of the shared worker pool.
    pub workers: usize,
    /// Jobs the dispatch queue holds beyond those a worker is processing.
    /// Zero makes every submission a hand-off to an idle worker.
    pub queue_capacity: usize,
    /// How often blocked readers and waiters re-check cancellation.
    pub poll_interval_ms: u64,
    pub tariff_schema: TariffSchema,
    pub rounding: Rounding,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            workers: default_workers(),
            queue_capacity: 0,
            poll_interval_ms: 20,
            tariff_schema: TariffSchema::default(),
            rounding: Rounding::default(),
        }
    }
}

fn default_workers() -> usize {
    num_cpus::get().max(1)
}

impl EngineConfig {
    /// Loads configuration from `path` (if given) and the environment.
    pub fn load(path: Option<&Path>) -> Result<Self, RatingError> {
        let mut builder = Config::builder();
        if let Some(path) = path {
            builder = builder.add_source(File::from(path));
        }
        let config = builder
            .add_source(
                Environment::with_prefix("CDR_RATER")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        let loaded: EngineConfig = config.try_deserialize()?;
        loaded.validated()
    }

    fn validated(self) -> Result<Self, RatingError> {
        if self.workers == 0 {
            return Err(RatingError::Config("workers must be at least 1".into()));
        }
        if self.poll_interval_ms == 0 {
            return Err(RatingError::Config("poll_interval_ms must be at least 1".into()));
        }
        Ok(self)
    }

    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = workers;
        self
    }

    pub fn with_tariff_schema(mut self, schema: TariffSchema) -> Self {
        self.tariff_schema = schema;
        self
    }

    pub fn with_rounding(mut self, rounding: Rounding) -> Self {
        self.rounding = rounding;
        self
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms.max(1))
    }
}
