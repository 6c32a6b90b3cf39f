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

//! Error types for loading tables and rating CDR streams.

use thiserror::Error;

/// Why a single field failed to parse.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ParseError {
    /// The line did not split into the expected number of fields
    #[error("expected {expected} fields, found {found}")]
    FieldCount { expected: usize, found: usize },

    /// Money text is not `units[.|,]fraction`
    #[error("invalid money value {0:?}")]
    InvalidMoney(String),

    /// Timeband text is not `HH:MM-HH:MM`
    #[error("invalid timeband {0:?}")]
    InvalidTimeband(String),

    /// Weekday list is empty or contains a day outside 1..=7
    #[error("invalid weekday list {0:?}")]
    InvalidWeekdays(String),

    #[error("invalid integer {0:?}")]
    InvalidInteger(String),

    /// Timestamp is not `YYYY-MM-DD HH:MM:SS`
    #[error("invalid timestamp {0:?}")]
    InvalidTimestamp(String),

    /// Date is not `YYYY-MM-DD`
    #[error("invalid date {0:?}")]
    InvalidDate(String),

    #[error("line is not valid UTF-8")]
    InvalidUtf8,
}

/// Errors surfaced by the engine, its loaders and the rating pipeline.
///
/// Cloneable so the first error of a rating request can be stored once and
/// handed to the waiting caller.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RatingError {
    /// Malformed input; `line` is the 1-based physical line in the stream
    #[error("line {line}: bad {field}: {source}")]
    Parse {
        line: u64,
        field: &'static str,
        #[source]
        source: ParseError,
    },

    /// The input stream could not be read
    #[error("read failed: {0}")]
    Io(String),

    /// A repository read failed
    #[error("lookup failed: {0}")]
    Lookup(String),

    /// The caller cancelled the request
    #[error("request cancelled")]
    Cancelled,

    /// The caller's deadline passed before the request finished
    #[error("request deadline exceeded")]
    DeadlineExceeded,

    /// The engine has been closed
    #[error("rating engine is closed")]
    ServiceClosed,

    #[error("invalid configuration: {0}")]
    Config(String),
}

impl RatingError {
    /// Returns `true` for errors caused by the caller going away rather than
    /// by the data.
    pub fn is_cancellation(&self) -> bool {
        matches!(self, Self::Cancelled | Self::DeadlineExceeded)
    }
}

impl From<std::io::Error> for RatingError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err.to_string())
    }
}

impl From<config::ConfigError> for RatingError {
    fn from(err: config::ConfigError) -> Self {
        Self::Config(err.to_string())
    }
}

impl From<csv::Error> for RatingError {
    fn from(err: csv::Error) -> Self {
        let line = err.position().map_or(0, |pos| pos.line());
        match err.into_kind() {
            csv::ErrorKind::Io(io) => Self::Io(io.to_string()),
            csv::ErrorKind::Utf8 { .. } => Self::Parse {
                line,
                field: "record",
                source: ParseError::InvalidUtf8,
            },
            other => Self::Io(format!("{other:?}")),
        }
    }
}

pub type Result<T> = std::result::Result<T, RatingError>;
