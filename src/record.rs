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

//! Call detail records and their rated form.

use crate::base::Sequence;
use crate::money::Money;
use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Call direction as logged by the switch.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    #[default]
    Unknown,
    Incoming,
    Outgoing,
    Internal,
}

impl Direction {
    /// Maps switch text to a direction; anything unrecognised is `Unknown`.
    pub fn from_text(text: &str) -> Self {
        match text.trim() {
            "incoming" => Self::Incoming,
            "outgoing" => Self::Outgoing,
            "internal" => Self::Internal,
            _ => Self::Unknown,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Unknown => "unknown",
            Self::Incoming => "incoming",
            Self::Outgoing => "outgoing",
            Self::Internal => "internal",
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How the call ended.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Disposition {
    #[default]
    Unknown,
    Answered,
    Busy,
    NoAnswer,
    Failed,
}

impl Disposition {
    /// Maps switch text to a disposition; anything unrecognised is `Unknown`.
    pub fn from_text(text: &str) -> Self {
        match text.trim() {
            "answered" => Self::Answered,
            "busy" => Self::Busy,
            "no_answer" => Self::NoAnswer,
            "failed" => Self::Failed,
            _ => Self::Unknown,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Unknown => "unknown",
            Self::Answered => "answered",
            Self::Busy => "busy",
            Self::NoAnswer => "no_answer",
            Self::Failed => "failed",
        }
    }
}

impl fmt::Display for Disposition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One logged call, as read from a CDR line.
///
/// Timestamps are wall-clock times in the switch's zone; tariff dates and
/// timebands are interpreted in the same zone.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CdrRecord {
    pub start_time: NaiveDateTime,
    pub end_time: NaiveDateTime,
    pub calling_party: String,
    pub called_party: String,
    pub direction: Direction,
    pub disposition: Disposition,
    pub duration_sec: u32,
    pub billable_sec: u32,
    pub account_code: String,
    pub call_id: String,
    pub trunk_name: String,
}

/// Reference to the tariff rule that priced a call.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AppliedTariff {
    pub prefix: String,
    pub destination: String,
    pub priority: i32,
}

/// A CDR with its computed cost.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RatedCall {
    pub sequence: Sequence,
    #[serde(flatten)]
    pub record: CdrRecord,
    pub cost: Money,
    pub tariff: Option<AppliedTariff>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_known_directions() {
        assert_eq!(Direction::from_text("outgoing"), Direction::Outgoing);
        assert_eq!(Direction::from_text(" incoming "), Direction::Incoming);
        assert_eq!(Direction::from_text("internal"), Direction::Internal);
    }

    #[test]
    fn unknown_text_is_not_an_error() {
        assert_eq!(Direction::from_text("sideways"), Direction::Unknown);
        assert_eq!(Direction::from_text("OUTGOING"), Direction::Unknown);
        assert_eq!(Disposition::from_text(""), Disposition::Unknown);
    }

    #[test]
    fn disposition_round_trips_through_text() {
        for disp in [
            Disposition::Answered,
            Disposition::Busy,
            Disposition::NoAnswer,
            Disposition::Failed,
        ] {
            assert_eq!(Disposition::from_text(disp.as_str()), disp);
        }
    }
}
