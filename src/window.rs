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

//! Recurring weekly availability windows: a time-of-day band and a set of
//! ISO weekdays.

use crate::error::ParseError;
use chrono::{Timelike, Weekday};
use serde::{Deserialize, Serialize};
use std::fmt;

const MINUTES_PER_DAY: u16 = 24 * 60;

/// Minute of day, `hour * 60 + minute`.
pub fn minute_of_day<T: Timelike>(at: &T) -> u16 {
    // hour() <= 23 and minute() <= 59
    (at.hour() * 60 + at.minute()) as u16
}

/// Time-of-day window `[start, end)` in minutes.
///
/// When `start >= end` the window wraps past midnight and covers
/// `[start, 1440) ∪ [0, end)`; `start == end` therefore covers the whole day.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "RawTimeband")]
pub struct Timeband {
    start: u16,
    end: u16,
}

/// Unchecked wire form of a [`Timeband`].
#[derive(Deserialize)]
struct RawTimeband {
    start: u16,
    end: u16,
}

impl TryFrom<RawTimeband> for Timeband {
    type Error = String;

    fn try_from(raw: RawTimeband) -> Result<Self, Self::Error> {
        Timeband::new(raw.start, raw.end)
            .ok_or_else(|| format!("timeband bounds {}-{} out of range", raw.start, raw.end))
    }
}

impl Timeband {
    /// The band that covers every minute of the day.
    pub const ALL_DAY: Timeband = Timeband { start: 0, end: 0 };

    /// Builds a band from minutes of day; `None` if either bound is >= 1440.
    pub fn new(start: u16, end: u16) -> Option<Timeband> {
        (start < MINUTES_PER_DAY && end < MINUTES_PER_DAY).then_some(Timeband { start, end })
    }

    /// Parses `HH:MM-HH:MM`.
    pub fn parse(text: &str) -> Result<Timeband, ParseError> {
        let text = text.trim();
        let invalid = || ParseError::InvalidTimeband(text.to_string());
        let (from, to) = text.split_once('-').ok_or_else(invalid)?;
        let start = parse_hhmm(from).ok_or_else(invalid)?;
        let end = parse_hhmm(to).ok_or_else(invalid)?;
        Ok(Timeband { start, end })
    }

    pub fn start(&self) -> u16 {
        self.start
    }

    pub fn end(&self) -> u16 {
        self.end
    }

    pub fn wraps_midnight(&self) -> bool {
        self.start >= self.end
    }

    pub fn contains(&self, minute: u16) -> bool {
        if self.start < self.end {
            self.start <= minute && minute < self.end
        } else {
            minute >= self.start || minute < self.end
        }
    }
}

fn parse_hhmm(text: &str) -> Option<u16> {
    let (hour, minute) = text.trim().split_once(':')?;
    let hour: u16 = hour.trim().parse().ok()?;
    let minute: u16 = minute.trim().parse().ok()?;
    (hour <= 23 && minute <= 59).then_some(hour * 60 + minute)
}

impl fmt::Display for Timeband {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{:02}:{:02}-{:02}:{:02}",
            self.start / 60,
            self.start % 60,
            self.end / 60,
            self.end % 60
        )
    }
}

/// Set of ISO weekdays, bit `k` for weekday `k` (Monday = 1 .. Sunday = 7).
///
/// The empty mask places no restriction on the day, but [`WeekdayMask::parse`]
/// never produces it.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct WeekdayMask(u8);

impl WeekdayMask {
    /// No restriction.
    pub const ANY: WeekdayMask = WeekdayMask(0);

    /// Parses comma-separated days or inclusive `from-to` ranges, e.g.
    /// `"1-5"`, `"1,3,5"` or `"1-5,7"`. Empty items are ignored, but the
    /// whole list must name at least one day.
    pub fn parse(text: &str) -> Result<WeekdayMask, ParseError> {
        let text = text.trim();
        let invalid = || ParseError::InvalidWeekdays(text.to_string());
        let day = |s: &str| -> Result<u8, ParseError> {
            match s.trim().parse::<u8>() {
                Ok(d) if (1..=7).contains(&d) => Ok(d),
                _ => Err(invalid()),
            }
        };

        let mut bits = 0u8;
        for item in text.split(',').map(str::trim).filter(|s| !s.is_empty()) {
            let (from, to) = match item.split_once('-') {
                Some((from, to)) => (day(from)?, day(to)?),
                None => {
                    let d = day(item)?;
                    (d, d)
                }
            };
            if from > to {
                return Err(invalid());
            }
            for d in from..=to {
                bits |= 1 << d;
            }
        }

        if bits == 0 {
            return Err(invalid());
        }
        Ok(WeekdayMask(bits))
    }

    pub fn from_bits(bits: u8) -> WeekdayMask {
        // bit 0 is not a weekday
        WeekdayMask(bits & 0b1111_1110)
    }

    pub fn bits(&self) -> u8 {
        self.0
    }

    pub fn allows(&self, weekday: Weekday) -> bool {
        self.0 == 0 || self.0 & (1 << weekday.number_from_monday()) != 0
    }
}
