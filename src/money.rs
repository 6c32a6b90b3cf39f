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

//! Exact money amounts in minor currency units.
//!
//! No floating point ever enters a cost computation: every amount is an
//! `i64` count of minor units (kopecks, cents).
//!
//! # Example
//!
//! ```
//! use cdr_rater::Money;
//!
//! assert_eq!(Money::parse("1.80").unwrap(), Money(180));
//! assert_eq!(Money::parse("0,45").unwrap(), Money(45));
//! assert_eq!(Money::parse("").unwrap(), Money::ZERO);
//! ```

use crate::error::ParseError;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::iter::Sum;
use std::ops::{Add, AddAssign};
use std::str::FromStr;

/// Signed amount in minor currency units.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct Money(pub i64);

impl Money {
    pub const ZERO: Money = Money(0);

    /// Number of fractional digits kept; further digits are truncated.
    const FRACTION_DIGITS: u32 = 2;

    /// Parses `units[.|,]fraction`.
    ///
    /// Accepts an optional leading `-`, either `.` or `,` as the decimal
    /// separator and up to two significant fraction digits (`"1.809"` is
    /// `180`, not `181`). The empty string is zero.
    pub fn parse(text: &str) -> Result<Money, ParseError> {
        let text = text.trim();
        if text.is_empty() {
            return Ok(Money::ZERO);
        }
        let invalid = || ParseError::InvalidMoney(text.to_string());

        let (negative, digits) = match text.strip_prefix('-') {
            Some(rest) => (true, rest),
            None => (false, text),
        };
        let (units, fraction) = match digits.find(['.', ',']) {
            Some(at) => (&digits[..at], &digits[at + 1..]),
            None => (digits, ""),
        };
        let all_digits = |s: &str| s.bytes().all(|b| b.is_ascii_digit());
        if (units.is_empty() && fraction.is_empty()) || !all_digits(units) || !all_digits(fraction)
        {
            return Err(invalid());
        }

        let mut minor: i64 = 0;
        for b in units.bytes() {
            minor = minor
                .checked_mul(10)
                .and_then(|v| v.checked_add(i64::from(b - b'0')))
                .ok_or_else(invalid)?;
        }
        let mut kept = 0;
        for b in fraction.bytes().take(Self::FRACTION_DIGITS as usize) {
            minor = minor
                .checked_mul(10)
                .and_then(|v| v.checked_add(i64::from(b - b'0')))
                .ok_or_else(invalid)?;
            kept += 1;
        }
        for _ in kept..Self::FRACTION_DIGITS {
            minor = minor.checked_mul(10).ok_or_else(invalid)?;
        }

        Ok(Money(if negative { -minor } else { minor }))
    }

    pub fn minor_units(self) -> i64 {
        self.0
    }

    /// Major-unit decimal with two fraction digits, for reporting.
    pub fn to_decimal(self) -> Decimal {
        Decimal::new(self.0, Self::FRACTION_DIGITS)
    }
}

impl FromStr for Money {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Money::parse(s)
    }
}

impl fmt::Display for Money {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let sign = if self.0 < 0 { "-" } else { "" };
        let abs = self.0.unsigned_abs();
        write!(f, "{}{}.{:02}", sign, abs / 100, abs % 100)
    }
}

impl Add for Money {
    type Output = Money;

    fn add(self, rhs: Money) -> Money {
        Money(self.0.saturating_add(rhs.0))
    }
}

impl AddAssign for Money {
    fn add_assign(&mut self, rhs: Money) {
        *self = *self + rhs;
    }
}

impl Sum for Money {
    fn sum<I: Iterator<Item = Money>>(iter: I) -> Money {
        iter.fold(Money::ZERO, Add::add)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn parses_canonical_amounts() {
        assert_eq!(Money::parse("1.80").unwrap(), Money(180));
        assert_eq!(Money::parse("2").unwrap(), Money(200));
        assert_eq!(Money::parse("").unwrap(), Money(0));
        assert_eq!(Money::parse("0,45").unwrap(), Money(45));
    }

    #[test]
    fn single_fraction_digit_is_tenths() {
        assert_eq!(Money::parse("1.5").unwrap(), Money(150));
        assert_eq!(Money::parse("3.").unwrap(), Money(300));
        assert_eq!(Money::parse(".5").unwrap(), Money(50));
    }

    #[test]
    fn extra_fraction_digits_are_truncated() {
        assert_eq!(Money::parse("1.809").unwrap(), Money(180));
        assert_eq!(Money::parse("0.999").unwrap(), Money(99));
    }

    #[test]
    fn negative_and_padded_amounts() {
        assert_eq!(Money::parse("-1.50").unwrap(), Money(-150));
        assert_eq!(Money::parse("  12.34 ").unwrap(), Money(1234));
    }

    #[test]
    fn rejects_garbage() {
        for bad in ["abc", "1.2.3", "1,2.3", "-", ".", "1e3", "--1", "1 2"] {
            assert_eq!(
                Money::parse(bad),
                Err(ParseError::InvalidMoney(bad.trim().to_string())),
                "{bad:?} should be rejected"
            );
        }
    }

    #[test]
    fn rejects_overflow() {
        assert!(Money::parse("999999999999999999999").is_err());
    }

    #[test]
    fn display_and_decimal() {
        assert_eq!(Money(180).to_string(), "1.80");
        assert_eq!(Money(-5).to_string(), "-0.05");
        assert_eq!(Money(180).to_decimal(), dec!(1.80));
    }

    #[test]
    fn sums_exactly() {
        let total: Money = [Money(10), Money(25), Money(-5)].into_iter().sum();
        assert_eq!(total, Money(30));
    }
}
