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

//! Text formats for tariff tables, subscriber tables and CDR streams.
//!
//! | Input | Delimiter | Fields | Optional header starts with |
//! |-------|-----------|--------|-----------------------------|
//! | tariffs | `;` | 8 or 9, see [`TariffSchema`] | `prefix` |
//! | subscribers | `;` | `phone_number;client_name` | `phone_number` |
//! | CDRs | `\|` | 12 | `StartTime` |
//!
//! CDR columns: start time, end time (`YYYY-MM-DD HH:MM:SS`), calling party,
//! called party, direction, disposition, duration seconds, billable seconds,
//! upstream charge (ignored), account code, call ID, trunk name.
//!
//! Blank lines are skipped, fields are trimmed, and a field wrapped in
//! matching `"`, `'` or `` ` `` quotes is unwrapped.

use crate::base::Subscriber;
use crate::config::TariffSchema;
use crate::error::{ParseError, RatingError, Result};
use crate::money::Money;
use crate::record::{CdrRecord, Direction, Disposition};
use crate::tariff::TariffRule;
use crate::window::{Timeband, WeekdayMask};
use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use csv::{ReaderBuilder, StringRecord, Trim};
use std::io::Read;
use std::str::FromStr;

const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";
const DATE_FORMAT: &str = "%Y-%m-%d";
const CDR_FIELDS: usize = 12;
const SUBSCRIBER_FIELDS: usize = 2;

/// Expiry given to rules loaded without an expiry column.
pub const OPEN_ENDED_EXPIRY: NaiveDate = match NaiveDate::from_ymd_opt(2100, 1, 1) {
    Some(date) => date,
    None => NaiveDate::MAX,
};

/// One non-blank input line split into fields.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Fields {
    /// 1-based physical line number.
    pub line: u64,
    pub values: Vec<String>,
}

impl Fields {
    fn expect_len(&self, expected: usize) -> Result<()> {
        if self.values.len() == expected {
            Ok(())
        } else {
            Err(self.error(
                "record",
                ParseError::FieldCount {
                    expected,
                    found: self.values.len(),
                },
            ))
        }
    }

    fn text(&self, index: usize) -> &str {
        self.values.get(index).map_or("", String::as_str)
    }

    fn parse<T>(
        &self,
        index: usize,
        field: &'static str,
        parse: impl FnOnce(&str) -> std::result::Result<T, ParseError>,
    ) -> Result<T> {
        parse(self.text(index)).map_err(|source| self.error(field, source))
    }

    fn error(&self, field: &'static str, source: ParseError) -> RatingError {
        RatingError::Parse {
            line: self.line,
            field,
            source,
        }
    }
}

/// Streams the non-blank lines of a delimited text input, skipping a
/// leading header line.
pub struct FieldReader<R> {
    inner: csv::Reader<R>,
    record: StringRecord,
    header: &'static str,
    at_start: bool,
}

impl<R: Read> FieldReader<R> {
    /// `header` is matched case-insensitively against the first field of the
    /// first non-blank line.
    pub fn new(input: R, delimiter: u8, header: &'static str) -> Self {
        let inner = ReaderBuilder::new()
            .delimiter(delimiter)
            .has_headers(false)
            .flexible(true)
            .quoting(false)
            .trim(Trim::All)
            .from_reader(input);
        Self {
            inner,
            record: StringRecord::new(),
            header,
            at_start: true,
        }
    }
}

impl<R: Read> Iterator for FieldReader<R> {
    type Item = Result<Fields>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            match self.inner.read_record(&mut self.record) {
                Ok(true) => {}
                Ok(false) => return None,
                Err(err) => return Some(Err(err.into())),
            }
            // whitespace-only lines trim down to one empty field
            if self.record.len() == 1 && self.record[0].is_empty() {
                continue;
            }

            let line = self.record.position().map_or(0, |pos| pos.line());
            let values: Vec<String> = self
                .record
                .iter()
                .map(|value| unquote_loose(value).to_string())
                .collect();

            if std::mem::take(&mut self.at_start) && values[0].eq_ignore_ascii_case(self.header) {
                continue;
            }
            return Some(Ok(Fields { line, values }));
        }
    }
}

/// Strips one pair of matching `"`, `'` or `` ` `` around `value`.
pub fn unquote_loose(value: &str) -> &str {
    for quote in ['"', '\'', '`'] {
        if let Some(inner) = value
            .strip_prefix(quote)
            .and_then(|rest| rest.strip_suffix(quote))
        {
            return inner;
        }
    }
    value
}

pub fn parse_tariff(fields: &Fields, schema: TariffSchema) -> Result<TariffRule> {
    fields.expect_len(schema.field_count())?;

    let effective_date = fields.parse(7, "effective_date", parse_date)?;
    let expiry_exclusive = match schema {
        TariffSchema::EffectiveOnly => OPEN_ENDED_EXPIRY,
        TariffSchema::WithExpiry => {
            let expiry = fields.parse(8, "expiry_date", parse_date)?;
            expiry
                .succ_opt()
                .ok_or_else(|| fields.error("expiry_date", ParseError::InvalidDate(fields.text(8).into())))?
        }
    };

    Ok(TariffRule {
        prefix: fields.text(0).to_string(),
        destination: fields.text(1).to_string(),
        rate_per_minute: fields.parse(2, "rate_per_min", Money::parse)?,
        connection_fee: fields.parse(3, "connection_fee", Money::parse)?,
        timeband: fields.parse(4, "timeband", Timeband::parse)?,
        weekdays: fields.parse(5, "weekday", WeekdayMask::parse)?,
        priority: fields.parse(6, "priority", parse_int)?,
        effective_start: effective_date.and_time(NaiveTime::MIN),
        expiry_exclusive: expiry_exclusive.and_time(NaiveTime::MIN),
    })
}

pub fn parse_subscriber(fields: &Fields) -> Result<Subscriber> {
    fields.expect_len(SUBSCRIBER_FIELDS)?;
    Ok(Subscriber::new(fields.text(0), fields.text(1)))
}

pub fn parse_cdr(fields: &Fields) -> Result<CdrRecord> {
    fields.expect_len(CDR_FIELDS)?;
    Ok(CdrRecord {
        start_time: fields.parse(0, "start_time", parse_timestamp)?,
        end_time: fields.parse(1, "end_time", parse_timestamp)?,
        calling_party: fields.text(2).to_string(),
        called_party: fields.text(3).to_string(),
        direction: Direction::from_text(fields.text(4)),
        disposition: Disposition::from_text(fields.text(5)),
        duration_sec: fields.parse(6, "duration", parse_int)?,
        billable_sec: fields.parse(7, "billable_sec", parse_int)?,
        account_code: fields.text(9).to_string(),
        call_id: fields.text(10).to_string(),
        trunk_name: fields.text(11).to_string(),
    })
}

/// Reads a whole tariff table. Fails on the first malformed line.
pub fn read_tariffs<R: Read>(input: R, schema: TariffSchema) -> Result<Vec<TariffRule>> {
    FieldReader::new(input, b';', "prefix")
        .map(|fields| parse_tariff(&fields?, schema))
        .collect()
}

/// Reads a whole subscriber table. Fails on the first malformed line.
pub fn read_subscribers<R: Read>(input: R) -> Result<Vec<Subscriber>> {
    FieldReader::new(input, b';', "phone_number")
        .map(|fields| parse_subscriber(&fields?))
        .collect()
}

/// Lazily parses a CDR stream, one record per non-blank line.
pub fn cdr_records<R: Read>(input: R) -> impl Iterator<Item = Result<CdrRecord>> {
    FieldReader::new(input, b'|', "StartTime").map(|fields| parse_cdr(&fields?))
}

fn parse_int<T: FromStr>(text: &str) -> std::result::Result<T, ParseError> {
    text.parse()
        .map_err(|_| ParseError::InvalidInteger(text.to_string()))
}

fn parse_date(text: &str) -> std::result::Result<NaiveDate, ParseError> {
    NaiveDate::parse_from_str(text, DATE_FORMAT).map_err(|_| ParseError::InvalidDate(text.to_string()))
}

fn parse_timestamp(text: &str) -> std::result::Result<NaiveDateTime, ParseError> {
    NaiveDateTime::parse_from_str(text, TIMESTAMP_FORMAT)
        .map_err(|_| ParseError::InvalidTimestamp(text.to_string()))
}
