//! Row parsing
//!
//! Turns one raw CSV row into a [`Record`] or a [`RowRejection`]. Nothing in
//! here logs or touches the store; the ingestor decides what to do with a
//! rejection.

use bigdecimal::BigDecimal;
use chrono::{DateTime, NaiveDate, NaiveDateTime};
use csv::ByteRecord;
use serde::Deserialize;
use std::str::FromStr;
use thiserror::Error;

use crate::model::Record;

/// Formats tried, in order, after RFC 3339 and RFC 2822.
///
/// Date-only formats resolve to midnight. Slash dates are month first.
pub const DEFAULT_TIMESTAMP_FORMATS: &[&str] = &[
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M",
    "%Y/%m/%d %H:%M:%S",
    "%m/%d/%Y %H:%M:%S",
    "%m/%d/%Y %H:%M",
    "%Y-%m-%d",
    "%Y/%m/%d",
    "%m/%d/%Y",
];

/// Why a row was dropped
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RowRejection {
    #[error("price invalid: {}", shown(.raw))]
    InvalidPrice { raw: String },

    #[error("timestamp invalid: {raw}")]
    InvalidTimestamp { raw: String },

    #[error("user_id invalid: {}", shown(.raw))]
    InvalidUserId { raw: String },

    /// The CSV layer could not decode the record (bad UTF-8, broken quoting)
    #[error("malformed row: {reason}")]
    Malformed { reason: String },
}

fn shown(raw: &str) -> &str {
    if raw.trim().is_empty() {
        "<empty>"
    } else {
        raw
    }
}

impl From<csv::Error> for RowRejection {
    fn from(err: csv::Error) -> Self {
        RowRejection::Malformed {
            reason: err.to_string(),
        }
    }
}

/// The columns the engine reads from a CSV row. Other columns are ignored.
///
/// Empty `timestamp` and `price` cells are `None`. `user_id` is `None` only
/// when the row has no such cell; an empty cell is `Some("")`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct RawRow {
    #[serde(default)]
    pub timestamp: Option<String>,
    #[serde(default)]
    pub price: Option<String>,
    #[serde(default)]
    pub user_id: Option<String>,
}

/// Name of the optional user column
pub const USER_ID_COLUMN: &str = "user_id";

impl RawRow {
    /// Deserialize `record` by header name.
    ///
    /// `csv` maps an empty cell and a missing cell to the same `None`; the
    /// user column is told apart here by position.
    pub fn from_record(record: &ByteRecord, headers: &ByteRecord) -> Result<Self, csv::Error> {
        let mut row: RawRow = record.deserialize(Some(headers))?;

        if row.user_id.is_none() {
            let blank_cell = headers
                .iter()
                .position(|h| h == USER_ID_COLUMN.as_bytes())
                .is_some_and(|index| index < record.len());
            if blank_cell {
                row.user_id = Some(String::new());
            }
        }

        Ok(row)
    }

    pub fn new(timestamp: Option<&str>, price: Option<&str>, user_id: Option<&str>) -> Self {
        Self {
            timestamp: timestamp.map(str::to_string),
            price: price.map(str::to_string),
            user_id: user_id.map(str::to_string),
        }
    }
}

/// Permissive date-time interpretation driven by a list of `chrono` formats
#[derive(Debug, Clone)]
pub struct TimestampParser {
    formats: Vec<String>,
}

impl Default for TimestampParser {
    fn default() -> Self {
        Self::new(DEFAULT_TIMESTAMP_FORMATS.iter().map(|f| f.to_string()))
    }
}

impl TimestampParser {
    pub fn new(formats: impl IntoIterator<Item = String>) -> Self {
        Self {
            formats: formats.into_iter().collect(),
        }
    }

    pub fn formats(&self) -> &[String] {
        &self.formats
    }

    /// Offset-carrying inputs are converted to UTC and the offset dropped.
    pub fn parse(&self, raw: &str) -> Option<NaiveDateTime> {
        let raw = raw.trim();

        if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
            return Some(dt.naive_utc());
        }
        if let Ok(dt) = DateTime::parse_from_rfc2822(raw) {
            return Some(dt.naive_utc());
        }

        self.formats.iter().find_map(|format| {
            NaiveDateTime::parse_from_str(raw, format).ok().or_else(|| {
                NaiveDate::parse_from_str(raw, format)
                    .ok()
                    .and_then(|date| date.and_hms_opt(0, 0, 0))
            })
        })
    }
}

/// Validates and types one raw row
#[derive(Debug, Clone, Default)]
pub struct RowParser {
    timestamps: TimestampParser,
}

impl RowParser {
    pub fn new(timestamps: TimestampParser) -> Self {
        Self { timestamps }
    }

    /// Parse `raw`, stamping the result with its provenance.
    pub fn parse(
        &self,
        raw: &RawRow,
        source_file: &str,
        source_row: i64,
    ) -> Result<Record, RowRejection> {
        let price = parse_price(raw.price.as_deref())?;

        let timestamp = match present(raw.timestamp.as_deref()) {
            Some(value) => Some(self.timestamps.parse(value).ok_or_else(|| {
                RowRejection::InvalidTimestamp {
                    raw: value.to_string(),
                }
            })?),
            None => None,
        };

        // Absent column means null; a blank cell is as invalid as "abc"
        let user_id = match raw.user_id.as_deref() {
            Some(value) => Some(value.trim().parse::<i64>().map_err(|_| {
                RowRejection::InvalidUserId {
                    raw: value.to_string(),
                }
            })?),
            None => None,
        };

        Ok(Record {
            timestamp,
            price,
            user_id,
            source_file: source_file.to_string(),
            source_row,
        })
    }
}

fn present(value: Option<&str>) -> Option<&str> {
    value.filter(|v| !v.trim().is_empty())
}

/// Exact decimal after removing thousands separators and surrounding
/// whitespace. Whitespace inside the number is rejected.
pub fn parse_price(raw: Option<&str>) -> Result<BigDecimal, RowRejection> {
    let raw = raw.unwrap_or_default();
    let invalid = || RowRejection::InvalidPrice {
        raw: raw.to_string(),
    };

    let cleaned = raw.replace(',', "");
    let cleaned = cleaned.trim();

    if cleaned.is_empty() || cleaned.contains(char::is_whitespace) {
        return Err(invalid());
    }

    BigDecimal::from_str(cleaned).map_err(|_| invalid())
}
