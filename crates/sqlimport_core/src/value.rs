//! Typed conversion of text fields for the row-streaming path.

use crate::delimited::strip_outer_quotes;
use crate::types::{ColumnSpec, SqlType};
use chrono::{DateTime, FixedOffset, NaiveDate, NaiveDateTime, NaiveTime};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use thiserror::Error;

const DATETIME_FORMATS: &[&str] = &[
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M",
    "%m/%d/%Y %H:%M:%S%.f",
    "%m/%d/%Y %H:%M",
];
const DATE_FORMATS: &[&str] = &["%Y-%m-%d", "%m/%d/%Y", "%Y%m%d"];
const TIME_FORMATS: &[&str] = &["%H:%M:%S%.f", "%H:%M"];
const OFFSET_FORMATS: &[&str] = &["%Y-%m-%d %H:%M:%S%.f %:z", "%Y-%m-%d %H:%M:%S%.f%:z"];

/// What the caller does with quotes left in a field by the splitter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum QuotePolicy {
    /// Drop one leading and one trailing quote when both are present.
    #[default]
    StripOuter,
    /// Keep the field text exactly as split.
    Keep,
}

impl QuotePolicy {
    pub fn apply<'a>(&self, field: &'a str) -> &'a str {
        match self {
            QuotePolicy::StripOuter => strip_outer_quotes(field),
            QuotePolicy::Keep => field,
        }
    }
}

/// One converted cell, ready for a bulk-copy row.
#[derive(Debug, Clone, PartialEq)]
pub enum SqlValue {
    Null,
    Bit(bool),
    TinyInt(u8),
    SmallInt(i16),
    Int(i32),
    BigInt(i64),
    Real(f32),
    Float(f64),
    Decimal(Decimal),
    DateTime(NaiveDateTime),
    Date(NaiveDate),
    Time(NaiveTime),
    DateTimeOffset(DateTime<FixedOffset>),
    Text(String),
}

impl SqlValue {
    pub fn is_null(&self) -> bool {
        matches!(self, SqlValue::Null)
    }
}

/// A field that cannot be represented in its target column.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("column '{column}': cannot convert '{value}' to {expected}")]
pub struct ValueError {
    pub column: String,
    pub value: String,
    pub expected: &'static str,
}

/// Convert one raw field for `column`.
///
/// Empty fields are NULL for non-character columns. Character columns keep
/// the empty string unless `keep_nulls` is set.
pub fn convert_field(raw: &str, column: &ColumnSpec, keep_nulls: bool) -> Result<SqlValue, ValueError> {
    if raw.is_empty() {
        return Ok(if column.sql_type.is_textual() && !keep_nulls {
            SqlValue::Text(String::new())
        } else {
            SqlValue::Null
        });
    }

    let text = raw.trim();
    let fail = |expected: &'static str| ValueError {
        column: column.name.clone(),
        value: raw.to_string(),
        expected,
    };

    let value = match column.sql_type {
        SqlType::Character | SqlType::Other => SqlValue::Text(raw.to_string()),
        SqlType::Bit => SqlValue::Bit(parse_bit(text).ok_or_else(|| fail("bit"))?),
        SqlType::TinyInt => SqlValue::TinyInt(text.parse().map_err(|_| fail("tinyint"))?),
        SqlType::SmallInt => SqlValue::SmallInt(text.parse().map_err(|_| fail("smallint"))?),
        SqlType::Int => SqlValue::Int(text.parse().map_err(|_| fail("int"))?),
        SqlType::BigInt => SqlValue::BigInt(text.parse().map_err(|_| fail("bigint"))?),
        SqlType::Real => SqlValue::Real(text.parse().map_err(|_| fail("real"))?),
        SqlType::Float => SqlValue::Float(text.parse().map_err(|_| fail("float"))?),
        SqlType::Decimal | SqlType::Numeric => {
            SqlValue::Decimal(parse_decimal(text).ok_or_else(|| fail("decimal"))?)
        }
        SqlType::Money => SqlValue::Decimal(
            parse_decimal(text)
                .filter(|v| money_in_range(v, false))
                .ok_or_else(|| fail("money"))?,
        ),
        SqlType::SmallMoney => SqlValue::Decimal(
            parse_decimal(text)
                .filter(|v| money_in_range(v, true))
                .ok_or_else(|| fail("smallmoney"))?,
        ),
        SqlType::DateTime2 => {
            SqlValue::DateTime(parse_datetime(text).ok_or_else(|| fail("datetime2"))?)
        }
        SqlType::DateTime => SqlValue::DateTime(
            parse_datetime(text)
                .filter(datetime_in_range)
                .ok_or_else(|| fail("datetime"))?,
        ),
        SqlType::SmallDateTime => SqlValue::DateTime(
            parse_datetime(text)
                .filter(small_datetime_in_range)
                .ok_or_else(|| fail("smalldatetime"))?,
        ),
        SqlType::Date => SqlValue::Date(parse_date(text).ok_or_else(|| fail("date"))?),
        SqlType::Time => SqlValue::Time(parse_time(text).ok_or_else(|| fail("time"))?),
        SqlType::DateTimeOffset => {
            SqlValue::DateTimeOffset(parse_offset(text).ok_or_else(|| fail("datetimeoffset"))?)
        }
    };
    Ok(value)
}

// Bounds of the fixed-width types, so a value the wire encoder cannot
// carry is rejected with its row instead of failing a whole batch.

fn money_in_range(value: &Decimal, small: bool) -> bool {
    let (min, max) = if small {
        (Decimal::new(-2_147_483_648, 4), Decimal::new(2_147_483_647, 4))
    } else {
        (Decimal::new(i64::MIN, 4), Decimal::new(i64::MAX, 4))
    };
    (min..=max).contains(value)
}

/// DATETIME rounds to 1/300 s, so the last representable instant is .998.
fn datetime_in_range(value: &NaiveDateTime) -> bool {
    let min = NaiveDate::from_ymd_opt(1753, 1, 1).and_then(|d| d.and_hms_opt(0, 0, 0));
    let max = NaiveDate::from_ymd_opt(9999, 12, 31).and_then(|d| d.and_hms_milli_opt(23, 59, 59, 998));
    matches!((min, max), (Some(min), Some(max)) if (min..=max).contains(value))
}

/// SMALLDATETIME rounds to the minute; 23:59:30 on the last day rolls over.
fn small_datetime_in_range(value: &NaiveDateTime) -> bool {
    let min = NaiveDate::from_ymd_opt(1900, 1, 1).and_then(|d| d.and_hms_opt(0, 0, 0));
    let max = NaiveDate::from_ymd_opt(2079, 6, 6)
        .and_then(|d| d.and_hms_nano_opt(23, 59, 29, 999_999_999));
    matches!((min, max), (Some(min), Some(max)) if (min..=max).contains(value))
}

fn parse_bit(text: &str) -> Option<bool> {
    match text.to_ascii_lowercase().as_str() {
        "1" | "true" | "t" | "yes" | "y" => Some(true),
        "0" | "false" | "f" | "no" | "n" => Some(false),
        _ => None,
    }
}

fn parse_decimal(text: &str) -> Option<Decimal> {
    let cleaned = text.strip_prefix('$').unwrap_or(text);
    Decimal::from_str(cleaned)
        .or_else(|_| Decimal::from_scientific(cleaned))
        .ok()
}

fn parse_datetime(text: &str) -> Option<NaiveDateTime> {
    DATETIME_FORMATS
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(text, fmt).ok())
        .or_else(|| parse_date(text).and_then(|d| d.and_hms_opt(0, 0, 0)))
}

fn parse_date(text: &str) -> Option<NaiveDate> {
    DATE_FORMATS
        .iter()
        .find_map(|fmt| NaiveDate::parse_from_str(text, fmt).ok())
}

fn parse_time(text: &str) -> Option<NaiveTime> {
    TIME_FORMATS
        .iter()
        .find_map(|fmt| NaiveTime::parse_from_str(text, fmt).ok())
}

fn parse_offset(text: &str) -> Option<DateTime<FixedOffset>> {
    DateTime::parse_from_rfc3339(text).ok().or_else(|| {
        OFFSET_FORMATS
            .iter()
            .find_map(|fmt| DateTime::parse_from_str(text, fmt).ok())
    })
}
