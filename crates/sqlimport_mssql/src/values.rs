//! Mapping of converted field values onto TDS column data.

use crate::error::MssqlError;
use chrono::{NaiveDate, NaiveDateTime, Timelike};
use rust_decimal::Decimal;
use sqlimport_core::{SqlType, SqlValue};
use std::borrow::Cow;
use tiberius::numeric::Numeric;
use tiberius::{ColumnData, IntoSql};

/// Bulk-copy encoding needs a value whose wire type matches the column,
/// including NULLs.
pub(crate) fn column_data(
    value: SqlValue,
    sql_type: SqlType,
    scale: Option<u8>,
) -> Result<ColumnData<'static>, MssqlError> {
    let data = match (value, sql_type) {
        (SqlValue::Null, ty) => null_for(ty),
        (SqlValue::Bit(v), _) => ColumnData::Bit(Some(v)),
        (SqlValue::TinyInt(v), _) => ColumnData::U8(Some(v)),
        (SqlValue::SmallInt(v), _) => ColumnData::I16(Some(v)),
        (SqlValue::Int(v), _) => ColumnData::I32(Some(v)),
        (SqlValue::BigInt(v), _) => ColumnData::I64(Some(v)),
        (SqlValue::Real(v), _) => ColumnData::F32(Some(v)),
        (SqlValue::Float(v), _) => ColumnData::F64(Some(v)),
        (SqlValue::Decimal(v), SqlType::Money | SqlType::SmallMoney) => {
            ColumnData::F64(Some(decimal_to_f64(v)?))
        }
        (SqlValue::Decimal(mut v), _) => {
            // The server rejects a scale that differs from the column's.
            if let Some(scale) = scale {
                v.rescale(u32::from(scale));
            }
            ColumnData::Numeric(Some(Numeric::new_with_scale(v.mantissa(), v.scale() as u8)))
        }
        (SqlValue::DateTime(v), SqlType::DateTime) => ColumnData::DateTime(Some(legacy_datetime(v)?)),
        (SqlValue::DateTime(v), SqlType::SmallDateTime) => {
            ColumnData::SmallDateTime(Some(small_datetime(v)?))
        }
        (SqlValue::DateTime(v), _) => v.into_sql(),
        (SqlValue::Date(v), _) => v.into_sql(),
        (SqlValue::Time(v), _) => v.into_sql(),
        (SqlValue::DateTimeOffset(v), _) => v.into_sql(),
        (SqlValue::Text(v), _) => ColumnData::String(Some(Cow::Owned(v))),
    };
    Ok(data)
}

fn null_for(sql_type: SqlType) -> ColumnData<'static> {
    match sql_type {
        SqlType::Bit => ColumnData::Bit(None),
        SqlType::TinyInt => ColumnData::U8(None),
        SqlType::SmallInt => ColumnData::I16(None),
        SqlType::Int => ColumnData::I32(None),
        SqlType::BigInt => ColumnData::I64(None),
        SqlType::Real => ColumnData::F32(None),
        SqlType::Float | SqlType::Money | SqlType::SmallMoney => ColumnData::F64(None),
        SqlType::Decimal | SqlType::Numeric => ColumnData::Numeric(None),
        SqlType::DateTime => ColumnData::DateTime(None),
        SqlType::SmallDateTime => ColumnData::SmallDateTime(None),
        SqlType::DateTime2 => ColumnData::DateTime2(None),
        SqlType::Date => ColumnData::Date(None),
        SqlType::Time => ColumnData::Time(None),
        SqlType::DateTimeOffset => ColumnData::DateTimeOffset(None),
        SqlType::Character | SqlType::Other => ColumnData::String(None),
    }
}

fn decimal_to_f64(value: Decimal) -> Result<f64, MssqlError> {
    value
        .to_string()
        .parse()
        .map_err(|_| MssqlError::Value(format!("cannot represent {} as money", value)))
}

fn epoch() -> NaiveDate {
    NaiveDate::from_ymd_opt(1900, 1, 1).unwrap_or_default()
}

/// DATETIME: days since 1900-01-01 and 1/300 second ticks since midnight.
fn legacy_datetime(value: NaiveDateTime) -> Result<tiberius::time::DateTime, MssqlError> {
    let mut days = (value.date() - epoch()).num_days();
    let nanos = u64::from(value.num_seconds_from_midnight()) * 1_000_000_000
        + u64::from(value.nanosecond() % 1_000_000_000);
    let mut ticks = (nanos * 300 + 500_000_000) / 1_000_000_000;
    if ticks >= 300 * 86_400 {
        ticks -= 300 * 86_400;
        days += 1;
    }
    let days = i32::try_from(days)
        .map_err(|_| MssqlError::Value(format!("{} is out of range for datetime", value)))?;
    // Fits: ticks < 300 * 86400.
    Ok(tiberius::time::DateTime::new(days, ticks as u32))
}

/// SMALLDATETIME: unsigned days since 1900-01-01 and minutes since midnight,
/// rounded to the nearest minute.
fn small_datetime(value: NaiveDateTime) -> Result<tiberius::time::SmallDateTime, MssqlError> {
    let out_of_range = || MssqlError::Value(format!("{} is out of range for smalldatetime", value));
    let mut days = (value.date() - epoch()).num_days();
    let mut minutes = (value.num_seconds_from_midnight() + 30) / 60;
    if minutes >= 1440 {
        minutes -= 1440;
        days += 1;
    }
    let days = u16::try_from(days).map_err(|_| out_of_range())?;
    Ok(tiberius::time::SmallDateTime::new(days, minutes as u16))
}
