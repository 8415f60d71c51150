//! Conversion of raw csv values into typed values
//!
//! Invalid values are never an error: they become [Value::Null], and dates
//! and times are reported with a warning.

use crate::schema::ColumnType;
use chrono::{NaiveDate, NaiveTime};
use rusqlite::types::{ToSql, ToSqlOutput};
use rust_decimal::{Decimal, RoundingStrategy};
use std::str::FromStr;

/// A value ready to be bound in a SQL statement
#[derive(Debug, Clone, PartialEq, Default)]
pub enum Value {
    /// Empty or invalid field
    #[default]
    Null,
    /// Integer column, truncated from the raw number
    Integer(i64),
    /// Decimal column, at the scale [DECIMAL_SCALE]
    Decimal(Decimal),
    /// Float column
    Float(f64),
    /// Date column, bound as `YYYY-MM-DD`
    Date(NaiveDate),
    /// Time column, bound as `HH:MM:SS`
    Time(NaiveTime),
    /// Trimmed text, also used for columns unknown to the table
    Text(String),
}

impl ToSql for Value {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        match self {
            Value::Null => Ok(ToSqlOutput::Owned(rusqlite::types::Value::Null)),
            Value::Integer(i) => Ok(ToSqlOutput::from(*i)),
            // converted to a number by the NUMERIC affinity of the column
            Value::Decimal(d) => Ok(ToSqlOutput::from(d.to_string())),
            Value::Float(f) => Ok(ToSqlOutput::from(*f)),
            Value::Date(d) => d.to_sql(),
            Value::Time(t) => t.to_sql(),
            Value::Text(s) => Ok(ToSqlOutput::from(s.as_str())),
        }
    }
}

/// Number of decimals kept for the `DECIMAL(10,2)` columns
pub const DECIMAL_SCALE: u32 = 2;

/// Parses a GTFS date, `YYYYMMDD`
pub fn parse_date(s: &str) -> Option<NaiveDate> {
    let s = s.trim();
    if s.is_empty() {
        return None;
    }
    match NaiveDate::parse_from_str(s, "%Y%m%d") {
        Ok(d) => Some(d),
        Err(_) => {
            log::warn!("Invalid date format: {}", s);
            None
        }
    }
}

/// Parses the hours, minutes and seconds of a time
pub fn parse_time_impl(
    h: &str,
    m: &str,
    s: &str,
) -> Result<(u32, u32, u32), std::num::ParseIntError> {
    let hours: u32 = h.parse()?;
    let minutes: u32 = m.parse()?;
    let seconds: u32 = s.parse()?;
    Ok((hours, minutes, seconds))
}

/// Parses a GTFS time, `HH:MM:SS`, as a wall-clock time
///
/// GTFS times past midnight of the service day go beyond `24:00:00`; only
/// the hour modulo 24 is kept, so `25:30:00` is `01:30:00`.
pub fn parse_time(s: &str) -> Option<NaiveTime> {
    let s = s.trim();
    if s.is_empty() {
        return None;
    }
    let mut parts = s.split(':');
    let parsed = match (parts.next(), parts.next(), parts.next(), parts.next()) {
        (Some(h), Some(m), Some(sec), None) => parse_time_impl(h, m, sec).ok(),
        _ => None,
    };
    let time = parsed.and_then(|(hours, minutes, seconds)| {
        if hours >= 24 {
            log::debug!("Time {} wrapped to the wall-clock hour {}", s, hours % 24);
        }
        NaiveTime::from_hms_opt(hours % 24, minutes, seconds)
    });
    if time.is_none() {
        log::warn!("Invalid time format: {}", s);
    }
    time
}

/// Parses an integer, accepting a trailing decimal part as in `"3.0"`
///
/// The value goes through a float first and is truncated.
pub fn parse_integer(s: &str) -> Option<i64> {
    parse_float(s)
        .filter(|f| f.is_finite() && *f >= i64::MIN as f64 && *f <= i64::MAX as f64)
        .map(|f| f.trunc() as i64)
}

/// Parses a float, `None` if invalid
pub fn parse_float(s: &str) -> Option<f64> {
    s.trim().parse().ok()
}

/// Parses a decimal and rounds it to [DECIMAL_SCALE] decimals
///
/// The exponent notation (`1E+1`) is accepted. Midpoints are rounded away
/// from zero, so `0.125` is `0.13` and `4.5` is `4.50`.
pub fn parse_decimal(s: &str) -> Option<Decimal> {
    let s = s.trim();
    let s = s.strip_suffix('.').unwrap_or(s);
    let parsed = if s.contains(|c| c == 'e' || c == 'E') {
        Decimal::from_scientific(s)
    } else {
        Decimal::from_str(s)
    };
    parsed.ok().map(|d| {
        let mut rounded =
            d.round_dp_with_strategy(DECIMAL_SCALE, RoundingStrategy::MidpointAwayFromZero);
        rounded.rescale(DECIMAL_SCALE);
        rounded
    })
}

/// Converts a raw csv value according to the type of its destination column
///
/// Columns unknown to the table are `None` and kept as text.
pub fn coerce(raw: &str, column_type: Option<ColumnType>) -> Value {
    if raw.is_empty() {
        return Value::Null;
    }
    let value = match column_type {
        Some(ColumnType::Integer) => parse_integer(raw).map(Value::Integer),
        Some(ColumnType::Decimal) => parse_decimal(raw).map(Value::Decimal),
        Some(ColumnType::Float) => parse_float(raw).map(Value::Float),
        Some(ColumnType::Date) => parse_date(raw).map(Value::Date),
        Some(ColumnType::Time) => parse_time(raw).map(Value::Time),
        Some(ColumnType::Text) | None => {
            let trimmed = raw.trim();
            if trimmed.is_empty() {
                None
            } else {
                Some(Value::Text(trimmed.to_owned()))
            }
        }
    };
    value.unwrap_or(Value::Null)
}
