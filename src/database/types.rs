//! SQL Server value conversion for display.

use chrono::{DateTime, FixedOffset, NaiveDate, NaiveDateTime, NaiveTime};
use rust_decimal::Decimal;
use std::fmt;
use tiberius::xml::XmlData;
use tiberius::{ColumnType, Row};
use uuid::Uuid;

/// A column value read from a result row.
#[derive(Debug, Clone, PartialEq)]
pub enum SqlValue {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Decimal(Decimal),
    String(String),
    Bytes(Vec<u8>),
    Uuid(Uuid),
    Date(NaiveDate),
    Time(NaiveTime),
    DateTime(NaiveDateTime),
    DateTimeOffset(DateTime<FixedOffset>),
}

impl SqlValue {
    pub fn is_null(&self) -> bool {
        matches!(self, SqlValue::Null)
    }

    /// Extract column `idx` of a tiberius row.
    ///
    /// Types without a display mapping (e.g. `sql_variant`) read as `Null`.
    pub fn from_row(row: &Row, idx: usize) -> SqlValue {
        let Some(column) = row.columns().get(idx) else {
            return SqlValue::Null;
        };

        let value = match column.column_type() {
            ColumnType::Bit | ColumnType::Bitn => get(row, idx, SqlValue::Bool),
            ColumnType::Int1 => get(row, idx, |v: u8| SqlValue::Int(v.into())),
            ColumnType::Int2 => get(row, idx, |v: i16| SqlValue::Int(v.into())),
            ColumnType::Int4 => get(row, idx, |v: i32| SqlValue::Int(v.into())),
            ColumnType::Int8 => get(row, idx, SqlValue::Int),
            ColumnType::Intn => int_n(row, idx),
            ColumnType::Float4 => get(row, idx, |v: f32| SqlValue::Float(v.into())),
            ColumnType::Float8 => get(row, idx, SqlValue::Float),
            ColumnType::Floatn => get(row, idx, SqlValue::Float)
                .or_else(|| get(row, idx, |v: f32| SqlValue::Float(v.into()))),
            ColumnType::Money
            | ColumnType::Money4
            | ColumnType::Decimaln
            | ColumnType::Numericn => get(row, idx, SqlValue::Decimal)
                .or_else(|| get(row, idx, SqlValue::Float)),
            ColumnType::Guid => get(row, idx, SqlValue::Uuid),
            ColumnType::Daten => get(row, idx, SqlValue::Date),
            ColumnType::Timen => get(row, idx, SqlValue::Time),
            ColumnType::Datetime
            | ColumnType::Datetime4
            | ColumnType::Datetimen
            | ColumnType::Datetime2 => get(row, idx, SqlValue::DateTime),
            ColumnType::DatetimeOffsetn => get(row, idx, SqlValue::DateTimeOffset),
            ColumnType::BigVarBin | ColumnType::BigBinary | ColumnType::Image => {
                get(row, idx, |v: &[u8]| SqlValue::Bytes(v.to_vec()))
            }
            ColumnType::BigVarChar
            | ColumnType::BigChar
            | ColumnType::NVarchar
            | ColumnType::NChar
            | ColumnType::Text
            | ColumnType::NText => get(row, idx, |v: &str| SqlValue::String(v.to_string())),
            ColumnType::Xml => get(row, idx, |v: &XmlData| {
                SqlValue::String(v.clone().into_string())
            }),
            _ => None,
        };
        value.unwrap_or(SqlValue::Null)
    }
}

fn get<'a, T, F>(row: &'a Row, idx: usize, wrap: F) -> Option<SqlValue>
where
    T: tiberius::FromSql<'a>,
    F: FnOnce(T) -> SqlValue,
{
    row.try_get::<T, _>(idx).ok().flatten().map(wrap)
}

// INTN columns carry their width in the value, so try each size.
fn int_n(row: &Row, idx: usize) -> Option<SqlValue> {
    get(row, idx, |v: i32| SqlValue::Int(v.into()))
        .or_else(|| get(row, idx, SqlValue::Int))
        .or_else(|| get(row, idx, |v: i16| SqlValue::Int(v.into())))
        .or_else(|| get(row, idx, |v: u8| SqlValue::Int(v.into())))
}

impl fmt::Display for SqlValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SqlValue::Null => Ok(()),
            SqlValue::Bool(v) => write!(f, "{}", if *v { "True" } else { "False" }),
            SqlValue::Int(v) => write!(f, "{}", v),
            SqlValue::Float(v) => write!(f, "{}", v),
            SqlValue::Decimal(v) => write!(f, "{}", v),
            SqlValue::String(v) => f.write_str(v),
            SqlValue::Bytes(v) => {
                f.write_str("0x")?;
                v.iter().try_for_each(|b| write!(f, "{:02X}", b))
            }
            SqlValue::Uuid(v) => write!(f, "{}", v),
            SqlValue::Date(v) => write!(f, "{}", v),
            SqlValue::Time(v) => write!(f, "{}", v),
            SqlValue::DateTime(v) => write!(f, "{}", v),
            SqlValue::DateTimeOffset(v) => write!(f, "{}", v.to_rfc3339()),
        }
    }
}

impl From<&str> for SqlValue {
    fn from(value: &str) -> Self {
        SqlValue::String(value.to_string())
    }
}

impl From<i64> for SqlValue {
    fn from(value: i64) -> Self {
        SqlValue::Int(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display() {
        assert_eq!(SqlValue::Null.to_string(), "");
        assert_eq!(SqlValue::Int(42).to_string(), "42");
        assert_eq!(SqlValue::from("ONLINE").to_string(), "ONLINE");
        assert_eq!(SqlValue::Bool(true).to_string(), "True");
        assert_eq!(SqlValue::Bytes(vec![0xde, 0xad]).to_string(), "0xDEAD");
        assert_eq!(
            SqlValue::Decimal(Decimal::new(12345, 2)).to_string(),
            "123.45"
        );
    }

    #[test]
    fn test_is_null() {
        assert!(SqlValue::Null.is_null());
        assert!(!SqlValue::Int(0).is_null());
    }
}
