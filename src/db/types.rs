//! Row decoding.
//!
//! Turns dialect-specific sqlx rows into [`Record`]s. SQLite is decoded by
//! the storage class of each value, MySQL by the declared column type.

use crate::models::Record;
use base64::{Engine as _, engine::general_purpose::STANDARD};
use serde_json::Value as JsonValue;
use sqlx::mysql::{MySqlRow, MySqlTypeInfo, MySqlValueRef};
use sqlx::sqlite::SqliteRow;
use sqlx::{Column, Decode, Row, Type, TypeInfo, ValueRef};

/// Conversion of a fetched row into a [`Record`].
pub trait IntoRecord {
    fn to_record(&self) -> Record;
}

impl IntoRecord for SqliteRow {
    fn to_record(&self) -> Record {
        self.columns()
            .iter()
            .map(|col| (col.name().to_string(), sqlite::decode(self, col.ordinal())))
            .collect()
    }
}

impl IntoRecord for MySqlRow {
    fn to_record(&self) -> Record {
        self.columns()
            .iter()
            .map(|col| {
                let type_name = col.type_info().name().to_ascii_uppercase();
                (
                    col.name().to_string(),
                    mysql::decode(self, col.ordinal(), &type_name),
                )
            })
            .collect()
    }
}

/// Blobs are carried as base64 text.
pub fn encode_binary(bytes: &[u8]) -> JsonValue {
    JsonValue::String(STANDARD.encode(bytes))
}

fn float_value(v: f64) -> JsonValue {
    serde_json::Number::from_f64(v)
        .map(JsonValue::Number)
        .unwrap_or_else(|| JsonValue::String(v.to_string()))
}

mod sqlite {
    use super::*;

    pub fn decode(row: &SqliteRow, idx: usize) -> JsonValue {
        let storage = match row.try_get_raw(idx) {
            Ok(raw) if raw.is_null() => return JsonValue::Null,
            Ok(raw) => raw.type_info().name().to_string(),
            Err(e) => {
                tracing::warn!(column = idx, error = %e, "Failed to read SQLite value");
                return JsonValue::Null;
            }
        };

        match storage.as_str() {
            "INTEGER" => row
                .try_get::<i64, _>(idx)
                .map(|v| JsonValue::Number(v.into()))
                .unwrap_or(JsonValue::Null),
            "REAL" => row
                .try_get::<f64, _>(idx)
                .map(float_value)
                .unwrap_or(JsonValue::Null),
            "BLOB" => row
                .try_get::<Vec<u8>, _>(idx)
                .map(|v| encode_binary(&v))
                .unwrap_or(JsonValue::Null),
            _ => row
                .try_get::<String, _>(idx)
                .map(JsonValue::String)
                .unwrap_or(JsonValue::Null),
        }
    }
}

/// Exact text form of a MySQL DECIMAL value.
#[derive(Debug)]
pub struct RawDecimal(pub String);

impl Type<sqlx::MySql> for RawDecimal {
    fn type_info() -> MySqlTypeInfo {
        <String as Type<sqlx::MySql>>::type_info()
    }

    fn compatible(ty: &MySqlTypeInfo) -> bool {
        ty.name().eq_ignore_ascii_case("decimal")
    }
}

impl<'r> Decode<'r, sqlx::MySql> for RawDecimal {
    fn decode(value: MySqlValueRef<'r>) -> Result<Self, sqlx::error::BoxDynError> {
        let s = <&str as Decode<sqlx::MySql>>::decode(value)?;
        Ok(RawDecimal(s.to_string()))
    }
}

mod mysql {
    use super::*;
    use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, Utc};

    pub fn decode(row: &MySqlRow, idx: usize, type_name: &str) -> JsonValue {
        match row.try_get_raw(idx) {
            Ok(raw) if raw.is_null() => return JsonValue::Null,
            Ok(_) => {}
            Err(e) => {
                tracing::warn!(column = idx, error = %e, "Failed to read MySQL value");
                return JsonValue::Null;
            }
        }

        let value = match type_name {
            "BOOLEAN" => row.try_get::<bool, _>(idx).map(JsonValue::Bool).ok(),
            "DECIMAL" => row
                .try_get::<RawDecimal, _>(idx)
                .map(|d| JsonValue::String(d.0))
                .ok(),
            "FLOAT" => row.try_get::<f32, _>(idx).map(|v| float_value(v as f64)).ok(),
            "DOUBLE" => row.try_get::<f64, _>(idx).map(float_value).ok(),
            "JSON" => row.try_get::<JsonValue, _>(idx).ok(),
            "DATETIME" => row
                .try_get::<NaiveDateTime, _>(idx)
                .map(|v| JsonValue::String(v.to_string()))
                .ok(),
            "TIMESTAMP" => row
                .try_get::<DateTime<Utc>, _>(idx)
                .map(|v| JsonValue::String(v.to_rfc3339()))
                .ok(),
            "DATE" => row
                .try_get::<NaiveDate, _>(idx)
                .map(|v| JsonValue::String(v.to_string()))
                .ok(),
            "TIME" => row
                .try_get::<NaiveTime, _>(idx)
                .map(|v| JsonValue::String(v.to_string()))
                .ok(),
            t if t.contains("INT") => decode_integer(row, idx),
            t if t.contains("BLOB") || t.contains("BINARY") => row
                .try_get::<Vec<u8>, _>(idx)
                .map(|v| encode_binary(&v))
                .ok(),
            _ => row.try_get::<String, _>(idx).map(JsonValue::String).ok(),
        };

        value.unwrap_or_else(|| {
            tracing::warn!(column = idx, type_name, "Unsupported MySQL value");
            JsonValue::Null
        })
    }

    fn decode_integer(row: &MySqlRow, idx: usize) -> Option<JsonValue> {
        if let Ok(v) = row.try_get::<i64, _>(idx) {
            return Some(JsonValue::Number(v.into()));
        }
        row.try_get::<u64, _>(idx)
            .map(|v| JsonValue::Number(v.into()))
            .ok()
    }
}
