//! The `users` table row.

use crate::error::{DbError, DbResult};
use crate::models::Record;
use serde::Serialize;
use serde_json::Value as JsonValue;

/// Table every user operation reads and writes.
pub const USERS_TABLE: &str = "users";

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct User {
    pub id: i64,
    pub name: String,
    pub email: Option<String>,
    pub age: Option<f64>,
}

impl User {
    /// Build a user from a decoded row. `id` and `name` are required; `email`
    /// and `age` may be absent or NULL.
    pub fn from_record(record: &Record) -> DbResult<Self> {
        let id = record
            .get("id")
            .and_then(JsonValue::as_i64)
            .ok_or_else(|| DbError::schema("Missing integer column 'id'", USERS_TABLE))?;
        let name = record
            .get("name")
            .and_then(JsonValue::as_str)
            .ok_or_else(|| DbError::schema("Missing text column 'name'", USERS_TABLE))?
            .to_string();
        let email = record
            .get("email")
            .and_then(JsonValue::as_str)
            .map(String::from);
        let age = record.get("age").and_then(numeric_value);

        Ok(Self {
            id,
            name,
            email,
            age,
        })
    }
}

/// Read a number that may have been decoded as text (MySQL DECIMAL).
pub fn numeric_value(value: &JsonValue) -> Option<f64> {
    match value {
        JsonValue::Number(n) => n.as_f64(),
        JsonValue::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}
