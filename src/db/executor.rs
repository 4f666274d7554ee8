//! PostgreSQL implementation of the SQL execution collaborator.

use crate::error::{PilotError, Result};
use crate::executor::{Row, SqlExecutor};
use crate::guards;
use async_trait::async_trait;
use serde_json::Value;
use sqlx::postgres::{PgPool, PgRow};
use sqlx::{Column, Row as SqlxRow, TypeInfo};
use tracing::{info, warn};

/// Executes statements against a Postgres pool, enforcing the safe-mode
/// guard and the row cap itself.
pub struct PostgresExecutor {
    pool: PgPool,
}

impl PostgresExecutor {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    fn decode_column(row: &PgRow, idx: usize, type_name: &str) -> Value {
        match type_name {
            "BOOL" => row
                .try_get::<Option<bool>, _>(idx)
                .ok()
                .flatten()
                .map(Value::from)
                .unwrap_or(Value::Null),
            "INT2" => row
                .try_get::<Option<i16>, _>(idx)
                .ok()
                .flatten()
                .map(Value::from)
                .unwrap_or(Value::Null),
            "INT4" => row
                .try_get::<Option<i32>, _>(idx)
                .ok()
                .flatten()
                .map(Value::from)
                .unwrap_or(Value::Null),
            "INT8" => row
                .try_get::<Option<i64>, _>(idx)
                .ok()
                .flatten()
                .map(Value::from)
                .unwrap_or(Value::Null),
            "FLOAT4" => row
                .try_get::<Option<f32>, _>(idx)
                .ok()
                .flatten()
                .map(|v| Value::from(v as f64))
                .unwrap_or(Value::Null),
            "FLOAT8" => row
                .try_get::<Option<f64>, _>(idx)
                .ok()
                .flatten()
                .map(Value::from)
                .unwrap_or(Value::Null),
            "UUID" => row
                .try_get::<Option<uuid::Uuid>, _>(idx)
                .ok()
                .flatten()
                .map(|v| Value::from(v.to_string()))
                .unwrap_or(Value::Null),
            "DATE" => row
                .try_get::<Option<chrono::NaiveDate>, _>(idx)
                .ok()
                .flatten()
                .map(|v| Value::from(v.to_string()))
                .unwrap_or(Value::Null),
            "TIMESTAMP" => row
                .try_get::<Option<chrono::NaiveDateTime>, _>(idx)
                .ok()
                .flatten()
                .map(|v| Value::from(v.to_string()))
                .unwrap_or(Value::Null),
            "TIMESTAMPTZ" => row
                .try_get::<Option<chrono::DateTime<chrono::Utc>>, _>(idx)
                .ok()
                .flatten()
                .map(|v| Value::from(v.to_rfc3339()))
                .unwrap_or(Value::Null),
            "TEXT" | "VARCHAR" | "CHAR" | "BPCHAR" | "NAME" => row
                .try_get::<Option<String>, _>(idx)
                .ok()
                .flatten()
                .map(Value::from)
                .unwrap_or(Value::Null),
            other => {
                // Unmapped Postgres type (NUMERIC, arrays, json...). Try a
                // text decode, otherwise surface NULL.
                match row.try_get::<Option<String>, _>(idx) {
                    Ok(v) => v.map(Value::from).unwrap_or(Value::Null),
                    Err(_) => {
                        warn!("Unsupported column type '{}', returning NULL", other);
                        Value::Null
                    }
                }
            }
        }
    }

    fn row_to_map(row: &PgRow) -> Row {
        let mut map = Row::new();
        for (idx, column) in row.columns().iter().enumerate() {
            let value = Self::decode_column(row, idx, column.type_info().name());
            map.insert(column.name().to_string(), value);
        }
        map
    }
}

#[async_trait]
impl SqlExecutor for PostgresExecutor {
    async fn execute_query(
        &self,
        query: &str,
        safe_mode: bool,
        row_limit: usize,
    ) -> Result<Vec<Row>> {
        guards::check_statement(query, safe_mode)?;

        let rows = sqlx::query(query)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| PilotError::Execution(format!("Query failed: {}", e)))?;

        if rows.len() > row_limit {
            info!("Capping result from {} to {} rows", rows.len(), row_limit);
        }

        Ok(rows.iter().take(row_limit).map(Self::row_to_map).collect())
    }
}
