//! Schema introspection from information_schema.
//!
//! Builds the read-only schema descriptor the pipeline consumes. Table and
//! column order follow the catalog query ordering, which keeps the rendered
//! summary stable between runs against the same database.

use crate::error::{PilotError, Result};
use crate::schema::{ColumnSchema, ForeignKeySchema, SchemaDescriptor, TableSchema};
use sqlx::postgres::PgPool;
use sqlx::Row as SqlxRow;
use tracing::info;

pub struct PostgresIntrospector {
    pool: PgPool,
    schema_name: String,
}

impl PostgresIntrospector {
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool,
            schema_name: "public".to_string(),
        }
    }

    pub fn with_schema(mut self, schema_name: impl Into<String>) -> Self {
        self.schema_name = schema_name.into();
        self
    }

    /// Load tables, columns, primary keys, and foreign keys.
    pub async fn load_schema(&self) -> Result<SchemaDescriptor> {
        let mut descriptor = SchemaDescriptor::default();

        let columns = sqlx::query(
            r#"
            SELECT table_name, column_name, data_type, is_nullable
            FROM information_schema.columns
            WHERE table_schema = $1
            ORDER BY table_name, ordinal_position
            "#,
        )
        .bind(&self.schema_name)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| PilotError::Schema(format!("Failed to read columns: {}", e)))?;

        for row in &columns {
            let table_name: String = row
                .try_get("table_name")
                .map_err(|e| PilotError::Schema(e.to_string()))?;
            let column = ColumnSchema {
                name: row
                    .try_get("column_name")
                    .map_err(|e| PilotError::Schema(e.to_string()))?,
                data_type: row
                    .try_get("data_type")
                    .map_err(|e| PilotError::Schema(e.to_string()))?,
                nullable: row
                    .try_get::<String, _>("is_nullable")
                    .map_err(|e| PilotError::Schema(e.to_string()))?
                    == "YES",
            };

            match descriptor.tables.last_mut() {
                Some(table) if table.name == table_name => table.columns.push(column),
                _ => descriptor.tables.push(TableSchema {
                    name: table_name,
                    columns: vec![column],
                    primary_key: Vec::new(),
                    foreign_keys: Vec::new(),
                }),
            }
        }

        let primary_keys = sqlx::query(
            r#"
            SELECT tc.table_name, kcu.column_name
            FROM information_schema.table_constraints tc
            JOIN information_schema.key_column_usage kcu
              ON tc.constraint_name = kcu.constraint_name
             AND tc.table_schema = kcu.table_schema
            WHERE tc.constraint_type = 'PRIMARY KEY' AND tc.table_schema = $1
            ORDER BY tc.table_name, kcu.ordinal_position
            "#,
        )
        .bind(&self.schema_name)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| PilotError::Schema(format!("Failed to read primary keys: {}", e)))?;

        for row in &primary_keys {
            let table_name: String = row
                .try_get("table_name")
                .map_err(|e| PilotError::Schema(e.to_string()))?;
            let column_name: String = row
                .try_get("column_name")
                .map_err(|e| PilotError::Schema(e.to_string()))?;
            if let Some(table) = descriptor.tables.iter_mut().find(|t| t.name == table_name) {
                table.primary_key.push(column_name);
            }
        }

        let foreign_keys = sqlx::query(
            r#"
            SELECT tc.table_name, kcu.column_name,
                   ccu.table_name AS foreign_table, ccu.column_name AS foreign_column
            FROM information_schema.table_constraints tc
            JOIN information_schema.key_column_usage kcu
              ON tc.constraint_name = kcu.constraint_name
             AND tc.table_schema = kcu.table_schema
            JOIN information_schema.constraint_column_usage ccu
              ON tc.constraint_name = ccu.constraint_name
             AND tc.table_schema = ccu.table_schema
            WHERE tc.constraint_type = 'FOREIGN KEY' AND tc.table_schema = $1
            ORDER BY tc.table_name, kcu.column_name
            "#,
        )
        .bind(&self.schema_name)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| PilotError::Schema(format!("Failed to read foreign keys: {}", e)))?;

        for row in &foreign_keys {
            let table_name: String = row
                .try_get("table_name")
                .map_err(|e| PilotError::Schema(e.to_string()))?;
            let fk = ForeignKeySchema {
                column: row
                    .try_get("column_name")
                    .map_err(|e| PilotError::Schema(e.to_string()))?,
                references_table: row
                    .try_get("foreign_table")
                    .map_err(|e| PilotError::Schema(e.to_string()))?,
                references_column: row
                    .try_get("foreign_column")
                    .map_err(|e| PilotError::Schema(e.to_string()))?,
            };
            if let Some(table) = descriptor.tables.iter_mut().find(|t| t.name == table_name) {
                table.foreign_keys.push(fk);
            }
        }

        info!(
            "Introspected {} tables from schema '{}'",
            descriptor.tables.len(),
            self.schema_name
        );

        Ok(descriptor)
    }
}
