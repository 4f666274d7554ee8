//! Schema descriptor and summarizer.
//!
//! The descriptor is supplied by an introspection collaborator and is
//! read-only to the pipeline. Tables and columns are stored as ordered
//! sequences, never re-sorted, so the rendered summary is byte-identical
//! across calls and safe to embed in cache keys.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ColumnSchema {
    pub name: String,
    pub data_type: String,
    pub nullable: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ForeignKeySchema {
    pub column: String,
    pub references_table: String,
    pub references_column: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TableSchema {
    pub name: String,
    pub columns: Vec<ColumnSchema>,
    #[serde(default)]
    pub primary_key: Vec<String>,
    #[serde(default)]
    pub foreign_keys: Vec<ForeignKeySchema>,
}

impl TableSchema {
    pub fn column_names(&self) -> Vec<String> {
        self.columns.iter().map(|c| c.name.clone()).collect()
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SchemaDescriptor {
    pub tables: Vec<TableSchema>,
}

impl SchemaDescriptor {
    pub fn table(&self, name: &str) -> Option<&TableSchema> {
        self.tables.iter().find(|t| t.name == name)
    }
}

/// Render a descriptor into the compact textual form used in prompts.
///
/// One block per table: each column as `name type NULLABILITY`, primary-key
/// columns tagged `[PRIMARY KEY]`, then one `FOREIGN KEY (col) REFERENCES
/// table(col)` line per declared key. Blocks are separated by blank lines.
pub fn summarize(schema: &SchemaDescriptor) -> String {
    let mut blocks = Vec::with_capacity(schema.tables.len());

    for table in &schema.tables {
        let mut lines = vec![format!("Table: {}", table.name)];

        for column in &table.columns {
            let nullability = if column.nullable { "NULL" } else { "NOT NULL" };
            let mut line = format!("  {} {} {}", column.name, column.data_type, nullability);
            if table.primary_key.contains(&column.name) {
                line.push_str(" [PRIMARY KEY]");
            }
            lines.push(line);
        }

        for fk in &table.foreign_keys {
            lines.push(format!(
                "  FOREIGN KEY ({}) REFERENCES {}({})",
                fk.column, fk.references_table, fk.references_column
            ));
        }

        blocks.push(lines.join("\n"));
    }

    blocks.join("\n\n")
}
