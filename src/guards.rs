//! Query guards.
//!
//! Safety checks applied by the shipped executor before a statement reaches
//! the database. In safe mode only plain queries pass; INSERT/UPDATE/DELETE,
//! DDL, and multi-statement batches are rejected.

use crate::error::{PilotError, Result};
use sqlparser::ast::Statement;
use sqlparser::dialect::PostgreSqlDialect;
use sqlparser::parser::Parser;

/// Validate a statement against the safe-mode policy.
///
/// Multi-statement batches are rejected in every mode; a single statement of
/// any kind passes once safe mode is off.
pub fn check_statement(sql: &str, safe_mode: bool) -> Result<()> {
    let statements = Parser::parse_sql(&PostgreSqlDialect {}, sql)
        .map_err(|e| PilotError::Execution(format!("Failed to parse SQL: {}", e)))?;

    if statements.is_empty() {
        return Err(PilotError::Execution("Empty SQL statement".to_string()));
    }
    if statements.len() > 1 {
        return Err(PilotError::Execution(format!(
            "Expected a single statement, got {}",
            statements.len()
        )));
    }

    if safe_mode {
        match &statements[0] {
            Statement::Query(_) => {}
            other => {
                return Err(PilotError::Execution(format!(
                    "Statement rejected in safe mode: {}",
                    statement_kind(other)
                )));
            }
        }
    }

    Ok(())
}

fn statement_kind(statement: &Statement) -> &'static str {
    match statement {
        Statement::Insert { .. } => "INSERT",
        Statement::Update { .. } => "UPDATE",
        Statement::Delete { .. } => "DELETE",
        Statement::Drop { .. } => "DROP",
        Statement::Truncate { .. } => "TRUNCATE",
        Statement::AlterTable { .. } => "ALTER TABLE",
        Statement::CreateTable { .. } => "CREATE TABLE",
        _ => "non-query statement",
    }
}
