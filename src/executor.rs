//! Execution adapter.
//!
//! Wraps the SQL execution collaborator. Every call produces an
//! `ExecutionResult` with timing metadata, success or failure; collaborator
//! errors are caught, logged, and folded into the result rather than
//! propagated.

use crate::error::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;
use tracing::{error, info};

/// One result row as returned by the execution collaborator.
pub type Row = HashMap<String, serde_json::Value>;

/// External SQL execution collaborator.
///
/// Implementations must reject destructive statements when `safe_mode` is
/// true and cap the returned rows at `row_limit`.
#[async_trait]
pub trait SqlExecutor: Send + Sync {
    async fn execute_query(&self, query: &str, safe_mode: bool, row_limit: usize)
        -> Result<Vec<Row>>;
}

/// Outcome of one execution attempt.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionResult {
    pub success: bool,
    pub rows: Option<Vec<Row>>,
    pub row_count: usize,
    pub error: Option<String>,
    /// Wall-clock seconds from dispatch to completion, present on failure too.
    pub execution_time: f64,
    pub safe_mode: bool,
    pub row_limit: usize,
    pub timestamp: DateTime<Utc>,
}

/// Adapter between the pipeline and a `SqlExecutor`.
pub struct ExecutionAdapter {
    executor: Arc<dyn SqlExecutor>,
}

impl ExecutionAdapter {
    pub fn new(executor: Arc<dyn SqlExecutor>) -> Self {
        Self { executor }
    }

    /// Execute `sql` and wrap the outcome. Never returns an error.
    pub async fn execute(&self, sql: &str, safe_mode: bool, row_limit: usize) -> ExecutionResult {
        let timestamp = Utc::now();
        let start = Instant::now();

        match self.executor.execute_query(sql, safe_mode, row_limit).await {
            Ok(rows) => {
                let execution_time = start.elapsed().as_secs_f64();
                info!(
                    "Query executed in {:.3}s, returned {} rows",
                    execution_time,
                    rows.len()
                );
                ExecutionResult {
                    success: true,
                    row_count: rows.len(),
                    rows: Some(rows),
                    error: None,
                    execution_time,
                    safe_mode,
                    row_limit,
                    timestamp,
                }
            }
            Err(e) => {
                let execution_time = start.elapsed().as_secs_f64();
                error!(
                    "Query execution failed after {:.3}s (safe_mode={}, row_limit={}): {}",
                    execution_time, safe_mode, row_limit, e
                );
                ExecutionResult {
                    success: false,
                    rows: None,
                    row_count: 0,
                    error: Some(e.to_string()),
                    execution_time,
                    safe_mode,
                    row_limit,
                    timestamp,
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::PilotError;

    struct FixedExecutor {
        rows: Vec<Row>,
        fail: bool,
    }

    #[async_trait]
    impl SqlExecutor for FixedExecutor {
        async fn execute_query(
            &self,
            _query: &str,
            _safe_mode: bool,
            row_limit: usize,
        ) -> Result<Vec<Row>> {
            if self.fail {
                return Err(PilotError::Execution("connection refused".to_string()));
            }
            Ok(self.rows.iter().take(row_limit).cloned().collect())
        }
    }

    fn row(name: &str) -> Row {
        let mut r = Row::new();
        r.insert("name".to_string(), serde_json::Value::from(name));
        r
    }

    #[tokio::test]
    async fn test_success_carries_rows_and_timing() {
        let adapter = ExecutionAdapter::new(Arc::new(FixedExecutor {
            rows: vec![row("alice"), row("bob")],
            fail: false,
        }));
        let result = adapter.execute("SELECT * FROM customers", true, 100).await;
        assert!(result.success);
        assert_eq!(result.row_count, 2);
        assert!(result.error.is_none());
        assert!(result.execution_time >= 0.0);
        assert!(result.safe_mode);
        assert_eq!(result.row_limit, 100);
    }

    #[tokio::test]
    async fn test_failure_is_absorbed_with_timing() {
        let adapter = ExecutionAdapter::new(Arc::new(FixedExecutor {
            rows: vec![],
            fail: true,
        }));
        let result = adapter.execute("SELECT 1", true, 10).await;
        assert!(!result.success);
        assert!(result.rows.is_none());
        assert_eq!(result.row_count, 0);
        assert!(result.error.as_deref().unwrap().contains("connection refused"));
        assert!(result.execution_time >= 0.0);
    }

    #[tokio::test]
    async fn test_row_limit_respected_by_collaborator() {
        let adapter = ExecutionAdapter::new(Arc::new(FixedExecutor {
            rows: vec![row("a"), row("b"), row("c")],
            fail: false,
        }));
        let result = adapter.execute("SELECT * FROM t", true, 2).await;
        assert_eq!(result.row_count, 2);
    }
}
