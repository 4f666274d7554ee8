//! Run history store.
//!
//! Persists one row per completed pipeline run so past questions, generated
//! SQL, and outcomes can be inspected later. SQLite-backed, connection
//! guarded by a mutex.

use crate::error::{PilotError, Result};
use crate::orchestrator::{PipelineResult, PipelineStatus};
use rusqlite::{params, Connection};
use std::path::Path;
use std::sync::Mutex;
use tracing::info;

#[derive(Debug, Clone)]
pub struct RunRecord {
    pub id: String,
    pub question: String,
    pub sql: Option<String>,
    pub status: String,
    pub error: Option<String>,
    pub candidate_count: i64,
    pub created_at: String,
}

pub struct RunHistory {
    db: Mutex<Connection>,
}

impl RunHistory {
    pub fn open(path: &Path) -> Result<Self> {
        let conn = Connection::open(path)
            .map_err(|e| PilotError::History(format!("Failed to open history db: {}", e)))?;
        Self::init(conn)
    }

    pub fn in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()
            .map_err(|e| PilotError::History(format!("Failed to open history db: {}", e)))?;
        Self::init(conn)
    }

    fn init(conn: Connection) -> Result<Self> {
        conn.execute(
            r#"
            CREATE TABLE IF NOT EXISTS pipeline_runs (
                id TEXT PRIMARY KEY,
                question TEXT NOT NULL,
                sql TEXT,
                status TEXT NOT NULL,
                error TEXT,
                candidate_count INTEGER NOT NULL,
                created_at TEXT NOT NULL
            )
            "#,
            [],
        )
        .map_err(|e| PilotError::History(format!("Failed to create history table: {}", e)))?;

        Ok(Self {
            db: Mutex::new(conn),
        })
    }

    /// Record one finished run.
    pub fn record(&self, question: &str, result: &PipelineResult) -> Result<()> {
        let status = match result.status {
            PipelineStatus::Done => "done",
            PipelineStatus::Failed => "failed",
        };

        let db = self.db.lock().unwrap();
        db.execute(
            r#"
            INSERT INTO pipeline_runs (id, question, sql, status, error, candidate_count, created_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
            "#,
            params![
                result.request_id.to_string(),
                question,
                result.sql,
                status,
                result.error,
                result.audit.candidates.len() as i64,
                chrono::Utc::now().to_rfc3339(),
            ],
        )
        .map_err(|e| PilotError::History(format!("Failed to record run: {}", e)))?;

        info!("Recorded pipeline run {} ({})", result.request_id, status);
        Ok(())
    }

    /// Most recent runs, newest first.
    pub fn recent(&self, limit: usize) -> Result<Vec<RunRecord>> {
        let db = self.db.lock().unwrap();
        let mut statement = db
            .prepare(
                r#"
                SELECT id, question, sql, status, error, candidate_count, created_at
                FROM pipeline_runs
                ORDER BY created_at DESC
                LIMIT ?1
                "#,
            )
            .map_err(|e| PilotError::History(e.to_string()))?;

        let rows = statement
            .query_map(params![limit as i64], |row| {
                Ok(RunRecord {
                    id: row.get(0)?,
                    question: row.get(1)?,
                    sql: row.get(2)?,
                    status: row.get(3)?,
                    error: row.get(4)?,
                    candidate_count: row.get(5)?,
                    created_at: row.get(6)?,
                })
            })
            .map_err(|e| PilotError::History(e.to_string()))?;

        let mut records = Vec::new();
        for row in rows {
            records.push(row.map_err(|e| PilotError::History(e.to_string()))?);
        }
        Ok(records)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::orchestrator::AuditTrail;
    use uuid::Uuid;

    fn done_result(sql: &str) -> PipelineResult {
        PipelineResult {
            request_id: Uuid::new_v4(),
            status: PipelineStatus::Done,
            sql: Some(sql.to_string()),
            execution: None,
            error: None,
            audit: AuditTrail::default(),
        }
    }

    #[test]
    fn test_record_and_read_back() {
        let history = RunHistory::in_memory().unwrap();
        history
            .record("show customers", &done_result("SELECT * FROM customers;"))
            .unwrap();

        let records = history.recent(10).unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].question, "show customers");
        assert_eq!(records[0].status, "done");
        assert_eq!(records[0].sql.as_deref(), Some("SELECT * FROM customers;"));
    }

    #[test]
    fn test_recent_respects_limit() {
        let history = RunHistory::in_memory().unwrap();
        for i in 0..5 {
            history
                .record(&format!("question {}", i), &done_result("SELECT 1;"))
                .unwrap();
        }
        assert_eq!(history.recent(3).unwrap().len(), 3);
    }
}
