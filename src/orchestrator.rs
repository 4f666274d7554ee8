//! Orchestration loop.
//!
//! Drives one request through generation, reflection, optional improvement,
//! and execution: `GENERATING -> REFLECTING -> (IMPROVING)? -> EXECUTING ->
//! DONE | FAILED`. Improvement cycles are explicitly bounded so the
//! fail-open reflection default can never spin the loop forever. Terminal
//! results always carry the full audit trail of candidates and verdicts.
//!
//! Each external call is an await point; dropping the returned future
//! cancels the run at the next suspension point. Concurrent runs are
//! independent and share only the response cache.

use crate::config::PilotConfig;
use crate::executor::{ExecutionAdapter, ExecutionResult};
use crate::generator::{strip_markdown_fences, SourceColumns, SqlGenerator};
use crate::intent::IntentAnalysis;
use crate::metrics::PipelineMetrics;
use crate::reflection::{ReflectionAgent, ReflectionVerdict};
use crate::retry::{with_retry, RetryPolicy};
use crate::schema::SchemaDescriptor;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Arc;
use tracing::{info, warn};
use uuid::Uuid;

/// One end-to-end request. Immutable once issued.
#[derive(Debug, Clone)]
pub struct QueryRequest {
    pub id: Uuid,
    pub question: String,
    pub context: Option<String>,
    /// Restrict generation to these sources; empty means all known tables.
    pub sources: Vec<String>,
}

impl QueryRequest {
    pub fn new(question: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            question: question.into(),
            context: None,
            sources: Vec::new(),
        }
    }

    pub fn with_context(mut self, context: impl Into<String>) -> Self {
        self.context = Some(context.into());
        self
    }

    pub fn with_sources(mut self, sources: Vec<String>) -> Self {
        self.sources = sources;
        self
    }
}

/// Lifecycle state of one SQL candidate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CandidateState {
    Proposed,
    ReflectedOn,
    Improved,
    Executed,
    Failed,
}

/// A candidate SQL string plus provenance.
#[derive(Debug, Clone, Serialize)]
pub struct SqlCandidate {
    pub sql: String,
    /// 1-based generation attempt that produced this candidate.
    pub attempt: u32,
    pub produced_at: DateTime<Utc>,
    pub state: CandidateState,
}

/// Ordered record of everything the loop produced for one request.
#[derive(Debug, Clone, Default, Serialize)]
pub struct AuditTrail {
    pub candidates: Vec<SqlCandidate>,
    pub verdicts: Vec<ReflectionVerdict>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PipelineStatus {
    Done,
    Failed,
}

/// Terminal outcome of one request.
#[derive(Debug, Clone, Serialize)]
pub struct PipelineResult {
    pub request_id: Uuid,
    pub status: PipelineStatus,
    pub sql: Option<String>,
    pub execution: Option<ExecutionResult>,
    pub error: Option<String>,
    pub audit: AuditTrail,
}

/// Drives generation, reflection, and execution for single requests.
pub struct Orchestrator {
    generator: SqlGenerator,
    reflector: ReflectionAgent,
    adapter: ExecutionAdapter,
    retry: RetryPolicy,
    max_improvement_cycles: u32,
    safe_mode: bool,
    row_limit: usize,
    metrics: Arc<PipelineMetrics>,
}

impl Orchestrator {
    pub fn new(
        generator: SqlGenerator,
        reflector: ReflectionAgent,
        adapter: ExecutionAdapter,
        config: &PilotConfig,
    ) -> Self {
        Self {
            generator,
            reflector,
            adapter,
            retry: config.retry.clone(),
            max_improvement_cycles: config.max_improvement_cycles,
            safe_mode: config.safe_mode,
            row_limit: config.row_limit,
            metrics: Arc::new(PipelineMetrics::new()),
        }
    }

    /// Share a metrics instance across orchestrators.
    pub fn with_metrics(mut self, metrics: Arc<PipelineMetrics>) -> Self {
        self.metrics = metrics;
        self
    }

    pub fn metrics(&self) -> &PipelineMetrics {
        &self.metrics
    }

    fn source_columns(schema: &SchemaDescriptor, requested: &[String]) -> Vec<SourceColumns> {
        schema
            .tables
            .iter()
            .filter(|t| requested.is_empty() || requested.contains(&t.name))
            .map(|t| SourceColumns {
                source: t.name.clone(),
                columns: t.column_names(),
            })
            .collect()
    }

    /// Run one request to a terminal state.
    pub async fn run(
        &self,
        request: &QueryRequest,
        schema: &SchemaDescriptor,
        intent: &IntentAnalysis,
    ) -> PipelineResult {
        info!("Pipeline {} started: {}", request.id, request.question);
        let sources = Self::source_columns(schema, &request.sources);
        let mut audit = AuditTrail::default();

        // GENERATING
        let generated = with_retry(&self.retry, || {
            self.generator
                .generate(&request.question, &sources, request.context.as_deref())
        })
        .await;

        let mut active_sql = match generated {
            Ok(sql) => {
                self.metrics.record_generation();
                sql
            }
            Err(e) => {
                warn!("Pipeline {} failed to generate SQL: {}", request.id, e);
                self.metrics.record_failure();
                return PipelineResult {
                    request_id: request.id,
                    status: PipelineStatus::Failed,
                    sql: None,
                    execution: None,
                    error: Some(format!("generation_failed: {}", e)),
                    audit,
                };
            }
        };

        let mut attempt = 1;
        audit.candidates.push(SqlCandidate {
            sql: active_sql.clone(),
            attempt,
            produced_at: Utc::now(),
            state: CandidateState::Proposed,
        });

        // REFLECTING, with a bounded number of IMPROVING loops back.
        for pass in 0..=self.max_improvement_cycles {
            let verdict = self
                .reflector
                .reflect(&request.question, &active_sql, schema, intent)
                .await;
            self.metrics.record_reflection();

            if let Some(candidate) = audit.candidates.last_mut() {
                candidate.state = CandidateState::ReflectedOn;
            }

            let adopt = pass < self.max_improvement_cycles && verdict.has_improvement();
            let improved_query = verdict.improved_query.clone();
            audit.verdicts.push(verdict);

            match (adopt, improved_query) {
                (true, Some(improved)) => {
                    attempt += 1;
                    info!(
                        "Pipeline {} adopting improved query (attempt {})",
                        request.id, attempt
                    );
                    self.metrics.record_improvement();
                    active_sql = strip_markdown_fences(&improved);
                    audit.candidates.push(SqlCandidate {
                        sql: active_sql.clone(),
                        attempt,
                        produced_at: Utc::now(),
                        state: CandidateState::Improved,
                    });
                }
                _ => break,
            }
        }

        // EXECUTING
        let execution = self
            .adapter
            .execute(&active_sql, self.safe_mode, self.row_limit)
            .await;
        self.metrics.record_execution(execution.execution_time);

        if let Some(candidate) = audit.candidates.last_mut() {
            candidate.state = if execution.success {
                CandidateState::Executed
            } else {
                CandidateState::Failed
            };
        }

        if execution.success {
            info!(
                "Pipeline {} done: {} rows in {:.3}s",
                request.id, execution.row_count, execution.execution_time
            );
            PipelineResult {
                request_id: request.id,
                status: PipelineStatus::Done,
                sql: Some(active_sql),
                execution: Some(execution),
                error: None,
                audit,
            }
        } else {
            warn!(
                "Pipeline {} failed during execution: {:?}",
                request.id, execution.error
            );
            self.metrics.record_failure();
            let error = execution.error.clone();
            PipelineResult {
                request_id: request.id,
                status: PipelineStatus::Failed,
                sql: Some(active_sql),
                execution: Some(execution),
                error,
                audit,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{ColumnSchema, TableSchema};

    fn schema_with(tables: &[&str]) -> SchemaDescriptor {
        SchemaDescriptor {
            tables: tables
                .iter()
                .map(|name| TableSchema {
                    name: name.to_string(),
                    columns: vec![ColumnSchema {
                        name: "id".to_string(),
                        data_type: "integer".to_string(),
                        nullable: false,
                    }],
                    primary_key: vec!["id".to_string()],
                    foreign_keys: vec![],
                })
                .collect(),
        }
    }

    #[test]
    fn test_source_columns_filters_by_request() {
        let schema = schema_with(&["Customers", "Orders"]);
        let all = Orchestrator::source_columns(&schema, &[]);
        assert_eq!(all.len(), 2);

        let only = Orchestrator::source_columns(&schema, &["Orders".to_string()]);
        assert_eq!(only.len(), 1);
        assert_eq!(only[0].source, "Orders");
    }

    #[test]
    fn test_request_builder() {
        let request = QueryRequest::new("show customers")
            .with_context("previous question was about orders")
            .with_sources(vec!["Customers".to_string()]);
        assert_eq!(request.question, "show customers");
        assert!(request.context.is_some());
        assert_eq!(request.sources.len(), 1);
    }
}
