//! Pipeline metrics.
//!
//! In-process counters for the stages of the orchestration loop. One
//! instance is shared across concurrent runs.

use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

#[derive(Debug, Default)]
pub struct PipelineMetrics {
    generations: AtomicU64,
    reflections: AtomicU64,
    improvements: AtomicU64,
    executions: AtomicU64,
    failures: AtomicU64,
    execution_time: Mutex<ExecutionTimeStats>,
}

#[derive(Debug, Default)]
struct ExecutionTimeStats {
    total_seconds: f64,
    samples: u64,
}

#[derive(Debug, Clone, Serialize)]
pub struct MetricsSummary {
    pub generations: u64,
    pub reflections: u64,
    pub improvements: u64,
    pub executions: u64,
    pub failures: u64,
    pub avg_execution_time: f64,
}

impl PipelineMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_generation(&self) {
        self.generations.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_reflection(&self) {
        self.reflections.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_improvement(&self) {
        self.improvements.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_execution(&self, seconds: f64) {
        self.executions.fetch_add(1, Ordering::Relaxed);
        let mut stats = self.execution_time.lock().unwrap();
        stats.total_seconds += seconds;
        stats.samples += 1;
    }

    pub fn record_failure(&self) {
        self.failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn summary(&self) -> MetricsSummary {
        let stats = self.execution_time.lock().unwrap();
        let avg = if stats.samples == 0 {
            0.0
        } else {
            stats.total_seconds / stats.samples as f64
        };
        MetricsSummary {
            generations: self.generations.load(Ordering::Relaxed),
            reflections: self.reflections.load(Ordering::Relaxed),
            improvements: self.improvements.load(Ordering::Relaxed),
            executions: self.executions.load(Ordering::Relaxed),
            failures: self.failures.load(Ordering::Relaxed),
            avg_execution_time: avg,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counters_accumulate() {
        let metrics = PipelineMetrics::new();
        metrics.record_generation();
        metrics.record_reflection();
        metrics.record_reflection();
        metrics.record_execution(0.2);
        metrics.record_execution(0.4);
        metrics.record_failure();

        let summary = metrics.summary();
        assert_eq!(summary.generations, 1);
        assert_eq!(summary.reflections, 2);
        assert_eq!(summary.executions, 2);
        assert_eq!(summary.failures, 1);
        assert!((summary.avg_execution_time - 0.3).abs() < 1e-9);
    }
}
