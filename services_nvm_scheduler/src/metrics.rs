//! Scheduler performance counters

use serde::Serialize;

/// Running counters folded in by the scheduler and the state machine
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Metrics {
    pub max_queue_length: usize,
    pub overflow_count: u64,
    pub timeout_count: u64,
    pub deadline_miss_count: u64,
    pub max_exec_time_ms: u64,
    pub total_exec_time_ms: u64,
    pub completed_jobs: u64,
    pub retry_count: u64,
    pub retry_success: u64,
}

impl Metrics {
    pub fn observe_queue_length(&mut self, len: usize) {
        self.max_queue_length = self.max_queue_length.max(len);
    }

    pub fn record_completion(&mut self, exec_time_ms: u64) {
        self.total_exec_time_ms = self.total_exec_time_ms.saturating_add(exec_time_ms);
        self.max_exec_time_ms = self.max_exec_time_ms.max(exec_time_ms);
        self.completed_jobs += 1;
    }

    pub fn record_retry(&mut self, recovered: bool) {
        self.retry_count += 1;
        if recovered {
            self.retry_success += 1;
        }
    }

    /// Mean execution time over completed jobs, rounded to one decimal
    pub fn avg_exec_time_ms(&self) -> f64 {
        let avg = self.total_exec_time_ms as f64 / self.completed_jobs.max(1) as f64;
        (avg * 10.0).round() / 10.0
    }

    /// Percentage of retries that recovered; 100 when nothing was retried
    pub fn retry_success_rate(&self) -> f64 {
        if self.retry_count == 0 {
            return 100.0;
        }
        self.retry_success as f64 / self.retry_count as f64 * 100.0
    }

    pub fn summary(&self, virtual_time_ms: u64, queue_length: usize) -> MetricsSummary {
        MetricsSummary {
            virtual_time_ms,
            queue_length,
            max_queue_length: self.max_queue_length,
            overflow_count: self.overflow_count,
            timeout_count: self.timeout_count,
            deadline_miss_count: self.deadline_miss_count,
            max_exec_time_ms: self.max_exec_time_ms,
            avg_exec_time_ms: self.avg_exec_time_ms(),
            completed_jobs: self.completed_jobs,
            retry_count: self.retry_count,
            retry_success_rate: self.retry_success_rate(),
        }
    }
}

/// Derived metrics as reported to callers
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MetricsSummary {
    pub virtual_time_ms: u64,
    pub queue_length: usize,
    pub max_queue_length: usize,
    pub overflow_count: u64,
    pub timeout_count: u64,
    pub deadline_miss_count: u64,
    pub max_exec_time_ms: u64,
    pub avg_exec_time_ms: f64,
    pub completed_jobs: u64,
    pub retry_count: u64,
    pub retry_success_rate: f64,
}
