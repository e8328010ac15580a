//! # NvM Job Scheduler Service
//!
//! A deterministic, tick-driven scheduler for NvM read/write jobs.
//!
//! ## Philosophy
//!
//! - **Deterministic**: Virtual time only moves inside [`Scheduler::tick`]
//! - **Single channel**: At most one job is dispatched at a time, modelling
//!   one shared storage bus
//! - **Ordered**: Immediate jobs first, then priority, then FIFO
//! - **Observable**: Every tick returns a full [`TickSnapshot`]
//!
//! ## Example
//!
//! ```
//! use nvm_types::BlockId;
//! use services_nvm_scheduler::{JobKind, Priority, Scheduler};
//!
//! let mut scheduler = Scheduler::new();
//! scheduler
//!     .enqueue(JobKind::Write, BlockId::new(1), Priority::High, false, None)
//!     .unwrap();
//!
//! let snapshot = scheduler.tick(50);
//! assert!(snapshot.outcome.unwrap().is_completed());
//! assert_eq!(scheduler.metrics_summary().completed_jobs, 1);
//! ```

pub mod block_context;
pub mod config;
pub mod error;
pub mod job;
pub mod metrics;
pub mod queue;
pub mod state_machine;

pub use block_context::{BlockContext, BlockView, HistoryEntry};
pub use config::SchedulerConfig;
pub use error::SchedulerError;
pub use job::{Job, JobKind, JobView, NvmState, Priority};
pub use metrics::{Metrics, MetricsSummary};
pub use queue::PendingQueue;
pub use state_machine::DispatchOutcome;

use nvm_types::{BlockId, JobId, VirtualClock};
use serde::Serialize;
use services_logger::{EventLog, LogEntry, LogLevel};
use state_machine::ExecutionEnv;
use std::collections::{BTreeMap, BTreeSet};

/// Consistent view of the scheduler after a tick
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TickSnapshot {
    pub virtual_time_ms: u64,
    pub time_scale: f64,
    pub queue_length: usize,
    /// Pending jobs in dispatch order
    pub queue: Vec<JobView>,
    /// The job dispatched during this tick, in its final state
    pub in_flight: Option<JobView>,
    /// What happened to the dispatched job
    pub outcome: Option<DispatchOutcome>,
    pub blocks: BTreeMap<BlockId, BlockView>,
    pub metrics: MetricsSummary,
}

/// NvM job scheduler
pub struct Scheduler {
    config: SchedulerConfig,
    clock: VirtualClock,
    time_scale: f64,
    queue: PendingQueue,
    next_job_id: JobId,
    blocks: BTreeMap<BlockId, BlockContext>,
    metrics: Metrics,
    /// Pending jobs already counted as overdue
    overdue: BTreeSet<JobId>,
    events: EventLog,
}

impl Scheduler {
    /// Creates a scheduler with the default configuration
    pub fn new() -> Self {
        Self::build(SchedulerConfig::default())
    }

    /// Creates a scheduler with a custom configuration
    pub fn with_config(config: SchedulerConfig) -> Result<Self, SchedulerError> {
        config.validate()?;
        Ok(Self::build(config))
    }

    fn build(config: SchedulerConfig) -> Self {
        let blocks = (0..config.initial_blocks)
            .map(BlockId::new)
            .map(|id| (id, BlockContext::new(id, config.history_depth)))
            .collect();
        Self {
            clock: VirtualClock::new(),
            time_scale: 1.0,
            queue: PendingQueue::new(),
            next_job_id: JobId::FIRST,
            blocks,
            metrics: Metrics::default(),
            overdue: BTreeSet::new(),
            events: EventLog::new("nvm_scheduler", config.event_log_capacity),
            config,
        }
    }

    /// Enqueues a job and returns a copy of it as queued
    pub fn enqueue(
        &mut self,
        kind: JobKind,
        block_id: BlockId,
        priority: Priority,
        immediate: bool,
        deadline_ms: Option<u64>,
    ) -> Result<Job, SchedulerError> {
        let now = self.clock.now_ms();

        if self.queue.len() >= self.config.queue_capacity {
            self.metrics.overflow_count += 1;
            self.events.record(
                LogEntry::new(now, LogLevel::Warn, "job queue overflow")
                    .with_field("block", block_id.as_u32())
                    .with_field("overflows", self.metrics.overflow_count),
            );
            return Err(SchedulerError::QueueFull {
                capacity: self.config.queue_capacity,
            });
        }

        let job = Job {
            id: self.next_job_id,
            kind,
            block_id,
            priority,
            immediate,
            enqueue_time_ms: now,
            start_time_ms: 0,
            deadline_ms,
            state: NvmState::Idle,
            retry_count: 0,
            max_retries: self.config.max_retries,
        };
        self.next_job_id = self.next_job_id.next();

        let history_depth = self.config.history_depth;
        self.blocks
            .entry(block_id)
            .or_insert_with(|| BlockContext::new(block_id, history_depth));

        self.queue.push(job.clone());
        self.metrics.observe_queue_length(self.queue.len());
        self.events.record(
            LogEntry::new(now, LogLevel::Debug, "job enqueued")
                .with_field("job", job.id)
                .with_field("kind", kind)
                .with_field("block", block_id.as_u32())
                .with_field("immediate", immediate)
                .with_field("depth", self.queue.len()),
        );

        Ok(job)
    }

    /// Removes and returns the next job in dispatch order
    pub fn dequeue(&mut self) -> Option<Job> {
        let job = self.queue.pop()?;
        self.overdue.remove(&job.id);
        Some(job)
    }

    /// Advances virtual time by `elapsed_ms` and dispatches at most one job
    pub fn tick(&mut self, elapsed_ms: u64) -> TickSnapshot {
        self.clock.advance_ms(elapsed_ms);
        self.mark_overdue();

        let dispatched = self.dequeue().map(|mut job| {
            job.start_time_ms = self.clock.now_ms();
            self.events.record(
                LogEntry::new(job.start_time_ms, LogLevel::Debug, "job dispatched")
                    .with_field("job", job.id)
                    .with_field("block", job.block_id.as_u32()),
            );
            job
        });

        let (in_flight, outcome) = match dispatched {
            Some(mut job) => {
                let outcome = self.execute(&mut job);
                (Some(job.view(self.clock.now_ms())), Some(outcome))
            }
            None => (None, None),
        };

        self.snapshot(in_flight, outcome)
    }

    fn execute(&mut self, job: &mut Job) -> DispatchOutcome {
        let history_depth = self.config.history_depth;
        let block = self
            .blocks
            .entry(job.block_id)
            .or_insert_with(|| BlockContext::new(job.block_id, history_depth));
        let mut env = ExecutionEnv {
            clock: &mut self.clock,
            config: &self.config,
            metrics: &mut self.metrics,
            events: &mut self.events,
        };
        state_machine::execute(job, block, &mut env)
    }

    fn mark_overdue(&mut self) {
        let now = self.clock.now_ms();
        let newly_overdue: Vec<(JobId, BlockId)> = self
            .queue
            .iter()
            .filter(|job| job.is_past_deadline(now) && !self.overdue.contains(&job.id))
            .map(|job| (job.id, job.block_id))
            .collect();

        for (job_id, block_id) in newly_overdue {
            self.overdue.insert(job_id);
            self.metrics.timeout_count += 1;
            self.events.record(
                LogEntry::new(now, LogLevel::Warn, "pending job overdue")
                    .with_field("job", job_id)
                    .with_field("block", block_id.as_u32()),
            );
        }
    }

    fn snapshot(
        &self,
        in_flight: Option<JobView>,
        outcome: Option<DispatchOutcome>,
    ) -> TickSnapshot {
        let now = self.clock.now_ms();
        TickSnapshot {
            virtual_time_ms: now,
            time_scale: self.time_scale,
            queue_length: self.queue.len(),
            queue: self.pending_jobs(),
            in_flight,
            outcome,
            blocks: self
                .blocks
                .iter()
                .map(|(id, ctx)| (*id, ctx.view()))
                .collect(),
            metrics: self.metrics_summary(),
        }
    }

    /// Derived performance metrics
    pub fn metrics_summary(&self) -> MetricsSummary {
        self.metrics.summary(self.clock.now_ms(), self.queue.len())
    }

    /// Sets the cosmetic time scale; simulated latencies are unaffected
    pub fn set_time_scale(&mut self, factor: f64) -> Result<(), SchedulerError> {
        if !factor.is_finite() || factor <= 0.0 {
            return Err(SchedulerError::InvalidTimeScale(factor));
        }
        self.time_scale = factor;
        Ok(())
    }

    /// Returns the scheduler to its freshly constructed state
    pub fn reset(&mut self) {
        *self = Self::build(self.config.clone());
    }

    /// Pending jobs in dispatch order
    pub fn pending_jobs(&self) -> Vec<JobView> {
        let now = self.clock.now_ms();
        self.queue.ordered().into_iter().map(|j| j.view(now)).collect()
    }

    pub fn block(&self, block_id: BlockId) -> Option<&BlockContext> {
        self.blocks.get(&block_id)
    }

    pub fn now_ms(&self) -> u64 {
        self.clock.now_ms()
    }

    pub fn time_scale(&self) -> f64 {
        self.time_scale
    }

    pub fn queue_len(&self) -> usize {
        self.queue.len()
    }

    pub fn config(&self) -> &SchedulerConfig {
        &self.config
    }

    /// Scheduler event trail
    pub fn events(&self) -> &EventLog {
        &self.events
    }
}

impl Default for Scheduler {
    fn default() -> Self {
        Self::new()
    }
}
