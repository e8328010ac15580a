//! Job & block state machine
//!
//! Runs one dispatched job from `Idle` back to `Idle`:
//!
//! ```text
//! Idle -> Reading -> ReadVerify  -> Completing -> Idle
//! Idle -> Writing -> WriteVerify -> Completing -> Idle
//! ```
//!
//! Every transition happens synchronously inside one call; the virtual clock
//! is advanced by the configured latency of each phase. Side effects are
//! limited to the job, its block context, the metrics and the event log.

use crate::block_context::BlockContext;
use crate::config::SchedulerConfig;
use crate::job::{Job, JobKind, NvmState};
use crate::metrics::Metrics;
use nvm_types::{BlockId, JobId, VirtualClock};
use serde::Serialize;
use services_logger::{EventLog, LogEntry, LogLevel};

/// Result of dispatching one job
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "result")]
pub enum DispatchOutcome {
    /// The job ran through every phase
    Completed {
        job_id: JobId,
        kind: JobKind,
        block_id: BlockId,
        exec_time_ms: u64,
        retries: u32,
    },
    /// The deadline had passed before execution; the job was abandoned
    DeadlineMissed {
        job_id: JobId,
        kind: JobKind,
        block_id: BlockId,
        deadline_ms: u64,
        at_ms: u64,
    },
}

impl DispatchOutcome {
    pub fn job_id(&self) -> JobId {
        match self {
            DispatchOutcome::Completed { job_id, .. }
            | DispatchOutcome::DeadlineMissed { job_id, .. } => *job_id,
        }
    }

    pub fn is_completed(&self) -> bool {
        matches!(self, DispatchOutcome::Completed { .. })
    }
}

/// Everything a dispatch may touch besides the job and its block
pub(crate) struct ExecutionEnv<'a> {
    pub clock: &'a mut VirtualClock,
    pub config: &'a SchedulerConfig,
    pub metrics: &'a mut Metrics,
    pub events: &'a mut EventLog,
}

/// Executes `job` against `block` at the current virtual time
pub(crate) fn execute(
    job: &mut Job,
    block: &mut BlockContext,
    env: &mut ExecutionEnv<'_>,
) -> DispatchOutcome {
    let now = env.clock.now_ms();

    if let Some(deadline_ms) = job.deadline_ms.filter(|_| job.is_past_deadline(now)) {
        env.metrics.deadline_miss_count += 1;
        env.events.record(
            LogEntry::new(now, LogLevel::Warn, "deadline missed, job abandoned")
                .with_field("job", job.id)
                .with_field("block", job.block_id.as_u32())
                .with_field("deadline_ms", deadline_ms),
        );
        return DispatchOutcome::DeadlineMissed {
            job_id: job.id,
            kind: job.kind,
            block_id: job.block_id,
            deadline_ms,
            at_ms: now,
        };
    }

    let occupied = block.occupy(job.id);
    debug_assert!(occupied, "block {} already occupied", job.block_id);

    if job.kind.is_write() {
        run_write(job, block, env);
    } else {
        run_read(job, block, env);
    }

    enter(job, block, NvmState::Completing, env.clock);
    env.clock.advance_ms(env.config.completion_latency_ms);
    job.state = NvmState::Idle;
    block.release(env.clock.now_ms());

    let exec_time_ms = env.clock.since(job.start_time_ms);
    env.metrics.record_completion(exec_time_ms);
    env.events.record(
        LogEntry::new(env.clock.now_ms(), LogLevel::Info, "job completed")
            .with_field("job", job.id)
            .with_field("kind", job.kind)
            .with_field("block", job.block_id.as_u32())
            .with_field("exec_time_ms", exec_time_ms),
    );

    DispatchOutcome::Completed {
        job_id: job.id,
        kind: job.kind,
        block_id: job.block_id,
        exec_time_ms,
        retries: job.retry_count,
    }
}

fn run_read(job: &mut Job, block: &mut BlockContext, env: &mut ExecutionEnv<'_>) {
    enter(job, block, NvmState::Reading, env.clock);
    env.clock.advance_ms(env.config.read_latency_ms);
    enter(job, block, NvmState::ReadVerify, env.clock);
    env.clock.advance_ms(env.config.verify_latency_ms);
}

fn run_write(job: &mut Job, block: &mut BlockContext, env: &mut ExecutionEnv<'_>) {
    enter(job, block, NvmState::Writing, env.clock);
    env.clock.advance_ms(env.config.write_latency_ms);

    // Deterministic stand-in for a failed read-back; the one retry always
    // succeeds.
    let verify_failed =
        job.has_retry_budget() && env.clock.now_ms() % env.config.retry_modulus == 0;
    if verify_failed {
        job.retry_count += 1;
        env.metrics.record_retry(true);
        env.events.record(
            LogEntry::new(env.clock.now_ms(), LogLevel::Warn, "write verify failed, retried")
                .with_field("job", job.id)
                .with_field("block", job.block_id.as_u32())
                .with_field("retry", job.retry_count),
        );
    }

    enter(job, block, NvmState::WriteVerify, env.clock);
    env.clock.advance_ms(env.config.verify_latency_ms);
}

fn enter(job: &mut Job, block: &mut BlockContext, state: NvmState, clock: &VirtualClock) {
    tracing::debug!(job = %job.id, block = %job.block_id, %state, t = clock.now_ms(), "transition");
    job.state = state;
    block.transition(state, clock.now_ms());
}
