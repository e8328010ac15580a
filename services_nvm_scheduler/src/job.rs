//! Jobs and the NvM state vocabulary

use nvm_types::{BlockId, JobId};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Kind of work a job performs against its block
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum JobKind {
    /// Read one block
    Read,
    /// Write one block
    Write,
    /// Read sweep (follows the read path)
    ReadAll,
    /// Write sweep (follows the write path)
    WriteAll,
}

impl JobKind {
    /// Returns true for kinds that follow the write path
    pub fn is_write(&self) -> bool {
        matches!(self, JobKind::Write | JobKind::WriteAll)
    }
}

impl fmt::Display for JobKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            JobKind::Read => write!(f, "ReadBlock"),
            JobKind::Write => write!(f, "WriteBlock"),
            JobKind::ReadAll => write!(f, "ReadAll"),
            JobKind::WriteAll => write!(f, "WriteAll"),
        }
    }
}

/// Job priority
///
/// Higher variants are served first. The numeric values are part of the
/// ordering contract.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub enum Priority {
    Low = 0,
    Med = 1,
    High = 2,
}

/// Execution state of a job, mirrored by its block while it runs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum NvmState {
    Idle,
    Reading,
    Writing,
    ReadVerify,
    WriteVerify,
    Completing,
}

impl fmt::Display for NvmState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            NvmState::Idle => "IDLE",
            NvmState::Reading => "READING",
            NvmState::Writing => "WRITING",
            NvmState::ReadVerify => "READ_VERIFY",
            NvmState::WriteVerify => "WRITE_VERIFY",
            NvmState::Completing => "COMPLETING",
        };
        f.write_str(name)
    }
}

/// One scheduled operation
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Job {
    /// Assigned at enqueue time, never reused
    pub id: JobId,
    pub kind: JobKind,
    pub block_id: BlockId,
    pub priority: Priority,
    /// Immediate jobs precede every non-immediate job
    pub immediate: bool,
    pub enqueue_time_ms: u64,
    /// Stamped when the job leaves the pending queue for dispatch
    pub start_time_ms: u64,
    pub deadline_ms: Option<u64>,
    pub state: NvmState,
    pub retry_count: u32,
    pub max_retries: u32,
}

impl Job {
    /// Returns true if `now_ms` is already past the job's deadline
    pub fn is_past_deadline(&self, now_ms: u64) -> bool {
        self.deadline_ms.is_some_and(|deadline| now_ms > deadline)
    }

    /// Returns true while the retry budget is not exhausted
    pub fn has_retry_budget(&self) -> bool {
        self.retry_count < self.max_retries
    }

    /// Inspection view of this job at `now_ms`
    pub fn view(&self, now_ms: u64) -> JobView {
        JobView {
            job_id: self.id,
            kind: self.kind,
            block_id: self.block_id,
            priority: self.priority,
            immediate: self.immediate,
            state: self.state,
            enqueue_time_ms: self.enqueue_time_ms,
            wait_time_ms: now_ms.saturating_sub(self.enqueue_time_ms),
            deadline_ms: self.deadline_ms,
        }
    }
}

/// Snapshot row describing a pending job
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct JobView {
    pub job_id: JobId,
    pub kind: JobKind,
    pub block_id: BlockId,
    pub priority: Priority,
    pub immediate: bool,
    pub state: NvmState,
    pub enqueue_time_ms: u64,
    pub wait_time_ms: u64,
    pub deadline_ms: Option<u64>,
}
