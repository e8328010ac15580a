//! Per-block transient status
//!
//! A block context tracks which job (if any) currently occupies the block and
//! the state that job is in. It knows nothing about stored content.

use crate::job::NvmState;
use nvm_types::{BlockId, JobId};
use serde::Serialize;
use std::collections::VecDeque;

/// One entry of a block's trailing history
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct HistoryEntry {
    pub state: NvmState,
    pub timestamp_ms: u64,
}

/// Transient status of one block
#[derive(Debug, Clone)]
pub struct BlockContext {
    block_id: BlockId,
    state: NvmState,
    occupant: Option<JobId>,
    history: VecDeque<HistoryEntry>,
    history_depth: usize,
}

impl BlockContext {
    /// Creates an idle context retaining `history_depth` transitions
    pub fn new(block_id: BlockId, history_depth: usize) -> Self {
        Self {
            block_id,
            state: NvmState::Idle,
            occupant: None,
            history: VecDeque::with_capacity(history_depth),
            history_depth: history_depth.max(1),
        }
    }

    pub fn state(&self) -> NvmState {
        self.state
    }

    /// The job currently occupying this block
    pub fn occupant(&self) -> Option<JobId> {
        self.occupant
    }

    /// Retained transitions, oldest first
    pub fn history(&self) -> impl Iterator<Item = &HistoryEntry> {
        self.history.iter()
    }

    /// Marks `job_id` as the block's occupant
    ///
    /// Returns false if another job already holds the block.
    pub fn occupy(&mut self, job_id: JobId) -> bool {
        match self.occupant {
            Some(current) if current != job_id => false,
            _ => {
                self.occupant = Some(job_id);
                true
            }
        }
    }

    /// Mirrors a job transition into the block and records it
    pub fn transition(&mut self, state: NvmState, timestamp_ms: u64) {
        self.state = state;
        if self.history.len() == self.history_depth {
            self.history.pop_front();
        }
        self.history.push_back(HistoryEntry {
            state,
            timestamp_ms,
        });
    }

    /// Returns the block to Idle and frees it
    pub fn release(&mut self, timestamp_ms: u64) {
        self.transition(NvmState::Idle, timestamp_ms);
        self.occupant = None;
    }

    /// Inspection view of this context
    pub fn view(&self) -> BlockView {
        BlockView {
            block_id: self.block_id,
            state: self.state,
            occupant: self.occupant,
            history: self.history.iter().copied().collect(),
        }
    }
}

/// Snapshot of a block context
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BlockView {
    pub block_id: BlockId,
    pub state: NvmState,
    pub occupant: Option<JobId>,
    pub history: Vec<HistoryEntry>,
}
