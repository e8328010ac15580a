//! Pending job queue
//!
//! A binary heap keyed by the scheduling total order:
//!
//! 1. immediate jobs before non-immediate jobs
//! 2. higher priority before lower
//! 3. earlier enqueue time before later
//! 4. lower job id before higher (ids are handed out in enqueue order)
//!
//! The last component makes the key unique, so equal-key ties can't happen
//! and FIFO holds within every class.

use crate::job::{Job, Priority};
use nvm_types::JobId;
use std::cmp::{Ordering, Reverse};
use std::collections::BinaryHeap;

type OrderKey = (bool, Priority, Reverse<u64>, Reverse<JobId>);

fn order_key(job: &Job) -> OrderKey {
    (
        job.immediate,
        job.priority,
        Reverse(job.enqueue_time_ms),
        Reverse(job.id),
    )
}

#[derive(Debug, Clone)]
struct Queued(Job);

impl PartialEq for Queued {
    fn eq(&self, other: &Self) -> bool {
        order_key(&self.0) == order_key(&other.0)
    }
}

impl Eq for Queued {}

impl PartialOrd for Queued {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Queued {
    fn cmp(&self, other: &Self) -> Ordering {
        order_key(&self.0).cmp(&order_key(&other.0))
    }
}

/// Priority-ordered collection of jobs waiting for dispatch
#[derive(Debug, Clone, Default)]
pub struct PendingQueue {
    heap: BinaryHeap<Queued>,
}

impl PendingQueue {
    pub fn new() -> Self {
        Self {
            heap: BinaryHeap::new(),
        }
    }

    /// Inserts a job at its ordered position
    pub fn push(&mut self, job: Job) {
        self.heap.push(Queued(job));
    }

    /// Removes and returns the head job
    pub fn pop(&mut self) -> Option<Job> {
        self.heap.pop().map(|q| q.0)
    }

    /// Returns the head job without removing it
    pub fn peek(&self) -> Option<&Job> {
        self.heap.peek().map(|q| &q.0)
    }

    pub fn len(&self) -> usize {
        self.heap.len()
    }

    pub fn is_empty(&self) -> bool {
        self.heap.is_empty()
    }

    /// Iterates over pending jobs in arbitrary order
    pub fn iter(&self) -> impl Iterator<Item = &Job> {
        self.heap.iter().map(|q| &q.0)
    }

    /// Returns pending jobs in dispatch order
    pub fn ordered(&self) -> Vec<&Job> {
        let mut jobs: Vec<&Job> = self.iter().collect();
        jobs.sort_by(|a, b| order_key(b).cmp(&order_key(a)));
        jobs
    }
}
