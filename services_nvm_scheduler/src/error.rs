//! Scheduler error types

use thiserror::Error;

/// Errors returned to callers that misuse the scheduler
#[derive(Debug, Clone, Error, PartialEq)]
pub enum SchedulerError {
    /// The pending queue is at capacity
    #[error("Job queue full (capacity {capacity})")]
    QueueFull { capacity: usize },

    /// Time scale must be a positive finite number
    #[error("Invalid time scale: {0}")]
    InvalidTimeScale(f64),

    /// Configuration could not be parsed or is out of range
    #[error("Invalid scheduler configuration: {0}")]
    Config(String),
}
