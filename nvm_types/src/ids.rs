//! Identifiers for NvM entities

use serde::{Deserialize, Serialize};
use std::fmt;

/// Logical address of an NvM block
///
/// Blocks are managed independently for scheduling and recovery. The id
/// carries no layout information; mapping to a physical offset belongs to the
/// storage medium.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct BlockId(u32);

impl BlockId {
    /// Creates a block id from its raw number
    pub const fn new(raw: u32) -> Self {
        Self(raw)
    }

    /// Returns the raw block number
    pub const fn as_u32(&self) -> u32 {
        self.0
    }
}

impl fmt::Display for BlockId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "block:{}", self.0)
    }
}

/// Identifier of a scheduled job
///
/// Unlike task ids elsewhere, job ids are not random: a scheduler hands them
/// out in strictly increasing order and never reuses one.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct JobId(u64);

impl JobId {
    /// The first id a fresh scheduler hands out
    pub const FIRST: JobId = JobId(0);

    /// Creates a job id from its raw sequence number
    pub const fn from_raw(raw: u64) -> Self {
        Self(raw)
    }

    /// Returns the raw sequence number
    pub const fn as_u64(&self) -> u64 {
        self.0
    }

    /// Returns the id that follows this one
    pub const fn next(&self) -> Self {
        Self(self.0 + 1)
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "job:{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_job_id_sequence() {
        let first = JobId::FIRST;
        let second = first.next();
        assert_eq!(first.as_u64(), 0);
        assert_eq!(second.as_u64(), 1);
        assert!(first < second);
    }

    #[test]
    fn test_display_formats() {
        assert_eq!(BlockId::new(5).to_string(), "block:5");
        assert_eq!(JobId::from_raw(42).to_string(), "job:42");
    }

    #[test]
    fn test_ids_serialize_transparently() {
        let json = serde_json::to_string(&BlockId::new(3)).unwrap();
        assert_eq!(json, "3");
        let back: JobId = serde_json::from_str("7").unwrap();
        assert_eq!(back, JobId::from_raw(7));
    }
}
