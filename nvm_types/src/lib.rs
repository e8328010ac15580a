//! # NvM Types
//!
//! This crate defines the fundamental types shared by the NvM services.
//!
//! ## Philosophy
//!
//! - **Explicit over implicit**: Blocks and jobs are addressed by typed ids,
//!   never by bare integers.
//! - **Deterministic time**: Nothing reads a wall clock. Time only moves when
//!   a caller advances a [`VirtualClock`].
//! - **One checksum**: Every component agrees on the same CRC-16 variant.
//!
//! ## Key Types
//!
//! - [`BlockId`]: Logical address of an NvM block
//! - [`JobId`]: Monotonic identifier of a scheduled job
//! - [`Checksum`]: 16-bit integrity code, rendered as `0xABCD`
//! - [`VirtualClock`]: Caller-driven millisecond clock

pub mod checksum;
pub mod clock;
pub mod ids;

pub use checksum::{crc16, Checksum, ChecksumParseError};
pub use clock::VirtualClock;
pub use ids::{BlockId, JobId};

/// Serde helper that renders byte payloads as upper-case hex strings.
pub mod hex_bytes {
    use serde::Serializer;

    pub fn serialize<S>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&hex::encode_upper(bytes))
    }
}
