//! # NvM Storage Service
//!
//! This crate defines the NvM block model together with the two mechanisms
//! that keep block content consistent: the two-phase WriteAll protocol and
//! block-type recovery.
//!
//! ## Philosophy
//!
//! **Corruption is expected, not exceptional.**
//!
//! Power can be lost in the middle of any write and bits can rot at rest.
//! Instead of hoping otherwise, we provide:
//! - Checksums recorded at every committed write
//! - A snapshot taken before anything is overwritten
//! - Redundancy chosen per block (single copy, backup, or version history)
//!
//! ## Design
//!
//! - **BlockStore**: Owns every block; callers pass it by explicit borrow
//! - **WriteAllEngine**: Drives one two-phase commit at a time
//! - **RecoveryModel**: Injects faults and repairs blocks by type
//!
//! ## Example
//!
//! ```
//! use nvm_types::BlockId;
//! use services_nvm_storage::{RecoveryModel, RecoveryPoint, WriteAllEngine, WriteAllPhase};
//!
//! let mut model = RecoveryModel::new();
//! let mut engine = WriteAllEngine::new();
//! let block = BlockId::new(1);
//!
//! engine.start(model.blocks(), block, vec![0x55; 16]).unwrap();
//! engine.phase1_snapshot(model.blocks(), block).unwrap();
//! engine.phase1_persist(block).unwrap();
//!
//! let report = engine
//!     .simulate_power_loss(model.blocks_mut(), RecoveryPoint::DuringPhase2)
//!     .unwrap();
//! assert_eq!(report.current_phase, WriteAllPhase::Failed);
//!
//! // The redundant block's backup survived the torn write
//! assert!(model.attempt_recovery(block).unwrap().success);
//! ```

pub mod block;
pub mod recovery;
pub mod write_all;

pub use block::{
    BlockData, BlockStore, BlockSummary, BlockType, BlockVariant, DatasetHistory, RedundantCopy,
    VersionBump, VersionRecord,
};
pub use recovery::{
    BlockTypeComparison, FaultReport, FaultType, FeatureRow, RecoveryError, RecoveryMethod,
    RecoveryModel, RecoveryReport, RecoveryStatus, VersionReport,
};
pub use write_all::{
    CopyReport, PersistReport, PowerLossReport, RecoveryAssessment, RecoveryPoint, SnapshotReport,
    StartReport, VerifyReport, WriteAllEngine, WriteAllError, WriteAllPhase, WriteAllSnapshot,
    WriteAllStatus,
};
