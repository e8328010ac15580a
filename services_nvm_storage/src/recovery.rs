//! # Block-Type Recovery Model
//!
//! Injects faults into blocks and repairs them with whatever redundancy the
//! block type offers:
//!
//! - **Native**: detection only
//! - **Redundant**: restore the primary from an intact backup
//! - **Dataset**: roll back to the newest consistent archived version
//!
//! The model owns the [`BlockStore`]; the WriteAll engine borrows it through
//! [`RecoveryModel::blocks_mut`].

use crate::block::{BlockData, BlockStore, BlockSummary, BlockType, BlockVariant, VersionBump};
use nvm_types::{BlockId, VirtualClock};
use serde::Serialize;
use services_logger::{EventLog, LogEntry, LogLevel};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

const FAULT_LOG_CAPACITY: usize = 64;
/// Faults shown by [`RecoveryModel::status`]
const STATUS_FAULTS: usize = 5;

/// Fault that can be injected into a block
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FaultType {
    /// Flip every bit of the first byte
    BitFlip,
    /// Zero the whole block
    CompleteCorruption,
    /// Flip the first byte of a redundant block's backup
    BackupCorruption,
    /// Drop a dataset block's oldest archived version
    VersionLoss,
    /// Flip the first byte of a dataset block's newest archived version
    VersionCorruption,
}

impl FaultType {
    pub fn as_str(&self) -> &'static str {
        match self {
            FaultType::BitFlip => "bit_flip",
            FaultType::CompleteCorruption => "complete_corruption",
            FaultType::BackupCorruption => "backup_corruption",
            FaultType::VersionLoss => "version_loss",
            FaultType::VersionCorruption => "version_corruption",
        }
    }
}

impl fmt::Display for FaultType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for FaultType {
    type Err = RecoveryError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "bit_flip" => Ok(FaultType::BitFlip),
            "complete_corruption" => Ok(FaultType::CompleteCorruption),
            "backup_corruption" => Ok(FaultType::BackupCorruption),
            "version_loss" => Ok(FaultType::VersionLoss),
            "version_corruption" => Ok(FaultType::VersionCorruption),
            other => Err(RecoveryError::UnknownFault(other.to_string())),
        }
    }
}

/// Errors from misusing the recovery model
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RecoveryError {
    #[error("Unknown block: {0}")]
    UnknownBlock(BlockId),

    #[error("Fault {fault} does not apply to {block_type} blocks")]
    UnsupportedFault {
        fault: FaultType,
        block_type: BlockType,
    },

    #[error("{block_id} is a {block_type} block and has no versions")]
    NotDataset {
        block_id: BlockId,
        block_type: BlockType,
    },

    #[error("Unknown fault type: {0}")]
    UnknownFault(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FaultReport {
    pub block_id: BlockId,
    pub block_type: BlockType,
    pub fault_type: FaultType,
    pub is_valid: bool,
    pub details: String,
}

/// How a recovery attempt went about it
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum RecoveryMethod {
    /// Native blocks can only detect
    NoRecoveryMechanism,
    BackupRestore,
    VersionRollback,
    NotNeeded,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RecoveryReport {
    pub block_id: BlockId,
    pub block_type: BlockType,
    pub method: RecoveryMethod,
    pub success: bool,
    pub message: String,
    pub restored_version: Option<u32>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct VersionReport {
    pub block_id: BlockId,
    pub previous_version: u32,
    pub new_version: u32,
}

/// One row of the block type comparison table
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FeatureRow {
    pub feature: &'static str,
    pub native: &'static str,
    pub redundant: &'static str,
    pub dataset: &'static str,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BlockTypeComparison {
    pub comparison_table: Vec<FeatureRow>,
    pub blocks: Vec<BlockSummary>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RecoveryStatus {
    pub virtual_time: u64,
    pub blocks: Vec<BlockSummary>,
    pub fault_log: Vec<LogEntry>,
}

const COMPARISON_TABLE: [FeatureRow; 4] = [
    FeatureRow {
        feature: "storage overhead",
        native: "1x (single copy)",
        redundant: "2x (primary + backup)",
        dataset: "Nx (one copy per version)",
    },
    FeatureRow {
        feature: "recovery capability",
        native: "none",
        redundant: "restore from backup",
        dataset: "roll back to a previous version",
    },
    FeatureRow {
        feature: "write amplification",
        native: "1x",
        redundant: "2x (primary + backup)",
        dataset: "Nx (new version per write)",
    },
    FeatureRow {
        feature: "typical use",
        native: "non-critical data",
        redundant: "critical data",
        dataset: "data that needs rollback",
    },
];

/// Fault injection and recovery over a block store
#[derive(Debug, Clone)]
pub struct RecoveryModel {
    store: BlockStore,
    /// Steps once per injected fault
    clock: VirtualClock,
    faults: EventLog,
}

impl RecoveryModel {
    /// Creates a model over the seeded demonstration blocks
    pub fn new() -> Self {
        Self::with_store(BlockStore::seeded())
    }

    pub fn with_store(store: BlockStore) -> Self {
        Self {
            store,
            clock: VirtualClock::new(),
            faults: EventLog::new("nvm_recovery", FAULT_LOG_CAPACITY),
        }
    }

    pub fn blocks(&self) -> &BlockStore {
        &self.store
    }

    pub fn blocks_mut(&mut self) -> &mut BlockStore {
        &mut self.store
    }

    /// Corrupts `block_id` as described by `fault`
    ///
    /// Checksums are left as they were, so the damage stays detectable.
    pub fn inject_fault(
        &mut self,
        block_id: BlockId,
        fault: FaultType,
    ) -> Result<FaultReport, RecoveryError> {
        let block = self
            .store
            .get_mut(block_id)
            .ok_or(RecoveryError::UnknownBlock(block_id))?;
        let block_type = block.block_type();

        let details = match (fault, &mut block.variant) {
            (FaultType::BitFlip, _) => {
                if let Some(byte) = block.data.first_mut() {
                    *byte ^= 0xFF;
                }
                block.is_valid = false;
                format!("{} first byte flipped", block_id)
            }
            (FaultType::CompleteCorruption, _) => {
                block.data.iter_mut().for_each(|b| *b = 0);
                block.is_valid = false;
                format!("{} zeroed", block_id)
            }
            (FaultType::BackupCorruption, BlockVariant::Redundant(copy)) => {
                if let Some(byte) = copy.backup.first_mut() {
                    *byte ^= 0xFF;
                }
                format!("{} backup corrupted", block_id)
            }
            (FaultType::VersionLoss, BlockVariant::Dataset(dataset)) => {
                match dataset.drop_oldest() {
                    Some(version) => format!("{} lost version {}", block_id, version),
                    None => format!("{} has no archived versions", block_id),
                }
            }
            (FaultType::VersionCorruption, BlockVariant::Dataset(dataset)) => {
                match dataset.corrupt_newest() {
                    Some(version) => format!("{} version {} corrupted", block_id, version),
                    None => format!("{} has no archived versions", block_id),
                }
            }
            _ => return Err(RecoveryError::UnsupportedFault { fault, block_type }),
        };
        let is_valid = block.is_valid;

        let now = self.clock.step();
        self.faults.record(
            LogEntry::new(now, LogLevel::Warn, details.clone())
                .with_field("fault_type", fault)
                .with_field("block", block_id.as_u32()),
        );

        Ok(FaultReport {
            block_id,
            block_type,
            fault_type: fault,
            is_valid,
            details,
        })
    }

    /// Tries to bring `block_id` back to a consistent state
    pub fn attempt_recovery(&mut self, block_id: BlockId) -> Result<RecoveryReport, RecoveryError> {
        let block = self
            .store
            .get_mut(block_id)
            .ok_or(RecoveryError::UnknownBlock(block_id))?;

        let report = match block.block_type() {
            BlockType::Native => recover_native(block),
            BlockType::Redundant => recover_redundant(block),
            BlockType::Dataset => recover_dataset(block),
        };

        if report.success {
            tracing::info!(block = %block_id, method = ?report.method, "block recovered");
        } else {
            tracing::warn!(block = %block_id, method = ?report.method, "block recovery failed");
        }
        Ok(report)
    }

    /// Writes `data` as the next version of a dataset block
    pub fn write_new_version(
        &mut self,
        block_id: BlockId,
        data: Vec<u8>,
    ) -> Result<VersionReport, RecoveryError> {
        let block = self
            .store
            .get_mut(block_id)
            .ok_or(RecoveryError::UnknownBlock(block_id))?;
        let block_type = block.block_type();

        let BlockData {
            data: current,
            checksum,
            is_valid,
            variant,
            ..
        } = block;
        let BlockVariant::Dataset(dataset) = variant else {
            return Err(RecoveryError::NotDataset {
                block_id,
                block_type,
            });
        };

        let VersionBump {
            previous_version,
            new_version,
        } = dataset.write_new_version(current, checksum, data);
        *is_valid = true;

        tracing::info!(block = %block_id, previous_version, new_version, "dataset version written");
        Ok(VersionReport {
            block_id,
            previous_version,
            new_version,
        })
    }

    pub fn compare_block_types(&self) -> BlockTypeComparison {
        BlockTypeComparison {
            comparison_table: COMPARISON_TABLE.to_vec(),
            blocks: self.store.summaries(),
        }
    }

    pub fn status(&self) -> RecoveryStatus {
        RecoveryStatus {
            virtual_time: self.clock.now_ms(),
            blocks: self.store.summaries(),
            fault_log: self.faults.recent(STATUS_FAULTS),
        }
    }

    /// Returns the model to its freshly constructed state
    pub fn reset(&mut self) {
        *self = Self::new();
    }
}

impl Default for RecoveryModel {
    fn default() -> Self {
        Self::new()
    }
}

fn report(
    block: &BlockData,
    method: RecoveryMethod,
    success: bool,
    message: impl Into<String>,
) -> RecoveryReport {
    RecoveryReport {
        block_id: block.block_id,
        block_type: block.block_type(),
        method,
        success,
        message: message.into(),
        restored_version: None,
    }
}

fn recover_native(block: &mut BlockData) -> RecoveryReport {
    let intact = block.is_valid && block.checksum_matches();
    let message = if intact {
        "checksum matches, data intact"
    } else {
        "native block has no backup, corrupted data cannot be recovered"
    };
    report(block, RecoveryMethod::NoRecoveryMechanism, intact, message)
}

fn recover_redundant(block: &mut BlockData) -> RecoveryReport {
    let backup = match &block.variant {
        BlockVariant::Redundant(copy) if copy.is_intact() => Some(copy.clone()),
        _ => None,
    };

    match backup {
        Some(copy) => {
            block.data = copy.backup;
            block.checksum = copy.backup_checksum;
            block.is_valid = true;
            report(block, RecoveryMethod::BackupRestore, true, "restored from backup")
        }
        None => report(
            block,
            RecoveryMethod::BackupRestore,
            false,
            "primary and backup both corrupted, cannot recover",
        ),
    }
}

fn recover_dataset(block: &mut BlockData) -> RecoveryReport {
    if block.is_valid && block.checksum_matches() {
        return report(block, RecoveryMethod::NotNeeded, true, "data valid");
    }

    let restored = match &mut block.variant {
        BlockVariant::Dataset(dataset) => match dataset.newest_consistent() {
            Some((version, record)) => {
                let record = record.clone();
                dataset.version = version;
                Some((version, record))
            }
            None => None,
        },
        _ => None,
    };

    match restored {
        Some((version, record)) => {
            block.data = record.data;
            block.checksum = record.checksum;
            block.is_valid = true;
            RecoveryReport {
                restored_version: Some(version),
                ..report(
                    block,
                    RecoveryMethod::VersionRollback,
                    true,
                    format!("rolled back to version {}", version),
                )
            }
        }
        None => report(
            block,
            RecoveryMethod::VersionRollback,
            false,
            "every archived version is corrupted",
        ),
    }
}
