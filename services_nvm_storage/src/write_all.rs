//! # WriteAll Protocol Engine
//!
//! Two-phase commit of new content into one block:
//!
//! ```text
//! Idle -> Phase1Snapshot -> Phase1Persist -> Phase2Copy -> Phase2Verify -> Completed
//!                                                                       \-> Failed
//! ```
//!
//! Phase 1 captures and persists a snapshot of the block before anything is
//! overwritten, so a power loss at any point leaves either the old content,
//! the snapshot, or a detectably corrupted block behind.
//!
//! The engine holds no block data. Every operation borrows the
//! [`BlockStore`] from the caller.

use crate::block::{BlockData, BlockStore};
use nvm_types::{BlockId, Checksum, VirtualClock};
use serde::Serialize;
use services_logger::{EventLog, LogEntry, LogLevel};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Events retained by the engine
const EVENT_LOG_CAPACITY: usize = 64;
/// Events shown by [`WriteAllEngine::status`]
const STATUS_EVENTS: usize = 10;
/// Value of an erased byte
const ERASED: u8 = 0xFF;

/// Protocol phase
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum WriteAllPhase {
    Idle,
    Phase1Snapshot,
    Phase1Persist,
    Phase2Copy,
    Phase2Verify,
    Completed,
    Failed,
}

impl fmt::Display for WriteAllPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            WriteAllPhase::Idle => "IDLE",
            WriteAllPhase::Phase1Snapshot => "PHASE1_SNAPSHOT",
            WriteAllPhase::Phase1Persist => "PHASE1_PERSIST",
            WriteAllPhase::Phase2Copy => "PHASE2_COPY",
            WriteAllPhase::Phase2Verify => "PHASE2_VERIFY",
            WriteAllPhase::Completed => "COMPLETED",
            WriteAllPhase::Failed => "FAILED",
        };
        f.write_str(name)
    }
}

/// Pre-write copy of a block taken in phase 1
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct WriteAllSnapshot {
    pub timestamp: u64,
    #[serde(serialize_with = "nvm_types::hex_bytes::serialize")]
    pub data: Vec<u8>,
    /// Checksum the block had on record, stale if it was already corrupted
    pub checksum: Checksum,
    /// False if the block was already corrupted when the snapshot was taken
    pub is_valid: bool,
    /// Whole block, so a restore also rewinds backups and version history
    #[serde(skip)]
    block: BlockData,
}

/// Where in the protocol power was lost
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RecoveryPoint {
    BeforePhase1,
    AfterPhase1,
    DuringPhase2,
    AfterPhase2,
}

impl RecoveryPoint {
    pub fn as_str(&self) -> &'static str {
        match self {
            RecoveryPoint::BeforePhase1 => "before_phase1",
            RecoveryPoint::AfterPhase1 => "after_phase1",
            RecoveryPoint::DuringPhase2 => "during_phase2",
            RecoveryPoint::AfterPhase2 => "after_phase2",
        }
    }
}

impl fmt::Display for RecoveryPoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RecoveryPoint {
    type Err = WriteAllError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "before_phase1" => Ok(RecoveryPoint::BeforePhase1),
            "after_phase1" => Ok(RecoveryPoint::AfterPhase1),
            "during_phase2" => Ok(RecoveryPoint::DuringPhase2),
            "after_phase2" => Ok(RecoveryPoint::AfterPhase2),
            other => Err(WriteAllError::UnknownRecoveryPoint(other.to_string())),
        }
    }
}

/// State a power loss left the target block in
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum RecoveryAssessment {
    /// Nothing had been written yet
    Unaffected,
    /// The persisted snapshot was written back
    RestoredFromSnapshot,
    /// The snapshot was needed but never taken
    NoSnapshot,
    /// The copy was torn; block-type recovery is required
    Corrupted,
    /// The copy had already landed
    Durable,
}

/// Errors from driving the protocol incorrectly
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum WriteAllError {
    #[error("Unknown block: {0}")]
    UnknownBlock(BlockId),

    #[error("Operation expects phase {expected}, engine is in {actual}")]
    InvalidPhase {
        expected: WriteAllPhase,
        actual: WriteAllPhase,
    },

    #[error("WriteAll was started for {expected}, not {actual}")]
    BlockMismatch { expected: BlockId, actual: BlockId },

    #[error("Dirty data detected, WriteAll must be restarted")]
    RestartRequired,

    #[error("No WriteAll cycle has been started")]
    NoActiveCycle,

    #[error("Unknown recovery point: {0}")]
    UnknownRecoveryPoint(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StartReport {
    pub phase: WriteAllPhase,
    pub block_id: BlockId,
    #[serde(serialize_with = "nvm_types::hex_bytes::serialize")]
    pub new_data: Vec<u8>,
    pub timestamp: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SnapshotReport {
    pub phase: WriteAllPhase,
    pub snapshot: WriteAllSnapshot,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PersistReport {
    pub phase: WriteAllPhase,
    pub persisted: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CopyReport {
    pub phase: WriteAllPhase,
    pub dirty_data_detected: bool,
    pub error: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct VerifyReport {
    pub phase: WriteAllPhase,
    pub is_valid: bool,
    pub checksum: Checksum,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PowerLossReport {
    pub power_loss_point: RecoveryPoint,
    pub assessment: RecoveryAssessment,
    pub recovery_result: String,
    pub current_phase: WriteAllPhase,
    /// Checksum of the content the block was left with, when known good
    pub checksum: Option<Checksum>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct WriteAllStatus {
    pub current_phase: WriteAllPhase,
    pub target_block: Option<BlockId>,
    pub virtual_time: u64,
    pub dirty_data_detected: bool,
    pub power_loss_point: Option<RecoveryPoint>,
    pub snapshot_available: bool,
    pub snapshot_checksum: Option<Checksum>,
    pub event_log: Vec<LogEntry>,
}

/// Two-phase WriteAll engine
#[derive(Debug, Clone)]
pub struct WriteAllEngine {
    phase: WriteAllPhase,
    target: Option<BlockId>,
    pending: Vec<u8>,
    snapshot: Option<WriteAllSnapshot>,
    dirty_data_detected: bool,
    power_loss_point: Option<RecoveryPoint>,
    /// Steps once per recorded event
    clock: VirtualClock,
    events: EventLog,
}

impl WriteAllEngine {
    pub fn new() -> Self {
        Self {
            phase: WriteAllPhase::Idle,
            target: None,
            pending: Vec::new(),
            snapshot: None,
            dirty_data_detected: false,
            power_loss_point: None,
            clock: VirtualClock::new(),
            events: EventLog::new("nvm_write_all", EVENT_LOG_CAPACITY),
        }
    }

    /// Begins a new cycle for `block_id`, discarding any previous one
    pub fn start(
        &mut self,
        store: &BlockStore,
        block_id: BlockId,
        new_data: Vec<u8>,
    ) -> Result<StartReport, WriteAllError> {
        if !store.contains(block_id) {
            return Err(WriteAllError::UnknownBlock(block_id));
        }

        self.log(
            LogLevel::Info,
            "write-all started",
            &[("block", block_id.to_string()), ("bytes", new_data.len().to_string())],
        );
        self.snapshot = None;
        self.dirty_data_detected = false;
        self.power_loss_point = None;
        self.target = Some(block_id);
        self.pending = new_data.clone();
        self.phase = WriteAllPhase::Phase1Snapshot;

        Ok(StartReport {
            phase: self.phase,
            block_id,
            new_data,
            timestamp: self.clock.now_ms(),
        })
    }

    /// Phase 1: captures the block's current bytes and checksum
    pub fn phase1_snapshot(
        &mut self,
        store: &BlockStore,
        block_id: BlockId,
    ) -> Result<SnapshotReport, WriteAllError> {
        self.check_step(WriteAllPhase::Phase1Snapshot, block_id)?;
        let block = lookup(store, block_id)?;

        self.log(
            LogLevel::Debug,
            "phase 1: snapshot taken",
            &[("block", block_id.to_string())],
        );
        let snapshot = WriteAllSnapshot {
            timestamp: self.clock.now_ms(),
            data: block.data.clone(),
            checksum: block.checksum,
            is_valid: block.is_valid && block.checksum_matches(),
            block: block.clone(),
        };
        self.snapshot = Some(snapshot.clone());
        self.phase = WriteAllPhase::Phase1Persist;

        Ok(SnapshotReport {
            phase: self.phase,
            snapshot,
        })
    }

    /// Phase 1: persists the snapshot; block data is not touched
    pub fn phase1_persist(&mut self, block_id: BlockId) -> Result<PersistReport, WriteAllError> {
        self.check_step(WriteAllPhase::Phase1Persist, block_id)?;

        self.log(
            LogLevel::Debug,
            "phase 1: persisting snapshot",
            &[("block", block_id.to_string())],
        );
        self.log(LogLevel::Debug, "snapshot written", &[]);
        self.phase = WriteAllPhase::Phase2Copy;

        Ok(PersistReport {
            phase: self.phase,
            persisted: true,
        })
    }

    /// Phase 2: commits `new_data` into the block
    ///
    /// With `inject_dirty` set the working copy is treated as having diverged
    /// from the snapshot: nothing is written and the phase does not advance.
    pub fn phase2_copy(
        &mut self,
        store: &mut BlockStore,
        block_id: BlockId,
        new_data: Vec<u8>,
        inject_dirty: bool,
    ) -> Result<CopyReport, WriteAllError> {
        self.check_step(WriteAllPhase::Phase2Copy, block_id)?;
        if self.dirty_data_detected {
            return Err(WriteAllError::RestartRequired);
        }
        if !store.contains(block_id) {
            return Err(WriteAllError::UnknownBlock(block_id));
        }

        if inject_dirty {
            self.dirty_data_detected = true;
            self.log(
                LogLevel::Warn,
                "dirty data: working copy diverged from snapshot",
                &[("block", block_id.to_string())],
            );
            return Ok(CopyReport {
                phase: self.phase,
                dirty_data_detected: true,
                error: Some("working copy does not match the phase 1 snapshot".to_string()),
            });
        }

        let block = lookup_mut(store, block_id)?;
        self.pending = new_data.clone();
        let bump = block.commit(new_data);

        let mut fields = vec![("block", block_id.to_string())];
        if let Some(bump) = bump {
            fields.push(("version", bump.new_version.to_string()));
        }
        self.log(LogLevel::Debug, "phase 2: new data copied", &fields);
        self.phase = WriteAllPhase::Phase2Verify;

        Ok(CopyReport {
            phase: self.phase,
            dirty_data_detected: false,
            error: None,
        })
    }

    /// Phase 2: checks the written bytes against their recorded checksum
    pub fn phase2_verify(
        &mut self,
        store: &mut BlockStore,
        block_id: BlockId,
    ) -> Result<VerifyReport, WriteAllError> {
        self.check_step(WriteAllPhase::Phase2Verify, block_id)?;
        let block = lookup_mut(store, block_id)?;

        let is_valid = block.checksum_matches();
        let checksum = block.checksum;
        if is_valid {
            block.refresh_backup();
            self.phase = WriteAllPhase::Completed;
            self.log(
                LogLevel::Info,
                "write-all completed",
                &[("block", block_id.to_string()), ("checksum", checksum.to_string())],
            );
        } else {
            block.is_valid = false;
            self.phase = WriteAllPhase::Failed;
            self.log(
                LogLevel::Error,
                "write-all failed: checksum mismatch",
                &[("block", block_id.to_string())],
            );
        }

        Ok(VerifyReport {
            phase: self.phase,
            is_valid,
            checksum,
        })
    }

    /// Simulates losing power at `point` and applies its consequences
    pub fn simulate_power_loss(
        &mut self,
        store: &mut BlockStore,
        point: RecoveryPoint,
    ) -> Result<PowerLossReport, WriteAllError> {
        self.log(
            LogLevel::Warn,
            "power loss",
            &[("recovery_point", point.to_string())],
        );
        self.power_loss_point = Some(point);

        let (assessment, recovery_result, checksum) = match point {
            RecoveryPoint::BeforePhase1 => {
                self.phase = WriteAllPhase::Idle;
                (
                    RecoveryAssessment::Unaffected,
                    "unaffected, block keeps its original data".to_string(),
                    None,
                )
            }
            RecoveryPoint::AfterPhase1 => self.restore_snapshot(store)?,
            RecoveryPoint::DuringPhase2 => {
                let block_id = self.target.ok_or(WriteAllError::NoActiveCycle)?;
                let block = lookup_mut(store, block_id)?;
                tear(block, &self.pending);
                self.phase = WriteAllPhase::Failed;
                (
                    RecoveryAssessment::Corrupted,
                    "data may be corrupted, recover from backup or history".to_string(),
                    None,
                )
            }
            RecoveryPoint::AfterPhase2 => {
                self.phase = WriteAllPhase::Completed;
                let checksum = self
                    .target
                    .and_then(|id| store.get(id))
                    .map(|block| block.checksum);
                (
                    RecoveryAssessment::Durable,
                    "data already persisted".to_string(),
                    checksum,
                )
            }
        };

        self.log(
            LogLevel::Info,
            "power loss assessed",
            &[("result", format!("{:?}", assessment)), ("phase", self.phase.to_string())],
        );

        Ok(PowerLossReport {
            power_loss_point: point,
            assessment,
            recovery_result,
            current_phase: self.phase,
            checksum,
        })
    }

    fn restore_snapshot(
        &mut self,
        store: &mut BlockStore,
    ) -> Result<(RecoveryAssessment, String, Option<Checksum>), WriteAllError> {
        let (snapshot, block_id) = match (&self.snapshot, self.target) {
            (Some(snapshot), Some(block_id)) => (snapshot, block_id),
            _ => {
                self.phase = WriteAllPhase::Failed;
                return Ok((
                    RecoveryAssessment::NoSnapshot,
                    "no snapshot, cannot recover".to_string(),
                    None,
                ));
            }
        };

        let block = lookup_mut(store, block_id)?;
        *block = snapshot.block.clone();
        block.is_valid = snapshot.is_valid;
        let checksum = snapshot.checksum;
        let recovery_result = if snapshot.is_valid {
            format!("restored from snapshot, data consistent (checksum {})", checksum)
        } else {
            "restored from snapshot, block was already corrupted before the write".to_string()
        };
        self.phase = WriteAllPhase::Completed;

        Ok((
            RecoveryAssessment::RestoredFromSnapshot,
            recovery_result,
            snapshot.is_valid.then_some(checksum),
        ))
    }

    pub fn status(&self) -> WriteAllStatus {
        WriteAllStatus {
            current_phase: self.phase,
            target_block: self.target,
            virtual_time: self.clock.now_ms(),
            dirty_data_detected: self.dirty_data_detected,
            power_loss_point: self.power_loss_point,
            snapshot_available: self.snapshot.is_some(),
            snapshot_checksum: self.snapshot.as_ref().map(|s| s.checksum),
            event_log: self.events.recent(STATUS_EVENTS),
        }
    }

    pub fn phase(&self) -> WriteAllPhase {
        self.phase
    }

    pub fn snapshot(&self) -> Option<&WriteAllSnapshot> {
        self.snapshot.as_ref()
    }

    pub fn events(&self) -> &EventLog {
        &self.events
    }

    /// Returns the engine to its freshly constructed state
    pub fn reset(&mut self) {
        *self = Self::new();
    }

    fn check_step(&self, expected: WriteAllPhase, block_id: BlockId) -> Result<(), WriteAllError> {
        if self.phase != expected {
            return Err(WriteAllError::InvalidPhase {
                expected,
                actual: self.phase,
            });
        }
        match self.target {
            Some(target) if target != block_id => Err(WriteAllError::BlockMismatch {
                expected: target,
                actual: block_id,
            }),
            Some(_) => Ok(()),
            None => Err(WriteAllError::NoActiveCycle),
        }
    }

    fn log(&mut self, level: LogLevel, message: &str, fields: &[(&str, String)]) {
        let now = self.clock.step();
        let entry = fields
            .iter()
            .fold(LogEntry::new(now, level, message), |entry, (k, v)| {
                entry.with_field(*k, v)
            });
        self.events.record(entry);
    }
}

impl Default for WriteAllEngine {
    fn default() -> Self {
        Self::new()
    }
}

/// Leaves `block` as an interrupted write would: the first half of `pending`
/// landed, the rest of the region is still erased
fn tear(block: &mut BlockData, pending: &[u8]) {
    let region = if pending.is_empty() {
        block.data.len()
    } else {
        pending.len()
    };
    let landed = pending.len() / 2;

    let mut torn = Vec::with_capacity(region);
    torn.extend_from_slice(&pending[..landed]);
    torn.resize(region, ERASED);

    block.data = torn;
    block.is_valid = false;
}

fn lookup(store: &BlockStore, block_id: BlockId) -> Result<&BlockData, WriteAllError> {
    store
        .get(block_id)
        .ok_or(WriteAllError::UnknownBlock(block_id))
}

fn lookup_mut(store: &mut BlockStore, block_id: BlockId) -> Result<&mut BlockData, WriteAllError> {
    store
        .get_mut(block_id)
        .ok_or(WriteAllError::UnknownBlock(block_id))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::block::BlockVariant;
    use nvm_types::crc16;

    const NATIVE: BlockId = BlockId::new(0);
    const REDUNDANT: BlockId = BlockId::new(1);
    const DATASET: BlockId = BlockId::new(2);

    fn through_persist(
        engine: &mut WriteAllEngine,
        store: &mut BlockStore,
        block_id: BlockId,
        data: &[u8],
    ) {
        engine.start(store, block_id, data.to_vec()).unwrap();
        engine.phase1_snapshot(store, block_id).unwrap();
        engine.phase1_persist(block_id).unwrap();
    }

    #[test]
    fn test_full_cycle_native() {
        let mut store = BlockStore::seeded();
        let mut engine = WriteAllEngine::new();
        let new_data = vec![0x5A; 16];

        let report = engine.start(&store, NATIVE, new_data.clone()).unwrap();
        assert_eq!(report.phase, WriteAllPhase::Phase1Snapshot);

        let report = engine.phase1_snapshot(&store, NATIVE).unwrap();
        assert_eq!(report.phase, WriteAllPhase::Phase1Persist);
        assert_eq!(report.snapshot.data, store.get(NATIVE).unwrap().data);

        assert_eq!(
            engine.phase1_persist(NATIVE).unwrap().phase,
            WriteAllPhase::Phase2Copy
        );

        let report = engine
            .phase2_copy(&mut store, NATIVE, new_data.clone(), false)
            .unwrap();
        assert!(!report.dirty_data_detected);
        assert_eq!(report.phase, WriteAllPhase::Phase2Verify);

        let report = engine.phase2_verify(&mut store, NATIVE).unwrap();
        assert!(report.is_valid);
        assert_eq!(report.phase, WriteAllPhase::Completed);
        assert_eq!(report.checksum, crc16(&new_data));
        assert_eq!(store.get(NATIVE).unwrap().data, new_data);
    }

    #[test]
    fn test_start_unknown_block() {
        let store = BlockStore::seeded();
        let mut engine = WriteAllEngine::new();
        assert_eq!(
            engine.start(&store, BlockId::new(42), vec![1]),
            Err(WriteAllError::UnknownBlock(BlockId::new(42)))
        );
        assert_eq!(engine.phase(), WriteAllPhase::Idle);
    }

    #[test]
    fn test_out_of_order_rejected() {
        let mut store = BlockStore::seeded();
        let mut engine = WriteAllEngine::new();

        assert!(matches!(
            engine.phase1_persist(NATIVE),
            Err(WriteAllError::InvalidPhase {
                expected: WriteAllPhase::Phase1Persist,
                actual: WriteAllPhase::Idle,
            })
        ));

        engine.start(&store, NATIVE, vec![1; 16]).unwrap();
        assert!(matches!(
            engine.phase2_copy(&mut store, NATIVE, vec![1; 16], false),
            Err(WriteAllError::InvalidPhase { .. })
        ));
        assert_eq!(engine.phase(), WriteAllPhase::Phase1Snapshot);
        assert_eq!(&store.get(NATIVE).unwrap().data[..4], &[0x11, 0x22, 0x33, 0x44]);
    }

    #[test]
    fn test_block_mismatch_rejected() {
        let store = BlockStore::seeded();
        let mut engine = WriteAllEngine::new();
        engine.start(&store, NATIVE, vec![1; 16]).unwrap();

        assert_eq!(
            engine.phase1_snapshot(&store, REDUNDANT),
            Err(WriteAllError::BlockMismatch {
                expected: NATIVE,
                actual: REDUNDANT,
            })
        );
        assert!(engine.snapshot().is_none());
    }

    #[test]
    fn test_dirty_data_leaves_block_untouched() {
        let mut store = BlockStore::seeded();
        let mut engine = WriteAllEngine::new();
        through_persist(&mut engine, &mut store, NATIVE, &[9; 16]);
        let before = store.get(NATIVE).unwrap().clone();

        let report = engine
            .phase2_copy(&mut store, NATIVE, vec![9; 16], true)
            .unwrap();

        assert!(report.dirty_data_detected);
        assert_eq!(report.phase, WriteAllPhase::Phase2Copy);
        assert_eq!(engine.phase(), WriteAllPhase::Phase2Copy);
        assert_eq!(store.get(NATIVE).unwrap(), &before);
        assert!(engine.status().dirty_data_detected);

        assert_eq!(
            engine.phase2_copy(&mut store, NATIVE, vec![9; 16], false),
            Err(WriteAllError::RestartRequired)
        );

        // A fresh start clears the flag
        through_persist(&mut engine, &mut store, NATIVE, &[9; 16]);
        assert!(!engine.status().dirty_data_detected);
        assert!(engine
            .phase2_copy(&mut store, NATIVE, vec![9; 16], false)
            .is_ok());
    }

    #[test]
    fn test_redundant_backup_refreshed_on_verify() {
        let mut store = BlockStore::seeded();
        let mut engine = WriteAllEngine::new();
        through_persist(&mut engine, &mut store, REDUNDANT, &[7; 16]);

        engine
            .phase2_copy(&mut store, REDUNDANT, vec![7; 16], false)
            .unwrap();
        let BlockVariant::Redundant(copy) = &store.get(REDUNDANT).unwrap().variant else {
            panic!("expected redundant block");
        };
        assert_eq!(&copy.backup[..4], &[0xAA, 0xBB, 0xCC, 0xDD]);

        engine.phase2_verify(&mut store, REDUNDANT).unwrap();
        let BlockVariant::Redundant(copy) = &store.get(REDUNDANT).unwrap().variant else {
            panic!("expected redundant block");
        };
        assert_eq!(copy.backup, vec![7; 16]);
    }

    #[test]
    fn test_dataset_copy_bumps_version() {
        let mut store = BlockStore::seeded();
        let mut engine = WriteAllEngine::new();
        through_persist(&mut engine, &mut store, DATASET, &[3; 16]);

        engine
            .phase2_copy(&mut store, DATASET, vec![3; 16], false)
            .unwrap();

        assert_eq!(store.get(DATASET).unwrap().summary().version, 3);
    }

    #[test]
    fn test_verify_mismatch_fails_block() {
        let mut store = BlockStore::seeded();
        let mut engine = WriteAllEngine::new();
        through_persist(&mut engine, &mut store, NATIVE, &[4; 16]);
        engine
            .phase2_copy(&mut store, NATIVE, vec![4; 16], false)
            .unwrap();
        store.get_mut(NATIVE).unwrap().data[3] ^= 0x01;

        let report = engine.phase2_verify(&mut store, NATIVE).unwrap();

        assert!(!report.is_valid);
        assert_eq!(report.phase, WriteAllPhase::Failed);
        assert!(!store.get(NATIVE).unwrap().is_valid);
    }

    #[test]
    fn test_power_loss_before_phase1() {
        let mut store = BlockStore::seeded();
        let original = store.get(NATIVE).unwrap().clone();
        let mut engine = WriteAllEngine::new();
        engine.start(&store, NATIVE, vec![1; 16]).unwrap();

        let report = engine
            .simulate_power_loss(&mut store, RecoveryPoint::BeforePhase1)
            .unwrap();

        assert_eq!(report.current_phase, WriteAllPhase::Idle);
        assert_eq!(report.assessment, RecoveryAssessment::Unaffected);
        assert_eq!(store.get(NATIVE).unwrap(), &original);
    }

    #[test]
    fn test_power_loss_after_phase1_restores_snapshot() {
        let mut store = BlockStore::seeded();
        let original = store.get(NATIVE).unwrap().clone();
        let mut engine = WriteAllEngine::new();
        through_persist(&mut engine, &mut store, NATIVE, &[1; 16]);
        engine
            .phase2_copy(&mut store, NATIVE, vec![1; 16], false)
            .unwrap();

        let report = engine
            .simulate_power_loss(&mut store, RecoveryPoint::AfterPhase1)
            .unwrap();

        assert_eq!(report.current_phase, WriteAllPhase::Completed);
        assert_eq!(report.assessment, RecoveryAssessment::RestoredFromSnapshot);
        assert_eq!(report.checksum, Some(original.checksum));
        assert_eq!(store.get(NATIVE).unwrap().data, original.data);
        assert!(store.get(NATIVE).unwrap().checksum_matches());
    }

    #[test]
    fn test_power_loss_after_phase1_rewinds_dataset_version() {
        let mut store = BlockStore::seeded();
        let original = store.get(DATASET).unwrap().clone();
        let mut engine = WriteAllEngine::new();
        through_persist(&mut engine, &mut store, DATASET, &[3; 16]);
        engine
            .phase2_copy(&mut store, DATASET, vec![3; 16], false)
            .unwrap();

        engine
            .simulate_power_loss(&mut store, RecoveryPoint::AfterPhase1)
            .unwrap();

        assert_eq!(store.get(DATASET).unwrap(), &original);
        assert_eq!(store.get(DATASET).unwrap().summary().version, 2);
    }

    #[test]
    fn test_power_loss_after_phase1_keeps_stale_checksum() {
        let mut store = BlockStore::seeded();
        let recorded = store.get(NATIVE).unwrap().checksum;
        {
            let block = store.get_mut(NATIVE).unwrap();
            block.data[0] ^= 0xFF;
            block.is_valid = false;
        }
        let mut engine = WriteAllEngine::new();
        through_persist(&mut engine, &mut store, NATIVE, &[1; 16]);
        assert!(!engine.snapshot().unwrap().is_valid);
        assert_eq!(engine.snapshot().unwrap().checksum, recorded);

        let report = engine
            .simulate_power_loss(&mut store, RecoveryPoint::AfterPhase1)
            .unwrap();

        assert_eq!(report.checksum, None);
        let block = store.get(NATIVE).unwrap();
        assert_eq!(block.checksum, recorded);
        assert!(!block.is_valid);
        assert!(!block.checksum_matches());
    }

    #[test]
    fn test_power_loss_after_phase1_without_snapshot() {
        let mut store = BlockStore::seeded();
        let mut engine = WriteAllEngine::new();
        engine.start(&store, NATIVE, vec![1; 16]).unwrap();

        let report = engine
            .simulate_power_loss(&mut store, RecoveryPoint::AfterPhase1)
            .unwrap();

        assert_eq!(report.assessment, RecoveryAssessment::NoSnapshot);
        assert_eq!(report.current_phase, WriteAllPhase::Failed);
    }

    #[test]
    fn test_power_loss_during_phase2_tears_block() {
        let mut store = BlockStore::seeded();
        let old_checksum = store.get(NATIVE).unwrap().checksum;
        let mut engine = WriteAllEngine::new();
        through_persist(&mut engine, &mut store, NATIVE, &[0x42; 16]);

        let report = engine
            .simulate_power_loss(&mut store, RecoveryPoint::DuringPhase2)
            .unwrap();

        assert_eq!(report.current_phase, WriteAllPhase::Failed);
        assert_eq!(report.assessment, RecoveryAssessment::Corrupted);
        let block = store.get(NATIVE).unwrap();
        assert_eq!(&block.data[..8], &[0x42; 8]);
        assert_eq!(&block.data[8..], &[0xFF; 8]);
        assert_eq!(block.checksum, old_checksum);
        assert!(!block.is_valid);
        assert!(!block.checksum_matches());
    }

    #[test]
    fn test_power_loss_during_phase2_needs_cycle() {
        let mut store = BlockStore::seeded();
        let mut engine = WriteAllEngine::new();
        assert_eq!(
            engine.simulate_power_loss(&mut store, RecoveryPoint::DuringPhase2),
            Err(WriteAllError::NoActiveCycle)
        );
    }

    #[test]
    fn test_recovery_point_parsing() {
        assert_eq!(
            "during_phase2".parse::<RecoveryPoint>(),
            Ok(RecoveryPoint::DuringPhase2)
        );
        assert_eq!(RecoveryPoint::AfterPhase1.to_string(), "after_phase1");
        assert!(matches!(
            "mid_phase3".parse::<RecoveryPoint>(),
            Err(WriteAllError::UnknownRecoveryPoint(_))
        ));
    }

    #[test]
    fn test_status_reports_recent_events() {
        let mut store = BlockStore::seeded();
        let mut engine = WriteAllEngine::new();
        for _ in 0..4 {
            through_persist(&mut engine, &mut store, NATIVE, &[1; 16]);
        }

        let status = engine.status();
        assert_eq!(status.event_log.len(), 10);
        assert_eq!(status.virtual_time, 16);
        assert_eq!(status.event_log.last().unwrap().timestamp_ms, 16);
        assert!(status.snapshot_available);
        assert_eq!(status.target_block, Some(NATIVE));

        let value = serde_json::to_value(&status).unwrap();
        assert_eq!(value["current_phase"], "Phase2Copy");
    }

    #[test]
    fn test_reset() {
        let mut store = BlockStore::seeded();
        let mut engine = WriteAllEngine::new();
        through_persist(&mut engine, &mut store, NATIVE, &[1; 16]);

        engine.reset();

        let status = engine.status();
        assert_eq!(status.current_phase, WriteAllPhase::Idle);
        assert_eq!(status.virtual_time, 0);
        assert!(!status.snapshot_available);
        assert!(status.event_log.is_empty());
    }
}
