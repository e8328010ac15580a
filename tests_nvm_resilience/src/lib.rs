//! NvM Resilience Test Utilities
//!
//! This crate provides shared utilities for the cross-crate resilience tests.
//!
//! ## Test Philosophy
//!
//! - **Safety under faults**: Blocks never end up silently inconsistent
//! - **Deterministic failures**: Every fault and power loss is injected explicitly
//! - **One store**: WriteAll and recovery act on the same blocks

use nvm_types::BlockId;
use services_nvm_scheduler::{DispatchOutcome, Scheduler, TickSnapshot};
use services_nvm_storage::{
    BlockStore, PowerLossReport, RecoveryModel, RecoveryPoint, WriteAllEngine, WriteAllError,
};

/// Seeded native block
pub const NATIVE_BLOCK: BlockId = BlockId::new(0);
/// Seeded redundant block
pub const REDUNDANT_BLOCK: BlockId = BlockId::new(1);
/// Seeded dataset block
pub const DATASET_BLOCK: BlockId = BlockId::new(2);

/// Ticks `scheduler` by `step_ms` until a job completes or `max_ticks` pass
///
/// Returns every snapshot taken, the last one first reporting completion.
pub fn tick_until_completed(
    scheduler: &mut Scheduler,
    step_ms: u64,
    max_ticks: usize,
) -> Vec<TickSnapshot> {
    let mut snapshots = Vec::new();
    for _ in 0..max_ticks {
        let snapshot = scheduler.tick(step_ms);
        let done = snapshot
            .outcome
            .as_ref()
            .is_some_and(DispatchOutcome::is_completed);
        snapshots.push(snapshot);
        if done {
            break;
        }
    }
    snapshots
}

/// Runs phase 1 of a WriteAll cycle on `block_id`, then loses power at `point`
pub fn interrupt_write_all(
    engine: &mut WriteAllEngine,
    model: &mut RecoveryModel,
    block_id: BlockId,
    new_data: Vec<u8>,
    point: RecoveryPoint,
) -> Result<PowerLossReport, WriteAllError> {
    engine.start(model.blocks(), block_id, new_data)?;
    engine.phase1_snapshot(model.blocks(), block_id)?;
    engine.phase1_persist(block_id)?;
    engine.simulate_power_loss(model.blocks_mut(), point)
}

/// Runs a complete WriteAll cycle on `block_id`
pub fn complete_write_all(
    engine: &mut WriteAllEngine,
    store: &mut BlockStore,
    block_id: BlockId,
    new_data: Vec<u8>,
) -> Result<bool, WriteAllError> {
    engine.start(store, block_id, new_data.clone())?;
    engine.phase1_snapshot(store, block_id)?;
    engine.phase1_persist(block_id)?;
    engine.phase2_copy(store, block_id, new_data, false)?;
    Ok(engine.phase2_verify(store, block_id)?.is_valid)
}

/// Copy of a block's live bytes
pub fn block_bytes(store: &BlockStore, block_id: BlockId) -> Vec<u8> {
    store
        .get(block_id)
        .map(|block| block.data.clone())
        .unwrap_or_default()
}
