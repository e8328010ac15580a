//! # Block Data Model
//!
//! Every block carries its live bytes, the checksum recorded at the last
//! committed write and a validity flag. What else it carries depends on its
//! type:
//!
//! - **Native**: nothing, a single copy
//! - **Redundant**: a backup copy with its own recorded checksum
//! - **Dataset**: a version counter and the archived versions
//!
//! Committed operations always leave `checksum == crc16(data)`. Fault
//! injection is the only thing that breaks that equality.

use nvm_types::{crc16, BlockId, Checksum};
use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;

/// Block redundancy scheme
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum BlockType {
    Native,
    Redundant,
    Dataset,
}

impl fmt::Display for BlockType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BlockType::Native => write!(f, "Native"),
            BlockType::Redundant => write!(f, "Redundant"),
            BlockType::Dataset => write!(f, "Dataset"),
        }
    }
}

/// Backup copy of a redundant block
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RedundantCopy {
    #[serde(serialize_with = "nvm_types::hex_bytes::serialize")]
    pub backup: Vec<u8>,
    pub backup_checksum: Checksum,
}

impl RedundantCopy {
    fn mirror(data: &[u8]) -> Self {
        Self {
            backup: data.to_vec(),
            backup_checksum: crc16(data),
        }
    }

    /// Returns true if the backup still matches its recorded checksum
    pub fn is_intact(&self) -> bool {
        self.backup_checksum.matches(&self.backup)
    }
}

/// One archived dataset version
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct VersionRecord {
    #[serde(serialize_with = "nvm_types::hex_bytes::serialize")]
    pub data: Vec<u8>,
    /// Checksum recorded when the version was archived
    pub checksum: Checksum,
}

impl VersionRecord {
    fn new(data: Vec<u8>) -> Self {
        let checksum = crc16(&data);
        Self { data, checksum }
    }

    /// Returns true if the recorded checksum matches the archived bytes
    pub fn is_consistent(&self) -> bool {
        self.checksum.matches(&self.data)
    }
}

/// Version bookkeeping of a dataset write
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct VersionBump {
    pub previous_version: u32,
    pub new_version: u32,
}

/// Version counter and archive of a dataset block
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DatasetHistory {
    pub version: u32,
    pub history: BTreeMap<u32, VersionRecord>,
}

impl DatasetHistory {
    /// Archives `data` under the current version, then installs `new_data`
    /// as the next version
    ///
    /// The archived record keeps `checksum` as recorded, even if it no longer
    /// matches the bytes.
    pub fn write_new_version(
        &mut self,
        data: &mut Vec<u8>,
        checksum: &mut Checksum,
        new_data: Vec<u8>,
    ) -> VersionBump {
        let previous_version = self.version;
        let archived = std::mem::replace(data, new_data);
        self.history.insert(
            previous_version,
            VersionRecord {
                data: archived,
                checksum: *checksum,
            },
        );
        self.version = previous_version.saturating_add(1);
        *checksum = crc16(data);

        VersionBump {
            previous_version,
            new_version: self.version,
        }
    }

    /// Newest archived version whose bytes match its recorded checksum
    pub fn newest_consistent(&self) -> Option<(u32, &VersionRecord)> {
        self.history
            .iter()
            .rev()
            .find(|(_, record)| record.is_consistent())
            .map(|(version, record)| (*version, record))
    }

    /// Drops the oldest archived version
    pub fn drop_oldest(&mut self) -> Option<u32> {
        self.history.pop_first().map(|(version, _)| version)
    }

    /// Flips every bit of the first byte of the newest archived version
    pub fn corrupt_newest(&mut self) -> Option<u32> {
        let (version, record) = self.history.iter_mut().next_back()?;
        if let Some(byte) = record.data.first_mut() {
            *byte ^= 0xFF;
        }
        Some(*version)
    }
}

/// Type-specific payload of a block
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type")]
pub enum BlockVariant {
    Native,
    Redundant(RedundantCopy),
    Dataset(DatasetHistory),
}

/// A block as held by the store
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BlockData {
    pub block_id: BlockId,
    #[serde(serialize_with = "nvm_types::hex_bytes::serialize")]
    pub data: Vec<u8>,
    pub checksum: Checksum,
    pub is_valid: bool,
    pub variant: BlockVariant,
}

impl BlockData {
    /// Creates a native block
    pub fn native(block_id: BlockId, data: Vec<u8>) -> Self {
        Self::with_variant(block_id, data, BlockVariant::Native)
    }

    /// Creates a redundant block whose backup mirrors `data`
    pub fn redundant(block_id: BlockId, data: Vec<u8>) -> Self {
        let copy = RedundantCopy::mirror(&data);
        Self::with_variant(block_id, data, BlockVariant::Redundant(copy))
    }

    /// Creates a dataset block at `version` with the given archive
    pub fn dataset(
        block_id: BlockId,
        data: Vec<u8>,
        version: u32,
        history: impl IntoIterator<Item = (u32, Vec<u8>)>,
    ) -> Self {
        let history = history
            .into_iter()
            .map(|(v, bytes)| (v, VersionRecord::new(bytes)))
            .collect();
        Self::with_variant(
            block_id,
            data,
            BlockVariant::Dataset(DatasetHistory { version, history }),
        )
    }

    fn with_variant(block_id: BlockId, data: Vec<u8>, variant: BlockVariant) -> Self {
        Self {
            block_id,
            checksum: crc16(&data),
            data,
            is_valid: true,
            variant,
        }
    }

    pub fn block_type(&self) -> BlockType {
        match self.variant {
            BlockVariant::Native => BlockType::Native,
            BlockVariant::Redundant(_) => BlockType::Redundant,
            BlockVariant::Dataset(_) => BlockType::Dataset,
        }
    }

    /// Returns true if the live bytes match the recorded checksum
    pub fn checksum_matches(&self) -> bool {
        self.checksum.matches(&self.data)
    }

    /// Commits `new_data` as the block's live content
    ///
    /// A redundant block's backup is left alone; a dataset block archives its
    /// current content first.
    pub fn commit(&mut self, new_data: Vec<u8>) -> Option<VersionBump> {
        self.is_valid = true;
        match &mut self.variant {
            BlockVariant::Dataset(dataset) => Some(dataset.write_new_version(
                &mut self.data,
                &mut self.checksum,
                new_data,
            )),
            BlockVariant::Native | BlockVariant::Redundant(_) => {
                self.checksum = crc16(&new_data);
                self.data = new_data;
                None
            }
        }
    }

    /// Copies the primary into the backup of a redundant block
    pub fn refresh_backup(&mut self) {
        if let BlockVariant::Redundant(copy) = &mut self.variant {
            *copy = RedundantCopy::mirror(&self.data);
        }
    }

    pub fn summary(&self) -> BlockSummary {
        let (version, num_versions, has_backup) = match &self.variant {
            BlockVariant::Native => (1, 1, false),
            BlockVariant::Redundant(_) => (1, 1, true),
            BlockVariant::Dataset(dataset) => (dataset.version, dataset.history.len(), false),
        };
        BlockSummary {
            block_id: self.block_id,
            block_type: self.block_type(),
            version,
            num_versions,
            has_backup,
            is_valid: self.is_valid,
            checksum: self.checksum,
        }
    }
}

/// Compact description of a block for status views
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BlockSummary {
    pub block_id: BlockId,
    pub block_type: BlockType,
    pub version: u32,
    pub num_versions: usize,
    pub has_backup: bool,
    pub is_valid: bool,
    pub checksum: Checksum,
}

/// All blocks, addressed by id
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct BlockStore {
    blocks: BTreeMap<BlockId, BlockData>,
}

impl BlockStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// The three demonstration blocks, one of each type
    pub fn seeded() -> Self {
        let mut store = Self::new();
        store.insert(BlockData::native(BlockId::new(0), pattern([0x11, 0x22, 0x33, 0x44])));
        store.insert(BlockData::redundant(BlockId::new(1), pattern([0xAA, 0xBB, 0xCC, 0xDD])));
        store.insert(BlockData::dataset(
            BlockId::new(2),
            pattern([0x12, 0x34, 0x56, 0x78]),
            2,
            [
                (1, pattern([0x11, 0x22, 0x33, 0x44])),
                (2, pattern([0x12, 0x34, 0x56, 0x78])),
            ],
        ));
        store
    }

    /// Inserts a block, replacing any block with the same id
    pub fn insert(&mut self, block: BlockData) -> Option<BlockData> {
        self.blocks.insert(block.block_id, block)
    }

    pub fn get(&self, block_id: BlockId) -> Option<&BlockData> {
        self.blocks.get(&block_id)
    }

    pub fn get_mut(&mut self, block_id: BlockId) -> Option<&mut BlockData> {
        self.blocks.get_mut(&block_id)
    }

    pub fn contains(&self, block_id: BlockId) -> bool {
        self.blocks.contains_key(&block_id)
    }

    pub fn iter(&self) -> impl Iterator<Item = &BlockData> {
        self.blocks.values()
    }

    pub fn len(&self) -> usize {
        self.blocks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty()
    }

    pub fn summaries(&self) -> Vec<BlockSummary> {
        self.iter().map(BlockData::summary).collect()
    }
}

/// 16 bytes made of `word` repeated four times
fn pattern(word: [u8; 4]) -> Vec<u8> {
    word.repeat(4)
}
