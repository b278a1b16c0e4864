//! Block and snapshot storage
//!
//! Both stores are traits so that durable backends can be plugged in; the
//! in-memory implementations below back the default [`Blockchain`].
//! Accessors hand out owned copies, so nothing a caller does to a returned
//! value can reach stored state.
//!
//! [`Blockchain`]: super::chain::Blockchain

use tracing::debug;

use crate::error::{ChainError, Result};

use super::chain::{Block, BlockNumber};
use super::resolver::AsOf;
use super::state::Snapshot;

/// Append-only sequence of validated blocks.
///
/// Implementations do not check contiguity on `append`; callers go through
/// `Blockchain::add_block`, which does.
pub trait BlockStore {
    fn append(&mut self, block: Block) -> Result<()>;

    fn head(&self) -> Result<Option<Block>>;

    /// `Ok(None)` when the block does not exist yet, [`ChainError::HistoryGap`]
    /// when it is older than the earliest retained block, and
    /// [`ChainError::Inconsistent`] when it falls in a hole between retained blocks.
    fn by_number(&self, block_number: BlockNumber) -> Result<Option<Block>>;

    fn earliest_block_number(&self) -> Result<Option<BlockNumber>>;

    fn len(&self) -> Result<usize>;

    fn is_empty(&self) -> Result<bool> {
        Ok(self.len()? == 0)
    }

    /// Retained blocks at store positions `[offset, offset + limit)`, oldest first.
    fn range(&self, offset: usize, limit: Option<usize>) -> Result<Vec<Block>>;
}

/// Ordered sequence of snapshots, ascending by last block number.
pub trait SnapshotStore {
    fn add(&mut self, snapshot: Snapshot) -> Result<()>;

    /// Latest snapshot usable as the base for `at`: the newest overall for
    /// [`AsOf::Head`], otherwise the newest whose last block is at or before
    /// the target. The genesis snapshot matches every target.
    fn closest_at_or_before(&self, at: AsOf) -> Result<Snapshot>;

    fn first(&self) -> Result<Option<Snapshot>>;

    fn last(&self) -> Result<Option<Snapshot>>;

    /// Newest first.
    fn reversed(&self) -> Result<Vec<Snapshot>>;

    fn len(&self) -> Result<usize>;
}

#[derive(Debug, Clone, Default)]
pub struct MemoryBlockStore {
    blocks: Vec<Block>,
}

impl MemoryBlockStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl BlockStore for MemoryBlockStore {
    fn append(&mut self, block: Block) -> Result<()> {
        debug!(block_number = block.block_number, "Persisting block");
        self.blocks.push(block);
        Ok(())
    }

    fn head(&self) -> Result<Option<Block>> {
        Ok(self.blocks.last().cloned())
    }

    fn by_number(&self, block_number: BlockNumber) -> Result<Option<Block>> {
        let (first, head) = match (self.blocks.first(), self.blocks.last()) {
            (Some(first), Some(head)) => (first, head),
            _ => return Ok(None),
        };

        if block_number > head.block_number {
            return Ok(None);
        }

        if block_number < first.block_number {
            return Err(ChainError::HistoryGap {
                requested: block_number,
                earliest: first.block_number,
            });
        }

        // Appends are unchecked, so the position is looked up rather than derived.
        match self
            .blocks
            .binary_search_by_key(&block_number, |block| block.block_number)
        {
            Ok(index) => Ok(Some(self.blocks[index].clone())),
            Err(_) => Err(ChainError::Inconsistent(format!(
                "Block {} is missing between retained blocks {} and {}",
                block_number, first.block_number, head.block_number
            ))),
        }
    }

    fn earliest_block_number(&self) -> Result<Option<BlockNumber>> {
        Ok(self.blocks.first().map(|block| block.block_number))
    }

    fn len(&self) -> Result<usize> {
        Ok(self.blocks.len())
    }

    fn range(&self, offset: usize, limit: Option<usize>) -> Result<Vec<Block>> {
        let iter = self.blocks.iter().skip(offset);
        Ok(match limit {
            Some(limit) => iter.take(limit).cloned().collect(),
            None => iter.cloned().collect(),
        })
    }
}

#[derive(Debug, Clone)]
pub struct MemorySnapshotStore {
    snapshots: Vec<Snapshot>,
}

impl MemorySnapshotStore {
    /// A store always holds at least the genesis snapshot.
    pub fn new(genesis: Snapshot) -> Result<Self> {
        genesis.validate(true)?;
        Ok(Self {
            snapshots: vec![genesis],
        })
    }

    /// Store over an arbitrary sequence, e.g. one loaded from elsewhere.
    /// Nothing is checked here; `ChainValidator` does that.
    pub fn from_snapshots(snapshots: Vec<Snapshot>) -> Self {
        Self { snapshots }
    }
}

impl SnapshotStore for MemorySnapshotStore {
    fn add(&mut self, snapshot: Snapshot) -> Result<()> {
        snapshot.validate(false)?;
        let last_block_number = snapshot.last_block_number;

        if let Some(previous) = self.snapshots.last() {
            if previous.last_block_number.is_some() && previous.last_block_number >= last_block_number {
                return Err(ChainError::Structural(format!(
                    "Snapshot at block {:?} does not follow snapshot at block {:?}",
                    last_block_number, previous.last_block_number
                )));
            }
        }

        debug!(?last_block_number, "Adding snapshot");
        self.snapshots.push(snapshot);
        Ok(())
    }

    fn closest_at_or_before(&self, at: AsOf) -> Result<Snapshot> {
        let found = match at {
            AsOf::Head => self.snapshots.last(),
            AsOf::BeforeFirstBlock => self.snapshots.iter().rev().find(|s| s.is_initial()),
            AsOf::Block(target) => self
                .snapshots
                .iter()
                .rev()
                .find(|s| s.last_block_number.map_or(true, |last| last <= target)),
        };

        found
            .cloned()
            .ok_or_else(|| ChainError::Inconsistent("Snapshot store is empty".to_string()))
    }

    fn first(&self) -> Result<Option<Snapshot>> {
        Ok(self.snapshots.first().cloned())
    }

    fn last(&self) -> Result<Option<Snapshot>> {
        Ok(self.snapshots.last().cloned())
    }

    fn reversed(&self) -> Result<Vec<Snapshot>> {
        Ok(self.snapshots.iter().rev().cloned().collect())
    }

    fn len(&self) -> Result<usize> {
        Ok(self.snapshots.len())
    }
}
