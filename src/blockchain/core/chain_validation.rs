use tracing::{debug, info};

use crate::error::{ChainError, Result};

use super::chain::{BlockNumber, Blockchain};
use super::state::Snapshot;
use super::store::{BlockStore, SnapshotStore};
use super::validation::BlockValidator;

/// Which retained blocks to validate, by store position.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ValidationWindow {
    pub offset: usize,
    pub limit: Option<usize>,
}

impl ValidationWindow {
    pub fn all() -> Self {
        Self::default()
    }

    pub fn new(offset: usize, limit: Option<usize>) -> Self {
        Self { offset, limit }
    }
}

/// Validates snapshots and a window of blocks of one chain.
pub struct ChainValidator<'a, B, S> {
    chain: &'a Blockchain<B, S>,
}

impl<'a, B: BlockStore, S: SnapshotStore> ChainValidator<'a, B, S> {
    pub fn new(chain: &'a Blockchain<B, S>) -> Self {
        Self { chain }
    }

    /// Returns the number of blocks validated.
    pub fn validate(&self, window: ValidationWindow) -> Result<usize> {
        let snapshots = self.validate_snapshots()?;
        let validated = self.validate_blocks(&snapshots, window)?;
        info!(validated, snapshots = snapshots.len(), "Blockchain is valid");
        Ok(validated)
    }

    /// Returns the snapshots oldest first.
    fn validate_snapshots(&self) -> Result<Vec<Snapshot>> {
        let mut snapshots = self.chain.snapshots().reversed()?;
        snapshots.reverse();

        let (genesis, rest) = snapshots.split_first().ok_or_else(|| {
            ChainError::Inconsistent("Blockchain must contain at least one snapshot".to_string())
        })?;
        genesis.validate(true)?;

        let mut previous: Option<BlockNumber> = None;
        for snapshot in rest {
            snapshot.validate(false)?;
            let last_block_number = snapshot.last_block_number;
            if previous.is_some() && last_block_number <= previous {
                return Err(ChainError::Structural(format!(
                    "Snapshots are out of order: block {:?} after block {:?}",
                    last_block_number, previous
                )));
            }
            previous = last_block_number;
            self.validate_snapshot_against_blocks(snapshot)?;
        }

        Ok(snapshots)
    }

    /// A snapshot whose last block is still retained must agree with it.
    fn validate_snapshot_against_blocks(&self, snapshot: &Snapshot) -> Result<()> {
        let last_block_number = match snapshot.last_block_number {
            Some(n) => n,
            None => return Ok(()),
        };

        let block = match self.chain.blocks().by_number(last_block_number) {
            Ok(Some(block)) => block,
            Ok(None) => {
                if self.chain.blocks().is_empty()? {
                    // Chain bootstrapped from this snapshot; nothing to compare.
                    return Ok(());
                }
                return Err(ChainError::Inconsistent(format!(
                    "Snapshot refers to block {} beyond the head",
                    last_block_number
                )));
            }
            Err(ChainError::HistoryGap { .. }) => return Ok(()),
            Err(e) => return Err(e),
        };

        if snapshot.last_block_identifier.as_deref() != Some(block.block_identifier.as_str()) {
            return Err(ChainError::Linkage(format!(
                "Snapshot at block {} records a different last block identifier",
                last_block_number
            )));
        }
        if snapshot.last_block_timestamp != Some(block.timestamp) {
            return Err(ChainError::Linkage(format!(
                "Snapshot at block {} records a different last block timestamp",
                last_block_number
            )));
        }
        if snapshot.next_block_identifier.as_deref() != Some(block.message_hash()?.as_str()) {
            return Err(ChainError::Linkage(format!(
                "Snapshot at block {} records a different next block identifier",
                last_block_number
            )));
        }
        Ok(())
    }

    fn validate_blocks(&self, snapshots: &[Snapshot], window: ValidationWindow) -> Result<usize> {
        let earliest = match self.chain.blocks().earliest_block_number()? {
            Some(earliest) => earliest,
            None => return Ok(0),
        };

        // The oldest retained block must start right after genesis or right
        // after some snapshot, otherwise nothing anchors it.
        let anchored = snapshots
            .iter()
            .any(|snapshot| snapshot.covers_predecessor_of(earliest));
        if !anchored {
            return Err(ChainError::Linkage(format!(
                "Earliest retained block {} is not anchored to any snapshot",
                earliest
            )));
        }

        let blocks = self.chain.blocks().range(window.offset, window.limit)?;
        let validator = BlockValidator::new(self.chain);
        let mut expected_number = earliest + window.offset as BlockNumber;

        for block in &blocks {
            if block.block_number != expected_number {
                return Err(ChainError::Linkage(format!(
                    "Block numbers are not sequential: expected {}, found {}",
                    expected_number, block.block_number
                )));
            }
            validator.validate(block)?;
            debug!(block_number = block.block_number, "Block is valid");
            expected_number += 1;
        }

        Ok(blocks.len())
    }
}
