//! Balance and lock resolution
//!
//! An account's state at any point is reconstructed by walking retained
//! blocks backward from the target down to (but excluding) the last block
//! of the closest snapshot, and falling back to that snapshot.

use crate::error::{ChainError, Result};
use crate::transaction::BalanceLock;

use super::chain::{Block, BlockNumber};
use super::state::Snapshot;
use super::store::{BlockStore, SnapshotStore};

/// Point in the chain at which state is resolved.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AsOf {
    /// After the newest block (or newest snapshot when no blocks exist).
    Head,
    /// Before block 0: the pure genesis value.
    BeforeFirstBlock,
    /// Right after block `n` is applied.
    Block(BlockNumber),
}

impl AsOf {
    /// The point immediately before `block_number` is applied.
    pub fn before(block_number: BlockNumber) -> Self {
        match block_number.checked_sub(1) {
            Some(previous) => AsOf::Block(previous),
            None => AsOf::BeforeFirstBlock,
        }
    }
}

pub struct BalanceResolver<'a, B, S> {
    blocks: &'a B,
    snapshots: &'a S,
}

impl<'a, B: BlockStore, S: SnapshotStore> BalanceResolver<'a, B, S> {
    pub fn new(blocks: &'a B, snapshots: &'a S) -> Self {
        Self { blocks, snapshots }
    }

    pub fn head_point(&self) -> Result<Option<BlockNumber>> {
        if let Some(head) = self.blocks.head()? {
            return Ok(Some(head.block_number));
        }
        Ok(self.snapshots.last()?.and_then(|snapshot| snapshot.last_block_number))
    }

    /// Value of `account` at `at`; zero for accounts the chain has never seen.
    pub fn resolve_balance(&self, account: &str, at: AsOf) -> Result<u64> {
        let (snapshot, found) = self.scan(at, |block| block.account_state(account).map(|state| state.value))?;
        Ok(found.unwrap_or_else(|| snapshot.balance_value(account)))
    }

    /// Current lock of `account`.
    pub fn resolve_lock(&self, account: &str) -> Result<Option<BalanceLock>> {
        self.resolve_lock_at(account, AsOf::Head)
    }

    /// Lock of `account` at `at`. Recipient entries carry no lock, so the
    /// scan skips them and finds the newest block the account signed.
    pub fn resolve_lock_at(&self, account: &str, at: AsOf) -> Result<Option<BalanceLock>> {
        let (snapshot, found) =
            self.scan(at, |block| block.account_state(account).and_then(|state| state.lock.clone()))?;
        Ok(found.or_else(|| snapshot.balance_lock(account)))
    }

    /// Walks the blocks between `at` and its base snapshot, newest first,
    /// stopping at the first block for which `pick` yields a value.
    fn scan<T, F>(&self, at: AsOf, mut pick: F) -> Result<(Snapshot, Option<T>)>
    where
        F: FnMut(&Block) -> Option<T>,
    {
        let target = self.target_block_number(at)?;
        let snapshot = self.snapshots.closest_at_or_before(at)?;

        let target = match target {
            Some(target) => target,
            None => return Ok((snapshot, None)),
        };
        let lowest = match snapshot.last_block_number {
            Some(last) => last + 1,
            None => 0,
        };

        for block_number in (lowest..=target).rev() {
            let block = self.blocks.by_number(block_number)?.ok_or_else(|| {
                ChainError::Inconsistent(format!("Block {} is missing below the head", block_number))
            })?;
            if let Some(value) = pick(&block) {
                return Ok((snapshot, Some(value)));
            }
        }

        Ok((snapshot, None))
    }

    /// Concrete last block for `at`, `None` meaning "before block 0".
    fn target_block_number(&self, at: AsOf) -> Result<Option<BlockNumber>> {
        let head = self.head_point()?;
        match at {
            AsOf::Head => Ok(head),
            AsOf::BeforeFirstBlock => Ok(None),
            AsOf::Block(requested) => match head {
                Some(head) if requested <= head => Ok(Some(requested)),
                _ => Err(ChainError::FutureBlock { requested, head }),
            },
        }
    }
}
