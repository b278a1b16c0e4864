use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use tracing::{debug, info, warn};

use crate::encoding;
use crate::error::{ChainError, Result};
use crate::transaction::{AccountId, BalanceLock, SignedChangeRequest};

use super::chain_validation::{ChainValidator, ValidationWindow};
use super::resolver::{AsOf, BalanceResolver};
use super::state::{AccountState, Snapshot};
use super::store::{BlockStore, MemoryBlockStore, MemorySnapshotStore, SnapshotStore};
use super::validation::BlockValidator;

pub type BlockNumber = u64;

/// Hex hash linking a block to its predecessor (or to a snapshot).
pub type BlockIdentifier = String;

/// One validated unit of chain history.
///
/// `updated_account_states` only lists accounts touched by the block: the
/// signer (carrying its rotated lock) and the recipients (no lock).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Block {
    pub block_number: BlockNumber,
    pub block_identifier: BlockIdentifier,
    pub timestamp: NaiveDateTime,
    pub signed_change_request: SignedChangeRequest,
    pub updated_account_states: BTreeMap<AccountId, AccountState>,
}

impl Block {
    /// Builds the candidate block that would apply `request` on top of `chain`.
    pub fn from_signed_change_request<B: BlockStore, S: SnapshotStore>(
        chain: &Blockchain<B, S>,
        request: SignedChangeRequest,
        timestamp: NaiveDateTime,
    ) -> Result<Self> {
        if request.signer().is_empty() {
            return Err(ChainError::Structural("Signer must be set".to_string()));
        }

        let updated_account_states = request.compute_updated_account_states(chain)?;
        let block_number = chain.next_block_number()?;
        let block_identifier = chain.expected_block_identifier(block_number)?;

        Ok(Block {
            block_number,
            block_identifier,
            timestamp,
            signed_change_request: request,
            updated_account_states,
        })
    }

    /// Hash of the block message; the next block's identifier must equal it.
    pub fn message_hash(&self) -> Result<BlockIdentifier> {
        encoding::hash_hex(self)
    }

    pub fn account_state(&self, account: &str) -> Option<&AccountState> {
        self.updated_account_states.get(account)
    }
}

/// A chain instance: retained blocks plus the snapshots they build on.
///
/// All mutation (`append`, `add_block`, `add_snapshot`) must be serialized by
/// the caller; see [`SharedBlockchain`](crate::blockchain::shared::SharedBlockchain)
/// for a locked wrapper.
#[derive(Debug, Clone)]
pub struct Blockchain<B = MemoryBlockStore, S = MemorySnapshotStore> {
    blocks: B,
    snapshots: S,
}

impl Blockchain {
    /// In-memory chain seeded with a genesis snapshot.
    pub fn new(genesis: Snapshot) -> Result<Self> {
        let accounts = genesis.balances.len();
        let snapshots = MemorySnapshotStore::new(genesis)?;
        info!(accounts, "Created in-memory blockchain");
        Ok(Self {
            blocks: MemoryBlockStore::new(),
            snapshots,
        })
    }
}

impl<B: BlockStore, S: SnapshotStore> Blockchain<B, S> {
    pub fn from_stores(blocks: B, snapshots: S) -> Result<Self> {
        if snapshots.len()? == 0 {
            return Err(ChainError::Inconsistent(
                "Blockchain must contain at least one snapshot".to_string(),
            ));
        }
        Ok(Self { blocks, snapshots })
    }

    pub fn blocks(&self) -> &B {
        &self.blocks
    }

    pub fn snapshots(&self) -> &S {
        &self.snapshots
    }

    pub fn resolver(&self) -> BalanceResolver<'_, B, S> {
        BalanceResolver::new(&self.blocks, &self.snapshots)
    }

    pub fn head_block(&self) -> Result<Option<Block>> {
        self.blocks.head()
    }

    pub fn block_by_number(&self, block_number: BlockNumber) -> Result<Option<Block>> {
        self.blocks.by_number(block_number)
    }

    /// Number of the last block reflected in chain state: the head block, or
    /// the newest snapshot's last block when no blocks are retained.
    pub fn head_point(&self) -> Result<Option<BlockNumber>> {
        self.resolver().head_point()
    }

    pub fn next_block_number(&self) -> Result<BlockNumber> {
        Ok(match self.head_point()? {
            Some(head) => head + 1,
            None => 0,
        })
    }

    pub fn account_balance(&self, account: &str, at: AsOf) -> Result<u64> {
        self.resolver().resolve_balance(account, at)
    }

    pub fn account_lock(&self, account: &str) -> Result<Option<BalanceLock>> {
        self.resolver().resolve_lock(account)
    }

    /// Every account named by a snapshot or a retained block.
    pub fn known_accounts(&self) -> Result<BTreeSet<AccountId>> {
        let mut accounts: BTreeSet<AccountId> = BTreeSet::new();
        for snapshot in self.snapshots.reversed()? {
            accounts.extend(snapshot.balances.into_keys());
        }
        for block in self.blocks.range(0, None)? {
            accounts.extend(block.updated_account_states.into_keys());
        }
        Ok(accounts)
    }

    /// Lock a request signed by `account` must quote to be included right
    /// after `at`. An account that never had a lock uses its own id.
    pub fn expected_balance_lock(&self, account: &str, at: AsOf) -> Result<BalanceLock> {
        Ok(self
            .resolver()
            .resolve_lock_at(account, at)?
            .unwrap_or_else(|| account.to_string()))
    }

    /// Snapshot standing in for the state right before `block_number`.
    pub fn base_snapshot(&self, block_number: BlockNumber) -> Result<Snapshot> {
        let snapshot = self.snapshots.closest_at_or_before(AsOf::before(block_number))?;
        if !snapshot.covers_predecessor_of(block_number) {
            return Err(ChainError::Inconsistent(format!(
                "Neither a block nor a snapshot covers the predecessor of block {}",
                block_number
            )));
        }
        Ok(snapshot)
    }

    /// Block `block_number - 1` if it is retained.
    pub fn retained_predecessor(&self, block_number: BlockNumber) -> Result<Option<Block>> {
        if block_number == 0 {
            return Ok(None);
        }
        match self.blocks.by_number(block_number - 1) {
            Ok(block) => Ok(block),
            Err(ChainError::HistoryGap { .. }) => {
                debug!(block_number, "Partial blockchain detected");
                Ok(None)
            }
            Err(e) => Err(e),
        }
    }

    /// Identifier block `block_number` must carry: the message hash of its
    /// predecessor, or the base snapshot's next identifier after a snapshot.
    pub fn expected_block_identifier(&self, block_number: BlockNumber) -> Result<BlockIdentifier> {
        match self.retained_predecessor(block_number)? {
            Some(previous) => previous.message_hash(),
            None => self.base_snapshot(block_number)?.next_block_identifier(),
        }
    }

    /// Stores `block` as-is. Use [`add_block`](Self::add_block) for untrusted input.
    pub fn append(&mut self, block: Block) -> Result<()> {
        self.blocks.append(block)
    }

    /// Validates `block` as the next block and appends it.
    pub fn add_block(&mut self, block: Block) -> Result<()> {
        let next_block_number = self.next_block_number()?;
        if block.block_number != next_block_number {
            warn!(
                block_number = block.block_number,
                next_block_number, "Block rejected: out of order"
            );
            return Err(ChainError::Linkage(format!(
                "Expected block number {}, got {}",
                next_block_number, block.block_number
            )));
        }

        BlockValidator::new(self).validate(&block)?;

        info!(
            block_number = block.block_number,
            block_identifier = %block.block_identifier,
            "Appending validated block"
        );
        self.append(block)
    }

    pub fn add_block_from_signed_change_request(
        &mut self,
        request: SignedChangeRequest,
        timestamp: NaiveDateTime,
    ) -> Result<Block> {
        let block = Block::from_signed_change_request(self, request, timestamp)?;
        self.add_block(block.clone())?;
        Ok(block)
    }

    /// Adds a snapshot produced by compaction.
    pub fn add_snapshot(&mut self, snapshot: Snapshot) -> Result<()> {
        self.snapshots.add(snapshot)
    }

    pub fn validate(&self, window: ValidationWindow) -> Result<usize> {
        ChainValidator::new(self).validate(window)
    }
}
