//! Thread-safe handle to one chain instance
//!
//! The chain performs no locking of its own. This wrapper is the mutual
//! exclusion boundary: writers (validate + append, snapshot insertion) hold
//! the write lock for the whole operation, so readers never observe a
//! half-applied block.

use chrono::NaiveDateTime;
use parking_lot::RwLock;
use std::sync::Arc;

use crate::error::Result;
use crate::transaction::{BalanceLock, SignedChangeRequest};

use super::core::{
    AsOf, Block, BlockNumber, BlockStore, Blockchain, MemoryBlockStore, MemorySnapshotStore,
    Snapshot, SnapshotStore, ValidationWindow,
};

pub struct SharedBlockchain<B = MemoryBlockStore, S = MemorySnapshotStore> {
    inner: Arc<RwLock<Blockchain<B, S>>>,
}

impl<B, S> Clone for SharedBlockchain<B, S> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<B: BlockStore, S: SnapshotStore> SharedBlockchain<B, S> {
    pub fn new(chain: Blockchain<B, S>) -> Self {
        Self {
            inner: Arc::new(RwLock::new(chain)),
        }
    }

    /// Runs `f` under the read lock.
    pub fn read<T>(&self, f: impl FnOnce(&Blockchain<B, S>) -> T) -> T {
        f(&self.inner.read())
    }

    pub fn add_block(&self, block: Block) -> Result<()> {
        self.inner.write().add_block(block)
    }

    pub fn add_block_from_signed_change_request(
        &self,
        request: SignedChangeRequest,
        timestamp: NaiveDateTime,
    ) -> Result<Block> {
        self.inner
            .write()
            .add_block_from_signed_change_request(request, timestamp)
    }

    pub fn add_snapshot(&self, snapshot: Snapshot) -> Result<()> {
        self.inner.write().add_snapshot(snapshot)
    }

    pub fn account_balance(&self, account: &str, at: AsOf) -> Result<u64> {
        self.inner.read().account_balance(account, at)
    }

    pub fn account_lock(&self, account: &str) -> Result<Option<BalanceLock>> {
        self.inner.read().account_lock(account)
    }

    pub fn head_block(&self) -> Result<Option<Block>> {
        self.inner.read().head_block()
    }

    pub fn next_block_number(&self) -> Result<BlockNumber> {
        self.inner.read().next_block_number()
    }

    pub fn validate(&self, window: ValidationWindow) -> Result<usize> {
        self.inner.read().validate(window)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::blockchain::AccountState;
    use crate::crypto::KeyPair;
    use crate::transaction::CoinTransferTransaction;
    use chrono::{Duration, NaiveDate};
    use std::collections::BTreeMap;
    use std::thread;

    #[test]
    fn test_concurrent_readers_with_single_writer() {
        let alice = KeyPair::from_secret_bytes(&[41u8; 32]).unwrap();
        let bob = KeyPair::from_secret_bytes(&[42u8; 32]).unwrap();
        let mut balances = BTreeMap::new();
        balances.insert(alice.account_id(), AccountState::new(50, Some("L0".to_string())));
        let shared = SharedBlockchain::new(
            Blockchain::new(Snapshot::genesis(balances, None)).unwrap(),
        );
        let start = NaiveDate::from_ymd_opt(2021, 5, 1)
            .unwrap()
            .and_hms_opt(0, 0, 0)
            .unwrap();

        let writer = {
            let shared = shared.clone();
            let alice = alice.clone();
            let bob_account = bob.account_id();
            thread::spawn(move || {
                for i in 0..5 {
                    let lock = shared
                        .read(|chain| chain.expected_balance_lock(&alice.account_id(), AsOf::Head))
                        .unwrap();
                    let request = SignedChangeRequest::coin_transfer(
                        &alice,
                        lock,
                        vec![CoinTransferTransaction::new(bob_account.clone(), 1)],
                    )
                    .unwrap();
                    shared
                        .add_block_from_signed_change_request(request, start + Duration::seconds(i))
                        .unwrap();
                }
            })
        };

        let readers: Vec<_> = (0..4)
            .map(|_| {
                let shared = shared.clone();
                let alice = alice.account_id();
                let bob = bob.account_id();
                thread::spawn(move || {
                    for _ in 0..50 {
                        // Every observed state must conserve the total supply.
                        let total = shared.read(|chain| {
                            chain.account_balance(&alice, AsOf::Head).unwrap()
                                + chain.account_balance(&bob, AsOf::Head).unwrap()
                        });
                        assert_eq!(total, 50);
                    }
                })
            })
            .collect();

        writer.join().unwrap();
        for reader in readers {
            reader.join().unwrap();
        }

        assert_eq!(shared.next_block_number().unwrap(), 5);
        assert_eq!(shared.account_balance(&bob.account_id(), AsOf::Head).unwrap(), 5);
        assert_eq!(shared.validate(ValidationWindow::all()).unwrap(), 5);
    }
}
