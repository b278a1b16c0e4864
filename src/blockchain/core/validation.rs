use std::collections::BTreeSet;
use tracing::{debug, warn};

use crate::error::{ChainError, Result};
use crate::transaction::{make_balance_lock, SignedChangeRequest};

use super::chain::{Block, Blockchain};
use super::resolver::AsOf;
use super::state::AccountState;
use super::store::{BlockStore, SnapshotStore};

/// Validates a single block against the chain state right before it.
///
/// Checks run in a fixed order and the first failure is returned; nothing
/// is collected or repaired.
pub struct BlockValidator<'a, B, S> {
    chain: &'a Blockchain<B, S>,
}

impl<'a, B: BlockStore, S: SnapshotStore> BlockValidator<'a, B, S> {
    pub fn new(chain: &'a Blockchain<B, S>) -> Self {
        Self { chain }
    }

    pub fn validate(&self, block: &Block) -> Result<()> {
        debug!(block_number = block.block_number, "Validating block");

        let result = self
            .validate_signed_change_request(block)
            .and_then(|_| self.validate_block_number(block))
            .and_then(|_| self.validate_timestamp(block))
            .and_then(|_| self.validate_block_identifier(block))
            .and_then(|_| self.validate_updated_account_states(block));

        if let Err(e) = &result {
            warn!(block_number = block.block_number, kind = ?e.kind(), "Block rejected: {}", e);
        }
        result
    }

    fn validate_signed_change_request(&self, block: &Block) -> Result<()> {
        block
            .signed_change_request
            .validate(self.chain, block.block_number)
    }

    /// Block numbers are unsigned by type; what remains is that the block's
    /// predecessor must already be part of the chain.
    fn validate_block_number(&self, block: &Block) -> Result<()> {
        let next_block_number = self.chain.next_block_number()?;
        if block.block_number > next_block_number {
            return Err(ChainError::Linkage(format!(
                "Block {} has no predecessor in the chain (next block number is {})",
                block.block_number, next_block_number
            )));
        }
        Ok(())
    }

    fn validate_timestamp(&self, block: &Block) -> Result<()> {
        if block.block_number == 0 {
            return Ok(());
        }

        let min_timestamp = match self.chain.retained_predecessor(block.block_number)? {
            Some(previous) => previous.timestamp,
            None => {
                let snapshot = self.chain.base_snapshot(block.block_number)?;
                snapshot.last_block_timestamp.ok_or_else(|| {
                    ChainError::Inconsistent(format!(
                        "Base snapshot for block {} has no last block timestamp",
                        block.block_number
                    ))
                })?
            }
        };

        if block.timestamp <= min_timestamp {
            return Err(ChainError::Linkage(format!(
                "Block {} timestamp {} must be later than {}",
                block.block_number, block.timestamp, min_timestamp
            )));
        }
        Ok(())
    }

    fn validate_block_identifier(&self, block: &Block) -> Result<()> {
        let expected = self.chain.expected_block_identifier(block.block_number)?;
        if block.block_identifier != expected {
            return Err(ChainError::Linkage(format!(
                "Invalid block identifier for block {}: expected {}, got {}",
                block.block_number, expected, block.block_identifier
            )));
        }
        Ok(())
    }

    fn validate_updated_account_states(&self, block: &Block) -> Result<()> {
        let states = &block.updated_account_states;
        if states.is_empty() {
            return Err(ChainError::Structural(
                "Block updated_account_states must not be empty".to_string(),
            ));
        }

        let request = &block.signed_change_request;
        let signer = request.signer();
        match request {
            SignedChangeRequest::CoinTransfer(_) => {
                if states.len() < 2 {
                    return Err(ChainError::Structural(format!(
                        "Coin transfer block must update at least 2 accounts, got {}",
                        states.len()
                    )));
                }
                if !states.contains_key(signer) {
                    return Err(ChainError::Structural(format!(
                        "Block updated_account_states must include signer {}",
                        signer
                    )));
                }
            }
        }

        let recipients: BTreeSet<&str> = request.recipients();
        for (account, state) in states {
            self.validate_account(block, account, state, &recipients)?;
        }

        if let Some(missing) = recipients.iter().find(|r| !states.contains_key(**r)) {
            return Err(ChainError::Conservation(format!(
                "Recipient {} is credited by the request but missing from the block",
                missing
            )));
        }
        Ok(())
    }

    fn validate_account(
        &self,
        block: &Block,
        account: &str,
        state: &AccountState,
        recipients: &BTreeSet<&str>,
    ) -> Result<()> {
        if account.is_empty() {
            return Err(ChainError::Structural(
                "Block updated_account_states key (account id) must not be empty".to_string(),
            ));
        }
        state.validate()?;

        let request = &block.signed_change_request;
        let is_signer = account == request.signer();
        if !is_signer && !recipients.contains(account) {
            return Err(ChainError::Structural(format!(
                "Account {} is neither the signer nor a recipient of the request",
                account
            )));
        }

        self.validate_account_lock(request, account, state, is_signer)?;
        self.validate_account_balance(block, account, state, is_signer)
    }

    fn validate_account_lock(
        &self,
        request: &SignedChangeRequest,
        account: &str,
        state: &AccountState,
        is_signer: bool,
    ) -> Result<()> {
        let expected = if is_signer {
            Some(make_balance_lock(request)?)
        } else {
            None
        };

        if state.lock != expected {
            return Err(ChainError::LockMismatch {
                account: account.to_string(),
                expected,
                actual: state.lock.clone(),
            });
        }
        Ok(())
    }

    fn validate_account_balance(
        &self,
        block: &Block,
        account: &str,
        state: &AccountState,
        is_signer: bool,
    ) -> Result<()> {
        let request = &block.signed_change_request;
        let prior = self
            .chain
            .account_balance(account, AsOf::before(block.block_number))?;

        let expected = if is_signer {
            let sent = request.sent_amount()?;
            if prior == 0 {
                return Err(ChainError::InsufficientBalance {
                    account: account.to_string(),
                    balance: prior,
                    required: sent,
                });
            }
            prior
                .checked_sub(sent)
                .ok_or_else(|| ChainError::InsufficientBalance {
                    account: account.to_string(),
                    balance: prior,
                    required: sent,
                })?
        } else {
            prior
                .checked_add(request.recipient_amount(account)?)
                .ok_or_else(|| {
                    ChainError::Conservation(format!("Balance of account {} overflows", account))
                })?
        };

        if state.value != expected {
            return Err(ChainError::BalanceMismatch {
                account: account.to_string(),
                expected,
                actual: state.value,
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::blockchain::{MemoryBlockStore, MemorySnapshotStore, Snapshot};
    use crate::crypto::KeyPair;
    use crate::error::ErrorKind;
    use crate::transaction::CoinTransferTransaction;
    use chrono::{Duration, NaiveDate, NaiveDateTime};
    use std::collections::BTreeMap;

    struct Fixture {
        chain: Blockchain,
        alice: KeyPair,
        bob: KeyPair,
        carol: KeyPair,
    }

    fn timestamp(seconds: i64) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2021, 3, 1)
            .unwrap()
            .and_hms_opt(0, 0, 0)
            .unwrap()
            + Duration::seconds(seconds)
    }

    fn fixture() -> Fixture {
        let alice = KeyPair::from_secret_bytes(&[21u8; 32]).unwrap();
        let bob = KeyPair::from_secret_bytes(&[22u8; 32]).unwrap();
        let carol = KeyPair::from_secret_bytes(&[23u8; 32]).unwrap();
        let mut balances = BTreeMap::new();
        balances.insert(alice.account_id(), AccountState::new(100, Some("L0".to_string())));
        balances.insert(carol.account_id(), AccountState::new(0, Some("C0".to_string())));
        let chain = Blockchain::new(Snapshot::genesis(balances, Some("seed".to_string()))).unwrap();
        Fixture {
            chain,
            alice,
            bob,
            carol,
        }
    }

    fn candidate(f: &Fixture, signer: &KeyPair, txs: Vec<CoinTransferTransaction>, at: i64) -> Block {
        let lock = f
            .chain
            .expected_balance_lock(&signer.account_id(), AsOf::Head)
            .unwrap();
        let request = SignedChangeRequest::coin_transfer(signer, lock, txs).unwrap();
        Block::from_signed_change_request(&f.chain, request, timestamp(at)).unwrap()
    }

    fn pay(f: &Fixture, amount: u64) -> Block {
        candidate(
            f,
            &f.alice,
            vec![CoinTransferTransaction::new(f.bob.account_id(), amount)],
            0,
        )
    }

    fn validate(f: &Fixture, block: &Block) -> Result<()> {
        BlockValidator::new(&f.chain).validate(block)
    }

    #[test]
    fn test_valid_block_passes() {
        let f = fixture();
        assert!(validate(&f, &pay(&f, 30)).is_ok());
    }

    #[test]
    fn test_tampered_identifier_is_linkage_error() {
        let f = fixture();
        let mut block = pay(&f, 30);
        block.block_identifier = "00".repeat(32);
        assert_eq!(validate(&f, &block).unwrap_err().kind(), ErrorKind::CannotLink);
    }

    #[test]
    fn test_block_beyond_next_number_is_rejected() {
        let f = fixture();
        let mut block = pay(&f, 30);
        block.block_number = 2;

        let validator = BlockValidator::new(&f.chain);
        let err = validator.validate_block_number(&block).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::CannotLink);

        let err = validate(&f, &block).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::CannotLink);
        assert!(matches!(err, ChainError::Linkage(_)));
    }

    #[test]
    fn test_far_future_block_on_empty_chain_cannot_link() {
        let f = fixture();
        let mut block = pay(&f, 30);
        block.block_number = 5;

        let err = validate(&f, &block).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::CannotLink);
        assert!(err.to_string().contains("next block number is 0"));
    }

    #[test]
    fn test_timestamp_must_increase() {
        let mut f = fixture();
        let first = pay(&f, 10);
        f.chain.add_block(first.clone()).unwrap();

        let mut second = pay(&f, 10);
        second.timestamp = first.timestamp;
        let err = validate(&f, &second).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::CannotLink);
        assert!(err.to_string().contains("timestamp"));

        second.timestamp = first.timestamp + Duration::milliseconds(1);
        assert!(validate(&f, &second).is_ok());
    }

    #[test]
    fn test_timestamp_after_snapshot_without_retained_blocks() {
        let alice = KeyPair::from_secret_bytes(&[21u8; 32]).unwrap();
        let bob = KeyPair::from_secret_bytes(&[22u8; 32]).unwrap();
        let mut balances = BTreeMap::new();
        balances.insert(alice.account_id(), AccountState::new(100, Some("L0".to_string())));
        let mut snapshots = MemorySnapshotStore::new(Snapshot::genesis(balances, None)).unwrap();

        let closed_at = timestamp(11);
        let mut balances = BTreeMap::new();
        balances.insert(alice.account_id(), AccountState::new(80, Some("L1".to_string())));
        snapshots
            .add(Snapshot {
                last_block_number: Some(1),
                last_block_identifier: Some("b1".to_string()),
                last_block_timestamp: Some(closed_at),
                next_block_identifier: Some("n1".to_string()),
                balances,
            })
            .unwrap();
        let chain = Blockchain::from_stores(MemoryBlockStore::new(), snapshots).unwrap();

        let request = SignedChangeRequest::coin_transfer(
            &alice,
            "L1".to_string(),
            vec![CoinTransferTransaction::new(bob.account_id(), 5)],
        )
        .unwrap();
        let mut block = Block::from_signed_change_request(&chain, request, closed_at).unwrap();
        assert_eq!(block.block_number, 2);
        assert_eq!(block.block_identifier, "n1");

        let validator = BlockValidator::new(&chain);
        let err = validator.validate(&block).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::CannotLink);
        assert!(err.to_string().contains("must be later than"));

        block.timestamp = closed_at + Duration::milliseconds(1);
        assert!(validator.validate(&block).is_ok());
    }

    #[test]
    fn test_declared_signer_balance_mismatch() {
        let f = fixture();
        let mut block = pay(&f, 30);
        block
            .updated_account_states
            .get_mut(&f.alice.account_id())
            .unwrap()
            .value = 100;

        let err = validate(&f, &block).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ValueMismatch);
        assert_eq!(err.account(), Some(f.alice.account_id().as_str()));
        assert!(matches!(err, ChainError::BalanceMismatch { expected: 70, actual: 100, .. }));
    }

    #[test]
    fn test_recipient_balance_mismatch() {
        let f = fixture();
        let mut block = pay(&f, 30);
        block
            .updated_account_states
            .get_mut(&f.bob.account_id())
            .unwrap()
            .value = 31;
        let err = validate(&f, &block).unwrap_err();
        assert_eq!(err.account(), Some(f.bob.account_id().as_str()));
    }

    #[test]
    fn test_lock_rules() {
        let f = fixture();

        let mut block = pay(&f, 30);
        block
            .updated_account_states
            .get_mut(&f.bob.account_id())
            .unwrap()
            .lock = Some("stolen".to_string());
        assert!(matches!(validate(&f, &block), Err(ChainError::LockMismatch { .. })));

        let mut block = pay(&f, 30);
        block
            .updated_account_states
            .get_mut(&f.alice.account_id())
            .unwrap()
            .lock = Some("L0".to_string());
        assert!(matches!(validate(&f, &block), Err(ChainError::LockMismatch { .. })));

        let mut block = pay(&f, 30);
        block
            .updated_account_states
            .get_mut(&f.alice.account_id())
            .unwrap()
            .lock = None;
        assert!(matches!(validate(&f, &block), Err(ChainError::LockMismatch { .. })));
    }

    #[test]
    fn test_shape_rules() {
        let f = fixture();

        let mut block = pay(&f, 30);
        block.updated_account_states.clear();
        assert_eq!(validate(&f, &block).unwrap_err().kind(), ErrorKind::Malformed);

        let mut block = pay(&f, 30);
        block.updated_account_states.remove(&f.bob.account_id());
        assert_eq!(validate(&f, &block).unwrap_err().kind(), ErrorKind::Malformed);

        let mut block = pay(&f, 30);
        block.updated_account_states.remove(&f.alice.account_id());
        block
            .updated_account_states
            .insert(f.carol.account_id(), AccountState::unlocked(0));
        let err = validate(&f, &block).unwrap_err();
        assert!(err.to_string().contains("must include signer"));
    }

    #[test]
    fn test_unrelated_account_is_rejected() {
        let f = fixture();
        let mut block = pay(&f, 30);
        block
            .updated_account_states
            .insert(f.carol.account_id(), AccountState::unlocked(0));
        assert_eq!(validate(&f, &block).unwrap_err().kind(), ErrorKind::Malformed);
    }

    #[test]
    fn test_missing_recipient_breaks_conservation() {
        let f = fixture();
        let mut block = candidate(
            &f,
            &f.alice,
            vec![
                CoinTransferTransaction::new(f.bob.account_id(), 10),
                CoinTransferTransaction::new(f.carol.account_id(), 5),
            ],
            0,
        );
        block.updated_account_states.remove(&f.carol.account_id());
        let err = validate(&f, &block).unwrap_err();
        assert!(matches!(err, ChainError::Conservation(_)));
    }

    #[test]
    fn test_zero_balance_signer_is_rejected() {
        let f = fixture();
        let lock = f
            .chain
            .expected_balance_lock(&f.carol.account_id(), AsOf::Head)
            .unwrap();
        let request = SignedChangeRequest::coin_transfer(
            &f.carol,
            lock,
            vec![CoinTransferTransaction::new(f.bob.account_id(), 1)],
        )
        .unwrap();
        let mut states = BTreeMap::new();
        states.insert(
            f.carol.account_id(),
            AccountState::new(0, Some(make_balance_lock(&request).unwrap())),
        );
        states.insert(f.bob.account_id(), AccountState::unlocked(1));
        let block = Block {
            block_number: 0,
            block_identifier: f.chain.expected_block_identifier(0).unwrap(),
            timestamp: timestamp(0),
            signed_change_request: request,
            updated_account_states: states,
        };

        let err = validate(&f, &block).unwrap_err();
        assert!(matches!(err, ChainError::InsufficientBalance { balance: 0, .. }));
    }
}
