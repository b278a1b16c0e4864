use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::encoding;
use crate::error::{ChainError, Result};
use crate::transaction::{AccountId, BalanceLock};

use super::chain::{BlockIdentifier, BlockNumber};

/// Balance value and lock of one account.
///
/// The lock is only present for the account that signed the block's request
/// (or, in a snapshot, for any account with a known lock). It is omitted from
/// the encoding when absent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountState {
    pub value: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lock: Option<BalanceLock>,
}

impl AccountState {
    pub fn new(value: u64, lock: Option<BalanceLock>) -> Self {
        Self { value, lock }
    }

    /// A recipient entry: new value, no lock.
    pub fn unlocked(value: u64) -> Self {
        Self { value, lock: None }
    }

    pub fn validate(&self) -> Result<()> {
        if let Some(lock) = &self.lock {
            if lock.is_empty() {
                return Err(ChainError::Structural(
                    "Account state lock must be absent or non-empty".to_string(),
                ));
            }
        }
        Ok(())
    }
}

/// Full point-in-time record of every tracked account ("account root file").
///
/// The genesis snapshot has no last block number or timestamp. Every later
/// snapshot closes over block `last_block_number` and records the message
/// hash of that block as `next_block_identifier`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Snapshot {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_block_number: Option<BlockNumber>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_block_identifier: Option<BlockIdentifier>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_block_timestamp: Option<NaiveDateTime>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub next_block_identifier: Option<BlockIdentifier>,
    pub balances: BTreeMap<AccountId, AccountState>,
}

impl Snapshot {
    pub fn genesis(balances: BTreeMap<AccountId, AccountState>, seed: Option<BlockIdentifier>) -> Self {
        Self {
            last_block_number: None,
            last_block_identifier: seed,
            last_block_timestamp: None,
            next_block_identifier: None,
            balances,
        }
    }

    pub fn is_initial(&self) -> bool {
        self.last_block_number.is_none()
    }

    pub fn balance(&self, account: &str) -> Option<&AccountState> {
        self.balances.get(account)
    }

    /// Snapshot value for `account`, zero if the account is unseen.
    pub fn balance_value(&self, account: &str) -> u64 {
        self.balances.get(account).map_or(0, |state| state.value)
    }

    pub fn balance_lock(&self, account: &str) -> Option<BalanceLock> {
        self.balances.get(account).and_then(|state| state.lock.clone())
    }

    /// Whether this snapshot may stand in for the chain state before block `block_number`.
    pub fn covers_predecessor_of(&self, block_number: BlockNumber) -> bool {
        match self.last_block_number {
            None => block_number == 0,
            Some(last) => last.checked_add(1) == Some(block_number),
        }
    }

    /// Identifier the first block after this snapshot must carry.
    pub fn next_block_identifier(&self) -> Result<BlockIdentifier> {
        if self.is_initial() {
            return encoding::hash_hex(self);
        }
        self.next_block_identifier.clone().ok_or_else(|| {
            ChainError::Structural(format!(
                "Snapshot at block {:?} has no next block identifier",
                self.last_block_number
            ))
        })
    }

    pub fn validate(&self, is_initial: bool) -> Result<()> {
        if is_initial {
            if !self.is_initial() {
                return Err(ChainError::Structural(
                    "First snapshot must be the genesis snapshot".to_string(),
                ));
            }
            if self.last_block_timestamp.is_some() {
                return Err(ChainError::Structural(
                    "Genesis snapshot must not have a last block timestamp".to_string(),
                ));
            }
        } else {
            if self.is_initial() {
                return Err(ChainError::Structural(
                    "Only the first snapshot may be a genesis snapshot".to_string(),
                ));
            }
            if self.last_block_identifier.as_deref().map_or(true, str::is_empty) {
                return Err(ChainError::Structural(
                    "Snapshot last block identifier must be set".to_string(),
                ));
            }
            if self.last_block_timestamp.is_none() {
                return Err(ChainError::Structural(
                    "Snapshot last block timestamp must be set".to_string(),
                ));
            }
            if self.next_block_identifier.as_deref().map_or(true, str::is_empty) {
                return Err(ChainError::Structural(
                    "Snapshot next block identifier must be set".to_string(),
                ));
            }
        }

        for (account, state) in &self.balances {
            if account.is_empty() {
                return Err(ChainError::Structural(
                    "Snapshot account id must not be empty".to_string(),
                ));
            }
            state.validate()?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn genesis() -> Snapshot {
        let mut balances = BTreeMap::new();
        balances.insert("aa".to_string(), AccountState::new(100, Some("L0".to_string())));
        Snapshot::genesis(balances, Some("seed".to_string()))
    }

    #[test]
    fn test_absent_lock_is_omitted_from_encoding() {
        let bytes = encoding::canonical_bytes(&AccountState::unlocked(5)).unwrap();
        assert_eq!(bytes, br#"{"value":5}"#.to_vec());

        let decoded: AccountState = serde_json::from_str(r#"{"value":5}"#).unwrap();
        assert_eq!(decoded.lock, None);
    }

    #[test]
    fn test_empty_lock_is_malformed() {
        assert!(AccountState::new(1, Some(String::new())).validate().is_err());
        assert!(AccountState::new(1, Some("x".into())).validate().is_ok());
    }

    #[test]
    fn test_genesis_identifier_is_seed_hash() {
        let snapshot = genesis();
        assert!(snapshot.is_initial());
        assert_eq!(
            snapshot.next_block_identifier().unwrap(),
            encoding::hash_hex(&snapshot).unwrap()
        );
        assert!(snapshot.covers_predecessor_of(0));
        assert!(!snapshot.covers_predecessor_of(1));
    }

    #[test]
    fn test_unseen_account_defaults() {
        let snapshot = genesis();
        assert_eq!(snapshot.balance_value("zz"), 0);
        assert_eq!(snapshot.balance_lock("zz"), None);
        assert_eq!(snapshot.balance_lock("aa"), Some("L0".to_string()));
    }

    #[test]
    fn test_non_genesis_snapshot_requires_linkage_fields() {
        let mut snapshot = genesis();
        snapshot.last_block_number = Some(4);
        assert!(snapshot.validate(false).is_err());

        snapshot.last_block_timestamp = Some(
            NaiveDate::from_ymd_opt(2021, 1, 1)
                .unwrap()
                .and_hms_opt(0, 0, 0)
                .unwrap(),
        );
        snapshot.next_block_identifier = Some("next".to_string());
        assert!(snapshot.validate(false).is_ok());
        assert!(snapshot.validate(true).is_err());
        assert!(snapshot.covers_predecessor_of(5));
        assert_eq!(snapshot.next_block_identifier().unwrap(), "next");
    }
}
