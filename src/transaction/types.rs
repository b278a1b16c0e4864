/// Signed change request types
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

use crate::crypto::KeyPair;
use crate::encoding;
use crate::error::{ChainError, Result};

/// Hex-encoded compressed public key of an account owner.
pub type AccountId = String;

/// Rotating replay-protection token of an account.
pub type BalanceLock = String;

/// Maximum memo length in characters
pub const MAX_MEMO_LENGTH: usize = 64;

/// A request that can be applied in a block. New kinds of change are added
/// as new variants.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SignedChangeRequest {
    CoinTransfer(CoinTransferSignedChangeRequest),
}

impl SignedChangeRequest {
    /// Builds and signs a coin transfer quoting `balance_lock`.
    pub fn coin_transfer(
        keypair: &KeyPair,
        balance_lock: BalanceLock,
        txs: Vec<CoinTransferTransaction>,
    ) -> Result<Self> {
        let message = CoinTransferMessage { balance_lock, txs };
        Ok(SignedChangeRequest::CoinTransfer(
            CoinTransferSignedChangeRequest::sign(keypair, message)?,
        ))
    }

    pub fn signer(&self) -> &str {
        match self {
            SignedChangeRequest::CoinTransfer(request) => &request.signer,
        }
    }

    /// Total value debited from the signer.
    pub fn sent_amount(&self) -> Result<u64> {
        match self {
            SignedChangeRequest::CoinTransfer(request) => request.message.sent_amount(),
        }
    }

    /// Total value credited to `account` (zero if it is not a recipient).
    pub fn recipient_amount(&self, account: &str) -> Result<u64> {
        match self {
            SignedChangeRequest::CoinTransfer(request) => request.message.recipient_amount(account),
        }
    }

    pub fn recipients(&self) -> BTreeSet<&str> {
        match self {
            SignedChangeRequest::CoinTransfer(request) => request
                .message
                .txs
                .iter()
                .map(|tx| tx.recipient.as_str())
                .collect(),
        }
    }

    /// The lock quoted by the request, i.e. the lock it consumes.
    pub fn balance_lock(&self) -> &str {
        match self {
            SignedChangeRequest::CoinTransfer(request) => &request.message.balance_lock,
        }
    }
}

/// The signer's lock after `request` is applied: a hash of the signed message.
pub fn make_balance_lock(request: &SignedChangeRequest) -> Result<BalanceLock> {
    match request {
        SignedChangeRequest::CoinTransfer(request) => encoding::hash_hex(&request.message),
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CoinTransferSignedChangeRequest {
    pub signer: AccountId,
    pub signature: String,
    pub message: CoinTransferMessage,
}

impl CoinTransferSignedChangeRequest {
    pub fn sign(keypair: &KeyPair, message: CoinTransferMessage) -> Result<Self> {
        let signature = keypair.sign(&encoding::canonical_bytes(&message)?);
        Ok(Self {
            signer: keypair.account_id(),
            signature,
            message,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CoinTransferMessage {
    pub balance_lock: BalanceLock,
    pub txs: Vec<CoinTransferTransaction>,
}

impl CoinTransferMessage {
    pub fn sent_amount(&self) -> Result<u64> {
        self.txs.iter().try_fold(0u64, |total, tx| {
            total
                .checked_add(tx.amount)
                .ok_or_else(|| ChainError::Structural("Coin transfer total amount overflows".to_string()))
        })
    }

    pub fn recipient_amount(&self, account: &str) -> Result<u64> {
        self.txs
            .iter()
            .filter(|tx| tx.recipient == account)
            .try_fold(0u64, |total, tx| {
                total.checked_add(tx.amount).ok_or_else(|| {
                    ChainError::Structural(format!("Amount credited to {} overflows", account))
                })
            })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CoinTransferTransaction {
    pub recipient: AccountId,
    pub amount: u64,
    /// Marks a fee paid to a node; omitted from the encoding when false.
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub is_fee: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub memo: Option<String>,
}

impl CoinTransferTransaction {
    pub fn new(recipient: AccountId, amount: u64) -> Self {
        Self {
            recipient,
            amount,
            is_fee: false,
            memo: None,
        }
    }

    pub fn fee(recipient: AccountId, amount: u64) -> Self {
        Self {
            is_fee: true,
            ..Self::new(recipient, amount)
        }
    }

    pub fn with_memo(mut self, memo: impl Into<String>) -> Self {
        self.memo = Some(memo.into());
        self
    }
}
