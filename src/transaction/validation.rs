/// Validation logic for signed change requests, separated from type definitions
use crate::blockchain::{AsOf, BlockNumber, BlockStore, Blockchain, SnapshotStore};
use crate::crypto;
use crate::encoding;
use crate::error::{ChainError, Result};
use crate::transaction::types::{
    CoinTransferMessage, CoinTransferSignedChangeRequest, SignedChangeRequest, MAX_MEMO_LENGTH,
};

impl SignedChangeRequest {
    /// Validates the request for inclusion as block `block_number`, against
    /// the chain state right before that block.
    pub fn validate<B: BlockStore, S: SnapshotStore>(
        &self,
        chain: &Blockchain<B, S>,
        block_number: BlockNumber,
    ) -> Result<()> {
        // Prior state only exists for positions the chain can be extended at.
        let next_block_number = chain.next_block_number()?;
        if block_number > next_block_number {
            return Err(ChainError::Linkage(format!(
                "Request for block {} cannot link: next block number is {}",
                block_number, next_block_number
            )));
        }

        match self {
            SignedChangeRequest::CoinTransfer(request) => request.validate(chain, block_number),
        }
    }
}

impl CoinTransferSignedChangeRequest {
    /// Stateless checks: signer, signature and message shape.
    pub fn validate_stateless(&self) -> Result<()> {
        if self.signer.is_empty() {
            return Err(ChainError::Structural("Signer must be set".to_string()));
        }
        if self.signature.is_empty() {
            return Err(ChainError::InvalidSignature("Request is not signed".to_string()));
        }

        let message = encoding::canonical_bytes(&self.message)?;
        crypto::verify_signature(&self.signer, &message, &self.signature)?;

        self.message.validate(&self.signer)
    }

    pub fn validate<B: BlockStore, S: SnapshotStore>(
        &self,
        chain: &Blockchain<B, S>,
        block_number: BlockNumber,
    ) -> Result<()> {
        self.validate_stateless()?;

        let before = AsOf::before(block_number);
        self.validate_amount(chain, before)?;
        self.validate_balance_lock(chain, before)
    }

    fn validate_amount<B: BlockStore, S: SnapshotStore>(
        &self,
        chain: &Blockchain<B, S>,
        before: AsOf,
    ) -> Result<()> {
        let balance = chain.account_balance(&self.signer, before)?;
        let required = self.message.sent_amount()?;
        if required > balance {
            return Err(ChainError::InsufficientBalance {
                account: self.signer.clone(),
                balance,
                required,
            });
        }
        Ok(())
    }

    /// Replay protection: the quoted lock must be the one in force.
    fn validate_balance_lock<B: BlockStore, S: SnapshotStore>(
        &self,
        chain: &Blockchain<B, S>,
        before: AsOf,
    ) -> Result<()> {
        let expected = chain.expected_balance_lock(&self.signer, before)?;
        if self.message.balance_lock != expected {
            return Err(ChainError::LockMismatch {
                account: self.signer.clone(),
                expected: Some(expected),
                actual: Some(self.message.balance_lock.clone()),
            });
        }
        Ok(())
    }
}

impl CoinTransferMessage {
    pub fn validate(&self, signer: &str) -> Result<()> {
        if self.balance_lock.is_empty() {
            return Err(ChainError::Structural(
                "Coin transfer balance lock must be set".to_string(),
            ));
        }
        if self.txs.is_empty() {
            return Err(ChainError::Structural(
                "Coin transfer must contain at least one transaction".to_string(),
            ));
        }

        for tx in &self.txs {
            if tx.recipient.is_empty() {
                return Err(ChainError::Structural(
                    "Coin transfer recipient must be set".to_string(),
                ));
            }
            // Prevent self-sends
            if tx.recipient == signer {
                return Err(ChainError::Structural(
                    "Coin transfer recipient must differ from the signer".to_string(),
                ));
            }
            if tx.amount == 0 {
                return Err(ChainError::Structural(format!(
                    "Coin transfer amount to {} must be greater than zero",
                    tx.recipient
                )));
            }
            if let Some(memo) = &tx.memo {
                if memo.chars().count() > MAX_MEMO_LENGTH {
                    return Err(ChainError::Structural(format!(
                        "Memo exceeds maximum length of {} characters",
                        MAX_MEMO_LENGTH
                    )));
                }
            }
        }

        self.sent_amount()?;
        Ok(())
    }
}

/// Signature check alone, e.g. for admission before any chain state is read.
pub fn verify_request_signature(request: &SignedChangeRequest) -> Result<()> {
    match request {
        SignedChangeRequest::CoinTransfer(request) => {
            let message = encoding::canonical_bytes(&request.message)?;
            crypto::verify_signature(&request.signer, &message, &request.signature)
        }
    }
}
