//! Account state transitions produced by a signed change request

use std::collections::btree_map::Entry;
use std::collections::BTreeMap;

use crate::blockchain::{AccountState, AsOf, BlockStore, Blockchain, SnapshotStore};
use crate::error::{ChainError, Result};
use crate::transaction::types::{
    make_balance_lock, AccountId, BalanceLock, CoinTransferSignedChangeRequest, SignedChangeRequest,
};

impl SignedChangeRequest {
    /// New states of every account the request touches, applied on top of
    /// the chain head. The signer's lock rotates; recipients carry no lock.
    pub fn compute_updated_account_states<B: BlockStore, S: SnapshotStore>(
        &self,
        chain: &Blockchain<B, S>,
    ) -> Result<BTreeMap<AccountId, AccountState>> {
        match self {
            SignedChangeRequest::CoinTransfer(request) => {
                coin_transfer_states(request, make_balance_lock(self)?, chain)
            }
        }
    }
}

fn coin_transfer_states<B: BlockStore, S: SnapshotStore>(
    request: &CoinTransferSignedChangeRequest,
    new_lock: BalanceLock,
    chain: &Blockchain<B, S>,
) -> Result<BTreeMap<AccountId, AccountState>> {
    let mut states = BTreeMap::new();

    let balance = chain.account_balance(&request.signer, AsOf::Head)?;
    let sent = request.message.sent_amount()?;
    let remaining = balance
        .checked_sub(sent)
        .ok_or_else(|| ChainError::InsufficientBalance {
            account: request.signer.clone(),
            balance,
            required: sent,
        })?;
    states.insert(
        request.signer.clone(),
        AccountState::new(remaining, Some(new_lock)),
    );

    for tx in &request.message.txs {
        if tx.recipient == request.signer {
            continue;
        }
        let entry = match states.entry(tx.recipient.clone()) {
            Entry::Occupied(entry) => entry.into_mut(),
            Entry::Vacant(entry) => {
                let value = chain.account_balance(&tx.recipient, AsOf::Head)?;
                entry.insert(AccountState::unlocked(value))
            }
        };
        entry.value = entry.value.checked_add(tx.amount).ok_or_else(|| {
            ChainError::Structural(format!("Balance of {} overflows", tx.recipient))
        })?;
    }

    Ok(states)
}
