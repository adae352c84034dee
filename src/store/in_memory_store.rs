use std::{
    collections::{HashMap, HashSet},
    sync::Arc,
};

use chrono::{DateTime, Utc};
use parking_lot::RwLock;

use crate::{
    clock::{Clock, SystemClock},
    transaction::{NewTransaction, Transaction, TransactionId},
    wallet::{Wallet, WalletId},
};

use super::{
    Committed, LedgerCommit, LedgerStore, StoreError, TransactionLog, WalletStore,
};

#[derive(Debug, Default)]
struct LedgerState {
    wallets: HashMap<WalletId, Wallet>,
    wallet_ids: HashMap<String, WalletId>,
    /// Oldest first, per wallet.
    transactions: HashMap<WalletId, Vec<Transaction>>,
    last_wallet_id: WalletId,
    last_transaction_id: TransactionId,
}

impl LedgerState {
    /// Validates the whole commit up front so a failure leaves nothing behind.
    fn check(&self, commit: &LedgerCommit) -> Result<(), StoreError> {
        let mut seen = HashSet::new();
        for wallet in &commit.wallets {
            let stored = self
                .wallets
                .get(&wallet.id)
                .ok_or(StoreError::UnknownWallet {
                    wallet_id: wallet.id,
                })?;
            // a second save of the same wallet would be based on a stale version
            if stored.version != wallet.version || !seen.insert(wallet.id) {
                return Err(StoreError::Conflict {
                    wallet_id: wallet.id,
                });
            }
        }
        for transaction in &commit.transactions {
            if !self.wallets.contains_key(&transaction.wallet_id) {
                return Err(StoreError::UnknownWallet {
                    wallet_id: transaction.wallet_id,
                });
            }
        }
        Ok(())
    }

    fn apply(&mut self, commit: LedgerCommit, now: DateTime<Utc>) -> Committed {
        let mut committed = Committed::default();
        for wallet in commit.wallets {
            if let Some(stored) = self.wallets.get_mut(&wallet.id) {
                stored.balance = wallet.balance;
                stored.version += 1;
                committed.wallets.push(stored.clone());
            }
        }
        for transaction in commit.transactions {
            let log = self.transactions.entry(transaction.wallet_id).or_default();
            let created_at = log.last().map_or(now, |last| last.created_at.max(now));
            self.last_transaction_id += 1;
            let record = transaction.into_transaction(self.last_transaction_id, created_at);
            log.push(record.clone());
            committed.transactions.push(record);
        }
        committed
    }
}

/// Store keeping everything in process memory behind a single lock.
pub struct InMemoryStore {
    state: RwLock<LedgerState>,
    clock: Arc<dyn Clock>,
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::with_clock(Arc::new(SystemClock))
    }

    pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
        Self {
            state: RwLock::new(LedgerState::default()),
            clock,
        }
    }
}

impl WalletStore for InMemoryStore {
    fn create_wallet(&self, user_id: &str) -> Result<Wallet, StoreError> {
        let mut state = self.state.write();
        if state.wallet_ids.contains_key(user_id) {
            return Err(StoreError::AlreadyExists {
                user_id: user_id.to_string(),
            });
        }
        state.last_wallet_id += 1;
        let wallet = Wallet::new(state.last_wallet_id, user_id);
        state.wallet_ids.insert(wallet.user_id.clone(), wallet.id);
        state.wallets.insert(wallet.id, wallet.clone());
        Ok(wallet)
    }

    fn wallet_by_user_id(&self, user_id: &str) -> Result<Wallet, StoreError> {
        let state = self.state.read();
        state
            .wallet_ids
            .get(user_id)
            .and_then(|id| state.wallets.get(id))
            .cloned()
            .ok_or_else(|| StoreError::NotFound {
                user_id: user_id.to_string(),
            })
    }

    fn save(&self, wallet: &Wallet) -> Result<Wallet, StoreError> {
        let mut committed = self.commit(LedgerCommit::default().save(wallet.clone()))?;
        committed
            .wallets
            .pop()
            .ok_or(StoreError::UnknownWallet {
                wallet_id: wallet.id,
            })
    }
}

impl TransactionLog for InMemoryStore {
    fn append(&self, transaction: NewTransaction) -> Result<Transaction, StoreError> {
        let wallet_id = transaction.wallet_id;
        let mut committed = self.commit(LedgerCommit::default().append(transaction))?;
        committed
            .transactions
            .pop()
            .ok_or(StoreError::UnknownWallet { wallet_id })
    }

    fn list_by_wallet(&self, wallet_id: WalletId) -> Result<Vec<Transaction>, StoreError> {
        let state = self.state.read();
        Ok(state
            .transactions
            .get(&wallet_id)
            .map(|log| log.iter().rev().cloned().collect())
            .unwrap_or_default())
    }

    fn has_transactions(&self, wallet_id: WalletId) -> Result<bool, StoreError> {
        let state = self.state.read();
        Ok(state
            .transactions
            .get(&wallet_id)
            .is_some_and(|log| !log.is_empty()))
    }

    fn find_as_of(
        &self,
        wallet_id: WalletId,
        at: DateTime<Utc>,
    ) -> Result<Option<Transaction>, StoreError> {
        let state = self.state.read();
        Ok(state.transactions.get(&wallet_id).and_then(|log| {
            log.iter()
                .rev()
                .find(|transaction| transaction.created_at <= at)
                .cloned()
        }))
    }
}

impl LedgerStore for InMemoryStore {
    fn commit(&self, commit: LedgerCommit) -> Result<Committed, StoreError> {
        let mut state = self.state.write();
        state.check(&commit)?;
        Ok(state.apply(commit, self.clock.now()))
    }

    fn clock(&self) -> &dyn Clock {
        self.clock.as_ref()
    }
}
