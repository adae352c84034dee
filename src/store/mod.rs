use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::{
    clock::Clock,
    transaction::{NewTransaction, Transaction},
    wallet::{Wallet, WalletId},
};

pub mod in_memory_store;
pub mod sqlite_store;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Wallet not found for user `{user_id}`")]
    NotFound { user_id: String },
    #[error("Wallet already exists for user `{user_id}`")]
    AlreadyExists { user_id: String },
    #[error("Wallet {wallet_id} was modified concurrently")]
    Conflict { wallet_id: WalletId },
    #[error("Wallet {wallet_id} does not exist")]
    UnknownWallet { wallet_id: WalletId },
    #[error("Stored data is corrupted: {0}")]
    Corrupted(String),
    #[error(transparent)]
    Sqlite(#[from] rusqlite::Error),
}

pub trait WalletStore {
    fn create_wallet(&self, user_id: &str) -> Result<Wallet, StoreError>;

    fn wallet_by_user_id(&self, user_id: &str) -> Result<Wallet, StoreError>;

    /// Persists the balance of an existing wallet, provided nobody saved it since
    /// `wallet` was loaded. Returns the wallet with its new version.
    fn save(&self, wallet: &Wallet) -> Result<Wallet, StoreError>;
}

pub trait TransactionLog {
    /// Assigns id and timestamp. Timestamps never go backwards within a wallet.
    fn append(&self, transaction: NewTransaction) -> Result<Transaction, StoreError>;

    /// Newest first.
    fn list_by_wallet(&self, wallet_id: WalletId) -> Result<Vec<Transaction>, StoreError>;

    fn has_transactions(&self, wallet_id: WalletId) -> Result<bool, StoreError>;

    /// Most recent transaction created at or before `at`.
    fn find_as_of(
        &self,
        wallet_id: WalletId,
        at: DateTime<Utc>,
    ) -> Result<Option<Transaction>, StoreError>;
}

/// Storage the ledger engine runs against.
///
/// `commit` is the only way the engine writes: either every save and append in it
/// lands, or none does.
pub trait LedgerStore: WalletStore + TransactionLog + Send + Sync {
    fn commit(&self, commit: LedgerCommit) -> Result<Committed, StoreError>;

    /// Time source stamping this store's transactions.
    fn clock(&self) -> &dyn Clock;
}

/// Batch of wallet saves and ledger appends.
#[derive(Debug, Default, Clone)]
pub struct LedgerCommit {
    pub wallets: Vec<Wallet>,
    pub transactions: Vec<NewTransaction>,
}

impl LedgerCommit {
    pub fn save(mut self, wallet: Wallet) -> Self {
        self.wallets.push(wallet);
        self
    }

    pub fn append(mut self, transaction: NewTransaction) -> Self {
        self.transactions.push(transaction);
        self
    }
}

/// What a commit wrote, in the order it was given.
#[derive(Debug, Default, Clone)]
pub struct Committed {
    pub wallets: Vec<Wallet>,
    pub transactions: Vec<Transaction>,
}
