use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Serialize;

use crate::{
    clock::Clock,
    engine::LedgerError,
    store::{TransactionLog, WalletStore},
    transaction::{Transaction, TransactionId, TransactionKind},
};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BalanceView {
    pub balance: Decimal,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TransactionView {
    pub id: TransactionId,
    #[serde(rename = "type")]
    pub kind: TransactionKind,
    pub amount: Decimal,
    pub balance: Decimal,
    pub description: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl From<Transaction> for TransactionView {
    fn from(transaction: Transaction) -> Self {
        Self {
            id: transaction.id,
            kind: transaction.kind,
            amount: transaction.amount,
            balance: transaction.balance_after,
            description: transaction.description,
            created_at: transaction.created_at,
        }
    }
}

/// Result of replaying a wallet's ledger from its first entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LedgerAudit {
    pub user_id: String,
    pub current_balance: Decimal,
    pub replayed_balance: Decimal,
    pub transaction_count: usize,
    /// Entries whose `balance_after` does not follow from the entry before them.
    pub broken_links: Vec<TransactionId>,
}

impl LedgerAudit {
    pub fn is_consistent(&self) -> bool {
        self.broken_links.is_empty() && self.current_balance == self.replayed_balance
    }
}

/// Read-only access to balances and ledgers.
pub struct QueryFacade<'a, S> {
    store: &'a S,
    clock: &'a dyn Clock,
}

impl<'a, S> QueryFacade<'a, S>
where
    S: WalletStore + TransactionLog,
{
    pub fn new(store: &'a S, clock: &'a dyn Clock) -> Self {
        Self { store, clock }
    }

    pub fn balance(&self, user_id: &str) -> Result<BalanceView, LedgerError> {
        let wallet = self.store.wallet_by_user_id(user_id)?;
        Ok(BalanceView {
            balance: wallet.balance,
        })
    }

    /// Balance recorded by the last transaction at or before `at` (now if `None`).
    ///
    /// Before the first transaction the balance is zero. A wallet without any
    /// transactions reports its current balance whatever `at` is, even if it did not
    /// exist yet at `at`.
    pub fn historical_balance(
        &self,
        user_id: &str,
        at: Option<DateTime<Utc>>,
    ) -> Result<BalanceView, LedgerError> {
        let wallet = self.store.wallet_by_user_id(user_id)?;
        let at = at.unwrap_or_else(|| self.clock.now());
        let balance = match self.store.find_as_of(wallet.id, at)? {
            Some(transaction) => transaction.balance_after,
            None if !self.store.has_transactions(wallet.id)? => wallet.balance,
            None => Decimal::ZERO,
        };
        Ok(BalanceView { balance })
    }

    /// Newest first.
    pub fn transactions(&self, user_id: &str) -> Result<Vec<Transaction>, LedgerError> {
        let wallet = self.store.wallet_by_user_id(user_id)?;
        Ok(self.store.list_by_wallet(wallet.id)?)
    }

    pub fn transaction_history(&self, user_id: &str) -> Result<Vec<TransactionView>, LedgerError> {
        Ok(self
            .transactions(user_id)?
            .into_iter()
            .map(TransactionView::from)
            .collect())
    }

    /// Sum of every balance change recorded at or before `at`; zero before the
    /// first entry.
    pub fn replayed_balance_as_of(
        &self,
        user_id: &str,
        at: DateTime<Utc>,
    ) -> Result<Decimal, LedgerError> {
        Ok(self
            .transactions(user_id)?
            .iter()
            .filter(|transaction| transaction.created_at <= at)
            .map(Transaction::balance_delta)
            .sum())
    }

    pub fn audit(&self, user_id: &str) -> Result<LedgerAudit, LedgerError> {
        let wallet = self.store.wallet_by_user_id(user_id)?;
        let ledger = self.store.list_by_wallet(wallet.id)?;

        let mut replayed_balance = Decimal::ZERO;
        let mut previous = Decimal::ZERO;
        let mut broken_links = Vec::new();
        for transaction in ledger.iter().rev() {
            let delta = transaction.balance_delta();
            replayed_balance += delta;
            if transaction.balance_after != previous + delta {
                broken_links.push(transaction.id);
            }
            previous = transaction.balance_after;
        }

        Ok(LedgerAudit {
            user_id: wallet.user_id,
            current_balance: wallet.balance,
            replayed_balance,
            transaction_count: ledger.len(),
            broken_links,
        })
    }
}
