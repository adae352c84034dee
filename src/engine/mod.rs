use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::{
    command::{CommandError, LedgerCommand, PostingCommand, TransferCommand, parse_user_id},
    query::QueryFacade,
    store::{LedgerCommit, LedgerStore, StoreError},
    transaction::Transaction,
    wallet::{Wallet, WalletError},
};

pub mod locks;

use locks::WalletLocks;

#[derive(Debug, Error)]
pub enum LedgerError {
    #[error(transparent)]
    CommandErr(#[from] CommandError),
    #[error(transparent)]
    WalletErr(#[from] WalletError),
    #[error(transparent)]
    StoreErr(#[from] StoreError),
}

/// User-visible failure category. Every variant maps to a distinct response.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    NotFound,
    AlreadyExists,
    InvalidAmount,
    InsufficientFunds,
    Conflict,
    SameWallet,
    InvalidInput,
    Storage,
}

impl LedgerError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            LedgerError::CommandErr(err) => match err {
                CommandError::InvalidAmount { .. } => ErrorKind::InvalidAmount,
                CommandError::SameWallet { .. } => ErrorKind::SameWallet,
                CommandError::BlankUserId
                | CommandError::AmountRequired { .. }
                | CommandError::CounterpartyRequired { .. } => ErrorKind::InvalidInput,
            },
            LedgerError::WalletErr(err) => match err {
                WalletError::InsufficientFunds { .. } => ErrorKind::InsufficientFunds,
                WalletError::BalanceOverflow { .. } => ErrorKind::InvalidAmount,
            },
            LedgerError::StoreErr(err) => match err {
                StoreError::NotFound { .. } => ErrorKind::NotFound,
                StoreError::AlreadyExists { .. } => ErrorKind::AlreadyExists,
                StoreError::Conflict { .. } => ErrorKind::Conflict,
                StoreError::UnknownWallet { .. }
                | StoreError::Corrupted(_)
                | StoreError::Sqlite(_) => ErrorKind::Storage,
            },
        }
    }

    /// Only a concurrent-modification conflict is safe to retry with fresh state.
    pub fn is_retryable(&self) -> bool {
        self.kind() == ErrorKind::Conflict
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommandOutcome {
    Created(Wallet),
    Balance(Decimal),
    Transferred,
}

/// Runs `op` again while it fails with a conflict, at most `attempts` times in total.
///
/// The engine never retries on its own; callers opt in here.
pub fn retry_on_conflict<T>(
    attempts: usize,
    mut op: impl FnMut() -> Result<T, LedgerError>,
) -> Result<T, LedgerError> {
    let mut attempt = 1;
    loop {
        match op() {
            Err(err) if err.is_retryable() && attempt < attempts => {
                warn!(attempt, %err, "retrying after conflict");
                attempt += 1;
            }
            result => return result,
        }
    }
}

/// Applies ledger commands to a store.
///
/// Every mutation locks the wallets it touches, reloads them, and writes balances
/// together with their transaction records in one store commit.
pub struct LedgerEngine<S> {
    store: S,
    locks: WalletLocks,
}

impl<S> LedgerEngine<S>
where
    S: LedgerStore,
{
    /// Default "now" for historical queries comes from the store's clock.
    pub fn new(store: S) -> Self {
        Self {
            store,
            locks: WalletLocks::default(),
        }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn queries(&self) -> QueryFacade<'_, S> {
        QueryFacade::new(&self.store, self.store.clock())
    }

    pub fn execute(&self, command: LedgerCommand) -> Result<CommandOutcome, LedgerError> {
        match command {
            LedgerCommand::CreateWallet { user_id } => {
                Ok(CommandOutcome::Created(self.create(&user_id)?))
            }
            LedgerCommand::Post { user_id, posting } => {
                Ok(CommandOutcome::Balance(self.post(&user_id, &posting)?))
            }
            LedgerCommand::Transfer(command) => {
                self.transfer_funds(&command)?;
                Ok(CommandOutcome::Transferred)
            }
        }
    }

    pub fn create_wallet(&self, user_id: &str) -> Result<Wallet, LedgerError> {
        self.create(&parse_user_id(user_id)?)
    }

    pub fn balance(&self, user_id: &str) -> Result<Decimal, LedgerError> {
        Ok(self.queries().balance(user_id)?.balance)
    }

    pub fn historical_balance(
        &self,
        user_id: &str,
        at: DateTime<Utc>,
    ) -> Result<Decimal, LedgerError> {
        Ok(self.queries().historical_balance(user_id, Some(at))?.balance)
    }

    pub fn deposit(
        &self,
        user_id: &str,
        amount: Decimal,
        description: Option<&str>,
    ) -> Result<Decimal, LedgerError> {
        self.post(user_id, &PostingCommand::deposit(amount, description)?)
    }

    pub fn withdraw(
        &self,
        user_id: &str,
        amount: Decimal,
        description: Option<&str>,
    ) -> Result<Decimal, LedgerError> {
        self.post(user_id, &PostingCommand::withdrawal(amount, description)?)
    }

    pub fn transfer(
        &self,
        from_user_id: &str,
        to_user_id: &str,
        amount: Decimal,
        description: Option<&str>,
    ) -> Result<(), LedgerError> {
        self.transfer_funds(&TransferCommand::new(
            from_user_id,
            to_user_id,
            amount,
            description,
        )?)
    }

    pub fn transaction_history(&self, user_id: &str) -> Result<Vec<Transaction>, LedgerError> {
        self.queries().transactions(user_id)
    }

    fn create(&self, user_id: &str) -> Result<Wallet, LedgerError> {
        let wallet = self.store.create_wallet(user_id)?;
        info!(user_id, wallet_id = wallet.id, "wallet created");
        Ok(wallet)
    }

    fn post(&self, user_id: &str, posting: &PostingCommand) -> Result<Decimal, LedgerError> {
        let wallet_id = self.store.wallet_by_user_id(user_id)?.id;
        let _guard = self.locks.acquire(&[wallet_id]);

        let mut wallet = self.store.wallet_by_user_id(user_id)?;
        let event = wallet.handle_posting(posting)?;
        let record = event.to_transaction(wallet.id);
        wallet.apply(&event);

        let balance = wallet.balance;
        self.commit(LedgerCommit::default().save(wallet).append(record))?;
        info!(
            user_id,
            kind = %posting.kind,
            amount = %posting.amount,
            %balance,
            "posting committed"
        );
        Ok(balance)
    }

    fn transfer_funds(&self, command: &TransferCommand) -> Result<(), LedgerError> {
        let from_id = self.store.wallet_by_user_id(&command.from_user_id)?.id;
        let to_id = self.store.wallet_by_user_id(&command.to_user_id)?.id;
        let _guard = self.locks.acquire(&[from_id, to_id]);

        let mut source = self.store.wallet_by_user_id(&command.from_user_id)?;
        let mut destination = self.store.wallet_by_user_id(&command.to_user_id)?;
        let debit = source.handle_posting(&command.debit)?;
        let credit = destination.handle_posting(&command.credit)?;
        source.apply(&debit);
        destination.apply(&credit);

        let commit = LedgerCommit::default()
            .append(debit.to_transaction(source.id))
            .append(credit.to_transaction(destination.id))
            .save(source)
            .save(destination);
        self.commit(commit)?;
        info!(
            from = %command.from_user_id,
            to = %command.to_user_id,
            amount = %command.amount(),
            "transfer committed"
        );
        Ok(())
    }

    fn commit(&self, commit: LedgerCommit) -> Result<(), LedgerError> {
        match self.store.commit(commit) {
            Ok(committed) => {
                debug!(
                    wallets = committed.wallets.len(),
                    transactions = committed.transactions.len(),
                    "store commit"
                );
                Ok(())
            }
            Err(err @ StoreError::Conflict { .. }) => {
                warn!(%err, "wallet changed outside the engine");
                Err(err.into())
            }
            Err(err) => Err(err.into()),
        }
    }
}
