//! SQLite backend. Two relations, `wallets` and `transactions`, with the ledger
//! indexed by `(wallet_id, created_at)` for ordered listing and as-of lookups.

use std::{path::Path, str::FromStr, sync::Arc};

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use rusqlite::{Connection, OptionalExtension, Row, params};
use rust_decimal::Decimal;

use crate::{
    clock::{Clock, SystemClock},
    transaction::{NewTransaction, Transaction, TransactionKind},
    wallet::{Wallet, WalletId},
};

use super::{
    Committed, LedgerCommit, LedgerStore, StoreError, TransactionLog, WalletStore,
};

const SCHEMA: &str = "
    PRAGMA foreign_keys = ON;
    CREATE TABLE IF NOT EXISTS wallets (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        user_id TEXT NOT NULL UNIQUE,
        balance TEXT NOT NULL,
        version INTEGER NOT NULL DEFAULT 0
    );
    CREATE TABLE IF NOT EXISTS transactions (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        wallet_id INTEGER NOT NULL REFERENCES wallets(id),
        type TEXT NOT NULL,
        amount TEXT NOT NULL,
        balance_after TEXT NOT NULL,
        description TEXT,
        created_at INTEGER NOT NULL
    );
    CREATE INDEX IF NOT EXISTS idx_transactions_wallet_created
        ON transactions (wallet_id, created_at);
";

const TRANSACTION_COLUMNS: &str =
    "id, wallet_id, type, amount, balance_after, description, created_at";

pub struct SqliteStore {
    conn: Mutex<Connection>,
    clock: Arc<dyn Clock>,
}

impl SqliteStore {
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        Self::from_connection(Connection::open(path)?, Arc::new(SystemClock))
    }

    pub fn open_in_memory() -> Result<Self, StoreError> {
        Self::from_connection(Connection::open_in_memory()?, Arc::new(SystemClock))
    }

    pub fn from_connection(conn: Connection, clock: Arc<dyn Clock>) -> Result<Self, StoreError> {
        conn.execute_batch(SCHEMA)?;
        Ok(Self {
            conn: Mutex::new(conn),
            clock,
        })
    }
}

struct WalletRow {
    id: i64,
    user_id: String,
    balance: String,
    version: i64,
}

impl WalletRow {
    fn read(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            user_id: row.get(1)?,
            balance: row.get(2)?,
            version: row.get(3)?,
        })
    }
}

impl TryFrom<WalletRow> for Wallet {
    type Error = StoreError;

    fn try_from(row: WalletRow) -> Result<Self, Self::Error> {
        Ok(Wallet {
            id: row.id as WalletId,
            balance: parse_decimal(&row.balance)?,
            user_id: row.user_id,
            version: row.version as u64,
        })
    }
}

struct TransactionRow {
    id: i64,
    wallet_id: i64,
    kind: String,
    amount: String,
    balance_after: String,
    description: Option<String>,
    created_at: i64,
}

impl TransactionRow {
    fn read(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            wallet_id: row.get(1)?,
            kind: row.get(2)?,
            amount: row.get(3)?,
            balance_after: row.get(4)?,
            description: row.get(5)?,
            created_at: row.get(6)?,
        })
    }
}

impl TryFrom<TransactionRow> for Transaction {
    type Error = StoreError;

    fn try_from(row: TransactionRow) -> Result<Self, Self::Error> {
        Ok(Transaction {
            id: row.id as u64,
            wallet_id: row.wallet_id as WalletId,
            kind: TransactionKind::from_str(&row.kind)
                .map_err(|err| StoreError::Corrupted(err.to_string()))?,
            amount: parse_decimal(&row.amount)?,
            balance_after: parse_decimal(&row.balance_after)?,
            description: row.description,
            created_at: from_micros(row.created_at)?,
        })
    }
}

fn parse_decimal(value: &str) -> Result<Decimal, StoreError> {
    Decimal::from_str(value)
        .map_err(|err| StoreError::Corrupted(format!("invalid decimal `{value}`: {err}")))
}

fn from_micros(micros: i64) -> Result<DateTime<Utc>, StoreError> {
    DateTime::from_timestamp_micros(micros)
        .ok_or_else(|| StoreError::Corrupted(format!("invalid timestamp {micros}")))
}

fn wallet_exists(conn: &Connection, wallet_id: WalletId) -> Result<bool, StoreError> {
    Ok(conn.query_row(
        "SELECT EXISTS(SELECT 1 FROM wallets WHERE id = ?1)",
        params![wallet_id as i64],
        |row| row.get(0),
    )?)
}

fn save_wallet(conn: &Connection, wallet: &Wallet) -> Result<Wallet, StoreError> {
    let updated = conn.execute(
        "UPDATE wallets SET balance = ?1, version = version + 1 WHERE id = ?2 AND version = ?3",
        params![
            wallet.balance.to_string(),
            wallet.id as i64,
            wallet.version as i64
        ],
    )?;
    if updated == 0 {
        return Err(if wallet_exists(conn, wallet.id)? {
            StoreError::Conflict {
                wallet_id: wallet.id,
            }
        } else {
            StoreError::UnknownWallet {
                wallet_id: wallet.id,
            }
        });
    }
    Ok(Wallet {
        version: wallet.version + 1,
        ..wallet.clone()
    })
}

fn append_transaction(
    conn: &Connection,
    transaction: NewTransaction,
    now: DateTime<Utc>,
) -> Result<Transaction, StoreError> {
    if !wallet_exists(conn, transaction.wallet_id)? {
        return Err(StoreError::UnknownWallet {
            wallet_id: transaction.wallet_id,
        });
    }
    let latest: Option<i64> = conn.query_row(
        "SELECT MAX(created_at) FROM transactions WHERE wallet_id = ?1",
        params![transaction.wallet_id as i64],
        |row| row.get(0),
    )?;
    let created_at = latest.map_or(now.timestamp_micros(), |latest| {
        latest.max(now.timestamp_micros())
    });
    conn.execute(
        "INSERT INTO transactions (wallet_id, type, amount, balance_after, description, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        params![
            transaction.wallet_id as i64,
            transaction.kind.as_str(),
            transaction.amount.to_string(),
            transaction.balance_after.to_string(),
            transaction.description,
            created_at,
        ],
    )?;
    let id = conn.last_insert_rowid() as u64;
    Ok(transaction.into_transaction(id, from_micros(created_at)?))
}

impl WalletStore for SqliteStore {
    fn create_wallet(&self, user_id: &str) -> Result<Wallet, StoreError> {
        let mut conn = self.conn.lock();
        let tx = conn.transaction()?;
        let existing = tx
            .query_row(
                "SELECT id FROM wallets WHERE user_id = ?1",
                params![user_id],
                |row| row.get::<_, i64>(0),
            )
            .optional()?;
        if existing.is_some() {
            return Err(StoreError::AlreadyExists {
                user_id: user_id.to_string(),
            });
        }
        tx.execute(
            "INSERT INTO wallets (user_id, balance, version) VALUES (?1, ?2, 0)",
            params![user_id, Decimal::ZERO.to_string()],
        )?;
        let wallet = Wallet::new(tx.last_insert_rowid() as WalletId, user_id);
        tx.commit()?;
        Ok(wallet)
    }

    fn wallet_by_user_id(&self, user_id: &str) -> Result<Wallet, StoreError> {
        let conn = self.conn.lock();
        let row = conn
            .query_row(
                "SELECT id, user_id, balance, version FROM wallets WHERE user_id = ?1",
                params![user_id],
                WalletRow::read,
            )
            .optional()?;
        match row {
            Some(row) => Wallet::try_from(row),
            None => Err(StoreError::NotFound {
                user_id: user_id.to_string(),
            }),
        }
    }

    fn save(&self, wallet: &Wallet) -> Result<Wallet, StoreError> {
        let conn = self.conn.lock();
        save_wallet(&conn, wallet)
    }
}

impl TransactionLog for SqliteStore {
    fn append(&self, transaction: NewTransaction) -> Result<Transaction, StoreError> {
        let conn = self.conn.lock();
        append_transaction(&conn, transaction, self.clock.now())
    }

    fn list_by_wallet(&self, wallet_id: WalletId) -> Result<Vec<Transaction>, StoreError> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(&format!(
            "SELECT {TRANSACTION_COLUMNS} FROM transactions
             WHERE wallet_id = ?1
             ORDER BY created_at DESC, id DESC"
        ))?;
        let rows = stmt
            .query_map(params![wallet_id as i64], TransactionRow::read)?
            .collect::<Result<Vec<_>, _>>()?;
        rows.into_iter().map(Transaction::try_from).collect()
    }

    fn has_transactions(&self, wallet_id: WalletId) -> Result<bool, StoreError> {
        let conn = self.conn.lock();
        Ok(conn.query_row(
            "SELECT EXISTS(SELECT 1 FROM transactions WHERE wallet_id = ?1)",
            params![wallet_id as i64],
            |row| row.get(0),
        )?)
    }

    fn find_as_of(
        &self,
        wallet_id: WalletId,
        at: DateTime<Utc>,
    ) -> Result<Option<Transaction>, StoreError> {
        let conn = self.conn.lock();
        let row = conn
            .query_row(
                &format!(
                    "SELECT {TRANSACTION_COLUMNS} FROM transactions
                     WHERE wallet_id = ?1 AND created_at <= ?2
                     ORDER BY created_at DESC, id DESC
                     LIMIT 1"
                ),
                params![wallet_id as i64, at.timestamp_micros()],
                TransactionRow::read,
            )
            .optional()?;
        row.map(Transaction::try_from).transpose()
    }
}

impl LedgerStore for SqliteStore {
    fn commit(&self, commit: LedgerCommit) -> Result<Committed, StoreError> {
        let now = self.clock.now();
        let mut conn = self.conn.lock();
        // dropping `tx` on an early return rolls everything back
        let tx = conn.transaction()?;
        let mut committed = Committed::default();
        for wallet in &commit.wallets {
            committed.wallets.push(save_wallet(&tx, wallet)?);
        }
        for transaction in commit.transactions {
            committed
                .transactions
                .push(append_transaction(&tx, transaction, now)?);
        }
        tx.commit()?;
        Ok(committed)
    }

    fn clock(&self) -> &dyn Clock {
        self.clock.as_ref()
    }
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, TimeZone};
    use rust_decimal_macros::dec;

    use crate::clock::ManualClock;

    use super::*;

    fn store_at(start: DateTime<Utc>) -> (SqliteStore, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::new(start));
        let store =
            SqliteStore::from_connection(Connection::open_in_memory().unwrap(), clock.clone())
                .unwrap();
        (store, clock)
    }

    fn deposit(wallet_id: WalletId, amount: Decimal, balance_after: Decimal) -> NewTransaction {
        NewTransaction {
            wallet_id,
            kind: TransactionKind::Deposit,
            amount,
            balance_after,
            description: Some("cash".to_string()),
        }
    }

    #[test]
    fn wallets_are_unique_per_user() {
        let store = SqliteStore::open_in_memory().unwrap();
        let alice = store.create_wallet("alice").unwrap();
        assert_eq!(alice.balance, Decimal::ZERO);
        assert_eq!(store.wallet_by_user_id("alice").unwrap(), alice);
        assert!(matches!(
            store.create_wallet("alice").unwrap_err(),
            StoreError::AlreadyExists { .. }
        ));
        assert!(matches!(
            store.wallet_by_user_id("bob").unwrap_err(),
            StoreError::NotFound { user_id } if user_id == "bob"
        ));
    }

    #[test]
    fn save_checks_version() {
        let store = SqliteStore::open_in_memory().unwrap();
        let loaded = store.create_wallet("alice").unwrap();
        let saved = store
            .save(&Wallet {
                balance: dec!(12.3456),
                ..loaded.clone()
            })
            .unwrap();
        assert_eq!(saved.version, 1);
        assert_eq!(
            store.wallet_by_user_id("alice").unwrap().balance,
            dec!(12.3456)
        );

        assert!(matches!(
            store.save(&loaded).unwrap_err(),
            StoreError::Conflict { .. }
        ));
        assert!(matches!(
            store.save(&Wallet::new(99, "ghost")).unwrap_err(),
            StoreError::UnknownWallet { wallet_id: 99 }
        ));
    }

    #[test]
    fn commit_rolls_back_on_failure() {
        let start = Utc.with_ymd_and_hms(2024, 5, 1, 0, 0, 0).unwrap();
        let (store, _) = store_at(start);
        let alice = store.create_wallet("alice").unwrap();

        let commit = LedgerCommit::default()
            .save(Wallet {
                balance: dec!(10),
                ..alice.clone()
            })
            .append(deposit(alice.id, dec!(10), dec!(10)))
            .append(deposit(404, dec!(1), dec!(1)));
        assert!(matches!(
            store.commit(commit).unwrap_err(),
            StoreError::UnknownWallet { wallet_id: 404 }
        ));
        assert_eq!(store.wallet_by_user_id("alice").unwrap(), alice);
        assert!(store.list_by_wallet(alice.id).unwrap().is_empty());
    }

    #[test]
    fn ledger_ordering_and_as_of() {
        let start = Utc.with_ymd_and_hms(2024, 5, 1, 0, 0, 0).unwrap();
        let (store, clock) = store_at(start);
        let alice = store.create_wallet("alice").unwrap();
        assert!(!store.has_transactions(alice.id).unwrap());

        let committed = store
            .commit(
                LedgerCommit::default()
                    .save(Wallet {
                        balance: dec!(10),
                        ..alice.clone()
                    })
                    .append(deposit(alice.id, dec!(10), dec!(10))),
            )
            .unwrap();
        let first = committed.transactions[0].clone();
        assert!(store.has_transactions(alice.id).unwrap());
        assert_eq!(first.created_at, start);
        assert_eq!(first.description.as_deref(), Some("cash"));

        clock.advance(Duration::seconds(30));
        let second = store.append(deposit(alice.id, dec!(2.5), dec!(12.5))).unwrap();

        let listed = store.list_by_wallet(alice.id).unwrap();
        assert_eq!(listed, vec![second.clone(), first.clone()]);

        assert_eq!(
            store.find_as_of(alice.id, start - Duration::seconds(1)).unwrap(),
            None
        );
        assert_eq!(
            store
                .find_as_of(alice.id, start + Duration::seconds(29))
                .unwrap(),
            Some(first)
        );
        assert_eq!(
            store
                .find_as_of(alice.id, start + Duration::days(1))
                .unwrap(),
            Some(second)
        );
    }
}
