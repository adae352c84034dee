/// Fixed-point helpers, every amount is kept at four fractional digits.
pub mod money;

/// Server time source.
pub mod clock;

/// Ledger entries and their kinds.
pub mod transaction;

/// Wallet record and its state transitions.
/// Balance changes are computed as events by handling posting commands, then applied.
pub mod wallet;

/// Validated commands that are later executed by [`engine`].
pub mod command;

/// Wallet store and transaction log interfaces, plus in-memory and SQLite backends.
pub mod store;

/// Ledger engine. Coordinates command handling, per-wallet locking and atomic
/// store commits.
pub mod engine;

/// Read-only balance and ledger queries.
pub mod query;

/// Bootstraps the engine for the batch binary: CSV command input and CSV reports.
/// Lives in the library so integration tests can drive it.
pub mod bin_utils;

pub use engine::{CommandOutcome, ErrorKind, LedgerEngine, LedgerError, retry_on_conflict};
pub use store::{LedgerStore, in_memory_store::InMemoryStore, sqlite_store::SqliteStore};
