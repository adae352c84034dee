use std::{fmt, str::FromStr};

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Serialize;
use thiserror::Error;

use crate::wallet::WalletId;

pub type TransactionId = u64;

#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "UPPERCASE")]
pub enum TransactionKind {
    Deposit,
    Withdrawal,
    Transfer,
}

impl TransactionKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransactionKind::Deposit => "DEPOSIT",
            TransactionKind::Withdrawal => "WITHDRAWAL",
            TransactionKind::Transfer => "TRANSFER",
        }
    }
}

impl fmt::Display for TransactionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Error)]
#[error("Unknown transaction kind `{0}`")]
pub struct UnknownTransactionKind(pub String);

impl FromStr for TransactionKind {
    type Err = UnknownTransactionKind;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "DEPOSIT" => Ok(TransactionKind::Deposit),
            "WITHDRAWAL" => Ok(TransactionKind::Withdrawal),
            "TRANSFER" => Ok(TransactionKind::Transfer),
            other => Err(UnknownTransactionKind(other.to_string())),
        }
    }
}

/// Transaction record as it is handed to the log, before the log assigns
/// its id and timestamp.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewTransaction {
    pub wallet_id: WalletId,
    pub kind: TransactionKind,
    pub amount: Decimal,
    pub balance_after: Decimal,
    pub description: Option<String>,
}

impl NewTransaction {
    pub fn into_transaction(self, id: TransactionId, created_at: DateTime<Utc>) -> Transaction {
        Transaction {
            id,
            wallet_id: self.wallet_id,
            kind: self.kind,
            amount: self.amount,
            balance_after: self.balance_after,
            description: self.description,
            created_at,
        }
    }
}

/// Immutable ledger entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Transaction {
    pub id: TransactionId,
    pub wallet_id: WalletId,
    #[serde(rename = "type")]
    pub kind: TransactionKind,
    pub amount: Decimal,
    pub balance_after: Decimal,
    pub description: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl Transaction {
    /// How much this entry moved the wallet balance.
    ///
    /// Withdrawals are recorded with a positive amount, so their effect is negated.
    /// Transfer legs already carry their sign.
    pub fn balance_delta(&self) -> Decimal {
        match self.kind {
            TransactionKind::Withdrawal => -self.amount,
            TransactionKind::Deposit | TransactionKind::Transfer => self.amount,
        }
    }
}
