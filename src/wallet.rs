use rust_decimal::Decimal;
use serde::Serialize;
use thiserror::Error;

use crate::{
    command::{PostingAction, PostingCommand},
    money,
    transaction::{NewTransaction, TransactionKind},
};

pub type WalletId = u64;

#[derive(Debug, Error)]
pub enum WalletError {
    #[error(
        "Insufficient funds in wallet of `{user_id}`: balance {balance}, requested {requested}"
    )]
    InsufficientFunds {
        user_id: String,
        balance: Decimal,
        requested: Decimal,
    },
    #[error("Balance of `{user_id}` would overflow")]
    BalanceOverflow { user_id: String },
}

/// Outcome of a posting that passed validation. The wallet is only changed by
/// applying it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WalletEvent {
    pub kind: TransactionKind,
    /// Amount as recorded in the ledger, signed for transfer legs.
    pub amount: Decimal,
    pub delta: Decimal,
    pub balance_after: Decimal,
    pub description: Option<String>,
}

impl WalletEvent {
    pub fn to_transaction(&self, wallet_id: WalletId) -> NewTransaction {
        NewTransaction {
            wallet_id,
            kind: self.kind,
            amount: self.amount,
            balance_after: self.balance_after,
            description: self.description.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Wallet {
    pub id: WalletId,
    pub user_id: String,
    pub balance: Decimal,
    /// Bumped by the store on every save.
    #[serde(skip)]
    pub version: u64,
}

impl Wallet {
    pub fn new(id: WalletId, user_id: impl Into<String>) -> Self {
        Self {
            id,
            user_id: user_id.into(),
            balance: Decimal::ZERO,
            version: 0,
        }
    }

    pub fn apply(&mut self, event: &WalletEvent) {
        self.balance += event.delta;
        debug_assert_eq!(self.balance, event.balance_after);
    }

    pub fn handle_posting(&self, command: &PostingCommand) -> Result<WalletEvent, WalletError> {
        match command.action {
            PostingAction::Credit => {
                let overflow = || WalletError::BalanceOverflow {
                    user_id: self.user_id.clone(),
                };
                let balance_after = self
                    .balance
                    .checked_add(command.amount)
                    .ok_or_else(overflow)?;
                // near the mantissa limit rust_decimal rounds instead of failing
                let scale = self.balance.scale().max(command.amount.scale());
                if !money::fits(balance_after) || balance_after.scale() < scale {
                    return Err(overflow());
                }
                Ok(WalletEvent {
                    kind: command.kind,
                    amount: command.amount,
                    delta: command.amount,
                    balance_after,
                    description: command.description.clone(),
                })
            }
            PostingAction::Debit => {
                if self.balance < command.amount {
                    return Err(WalletError::InsufficientFunds {
                        user_id: self.user_id.clone(),
                        balance: self.balance,
                        requested: command.amount,
                    });
                }
                // outgoing transfer legs are recorded negative, withdrawals positive
                let amount = match command.kind {
                    TransactionKind::Transfer => -command.amount,
                    TransactionKind::Deposit | TransactionKind::Withdrawal => command.amount,
                };
                Ok(WalletEvent {
                    kind: command.kind,
                    amount,
                    delta: -command.amount,
                    balance_after: self.balance - command.amount,
                    description: command.description.clone(),
                })
            }
        }
    }
}
