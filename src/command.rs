use rust_decimal::Decimal;
use serde::Deserialize;
use thiserror::Error;

use crate::{money, transaction::TransactionKind};

/// Command names accepted from external input.
#[derive(Debug, Clone, Copy, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum CommandKind {
    Create,
    Deposit,
    Withdraw,
    Transfer,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PostingAction {
    Credit,
    Debit,
}

/// One balance change against one wallet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PostingCommand {
    pub kind: TransactionKind,
    pub action: PostingAction,
    pub amount: Decimal,
    pub description: Option<String>,
}

/// Both legs of a transfer. Legs are annotated with the counterparty.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransferCommand {
    pub from_user_id: String,
    pub to_user_id: String,
    pub debit: PostingCommand,
    pub credit: PostingCommand,
}

impl TransferCommand {
    pub fn new(
        from_user_id: &str,
        to_user_id: &str,
        amount: Decimal,
        description: Option<&str>,
    ) -> Result<Self, CommandError> {
        let from_user_id = parse_user_id(from_user_id)?;
        let to_user_id = parse_user_id(to_user_id)?;
        let amount = parse_amount(amount)?;
        if from_user_id == to_user_id {
            return Err(CommandError::SameWallet {
                user_id: from_user_id,
            });
        }
        Ok(Self {
            debit: PostingCommand {
                kind: TransactionKind::Transfer,
                action: PostingAction::Debit,
                amount,
                description: Some(leg_description("to", &to_user_id, description)),
            },
            credit: PostingCommand {
                kind: TransactionKind::Transfer,
                action: PostingAction::Credit,
                amount,
                description: Some(leg_description("from", &from_user_id, description)),
            },
            from_user_id,
            to_user_id,
        })
    }

    pub fn amount(&self) -> Decimal {
        self.debit.amount
    }
}

impl PostingCommand {
    pub fn deposit(amount: Decimal, description: Option<&str>) -> Result<Self, CommandError> {
        Ok(Self {
            kind: TransactionKind::Deposit,
            action: PostingAction::Credit,
            amount: parse_amount(amount)?,
            description: description.map(ToOwned::to_owned),
        })
    }

    pub fn withdrawal(amount: Decimal, description: Option<&str>) -> Result<Self, CommandError> {
        Ok(Self {
            kind: TransactionKind::Withdrawal,
            action: PostingAction::Debit,
            amount: parse_amount(amount)?,
            description: description.map(ToOwned::to_owned),
        })
    }
}

#[derive(Debug, Error)]
pub enum CommandError {
    #[error("User id must not be blank")]
    BlankUserId,
    #[error("Amount is required for {kind:?}")]
    AmountRequired { kind: CommandKind },
    #[error("Counterparty is required for {kind:?}")]
    CounterpartyRequired { kind: CommandKind },
    #[error("Amount must be greater than zero, got {amount}")]
    InvalidAmount { amount: Decimal },
    #[error("Cannot transfer from `{user_id}` to the same wallet")]
    SameWallet { user_id: String },
}

/// Validated request against the ledger. Everything that can be checked without
/// looking at stored state is checked when the command is built.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LedgerCommand {
    CreateWallet { user_id: String },
    Post { user_id: String, posting: PostingCommand },
    Transfer(TransferCommand),
}

impl LedgerCommand {
    pub fn create_wallet(user_id: &str) -> Result<Self, CommandError> {
        Ok(Self::CreateWallet {
            user_id: parse_user_id(user_id)?,
        })
    }

    pub fn deposit(
        user_id: &str,
        amount: Decimal,
        description: Option<&str>,
    ) -> Result<Self, CommandError> {
        Ok(Self::Post {
            user_id: parse_user_id(user_id)?,
            posting: PostingCommand::deposit(amount, description)?,
        })
    }

    pub fn withdraw(
        user_id: &str,
        amount: Decimal,
        description: Option<&str>,
    ) -> Result<Self, CommandError> {
        Ok(Self::Post {
            user_id: parse_user_id(user_id)?,
            posting: PostingCommand::withdrawal(amount, description)?,
        })
    }

    pub fn transfer(
        from_user_id: &str,
        to_user_id: &str,
        amount: Decimal,
        description: Option<&str>,
    ) -> Result<Self, CommandError> {
        TransferCommand::new(from_user_id, to_user_id, amount, description).map(Self::Transfer)
    }

    /// Builds a command from loosely typed input, e.g. a CSV row.
    pub fn parse_command(
        kind: CommandKind,
        user_id: &str,
        counterparty: Option<&str>,
        amount: Option<Decimal>,
        description: Option<&str>,
    ) -> Result<Self, CommandError> {
        match kind {
            CommandKind::Create => Self::create_wallet(user_id),
            CommandKind::Deposit => Self::deposit(
                user_id,
                amount.ok_or(CommandError::AmountRequired { kind })?,
                description,
            ),
            CommandKind::Withdraw => Self::withdraw(
                user_id,
                amount.ok_or(CommandError::AmountRequired { kind })?,
                description,
            ),
            CommandKind::Transfer => {
                let Some(counterparty) = counterparty else {
                    return Err(CommandError::CounterpartyRequired { kind });
                };
                Self::transfer(
                    user_id,
                    counterparty,
                    amount.ok_or(CommandError::AmountRequired { kind })?,
                    description,
                )
            }
        }
    }
}

pub(crate) fn parse_user_id(user_id: &str) -> Result<String, CommandError> {
    if user_id.trim().is_empty() {
        Err(CommandError::BlankUserId)
    } else {
        Ok(user_id.to_string())
    }
}

fn parse_amount(amount: Decimal) -> Result<Decimal, CommandError> {
    let normalized = money::normalize(amount);
    if normalized > Decimal::ZERO && money::fits(normalized) {
        Ok(normalized)
    } else {
        Err(CommandError::InvalidAmount { amount })
    }
}

fn leg_description(direction: &str, counterparty: &str, description: Option<&str>) -> String {
    match description {
        Some(description) if !description.is_empty() => {
            format!("Transfer {direction} {counterparty}: {description}")
        }
        _ => format!("Transfer {direction} {counterparty}"),
    }
}
