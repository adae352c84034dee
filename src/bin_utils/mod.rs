//! This module could be a separate crate on its own, to bootstrap [`crate::engine`] within
//! the binary, but it is kept here so integration tests can drive it.

use std::{
    collections::BTreeSet,
    io::{Read, Write},
};

use crate::{
    command::LedgerCommand,
    engine::{CommandOutcome, LedgerEngine, LedgerError},
    store::LedgerStore,
};
use anyhow::{Context, Result};
use csv_parser::CsvCommandParser;
use csv_printer::{BalanceRow, print_balances, print_history};
pub mod csv_parser;
pub mod csv_printer;

/// What to print once every command has been applied.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Report {
    /// `user,balance` for every wallet the batch touched, sorted by user id.
    Balances,
    /// Ledger of one wallet, newest first.
    History { user_id: String },
}

pub struct Service<'w, R, W: 'w, S> {
    pub input: R,
    pub output: &'w mut W,
    pub engine: LedgerEngine<S>,
    pub report: Report,
    pub error_printer: Box<dyn FnMut(u64, LedgerError)>,
}

impl<'w, R, W, S> Service<'w, R, W, S>
where
    R: Read,
    W: Write + 'w,
    S: LedgerStore,
{
    pub fn run(mut self) -> Result<()> {
        let parser = CsvCommandParser::new(self.input);
        let mut users = BTreeSet::new();

        for (line, row) in parser {
            let row = row.with_context(|| format!("Malformed row at line {line}"))?;
            let command = match LedgerCommand::parse_command(
                row.command,
                &row.user,
                row.counterparty.as_deref(),
                row.amount,
                row.description.as_deref(),
            ) {
                Ok(command) => command,
                Err(err) => {
                    (self.error_printer)(line, err.into());
                    continue;
                }
            };
            match self.engine.execute(command) {
                Ok(outcome) => {
                    if matches!(outcome, CommandOutcome::Transferred) {
                        users.extend(row.counterparty);
                    }
                    users.insert(row.user);
                }
                Err(err) => (self.error_printer)(line, err),
            }
        }

        match self.report {
            Report::Balances => {
                let rows = users
                    .into_iter()
                    .map(|user| {
                        Ok(BalanceRow {
                            balance: self.engine.balance(&user)?,
                            user,
                        })
                    })
                    .collect::<Result<Vec<_>, LedgerError>>()?;
                print_balances(self.output, rows.into_iter())
            }
            Report::History { user_id } => {
                let history = self
                    .engine
                    .queries()
                    .transaction_history(&user_id)
                    .with_context(|| format!("Failed to load history of `{user_id}`"))?;
                print_history(self.output, history.into_iter())
            }
        }
    }
}
