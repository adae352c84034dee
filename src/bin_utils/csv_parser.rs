use std::io::Read;

use crate::command::CommandKind;
use csv::{DeserializeRecordsIntoIter, Trim};
use rust_decimal::Decimal;
use serde::Deserialize;

#[derive(Debug, Deserialize)]
pub struct CommandRow {
    pub command: CommandKind,
    pub user: String,
    pub counterparty: Option<String>,
    /// Parsed from text, so `100.00` keeps its scale.
    #[serde(default, with = "rust_decimal::serde::str_option")]
    pub amount: Option<Decimal>,
    pub description: Option<String>,
}

/// Parses wallet commands in CSV format, yielding each row with its line number.
pub struct CsvCommandParser<R> {
    iter: DeserializeRecordsIntoIter<R, CommandRow>,
}

impl<R> CsvCommandParser<R>
where
    R: Read,
{
    pub fn new(source: R) -> Self {
        let reader = csv::ReaderBuilder::new()
            .trim(Trim::All)
            .flexible(true)
            .from_reader(source);

        Self {
            iter: reader.into_deserialize(),
        }
    }
}

impl<R> Iterator for CsvCommandParser<R>
where
    R: Read,
{
    type Item = (u64, csv::Result<CommandRow>);

    fn next(&mut self) -> Option<Self::Item> {
        let curr_line = self.iter.reader().position().line();
        self.iter.next().map(|row| (curr_line, row))
    }
}

#[cfg(test)]
mod tests {
    use rust_decimal_macros::dec;

    use super::*;

    #[test]
    fn parses_rows_with_optional_columns() {
        let input = "\
command, user, counterparty, amount, description
create, alice,,,
deposit, alice,, 100.00, salary
transfer, alice, bob, 20
";
        let rows: Vec<_> = CsvCommandParser::new(input.as_bytes())
            .map(|(line, row)| (line, row.unwrap()))
            .collect();
        assert_eq!(rows.len(), 3);

        let (_, create) = &rows[0];
        assert_eq!(create.command, CommandKind::Create);
        assert_eq!(create.user, "alice");
        assert_eq!(create.amount, None);

        let (_, deposit) = &rows[1];
        assert_eq!(deposit.amount, Some(dec!(100.00)));
        assert_eq!(deposit.description.as_deref(), Some("salary"));

        let (_, transfer) = &rows[2];
        assert_eq!(transfer.command, CommandKind::Transfer);
        assert_eq!(transfer.counterparty.as_deref(), Some("bob"));
        assert_eq!(transfer.description, None);
    }

    #[test]
    fn unknown_command_is_an_error() {
        let input = "command,user,counterparty,amount,description\nrefund,alice,,1,\n";
        let mut parser = CsvCommandParser::new(input.as_bytes());
        let (_, row) = parser.next().unwrap();
        assert!(row.is_err());
        assert!(parser.next().is_none());
    }
}
