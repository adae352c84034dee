use std::io::Write;

use csv::Writer;
use rust_decimal::Decimal;
use serde::Serialize;

use crate::query::TransactionView;

#[derive(Debug, Serialize)]
pub struct BalanceRow {
    pub user: String,
    pub balance: Decimal,
}

pub fn print_balances<W>(
    output: &mut W,
    rows: impl Iterator<Item = BalanceRow>,
) -> anyhow::Result<()>
where
    W: Write,
{
    print_rows(output, rows)
}

pub fn print_history<W>(
    output: &mut W,
    rows: impl Iterator<Item = TransactionView>,
) -> anyhow::Result<()>
where
    W: Write,
{
    print_rows(output, rows)
}

fn print_rows<W, T>(output: &mut W, rows: impl Iterator<Item = T>) -> anyhow::Result<()>
where
    W: Write,
    T: Serialize,
{
    let mut writer = Writer::from_writer(output);
    for row in rows {
        if let Err(err) = writer.serialize(row) {
            anyhow::bail!("Failed to write to CSV: {err}")
        }
    }
    // Ensure all data is flushed to the output
    if let Err(err) = writer.flush() {
        anyhow::bail!("Failed to flush CSV writer: {err}")
    }
    Ok(())
}
