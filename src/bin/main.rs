// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2025 Daniel Negri
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU Affero General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the
// GNU Affero General Public License for more details.
//
// You should have received a copy of the GNU Affero General Public License
// along with this program. If not, see <https://www.gnu.org/licenses/>.

use clap::Parser;
use csv::{ReaderBuilder, Trim, Writer};
use earnings_ledger_rs::balance::format_amount;
use earnings_ledger_rs::config::{
    CURRENCY_ENV_VAR, DEFAULT_CURRENCY, LOG_ENV_VAR, PRECISION_ENV_VAR,
};
use earnings_ledger_rs::{
    Engine, InMemoryGateway, LedgerConfig, Transaction, TransactionId, TransactionStatus,
    TransactionType, UserId, is_valid_amount,
};
use rust_decimal::Decimal;
use serde::Deserialize;
use std::collections::BTreeSet;
use std::error::Error;
use std::fs::File;
use std::io::{BufReader, Read, Write};
use std::path::PathBuf;
use std::process;
use std::sync::Arc;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

/// Earnings Ledger - Summarize a transaction export
///
/// Reads exported transaction rows from a CSV file and writes one balance
/// summary per user to stdout.
#[derive(Parser, Debug)]
#[command(name = "earnings-ledger-rs")]
#[command(about = "Derives user balances from a transaction export CSV", long_about = None)]
struct Args {
    /// Path to CSV file with transactions
    ///
    /// Expected format: id,user,type,status,amount,description
    /// Example: cargo run -- transactions.csv > balances.csv
    #[arg(value_name = "FILE")]
    input: PathBuf,

    /// Decimal places in the output
    #[arg(long, env = PRECISION_ENV_VAR, default_value_t = 2)]
    precision: u32,

    /// Currency label used in log output
    #[arg(long, env = CURRENCY_ENV_VAR, default_value = DEFAULT_CURRENCY)]
    currency: String,
}

#[tokio::main]
async fn main() {
    // Logs go to stderr so stdout stays valid CSV
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_env(LOG_ENV_VAR)
                .unwrap_or_else(|_| "earnings_ledger_rs=info".into()),
        )
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();

    let file = match File::open(&args.input) {
        Ok(f) => f,
        Err(e) => {
            error!("Error opening file '{}': {}", args.input.display(), e);
            process::exit(1);
        }
    };

    let (gateway, users) = match load_transactions(BufReader::new(file)) {
        Ok(loaded) => loaded,
        Err(e) => {
            error!("Error reading transactions: {}", e);
            process::exit(1);
        }
    };
    info!(users = users.len(), rows = gateway.transaction_count(), "loaded export");

    let config = LedgerConfig {
        currency: args.currency,
        display_precision: args.precision,
        ..LedgerConfig::default()
    };
    let engine = Engine::with_config(Arc::new(gateway), config);

    match write_summaries(&engine, &users, std::io::stdout()).await {
        Ok(total) => {
            let config = engine.config();
            info!(
                total = %format_amount(total, &config.currency, config.display_precision),
                "wrote summaries"
            );
        }
        Err(e) => {
            error!("Error writing output: {}", e);
            process::exit(1);
        }
    }
}

/// Raw CSV record matching the export format.
///
/// Fields: `id, user, type, status, amount, description`
#[derive(Debug, Deserialize)]
struct CsvRecord {
    #[serde(default, deserialize_with = "csv::invalid_option")]
    id: Option<TransactionId>,
    user: UserId,
    #[serde(rename = "type")]
    tx_type: String,
    status: String,
    #[serde(deserialize_with = "csv::invalid_option")]
    amount: Option<Decimal>,
    #[serde(default)]
    description: Option<String>,
}

impl CsvRecord {
    /// Converts the record into a transaction row.
    ///
    /// Returns `None` for unknown types or statuses and for amounts that are
    /// not positive or exceed [`earnings_ledger_rs::MAX_AMOUNT`].
    fn into_transaction(self) -> Option<Transaction> {
        let transaction_type: TransactionType = self.tx_type.parse().ok()?;
        let status: TransactionStatus = self.status.parse().ok()?;
        let amount = self.amount.filter(|amount| is_valid_amount(*amount))?;
        let now = chrono::Utc::now();

        Some(Transaction {
            id: self.id.unwrap_or_else(TransactionId::new_v4),
            user_id: self.user,
            amount,
            transaction_type,
            status,
            description: self.description.unwrap_or_default(),
            metadata: None,
            created_at: now,
            updated_at: now,
        })
    }
}

/// Loads an export into an in-memory gateway.
///
/// Rows are streamed, so large exports are never held as text. Malformed
/// rows, invalid records and duplicate ids are skipped with a warning.
///
/// # CSV Format
///
/// Expected columns: `id, user, type, status, amount, description`
/// - `id`: Transaction UUID (optional; generated when empty)
/// - `user`: User UUID
/// - `type`: deposit, earning, referral_commission, withdrawal, subscription_payment
/// - `status`: pending, completed, declined
/// - `amount`: Positive decimal amount, at most [`earnings_ledger_rs::MAX_AMOUNT`]
/// - `description`: Free text (optional)
///
/// # Errors
///
/// Returns a CSV error if the reader fails or the header is unreadable.
fn load_transactions<R: Read>(
    reader: R,
) -> Result<(InMemoryGateway, BTreeSet<UserId>), csv::Error> {
    let gateway = InMemoryGateway::new();
    let mut users = BTreeSet::new();

    let mut rdr = ReaderBuilder::new()
        .trim(Trim::All) // Handle whitespace in fields like " earning "
        .flexible(true) // Allow missing trailing description
        .has_headers(true)
        .from_reader(reader);

    for (line, result) in rdr.deserialize::<CsvRecord>().enumerate() {
        let record = match result {
            Ok(record) => record,
            Err(e) => {
                warn!(line = line + 2, "Skipping malformed row: {}", e);
                continue;
            }
        };

        let Some(tx) = record.into_transaction() else {
            warn!(line = line + 2, "Skipping invalid transaction record");
            continue;
        };

        let user_id = tx.user_id;
        if let Err(e) = gateway.restore_transaction(tx) {
            warn!(line = line + 2, "Skipping row: {}", e);
            continue;
        }
        users.insert(user_id);
    }

    Ok((gateway, users))
}

/// Writes one summary per user, in user id order, and returns the sum of
/// all balances.
///
/// # CSV Format
///
/// Columns: `user, balance, earned, spent, pending_withdrawals`
///
/// ```csv
/// user,balance,earned,spent,pending_withdrawals
/// 0b7c...,400.00,500.00,100.00,200.00
/// ```
async fn write_summaries<W: Write>(
    engine: &Engine,
    users: &BTreeSet<UserId>,
    writer: W,
) -> Result<Decimal, Box<dyn Error>> {
    let mut wtr = Writer::from_writer(writer);
    let mut total = Decimal::ZERO;

    for user in users {
        let summary = engine.account_summary(*user).await?;
        total += summary.balance;
        wtr.serialize(summary)?;
    }

    wtr.flush()?;
    Ok(total)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;
    use std::io::Cursor;

    const ALICE: &str = "11111111-1111-4111-8111-111111111111";
    const BOB: &str = "22222222-2222-4222-8222-222222222222";

    fn engine_for(csv: &str) -> (Engine, BTreeSet<UserId>) {
        let (gateway, users) = load_transactions(Cursor::new(csv.to_string())).unwrap();
        (Engine::new(Arc::new(gateway)), users)
    }

    #[tokio::test]
    async fn parse_completed_earning() {
        let csv = format!("id,user,type,status,amount,description\n,{ALICE},earning,completed,100.0,Trivia\n");
        let (engine, users) = engine_for(&csv);

        assert_eq!(users.len(), 1);
        let alice: UserId = ALICE.parse().unwrap();
        assert_eq!(engine.get_balance(alice).await.unwrap(), dec!(100.0));
    }

    #[tokio::test]
    async fn pending_and_declined_do_not_count() {
        let csv = format!(
            "id,user,type,status,amount,description\n\
             ,{ALICE},earning,completed,500,\n\
             ,{ALICE},withdrawal,pending,200,\n\
             ,{ALICE},withdrawal,completed,100,\n\
             ,{ALICE},deposit,declined,50,\n"
        );
        let (engine, _) = engine_for(&csv);

        let alice: UserId = ALICE.parse().unwrap();
        assert_eq!(engine.get_balance(alice).await.unwrap(), dec!(400));
    }

    #[tokio::test]
    async fn parse_with_whitespace_and_missing_description() {
        let csv = format!("id,user,type,status,amount\n , {ALICE} , Earning , COMPLETED , 7.5 \n");
        let (engine, users) = engine_for(&csv);

        assert_eq!(users.len(), 1);
        let alice: UserId = ALICE.parse().unwrap();
        assert_eq!(engine.get_balance(alice).await.unwrap(), dec!(7.5));
    }

    #[tokio::test]
    async fn skip_malformed_and_invalid_rows() {
        let csv = format!(
            "id,user,type,status,amount,description\n\
             ,{ALICE},earning,completed,10,\n\
             ,not-a-user,earning,completed,10,\n\
             ,{BOB},refund,completed,10,\n\
             ,{BOB},earning,completed,-5,\n\
             ,{BOB},earning,completed,20,\n"
        );
        let (engine, users) = engine_for(&csv);

        assert_eq!(users.len(), 2);
        let bob: UserId = BOB.parse().unwrap();
        assert_eq!(engine.get_balance(bob).await.unwrap(), dec!(20));
    }

    #[tokio::test]
    async fn skip_amounts_over_the_cap() {
        let over = earnings_ledger_rs::MAX_AMOUNT + dec!(1);
        let csv = format!(
            "id,user,type,status,amount,description
             ,{ALICE},earning,completed,79228162514264337593543950335,
             ,{ALICE},earning,completed,79228162514264337593543950335,
             ,{ALICE},earning,completed,{over},
             ,{ALICE},earning,completed,1000000000,
"
        );
        let (engine, _) = engine_for(&csv);

        let alice: UserId = ALICE.parse().unwrap();
        assert_eq!(engine.get_balance(alice).await.unwrap(), dec!(1000000000));
    }

    #[tokio::test]
    async fn skip_duplicate_ids() {
        let id = "33333333-3333-4333-8333-333333333333";
        let csv = format!(
            "id,user,type,status,amount,description\n\
             {id},{ALICE},earning,completed,10,\n\
             {id},{ALICE},earning,completed,10,\n"
        );
        let (engine, _) = engine_for(&csv);

        let alice: UserId = ALICE.parse().unwrap();
        assert_eq!(engine.get_balance(alice).await.unwrap(), dec!(10));
    }

    #[tokio::test]
    async fn write_summaries_to_csv() {
        let csv = format!(
            "id,user,type,status,amount,description\n\
             ,{BOB},earning,completed,200.25,\n\
             ,{ALICE},earning,completed,500,\n\
             ,{ALICE},withdrawal,pending,200,\n\
             ,{ALICE},withdrawal,completed,100,\n"
        );
        let (engine, users) = engine_for(&csv);

        let mut output = Vec::new();
        let total = write_summaries(&engine, &users, &mut output).await.unwrap();
        assert_eq!(total, dec!(600.25));

        let output = String::from_utf8(output).unwrap();
        let lines: Vec<&str> = output.lines().collect();
        assert_eq!(lines[0], "user,balance,earned,spent,pending_withdrawals");
        assert_eq!(lines[1], format!("{ALICE},400.00,500.00,100.00,200.00"));
        assert_eq!(lines[2], format!("{BOB},200.25,200.25,0.00,0.00"));
    }
}
