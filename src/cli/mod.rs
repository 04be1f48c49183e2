use chrono::NaiveDate;
use clap::{Parser, Subcommand};
use rust_decimal::Decimal;
use std::path::PathBuf;

use holdings::db::InstrumentCategory;
use holdings::flows::PolicyKind;
use holdings::importers::FlowDirection;

pub mod formatters;

#[derive(Parser)]
#[command(name = "holdings")]
#[command(
    version,
    about = "Multi-custodian portfolio tracker with balance reconciliation"
)]
#[command(
    long_about = "Track balances of investments held across banks and brokerages, merge instruments recorded under inconsistent names, separate contributions and withdrawals from yield, and report returns."
)]
pub struct Cli {
    /// Disable colorized/ANSI output
    #[arg(long = "no-color", global = true)]
    pub no_color: bool,

    /// Output results in JSON format
    #[arg(long = "json", global = true)]
    pub json: bool,

    /// Database file (default: ~/.holdings/data.db)
    #[arg(long = "db", global = true, value_name = "PATH")]
    pub db: Option<PathBuf>,

    /// Config file (default: $HOLDINGS_CONFIG or the platform config dir)
    #[arg(long = "config", global = true, value_name = "PATH")]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Create the database if it does not exist
    Init,

    /// Record a balance or an explicit capital flow
    Record {
        #[command(subcommand)]
        action: RecordCommands,
    },

    /// Merge custodians and instruments whose names normalize to the same key
    Merge {
        /// Show the duplicate groups without changing anything
        #[arg(long)]
        dry_run: bool,
    },

    /// Recompute contributions and withdrawals from the balance series
    Reclassify {
        /// Classification policy to apply
        #[arg(long, value_enum)]
        policy: PolicyKind,

        /// Only this instrument id
        #[arg(long)]
        instrument: Option<i64>,

        /// Rise (in % of the previous balance) above which a change is a contribution
        #[arg(long, value_parser = parse_decimal_arg)]
        up: Option<Decimal>,

        /// Fall (in % of the previous balance) beyond which a change is a withdrawal
        #[arg(long, value_parser = parse_decimal_arg)]
        down: Option<Decimal>,
    },

    /// Portfolio totals and every instrument, largest balance first
    Summary,

    /// Metrics and balance history of one instrument
    Show {
        /// Instrument id
        id: i64,
    },

    /// Yield between two snapshot dates, net of contributions and withdrawals
    Period {
        /// Start date (YYYY-MM-DD)
        from: NaiveDate,

        /// End date (YYYY-MM-DD)
        to: NaiveDate,
    },

    /// Rule-based observations on concentration, allocation and performance
    Insights,

    /// Instruments whose balance sits furthest below their invested capital
    Audit {
        /// How many instruments to list
        #[arg(long, default_value_t = 15)]
        top: usize,
    },

    /// Delete every snapshot recorded on a date
    ClearDate {
        /// Snapshot date to remove (YYYY-MM-DD)
        date: NaiveDate,
    },

    /// Delete all custodians, instruments and snapshots
    ClearAll {
        /// Confirm the deletion
        #[arg(long)]
        yes: bool,
    },
}

#[derive(Subcommand)]
pub enum RecordCommands {
    /// Record the balance of an instrument on a date
    Balance {
        /// Custodian (bank or brokerage) name
        #[arg(long)]
        custodian: String,

        /// Instrument name
        #[arg(long)]
        instrument: String,

        /// Snapshot date (YYYY-MM-DD)
        #[arg(long)]
        date: NaiveDate,

        /// Balance, e.g. 1234.56 or 1.234,56
        #[arg(long, value_parser = parse_decimal_arg)]
        value: Decimal,

        /// Category (detected from the name when omitted)
        #[arg(long, value_parser = parse_category_arg)]
        category: Option<InstrumentCategory>,
    },

    /// Record a contribution (debit) or withdrawal (credit)
    Flow {
        #[arg(long)]
        custodian: String,

        #[arg(long)]
        instrument: String,

        /// Movement date (YYYY-MM-DD)
        #[arg(long)]
        date: NaiveDate,

        /// debit = money into the instrument, credit = money out
        #[arg(long, value_enum)]
        direction: FlowDirection,

        #[arg(long, value_parser = parse_decimal_arg)]
        amount: Decimal,

        #[arg(long, value_parser = parse_category_arg)]
        category: Option<InstrumentCategory>,
    },
}

fn parse_decimal_arg(raw: &str) -> Result<Decimal, String> {
    holdings::utils::parse_amount(raw).ok_or_else(|| format!("invalid amount: {}", raw))
}

fn parse_category_arg(raw: &str) -> Result<InstrumentCategory, String> {
    raw.parse::<InstrumentCategory>().map_err(|_| {
        format!(
            "invalid category: {} (expected equity, fund, fixed_income, treasury, structured_note or other)",
            raw
        )
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn parses_brazilian_amounts_and_categories() {
        let cli = Cli::try_parse_from([
            "holdings",
            "record",
            "balance",
            "--custodian",
            "Banco Inter",
            "--instrument",
            "CDB Inter",
            "--date",
            "2025-03-31",
            "--value",
            "1.234,56",
            "--category",
            "renda_fixa",
        ])
        .expect("valid arguments");

        match cli.command {
            Commands::Record {
                action: RecordCommands::Balance { value, category, .. },
            } => {
                assert_eq!(value, dec!(1234.56));
                assert_eq!(category, Some(InstrumentCategory::FixedIncome));
            }
            _ => panic!("unexpected command"),
        }
    }

    #[test]
    fn reclassify_requires_a_policy() {
        assert!(Cli::try_parse_from(["holdings", "reclassify"]).is_err());

        let cli = Cli::try_parse_from([
            "holdings",
            "--db",
            "/tmp/x.db",
            "reclassify",
            "--policy",
            "delta-threshold",
            "--up",
            "3",
        ])
        .expect("valid arguments");
        assert_eq!(cli.db, Some(PathBuf::from("/tmp/x.db")));
        match cli.command {
            Commands::Reclassify { policy, up, down, .. } => {
                assert_eq!(policy, PolicyKind::DeltaThreshold);
                assert_eq!(up, Some(dec!(3)));
                assert_eq!(down, None);
            }
            _ => panic!("unexpected command"),
        }
    }
}
