//! Command dispatcher that routes parsed clap commands to their handlers.
//!
//! Every handler receives a [`Context`] carrying the resolved database path,
//! the classification thresholds and the output mode, so nothing below reads
//! the environment on its own.

mod flows;
mod ledger;
mod merge;
mod reports;

use anyhow::Result;
use rusqlite::Connection;
use std::path::PathBuf;

use crate::cli::{Commands, RecordCommands};
use holdings::config::Thresholds;
use holdings::db;

/// Settings resolved from config file and global flags
#[derive(Debug, Clone)]
pub struct Context {
    pub db_path: Option<PathBuf>,
    pub thresholds: Thresholds,
    pub json: bool,
}

impl Context {
    /// Create the schema if needed and open a connection
    pub fn connect(&self) -> Result<Connection> {
        db::init_database(self.db_path.clone())?;
        db::open_db(self.db_path.clone())
    }
}

/// Route a parsed command to its handler
pub fn dispatch_command(command: Commands, ctx: &Context) -> Result<()> {
    match command {
        Commands::Init => ledger::dispatch_init(ctx),
        Commands::Record { action } => match action {
            RecordCommands::Balance {
                custodian,
                instrument,
                date,
                value,
                category,
            } => ledger::dispatch_record_balance(
                ctx,
                holdings::importers::PositionEntry {
                    custodian,
                    instrument,
                    category,
                    date,
                    total_value: value,
                },
            ),
            RecordCommands::Flow {
                custodian,
                instrument,
                date,
                direction,
                amount,
                category,
            } => ledger::dispatch_record_flow(
                ctx,
                holdings::importers::FlowEntry {
                    custodian,
                    instrument,
                    category,
                    date,
                    direction,
                    amount,
                },
            ),
        },
        Commands::Merge { dry_run } => merge::dispatch_merge(ctx, dry_run),
        Commands::Reclassify {
            policy,
            instrument,
            up,
            down,
        } => flows::dispatch_reclassify(ctx, policy, instrument, up, down),
        Commands::Summary => reports::dispatch_summary(ctx),
        Commands::Show { id } => reports::dispatch_show(ctx, id),
        Commands::Period { from, to } => reports::dispatch_period(ctx, from, to),
        Commands::Insights => reports::dispatch_insights(ctx),
        Commands::Audit { top } => reports::dispatch_audit(ctx, top),
        Commands::ClearDate { date } => ledger::dispatch_clear_date(ctx, date),
        Commands::ClearAll { yes } => ledger::dispatch_clear_all(ctx, yes),
    }
}

/// Print any serializable value as pretty JSON
fn print_json<T: serde::Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
