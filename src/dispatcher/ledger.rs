use anyhow::Result;
use chrono::NaiveDate;
use colored::Colorize;
use tracing::info;

use super::{print_json, Context};
use holdings::db;
use holdings::importers::{self, FlowEntry, ImportOutcome, PositionEntry};
use holdings::utils::format_currency;

pub fn dispatch_init(ctx: &Context) -> Result<()> {
    let path = match &ctx.db_path {
        Some(path) => path.clone(),
        None => db::get_default_db_path()?,
    };
    db::init_database(Some(path.clone()))?;

    if ctx.json {
        return print_json(&serde_json::json!({ "database": path }));
    }
    println!("{} Database ready at {}", "✓".green().bold(), path.display());
    Ok(())
}

fn outcome_label(outcome: ImportOutcome) -> colored::ColoredString {
    match outcome {
        ImportOutcome::Created => "created".green(),
        ImportOutcome::Updated => "updated".cyan(),
        ImportOutcome::Skipped => "skipped".yellow(),
    }
}

pub fn dispatch_record_balance(ctx: &Context, entry: PositionEntry) -> Result<()> {
    let conn = ctx.connect()?;
    let outcome = importers::record_position(&conn, &entry)?;

    if ctx.json {
        return print_json(&serde_json::json!({ "outcome": outcome, "entry": entry }));
    }
    println!(
        "{} {} {} on {}: {}",
        "✓".green().bold(),
        entry.instrument,
        outcome_label(outcome),
        entry.date,
        format_currency(entry.total_value)
    );
    Ok(())
}

pub fn dispatch_record_flow(ctx: &Context, entry: FlowEntry) -> Result<()> {
    let conn = ctx.connect()?;
    let outcome = importers::record_flow(&conn, &entry)?;

    if ctx.json {
        return print_json(&serde_json::json!({ "outcome": outcome, "entry": entry }));
    }
    println!(
        "{} {} {:?} {} on {}: {}",
        "✓".green().bold(),
        entry.instrument,
        entry.direction,
        outcome_label(outcome),
        entry.date,
        format_currency(entry.amount)
    );
    Ok(())
}

pub fn dispatch_clear_date(ctx: &Context, date: NaiveDate) -> Result<()> {
    let conn = ctx.connect()?;
    let deleted = db::delete_snapshots_on_date(&conn, date)?;

    if ctx.json {
        return print_json(&serde_json::json!({ "date": date, "deleted": deleted }));
    }
    println!(
        "{} Deleted {} snapshots dated {}",
        "✓".green().bold(),
        deleted,
        date
    );
    Ok(())
}

pub fn dispatch_clear_all(ctx: &Context, confirmed: bool) -> Result<()> {
    if !confirmed {
        anyhow::bail!("Refusing to delete all data without --yes");
    }

    let mut conn = ctx.connect()?;
    let (snapshots, instruments, custodians) = db::clear_all(&mut conn)?;
    info!("Ledger cleared");

    if ctx.json {
        return print_json(&serde_json::json!({
            "snapshots": snapshots,
            "instruments": instruments,
            "custodians": custodians,
        }));
    }
    println!(
        "{} Removed {} snapshots, {} instruments, {} custodians",
        "✓".green().bold(),
        snapshots,
        instruments,
        custodians
    );
    Ok(())
}
