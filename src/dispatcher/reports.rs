use anyhow::{Context as _, Result};
use chrono::NaiveDate;
use tracing::info;

use super::{print_json, Context};
use crate::cli::formatters;
use holdings::reports;

pub fn dispatch_summary(ctx: &Context) -> Result<()> {
    info!("Generating portfolio summary");
    let conn = ctx.connect()?;
    let summary = reports::calculate_summary(&conn)?;

    if ctx.json {
        return print_json(&summary);
    }
    if summary.instruments.is_empty() {
        println!("{}", formatters::format_empty_portfolio());
        return Ok(());
    }
    println!("{}", formatters::format_summary_table(&summary));
    Ok(())
}

pub fn dispatch_show(ctx: &Context, id: i64) -> Result<()> {
    let conn = ctx.connect()?;
    let details = reports::instrument_details(&conn, id)?
        .with_context(|| format!("Instrument {} not found", id))?;

    if ctx.json {
        return print_json(&details);
    }
    println!("{}", formatters::format_instrument_details(&details));
    Ok(())
}

pub fn dispatch_period(ctx: &Context, from: NaiveDate, to: NaiveDate) -> Result<()> {
    let conn = ctx.connect()?;
    let report = reports::period_report(&conn, from, to)?;

    if ctx.json {
        return print_json(&report);
    }
    println!("{}", formatters::format_period_table(&report));
    Ok(())
}

pub fn dispatch_insights(ctx: &Context) -> Result<()> {
    let conn = ctx.connect()?;
    let summary = reports::calculate_summary(&conn)?;
    let insights = reports::generate_insights(&summary);

    if ctx.json {
        return print_json(&insights);
    }
    if summary.instruments.is_empty() {
        println!("{}", formatters::format_empty_portfolio());
        return Ok(());
    }
    println!("{}", formatters::format_insights(&insights));
    Ok(())
}

pub fn dispatch_audit(ctx: &Context, top: usize) -> Result<()> {
    let conn = ctx.connect()?;
    let summary = reports::calculate_summary(&conn)?;

    if ctx.json {
        return print_json(&summary.largest_shortfalls(top));
    }
    if summary.instruments.is_empty() {
        println!("{}", formatters::format_empty_portfolio());
        return Ok(());
    }
    println!("{}", formatters::format_audit_table(&summary, top));
    Ok(())
}
