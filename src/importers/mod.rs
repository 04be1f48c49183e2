// Import module - turns parsed balance and transaction rows into ledger writes
//
// Rows arrive already parsed (numeric values, dates). This module applies the seeding convention: the first
// snapshot ever recorded for an instrument carries its whole balance as
// contribution, later balances carry no flow, and explicit transactions add
// to whatever flow the date already holds.

use anyhow::{Context, Result};
use chrono::NaiveDate;
use rusqlite::Connection;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::db::{self, Instrument, InstrumentCategory};
use crate::error::LedgerError;

/// Custodian name used when a row does not name one
pub const UNKNOWN_CUSTODIAN: &str = "Unknown";

/// A balance observation for one instrument on one date
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PositionEntry {
    pub custodian: String,
    pub instrument: String,
    pub category: Option<InstrumentCategory>,
    pub date: NaiveDate,
    pub total_value: Decimal,
}

/// Direction of an explicit account movement, seen from the instrument
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
pub enum FlowDirection {
    /// Money taken from the account into the instrument (contribution)
    Debit,
    /// Money paid back from the instrument to the account (withdrawal)
    Credit,
}

/// An explicit capital movement for one instrument on one date
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FlowEntry {
    pub custodian: String,
    pub instrument: String,
    pub category: Option<InstrumentCategory>,
    pub date: NaiveDate,
    pub direction: FlowDirection,
    pub amount: Decimal,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ImportOutcome {
    /// A new snapshot row was written
    Created,
    /// An existing snapshot row was changed
    Updated,
    /// Nothing written (non-positive value)
    Skipped,
}

fn custodian_name(raw: &str) -> &str {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        UNKNOWN_CUSTODIAN
    } else {
        trimmed
    }
}

/// Find or create the (custodian, instrument) pair a row refers to
fn resolve_instrument(
    conn: &Connection,
    custodian: &str,
    instrument: &str,
    category: Option<InstrumentCategory>,
) -> Result<Instrument> {
    let custodian = db::get_or_create_custodian(conn, custodian_name(custodian))?;
    let name = instrument.trim();
    if name.is_empty() {
        return Err(LedgerError::ValidationError("instrument name is empty".to_string()).into());
    }

    if let Some(existing) = db::find_instrument(conn, name, custodian.id)? {
        return Ok(existing);
    }

    let category = category.unwrap_or_else(|| InstrumentCategory::detect_from_name(name));
    info!(
        "Creating instrument {} ({}) under {}",
        name,
        category.as_str(),
        custodian.name
    );
    db::create_instrument(conn, name, category, custodian.id)
}

/// Record a balance observation
///
/// Overwrites only the balance when the date already has a snapshot. The
/// first snapshot of an instrument is seeded as capital; any other new
/// snapshot carries no flow.
pub fn record_position(conn: &Connection, entry: &PositionEntry) -> Result<ImportOutcome> {
    if entry.total_value <= Decimal::ZERO {
        debug!(
            "Skipping {} on {}: non-positive balance {}",
            entry.instrument, entry.date, entry.total_value
        );
        return Ok(ImportOutcome::Skipped);
    }

    let instrument = resolve_instrument(conn, &entry.custodian, &entry.instrument, entry.category)
        .with_context(|| format!("Failed to resolve instrument {}", entry.instrument))?;

    if db::find_snapshot(conn, instrument.id, entry.date)?.is_some() {
        db::upsert_snapshot(conn, instrument.id, entry.date, entry.total_value, None, None)?;
        return Ok(ImportOutcome::Updated);
    }

    let seed = if db::count_snapshots(conn, instrument.id)? == 0 {
        Some(entry.total_value)
    } else {
        None
    };
    db::upsert_snapshot(conn, instrument.id, entry.date, entry.total_value, seed, None)?;

    Ok(ImportOutcome::Created)
}

/// Record an explicit contribution or withdrawal
///
/// Amounts accumulate on the date's snapshot; the balance is left as is, or
/// zero when the date had no snapshot yet.
pub fn record_flow(conn: &Connection, entry: &FlowEntry) -> Result<ImportOutcome> {
    if entry.amount <= Decimal::ZERO {
        debug!(
            "Skipping {:?} for {} on {}: non-positive amount {}",
            entry.direction, entry.instrument, entry.date, entry.amount
        );
        return Ok(ImportOutcome::Skipped);
    }

    let instrument = resolve_instrument(conn, &entry.custodian, &entry.instrument, entry.category)
        .with_context(|| format!("Failed to resolve instrument {}", entry.instrument))?;

    let existed = db::find_snapshot(conn, instrument.id, entry.date)?.is_some();
    let (contribution, withdrawal) = match entry.direction {
        FlowDirection::Debit => (entry.amount, Decimal::ZERO),
        FlowDirection::Credit => (Decimal::ZERO, entry.amount),
    };
    db::add_snapshot_flows(conn, instrument.id, entry.date, contribution, withdrawal)?;

    Ok(if existed {
        ImportOutcome::Updated
    } else {
        ImportOutcome::Created
    })
}
