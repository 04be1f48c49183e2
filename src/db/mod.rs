// Database module - SQLite ledger store for custodians, instruments and balance snapshots

pub mod models;

use anyhow::{Context, Result};
use chrono::NaiveDate;
use rusqlite::{params, Connection, OptionalExtension};
use rust_decimal::Decimal;
use std::collections::{BTreeMap, HashMap};
use std::path::PathBuf;
use std::str::FromStr;
use tracing::{debug, info};

pub use models::{BalanceSnapshot, Custodian, Instrument, InstrumentCategory, InstrumentHistory};

/// Get the default database path (~/.holdings/data.db)
pub fn get_default_db_path() -> Result<PathBuf> {
    let home = std::env::var("HOME").context("HOME environment variable not set")?;
    let holdings_dir = PathBuf::from(home).join(".holdings");

    // Create directory if it doesn't exist
    std::fs::create_dir_all(&holdings_dir).context("Failed to create .holdings directory")?;

    Ok(holdings_dir.join("data.db"))
}

/// Open database connection
pub fn open_db(db_path: Option<PathBuf>) -> Result<Connection> {
    let path = match db_path {
        Some(path) => path,
        None => get_default_db_path()?,
    };
    let conn = Connection::open(&path).context(format!("Failed to open database at {:?}", path))?;

    // Enable foreign keys
    conn.execute("PRAGMA foreign_keys = ON", [])
        .context("Failed to enable foreign keys")?;

    Ok(conn)
}

/// Initialize the database with schema
///
/// Creates the database file if needed and runs the schema SQL. Every
/// statement is `IF NOT EXISTS`, so this is safe to call before each command.
pub fn init_database(db_path: Option<PathBuf>) -> Result<()> {
    let path = match db_path {
        Some(path) => path,
        None => get_default_db_path()?,
    };

    debug!("Initializing database at: {:?}", path);

    let conn = open_db(Some(path))?;
    conn.execute_batch(include_str!("schema.sql"))
        .context("Failed to execute schema")?;

    Ok(())
}

// ============ Custodians ============

pub fn find_custodian_by_name(conn: &Connection, name: &str) -> Result<Option<Custodian>> {
    let custodian = conn
        .query_row(
            "SELECT id, name FROM custodians WHERE name = ?1 ORDER BY id LIMIT 1",
            [name],
            |row| {
                Ok(Custodian {
                    id: row.get(0)?,
                    name: row.get(1)?,
                })
            },
        )
        .optional()?;

    Ok(custodian)
}

pub fn create_custodian(conn: &Connection, name: &str) -> Result<Custodian> {
    conn.execute("INSERT INTO custodians (name) VALUES (?1)", [name])?;

    Ok(Custodian {
        id: conn.last_insert_rowid(),
        name: name.to_string(),
    })
}

pub fn get_custodian(conn: &Connection, id: i64) -> Result<Option<Custodian>> {
    let custodian = conn
        .query_row("SELECT id, name FROM custodians WHERE id = ?1", [id], |row| {
            Ok(Custodian {
                id: row.get(0)?,
                name: row.get(1)?,
            })
        })
        .optional()?;

    Ok(custodian)
}

/// Find a custodian by its exact name or create it
pub fn get_or_create_custodian(conn: &Connection, name: &str) -> Result<Custodian> {
    if let Some(existing) = find_custodian_by_name(conn, name)? {
        return Ok(existing);
    }

    info!("Creating custodian: {}", name);
    create_custodian(conn, name)
}

/// List all custodians, oldest first
pub fn list_custodians(conn: &Connection) -> Result<Vec<Custodian>> {
    let mut stmt = conn.prepare("SELECT id, name FROM custodians ORDER BY id")?;

    let custodians = stmt
        .query_map([], |row| {
            Ok(Custodian {
                id: row.get(0)?,
                name: row.get(1)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;

    Ok(custodians)
}

/// Move every instrument of one custodian to another, returns how many moved
pub fn reparent_instruments(
    conn: &Connection,
    from_custodian_id: i64,
    to_custodian_id: i64,
) -> Result<usize> {
    let moved = conn.execute(
        "UPDATE instruments SET custodian_id = ?1 WHERE custodian_id = ?2",
        params![to_custodian_id, from_custodian_id],
    )?;

    Ok(moved)
}

/// Delete a custodian, returns the number of rows removed (0 or 1)
pub fn delete_custodian(conn: &Connection, id: i64) -> Result<usize> {
    let deleted = conn.execute("DELETE FROM custodians WHERE id = ?1", [id])?;
    Ok(deleted)
}

// ============ Instruments ============

fn instrument_from_row(row: &rusqlite::Row) -> Result<Instrument, rusqlite::Error> {
    Ok(Instrument {
        id: row.get(0)?,
        name: row.get(1)?,
        category: row.get::<_, String>(2)?.parse::<InstrumentCategory>().map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(2, rusqlite::types::Type::Text, Box::new(e))
        })?,
        custodian_id: row.get(3)?,
    })
}

pub fn find_instrument(
    conn: &Connection,
    name: &str,
    custodian_id: i64,
) -> Result<Option<Instrument>> {
    let instrument = conn
        .query_row(
            "SELECT id, name, category, custodian_id FROM instruments
             WHERE name = ?1 AND custodian_id = ?2
             ORDER BY id LIMIT 1",
            params![name, custodian_id],
            instrument_from_row,
        )
        .optional()?;

    Ok(instrument)
}

pub fn get_instrument(conn: &Connection, id: i64) -> Result<Option<Instrument>> {
    let instrument = conn
        .query_row(
            "SELECT id, name, category, custodian_id FROM instruments WHERE id = ?1",
            [id],
            instrument_from_row,
        )
        .optional()?;

    Ok(instrument)
}

pub fn create_instrument(
    conn: &Connection,
    name: &str,
    category: InstrumentCategory,
    custodian_id: i64,
) -> Result<Instrument> {
    conn.execute(
        "INSERT INTO instruments (name, category, custodian_id) VALUES (?1, ?2, ?3)",
        params![name, category.as_str(), custodian_id],
    )?;

    Ok(Instrument {
        id: conn.last_insert_rowid(),
        name: name.to_string(),
        category,
        custodian_id,
    })
}

/// List all instruments, oldest first
pub fn list_instruments(conn: &Connection) -> Result<Vec<Instrument>> {
    let mut stmt =
        conn.prepare("SELECT id, name, category, custodian_id FROM instruments ORDER BY id")?;

    let instruments = stmt
        .query_map([], instrument_from_row)?
        .collect::<Result<Vec<_>, _>>()?;

    Ok(instruments)
}

pub fn count_instruments(conn: &Connection, custodian_id: i64) -> Result<i64> {
    let count: i64 = conn.query_row(
        "SELECT COUNT(*) FROM instruments WHERE custodian_id = ?1",
        [custodian_id],
        |row| row.get(0),
    )?;
    Ok(count)
}

/// List all instruments with their snapshots ordered by date ascending
pub fn list_instrument_histories(conn: &Connection) -> Result<Vec<InstrumentHistory>> {
    let instruments = list_instruments(conn)?;

    let mut stmt = conn.prepare(
        "SELECT id, instrument_id, snapshot_date, total_value, contribution, withdrawal
         FROM balance_snapshots
         ORDER BY instrument_id ASC, snapshot_date ASC",
    )?;

    let mut by_instrument: HashMap<i64, Vec<BalanceSnapshot>> = HashMap::new();
    let rows = stmt.query_map([], snapshot_from_row)?;
    for row in rows {
        let snapshot = row?;
        by_instrument
            .entry(snapshot.instrument_id)
            .or_default()
            .push(snapshot);
    }

    Ok(instruments
        .into_iter()
        .map(|instrument| {
            let snapshots = by_instrument.remove(&instrument.id).unwrap_or_default();
            InstrumentHistory {
                instrument,
                snapshots,
            }
        })
        .collect())
}

/// Delete an instrument, returns the number of rows removed (0 or 1)
pub fn delete_instrument(conn: &Connection, id: i64) -> Result<usize> {
    let deleted = conn.execute("DELETE FROM instruments WHERE id = ?1", [id])?;
    Ok(deleted)
}

// ============ Balance snapshots ============

fn snapshot_from_row(row: &rusqlite::Row) -> Result<BalanceSnapshot, rusqlite::Error> {
    Ok(BalanceSnapshot {
        id: row.get(0)?,
        instrument_id: row.get(1)?,
        date: row.get(2)?,
        total_value: get_decimal_value(row, 3)?,
        contribution: get_decimal_value(row, 4)?,
        withdrawal: get_decimal_value(row, 5)?,
    })
}

pub fn find_snapshot(
    conn: &Connection,
    instrument_id: i64,
    date: NaiveDate,
) -> Result<Option<BalanceSnapshot>> {
    let snapshot = conn
        .query_row(
            "SELECT id, instrument_id, snapshot_date, total_value, contribution, withdrawal
             FROM balance_snapshots
             WHERE instrument_id = ?1 AND snapshot_date = ?2",
            params![instrument_id, date],
            snapshot_from_row,
        )
        .optional()?;

    Ok(snapshot)
}

/// Snapshots of one instrument ordered by date ascending
pub fn list_snapshots(conn: &Connection, instrument_id: i64) -> Result<Vec<BalanceSnapshot>> {
    let mut stmt = conn.prepare(
        "SELECT id, instrument_id, snapshot_date, total_value, contribution, withdrawal
         FROM balance_snapshots
         WHERE instrument_id = ?1
         ORDER BY snapshot_date ASC",
    )?;

    let snapshots = stmt
        .query_map([instrument_id], snapshot_from_row)?
        .collect::<Result<Vec<_>, _>>()?;

    Ok(snapshots)
}

/// Insert or update the snapshot for (instrument, date)
///
/// A new row takes the given flows (absent means zero). On an existing row the
/// balance is overwritten and any supplied flow is added to what is already
/// recorded, so several transactions landing on the same date accumulate.
pub fn upsert_snapshot(
    conn: &Connection,
    instrument_id: i64,
    date: NaiveDate,
    total_value: Decimal,
    contribution: Option<Decimal>,
    withdrawal: Option<Decimal>,
) -> Result<i64> {
    if let Some(existing) = find_snapshot(conn, instrument_id, date)? {
        let contribution = existing.contribution + contribution.unwrap_or(Decimal::ZERO);
        let withdrawal = existing.withdrawal + withdrawal.unwrap_or(Decimal::ZERO);
        conn.execute(
            "UPDATE balance_snapshots
             SET total_value = ?1, contribution = ?2, withdrawal = ?3
             WHERE id = ?4",
            params![
                total_value.to_string(),
                contribution.to_string(),
                withdrawal.to_string(),
                existing.id,
            ],
        )?;
        return Ok(existing.id);
    }

    conn.execute(
        "INSERT INTO balance_snapshots (instrument_id, snapshot_date, total_value, contribution, withdrawal)
         VALUES (?1, ?2, ?3, ?4, ?5)",
        params![
            instrument_id,
            date,
            total_value.to_string(),
            contribution.unwrap_or(Decimal::ZERO).to_string(),
            withdrawal.unwrap_or(Decimal::ZERO).to_string(),
        ],
    )?;

    Ok(conn.last_insert_rowid())
}

/// Add capital flows to the snapshot for (instrument, date) without touching its balance
///
/// Creates the snapshot with a zero balance when none exists yet.
pub fn add_snapshot_flows(
    conn: &Connection,
    instrument_id: i64,
    date: NaiveDate,
    contribution: Decimal,
    withdrawal: Decimal,
) -> Result<i64> {
    match find_snapshot(conn, instrument_id, date)? {
        Some(existing) => upsert_snapshot(
            conn,
            instrument_id,
            date,
            existing.total_value,
            Some(contribution),
            Some(withdrawal),
        ),
        None => upsert_snapshot(
            conn,
            instrument_id,
            date,
            Decimal::ZERO,
            Some(contribution),
            Some(withdrawal),
        ),
    }
}

/// Overwrite the capital flows of a snapshot in place
pub fn set_snapshot_flows(
    conn: &Connection,
    snapshot_id: i64,
    contribution: Decimal,
    withdrawal: Decimal,
) -> Result<()> {
    let updated = conn.execute(
        "UPDATE balance_snapshots SET contribution = ?1, withdrawal = ?2 WHERE id = ?3",
        params![contribution.to_string(), withdrawal.to_string(), snapshot_id],
    )?;

    if updated == 0 {
        anyhow::bail!("Snapshot {} not found", snapshot_id);
    }
    Ok(())
}

/// Point a snapshot at a different instrument
pub fn reparent_snapshot(conn: &Connection, snapshot_id: i64, to_instrument_id: i64) -> Result<()> {
    let updated = conn.execute(
        "UPDATE balance_snapshots SET instrument_id = ?1 WHERE id = ?2",
        params![to_instrument_id, snapshot_id],
    )?;

    if updated == 0 {
        anyhow::bail!("Snapshot {} not found", snapshot_id);
    }
    Ok(())
}

pub fn delete_snapshots_by_instrument(conn: &Connection, instrument_id: i64) -> Result<usize> {
    let deleted = conn.execute(
        "DELETE FROM balance_snapshots WHERE instrument_id = ?1",
        [instrument_id],
    )?;
    Ok(deleted)
}

pub fn count_snapshots(conn: &Connection, instrument_id: i64) -> Result<i64> {
    let count: i64 = conn.query_row(
        "SELECT COUNT(*) FROM balance_snapshots WHERE instrument_id = ?1",
        [instrument_id],
        |row| row.get(0),
    )?;
    Ok(count)
}

/// Total balance per date across every instrument, date ascending
///
/// Summed in Rust rather than with SQL SUM() because balances are stored as
/// decimal text.
pub fn sum_by_date(conn: &Connection) -> Result<Vec<(NaiveDate, Decimal)>> {
    let mut stmt = conn.prepare("SELECT snapshot_date, total_value FROM balance_snapshots")?;

    let mut totals: BTreeMap<NaiveDate, Decimal> = BTreeMap::new();
    let rows = stmt.query_map([], |row| {
        Ok((row.get::<_, NaiveDate>(0)?, get_decimal_value(row, 1)?))
    })?;
    for row in rows {
        let (date, value) = row?;
        *totals.entry(date).or_insert(Decimal::ZERO) += value;
    }

    Ok(totals.into_iter().collect())
}

/// (instrument_id, date, count) for every key held by more than one snapshot
pub fn find_duplicate_snapshot_keys(conn: &Connection) -> Result<Vec<(i64, NaiveDate, i64)>> {
    let mut stmt = conn.prepare(
        "SELECT instrument_id, snapshot_date, COUNT(*)
         FROM balance_snapshots
         GROUP BY instrument_id, snapshot_date
         HAVING COUNT(*) > 1",
    )?;

    let keys = stmt
        .query_map([], |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)))?
        .collect::<Result<Vec<_>, _>>()?;

    Ok(keys)
}

/// Delete every snapshot dated `date` (undo an import made with the wrong date)
pub fn delete_snapshots_on_date(conn: &Connection, date: NaiveDate) -> Result<usize> {
    let deleted = conn.execute(
        "DELETE FROM balance_snapshots WHERE snapshot_date = ?1",
        params![date],
    )?;
    info!("Deleted {} snapshots dated {}", deleted, date);
    Ok(deleted)
}

/// Remove all ledger data, returns (snapshots, instruments, custodians) deleted
pub fn clear_all(conn: &mut Connection) -> Result<(usize, usize, usize)> {
    let tx = conn.transaction()?;
    // Children before parents
    let snapshots = tx.execute("DELETE FROM balance_snapshots", [])?;
    let instruments = tx.execute("DELETE FROM instruments", [])?;
    let custodians = tx.execute("DELETE FROM custodians", [])?;
    tx.commit()?;

    info!(
        "Cleared ledger: {} snapshots, {} instruments, {} custodians",
        snapshots, instruments, custodians
    );
    Ok((snapshots, instruments, custodians))
}

/// Helper to read Decimal from SQLite (handles both INTEGER, REAL and TEXT)
pub fn get_decimal_value(row: &rusqlite::Row, idx: usize) -> Result<Decimal, rusqlite::Error> {
    use rusqlite::types::ValueRef;

    match row.get_ref(idx)? {
        ValueRef::Text(bytes) => {
            let s = std::str::from_utf8(bytes)
                .map_err(|e| rusqlite::Error::ToSqlConversionFailure(Box::new(e)))?;
            Decimal::from_str(s).map_err(|e| rusqlite::Error::ToSqlConversionFailure(Box::new(e)))
        }
        ValueRef::Integer(i) => Ok(Decimal::from(i)),
        ValueRef::Real(f) => {
            Decimal::try_from(f).map_err(|e| rusqlite::Error::ToSqlConversionFailure(Box::new(e)))
        }
        _ => Err(rusqlite::Error::InvalidColumnType(
            idx,
            "decimal".to_string(),
            rusqlite::types::Type::Null,
        )),
    }
}
