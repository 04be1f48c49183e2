// Period audit - yield between two snapshot dates, net of capital flows

use anyhow::Result;
use chrono::NaiveDate;
use rusqlite::Connection;
use rust_decimal::Decimal;
use serde::Serialize;

use crate::db::{self, BalanceSnapshot};
use crate::utils::percent_of;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct PeriodLine {
    pub start_balance: Decimal,
    pub added: Decimal,
    pub removed: Decimal,
    pub end_balance: Decimal,
    pub yield_value: Decimal,
    pub roi: Decimal,
}

impl PeriodLine {
    fn new(start_balance: Decimal, added: Decimal, removed: Decimal, end_balance: Decimal) -> Self {
        let yield_value = end_balance - (start_balance + added - removed);
        let base = start_balance + added;
        let roi = if base > Decimal::ZERO {
            percent_of(yield_value, base)
        } else {
            Decimal::ZERO
        };

        Self {
            start_balance,
            added,
            removed,
            end_balance,
            yield_value,
            roi,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct PeriodRow {
    pub instrument_id: i64,
    pub name: String,
    pub line: PeriodLine,
}

#[derive(Debug, Clone, Serialize)]
pub struct PeriodReport {
    pub start: NaiveDate,
    pub end: NaiveDate,
    pub rows: Vec<PeriodRow>,
    pub totals: PeriodLine,
}

/// Period line for one series, `None` when it has a snapshot on neither date
///
/// Flows dated on `start` are already part of the start balance, so only
/// flows in `(start, end]` count.
pub fn period_line(series: &[BalanceSnapshot], start: NaiveDate, end: NaiveDate) -> Option<PeriodLine> {
    let start_snapshot = series.iter().find(|s| s.date == start);
    let end_snapshot = series.iter().find(|s| s.date == end);
    if start_snapshot.is_none() && end_snapshot.is_none() {
        return None;
    }

    let (added, removed) = series
        .iter()
        .filter(|s| s.date > start && s.date <= end)
        .fold((Decimal::ZERO, Decimal::ZERO), |(a, r), s| {
            (a + s.contribution, r + s.withdrawal)
        });

    Some(PeriodLine::new(
        start_snapshot.map(|s| s.total_value).unwrap_or(Decimal::ZERO),
        added,
        removed,
        end_snapshot.map(|s| s.total_value).unwrap_or(Decimal::ZERO),
    ))
}

/// Compare every instrument's balance on `start` with its balance on `end`
pub fn period_report(conn: &Connection, start: NaiveDate, end: NaiveDate) -> Result<PeriodReport> {
    if start >= end {
        anyhow::bail!("Period start {} must be before end {}", start, end);
    }

    let mut rows = Vec::new();
    let mut start_total = Decimal::ZERO;
    let mut added_total = Decimal::ZERO;
    let mut removed_total = Decimal::ZERO;
    let mut end_total = Decimal::ZERO;

    for history in db::list_instrument_histories(conn)? {
        let Some(line) = period_line(&history.snapshots, start, end) else {
            continue;
        };

        start_total += line.start_balance;
        added_total += line.added;
        removed_total += line.removed;
        end_total += line.end_balance;

        let relevant = line.start_balance > Decimal::ZERO
            || line.end_balance > Decimal::ZERO
            || line.added > Decimal::ZERO;
        if relevant {
            rows.push(PeriodRow {
                instrument_id: history.instrument.id,
                name: history.instrument.name,
                line,
            });
        }
    }

    Ok(PeriodReport {
        start,
        end,
        rows,
        totals: PeriodLine::new(start_total, added_total, removed_total, end_total),
    })
}
