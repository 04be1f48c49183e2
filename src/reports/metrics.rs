use anyhow::Result;
use chrono::NaiveDate;
use rusqlite::Connection;
use rust_decimal::Decimal;
use serde::Serialize;
use std::cmp::Ordering;

use crate::db::{self, BalanceSnapshot, Custodian, Instrument, InstrumentCategory, InstrumentHistory};
use crate::utils::percent_of;

/// Balance, capital and return derived from one snapshot series
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct InstrumentMetrics {
    pub current_balance: Decimal,
    pub net_invested: Decimal,
    pub profit: Decimal,
    pub roi: Decimal,
}

/// One point of a valuation curve
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct HistoryPoint {
    pub date: NaiveDate,
    pub value: Decimal,
}

#[derive(Debug, Clone, Serialize)]
pub struct InstrumentSummary {
    pub id: i64,
    pub name: String,
    pub category: InstrumentCategory,
    pub custodian: String,
    pub snapshot_count: usize,
    pub metrics: InstrumentMetrics,
}

#[derive(Debug, Clone, Serialize)]
pub struct PortfolioSummary {
    pub total_balance: Decimal,
    pub total_invested: Decimal,
    pub total_profit: Decimal,
    pub total_roi: Decimal,
    /// Largest current balance first
    pub instruments: Vec<InstrumentSummary>,
    pub history: Vec<HistoryPoint>,
}

#[derive(Debug, Clone, Serialize)]
pub struct InstrumentDetails {
    pub instrument: Instrument,
    pub custodian: Option<Custodian>,
    pub metrics: InstrumentMetrics,
    pub history: Vec<HistoryPoint>,
}

/// Return on capital as a percentage, 0 when nothing is invested
pub fn roi(profit: Decimal, invested: Decimal) -> Decimal {
    percent_of(profit, invested)
}

/// Metrics for a series sorted by date ascending
pub fn instrument_metrics(series: &[BalanceSnapshot]) -> InstrumentMetrics {
    let current_balance = series
        .last()
        .map(|s| s.total_value)
        .unwrap_or(Decimal::ZERO);
    let net_invested: Decimal = series.iter().map(BalanceSnapshot::net_flow).sum();
    let profit = current_balance - net_invested;

    InstrumentMetrics {
        current_balance,
        net_invested,
        profit,
        roi: roi(profit, net_invested),
    }
}

fn by_balance_desc(a: &InstrumentSummary, b: &InstrumentSummary) -> Ordering {
    b.metrics
        .current_balance
        .cmp(&a.metrics.current_balance)
        .then(a.id.cmp(&b.id))
}

/// Build the portfolio summary from loaded histories
///
/// `custodians` resolves owner names; an unknown id shows as an empty name.
pub fn summarize(
    histories: &[InstrumentHistory],
    custodians: &[Custodian],
    history: Vec<HistoryPoint>,
) -> PortfolioSummary {
    let mut instruments: Vec<InstrumentSummary> = histories
        .iter()
        .map(|h| InstrumentSummary {
            id: h.instrument.id,
            name: h.instrument.name.clone(),
            category: h.instrument.category,
            custodian: custodians
                .iter()
                .find(|c| c.id == h.instrument.custodian_id)
                .map(|c| c.name.clone())
                .unwrap_or_default(),
            snapshot_count: h.snapshots.len(),
            metrics: instrument_metrics(&h.snapshots),
        })
        .collect();
    instruments.sort_by(by_balance_desc);

    let total_balance: Decimal = instruments.iter().map(|i| i.metrics.current_balance).sum();
    let total_invested: Decimal = instruments.iter().map(|i| i.metrics.net_invested).sum();
    let total_profit = total_balance - total_invested;

    PortfolioSummary {
        total_balance,
        total_invested,
        total_profit,
        total_roi: roi(total_profit, total_invested),
        instruments,
        history,
    }
}

/// Read the whole ledger and summarize it
pub fn calculate_summary(conn: &Connection) -> Result<PortfolioSummary> {
    let histories = db::list_instrument_histories(conn)?;
    let custodians = db::list_custodians(conn)?;
    let history = db::sum_by_date(conn)?
        .into_iter()
        .map(|(date, value)| HistoryPoint { date, value })
        .collect();

    Ok(summarize(&histories, &custodians, history))
}

/// Metrics and valuation curve of a single instrument, `None` if it does not exist
pub fn instrument_details(conn: &Connection, instrument_id: i64) -> Result<Option<InstrumentDetails>> {
    let Some(instrument) = db::get_instrument(conn, instrument_id)? else {
        return Ok(None);
    };
    let custodian = db::get_custodian(conn, instrument.custodian_id)?;
    let series = db::list_snapshots(conn, instrument_id)?;

    Ok(Some(InstrumentDetails {
        metrics: instrument_metrics(&series),
        history: series
            .iter()
            .map(|s| HistoryPoint {
                date: s.date,
                value: s.total_value,
            })
            .collect(),
        instrument,
        custodian,
    }))
}

impl PortfolioSummary {
    /// Instruments whose balance sits furthest below their invested capital
    pub fn largest_shortfalls(&self, n: usize) -> Vec<&InstrumentSummary> {
        let mut sorted: Vec<&InstrumentSummary> = self.instruments.iter().collect();
        sorted.sort_by(|a, b| a.metrics.profit.cmp(&b.metrics.profit).then(a.id.cmp(&b.id)));
        sorted.truncate(n);
        sorted
    }
}
