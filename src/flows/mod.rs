// Flow classification - separating capital flows from investment performance
//
// Without a transaction ledger the only evidence of a contribution or a
// withdrawal is how much the balance moved between two snapshots. Policies
// below decide, per snapshot, which part of the move was capital.

pub mod policy;

use anyhow::{Context, Result};
use rusqlite::Connection;
use rust_decimal::Decimal;
use serde::Serialize;
use tracing::{debug, info};

use crate::db;
use crate::db::BalanceSnapshot;

pub use policy::{ClassificationPolicy, DeltaThreshold, FirstSnapshotIsCapital, PolicyKind};

/// Why a snapshot received the flows it did
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum FlowKind {
    /// Opening position, the whole balance is capital
    Seed,
    /// Rise above the up threshold
    Contribution,
    /// Rise within the up threshold, left as yield
    OrganicGain,
    /// Fall beyond the down threshold
    Withdrawal,
    /// Fall within the down threshold, left as market loss
    MarketLoss,
    /// Balance unchanged
    Flat,
    /// Recorded values kept as they were
    Untouched,
}

/// Contribution and withdrawal assigned to one snapshot
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ClassifiedFlow {
    pub contribution: Decimal,
    pub withdrawal: Decimal,
    pub kind: FlowKind,
}

impl ClassifiedFlow {
    pub fn new(contribution: Decimal, withdrawal: Decimal, kind: FlowKind) -> Self {
        Self {
            contribution,
            withdrawal,
            kind,
        }
    }

    /// Keep whatever the snapshot already records
    pub fn untouched(snapshot: &BalanceSnapshot) -> Self {
        Self::new(snapshot.contribution, snapshot.withdrawal, FlowKind::Untouched)
    }
}

/// Tally of classification outcomes
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ClassificationStats {
    pub seeds: usize,
    pub contributions: usize,
    pub organic_gains: usize,
    pub withdrawals: usize,
    pub market_losses: usize,
    pub flat: usize,
    pub untouched: usize,
}

impl ClassificationStats {
    pub fn record(&mut self, kind: FlowKind) {
        match kind {
            FlowKind::Seed => self.seeds += 1,
            FlowKind::Contribution => self.contributions += 1,
            FlowKind::OrganicGain => self.organic_gains += 1,
            FlowKind::Withdrawal => self.withdrawals += 1,
            FlowKind::MarketLoss => self.market_losses += 1,
            FlowKind::Flat => self.flat += 1,
            FlowKind::Untouched => self.untouched += 1,
        }
    }

    pub fn merge(&mut self, other: &ClassificationStats) {
        self.seeds += other.seeds;
        self.contributions += other.contributions;
        self.organic_gains += other.organic_gains;
        self.withdrawals += other.withdrawals;
        self.market_losses += other.market_losses;
        self.flat += other.flat;
        self.untouched += other.untouched;
    }
}

/// Result of reclassifying one or more instruments
#[derive(Debug, Clone, Default, Serialize)]
pub struct ReclassifyReport {
    pub policy: String,
    pub instruments: usize,
    pub snapshots: usize,
    pub updated: usize,
    pub stats: ClassificationStats,
}

/// Classify an instrument's stored series and write back the rows that changed.
///
/// Runs in a single SQLite transaction so readers never see a half-rewritten
/// series.
pub fn reclassify_instrument(
    conn: &mut Connection,
    instrument_id: i64,
    policy: &dyn ClassificationPolicy,
) -> Result<ReclassifyReport> {
    let tx = conn.transaction()?;

    let series = db::list_snapshots(&tx, instrument_id)?;
    let flows = policy.classify(&series);

    let mut report = ReclassifyReport {
        policy: policy.name().to_string(),
        instruments: 1,
        snapshots: series.len(),
        ..Default::default()
    };

    for (snapshot, flow) in series.iter().zip(flows.iter()) {
        report.stats.record(flow.kind);
        if snapshot.contribution == flow.contribution && snapshot.withdrawal == flow.withdrawal {
            continue;
        }

        debug!(
            "Instrument {} on {}: {:?} contribution {} -> {}, withdrawal {} -> {}",
            instrument_id,
            snapshot.date,
            flow.kind,
            snapshot.contribution,
            flow.contribution,
            snapshot.withdrawal,
            flow.withdrawal
        );
        db::set_snapshot_flows(&tx, snapshot.id, flow.contribution, flow.withdrawal)
            .with_context(|| format!("Failed to rewrite flows of snapshot {}", snapshot.id))?;
        report.updated += 1;
    }

    tx.commit()?;
    Ok(report)
}

/// Reclassify every instrument in the ledger with the same policy
pub fn reclassify_all(
    conn: &mut Connection,
    policy: &dyn ClassificationPolicy,
) -> Result<ReclassifyReport> {
    let instruments = db::list_instruments(conn)?;

    let mut total = ReclassifyReport {
        policy: policy.name().to_string(),
        ..Default::default()
    };

    for instrument in &instruments {
        let report = reclassify_instrument(conn, instrument.id, policy)
            .with_context(|| format!("Failed to reclassify {}", instrument.name))?;
        total.instruments += 1;
        total.snapshots += report.snapshots;
        total.updated += report.updated;
        total.stats.merge(&report.stats);
    }

    info!(
        "Reclassified {} instruments with {}: {} of {} snapshots changed",
        total.instruments, total.policy, total.updated, total.snapshots
    );
    Ok(total)
}
