// Merge resolver - collapses custodians and instruments recorded under inconsistent names
//
// Phase A unifies custodians by normalized name, Phase B then unifies
// instruments by (normalized name, custodian). The oldest record (smallest id)
// of each group survives. Each duplicate group is merged inside its own
// transaction; a failing group is rolled back and the pass moves on.

pub mod analysis;

use anyhow::{Context, Result};
use chrono::NaiveDate;
use itertools::Itertools;
use rusqlite::Connection;
use rust_decimal::Decimal;
use serde::Serialize;
use std::collections::BTreeMap;
use tracing::{info, warn};

use crate::db::{self, Custodian, Instrument};
use crate::error::LedgerError;
use crate::normalize::normalize;

pub use analysis::{find_duplicates, DuplicateAnalysis, DuplicateGroup, DuplicateMember};

/// Lifecycle of one duplicate group
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum GroupState {
    Pending,
    Reparented,
    Deleted,
    Aborted,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum EntityKind {
    Custodian,
    Instrument,
}

/// A duplicate snapshot dropped because the survivor already had that date
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MergeConflict {
    pub date: NaiveDate,
    pub duplicate_instrument_id: i64,
    pub kept_value: Decimal,
    pub discarded_value: Decimal,
}

/// What happened to one duplicate group
#[derive(Debug, Clone, Serialize)]
pub struct GroupOutcome {
    pub kind: EntityKind,
    pub key: String,
    pub survivor_id: i64,
    pub survivor_name: String,
    pub duplicate_ids: Vec<i64>,
    pub state: GroupState,
    /// Instruments (custodian groups) or snapshots (instrument groups) moved to the survivor
    pub moved: usize,
    pub conflicts: Vec<MergeConflict>,
    pub error: Option<String>,
}

impl GroupOutcome {
    fn pending(
        kind: EntityKind,
        key: String,
        survivor_id: i64,
        survivor_name: &str,
        duplicate_ids: Vec<i64>,
    ) -> Self {
        Self {
            kind,
            key,
            survivor_id,
            survivor_name: survivor_name.to_string(),
            duplicate_ids,
            state: GroupState::Pending,
            moved: 0,
            conflicts: Vec::new(),
            error: None,
        }
    }

    /// Advance the state machine: Pending -> Reparented -> Deleted
    fn transition(&mut self, next: GroupState) -> Result<(), LedgerError> {
        let allowed = matches!(
            (self.state, next),
            (GroupState::Pending, GroupState::Reparented)
                | (GroupState::Reparented, GroupState::Deleted)
        );
        if !allowed {
            return Err(LedgerError::InvariantViolation(format!(
                "merge group {} cannot go from {:?} to {:?}",
                self.key, self.state, next
            )));
        }
        self.state = next;
        Ok(())
    }

    /// Mark the group as rolled back; counters are reset because nothing was committed
    fn abort(&mut self, error: &anyhow::Error) {
        self.state = GroupState::Aborted;
        self.moved = 0;
        self.conflicts.clear();
        self.error = Some(format!("{:#}", error));
    }
}

/// Outcome of a full merge pass
#[derive(Debug, Clone, Default, Serialize)]
pub struct MergeReport {
    pub custodian_groups: Vec<GroupOutcome>,
    pub instrument_groups: Vec<GroupOutcome>,
}

impl MergeReport {
    fn groups(&self) -> impl Iterator<Item = &GroupOutcome> {
        self.custodian_groups.iter().chain(self.instrument_groups.iter())
    }

    /// Number of duplicate records removed by committed groups
    pub fn merged_count(&self) -> usize {
        self.groups()
            .filter(|g| g.state == GroupState::Deleted)
            .map(|g| g.duplicate_ids.len())
            .sum()
    }

    pub fn aborted_count(&self) -> usize {
        self.groups()
            .filter(|g| g.state == GroupState::Aborted)
            .count()
    }

    pub fn discarded_count(&self) -> usize {
        self.instrument_groups
            .iter()
            .map(|g| g.conflicts.len())
            .sum()
    }

    pub fn is_noop(&self) -> bool {
        self.custodian_groups.is_empty() && self.instrument_groups.is_empty()
    }
}

/// Run Phase A (custodians) and then Phase B (instruments)
pub fn run_merge(conn: &mut Connection) -> Result<MergeReport> {
    let custodian_groups = merge_custodians(conn)?;
    let instrument_groups = merge_instruments(conn)?;

    let report = MergeReport {
        custodian_groups,
        instrument_groups,
    };
    info!(
        "Merge finished: {} duplicates removed, {} conflicting snapshots discarded, {} groups aborted",
        report.merged_count(),
        report.discarded_count(),
        report.aborted_count()
    );
    Ok(report)
}

/// Group custodians by normalized name, members ordered by id
pub(crate) fn custodian_groups(custodians: Vec<Custodian>) -> BTreeMap<String, Vec<Custodian>> {
    custodians
        .into_iter()
        .into_group_map_by(|c| normalize(&c.name))
        .into_iter()
        .map(|(key, mut members)| {
            members.sort_by_key(|c| c.id);
            (key, members)
        })
        .collect()
}

/// Group instruments by (normalized name, custodian), members ordered by id
pub(crate) fn instrument_groups(
    instruments: Vec<Instrument>,
) -> BTreeMap<(String, i64), Vec<Instrument>> {
    instruments
        .into_iter()
        .into_group_map_by(|i| (normalize(&i.name), i.custodian_id))
        .into_iter()
        .map(|(key, mut members)| {
            members.sort_by_key(|i| i.id);
            (key, members)
        })
        .collect()
}

/// Phase A: fold custodians sharing a normalized name into the oldest one
pub fn merge_custodians(conn: &mut Connection) -> Result<Vec<GroupOutcome>> {
    let groups = custodian_groups(db::list_custodians(conn)?);
    let mut outcomes = Vec::new();

    for (key, members) in groups {
        let Some((survivor, duplicates)) = members.split_first() else {
            continue;
        };
        if duplicates.is_empty() {
            continue;
        }

        info!(
            "Merging custodians \"{}\": keeping [{}] {}, absorbing {}",
            key,
            survivor.id,
            survivor.name,
            duplicates
                .iter()
                .map(|d| format!("[{}] {}", d.id, d.name))
                .join(", ")
        );

        let mut outcome = GroupOutcome::pending(
            EntityKind::Custodian,
            key.clone(),
            survivor.id,
            &survivor.name,
            duplicates.iter().map(|d| d.id).collect(),
        );

        if let Err(e) = apply_custodian_group(conn, &mut outcome, survivor, duplicates) {
            warn!("Custodian group \"{}\" aborted: {:#}", key, e);
            outcome.abort(&e);
        }
        outcomes.push(outcome);
    }

    Ok(outcomes)
}

fn apply_custodian_group(
    conn: &mut Connection,
    outcome: &mut GroupOutcome,
    survivor: &Custodian,
    duplicates: &[Custodian],
) -> Result<()> {
    let tx = conn.transaction()?;

    if db::get_custodian(&tx, survivor.id)?.is_none() {
        return Err(LedgerError::ReferentialInconsistency(format!(
            "survivor custodian {} no longer exists",
            survivor.id
        ))
        .into());
    }

    for dup in duplicates {
        let moved = db::reparent_instruments(&tx, dup.id, survivor.id)
            .with_context(|| format!("Failed to move instruments of custodian {}", dup.id))?;
        info!("  -> moved {} instruments from [{}] {}", moved, dup.id, dup.name);
        outcome.moved += moved;
    }
    outcome.transition(GroupState::Reparented)?;

    for dup in duplicates {
        // Deleting with children left would cascade them away
        let remaining = db::count_instruments(&tx, dup.id)?;
        if remaining > 0 {
            return Err(LedgerError::ReferentialInconsistency(format!(
                "custodian {} still owns {} instruments after re-parenting",
                dup.id, remaining
            ))
            .into());
        }
        if db::delete_custodian(&tx, dup.id)? != 1 {
            return Err(LedgerError::ReferentialInconsistency(format!(
                "custodian {} disappeared during merge",
                dup.id
            ))
            .into());
        }
    }
    outcome.transition(GroupState::Deleted)?;

    tx.commit()?;
    Ok(())
}

/// Phase B: fold instruments sharing (normalized name, custodian) into the oldest one
///
/// Must run after Phase A so that custodian ids are already unified.
pub fn merge_instruments(conn: &mut Connection) -> Result<Vec<GroupOutcome>> {
    let groups = instrument_groups(db::list_instruments(conn)?);
    let mut outcomes = Vec::new();

    for ((name_key, custodian_id), members) in groups {
        let Some((survivor, duplicates)) = members.split_first() else {
            continue;
        };
        if duplicates.is_empty() {
            continue;
        }

        let key = format!("{}|{}", name_key, custodian_id);
        info!(
            "Merging instruments \"{}\": keeping [{}] {}, absorbing {}",
            key,
            survivor.id,
            survivor.name,
            duplicates
                .iter()
                .map(|d| format!("[{}] {}", d.id, d.name))
                .join(", ")
        );

        let mut outcome = GroupOutcome::pending(
            EntityKind::Instrument,
            key.clone(),
            survivor.id,
            &survivor.name,
            duplicates.iter().map(|d| d.id).collect(),
        );

        if let Err(e) = apply_instrument_group(conn, &mut outcome, survivor, duplicates) {
            warn!("Instrument group \"{}\" aborted: {:#}", key, e);
            outcome.abort(&e);
        }
        outcomes.push(outcome);
    }

    let collisions = db::find_duplicate_snapshot_keys(conn)?;
    if let Some((instrument_id, date, count)) = collisions.first() {
        return Err(LedgerError::InvariantViolation(format!(
            "instrument {} has {} snapshots dated {} after merge",
            instrument_id, count, date
        ))
        .into());
    }

    Ok(outcomes)
}

fn apply_instrument_group(
    conn: &mut Connection,
    outcome: &mut GroupOutcome,
    survivor: &Instrument,
    duplicates: &[Instrument],
) -> Result<()> {
    let tx = conn.transaction()?;

    if db::get_instrument(&tx, survivor.id)?.is_none() {
        return Err(LedgerError::ReferentialInconsistency(format!(
            "survivor instrument {} no longer exists",
            survivor.id
        ))
        .into());
    }

    let mut discarded_per_dup = Vec::with_capacity(duplicates.len());
    for dup in duplicates {
        let mut discarded = 0usize;
        for snapshot in db::list_snapshots(&tx, dup.id)? {
            if let Some(existing) = db::find_snapshot(&tx, survivor.id, snapshot.date)? {
                // The survivor's row is authoritative; the duplicate's is dropped
                info!(
                    "     x conflict on {}: keeping {} from [{}], discarding {} from [{}]",
                    snapshot.date, existing.total_value, survivor.id, snapshot.total_value, dup.id
                );
                outcome.conflicts.push(MergeConflict {
                    date: snapshot.date,
                    duplicate_instrument_id: dup.id,
                    kept_value: existing.total_value,
                    discarded_value: snapshot.total_value,
                });
                discarded += 1;
            } else {
                db::reparent_snapshot(&tx, snapshot.id, survivor.id)?;
                outcome.moved += 1;
            }
        }
        discarded_per_dup.push(discarded);
    }
    outcome.transition(GroupState::Reparented)?;

    for (dup, expected) in duplicates.iter().zip(discarded_per_dup) {
        let removed = db::delete_snapshots_by_instrument(&tx, dup.id)?;
        if removed != expected {
            return Err(LedgerError::ReferentialInconsistency(format!(
                "instrument {} had {} leftover snapshots, expected {} conflicts",
                dup.id, removed, expected
            ))
            .into());
        }
        if db::delete_instrument(&tx, dup.id)? != 1 {
            return Err(LedgerError::ReferentialInconsistency(format!(
                "instrument {} disappeared during merge",
                dup.id
            ))
            .into());
        }
        info!("     ok removed duplicate [{}] {}", dup.id, dup.name);
    }
    outcome.transition(GroupState::Deleted)?;

    tx.commit()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::InstrumentCategory;
    use rust_decimal_macros::dec;
    use tempfile::TempDir;

    fn create_test_db() -> (TempDir, Connection) {
        let temp_dir = tempfile::tempdir().unwrap();
        let db_path = temp_dir.path().join("test.db");
        db::init_database(Some(db_path.clone())).unwrap();
        let conn = db::open_db(Some(db_path)).unwrap();
        (temp_dir, conn)
    }

    fn date(s: &str) -> NaiveDate {
        NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
    }

    fn total_snapshots(conn: &Connection) -> i64 {
        conn.query_row("SELECT COUNT(*) FROM balance_snapshots", [], |row| row.get(0))
            .unwrap()
    }

    #[test]
    fn test_state_machine_rejects_skipping_reparent() {
        let mut outcome =
            GroupOutcome::pending(EntityKind::Custodian, "X".to_string(), 1, "X", vec![2]);
        assert!(outcome.transition(GroupState::Deleted).is_err());
        outcome.transition(GroupState::Reparented).unwrap();
        outcome.transition(GroupState::Deleted).unwrap();
        assert!(outcome.transition(GroupState::Reparented).is_err());
    }

    #[test]
    fn test_custodian_merge_keeps_oldest_and_moves_instruments() {
        let (_dir, mut conn) = create_test_db();
        let first = db::create_custodian(&conn, "Banco X").unwrap();
        let second = db::create_custodian(&conn, "BANCO X LTDA").unwrap();
        let other = db::create_custodian(&conn, "XP Investimentos").unwrap();
        let moved = db::create_instrument(&conn, "ITUB4", InstrumentCategory::Equity, second.id).unwrap();

        let outcomes = merge_custodians(&mut conn).unwrap();
        assert_eq!(outcomes.len(), 1);
        assert_eq!(outcomes[0].state, GroupState::Deleted);
        assert_eq!(outcomes[0].survivor_id, first.id);
        assert_eq!(outcomes[0].duplicate_ids, vec![second.id]);
        assert_eq!(outcomes[0].moved, 1);

        let remaining: Vec<i64> = db::list_custodians(&conn).unwrap().iter().map(|c| c.id).collect();
        assert_eq!(remaining, vec![first.id, other.id]);
        let instrument = db::get_instrument(&conn, moved.id).unwrap().unwrap();
        assert_eq!(instrument.custodian_id, first.id);
    }

    #[test]
    fn test_instrument_merge_discards_conflicting_dates() {
        let (_dir, mut conn) = create_test_db();
        let bank = db::create_custodian(&conn, "Inter").unwrap();
        let survivor = db::create_instrument(&conn, "RUMO S.A.", InstrumentCategory::Equity, bank.id).unwrap();
        let dup = db::create_instrument(&conn, "RUMO SA", InstrumentCategory::Equity, bank.id).unwrap();

        db::upsert_snapshot(&conn, survivor.id, date("2025-03-31"), dec!(1000), Some(dec!(1000)), None).unwrap();
        db::upsert_snapshot(&conn, dup.id, date("2025-03-31"), dec!(999), None, None).unwrap();
        db::upsert_snapshot(&conn, dup.id, date("2025-10-31"), dec!(1200), None, None).unwrap();
        let before = total_snapshots(&conn);

        let outcomes = merge_instruments(&mut conn).unwrap();
        assert_eq!(outcomes.len(), 1);
        let outcome = &outcomes[0];
        assert_eq!(outcome.state, GroupState::Deleted);
        assert_eq!(outcome.moved, 1);
        assert_eq!(outcome.conflicts.len(), 1);
        assert_eq!(outcome.conflicts[0].kept_value, dec!(1000));
        assert_eq!(outcome.conflicts[0].discarded_value, dec!(999));

        // Conservation: before = after + discarded
        assert_eq!(before, total_snapshots(&conn) + outcome.conflicts.len() as i64);
        assert!(db::get_instrument(&conn, dup.id).unwrap().is_none());

        let series = db::list_snapshots(&conn, survivor.id).unwrap();
        assert_eq!(series.len(), 2);
        assert_eq!(series[0].total_value, dec!(1000));
        assert_eq!(series[1].total_value, dec!(1200));
    }

    #[test]
    fn test_same_name_under_different_custodians_is_not_merged() {
        let (_dir, mut conn) = create_test_db();
        let a = db::create_custodian(&conn, "Inter").unwrap();
        let b = db::create_custodian(&conn, "XP").unwrap();
        db::create_instrument(&conn, "ABC", InstrumentCategory::Other, a.id).unwrap();
        db::create_instrument(&conn, "ABC", InstrumentCategory::Other, b.id).unwrap();

        let report = run_merge(&mut conn).unwrap();
        assert!(report.is_noop());
        assert_eq!(db::list_instruments(&conn).unwrap().len(), 2);
    }

    #[test]
    fn test_failed_group_is_rolled_back_and_others_still_merge() {
        let (_dir, mut conn) = create_test_db();
        let bank = db::create_custodian(&conn, "Inter").unwrap();
        let a1 = db::create_instrument(&conn, "AAA", InstrumentCategory::Other, bank.id).unwrap();
        let a2 = db::create_instrument(&conn, "aaa", InstrumentCategory::Other, bank.id).unwrap();
        let b1 = db::create_instrument(&conn, "BBB", InstrumentCategory::Other, bank.id).unwrap();
        let b2 = db::create_instrument(&conn, "bbb", InstrumentCategory::Other, bank.id).unwrap();
        db::upsert_snapshot(&conn, a2.id, date("2025-03-31"), dec!(10), None, None).unwrap();
        db::upsert_snapshot(&conn, b2.id, date("2025-03-31"), dec!(20), None, None).unwrap();

        // Make deleting b2 fail inside its group transaction
        conn.execute_batch(&format!(
            "CREATE TRIGGER block_delete BEFORE DELETE ON instruments
             WHEN OLD.id = {}
             BEGIN SELECT RAISE(ABORT, 'locked'); END;",
            b2.id
        ))
        .unwrap();

        let outcomes = merge_instruments(&mut conn).unwrap();
        assert_eq!(outcomes.len(), 2);
        let a_group = outcomes.iter().find(|o| o.survivor_id == a1.id).unwrap();
        let b_group = outcomes.iter().find(|o| o.survivor_id == b1.id).unwrap();
        assert_eq!(a_group.state, GroupState::Deleted);
        assert_eq!(b_group.state, GroupState::Aborted);
        assert!(b_group.error.as_deref().unwrap_or("").contains("locked"));

        // b2 keeps its snapshot, nothing half-moved
        assert_eq!(db::count_snapshots(&conn, b2.id).unwrap(), 1);
        assert_eq!(db::count_snapshots(&conn, b1.id).unwrap(), 0);
        assert_eq!(db::count_snapshots(&conn, a1.id).unwrap(), 1);
    }

    #[test]
    fn test_failed_custodian_group_is_rolled_back_and_others_still_merge() {
        let (_dir, mut conn) = create_test_db();
        let x1 = db::create_custodian(&conn, "Banco X").unwrap();
        let x2 = db::create_custodian(&conn, "BANCO X LTDA").unwrap();
        let i1 = db::create_custodian(&conn, "Inter").unwrap();
        let i2 = db::create_custodian(&conn, "INTER S.A.").unwrap();
        let on_x2 = db::create_instrument(&conn, "ITUB4", InstrumentCategory::Equity, x2.id).unwrap();
        let on_i2 = db::create_instrument(&conn, "CDB Inter", InstrumentCategory::FixedIncome, i2.id).unwrap();

        conn.execute_batch(&format!(
            "CREATE TRIGGER block_delete BEFORE DELETE ON custodians
             WHEN OLD.id = {}
             BEGIN SELECT RAISE(ABORT, 'locked'); END;",
            i2.id
        ))
        .unwrap();

        let outcomes = merge_custodians(&mut conn).unwrap();
        assert_eq!(outcomes.len(), 2);
        let x_group = outcomes.iter().find(|o| o.survivor_id == x1.id).unwrap();
        let i_group = outcomes.iter().find(|o| o.survivor_id == i1.id).unwrap();
        assert_eq!(x_group.state, GroupState::Deleted);
        assert_eq!(i_group.state, GroupState::Aborted);
        assert_eq!(i_group.moved, 0);
        assert!(i_group.error.as_deref().unwrap_or("").contains("locked"));

        // The re-parent inside the aborted group was rolled back
        let kept = db::get_instrument(&conn, on_i2.id).unwrap().unwrap();
        assert_eq!(kept.custodian_id, i2.id);
        assert!(db::get_custodian(&conn, i2.id).unwrap().is_some());

        let moved = db::get_instrument(&conn, on_x2.id).unwrap().unwrap();
        assert_eq!(moved.custodian_id, x1.id);
        assert!(db::get_custodian(&conn, x2.id).unwrap().is_none());
    }

    #[test]
    fn test_merge_is_idempotent() {
        let (_dir, mut conn) = create_test_db();
        let x = db::create_custodian(&conn, "Banco X").unwrap();
        let y = db::create_custodian(&conn, "BANCO X LTDA").unwrap();
        let i1 = db::create_instrument(&conn, "ABC", InstrumentCategory::Other, x.id).unwrap();
        let i2 = db::create_instrument(&conn, "ABC", InstrumentCategory::Other, y.id).unwrap();
        db::upsert_snapshot(&conn, i1.id, date("2025-03-31"), dec!(1), None, None).unwrap();
        db::upsert_snapshot(&conn, i2.id, date("2025-04-30"), dec!(2), None, None).unwrap();

        let first = run_merge(&mut conn).unwrap();
        assert_eq!(first.merged_count(), 2);

        let second = run_merge(&mut conn).unwrap();
        assert!(second.is_noop());
        assert_eq!(total_snapshots(&conn), 2);
    }
}
