//! Read-only preview of what a merge pass would do

use anyhow::Result;
use rusqlite::Connection;
use serde::Serialize;
use std::collections::HashMap;

use super::{custodian_groups, instrument_groups};
use crate::db;

#[derive(Debug, Clone, Serialize)]
pub struct DuplicateMember {
    pub id: i64,
    pub name: String,
    /// Instruments for a custodian member, snapshots for an instrument member
    pub children: i64,
}

#[derive(Debug, Clone, Serialize)]
pub struct DuplicateGroup {
    pub key: String,
    /// First member is the survivor
    pub members: Vec<DuplicateMember>,
}

impl DuplicateGroup {
    pub fn survivor(&self) -> Option<&DuplicateMember> {
        self.members.first()
    }
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct DuplicateAnalysis {
    pub custodians: Vec<DuplicateGroup>,
    pub instruments: Vec<DuplicateGroup>,
}

impl DuplicateAnalysis {
    pub fn is_empty(&self) -> bool {
        self.custodians.is_empty() && self.instruments.is_empty()
    }

    /// Records a merge would delete
    pub fn duplicate_count(&self) -> usize {
        self.custodians
            .iter()
            .chain(self.instruments.iter())
            .map(|g| g.members.len().saturating_sub(1))
            .sum()
    }
}

/// Group custodians and instruments the way `run_merge` would, without writing
///
/// Instruments are keyed by the custodian they will belong to once Phase A
/// has run, so the preview matches the real pass.
pub fn find_duplicates(conn: &Connection) -> Result<DuplicateAnalysis> {
    let mut analysis = DuplicateAnalysis::default();
    let mut canonical_custodian: HashMap<i64, i64> = HashMap::new();

    for (key, members) in custodian_groups(db::list_custodians(conn)?) {
        let survivor_id = members[0].id;
        for member in &members {
            canonical_custodian.insert(member.id, survivor_id);
        }
        if members.len() < 2 {
            continue;
        }

        let members = members
            .iter()
            .map(|c| {
                Ok(DuplicateMember {
                    id: c.id,
                    name: c.name.clone(),
                    children: db::count_instruments(conn, c.id)?,
                })
            })
            .collect::<Result<Vec<_>>>()?;
        analysis.custodians.push(DuplicateGroup { key, members });
    }

    let instruments = db::list_instruments(conn)?
        .into_iter()
        .map(|mut instrument| {
            if let Some(survivor) = canonical_custodian.get(&instrument.custodian_id) {
                instrument.custodian_id = *survivor;
            }
            instrument
        })
        .collect();

    for ((name_key, custodian_id), members) in instrument_groups(instruments) {
        if members.len() < 2 {
            continue;
        }

        let members = members
            .iter()
            .map(|i| {
                Ok(DuplicateMember {
                    id: i.id,
                    name: i.name.clone(),
                    children: db::count_snapshots(conn, i.id)?,
                })
            })
            .collect::<Result<Vec<_>>>()?;
        analysis.instruments.push(DuplicateGroup {
            key: format!("{}|{}", name_key, custodian_id),
            members,
        });
    }

    Ok(analysis)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::InstrumentCategory;
    use chrono::NaiveDate;
    use rust_decimal_macros::dec;

    #[test]
    fn test_preview_anticipates_instrument_groups_across_merged_custodians() {
        let dir = tempfile::tempdir().unwrap();
        let db_path = dir.path().join("test.db");
        db::init_database(Some(db_path.clone())).unwrap();
        let conn = db::open_db(Some(db_path)).unwrap();

        let x = db::create_custodian(&conn, "Banco X").unwrap();
        let y = db::create_custodian(&conn, "BANCO X LTDA").unwrap();
        let a = db::create_instrument(&conn, "ABC", InstrumentCategory::Other, x.id).unwrap();
        let b = db::create_instrument(&conn, "abc", InstrumentCategory::Other, y.id).unwrap();
        let d = NaiveDate::from_ymd_opt(2025, 3, 31).unwrap();
        db::upsert_snapshot(&conn, b.id, d, dec!(5), None, None).unwrap();

        let analysis = find_duplicates(&conn).unwrap();
        assert_eq!(analysis.custodians.len(), 1);
        assert_eq!(analysis.custodians[0].key, "BANCO X");
        assert_eq!(analysis.instruments.len(), 1);

        let group = &analysis.instruments[0];
        assert_eq!(group.survivor().map(|m| m.id), Some(a.id));
        assert_eq!(group.members[1].children, 1);
        assert_eq!(analysis.duplicate_count(), 2);

        // Nothing was written
        assert_eq!(db::list_custodians(&conn).unwrap().len(), 2);
    }
}
