use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::{ClassifiedFlow, FlowKind};
use crate::config::Thresholds;
use crate::db::BalanceSnapshot;
use crate::utils::checked_percent;

/// Strategy that assigns a contribution and a withdrawal to every snapshot of a series.
///
/// `series` must be sorted by date ascending. The returned vector has one
/// entry per snapshot, in the same order. Policies are never composed: the
/// caller picks the one that fits (seeding a fresh import or recomputing a
/// whole series).
pub trait ClassificationPolicy {
    fn name(&self) -> &'static str;

    fn classify(&self, series: &[BalanceSnapshot]) -> Vec<ClassifiedFlow>;
}

/// The earliest snapshot is the opening position: all of its balance is capital.
///
/// Only the seed row is rewritten; later rows keep their recorded flows.
#[derive(Debug, Clone, Copy, Default)]
pub struct FirstSnapshotIsCapital;

impl ClassificationPolicy for FirstSnapshotIsCapital {
    fn name(&self) -> &'static str {
        "first-snapshot"
    }

    fn classify(&self, series: &[BalanceSnapshot]) -> Vec<ClassifiedFlow> {
        series
            .iter()
            .enumerate()
            .map(|(idx, snapshot)| {
                if idx == 0 {
                    ClassifiedFlow::new(snapshot.total_value, Decimal::ZERO, FlowKind::Seed)
                } else {
                    ClassifiedFlow::untouched(snapshot)
                }
            })
            .collect()
    }
}

/// Rebuild flows from balance deltas between consecutive snapshots.
///
/// A rise above `up_threshold_percent` of the previous balance is external
/// capital, a fall beyond `down_threshold_percent` is a withdrawal, anything
/// in between is performance. The result depends only on the balances, so
/// running it twice gives the same flows.
#[derive(Debug, Clone, Copy, Default)]
pub struct DeltaThreshold {
    pub thresholds: Thresholds,
}

impl DeltaThreshold {
    pub fn new(thresholds: Thresholds) -> Self {
        Self { thresholds }
    }

    /// Classify the move from `previous` to `current` balance
    pub fn classify_pair(&self, previous: Decimal, current: Decimal) -> ClassifiedFlow {
        let delta = current - previous;

        if delta.is_zero() {
            return ClassifiedFlow::new(Decimal::ZERO, Decimal::ZERO, FlowKind::Flat);
        }

        // No capital base: any increase is new money, any decrease is money out
        if previous <= Decimal::ZERO {
            return if delta > Decimal::ZERO {
                ClassifiedFlow::new(delta, Decimal::ZERO, FlowKind::Contribution)
            } else {
                ClassifiedFlow::new(Decimal::ZERO, delta.abs(), FlowKind::Withdrawal)
            };
        }

        // A ratio too large for Decimal is past either threshold
        let percent = checked_percent(delta, previous);

        if delta > Decimal::ZERO {
            match percent {
                Some(p) if p <= self.thresholds.up_threshold_percent => {
                    ClassifiedFlow::new(Decimal::ZERO, Decimal::ZERO, FlowKind::OrganicGain)
                }
                _ => ClassifiedFlow::new(delta, Decimal::ZERO, FlowKind::Contribution),
            }
        } else {
            match percent {
                Some(p) if p >= -self.thresholds.down_threshold_percent => {
                    ClassifiedFlow::new(Decimal::ZERO, Decimal::ZERO, FlowKind::MarketLoss)
                }
                _ => ClassifiedFlow::new(Decimal::ZERO, delta.abs(), FlowKind::Withdrawal),
            }
        }
    }
}

impl ClassificationPolicy for DeltaThreshold {
    fn name(&self) -> &'static str {
        "delta-threshold"
    }

    fn classify(&self, series: &[BalanceSnapshot]) -> Vec<ClassifiedFlow> {
        if series.len() < 2 {
            return series.iter().map(ClassifiedFlow::untouched).collect();
        }

        let mut flows = Vec::with_capacity(series.len());
        flows.push(ClassifiedFlow::untouched(&series[0]));
        for pair in series.windows(2) {
            flows.push(self.classify_pair(pair[0].total_value, pair[1].total_value));
        }
        flows
    }
}

/// Named policies selectable from the command line
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
pub enum PolicyKind {
    /// Seed the earliest snapshot as the opening capital
    FirstSnapshot,
    /// Rebuild every flow from balance deltas
    DeltaThreshold,
}

impl PolicyKind {
    pub fn build(self, thresholds: Thresholds) -> Box<dyn ClassificationPolicy> {
        match self {
            PolicyKind::FirstSnapshot => Box::new(FirstSnapshotIsCapital),
            PolicyKind::DeltaThreshold => Box::new(DeltaThreshold::new(thresholds)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use rust_decimal_macros::dec;

    fn series(points: &[(u32, Decimal, Decimal, Decimal)]) -> Vec<BalanceSnapshot> {
        points
            .iter()
            .enumerate()
            .map(|(idx, (day, total, contribution, withdrawal))| BalanceSnapshot {
                id: idx as i64 + 1,
                instrument_id: 1,
                date: NaiveDate::from_ymd_opt(2025, 1, *day).unwrap(),
                total_value: *total,
                contribution: *contribution,
                withdrawal: *withdrawal,
            })
            .collect()
    }

    fn balances(values: &[Decimal]) -> Vec<BalanceSnapshot> {
        let points: Vec<_> = values
            .iter()
            .enumerate()
            .map(|(idx, v)| (idx as u32 + 1, *v, Decimal::ZERO, Decimal::ZERO))
            .collect();
        series(&points)
    }

    fn delta() -> DeltaThreshold {
        DeltaThreshold::new(Thresholds::new(dec!(2.5), dec!(5.0)))
    }

    #[test]
    fn test_small_rise_is_organic_gain() {
        let flow = delta().classify_pair(dec!(1000), dec!(1020));
        assert_eq!(flow.kind, FlowKind::OrganicGain);
        assert_eq!(flow.contribution, Decimal::ZERO);
        assert_eq!(flow.withdrawal, Decimal::ZERO);
    }

    #[test]
    fn test_rise_exactly_at_threshold_is_organic() {
        let flow = delta().classify_pair(dec!(1000), dec!(1025));
        assert_eq!(flow.kind, FlowKind::OrganicGain);
    }

    #[test]
    fn test_large_rise_is_contribution_of_whole_delta() {
        let flow = delta().classify_pair(dec!(1000), dec!(1300));
        assert_eq!(flow.kind, FlowKind::Contribution);
        assert_eq!(flow.contribution, dec!(300));
        assert_eq!(flow.withdrawal, Decimal::ZERO);
    }

    #[test]
    fn test_drops_use_the_down_threshold() {
        // -4% stays a market loss even though it exceeds the 2.5% up threshold
        let loss = delta().classify_pair(dec!(1000), dec!(960));
        assert_eq!(loss.kind, FlowKind::MarketLoss);
        assert_eq!(loss.withdrawal, Decimal::ZERO);

        let at_limit = delta().classify_pair(dec!(1000), dec!(950));
        assert_eq!(at_limit.kind, FlowKind::MarketLoss);

        let withdrawal = delta().classify_pair(dec!(230000), dec!(50000));
        assert_eq!(withdrawal.kind, FlowKind::Withdrawal);
        assert_eq!(withdrawal.withdrawal, dec!(180000));
        assert_eq!(withdrawal.contribution, Decimal::ZERO);
    }

    #[test]
    fn test_extreme_ratio_does_not_overflow() {
        let rise = delta().classify_pair(dec!(0.0000000001), dec!(1000000000000000000));
        assert_eq!(rise.kind, FlowKind::Contribution);
        assert_eq!(rise.contribution, dec!(1000000000000000000) - dec!(0.0000000001));

        let fall = delta().classify_pair(dec!(0.0000000001), dec!(-1000000000000000000));
        assert_eq!(fall.kind, FlowKind::Withdrawal);
        assert_eq!(fall.withdrawal, dec!(1000000000000000000) + dec!(0.0000000001));
    }

    #[test]
    fn test_zero_previous_balance_classifies_by_sign() {
        let flow = delta().classify_pair(Decimal::ZERO, dec!(750));
        assert_eq!(flow.kind, FlowKind::Contribution);
        assert_eq!(flow.contribution, dec!(750));

        let flat = delta().classify_pair(Decimal::ZERO, Decimal::ZERO);
        assert_eq!(flat.kind, FlowKind::Flat);
    }

    #[test]
    fn test_short_series_is_left_untouched() {
        let single = series(&[(1, dec!(500), dec!(123), dec!(4))]);
        let flows = delta().classify(&single);
        assert_eq!(flows.len(), 1);
        assert_eq!(flows[0].kind, FlowKind::Untouched);
        assert_eq!(flows[0].contribution, dec!(123));
        assert_eq!(flows[0].withdrawal, dec!(4));

        assert!(delta().classify(&[]).is_empty());
    }

    #[test]
    fn test_delta_threshold_overwrites_recorded_flows_except_first() {
        let recorded = series(&[
            (1, dec!(1000), dec!(1000), Decimal::ZERO),
            (2, dec!(1020), dec!(1020), Decimal::ZERO),
            (3, dec!(1020), Decimal::ZERO, dec!(99)),
        ]);

        let flows = delta().classify(&recorded);
        assert_eq!(flows[0].kind, FlowKind::Untouched);
        assert_eq!(flows[0].contribution, dec!(1000));
        assert_eq!(flows[1].contribution, Decimal::ZERO);
        assert_eq!(flows[2].kind, FlowKind::Flat);
        assert_eq!(flows[2].withdrawal, Decimal::ZERO);
    }

    #[test]
    fn test_delta_threshold_is_idempotent() {
        let mut snapshots = balances(&[
            dec!(1000),
            dec!(1300),
            dec!(1290),
            dec!(600),
            dec!(610),
            dec!(0),
            dec!(400),
        ]);

        let first = delta().classify(&snapshots);
        for (snapshot, flow) in snapshots.iter_mut().zip(first.iter()) {
            snapshot.contribution = flow.contribution;
            snapshot.withdrawal = flow.withdrawal;
        }
        let second = delta().classify(&snapshots);

        let amounts = |flows: &[ClassifiedFlow]| -> Vec<(Decimal, Decimal)> {
            flows.iter().map(|f| (f.contribution, f.withdrawal)).collect()
        };
        assert_eq!(amounts(&first), amounts(&second));
    }

    #[test]
    fn test_first_snapshot_seeds_only_the_opening_row() {
        let recorded = series(&[
            (1, dec!(800), Decimal::ZERO, dec!(5)),
            (2, dec!(2000), dec!(1000), Decimal::ZERO),
        ]);

        let flows = FirstSnapshotIsCapital.classify(&recorded);
        assert_eq!(flows[0], ClassifiedFlow::new(dec!(800), Decimal::ZERO, FlowKind::Seed));
        assert_eq!(flows[1].kind, FlowKind::Untouched);
        assert_eq!(flows[1].contribution, dec!(1000));
    }

    #[test]
    fn test_policy_kind_builds_named_policy() {
        let thresholds = Thresholds::default();
        assert_eq!(PolicyKind::FirstSnapshot.build(thresholds).name(), "first-snapshot");
        assert_eq!(PolicyKind::DeltaThreshold.build(thresholds).name(), "delta-threshold");
    }
}
