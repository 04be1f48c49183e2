// Portfolio insights - rule-based observations over the ordered summary

use rust_decimal::Decimal;
use serde::Serialize;
use std::collections::BTreeMap;

use super::metrics::{InstrumentSummary, PortfolioSummary};
use crate::db::InstrumentCategory;
use crate::utils::percent_of;

const CONCENTRATION_LIMIT: Decimal = Decimal::from_parts(25, 0, 0, false, 0);
const STRONG_RETURN: Decimal = Decimal::from_parts(10, 0, 0, false, 0);
const CONSERVATIVE_SHARE: Decimal = Decimal::from_parts(70, 0, 0, false, 0);
const AGGRESSIVE_SHARE: Decimal = Decimal::from_parts(60, 0, 0, false, 0);
const LAGGARD_ROI: Decimal = Decimal::from_parts(5, 0, 0, true, 0);
/// Holdings below 1% of the portfolio are ignored for best/worst
const RELEVANCE_SHARE: Decimal = Decimal::from_parts(1, 0, 0, false, 2);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Tone {
    Positive,
    Negative,
    Warning,
    Neutral,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Insight {
    pub tone: Tone,
    pub message: String,
}

impl Insight {
    fn new(tone: Tone, message: String) -> Self {
        Self { tone, message }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct CategoryShare {
    pub category: InstrumentCategory,
    pub balance: Decimal,
    pub percent: Decimal,
}

#[derive(Debug, Clone, Serialize)]
pub struct PortfolioInsights {
    pub allocation: Vec<CategoryShare>,
    pub top_holding_percent: Decimal,
    pub insights: Vec<Insight>,
}

/// Balance per category, largest first
pub fn allocation_by_category(summary: &PortfolioSummary) -> Vec<CategoryShare> {
    let mut balances: BTreeMap<InstrumentCategory, Decimal> = BTreeMap::new();
    for instrument in &summary.instruments {
        *balances.entry(instrument.category).or_insert(Decimal::ZERO) +=
            instrument.metrics.current_balance;
    }

    let mut shares: Vec<CategoryShare> = balances
        .into_iter()
        .map(|(category, balance)| CategoryShare {
            category,
            balance,
            percent: percent_of(balance, summary.total_balance),
        })
        .collect();
    shares.sort_by(|a, b| b.balance.cmp(&a.balance));
    shares
}

/// Best and worst ROI among holdings worth at least 1% of the portfolio
fn best_and_worst(summary: &PortfolioSummary) -> Option<(&InstrumentSummary, &InstrumentSummary)> {
    let floor = summary.total_balance * RELEVANCE_SHARE;
    let relevant: Vec<&InstrumentSummary> = summary
        .instruments
        .iter()
        .filter(|i| i.metrics.current_balance > floor)
        .collect();

    // Ties go to the larger holding, which comes first
    let best = relevant
        .iter()
        .copied()
        .reduce(|best, i| if i.metrics.roi > best.metrics.roi { i } else { best })?;
    let worst = relevant
        .iter()
        .copied()
        .reduce(|worst, i| if i.metrics.roi < worst.metrics.roi { i } else { worst })?;
    Some((best, worst))
}

/// Derive insights from a summary whose instruments are ordered by balance descending
pub fn generate_insights(summary: &PortfolioSummary) -> PortfolioInsights {
    let allocation = allocation_by_category(summary);
    let mut insights = Vec::new();

    let roi = summary.total_roi.round_dp(1);
    if summary.total_roi > STRONG_RETURN {
        insights.push(Insight::new(
            Tone::Positive,
            format!("Portfolio is performing strongly overall (+{}%)", roi),
        ));
    } else if summary.total_roi < Decimal::ZERO {
        insights.push(Insight::new(
            Tone::Negative,
            format!("Portfolio is losing value overall ({}%)", roi),
        ));
    } else {
        insights.push(Insight::new(
            Tone::Neutral,
            format!("Portfolio is stable (+{}%)", roi),
        ));
    }

    let top_holding_percent = summary
        .instruments
        .first()
        .map(|top| percent_of(top.metrics.current_balance, summary.total_balance))
        .unwrap_or(Decimal::ZERO);
    if let Some(top) = summary.instruments.first() {
        let percent = top_holding_percent.round_dp(0);
        if top_holding_percent > CONCENTRATION_LIMIT {
            insights.push(Insight::new(
                Tone::Warning,
                format!(
                    "Concentration alert: \"{}\" holds {}% of the portfolio",
                    top.name, percent
                ),
            ));
        } else {
            insights.push(Insight::new(
                Tone::Positive,
                format!("Well diversified: the largest holding is {}% of the total", percent),
            ));
        }
    }

    if let Some(top) = allocation.first() {
        let percent = top.percent.round_dp(0);
        match top.category {
            InstrumentCategory::FixedIncome | InstrumentCategory::Treasury
                if top.percent > CONSERVATIVE_SHARE =>
            {
                insights.push(Insight::new(
                    Tone::Neutral,
                    format!(
                        "Conservative profile: {}% in {}",
                        percent,
                        top.category.as_str()
                    ),
                ));
            }
            InstrumentCategory::Equity | InstrumentCategory::Fund if top.percent > AGGRESSIVE_SHARE => {
                insights.push(Insight::new(
                    Tone::Neutral,
                    format!("Aggressive profile: {}% in variable income", percent),
                ));
            }
            _ => {}
        }
    }

    if let Some((best, worst)) = best_and_worst(summary) {
        if best.metrics.roi > Decimal::ZERO {
            insights.push(Insight::new(
                Tone::Positive,
                format!(
                    "Top performer: \"{}\" returned +{}%",
                    best.name,
                    best.metrics.roi.round_dp(1)
                ),
            ));
        }
        if worst.metrics.roi < LAGGARD_ROI {
            insights.push(Insight::new(
                Tone::Negative,
                format!(
                    "Laggard: \"{}\" is dragging returns down at {}%",
                    worst.name,
                    worst.metrics.roi.round_dp(1)
                ),
            ));
        }
    }

    PortfolioInsights {
        allocation,
        top_holding_percent,
        insights,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reports::metrics::InstrumentMetrics;
    use rust_decimal_macros::dec;

    fn holding(id: i64, category: InstrumentCategory, balance: Decimal, roi: Decimal) -> InstrumentSummary {
        InstrumentSummary {
            id,
            name: format!("H{}", id),
            category,
            custodian: "XP".to_string(),
            snapshot_count: 1,
            metrics: InstrumentMetrics {
                current_balance: balance,
                net_invested: Decimal::ZERO,
                profit: Decimal::ZERO,
                roi,
            },
        }
    }

    fn summary(instruments: Vec<InstrumentSummary>, total_roi: Decimal) -> PortfolioSummary {
        let total_balance = instruments.iter().map(|i| i.metrics.current_balance).sum();
        PortfolioSummary {
            total_balance,
            total_invested: Decimal::ZERO,
            total_profit: Decimal::ZERO,
            total_roi,
            instruments,
            history: Vec::new(),
        }
    }

    #[test]
    fn test_constants() {
        assert_eq!(CONCENTRATION_LIMIT, dec!(25));
        assert_eq!(LAGGARD_ROI, dec!(-5));
        assert_eq!(RELEVANCE_SHARE, dec!(0.01));
    }

    #[test]
    fn test_concentration_warning_uses_first_holding() {
        let s = summary(
            vec![
                holding(1, InstrumentCategory::Equity, dec!(600), dec!(12)),
                holding(2, InstrumentCategory::FixedIncome, dec!(400), dec!(-8)),
            ],
            dec!(11),
        );

        let report = generate_insights(&s);
        assert_eq!(report.top_holding_percent, dec!(60));
        assert_eq!(report.insights[0].tone, Tone::Positive);
        assert!(report
            .insights
            .iter()
            .any(|i| i.tone == Tone::Warning && i.message.contains("H1")));
        assert!(report
            .insights
            .iter()
            .any(|i| i.tone == Tone::Negative && i.message.contains("H2")));
    }

    #[test]
    fn test_tiny_holdings_are_ignored_for_best_and_worst() {
        let s = summary(
            vec![
                holding(1, InstrumentCategory::FixedIncome, dec!(10000), dec!(3)),
                holding(2, InstrumentCategory::Equity, dec!(5), dec!(-90)),
            ],
            dec!(3),
        );

        let report = generate_insights(&s);
        assert_eq!(report.insights[0].tone, Tone::Neutral);
        assert!(!report.insights.iter().any(|i| i.message.contains("H2")));
        assert!(report.insights.iter().any(|i| i.message.contains("Conservative")));
    }

    #[test]
    fn test_roi_ties_pick_the_larger_holding() {
        let s = summary(
            vec![
                holding(1, InstrumentCategory::Equity, dec!(900), dec!(8)),
                holding(2, InstrumentCategory::Equity, dec!(500), dec!(-7)),
                holding(3, InstrumentCategory::Equity, dec!(300), dec!(-7)),
                holding(4, InstrumentCategory::Equity, dec!(100), dec!(8)),
            ],
            dec!(3),
        );

        let (best, worst) = best_and_worst(&s).unwrap();
        assert_eq!(best.id, 1);
        assert_eq!(worst.id, 2);
    }

    #[test]
    fn test_empty_portfolio_has_no_concentration() {
        let report = generate_insights(&summary(Vec::new(), Decimal::ZERO));
        assert_eq!(report.top_holding_percent, Decimal::ZERO);
        assert!(report.allocation.is_empty());
        assert_eq!(report.insights.len(), 1);
    }
}
