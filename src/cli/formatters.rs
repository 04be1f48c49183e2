//! Output formatting module for CLI display
//!
//! Turns report structs into terminal tables. Calculation stays in the
//! library; nothing here touches the database.

use colored::Colorize;
use rust_decimal::Decimal;
use tabled::{
    settings::{object::Columns, Alignment, Style},
    Table, Tabled,
};

use holdings::flows::ReclassifyReport;
use holdings::merge::{DuplicateAnalysis, GroupState, MergeReport};
use holdings::reports::{InstrumentDetails, PeriodReport, PortfolioInsights, PortfolioSummary, Tone};
use holdings::utils::{format_currency, format_percent};

fn signed_currency(value: Decimal) -> String {
    let text = format_currency(value);
    if value < Decimal::ZERO {
        text.red().to_string()
    } else {
        text.green().to_string()
    }
}

fn signed_percent(value: Decimal) -> String {
    let text = format_percent(value);
    if value < Decimal::ZERO {
        text.red().to_string()
    } else {
        text.green().to_string()
    }
}

pub fn format_empty_portfolio() -> String {
    format!(
        "\n{} No instruments recorded yet. Use `holdings record balance` to add one.\n",
        "ℹ".blue().bold()
    )
}

/// Totals block followed by one row per instrument
pub fn format_summary_table(summary: &PortfolioSummary) -> String {
    let mut output = String::new();
    output.push_str(&format!("\n{} Portfolio Summary\n\n", "📊".cyan().bold()));

    #[derive(Tabled)]
    struct InstrumentRow {
        #[tabled(rename = "ID")]
        id: i64,
        #[tabled(rename = "Instrument")]
        name: String,
        #[tabled(rename = "Custodian")]
        custodian: String,
        #[tabled(rename = "Category")]
        category: String,
        #[tabled(rename = "Balance")]
        balance: String,
        #[tabled(rename = "Net Invested")]
        invested: String,
        #[tabled(rename = "Profit")]
        profit: String,
        #[tabled(rename = "ROI")]
        roi: String,
    }

    let rows: Vec<InstrumentRow> = summary
        .instruments
        .iter()
        .map(|i| InstrumentRow {
            id: i.id,
            name: i.name.clone(),
            custodian: i.custodian.clone(),
            category: i.category.as_str().to_string(),
            balance: format_currency(i.metrics.current_balance),
            invested: format_currency(i.metrics.net_invested),
            profit: signed_currency(i.metrics.profit),
            roi: signed_percent(i.metrics.roi),
        })
        .collect();

    let table = Table::new(rows)
        .with(Style::rounded())
        .modify(Columns::new(4..), Alignment::right())
        .to_string();
    output.push_str(&table);
    output.push('\n');

    output.push_str(&format!(
        "\n  {:<14} {}\n",
        "Total balance:",
        format_currency(summary.total_balance).bold()
    ));
    output.push_str(&format!(
        "  {:<14} {}\n",
        "Net invested:",
        format_currency(summary.total_invested)
    ));
    output.push_str(&format!(
        "  {:<14} {}\n",
        "Profit:",
        signed_currency(summary.total_profit)
    ));
    output.push_str(&format!(
        "  {:<14} {}\n",
        "ROI:",
        signed_percent(summary.total_roi)
    ));

    if let (Some(first), Some(last)) = (summary.history.first(), summary.history.last()) {
        output.push_str(&format!(
            "\n  History: {} points from {} ({}) to {} ({})\n",
            summary.history.len(),
            first.date,
            format_currency(first.value),
            last.date,
            format_currency(last.value)
        ));
    }

    output
}

pub fn format_instrument_details(details: &InstrumentDetails) -> String {
    let mut output = String::new();
    let custodian = details
        .custodian
        .as_ref()
        .map(|c| c.name.as_str())
        .unwrap_or("-");

    output.push_str(&format!(
        "\n{} {} ({}, {})\n\n",
        "🔎".cyan().bold(),
        details.instrument.name.bold(),
        custodian,
        details.instrument.category.as_str()
    ));
    output.push_str(&format!(
        "  Balance: {}   Net invested: {}   Profit: {}   ROI: {}\n\n",
        format_currency(details.metrics.current_balance),
        format_currency(details.metrics.net_invested),
        signed_currency(details.metrics.profit),
        signed_percent(details.metrics.roi)
    ));

    #[derive(Tabled)]
    struct HistoryRow {
        #[tabled(rename = "Date")]
        date: String,
        #[tabled(rename = "Balance")]
        value: String,
    }

    let rows: Vec<HistoryRow> = details
        .history
        .iter()
        .map(|p| HistoryRow {
            date: p.date.format("%d/%m/%Y").to_string(),
            value: format_currency(p.value),
        })
        .collect();

    let table = Table::new(rows)
        .with(Style::rounded())
        .modify(Columns::new(1..), Alignment::right())
        .to_string();
    output.push_str(&table);
    output.push('\n');
    output
}

pub fn format_period_table(report: &PeriodReport) -> String {
    let mut output = String::new();
    output.push_str(&format!(
        "\n{} Period {} → {}\n\n",
        "📅".cyan().bold(),
        report.start,
        report.end
    ));

    #[derive(Tabled)]
    struct PeriodRowView {
        #[tabled(rename = "Instrument")]
        name: String,
        #[tabled(rename = "Start")]
        start: String,
        #[tabled(rename = "+ Added")]
        added: String,
        #[tabled(rename = "- Removed")]
        removed: String,
        #[tabled(rename = "End")]
        end: String,
        #[tabled(rename = "Yield")]
        yield_value: String,
        #[tabled(rename = "ROI")]
        roi: String,
    }

    let mut rows: Vec<PeriodRowView> = report
        .rows
        .iter()
        .map(|r| PeriodRowView {
            name: r.name.clone(),
            start: format_currency(r.line.start_balance),
            added: format_currency(r.line.added),
            removed: format_currency(r.line.removed),
            end: format_currency(r.line.end_balance),
            yield_value: signed_currency(r.line.yield_value),
            roi: signed_percent(r.line.roi),
        })
        .collect();

    let t = &report.totals;
    rows.push(PeriodRowView {
        name: "TOTAL".bold().to_string(),
        start: format_currency(t.start_balance),
        added: format_currency(t.added),
        removed: format_currency(t.removed),
        end: format_currency(t.end_balance),
        yield_value: signed_currency(t.yield_value),
        roi: signed_percent(t.roi),
    });

    let table = Table::new(rows)
        .with(Style::rounded())
        .modify(Columns::new(1..), Alignment::right())
        .to_string();
    output.push_str(&table);
    output.push('\n');
    output
}

pub fn format_insights(report: &PortfolioInsights) -> String {
    let mut output = String::new();
    output.push_str(&format!("\n{} Portfolio Insights\n\n", "🧠".cyan().bold()));

    for insight in &report.insights {
        let marker = match insight.tone {
            Tone::Positive => "✓".green().bold(),
            Tone::Negative => "↓".red().bold(),
            Tone::Warning => "⚠".yellow().bold(),
            Tone::Neutral => "•".blue().bold(),
        };
        output.push_str(&format!("  {} {}\n", marker, insight.message));
    }

    if !report.allocation.is_empty() {
        output.push_str("\n  Allocation:\n");
        for share in &report.allocation {
            output.push_str(&format!(
                "    {:<16} {:>18} {:>8}\n",
                share.category.as_str(),
                format_currency(share.balance),
                format_percent(share.percent)
            ));
        }
    }

    output
}

pub fn format_audit_table(summary: &PortfolioSummary, top: usize) -> String {
    let mut output = String::new();
    output.push_str(&format!(
        "\n{} Largest shortfalls (balance minus net invested)\n\n",
        "🔍".cyan().bold()
    ));

    #[derive(Tabled)]
    struct AuditRow {
        #[tabled(rename = "ID")]
        id: i64,
        #[tabled(rename = "Instrument")]
        name: String,
        #[tabled(rename = "Custodian")]
        custodian: String,
        #[tabled(rename = "Balance")]
        balance: String,
        #[tabled(rename = "Net Invested")]
        invested: String,
        #[tabled(rename = "Difference")]
        difference: String,
        #[tabled(rename = "Snapshots")]
        snapshots: usize,
    }

    let rows: Vec<AuditRow> = summary
        .largest_shortfalls(top)
        .into_iter()
        .map(|i| AuditRow {
            id: i.id,
            name: i.name.clone(),
            custodian: i.custodian.clone(),
            balance: format_currency(i.metrics.current_balance),
            invested: format_currency(i.metrics.net_invested),
            difference: signed_currency(i.metrics.profit),
            snapshots: i.snapshot_count,
        })
        .collect();

    let table = Table::new(rows)
        .with(Style::rounded())
        .modify(Columns::new(3..), Alignment::right())
        .to_string();
    output.push_str(&table);
    output.push_str(&format!(
        "\n\n  Total balance {}, net invested {}, ROI {}\n",
        format_currency(summary.total_balance),
        format_currency(summary.total_invested),
        signed_percent(summary.total_roi)
    ));
    output
}

pub fn format_duplicate_analysis(analysis: &DuplicateAnalysis) -> String {
    if analysis.is_empty() {
        return format!("\n{} No duplicates found\n", "✓".green().bold());
    }

    let mut output = String::new();
    let sections = [
        ("Custodians", "instruments", &analysis.custodians),
        ("Instruments", "snapshots", &analysis.instruments),
    ];
    for (title, child_label, groups) in sections {
        if groups.is_empty() {
            continue;
        }
        output.push_str(&format!("\n{} ({} groups)\n", title.bold(), groups.len()));
        for group in groups.iter() {
            output.push_str(&format!("  {}\n", group.key.cyan()));
            for (idx, member) in group.members.iter().enumerate() {
                let role = if idx == 0 { "keep ".green() } else { "merge".yellow() };
                output.push_str(&format!(
                    "    {} [{}] {} ({} {})\n",
                    role, member.id, member.name, member.children, child_label
                ));
            }
        }
    }

    output.push_str(&format!(
        "\n{} Dry run - {} records would be merged\n",
        "ℹ".blue().bold(),
        analysis.duplicate_count()
    ));
    output
}

pub fn format_merge_report(report: &MergeReport) -> String {
    if report.is_noop() {
        return format!("\n{} No duplicates found\n", "✓".green().bold());
    }

    let mut output = String::new();
    for group in report
        .custodian_groups
        .iter()
        .chain(report.instrument_groups.iter())
    {
        let status = match group.state {
            GroupState::Deleted => "merged".green(),
            GroupState::Aborted => "aborted".red(),
            _ => "incomplete".yellow(),
        };
        output.push_str(&format!(
            "  [{}] {:?} {} → [{}] {} (moved {})\n",
            status, group.kind, group.key, group.survivor_id, group.survivor_name, group.moved
        ));
        for conflict in &group.conflicts {
            output.push_str(&format!(
                "      conflict {}: kept {}, discarded {} from [{}]\n",
                conflict.date,
                format_currency(conflict.kept_value),
                format_currency(conflict.discarded_value),
                conflict.duplicate_instrument_id
            ));
        }
        if let Some(error) = &group.error {
            output.push_str(&format!("      {}\n", error.red()));
        }
    }

    output.push_str(&format!(
        "\n{} Merge complete: {} duplicates removed, {} snapshots discarded",
        "✓".green().bold(),
        report.merged_count(),
        report.discarded_count()
    ));
    if report.aborted_count() > 0 {
        output.push_str(&format!(
            ", {} groups aborted",
            report.aborted_count().to_string().red()
        ));
    }
    output.push('\n');
    output
}

pub fn format_reclassify_report(report: &ReclassifyReport) -> String {
    let s = &report.stats;
    let mut output = format!(
        "\n{} Reclassified with {}: {} instruments, {} of {} snapshots changed\n",
        "✓".green().bold(),
        report.policy.bold(),
        report.instruments,
        report.updated,
        report.snapshots
    );
    output.push_str(&format!(
        "  seeds {}, contributions {}, organic gains {}, withdrawals {}, market losses {}, flat {}, untouched {}\n",
        s.seeds, s.contributions, s.organic_gains, s.withdrawals, s.market_losses, s.flat, s.untouched
    ));
    output
}
