// Reports module - read-side metrics over the ledger

pub mod insights;
pub mod metrics;
pub mod period;

pub use insights::{generate_insights, Insight, PortfolioInsights, Tone};
pub use metrics::{
    calculate_summary, instrument_details, instrument_metrics, roi, summarize,
    HistoryPoint, InstrumentDetails, InstrumentMetrics, InstrumentSummary, PortfolioSummary,
};
pub use period::{period_report, PeriodLine, PeriodReport, PeriodRow};
