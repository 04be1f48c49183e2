use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::str::FromStr;

use crate::error::LedgerError;

/// Instrument categories tracked by the ledger
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum InstrumentCategory {
    Equity,         // Ações
    Fund,           // Fundos, FIIs, ETFs
    FixedIncome,    // CDB, LCI, LCA, debentures
    Treasury,       // Tesouro Direto
    StructuredNote, // COE
    Other,
}

impl InstrumentCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            InstrumentCategory::Equity => "EQUITY",
            InstrumentCategory::Fund => "FUND",
            InstrumentCategory::FixedIncome => "FIXED_INCOME",
            InstrumentCategory::Treasury => "TREASURY",
            InstrumentCategory::StructuredNote => "STRUCTURED_NOTE",
            InstrumentCategory::Other => "OTHER",
        }
    }

    /// Guess the category from an instrument display name.
    ///
    /// Treasury bonds carry "Tesouro" in the name, B3 funds and ETFs end in 11,
    /// common and preferred shares end in 3 or 4, and bank-issued fixed income
    /// is recognised by its product prefix.
    pub fn detect_from_name(name: &str) -> Self {
        let upper = name.trim().to_uppercase();

        if upper.contains("TESOURO") {
            return InstrumentCategory::Treasury;
        }
        if upper.ends_with("11") {
            return InstrumentCategory::Fund;
        }
        if upper.ends_with('3') || upper.ends_with('4') {
            return InstrumentCategory::Equity;
        }
        if ["CDB", "LCI", "LCA", "DEB"]
            .iter()
            .any(|prefix| upper.contains(prefix))
        {
            return InstrumentCategory::FixedIncome;
        }
        InstrumentCategory::Other
    }
}

impl FromStr for InstrumentCategory {
    type Err = LedgerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "EQUITY" | "STOCK" | "ACAO" => Ok(InstrumentCategory::Equity),
            "FUND" | "FUNDO" | "ETF" | "FII" => Ok(InstrumentCategory::Fund),
            "FIXED_INCOME" | "FIXED-INCOME" | "RENDA_FIXA" => Ok(InstrumentCategory::FixedIncome),
            "TREASURY" | "TESOURO" => Ok(InstrumentCategory::Treasury),
            "STRUCTURED_NOTE" | "STRUCTURED-NOTE" | "COE" => Ok(InstrumentCategory::StructuredNote),
            "OTHER" => Ok(InstrumentCategory::Other),
            _ => Err(LedgerError::ValidationError(format!("unknown category: {}", s))),
        }
    }
}

/// Custodian (bank or brokerage holding instruments)
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Custodian {
    pub id: i64,
    pub name: String,
}

/// Instrument (a single holding tracked over time)
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Instrument {
    pub id: i64,
    pub name: String,
    pub category: InstrumentCategory,
    pub custodian_id: i64,
}

/// Dated observation of an instrument's balance plus the capital flow on that date
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct BalanceSnapshot {
    pub id: i64,
    pub instrument_id: i64,
    pub date: NaiveDate,
    pub total_value: Decimal,
    pub contribution: Decimal,
    pub withdrawal: Decimal,
}

impl BalanceSnapshot {
    /// Capital added minus capital removed on this date
    pub fn net_flow(&self) -> Decimal {
        self.contribution - self.withdrawal
    }
}

/// Instrument together with its full snapshot series, ordered by date ascending
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InstrumentHistory {
    pub instrument: Instrument,
    pub snapshots: Vec<BalanceSnapshot>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_detect_category_from_name() {
        assert_eq!(
            InstrumentCategory::detect_from_name("Tesouro Selic 2029"),
            InstrumentCategory::Treasury
        );
        assert_eq!(
            InstrumentCategory::detect_from_name("LFTS11"),
            InstrumentCategory::Fund
        );
        assert_eq!(
            InstrumentCategory::detect_from_name("RAIL3"),
            InstrumentCategory::Equity
        );
        assert_eq!(
            InstrumentCategory::detect_from_name("ITUB4"),
            InstrumentCategory::Equity
        );
        assert_eq!(
            InstrumentCategory::detect_from_name("CDB BANCO INTER"),
            InstrumentCategory::FixedIncome
        );
        assert_eq!(
            InstrumentCategory::detect_from_name("Previdencia XP"),
            InstrumentCategory::Other
        );
    }

    #[test]
    fn test_category_round_trips_through_storage_label() {
        for category in [
            InstrumentCategory::Equity,
            InstrumentCategory::Fund,
            InstrumentCategory::FixedIncome,
            InstrumentCategory::Treasury,
            InstrumentCategory::StructuredNote,
            InstrumentCategory::Other,
        ] {
            assert_eq!(category.as_str().parse::<InstrumentCategory>().unwrap(), category);
        }
        assert!("crypto".parse::<InstrumentCategory>().is_err());
    }
}
