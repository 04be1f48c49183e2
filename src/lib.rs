//! Holdings - multi-custodian investment portfolio tracker
//!
//! This library keeps a ledger of balance snapshots per instrument, merges
//! custodians and instruments recorded under inconsistent names, infers
//! contributions and withdrawals from balance movements, and computes
//! balance, invested capital and return figures on top of it.

pub mod config;
pub mod db;
pub mod error;
pub mod flows;
pub mod importers;
pub mod merge;
pub mod normalize;
pub mod reports;
pub mod utils;
