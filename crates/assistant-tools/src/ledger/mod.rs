//! Expense Ledger
//!
//! Storage abstraction for expenses. The SQL backend the tracker was first
//! written against is out of scope; anything that can append and query
//! expenses per user implements [`ExpenseLedger`].

mod memory;

pub use memory::MemoryLedger;

use async_trait::async_trait;

use crate::error::Result;
use crate::model::{Expense, WeeklyTotals};

/// Maximum rows returned by an expense summary
pub const SUMMARY_LIMIT: usize = 50;

/// Expense ledger trait (Strategy pattern)
#[async_trait]
pub trait ExpenseLedger: Send + Sync {
    /// Record an expense
    async fn add(&self, expense: Expense) -> Result<()>;

    /// Latest expenses for `email`, newest first
    async fn recent(&self, email: &str, limit: usize) -> Result<Vec<Expense>>;

    /// Total spent per week number for `email`
    async fn weekly_totals(&self, email: &str) -> Result<WeeklyTotals>;

    /// Ledger name
    fn name(&self) -> &str;
}
