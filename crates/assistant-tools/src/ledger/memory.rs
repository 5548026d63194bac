//! In-Memory Ledger
//!
//! For tests, demos and single-process deployments.

use async_trait::async_trait;
use rust_decimal::Decimal;
use tokio::sync::RwLock;

use super::ExpenseLedger;
use crate::error::Result;
use crate::model::{Expense, WeeklyTotals};

/// Ledger holding every expense in memory
#[derive(Default)]
pub struct MemoryLedger {
    expenses: RwLock<Vec<Expense>>,
}

impl MemoryLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.expenses.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

#[async_trait]
impl ExpenseLedger for MemoryLedger {
    async fn add(&self, expense: Expense) -> Result<()> {
        tracing::debug!(email = %expense.email, category = %expense.category, amount = %expense.amount, "Expense recorded");
        self.expenses.write().await.push(expense);
        Ok(())
    }

    async fn recent(&self, email: &str, limit: usize) -> Result<Vec<Expense>> {
        let expenses = self.expenses.read().await;
        let mut mine: Vec<Expense> = expenses.iter().filter(|e| e.email == email).cloned().collect();

        // newest date first; later entries first within a day
        mine.sort_by(|a, b| {
            b.expense_date
                .cmp(&a.expense_date)
                .then(b.created_at.cmp(&a.created_at))
        });
        mine.truncate(limit);
        Ok(mine)
    }

    async fn weekly_totals(&self, email: &str) -> Result<WeeklyTotals> {
        let expenses = self.expenses.read().await;
        let mut totals = WeeklyTotals::new();

        for expense in expenses.iter().filter(|e| e.email == email) {
            *totals.entry(expense.week_number()).or_insert(Decimal::ZERO) += expense.amount;
        }

        Ok(totals)
    }

    fn name(&self) -> &str {
        "MemoryLedger"
    }
}
