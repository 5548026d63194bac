//! Domain Models
//!
//! Expense records and the report shapes handed back to the model.
//! Uses `rust_decimal` for all monetary values.

use std::collections::BTreeMap;

use chrono::{DateTime, Datelike, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{Result, ToolkitError};

/// One recorded expense
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Expense {
    pub id: Uuid,

    /// Owner's e-mail (also the session key)
    pub email: String,

    /// Free-form category (groceries, transport, ...)
    pub category: String,

    pub amount: Decimal,

    pub expense_date: NaiveDate,

    /// Remote thread the expense was entered from
    pub thread_id: Option<String>,

    pub created_at: DateTime<Utc>,
}

impl Expense {
    /// Build a validated expense
    pub fn new(
        email: impl Into<String>,
        category: impl Into<String>,
        amount: Decimal,
        expense_date: NaiveDate,
    ) -> Result<Self> {
        let email = email.into();
        let category = category.into().trim().to_string();

        if amount < Decimal::ZERO {
            return Err(ToolkitError::InvalidAmount(amount));
        }
        if email.trim().is_empty() {
            return Err(ToolkitError::InvalidExpense("email is required".into()));
        }
        if category.is_empty() {
            return Err(ToolkitError::InvalidExpense("category is required".into()));
        }

        Ok(Self {
            id: Uuid::new_v4(),
            email,
            category,
            amount,
            expense_date,
            thread_id: None,
            created_at: Utc::now(),
        })
    }

    pub fn with_thread(mut self, thread_id: impl Into<String>) -> Self {
        self.thread_id = Some(thread_id.into());
        self
    }

    pub fn week_number(&self) -> u32 {
        week_number(self.expense_date)
    }
}

/// Week of the year, counting weeks that start on Sunday with week 1
/// containing January 1st.
pub fn week_number(date: NaiveDate) -> u32 {
    let offset = NaiveDate::from_ymd_opt(date.year(), 1, 1)
        .map_or(0, |jan1| jan1.weekday().num_days_from_sunday());
    (date.ordinal0() + offset) / 7 + 1
}

/// One row of the expense summary
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ExpenseSummaryEntry {
    pub category: String,
    pub amount: Decimal,

    /// `YYYY-MM-DD`
    pub expense_date: String,

    pub week_number: u32,
}

impl From<&Expense> for ExpenseSummaryEntry {
    fn from(expense: &Expense) -> Self {
        Self {
            category: expense.category.clone(),
            amount: expense.amount,
            expense_date: expense.expense_date.format("%Y-%m-%d").to_string(),
            week_number: expense.week_number(),
        }
    }
}

/// Week number → total spent, ascending by week
pub type WeeklyTotals = BTreeMap<u32, Decimal>;
