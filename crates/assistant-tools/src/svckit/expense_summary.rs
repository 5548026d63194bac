//! Expense Summary Tool

use std::sync::Arc;

use async_trait::async_trait;

use turn_core::{Result as CoreResult, ToolContext, ToolSchema, TypedTool};

use super::NoArgs;
use crate::ledger::{ExpenseLedger, SUMMARY_LIMIT};
use crate::model::ExpenseSummaryEntry;

/// Tool returning the user's latest expenses, newest first
pub struct ExpenseSummaryTool {
    ledger: Arc<dyn ExpenseLedger>,
}

impl ExpenseSummaryTool {
    pub fn new(ledger: Arc<dyn ExpenseLedger>) -> Self {
        Self { ledger }
    }
}

#[async_trait]
impl TypedTool for ExpenseSummaryTool {
    type Args = NoArgs;
    type Output = Vec<ExpenseSummaryEntry>;

    fn schema(&self) -> ToolSchema {
        ToolSchema {
            name: "get_expense_summary".into(),
            description: "Get the user's latest 50 expenses, newest first, with category, amount, date and week number".into(),
            parameters: vec![],
            category: Some("finance".into()),
            has_side_effects: false,
        }
    }

    async fn call(&self, _args: NoArgs, ctx: &ToolContext) -> CoreResult<Vec<ExpenseSummaryEntry>> {
        let expenses = self
            .ledger
            .recent(ctx.session.as_str(), SUMMARY_LIMIT)
            .await
            .map_err(|e| e.into_agent_error("get_expense_summary"))?;

        Ok(expenses.iter().map(ExpenseSummaryEntry::from).collect())
    }
}
