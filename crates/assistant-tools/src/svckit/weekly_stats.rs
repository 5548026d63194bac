//! Weekly Stats Tool

use std::sync::Arc;

use async_trait::async_trait;

use turn_core::{Result as CoreResult, ToolContext, ToolSchema, TypedTool};

use super::NoArgs;
use crate::ledger::ExpenseLedger;
use crate::model::WeeklyTotals;

/// Tool returning total spent per week
pub struct WeeklyStatsTool {
    ledger: Arc<dyn ExpenseLedger>,
}

impl WeeklyStatsTool {
    pub fn new(ledger: Arc<dyn ExpenseLedger>) -> Self {
        Self { ledger }
    }
}

#[async_trait]
impl TypedTool for WeeklyStatsTool {
    type Args = NoArgs;
    type Output = WeeklyTotals;

    fn schema(&self) -> ToolSchema {
        ToolSchema {
            name: "get_weekly_stats".into(),
            description: "Get the user's total spending per week number".into(),
            parameters: vec![],
            category: Some("finance".into()),
            has_side_effects: false,
        }
    }

    async fn call(&self, _args: NoArgs, ctx: &ToolContext) -> CoreResult<WeeklyTotals> {
        self.ledger
            .weekly_totals(ctx.session.as_str())
            .await
            .map_err(|e| e.into_agent_error("get_weekly_stats"))
    }
}
