//! Add Expense Tool
//!
//! Records one expense in the ledger.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use turn_core::{Result as CoreResult, ToolContext, ToolSchema, TypedTool, tool::ParameterSchema};

use crate::ledger::ExpenseLedger;
use crate::model::Expense;

#[derive(Debug, Deserialize)]
pub struct AddExpenseArgs {
    pub category: String,
    pub amount: Decimal,

    /// Defaults to today
    #[serde(default, alias = "expense_date")]
    pub date: Option<NaiveDate>,
}

#[derive(Debug, Serialize)]
pub struct AddExpenseOutput {
    pub message: String,
    pub expense_id: Uuid,
}

/// Tool for recording expenses against the session user
pub struct AddExpenseTool {
    ledger: Arc<dyn ExpenseLedger>,
}

impl AddExpenseTool {
    pub fn new(ledger: Arc<dyn ExpenseLedger>) -> Self {
        Self { ledger }
    }
}

#[async_trait]
impl TypedTool for AddExpenseTool {
    type Args = AddExpenseArgs;
    type Output = AddExpenseOutput;

    fn schema(&self) -> ToolSchema {
        ToolSchema {
            name: "add_expense".into(),
            description: "Add an expense for the user".into(),
            parameters: vec![
                ParameterSchema::new("category", "string", "Expense category (groceries, transport, ...)").required(),
                ParameterSchema::new("amount", "number", "Amount spent, zero or more").required(),
                ParameterSchema::new("date", "string", "Date of the expense (YYYY-MM-DD), defaults to today")
                    .with_format("date"),
            ],
            category: Some("finance".into()),
            has_side_effects: true,
        }
    }

    async fn call(&self, args: AddExpenseArgs, ctx: &ToolContext) -> CoreResult<AddExpenseOutput> {
        let date = args.date.unwrap_or_else(|| Utc::now().date_naive());

        let mut expense = Expense::new(ctx.session.as_str(), &args.category, args.amount, date)
            .map_err(|e| e.into_agent_error("add_expense"))?;
        if let Some(thread_id) = &ctx.thread_id {
            expense = expense.with_thread(thread_id);
        }

        let message = format!(
            "Expense of {} for {} added successfully!",
            expense.amount, expense.category
        );
        let expense_id = expense.id;

        self.ledger
            .add(expense)
            .await
            .map_err(|e| e.into_agent_error("add_expense"))?;

        Ok(AddExpenseOutput { message, expense_id })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ledger::MemoryLedger;
    use rust_decimal_macros::dec;
    use serde_json::json;
    use turn_core::{AgentError, ToolCall, ToolRegistry};

    fn ada() -> ToolContext {
        ToolContext::new("ada@example.com").with_thread("thread_1")
    }

    fn registry(ledger: Arc<MemoryLedger>) -> ToolRegistry {
        let mut registry = ToolRegistry::new();
        registry.register_typed(AddExpenseTool::new(ledger));
        registry
    }

    #[tokio::test]
    async fn test_add_expense() {
        let ledger = Arc::new(MemoryLedger::new());
        let registry = registry(ledger.clone());

        let call = ToolCall::new(
            "call_1",
            "add_expense",
            json!({"category": "groceries", "amount": "42.50", "date": "2025-03-14"}),
        );
        let result = registry.dispatch(&call, &ada()).await.unwrap();

        assert_eq!(result.id, "call_1");
        assert_eq!(result.value["message"], "Expense of 42.50 for groceries added successfully!");

        let stored = ledger.recent("ada@example.com", 10).await.unwrap();
        assert_eq!(stored.len(), 1);
        assert_eq!(stored[0].amount, dec!(42.50));
        assert_eq!(stored[0].thread_id.as_deref(), Some("thread_1"));
    }

    #[tokio::test]
    async fn test_expense_recorded_for_session_user_only() {
        let ledger = Arc::new(MemoryLedger::new());
        let registry = registry(ledger.clone());

        let call = ToolCall::new(
            "call_4",
            "add_expense",
            json!({"email": "mallory@example.com", "category": "rent", "amount": 900}),
        );
        registry.dispatch(&call, &ada()).await.unwrap();

        assert_eq!(ledger.recent("ada@example.com", 10).await.unwrap().len(), 1);
        assert!(ledger.recent("mallory@example.com", 10).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_numeric_amount_and_default_date() {
        let ledger = Arc::new(MemoryLedger::new());
        let registry = registry(ledger.clone());

        let call = ToolCall::new(
            "call_2",
            "add_expense",
            json!({"category": "transport", "amount": 40}),
        );
        registry.dispatch(&call, &ada()).await.unwrap();

        let stored = ledger.recent("ada@example.com", 10).await.unwrap();
        assert_eq!(stored[0].expense_date, Utc::now().date_naive());
    }

    #[tokio::test]
    async fn test_negative_amount_rejected() {
        let ledger = Arc::new(MemoryLedger::new());
        let registry = registry(ledger.clone());

        let call = ToolCall::new(
            "call_3",
            "add_expense",
            json!({"category": "refund", "amount": -5}),
        );
        let err = registry.dispatch(&call, &ada()).await.unwrap_err();

        assert!(matches!(err, AgentError::ToolValidation(_)));
        assert!(ledger.is_empty().await);
    }
}
