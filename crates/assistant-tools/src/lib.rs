//! # assistant-tools
//!
//! Domain tools for the tool-calling assistants: a personal finance tracker
//! backed by an expense ledger, and a live weather lookup.
//!
//! ## Tools
//!
//! ```text
//! ┌──────────────────────┬──────────────────────────────────────────┐
//! │ add_expense          │ record {email, category, amount, date}   │
//! │ get_expense_summary  │ latest 50 expenses, newest first         │
//! │ get_weekly_stats     │ week number → total spent, ascending     │
//! │ get_weather          │ current conditions for one city          │
//! └──────────────────────┴──────────────────────────────────────────┘
//! ```

pub mod error;
pub mod ledger;
pub mod model;
pub mod prompts;
pub mod svckit;
pub mod weather;

use std::sync::Arc;

use turn_core::ToolRegistry;

pub use error::{Result, ToolkitError};
pub use ledger::{ExpenseLedger, MemoryLedger};
pub use model::{Expense, ExpenseSummaryEntry, WeeklyTotals};
pub use prompts::{FINANCE_PROMPT, WEATHER_PROMPT};
pub use weather::{MockWeatherClient, WeatherClient, WttrClient};

/// Re-export tools for easy registration
pub mod tools {
    pub use crate::svckit::{AddExpenseTool, ExpenseSummaryTool, GetWeatherTool, WeeklyStatsTool};
}

/// Register the finance tracker tools over `ledger`
pub fn register_finance_tools(registry: &mut ToolRegistry, ledger: Arc<dyn ExpenseLedger>) {
    registry.register_typed(tools::AddExpenseTool::new(ledger.clone()));
    registry.register_typed(tools::ExpenseSummaryTool::new(ledger.clone()));
    registry.register_typed(tools::WeeklyStatsTool::new(ledger));
}

/// Register the weather lookup tool
pub fn register_weather_tools(registry: &mut ToolRegistry, client: Arc<dyn WeatherClient>) {
    registry.register_typed(tools::GetWeatherTool::new(client));
}
