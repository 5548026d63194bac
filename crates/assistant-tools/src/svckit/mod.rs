//! Service Kit - Assistant Tools
//!
//! Domain-specific tools that implement `turn_core::TypedTool` for the
//! finance tracker and weather assistants.
//!
//! The finance tools always act on the turn's session user
//! (`ToolContext::session`). Any e-mail the model puts in the arguments
//! is ignored.

use serde::Deserialize;

mod add_expense;
mod expense_summary;
mod weather_lookup;
mod weekly_stats;

pub use add_expense::{AddExpenseArgs, AddExpenseOutput, AddExpenseTool};
pub use expense_summary::ExpenseSummaryTool;
pub use weather_lookup::{GetWeatherTool, WeatherArgs};
pub use weekly_stats::WeeklyStatsTool;

/// Argument record for tools that take no arguments
#[derive(Debug, Default, Deserialize)]
pub struct NoArgs {}
