//! Expense tools for Scout.
//!
//! The assistant manages a customer's expenses through exactly four tools:
//! create, delete, list and update. Each is scoped to the customer carried
//! in the session's `ToolContext`.

pub mod args;
pub mod create_expense;
pub mod delete_expense;
pub mod list_expenses;
pub mod update_expense;

use std::sync::Arc;

use scout_core::expense::ExpenseStore;
use scout_core::tool::ToolRegistry;

pub use create_expense::CreateExpenseTool;
pub use delete_expense::DeleteExpenseTool;
pub use list_expenses::ListExpensesTool;
pub use update_expense::UpdateExpenseTool;

/// Output of a delete or update that matched no record.
pub const NOT_FOUND: &str = "Expense not found";

/// Create the registry of expense tools, all backed by `store`.
pub fn expense_registry(store: Arc<dyn ExpenseStore>) -> ToolRegistry {
    let mut registry = ToolRegistry::new();
    registry.register(Box::new(CreateExpenseTool::new(store.clone())));
    registry.register(Box::new(DeleteExpenseTool::new(store.clone())));
    registry.register(Box::new(ListExpensesTool::new(store.clone())));
    registry.register(Box::new(UpdateExpenseTool::new(store)));
    registry
}
