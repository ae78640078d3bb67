//! Delete expense tool.

use async_trait::async_trait;
use scout_core::error::ToolError;
use scout_core::expense::ExpenseStore;
use scout_core::tool::{Tool, ToolContext, ToolResult};
use std::sync::Arc;
use tracing::info;

use crate::{NOT_FOUND, args};

pub struct DeleteExpenseTool {
    store: Arc<dyn ExpenseStore>,
}

impl DeleteExpenseTool {
    pub fn new(store: Arc<dyn ExpenseStore>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl Tool for DeleteExpenseTool {
    fn name(&self) -> &str {
        "delete_expense"
    }

    fn description(&self) -> &str {
        "Delete an expense by id. Returns the deleted expense."
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "id": {
                    "type": "string",
                    "description": "The id of the expense to delete."
                }
            },
            "required": ["id"]
        })
    }

    async fn execute(
        &self,
        ctx: &ToolContext,
        arguments: serde_json::Value,
    ) -> Result<ToolResult, ToolError> {
        let id = args::expense_id(&arguments)?;

        match self.store.delete(&ctx.customer_id, id).await? {
            Some(expense) => {
                info!(id = %expense.id, customer = %expense.customer_id, "Expense deleted");
                Ok(ToolResult::success(expense.to_pretty_json()))
            }
            None => Ok(ToolResult::failure("", NOT_FOUND)),
        }
    }
}
