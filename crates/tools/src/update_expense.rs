//! Update expense tool: partial updates; omitted fields keep their values.

use async_trait::async_trait;
use scout_core::error::ToolError;
use scout_core::expense::{ExpensePatch, ExpenseStore};
use scout_core::tool::{Tool, ToolContext, ToolResult};
use std::sync::Arc;
use tracing::info;

use crate::{NOT_FOUND, args};

pub struct UpdateExpenseTool {
    store: Arc<dyn ExpenseStore>,
}

impl UpdateExpenseTool {
    pub fn new(store: Arc<dyn ExpenseStore>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl Tool for UpdateExpenseTool {
    fn name(&self) -> &str {
        "update_expense"
    }

    fn description(&self) -> &str {
        "Update an expense by id. Only the fields provided are changed; pass an empty description to clear it. Returns the updated expense."
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "id": {
                    "type": "string",
                    "description": "The id of the expense to update."
                },
                "customer_id": args::customer_schema(),
                "name": {
                    "type": "string",
                    "description": "The new name of the expense."
                },
                "amount": {
                    "type": "number",
                    "description": "The new amount. Must be greater than zero."
                },
                "category": args::category_schema(),
                "description": {
                    "type": "string",
                    "description": "The new description. An empty string clears it."
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
        let customer_id = args::resolve_customer(ctx, &arguments)?;

        let patch = ExpensePatch {
            name: args::optional_string(&arguments, "name")?,
            description: args::clearable_string(&arguments, "description")?,
            category: args::optional_category(&arguments)?,
            amount: args::optional_amount(&arguments)?,
        };
        if patch.is_empty() {
            return Err(ToolError::InvalidArguments(
                "nothing to update; provide at least one of name, amount, category, description"
                    .into(),
            ));
        }

        match self.store.update(&customer_id, id, patch).await? {
            Some(expense) => {
                info!(id = %expense.id, customer = %expense.customer_id, "Expense updated");
                Ok(ToolResult::success(expense.to_pretty_json()))
            }
            None => Ok(ToolResult::failure("", NOT_FOUND)),
        }
    }
}
