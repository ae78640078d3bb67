//! Create expense tool: records a new expense for the active customer.

use async_trait::async_trait;
use scout_core::error::ToolError;
use scout_core::expense::{ExpenseStore, NewExpense};
use scout_core::tool::{Tool, ToolContext, ToolResult};
use std::sync::Arc;
use tracing::info;

use crate::args;

pub struct CreateExpenseTool {
    store: Arc<dyn ExpenseStore>,
}

impl CreateExpenseTool {
    pub fn new(store: Arc<dyn ExpenseStore>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl Tool for CreateExpenseTool {
    fn name(&self) -> &str {
        "create_expense"
    }

    fn description(&self) -> &str {
        "Create a new expense for the customer. Returns the created expense, including its id."
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "customer_id": args::customer_schema(),
                "name": {
                    "type": "string",
                    "description": "The name of the expense."
                },
                "amount": {
                    "type": "number",
                    "description": "The amount of the expense. Must be greater than zero."
                },
                "category": args::category_schema(),
                "description": {
                    "type": "string",
                    "description": "An optional description with details not captured in the name or category."
                }
            },
            "required": ["name", "amount", "category"]
        })
    }

    async fn execute(
        &self,
        ctx: &ToolContext,
        arguments: serde_json::Value,
    ) -> Result<ToolResult, ToolError> {
        let customer_id = args::resolve_customer(ctx, &arguments)?;
        let name = args::required_string(&arguments, "name")?;
        let amount = args::optional_amount(&arguments)?
            .ok_or_else(|| ToolError::InvalidArguments("Missing 'amount' argument".into()))?;
        let category = args::optional_category(&arguments)?
            .ok_or_else(|| ToolError::InvalidArguments("Missing 'category' argument".into()))?;
        let description = args::optional_string(&arguments, "description")?;

        let expense = self
            .store
            .create(NewExpense {
                name,
                description,
                category,
                amount,
                customer_id,
            })
            .await?;

        info!(id = %expense.id, customer = %expense.customer_id, amount = expense.amount, "Expense created");
        Ok(ToolResult::success(expense.to_pretty_json()))
    }
}
