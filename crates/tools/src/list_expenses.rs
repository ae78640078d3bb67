//! List expenses tool.

use async_trait::async_trait;
use scout_core::error::ToolError;
use scout_core::expense::ExpenseStore;
use scout_core::tool::{Tool, ToolContext, ToolResult};
use std::sync::Arc;
use tracing::debug;

use crate::args;

pub struct ListExpensesTool {
    store: Arc<dyn ExpenseStore>,
}

impl ListExpensesTool {
    pub fn new(store: Arc<dyn ExpenseStore>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl Tool for ListExpensesTool {
    fn name(&self) -> &str {
        "list_expenses"
    }

    fn description(&self) -> &str {
        "List the customer's expenses, oldest first. Returns a JSON array."
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "customer_id": args::customer_schema()
            }
        })
    }

    async fn execute(
        &self,
        ctx: &ToolContext,
        arguments: serde_json::Value,
    ) -> Result<ToolResult, ToolError> {
        let customer_id = args::resolve_customer(ctx, &arguments)?;
        let expenses = self.store.list(&customer_id).await?;
        debug!(customer = %customer_id, count = expenses.len(), "Listed expenses");

        let output = serde_json::to_string_pretty(&expenses).map_err(|e| ToolError::ExecutionFailed {
            tool_name: "list_expenses".into(),
            reason: e.to_string(),
        })?;
        let total: f64 = expenses.iter().map(|e| e.amount).sum();

        Ok(ToolResult::success(output).with_data(serde_json::json!({
            "count": expenses.len(),
            "total": total,
        })))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use scout_core::expense::{ExpenseCategory, NewExpense};
    use scout_core::message::ThreadId;
    use scout_store::InMemoryExpenseStore;
    use serde_json::json;

    #[tokio::test]
    async fn empty_list_is_empty_array() {
        let tool = ListExpensesTool::new(Arc::new(InMemoryExpenseStore::new()));
        let ctx = ToolContext::new(ThreadId::from("t"), "C1");
        let result = tool.execute(&ctx, json!({})).await.unwrap();
        assert!(result.success);
        assert_eq!(result.output, "[]");
    }

    #[tokio::test]
    async fn lists_only_session_customer() {
        let store = Arc::new(InMemoryExpenseStore::new());
        for (customer, amount) in [("C1", 10.0), ("C2", 99.0), ("C1", 15.5)] {
            store
                .create(NewExpense {
                    name: "Coffee".into(),
                    description: None,
                    category: ExpenseCategory::Meals,
                    amount,
                    customer_id: customer.into(),
                })
                .await
                .unwrap();
        }

        let tool = ListExpensesTool::new(store);
        let ctx = ToolContext::new(ThreadId::from("t"), "C1");
        let result = tool.execute(&ctx, json!({"customer_id": "C1"})).await.unwrap();

        let records: Vec<serde_json::Value> = serde_json::from_str(&result.output).unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0]["amount"], 10.0);
        assert_eq!(result.data.unwrap()["total"], 25.5);
    }
}
