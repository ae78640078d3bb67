//! `scout expenses`: print a customer's expense records.

use scout_core::expense::{Expense, ExpenseStore};

use super::load_config;

pub async fn run(customer: Option<String>) -> Result<(), Box<dyn std::error::Error>> {
    let config = load_config()?;
    let customer = customer.unwrap_or_else(|| config.agent.customer_id.clone());
    let store = scout_store::open_expense_store(&config.store).await?;

    print_expenses(store.as_ref(), &customer).await
}

pub async fn print_expenses(
    store: &dyn ExpenseStore,
    customer_id: &str,
) -> Result<(), Box<dyn std::error::Error>> {
    let expenses = store.list(customer_id).await?;
    print!("{}", format_expenses(customer_id, &expenses));
    Ok(())
}

/// One line per record plus a total, oldest first.
pub fn format_expenses(customer_id: &str, expenses: &[Expense]) -> String {
    if expenses.is_empty() {
        return format!("  No expenses for {customer_id}.\n");
    }

    let mut out = format!("  Expenses for {customer_id}:\n");
    for e in expenses {
        out.push_str(&format!(
            "  {}  {}  {:<16} {:>10.2}  {}",
            e.id,
            e.created_at.format("%Y-%m-%d"),
            e.category.as_str(),
            e.amount,
            e.name
        ));
        if let Some(description) = &e.description {
            out.push_str(&format!(" ({description})"));
        }
        out.push('\n');
    }
    let total: f64 = expenses.iter().map(|e| e.amount).sum();
    out.push_str(&format!("  {} record(s), total {total:.2}\n", expenses.len()));
    out
}
