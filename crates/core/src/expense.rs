//! Expense records and the store abstraction the tools act on.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::StoreError;

/// The fixed set of expense categories.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExpenseCategory {
    Meals,
    Travel,
    Lodging,
    Entertainment,
    Training,
    Gifts,
    Education,
    OfficeSupplies,
    Other,
}

impl ExpenseCategory {
    pub const ALL: [ExpenseCategory; 9] = [
        Self::Meals,
        Self::Travel,
        Self::Lodging,
        Self::Entertainment,
        Self::Training,
        Self::Gifts,
        Self::Education,
        Self::OfficeSupplies,
        Self::Other,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Meals => "meals",
            Self::Travel => "travel",
            Self::Lodging => "lodging",
            Self::Entertainment => "entertainment",
            Self::Training => "training",
            Self::Gifts => "gifts",
            Self::Education => "education",
            Self::OfficeSupplies => "office_supplies",
            Self::Other => "other",
        }
    }

    /// Category names, for prompts and schemas.
    pub fn names() -> Vec<&'static str> {
        Self::ALL.iter().map(Self::as_str).collect()
    }
}

impl std::fmt::Display for ExpenseCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for ExpenseCategory {
    type Err = String;

    /// Case-insensitive; spaces and hyphens count as underscores.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_lowercase().replace([' ', '-'], "_");
        Self::ALL
            .iter()
            .copied()
            .find(|c| c.as_str() == normalized)
            .ok_or_else(|| {
                format!(
                    "unknown category '{s}' (expected one of: {})",
                    Self::names().join(", ")
                )
            })
    }
}

/// A stored expense.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Expense {
    pub id: Uuid,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub name: String,
    pub description: Option<String>,
    pub category: ExpenseCategory,
    pub amount: f64,
    pub customer_id: String,
}

impl Expense {
    /// Build a fresh record from its creation fields.
    pub fn from_new(new: NewExpense) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            created_at: now,
            updated_at: now,
            name: new.name,
            description: new.description,
            category: new.category,
            amount: new.amount,
            customer_id: new.customer_id,
        }
    }

    /// Apply a partial update in place and bump `updated_at`.
    pub fn apply(&mut self, patch: &ExpensePatch) {
        if let Some(name) = &patch.name {
            self.name = name.clone();
        }
        if let Some(description) = &patch.description {
            self.description = (!description.is_empty()).then(|| description.clone());
        }
        if let Some(category) = patch.category {
            self.category = category;
        }
        if let Some(amount) = patch.amount {
            self.amount = amount;
        }
        self.updated_at = Utc::now();
    }

    /// Pretty JSON rendering shown to the model.
    pub fn to_pretty_json(&self) -> String {
        serde_json::to_string_pretty(self).unwrap_or_else(|e| format!("{{\"error\": \"{e}\"}}"))
    }
}

/// Fields required to create an expense.
#[derive(Debug, Clone, PartialEq)]
pub struct NewExpense {
    pub name: String,
    pub description: Option<String>,
    pub category: ExpenseCategory,
    pub amount: f64,
    pub customer_id: String,
}

/// A partial update. `None` leaves the field unchanged; an empty
/// `description` clears it.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ExpensePatch {
    pub name: Option<String>,
    pub description: Option<String>,
    pub category: Option<ExpenseCategory>,
    pub amount: Option<f64>,
}

impl ExpensePatch {
    pub fn is_empty(&self) -> bool {
        self.name.is_none()
            && self.description.is_none()
            && self.category.is_none()
            && self.amount.is_none()
    }
}

/// Storage for expense records.
///
/// Every lookup is scoped to a customer; a record belonging to another
/// customer behaves as if it does not exist.
#[async_trait]
pub trait ExpenseStore: Send + Sync {
    /// Backend name (e.g., "memory", "sqlite", "postgres").
    fn name(&self) -> &str;

    async fn create(&self, new: NewExpense) -> Result<Expense, StoreError>;

    async fn get(&self, customer_id: &str, id: Uuid) -> Result<Option<Expense>, StoreError>;

    /// All expenses of a customer, oldest first.
    async fn list(&self, customer_id: &str) -> Result<Vec<Expense>, StoreError>;

    async fn update(
        &self,
        customer_id: &str,
        id: Uuid,
        patch: ExpensePatch,
    ) -> Result<Option<Expense>, StoreError>;

    /// Remove an expense, returning it if it existed.
    async fn delete(&self, customer_id: &str, id: Uuid) -> Result<Option<Expense>, StoreError>;
}
