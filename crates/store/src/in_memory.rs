//! In-memory stores: useful for testing and ephemeral sessions.

use async_trait::async_trait;
use chrono::Utc;
use scout_core::checkpoint::CheckpointStore;
use scout_core::error::{CheckpointError, StoreError};
use scout_core::expense::{Expense, ExpensePatch, ExpenseStore, NewExpense};
use scout_core::message::ThreadId;
use scout_core::session::SessionState;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::debug;
use uuid::Uuid;

/// An expense store that keeps records in a Vec, in insertion order.
pub struct InMemoryExpenseStore {
    expenses: Arc<RwLock<Vec<Expense>>>,
}

impl InMemoryExpenseStore {
    pub fn new() -> Self {
        Self {
            expenses: Arc::new(RwLock::new(Vec::new())),
        }
    }
}

impl Default for InMemoryExpenseStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ExpenseStore for InMemoryExpenseStore {
    fn name(&self) -> &str {
        "memory"
    }

    async fn create(&self, new: NewExpense) -> Result<Expense, StoreError> {
        let expense = Expense::from_new(new);
        self.expenses.write().await.push(expense.clone());
        debug!(id = %expense.id, customer = %expense.customer_id, "Created expense");
        Ok(expense)
    }

    async fn get(&self, customer_id: &str, id: Uuid) -> Result<Option<Expense>, StoreError> {
        Ok(self
            .expenses
            .read()
            .await
            .iter()
            .find(|e| e.id == id && e.customer_id == customer_id)
            .cloned())
    }

    async fn list(&self, customer_id: &str) -> Result<Vec<Expense>, StoreError> {
        Ok(self
            .expenses
            .read()
            .await
            .iter()
            .filter(|e| e.customer_id == customer_id)
            .cloned()
            .collect())
    }

    async fn update(
        &self,
        customer_id: &str,
        id: Uuid,
        patch: ExpensePatch,
    ) -> Result<Option<Expense>, StoreError> {
        let mut expenses = self.expenses.write().await;
        let Some(expense) = expenses
            .iter_mut()
            .find(|e| e.id == id && e.customer_id == customer_id)
        else {
            return Ok(None);
        };
        expense.apply(&patch);
        Ok(Some(expense.clone()))
    }

    async fn delete(&self, customer_id: &str, id: Uuid) -> Result<Option<Expense>, StoreError> {
        let mut expenses = self.expenses.write().await;
        let position = expenses
            .iter()
            .position(|e| e.id == id && e.customer_id == customer_id);
        Ok(position.map(|i| expenses.remove(i)))
    }
}

/// A checkpoint store that keeps the latest snapshot per thread in a map.
pub struct InMemoryCheckpointStore {
    snapshots: Arc<RwLock<HashMap<ThreadId, SessionState>>>,
}

impl InMemoryCheckpointStore {
    pub fn new() -> Self {
        Self {
            snapshots: Arc::new(RwLock::new(HashMap::new())),
        }
    }
}

impl Default for InMemoryCheckpointStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl CheckpointStore for InMemoryCheckpointStore {
    fn name(&self) -> &str {
        "memory"
    }

    async fn get(&self, thread_id: &ThreadId) -> Result<Option<SessionState>, CheckpointError> {
        Ok(self.snapshots.read().await.get(thread_id).cloned())
    }

    async fn put(&self, thread_id: &ThreadId, state: &SessionState) -> Result<(), CheckpointError> {
        let mut snapshots = self.snapshots.write().await;
        if let Some(existing) = snapshots.get(thread_id)
            && existing.version() > state.version()
        {
            debug!(thread_id = %thread_id, stale = state.version(), current = existing.version(), "Ignoring stale checkpoint");
            return Ok(());
        }
        snapshots.insert(thread_id.clone(), state.clone());
        Ok(())
    }

    async fn delete(&self, thread_id: &ThreadId) -> Result<bool, CheckpointError> {
        Ok(self.snapshots.write().await.remove(thread_id).is_some())
    }

    async fn list_threads(&self) -> Result<Vec<ThreadId>, CheckpointError> {
        let snapshots = self.snapshots.read().await;
        let mut threads: Vec<(ThreadId, chrono::DateTime<Utc>)> = snapshots
            .iter()
            .map(|(id, s)| (id.clone(), s.updated_at()))
            .collect();
        threads.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
        Ok(threads.into_iter().map(|(id, _)| id).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use scout_core::expense::ExpenseCategory;
    use scout_core::message::Message;

    fn lunch(customer: &str) -> NewExpense {
        NewExpense {
            name: "Lunch".into(),
            description: None,
            category: ExpenseCategory::Meals,
            amount: 12.5,
            customer_id: customer.into(),
        }
    }

    #[tokio::test]
    async fn create_list_is_scoped_and_ordered() {
        let store = InMemoryExpenseStore::new();
        let a = store.create(lunch("C1")).await.unwrap();
        store.create(lunch("C2")).await.unwrap();
        let b = store.create(lunch("C1")).await.unwrap();

        let listed = store.list("C1").await.unwrap();
        assert_eq!(listed.iter().map(|e| e.id).collect::<Vec<_>>(), vec![a.id, b.id]);
        assert!(store.list("nobody").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn other_customers_records_are_invisible() {
        let store = InMemoryExpenseStore::new();
        let e = store.create(lunch("C1")).await.unwrap();

        assert!(store.get("C2", e.id).await.unwrap().is_none());
        assert!(store.delete("C2", e.id).await.unwrap().is_none());
        assert!(store
            .update("C2", e.id, ExpensePatch { amount: Some(1.0), ..Default::default() })
            .await
            .unwrap()
            .is_none());
        assert_eq!(store.get("C1", e.id).await.unwrap().unwrap().amount, 12.5);
    }

    #[tokio::test]
    async fn update_then_delete() {
        let store = InMemoryExpenseStore::new();
        let e = store.create(lunch("C1")).await.unwrap();
        let updated = store
            .update("C1", e.id, ExpensePatch { name: Some("Team lunch".into()), ..Default::default() })
            .await
            .unwrap()
            .unwrap();
        assert_eq!(updated.name, "Team lunch");
        assert!(updated.updated_at >= e.updated_at);

        let deleted = store.delete("C1", e.id).await.unwrap().unwrap();
        assert_eq!(deleted.id, e.id);
        assert!(store.delete("C1", e.id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn checkpoint_ignores_stale_versions() {
        let store = InMemoryCheckpointStore::new();
        let thread = ThreadId::from("thread-1");
        let mut state = SessionState::new(thread.clone(), "C1");
        state.append(Message::user("Hi")).unwrap();
        let old = state.clone();
        state.append(Message::assistant("Hello")).unwrap();

        store.put(&thread, &state).await.unwrap();
        store.put(&thread, &old).await.unwrap();

        let loaded = store.get(&thread).await.unwrap().unwrap();
        assert_eq!(loaded.len(), 2);
        assert_eq!(store.list_threads().await.unwrap(), vec![thread.clone()]);
        assert!(store.delete(&thread).await.unwrap());
        assert!(store.get(&thread).await.unwrap().is_none());
    }
}
