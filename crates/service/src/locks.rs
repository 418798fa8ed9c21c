use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::{Mutex, OwnedMutexGuard};

use expenseflow_core::domain::expense::ExpenseId;

/// Per-expense serialization for submit and decision processing. Entries are
/// never reclaimed; the map is bounded by the number of distinct expenses a
/// process touches.
#[derive(Default)]
pub struct ExpenseLocks {
    locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl ExpenseLocks {
    pub async fn acquire(&self, expense_id: &ExpenseId) -> OwnedMutexGuard<()> {
        let lock = {
            let mut locks = self.locks.lock().await;
            Arc::clone(locks.entry(expense_id.0.clone()).or_default())
        };
        lock.lock_owned().await
    }
}
