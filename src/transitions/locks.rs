// Per-workflow async mutual exclusion
//
// There is no global lock: each workflow id maps to its own tokio mutex, created
// on first use and removed again when the last holder or waiter lets go.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use thiserror::Error;
use tokio::sync::OwnedMutexGuard;

use crate::config::ConflictPolicy;
use crate::workflow::WorkflowId;

type LockTable = Mutex<HashMap<WorkflowId, Arc<tokio::sync::Mutex<()>>>>;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum LockError {
    #[error("workflow is locked by another transition")]
    Busy,

    #[error("timed out after {0:?} waiting for the workflow lock")]
    TimedOut(Duration),
}

#[derive(Clone, Default)]
pub struct WorkflowLocks {
    table: Arc<LockTable>,
}

/// Held for the duration of a transition; releasing it prunes the idle entry
pub struct WorkflowLockGuard {
    guard: Option<OwnedMutexGuard<()>>,
    workflow_id: WorkflowId,
    table: Arc<LockTable>,
}

impl WorkflowLocks {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn acquire(
        &self,
        workflow_id: &WorkflowId,
        policy: ConflictPolicy,
        wait: Duration,
    ) -> Result<WorkflowLockGuard, LockError> {
        let mutex = {
            let mut table = self.table.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
            table.entry(workflow_id.clone()).or_default().clone()
        };

        let acquired = match policy {
            ConflictPolicy::Reject => mutex.try_lock_owned().map_err(|_| LockError::Busy),
            ConflictPolicy::Queue => tokio::time::timeout(wait, mutex.lock_owned())
                .await
                .map_err(|_| LockError::TimedOut(wait)),
        };

        match acquired {
            Ok(guard) => Ok(WorkflowLockGuard {
                guard: Some(guard),
                workflow_id: workflow_id.clone(),
                table: self.table.clone(),
            }),
            Err(e) => {
                // The try_lock/timeout futures owned their clone; only the table's remains
                prune(&self.table, workflow_id);
                Err(e)
            }
        }
    }

    pub fn is_locked(&self, workflow_id: &WorkflowId) -> bool {
        let table = self.table.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        table
            .get(workflow_id)
            .map(|mutex| mutex.try_lock().is_err())
            .unwrap_or(false)
    }

    /// Number of workflows with a live lock entry
    pub fn tracked(&self) -> usize {
        self.table.lock().unwrap_or_else(|poisoned| poisoned.into_inner()).len()
    }
}

fn prune(table: &LockTable, workflow_id: &WorkflowId) {
    let mut table = table.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
    if let Some(mutex) = table.get(workflow_id) {
        // Holders and waiters each own a clone; one reference means only the table's
        if Arc::strong_count(mutex) == 1 {
            table.remove(workflow_id);
        }
    }
}

impl WorkflowLockGuard {
    pub fn workflow_id(&self) -> &WorkflowId {
        &self.workflow_id
    }
}

impl Drop for WorkflowLockGuard {
    fn drop(&mut self) {
        drop(self.guard.take());
        prune(&self.table, &self.workflow_id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const WAIT: Duration = Duration::from_millis(200);

    #[tokio::test]
    async fn test_reject_policy_fails_fast_while_held() {
        let locks = WorkflowLocks::new();
        let id = WorkflowId::new("wf-1");

        let guard = locks.acquire(&id, ConflictPolicy::Reject, WAIT).await.unwrap();
        assert!(locks.is_locked(&id));
        assert_eq!(
            locks.acquire(&id, ConflictPolicy::Reject, WAIT).await.err(),
            Some(LockError::Busy)
        );

        // Other workflows are unaffected
        let other = locks
            .acquire(&WorkflowId::new("wf-2"), ConflictPolicy::Reject, WAIT)
            .await;
        assert!(other.is_ok());

        drop(guard);
        assert!(locks.acquire(&id, ConflictPolicy::Reject, WAIT).await.is_ok());
    }

    #[tokio::test]
    async fn test_queue_policy_waits_then_times_out() {
        let locks = WorkflowLocks::new();
        let id = WorkflowId::new("wf-1");
        let guard = locks.acquire(&id, ConflictPolicy::Queue, WAIT).await.unwrap();

        let waiter = {
            let locks = locks.clone();
            let id = id.clone();
            tokio::spawn(async move { locks.acquire(&id, ConflictPolicy::Queue, Duration::from_secs(5)).await.is_ok() })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;
        drop(guard);
        assert!(waiter.await.unwrap());

        let _held = locks.acquire(&id, ConflictPolicy::Queue, WAIT).await.unwrap();
        assert_eq!(
            locks.acquire(&id, ConflictPolicy::Queue, Duration::from_millis(10)).await.err(),
            Some(LockError::TimedOut(Duration::from_millis(10)))
        );
    }

    #[tokio::test]
    async fn test_idle_entries_are_removed() {
        let locks = WorkflowLocks::new();
        let id = WorkflowId::new("wf-1");

        let guard = locks.acquire(&id, ConflictPolicy::Reject, WAIT).await.unwrap();
        assert_eq!(locks.tracked(), 1);
        let _ = locks.acquire(&id, ConflictPolicy::Reject, WAIT).await;
        assert_eq!(locks.tracked(), 1);

        drop(guard);
        assert_eq!(locks.tracked(), 0);
        assert!(!locks.is_locked(&id));
    }
}
