//! LIFO rollback transactions wrapping every multi-step operation.
//!
//! Steps register an undo action right after their side effect lands; on
//! failure the stack unwinds in reverse order, each action attempted even
//! when an earlier one fails, so no half-created container survives.

use futures::future::BoxFuture;
use tracing::{debug, warn};

use spindb_model::SpinError;

type RollbackFn =
    Box<dyn FnOnce() -> BoxFuture<'static, anyhow::Result<()>> + Send>;

struct RollbackAction {
    description: String,
    execute: RollbackFn,
}

/// An in-flight multi-step operation's undo stack.
///
/// Created per operation, closed by exactly one of [`commit`] (discard)
/// or [`rollback`] (unwind). Both leave the stack empty; a committed
/// transaction refuses further additions.
///
/// [`commit`]: Transaction::commit
/// [`rollback`]: Transaction::rollback
#[derive(Default)]
pub struct Transaction {
    actions: Vec<RollbackAction>,
    committed: bool,
}

impl std::fmt::Debug for Transaction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Transaction")
            .field("pending", &self.actions.len())
            .field("committed", &self.committed)
            .finish()
    }
}

impl Transaction {
    pub fn new() -> Transaction {
        Transaction::default()
    }

    /// Register an undo action. `execute` must be idempotent; it may run
    /// after partial cleanup already happened.
    pub fn add_rollback<F>(
        &mut self,
        description: impl Into<String>,
        execute: F,
    ) -> Result<(), SpinError>
    where
        F: FnOnce() -> BoxFuture<'static, anyhow::Result<()>> + Send + 'static,
    {
        if self.committed {
            return Err(SpinError::Unknown(
                "cannot add rollback actions to a committed transaction"
                    .to_string(),
            ));
        }
        let description = description.into();
        debug!(action = %description, "rollback registered");
        self.actions.push(RollbackAction {
            description,
            execute: Box::new(execute),
        });
        Ok(())
    }

    /// Discard the undo stack; the operation's effects are final.
    pub fn commit(&mut self) {
        self.committed = true;
        self.actions.clear();
    }

    pub fn is_committed(&self) -> bool {
        self.committed
    }

    pub fn pending(&self) -> usize {
        self.actions.len()
    }

    /// Unwind in strict LIFO. Individual failures are logged and
    /// returned, never aborting the remaining actions. No-op after
    /// commit or on an empty stack.
    pub async fn rollback(&mut self) -> Vec<SpinError> {
        if self.committed {
            return Vec::new();
        }
        let mut failures = Vec::new();
        while let Some(action) = self.actions.pop() {
            debug!(action = %action.description, "rolling back");
            if let Err(err) = (action.execute)().await {
                warn!(
                    action = %action.description,
                    error = %format!("{err:#}"),
                    "rollback action failed"
                );
                failures.push(SpinError::RollbackFailed {
                    description: action.description,
                    reason: format!("{err:#}"),
                });
            }
        }
        failures
    }
}

/// Run `op` inside a fresh transaction: commit on success, roll back and
/// re-propagate on failure.
pub async fn with_transaction<T, F>(op: F) -> Result<T, SpinError>
where
    F: AsyncFnOnce(&mut Transaction) -> Result<T, SpinError>,
{
    let mut tx = Transaction::new();
    match op(&mut tx).await {
        Ok(value) => {
            tx.commit();
            Ok(value)
        }
        Err(err) => {
            let failures = tx.rollback().await;
            if !failures.is_empty() {
                warn!(
                    failed = failures.len(),
                    "some rollback actions failed; see log for details"
                );
            }
            Err(err)
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    use super::*;

    fn recorder(
        log: &Arc<Mutex<Vec<&'static str>>>,
        tag: &'static str,
    ) -> impl FnOnce() -> BoxFuture<'static, anyhow::Result<()>> + Send + 'static
    {
        let log = Arc::clone(log);
        move || {
            Box::pin(async move {
                log.lock().unwrap().push(tag);
                Ok(())
            })
        }
    }

    #[tokio::test]
    async fn rollback_runs_in_reverse_insertion_order() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let mut tx = Transaction::new();
        tx.add_rollback("first", recorder(&log, "first")).unwrap();
        tx.add_rollback("second", recorder(&log, "second")).unwrap();
        tx.add_rollback("third", recorder(&log, "third")).unwrap();

        let failures = tx.rollback().await;
        assert!(failures.is_empty());
        assert_eq!(*log.lock().unwrap(), vec!["third", "second", "first"]);
    }

    #[tokio::test]
    async fn failing_action_does_not_stop_the_rest() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let mut tx = Transaction::new();
        tx.add_rollback("first", recorder(&log, "first")).unwrap();
        tx.add_rollback("boom", || {
            Box::pin(async { anyhow::bail!("exploded") })
        })
        .unwrap();
        tx.add_rollback("third", recorder(&log, "third")).unwrap();

        let failures = tx.rollback().await;
        assert_eq!(failures.len(), 1);
        assert_eq!(failures[0].code(), "ROLLBACK_FAILED");
        assert_eq!(*log.lock().unwrap(), vec!["third", "first"]);
    }

    #[tokio::test]
    async fn rollback_after_commit_is_a_noop() {
        let counter = Arc::new(AtomicUsize::new(0));
        let mut tx = Transaction::new();
        let c = Arc::clone(&counter);
        tx.add_rollback("never", move || {
            Box::pin(async move {
                c.fetch_add(1, Ordering::SeqCst);
                Ok(())
            })
        })
        .unwrap();

        tx.commit();
        let failures = tx.rollback().await;
        assert!(failures.is_empty());
        assert_eq!(counter.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn add_after_commit_fails_with_stable_error() {
        let mut tx = Transaction::new();
        tx.commit();
        let err = tx
            .add_rollback("late", || Box::pin(async { Ok(()) }))
            .unwrap_err();
        assert_eq!(err.code(), "UNKNOWN");
        assert!(err.to_string().contains("committed"));
    }

    #[tokio::test]
    async fn empty_rollback_is_a_noop() {
        let mut tx = Transaction::new();
        assert!(tx.rollback().await.is_empty());
    }

    #[tokio::test]
    async fn with_transaction_commits_on_success() {
        let counter = Arc::new(AtomicUsize::new(0));
        let c = Arc::clone(&counter);
        let out = with_transaction(async move |tx| {
            tx.add_rollback("undo", move || {
                Box::pin(async move {
                    c.fetch_add(1, Ordering::SeqCst);
                    Ok(())
                })
            })?;
            Ok::<_, SpinError>(42)
        })
        .await
        .unwrap();
        assert_eq!(out, 42);
        assert_eq!(counter.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn with_transaction_unwinds_on_failure() {
        let counter = Arc::new(AtomicUsize::new(0));
        let c = Arc::clone(&counter);
        let err = with_transaction::<(), _>(async move |tx| {
            tx.add_rollback("undo", move || {
                Box::pin(async move {
                    c.fetch_add(1, Ordering::SeqCst);
                    Ok(())
                })
            })?;
            Err(SpinError::Unknown("step 2 failed".to_string()))
        })
        .await
        .unwrap_err();
        assert_eq!(err.to_string(), "step 2 failed");
        assert_eq!(counter.load(Ordering::SeqCst), 1);
    }
}
