//! Keyed task registry
//!
//! At most one task runs per [`TaskKey`]:
//! - spawning with a key that is already running cancels the old task and
//!   waits for it to finish before the new one starts
//! - finished tasks are reaped through [`KeyedTasks::next_completion`] and
//!   [`KeyedTasks::complete`], guarded by a generation so that a replaced
//!   entry is never removed by the task it replaced
//!
//! Cancellation is cooperative: each task receives a [`CancellationToken`]
//! and is expected to stop at its next effect once the token fires.
//!
//! # Example
//!
//! ```ignore
//! let mut tasks = KeyedTasks::new(parent_token);
//!
//! tasks.spawn("loadContract_c1", |token| async move {
//!     tokio::select! {
//!         _ = token.cancelled() => {}
//!         _ = load("c1") => {}
//!     }
//! }).await;
//!
//! // later, in the supervisor loop
//! if let Some((key, generation)) = tasks.next_completion().await {
//!     tasks.complete(&key, generation);
//! }
//! ```

use std::collections::HashMap;
use std::future::Future;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// Identifies a task for cancellation and replacement.
///
/// Tasks with the same key are mutually exclusive - spawning a new task
/// with a key that's already running will cancel the existing task.
#[derive(Clone, Debug, Eq, PartialEq, Hash)]
pub struct TaskKey(String);

impl TaskKey {
    /// Create a new task key.
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    /// Get the key name.
    pub fn name(&self) -> &str {
        &self.0
    }
}

impl From<&'static str> for TaskKey {
    fn from(s: &'static str) -> Self {
        Self::new(s)
    }
}

impl From<String> for TaskKey {
    fn from(s: String) -> Self {
        Self(s)
    }
}

struct Entry {
    generation: u64,
    token: CancellationToken,
    handle: JoinHandle<()>,
}

/// Registry of running tasks, one per key.
pub struct KeyedTasks {
    tasks: HashMap<TaskKey, Entry>,
    generation: u64,
    parent: CancellationToken,
    done_tx: mpsc::UnboundedSender<(TaskKey, u64)>,
    done_rx: mpsc::UnboundedReceiver<(TaskKey, u64)>,
}

impl KeyedTasks {
    /// Create a registry whose tasks are cancelled together with `parent`.
    pub fn new(parent: CancellationToken) -> Self {
        let (done_tx, done_rx) = mpsc::unbounded_channel();
        Self {
            tasks: HashMap::new(),
            generation: 0,
            parent,
            done_tx,
            done_rx,
        }
    }

    /// Spawn a task, cancelling and awaiting any existing task with the same key.
    ///
    /// Returns the generation assigned to the new task.
    pub async fn spawn<F, Fut>(&mut self, key: impl Into<TaskKey>, task: F) -> u64
    where
        F: FnOnce(CancellationToken) -> Fut,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let key = key.into();

        if self.cancel(&key).await {
            tracing::debug!(task = %key.name(), "Superseded running task");
        }

        self.generation += 1;
        let generation = self.generation;
        let token = self.parent.child_token();
        let future = task(token.clone());

        let done_tx = self.done_tx.clone();
        let done_key = key.clone();
        let handle = tokio::spawn(async move {
            future.await;
            let _ = done_tx.send((done_key, generation));
        });

        self.tasks.insert(
            key,
            Entry {
                generation,
                token,
                handle,
            },
        );
        generation
    }

    /// Cancel a task by key and wait for it to stop.
    ///
    /// Returns `false` if no task exists with the given key.
    pub async fn cancel(&mut self, key: &TaskKey) -> bool {
        let Some(entry) = self.tasks.remove(key) else {
            return false;
        };
        entry.token.cancel();
        if let Err(err) = entry.handle.await {
            if err.is_panic() {
                tracing::error!(task = %key.name(), "Task panicked");
            }
        }
        true
    }

    /// Wait for the next task to finish. Never resolves while no task runs.
    pub async fn next_completion(&mut self) -> Option<(TaskKey, u64)> {
        self.done_rx.recv().await
    }

    /// Remove a finished task's entry, unless it was replaced meanwhile.
    pub fn complete(&mut self, key: &TaskKey, generation: u64) -> bool {
        let current = self
            .tasks
            .get(key)
            .is_some_and(|entry| entry.generation == generation);
        if current {
            self.tasks.remove(key);
        }
        current
    }

    /// Cancel all running tasks without waiting for them.
    pub fn cancel_all(&mut self) {
        for (_, entry) in self.tasks.drain() {
            entry.token.cancel();
            entry.handle.abort();
        }
    }

    /// Check if a task with the given key is currently running.
    pub fn is_running(&self, key: &TaskKey) -> bool {
        self.tasks.contains_key(key)
    }

    /// Get the number of running tasks.
    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    /// Check if there are no running tasks.
    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }
}

impl Drop for KeyedTasks {
    fn drop(&mut self) {
        self.cancel_all();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::time::Duration;

    #[test]
    fn test_task_key() {
        let k1 = TaskKey::new("test");
        let k2 = TaskKey::from("test");
        let k3: TaskKey = String::from("test").into();

        assert_eq!(k1, k2);
        assert_eq!(k2, k3);
        assert_eq!(k1.name(), "test");
    }

    #[tokio::test]
    async fn test_spawn_and_reap() {
        let mut tasks = KeyedTasks::new(CancellationToken::new());

        let generation = tasks.spawn("a", |_| async {}).await;
        assert!(tasks.is_running(&TaskKey::new("a")));

        let (key, done) = tokio::time::timeout(Duration::from_millis(100), tasks.next_completion())
            .await
            .expect("timeout")
            .expect("channel closed");

        assert_eq!(done, generation);
        assert!(tasks.complete(&key, done));
        assert!(tasks.is_empty());
    }

    #[tokio::test]
    async fn test_spawn_cancels_previous() {
        let mut tasks = KeyedTasks::new(CancellationToken::new());
        let counter = Arc::new(AtomicUsize::new(0));

        let c1 = counter.clone();
        tasks
            .spawn("test", move |token| async move {
                tokio::select! {
                    _ = token.cancelled() => {}
                    _ = tokio::time::sleep(Duration::from_millis(100)) => {
                        c1.fetch_add(1, Ordering::SeqCst);
                    }
                }
            })
            .await;

        let c2 = counter.clone();
        let second = tasks
            .spawn("test", move |_| async move {
                c2.fetch_add(10, Ordering::SeqCst);
            })
            .await;

        assert_eq!(tasks.len(), 1);

        // The cancelled task may still report completion; only the second counts.
        loop {
            let (key, generation) =
                tokio::time::timeout(Duration::from_millis(200), tasks.next_completion())
                    .await
                    .expect("timeout")
                    .expect("channel closed");
            if tasks.complete(&key, generation) {
                assert_eq!(generation, second);
                break;
            }
        }

        tokio::time::sleep(Duration::from_millis(150)).await;
        assert_eq!(counter.load(Ordering::SeqCst), 10);
    }

    #[tokio::test]
    async fn test_stale_completion_keeps_replacement() {
        let mut tasks = KeyedTasks::new(CancellationToken::new());

        let first = tasks.spawn("k", |_| async {}).await;
        let second = tasks
            .spawn("k", |token| async move { token.cancelled().await })
            .await;

        assert!(!tasks.complete(&TaskKey::new("k"), first));
        assert!(tasks.is_running(&TaskKey::new("k")));
        assert_ne!(first, second);
    }

    #[tokio::test]
    async fn test_cancel() {
        let mut tasks = KeyedTasks::new(CancellationToken::new());
        let stopped = Arc::new(AtomicUsize::new(0));

        let s = stopped.clone();
        tasks
            .spawn("test", move |token| async move {
                token.cancelled().await;
                s.fetch_add(1, Ordering::SeqCst);
            })
            .await;

        assert!(tasks.cancel(&TaskKey::new("test")).await);
        assert!(!tasks.is_running(&TaskKey::new("test")));
        assert_eq!(stopped.load(Ordering::SeqCst), 1);
        assert!(!tasks.cancel(&TaskKey::new("test")).await);
    }

    #[tokio::test]
    async fn test_parent_cancellation_reaches_tasks() {
        let parent = CancellationToken::new();
        let mut tasks = KeyedTasks::new(parent.clone());

        tasks
            .spawn("a", |token| async move { token.cancelled().await })
            .await;
        parent.cancel();

        let completed = tokio::time::timeout(Duration::from_millis(100), tasks.next_completion())
            .await
            .expect("timeout");
        assert!(completed.is_some());
    }

    #[tokio::test]
    async fn test_cancel_all() {
        let mut tasks = KeyedTasks::new(CancellationToken::new());

        tasks
            .spawn("a", |_| async {
                tokio::time::sleep(Duration::from_secs(10)).await;
            })
            .await;
        tasks
            .spawn("b", |_| async {
                tokio::time::sleep(Duration::from_secs(10)).await;
            })
            .await;

        assert_eq!(tasks.len(), 2);

        tasks.cancel_all();

        assert!(tasks.is_empty());
    }
}
