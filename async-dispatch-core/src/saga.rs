//! Saga effects and watchers
//!
//! A saga is a tokio task observing committed actions through a
//! [`SagaContext`]. Effects (`put`, `take`, `call`, ...) check the context's
//! cancellation token, so a cancelled saga stops at its next effect.
//!
//! Watchers turn a worker function into a long-running saga:
//! - [`take_every`] runs a worker per matching action, concurrently
//! - [`take_latest`] cancels the running worker when a new action matches
//! - [`take_every_latest`] does the same per derived key

use std::future::Future;

use tokio::sync::{broadcast, mpsc, watch};
use tokio_util::sync::CancellationToken;

use crate::action::Action;
use crate::async_action::{AsyncActionSet, AsyncOp, Phases};
use crate::error::{BoxError, FriendlyError, HandlerConfigError};
use crate::tasks::{KeyedTasks, TaskKey};

/// Why a saga stopped
#[derive(Debug, thiserror::Error)]
pub enum TaskError {
    #[error("task cancelled")]
    Cancelled,
    #[error("action channel closed")]
    Closed,
    #[error("{action_type} failed: {error}")]
    AsyncFailure {
        action_type: &'static str,
        #[source]
        error: FriendlyError,
    },
    #[error(transparent)]
    Handler(#[from] HandlerConfigError),
    #[error(transparent)]
    Other(#[from] BoxError),
}

impl TaskError {
    pub fn other(error: impl Into<BoxError>) -> Self {
        TaskError::Other(error.into())
    }

    /// Cancellation and shutdown are not failures
    pub fn is_shutdown(&self) -> bool {
        matches!(self, TaskError::Cancelled | TaskError::Closed)
    }
}

/// Handle given to sagas: dispatch, observe, and stop on cancellation.
pub struct SagaContext<S, A> {
    action_tx: mpsc::UnboundedSender<A>,
    committed: broadcast::Sender<A>,
    actions: broadcast::Receiver<A>,
    state: watch::Receiver<S>,
    token: CancellationToken,
}

impl<S, A: Action> SagaContext<S, A> {
    pub(crate) fn new(
        action_tx: mpsc::UnboundedSender<A>,
        committed: broadcast::Sender<A>,
        state: watch::Receiver<S>,
        token: CancellationToken,
    ) -> Self {
        let actions = committed.subscribe();
        Self {
            action_tx,
            committed,
            actions,
            state,
            token,
        }
    }

    /// A context observing actions committed from now on, cancelled by `token`.
    pub fn with_token(&self, token: CancellationToken) -> Self {
        Self::new(
            self.action_tx.clone(),
            self.committed.clone(),
            self.state.clone(),
            token,
        )
    }

    /// A context cancelled together with this one
    pub fn child(&self) -> Self {
        self.with_token(self.token.child_token())
    }

    pub fn token(&self) -> &CancellationToken {
        &self.token
    }

    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }

    pub fn action_tx(&self) -> mpsc::UnboundedSender<A> {
        self.action_tx.clone()
    }

    /// Borrow the latest committed state. Do not hold it across await points.
    pub fn state(&self) -> watch::Ref<'_, S> {
        self.state.borrow()
    }

    /// Read a value out of the latest committed state
    pub fn select_state<T>(&self, f: impl FnOnce(&S) -> T) -> T {
        f(&self.state.borrow())
    }

    /// Dispatch an action
    pub fn put(&self, action: A) -> Result<(), TaskError> {
        if self.token.is_cancelled() {
            return Err(TaskError::Cancelled);
        }
        self.action_tx.send(action).map_err(|_| TaskError::Closed)
    }

    /// Wait for the next committed action matching `pattern`
    pub async fn take<P>(&mut self, pattern: P) -> Result<A, TaskError>
    where
        P: Fn(&A) -> bool,
    {
        loop {
            let received = tokio::select! {
                biased;
                _ = self.token.cancelled() => return Err(TaskError::Cancelled),
                received = self.actions.recv() => received,
            };
            match received {
                Ok(action) if pattern(&action) => return Ok(action),
                Ok(_) => continue,
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    tracing::warn!(skipped, "Saga lagged behind committed actions");
                }
                Err(broadcast::error::RecvError::Closed) => return Err(TaskError::Closed),
            }
        }
    }

    /// Wait for the first committed action matching any of `patterns`.
    ///
    /// Returns the index of the matching pattern with the action.
    pub async fn select(
        &mut self,
        patterns: &[&(dyn Fn(&A) -> bool + Sync)],
    ) -> Result<(usize, A), TaskError> {
        let action = self
            .take(|action| patterns.iter().any(|pattern| pattern(action)))
            .await?;
        let index = patterns
            .iter()
            .position(|pattern| pattern(&action))
            .unwrap_or_default();
        Ok((index, action))
    }

    /// Await a future unless the saga is cancelled first
    pub async fn call<F, T>(&self, future: F) -> Result<T, TaskError>
    where
        F: Future<Output = T>,
    {
        tokio::select! {
            biased;
            _ = self.token.cancelled() => Err(TaskError::Cancelled),
            output = future => Ok(output),
        }
    }

    /// Spawn a saga cancelled together with this one
    pub fn fork<F, Fut>(&self, saga: F) -> tokio::task::JoinHandle<Result<(), TaskError>>
    where
        S: Send + Sync + 'static,
        F: FnOnce(SagaContext<S, A>) -> Fut,
        Fut: Future<Output = Result<(), TaskError>> + Send + 'static,
    {
        tokio::spawn(saga(self.child()))
    }
}

impl<S, A: AsyncActionSet> SagaContext<S, A> {
    /// Dispatch `request` and wait for `op` to settle.
    ///
    /// `request` is usually the op's init or request action. Returns the
    /// success action, or [`TaskError::AsyncFailure`] carrying the failure's
    /// friendly error.
    pub async fn put_and_take_async<Req, Res>(
        &self,
        op: AsyncOp<Req, Res>,
        request: A,
    ) -> Result<A, TaskError> {
        let mut settled = self.with_token(self.token.clone());
        self.put(request)?;

        let action = settled
            .take(|a| op.matches(a.action_type(), Phases::SETTLED))
            .await?;

        match action.async_error() {
            Some(error) => Err(TaskError::AsyncFailure {
                action_type: action.action_type(),
                error: error.clone(),
            }),
            None => Ok(action),
        }
    }
}

fn report(task: &str, result: Result<(), TaskError>) {
    match result {
        Ok(()) => {}
        Err(err) if err.is_shutdown() => {
            tracing::debug!(task, "Saga task stopped");
        }
        Err(err) => {
            tracing::error!(task, error = %err, "Saga task failed");
        }
    }
}

/// Run `worker` for every action matching `pattern`, one live worker per key.
///
/// A new action whose key has a running worker cancels that worker and waits
/// for it to stop before starting the new one. Workers for different keys run
/// concurrently.
pub async fn take_every_latest<S, A, P, K, W, Fut>(
    mut ctx: SagaContext<S, A>,
    pattern: P,
    key_of: K,
    worker: W,
) -> Result<(), TaskError>
where
    S: Send + Sync + 'static,
    A: Action,
    P: Fn(&A) -> bool,
    K: Fn(&A) -> String,
    W: Fn(SagaContext<S, A>, A) -> Fut,
    Fut: Future<Output = Result<(), TaskError>> + Send + 'static,
{
    let mut tasks = KeyedTasks::new(ctx.token().clone());

    loop {
        tokio::select! {
            Some((key, generation)) = tasks.next_completion() => {
                tasks.complete(&key, generation);
            }
            taken = ctx.take(&pattern) => {
                let action = match taken {
                    Ok(action) => action,
                    Err(TaskError::Cancelled) => break,
                    Err(err) => return Err(err),
                };
                let key = TaskKey::new(key_of(&action));
                let name = key.name().to_string();
                tracing::debug!(task = %name, action = %action.action_type(), "Starting saga task");

                let ctx = &ctx;
                let worker = &worker;
                tasks
                    .spawn(key, move |token| {
                        let task = worker(ctx.with_token(token), action);
                        async move { report(&name, task.await) }
                    })
                    .await;
            }
        }
    }

    tasks.cancel_all();
    Ok(())
}

/// [`take_every_latest`] with a single key
pub async fn take_latest<S, A, P, W, Fut>(
    ctx: SagaContext<S, A>,
    pattern: P,
    worker: W,
) -> Result<(), TaskError>
where
    S: Send + Sync + 'static,
    A: Action,
    P: Fn(&A) -> bool,
    W: Fn(SagaContext<S, A>, A) -> Fut,
    Fut: Future<Output = Result<(), TaskError>> + Send + 'static,
{
    take_every_latest(ctx, pattern, |_| String::from("latest"), worker).await
}

/// Run `worker` for every action matching `pattern`, never cancelling
pub async fn take_every<S, A, P, W, Fut>(
    mut ctx: SagaContext<S, A>,
    pattern: P,
    worker: W,
) -> Result<(), TaskError>
where
    S: Send + Sync + 'static,
    A: Action,
    P: Fn(&A) -> bool,
    W: Fn(SagaContext<S, A>, A) -> Fut,
    Fut: Future<Output = Result<(), TaskError>> + Send + 'static,
{
    loop {
        let action = match ctx.take(&pattern).await {
            Ok(action) => action,
            Err(TaskError::Cancelled) => return Ok(()),
            Err(err) => return Err(err),
        };
        let name = action.action_type();
        let task = worker(ctx.child(), action);
        tokio::spawn(async move { report(name, task.await) });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::async_action::{AsyncAction, AsyncSubtype, CacheOptions};
    use crate::error::ErrorCode;
    use crate::{async_op, subpath};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::time::Duration;

    const LOAD: AsyncOp<String, u32> = async_op!("test", "LOAD");

    fn harness() -> (
        SagaContext<(), AsyncAction<String, u32>>,
        mpsc::UnboundedReceiver<AsyncAction<String, u32>>,
        broadcast::Sender<AsyncAction<String, u32>>,
    ) {
        let (tx, rx) = mpsc::unbounded_channel();
        let (committed, _) = broadcast::channel(16);
        let (_, state) = watch::channel(());
        let ctx = SagaContext::new(tx, committed.clone(), state, CancellationToken::new());
        (ctx, rx, committed)
    }

    #[tokio::test]
    async fn test_put_after_cancel_fails() {
        let (ctx, mut rx, _) = harness();
        ctx.put(LOAD.request("a".into(), None)).expect("put");
        assert!(rx.recv().await.is_some());

        ctx.token().cancel();
        assert!(matches!(
            ctx.put(LOAD.request("a".into(), None)),
            Err(TaskError::Cancelled)
        ));
    }

    #[tokio::test]
    async fn test_take_skips_unmatched() {
        let (mut ctx, _rx, committed) = harness();
        committed.send(LOAD.request("a".into(), None)).expect("send");
        committed.send(LOAD.success(1, None)).expect("send");

        let action = ctx
            .take(|a| a.subtype() == AsyncSubtype::Success)
            .await
            .expect("take");
        assert_eq!(action.success_payload(), Some(&1));
    }

    #[tokio::test]
    async fn test_call_observes_cancellation() {
        let (ctx, _rx, _) = harness();
        ctx.token().cancel();
        let result = ctx.call(tokio::time::sleep(Duration::from_secs(10))).await;
        assert!(matches!(result, Err(TaskError::Cancelled)));
    }

    #[tokio::test]
    async fn test_put_and_take_async_failure() {
        let (ctx, mut rx, committed) = harness();

        // Echo the request back as a failure once it is dispatched
        tokio::spawn(async move {
            if let Some(request) = rx.recv().await {
                let _ = committed.send(request.clone());
                let error = FriendlyError::from_code(ErrorCode::Timeout);
                let _ = committed.send(LOAD.failure(error, None, Some(subpath!["a"])));
            }
        });

        let result = ctx
            .put_and_take_async(LOAD, LOAD.init("a".into(), CacheOptions::timeout(-1)))
            .await;
        match result {
            Err(TaskError::AsyncFailure { action_type, error }) => {
                assert_eq!(action_type, "mth/test/LOAD_FAILURE");
                assert_eq!(error.code, ErrorCode::Timeout);
            }
            other => panic!("unexpected result: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_take_every_latest_single_completion_per_key() {
        let (ctx, _rx, committed) = harness();
        let completed = Arc::new(AtomicUsize::new(0));

        let counter = completed.clone();
        let watcher = tokio::spawn(take_every_latest(
            ctx.child(),
            |a: &AsyncAction<String, u32>| a.subtype() == AsyncSubtype::Request,
            |a| format!("load_{}", a.request_payload().cloned().unwrap_or_default()),
            move |worker_ctx, _action| {
                let counter = counter.clone();
                async move {
                    worker_ctx
                        .call(tokio::time::sleep(Duration::from_millis(50)))
                        .await?;
                    counter.fetch_add(1, Ordering::SeqCst);
                    Ok::<_, TaskError>(())
                }
            },
        ));

        // Let the watcher subscribe before publishing
        tokio::task::yield_now().await;
        tokio::time::sleep(Duration::from_millis(10)).await;

        committed.send(LOAD.request("c1".into(), None)).expect("send");
        committed.send(LOAD.request("c1".into(), None)).expect("send");
        committed.send(LOAD.request("c2".into(), None)).expect("send");

        tokio::time::sleep(Duration::from_millis(200)).await;
        assert_eq!(completed.load(Ordering::SeqCst), 2);

        ctx.token().cancel();
        let result = tokio::time::timeout(Duration::from_millis(100), watcher)
            .await
            .expect("timeout")
            .expect("join");
        assert!(result.is_ok());
    }
}
