//! Saga runtime: the dispatch loop hosting the store and its sagas.
//!
//! Actions are queued on an unbounded channel, reduced one at a time, and
//! the committed (possibly enriched) action is then broadcast to sagas.
//!
//! ```ignore
//! let mut runtime = SagaRuntime::new(RootState::default(), root_reducer());
//! runtime.spawn(init_dispatcher);
//! runtime.spawn(move |ctx| contract_sagas(ctx, services.clone()));
//!
//! runtime.enqueue(Action::ContractLoadAll(LOAD_CONTRACTS.init((), CacheOptions::none())));
//! runtime.run(|_| false).await;
//! runtime.shutdown().await;
//! ```

use std::future::Future;
use std::marker::PhantomData;

use tokio::sync::{broadcast, mpsc, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::saga::{SagaContext, TaskError};
use crate::store::{DispatchStore, Reducer, Store};
use crate::Action;

/// Default capacity of the committed-action broadcast channel
pub const DEFAULT_BROADCAST_CAPACITY: usize = 1024;

/// Runtime hosting a store and the sagas observing it.
pub struct SagaRuntime<S, A: Action, St: DispatchStore<S, A> = Store<S, A>> {
    store: St,
    action_tx: mpsc::UnboundedSender<A>,
    action_rx: mpsc::UnboundedReceiver<A>,
    committed: broadcast::Sender<A>,
    state_rx: watch::Receiver<S>,
    cancel_token: CancellationToken,
    sagas: Vec<JoinHandle<()>>,
    _state: PhantomData<S>,
}

impl<S: Send + Sync + 'static, A: Action> SagaRuntime<S, A, Store<S, A>> {
    /// Create a runtime from state + reducer.
    pub fn new(state: S, reducer: impl Reducer<S, A> + 'static) -> Self {
        Self::from_store(Store::new(state, reducer))
    }
}

impl<S: Send + Sync + 'static, A: Action, St: DispatchStore<S, A>> SagaRuntime<S, A, St> {
    /// Create a runtime from an existing store.
    pub fn from_store(store: St) -> Self {
        let (action_tx, action_rx) = mpsc::unbounded_channel();
        let (committed, _) = broadcast::channel(DEFAULT_BROADCAST_CAPACITY);
        let state_rx = store.subscribe();
        Self {
            store,
            action_tx,
            action_rx,
            committed,
            state_rx,
            cancel_token: CancellationToken::new(),
            sagas: Vec::new(),
            _state: PhantomData,
        }
    }

    /// Resize the committed-action channel. Call before spawning sagas.
    pub fn with_broadcast_capacity(mut self, capacity: usize) -> Self {
        let (committed, _) = broadcast::channel(capacity.max(1));
        self.committed = committed;
        self
    }

    /// Send an action into the runtime queue.
    pub fn enqueue(&self, action: A) {
        let _ = self.action_tx.send(action);
    }

    /// Clone the action sender.
    pub fn action_tx(&self) -> mpsc::UnboundedSender<A> {
        self.action_tx.clone()
    }

    /// Borrow the current state.
    pub fn state(&self) -> watch::Ref<'_, S> {
        self.state_rx.borrow()
    }

    /// Borrow the store, e.g. to read its middleware.
    pub fn store(&self) -> &St {
        &self.store
    }

    /// Receiver observing committed state changes.
    pub fn subscribe_state(&self) -> watch::Receiver<S> {
        self.state_rx.clone()
    }

    /// Receiver observing committed actions.
    pub fn subscribe_actions(&self) -> broadcast::Receiver<A> {
        self.committed.subscribe()
    }

    /// Context for a saga started outside of [`SagaRuntime::spawn`].
    pub fn context(&self) -> SagaContext<S, A> {
        SagaContext::new(
            self.action_tx.clone(),
            self.committed.clone(),
            self.state_rx.clone(),
            self.cancel_token.child_token(),
        )
    }

    /// Spawn a saga. It observes every action committed from now on.
    pub fn spawn<F, Fut>(&mut self, saga: F)
    where
        F: FnOnce(SagaContext<S, A>) -> Fut,
        Fut: Future<Output = Result<(), TaskError>> + Send + 'static,
    {
        let future = saga(self.context());
        self.sagas.push(tokio::spawn(async move {
            match future.await {
                Ok(()) => tracing::debug!("Saga finished"),
                Err(err) if err.is_shutdown() => tracing::debug!("Saga stopped"),
                Err(err) => tracing::error!(error = %err, "Saga failed"),
            }
        }));
    }

    /// Reduce one action and broadcast the committed result.
    ///
    /// Returns whether the state changed.
    pub fn dispatch(&mut self, mut action: A) -> bool {
        let changed = self.store.dispatch(&mut action);
        // Nobody listening is fine
        let _ = self.committed.send(action);
        changed
    }

    /// Reduce the next queued action, if any, without waiting.
    pub fn step(&mut self) -> Option<bool> {
        let action = self.action_rx.try_recv().ok()?;
        Some(self.dispatch(action))
    }

    /// Run the dispatch loop until `should_quit` matches a queued action
    /// (which is then not reduced) or the runtime is cancelled.
    pub async fn run<FQuit>(&mut self, mut should_quit: FQuit)
    where
        FQuit: FnMut(&A) -> bool,
    {
        loop {
            tokio::select! {
                _ = self.cancel_token.cancelled() => break,

                Some(action) = self.action_rx.recv() => {
                    if should_quit(&action) {
                        break;
                    }
                    self.dispatch(action);
                }

                else => break,
            }
        }
    }

    /// Run the dispatch loop until a committed action satisfies `done`.
    ///
    /// Returns that action, or `None` if the runtime was cancelled first.
    pub async fn run_until<FDone>(&mut self, mut done: FDone) -> Option<A>
    where
        FDone: FnMut(&A) -> bool,
    {
        loop {
            tokio::select! {
                _ = self.cancel_token.cancelled() => return None,

                Some(mut action) = self.action_rx.recv() => {
                    self.store.dispatch(&mut action);
                    let finished = done(&action);
                    let committed = finished.then(|| action.clone());
                    let _ = self.committed.send(action);
                    if committed.is_some() {
                        return committed;
                    }
                }

                else => return None,
            }
        }
    }

    /// Token cancelled on shutdown; sagas' tokens are its children.
    pub fn cancel_token(&self) -> &CancellationToken {
        &self.cancel_token
    }

    /// Cancel every saga and wait for them to stop.
    pub async fn shutdown(&mut self) {
        self.cancel_token.cancel();
        for handle in self.sagas.drain(..) {
            if let Err(err) = handle.await {
                if err.is_panic() {
                    tracing::error!("Saga panicked");
                }
            }
        }
        tracing::info!("Saga runtime stopped");
    }
}

impl<S, A: Action, St: DispatchStore<S, A>> Drop for SagaRuntime<S, A, St> {
    fn drop(&mut self) {
        self.cancel_token.cancel();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[derive(Default)]
    struct Counter {
        value: i32,
    }

    #[derive(Clone, Debug, PartialEq)]
    enum TestAction {
        Increment,
        Incremented(i32),
        Quit,
    }

    impl Action for TestAction {
        fn name(&self) -> &'static str {
            match self {
                TestAction::Increment => "Increment",
                TestAction::Incremented(_) => "Incremented",
                TestAction::Quit => "Quit",
            }
        }
    }

    fn reducer(state: &mut Counter, action: &mut TestAction) -> bool {
        match action {
            TestAction::Increment => {
                state.value += 1;
                true
            }
            _ => false,
        }
    }

    #[tokio::test]
    async fn test_step_reduces_queued_action() {
        let mut runtime = SagaRuntime::new(Counter::default(), reducer);
        assert_eq!(runtime.step(), None);

        runtime.enqueue(TestAction::Increment);
        assert_eq!(runtime.step(), Some(true));
        assert_eq!(runtime.state().value, 1);
    }

    #[tokio::test]
    async fn test_saga_sees_committed_state() {
        let mut runtime = SagaRuntime::new(Counter::default(), reducer);
        runtime.spawn(|mut ctx| async move {
            ctx.take(|a| *a == TestAction::Increment).await?;
            let value = ctx.select_state(|s| s.value);
            ctx.put(TestAction::Incremented(value))?;
            Ok::<_, TaskError>(())
        });

        runtime.enqueue(TestAction::Increment);
        let reported = tokio::time::timeout(
            Duration::from_millis(200),
            runtime.run_until(|a| matches!(a, TestAction::Incremented(_))),
        )
        .await
        .expect("timeout");

        assert_eq!(reported, Some(TestAction::Incremented(1)));
        runtime.shutdown().await;
    }

    #[tokio::test]
    async fn test_run_stops_on_quit() {
        let mut runtime = SagaRuntime::new(Counter::default(), reducer);
        runtime.enqueue(TestAction::Increment);
        runtime.enqueue(TestAction::Quit);
        runtime.enqueue(TestAction::Increment);

        tokio::time::timeout(
            Duration::from_millis(100),
            runtime.run(|a| *a == TestAction::Quit),
        )
        .await
        .expect("timeout");

        assert_eq!(runtime.state().value, 1);
    }

    #[tokio::test]
    async fn test_shutdown_cancels_sagas() {
        let mut runtime = SagaRuntime::new(Counter::default(), reducer);
        runtime.spawn(|mut ctx| async move {
            ctx.take(|_| false).await?;
            Ok::<_, TaskError>(())
        });

        tokio::time::timeout(Duration::from_millis(100), runtime.shutdown())
            .await
            .expect("timeout");
    }
}
