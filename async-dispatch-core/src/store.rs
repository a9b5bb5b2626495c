//! Centralized state store with reducer pattern

use std::marker::PhantomData;

use tokio::sync::watch;

use crate::Action;

/// Handles actions and mutates state
///
/// Returns `true` if the state changed and subscribers should be notified.
/// The action is passed mutably so a reducer can enrich it before it is
/// broadcast to sagas (the reducer builder stashes the resolved sub-path and
/// the cached state onto init actions).
pub trait Reducer<S, A>: Send + Sync {
    fn reduce(&self, state: &mut S, action: &mut A) -> bool;
}

impl<S, A, F> Reducer<S, A> for F
where
    F: Fn(&mut S, &mut A) -> bool + Send + Sync,
{
    fn reduce(&self, state: &mut S, action: &mut A) -> bool {
        self(state, action)
    }
}

/// Centralized state store with Redux-like reducer pattern
///
/// The store holds the application state in a `watch` channel and provides a
/// single point for state mutations through the `dispatch` method. Consumers
/// observe the state through [`Store::subscribe`].
///
/// # Type Parameters
/// * `S` - The application state type
/// * `A` - The action type (must implement `Action`)
///
/// # Example
/// ```ignore
/// #[derive(Default)]
/// struct AppState {
///     counter: i32,
/// }
///
/// fn reducer(state: &mut AppState, action: &mut MyAction) -> bool {
///     match action {
///         MyAction::Increment => {
///             state.counter += 1;
///             true
///         }
///     }
/// }
///
/// let mut store = Store::new(AppState::default(), reducer);
/// store.dispatch(&mut MyAction::Increment);
/// assert_eq!(store.state().counter, 1);
/// ```
pub struct Store<S, A: Action> {
    state: watch::Sender<S>,
    reducer: Box<dyn Reducer<S, A>>,
    _marker: PhantomData<A>,
}

impl<S, A: Action> Store<S, A> {
    /// Create a new store with initial state and reducer
    pub fn new(state: S, reducer: impl Reducer<S, A> + 'static) -> Self {
        let (state, _) = watch::channel(state);
        Self {
            state,
            reducer: Box::new(reducer),
            _marker: PhantomData,
        }
    }

    /// Dispatch an action to the store
    ///
    /// The reducer will be called with the current state and action.
    /// Returns `true` if the state changed; subscribers are notified only then.
    pub fn dispatch(&mut self, action: &mut A) -> bool {
        let reducer = &self.reducer;
        self.state.send_if_modified(|state| reducer.reduce(state, action))
    }

    /// Borrow the current state
    ///
    /// Do not hold the guard across await points.
    pub fn state(&self) -> watch::Ref<'_, S> {
        self.state.borrow()
    }

    /// Receiver observing every committed state change
    pub fn subscribe(&self) -> watch::Receiver<S> {
        self.state.subscribe()
    }
}

/// Store with middleware support
///
/// Wraps a `Store` and allows middleware to intercept actions
/// before and after they are processed by the reducer.
pub struct StoreWithMiddleware<S, A: Action, M: Middleware<A>> {
    store: Store<S, A>,
    middleware: M,
}

impl<S, A: Action, M: Middleware<A>> StoreWithMiddleware<S, A, M> {
    /// Create a new store with middleware
    pub fn new(state: S, reducer: impl Reducer<S, A> + 'static, middleware: M) -> Self {
        Self {
            store: Store::new(state, reducer),
            middleware,
        }
    }

    /// Dispatch an action through middleware and store
    pub fn dispatch(&mut self, action: &mut A) -> bool {
        self.middleware.before(action);
        let changed = self.store.dispatch(action);
        self.middleware.after(action, changed);
        changed
    }

    /// Borrow the current state
    pub fn state(&self) -> watch::Ref<'_, S> {
        self.store.state()
    }

    pub fn subscribe(&self) -> watch::Receiver<S> {
        self.store.subscribe()
    }

    /// Get a reference to the middleware
    pub fn middleware(&self) -> &M {
        &self.middleware
    }

    /// Get a mutable reference to the middleware
    pub fn middleware_mut(&mut self) -> &mut M {
        &mut self.middleware
    }
}

/// Store interface used by `SagaRuntime`.
pub trait DispatchStore<S, A: Action> {
    /// Dispatch an action and return whether the state changed.
    fn dispatch(&mut self, action: &mut A) -> bool;
    /// Receiver observing the state.
    fn subscribe(&self) -> watch::Receiver<S>;
}

impl<S, A: Action> DispatchStore<S, A> for Store<S, A> {
    fn dispatch(&mut self, action: &mut A) -> bool {
        Store::dispatch(self, action)
    }

    fn subscribe(&self) -> watch::Receiver<S> {
        Store::subscribe(self)
    }
}

impl<S, A: Action, M: Middleware<A>> DispatchStore<S, A> for StoreWithMiddleware<S, A, M> {
    fn dispatch(&mut self, action: &mut A) -> bool {
        StoreWithMiddleware::dispatch(self, action)
    }

    fn subscribe(&self) -> watch::Receiver<S> {
        StoreWithMiddleware::subscribe(self)
    }
}

/// Middleware trait for intercepting actions
///
/// Implement this trait to add logging, persistence, or other
/// cross-cutting concerns to your store.
pub trait Middleware<A: Action> {
    /// Called before the action is dispatched to the reducer
    fn before(&mut self, action: &A);

    /// Called after the action is processed by the reducer
    fn after(&mut self, action: &A, state_changed: bool);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Default)]
    struct TestState {
        counter: i32,
    }

    #[derive(Clone, Debug)]
    enum TestAction {
        Increment,
        Decrement,
        NoOp,
    }

    impl Action for TestAction {
        fn name(&self) -> &'static str {
            match self {
                TestAction::Increment => "Increment",
                TestAction::Decrement => "Decrement",
                TestAction::NoOp => "NoOp",
            }
        }
    }

    fn test_reducer(state: &mut TestState, action: &mut TestAction) -> bool {
        match action {
            TestAction::Increment => {
                state.counter += 1;
                true
            }
            TestAction::Decrement => {
                state.counter -= 1;
                true
            }
            TestAction::NoOp => false,
        }
    }

    #[test]
    fn test_store_dispatch() {
        let mut store = Store::new(TestState::default(), test_reducer);

        assert!(store.dispatch(&mut TestAction::Increment));
        assert_eq!(store.state().counter, 1);

        assert!(store.dispatch(&mut TestAction::Increment));
        assert_eq!(store.state().counter, 2);

        assert!(store.dispatch(&mut TestAction::Decrement));
        assert_eq!(store.state().counter, 1);
    }

    #[test]
    fn test_store_noop_does_not_notify() {
        let mut store = Store::new(TestState::default(), test_reducer);
        let rx = store.subscribe();

        assert!(!store.dispatch(&mut TestAction::NoOp));
        assert!(!rx.has_changed().unwrap_or(true));

        assert!(store.dispatch(&mut TestAction::Increment));
        assert!(rx.has_changed().unwrap_or(false));
        assert_eq!(rx.borrow().counter, 1);
    }

    #[derive(Default)]
    struct CountingMiddleware {
        before_count: usize,
        after_count: usize,
    }

    impl<A: Action> Middleware<A> for CountingMiddleware {
        fn before(&mut self, _action: &A) {
            self.before_count += 1;
        }

        fn after(&mut self, _action: &A, _state_changed: bool) {
            self.after_count += 1;
        }
    }

    #[test]
    fn test_store_with_middleware() {
        let mut store = StoreWithMiddleware::new(
            TestState::default(),
            test_reducer,
            CountingMiddleware::default(),
        );

        store.dispatch(&mut TestAction::Increment);
        store.dispatch(&mut TestAction::Increment);

        assert_eq!(store.middleware().before_count, 2);
        assert_eq!(store.middleware().after_count, 2);
        assert_eq!(store.state().counter, 2);
    }
}
