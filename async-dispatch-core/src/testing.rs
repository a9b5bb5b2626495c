//! Test utilities for async-dispatch applications
//!
//! - [`TestHarness`]: state plus an action channel, for reducers and sagas
//! - Assertion macros for verifying emitted actions
//! - Time control (feature `testing-time`) for cache timeouts and polling
//!
//! # Example
//!
//! ```ignore
//! use async_dispatch::testing::TestHarness;
//!
//! let mut harness = TestHarness::<RootState, Action>::new(RootState::default());
//!
//! // Reduce an action and keep the enriched result
//! let committed = harness.reduce(&reducer, Action::ContractLoad(LOAD_CONTRACT.init(..)));
//!
//! // Check emitted actions
//! harness.emit(Action::AppBootstrapped);
//! let emitted = harness.drain_emitted();
//! assert_emitted!(emitted, Action::AppBootstrapped);
//! ```

use tokio::sync::mpsc;

use crate::store::Reducer;
use crate::{Action, ActionCategory};

/// Generic test harness for async-dispatch applications.
///
/// Provides:
/// - State management with a simple `state` field
/// - Action channel for capturing emitted actions
/// - Helper methods for reducing, dispatching and draining actions
pub struct TestHarness<S, A: Action> {
    /// The application state under test
    pub state: S,
    tx: mpsc::UnboundedSender<A>,
    rx: mpsc::UnboundedReceiver<A>,
}

impl<S, A: Action> TestHarness<S, A> {
    /// Create a new test harness with the given initial state.
    pub fn new(state: S) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        Self { state, tx, rx }
    }

    /// Get a clone of the action sender for passing to sagas.
    pub fn sender(&self) -> mpsc::UnboundedSender<A> {
        self.tx.clone()
    }

    /// Emit an action (simulates what a saga would do).
    pub fn emit(&self, action: A) {
        let _ = self.tx.send(action);
    }

    /// Run `reducer` on the harness state and return the committed action.
    pub fn reduce<R: Reducer<S, A>>(&mut self, reducer: &R, mut action: A) -> A {
        reducer.reduce(&mut self.state, &mut action);
        action
    }

    /// Drain all emitted actions from the channel.
    pub fn drain_emitted(&mut self) -> Vec<A> {
        let mut actions = Vec::new();
        while let Ok(action) = self.rx.try_recv() {
            actions.push(action);
        }
        actions
    }

    /// Check if any actions were emitted.
    pub fn has_emitted(&mut self) -> bool {
        !self.drain_emitted().is_empty()
    }
}

impl<S: Default, A: Action> Default for TestHarness<S, A> {
    fn default() -> Self {
        Self::new(S::default())
    }
}

/// Category-aware methods for TestHarness.
impl<S, A: ActionCategory> TestHarness<S, A> {
    /// Drain all emitted actions that belong to a specific category.
    ///
    /// Actions not matching the category remain in the channel for later draining.
    pub fn drain_category(&mut self, category: &str) -> Vec<A> {
        let (matching, rest): (Vec<A>, Vec<A>) = self
            .drain_emitted()
            .into_iter()
            .partition(|action| action.category() == Some(category));

        for action in rest {
            let _ = self.tx.send(action);
        }

        matching
    }
}

/// Pause tokio time (the runtime must be current-thread).
#[cfg(feature = "testing-time")]
pub fn pause_time() {
    tokio::time::pause();
}

/// Advance paused tokio time, firing due timers.
#[cfg(feature = "testing-time")]
pub async fn advance_time(duration: std::time::Duration) {
    tokio::time::advance(duration).await;
}

#[cfg(feature = "testing-time")]
pub fn resume_time() {
    tokio::time::resume();
}

/// Assert that a specific action was emitted.
///
/// # Example
///
/// ```ignore
/// let actions = harness.drain_emitted();
/// assert_emitted!(actions, Action::AppBootstrapped);
/// assert_emitted!(actions, Action::ContractLoad(a) if a.is_from_cache());
/// ```
#[macro_export]
macro_rules! assert_emitted {
    ($actions:expr, $pattern:pat $(if $guard:expr)?) => {
        assert!(
            $actions.iter().any(|a| matches!(a, $pattern $(if $guard)?)),
            "Expected action matching `{}` to be emitted, but got: {:?}",
            stringify!($pattern),
            $actions
        );
    };
}

/// Assert that a specific action was NOT emitted.
#[macro_export]
macro_rules! assert_not_emitted {
    ($actions:expr, $pattern:pat $(if $guard:expr)?) => {
        assert!(
            !$actions.iter().any(|a| matches!(a, $pattern $(if $guard)?)),
            "Expected action matching `{}` NOT to be emitted, but it was: {:?}",
            stringify!($pattern),
            $actions
        );
    };
}

/// Find and return the first action matching a pattern.
#[macro_export]
macro_rules! find_emitted {
    ($actions:expr, $pattern:pat $(if $guard:expr)?) => {
        $actions.iter().find(|a| matches!(a, $pattern $(if $guard)?))
    };
}

/// Count how many actions match a pattern.
#[macro_export]
macro_rules! count_emitted {
    ($actions:expr, $pattern:pat $(if $guard:expr)?) => {
        $actions.iter().filter(|a| matches!(a, $pattern $(if $guard)?)).count()
    };
}

/// Assert that an action with the given fully qualified type was emitted.
///
/// ```ignore
/// assert_type_emitted!(actions, LOAD_CONTRACT.request_type());
/// ```
#[macro_export]
macro_rules! assert_type_emitted {
    ($actions:expr, $action_type:expr) => {
        assert!(
            $actions.iter().any(|a| {
                use $crate::Action;
                a.action_type() == $action_type
            }),
            "Expected action of type `{}` to be emitted, but got: {:?}",
            $action_type,
            $actions
        );
    };
}

/// Assert that an action of a specific category was emitted.
#[macro_export]
macro_rules! assert_category_emitted {
    ($actions:expr, $category:expr) => {
        assert!(
            $actions.iter().any(|a| {
                use $crate::ActionCategory;
                a.category() == Some($category)
            }),
            "Expected action with category `{}` to be emitted, but got: {:?}",
            $category,
            $actions
        );
    };
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Clone, Debug, PartialEq)]
    enum TestAction {
        Foo,
        Bar(i32),
    }

    impl crate::Action for TestAction {
        fn name(&self) -> &'static str {
            match self {
                TestAction::Foo => "Foo",
                TestAction::Bar(_) => "Bar",
            }
        }
    }

    impl crate::ActionCategory for TestAction {
        fn category(&self) -> Option<&'static str> {
            match self {
                TestAction::Foo => Some("foo"),
                TestAction::Bar(_) => None,
            }
        }
    }

    #[test]
    fn test_harness_emit_and_drain() {
        let mut harness = TestHarness::<(), TestAction>::new(());

        harness.emit(TestAction::Foo);
        harness.emit(TestAction::Bar(42));

        let actions = harness.drain_emitted();
        assert_eq!(actions, vec![TestAction::Foo, TestAction::Bar(42)]);
        assert!(!harness.has_emitted());
    }

    #[test]
    fn test_harness_reduce() {
        let mut harness = TestHarness::<i32, TestAction>::new(0);
        let reducer = |state: &mut i32, action: &mut TestAction| {
            if let TestAction::Bar(n) = action {
                *state += *n;
                *n = 0;
                return true;
            }
            false
        };

        let committed = harness.reduce(&reducer, TestAction::Bar(5));
        assert_eq!(harness.state, 5);
        assert_eq!(committed, TestAction::Bar(0));
    }

    #[test]
    fn test_drain_category_keeps_others() {
        let mut harness = TestHarness::<(), TestAction>::new(());
        harness.emit(TestAction::Foo);
        harness.emit(TestAction::Bar(1));

        assert_eq!(harness.drain_category("foo"), vec![TestAction::Foo]);
        assert_eq!(harness.drain_emitted(), vec![TestAction::Bar(1)]);
    }

    #[test]
    fn test_assert_macros() {
        let actions = vec![TestAction::Foo, TestAction::Bar(42)];

        assert_emitted!(actions, TestAction::Foo);
        assert_emitted!(actions, TestAction::Bar(n) if *n > 40);
        assert_not_emitted!(actions, TestAction::Bar(99));
        assert_type_emitted!(actions, "Bar");
        assert_category_emitted!(actions, "foo");

        assert!(find_emitted!(actions, TestAction::Bar(_)).is_some());
        assert_eq!(count_emitted!(actions, TestAction::Bar(_)), 1);
    }
}
