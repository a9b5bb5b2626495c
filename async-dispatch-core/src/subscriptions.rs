//! Interval subscriptions
//!
//! Long-lived sources of actions that feed the runtime queue on a timer,
//! such as re-issuing a cached load every few minutes.
//!
//! # Example
//!
//! ```ignore
//! use async_dispatch::subscriptions::Subscriptions;
//! use std::time::Duration;
//!
//! let mut subs = Subscriptions::new(runtime.action_tx());
//!
//! // Refresh contracts every minute, reusing anything younger than 30 s
//! subs.interval_immediate("contracts", Duration::from_secs(60), || {
//!     Action::ContractLoadAll(LOAD_CONTRACTS.init((), CacheOptions::timeout(30)))
//! });
//!
//! subs.cancel_all();
//! ```

use std::collections::HashMap;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

use crate::Action;

/// Identifies a subscription for cancellation.
#[derive(Clone, Debug, Eq, PartialEq, Hash)]
pub struct SubKey(String);

impl SubKey {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    pub fn name(&self) -> &str {
        &self.0
    }
}

impl From<&'static str> for SubKey {
    fn from(s: &'static str) -> Self {
        Self::new(s)
    }
}

impl From<String> for SubKey {
    fn from(s: String) -> Self {
        Self(s)
    }
}

/// Manages interval subscriptions, one per [`SubKey`].
///
/// Every subscription stops when its key is cancelled or replaced, when the
/// parent token fires, or when the action channel closes.
pub struct Subscriptions<A> {
    handles: HashMap<SubKey, JoinHandle<()>>,
    action_tx: mpsc::UnboundedSender<A>,
    parent: CancellationToken,
}

impl<A: Action> Subscriptions<A> {
    pub fn new(action_tx: mpsc::UnboundedSender<A>) -> Self {
        Self::with_token(action_tx, CancellationToken::new())
    }

    /// Subscriptions stopped together with `parent` (e.g. the runtime token).
    pub fn with_token(action_tx: mpsc::UnboundedSender<A>, parent: CancellationToken) -> Self {
        Self {
            handles: HashMap::new(),
            action_tx,
            parent,
        }
    }

    /// Emit `action_fn()` every `period`, starting one period from now.
    ///
    /// Replaces any subscription with the same key.
    pub fn interval<F>(
        &mut self,
        key: impl Into<SubKey>,
        period: Duration,
        action_fn: F,
    ) -> &mut Self
    where
        F: Fn() -> A + Send + 'static,
    {
        self.spawn(key.into(), period, false, action_fn)
    }

    /// Like [`Subscriptions::interval`], but the first action is emitted right away.
    pub fn interval_immediate<F>(
        &mut self,
        key: impl Into<SubKey>,
        period: Duration,
        action_fn: F,
    ) -> &mut Self
    where
        F: Fn() -> A + Send + 'static,
    {
        self.spawn(key.into(), period, true, action_fn)
    }

    fn spawn<F>(
        &mut self,
        key: SubKey,
        period: Duration,
        immediate: bool,
        action_fn: F,
    ) -> &mut Self
    where
        F: Fn() -> A + Send + 'static,
    {
        self.cancel(&key);

        let tx = self.action_tx.clone();
        let token = self.parent.child_token();
        let name = key.name().to_string();
        let handle = tokio::spawn(async move {
            let mut interval = tokio::time::interval(period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
            if !immediate {
                interval.tick().await;
            }

            loop {
                tokio::select! {
                    _ = token.cancelled() => break,
                    _ = interval.tick() => {
                        if tx.send(action_fn()).is_err() {
                            break;
                        }
                    }
                }
            }
            tracing::debug!(subscription = %name, "Subscription stopped");
        });

        self.handles.insert(key, handle);
        self
    }

    /// Cancel a subscription by key. No-op for unknown keys.
    pub fn cancel(&mut self, key: &SubKey) {
        if let Some(handle) = self.handles.remove(key) {
            handle.abort();
        }
    }

    pub fn cancel_all(&mut self) {
        for (_, handle) in self.handles.drain() {
            handle.abort();
        }
    }

    pub fn is_active(&self, key: &SubKey) -> bool {
        self.handles.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.handles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handles.is_empty()
    }

    pub fn active_keys(&self) -> impl Iterator<Item = &SubKey> {
        self.handles.keys()
    }
}

impl<A> Drop for Subscriptions<A> {
    fn drop(&mut self) {
        for (_, handle) in self.handles.drain() {
            handle.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Clone, Debug, PartialEq)]
    enum TestAction {
        Tick,
        Value(usize),
    }

    impl Action for TestAction {
        fn name(&self) -> &'static str {
            match self {
                TestAction::Tick => "Tick",
                TestAction::Value(_) => "Value",
            }
        }
    }

    #[test]
    fn test_sub_key() {
        let k1 = SubKey::new("refresh");
        let k2: SubKey = "refresh".into();
        assert_eq!(k1, k2);
        assert_eq!(k1.name(), "refresh");
    }

    #[tokio::test(start_paused = true)]
    async fn test_interval_waits_one_period() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut subs = Subscriptions::new(tx);
        subs.interval("tick", Duration::from_secs(60), || TestAction::Tick);

        let early = tokio::time::timeout(Duration::from_secs(30), rx.recv()).await;
        assert!(early.is_err());

        let action = tokio::time::timeout(Duration::from_secs(60), rx.recv())
            .await
            .expect("timeout");
        assert_eq!(action, Some(TestAction::Tick));
    }

    #[tokio::test(start_paused = true)]
    async fn test_interval_immediate() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut subs = Subscriptions::new(tx);
        subs.interval_immediate("tick", Duration::from_secs(60), || TestAction::Tick);

        let action = tokio::time::timeout(Duration::from_millis(10), rx.recv())
            .await
            .expect("should receive immediately");
        assert_eq!(action, Some(TestAction::Tick));
    }

    #[tokio::test(start_paused = true)]
    async fn test_replace_existing_subscription() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut subs = Subscriptions::new(tx);

        subs.interval("poll", Duration::from_secs(1), || TestAction::Value(1));
        subs.interval("poll", Duration::from_secs(1), || TestAction::Value(2));
        assert_eq!(subs.len(), 1);

        for _ in 0..3 {
            let action = tokio::time::timeout(Duration::from_secs(2), rx.recv())
                .await
                .expect("timeout");
            assert_eq!(action, Some(TestAction::Value(2)));
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_parent_token_stops_subscriptions() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let parent = CancellationToken::new();
        let mut subs = Subscriptions::with_token(tx, parent.clone());
        subs.interval("tick", Duration::from_secs(1), || TestAction::Tick);

        parent.cancel();
        tokio::time::sleep(Duration::from_secs(5)).await;
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_cancel_all() {
        let (tx, _rx) = mpsc::unbounded_channel();
        let mut subs = Subscriptions::new(tx);

        subs.interval("a", Duration::from_secs(10), || TestAction::Tick);
        subs.interval("b", Duration::from_secs(10), || TestAction::Tick);
        assert!(subs.is_active(&SubKey::new("a")));
        assert_eq!(subs.active_keys().count(), 2);

        subs.cancel_all();
        assert!(subs.is_empty());
    }
}
