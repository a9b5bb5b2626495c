//! Resolves init actions into requests or cached successes
//!
//! The reducer builder's init handler stashes the target sub-path and the
//! current [`AsyncState`](crate::AsyncState) onto every init action. This
//! saga reads that snapshot once the action is committed and emits either
//! the op's request (stale or missing data) or a success replayed from the
//! cache. A fetch that is already running absorbs the init.
//!
//! Resolution is synchronous, so init actions are handled one by one in
//! commit order and none is dropped. This is equivalent to take-latest: a
//! resolution never suspends, so no newer init can arrive and cancel it
//! before it puts its result.

use chrono::Utc;

use crate::async_action::{AsyncActionSet, AsyncSubtype};
use crate::saga::{SagaContext, TaskError};

/// Run until cancelled, resolving every committed init action.
///
/// ```ignore
/// runtime.spawn(init_dispatcher);
/// ```
pub async fn init_dispatcher<S, A>(mut ctx: SagaContext<S, A>) -> Result<(), TaskError>
where
    A: AsyncActionSet,
{
    loop {
        let init = match ctx
            .take(|action| action.subtype() == Some(AsyncSubtype::Init))
            .await
        {
            Ok(action) => action,
            Err(TaskError::Cancelled) => return Ok(()),
            Err(err) => return Err(err),
        };

        match init.resolve_init(Utc::now()) {
            Some(resolved) => {
                tracing::debug!(
                    init = %init.action_type(),
                    resolved = %resolved.action_type(),
                    subpath = ?init.subpath().map(ToString::to_string),
                    "Resolved init"
                );
                ctx.put(resolved)?;
            }
            None => {
                tracing::debug!(init = %init.action_type(), "Fetch already running");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::async_action::{AsyncAction, AsyncOp, CacheOptions};
    use crate::async_state::AsyncState;
    use crate::path::AsyncMap;
    use crate::reducer_builder::{BuiltReducer, ReducerBuilder};
    use crate::runtime::SagaRuntime;
    use crate::{async_op, subpath, PathKey, SubPath};
    use std::time::Duration;

    const LOAD: AsyncOp<String, u32> = async_op!("test", "LOAD");

    type TestAction = AsyncAction<String, u32>;

    fn reducer() -> BuiltReducer<AsyncMap<u32>, TestAction> {
        ReducerBuilder::<AsyncMap<u32>, TestAction>::new()
            .add_async(
                LOAD,
                |a| Some(a),
                |s| s,
                Some(|id: &String| subpath![id.clone()]),
            )
            .build()
    }

    fn runtime(seed: Option<AsyncState<u32>>) -> SagaRuntime<AsyncMap<u32>, TestAction> {
        let mut state = AsyncMap::new();
        if let Some(seed) = seed {
            state.insert(PathKey::from("c1"), seed);
        }
        let mut runtime = SagaRuntime::new(state, reducer());
        runtime.spawn(init_dispatcher);
        runtime
    }

    async fn settle(
        runtime: &mut SagaRuntime<AsyncMap<u32>, TestAction>,
        subtype: AsyncSubtype,
    ) -> TestAction {
        tokio::time::timeout(
            Duration::from_millis(200),
            runtime.run_until(|a| a.subtype() == subtype),
        )
        .await
        .expect("timeout")
        .expect("cancelled")
    }

    #[tokio::test]
    async fn test_missing_entry_requests() {
        let mut runtime = runtime(None);
        runtime.enqueue(LOAD.init("c1".into(), CacheOptions::timeout(-1)));

        let request = settle(&mut runtime, AsyncSubtype::Request).await;
        assert_eq!(request.subpath(), Some(&subpath!["c1"]));
        assert!(runtime.state()[&PathKey::from("c1")].is_fetching);
        runtime.shutdown().await;
    }

    #[tokio::test]
    async fn test_cached_entry_replays_success() {
        let mut runtime = runtime(Some(AsyncState::fetched(7)));
        let before = runtime.state()[&PathKey::from("c1")].clone();
        runtime.enqueue(LOAD.init("c1".into(), CacheOptions::timeout(-1)));

        let success = settle(&mut runtime, AsyncSubtype::Success).await;
        assert!(success.is_from_cache());
        assert_eq!(success.success_payload(), Some(&7));
        assert_eq!(runtime.state()[&PathKey::from("c1")], before);
        runtime.shutdown().await;
    }

    #[tokio::test]
    async fn test_invalidated_entry_requests() {
        let mut runtime = runtime(Some(AsyncState::fetched(7)));
        runtime.enqueue(LOAD.invalidate_data("c1".into(), None));
        runtime.enqueue(LOAD.init("c1".into(), CacheOptions::timeout(-1)));

        let request = settle(&mut runtime, AsyncSubtype::Request).await;
        assert_eq!(request.request_payload().map(String::as_str), Some("c1"));
        assert_eq!(runtime.state()[&PathKey::from("c1")].data, Some(7));
        runtime.shutdown().await;
    }

    #[tokio::test]
    async fn test_running_fetch_absorbs_init() {
        let fetching = AsyncState {
            is_fetching: true,
            ..AsyncState::new()
        };
        let mut runtime = runtime(Some(fetching));
        runtime.enqueue(LOAD.init("c1".into(), CacheOptions::none()));
        assert_eq!(runtime.step(), Some(false));

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(runtime.step(), None);
        runtime.shutdown().await;
    }

    #[tokio::test]
    async fn test_explicit_subpath_wins() {
        let mut runtime = runtime(None);
        let mut init = LOAD.init("ignored".into(), CacheOptions::none());
        init.set_subpath(SubPath::from_iter(["c9"]));
        runtime.enqueue(init);

        let request = settle(&mut runtime, AsyncSubtype::Request).await;
        assert_eq!(request.subpath(), Some(&subpath!["c9"]));
        runtime.shutdown().await;
    }
}
