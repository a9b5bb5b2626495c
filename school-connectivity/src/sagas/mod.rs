//! Sagas of the connectivity application
//!
//! Every watcher is spawned with its own context, subscribed before the
//! runtime starts dispatching. Workers run their ledger and wallet calls as
//! cancellable effects and turn any error into the failure phase of the
//! action they serve.

use std::future::Future;

use async_dispatch::action::Action;
use async_dispatch::{
    init_dispatcher, AsyncOp, BoxError, DispatchStore, FriendlyError, SagaContext, SagaRuntime,
    TaskError,
};
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::action::AppAction;
use crate::chain::ChainError;
use crate::services::Services;
use crate::state::RootState;

pub mod app;
pub mod contract;
pub mod isp;
pub mod school;

pub type Ctx = SagaContext<RootState, AppAction>;

pub type Runtime<St> = SagaRuntime<RootState, AppAction, St>;

/// Spawn the init dispatcher and every domain saga on `runtime`
pub fn spawn_all<St>(runtime: &mut Runtime<St>, services: &Services)
where
    St: DispatchStore<RootState, AppAction>,
{
    runtime.spawn(init_dispatcher);
    app::spawn(runtime);
    school::spawn(runtime, services);
    isp::spawn(runtime, services);
    contract::spawn(runtime, services);
}

/// Matches the request phase of `op`
pub(crate) fn requested<Req, Res>(op: AsyncOp<Req, Res>) -> impl Fn(&AppAction) -> bool + Copy {
    move |action| action.action_type() == op.request_type()
}

/// Await a ledger or wallet call, stopping early if the saga is cancelled
pub(crate) async fn call<T, E, F>(ctx: &Ctx, future: F) -> Result<T, TaskError>
where
    F: Future<Output = Result<T, E>>,
    E: Into<BoxError>,
{
    ctx.call(future).await?.map_err(TaskError::other)
}

pub(crate) fn decode<T: DeserializeOwned>(raw: &[u8]) -> Result<T, TaskError> {
    serde_json::from_slice(raw).map_err(|err| TaskError::other(ChainError::from(err)))
}

pub(crate) fn encode<T: Serialize>(value: &T) -> Result<Vec<u8>, TaskError> {
    serde_json::to_vec(value).map_err(|err| TaskError::other(ChainError::from(err)))
}

pub(crate) fn fail(error: FriendlyError) -> TaskError {
    TaskError::other(error)
}

/// Run `work`; on error dispatch the action `failure` builds from the friendly error.
///
/// Cancellation is passed through untouched.
pub(crate) async fn guarded<W, F>(
    ctx: &Ctx,
    services: &Services,
    work: W,
    failure: F,
) -> Result<(), TaskError>
where
    W: Future<Output = Result<(), TaskError>>,
    F: FnOnce(FriendlyError) -> AppAction + Send,
{
    let err: BoxError = match work.await {
        Ok(()) => return Ok(()),
        Err(err) if err.is_shutdown() => return Err(err),
        Err(TaskError::Other(err)) => err,
        Err(err) => Box::new(err),
    };
    let action = services
        .errors
        .handle(err)
        .on_any_error(failure)
        .process()?;
    ctx.put(action)
}
