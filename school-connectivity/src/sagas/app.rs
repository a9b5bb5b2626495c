use async_dispatch::{take_latest, DispatchStore, TaskError};

use super::{Ctx, Runtime};
use crate::action::{AppAction, APP_BOOTSTRAPPED};
use crate::state::RootState;

pub fn spawn<St: DispatchStore<RootState, AppAction>>(runtime: &mut Runtime<St>) {
    runtime.spawn(|ctx| {
        take_latest(
            ctx,
            |action: &AppAction| matches!(action, AppAction::AppBootstrapped),
            bootstrapped,
        )
    });
}

async fn bootstrapped(ctx: Ctx, _action: AppAction) -> Result<(), TaskError> {
    let ready = ctx.select_state(|s| s.app.is_bootstrapped);
    tracing::info!(action = APP_BOOTSTRAPPED, ready, "App bootstrapped");
    Ok(())
}
