//! School connectivity contracts on a fact ledger
//!
//! Schools, ISPs and the contracts between them are stored as facts on
//! passports. Both parties report measured connection speeds against a
//! contract, and the school's reports carry a connectivity score.
//!
//! All loading and writing goes through async-dispatch: every operation is an
//! [`AsyncOp`](async_dispatch::AsyncOp) whose phases are reduced into
//! [`RootState`], with the ledger work done by the sagas in [`sagas`].
//!
//! ```ignore
//! let ledger = Arc::new(InMemoryLedger::load_fixture("fixtures/demo.json")?);
//! let services = Services::new(ledger.clone(), ledger, config.addresses()?);
//! let mut runtime = build_runtime(&services, &config);
//!
//! runtime.enqueue(AppAction::SchoolLoadAll(LOAD_SCHOOLS.init((), CacheOptions::none())));
//! runtime.run_until(|a| LOAD_SCHOOLS.matches(a.action_type(), Phases::SETTLED)).await;
//! ```

pub mod action;
pub mod chain;
pub mod config;
pub mod errors;
pub mod memory;
pub mod models;
pub mod reducer;
pub mod rpc;
pub mod sagas;
pub mod score;
pub mod services;
pub mod state;
pub mod tx;

use async_dispatch::{
    ActionLogConfig, ActionLogEntry, ActionLoggerConfig, ActionLoggerMiddleware,
    StoreWithMiddleware,
};

pub use action::AppAction;
pub use config::{load_config, AppConfig};
pub use services::{Addresses, Services};
pub use state::RootState;

pub type AppStore = StoreWithMiddleware<RootState, AppAction, ActionLoggerMiddleware>;

pub type AppRuntime = sagas::Runtime<AppStore>;

/// Action logger configured from the `[log]` section
pub fn action_logger(config: &AppConfig) -> ActionLoggerMiddleware {
    let filter = ActionLoggerConfig::new(
        config.log.actions_include.as_deref(),
        config.log.actions_exclude.as_deref(),
    );
    ActionLoggerMiddleware::with_log(ActionLogConfig::new(config.log.action_log_capacity, filter))
}

/// Runtime with the root reducer, the action logger and every saga spawned.
///
/// Must be called inside a tokio runtime.
pub fn build_runtime(services: &Services, config: &AppConfig) -> AppRuntime {
    let store = StoreWithMiddleware::new(
        RootState::default(),
        reducer::root_reducer(),
        action_logger(config),
    );
    let mut runtime =
        AppRuntime::from_store(store).with_broadcast_capacity(config.runtime.broadcast_capacity);
    sagas::spawn_all(&mut runtime, services);
    runtime
}

/// The last `count` actions kept by the action logger, oldest first
pub fn recent_actions(runtime: &AppRuntime, count: usize) -> Vec<ActionLogEntry> {
    let Some(log) = runtime.store().middleware().log() else {
        return Vec::new();
    };
    let mut entries: Vec<_> = log.recent(count).cloned().collect();
    entries.reverse();
    entries
}
