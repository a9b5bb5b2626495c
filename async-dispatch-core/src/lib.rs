//! Core traits and types for async-dispatch
//!
//! This crate provides a Redux-style state container with a saga runtime and
//! a five-phase async action abstraction for cached data loading.
//!
//! # Core Concepts
//!
//! - **Action**: Events that describe state changes
//! - **AsyncOp / AsyncAction**: init, request, success, failure and
//!   invalidate phases of one asynchronous operation
//! - **AsyncState**: per-entity fetch status, error and freshness
//! - **ReducerBuilder**: maps action types (and async phases) onto state mutations
//! - **SagaRuntime**: dispatch loop hosting the store and the sagas observing it
//! - **init_dispatcher**: turns init actions into requests or cached successes
//!
//! # Basic Example
//!
//! ```ignore
//! use async_dispatch_core::prelude::*;
//!
//! const LOAD_CONTRACT: AsyncOp<String, Contract> = async_op!("contract", "LOAD");
//!
//! #[derive(Action, Clone, Debug)]
//! enum Action {
//!     #[action(async_op)]
//!     ContractLoad(AsyncAction<String, Contract>),
//! }
//!
//! let reducer = ReducerBuilder::<AppState, Action>::new()
//!     .add_async(
//!         LOAD_CONTRACT,
//!         |a| match a { Action::ContractLoad(x) => Some(x) },
//!         |s| &mut s.contracts,
//!         Some(|id: &String| subpath![id.clone()]),
//!     )
//!     .build();
//!
//! let mut runtime = SagaRuntime::new(AppState::default(), reducer);
//! runtime.spawn(init_dispatcher);
//! runtime.spawn(|ctx| take_every_latest(ctx, is_load_request, key_of, load_contract));
//!
//! runtime.enqueue(Action::ContractLoad(LOAD_CONTRACT.init("c1".into(), CacheOptions::timeout(60))));
//! runtime.run(|_| false).await;
//! ```

pub mod action;
pub mod async_action;
pub mod async_state;
pub mod error;
pub mod init_dispatcher;
pub mod logging;
pub mod path;
pub mod reducer_builder;
pub mod runtime;
pub mod saga;
pub mod store;
pub mod subscriptions;
pub mod tasks;
pub mod testing;

// Core trait exports
pub use action::{Action, ActionCategory, ActionSummary, ACTION_PREFIX};

// Async action exports
pub use async_action::{
    decide_init, AsyncAction, AsyncActionSet, AsyncOp, AsyncPhase, AsyncSubtype, CacheOptions,
    CacheTimeout, InitDecision, Phases, Timestamp,
};
pub use async_state::AsyncState;
pub use path::{AsyncMap, AsyncNode, PathKey, SubPath};

// Error exports
pub use error::{
    find_friendly, BoxError, ErrorClassifier, ErrorCode, ErrorCodeExtractor, ErrorHandler,
    FriendlyError, HandlerConfigError, MessageRetriever, SOMETHING_UNEXPECTED,
};

// Store exports
pub use reducer_builder::{BuiltReducer, ReducerBuilder};
pub use store::{DispatchStore, Middleware, Reducer, Store, StoreWithMiddleware};

// Runtime exports
pub use init_dispatcher::init_dispatcher;
pub use runtime::SagaRuntime;
pub use saga::{take_every, take_every_latest, take_latest, SagaContext, TaskError};
pub use subscriptions::{SubKey, Subscriptions};
pub use tasks::{KeyedTasks, TaskKey};

// Logging exports
pub use logging::{
    ActionLog, ActionLogConfig, ActionLogEntry, ActionLoggerConfig, ActionLoggerMiddleware,
};

// Testing exports
pub use testing::TestHarness;

#[cfg(feature = "testing-time")]
pub use testing::{advance_time, pause_time, resume_time};

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::action::{Action, ActionCategory, ActionSummary};
    pub use crate::async_action::{
        AsyncAction, AsyncActionSet, AsyncOp, AsyncPhase, AsyncSubtype, CacheOptions, Phases,
    };
    pub use crate::async_state::AsyncState;
    pub use crate::error::{ErrorClassifier, ErrorCode, FriendlyError};
    pub use crate::init_dispatcher::init_dispatcher;
    pub use crate::path::{AsyncMap, AsyncNode, PathKey, SubPath};
    pub use crate::reducer_builder::{BuiltReducer, ReducerBuilder};
    pub use crate::runtime::SagaRuntime;
    pub use crate::saga::{take_every, take_every_latest, take_latest, SagaContext, TaskError};
    pub use crate::store::{DispatchStore, Middleware, Reducer, Store, StoreWithMiddleware};
    pub use crate::subscriptions::{SubKey, Subscriptions};
    pub use crate::{async_op, subpath};
}
