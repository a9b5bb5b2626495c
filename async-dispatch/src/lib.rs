//! async-dispatch: Redux-style state, sagas and cached async actions
//!
//! State lives in a single store and only changes through dispatched
//! actions. Asynchronous work runs in sagas that observe committed actions,
//! and every data load goes through the five phases of an [`AsyncOp`] so that
//! fetch status, errors and cache freshness are tracked per entity.
//!
//! # Example
//! ```ignore
//! use async_dispatch::prelude::*;
//!
//! const LOAD_CONTRACT: AsyncOp<String, Contract> = async_op!("contract", "LOAD");
//!
//! #[derive(Action, Clone, Debug)]
//! #[action(infer_categories)]
//! enum AppAction {
//!     #[action(action_type = "mth/app/APP_BOOTSTRAPPED")]
//!     AppBootstrapped,
//!     #[action(async_op)]
//!     ContractLoad(AsyncAction<String, Contract>),
//! }
//! ```

// Re-export everything from core
pub use async_dispatch_core::*;

// Re-export derive macros
pub use async_dispatch_macros::Action;

/// Prelude for convenient imports
pub mod prelude {
    pub use async_dispatch_core::prelude::*;

    // Logging
    pub use async_dispatch_core::logging::{ActionLoggerConfig, ActionLoggerMiddleware};

    // Derive macros
    pub use async_dispatch_macros::Action;
}
