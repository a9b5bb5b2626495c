//! Action traits for type-safe state mutations

use std::fmt::Debug;

/// Global prefix applied to every action type string built with [`async_op!`](crate::async_op)
/// and [`action_type!`](crate::action_type).
pub const ACTION_PREFIX: &str = "mth";

/// Marker trait for actions that can be dispatched to the store
///
/// Actions represent intents to change state. They should be:
/// - Clone: Actions are broadcast to every running saga after the reducer runs
/// - Debug: For debugging and logging
/// - Send + Sync + 'static: Sagas hold them across await points on other threads
///
/// Use `#[derive(Action)]` from `async-dispatch-macros` to auto-implement this trait.
pub trait Action: Clone + Debug + Send + Sync + 'static {
    /// Get the action name for logging and filtering
    fn name(&self) -> &'static str;

    /// Fully qualified action type used to key reducer handlers.
    ///
    /// Defaults to [`Action::name`]. Async actions report the type string of
    /// their current phase, e.g. `mth/contract/LOAD_REQUEST`.
    fn action_type(&self) -> &'static str {
        self.name()
    }
}

/// Short, human-oriented rendering of an action for logs.
///
/// The default uses `Debug`; override it for actions carrying large payloads.
pub trait ActionSummary: Action {
    fn summary(&self) -> String {
        format!("{:?}", self)
    }
}

/// Actions grouped by the module they belong to (`contract`, `isp`, ...).
///
/// Generated by `#[derive(Action)]` from the first PascalCase word of the
/// variant name, or from `#[action(category = "...")]`.
pub trait ActionCategory: Action {
    fn category(&self) -> Option<&'static str>;
}

/// Build a fully qualified plain action type: `mth/<module>/<NAME>`.
///
/// ```
/// use async_dispatch_core::action_type;
///
/// const BOOTSTRAPPED: &str = action_type!("app", "APP_BOOTSTRAPPED");
/// assert_eq!(BOOTSTRAPPED, "mth/app/APP_BOOTSTRAPPED");
/// ```
#[macro_export]
macro_rules! action_type {
    ($module:literal, $name:literal) => {
        concat!("mth/", $module, "/", $name)
    };
}
