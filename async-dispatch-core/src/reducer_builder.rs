//! Declarative reducer assembly
//!
//! A [`ReducerBuilder`] collects handlers keyed by action type string and
//! wires the five phases of every async op onto a node of the state tree.
//!
//! ```ignore
//! let reducer = ReducerBuilder::<ContractState, AppAction>::new()
//!     .add_async(
//!         LOAD_CONTRACT,
//!         |a| match a { AppAction::ContractLoad(x) => Some(x), _ => None },
//!         |s| &mut s.loaded,
//!         Some(|req: &LoadContract| subpath![req.id.clone()]),
//!     )
//!     .build();
//! ```

use std::collections::HashMap;
use std::fmt;

use chrono::Utc;

use crate::action::Action;
use crate::async_action::{AsyncAction, AsyncOp, AsyncPhase};
use crate::path::{AsyncNode, SubPath};
use crate::store::Reducer;

type Handler<S, A> = Box<dyn Fn(&mut S, &mut A) -> bool + Send + Sync>;

/// Borrows the async action out of an application action enum
pub type Extract<A, Req, Ok> = fn(&mut A) -> Option<&mut AsyncAction<Req, Ok>>;

/// Selects the node under which an op keeps its states
pub type BaseSelector<S, N> = fn(&mut S) -> &mut N;

/// Derives the sub-path of an entity from the request payload
pub type SubpathGetter<Req> = fn(&Req) -> SubPath;

/// Incrementally registers handlers for state `S`
pub struct ReducerBuilder<S, A> {
    handlers: HashMap<&'static str, Vec<Handler<S, A>>>,
}

impl<S, A> Default for ReducerBuilder<S, A> {
    fn default() -> Self {
        Self {
            handlers: HashMap::new(),
        }
    }
}

impl<S, A> fmt::Debug for ReducerBuilder<S, A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut types: Vec<_> = self.handlers.keys().collect();
        types.sort();
        f.debug_struct("ReducerBuilder")
            .field("action_types", &types)
            .finish()
    }
}

impl<S: 'static, A: Action> ReducerBuilder<S, A> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a handler for `action_type`.
    ///
    /// Several handlers for the same type run in registration order.
    pub fn add<F>(mut self, action_type: &'static str, handler: F) -> Self
    where
        F: Fn(&mut S, &mut A) -> bool + Send + Sync + 'static,
    {
        self.handlers
            .entry(action_type)
            .or_default()
            .push(Box::new(handler));
        self
    }

    /// Register all five phases of `op` against the node chosen by `base`.
    ///
    /// Without `subpath_of` the node itself must be the targeted state (or
    /// every action must carry its own sub-path).
    pub fn add_async<Req, Ok, N>(
        self,
        op: AsyncOp<Req, Ok>,
        extract: Extract<A, Req, Ok>,
        base: BaseSelector<S, N>,
        subpath_of: Option<SubpathGetter<Req>>,
    ) -> Self
    where
        Req: 'static,
        Ok: Clone + 'static,
        N: AsyncNode<Ok> + 'static,
    {
        self.add(op.init_type(), move |state, action| {
            let Some(action) = extract(action) else {
                return mismatch(op.init_type());
            };
            let path = target_path(action, subpath_of);
            let snapshot = base(state).probe(&path).cloned();
            if let AsyncPhase::Init {
                subpath, current, ..
            } = &mut action.phase
            {
                *subpath = Some(path);
                *current = snapshot;
            }
            false
        })
        .add(op.request_type(), move |state, action| {
            let Some(action) = extract(action) else {
                return mismatch(op.request_type());
            };
            let path = target_path(action, subpath_of);
            let Some(target) = base(state).materialize(&path) else {
                return misconfigured(op.request_type(), &path);
            };
            target.begin_request();
            action.set_subpath(path);
            true
        })
        .add(op.success_type(), move |state, action| {
            let Some(action) = extract(action) else {
                return mismatch(op.success_type());
            };
            let path = target_path(action, subpath_of);
            let AsyncPhase::Success {
                payload,
                from_cache: false,
                ..
            } = &action.phase
            else {
                return false;
            };
            let Some(target) = base(state).materialize(&path) else {
                return misconfigured(op.success_type(), &path);
            };
            target.complete(payload.clone(), Utc::now());
            action.set_subpath(path);
            true
        })
        .add(op.failure_type(), move |state, action| {
            let Some(action) = extract(action) else {
                return mismatch(op.failure_type());
            };
            let path = target_path(action, subpath_of);
            let AsyncPhase::Failure { error, .. } = &action.phase else {
                return false;
            };
            let Some(target) = base(state).materialize(&path) else {
                return misconfigured(op.failure_type(), &path);
            };
            target.fail(error.clone(), Utc::now());
            action.set_subpath(path);
            true
        })
        .add(op.invalidate_type(), move |state, action| {
            let Some(action) = extract(action) else {
                return mismatch(op.invalidate_type());
            };
            let path = target_path(action, subpath_of);
            let Some(target) = base(state).materialize(&path) else {
                return misconfigured(op.invalidate_type(), &path);
            };
            target.invalidate();
            action.set_subpath(path);
            true
        })
    }

    /// Compose a builder for a sub-slice of `S`.
    ///
    /// Every handler of `builder` is registered here, running on `lens(state)`.
    pub fn slice<T: 'static>(
        mut self,
        lens: fn(&mut S) -> &mut T,
        builder: ReducerBuilder<T, A>,
    ) -> Self {
        for (action_type, handlers) in builder.handlers {
            let entry = self.handlers.entry(action_type).or_default();
            for handler in handlers {
                entry.push(Box::new(move |state: &mut S, action: &mut A| {
                    handler(lens(state), action)
                }));
            }
        }
        self
    }

    pub fn build(self) -> BuiltReducer<S, A> {
        BuiltReducer {
            handlers: self.handlers,
        }
    }
}

/// The reducer produced by [`ReducerBuilder::build`]
pub struct BuiltReducer<S, A> {
    handlers: HashMap<&'static str, Vec<Handler<S, A>>>,
}

impl<S, A> BuiltReducer<S, A> {
    /// Whether any handler is registered for `action_type`
    pub fn handles(&self, action_type: &str) -> bool {
        self.handlers.contains_key(action_type)
    }
}

impl<S, A> fmt::Debug for BuiltReducer<S, A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BuiltReducer")
            .field("action_types", &self.handlers.len())
            .finish()
    }
}

impl<S, A: Action> Reducer<S, A> for BuiltReducer<S, A> {
    fn reduce(&self, state: &mut S, action: &mut A) -> bool {
        let Some(handlers) = self.handlers.get(action.action_type()) else {
            return false;
        };
        let mut changed = false;
        for handler in handlers {
            changed |= handler(state, action);
        }
        changed
    }
}

fn target_path<Req, Ok>(
    action: &AsyncAction<Req, Ok>,
    subpath_of: Option<SubpathGetter<Req>>,
) -> SubPath {
    if let Some(path) = action.subpath() {
        return path.clone();
    }
    match (subpath_of, action.request_payload()) {
        (Some(getter), Some(payload)) => getter(payload),
        _ => SubPath::new(),
    }
}

fn mismatch(action_type: &str) -> bool {
    tracing::warn!(action_type, "Async handler received an action of another shape");
    false
}

fn misconfigured(action_type: &str, path: &SubPath) -> bool {
    tracing::warn!(action_type, %path, "Sub-path does not fit the registered state node");
    false
}
