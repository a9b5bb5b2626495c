//! Five-phase asynchronous actions
//!
//! An asynchronous operation (load a contract, create an ISP, ...) is
//! described once by an [`AsyncOp`] and dispatched as [`AsyncAction`]s in one
//! of five phases:
//!
//! | phase      | type string            | emitted by                        |
//! |------------|------------------------|-----------------------------------|
//! | init       | `<base>_INIT`          | callers wanting the data          |
//! | request    | `<base>_REQUEST`       | the init dispatcher, when stale   |
//! | success    | `<base>_SUCCESS`       | the domain saga, or the cache     |
//! | failure    | `<base>_FAILURE`       | the domain saga                   |
//! | invalidate | `<base>_INVALIDATE_DATA` | callers dropping freshness      |
//!
//! # Example
//!
//! ```
//! use async_dispatch_core::{async_op, subpath, AsyncOp, AsyncSubtype, CacheOptions};
//!
//! const LOAD: AsyncOp<String, u32> = async_op!("contract", "LOAD");
//!
//! let init = LOAD.init("c1".to_string(), CacheOptions::timeout(-1));
//! assert_eq!(init.action_type(), "mth/contract/LOAD_INIT");
//!
//! let request = LOAD.request("c1".to_string(), Some(subpath!["c1"]));
//! assert_eq!(request.subtype(), AsyncSubtype::Request);
//! ```

use std::fmt;
use std::marker::PhantomData;

use bitflags::bitflags;
use chrono::{DateTime, Utc};

use crate::action::Action;
use crate::async_state::AsyncState;
use crate::error::FriendlyError;
use crate::path::SubPath;

/// Point in time used for cache decisions
pub type Timestamp = DateTime<Utc>;

/// Phase of an async action
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum AsyncSubtype {
    Init = 0,
    Request = 1,
    Success = 2,
    Failure = 3,
    Invalidate = 4,
}

impl AsyncSubtype {
    pub const ALL: [AsyncSubtype; 5] = [
        AsyncSubtype::Init,
        AsyncSubtype::Request,
        AsyncSubtype::Success,
        AsyncSubtype::Failure,
        AsyncSubtype::Invalidate,
    ];

    /// Suffix appended to the base type string
    pub fn suffix(self) -> &'static str {
        match self {
            AsyncSubtype::Init => "INIT",
            AsyncSubtype::Request => "REQUEST",
            AsyncSubtype::Success => "SUCCESS",
            AsyncSubtype::Failure => "FAILURE",
            AsyncSubtype::Invalidate => "INVALIDATE_DATA",
        }
    }

    pub fn phase(self) -> Phases {
        match self {
            AsyncSubtype::Init => Phases::INIT,
            AsyncSubtype::Request => Phases::REQUEST,
            AsyncSubtype::Success => Phases::SUCCESS,
            AsyncSubtype::Failure => Phases::FAILURE,
            AsyncSubtype::Invalidate => Phases::INVALIDATE,
        }
    }
}

impl fmt::Display for AsyncSubtype {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            AsyncSubtype::Init => "init",
            AsyncSubtype::Request => "request",
            AsyncSubtype::Success => "success",
            AsyncSubtype::Failure => "failure",
            AsyncSubtype::Invalidate => "invalidate",
        };
        f.write_str(s)
    }
}

bitflags! {
    /// Set of phases, used to match async actions in sagas
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct Phases: u8 {
        const INIT = 1 << 0;
        const REQUEST = 1 << 1;
        const SUCCESS = 1 << 2;
        const FAILURE = 1 << 3;
        const INVALIDATE = 1 << 4;
        const SETTLED = Self::SUCCESS.bits() | Self::FAILURE.bits();
    }
}

impl Phases {
    pub fn includes(self, subtype: AsyncSubtype) -> bool {
        self.contains(subtype.phase())
    }
}

/// How long cached data stays fresh
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum CacheTimeout {
    /// Always fetch
    #[default]
    Refetch,
    /// Never refetch once something was fetched
    Forever,
    /// Refetch once this many seconds have elapsed since the last success
    After(u64),
}

impl CacheTimeout {
    /// Normalize a raw timeout in seconds: `-1` is forever, positive values
    /// are kept, zero and every other negative value mean refetch.
    pub fn from_seconds(raw: i64) -> Self {
        match raw {
            -1 => CacheTimeout::Forever,
            s if s > 0 => CacheTimeout::After(s.unsigned_abs()),
            _ => CacheTimeout::Refetch,
        }
    }
}

/// Options accepted by [`AsyncOp::init`]
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct CacheOptions {
    pub cache_timeout: Option<i64>,
}

impl CacheOptions {
    pub fn none() -> Self {
        Self::default()
    }

    pub fn timeout(seconds: i64) -> Self {
        Self {
            cache_timeout: Some(seconds),
        }
    }

    pub fn resolve(self) -> CacheTimeout {
        self.cache_timeout
            .map(CacheTimeout::from_seconds)
            .unwrap_or_default()
    }
}

/// Outcome of inspecting the cache for an init action
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum InitDecision {
    /// A request is already in flight, emit nothing
    AlreadyFetching,
    /// Emit a request
    Fetch,
    /// Replay the cached data as a success
    FromCache,
}

/// Decide what an init action turns into, given the state it targets.
pub fn decide_init<T>(
    current: Option<&AsyncState<T>>,
    timeout: CacheTimeout,
    now: DateTime<Utc>,
) -> InitDecision {
    let Some(current) = current else {
        return InitDecision::Fetch;
    };
    if current.is_fetching {
        return InitDecision::AlreadyFetching;
    }
    let Some(timestamp) = current.timestamp else {
        return InitDecision::Fetch;
    };
    if current.error.is_some() || current.data.is_none() {
        return InitDecision::Fetch;
    }

    match timeout {
        CacheTimeout::Refetch => InitDecision::Fetch,
        CacheTimeout::Forever => InitDecision::FromCache,
        CacheTimeout::After(seconds) => {
            let elapsed = (now - timestamp).num_seconds();
            let limit = i64::try_from(seconds).unwrap_or(i64::MAX);
            if elapsed >= limit {
                InitDecision::Fetch
            } else {
                InitDecision::FromCache
            }
        }
    }
}

/// Descriptor of an asynchronous operation: base type plus five phase types.
///
/// Build it with [`async_op!`](crate::async_op) so the type strings are
/// assembled at compile time.
pub struct AsyncOp<Req, Ok> {
    base: &'static str,
    types: [&'static str; 5],
    _marker: PhantomData<fn() -> (Req, Ok)>,
}

impl<Req, Ok> Clone for AsyncOp<Req, Ok> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<Req, Ok> Copy for AsyncOp<Req, Ok> {}

impl<Req, Ok> fmt::Debug for AsyncOp<Req, Ok> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("AsyncOp").field(&self.base).finish()
    }
}

impl<Req, Ok> PartialEq for AsyncOp<Req, Ok> {
    fn eq(&self, other: &Self) -> bool {
        self.base == other.base
    }
}

impl<Req, Ok> Eq for AsyncOp<Req, Ok> {}

impl<Req, Ok> AsyncOp<Req, Ok> {
    #[doc(hidden)]
    pub const fn from_types(base: &'static str, types: [&'static str; 5]) -> Self {
        Self {
            base,
            types,
            _marker: PhantomData,
        }
    }

    pub fn base(&self) -> &'static str {
        self.base
    }

    pub fn type_of(&self, subtype: AsyncSubtype) -> &'static str {
        self.types[subtype as usize]
    }

    pub fn init_type(&self) -> &'static str {
        self.type_of(AsyncSubtype::Init)
    }

    pub fn request_type(&self) -> &'static str {
        self.type_of(AsyncSubtype::Request)
    }

    pub fn success_type(&self) -> &'static str {
        self.type_of(AsyncSubtype::Success)
    }

    pub fn failure_type(&self) -> &'static str {
        self.type_of(AsyncSubtype::Failure)
    }

    pub fn invalidate_type(&self) -> &'static str {
        self.type_of(AsyncSubtype::Invalidate)
    }

    /// Phase of an action type string belonging to this op
    pub fn subtype_of(&self, action_type: &str) -> Option<AsyncSubtype> {
        AsyncSubtype::ALL
            .into_iter()
            .find(|s| self.type_of(*s) == action_type)
    }

    /// Whether `action_type` is one of `phases` of this op
    pub fn matches(&self, action_type: &str, phases: Phases) -> bool {
        self.subtype_of(action_type)
            .is_some_and(|s| phases.includes(s))
    }

    pub fn init(&self, payload: Req, options: CacheOptions) -> AsyncAction<Req, Ok> {
        self.with_phase(AsyncPhase::Init {
            payload,
            cache_timeout: options.resolve(),
            subpath: None,
            current: None,
        })
    }

    pub fn request(&self, payload: Req, subpath: Option<SubPath>) -> AsyncAction<Req, Ok> {
        self.with_phase(AsyncPhase::Request { payload, subpath })
    }

    pub fn success(&self, payload: Ok, subpath: Option<SubPath>) -> AsyncAction<Req, Ok> {
        self.with_phase(AsyncPhase::Success {
            payload,
            subpath,
            from_cache: false,
        })
    }

    pub fn failure(
        &self,
        error: FriendlyError,
        payload: Option<Req>,
        subpath: Option<SubPath>,
    ) -> AsyncAction<Req, Ok> {
        self.with_phase(AsyncPhase::Failure {
            error,
            payload,
            subpath,
        })
    }

    pub fn invalidate_data(&self, payload: Req, subpath: Option<SubPath>) -> AsyncAction<Req, Ok> {
        self.with_phase(AsyncPhase::Invalidate { payload, subpath })
    }

    fn with_phase(&self, phase: AsyncPhase<Req, Ok>) -> AsyncAction<Req, Ok> {
        AsyncAction { op: *self, phase }
    }
}

/// Define an [`AsyncOp`] constant: `async_op!("contract", "LOAD")` gives the
/// base `mth/contract/LOAD` and the five phase types derived from it.
#[macro_export]
macro_rules! async_op {
    ($module:literal, $name:literal) => {
        $crate::AsyncOp::from_types(
            concat!("mth/", $module, "/", $name),
            [
                concat!("mth/", $module, "/", $name, "_INIT"),
                concat!("mth/", $module, "/", $name, "_REQUEST"),
                concat!("mth/", $module, "/", $name, "_SUCCESS"),
                concat!("mth/", $module, "/", $name, "_FAILURE"),
                concat!("mth/", $module, "/", $name, "_INVALIDATE_DATA"),
            ],
        )
    };
}

/// Phase-specific content of an [`AsyncAction`]
#[derive(Clone, Debug, PartialEq)]
pub enum AsyncPhase<Req, Ok> {
    Init {
        payload: Req,
        cache_timeout: CacheTimeout,
        /// Filled by the reducer builder
        subpath: Option<SubPath>,
        /// Snapshot of the targeted state, filled by the reducer builder
        current: Option<AsyncState<Ok>>,
    },
    Request {
        payload: Req,
        subpath: Option<SubPath>,
    },
    Success {
        payload: Ok,
        subpath: Option<SubPath>,
        from_cache: bool,
    },
    Failure {
        error: FriendlyError,
        payload: Option<Req>,
        subpath: Option<SubPath>,
    },
    Invalidate {
        payload: Req,
        subpath: Option<SubPath>,
    },
}

/// One dispatched phase of an asynchronous operation
#[derive(Clone, Debug, PartialEq)]
pub struct AsyncAction<Req, Ok> {
    op: AsyncOp<Req, Ok>,
    pub phase: AsyncPhase<Req, Ok>,
}

impl<Req, Ok> AsyncAction<Req, Ok> {
    pub fn op(&self) -> AsyncOp<Req, Ok> {
        self.op
    }

    pub fn subtype(&self) -> AsyncSubtype {
        match self.phase {
            AsyncPhase::Init { .. } => AsyncSubtype::Init,
            AsyncPhase::Request { .. } => AsyncSubtype::Request,
            AsyncPhase::Success { .. } => AsyncSubtype::Success,
            AsyncPhase::Failure { .. } => AsyncSubtype::Failure,
            AsyncPhase::Invalidate { .. } => AsyncSubtype::Invalidate,
        }
    }

    pub fn action_type(&self) -> &'static str {
        self.op.type_of(self.subtype())
    }

    pub fn subpath(&self) -> Option<&SubPath> {
        match &self.phase {
            AsyncPhase::Init { subpath, .. }
            | AsyncPhase::Request { subpath, .. }
            | AsyncPhase::Success { subpath, .. }
            | AsyncPhase::Failure { subpath, .. }
            | AsyncPhase::Invalidate { subpath, .. } => subpath.as_ref(),
        }
    }

    pub fn set_subpath(&mut self, path: SubPath) {
        match &mut self.phase {
            AsyncPhase::Init { subpath, .. }
            | AsyncPhase::Request { subpath, .. }
            | AsyncPhase::Success { subpath, .. }
            | AsyncPhase::Failure { subpath, .. }
            | AsyncPhase::Invalidate { subpath, .. } => *subpath = Some(path),
        }
    }

    /// Request-side payload (init, request, invalidate, and failure if attached)
    pub fn request_payload(&self) -> Option<&Req> {
        match &self.phase {
            AsyncPhase::Init { payload, .. }
            | AsyncPhase::Request { payload, .. }
            | AsyncPhase::Invalidate { payload, .. } => Some(payload),
            AsyncPhase::Failure { payload, .. } => payload.as_ref(),
            AsyncPhase::Success { .. } => None,
        }
    }

    pub fn success_payload(&self) -> Option<&Ok> {
        match &self.phase {
            AsyncPhase::Success { payload, .. } => Some(payload),
            _ => None,
        }
    }

    pub fn error(&self) -> Option<&FriendlyError> {
        match &self.phase {
            AsyncPhase::Failure { error, .. } => Some(error),
            _ => None,
        }
    }

    pub fn is_from_cache(&self) -> bool {
        matches!(
            self.phase,
            AsyncPhase::Success {
                from_cache: true,
                ..
            }
        )
    }

    /// Mark a success as replayed from the cache
    pub fn from_cache(mut self) -> Self {
        if let AsyncPhase::Success { from_cache, .. } = &mut self.phase {
            *from_cache = true;
        }
        self
    }

    /// Cache decision for an init action, `None` for other phases
    pub fn init_decision(&self, now: DateTime<Utc>) -> Option<InitDecision> {
        match &self.phase {
            AsyncPhase::Init {
                cache_timeout,
                current,
                ..
            } => Some(decide_init(current.as_ref(), *cache_timeout, now)),
            _ => None,
        }
    }
}

impl<Req: Clone, Ok: Clone> AsyncAction<Req, Ok> {
    /// Turn an init action into the request or cached success it stands for.
    ///
    /// Returns `None` for other phases and when a fetch is already running.
    pub fn resolve_init(&self, now: DateTime<Utc>) -> Option<Self> {
        let AsyncPhase::Init {
            payload,
            subpath,
            current,
            ..
        } = &self.phase
        else {
            return None;
        };

        match self.init_decision(now)? {
            InitDecision::AlreadyFetching => None,
            InitDecision::Fetch => Some(self.op.request(payload.clone(), subpath.clone())),
            InitDecision::FromCache => {
                let data = current.as_ref()?.data.clone()?;
                Some(self.op.success(data, subpath.clone()).from_cache())
            }
        }
    }
}

impl<Req, Ok> Action for AsyncAction<Req, Ok>
where
    Req: Clone + fmt::Debug + Send + Sync + 'static,
    Ok: Clone + fmt::Debug + Send + Sync + 'static,
{
    fn name(&self) -> &'static str {
        self.action_type()
    }
}

/// Action enums whose variants may wrap async actions.
///
/// Implemented by `#[derive(Action)]` for variants tagged `#[action(async_op)]`.
/// Plain variants report no subtype.
pub trait AsyncActionSet: Action {
    fn subtype(&self) -> Option<AsyncSubtype>;

    fn subpath(&self) -> Option<&SubPath>;

    fn async_error(&self) -> Option<&FriendlyError>;

    /// See [`AsyncAction::resolve_init`]
    fn resolve_init(&self, now: Timestamp) -> Option<Self>;
}

impl<Req, Ok> AsyncActionSet for AsyncAction<Req, Ok>
where
    Req: Clone + fmt::Debug + Send + Sync + 'static,
    Ok: Clone + fmt::Debug + Send + Sync + 'static,
{
    fn subtype(&self) -> Option<AsyncSubtype> {
        Some(AsyncAction::subtype(self))
    }

    fn subpath(&self) -> Option<&SubPath> {
        AsyncAction::subpath(self)
    }

    fn async_error(&self) -> Option<&FriendlyError> {
        self.error()
    }

    fn resolve_init(&self, now: Timestamp) -> Option<Self> {
        AsyncAction::resolve_init(self, now)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorCode;
    use crate::subpath;
    use chrono::Duration;

    const LOAD: AsyncOp<String, u32> = async_op!("contract", "LOAD");

    fn fetched_at(data: u32, at: DateTime<Utc>) -> AsyncState<u32> {
        AsyncState {
            timestamp: Some(at),
            is_fetched: true,
            data: Some(data),
            ..AsyncState::new()
        }
    }

    fn init_with(timeout: i64, current: Option<AsyncState<u32>>) -> AsyncAction<String, u32> {
        let mut action = LOAD.init("c1".into(), CacheOptions::timeout(timeout));
        if let AsyncPhase::Init { current: slot, .. } = &mut action.phase {
            *slot = current;
        }
        action.set_subpath(subpath!["c1"]);
        action
    }

    #[test]
    fn test_type_strings() {
        assert_eq!(LOAD.base(), "mth/contract/LOAD");
        assert_eq!(LOAD.init_type(), "mth/contract/LOAD_INIT");
        assert_eq!(LOAD.request_type(), "mth/contract/LOAD_REQUEST");
        assert_eq!(LOAD.success_type(), "mth/contract/LOAD_SUCCESS");
        assert_eq!(LOAD.failure_type(), "mth/contract/LOAD_FAILURE");
        assert_eq!(LOAD.invalidate_type(), "mth/contract/LOAD_INVALIDATE_DATA");
        assert_eq!(
            LOAD.subtype_of("mth/contract/LOAD_FAILURE"),
            Some(AsyncSubtype::Failure)
        );
        assert!(LOAD.matches("mth/contract/LOAD_SUCCESS", Phases::SETTLED));
        assert!(!LOAD.matches("mth/contract/LOAD_REQUEST", Phases::SETTLED));
    }

    #[test]
    fn test_creators_stamp_phase() {
        let failure = LOAD.failure(FriendlyError::from_code(ErrorCode::Timeout), None, None);
        assert_eq!(failure.subtype(), AsyncSubtype::Failure);
        assert_eq!(failure.error().map(|e| e.code), Some(ErrorCode::Timeout));
        assert_eq!(failure.name(), "mth/contract/LOAD_FAILURE");

        let success = LOAD.success(3, Some(subpath!["c1"]));
        assert!(!success.is_from_cache());
        assert_eq!(success.success_payload(), Some(&3));
    }

    #[test]
    fn test_cache_timeout_normalization() {
        assert_eq!(CacheTimeout::from_seconds(-1), CacheTimeout::Forever);
        assert_eq!(CacheTimeout::from_seconds(0), CacheTimeout::Refetch);
        assert_eq!(CacheTimeout::from_seconds(-7), CacheTimeout::Refetch);
        assert_eq!(CacheTimeout::from_seconds(30), CacheTimeout::After(30));
        assert_eq!(CacheOptions::none().resolve(), CacheTimeout::Refetch);
    }

    #[test]
    fn test_init_without_state_requests() {
        let request = init_with(-1, None).resolve_init(Utc::now()).expect("request");
        assert_eq!(request.subtype(), AsyncSubtype::Request);
        assert_eq!(request.subpath(), Some(&subpath!["c1"]));
        assert_eq!(request.request_payload().map(String::as_str), Some("c1"));
    }

    #[test]
    fn test_init_while_fetching_is_dropped() {
        let mut state = fetched_at(1, Utc::now());
        state.is_fetching = true;
        assert!(init_with(-1, Some(state)).resolve_init(Utc::now()).is_none());
    }

    #[test]
    fn test_init_forever_replays_cache() {
        let now = Utc::now();
        let state = fetched_at(7, now - Duration::days(30));
        let success = init_with(-1, Some(state)).resolve_init(now).expect("success");

        assert!(success.is_from_cache());
        assert_eq!(success.success_payload(), Some(&7));
        assert_eq!(success.subpath(), Some(&subpath!["c1"]));
    }

    #[test]
    fn test_init_timeout_window() {
        let now = Utc::now();

        let fresh = init_with(5, Some(fetched_at(1, now - Duration::seconds(3))));
        assert_eq!(fresh.init_decision(now), Some(InitDecision::FromCache));

        let stale = init_with(5, Some(fetched_at(1, now - Duration::seconds(10))));
        assert_eq!(stale.init_decision(now), Some(InitDecision::Fetch));

        let boundary = init_with(5, Some(fetched_at(1, now - Duration::seconds(5))));
        assert_eq!(boundary.init_decision(now), Some(InitDecision::Fetch));
    }

    #[test]
    fn test_init_after_error_or_invalidate_fetches() {
        let now = Utc::now();

        let mut errored = fetched_at(1, now);
        errored.error = Some(FriendlyError::from_code(ErrorCode::Unknown));
        assert_eq!(
            init_with(-1, Some(errored)).init_decision(now),
            Some(InitDecision::Fetch)
        );

        let mut invalidated = fetched_at(1, now);
        invalidated.invalidate();
        assert_eq!(
            init_with(-1, Some(invalidated)).init_decision(now),
            Some(InitDecision::Fetch)
        );
    }

    #[test]
    fn test_zero_timeout_always_fetches() {
        let now = Utc::now();
        let action = init_with(0, Some(fetched_at(1, now)));
        assert_eq!(action.init_decision(now), Some(InitDecision::Fetch));
    }

    #[test]
    fn test_resolve_init_ignores_other_phases() {
        assert!(LOAD.request("c1".into(), None).resolve_init(Utc::now()).is_none());
    }
}
