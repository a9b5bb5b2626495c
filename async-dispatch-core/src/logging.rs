//! Action logging with pattern-based filtering and in-memory storage
//!
//! Filters match the fully qualified action type (`mth/contract/LOAD_REQUEST`),
//! so a module or a phase can be selected with a glob.
//!
//! # Example
//!
//! ```ignore
//! use async_dispatch_core::logging::{ActionLogConfig, ActionLoggerConfig, ActionLoggerMiddleware};
//!
//! // Everything from the contract module except init actions (tracing only)
//! let config = ActionLoggerConfig::new(Some("mth/contract/*"), Some("*_INIT"));
//! let middleware = ActionLoggerMiddleware::new(config);
//!
//! // Also keep the latest entries in memory
//! let middleware = ActionLoggerMiddleware::with_log(ActionLogConfig::default());
//! if let Some(log) = middleware.log() {
//!     for entry in log.recent(10) {
//!         println!("{} {}", entry.elapsed_display(), entry.action_type);
//!     }
//! }
//! ```

use std::collections::VecDeque;
use std::time::Instant;

use crate::action::ActionSummary;
use crate::store::Middleware;

/// Configuration for action logging with glob pattern filtering.
///
/// Patterns support:
/// - `*` matches any sequence of characters
/// - `?` matches any single character
/// - Literal text matches exactly
///
/// # Examples
///
/// - `mth/isp/*` matches every ISP action
/// - `*_FAILURE` matches every failure phase
/// - `mth/app/APP_BOOTSTRAPPED` matches only that action
#[derive(Debug, Clone, Default)]
pub struct ActionLoggerConfig {
    /// If non-empty, only log actions matching these patterns
    pub include_patterns: Vec<String>,
    /// Exclude actions matching these patterns (applied after include)
    pub exclude_patterns: Vec<String>,
}

impl ActionLoggerConfig {
    /// Create a new config from comma-separated pattern strings
    ///
    /// # Example
    /// ```
    /// use async_dispatch_core::logging::ActionLoggerConfig;
    ///
    /// let config = ActionLoggerConfig::new(Some("mth/contract/*"), Some("*_INIT"));
    /// assert!(config.should_log("mth/contract/LOAD_REQUEST"));
    /// assert!(!config.should_log("mth/contract/LOAD_INIT"));
    /// assert!(!config.should_log("mth/isp/LOAD_REQUEST"));
    /// ```
    pub fn new(include: Option<&str>, exclude: Option<&str>) -> Self {
        Self {
            include_patterns: include.map(split_patterns).unwrap_or_default(),
            exclude_patterns: exclude.map(split_patterns).unwrap_or_default(),
        }
    }

    /// Create a config with specific pattern vectors
    pub fn with_patterns(include: Vec<String>, exclude: Vec<String>) -> Self {
        Self {
            include_patterns: include,
            exclude_patterns: exclude,
        }
    }

    /// Check if an action type should be logged based on include/exclude patterns
    pub fn should_log(&self, action_type: &str) -> bool {
        if !self.include_patterns.is_empty()
            && !self
                .include_patterns
                .iter()
                .any(|p| glob_match(p, action_type))
        {
            return false;
        }

        !self
            .exclude_patterns
            .iter()
            .any(|p| glob_match(p, action_type))
    }
}

fn split_patterns(s: &str) -> Vec<String> {
    s.split(',')
        .map(str::trim)
        .filter(|p| !p.is_empty())
        .map(String::from)
        .collect()
}

/// An entry in the action log
#[derive(Debug, Clone)]
pub struct ActionLogEntry {
    /// Variant name (from Action::name())
    pub name: &'static str,
    /// Fully qualified type (from Action::action_type())
    pub action_type: &'static str,
    /// Summary representation (from ActionSummary::summary())
    pub summary: String,
    pub timestamp: Instant,
    /// Sequence number for ordering
    pub sequence: u64,
    /// Whether the action caused a state change (set after reducer runs)
    pub state_changed: Option<bool>,
}

impl ActionLogEntry {
    pub fn new(
        name: &'static str,
        action_type: &'static str,
        summary: String,
        sequence: u64,
    ) -> Self {
        Self {
            name,
            action_type,
            summary,
            timestamp: Instant::now(),
            sequence,
            state_changed: None,
        }
    }

    /// Time since this action was logged
    pub fn elapsed(&self) -> std::time::Duration {
        self.timestamp.elapsed()
    }

    /// Format the elapsed time for display (e.g., "2.3s", "150ms")
    pub fn elapsed_display(&self) -> String {
        let elapsed = self.elapsed();
        if elapsed.as_secs() >= 1 {
            format!("{:.1}s", elapsed.as_secs_f64())
        } else {
            format!("{}ms", elapsed.as_millis())
        }
    }
}

/// Configuration for the action log ring buffer
#[derive(Debug, Clone)]
pub struct ActionLogConfig {
    /// Maximum number of entries to keep
    pub capacity: usize,
    pub filter: ActionLoggerConfig,
}

impl Default for ActionLogConfig {
    fn default() -> Self {
        Self {
            capacity: 100,
            filter: ActionLoggerConfig::default(),
        }
    }
}

impl ActionLogConfig {
    pub fn new(capacity: usize, filter: ActionLoggerConfig) -> Self {
        Self { capacity, filter }
    }
}

/// In-memory ring buffer for storing recent actions
///
/// Older entries are discarded when capacity is reached.
#[derive(Debug, Clone)]
pub struct ActionLog {
    entries: VecDeque<ActionLogEntry>,
    config: ActionLogConfig,
    next_sequence: u64,
}

impl Default for ActionLog {
    fn default() -> Self {
        Self::new(ActionLogConfig::default())
    }
}

impl ActionLog {
    pub fn new(config: ActionLogConfig) -> Self {
        Self {
            entries: VecDeque::with_capacity(config.capacity),
            config,
            next_sequence: 0,
        }
    }

    /// Log an action (if it passes the filter)
    ///
    /// Returns the entry if it was logged, None if filtered out.
    pub fn log<A: ActionSummary>(&mut self, action: &A) -> Option<&ActionLogEntry> {
        let action_type = action.action_type();
        if !self.config.filter.should_log(action_type) {
            return None;
        }

        let entry = ActionLogEntry::new(
            action.name(),
            action_type,
            action.summary(),
            self.next_sequence,
        );
        self.next_sequence += 1;

        if self.entries.len() >= self.config.capacity {
            self.entries.pop_front();
        }

        self.entries.push_back(entry);
        self.entries.back()
    }

    /// Update the last entry with state_changed info (called after reducer)
    pub fn update_last_state_changed(&mut self, changed: bool) {
        if let Some(entry) = self.entries.back_mut() {
            entry.state_changed = Some(changed);
        }
    }

    /// Get all entries (oldest first)
    pub fn entries(&self) -> impl Iterator<Item = &ActionLogEntry> {
        self.entries.iter()
    }

    /// Get the most recent N entries (newest first)
    pub fn recent(&self, count: usize) -> impl Iterator<Item = &ActionLogEntry> {
        self.entries.iter().rev().take(count)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }
}

/// Middleware that logs actions with configurable pattern filtering.
///
/// Logs through `tracing::debug!()` and optionally keeps an [`ActionLog`].
#[derive(Debug, Clone)]
pub struct ActionLoggerMiddleware {
    config: ActionLoggerConfig,
    log: Option<ActionLog>,
    /// Tracks whether the last action was logged (for state_changed updates)
    last_action_logged: bool,
    active: bool,
}

impl ActionLoggerMiddleware {
    /// Tracing only, no in-memory storage
    pub fn new(config: ActionLoggerConfig) -> Self {
        Self {
            config,
            log: None,
            last_action_logged: false,
            active: true,
        }
    }

    /// Create middleware with in-memory storage
    pub fn with_log(config: ActionLogConfig) -> Self {
        Self {
            config: config.filter.clone(),
            log: Some(ActionLog::new(config)),
            last_action_logged: false,
            active: true,
        }
    }

    /// Create with no filtering (logs all actions), tracing only
    pub fn log_all() -> Self {
        Self::new(ActionLoggerConfig::default())
    }

    /// Set whether the middleware is active.
    ///
    /// When inactive, all methods are no-ops.
    pub fn active(mut self, active: bool) -> Self {
        self.active = active;
        self
    }

    pub fn is_active(&self) -> bool {
        self.active
    }

    /// Get the action log (if storage is enabled)
    pub fn log(&self) -> Option<&ActionLog> {
        self.log.as_ref()
    }

    pub fn config(&self) -> &ActionLoggerConfig {
        &self.config
    }
}

impl<A: ActionSummary> Middleware<A> for ActionLoggerMiddleware {
    fn before(&mut self, action: &A) {
        if !self.active {
            return;
        }

        let action_type = action.action_type();
        if self.config.should_log(action_type) {
            tracing::debug!(action = %action_type, summary = %action.summary(), "action");
        }

        self.last_action_logged = false;
        if let Some(ref mut log) = self.log {
            if log.log(action).is_some() {
                self.last_action_logged = true;
            }
        }
    }

    fn after(&mut self, _action: &A, state_changed: bool) {
        if !self.active {
            return;
        }

        // Only update state_changed if this action was actually logged
        if self.last_action_logged {
            if let Some(ref mut log) = self.log {
                log.update_last_state_changed(state_changed);
            }
        }
    }
}

/// Simple glob pattern matching supporting `*` and `?`.
///
/// - `*` matches zero or more characters
/// - `?` matches exactly one character
pub fn glob_match(pattern: &str, text: &str) -> bool {
    let pattern: Vec<char> = pattern.chars().collect();
    let text: Vec<char> = text.chars().collect();

    let mut pi = 0;
    let mut ti = 0;
    let mut star_pi = None;
    let mut star_ti = 0;

    while ti < text.len() {
        if pi < pattern.len() && (pattern[pi] == '?' || pattern[pi] == text[ti]) {
            pi += 1;
            ti += 1;
        } else if pi < pattern.len() && pattern[pi] == '*' {
            star_pi = Some(pi);
            star_ti = ti;
            pi += 1;
        } else if let Some(spi) = star_pi {
            pi = spi + 1;
            star_ti += 1;
            ti = star_ti;
        } else {
            return false;
        }
    }

    while pi < pattern.len() && pattern[pi] == '*' {
        pi += 1;
    }

    pi == pattern.len()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::async_action::{AsyncAction, AsyncOp, CacheOptions};
    use crate::async_op;

    const LOAD: AsyncOp<String, u32> = async_op!("contract", "LOAD");

    #[derive(Clone, Debug)]
    enum TestAction {
        Load(AsyncAction<String, u32>),
        Bootstrapped,
    }

    impl crate::Action for TestAction {
        fn name(&self) -> &'static str {
            match self {
                TestAction::Load(_) => "ContractLoad",
                TestAction::Bootstrapped => "AppBootstrapped",
            }
        }

        fn action_type(&self) -> &'static str {
            match self {
                TestAction::Load(a) => a.action_type(),
                TestAction::Bootstrapped => "mth/app/APP_BOOTSTRAPPED",
            }
        }
    }

    impl ActionSummary for TestAction {}

    fn init() -> TestAction {
        TestAction::Load(LOAD.init("c1".into(), CacheOptions::none()))
    }

    fn request() -> TestAction {
        TestAction::Load(LOAD.request("c1".into(), None))
    }

    #[test]
    fn test_glob_match() {
        assert!(glob_match("mth/contract/*", "mth/contract/LOAD_INIT"));
        assert!(glob_match("*_FAILURE", "mth/isp/LOAD_ALL_FAILURE"));
        assert!(glob_match("mth/???/*", "mth/isp/LOAD"));
        assert!(!glob_match("mth/???/*", "mth/school/LOAD"));
        assert!(!glob_match("mth/app/APP", "mth/app/APP_BOOTSTRAPPED"));
    }

    #[test]
    fn test_config_include_and_exclude() {
        let config = ActionLoggerConfig::new(Some("mth/contract/*, mth/app/*"), Some("*_INIT"));
        assert!(config.should_log("mth/app/APP_BOOTSTRAPPED"));
        assert!(config.should_log("mth/contract/LOAD_SUCCESS"));
        assert!(!config.should_log("mth/contract/LOAD_INIT"));
        assert!(!config.should_log("mth/school/LOAD_SUCCESS"));
        assert!(ActionLoggerConfig::default().should_log("anything"));
    }

    #[test]
    fn test_action_log_records_type() {
        let mut log = ActionLog::default();
        log.log(&request());

        let entry = log.entries().next().expect("entry");
        assert_eq!(entry.name, "ContractLoad");
        assert_eq!(entry.action_type, "mth/contract/LOAD_REQUEST");
        assert_eq!(entry.sequence, 0);
    }

    #[test]
    fn test_action_log_capacity() {
        let mut log = ActionLog::new(ActionLogConfig::new(3, ActionLoggerConfig::default()));
        for _ in 0..4 {
            log.log(&TestAction::Bootstrapped);
        }

        assert_eq!(log.len(), 3);
        assert_eq!(log.entries().next().map(|e| e.sequence), Some(1));
        let newest: Vec<_> = log.recent(2).map(|e| e.sequence).collect();
        assert_eq!(newest, vec![3, 2]);
    }

    #[test]
    fn test_middleware_filtered_action_does_not_update_state_changed() {
        let mut middleware = ActionLoggerMiddleware::with_log(ActionLogConfig::new(
            10,
            ActionLoggerConfig::new(None, Some("*_INIT")),
        ));

        middleware.before(&request());
        middleware.after(&request(), true);

        middleware.before(&init());
        middleware.after(&init(), false);

        let log = middleware.log().expect("log");
        assert_eq!(log.len(), 1);
        assert_eq!(log.entries().next().and_then(|e| e.state_changed), Some(true));
    }

    #[test]
    fn test_inactive_middleware_is_noop() {
        let mut middleware =
            ActionLoggerMiddleware::with_log(ActionLogConfig::default()).active(false);
        middleware.before(&TestAction::Bootstrapped);
        assert!(middleware.log().is_some_and(ActionLog::is_empty));
    }
}
