//! Per-entity record of fetch progress, errors and staleness

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;

use crate::error::FriendlyError;

/// State of one piece of asynchronously fetched data.
///
/// Only the reducer builder mutates it, in response to the
/// request / success / failure / invalidate phases of an async action.
/// `timestamp` is the time of the last genuine (not cache-replayed) success.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct AsyncState<T> {
    pub data: Option<T>,
    pub is_fetching: bool,
    pub is_fetched: bool,
    pub error: Option<FriendlyError>,
    pub error_timestamp: Option<DateTime<Utc>>,
    pub timestamp: Option<DateTime<Utc>>,
}

impl<T> Default for AsyncState<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> AsyncState<T> {
    /// Empty, never fetched
    pub fn new() -> Self {
        Self {
            data: None,
            is_fetching: false,
            is_fetched: false,
            error: None,
            error_timestamp: None,
            timestamp: None,
        }
    }

    /// Pre-seeded data that still counts as never fetched
    pub fn with_data(data: T) -> Self {
        Self {
            data: Some(data),
            ..Self::new()
        }
    }

    /// Pre-seeded data marked as fetched right now
    pub fn fetched(data: T) -> Self {
        Self {
            data: Some(data),
            is_fetched: true,
            timestamp: Some(Utc::now()),
            ..Self::new()
        }
    }

    pub fn is_loading(&self) -> bool {
        self.is_fetching
    }

    pub fn has_data(&self) -> bool {
        self.data.is_some()
    }

    /// Time since the last genuine success
    pub fn age(&self, now: DateTime<Utc>) -> Option<Duration> {
        self.timestamp.map(|ts| now - ts)
    }

    /// The current error, unless it was recorded before `since`.
    ///
    /// Lets a consumer hide errors older than the user's last interaction.
    pub fn error_since(&self, since: DateTime<Utc>) -> Option<&FriendlyError> {
        match (&self.error, self.error_timestamp) {
            (Some(error), Some(at)) if at >= since => Some(error),
            _ => None,
        }
    }

    pub(crate) fn begin_request(&mut self) {
        self.error = None;
        self.is_fetching = true;
    }

    pub(crate) fn complete(&mut self, data: T, now: DateTime<Utc>) {
        self.is_fetched = true;
        self.is_fetching = false;
        self.error = None;
        self.error_timestamp = None;
        self.data = Some(data);
        self.timestamp = Some(now);
    }

    pub(crate) fn fail(&mut self, error: FriendlyError, now: DateTime<Utc>) {
        self.is_fetched = true;
        self.is_fetching = false;
        self.error = Some(error);
        self.error_timestamp = Some(now);
    }

    pub(crate) fn invalidate(&mut self) {
        self.timestamp = None;
        self.error = None;
        self.error_timestamp = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorCode;

    #[test]
    fn test_fetched_is_stamped() {
        let state = AsyncState::fetched(1u8);
        assert!(state.is_fetched);
        assert!(state.timestamp.is_some());
        assert!(!AsyncState::with_data(1u8).is_fetched);
    }

    #[test]
    fn test_error_since() {
        let now = Utc::now();
        let mut state: AsyncState<u8> = AsyncState::new();
        state.fail(FriendlyError::from_code(ErrorCode::Timeout), now);

        assert!(state.error_since(now - Duration::seconds(1)).is_some());
        assert!(state.error_since(now + Duration::seconds(1)).is_none());
    }

    #[test]
    fn test_failure_keeps_data() {
        let now = Utc::now();
        let mut state = AsyncState::fetched(5u8);
        state.begin_request();
        state.fail(FriendlyError::from_code(ErrorCode::Unknown), now);

        assert_eq!(state.data, Some(5));
        assert!(!state.is_fetching);
        assert_eq!(state.error_timestamp, Some(now));
    }
}
