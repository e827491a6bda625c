//! Failure record for one storage+host pair
//!
//! A record is either empty (no failures, no timestamps) or describes a
//! failure streak: how many consecutive failures, when the streak began
//! and when it was last extended. Any success resets it to empty.

use chrono::{DateTime, Utc};
use serde::Serialize;
use thiserror::Error;

use crate::store::StoredFields;

/// Rejected attempt to build an inconsistent record
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum InvalidFailureRecord {
    #[error("failure_count is {0} but failure timestamps are missing")]
    MissingTimestamps(u64),

    #[error("failure_count is 0 but failure timestamps are present")]
    UnexpectedTimestamps,

    #[error("first_failure is after last_failure")]
    OutOfOrder,
}

/// Snapshot of a failure streak
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct FailureRecord {
    first_failure: Option<DateTime<Utc>>,
    last_failure: Option<DateTime<Utc>>,
    failure_count: u64,
}

impl FailureRecord {
    /// Record with no failures
    pub fn none() -> Self {
        Self::default()
    }

    /// Builds a record, enforcing `failure_count == 0` iff both timestamps
    /// are absent, and `first_failure <= last_failure`
    pub fn new(
        first_failure: Option<DateTime<Utc>>,
        last_failure: Option<DateTime<Utc>>,
        failure_count: u64,
    ) -> Result<Self, InvalidFailureRecord> {
        match (first_failure, last_failure, failure_count) {
            (None, None, 0) => Ok(Self::none()),
            (_, _, 0) => Err(InvalidFailureRecord::UnexpectedTimestamps),
            (Some(first), Some(last), count) => {
                if first > last {
                    return Err(InvalidFailureRecord::OutOfOrder);
                }
                Ok(Self {
                    first_failure: Some(first),
                    last_failure: Some(last),
                    failure_count: count,
                })
            }
            (_, _, count) => Err(InvalidFailureRecord::MissingTimestamps(count)),
        }
    }

    /// Record for a streak of `failure_count` failures ending at `at`,
    /// begun at the same instant
    pub fn failing_since(at: DateTime<Utc>, failure_count: u64) -> Self {
        if failure_count == 0 {
            return Self::none();
        }
        Self {
            first_failure: Some(at),
            last_failure: Some(at),
            failure_count,
        }
    }

    /// Normalizes fields read from the shared store
    ///
    /// Fields are written one at a time by concurrent hosts, so a reader
    /// can observe a half-applied update. A zero count wins over stray
    /// timestamps; a positive count with a single timestamp uses it for
    /// both ends; a positive count with no timestamps reads as empty.
    pub fn from_stored(fields: StoredFields) -> Self {
        let count = fields.failure_count.unwrap_or(0);
        let first = fields.first_failure.and_then(from_unix);
        let last = fields.last_failure.and_then(from_unix);

        if count == 0 {
            return Self::none();
        }

        let (first, last) = match (first, last) {
            (Some(first), Some(last)) => (first.min(last), last.max(first)),
            (Some(only), None) | (None, Some(only)) => (only, only),
            (None, None) => return Self::none(),
        };

        Self {
            first_failure: Some(first),
            last_failure: Some(last),
            failure_count: count,
        }
    }

    /// The record after one more failure observed at `now`
    pub fn with_failure(&self, now: DateTime<Utc>) -> Self {
        Self {
            first_failure: Some(self.first_failure.unwrap_or(now)),
            last_failure: Some(now),
            failure_count: self.failure_count.saturating_add(1),
        }
    }

    pub fn first_failure(&self) -> Option<DateTime<Utc>> {
        self.first_failure
    }

    pub fn last_failure(&self) -> Option<DateTime<Utc>> {
        self.last_failure
    }

    pub fn failure_count(&self) -> u64 {
        self.failure_count
    }

    pub fn no_failures(&self) -> bool {
        self.failure_count == 0
    }
}

/// Unix seconds to a UTC timestamp
pub fn from_unix(secs: i64) -> Option<DateTime<Utc>> {
    DateTime::from_timestamp(secs, 0)
}
