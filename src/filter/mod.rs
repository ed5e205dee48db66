// Structured filter module
// Conjunctive attribute predicates evaluated against the record store


use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::records::{Record, RecordStore};
use crate::{Result, TicketError};

pub const DEFAULT_FILTER_LIMIT: usize = 20;

/// Partial structured query. Every present field must hold for a record to match.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PredicateSet {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub priority: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start_date: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end_date: Option<DateTime<Utc>>,
}

impl PredicateSet {
    /// True when no structured intent is present
    #[inline]
    pub const fn is_empty(&self) -> bool {
        self.category.is_none()
            && self.priority.is_none()
            && self.status.is_none()
            && self.start_date.is_none()
            && self.end_date.is_none()
    }

    /// Reject date ranges whose start lies after their end
    #[inline]
    pub fn validate(&self) -> Result<()> {
        if let (Some(start), Some(end)) = (self.start_date, self.end_date) {
            if start > end {
                return Err(TicketError::InvalidPredicate(format!(
                    "start_date {} is after end_date {}",
                    start.to_rfc3339(),
                    end.to_rfc3339()
                )));
            }
        }
        Ok(())
    }

    /// Whether a single record satisfies every present predicate
    #[inline]
    pub fn matches(&self, record: &Record) -> bool {
        let equals = |expected: Option<&String>, actual: &str| {
            expected.is_none_or(|value| value == actual)
        };

        equals(self.category.as_ref(), record.category.as_str())
            && equals(self.priority.as_ref(), record.priority.as_str())
            && equals(self.status.as_ref(), record.status.as_str())
            && self.start_date.is_none_or(|start| record.created_at >= start)
            && self.end_date.is_none_or(|end| record.created_at <= end)
    }
}

/// Evaluates predicate sets over a record store, capping the result count
#[derive(Debug, Clone, Copy)]
pub struct FilterEngine {
    limit: usize,
}

impl FilterEngine {
    #[inline]
    pub const fn new(limit: usize) -> Self {
        Self { limit }
    }

    #[inline]
    pub const fn limit(&self) -> usize {
        self.limit
    }

    /// Ids of matching records in store order, at most `limit` of them.
    ///
    /// An empty predicate set matches every record. Values that name no
    /// known category, priority or status simply match nothing.
    #[inline]
    pub fn apply(&self, store: &RecordStore, predicates: &PredicateSet) -> Vec<i64> {
        let ids: Vec<i64> = store
            .iter()
            .filter(|record| predicates.matches(record))
            .take(self.limit)
            .map(|record| record.id)
            .collect();

        debug!(
            "Filter {:?} matched {} records (limit {})",
            predicates,
            ids.len(),
            self.limit
        );
        ids
    }
}

impl Default for FilterEngine {
    #[inline]
    fn default() -> Self {
        Self::new(DEFAULT_FILTER_LIMIT)
    }
}
