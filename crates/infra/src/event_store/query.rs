//! Event query interface for inspection and auditing.
//!
//! These read paths sit outside the aggregate-reload hot path: results are
//! ordered by creation time, not by stream version.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use chronicle_core::{AggregateId, AggregateType, Event};

/// Pagination parameters for event queries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Pagination {
    /// Maximum number of events to return.
    pub limit: u32,
    /// Offset for pagination (0-based).
    pub offset: u32,
}

impl Default for Pagination {
    fn default() -> Self {
        Self {
            limit: 50,
            offset: 0,
        }
    }
}

impl Pagination {
    pub fn new(limit: Option<u32>, offset: Option<u32>) -> Self {
        Self {
            limit: limit.unwrap_or(50).min(1000),
            offset: offset.unwrap_or(0),
        }
    }
}

/// Filter criteria for event queries. Unset fields match everything.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventFilter {
    pub aggregate_id: Option<AggregateId>,
    pub aggregate_type: Option<AggregateType>,
    pub event_type: Option<String>,
    /// Inclusive lower bound on `created_at`.
    pub created_after: Option<DateTime<Utc>>,
    /// Inclusive upper bound on `created_at`.
    pub created_before: Option<DateTime<Utc>>,
}

impl EventFilter {
    pub fn matches(&self, event: &Event) -> bool {
        self.aggregate_id.as_ref().is_none_or(|id| id == event.aggregate_id())
            && self
                .aggregate_type
                .as_ref()
                .is_none_or(|ty| ty == event.aggregate_type())
            && self
                .event_type
                .as_deref()
                .is_none_or(|et| et == event.event_type())
            && self.created_after.is_none_or(|t| event.created_at() >= t)
            && self.created_before.is_none_or(|t| event.created_at() <= t)
    }
}

/// Paginated event query result.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventQueryResult {
    /// The events on the requested page.
    pub events: Vec<Event>,
    /// Total number of events matching the filter (across all pages).
    pub total: u64,
    pub pagination: Pagination,
    pub has_more: bool,
}

impl EventQueryResult {
    /// Filter and paginate events already ordered by creation time.
    pub fn from_events(events: Vec<Event>, filter: &EventFilter, pagination: Pagination) -> Self {
        let matching: Vec<Event> = events.into_iter().filter(|e| filter.matches(e)).collect();
        let total = matching.len() as u64;
        let page: Vec<Event> = matching
            .into_iter()
            .skip(pagination.offset as usize)
            .take(pagination.limit as usize)
            .collect();
        let has_more = total > u64::from(pagination.offset) + u64::from(pagination.limit);

        Self {
            events: page,
            total,
            pagination,
            has_more,
        }
    }
}
