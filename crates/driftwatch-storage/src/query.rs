//! Query builders for the record log.

use chrono::{DateTime, Utc};
use driftwatch_core::store::RecordFilter;
use serde::{Deserialize, Serialize};

/// Time range for queries
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimeRange {
    /// Start time (inclusive)
    pub start: DateTime<Utc>,
    /// End time (inclusive)
    pub end: DateTime<Utc>,
}

impl TimeRange {
    /// Create a new time range
    pub fn new(start: DateTime<Utc>, end: DateTime<Utc>) -> Self {
        Self { start, end }
    }

    /// Time range covering the last N hours
    pub fn last_hours(hours: i64) -> Self {
        let end = Utc::now();
        let start = end - chrono::Duration::hours(hours);
        Self { start, end }
    }
}

/// Builder for record-log queries
#[derive(Debug, Clone, Default)]
pub struct RecordQuery {
    item: Option<String>,
    product: Option<String>,
    line: Option<String>,
    station: Option<String>,
    time_range: Option<TimeRange>,
    limit: Option<usize>,
}

impl RecordQuery {
    /// Create an empty query
    pub fn new() -> Self {
        Self::default()
    }

    /// Filter by item name
    pub fn with_item(mut self, item: impl Into<String>) -> Self {
        self.item = Some(item.into());
        self
    }

    /// Filter by product
    pub fn with_product(mut self, product: impl Into<String>) -> Self {
        self.product = Some(product.into());
        self
    }

    /// Filter by line
    pub fn with_line(mut self, line: impl Into<String>) -> Self {
        self.line = Some(line.into());
        self
    }

    /// Filter by station
    pub fn with_station(mut self, station: impl Into<String>) -> Self {
        self.station = Some(station.into());
        self
    }

    /// Restrict to a time range
    pub fn with_time_range(mut self, range: TimeRange) -> Self {
        self.time_range = Some(range);
        self
    }

    /// Cap the result count
    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Build the filter handed to the record log
    pub fn build(self) -> RecordFilter {
        let mut filter = RecordFilter::new();
        filter.item = self.item;
        filter.product = self.product;
        filter.line = self.line;
        filter.station = self.station;
        if let Some(range) = self.time_range {
            filter.start = Some(range.start);
            filter.end = Some(range.end);
        }
        if let Some(limit) = self.limit {
            filter.limit = limit;
        }
        filter
    }
}
