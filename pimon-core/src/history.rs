//! Rolling history of downsampled summary points for the dashboard charts.

use crate::state::{shared, Shared};
use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

/// 15 minutes at the fast collector's 2s cadence.
pub const HISTORY_CAPACITY: usize = 450;

/// One point per fast-collector tick. Never mutated after append.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryPoint {
    #[serde(rename = "ts")]
    pub timestamp: DateTime<Local>,
    /// `HH:MM:SS` of `timestamp`, the chart's X axis label.
    pub time: String,
    #[serde(rename = "cpu")]
    pub cpu_percent: f64,
    #[serde(rename = "memory")]
    pub memory_percent: f64,
    #[serde(rename = "temp")]
    pub temperature: f64,
}

/// Fixed-capacity FIFO buffer of [`HistoryPoint`].
///
/// Owned by the fast collector; readers get consistent copies through
/// [`History::snapshot`]. Its lock is independent of the store's.
#[derive(Clone)]
pub struct History {
    points: Shared<VecDeque<HistoryPoint>>,
    capacity: usize,
}

impl Default for History {
    fn default() -> Self {
        Self::new()
    }
}

impl History {
    pub fn new() -> Self {
        Self::with_capacity(HISTORY_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            points: shared(VecDeque::with_capacity(capacity)),
            capacity,
        }
    }

    /// Appends to the tail, evicting from the head past capacity.
    pub fn append(&self, point: HistoryPoint) {
        let mut points = self.points.lock();
        points.push_back(point);
        while points.len() > self.capacity {
            points.pop_front();
        }
    }

    /// Ordered copy, oldest first.
    pub fn snapshot(&self) -> Vec<HistoryPoint> {
        self.points.lock().iter().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.points.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}
