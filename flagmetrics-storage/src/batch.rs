// Copyright 2025 Sushanth (https://github.com/sushanthpy)
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU Affero General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the
// GNU Affero General Public License for more details.
//
// You should have received a copy of the GNU Affero General Public License
// along with this program. If not, see <https://www.gnu.org/licenses/>.

//! Key-ordered write batches
//!
//! Rows handed to the batch writer must be unique by primary key and sorted
//! by it. Concurrent transactions that upsert overlapping keys then take row
//! locks in the same global order and cannot wait on each other in a cycle.
//! [`SortedBatch`] can only be built from an ordered reduction, so the writer
//! never sees an unordered batch.

use flagmetrics_core::{HourlyMetricRecord, TotalMetricRecord, VariantMetricRecord};

/// A row that can be ordered by its primary key.
pub trait BatchRow {
    /// True when `self`'s key sorts strictly before `other`'s.
    fn precedes(&self, other: &Self) -> bool;
}

impl BatchRow for HourlyMetricRecord {
    fn precedes(&self, other: &Self) -> bool {
        self.sort_key() < other.sort_key()
    }
}

impl BatchRow for VariantMetricRecord {
    fn precedes(&self, other: &Self) -> bool {
        self.sort_key() < other.sort_key()
    }
}

impl BatchRow for TotalMetricRecord {
    fn precedes(&self, other: &Self) -> bool {
        self.sort_key() < other.sort_key()
    }
}

/// Rows unique by key, in ascending key order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SortedBatch<T> {
    rows: Vec<T>,
}

impl<T: BatchRow> SortedBatch<T> {
    /// Wrap rows that were produced in key order (e.g. from a `BTreeMap`).
    pub(crate) fn from_ordered(rows: Vec<T>) -> Self {
        let batch = Self { rows };
        debug_assert!(batch.is_strictly_sorted(), "batch rows out of key order");
        batch
    }

    /// Every row's key sorts strictly before the next one's.
    ///
    /// Strictness also proves there are no duplicate keys.
    pub fn is_strictly_sorted(&self) -> bool {
        self.rows.windows(2).all(|pair| pair[0].precedes(&pair[1]))
    }
}

impl<T> SortedBatch<T> {
    pub fn rows(&self) -> &[T] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn into_rows(self) -> Vec<T> {
        self.rows
    }
}

impl<T> Default for SortedBatch<T> {
    fn default() -> Self {
        Self { rows: Vec::new() }
    }
}
