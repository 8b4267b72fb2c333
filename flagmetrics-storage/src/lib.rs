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

//! Flagmetrics Storage Layer
//!
//! SQLite-backed aggregation of client metrics reported by feature-flag SDKs.
//!
//! ## Pipeline
//!
//! - **Compaction**: raw events are folded into one row per
//!   (feature, app, environment, hour) before any database round trip
//! - **Variant spreading**: per-event variant maps become sparse rows keyed by
//!   (feature, app, environment, hour, variant)
//! - **Totals**: `yes + no` per (feature, environment), kept for the lifetime
//!   of the flag
//! - **Batch writer**: key-sorted multi-row upserts that add to existing
//!   counters instead of overwriting them
//! - **Retention**: hourly detail (and optionally variants) older than a
//!   horizon is swept
//!
//! ## Usage
//!
//! ```rust,ignore
//! use flagmetrics_storage::ClientMetricsStore;
//!
//! let store = ClientMetricsStore::open_in_memory()?;
//! store.batch_insert_metrics(&events)?;
//! store.batch_insert_total_metrics(&events)?;
//! let hourly = store.get_metrics_for_feature_toggle("checkout", 24)?;
//! ```

pub mod batch;
pub mod compaction;
pub mod error;
pub mod query;
pub mod retention;
pub mod schema;
pub mod store;
pub mod token;
pub mod writer;

pub use batch::{BatchRow, SortedBatch};
pub use compaction::{compact_hourly, spread_variants, sum_totals};
pub use error::{Result, StoreError};
pub use query::MetricsFilter;
pub use retention::{RetentionPolicy, SweepStats};
pub use store::{ClientMetricsStore, StoreOptions};
pub use token::{BatchOutcome, BatchToken};
pub use writer::{upsert_batch, UpsertRow, MAX_ROWS_PER_STATEMENT};
