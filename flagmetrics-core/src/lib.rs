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

//! Flagmetrics Core
//!
//! Domain types for the client-metrics pipeline: usage events reported by SDK
//! clients, hour buckets, the persisted record shapes with their composite
//! keys, a clock abstraction and the store configuration.

pub mod bucket;
pub mod clock;
pub mod config;
pub mod error;
pub mod event;
pub mod record;

pub use bucket::{ceil_epoch_seconds, lookback_cutoff, HourBucket, SECONDS_PER_HOUR};
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::{
    ConfigError, IngestConfig, MetricsConfig, QueryConfig, RetentionConfig, StorageConfig,
    VariantRetention, DEFAULT_HOURS_BACK, DEFAULT_RETENTION_HOURS,
};
pub use error::{CoreError, Result};
pub use event::MetricEvent;
pub use record::{
    EnvironmentTotal, FeatureMetrics, HourlyKey, HourlyMetricRecord, TotalMetricRecord,
    VariantMetricRecord,
};
