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

//! Persisted record shapes and their composite keys
//!
//! Keys are structured (never joined into a string) and derive `Ord` with
//! their fields in primary-key order. That order is also the order in which
//! batch writers must touch rows.

use crate::bucket::HourBucket;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Primary key of an hourly record
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HourlyKey {
    pub feature_name: String,
    pub app_name: String,
    pub environment: String,
    pub timestamp: HourBucket,
}

impl HourlyKey {
    pub fn new(
        feature_name: impl Into<String>,
        app_name: impl Into<String>,
        environment: impl Into<String>,
        timestamp: HourBucket,
    ) -> Self {
        Self {
            feature_name: feature_name.into(),
            app_name: app_name.into(),
            environment: environment.into(),
            timestamp,
        }
    }
}

impl fmt::Display for HourlyKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "feature={} app={} environment={} hour={}",
            self.feature_name, self.app_name, self.environment, self.timestamp
        )
    }
}

/// Yes/no counters for one (feature, app, environment, hour).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HourlyMetricRecord {
    pub feature_name: String,
    pub app_name: String,
    pub environment: String,
    pub timestamp: HourBucket,
    pub yes: u64,
    pub no: u64,
}

impl HourlyMetricRecord {
    pub fn key(&self) -> HourlyKey {
        HourlyKey::new(
            self.feature_name.clone(),
            self.app_name.clone(),
            self.environment.clone(),
            self.timestamp,
        )
    }

    /// Borrowed primary key, in lock order
    pub fn sort_key(&self) -> (&str, &str, &str, HourBucket) {
        (
            &self.feature_name,
            &self.app_name,
            &self.environment,
            self.timestamp,
        )
    }
}

/// Occurrences of one variant within an hourly bucket.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VariantMetricRecord {
    pub feature_name: String,
    pub app_name: String,
    pub environment: String,
    pub timestamp: HourBucket,
    pub variant: String,
    pub count: u64,
}

impl VariantMetricRecord {
    pub fn sort_key(&self) -> (&str, &str, &str, HourBucket, &str) {
        (
            &self.feature_name,
            &self.app_name,
            &self.environment,
            self.timestamp,
            &self.variant,
        )
    }
}

/// Lifetime yes+no for a feature in one environment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TotalMetricRecord {
    pub feature_name: String,
    pub environment: String,
    pub total: u64,
}

impl TotalMetricRecord {
    pub fn sort_key(&self) -> (&str, &str) {
        (&self.feature_name, &self.environment)
    }
}

/// Hourly record joined with its variant breakdown.
///
/// An hour without variant rows carries an empty map.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FeatureMetrics {
    pub feature_name: String,
    pub app_name: String,
    pub environment: String,
    pub timestamp: HourBucket,
    pub yes: u64,
    pub no: u64,
    pub variants: BTreeMap<String, u64>,
}

impl From<HourlyMetricRecord> for FeatureMetrics {
    fn from(record: HourlyMetricRecord) -> Self {
        Self {
            feature_name: record.feature_name,
            app_name: record.app_name,
            environment: record.environment,
            timestamp: record.timestamp,
            yes: record.yes,
            no: record.no,
            variants: BTreeMap::new(),
        }
    }
}

/// One row of a per-feature total lookup
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnvironmentTotal {
    pub environment: String,
    pub total: u64,
}
