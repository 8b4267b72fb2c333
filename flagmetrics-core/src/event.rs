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

//! Reported usage events
//!
//! A [`MetricEvent`] is one observation sent by an SDK client: how often a
//! feature flag evaluated to enabled/disabled for an application in an
//! environment, optionally broken down by variant. Events are decoded at the
//! ingestion boundary and consumed read-only by the aggregation pipeline.

use crate::bucket::HourBucket;
use crate::error::{CoreError, Result};
use crate::record::HourlyKey;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// One reported observation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MetricEvent {
    pub feature_name: String,
    pub app_name: String,
    pub environment: String,
    /// Any precision; truncated to the containing hour before storage
    pub timestamp: DateTime<Utc>,
    #[serde(default)]
    pub yes: u64,
    #[serde(default)]
    pub no: u64,
    /// Variant name -> occurrences
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub variants: Option<BTreeMap<String, u64>>,
}

impl MetricEvent {
    pub fn new(
        feature_name: impl Into<String>,
        app_name: impl Into<String>,
        environment: impl Into<String>,
        timestamp: DateTime<Utc>,
    ) -> Self {
        Self {
            feature_name: feature_name.into(),
            app_name: app_name.into(),
            environment: environment.into(),
            timestamp,
            yes: 0,
            no: 0,
            variants: None,
        }
    }

    pub fn with_counts(mut self, yes: u64, no: u64) -> Self {
        self.yes = yes;
        self.no = no;
        self
    }

    pub fn with_variant(mut self, name: impl Into<String>, count: u64) -> Self {
        self.variants
            .get_or_insert_with(BTreeMap::new)
            .insert(name.into(), count);
        self
    }

    pub fn hour_bucket(&self) -> HourBucket {
        HourBucket::floor(self.timestamp)
    }

    pub fn hourly_key(&self) -> HourlyKey {
        HourlyKey::new(
            self.feature_name.clone(),
            self.app_name.clone(),
            self.environment.clone(),
            self.hour_bucket(),
        )
    }

    /// Variant counts, empty when none were reported.
    pub fn variants(&self) -> impl Iterator<Item = (&str, u64)> {
        self.variants
            .iter()
            .flat_map(|variants| variants.iter())
            .map(|(name, count)| (name.as_str(), *count))
    }

    /// yes + no, saturating
    pub fn evaluations(&self) -> u64 {
        self.yes.saturating_add(self.no)
    }

    /// Check the invariants the pipeline relies on.
    ///
    /// Counts are unsigned, so only names need checking. The store itself
    /// never calls this; it is for the ingestion boundary.
    pub fn validate(&self) -> Result<()> {
        if self.feature_name.is_empty() {
            return Err(CoreError::MissingField("featureName"));
        }
        if self.app_name.is_empty() {
            return Err(CoreError::MissingField("appName"));
        }
        if self.environment.is_empty() {
            return Err(CoreError::MissingField("environment"));
        }
        if self.variants().any(|(name, _)| name.is_empty()) {
            return Err(CoreError::EmptyVariantName {
                feature: self.feature_name.clone(),
            });
        }
        Ok(())
    }
}
