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

//! Row filters and row mapping for the read side

use rusqlite::types::Value;
use rusqlite::Row;

use flagmetrics_core::{HourBucket, HourlyMetricRecord};

use crate::error::{Result, StoreError};

/// Filter for [`ClientMetricsStore::get_all`](crate::ClientMetricsStore::get_all).
///
/// Unset fields match everything.
///
/// ```rust,ignore
/// let filter = MetricsFilter::new().feature("checkout").environment("prod");
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MetricsFilter {
    pub feature_name: Option<String>,
    pub app_name: Option<String>,
    pub environment: Option<String>,
    /// Only hours at or after this bucket
    pub since: Option<HourBucket>,
    pub limit: Option<usize>,
}

impl MetricsFilter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn feature(mut self, name: impl Into<String>) -> Self {
        self.feature_name = Some(name.into());
        self
    }

    pub fn app(mut self, name: impl Into<String>) -> Self {
        self.app_name = Some(name.into());
        self
    }

    pub fn environment(mut self, name: impl Into<String>) -> Self {
        self.environment = Some(name.into());
        self
    }

    pub fn since(mut self, hour: HourBucket) -> Self {
        self.since = Some(hour);
        self
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    /// `WHERE`/`LIMIT` clause and its parameters.
    pub(crate) fn to_sql(&self) -> (String, Vec<Value>) {
        let mut clauses = Vec::new();
        let mut params = Vec::new();

        if let Some(feature) = &self.feature_name {
            clauses.push("feature_name = ?");
            params.push(Value::Text(feature.clone()));
        }
        if let Some(app) = &self.app_name {
            clauses.push("app_name = ?");
            params.push(Value::Text(app.clone()));
        }
        if let Some(env) = &self.environment {
            clauses.push("environment = ?");
            params.push(Value::Text(env.clone()));
        }
        if let Some(since) = self.since {
            clauses.push("timestamp >= ?");
            params.push(Value::Integer(since.epoch_seconds()));
        }

        let mut sql = String::new();
        if !clauses.is_empty() {
            sql.push_str(" WHERE ");
            sql.push_str(&clauses.join(" AND "));
        }
        if let Some(limit) = self.limit {
            sql.push_str(" LIMIT ?");
            params.push(Value::Integer(i64::try_from(limit).unwrap_or(i64::MAX)));
        }
        (sql, params)
    }
}

/// Raw hourly row as SQLite returns it, before range checks.
pub(crate) struct RawHourly {
    feature_name: String,
    app_name: String,
    environment: String,
    timestamp: i64,
    yes: i64,
    no: i64,
}

impl RawHourly {
    /// Expects columns `feature_name, app_name, environment, timestamp, yes, no`
    /// starting at index 0.
    pub(crate) fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            feature_name: row.get(0)?,
            app_name: row.get(1)?,
            environment: row.get(2)?,
            timestamp: row.get(3)?,
            yes: row.get(4)?,
            no: row.get(5)?,
        })
    }

    pub(crate) fn into_record(self) -> Result<HourlyMetricRecord> {
        Ok(HourlyMetricRecord {
            feature_name: self.feature_name,
            app_name: self.app_name,
            environment: self.environment,
            timestamp: hour_from_sql(self.timestamp)?,
            yes: counter_from_sql("yes", self.yes)?,
            no: counter_from_sql("no", self.no)?,
        })
    }
}

pub(crate) fn counter_from_sql(column: &'static str, value: i64) -> Result<u64> {
    u64::try_from(value).map_err(|_| StoreError::CorruptCounter { column, value })
}

pub(crate) fn hour_from_sql(seconds: i64) -> Result<HourBucket> {
    HourBucket::from_epoch_seconds(seconds).ok_or(StoreError::InvalidTimestamp(seconds))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_filter() {
        let (sql, params) = MetricsFilter::new().to_sql();
        assert!(sql.is_empty());
        assert!(params.is_empty());
    }

    #[test]
    fn test_filter_clauses() {
        let since = HourBucket::from_epoch_seconds(7_200).unwrap();
        let (sql, params) = MetricsFilter::new()
            .feature("f1")
            .environment("prod")
            .since(since)
            .limit(10)
            .to_sql();

        assert_eq!(
            sql,
            " WHERE feature_name = ? AND environment = ? AND timestamp >= ? LIMIT ?"
        );
        assert_eq!(
            params,
            vec![
                Value::Text("f1".into()),
                Value::Text("prod".into()),
                Value::Integer(7_200),
                Value::Integer(10),
            ]
        );
    }

    #[test]
    fn test_negative_counter_is_corrupt() {
        assert_eq!(counter_from_sql("yes", 5).unwrap(), 5);
        assert!(matches!(
            counter_from_sql("yes", -1),
            Err(StoreError::CorruptCounter { column: "yes", value: -1 })
        ));
    }
}
