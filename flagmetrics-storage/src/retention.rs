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

//! Retention sweeper
//!
//! Removes hourly detail older than a horizon. What happens to the sparse
//! variant rows is an explicit policy: `Coordinated` deletes them with the
//! same predicate in the same transaction, `Keep` leaves them in place.
//! Lifetime totals are never swept. Applied batch tokens older than the
//! idempotency window are pruned on every sweep.

use chrono::{DateTime, Utc};
use rusqlite::Transaction;
use serde::Serialize;

use flagmetrics_core::{ceil_epoch_seconds, lookback_cutoff, MetricsConfig, VariantRetention};

use crate::error::Result;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetentionPolicy {
    pub variants: VariantRetention,
    /// Hours an applied batch token is remembered
    pub idempotency_window_hours: u32,
}

impl RetentionPolicy {
    pub fn from_config(config: &MetricsConfig) -> Self {
        Self {
            variants: config.retention.variants,
            idempotency_window_hours: config.ingest.idempotency_window_hours,
        }
    }
}

impl Default for RetentionPolicy {
    fn default() -> Self {
        Self::from_config(&MetricsConfig::default())
    }
}

/// Rows removed by one sweep.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SweepStats {
    pub hourly_deleted: u64,
    pub variants_deleted: u64,
    pub tokens_deleted: u64,
}

impl SweepStats {
    pub fn total_deleted(&self) -> u64 {
        self.hourly_deleted + self.variants_deleted + self.tokens_deleted
    }
}

/// Delete rows strictly older than `now - hours_ago`.
pub(crate) fn sweep(
    tx: &Transaction<'_>,
    now: DateTime<Utc>,
    hours_ago: u32,
    policy: &RetentionPolicy,
) -> Result<SweepStats> {
    let mut stats = SweepStats::default();
    let horizon = ceil_epoch_seconds(lookback_cutoff(now, hours_ago));

    stats.hourly_deleted = tx.execute(
        "DELETE FROM client_metrics_hourly WHERE timestamp < ?1",
        [horizon],
    )? as u64;

    if policy.variants == VariantRetention::Coordinated {
        stats.variants_deleted = tx.execute(
            "DELETE FROM client_metrics_variants WHERE timestamp < ?1",
            [horizon],
        )? as u64;
    }

    let token_horizon = ceil_epoch_seconds(lookback_cutoff(now, policy.idempotency_window_hours));
    stats.tokens_deleted = tx.execute(
        "DELETE FROM client_metrics_batches WHERE applied_at < ?1",
        [token_horizon],
    )? as u64;

    Ok(stats)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_policy_from_config() {
        let mut config = MetricsConfig::default();
        config.retention.variants = VariantRetention::Keep;
        config.ingest.idempotency_window_hours = 6;

        let policy = RetentionPolicy::from_config(&config);
        assert_eq!(policy.variants, VariantRetention::Keep);
        assert_eq!(policy.idempotency_window_hours, 6);
    }

    #[test]
    fn test_default_policy_coordinates_variants() {
        assert_eq!(RetentionPolicy::default().variants, VariantRetention::Coordinated);
    }

    #[test]
    fn test_total_deleted() {
        let stats = SweepStats {
            hourly_deleted: 3,
            variants_deleted: 2,
            tokens_deleted: 1,
        };
        assert_eq!(stats.total_deleted(), 6);
    }
}
