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

//! Client metrics store
//!
//! [`ClientMetricsStore`] owns one SQLite connection and exposes the write
//! path (compaction, variant spreading, totals) and the read path (point
//! lookups, windowed feature metrics, seen apps and toggles, lifetime
//! totals). Every public method is one logical transaction.
//!
//! Writers in separate processes or threads each open their own store on the
//! same database file. Concurrency between them is left to SQLite: write
//! transactions start `IMMEDIATE`, take the database write lock up front and
//! wait up to the configured busy timeout for it. The mutex around the
//! connection only makes a single handle shareable; it is never held across
//! more than one transaction.
//!
//! ## Time windows
//!
//! A row is inside a lookback window of `h` hours iff its hour bucket is at or
//! after `now - h`. The sweeper deletes rows strictly before `now - h`, so a
//! row is always either visible to a window query or eligible for deletion
//! with the same `h`, never both.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use rusqlite::{params, params_from_iter, Connection, OptionalExtension, TransactionBehavior};
use tracing::{debug, info, warn};

use flagmetrics_core::{
    ceil_epoch_seconds, lookback_cutoff, Clock, EnvironmentTotal, FeatureMetrics, HourlyKey,
    HourlyMetricRecord, MetricEvent, MetricsConfig, SystemClock, VariantRetention,
};

use crate::compaction::{compact_hourly, spread_variants, sum_totals};
use crate::error::{Result, StoreError};
use crate::query::{counter_from_sql, MetricsFilter, RawHourly};
use crate::retention::{self, RetentionPolicy, SweepStats};
use crate::schema::{configure_connection, init_schema};
use crate::token::{BatchOutcome, BatchToken};
use crate::writer::upsert_batch;

const HOURLY_COLUMNS: &str = "feature_name, app_name, environment, timestamp, yes, no";

/// Store tuning
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreOptions {
    /// How long a writer waits for the database lock before failing
    pub busy_timeout: Duration,
    pub retention: RetentionPolicy,
}

impl StoreOptions {
    pub fn from_config(config: &MetricsConfig) -> Self {
        Self {
            busy_timeout: Duration::from_millis(config.storage.busy_timeout_ms),
            retention: RetentionPolicy::from_config(config),
        }
    }
}

impl Default for StoreOptions {
    fn default() -> Self {
        Self::from_config(&MetricsConfig::default())
    }
}

#[derive(Debug)]
pub struct ClientMetricsStore {
    conn: Mutex<Connection>,
    clock: Arc<dyn Clock>,
    options: StoreOptions,
}

impl ClientMetricsStore {
    /// Open (or create) a database file.
    pub fn open(path: impl AsRef<Path>, options: StoreOptions) -> Result<Self> {
        let path = path.as_ref();
        let conn = Connection::open(path)?;
        configure_connection(&conn, options.busy_timeout, true)?;
        init_schema(&conn)?;
        info!(path = %path.display(), "client metrics store opened");
        Ok(Self::with_connection(conn, options))
    }

    /// Private in-memory database, mostly for tests.
    pub fn open_in_memory() -> Result<Self> {
        Self::open_in_memory_with(StoreOptions::default())
    }

    pub fn open_in_memory_with(options: StoreOptions) -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        configure_connection(&conn, options.busy_timeout, false)?;
        init_schema(&conn)?;
        Ok(Self::with_connection(conn, options))
    }

    pub fn from_config(config: &MetricsConfig) -> Result<Self> {
        Self::open(&config.storage.db_path, StoreOptions::from_config(config))
    }

    fn with_connection(conn: Connection, options: StoreOptions) -> Self {
        Self {
            conn: Mutex::new(conn),
            clock: Arc::new(SystemClock),
            options,
        }
    }

    /// Replace the clock used for windows and retention.
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Epoch seconds of the earliest hour bucket inside a `hours_back` window.
    fn window_start(&self, hours_back: u32) -> i64 {
        ceil_epoch_seconds(lookback_cutoff(self.clock.now(), hours_back))
    }

    // ---------------------------------------------------------------
    // Point operations
    // ---------------------------------------------------------------

    /// Fetch one hourly record by exact key.
    pub fn get(&self, key: &HourlyKey) -> Result<HourlyMetricRecord> {
        let conn = self.conn.lock();
        let raw = conn
            .prepare_cached(&format!(
                "SELECT {HOURLY_COLUMNS} FROM client_metrics_hourly
                 WHERE feature_name = ?1 AND app_name = ?2 AND environment = ?3 AND timestamp = ?4"
            ))?
            .query_row(
                params![
                    key.feature_name,
                    key.app_name,
                    key.environment,
                    key.timestamp.epoch_seconds()
                ],
                RawHourly::from_row,
            )
            .optional()?;

        match raw {
            Some(raw) => raw.into_record(),
            None => Err(StoreError::NotFound(key.clone())),
        }
    }

    /// Hourly records matching `filter`, in primary-key order.
    pub fn get_all(&self, filter: &MetricsFilter) -> Result<Vec<HourlyMetricRecord>> {
        let (clause, values) = filter.to_sql();
        let sql = format!(
            "SELECT {HOURLY_COLUMNS} FROM client_metrics_hourly{clause}
             ORDER BY feature_name, app_name, environment, timestamp"
        );

        let conn = self.conn.lock();
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt.query_map(params_from_iter(values.iter()), RawHourly::from_row)?;

        let mut records = Vec::new();
        for raw in rows {
            records.push(raw?.into_record()?);
        }
        Ok(records)
    }

    /// Whether a row exists at `key`. Store failures are logged and read as
    /// `false`.
    pub fn exists(&self, key: &HourlyKey) -> bool {
        match self.get(key) {
            Ok(_) => true,
            Err(StoreError::NotFound(_)) => false,
            Err(e) => {
                warn!(key = %key, error = %e, "existence check failed");
                false
            }
        }
    }

    /// Delete one hourly row. Under coordinated variant retention the
    /// variant rows of the same hour go with it. Absent keys are not an error.
    pub fn delete(&self, key: &HourlyKey) -> Result<()> {
        let mut conn = self.conn.lock();
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        let hour = key.timestamp.epoch_seconds();

        let hourly = tx.execute(
            "DELETE FROM client_metrics_hourly
             WHERE feature_name = ?1 AND app_name = ?2 AND environment = ?3 AND timestamp = ?4",
            params![key.feature_name, key.app_name, key.environment, hour],
        )?;

        let mut variants = 0;
        if self.options.retention.variants == VariantRetention::Coordinated {
            variants = tx.execute(
                "DELETE FROM client_metrics_variants
                 WHERE feature_name = ?1 AND app_name = ?2 AND environment = ?3 AND timestamp = ?4",
                params![key.feature_name, key.app_name, key.environment, hour],
            )?;
        }

        tx.commit()?;
        debug!(key = %key, hourly, variants, "hourly metrics deleted");
        Ok(())
    }

    /// Remove every hourly, variant and total row.
    pub fn delete_all(&self) -> Result<()> {
        let mut conn = self.conn.lock();
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        tx.execute_batch(
            "DELETE FROM client_metrics_hourly;
             DELETE FROM client_metrics_variants;
             DELETE FROM client_metrics_totals;",
        )?;
        tx.commit()?;
        info!("all client metrics deleted");
        Ok(())
    }

    // ---------------------------------------------------------------
    // Write path
    // ---------------------------------------------------------------

    /// Compact `events` into hourly rows, spread their variants, and
    /// accumulate both into the store in one transaction.
    pub fn batch_insert_metrics(&self, events: &[MetricEvent]) -> Result<()> {
        let hourly = compact_hourly(events);
        let variants = spread_variants(events);
        if hourly.is_empty() && variants.is_empty() {
            return Ok(());
        }

        let mut conn = self.conn.lock();
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        let hourly_rows = upsert_batch(&tx, &hourly)?;
        let variant_rows = upsert_batch(&tx, &variants)?;
        tx.commit()?;

        debug!(
            events = events.len(),
            hourly_rows, variant_rows, "metrics batch committed"
        );
        Ok(())
    }

    /// Accumulate `yes + no` per (feature, environment) into lifetime totals.
    pub fn batch_insert_total_metrics(&self, events: &[MetricEvent]) -> Result<()> {
        let totals = sum_totals(events);
        if totals.is_empty() {
            return Ok(());
        }

        let mut conn = self.conn.lock();
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        let total_rows = upsert_batch(&tx, &totals)?;
        tx.commit()?;

        debug!(events = events.len(), total_rows, "totals batch committed");
        Ok(())
    }

    /// Write hourly, variant and total rows for `events` at most once per
    /// `token`.
    ///
    /// The token is recorded in the same transaction as the rows. Replaying
    /// a token that is still inside the idempotency window writes nothing and
    /// returns [`BatchOutcome::Duplicate`].
    pub fn batch_insert_metrics_once(
        &self,
        token: BatchToken,
        events: &[MetricEvent],
    ) -> Result<BatchOutcome> {
        let hourly = compact_hourly(events);
        let variants = spread_variants(events);
        let totals = sum_totals(events);
        if hourly.is_empty() {
            return Ok(BatchOutcome::Applied {
                hourly_rows: 0,
                variant_rows: 0,
                total_rows: 0,
            });
        }

        let now = self.clock.now().timestamp();
        let mut conn = self.conn.lock();
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

        let recorded = tx.execute(
            "INSERT INTO client_metrics_batches (token, applied_at) VALUES (?1, ?2)
             ON CONFLICT (token) DO NOTHING",
            params![token.to_string(), now],
        )?;
        if recorded == 0 {
            debug!(%token, "batch token already applied");
            return Ok(BatchOutcome::Duplicate);
        }

        let hourly_rows = upsert_batch(&tx, &hourly)?;
        let variant_rows = upsert_batch(&tx, &variants)?;
        let total_rows = upsert_batch(&tx, &totals)?;
        tx.commit()?;

        debug!(
            %token,
            events = events.len(),
            hourly_rows, variant_rows, total_rows, "tokened batch committed"
        );
        Ok(BatchOutcome::Applied {
            hourly_rows,
            variant_rows,
            total_rows,
        })
    }

    // ---------------------------------------------------------------
    // Read path
    // ---------------------------------------------------------------

    /// Hourly metrics for `feature_name` inside the last `hours_back` hours,
    /// each carrying its variant counts. Hours without variants come back
    /// with an empty map.
    pub fn get_metrics_for_feature_toggle(
        &self,
        feature_name: &str,
        hours_back: u32,
    ) -> Result<Vec<FeatureMetrics>> {
        let since = self.window_start(hours_back);
        let conn = self.conn.lock();
        let mut stmt = conn.prepare_cached(
            "SELECT h.feature_name, h.app_name, h.environment, h.timestamp, h.yes, h.no,
                    v.variant, v.count
             FROM client_metrics_hourly h
             LEFT JOIN client_metrics_variants v
               ON v.feature_name = h.feature_name
              AND v.app_name = h.app_name
              AND v.environment = h.environment
              AND v.timestamp = h.timestamp
             WHERE h.feature_name = ?1 AND h.timestamp >= ?2
             ORDER BY h.timestamp, h.app_name, h.environment, v.variant",
        )?;

        let rows = stmt.query_map(params![feature_name, since], |row| {
            Ok((
                RawHourly::from_row(row)?,
                row.get::<_, Option<String>>(6)?,
                row.get::<_, Option<i64>>(7)?,
            ))
        })?;

        let mut metrics: Vec<FeatureMetrics> = Vec::new();
        for row in rows {
            let (raw, variant, count) = row?;
            let record = raw.into_record()?;

            let same_hour = metrics.last().is_some_and(|last| {
                last.timestamp == record.timestamp
                    && last.app_name == record.app_name
                    && last.environment == record.environment
            });
            if !same_hour {
                metrics.push(FeatureMetrics::from(record));
            }

            if let (Some(variant), Some(count), Some(current)) =
                (variant, count, metrics.last_mut())
            {
                current
                    .variants
                    .insert(variant, counter_from_sql("count", count)?);
            }
        }

        debug!(feature = feature_name, hours_back, rows = metrics.len(), "feature metrics read");
        Ok(metrics)
    }

    /// Lifetime totals for `feature_name`, one entry per environment.
    pub fn get_total_count_for_toggle(&self, feature_name: &str) -> Result<Vec<EnvironmentTotal>> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare_cached(
            "SELECT environment, total FROM client_metrics_totals
             WHERE feature_name = ?1 ORDER BY environment",
        )?;
        let rows = stmt.query_map([feature_name], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?))
        })?;

        let mut totals = Vec::new();
        for row in rows {
            let (environment, total) = row?;
            totals.push(EnvironmentTotal {
                environment,
                total: counter_from_sql("total", total)?,
            });
        }
        Ok(totals)
    }

    /// Distinct apps that reported `feature_name` inside the window, ascending.
    pub fn get_seen_apps_for_feature_toggle(
        &self,
        feature_name: &str,
        hours_back: u32,
    ) -> Result<Vec<String>> {
        self.distinct_names(
            "SELECT DISTINCT app_name FROM client_metrics_hourly
             WHERE feature_name = ?1 AND timestamp >= ?2 ORDER BY app_name",
            feature_name,
            hours_back,
        )
    }

    /// Distinct features reported by `app_name` inside the window, ascending.
    pub fn get_seen_toggles_for_app(&self, app_name: &str, hours_back: u32) -> Result<Vec<String>> {
        self.distinct_names(
            "SELECT DISTINCT feature_name FROM client_metrics_hourly
             WHERE app_name = ?1 AND timestamp >= ?2 ORDER BY feature_name",
            app_name,
            hours_back,
        )
    }

    fn distinct_names(&self, sql: &str, name: &str, hours_back: u32) -> Result<Vec<String>> {
        let since = self.window_start(hours_back);
        let conn = self.conn.lock();
        let mut stmt = conn.prepare_cached(sql)?;
        let names = stmt
            .query_map(params![name, since], |row| row.get(0))?
            .collect::<rusqlite::Result<Vec<String>>>()?;
        Ok(names)
    }

    // ---------------------------------------------------------------
    // Retention
    // ---------------------------------------------------------------

    /// Delete hourly rows older than `hours_ago` hours, applying the
    /// configured variant policy. Totals are never touched.
    pub fn clear_metrics(&self, hours_ago: u32) -> Result<SweepStats> {
        let now = self.clock.now();
        let mut conn = self.conn.lock();
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        let stats = retention::sweep(&tx, now, hours_ago, &self.options.retention)?;
        tx.commit()?;

        info!(
            hours_ago,
            hourly_deleted = stats.hourly_deleted,
            variants_deleted = stats.variants_deleted,
            tokens_deleted = stats.tokens_deleted,
            "client metrics swept"
        );
        Ok(stats)
    }
}
