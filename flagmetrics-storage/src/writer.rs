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

//! Conflict-resolving batch writer
//!
//! Writes a [`SortedBatch`] as multi-row
//! `INSERT ... VALUES (...), (...) ON CONFLICT (<pk>) DO UPDATE SET c = c + excluded.c`
//! statements. A new key is inserted, an existing key has the incoming
//! counters added to it. Rows are bound in batch order, so concurrent writers
//! touch overlapping keys in the same order.
//!
//! Large batches are split into several statements to respect SQLite's host
//! parameter limit. All statements run on the caller's transaction, so the
//! batch still commits or rolls back as one unit. The writer never retries.

use rusqlite::types::Value;
use rusqlite::{params_from_iter, Transaction};

use flagmetrics_core::{HourlyMetricRecord, TotalMetricRecord, VariantMetricRecord};

use crate::batch::{BatchRow, SortedBatch};
use crate::error::{Result, StoreError};
use crate::schema::{HOURLY_TABLE, TOTAL_TABLE, VARIANT_TABLE};

/// SQLite's default `SQLITE_MAX_VARIABLE_NUMBER` since 3.32.
const MAX_HOST_PARAMETERS: usize = 32_766;

/// Upper bound on rows bound into a single statement.
pub const MAX_ROWS_PER_STATEMENT: usize = 500;

/// A row type the writer knows how to upsert.
pub trait UpsertRow: BatchRow {
    const TABLE: &'static str;
    /// Insert column list, key columns first.
    const COLUMNS: &'static [&'static str];
    /// Primary-key columns named in the conflict target.
    const KEY_COLUMNS: &'static [&'static str];
    /// Counter columns accumulated on conflict.
    const COUNTER_COLUMNS: &'static [&'static str];

    /// Append this row's values in `COLUMNS` order.
    fn bind(&self, out: &mut Vec<Value>) -> Result<()>;
}

/// Convert an in-memory counter to the signed 64-bit column type.
pub(crate) fn counter_to_sql(value: u64) -> Result<Value> {
    i64::try_from(value)
        .map(Value::Integer)
        .map_err(|_| StoreError::CounterOverflow(value))
}

impl UpsertRow for HourlyMetricRecord {
    const TABLE: &'static str = HOURLY_TABLE;
    const COLUMNS: &'static [&'static str] =
        &["feature_name", "app_name", "environment", "timestamp", "yes", "no"];
    const KEY_COLUMNS: &'static [&'static str] =
        &["feature_name", "app_name", "environment", "timestamp"];
    const COUNTER_COLUMNS: &'static [&'static str] = &["yes", "no"];

    fn bind(&self, out: &mut Vec<Value>) -> Result<()> {
        out.push(Value::Text(self.feature_name.clone()));
        out.push(Value::Text(self.app_name.clone()));
        out.push(Value::Text(self.environment.clone()));
        out.push(Value::Integer(self.timestamp.epoch_seconds()));
        out.push(counter_to_sql(self.yes)?);
        out.push(counter_to_sql(self.no)?);
        Ok(())
    }
}

impl UpsertRow for VariantMetricRecord {
    const TABLE: &'static str = VARIANT_TABLE;
    const COLUMNS: &'static [&'static str] = &[
        "feature_name",
        "app_name",
        "environment",
        "timestamp",
        "variant",
        "count",
    ];
    const KEY_COLUMNS: &'static [&'static str] =
        &["feature_name", "app_name", "environment", "timestamp", "variant"];
    const COUNTER_COLUMNS: &'static [&'static str] = &["count"];

    fn bind(&self, out: &mut Vec<Value>) -> Result<()> {
        out.push(Value::Text(self.feature_name.clone()));
        out.push(Value::Text(self.app_name.clone()));
        out.push(Value::Text(self.environment.clone()));
        out.push(Value::Integer(self.timestamp.epoch_seconds()));
        out.push(Value::Text(self.variant.clone()));
        out.push(counter_to_sql(self.count)?);
        Ok(())
    }
}

impl UpsertRow for TotalMetricRecord {
    const TABLE: &'static str = TOTAL_TABLE;
    const COLUMNS: &'static [&'static str] = &["feature_name", "environment", "total"];
    const KEY_COLUMNS: &'static [&'static str] = &["feature_name", "environment"];
    const COUNTER_COLUMNS: &'static [&'static str] = &["total"];

    fn bind(&self, out: &mut Vec<Value>) -> Result<()> {
        out.push(Value::Text(self.feature_name.clone()));
        out.push(Value::Text(self.environment.clone()));
        out.push(counter_to_sql(self.total)?);
        Ok(())
    }
}

/// Rows per statement for a table with `columns` columns.
fn rows_per_statement(columns: usize) -> usize {
    (MAX_HOST_PARAMETERS / columns).clamp(1, MAX_ROWS_PER_STATEMENT)
}

/// Build the upsert statement for `rows` rows of `T`.
pub(crate) fn upsert_sql<T: UpsertRow>(rows: usize) -> String {
    let placeholders = format!("({})", vec!["?"; T::COLUMNS.len()].join(", "));
    let values = vec![placeholders.as_str(); rows].join(", ");
    let accumulate = T::COUNTER_COLUMNS
        .iter()
        .map(|c| format!("{c} = {c} + excluded.{c}"))
        .collect::<Vec<_>>()
        .join(", ");

    format!(
        "INSERT INTO {table} ({columns}) VALUES {values} ON CONFLICT ({key}) DO UPDATE SET {accumulate}",
        table = T::TABLE,
        columns = T::COLUMNS.join(", "),
        key = T::KEY_COLUMNS.join(", "),
    )
}

/// Insert-or-accumulate every row of `batch` on `tx`.
///
/// Returns the number of rows written. An empty batch returns `0` without
/// touching the transaction.
pub fn upsert_batch<T: UpsertRow>(tx: &Transaction<'_>, batch: &SortedBatch<T>) -> Result<usize> {
    if batch.is_empty() {
        return Ok(0);
    }
    debug_assert!(batch.is_strictly_sorted());

    let chunk_rows = rows_per_statement(T::COLUMNS.len());
    let mut written = 0;
    let mut values = Vec::with_capacity(chunk_rows * T::COLUMNS.len());

    for chunk in batch.rows().chunks(chunk_rows) {
        values.clear();
        for row in chunk {
            row.bind(&mut values)?;
        }

        let mut stmt = tx.prepare_cached(&upsert_sql::<T>(chunk.len()))?;
        written += stmt.execute(params_from_iter(values.iter()))?;
    }

    tracing::debug!(table = T::TABLE, rows = written, "batch upserted");
    Ok(written)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compaction::{compact_hourly, sum_totals};
    use crate::schema::init_schema;
    use chrono::{TimeZone, Utc};
    use flagmetrics_core::MetricEvent;
    use rusqlite::Connection;

    fn setup() -> Connection {
        let conn = Connection::open_in_memory().unwrap();
        init_schema(&conn).unwrap();
        conn
    }

    fn events(n: usize) -> Vec<MetricEvent> {
        let ts = Utc.with_ymd_and_hms(2024, 3, 10, 10, 0, 0).unwrap();
        (0..n)
            .map(|i| MetricEvent::new(format!("feature-{i:05}"), "app", "prod", ts).with_counts(1, 2))
            .collect()
    }

    #[test]
    fn test_upsert_sql_shape() {
        let sql = upsert_sql::<TotalMetricRecord>(2);
        assert_eq!(
            sql,
            "INSERT INTO client_metrics_totals (feature_name, environment, total) \
             VALUES (?, ?, ?), (?, ?, ?) \
             ON CONFLICT (feature_name, environment) DO UPDATE SET total = total + excluded.total"
        );
    }

    #[test]
    fn test_upsert_accumulates() {
        let mut conn = setup();
        let batch = compact_hourly(&events(3));

        for _ in 0..2 {
            let tx = conn.transaction().unwrap();
            assert_eq!(upsert_batch(&tx, &batch).unwrap(), 3);
            tx.commit().unwrap();
        }

        let (yes, no): (i64, i64) = conn
            .query_row(
                "SELECT SUM(yes), SUM(no) FROM client_metrics_hourly",
                [],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .unwrap();
        assert_eq!((yes, no), (6, 12));
    }

    #[test]
    fn test_large_batch_is_chunked() {
        let mut conn = setup();
        let n = MAX_ROWS_PER_STATEMENT * 2 + 7;
        let batch = sum_totals(&events(n));

        let tx = conn.transaction().unwrap();
        assert_eq!(upsert_batch(&tx, &batch).unwrap(), n);
        tx.commit().unwrap();

        let rows: i64 = conn
            .query_row("SELECT COUNT(*) FROM client_metrics_totals", [], |row| row.get(0))
            .unwrap();
        assert_eq!(rows as usize, n);
    }

    #[test]
    fn test_empty_batch_is_noop() {
        let mut conn = setup();
        let tx = conn.transaction().unwrap();
        let batch = SortedBatch::<HourlyMetricRecord>::default();
        assert_eq!(upsert_batch(&tx, &batch).unwrap(), 0);
    }

    #[test]
    fn test_counter_overflow_rejected() {
        assert!(counter_to_sql(i64::MAX as u64).is_ok());
        assert!(matches!(
            counter_to_sql(u64::MAX),
            Err(StoreError::CounterOverflow(u64::MAX))
        ));
    }
}
