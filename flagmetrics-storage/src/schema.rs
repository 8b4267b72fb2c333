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

//! SQLite schema for the client-metrics tables
//!
//! Every table uses the composite natural key as its primary key and is
//! declared `WITHOUT ROWID`, so rows are clustered in key order. Counter
//! columns carry a `typeof(...) = 'integer'` check: SQLite silently promotes
//! an overflowing integer sum to REAL, and the check turns that into a
//! constraint failure that aborts the batch instead.

use std::time::Duration;

use rusqlite::Connection;

/// Current schema version
pub const SCHEMA_VERSION: i64 = 1;

pub const HOURLY_TABLE: &str = "client_metrics_hourly";
pub const VARIANT_TABLE: &str = "client_metrics_variants";
pub const TOTAL_TABLE: &str = "client_metrics_totals";
pub const BATCH_TABLE: &str = "client_metrics_batches";

/// Connection pragmas. WAL only applies to file databases.
pub fn configure_connection(
    conn: &Connection,
    busy_timeout: Duration,
    file_backed: bool,
) -> Result<(), rusqlite::Error> {
    conn.busy_timeout(busy_timeout)?;
    if file_backed {
        let mode: String =
            conn.pragma_update_and_check(None, "journal_mode", "WAL", |row| row.get(0))?;
        tracing::debug!(journal_mode = %mode, "journal mode set");
        conn.pragma_update(None, "synchronous", "NORMAL")?;
    }
    conn.pragma_update(None, "temp_store", "MEMORY")?;
    Ok(())
}

/// Create tables and indexes if they don't exist.
pub fn init_schema(conn: &Connection) -> Result<(), rusqlite::Error> {
    conn.execute_batch(SCHEMA_SQL)?;
    conn.execute(
        "INSERT OR IGNORE INTO schema_version (version) VALUES (?1)",
        [SCHEMA_VERSION],
    )?;
    Ok(())
}

const SCHEMA_SQL: &str = "
CREATE TABLE IF NOT EXISTS schema_version (
    version INTEGER PRIMARY KEY,
    applied_at TEXT NOT NULL DEFAULT (datetime('now'))
);

CREATE TABLE IF NOT EXISTS client_metrics_hourly (
    feature_name TEXT NOT NULL,
    app_name TEXT NOT NULL,
    environment TEXT NOT NULL,
    timestamp INTEGER NOT NULL,
    yes INTEGER NOT NULL DEFAULT 0 CHECK (typeof(yes) = 'integer' AND yes >= 0),
    no INTEGER NOT NULL DEFAULT 0 CHECK (typeof(no) = 'integer' AND no >= 0),
    PRIMARY KEY (feature_name, app_name, environment, timestamp)
) WITHOUT ROWID;
CREATE INDEX IF NOT EXISTS idx_hourly_app_time ON client_metrics_hourly(app_name, timestamp);
CREATE INDEX IF NOT EXISTS idx_hourly_time ON client_metrics_hourly(timestamp);

CREATE TABLE IF NOT EXISTS client_metrics_variants (
    feature_name TEXT NOT NULL,
    app_name TEXT NOT NULL,
    environment TEXT NOT NULL,
    timestamp INTEGER NOT NULL,
    variant TEXT NOT NULL,
    count INTEGER NOT NULL DEFAULT 0 CHECK (typeof(count) = 'integer' AND count >= 0),
    PRIMARY KEY (feature_name, app_name, environment, timestamp, variant)
) WITHOUT ROWID;
CREATE INDEX IF NOT EXISTS idx_variants_time ON client_metrics_variants(timestamp);

CREATE TABLE IF NOT EXISTS client_metrics_totals (
    feature_name TEXT NOT NULL,
    environment TEXT NOT NULL,
    total INTEGER NOT NULL DEFAULT 0 CHECK (typeof(total) = 'integer' AND total >= 0),
    PRIMARY KEY (feature_name, environment)
) WITHOUT ROWID;

CREATE TABLE IF NOT EXISTS client_metrics_batches (
    token TEXT PRIMARY KEY,
    applied_at INTEGER NOT NULL
) WITHOUT ROWID;
CREATE INDEX IF NOT EXISTS idx_batches_applied ON client_metrics_batches(applied_at);
";
