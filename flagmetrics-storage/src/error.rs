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

//! Storage errors

use flagmetrics_core::HourlyKey;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, StoreError>;

#[derive(Debug, Error)]
pub enum StoreError {
    /// Point lookup on a key with no row.
    #[error("no hourly metrics for {0}")]
    NotFound(HourlyKey),

    /// Connection, statement or transaction failure from SQLite.
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// A counter does not fit the 64-bit signed column.
    #[error("counter value {0} exceeds the storable range")]
    CounterOverflow(u64),

    /// A stored counter read back negative.
    #[error("corrupt counter in column {column}: {value}")]
    CorruptCounter { column: &'static str, value: i64 },

    /// A stored hour bucket is not a representable instant.
    #[error("invalid stored timestamp: {0}")]
    InvalidTimestamp(i64),
}

impl StoreError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, StoreError::NotFound(_))
    }
}
