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

//! Hour buckets
//!
//! Every reported timestamp is truncated to the start of its containing clock
//! hour before it is aggregated or persisted. Buckets are stored as epoch
//! seconds, so the conversion helpers here are the only place that knows
//! about the on-disk representation.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Seconds in one bucket
pub const SECONDS_PER_HOUR: i64 = 3_600;

/// Start of a clock hour (UTC).
///
/// Always aligned: minutes, seconds and sub-second parts are zero.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(from = "DateTime<Utc>", into = "DateTime<Utc>")]
pub struct HourBucket(DateTime<Utc>);

impl HourBucket {
    /// Floor a timestamp to its containing hour.
    pub fn floor(timestamp: DateTime<Utc>) -> Self {
        // timestamp() rounds toward negative infinity and subsec nanos are
        // always non-negative, so rem_euclid is correct before the epoch too.
        let into_hour = Duration::seconds(timestamp.timestamp().rem_euclid(SECONDS_PER_HOUR))
            + Duration::nanoseconds(i64::from(timestamp.timestamp_subsec_nanos()));

        Self(timestamp.checked_sub_signed(into_hour).unwrap_or(timestamp))
    }

    /// Rebuild a bucket from stored epoch seconds.
    ///
    /// Returns `None` when the value is outside chrono's representable range.
    pub fn from_epoch_seconds(seconds: i64) -> Option<Self> {
        DateTime::from_timestamp(seconds, 0).map(Self::floor)
    }

    /// Epoch seconds of the bucket start
    pub fn epoch_seconds(&self) -> i64 {
        self.0.timestamp()
    }

    pub fn as_datetime(&self) -> DateTime<Utc> {
        self.0
    }

    /// The bucket immediately after this one.
    pub fn next(&self) -> Self {
        Self(self.0 + Duration::hours(1))
    }
}

impl From<DateTime<Utc>> for HourBucket {
    fn from(timestamp: DateTime<Utc>) -> Self {
        Self::floor(timestamp)
    }
}

impl From<HourBucket> for DateTime<Utc> {
    fn from(bucket: HourBucket) -> Self {
        bucket.0
    }
}

impl fmt::Display for HourBucket {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.format("%Y-%m-%dT%H:00:00Z"))
    }
}

/// Instant `hours` hours before `now`.
///
/// Lookback windows include rows whose bucket is at or after this instant and
/// the retention sweeper removes rows strictly before it, so both sides agree
/// on the boundary.
///
/// A horizon before the earliest representable instant clamps to
/// [`DateTime::<Utc>::MIN_UTC`]: every stored row is inside such a window and
/// none is older than it.
pub fn lookback_cutoff(now: DateTime<Utc>, hours: u32) -> DateTime<Utc> {
    now.checked_sub_signed(Duration::hours(i64::from(hours)))
        .unwrap_or(DateTime::<Utc>::MIN_UTC)
}

/// Smallest whole epoch second that is not before `instant`.
///
/// Buckets are stored as whole seconds, so `bucket >= instant` is the same
/// test as `bucket_seconds >= ceil_epoch_seconds(instant)`.
pub fn ceil_epoch_seconds(instant: DateTime<Utc>) -> i64 {
    let seconds = instant.timestamp();
    if instant.timestamp_subsec_nanos() > 0 {
        seconds + 1
    } else {
        seconds
    }
}
