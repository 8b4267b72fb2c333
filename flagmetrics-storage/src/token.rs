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

//! Batch idempotency tokens

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Caller-chosen identifier for one ingestion batch.
///
/// The store records the token in the same transaction as the batch's rows,
/// so a retried submission with the same token is recognised and skipped
/// instead of adding its counts twice.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BatchToken(Uuid);

impl BatchToken {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for BatchToken {
    fn default() -> Self {
        Self::new()
    }
}

impl FromStr for BatchToken {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s).map(Self)
    }
}

impl fmt::Display for BatchToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.hyphenated().fmt(f)
    }
}

/// Result of a tokened batch submission.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum BatchOutcome {
    Applied {
        hourly_rows: usize,
        variant_rows: usize,
        total_rows: usize,
    },
    /// The token was already recorded; nothing was written.
    Duplicate,
}

impl BatchOutcome {
    pub fn is_duplicate(&self) -> bool {
        matches!(self, BatchOutcome::Duplicate)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_and_display() {
        let raw = "67e55044-10b1-426f-9247-bb680e5fe0c8";
        let token: BatchToken = raw.parse().unwrap();
        assert_eq!(token.to_string(), raw);
        assert!("not-a-uuid".parse::<BatchToken>().is_err());
    }

    #[test]
    fn test_new_tokens_differ() {
        assert_ne!(BatchToken::new(), BatchToken::new());
    }
}
