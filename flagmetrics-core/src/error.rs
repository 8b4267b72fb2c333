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

//! Error types for the core domain

use thiserror::Error;

pub type Result<T> = std::result::Result<T, CoreError>;

/// Errors raised when a decoded payload breaks the event invariants.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum CoreError {
    #[error("metric event is missing {0}")]
    MissingField(&'static str),

    #[error("variant name must not be empty (feature {feature})")]
    EmptyVariantName { feature: String },
}
