//! Aggregate identity and stream versioning types.
//!
//! This module defines strong types for aggregate stream identification (`AggregateId`)
//! and per-stream version control (`Version`) used throughout the event-sourcing runtime.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Error type for `AggregateId` parsing.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("Invalid aggregate ID: {0}")]
pub struct ParseAggregateIdError(String);

/// Unique identifier for an event stream (aggregate instance).
///
/// An aggregate ID uniquely identifies a single aggregate instance in the event store.
/// For example:
/// - `"account-12345"`
/// - `"order-abc-def"`
/// - `"customer-uuid-here"`
///
/// # Design
///
/// `AggregateId` is a newtype wrapper around `String` that provides:
/// - Type safety (can't accidentally use a regular string)
/// - Clear intent in function signatures
/// - Serialization support for storage
///
/// # Validation
///
/// - `FromStr::from_str()`: Validates input (rejects empty strings)
/// - `From::from()` and `new()`: No validation (for internal use with trusted input)
///
/// Use `FromStr` when parsing external/user input. Use `new()` or `From` when
/// constructing aggregate IDs from application-controlled data.
///
/// # Examples
///
/// ```
/// use eventflow_core::stream::AggregateId;
///
/// let id = AggregateId::new("account-12345");
/// assert_eq!(id.as_str(), "account-12345");
///
/// let parsed: AggregateId = "customer-abc".parse().unwrap();
/// assert_eq!(parsed, AggregateId::new("customer-abc"));
/// ```
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AggregateId(String);

impl AggregateId {
    /// Create a new `AggregateId` from a string.
    ///
    /// # Examples
    ///
    /// ```
    /// use eventflow_core::stream::AggregateId;
    ///
    /// let id = AggregateId::new("account-123");
    /// ```
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Get the aggregate ID as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Convert the `AggregateId` into its inner `String`.
    #[must_use]
    pub fn into_inner(self) -> String {
        self.0
    }
}

impl fmt::Display for AggregateId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for AggregateId {
    type Err = ParseAggregateIdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.is_empty() {
            return Err(ParseAggregateIdError(
                "aggregate ID cannot be empty".to_string(),
            ));
        }
        Ok(Self(s.to_string()))
    }
}

impl From<String> for AggregateId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for AggregateId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl AsRef<str> for AggregateId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Stream version number for optimistic concurrency control.
///
/// Versions start at 0 (no events yet) and increment by 1 for each event
/// appended to a stream, so the first stored event carries version 1.
/// The version number is used to detect concurrent modifications:
///
/// - When appending events, you specify the expected current version
/// - If the stream's current version doesn't match, the append fails
/// - This prevents lost updates in concurrent scenarios
///
/// # Design
///
/// `Version` is a newtype wrapper around `u64` that provides:
/// - Type safety (can't accidentally use a plain integer)
/// - Clear intent in function signatures
/// - Arithmetic operations (+1, etc.)
///
/// # Examples
///
/// ```
/// use eventflow_core::stream::Version;
///
/// let v0 = Version::new(0);
/// let v1 = v0.next();
/// assert_eq!(v1, Version::new(1));
///
/// let v5 = Version::new(5);
/// assert_eq!(v5.value(), 5);
/// ```
#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Version(u64);

impl Version {
    /// The initial version (0) for a stream with no events yet.
    pub const INITIAL: Self = Self(0);

    /// Create a new `Version` with the given value.
    #[must_use]
    pub const fn new(value: u64) -> Self {
        Self(value)
    }

    /// Get the version number.
    #[must_use]
    pub const fn value(self) -> u64 {
        self.0
    }

    /// Get the next version (current + 1).
    ///
    /// # Overflow Behavior
    ///
    /// This operation uses wrapping arithmetic. In practice, reaching `u64::MAX`
    /// is not a realistic concern for any event stream.
    #[must_use]
    pub const fn next(self) -> Self {
        Self(self.0 + 1)
    }

    /// Check if this is the initial version (0, no events applied yet).
    #[must_use]
    pub const fn is_initial(self) -> bool {
        self.0 == 0
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u64> for Version {
    fn from(value: u64) -> Self {
        Self(value)
    }
}

impl From<Version> for u64 {
    fn from(version: Version) -> Self {
        version.0
    }
}

/// Arithmetic addition for `Version`.
impl std::ops::Add<u64> for Version {
    type Output = Self;

    fn add(self, rhs: u64) -> Self::Output {
        Self(self.0 + rhs)
    }
}

/// Arithmetic subtraction for `Version`.
///
/// # Underflow Behavior
///
/// Uses wrapping arithmetic. Callers that need a checked subtraction
/// (e.g. the repository computing `expected_version`) should use
/// [`Version::checked_sub`] instead.
impl std::ops::Sub<u64> for Version {
    type Output = Self;

    fn sub(self, rhs: u64) -> Self::Output {
        Self(self.0 - rhs)
    }
}

impl Version {
    /// Subtract `rhs` from this version, returning `None` on underflow.
    ///
    /// Used by the repository (§4.5) to compute `expected_version` without
    /// silently clamping a would-be-negative result to zero.
    #[must_use]
    pub const fn checked_sub(self, rhs: u64) -> Option<Self> {
        match self.0.checked_sub(rhs) {
            Some(v) => Some(Self(v)),
            None => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    mod aggregate_id_tests {
        use super::*;

        #[test]
        fn new_creates_aggregate_id() {
            let id = AggregateId::new("account-123");
            assert_eq!(id.as_str(), "account-123");
        }

        #[test]
        fn from_string() {
            let id = AggregateId::from("account-123");
            assert_eq!(id.as_str(), "account-123");

            let id2 = AggregateId::from("account-456".to_string());
            assert_eq!(id2.as_str(), "account-456");
        }

        #[test]
        #[allow(clippy::expect_used)]
        fn parse_from_str() {
            let id: AggregateId = "account-123".parse().expect("parse should succeed");
            assert_eq!(id, AggregateId::new("account-123"));
        }

        #[test]
        fn parse_empty_string_fails() {
            let result = "".parse::<AggregateId>();
            assert!(result.is_err());
        }

        #[test]
        fn display() {
            let id = AggregateId::new("account-123");
            assert_eq!(format!("{id}"), "account-123");
        }

        #[test]
        fn equality() {
            let id1 = AggregateId::new("account-123");
            let id2 = AggregateId::new("account-123");
            let id3 = AggregateId::new("account-456");

            assert_eq!(id1, id2);
            assert_ne!(id1, id3);
        }

        #[test]
        fn into_inner() {
            let id = AggregateId::new("account-123");
            let string = id.into_inner();
            assert_eq!(string, "account-123");
        }
    }

    mod version_tests {
        use super::*;

        #[test]
        fn initial_version() {
            assert_eq!(Version::INITIAL, Version::new(0));
            assert!(Version::INITIAL.is_initial());
        }

        #[test]
        fn next_version() {
            let v0 = Version::new(0);
            let v1 = v0.next();
            let v2 = v1.next();

            assert_eq!(v1, Version::new(1));
            assert_eq!(v2, Version::new(2));
        }

        #[test]
        fn version_arithmetic() {
            let v5 = Version::new(5);
            assert_eq!(v5 + 3, Version::new(8));
            assert_eq!(v5 - 2, Version::new(3));
        }

        #[test]
        fn checked_sub_underflow_returns_none() {
            let v1 = Version::new(1);
            assert_eq!(v1.checked_sub(5), None);
            assert_eq!(v1.checked_sub(1), Some(Version::new(0)));
        }

        #[test]
        fn version_ordering() {
            let v1 = Version::new(1);
            let v2 = Version::new(2);
            let v3 = Version::new(3);

            assert!(v1 < v2);
            assert!(v2 < v3);
            assert!(v3 > v1);
        }

        #[test]
        fn version_from_u64() {
            let version = Version::from(42_u64);
            assert_eq!(version.value(), 42);

            let num: u64 = version.into();
            assert_eq!(num, 42);
        }

        #[test]
        fn is_initial() {
            assert!(Version::new(0).is_initial());
            assert!(!Version::new(1).is_initial());
            assert!(!Version::new(100).is_initial());
        }

        #[test]
        fn display() {
            let version = Version::new(42);
            assert_eq!(format!("{version}"), "42");
        }
    }
}
