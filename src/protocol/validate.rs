//! Payload validation.
//!
//! Decoding happens in two passes: serde checks shape (types, required
//! fields, closed enums, tuple arity, unknown keys on strict records), then
//! [`Validate`] checks numeric bounds and string constraints. Both passes
//! report into the same [`ValidationError`].

// ============================================================================
// Imports
// ============================================================================

use std::fmt;

use serde::{Deserialize, Deserializer};
use thiserror::Error;

// ============================================================================
// Issue
// ============================================================================

/// A single field-level violation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Issue {
    /// Dotted path to the offending value (e.g. `params.graph.nodes[0].x`).
    pub path: String,
    /// Human readable description.
    pub message: String,
}

impl fmt::Display for Issue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.path.is_empty() {
            f.write_str(&self.message)
        } else {
            write!(f, "{}: {}", self.path, self.message)
        }
    }
}

// ============================================================================
// ValidationError
// ============================================================================

/// Aggregate of every violation found in one payload.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid payload: {}", join_issues(.issues))]
pub struct ValidationError {
    issues: Vec<Issue>,
}

fn join_issues(issues: &[Issue]) -> String {
    issues
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

impl ValidationError {
    /// Creates an error with a single issue.
    #[must_use]
    pub fn single(path: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            issues: vec![Issue {
                path: path.into(),
                message: message.into(),
            }],
        }
    }

    /// Wraps a serde shape error found under `path`.
    #[must_use]
    pub fn from_serde(path: impl Into<String>, err: &serde_json::Error) -> Self {
        Self::single(path, err.to_string())
    }

    /// Returns all recorded issues.
    #[inline]
    #[must_use]
    pub fn issues(&self) -> &[Issue] {
        &self.issues
    }

    /// Returns `true` if any issue is reported at exactly `path`.
    #[must_use]
    pub fn has_issue_at(&self, path: &str) -> bool {
        self.issues.iter().any(|issue| issue.path == path)
    }
}

// ============================================================================
// Validate
// ============================================================================

/// Bound checks run after a payload deserialized successfully.
pub trait Validate {
    /// Records every violation into `v`.
    fn validate(&self, v: &mut Validator);
}

// ============================================================================
// Validator
// ============================================================================

/// Path-tracking issue collector.
#[derive(Debug, Default)]
pub struct Validator {
    path: Vec<String>,
    issues: Vec<Issue>,
}

impl Validator {
    /// Creates a collector rooted at `root` (e.g. `"params"`).
    #[must_use]
    pub fn at(root: &str) -> Self {
        Self {
            path: vec![root.to_string()],
            issues: Vec::new(),
        }
    }

    /// Validates `value` under `root` and converts the outcome.
    pub fn check<T: Validate + ?Sized>(root: &str, value: &T) -> Result<(), ValidationError> {
        let mut v = Self::at(root);
        value.validate(&mut v);
        v.finish()
    }

    fn path_to(&self, field: &str) -> String {
        let mut out = String::new();
        for segment in self.path.iter().map(String::as_str).chain(Some(field)) {
            if segment.is_empty() {
                continue;
            }
            if !out.is_empty() && !segment.starts_with('[') {
                out.push('.');
            }
            out.push_str(segment);
        }
        out
    }

    /// Records an issue on `field` relative to the current path.
    pub fn report(&mut self, field: &str, message: impl Into<String>) {
        let path = self.path_to(field);
        self.issues.push(Issue {
            path,
            message: message.into(),
        });
    }

    /// Runs `f` with `segment` pushed onto the path.
    pub fn nested(&mut self, segment: &str, f: impl FnOnce(&mut Self)) {
        self.path.push(segment.to_string());
        f(self);
        self.path.pop();
    }

    /// Validates a nested record under `field`.
    pub fn record<T: Validate + ?Sized>(&mut self, field: &str, value: &T) {
        self.nested(field, |v| value.validate(v));
    }

    /// Validates every element of a list under `field[i]`.
    pub fn each<T: Validate>(&mut self, field: &str, items: &[T]) {
        self.nested(field, |v| {
            for (i, item) in items.iter().enumerate() {
                v.nested(&format!("[{i}]"), |v| item.validate(v));
            }
        });
    }

    /// `value >= min`.
    pub fn min(&mut self, field: &str, value: f64, min: f64) {
        if value < min {
            self.report(field, format!("must be >= {min}, got {value}"));
        }
    }

    /// `value >= 0`.
    #[inline]
    pub fn non_negative(&mut self, field: &str, value: f64) {
        self.min(field, value, 0.0);
    }

    /// Optional `value >= 0`.
    #[inline]
    pub fn non_negative_opt(&mut self, field: &str, value: Option<f64>) {
        if let Some(value) = value {
            self.non_negative(field, value);
        }
    }

    /// `value > 0`.
    pub fn positive(&mut self, field: &str, value: f64) {
        if value <= 0.0 {
            self.report(field, format!("must be > 0, got {value}"));
        }
    }

    /// `0 <= value <= 1`.
    pub fn probability(&mut self, field: &str, value: f64) {
        if !(0.0..=1.0).contains(&value) {
            self.report(field, format!("must be within [0, 1], got {value}"));
        }
    }

    /// Optional `0 <= value <= 1`.
    #[inline]
    pub fn probability_opt(&mut self, field: &str, value: Option<f64>) {
        if let Some(value) = value {
            self.probability(field, value);
        }
    }

    /// Both bounds of a `[min, max]` pair are `>= 0`; ordering is not checked.
    pub fn range_pair(&mut self, field: &str, pair: [f64; 2]) {
        self.nested(field, |v| {
            v.non_negative("[0]", pair[0]);
            v.non_negative("[1]", pair[1]);
        });
    }

    /// Every value of a weight table is `>= 0`.
    pub fn weights<'a>(&mut self, field: &str, weights: impl IntoIterator<Item = (&'a String, &'a f64)>) {
        self.nested(field, |v| {
            for (key, weight) in weights {
                v.non_negative(key, *weight);
            }
        });
    }

    /// String has at least one character.
    pub fn non_empty(&mut self, field: &str, value: &str) {
        if value.is_empty() {
            self.report(field, "must not be empty");
        }
    }

    /// Returns the number of issues recorded so far.
    #[inline]
    #[must_use]
    pub fn issue_count(&self) -> usize {
        self.issues.len()
    }

    /// Converts the collected issues into a result.
    pub fn finish(self) -> Result<(), ValidationError> {
        if self.issues.is_empty() {
            Ok(())
        } else {
            Err(ValidationError {
                issues: self.issues,
            })
        }
    }
}

// ============================================================================
// Serde Helpers
// ============================================================================

/// Deserializes a field that must be present but may be `null`.
///
/// Using `deserialize_with` turns off serde's implicit `None` for missing
/// `Option` fields, so absence is reported as a missing field.
pub(crate) fn nullable<'de, D, T>(deserializer: D) -> Result<Option<T>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    Option::<T>::deserialize(deserializer)
}

// ============================================================================
// Tests
// ============================================================================
