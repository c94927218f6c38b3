//! Field validation helpers.
//!
//! Every failure names the offending field (dotted path for nested fields) so callers can
//! point at the exact input that was rejected.

use crate::error::{EpisodeError, EpisodeResult};
use ipd_types::{NonEmptyText, PhoneNumber};
use std::fmt::Display;

/// Require a non-blank value, trimming surrounding whitespace.
pub fn required(field: &str, value: &str) -> EpisodeResult<NonEmptyText> {
    NonEmptyText::new(value).map_err(|_| EpisodeError::validation(field, "is required"))
}

/// Like [`required`], but an absent or blank value becomes `None`.
pub fn optional(value: Option<&str>) -> Option<NonEmptyText> {
    value.and_then(|v| NonEmptyText::new(v).ok())
}

pub fn phone(field: &str, value: &str) -> EpisodeResult<PhoneNumber> {
    PhoneNumber::parse(value).map_err(|e| EpisodeError::validation(field, e.to_string()))
}

/// Inclusive range check.
pub fn in_range<T>(field: &str, value: T, min: T, max: T) -> EpisodeResult<T>
where
    T: PartialOrd + Display + Copy,
{
    if value < min || value > max {
        return Err(EpisodeError::validation(
            field,
            format!("must be between {min} and {max}, got {value}"),
        ));
    }
    Ok(value)
}

/// Floats additionally reject NaN and infinities, which compare false against any bound.
pub fn finite_in_range(field: &str, value: f64, min: f64, max: f64) -> EpisodeResult<f64> {
    if !value.is_finite() {
        return Err(EpisodeError::validation(field, "must be a finite number"));
    }
    in_range(field, value, min, max)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn field_of(err: EpisodeError) -> String {
        match err {
            EpisodeError::Validation { field, .. } => field,
            other => panic!("expected validation error, got {other:?}"),
        }
    }

    #[test]
    fn required_reports_field() {
        assert_eq!(field_of(required("ward_ref", "  ").unwrap_err()), "ward_ref");
        assert_eq!(required("ward_ref", " W7 ").unwrap().as_str(), "W7");
    }

    #[test]
    fn optional_drops_blank() {
        assert!(optional(Some("   ")).is_none());
        assert!(optional(None).is_none());
        assert_eq!(optional(Some("x")).unwrap().as_str(), "x");
    }

    #[test]
    fn in_range_is_inclusive() {
        assert_eq!(in_range("heart_rate", 20u32, 20, 300).unwrap(), 20);
        assert_eq!(in_range("heart_rate", 300u32, 20, 300).unwrap(), 300);
        assert_eq!(
            field_of(in_range("heart_rate", 19u32, 20, 300).unwrap_err()),
            "heart_rate"
        );
    }

    #[test]
    fn finite_in_range_rejects_nan() {
        assert!(finite_in_range("temperature", f64::NAN, 25.0, 45.0).is_err());
        assert!(finite_in_range("temperature", 37.0, 25.0, 45.0).is_ok());
    }
}
