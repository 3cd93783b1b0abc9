//! Field constraints checked before anything reaches the store.
//!
//! Over-long values are rejected, never truncated. Lengths are counted in
//! characters, matching the `VARCHAR(n)` columns they guard.

use crate::error::{AdminError, AdminResult};

pub trait Validate {
    fn validate(&self) -> AdminResult<()>;
}

fn violation(field: &str, reason: impl std::fmt::Display) -> AdminError {
    AdminError::ConstraintViolation(format!("{field} {reason}"))
}

pub fn validate_required(field: &str, value: &str, max_len: usize) -> AdminResult<()> {
    if value.trim().is_empty() {
        return Err(violation(field, "is required"));
    }

    validate_max_len(field, Some(value), max_len)
}

pub fn validate_max_len(field: &str, value: Option<&str>, max_len: usize) -> AdminResult<()> {
    match value.map(|v| v.chars().count()) {
        Some(len) if len > max_len => Err(violation(
            field,
            format!("is {len} characters long, the limit is {max_len}"),
        )),
        _ => Ok(()),
    }
}

pub fn validate_range<T>(field: &str, value: Option<T>, min: T, max: T) -> AdminResult<()>
where
    T: PartialOrd + std::fmt::Display + Copy,
{
    match value {
        Some(v) if v < min || v > max => Err(violation(
            field,
            format!("must be between {min} and {max}, got {v}"),
        )),
        _ => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn required_fields_reject_blank_values() {
        assert!(validate_required("first_name", "Jane", 40).is_ok());
        assert!(validate_required("first_name", "", 40).is_err());
        assert!(validate_required("first_name", "   ", 40).is_err());
    }

    #[test]
    fn lengths_count_characters_not_bytes() {
        assert!(validate_max_len("city", Some("Zürich"), 6).is_ok());
        assert!(validate_max_len("city", Some("Zürichs"), 6).is_err());
        assert!(validate_max_len("city", None, 0).is_ok());
    }

    #[test]
    fn violations_name_the_field() {
        let error = validate_max_len("phone_no", Some("555-0100 ext 12345678"), 20).unwrap_err();

        match error {
            AdminError::ConstraintViolation(message) => assert!(message.starts_with("phone_no")),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn ranges_are_inclusive() {
        assert!(validate_range("zip_code", Some(0), 0, 99_999).is_ok());
        assert!(validate_range("zip_code", Some(99_999), 0, 99_999).is_ok());
        assert!(validate_range("zip_code", Some(100_000), 0, 99_999).is_err());
        assert!(validate_range::<i32>("zip_code", None, 0, 99_999).is_ok());
    }
}
