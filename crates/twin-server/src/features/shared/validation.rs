//! Shared validation utilities
//!
//! Provides common validation functions for request fields.
//!
//! # Examples
//!
//! ```rust,ignore
//! use twin_server::features::shared::validation::{required_text, validate_url};
//!
//! let source = required_text(form.source, "source")?;
//! validate_url(&source, "source")?;
//! ```

use serde_json::Value;
use thiserror::Error;

/// Maximum length of free-text metadata fields.
pub const MAX_TEXT_LENGTH: usize = 4096;

/// Errors that can occur during field validation
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum FieldError {
    #[error("{field} is required")]
    Required { field: &'static str },

    #[error("{field} must be at most {max_length} characters")]
    TooLong { field: &'static str, max_length: usize },

    #[error("{field} must be a valid absolute URL")]
    InvalidUrl { field: &'static str },
}

/// Require a non-blank value. The original string is returned untouched.
pub fn required_text(value: Option<String>, field: &'static str) -> Result<String, FieldError> {
    match value {
        Some(v) if !v.trim().is_empty() => Ok(v),
        _ => Err(FieldError::Required { field }),
    }
}

pub fn validate_length(value: &str, field: &'static str, max_length: usize) -> Result<(), FieldError> {
    if value.chars().count() > max_length {
        return Err(FieldError::TooLong { field, max_length });
    }
    Ok(())
}

/// Validate a URL field
///
/// # Rules
/// - Must parse as an absolute URL (scheme required)
/// - Surrounding whitespace is rejected rather than trimmed
pub fn validate_url(value: &str, field: &'static str) -> Result<(), FieldError> {
    if value.trim() != value {
        return Err(FieldError::InvalidUrl { field });
    }

    url::Url::parse(value)
        .map(|_| ())
        .map_err(|_| FieldError::InvalidUrl { field })
}

/// Interpret a loosely typed flag.
///
/// `false`, `0`, `no`, `off` and the empty string (case-insensitive, as
/// strings or JSON values) are false; everything else is true. `null`
/// counts as absent and yields true.
pub fn coerce_bool(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().map(|f| f != 0.0).unwrap_or(true),
        Value::String(s) => coerce_bool_str(s),
        Value::Array(_) | Value::Object(_) => true,
    }
}

pub fn coerce_bool_str(value: &str) -> bool {
    !matches!(
        value.trim().to_ascii_lowercase().as_str(),
        "false" | "0" | "no" | "off" | ""
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_required_text() {
        assert_eq!(required_text(Some(" a ".to_string()), "description").unwrap(), " a ");
        assert_eq!(
            required_text(Some("   ".to_string()), "description"),
            Err(FieldError::Required { field: "description" })
        );
        assert!(required_text(None, "source").is_err());
    }

    #[test]
    fn test_validate_url() {
        assert!(validate_url("https://example.com/data", "source").is_ok());
        assert!(validate_url("s3://bucket/key", "source").is_ok());
        assert!(validate_url("example.com", "source").is_err());
        assert!(validate_url("/relative/path", "source").is_err());
        assert!(validate_url(" https://example.com", "source").is_err());
    }

    #[test]
    fn test_validate_length() {
        assert!(validate_length("abc", "description", 3).is_ok());
        assert_eq!(
            validate_length("abcd", "description", 3),
            Err(FieldError::TooLong { field: "description", max_length: 3 })
        );
    }

    #[test]
    fn test_coerce_bool_strings() {
        for falsy in ["false", "FALSE", "0", "no", "Off", "", "  "] {
            assert!(!coerce_bool(&json!(falsy)), "'{}' should be false", falsy);
        }
        for truthy in ["true", "1", "yes", "on", "anything"] {
            assert!(coerce_bool(&json!(truthy)), "'{}' should be true", truthy);
        }
    }

    #[test]
    fn test_coerce_bool_json_values() {
        assert!(!coerce_bool(&json!(false)));
        assert!(!coerce_bool(&json!(0)));
        assert!(coerce_bool(&json!(true)));
        assert!(coerce_bool(&json!(2)));
        assert!(coerce_bool(&Value::Null));
    }
}
