//! Shared utilities for feature modules
//!
//! - **validation**: input field validation and flag coercion

pub mod validation;

pub use validation::{coerce_bool, required_text, validate_length, validate_url, FieldError};
