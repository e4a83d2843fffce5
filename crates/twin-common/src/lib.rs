//! Twin Common Library
#![deny(clippy::unwrap_used, clippy::expect_used)]
//!
//! Shared utilities for the Twin workspace members:
//!
//! - **logging**: tracing subscriber setup driven by environment variables
//! - **encoding**: strict base64 decoding for JSON-embedded payloads
//! - **cleanup**: fire-and-log helpers for best-effort resource cleanup

pub mod cleanup;
pub mod encoding;
pub mod logging;

pub use cleanup::{best_effort, remove_file_quietly};
pub use encoding::{decode_strict, Base64Error};
