//! Formatting helpers for terminal output.

pub mod format;

pub use format::{age_since, format_age, format_bytes, truncate};
