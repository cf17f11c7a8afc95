//! Numeric data-attribute parsing.
//!
//! Attributes are optional. Anything that is not a finite, non-negative
//! number falls back to the caller's default instead of failing the element.

/// Parse a non-negative number.
pub fn parse_number(raw: Option<&str>, default: f64) -> f64 {
    raw.and_then(|s| s.trim().parse::<f64>().ok())
        .filter(|v| v.is_finite() && *v >= 0.0)
        .unwrap_or(default)
}

/// Parse a non-negative integer, truncating any fraction.
pub fn parse_integer(raw: Option<&str>, default: u64) -> u64 {
    raw.and_then(|s| s.trim().parse::<f64>().ok())
        .filter(|v| v.is_finite() && *v >= 0.0)
        .map(|v| v.trunc() as u64)
        .unwrap_or(default)
}

/// Like [`parse_integer`], but zero also means "use the default". Durations
/// and per-character speeds must stay positive.
pub fn parse_positive_integer(raw: Option<&str>, default: u64) -> u64 {
    match parse_integer(raw, default) {
        0 => default,
        v => v,
    }
}
