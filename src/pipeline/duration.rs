//! Timestamp parsing for search result durations

/// Convert a `"M:SS"` or `"H:MM:SS"` timestamp to milliseconds
///
/// Returns `None` for anything that isn't a colon-separated list of
/// non-negative integers with at most three components.
pub fn to_millis(text: &str) -> Option<u64> {
    let parts: Vec<&str> = text.trim().split(':').collect();
    if parts.is_empty() || parts.len() > 3 {
        return None;
    }

    let mut seconds: u64 = 0;
    for part in parts {
        if part.is_empty() || !part.chars().all(|c| c.is_ascii_digit()) {
            return None;
        }
        let value: u64 = part.parse().ok()?;
        seconds = seconds.checked_mul(60)?.checked_add(value)?;
    }

    seconds.checked_mul(1000)
}
