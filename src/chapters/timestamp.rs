//! Clock-like timestamp parsing ("1:02:03", "02:03", "63")

use crate::error::{ChapterError, Result};

/// Parse a timestamp string to seconds.
///
/// Fractional seconds are discarded. The last `:` segment is seconds, the
/// one before it minutes and the one before that hours. Segments are not
/// range-checked, so "90:75" is 5475 seconds. An unparseable hours segment
/// is ignored, since the description patterns can glue a stray leading
/// token onto it.
pub fn parse_timestamp(s: &str) -> Result<u32> {
    let whole = s.split('.').next().unwrap_or_default();
    let parts: Vec<&str> = whole.split(':').map(str::trim).collect();
    let invalid = || ChapterError::Format(s.to_string());

    let mut seconds: u32 = parts
        .last()
        .and_then(|p| p.parse().ok())
        .ok_or_else(invalid)?;

    if parts.len() > 1 {
        let minutes: u32 = parts[parts.len() - 2].parse().map_err(|_| invalid())?;
        seconds = minutes
            .checked_mul(60)
            .and_then(|m| m.checked_add(seconds))
            .ok_or_else(invalid)?;
    }

    if parts.len() > 2 {
        if let Ok(hours) = parts[parts.len() - 3].parse::<u32>() {
            seconds = hours
                .checked_mul(3600)
                .and_then(|h| h.checked_add(seconds))
                .ok_or_else(invalid)?;
        }
    }

    Ok(seconds)
}

/// Format seconds as `H:MM:SS`
pub fn format_timestamp(seconds: u32) -> String {
    format!(
        "{}:{:02}:{:02}",
        seconds / 3600,
        (seconds % 3600) / 60,
        seconds % 60
    )
}
