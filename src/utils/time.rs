//! Time parsing and formatting utilities

use crate::error::{ShiftXError, ShiftXResult};

/// Parse a signed offset: seconds (`-5.5`) or clock notation (`01:02.5`, `-00:00:10`)
pub fn parse_offset(text: &str) -> ShiftXResult<f64> {
    let trimmed = text.trim();
    let invalid = || {
        ShiftXError::config(format!(
            "Invalid offset '{}'. Expected seconds, MM:SS.ms or HH:MM:SS.ms",
            text
        ))
    };

    let (negative, body) = match trimmed.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, trimmed.strip_prefix('+').unwrap_or(trimmed)),
    };
    if body.is_empty() {
        return Err(invalid());
    }

    let parts: Vec<&str> = body.split(':').collect();
    let seconds = match parts.as_slice() {
        [seconds] => parse_component(seconds, None).ok_or_else(invalid)?,
        [minutes, seconds] => {
            let minutes = parse_whole(minutes).ok_or_else(invalid)?;
            let seconds = parse_component(seconds, Some(60.0)).ok_or_else(invalid)?;
            minutes * 60.0 + seconds
        }
        [hours, minutes, seconds] => {
            let hours = parse_whole(hours).ok_or_else(invalid)?;
            let minutes = parse_whole(minutes).filter(|m| *m < 60.0).ok_or_else(invalid)?;
            let seconds = parse_component(seconds, Some(60.0)).ok_or_else(invalid)?;
            hours * 3600.0 + minutes * 60.0 + seconds
        }
        _ => return Err(invalid()),
    };

    Ok(if negative { -seconds } else { seconds })
}

fn parse_whole(text: &str) -> Option<f64> {
    text.parse::<u64>().ok().map(|v| v as f64)
}

fn parse_component(text: &str, limit: Option<f64>) -> Option<f64> {
    let value = text.parse::<f64>().ok()?;
    if !value.is_finite() || value < 0.0 || text.starts_with(|c| c == '+' || c == '-') {
        return None;
    }
    match limit {
        Some(limit) if value >= limit => None,
        _ => Some(value),
    }
}

/// Format seconds as `HH:MM:SS.mmm`, or `MM:SS.mmm` below one hour
pub fn format_duration(seconds: f64) -> String {
    let sign = if seconds < 0.0 { "-" } else { "" };
    let total_ms = (seconds.abs() * 1000.0).round() as u64;
    let hours = total_ms / 3_600_000;
    let minutes = (total_ms % 3_600_000) / 60_000;
    let secs = (total_ms % 60_000) / 1000;
    let millis = total_ms % 1000;

    if hours > 0 {
        format!("{}{:02}:{:02}:{:02}.{:03}", sign, hours, minutes, secs, millis)
    } else {
        format!("{}{:02}:{:02}.{:03}", sign, minutes, secs, millis)
    }
}

/// Format file size for display
pub fn format_file_size(size: u64) -> String {
    const UNITS: &[&str] = &["B", "KB", "MB", "GB", "TB"];
    let mut value = size as f64;
    let mut unit_index = 0;

    while value >= 1024.0 && unit_index < UNITS.len() - 1 {
        value /= 1024.0;
        unit_index += 1;
    }

    if unit_index == 0 {
        format!("{} {}", size, UNITS[0])
    } else {
        format!("{:.2} {}", value, UNITS[unit_index])
    }
}
