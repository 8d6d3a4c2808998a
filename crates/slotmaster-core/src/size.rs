//! Human-readable byte quantities ("512MB", "1.5GB").

use crate::error::ConfigError;

pub const KB: u64 = 1024;
pub const MB: u64 = KB * 1024;
pub const GB: u64 = MB * 1024;
pub const TB: u64 = GB * 1024;
pub const PB: u64 = TB * 1024;

/// Parse a size string like "512MB", "1.5GB", "64k" or "1024" into bytes.
///
/// A bare number is taken as bytes. Units are binary and case-insensitive.
pub fn parse_size(s: &str) -> Result<u64, ConfigError> {
    let s = s.trim();
    let split = s
        .find(|c: char| !(c.is_ascii_digit() || c == '.'))
        .unwrap_or(s.len());
    let (number, unit) = s.split_at(split);

    let value: f64 = number
        .parse()
        .map_err(|_| ConfigError::InvalidSize(s.to_string()))?;

    let multiplier = match unit.trim().to_ascii_uppercase().as_str() {
        "" | "B" => 1,
        "K" | "KB" => KB,
        "M" | "MB" => MB,
        "G" | "GB" => GB,
        "T" | "TB" => TB,
        "P" | "PB" => PB,
        _ => return Err(ConfigError::InvalidSize(s.to_string())),
    };

    Ok((value * multiplier as f64) as u64)
}

/// Format a byte count the way the launched processes expect it.
///
/// Each unit is kept while the value stays at or below 5 of the next
/// unit, so 1 GiB renders as "1024.00MB".
pub fn format_bytes(bytes: u64) -> String {
    const STEP_LIMIT: f64 = 1024.0 * 5.0;

    let mut value = bytes as f64;
    if value <= STEP_LIMIT {
        return format!("{bytes}B");
    }
    for unit in ["KB", "MB", "GB", "TB"] {
        value /= 1024.0;
        if value <= STEP_LIMIT {
            return format!("{value:.2}{unit}");
        }
    }
    format!("{:.2}PB", value / 1024.0)
}
