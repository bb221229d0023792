//! Custom Askama template filters.

#![allow(clippy::unnecessary_wraps)]

use std::fmt::Display;

/// Returns the current year.
///
/// Usage in templates: `{{ ""|current_year }}`
#[askama::filter_fn]
pub fn current_year(_value: impl Display, _env: &dyn askama::Values) -> askama::Result<i32> {
    use chrono::Datelike;
    Ok(chrono::Utc::now().year())
}

/// Numeric tail of a Shopify GID, for use in URLs.
///
/// Usage in templates: `{{ discount.id|gid_tail }}`
#[askama::filter_fn]
pub fn gid_tail(value: impl Display, _env: &dyn askama::Values) -> askama::Result<String> {
    Ok(crate::shopify::gid_tail(&value.to_string()).to_string())
}

/// Human-readable byte size.
///
/// Usage in templates: `{{ file.byte_size|file_size }}`
#[askama::filter_fn]
pub fn file_size(value: impl Display, _env: &dyn askama::Values) -> askama::Result<String> {
    let bytes: u64 = value.to_string().parse().unwrap_or(0);
    Ok(human_size(bytes))
}

/// `2048` → `2.0 KB`.
#[allow(clippy::cast_precision_loss)]
pub fn human_size(bytes: u64) -> String {
    if bytes < 1024 {
        return format!("{bytes} B");
    }
    let mut size = bytes as f64;
    let mut unit = "B";
    for next in ["KB", "MB", "GB", "TB"] {
        if size < 1024.0 {
            break;
        }
        size /= 1024.0;
        unit = next;
    }
    format!("{size:.1} {unit}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_human_size() {
        assert_eq!(human_size(512), "512 B");
        assert_eq!(human_size(2048), "2.0 KB");
        assert_eq!(human_size(10 * 1024 * 1024), "10.0 MB");
    }
}
