//! Time-derived item identifiers.
//!
//! Identifiers look like `WM20250101143005`: the prefix followed by the
//! creation instant in the municipality's local zone, to the second. They
//! sort by creation time. Registrations that land in the same second get a
//! `-2`, `-3`, ... suffix.

use time::{OffsetDateTime, UtcOffset};

/// The unsuffixed identifier for an item created at `now`.
pub fn base_item_id(prefix: &str, now: OffsetDateTime, offset: UtcOffset) -> String {
    let local = now.to_offset(offset);
    format!(
        "{prefix}{:04}{:02}{:02}{:02}{:02}{:02}",
        local.year(),
        u8::from(local.month()),
        local.day(),
        local.hour(),
        local.minute(),
        local.second()
    )
}

/// The identifier to try on the given 1-based attempt.
pub fn candidate(base: &str, attempt: u32) -> String {
    if attempt <= 1 {
        base.to_string()
    } else {
        format!("{base}-{attempt}")
    }
}

#[cfg(test)]
mod tests {
    use time::macros::{datetime, offset};

    use super::*;

    #[test]
    fn formats_in_local_zone() {
        let now = datetime!(2025-03-09 22:04:05 UTC);
        assert_eq!(base_item_id("WM", now, offset!(+8)), "WM20250310060405");
        assert_eq!(base_item_id("WM", now, UtcOffset::UTC), "WM20250309220405");
    }

    #[test]
    fn suffixes_start_at_two() {
        assert_eq!(candidate("WM1", 1), "WM1");
        assert_eq!(candidate("WM1", 2), "WM1-2");
        assert_eq!(candidate("WM1", 10), "WM1-10");
    }
}
