//! Foundational low-level utilities shared across substitute-bot crates.
//!
//! Provides time helpers used by store expiry calculations and text helpers
//! used when decoding upstream payloads and rendering error context.

pub mod text_utils;
pub mod time_utils;

pub use text_utils::{truncate_for_error, unescape_html_entities};
pub use time_utils::{current_unix_timestamp_ms, is_expired_unix_ms};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn time_utils_timestamp_is_in_milliseconds() {
        assert!(current_unix_timestamp_ms() > 1_500_000_000_000);
    }

    #[test]
    fn is_expired_unix_ms_respects_none_and_bounds() {
        let now = current_unix_timestamp_ms();
        assert!(!is_expired_unix_ms(None, now));
        assert!(is_expired_unix_ms(Some(now), now));
        assert!(is_expired_unix_ms(Some(now.saturating_sub(1)), now));
        assert!(!is_expired_unix_ms(Some(now.saturating_add(1)), now));
    }
}
