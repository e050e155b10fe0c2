//! Input validation applied before anything reaches a store.

use crate::error::QueueError;

/// Largest number the service accepts for `current`, `issued`, passed
/// numbers, appointments and subscriptions.
pub const MAX_NUMBER: u64 = 999_999;

/// Maximum length of a line name.
const MAX_NAME_LEN: usize = 64;

/// Maximum length of a line prefix.
const MAX_PREFIX_LEN: usize = 8;

/// Maximum length of an announcement or featured-link caption.
const MAX_TEXT_LEN: usize = 500;

/// Check a queue number is within `0..=MAX_NUMBER`.
///
/// # Errors
///
/// Returns [`QueueError::InvalidArgument`] when out of range.
pub fn number(value: u64) -> Result<u64, QueueError> {
    if value > MAX_NUMBER {
        return Err(QueueError::InvalidArgument(format!(
            "number {value} exceeds {MAX_NUMBER}"
        )));
    }
    Ok(value)
}

/// Parse a non-negative integer from free text (chat-bot input).
///
/// # Errors
///
/// Returns [`QueueError::InvalidArgument`] for anything other than
/// decimal digits in range.
pub fn parse_number(text: &str) -> Result<u64, QueueError> {
    let trimmed = text.trim();
    if trimmed.is_empty() || !trimmed.bytes().all(|b| b.is_ascii_digit()) {
        return Err(QueueError::InvalidArgument(format!(
            "{trimmed:?} is not a non-negative integer"
        )));
    }
    let value = trimmed
        .parse::<u64>()
        .map_err(|e| QueueError::InvalidArgument(format!("{trimmed:?}: {e}")))?;
    number(value)
}

/// Check a positive number (appointments and subscriptions).
///
/// # Errors
///
/// Returns [`QueueError::InvalidArgument`] for zero or out-of-range values.
pub fn positive_number(value: u64) -> Result<u64, QueueError> {
    if value == 0 {
        return Err(QueueError::InvalidArgument("number must be positive".to_owned()));
    }
    number(value)
}

/// Normalize and check a line prefix: ASCII alphanumeric, upper-cased.
///
/// # Errors
///
/// Returns [`QueueError::InvalidArgument`] for empty, long or non-ASCII
/// prefixes.
pub fn prefix(value: &str) -> Result<String, QueueError> {
    let trimmed = value.trim();
    if trimmed.is_empty()
        || trimmed.len() > MAX_PREFIX_LEN
        || !trimmed.chars().all(|c| c.is_ascii_alphanumeric())
    {
        return Err(QueueError::InvalidArgument(format!(
            "prefix {trimmed:?} must be 1-{MAX_PREFIX_LEN} ASCII letters or digits"
        )));
    }
    Ok(trimmed.to_ascii_uppercase())
}

/// Check a line name.
///
/// # Errors
///
/// Returns [`QueueError::InvalidArgument`] for empty or overlong names.
pub fn name(value: &str) -> Result<String, QueueError> {
    bounded_text("name", value, MAX_NAME_LEN)
}

/// Check free text such as announcements and link captions.
///
/// # Errors
///
/// Returns [`QueueError::InvalidArgument`] for empty or overlong text.
pub fn text(field: &str, value: &str) -> Result<String, QueueError> {
    bounded_text(field, value, MAX_TEXT_LEN)
}

fn bounded_text(field: &str, value: &str, max: usize) -> Result<String, QueueError> {
    let trimmed = value.trim();
    if trimmed.is_empty() || trimmed.chars().count() > max {
        return Err(QueueError::InvalidArgument(format!(
            "{field} must be 1-{max} characters"
        )));
    }
    Ok(trimmed.to_owned())
}

/// Check a CSS color of the form `#rgb` or `#rrggbb`.
///
/// # Errors
///
/// Returns [`QueueError::InvalidArgument`] for anything else.
pub fn color(value: &str) -> Result<String, QueueError> {
    let hex = value.strip_prefix('#').unwrap_or("");
    if (hex.len() == 3 || hex.len() == 6) && hex.chars().all(|c| c.is_ascii_hexdigit()) {
        Ok(value.to_ascii_lowercase())
    } else {
        Err(QueueError::InvalidArgument(format!(
            "color {value:?} must be #rgb or #rrggbb"
        )))
    }
}

/// Check an `http(s)` link.
///
/// # Errors
///
/// Returns [`QueueError::InvalidArgument`] for other schemes.
pub fn url(value: &str) -> Result<String, QueueError> {
    let trimmed = value.trim();
    if (trimmed.starts_with("https://") || trimmed.starts_with("http://"))
        && trimmed.len() <= MAX_TEXT_LEN
        && !trimmed.contains(char::is_whitespace)
    {
        Ok(trimmed.to_owned())
    } else {
        Err(QueueError::InvalidArgument(format!(
            "{trimmed:?} is not an http(s) link"
        )))
    }
}

/// Check an external subscriber identity.
///
/// # Errors
///
/// Returns [`QueueError::InvalidArgument`] for empty, overlong or
/// whitespace-containing ids.
pub fn subscriber_id(value: &str) -> Result<&str, QueueError> {
    if value.is_empty() || value.len() > 128 || value.contains(char::is_whitespace) {
        return Err(QueueError::InvalidArgument(
            "subscriber id must be 1-128 non-space characters".to_owned(),
        ));
    }
    Ok(value)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn numbers_must_be_plain_digits_in_range() {
        assert_eq!(parse_number(" 42 ").ok(), Some(42));
        assert!(parse_number("-1").is_err());
        assert!(parse_number("4.2").is_err());
        assert!(parse_number("").is_err());
        assert!(parse_number("1000000").is_err());
        assert!(positive_number(0).is_err());
    }

    #[test]
    fn prefixes_are_upper_cased_ascii() {
        assert_eq!(prefix(" b2 ").ok().as_deref(), Some("B2"));
        assert!(prefix("A-1").is_err());
        assert!(prefix("").is_err());
    }

    #[test]
    fn colors_and_links_are_checked() {
        assert_eq!(color("#ABC").ok().as_deref(), Some("#abc"));
        assert!(color("red").is_err());
        assert!(url("https://example.com/menu").is_ok());
        assert!(url("javascript:alert(1)").is_err());
    }
}
