// ============================
// parley-relay-lib/src/validation.rs
// ============================
//! Inbound message validation.

use regex::Regex;
use std::sync::LazyLock;
use thiserror::Error;

// Common validation constants
const MAX_EVENT_ID_LENGTH: usize = 64;
const MAX_DISPLAY_NAME_LENGTH: usize = 100;

// Regex patterns for validation
static EVENT_ID_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[a-zA-Z0-9_-]+$").unwrap());
static DISPLAY_NAME_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[^<>/\\{}()\[\];]*$").unwrap());

/// Possible validation errors
#[derive(Error, Debug)]
pub enum ValidationError {
    #[error("Invalid event ID: {0}")]
    InvalidEventId(String),

    #[error("Invalid display name: {0}")]
    InvalidDisplayName(String),
}

/// Result type for validation operations
pub type ValidationResult<T> = Result<T, ValidationError>;

/// Validate an event identifier
pub fn validate_event_id(event_id: &str) -> ValidationResult<&str> {
    if event_id.is_empty() {
        return Err(ValidationError::InvalidEventId(
            "Event ID must not be empty".to_string(),
        ));
    }

    if event_id.len() > MAX_EVENT_ID_LENGTH {
        return Err(ValidationError::InvalidEventId(format!(
            "Event ID cannot exceed {MAX_EVENT_ID_LENGTH} characters"
        )));
    }

    if !EVENT_ID_REGEX.is_match(event_id) {
        return Err(ValidationError::InvalidEventId(
            "Event ID must contain only alphanumeric characters, hyphens and underscores"
                .to_string(),
        ));
    }

    Ok(event_id)
}

/// Validate a display name supplied with `enter`
pub fn validate_display_name(name: &str) -> ValidationResult<&str> {
    if name.len() > MAX_DISPLAY_NAME_LENGTH {
        return Err(ValidationError::InvalidDisplayName(format!(
            "Display name cannot exceed {MAX_DISPLAY_NAME_LENGTH} characters"
        )));
    }

    if !DISPLAY_NAME_REGEX.is_match(name) {
        return Err(ValidationError::InvalidDisplayName(
            "Display name contains forbidden characters".to_string(),
        ));
    }

    Ok(name)
}

/// Trimmed display name, falling back to the event id when absent or blank
pub fn normalize_display_name(name: Option<&str>, event_id: &str) -> String {
    match name.map(str::trim) {
        Some(trimmed) if !trimmed.is_empty() => trimmed.to_string(),
        _ => event_id.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_event_id() {
        assert!(validate_event_id("spring-fair").is_ok());
        assert!(validate_event_id("a").is_ok());
        assert!(validate_event_id("Fair_2026").is_ok());

        assert!(validate_event_id("").is_err());
        assert!(validate_event_id("has spaces").is_err());
        assert!(validate_event_id("<script>").is_err());
        assert!(validate_event_id(&"x".repeat(65)).is_err());
    }

    #[test]
    fn test_validate_display_name() {
        assert!(validate_display_name("Spring Fair").is_ok());
        assert!(validate_display_name("").is_ok());

        assert!(validate_display_name("<img>").is_err());
        assert!(validate_display_name(&"x".repeat(101)).is_err());
    }

    #[test]
    fn test_normalize_display_name() {
        assert_eq!(
            normalize_display_name(Some("  Spring Fair "), "spring-fair"),
            "Spring Fair"
        );
        assert_eq!(normalize_display_name(Some("   "), "spring-fair"), "spring-fair");
        assert_eq!(normalize_display_name(None, "spring-fair"), "spring-fair");
    }
}
