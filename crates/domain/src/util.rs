use std::time::{SystemTime, UNIX_EPOCH};

use time::{OffsetDateTime, format_description::well_known::Rfc3339};
use uuid::Uuid;

use crate::error::DomainError;

pub const MS_PER_HOUR: i64 = 60 * 60 * 1000;

pub fn uuid_v7_without_dashes() -> String {
    Uuid::now_v7().simple().to_string()
}

pub fn now_ms() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as i64
}

pub fn format_ms_rfc3339(epoch_ms: i64) -> String {
    let value = OffsetDateTime::from_unix_timestamp_nanos(epoch_ms as i128 * 1_000_000)
        .unwrap_or(OffsetDateTime::UNIX_EPOCH);
    value
        .format(&Rfc3339)
        .unwrap_or_else(|_| "1970-01-01T00:00:00Z".to_string())
}

pub fn parse_rfc3339_ms(value: &str) -> crate::DomainResult<i64> {
    let datetime = OffsetDateTime::parse(value, &Rfc3339)
        .map_err(|err| DomainError::integrity(format!("invalid datetime '{value}': {err}")))?;
    Ok((datetime.unix_timestamp_nanos() / 1_000_000) as i64)
}

/// Trims `value` and enforces a non-empty, bounded body.
pub fn normalize_content(field: &str, value: &str, max_chars: usize) -> crate::DomainResult<String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(DomainError::Validation(format!("{field} is required")));
    }
    if trimmed.chars().count() > max_chars {
        return Err(DomainError::Validation(format!(
            "{field} exceeds max length of {max_chars}"
        )));
    }
    Ok(trimmed.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rfc3339_round_trips_millisecond_precision() {
        let formatted = format_ms_rfc3339(1_739_750_400_123);
        assert_eq!(parse_rfc3339_ms(&formatted).unwrap(), 1_739_750_400_123);
    }

    #[test]
    fn content_is_trimmed_and_bounded() {
        assert_eq!(normalize_content("content", "  hi  ", 10).unwrap(), "hi");
        assert!(normalize_content("content", "   ", 10).is_err());
        assert!(normalize_content("content", &"x".repeat(11), 10).is_err());
    }
}
