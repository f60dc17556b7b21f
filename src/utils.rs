use libsql::Value;
use time::{
    Date, OffsetDateTime, UtcOffset, format_description::well_known::Rfc3339,
    macros::format_description,
};

use crate::error::{ApiError, ApiResult};

pub fn validate_string_length(value: &str, field_name: &str, max_length: usize) -> ApiResult<()> {
    if value.trim().is_empty() {
        return Err(ApiError::bad_request(format!(
            "{} cannot be empty",
            field_name
        )));
    }
    if value.len() > max_length {
        return Err(ApiError::bad_request(format!(
            "{} must be less than {} characters",
            field_name, max_length
        )));
    }
    Ok(())
}

/// Unwraps a required text field, validates it and returns it trimmed.
pub fn require_text(value: Option<String>, field_name: &str, max_length: usize) -> ApiResult<String> {
    let value = value.ok_or_else(|| ApiError::bad_request(format!("{} is required", field_name)))?;
    validate_string_length(&value, field_name, max_length)?;
    Ok(value.trim().to_string())
}

pub fn validate_amount(amount: f64, field_name: &str) -> ApiResult<f64> {
    if !amount.is_finite() {
        return Err(ApiError::bad_request(format!(
            "{} must be a finite number",
            field_name
        )));
    }
    Ok(amount)
}

pub fn require_amount(amount: Option<f64>, field_name: &str) -> ApiResult<f64> {
    let amount = amount.ok_or_else(|| ApiError::bad_request(format!("{} is required", field_name)))?;
    validate_amount(amount, field_name)
}

/// Accepts an RFC 3339 timestamp or a plain `YYYY-MM-DD` date (midnight UTC).
/// Columns hold whole unix seconds, so parsed dates are moved to UTC and drop any fraction.
pub fn parse_date(value: &str) -> ApiResult<OffsetDateTime> {
    let value = value.trim();
    if let Ok(parsed) = OffsetDateTime::parse(value, &Rfc3339) {
        return Ok(whole_seconds(parsed.to_offset(UtcOffset::UTC)));
    }
    Date::parse(value, format_description!("[year]-[month]-[day]"))
        .map(|date| date.midnight().assume_utc())
        .map_err(|_| ApiError::bad_request(format!("Invalid date: {}", value)))
}

pub fn now() -> OffsetDateTime {
    whole_seconds(OffsetDateTime::now_utc())
}

fn whole_seconds(value: OffsetDateTime) -> OffsetDateTime {
    value.replace_nanosecond(0).unwrap_or(value)
}

pub fn from_timestamp(timestamp: i64) -> ApiResult<OffsetDateTime> {
    OffsetDateTime::from_unix_timestamp(timestamp)
        .map_err(|e| ApiError::Internal(anyhow::anyhow!("invalid stored timestamp: {}", e)))
}

/// Converts a nullable TEXT column value.
pub fn optional_text(value: Value) -> Option<String> {
    match value {
        Value::Text(text) => Some(text),
        _ => None,
    }
}

/// Reads a numeric column that SQLite may hand back as INTEGER or REAL.
pub fn numeric(value: Value) -> ApiResult<f64> {
    match value {
        Value::Real(real) => Ok(real),
        Value::Integer(int) => Ok(int as f64),
        other => Err(ApiError::Internal(anyhow::anyhow!(
            "expected a numeric column, found {:?}",
            other
        ))),
    }
}

pub fn optional_value(value: Option<String>) -> Value {
    value.map(Value::Text).unwrap_or(Value::Null)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::StatusCode;

    #[test]
    fn empty_text_is_rejected() {
        let err = validate_string_length("   ", "Category", 10).unwrap_err();
        assert_eq!(err.status(), StatusCode::BAD_REQUEST);
        assert_eq!(err.to_string(), "Category cannot be empty");
    }

    #[test]
    fn long_text_is_rejected() {
        let err = validate_string_length(&"a".repeat(11), "Category", 10).unwrap_err();
        assert!(err.to_string().contains("must be less than 10"));
    }

    #[test]
    fn required_text_is_trimmed() {
        let value = require_text(Some("  Rent  ".to_string()), "Category", 10).unwrap();
        assert_eq!(value, "Rent");
    }

    #[test]
    fn missing_required_text_is_reported() {
        let err = require_text(None, "Description", 10).unwrap_err();
        assert_eq!(err.to_string(), "Description is required");
    }

    #[test]
    fn parses_plain_dates_as_utc_midnight() {
        let date = parse_date("2024-03-15").unwrap();
        assert_eq!(date.year(), 2024);
        assert_eq!(u8::from(date.month()), 3);
        assert_eq!(date.day(), 15);
        assert_eq!(date.hour(), 0);
    }

    #[test]
    fn parses_rfc3339() {
        let date = parse_date("2024-03-15T10:30:00Z").unwrap();
        assert_eq!(date.hour(), 10);
        assert_eq!(date.minute(), 30);
    }

    #[test]
    fn rejects_garbage_dates() {
        assert!(parse_date("next tuesday").is_err());
    }

    #[test]
    fn parsed_dates_drop_fractional_seconds() {
        let date = parse_date("2024-03-15T10:30:00.843375345Z").unwrap();
        assert_eq!(date.nanosecond(), 0);
        assert_eq!(date.second(), 0);
        assert_eq!(date, from_timestamp(date.unix_timestamp()).unwrap());

        let shifted = parse_date("2024-03-15T16:00:00+05:30").unwrap();
        assert_eq!(shifted.offset(), UtcOffset::UTC);
        assert_eq!(shifted.hour(), 10);
        assert_eq!(shifted.minute(), 30);
    }

    #[test]
    fn now_matches_its_stored_form() {
        let current = now();
        assert_eq!(current.nanosecond(), 0);
        assert_eq!(current, from_timestamp(current.unix_timestamp()).unwrap());
    }

    #[test]
    fn numeric_columns_accept_both_storage_classes() {
        assert_eq!(numeric(Value::Integer(3)).unwrap(), 3.0);
        assert_eq!(numeric(Value::Real(2.5)).unwrap(), 2.5);
    }

    #[test]
    fn non_numeric_columns_are_internal_errors() {
        let err = numeric(Value::Null).unwrap_err();
        assert_eq!(err.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert!(numeric(Value::Text("12".to_string())).is_err());
    }

    #[test]
    fn non_finite_amounts_are_rejected() {
        assert!(validate_amount(f64::NAN, "Amount").is_err());
        assert!(require_amount(None, "Amount").is_err());
        assert_eq!(require_amount(Some(12.5), "Amount").unwrap(), 12.5);
    }
}
