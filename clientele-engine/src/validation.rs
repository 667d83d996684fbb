//! Input normalisation shared by the services

use clientele_core::{
    parse_timestamp, CrmResult, OptionParseError, PhoneLabel, Timestamp, ValidationError,
};
use std::str::FromStr;

/// Trim; blank becomes `None`.
pub fn clean(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

/// Non-blank value or `MissingField`.
pub fn required(field: &str, value: Option<String>) -> CrmResult<String> {
    clean(value).ok_or_else(|| ValidationError::missing(field).into())
}

/// Parse an optional option-set value. Blank is `None`; anything outside the
/// set is rejected.
pub fn option<T>(value: Option<String>) -> CrmResult<Option<T>>
where
    T: FromStr<Err = OptionParseError>,
{
    match clean(value) {
        Some(raw) => Ok(Some(raw.parse::<T>()?)),
        None => Ok(None),
    }
}

/// Canonical phone number.
///
/// Separators are stripped. Ten digits are read as a North American number
/// and get `+1`; eleven digits starting with `1` get `+`; an explicit
/// leading `+` with 8 to 15 digits is kept. Anything else is invalid.
pub fn normalize_phone(field: &str, raw: &str) -> CrmResult<String> {
    let trimmed = raw.trim();
    let digits: String = trimmed.chars().filter(char::is_ascii_digit).collect();
    let international = trimmed.starts_with('+');
    let normalized = match digits.len() {
        10 if !international => Some(format!("+1{digits}")),
        11 if digits.starts_with('1') => Some(format!("+{digits}")),
        8..=15 if international => Some(format!("+{digits}")),
        _ => None,
    };
    normalized.ok_or_else(|| {
        ValidationError::invalid(field, format!("'{trimmed}' is not a phone number")).into()
    })
}

/// Normalise an optional phone. Blank is `None`.
pub fn phone(field: &str, value: Option<String>) -> CrmResult<Option<String>> {
    clean(value)
        .map(|raw| normalize_phone(field, &raw))
        .transpose()
}

pub fn phone_label(value: Option<String>) -> CrmResult<Option<PhoneLabel>> {
    option::<PhoneLabel>(value)
}

/// Lenient date for project start and end. Unparseable input is `None`.
pub fn loose_timestamp(value: Option<String>) -> Option<Timestamp> {
    clean(value).and_then(|raw| parse_timestamp(&raw))
}
