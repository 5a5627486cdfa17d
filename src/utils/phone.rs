// src/utils/phone.rs
//! Kenyan MSISDN handling. The gateway only accepts `254XXXXXXXXX`.

use crate::errors::{RideShareError, RideShareResult};

pub const KENYA_COUNTRY_CODE: &str = "254";

/// Normalize any common Kenyan notation to `254XXXXXXXXX`.
///
/// Spaces, dashes, brackets and a leading `+` are dropped. Returns `None` when
/// the digits do not form a Kenyan number of the right length.
pub fn normalize_kenyan_phone(input: &str) -> Option<String> {
    let digits: String = input.chars().filter(|c| c.is_ascii_digit()).collect();

    let normalized = match digits.len() {
        // 0712345678
        10 if digits.starts_with('0') => format!("{}{}", KENYA_COUNTRY_CODE, &digits[1..]),
        // 712345678
        9 => format!("{}{}", KENYA_COUNTRY_CODE, digits),
        // 254712345678 or +254712345678
        12 if digits.starts_with(KENYA_COUNTRY_CODE) => digits,
        _ => return None,
    };

    Some(normalized)
}

/// True for numbers on Kenyan mobile ranges (07xx, 01xx and 00xx subscriber prefixes).
pub fn is_valid_kenyan_mobile(input: &str) -> bool {
    match normalize_kenyan_phone(input) {
        Some(number) => matches!(number.as_bytes()[3], b'7' | b'1' | b'0'),
        None => false,
    }
}

/// Normalize and validate in one step, as handlers need it.
pub fn parse_kenyan_mobile(field: &str, input: &str) -> RideShareResult<String> {
    if !is_valid_kenyan_mobile(input) {
        return Err(RideShareError::validation_error(field, "Invalid Kenyan phone number"));
    }
    normalize_kenyan_phone(input)
        .ok_or_else(|| RideShareError::validation_error(field, "Invalid Kenyan phone number"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalizes_common_notations() {
        assert_eq!(normalize_kenyan_phone("0712345678").as_deref(), Some("254712345678"));
        assert_eq!(normalize_kenyan_phone("712345678").as_deref(), Some("254712345678"));
        assert_eq!(normalize_kenyan_phone("254712345678").as_deref(), Some("254712345678"));
        assert_eq!(normalize_kenyan_phone("+254 712 345 678").as_deref(), Some("254712345678"));
        assert_eq!(normalize_kenyan_phone("0110-123-456").as_deref(), Some("254110123456"));
    }

    #[test]
    fn rejects_wrong_lengths_and_countries() {
        assert_eq!(normalize_kenyan_phone("12345"), None);
        assert_eq!(normalize_kenyan_phone("+255712345678"), None);
        assert_eq!(normalize_kenyan_phone(""), None);
    }

    #[test]
    fn validates_mobile_prefixes() {
        assert!(is_valid_kenyan_mobile("0712345678"));
        assert!(is_valid_kenyan_mobile("0112345678"));
        assert!(!is_valid_kenyan_mobile("0212345678"));
        assert!(!is_valid_kenyan_mobile("254512345678"));
    }

    #[test]
    fn parse_reports_field_on_failure() {
        assert_eq!(parse_kenyan_mobile("phone_number", "0712 345 678").unwrap(), "254712345678");
        let err = parse_kenyan_mobile("phone_number", "0212345678").unwrap_err();
        assert!(matches!(err, RideShareError::ValidationFailed(ref errors) if errors[0].field == "phone_number"));
    }
}
