//! Phone number validation and canonicalization.
//!
//! Numbers are keyed in the roster by a North-American-biased E.164-ish
//! form: ten digit numbers get a `+1` prefix, eleven digit numbers starting
//! with `1` get a `+`. Anything else is kept as supplied.

/// Check whether a string looks like a dialable phone number.
///
/// Whitespace, dashes and parentheses are ignored. Accepts 8-15 bare digits
/// (which covers 10 digit and `1`-prefixed 11 digit numbers) or `+` followed
/// by 10-15 digits.
pub fn is_valid_phone(raw: &str) -> bool {
    let stripped: String = raw
        .chars()
        .filter(|c| !c.is_whitespace() && *c != '-' && *c != '(' && *c != ')')
        .collect();

    if let Some(rest) = stripped.strip_prefix('+') {
        return all_digits(rest) && (10..=15).contains(&rest.len());
    }

    all_digits(&stripped) && (8..=15).contains(&stripped.len())
}

/// Canonicalize a phone number. Never fails; unrecognized shapes are
/// returned unchanged.
pub fn canonicalize(raw: &str) -> String {
    let digits: String = raw.chars().filter(|c| c.is_ascii_digit()).collect();

    if digits.len() == 10 {
        format!("+1{}", digits)
    } else if digits.len() == 11 && digits.starts_with('1') {
        format!("+{}", digits)
    } else {
        raw.to_string()
    }
}

/// Returns true if `s` is non-empty and made only of ASCII digits.
pub(crate) fn all_digits(s: &str) -> bool {
    !s.is_empty() && s.chars().all(|c| c.is_ascii_digit())
}
