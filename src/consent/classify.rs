//! Inbound reply classification.

use regex::Regex;
use std::sync::OnceLock;

const EMAIL_PATTERN: &str = r"[A-Za-z0-9._%+\-]+@[A-Za-z0-9.\-]+\.[A-Za-z]{2,}";

/// What an inbound SMS body asks for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Intent {
    Affirm,
    Decline,
    EmailSupplied(String),
    Unknown,
}

impl Intent {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Affirm => "affirm",
            Self::Decline => "decline",
            Self::EmailSupplied(_) => "email",
            Self::Unknown => "unknown",
        }
    }
}

fn email_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(EMAIL_PATTERN).expect("email pattern compiles"))
}

fn full_email_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(&format!("^{}$", EMAIL_PATTERN)).expect("email pattern compiles"))
}

/// Classify a raw SMS body. Only an exact (trimmed, case-insensitive) `YES`,
/// `NO` or `STOP` counts as a command; otherwise the first email-shaped
/// substring wins.
pub fn classify(body: &str) -> Intent {
    let trimmed = body.trim();
    let upper = trimmed.to_uppercase();

    if upper == "YES" {
        return Intent::Affirm;
    }
    if upper == "NO" || upper == "STOP" {
        return Intent::Decline;
    }

    // An "EMAIL" prefix without an address is still just noise
    match extract_email(trimmed) {
        Some(address) => Intent::EmailSupplied(address),
        None => Intent::Unknown,
    }
}

/// First email-shaped substring of `text`, verbatim.
pub fn extract_email(text: &str) -> Option<String> {
    email_regex().find(text).map(|m| m.as_str().to_string())
}

/// True if the whole string is an email address.
pub fn is_valid_email(s: &str) -> bool {
    full_email_regex().is_match(s)
}
