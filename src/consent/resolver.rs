//! Match a transport-reported sender number to a roster entry.
//!
//! Providers and spreadsheets disagree about `+` and country-code prefixes,
//! so lookup tries a fixed sequence of spellings and the first stored one
//! wins. The resolver never creates records.

use anyhow::Result;

use crate::db::Database;
use crate::phone::{all_digits, canonicalize};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolution {
    /// Canonical phone of the matching roster entry.
    Found(String),
    NotFound,
}

impl Resolution {
    pub fn phone(&self) -> Option<&str> {
        match self {
            Self::Found(phone) => Some(phone),
            Self::NotFound => None,
        }
    }
}

/// Spellings of `phone` to try, in order, without duplicates.
pub fn lookup_variants(phone: &str) -> Vec<String> {
    let mut variants: Vec<String> = Vec::with_capacity(5);
    let mut push = |candidate: String| {
        if !candidate.is_empty() && !variants.contains(&candidate) {
            variants.push(candidate);
        }
    };

    push(phone.to_string());

    if let Some(rest) = phone.strip_prefix('+') {
        push(rest.to_string());
    } else if all_digits(phone) {
        push(format!("+{}", phone));
    }

    if let Some(rest) = phone.strip_prefix("+1") {
        push(rest.to_string());
    } else if let Some(rest) = phone.strip_prefix('1') {
        push(rest.to_string());
    }

    // Bare ten digit numbers only meet their stored form through the
    // canonical `+1` spelling
    push(canonicalize(phone));

    variants
}

/// Find the stored phone matching `phone` under any of its variants.
pub fn resolve(db: &Database, phone: &str) -> Result<Resolution> {
    for candidate in lookup_variants(phone.trim()) {
        if db.participant_exists(&candidate)? {
            return Ok(Resolution::Found(candidate));
        }
    }
    Ok(Resolution::NotFound)
}
