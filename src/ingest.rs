//! Roster and phone-list ingestion from uploaded CSV files.
//!
//! Headers are free-form. The phone column is found by name heuristics and
//! demographic columns through [`ATTRIBUTE_ALIASES`]. Rows that fail phone
//! validation are reported, never silently dropped.

use std::collections::HashSet;

use csv::{ReaderBuilder, StringRecord};
use serde::Serialize;
use tracing::{info, warn};

use crate::db::Database;
use crate::error::{SurveyError, SurveyResult};
use crate::models::{Attribute, Attributes, BatchSummary, Participant};
use crate::phone::{canonicalize, is_valid_phone};

/// Header names (lowercase) accepted for each demographic column.
pub static ATTRIBUTE_ALIASES: &[(Attribute, &[&str])] = &[
    (Attribute::Calltime, &["calltime", "call_time", "call time"]),
    (
        Attribute::LastFedVoteIntent,
        &["lastfedvoteintent", "last_fed_vote_intent", "vote_intent", "voting_intent"],
    ),
    (Attribute::Gender, &["gender"]),
    (Attribute::Age, &["age"]),
    (Attribute::Education, &["education"]),
    (Attribute::PhoneType, &["phonetype", "phone_type", "phone type"]),
    (Attribute::Region, &["region"]),
    (Attribute::Notes, &["notes", "note", "comments"]),
];

const PHONE_HEADER: &str = "phone_number";
const PHONE_KEYWORDS: &[&str] = &["phone", "mobile", "cell", "contact", "number", "tel"];
const NULL_TOKENS: &[&str] = &["", "null", "none", "n/a"];

/// A data row that never made it into the roster.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RejectedRow {
    /// 1-based line in the uploaded file.
    pub line: u64,
    /// Raw phone cell as uploaded.
    pub value: String,
    pub reason: String,
}

/// Participants parsed from a roster CSV, deduplicated by canonical phone.
#[derive(Debug, Default)]
pub struct ParsedRoster {
    pub participants: Vec<Participant>,
    pub rejected: Vec<RejectedRow>,
    pub duplicates: usize,
}

/// Outcome of a roster upload.
#[derive(Debug, Default, Serialize)]
pub struct IngestReport {
    /// `success` lists stored phones; `failed` lists store errors.
    #[serde(flatten)]
    pub summary: BatchSummary,
    /// How many of the stored phones were new to the roster.
    pub created: usize,
    pub rejected: Vec<RejectedRow>,
    pub duplicates: usize,
}

/// Canonical phones parsed from a mass-SMS upload.
#[derive(Debug, Default, Serialize)]
pub struct PhoneList {
    pub phones: Vec<String>,
    pub rejected: Vec<RejectedRow>,
}

// ==================== HEADERS ====================

fn normalize_header(header: &str) -> String {
    header.trim().to_lowercase()
}

/// Index of the phone column, if any header looks like one.
pub fn find_phone_column(headers: &[String]) -> Option<usize> {
    headers
        .iter()
        .position(|h| h == PHONE_HEADER)
        .or_else(|| {
            headers
                .iter()
                .position(|h| PHONE_KEYWORDS.iter().any(|k| h.contains(k)))
        })
}

/// Column index for each attribute the headers provide.
fn map_attribute_columns(headers: &[String]) -> Vec<(Attribute, usize)> {
    ATTRIBUTE_ALIASES
        .iter()
        .filter_map(|(attr, aliases)| {
            headers
                .iter()
                .position(|h| aliases.contains(&h.as_str()))
                .map(|idx| (*attr, idx))
        })
        .collect()
}

fn is_null_token(value: &str) -> bool {
    let value = value.trim().to_lowercase();
    NULL_TOKENS.contains(&value.as_str())
}

// ==================== READING ====================

fn read_records(bytes: &[u8]) -> SurveyResult<Vec<StringRecord>> {
    let text = std::str::from_utf8(bytes)
        .map_err(|_| SurveyError::invalid("File is not valid UTF-8"))?;
    let text = text.strip_prefix('\u{feff}').unwrap_or(text);

    let mut reader = ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .from_reader(text.as_bytes());

    let records = reader
        .records()
        .collect::<Result<Vec<_>, csv::Error>>()?;

    if records.is_empty() {
        return Err(SurveyError::invalid("CSV file is empty"));
    }
    Ok(records)
}

fn line_of(record: &StringRecord, fallback: usize) -> u64 {
    record
        .position()
        .map(|p| p.line())
        .unwrap_or(fallback as u64 + 1)
}

fn headers_of(record: &StringRecord) -> Vec<String> {
    record.iter().map(normalize_header).collect()
}

// ==================== ROSTER ====================

/// Parse a roster CSV with a header row into participant records.
pub fn parse_roster(bytes: &[u8]) -> SurveyResult<ParsedRoster> {
    let records = read_records(bytes)?;
    if records.len() < 2 {
        return Err(SurveyError::invalid("CSV file is empty"));
    }
    let headers = headers_of(&records[0]);
    let phone_col = find_phone_column(&headers).unwrap_or(0);
    let columns = map_attribute_columns(&headers);

    let mut parsed = ParsedRoster::default();
    let mut seen = HashSet::new();

    for (idx, record) in records.iter().enumerate().skip(1) {
        let line = line_of(record, idx);
        let raw = record.get(phone_col).unwrap_or("").trim();

        if raw.is_empty() {
            parsed.rejected.push(RejectedRow {
                line,
                value: String::new(),
                reason: "Missing phone number".to_string(),
            });
            continue;
        }
        if !is_valid_phone(raw) {
            parsed.rejected.push(RejectedRow {
                line,
                value: raw.to_string(),
                reason: format!("Invalid phone number: {}", raw),
            });
            continue;
        }

        let phone = canonicalize(raw);
        if !seen.insert(phone.clone()) {
            parsed.duplicates += 1;
            continue;
        }

        let mut attributes = Attributes::default();
        for (attr, col) in &columns {
            let value = record.get(*col).unwrap_or("");
            if !is_null_token(value) {
                attributes.set(*attr, Some(value.trim().to_string()));
            }
        }

        parsed
            .participants
            .push(Participant::with_attributes(phone, attributes));
    }

    Ok(parsed)
}

/// Parse a roster CSV and upsert every participant it contains.
pub fn ingest_participants(db: &Database, bytes: &[u8]) -> SurveyResult<IngestReport> {
    let parsed = parse_roster(bytes)?;
    let mut report = IngestReport {
        rejected: parsed.rejected,
        duplicates: parsed.duplicates,
        ..Default::default()
    };

    for participant in &parsed.participants {
        match db.upsert_participant(participant) {
            Ok(created) => {
                if created {
                    report.created += 1;
                }
                report.summary.push_success(participant.phone.as_str());
            }
            Err(e) => {
                warn!(phone = participant.phone.as_str(), error = %e, "participant upsert failed");
                report.summary.push_failure(participant.phone.as_str(), e.to_string());
            }
        }
    }

    info!(
        stored = report.summary.success.len(),
        created = report.created,
        rejected = report.rejected.len(),
        duplicates = report.duplicates,
        "roster CSV ingested"
    );
    Ok(report)
}

// ==================== PHONE LISTS ====================

/// Parse a mass-SMS upload. The header row is optional.
pub fn parse_phone_list(bytes: &[u8]) -> SurveyResult<PhoneList> {
    let records = read_records(bytes)?;
    let headers = headers_of(&records[0]);

    let (col, skip) = match find_phone_column(&headers) {
        Some(col) => (col, 1),
        None => {
            let first = records[0].get(0).unwrap_or("").trim();
            if is_valid_phone(first) {
                (0, 0)
            } else {
                (0, 1)
            }
        }
    };

    let mut list = PhoneList::default();
    let mut seen = HashSet::new();

    for (idx, record) in records.iter().enumerate().skip(skip) {
        let raw = record.get(col).unwrap_or("").trim();
        if raw.is_empty() {
            continue;
        }
        if !is_valid_phone(raw) {
            list.rejected.push(RejectedRow {
                line: line_of(record, idx),
                value: raw.to_string(),
                reason: format!("Invalid phone number: {}", raw),
            });
            continue;
        }
        let phone = canonicalize(raw);
        if seen.insert(phone.clone()) {
            list.phones.push(phone);
        }
    }

    Ok(list)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{ConsentStatus, ParticipantPatch};
    use chrono::Utc;

    fn headers(names: &[&str]) -> Vec<String> {
        names.iter().map(|n| normalize_header(n)).collect()
    }

    #[test]
    fn test_find_phone_column() {
        assert_eq!(find_phone_column(&headers(&["Name", "Phone_Number"])), Some(1));
        assert_eq!(
            find_phone_column(&headers(&["cell", "phone_number"])),
            Some(1),
            "exact phone_number beats keyword match"
        );
        assert_eq!(find_phone_column(&headers(&["Name", "Mobile #"])), Some(1));
        assert_eq!(find_phone_column(&headers(&["Tel", "Name"])), Some(0));
        assert_eq!(find_phone_column(&headers(&["Name", "Age"])), None);
    }

    #[test]
    fn test_attribute_mapping() {
        let cols = map_attribute_columns(&headers(&[
            "phone",
            "Call Time",
            "Voting_Intent",
            "COMMENTS",
            "Age",
            "Unrelated",
        ]));
        assert_eq!(
            cols,
            vec![
                (Attribute::Calltime, 1),
                (Attribute::LastFedVoteIntent, 2),
                (Attribute::Age, 4),
                (Attribute::Notes, 3),
            ]
        );
    }

    #[test]
    fn test_null_tokens() {
        for token in ["", "  ", "NULL", "None", "n/a", " N/A "] {
            assert!(is_null_token(token), "{:?}", token);
        }
        assert!(!is_null_token("no"));
        assert!(!is_null_token("0"));
    }

    #[test]
    fn test_parse_roster() {
        let csv = "\u{feff}Phone Number,Gender,Age,Region,Notes\n\
                   647-555-1212,Female,34,Ontario,n/a\n\
                   ,Male,40,Quebec,\n\
                   abc,Male,40,Quebec,\n\
                   (647) 555 1212,Male,50,Alberta,dup\n\
                   +442079460958,null,,London,prefers evenings\n";

        let parsed = parse_roster(csv.as_bytes()).unwrap();

        assert_eq!(parsed.participants.len(), 2);
        assert_eq!(parsed.duplicates, 1);

        let first = &parsed.participants[0];
        assert_eq!(first.phone, "+16475551212");
        assert_eq!(first.attributes.gender.as_deref(), Some("Female"));
        assert_eq!(first.attributes.age.as_deref(), Some("34"));
        assert_eq!(first.attributes.region.as_deref(), Some("Ontario"));
        assert_eq!(first.attributes.notes, None);

        let second = &parsed.participants[1];
        assert_eq!(second.phone, "+442079460958");
        assert_eq!(second.attributes.gender, None);
        assert_eq!(second.attributes.age, None);
        assert_eq!(second.attributes.notes.as_deref(), Some("prefers evenings"));

        assert_eq!(parsed.rejected.len(), 2);
        assert_eq!(parsed.rejected[0].line, 3);
        assert_eq!(parsed.rejected[0].reason, "Missing phone number");
        assert_eq!(parsed.rejected[1].line, 4);
        assert_eq!(parsed.rejected[1].value, "abc");
    }

    #[test]
    fn test_falls_back_to_first_column() {
        let csv = "who,gender\n6475551212,F\n";
        let parsed = parse_roster(csv.as_bytes()).unwrap();
        assert_eq!(parsed.participants[0].phone, "+16475551212");
    }

    #[test]
    fn test_empty_and_bad_input() {
        assert!(matches!(parse_roster(b""), Err(SurveyError::InvalidInput(_))));
        let err = parse_roster(b"").unwrap_err();
        assert!(err.to_string().contains("empty"));

        let err = parse_roster(b"phone_number,gender\n").unwrap_err();
        assert_eq!(err.to_string(), "CSV file is empty");

        assert!(matches!(
            parse_roster(&[0xff, 0xfe, 0x00]),
            Err(SurveyError::InvalidInput(_))
        ));
    }

    #[test]
    fn test_ingest_dedup_and_created_at() {
        let db = Database::open_memory().unwrap();
        let csv = "phone_number,gender\n6475551212,F\n16475551212,M\n4165550100,M\n";

        let report = ingest_participants(&db, csv.as_bytes()).unwrap();
        assert_eq!(report.summary.success, vec!["+16475551212", "+14165550100"]);
        assert_eq!(report.created, 2);
        assert_eq!(report.duplicates, 1);
        assert_eq!(db.count_participants().unwrap(), 2);

        let original = db.find_participant("+16475551212").unwrap().unwrap();
        assert_eq!(original.attributes.gender.as_deref(), Some("F"));

        // Re-upload keeps created_at and consent, refreshes attributes
        db.update_participant("+16475551212", &ParticipantPatch::consent(Utc::now()))
            .unwrap();
        let again = ingest_participants(&db, b"phone_number,gender\n+16475551212,X\n").unwrap();
        assert_eq!(again.created, 0);

        let updated = db.find_participant("+16475551212").unwrap().unwrap();
        assert_eq!(updated.created_at, original.created_at);
        assert_eq!(updated.consent_status, ConsentStatus::Consented);
        assert_eq!(updated.attributes.gender.as_deref(), Some("X"));
        assert_eq!(db.count_participants().unwrap(), 2);
    }

    #[test]
    fn test_phone_list_with_header() {
        let csv = "name,mobile\nA,6475551212\nB,not-a-phone\nC,+16475551212\nD,\n";
        let list = parse_phone_list(csv.as_bytes()).unwrap();
        assert_eq!(list.phones, vec!["+16475551212"]);
        assert_eq!(list.rejected.len(), 1);
        assert_eq!(list.rejected[0].line, 3);
    }

    #[test]
    fn test_phone_list_without_header() {
        let csv = "6475551212\n4165550100\n";
        let list = parse_phone_list(csv.as_bytes()).unwrap();
        assert_eq!(list.phones, vec!["+16475551212", "+14165550100"]);

        // Unrecognised header is skipped and column 0 is used
        let csv = "recipients,x\n6475551212,1\n";
        let list = parse_phone_list(csv.as_bytes()).unwrap();
        assert_eq!(list.phones, vec!["+16475551212"]);
        assert!(list.rejected.is_empty());
    }
}
