//! Two-section CSV dump of the roster and the inbound message log.

use anyhow::Result;
use chrono::{DateTime, Utc};
use csv::{Writer, WriterBuilder};

use crate::db::{format_timestamp, Database};
use crate::models::{Attribute, Participant, Response};

pub const PARTICIPANTS_MARKER: &str = "## PARTICIPANTS";
pub const RESPONSES_MARKER: &str = "## RESPONSES";

const PARTICIPANT_HEADERS: [&str; 6] = [
    "phone",
    "consent_status",
    "consent_timestamp",
    "email",
    "survey_sent",
    "created_at",
];
const RESPONSE_HEADERS: [&str; 4] = ["id", "phone", "body", "received_at"];

/// Attachment name for an export taken at `at`.
pub fn export_filename(at: &DateTime<Utc>) -> String {
    format!("survey_data_{}.csv", at.format("%Y%m%d_%H%M%S"))
}

fn participant_record(p: &Participant) -> Vec<String> {
    let mut record = vec![
        p.phone.clone(),
        p.consent_status.as_str().to_string(),
        p.consent_timestamp
            .as_ref()
            .map(format_timestamp)
            .unwrap_or_default(),
        p.email.clone().unwrap_or_default(),
        (p.survey_sent as u8).to_string(),
        format_timestamp(&p.created_at),
    ];
    record.extend(
        Attribute::ALL
            .iter()
            .map(|attr| p.attributes.get(*attr).unwrap_or("").to_string()),
    );
    record
}

fn response_record(r: &Response) -> [String; 4] {
    [
        r.id.to_string(),
        r.phone.clone(),
        r.body.clone(),
        format_timestamp(&r.received_at),
    ]
}

/// Sections mix a one-field marker row with wider rows.
fn section_writer() -> Writer<Vec<u8>> {
    WriterBuilder::new().flexible(true).from_writer(Vec::new())
}

fn participants_section(participants: &[Participant]) -> Result<Vec<u8>> {
    let mut writer = section_writer();
    writer.write_record([PARTICIPANTS_MARKER])?;

    let mut headers: Vec<&str> = PARTICIPANT_HEADERS.to_vec();
    headers.extend(Attribute::ALL.iter().map(|a| a.column()));
    writer.write_record(&headers)?;

    for p in participants {
        writer.write_record(participant_record(p))?;
    }
    finish(writer)
}

fn responses_section(responses: &[Response]) -> Result<Vec<u8>> {
    let mut writer = section_writer();
    writer.write_record([RESPONSES_MARKER])?;
    writer.write_record(RESPONSE_HEADERS)?;

    for r in responses {
        writer.write_record(response_record(r))?;
    }
    finish(writer)
}

fn finish(writer: Writer<Vec<u8>>) -> Result<Vec<u8>> {
    writer
        .into_inner()
        .map_err(|e| anyhow::anyhow!("Failed to write CSV: {}", e.error()))
}

/// Render every participant and response as one CSV document: the
/// participants section, a blank line, then the responses section.
pub fn export_csv(db: &Database) -> Result<Vec<u8>> {
    let participants = db.list_participants()?;
    let responses = db.list_responses()?;

    let mut out = participants_section(&participants)?;
    out.push(b'\n');
    out.extend(responses_section(&responses)?);
    Ok(out)
}
