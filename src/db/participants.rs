//! Roster operations: upsert, patch, lookup and filtered queries.

use anyhow::Result;
use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use rusqlite::types::Value;
use rusqlite::{params, OptionalExtension, Row, Transaction, TransactionBehavior};
use serde::Serialize;

use super::{format_timestamp, parse_timestamp, Database};
use crate::error::SurveyError;
use crate::models::*;

const PARTICIPANT_COLUMNS: &str = "phone, consent_status, consent_timestamp, email, survey_sent, \
     created_at, calltime, last_fed_vote_intent, gender, age, education, phone_type, region, notes";

/// Fallback bounds when no stored age parses as an integer.
const DEFAULT_AGE_RANGE: AgeRange = AgeRange { min: 18, max: 100 };

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct AgeRange {
    pub min: i64,
    pub max: i64,
}

/// Distinct non-empty values for each filterable column.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FilterOptions {
    pub genders: Vec<String>,
    pub phone_types: Vec<String>,
    pub regions: Vec<String>,
    pub educations: Vec<String>,
    pub vote_intents: Vec<String>,
    pub ages: Vec<String>,
    pub age_range: AgeRange,
}

impl Database {
    // ==================== WRITE ====================

    /// Insert a participant, or update the attributes it carries if the phone
    /// is already on the roster. Consent state, email, survey flag and
    /// `created_at` of an existing row are never touched.
    ///
    /// Returns true if a new row was created.
    pub fn upsert_participant(&self, participant: &Participant) -> Result<bool> {
        // Take the write lock up front so the busy timeout applies; a deferred
        // transaction that reads first cannot wait its way into a write.
        let tx = Transaction::new_unchecked(&self.conn, TransactionBehavior::Immediate)?;

        let existed = tx
            .query_row(
                "SELECT 1 FROM participants WHERE phone = ?",
                [&participant.phone],
                |_| Ok(()),
            )
            .optional()?
            .is_some();

        let attrs = &participant.attributes;
        tx.execute(
            r#"INSERT INTO participants (
                phone, consent_status, consent_timestamp, email, survey_sent, created_at,
                calltime, last_fed_vote_intent, gender, age, education, phone_type, region, notes
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(phone) DO UPDATE SET
                calltime = COALESCE(excluded.calltime, participants.calltime),
                last_fed_vote_intent = COALESCE(excluded.last_fed_vote_intent, participants.last_fed_vote_intent),
                gender = COALESCE(excluded.gender, participants.gender),
                age = COALESCE(excluded.age, participants.age),
                education = COALESCE(excluded.education, participants.education),
                phone_type = COALESCE(excluded.phone_type, participants.phone_type),
                region = COALESCE(excluded.region, participants.region),
                notes = COALESCE(excluded.notes, participants.notes)"#,
            params![
                participant.phone,
                participant.consent_status.as_str(),
                participant.consent_timestamp.as_ref().map(format_timestamp),
                participant.email,
                participant.survey_sent as i32,
                format_timestamp(&participant.created_at),
                attrs.calltime,
                attrs.last_fed_vote_intent,
                attrs.gender,
                attrs.age,
                attrs.education,
                attrs.phone_type,
                attrs.region,
                attrs.notes,
            ],
        )?;

        tx.commit()?;
        Ok(!existed)
    }

    /// Apply a field-level patch to the participant with this phone.
    /// Returns false if no such participant exists.
    pub fn update_participant(&self, phone: &str, patch: &ParticipantPatch) -> Result<bool> {
        if patch.is_empty() {
            return Ok(self.participant_exists(phone)?);
        }

        let mut sets = Vec::new();
        let mut values: Vec<Value> = Vec::new();

        if let Some(status) = patch.consent_status {
            sets.push("consent_status = ?");
            values.push(Value::Text(status.as_str().to_string()));
        }
        if let Some(ts) = patch.consent_timestamp {
            sets.push("consent_timestamp = ?");
            values.push(Value::Text(format_timestamp(&ts)));
        }
        if let Some(ref email) = patch.email {
            sets.push("email = ?");
            values.push(Value::Text(email.clone()));
        }
        if let Some(sent) = patch.survey_sent {
            sets.push("survey_sent = ?");
            values.push(Value::Integer(sent as i64));
        }

        values.push(Value::Text(phone.to_string()));
        let sql = format!("UPDATE participants SET {} WHERE phone = ?", sets.join(", "));
        let rows = self
            .conn
            .execute(&sql, rusqlite::params_from_iter(values.iter()))?;

        Ok(rows > 0)
    }

    /// Set `survey_sent = 0` for everyone. Returns the number of rows reset.
    pub fn reset_survey_sent(&self) -> Result<usize> {
        let rows = self
            .conn
            .execute("UPDATE participants SET survey_sent = 0 WHERE survey_sent != 0", [])?;
        Ok(rows)
    }

    /// Delete every participant and response. Returns (participants, responses) removed.
    pub fn clear_all(&self) -> Result<(usize, usize)> {
        let tx = Transaction::new_unchecked(&self.conn, TransactionBehavior::Immediate)?;
        let participants = tx.execute("DELETE FROM participants", [])?;
        let responses = tx.execute("DELETE FROM responses", [])?;
        tx.commit()?;
        Ok((participants, responses))
    }

    // ==================== READ ====================

    pub fn find_participant(&self, phone: &str) -> Result<Option<Participant>> {
        let sql = format!("SELECT {} FROM participants WHERE phone = ?", PARTICIPANT_COLUMNS);
        let participant = self
            .conn
            .query_row(&sql, [phone], row_to_participant)
            .optional()?;
        Ok(participant)
    }

    pub fn participant_exists(&self, phone: &str) -> Result<bool> {
        let found = self
            .conn
            .query_row("SELECT 1 FROM participants WHERE phone = ?", [phone], |_| Ok(()))
            .optional()?;
        Ok(found.is_some())
    }

    /// All participants, newest first.
    pub fn list_participants(&self) -> Result<Vec<Participant>> {
        let sql = format!(
            "SELECT {} FROM participants ORDER BY created_at DESC, phone ASC",
            PARTICIPANT_COLUMNS
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let participants = stmt
            .query_map([], row_to_participant)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(participants)
    }

    /// Consented participants who have not yet been sent the current survey.
    pub fn list_consented_unsent(&self) -> Result<Vec<Participant>> {
        let sql = format!(
            "SELECT {} FROM participants
             WHERE consent_status = 'consented' AND survey_sent = 0
             ORDER BY created_at ASC, phone ASC",
            PARTICIPANT_COLUMNS
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let participants = stmt
            .query_map([], row_to_participant)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(participants)
    }

    pub fn count_participants(&self) -> Result<i64> {
        let count = self
            .conn
            .query_row("SELECT COUNT(*) FROM participants", [], |row| row.get(0))?;
        Ok(count)
    }

    /// Consented participants matching every set field of `filter`, newest first.
    pub fn search_participants(&self, filter: &ParticipantFilter) -> Result<Vec<Participant>> {
        let mut conditions = vec!["consent_status = 'consented'".to_string()];
        let mut values: Vec<Value> = Vec::new();

        for (column, wanted) in [
            ("gender", &filter.gender),
            ("phone_type", &filter.phone_type),
        ] {
            if let Some(v) = wanted {
                conditions.push(format!("LOWER({}) = LOWER(?)", column));
                values.push(Value::Text(v.clone()));
            }
        }

        for (column, wanted) in [
            ("region", &filter.region),
            ("education", &filter.education),
            ("last_fed_vote_intent", &filter.vote_intent),
        ] {
            if let Some(v) = wanted {
                conditions.push(format!("LOWER({}) LIKE ? ESCAPE '\\'", column));
                values.push(Value::Text(format!("%{}%", escape_like(&v.to_lowercase()))));
            }
        }

        if let Some(min) = filter.age_min {
            conditions.push("CAST(age AS INTEGER) >= ?".to_string());
            values.push(Value::Integer(min));
        }
        if let Some(max) = filter.age_max {
            conditions.push("CAST(age AS INTEGER) <= ?".to_string());
            values.push(Value::Integer(max));
        }
        if let Some(ref exact) = filter.age_exact {
            conditions.push("age = ?".to_string());
            values.push(Value::Text(exact.clone()));
        }

        match filter.has_email {
            Some(true) => conditions.push("(email IS NOT NULL AND email != '')".to_string()),
            Some(false) => conditions.push("(email IS NULL OR email = '')".to_string()),
            None => {}
        }

        if let Some(sent) = filter.survey_sent {
            conditions.push("survey_sent = ?".to_string());
            values.push(Value::Integer(sent as i64));
        }

        if let Some(ref after) = filter.created_after {
            conditions.push("created_at >= ?".to_string());
            values.push(Value::Text(normalize_bound(after, false)?));
        }
        if let Some(ref before) = filter.created_before {
            conditions.push("created_at <= ?".to_string());
            values.push(Value::Text(normalize_bound(before, true)?));
        }

        let sql = format!(
            "SELECT {} FROM participants WHERE {} ORDER BY created_at DESC, phone ASC",
            PARTICIPANT_COLUMNS,
            conditions.join(" AND ")
        );

        let mut stmt = self.conn.prepare(&sql)?;
        let participants = stmt
            .query_map(rusqlite::params_from_iter(values.iter()), row_to_participant)?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        Ok(participants)
    }

    /// Sorted distinct non-empty values of one attribute column.
    pub fn distinct_values(&self, attr: Attribute) -> Result<Vec<String>> {
        let sql = format!(
            "SELECT DISTINCT {0} FROM participants
             WHERE {0} IS NOT NULL AND TRIM({0}) != ''
             ORDER BY {0} ASC",
            attr.column()
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let values = stmt
            .query_map([], |row| row.get(0))?
            .collect::<rusqlite::Result<Vec<String>>>()?;
        Ok(values)
    }

    /// Min and max of the ages that parse as integers.
    pub fn age_range(&self) -> Result<AgeRange> {
        let ages = self.distinct_values(Attribute::Age)?;
        let parsed: Vec<i64> = ages.iter().filter_map(|a| a.trim().parse().ok()).collect();

        match (parsed.iter().min(), parsed.iter().max()) {
            (Some(&min), Some(&max)) => Ok(AgeRange { min, max }),
            _ => Ok(DEFAULT_AGE_RANGE),
        }
    }

    pub fn filter_options(&self) -> Result<FilterOptions> {
        Ok(FilterOptions {
            genders: self.distinct_values(Attribute::Gender)?,
            phone_types: self.distinct_values(Attribute::PhoneType)?,
            regions: self.distinct_values(Attribute::Region)?,
            educations: self.distinct_values(Attribute::Education)?,
            vote_intents: self.distinct_values(Attribute::LastFedVoteIntent)?,
            ages: self.distinct_values(Attribute::Age)?,
            age_range: self.age_range()?,
        })
    }
}

fn row_to_participant(row: &Row) -> rusqlite::Result<Participant> {
    let consent_timestamp: Option<String> = row.get(2)?;
    let created_at: String = row.get(5)?;

    Ok(Participant {
        phone: row.get(0)?,
        consent_status: ConsentStatus::parse(&row.get::<_, String>(1)?),
        consent_timestamp: consent_timestamp.as_deref().and_then(parse_timestamp),
        email: row.get(3)?,
        survey_sent: row.get::<_, i64>(4)? != 0,
        created_at: parse_timestamp(&created_at).unwrap_or_else(Utc::now),
        attributes: Attributes {
            calltime: row.get(6)?,
            last_fed_vote_intent: row.get(7)?,
            gender: row.get(8)?,
            age: row.get(9)?,
            education: row.get(10)?,
            phone_type: row.get(11)?,
            region: row.get(12)?,
            notes: row.get(13)?,
        },
    })
}

/// Turn a user-supplied bound into the stored timestamp format.
/// Date-only bounds cover the whole day.
fn normalize_bound(input: &str, end_of_day: bool) -> Result<String> {
    let input = input.trim();

    if let Ok(dt) = DateTime::parse_from_rfc3339(input) {
        return Ok(format_timestamp(&dt.with_timezone(&Utc)));
    }

    for fmt in ["%Y-%m-%dT%H:%M:%S", "%Y-%m-%dT%H:%M", "%Y-%m-%d %H:%M:%S", "%Y-%m-%d %H:%M"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(input, fmt) {
            return Ok(format_timestamp(&naive.and_utc()));
        }
    }

    if let Ok(date) = NaiveDate::parse_from_str(input, "%Y-%m-%d") {
        let time = if end_of_day {
            date.and_hms_micro_opt(23, 59, 59, 999_999)
        } else {
            date.and_hms_opt(0, 0, 0)
        };
        if let Some(naive) = time {
            return Ok(format_timestamp(&naive.and_utc()));
        }
    }

    Err(SurveyError::invalid(format!("Invalid date: '{}'", input)).into())
}

/// Escape LIKE metacharacters (% _ \)
fn escape_like(s: &str) -> String {
    let mut result = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '%' | '_' | '\\' => {
                result.push('\\');
                result.push(c);
            }
            _ => result.push(c),
        }
    }
    result
}
