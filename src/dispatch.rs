//! Outbound fan-out: survey links, consent requests and free-form mass SMS.
//!
//! Every batch goes through the same paced loop. Each recipient is attempted
//! once and a failed send never stops the rest of the batch.

use std::collections::HashSet;
use std::thread;
use std::time::Duration;

use tracing::{info, warn};

use crate::consent::messages::CONSENT_REQUEST;
use crate::db::Database;
use crate::error::{SurveyError, SurveyResult};
use crate::models::{BatchSummary, Participant, ParticipantFilter, ParticipantPatch};
use crate::phone::{canonicalize, is_valid_phone};
use crate::sms::SmsSender;

/// Build the survey SMS body. The URL is mandatory and always included.
pub fn compose_survey_message(survey_url: &str, custom_message: Option<&str>) -> SurveyResult<String> {
    let url = survey_url.trim();
    if url.is_empty() {
        return Err(SurveyError::invalid("Survey URL is required"));
    }

    match custom_message.map(str::trim).filter(|m| !m.is_empty()) {
        Some(custom) => Ok(format!("{} {}", custom, url)),
        None => Ok(format!(
            "Hi! Here's your survey link: {} Thank you for participating!",
            url
        )),
    }
}

/// Canonicalize and dedupe caller-supplied phones, in order.
/// Invalid entries are recorded as failures on `summary`.
fn prepare_recipients(raw: &[String], summary: &mut BatchSummary) -> Vec<String> {
    let mut seen = HashSet::new();
    let mut phones = Vec::with_capacity(raw.len());

    for entry in raw {
        let entry = entry.trim();
        if entry.is_empty() {
            continue;
        }
        if !is_valid_phone(entry) {
            summary.push_failure(entry, format!("Invalid phone number: {}", entry));
            continue;
        }
        let phone = canonicalize(entry);
        if seen.insert(phone.clone()) {
            phones.push(phone);
        }
    }

    phones
}

pub struct Dispatcher<'a> {
    db: &'a Database,
    sender: &'a dyn SmsSender,
    pacing: Duration,
}

impl<'a> Dispatcher<'a> {
    pub fn new(db: &'a Database, sender: &'a dyn SmsSender, pacing: Duration) -> Self {
        Self { db, sender, pacing }
    }

    /// Send `body` to each phone in turn, pausing between attempts.
    /// `on_sent` runs after each successful send; if it fails the phone is
    /// reported as a failure with that reason.
    fn fan_out<F>(&self, phones: &[String], body: &str, mut summary: BatchSummary, on_sent: F) -> BatchSummary
    where
        F: Fn(&str) -> Result<(), String>,
    {
        for (i, phone) in phones.iter().enumerate() {
            if i > 0 && !self.pacing.is_zero() {
                thread::sleep(self.pacing);
            }

            match self.sender.send(phone, body) {
                Ok(()) => match on_sent(phone.as_str()) {
                    Ok(()) => summary.push_success(phone.as_str()),
                    Err(reason) => summary.push_failure(phone.as_str(), reason),
                },
                Err(e) => {
                    warn!(phone = phone.as_str(), error = %e, "send failed");
                    summary.push_failure(phone.as_str(), e.to_string());
                }
            }
        }

        summary
    }

    fn mark_sent(&self, phone: &str) -> Result<(), String> {
        self.db
            .update_participant(phone, &ParticipantPatch::survey_sent(true))
            .map(|_| ())
            .map_err(|e| {
                warn!(phone, error = %e, "sent survey but could not flag participant");
                format!("Sent but not flagged as surveyed: {}", e)
            })
    }

    fn send_survey_to(
        &self,
        phones: &[String],
        summary: BatchSummary,
        survey_url: &str,
        custom_message: Option<&str>,
    ) -> SurveyResult<BatchSummary> {
        let body = compose_survey_message(survey_url, custom_message)?;
        let summary = self.fan_out(phones, &body, summary, |phone| self.mark_sent(phone));
        info!(
            sent = summary.success.len(),
            failed = summary.failed.len(),
            "survey batch finished"
        );
        Ok(summary)
    }

    // ==================== SURVEYS ====================

    /// Survey every consented participant who has not been sent one yet.
    pub fn send_survey_to_consented(
        &self,
        survey_url: &str,
        custom_message: Option<&str>,
    ) -> SurveyResult<BatchSummary> {
        compose_survey_message(survey_url, custom_message)?;
        let phones: Vec<String> = self
            .db
            .list_consented_unsent()?
            .into_iter()
            .map(|p| p.phone)
            .collect();

        self.send_survey_to(&phones, BatchSummary::new(), survey_url, custom_message)
    }

    /// Survey an explicit list. No consent filter is applied.
    pub fn send_targeted_survey(
        &self,
        phones: &[String],
        survey_url: &str,
        custom_message: Option<&str>,
    ) -> SurveyResult<BatchSummary> {
        compose_survey_message(survey_url, custom_message)?;
        let mut summary = BatchSummary::new();
        let recipients = prepare_recipients(phones, &mut summary);

        self.send_survey_to(&recipients, summary, survey_url, custom_message)
    }

    /// Survey every consented participant matching `filter`.
    pub fn send_filtered_survey(
        &self,
        filter: &ParticipantFilter,
        survey_url: &str,
        custom_message: Option<&str>,
    ) -> SurveyResult<BatchSummary> {
        compose_survey_message(survey_url, custom_message)?;
        let phones: Vec<String> = self
            .db
            .search_participants(filter)?
            .into_iter()
            .map(|p| p.phone)
            .collect();

        self.send_survey_to(&phones, BatchSummary::new(), survey_url, custom_message)
    }

    // ==================== CONSENT ====================

    /// Add each valid phone to the roster (pending when new) and ask for consent.
    /// `survey_sent` is left alone.
    pub fn solicit_consent(&self, phones: &[String]) -> SurveyResult<BatchSummary> {
        let mut summary = BatchSummary::new();
        let mut recipients = Vec::new();

        for phone in prepare_recipients(phones, &mut summary) {
            match self.db.upsert_participant(&Participant::new(phone.clone())) {
                Ok(_) => recipients.push(phone),
                Err(e) => {
                    warn!(phone = phone.as_str(), error = %e, "could not add participant");
                    summary.push_failure(phone, e.to_string());
                }
            }
        }

        let summary = self.fan_out(&recipients, CONSENT_REQUEST, summary, |_| Ok(()));
        info!(
            sent = summary.success.len(),
            failed = summary.failed.len(),
            "consent requests finished"
        );
        Ok(summary)
    }

    /// Ask one number for consent. Returns the canonical phone it was sent to.
    pub fn send_consent(&self, phone: &str) -> SurveyResult<String> {
        let phone = phone.trim();
        if phone.is_empty() {
            return Err(SurveyError::invalid("Phone number is required"));
        }
        if !is_valid_phone(phone) {
            return Err(SurveyError::invalid(format!("Invalid phone number: {}", phone)));
        }

        let canonical = canonicalize(phone);
        self.db.upsert_participant(&Participant::new(canonical.clone()))?;
        self.sender.send(&canonical, CONSENT_REQUEST)?;

        info!(phone = canonical.as_str(), "consent request sent");
        Ok(canonical)
    }

    // ==================== MASS SMS ====================

    /// Send an arbitrary message to an arbitrary list. Does not read or
    /// write the roster.
    pub fn send_mass_sms(&self, phones: &[String], message: &str) -> SurveyResult<BatchSummary> {
        let message = message.trim();
        if message.is_empty() {
            return Err(SurveyError::invalid("Message is required"));
        }

        let mut summary = BatchSummary::new();
        let recipients = prepare_recipients(phones, &mut summary);
        let summary = self.fan_out(&recipients, message, summary, |_| Ok(()));

        info!(
            sent = summary.success.len(),
            failed = summary.failed.len(),
            "mass SMS finished"
        );
        Ok(summary)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ConsentStatus;
    use crate::sms::testing::RecordingSender;
    use chrono::Utc;
    use std::time::Instant;

    const URL: &str = "https://example.com/s/42";

    fn phones(list: &[&str]) -> Vec<String> {
        list.iter().map(|p| p.to_string()).collect()
    }

    fn seed(db: &Database, phone: &str, consented: bool) {
        db.upsert_participant(&Participant::new(phone.to_string()))
            .unwrap();
        if consented {
            db.update_participant(phone, &ParticipantPatch::consent(Utc::now()))
                .unwrap();
        }
    }

    #[test]
    fn test_compose_survey_message() {
        assert_eq!(
            compose_survey_message(URL, None).unwrap(),
            "Hi! Here's your survey link: https://example.com/s/42 Thank you for participating!"
        );
        assert_eq!(
            compose_survey_message(URL, Some("   ")).unwrap(),
            compose_survey_message(URL, None).unwrap()
        );
        assert_eq!(
            compose_survey_message(URL, Some("Quick poll:")).unwrap(),
            "Quick poll: https://example.com/s/42"
        );
        assert!(matches!(
            compose_survey_message("  ", Some("hi")),
            Err(SurveyError::InvalidInput(_))
        ));
    }

    #[test]
    fn test_bulk_survey_only_consented_unsent() {
        let db = Database::open_memory().unwrap();
        seed(&db, "+16475551111", true);
        seed(&db, "+16475552222", true);
        seed(&db, "+16475553333", false);
        db.update_participant("+16475552222", &ParticipantPatch::survey_sent(true))
            .unwrap();
        let sender = RecordingSender::new();

        let summary = Dispatcher::new(&db, &sender, Duration::ZERO)
            .send_survey_to_consented(URL, None)
            .unwrap();

        assert_eq!(summary.success, vec!["+16475551111"]);
        assert!(summary.failed.is_empty());
        assert_eq!(sender.sent().len(), 1);
        assert!(sender.sent()[0].1.contains(URL));
        assert!(db.find_participant("+16475551111").unwrap().unwrap().survey_sent);

        // Second run has nobody left
        let again = Dispatcher::new(&db, &sender, Duration::ZERO)
            .send_survey_to_consented(URL, None)
            .unwrap();
        assert_eq!(again.total(), 0);
    }

    #[test]
    fn test_failure_does_not_mark_or_abort() {
        let db = Database::open_memory().unwrap();
        seed(&db, "+16475551111", true);
        seed(&db, "+16475552222", true);
        let sender = RecordingSender::failing_for(&["+16475551111"]);

        let summary = Dispatcher::new(&db, &sender, Duration::ZERO)
            .send_survey_to_consented(URL, Some("Hello"))
            .unwrap();

        assert_eq!(summary.success, vec!["+16475552222"]);
        assert_eq!(summary.failed.len(), 1);
        assert_eq!(summary.failed[0].phone, "+16475551111");
        assert!(summary.failed[0].reason.contains("400"));
        assert!(!db.find_participant("+16475551111").unwrap().unwrap().survey_sent);
        assert!(db.find_participant("+16475552222").unwrap().unwrap().survey_sent);
    }

    #[test]
    fn test_unflagged_send_is_reported_failed() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("survey.db");
        let db = Database::open_at(&path).unwrap();
        rusqlite::Connection::open(&path)
            .unwrap()
            .execute_batch("DROP TABLE participants")
            .unwrap();
        let sender = RecordingSender::new();

        let summary = Dispatcher::new(&db, &sender, Duration::ZERO)
            .send_targeted_survey(&phones(&["6475551111"]), URL, None)
            .unwrap();

        assert_eq!(sender.sent().len(), 1);
        assert!(summary.success.is_empty());
        assert_eq!(summary.failed.len(), 1);
        assert_eq!(summary.failed[0].phone, "+16475551111");
        assert!(summary.failed[0].reason.starts_with("Sent but not flagged"));
    }

    #[test]
    fn test_missing_url_sends_nothing() {
        let db = Database::open_memory().unwrap();
        seed(&db, "+16475551111", true);
        let sender = RecordingSender::new();

        let result = Dispatcher::new(&db, &sender, Duration::ZERO).send_survey_to_consented("", None);

        assert!(matches!(result, Err(SurveyError::InvalidInput(_))));
        assert!(sender.sent().is_empty());
    }

    #[test]
    fn test_targeted_survey_trusts_list() {
        let db = Database::open_memory().unwrap();
        seed(&db, "+16475551111", false);
        let sender = RecordingSender::new();

        let summary = Dispatcher::new(&db, &sender, Duration::ZERO)
            .send_targeted_survey(&phones(&["6475551111", "+16475551111", "bogus", ""]), URL, None)
            .unwrap();

        assert_eq!(summary.success, vec!["+16475551111"]);
        assert_eq!(summary.failed.len(), 1);
        assert_eq!(summary.failed[0].phone, "bogus");
        // Pending participant still gets flagged once the send succeeds
        let p = db.find_participant("+16475551111").unwrap().unwrap();
        assert!(p.survey_sent);
        assert_eq!(p.consent_status, ConsentStatus::Pending);
    }

    #[test]
    fn test_filtered_survey() {
        let db = Database::open_memory().unwrap();
        let mut female = Participant::new("+16475551111".to_string());
        female.attributes.gender = Some("Female".to_string());
        db.upsert_participant(&female).unwrap();
        let mut male = Participant::new("+16475552222".to_string());
        male.attributes.gender = Some("Male".to_string());
        db.upsert_participant(&male).unwrap();
        for phone in ["+16475551111", "+16475552222"] {
            db.update_participant(phone, &ParticipantPatch::consent(Utc::now()))
                .unwrap();
        }
        let sender = RecordingSender::new();

        let filter = ParticipantFilter {
            gender: Some("female".to_string()),
            ..Default::default()
        };
        let summary = Dispatcher::new(&db, &sender, Duration::ZERO)
            .send_filtered_survey(&filter, URL, None)
            .unwrap();

        assert_eq!(summary.success, vec!["+16475551111"]);
        assert_eq!(sender.sent().len(), 1);
    }

    #[test]
    fn test_reset_allows_resend() {
        let db = Database::open_memory().unwrap();
        seed(&db, "+16475551111", true);
        let sender = RecordingSender::new();
        let dispatcher = Dispatcher::new(&db, &sender, Duration::ZERO);

        dispatcher.send_survey_to_consented(URL, None).unwrap();
        assert_eq!(db.reset_survey_sent().unwrap(), 1);
        assert!(!db.find_participant("+16475551111").unwrap().unwrap().survey_sent);

        let summary = dispatcher.send_survey_to_consented(URL, None).unwrap();
        assert_eq!(summary.success.len(), 1);
        assert_eq!(sender.sent().len(), 2);
    }

    #[test]
    fn test_solicit_consent() {
        let db = Database::open_memory().unwrap();
        seed(&db, "+16475551111", true);
        let sender = RecordingSender::new();

        let summary = Dispatcher::new(&db, &sender, Duration::ZERO)
            .solicit_consent(&phones(&["647-555-1111", "4165550100", "12"]))
            .unwrap();

        assert_eq!(summary.success, vec!["+16475551111", "+14165550100"]);
        assert_eq!(summary.failed.len(), 1);
        assert_eq!(sender.bodies_to("+14165550100"), vec![CONSENT_REQUEST]);

        // Existing consent survives, new number starts pending
        let existing = db.find_participant("+16475551111").unwrap().unwrap();
        assert_eq!(existing.consent_status, ConsentStatus::Consented);
        let added = db.find_participant("+14165550100").unwrap().unwrap();
        assert_eq!(added.consent_status, ConsentStatus::Pending);
        assert!(!added.survey_sent);
    }

    #[test]
    fn test_send_consent_single() {
        let db = Database::open_memory().unwrap();
        let sender = RecordingSender::new();
        let dispatcher = Dispatcher::new(&db, &sender, Duration::ZERO);

        assert_eq!(dispatcher.send_consent(" (647) 555-1212 ").unwrap(), "+16475551212");
        assert!(db.participant_exists("+16475551212").unwrap());
        assert!(matches!(dispatcher.send_consent("abc"), Err(SurveyError::InvalidInput(_))));
        assert!(matches!(dispatcher.send_consent(""), Err(SurveyError::InvalidInput(_))));

        let failing = RecordingSender::failing_for(&["+14165550100"]);
        let result = Dispatcher::new(&db, &failing, Duration::ZERO).send_consent("4165550100");
        assert!(matches!(result, Err(SurveyError::Transport(_))));
    }

    #[test]
    fn test_mass_sms_leaves_roster_alone() {
        let db = Database::open_memory().unwrap();
        let sender = RecordingSender::new();
        let dispatcher = Dispatcher::new(&db, &sender, Duration::ZERO);

        let summary = dispatcher
            .send_mass_sms(&phones(&["6475551111", "nope", "+442079460958"]), " Polls close at 8 ")
            .unwrap();

        assert_eq!(summary.success, vec!["+16475551111", "+442079460958"]);
        assert_eq!(summary.failed[0].phone, "nope");
        assert_eq!(sender.bodies_to("+442079460958"), vec!["Polls close at 8"]);
        assert_eq!(db.count_participants().unwrap(), 0);

        assert!(matches!(
            dispatcher.send_mass_sms(&phones(&["6475551111"]), "  "),
            Err(SurveyError::InvalidInput(_))
        ));
    }

    #[test]
    fn test_pacing_between_sends() {
        let db = Database::open_memory().unwrap();
        let sender = RecordingSender::new();
        let dispatcher = Dispatcher::new(&db, &sender, Duration::from_millis(30));

        let start = Instant::now();
        dispatcher
            .send_mass_sms(&phones(&["6475551111", "6475552222", "6475553333"]), "hi")
            .unwrap();

        // Two gaps for three recipients, none before the first
        assert!(start.elapsed() >= Duration::from_millis(60));
        assert_eq!(sender.sent().len(), 3);
    }
}
