//! Inbound SMS handling: audit, classify, resolve, transition, acknowledge.

use anyhow::Result;
use chrono::Utc;
use tracing::{info, warn};

use super::classify::{classify, is_valid_email, Intent};
use super::messages;
use super::resolver::{resolve, Resolution};
use crate::db::Database;
use crate::models::{ConsentStatus, ParticipantPatch, Response};
use crate::sms::SmsSender;

/// What happened to one inbound message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InboundOutcome {
    /// Sender exactly as the transport reported it; the reply goes here.
    pub from: String,
    pub intent: Intent,
    pub resolution: Resolution,
    /// Status before and after, when a roster entry was matched.
    pub transition: Option<(ConsentStatus, ConsentStatus)>,
    /// Acknowledgement body to send back.
    pub reply: String,
}

/// Log the message, apply its effect to the roster and work out the reply.
/// Does not send anything.
pub fn record_inbound(db: &Database, from: &str, body: &str) -> Result<InboundOutcome> {
    let now = Utc::now();

    // Audit row goes in before any state change
    db.insert_response(&Response::new(from.to_string(), body.to_string(), now))?;

    let intent = classify(body);
    let resolution = resolve(db, from)?;

    let phone = match resolution {
        Resolution::Found(ref phone) => phone.clone(),
        Resolution::NotFound => {
            info!(from, intent = intent.as_str(), "inbound from unknown number");
            return Ok(InboundOutcome {
                from: from.to_string(),
                intent,
                resolution,
                transition: None,
                reply: messages::UNKNOWN_SENDER.to_string(),
            });
        }
    };

    let before = db
        .find_participant(&phone)?
        .map(|p| p.consent_status)
        .unwrap_or_default();

    let (patch, reply) = match intent {
        Intent::Affirm => (
            Some(ParticipantPatch::consent(now)),
            messages::CONSENT_CONFIRMED.to_string(),
        ),
        Intent::Decline => (
            Some(ParticipantPatch::decline()),
            messages::OPTED_OUT.to_string(),
        ),
        Intent::EmailSupplied(ref address) => {
            debug_assert!(is_valid_email(address));
            (
                Some(ParticipantPatch::email(address.clone(), now)),
                messages::email_saved(address),
            )
        }
        Intent::Unknown => (None, messages::HELP.to_string()),
    };

    let after = match patch {
        Some(ref patch) => {
            db.update_participant(&phone, patch)?;
            patch.consent_status.unwrap_or(before)
        }
        None => before,
    };

    info!(
        phone = phone.as_str(),
        intent = intent.as_str(),
        from = before.as_str(),
        to = after.as_str(),
        "consent reply processed"
    );

    Ok(InboundOutcome {
        from: from.to_string(),
        intent,
        resolution,
        transition: Some((before, after)),
        reply,
    })
}

/// Send the acknowledgement for an outcome. Failures are logged, never retried.
pub fn send_reply(sender: &dyn SmsSender, outcome: &InboundOutcome) -> bool {
    match sender.send(&outcome.from, &outcome.reply) {
        Ok(()) => true,
        Err(e) => {
            warn!(to = outcome.from.as_str(), error = %e, "acknowledgement not sent");
            false
        }
    }
}

/// Process one inbound message end to end.
pub fn handle_inbound(
    db: &Database,
    sender: &dyn SmsSender,
    from: &str,
    body: &str,
) -> Result<InboundOutcome> {
    let outcome = record_inbound(db, from, body)?;
    send_reply(sender, &outcome);
    Ok(outcome)
}
