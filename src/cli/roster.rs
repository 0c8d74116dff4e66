use anyhow::{bail, Result};

use crate::db::Database;
use crate::models::Participant;

/// Print every participant, newest first.
pub fn run_participants(db: &Database) -> Result<()> {
    let participants = db.list_participants()?;
    if participants.is_empty() {
        println!("No participants.");
        return Ok(());
    }

    println!(
        "{:<16} {:<10} {:<5} {:<30} {}",
        "PHONE", "CONSENT", "SENT", "EMAIL", "ADDED"
    );
    for p in &participants {
        println!("{}", format_row(p));
    }
    println!("\n{} participants", participants.len());
    Ok(())
}

fn format_row(p: &Participant) -> String {
    format!(
        "{:<16} {:<10} {:<5} {:<30} {}",
        p.phone,
        p.consent_status.as_str(),
        if p.survey_sent { "yes" } else { "no" },
        p.email.as_deref().unwrap_or("-"),
        p.created_at.format("%Y-%m-%d %H:%M")
    )
}

/// Delete all participants and responses. Requires `--yes`.
pub fn run_clear(db: &Database, confirmed: bool) -> Result<()> {
    if !confirmed {
        bail!("This deletes every participant and response. Re-run with --yes to confirm.");
    }
    let (participants, responses) = db.clear_all()?;
    println!(
        "Deleted {} participants and {} responses",
        participants, responses
    );
    Ok(())
}

pub fn run_reset_sent(db: &Database) -> Result<()> {
    let reset = db.reset_survey_sent()?;
    println!("Survey status reset for {} participants", reset);
    Ok(())
}
