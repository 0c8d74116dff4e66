use std::fs;
use std::path::Path;
use std::time::Duration;

use anyhow::{bail, Context, Result};

use crate::config::Config;
use crate::db::Database;
use crate::dispatch::Dispatcher;
use crate::ingest::{ingest_participants, IngestReport};
use crate::models::BatchSummary;
use crate::sms::{SmsSender, TwilioSender};

/// Execute the import command.
pub fn run_import(db: &Database, config: &Config, file: &Path, send_consent: bool) -> Result<()> {
    let sender = if send_consent {
        let sender = TwilioSender::new(config.sms.clone(), config.sms_timeout)?;
        if !sender.is_ready() {
            bail!("SMS credentials are not configured; cannot send consent requests");
        }
        Some(sender)
    } else {
        None
    };

    eprintln!("Importing: {}", file.display());
    let (report, consent) = import_file(
        db,
        file,
        sender.as_ref().map(|s| s as &dyn SmsSender),
        config.send_delay,
    )?;

    print_summary(&report);
    if let Some(consent) = consent {
        println!(
            "Consent requests sent: {}, failed: {}",
            consent.success.len(),
            consent.failed.len()
        );
        for failure in &consent.failed {
            println!("  {}: {}", failure.phone, failure.reason);
        }
    }
    Ok(())
}

/// Ingest a roster file and, given a sender, ask every stored number for consent.
pub fn import_file(
    db: &Database,
    file: &Path,
    sender: Option<&dyn SmsSender>,
    pacing: Duration,
) -> Result<(IngestReport, Option<BatchSummary>)> {
    if !file.exists() {
        bail!("File not found: {}", file.display());
    }
    let bytes = fs::read(file).context("Failed to read CSV file")?;
    let report = ingest_participants(db, &bytes)?;

    let consent = match sender {
        Some(sender) => {
            Some(Dispatcher::new(db, sender, pacing).solicit_consent(&report.summary.success)?)
        }
        None => None,
    };
    Ok((report, consent))
}

fn print_summary(report: &IngestReport) {
    println!(
        "\nImported {} participants ({} new)",
        report.summary.success.len(),
        report.created
    );

    if report.duplicates > 0 {
        println!("Skipped {} duplicates", report.duplicates);
    }

    if !report.rejected.is_empty() {
        println!("Rejected {} rows:", report.rejected.len());
        for row in &report.rejected {
            println!("  Line {}: {}", row.line, row.reason);
        }
    }

    if !report.summary.failed.is_empty() {
        println!("Errors: {}", report.summary.failed.len());
        for failure in &report.summary.failed {
            println!("  {}: {}", failure.phone, failure.reason);
        }
    }
}
