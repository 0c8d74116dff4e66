use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::Utc;

use crate::db::Database;
use crate::export::{export_csv, export_filename};

/// Execute the export command.
pub fn run_export(db: &Database, output: Option<&Path>) -> Result<()> {
    let path = export_to(db, output)?;
    println!("Exported to {}", path.display());
    Ok(())
}

/// Write the export and return where it went.
pub fn export_to(db: &Database, output: Option<&Path>) -> Result<PathBuf> {
    let path = match output {
        Some(path) => path.to_path_buf(),
        None => PathBuf::from(export_filename(&Utc::now())),
    };
    let csv = export_csv(db)?;
    fs::write(&path, csv).with_context(|| format!("Failed to write {}", path.display()))?;
    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Participant;

    #[test]
    fn test_export_to_file() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("out.csv");
        let db = Database::open_memory().unwrap();
        db.upsert_participant(&Participant::new("+16475551212".to_string()))
            .unwrap();

        let written = export_to(&db, Some(&target)).unwrap();

        assert_eq!(written, target);
        let text = fs::read_to_string(&target).unwrap();
        assert!(text.starts_with("## PARTICIPANTS"));
        assert!(text.contains("+16475551212"));
    }
}
